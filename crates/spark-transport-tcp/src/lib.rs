#![doc = r#"
# spark-transport-tcp

## 设计动机（Why）
- **定位**：该 crate 提供分布式命令总线在 Tokio 运行时上的 TCP 传输实现，
  同时覆盖客户端（能力查询、命令分发）与服务端（能力端点、分发端点）。
- **架构角色**：实现 `spark-command-core` 的 [`Transport`](spark_command_core::Transport)
  契约，并把入站请求交给 [`RequestHandler`](spark_command_core::RequestHandler)。
- **设计理念**：强调“有界等待”与“错误分类”，每次请求都受调用方给出的时限约束，
  失败时映射为结构化的 [`TransportError`](spark_command_core::TransportError)。

## 核心契约（What）
- 帧格式见 [`frame`] 模块：请求携带路径与负载，响应携带状态码与负载；
- 客户端 [`TcpTransport`] 每次请求独立建连；
- 服务端 [`TcpServer`] 绑定后立即开始接入，丢弃实例即停止。

## 风险与考量（Trade-offs）
- **建连开销**：每次请求一次握手，适合低频控制面与中等吞吐的命令流；
  高吞吐场景可在此 crate 内引入连接复用，而不影响上层契约。
- **帧上限**：单帧 16 MiB，超限请求在发送前即被拒绝。
"#]

mod client;
mod error;
pub mod frame;
mod server;
mod socket;

pub use client::TcpTransport;
pub use error::ServeError;
pub use frame::MAX_BODY_LEN;
pub use server::TcpServer;
pub use socket::TcpSocketConfig;

#![doc = r#"
# spark-command-bus

## 设计动机（Why）
- **定位**：命令路由的最后一公里，把已解析的目标成员变成一次有界、可取消的往返；
- **架构角色**：客户端侧由 [`CommandBusConnector`] 发出请求，服务端侧由 [`CommandEndpoint`]
  挂载到任意传输服务端，二者共享同一个 [`LocalSegment`]；
- **门面**：[`DistributedCommandBus`] 组合路由器与连接器，提供 `subscribe` / `send` /
  `update_load_factor`。

## 核心契约（What）
- 处理器失败（[`DispatchOutcome::HandlerFailed`]）与连接器失败
  （[`DispatchOutcome::ConnectorFailed`]）严格区分，后者才值得换成员重试；
- 目标为本地成员时不经过网络，结果语义与远端一致；
- 每次分发恰好结束一次：成功、处理器失败、超时、传输失败或被取消。

## 风险与考量（Trade-offs）
- 不提供恰好一次投递；超时后的重试可能重复执行命令。
"#]

mod bus;
mod connector;
mod endpoint;
mod error;
mod local;
mod outcome;
pub mod telemetry;

pub use bus::DistributedCommandBus;
pub use connector::{CommandBusConnector, ConnectorOptions, DispatchHandle};
pub use endpoint::CommandEndpoint;
pub use error::{ConnectorError, SendError};
pub use local::{CommandHandler, LocalSegment, NO_HANDLER_CODE, handler_fn};
pub use outcome::DispatchOutcome;
pub use telemetry::{TelemetryError, install_tracing};

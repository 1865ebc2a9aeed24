#![doc = r#"
# spark-command-core

## 设计动机（Why）
- **定位**：分布式命令路由的契约层，定义成员、能力、命令与应答的数据模型，
  以及成员关系、序列化、传输三类外部协作方的最小接口；
- **架构角色**：`spark-command-router` 基于这些契约构建路由表，
  `spark-command-bus` 基于它们完成分发，`spark-transport-tcp` 提供传输实现；
- **设计理念**：契约层不持有运行时，不启动任务，只描述“是什么”与“失败时意味着什么”。

## 核心契约（What）
- [`member`]：成员标识、端点与元数据袋；
- [`capability`]：命令模式、负载因子与能力观测的新鲜度；
- [`command`]：命令消息、处理器失败与应答；
- [`membership`]：成员列表与变更订阅，附带进程内实现；
- [`serializer`]：可插拔编解码，默认 JSON；
- [`transport`]：请求/响应式传输与服务端处理器；
- [`routing`]：路由键到环坐标的纯函数映射；
- [`config`]：总线配置模型与校验；
- [`error`]：全部错误域与稳定错误码。

## 风险与考量（Trade-offs）
- 成员关系事件基于 `tokio::sync::broadcast`，订阅方滞后时可能丢失中间事件，
  需以全量成员快照兜底。
"#]

pub mod capability;
pub mod command;
pub mod config;
pub mod error;
pub mod member;
pub mod membership;
pub mod routing;
pub mod serializer;
pub mod transport;

pub use capability::{
    Capability, CapabilityObservation, CapabilityState, CommandPattern, DEFAULT_LOAD_FACTOR,
};
pub use command::{CommandMessage, CommandReply, HandlerFailure, ReplyResult};
pub use config::{
    ConnectorSettings, DiscoveryModeKind, DiscoverySettings, DistributedCommandBusSettings,
    RetrySettings, RoutingSettings,
};
pub use error::{
    ConfigError, MembershipError, PatternError, RoutingKeyError, SerializationError,
    TransportError,
};
pub use member::{Endpoint, Member, MemberId};
pub use membership::{ClusterMembership, InMemoryMembership, MembershipEvent};
pub use routing::{HashRoutingStrategy, RoutingStrategy, UnresolvedKeyPolicy};
pub use serializer::{CommandSerializer, JsonSerializer};
pub use transport::{RequestHandler, Transport, TransportRequest, TransportResponse};

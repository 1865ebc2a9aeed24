//! 路由器与能力发现的错误域。

use spark_command_core::{MembershipError, RoutingKeyError, SerializationError};
use thiserror::Error;

/// 命令解析失败。
///
/// # 教案式说明
/// - **意图 (Why)**：“没有成员能处理该命令”是定义良好的解析结果，而非内部故障；
/// - **契约 (What)**：
///   - `NoCapableMember`：当前路由表中没有任何成员以大于零的负载因子声明该命令；
///   - `RoutingKey`：路由键缺失或空白，且策略为拒绝；调用方不应重试。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no member is capable of handling command `{command}`")]
    NoCapableMember { command: String },
    #[error(transparent)]
    RoutingKey(#[from] RoutingKeyError),
}

impl ResolveError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            ResolveError::NoCapableMember { .. } => "spark.command.route.no_capable_member",
            ResolveError::RoutingKey(inner) => inner.code(),
        }
    }
}

/// 发布本地能力失败。
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error(transparent)]
    Membership(#[from] MembershipError),
}

impl DiscoveryError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            DiscoveryError::Serialization(inner) => inner.code(),
            DiscoveryError::Membership(inner) => inner.code(),
        }
    }
}

use std::time::Duration;

use spark_command_core::{HandlerFailure, MemberId, SerializationError, TransportError};
use spark_command_router::ResolveError;
use thiserror::Error;

/// 连接器级失败：命令没有完成一次有效往返。
///
/// # 教案式说明
/// - **意图 (Why)**：调用方据此判断“换个成员重试”是否有意义；处理器失败从不落入此类；
/// - **契约 (What)**：
///   - `Timeout` 表示在分发时限内没有拿到应答，远端可能已经执行了命令；
///   - `Unreachable` 表示连接未能建立，远端一定没有收到命令；
///   - `Cancelled` 只由本地放弃产生，不会通知远端；
///   - 每个变体都有稳定的 `code()`。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConnectorError {
    #[error("dispatch to `{member}` timed out after {after:?}")]
    Timeout { member: MemberId, after: Duration },
    #[error("member `{member}` is unreachable: {detail}")]
    Unreachable { member: MemberId, detail: String },
    #[error("transport failure while dispatching to `{member}`: {detail}")]
    Transport { member: MemberId, detail: String },
    #[error("serialization failure: {0}")]
    Serialization(#[from] SerializationError),
    #[error("member `{member}` rejected the dispatch with status {status}: {detail}")]
    RemoteRejected {
        member: MemberId,
        status: u16,
        detail: String,
    },
    #[error("dispatch to `{member}` was cancelled")]
    Cancelled { member: MemberId },
    #[error("internal connector failure: {detail}")]
    Internal { detail: String },
}

impl ConnectorError {
    /// 把传输错误归类为连接器失败。
    pub fn from_transport(member: &MemberId, error: TransportError) -> Self {
        let member = member.clone();
        match error {
            TransportError::Timeout { after, .. } => ConnectorError::Timeout { member, after },
            TransportError::Connect { .. } => ConnectorError::Unreachable {
                member,
                detail: error.to_string(),
            },
            TransportError::Status { status, detail, .. } => ConnectorError::RemoteRejected {
                member,
                status,
                detail,
            },
            TransportError::Io { .. } | TransportError::Malformed { .. } => {
                ConnectorError::Transport {
                    member,
                    detail: error.to_string(),
                }
            }
        }
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            ConnectorError::Timeout { .. } => "spark.command.connector.timeout",
            ConnectorError::Unreachable { .. } => "spark.command.connector.unreachable",
            ConnectorError::Transport { .. } => "spark.command.connector.transport",
            ConnectorError::Serialization(_) => "spark.command.connector.serialization",
            ConnectorError::RemoteRejected { .. } => "spark.command.connector.remote_rejected",
            ConnectorError::Cancelled { .. } => "spark.command.connector.cancelled",
            ConnectorError::Internal { .. } => "spark.command.connector.internal",
        }
    }

    /// 换一个成员重试是否可能成功。
    ///
    /// 取消来自调用方本身，序列化失败与目标无关，二者都不值得重试。
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ConnectorError::Cancelled { .. } | ConnectorError::Serialization(_)
        )
    }
}

/// [`crate::DistributedCommandBus::send`] 的失败。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// 找不到目标成员，或路由键不合法。
    #[error(transparent)]
    Routing(#[from] ResolveError),
    /// 远端处理器报告了业务失败。
    #[error("command handler failed: {0}")]
    Handler(HandlerFailure),
    /// 所有尝试都以连接器失败告终，携带最后一次的失败。
    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

impl SendError {
    pub fn code(&self) -> &'static str {
        match self {
            SendError::Routing(err) => err.code(),
            SendError::Handler(_) => "spark.command.handler_failed",
            SendError::Connector(err) => err.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn transport_errors_are_classified() {
        let member = MemberId::new("node-b");
        let refused = TransportError::Connect {
            endpoint: "127.0.0.1:1".to_owned(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(
            ConnectorError::from_transport(&member, refused).code(),
            "spark.command.connector.unreachable"
        );

        let slow = TransportError::Timeout {
            endpoint: "127.0.0.1:1".to_owned(),
            after: Duration::from_secs(2),
        };
        assert_eq!(
            ConnectorError::from_transport(&member, slow),
            ConnectorError::Timeout {
                member: member.clone(),
                after: Duration::from_secs(2)
            }
        );

        let rejected = TransportError::Status {
            endpoint: "127.0.0.1:1".to_owned(),
            status: 404,
            detail: "no route".to_owned(),
        };
        let error = ConnectorError::from_transport(&member, rejected);
        assert_eq!(error.code(), "spark.command.connector.remote_rejected");
        assert!(error.is_retryable());
        assert!(!ConnectorError::Cancelled { member }.is_retryable());
    }
}

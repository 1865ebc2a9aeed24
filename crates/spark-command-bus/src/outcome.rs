use bytes::Bytes;
use spark_command_core::{CommandReply, HandlerFailure};

use crate::error::ConnectorError;

/// 一次分发的最终结果，每个分发恰好产生一个。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 处理器成功，携带结果负载。
    Completed(Bytes),
    /// 往返成功，但处理器报告了业务失败。
    HandlerFailed(HandlerFailure),
    /// 命令没有完成有效往返。
    ConnectorFailed(ConnectorError),
}

impl DispatchOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, DispatchOutcome::Completed(_))
    }

    /// 连接器级失败（若有）。
    pub fn connector_error(&self) -> Option<&ConnectorError> {
        match self {
            DispatchOutcome::ConnectorFailed(err) => Some(err),
            _ => None,
        }
    }

    /// 拆解为处理器视角的结果，连接器失败包在外层。
    pub fn into_result(self) -> Result<Result<Bytes, HandlerFailure>, ConnectorError> {
        match self {
            DispatchOutcome::Completed(payload) => Ok(Ok(payload)),
            DispatchOutcome::HandlerFailed(failure) => Ok(Err(failure)),
            DispatchOutcome::ConnectorFailed(err) => Err(err),
        }
    }
}

impl From<CommandReply> for DispatchOutcome {
    fn from(reply: CommandReply) -> Self {
        match reply.into_result() {
            Ok(payload) => DispatchOutcome::Completed(payload),
            Err(failure) => DispatchOutcome::HandlerFailed(failure),
        }
    }
}

impl From<ConnectorError> for DispatchOutcome {
    fn from(err: ConnectorError) -> Self {
        DispatchOutcome::ConnectorFailed(err)
    }
}

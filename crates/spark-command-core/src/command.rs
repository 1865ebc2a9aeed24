//! 命令消息与应答的线缆模型。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// 生成进程内唯一的命令标识：`<纳秒时间戳>-<序号>`。
fn next_identifier() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:x}-{sequence:x}")
}

/// 单接收方命令。
///
/// # 教案式说明
/// - **意图 (Why)**：命令是 RPC 式的“至多一个处理器”消息，路由依据为 `command_name` 与
///   `routing_key`；负载体对本 crate 不透明；
/// - **契约 (What)**：
///   - `identifier` 在构造时生成，可通过 [`Self::with_identifier`] 覆盖（例如重放场景）；
///   - `routing_key` 通常为聚合标识，缺失时由路由策略的“未解析路由键策略”决定行为；
///   - `metadata` 随命令透传到远端处理器。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMessage {
    identifier: String,
    command_name: String,
    #[serde(default)]
    routing_key: Option<String>,
    payload: Bytes,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl CommandMessage {
    /// 以命令名与负载构造命令。
    pub fn new(command_name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            identifier: next_identifier(),
            command_name: command_name.into(),
            routing_key: None,
            payload: payload.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// 设置路由键。
    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    /// 覆盖命令标识。
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// 追加元数据。
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn command_name(&self) -> &str {
        &self.command_name
    }

    pub fn routing_key(&self) -> Option<&str> {
        self.routing_key.as_deref()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

/// 处理器上报的业务失败。
///
/// - **契约 (What)**：`code` 由业务定义，`message` 面向人类阅读；该失败经过完整往返，
///   与连接器级失败（网络、超时、序列化）严格区分。
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct HandlerFailure {
    code: String,
    message: String,
}

impl HandlerFailure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// 远端处理器的执行结果。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReplyResult {
    /// 处理成功，携带结果负载。
    Success { payload: Bytes },
    /// 处理器报告业务失败。
    Failure { failure: HandlerFailure },
}

/// 命令应答。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    command_identifier: String,
    result: ReplyResult,
}

impl CommandReply {
    /// 成功应答。
    pub fn success(command_identifier: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            command_identifier: command_identifier.into(),
            result: ReplyResult::Success {
                payload: payload.into(),
            },
        }
    }

    /// 业务失败应答。
    pub fn failure(command_identifier: impl Into<String>, failure: HandlerFailure) -> Self {
        Self {
            command_identifier: command_identifier.into(),
            result: ReplyResult::Failure { failure },
        }
    }

    /// 以处理器返回值构造应答。
    pub fn from_result(
        command_identifier: impl Into<String>,
        result: Result<Bytes, HandlerFailure>,
    ) -> Self {
        match result {
            Ok(payload) => Self::success(command_identifier, payload),
            Err(failure) => Self::failure(command_identifier, failure),
        }
    }

    pub fn command_identifier(&self) -> &str {
        &self.command_identifier
    }

    pub fn result(&self) -> &ReplyResult {
        &self.result
    }

    /// 拆解为处理器视角的 `Result`。
    pub fn into_result(self) -> Result<Bytes, HandlerFailure> {
        match self.result {
            ReplyResult::Success { payload } => Ok(payload),
            ReplyResult::Failure { failure } => Err(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_unique_within_process() {
        let first = CommandMessage::new("Ship", Bytes::from_static(b"{}"));
        let second = CommandMessage::new("Ship", Bytes::from_static(b"{}"));
        assert_ne!(first.identifier(), second.identifier());
    }

    #[test]
    fn reply_round_trips_into_result() {
        let ok = CommandReply::from_result("c-1", Ok(Bytes::from_static(b"done")));
        assert_eq!(ok.command_identifier(), "c-1");
        assert_eq!(ok.into_result(), Ok(Bytes::from_static(b"done")));

        let failure = HandlerFailure::new("orders.rejected", "insufficient stock");
        let failed = CommandReply::failure("c-2", failure.clone());
        assert_eq!(failed.into_result(), Err(failure));
    }
}

//! 可插拔序列化协作方。
//!
//! ## 契约（What）
//! - 核心只依赖“对象 ↔ 字节”两个方向的转换，不关心具体格式；
//! - 需要跨线缆的对象只有三类：命令、应答、能力快照；
//! - 实现必须是纯函数：同一输入得到相同字节，且不持有可变状态。

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::capability::Capability;
use crate::command::{CommandMessage, CommandReply};
use crate::error::SerializationError;

/// 序列化协作方。
pub trait CommandSerializer: Send + Sync + 'static {
    /// 格式名称，用于日志。
    fn format(&self) -> &'static str;

    fn serialize_command(&self, command: &CommandMessage) -> Result<Bytes, SerializationError>;

    fn deserialize_command(&self, bytes: &[u8]) -> Result<CommandMessage, SerializationError>;

    fn serialize_reply(&self, reply: &CommandReply) -> Result<Bytes, SerializationError>;

    fn deserialize_reply(&self, bytes: &[u8]) -> Result<CommandReply, SerializationError>;

    fn serialize_capability(&self, capability: &Capability) -> Result<Bytes, SerializationError>;

    fn deserialize_capability(&self, bytes: &[u8]) -> Result<Capability, SerializationError>;
}

/// 基于 `serde_json` 的默认实现。
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub const fn new() -> Self {
        Self
    }
}

fn encode<T: Serialize>(what: &'static str, value: &T) -> Result<Bytes, SerializationError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|err| SerializationError::Encode {
            what,
            detail: err.to_string(),
        })
}

fn decode<T: DeserializeOwned>(what: &'static str, bytes: &[u8]) -> Result<T, SerializationError> {
    serde_json::from_slice(bytes).map_err(|err| SerializationError::Decode {
        what,
        detail: err.to_string(),
    })
}

impl CommandSerializer for JsonSerializer {
    fn format(&self) -> &'static str {
        "json"
    }

    fn serialize_command(&self, command: &CommandMessage) -> Result<Bytes, SerializationError> {
        encode("command", command)
    }

    fn deserialize_command(&self, bytes: &[u8]) -> Result<CommandMessage, SerializationError> {
        decode("command", bytes)
    }

    fn serialize_reply(&self, reply: &CommandReply) -> Result<Bytes, SerializationError> {
        encode("reply", reply)
    }

    fn deserialize_reply(&self, bytes: &[u8]) -> Result<CommandReply, SerializationError> {
        decode("reply", bytes)
    }

    fn serialize_capability(&self, capability: &Capability) -> Result<Bytes, SerializationError> {
        encode("capability", capability)
    }

    fn deserialize_capability(&self, bytes: &[u8]) -> Result<Capability, SerializationError> {
        decode("capability", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::HandlerFailure;

    #[test]
    fn command_survives_json_transport() {
        let serializer = JsonSerializer::new();
        let command = CommandMessage::new("Ship", Bytes::from_static(b"cargo"))
            .with_routing_key("order-17")
            .with_metadata("tenant", "acme");
        let bytes = serializer.serialize_command(&command).unwrap();
        assert_eq!(serializer.deserialize_command(&bytes).unwrap(), command);
    }

    #[test]
    fn failure_reply_keeps_handler_code() {
        let serializer = JsonSerializer::new();
        let reply =
            CommandReply::failure("c-9", HandlerFailure::new("orders.rejected", "out of stock"));
        let bytes = serializer.serialize_reply(&reply).unwrap();
        let decoded = serializer.deserialize_reply(&bytes).unwrap();
        assert_eq!(decoded.into_result().unwrap_err().code(), "orders.rejected");
    }

    #[test]
    fn garbage_is_reported_as_decode_error() {
        let serializer = JsonSerializer::new();
        let err = serializer.deserialize_capability(b"not json").unwrap_err();
        assert!(matches!(err, SerializationError::Decode { what: "capability", .. }));
        assert_eq!(err.code(), "spark.command.serialization.decode");
    }
}

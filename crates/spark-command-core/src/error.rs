//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中声明命令路由各契约层共享的错误域：配置、路由键、能力模式、序列化、传输与成员关系；
//! - 每个错误都暴露稳定错误码 `spark.command.<域>.<语义>`，供日志与告警聚合。
//!
//! ## 分层约定（What）
//! - 配置错误与路由键错误属于“调用即失败、不可重试”的一类；
//! - 传输错误由连接器与能力发现各自再分类：发现路径将其吸收为忽略名单，分发路径将其升级为连接器失败；
//! - 所有枚举均派生 [`thiserror::Error`]，满足 `Send + Sync + 'static`。

use std::io;
use std::time::Duration;

use thiserror::Error;

/// 路由键无法解析时的错误。
///
/// - **契约 (What)**：仅在 [`UnresolvedKeyPolicy::Error`](crate::routing::UnresolvedKeyPolicy::Error)
///   策略下产生；调用方应直接向命令发起方报告，不做重试。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoutingKeyError {
    /// 命令未携带路由键。
    #[error("command carries no routing key")]
    Missing,
    /// 路由键为空串或仅包含空白字符。
    #[error("routing key is blank")]
    Blank,
}

impl RoutingKeyError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            RoutingKeyError::Missing => "spark.command.routing_key.missing",
            RoutingKeyError::Blank => "spark.command.routing_key.blank",
        }
    }
}

/// 命令名模式解析失败。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    /// 模式为空。
    #[error("command pattern must not be empty")]
    Empty,
    /// 通配符只能出现在模式末尾。
    #[error("wildcard in command pattern `{pattern}` is only allowed as a trailing `*`")]
    MisplacedWildcard { pattern: String },
}

impl PatternError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            PatternError::Empty => "spark.command.pattern.empty",
            PatternError::MisplacedWildcard { .. } => "spark.command.pattern.wildcard",
        }
    }
}

/// 序列化协作方返回的错误。
///
/// # 教案式说明
/// - **意图 (Why)**：序列化失败在分发路径上属于连接器级失败，需要与处理器失败严格区分；
/// - **契约 (What)**：`what` 标记被编解码的对象类别（`command`/`reply`/`capability`），`detail`
///   为底层库给出的描述。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SerializationError {
    /// 编码失败。
    #[error("failed to encode {what}: {detail}")]
    Encode { what: &'static str, detail: String },
    /// 解码失败。
    #[error("failed to decode {what}: {detail}")]
    Decode { what: &'static str, detail: String },
}

impl SerializationError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            SerializationError::Encode { .. } => "spark.command.serialization.encode",
            SerializationError::Decode { .. } => "spark.command.serialization.decode",
        }
    }
}

/// 传输协作方返回的错误。
///
/// # 教案式说明
/// - **意图 (Why)**：统一描述“建连失败 / 超时 / 读写失败 / 帧格式损坏 / 非成功状态”五类失败，
///   让能力发现与连接器按各自策略处理；
/// - **契约 (What)**：
///   - `endpoint` 始终为 `host:port` 形式，便于排障；
///   - `Timeout::after` 为本次请求实际使用的等待上限；
///   - `Status` 表示对端已完成往返但返回了非成功状态码。
#[derive(Debug, Error)]
pub enum TransportError {
    /// 无法与对端建立连接。
    #[error("failed to connect to `{endpoint}`: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    /// 在给定时限内未收到响应。
    #[error("request to `{endpoint}` timed out after {after:?}")]
    Timeout { endpoint: String, after: Duration },
    /// 连接建立后读写失败。
    #[error("i/o failure while talking to `{endpoint}`: {source}")]
    Io {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    /// 对端返回的帧无法解析。
    #[error("malformed frame from `{endpoint}`: {detail}")]
    Malformed { endpoint: String, detail: String },
    /// 对端返回非成功状态码。
    #[error("`{endpoint}` answered with status {status}: {detail}")]
    Status {
        endpoint: String,
        status: u16,
        detail: String,
    },
}

impl TransportError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::Connect { .. } => "spark.command.transport.connect_failed",
            TransportError::Timeout { .. } => "spark.command.transport.timeout",
            TransportError::Io { .. } => "spark.command.transport.io_failed",
            TransportError::Malformed { .. } => "spark.command.transport.malformed",
            TransportError::Status { .. } => "spark.command.transport.status",
        }
    }

    /// 是否为超时。
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }

    /// 对端地址。
    pub fn endpoint(&self) -> &str {
        match self {
            TransportError::Connect { endpoint, .. }
            | TransportError::Timeout { endpoint, .. }
            | TransportError::Io { endpoint, .. }
            | TransportError::Malformed { endpoint, .. }
            | TransportError::Status { endpoint, .. } => endpoint,
        }
    }
}

/// 成员关系协作方返回的错误。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MembershipError {
    /// 目标成员不在当前视图中。
    #[error("member `{member}` is not part of the cluster view")]
    UnknownMember { member: String },
}

impl MembershipError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            MembershipError::UnknownMember { .. } => "spark.command.membership.unknown_member",
        }
    }
}

/// 装配阶段的配置错误。
///
/// - **契约 (What)**：属于致命错误，在构造阶段立即返回给调用方，不参与重试；
/// - `UnsupportedMode` 的文案与原有部署工具保持一致：`The configured mode [x] is not supported`。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 能力发现模式不受支持。
    #[error("The configured mode [{0}] is not supported")]
    UnsupportedMode(String),
    /// 未知的路由键策略。
    #[error("The configured unresolved routing key policy [{0}] is not supported")]
    UnsupportedPolicy(String),
    /// 字段取值非法。
    #[error("invalid setting `{field}`: {detail}")]
    Invalid { field: &'static str, detail: String },
    /// TOML 解析失败。
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::UnsupportedMode(_) => "spark.command.config.unsupported_mode",
            ConfigError::UnsupportedPolicy(_) => "spark.command.config.unsupported_policy",
            ConfigError::Invalid { .. } => "spark.command.config.invalid",
            ConfigError::Parse(_) => "spark.command.config.parse",
        }
    }
}

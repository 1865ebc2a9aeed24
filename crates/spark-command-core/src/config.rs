//! # 分布式命令总线配置模型
//!
//! ## 核心意图（Why）
//! - 以单一的 [`DistributedCommandBusSettings`] 描述能力发现、连接器、路由与重试的全部可调项；
//! - 配置可以由代码构造，也可以通过 [`DistributedCommandBusSettings::from_toml_str`] 从 TOML 读取。
//!
//! ## 行为契约（What）
//! - 所有字段均有默认值，TOML 中缺省的段落与字段回落到默认值；
//! - 未知字段被拒绝，避免拼写错误被静默忽略；
//! - [`DistributedCommandBusSettings::validate`] 在装配阶段检查取值，违反约束返回 [`ConfigError`]。
//!
//! ## 示例
//! ```toml
//! load_factor = 50
//!
//! [discovery]
//! mode = "simple"
//!
//! [connector]
//! dispatch_timeout_ms = 1500
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::capability::DEFAULT_LOAD_FACTOR;
use crate::error::ConfigError;
use crate::routing::{HashRoutingStrategy, UnresolvedKeyPolicy};

pub const DEFAULT_CAPABILITIES_PATH: &str = "/message-routing-information";
pub const DEFAULT_DISPATCH_PATH: &str = "/spring-command-bus-connector/command";
pub const DEFAULT_RING_RESOLUTION: u32 = 1024;

/// 能力发现模式的配置取值。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscoveryModeKind {
    /// 能力随成员元数据发布。
    Simple,
    /// 按需向对端能力端点查询。
    RemoteQuery,
}

impl DiscoveryModeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryModeKind::Simple => "simple",
            DiscoveryModeKind::RemoteQuery => "remote-query",
        }
    }
}

impl fmt::Display for DiscoveryModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscoveryModeKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(DiscoveryModeKind::Simple),
            "remote-query" | "remote_query" | "rest" => Ok(DiscoveryModeKind::RemoteQuery),
            _ => Err(ConfigError::UnsupportedMode(s.to_owned())),
        }
    }
}

/// 能力发现配置。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoverySettings {
    /// `simple` 或 `remote-query`。
    pub mode: String,
    /// 对端能力端点路径。
    pub capabilities_path: String,
    /// 关闭忽略名单：查询失败的成员不会被排除。
    pub disable_ignore_listing: bool,
    /// 单次能力查询的等待上限。
    pub query_timeout_ms: u64,
    /// 忽略名单中的成员至少间隔多久才会被重新查询，`0` 表示每次重建都重新查询。
    pub ignore_requery_interval_ms: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            mode: DiscoveryModeKind::RemoteQuery.as_str().to_owned(),
            capabilities_path: DEFAULT_CAPABILITIES_PATH.to_owned(),
            disable_ignore_listing: false,
            query_timeout_ms: 2_000,
            ignore_requery_interval_ms: 30_000,
        }
    }
}

impl DiscoverySettings {
    /// 解析发现模式。
    pub fn mode(&self) -> Result<DiscoveryModeKind, ConfigError> {
        self.mode.parse()
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn ignore_requery_interval(&self) -> Duration {
        Duration::from_millis(self.ignore_requery_interval_ms)
    }
}

/// 连接器配置。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectorSettings {
    /// 命令分发路径。
    pub dispatch_path: String,
    /// 单次分发的等待上限。
    pub dispatch_timeout_ms: u64,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            dispatch_path: DEFAULT_DISPATCH_PATH.to_owned(),
            dispatch_timeout_ms: 2_000,
        }
    }
}

impl ConnectorSettings {
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}

/// 路由配置。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingSettings {
    /// `error` 或 `static-key`。
    pub unresolved_key_policy: String,
    /// `static-key` 策略下使用的固定键。
    pub static_key: String,
    /// 每个命令的路由环总位置数。
    pub ring_resolution: u32,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            unresolved_key_policy: "error".to_owned(),
            static_key: "unresolved".to_owned(),
            ring_resolution: DEFAULT_RING_RESOLUTION,
        }
    }
}

impl RoutingSettings {
    /// 解析路由键策略。
    pub fn policy(&self) -> Result<UnresolvedKeyPolicy, ConfigError> {
        match self.unresolved_key_policy.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(UnresolvedKeyPolicy::Error),
            "static-key" | "static_key" => {
                Ok(UnresolvedKeyPolicy::StaticKey(self.static_key.clone()))
            }
            _ => Err(ConfigError::UnsupportedPolicy(
                self.unresolved_key_policy.clone(),
            )),
        }
    }

    /// 按配置构造默认路由策略。
    pub fn strategy(&self) -> Result<HashRoutingStrategy, ConfigError> {
        self.policy().map(HashRoutingStrategy::new)
    }
}

/// 连接器失败后的重试配置。
///
/// - **契约 (What)**：`max_attempts` 为总尝试次数（含首次），`1` 表示不重试；
///   重试总是换到尚未尝试过的其他成员。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            interval_ms: 100,
        }
    }
}

impl RetrySettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// 分布式命令总线的完整配置。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DistributedCommandBusSettings {
    /// 本地成员的负载因子。
    pub load_factor: u32,
    pub discovery: DiscoverySettings,
    pub connector: ConnectorSettings,
    pub routing: RoutingSettings,
    pub retry: RetrySettings,
}

impl Default for DistributedCommandBusSettings {
    fn default() -> Self {
        Self {
            load_factor: DEFAULT_LOAD_FACTOR,
            discovery: DiscoverySettings::default(),
            connector: ConnectorSettings::default(),
            routing: RoutingSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl DistributedCommandBusSettings {
    /// 从 TOML 文本解析并校验配置。
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// 校验全部字段。
    ///
    /// # 教案式说明
    /// - **契约 (What)**：
    ///   - 发现模式与路由键策略必须可识别；
    ///   - 两条路径必须以 `/` 开头且互不相同；
    ///   - 除重新查询间隔外，所有时长必须大于零；
    ///   - `ring_resolution` 与 `retry.max_attempts` 必须大于零。
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.discovery.mode()?;
        self.routing.policy()?;
        check_path("discovery.capabilities_path", &self.discovery.capabilities_path)?;
        check_path("connector.dispatch_path", &self.connector.dispatch_path)?;
        if self.discovery.capabilities_path == self.connector.dispatch_path {
            return Err(ConfigError::Invalid {
                field: "connector.dispatch_path",
                detail: "must differ from discovery.capabilities_path".to_owned(),
            });
        }
        check_positive("discovery.query_timeout_ms", self.discovery.query_timeout_ms)?;
        check_positive(
            "connector.dispatch_timeout_ms",
            self.connector.dispatch_timeout_ms,
        )?;
        check_positive("retry.interval_ms", self.retry.interval_ms)?;
        check_positive(
            "routing.ring_resolution",
            u64::from(self.routing.ring_resolution),
        )?;
        check_positive("retry.max_attempts", u64::from(self.retry.max_attempts))?;
        Ok(())
    }
}

fn check_path(field: &'static str, path: &str) -> Result<(), ConfigError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            detail: format!("`{path}` must start with `/`"),
        })
    }
}

fn check_positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            detail: "must be greater than zero".to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = DistributedCommandBusSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.load_factor, 100);
        assert_eq!(settings.discovery.mode().unwrap(), DiscoveryModeKind::RemoteQuery);
        assert_eq!(settings.discovery.query_timeout(), Duration::from_secs(2));
        assert_eq!(settings.routing.policy().unwrap(), UnresolvedKeyPolicy::Error);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let settings = DistributedCommandBusSettings::from_toml_str(
            r#"
            load_factor = 7

            [discovery]
            mode = "simple"

            [routing]
            unresolved_key_policy = "static-key"
            static_key = "fallback"
            "#,
        )
        .unwrap();
        assert_eq!(settings.load_factor, 7);
        assert_eq!(settings.discovery.mode().unwrap(), DiscoveryModeKind::Simple);
        assert_eq!(settings.discovery.capabilities_path, DEFAULT_CAPABILITIES_PATH);
        assert_eq!(
            settings.routing.policy().unwrap(),
            UnresolvedKeyPolicy::StaticKey("fallback".to_owned())
        );
        assert_eq!(settings.connector.dispatch_timeout_ms, 2_000);
    }

    #[test]
    fn unknown_mode_is_reported_verbatim() {
        let err = DistributedCommandBusSettings::from_toml_str("[discovery]\nmode = \"gossip\"")
            .unwrap_err();
        assert_eq!(err.to_string(), "The configured mode [gossip] is not supported");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut settings = DistributedCommandBusSettings::default();
        settings.connector.dispatch_timeout_ms = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid { field: "connector.dispatch_timeout_ms", .. })
        ));

        let mut settings = DistributedCommandBusSettings::default();
        settings.discovery.capabilities_path = "routing".to_owned();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid { field: "discovery.capabilities_path", .. })
        ));

        let mut settings = DistributedCommandBusSettings::default();
        settings.discovery.ignore_requery_interval_ms = 0;
        settings.validate().unwrap();

        assert!(matches!(
            DistributedCommandBusSettings::from_toml_str("unknown = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}

//! 命令处理能力的描述与观测。
//!
//! ## 概念（What）
//! - [`CommandPattern`]：单个命令名匹配规则，支持精确名、尾部通配前缀与全匹配 `*`；
//! - [`Capability`]：一个成员声明的模式集合与负载因子；
//! - [`CapabilityObservation`]：某个成员能力在本地的一次观测，附带新鲜度状态。

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PatternError;
use crate::member::MemberId;

/// 未显式配置时的负载因子。
pub const DEFAULT_LOAD_FACTOR: u32 = 100;

/// 命令名匹配规则。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - `Exact("com.acme.Ship")` 仅匹配同名命令；
///   - `Prefix("com.acme.")` 由 `com.acme.*` 解析而来，匹配所有以该前缀开头的命令；
///   - `Any` 由 `*` 解析而来，匹配全部命令；
///   - 通配符只允许出现在末尾，其余位置一律拒绝。
/// - **序列化 (How)**：以其文本形式（`Display`）进出线缆，反序列化时重新校验。
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandPattern {
    Exact(String),
    Prefix(String),
    Any,
}

impl CommandPattern {
    /// 解析文本模式。
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }
        if pattern == "*" {
            return Ok(CommandPattern::Any);
        }
        match pattern.find('*') {
            None => Ok(CommandPattern::Exact(pattern.to_owned())),
            Some(index) if index == pattern.len() - 1 => {
                Ok(CommandPattern::Prefix(pattern[..index].to_owned()))
            }
            Some(_) => Err(PatternError::MisplacedWildcard {
                pattern: pattern.to_owned(),
            }),
        }
    }

    /// 精确匹配某个命令名。
    pub fn exact(name: impl Into<String>) -> Self {
        CommandPattern::Exact(name.into())
    }

    /// 判断命令名是否被本模式覆盖。
    pub fn matches(&self, command_name: &str) -> bool {
        match self {
            CommandPattern::Exact(name) => name == command_name,
            CommandPattern::Prefix(prefix) => command_name.starts_with(prefix.as_str()),
            CommandPattern::Any => true,
        }
    }

    /// 精确模式返回其命令名。
    pub fn exact_name(&self) -> Option<&str> {
        match self {
            CommandPattern::Exact(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for CommandPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandPattern::Exact(name) => f.write_str(name),
            CommandPattern::Prefix(prefix) => write!(f, "{prefix}*"),
            CommandPattern::Any => f.write_str("*"),
        }
    }
}

impl FromStr for CommandPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for CommandPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CommandPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        CommandPattern::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// 成员声明的命令处理能力。
///
/// # 教案式说明
/// - **意图 (Why)**：能力是路由表的唯一输入之一，必须可以跨节点传输并按值比较；
/// - **契约 (What)**：
///   - `load_factor` 为非负整数，越大分得的流量越多；`0` 表示不再接收新命令；
///   - `patterns` 为空表示“没有本地处理器”，这是合法的空能力而非错误；
///   - 同一成员的能力整体替换，不做字段级合并。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    load_factor: u32,
    #[serde(default)]
    patterns: BTreeSet<CommandPattern>,
}

impl Capability {
    /// 以负载因子构造空能力。
    pub fn new(load_factor: u32) -> Self {
        Self {
            load_factor,
            patterns: BTreeSet::new(),
        }
    }

    /// 追加一个模式。
    pub fn with_pattern(mut self, pattern: CommandPattern) -> Self {
        self.patterns.insert(pattern);
        self
    }

    /// 解析并追加多个文本模式。
    pub fn with_patterns<I, S>(mut self, patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for raw in patterns {
            self.patterns.insert(CommandPattern::parse(raw.as_ref())?);
        }
        Ok(self)
    }

    /// 负载因子。
    pub fn load_factor(&self) -> u32 {
        self.load_factor
    }

    /// 返回替换了负载因子的新能力。
    pub fn with_load_factor(mut self, load_factor: u32) -> Self {
        self.load_factor = load_factor;
        self
    }

    /// 全部模式。
    pub fn patterns(&self) -> &BTreeSet<CommandPattern> {
        &self.patterns
    }

    /// 是否声明了对该命令的处理能力（不考虑负载因子）。
    pub fn handles(&self, command_name: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.matches(command_name))
    }

    /// 是否应当在路由环上占据位置。
    pub fn is_routable(&self) -> bool {
        self.load_factor > 0 && !self.patterns.is_empty()
    }

    /// 是否没有任何处理器。
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// 追加模式，返回是否为新增。
    pub fn insert_pattern(&mut self, pattern: CommandPattern) -> bool {
        self.patterns.insert(pattern)
    }

    /// 移除模式，返回是否存在过。
    pub fn remove_pattern(&mut self, pattern: &CommandPattern) -> bool {
        self.patterns.remove(pattern)
    }

    /// 就地更新负载因子。
    pub fn set_load_factor(&mut self, load_factor: u32) {
        self.load_factor = load_factor;
    }
}

/// 能力观测的新鲜度。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CapabilityState {
    /// 最近一次查询成功，可直接参与路由。
    Valid,
    /// 成员元数据已变化，缓存需在下次重建时重新查询。
    Stale,
    /// 成员处于忽略名单中。
    Ignored,
}

/// 某个成员能力的一次本地观测。
///
/// - **契约 (What)**：观测始终归属于唯一成员；`capability` 为 `None` 仅出现在 `Ignored` 状态。
#[derive(Clone, Debug)]
pub struct CapabilityObservation {
    member: MemberId,
    capability: Option<Capability>,
    state: CapabilityState,
    observed_at: Instant,
}

impl CapabilityObservation {
    /// 成功观测。
    pub fn valid(member: MemberId, capability: Capability) -> Self {
        Self {
            member,
            capability: Some(capability),
            state: CapabilityState::Valid,
            observed_at: Instant::now(),
        }
    }

    /// 被忽略的观测。
    pub fn ignored(member: MemberId) -> Self {
        Self {
            member,
            capability: None,
            state: CapabilityState::Ignored,
            observed_at: Instant::now(),
        }
    }

    /// 将观测标记为过期，保留原能力与时间戳。
    pub fn into_stale(mut self) -> Self {
        if self.state == CapabilityState::Valid {
            self.state = CapabilityState::Stale;
        }
        self
    }

    /// 归属成员。
    pub fn member(&self) -> &MemberId {
        &self.member
    }

    /// 观测到的能力。
    pub fn capability(&self) -> Option<&Capability> {
        self.capability.as_ref()
    }

    /// 新鲜度。
    pub fn state(&self) -> CapabilityState {
        self.state
    }

    /// 观测时间。
    pub fn observed_at(&self) -> Instant {
        self.observed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_parsing_covers_exact_prefix_and_any() {
        assert_eq!(
            CommandPattern::parse("com.acme.Ship").unwrap(),
            CommandPattern::Exact("com.acme.Ship".to_owned())
        );
        assert_eq!(
            CommandPattern::parse("com.acme.*").unwrap(),
            CommandPattern::Prefix("com.acme.".to_owned())
        );
        assert_eq!(CommandPattern::parse("*").unwrap(), CommandPattern::Any);
        assert_eq!(CommandPattern::parse("  "), Err(PatternError::Empty));
        assert!(matches!(
            CommandPattern::parse("com.*.Ship"),
            Err(PatternError::MisplacedWildcard { .. })
        ));
    }

    #[test]
    fn pattern_matching() {
        let prefix = CommandPattern::parse("orders.*").unwrap();
        assert!(prefix.matches("orders.Create"));
        assert!(!prefix.matches("billing.Create"));
        assert!(CommandPattern::Any.matches("anything"));
        assert!(CommandPattern::exact("Ship").matches("Ship"));
        assert!(!CommandPattern::exact("Ship").matches("ShipFast"));
    }

    #[test]
    fn capability_routability() {
        let empty = Capability::new(10);
        assert!(empty.is_empty());
        assert!(!empty.is_routable());

        let drained = Capability::new(0).with_pattern(CommandPattern::exact("Ship"));
        assert!(drained.handles("Ship"));
        assert!(!drained.is_routable());

        let active = Capability::new(1)
            .with_patterns(["Ship", "orders.*"])
            .unwrap();
        assert!(active.is_routable());
        assert!(active.handles("orders.Cancel"));
        assert!(!active.handles("Unload"));
    }

    #[test]
    fn capability_json_shape_uses_textual_patterns() {
        let capability = Capability::new(3)
            .with_patterns(["Ship", "orders.*"])
            .unwrap();
        let json = serde_json::to_string(&capability).unwrap();
        assert_eq!(json, r#"{"load_factor":3,"patterns":["Ship","orders.*"]}"#);

        let invalid = r#"{"load_factor":1,"patterns":["a*b"]}"#;
        assert!(serde_json::from_str::<Capability>(invalid).is_err());
    }

    #[test]
    fn stale_only_applies_to_valid_observations() {
        let member = MemberId::new("node-a");
        let stale = CapabilityObservation::valid(member.clone(), Capability::new(1)).into_stale();
        assert_eq!(stale.state(), CapabilityState::Stale);
        assert!(stale.capability().is_some());

        let ignored = CapabilityObservation::ignored(member).into_stale();
        assert_eq!(ignored.state(), CapabilityState::Ignored);
    }
}

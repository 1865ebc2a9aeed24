//! # 路由策略
//!
//! ## 核心意图（Why）
//! - 把路由键映射为 64 位哈希值，作为一致性哈希环上的查找坐标；
//! - 环位置与路由键使用同一个哈希函数，保证两者落在同一坐标空间。
//!
//! ## 行为契约（What）
//! - `hash` 为纯函数：确定、全域、跨进程重启稳定、近似均匀；
//! - 路由键缺失或为空白时按 [`UnresolvedKeyPolicy`] 处理：`Error` 返回
//!   [`RoutingKeyError`]，`StaticKey` 以固定键代替（所有此类命令落到同一成员）。
//!
//! ## 实现说明（How）
//! - [`HashRoutingStrategy`] 取 SHA-256 摘要的前 8 个字节按大端序解释为 `u64`。

use sha2::{Digest, Sha256};

use crate::error::RoutingKeyError;

/// 路由键缺失时的处理策略。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum UnresolvedKeyPolicy {
    /// 拒绝命令。
    #[default]
    Error,
    /// 使用固定路由键。
    StaticKey(String),
}

/// 路由策略。
pub trait RoutingStrategy: Send + Sync + 'static {
    /// 任意字节到环坐标的映射。
    fn hash(&self, input: &[u8]) -> u64;

    /// 路由键缺失时的策略。
    fn unresolved_key_policy(&self) -> &UnresolvedKeyPolicy;

    /// 把命令携带的路由键映射为环坐标。
    fn route(&self, routing_key: Option<&str>) -> Result<u64, RoutingKeyError> {
        let problem = match routing_key {
            Some(key) if !key.trim().is_empty() => return Ok(self.hash(key.as_bytes())),
            Some(_) => RoutingKeyError::Blank,
            None => RoutingKeyError::Missing,
        };
        match self.unresolved_key_policy() {
            UnresolvedKeyPolicy::Error => Err(problem),
            UnresolvedKeyPolicy::StaticKey(key) => Ok(self.hash(key.as_bytes())),
        }
    }
}

/// 基于 SHA-256 的默认路由策略。
#[derive(Clone, Debug, Default)]
pub struct HashRoutingStrategy {
    policy: UnresolvedKeyPolicy,
}

impl HashRoutingStrategy {
    pub fn new(policy: UnresolvedKeyPolicy) -> Self {
        Self { policy }
    }
}

/// SHA-256 摘要前 8 字节的大端 `u64`。
pub fn sha256_u64(input: &[u8]) -> u64 {
    let digest = Sha256::digest(input);
    let mut prefix = [0_u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

impl RoutingStrategy for HashRoutingStrategy {
    fn hash(&self, input: &[u8]) -> u64 {
        sha256_u64(input)
    }

    fn unresolved_key_policy(&self) -> &UnresolvedKeyPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_digest_prefix() {
        // sha256("") = e3b0c442 98fc1c14 ...
        assert_eq!(sha256_u64(b""), 0xe3b0_c442_98fc_1c14);
    }

    #[test]
    fn error_policy_rejects_missing_and_blank_keys() {
        let strategy = HashRoutingStrategy::default();
        assert_eq!(strategy.route(None), Err(RoutingKeyError::Missing));
        assert_eq!(strategy.route(Some("  ")), Err(RoutingKeyError::Blank));
        assert!(strategy.route(Some("order-1")).is_ok());
    }

    #[test]
    fn static_key_policy_canonicalizes_unresolved_keys() {
        let strategy =
            HashRoutingStrategy::new(UnresolvedKeyPolicy::StaticKey("unresolved".to_owned()));
        let expected = strategy.hash(b"unresolved");
        assert_eq!(strategy.route(None), Ok(expected));
        assert_eq!(strategy.route(Some("")), Ok(expected));
    }

    proptest! {
        #[test]
        fn route_is_deterministic(key in "[a-zA-Z0-9-]{1,40}") {
            let first = HashRoutingStrategy::default();
            let second = HashRoutingStrategy::default();
            prop_assert_eq!(first.route(Some(&key)), second.route(Some(&key)));
            prop_assert_eq!(first.route(Some(&key)), Ok(sha256_u64(key.as_bytes())));
        }
    }
}

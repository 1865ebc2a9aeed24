use std::time::{Duration, Instant};

use dashmap::DashMap;
use spark_command_core::MemberId;

/// 单个被忽略成员的记录。
#[derive(Clone, Copy, Debug)]
pub struct IgnoreEntry {
    since: Instant,
    last_attempt: Instant,
    failures: u32,
}

impl IgnoreEntry {
    /// 首次进入忽略名单的时间。
    pub fn since(&self) -> Instant {
        self.since
    }

    /// 最近一次失败查询的时间。
    pub fn last_attempt(&self) -> Instant {
        self.last_attempt
    }

    /// 连续失败次数。
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// 能力查询失败成员的忽略名单。
///
/// # 教案式说明
/// - **意图 (Why)**：无响应的成员不应在每次重建时拖慢查询，也不应被路由到；
/// - **契约 (What)**：
///   - 关闭时 `record_failure` 不做任何事，名单恒为空；
///   - 成员只在查询成功、离开集群或显式重置时移出名单；
///   - `due_for_requery` 决定被忽略成员何时再次尝试查询，`interval` 为零表示每次都尝试。
#[derive(Debug)]
pub struct IgnoreList {
    enabled: bool,
    entries: DashMap<MemberId, IgnoreEntry>,
}

impl IgnoreList {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 记录一次查询失败，返回成员是否为新加入名单。
    pub fn record_failure(&self, member: &MemberId) -> bool {
        if !self.enabled {
            return false;
        }
        let now = Instant::now();
        let mut fresh = false;
        self.entries
            .entry(member.clone())
            .and_modify(|entry| {
                entry.last_attempt = now;
                entry.failures = entry.failures.saturating_add(1);
            })
            .or_insert_with(|| {
                fresh = true;
                IgnoreEntry {
                    since: now,
                    last_attempt: now,
                    failures: 1,
                }
            });
        fresh
    }

    /// 移出名单，返回成员此前是否在名单中。
    pub fn remove(&self, member: &MemberId) -> bool {
        self.entries.remove(member).is_some()
    }

    pub fn contains(&self, member: &MemberId) -> bool {
        self.entries.contains_key(member)
    }

    pub fn entry(&self, member: &MemberId) -> Option<IgnoreEntry> {
        self.entries.get(member).map(|entry| *entry.value())
    }

    /// 被忽略成员是否到了重新查询的时间；不在名单中的成员总是返回 `true`。
    pub fn due_for_requery(&self, member: &MemberId, interval: Duration) -> bool {
        match self.entries.get(member) {
            Some(entry) => entry.last_attempt.elapsed() >= interval,
            None => true,
        }
    }

    /// 清空名单。
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// 只保留满足条件的成员。
    pub fn retain(&self, mut keep: impl FnMut(&MemberId) -> bool) {
        self.entries.retain(|member, _| keep(member));
    }

    /// 名单中的成员，按标识排序。
    pub fn members(&self) -> Vec<MemberId> {
        let mut members: Vec<MemberId> = self.entries.iter().map(|e| e.key().clone()).collect();
        members.sort();
        members
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_accumulate_until_removed() {
        let list = IgnoreList::new(true);
        let member = MemberId::new("node-b");
        assert!(list.record_failure(&member));
        assert!(!list.record_failure(&member));
        assert_eq!(list.entry(&member).map(|e| e.failures()), Some(2));
        assert!(list.remove(&member));
        assert!(list.is_empty());
    }

    #[test]
    fn disabled_list_stays_empty() {
        let list = IgnoreList::new(false);
        assert!(!list.record_failure(&MemberId::new("node-b")));
        assert!(list.is_empty());
    }

    #[test]
    fn requery_interval_gates_ignored_members() {
        let list = IgnoreList::new(true);
        let member = MemberId::new("node-b");
        list.record_failure(&member);
        assert!(!list.due_for_requery(&member, Duration::from_secs(60)));
        assert!(list.due_for_requery(&member, Duration::ZERO));
        assert!(list.due_for_requery(&MemberId::new("node-c"), Duration::from_secs(60)));
    }
}

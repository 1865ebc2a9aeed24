//! # 单命令一致性哈希环
//!
//! ## 核心意图（Why）
//! - 每个命令名一条环，只包含声明了该命令且负载因子大于零的成员；
//! - 成员在环上占据的位置数与其负载因子成正比，从而决定其在键空间中的概率质量。
//!
//! ## 实现说明（How）
//! - 环总位置数为 `resolution`（默认 1024），成员 `i` 的位置数为
//!   `max(1, round(lf_i × resolution / Σlf))`；
//! - 第 `slot` 个位置的坐标为 `strategy.hash("{member}|{command}|{slot}")`；
//! - 位置按 `(坐标, 成员标识)` 升序排列，坐标相同时以成员标识字典序裁决；
//! - 查找取第一个坐标不小于键坐标的位置，越过末尾则回绕到首位。

use std::collections::HashSet;

use spark_command_core::{Member, MemberId, RoutingStrategy};

/// 参与建环的成员及其负载因子。
#[derive(Clone, Debug)]
pub struct RingCandidate {
    pub member: Member,
    pub load_factor: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct RingEntry {
    hash: u64,
    candidate: usize,
}

/// 某个命令名的路由环，构建后不可变。
#[derive(Debug)]
pub struct CommandRing {
    command: String,
    candidates: Vec<RingCandidate>,
    entries: Vec<RingEntry>,
}

impl CommandRing {
    /// 以候选成员构建环；负载因子为零的候选被忽略。
    pub fn build(
        command: &str,
        candidates: Vec<RingCandidate>,
        resolution: u32,
        strategy: &dyn RoutingStrategy,
    ) -> Self {
        let mut candidates: Vec<RingCandidate> = candidates
            .into_iter()
            .filter(|candidate| candidate.load_factor > 0)
            .collect();
        candidates.sort_by(|left, right| left.member.id().cmp(right.member.id()));

        let total: u64 = candidates.iter().map(|c| u64::from(c.load_factor)).sum();
        let resolution = u64::from(resolution.max(1));
        let mut entries = Vec::with_capacity(resolution as usize + candidates.len());
        for (index, candidate) in candidates.iter().enumerate() {
            let positions = positions_for(candidate.load_factor, total, resolution);
            for slot in 0..positions {
                let label = format!("{}|{}|{}", candidate.member.id(), command, slot);
                entries.push(RingEntry {
                    hash: strategy.hash(label.as_bytes()),
                    candidate: index,
                });
            }
        }
        // 候选已按成员标识排序，下标顺序即成员标识顺序。
        entries.sort_unstable();

        Self {
            command: command.to_owned(),
            candidates,
            entries,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 环上的位置总数。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 环上的成员，按标识排序。
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.candidates.iter().map(|candidate| &candidate.member)
    }

    /// 某个成员占据的位置数。
    pub fn positions_of(&self, member: &MemberId) -> usize {
        match self
            .candidates
            .iter()
            .position(|candidate| candidate.member.id() == member)
        {
            Some(index) => self.entries.iter().filter(|e| e.candidate == index).count(),
            None => 0,
        }
    }

    /// 候选指纹：成员标识与负载因子。指纹相同的两条环完全相同。
    pub fn fingerprint(&self) -> Vec<(MemberId, u32)> {
        fingerprint_of(&self.candidates)
    }

    /// 顺时针查找键坐标对应的成员。
    pub fn resolve(&self, key_hash: u64) -> Option<&Member> {
        self.resolve_excluding(key_hash, &HashSet::new())
    }

    /// 顺时针查找，跳过 `excluded` 中的成员。
    pub fn resolve_excluding(&self, key_hash: u64, excluded: &HashSet<MemberId>) -> Option<&Member> {
        if self.entries.is_empty() {
            return None;
        }
        let start = self.entries.partition_point(|entry| entry.hash < key_hash);
        let len = self.entries.len();
        (0..len)
            .map(|offset| &self.candidates[self.entries[(start + offset) % len].candidate].member)
            .find(|member| !excluded.contains(member.id()))
    }
}

/// `max(1, round(lf × resolution / total))`，四舍五入取半进一。
fn positions_for(load_factor: u32, total: u64, resolution: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    let scaled = u64::from(load_factor) * resolution * 2 + total;
    (scaled / (2 * total)).max(1)
}

pub(crate) fn fingerprint_of(candidates: &[RingCandidate]) -> Vec<(MemberId, u32)> {
    let mut fingerprint: Vec<(MemberId, u32)> = candidates
        .iter()
        .filter(|candidate| candidate.load_factor > 0)
        .map(|candidate| (candidate.member.id().clone(), candidate.load_factor))
        .collect();
    fingerprint.sort();
    fingerprint
}

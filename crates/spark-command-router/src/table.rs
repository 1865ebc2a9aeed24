use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use spark_command_core::{Capability, Member, MemberId, RoutingStrategy};

use crate::ring::{CommandRing, RingCandidate, fingerprint_of};

/// 单个快照内按需记忆的通配命令环上限，超出后每次解析都临时建环。
pub const MAX_LAZY_RINGS: usize = 256;

/// 参与路由的成员及其能力。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutedMember {
    pub member: Member,
    pub capability: Capability,
}

/// 路由表快照。
///
/// # 教案式说明
/// - **意图 (Why)**：路由表是 `{成员 → 能力}` 快照与路由策略的纯函数，整表构建后以原子替换发布，
///   读者永远只看到某一个完整版本；
/// - **逻辑 (How)**：
///   - 构建时为所有精确命令名预先建环，并复用上一版本中候选指纹相同的环；
///   - 只被通配模式覆盖的命令名在首次解析时按需建环，结果记忆在本快照内；
///   - 记忆化只是缓存，任何时刻得到的环都只取决于快照本身，因此不破坏确定性；
///   - 按需记忆的环至多 [`MAX_LAZY_RINGS`] 个，快照在稳定集群中长期存活时内存仍有界；
/// - **契约 (What)**：`revision` 单调递增；同一快照内相同 `(命令名, 键坐标)` 总是解析到同一成员。
pub struct RoutingTable {
    revision: u64,
    resolution: u32,
    strategy: Arc<dyn RoutingStrategy>,
    members: BTreeMap<MemberId, RoutedMember>,
    rings: DashMap<String, Arc<CommandRing>>,
    eager: usize,
}

impl RoutingTable {
    /// 空表，用于路由器初始化。
    pub fn empty(strategy: Arc<dyn RoutingStrategy>, resolution: u32) -> Self {
        Self {
            revision: 0,
            resolution,
            strategy,
            members: BTreeMap::new(),
            rings: DashMap::new(),
            eager: 0,
        }
    }

    /// 以成员能力快照构建新表，尽量复用 `previous` 中未变化的环。
    pub fn build(
        revision: u64,
        members: BTreeMap<MemberId, RoutedMember>,
        previous: &RoutingTable,
    ) -> Self {
        let mut table = Self {
            revision,
            resolution: previous.resolution,
            strategy: Arc::clone(&previous.strategy),
            members,
            rings: DashMap::new(),
            eager: 0,
        };
        let exact_names: HashSet<&str> = table
            .members
            .values()
            .filter(|routed| routed.capability.is_routable())
            .flat_map(|routed| routed.capability.patterns())
            .filter_map(|pattern| pattern.exact_name())
            .collect();
        for name in exact_names {
            let candidates = table.candidates(name);
            let fingerprint = fingerprint_of(&candidates);
            let reusable = previous
                .rings
                .get(name)
                .filter(|ring| {
                    ring.fingerprint() == fingerprint && same_members(ring.value(), &candidates)
                })
                .map(|ring| Arc::clone(ring.value()));
            let ring = match reusable {
                Some(ring) => ring,
                None => Arc::new(CommandRing::build(
                    name,
                    candidates,
                    table.resolution,
                    table.strategy.as_ref(),
                )),
            };
            table.rings.insert(name.to_owned(), ring);
        }
        table.eager = table.rings.len();
        table
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn strategy(&self) -> &Arc<dyn RoutingStrategy> {
        &self.strategy
    }

    /// 参与路由的全部成员。
    pub fn members(&self) -> impl Iterator<Item = &RoutedMember> {
        self.members.values()
    }

    pub fn member(&self, id: &MemberId) -> Option<&RoutedMember> {
        self.members.get(id)
    }

    /// 命令名对应的环；无人声明时返回空环。
    pub fn ring(&self, command: &str) -> Arc<CommandRing> {
        if let Some(ring) = self.rings.get(command) {
            return Arc::clone(ring.value());
        }
        let ring = Arc::new(CommandRing::build(
            command,
            self.candidates(command),
            self.resolution,
            self.strategy.as_ref(),
        ));
        // 无人处理的命令名不记忆，避免任意命令名撑大快照。
        if ring.is_empty() || self.rings.len() >= self.eager + MAX_LAZY_RINGS {
            return ring;
        }
        Arc::clone(
            self.rings
                .entry(command.to_owned())
                .or_insert(ring)
                .value(),
        )
    }

    /// 能以大于零的负载因子处理该命令的成员，按标识排序。
    pub fn members_for(&self, command: &str) -> Vec<Member> {
        self.ring(command).members().cloned().collect()
    }

    /// 在本快照中解析键坐标，跳过 `excluded` 中的成员。
    pub fn resolve(
        &self,
        command: &str,
        key_hash: u64,
        excluded: &HashSet<MemberId>,
    ) -> Option<Member> {
        self.ring(command)
            .resolve_excluding(key_hash, excluded)
            .cloned()
    }

    fn candidates(&self, command: &str) -> Vec<RingCandidate> {
        self.members
            .values()
            .filter(|routed| {
                routed.capability.is_routable() && routed.capability.handles(command)
            })
            .map(|routed| RingCandidate {
                member: routed.member.clone(),
                load_factor: routed.capability.load_factor(),
            })
            .collect()
    }
}

/// 指纹相同但端点变化时也要重建，环里存放的是完整成员值。
fn same_members(ring: &CommandRing, candidates: &[RingCandidate]) -> bool {
    ring.members().all(|member| {
        candidates
            .iter()
            .any(|candidate| candidate.member == *member)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spark_command_core::{CommandPattern, Endpoint, HashRoutingStrategy};

    fn routed(id: &str, capability: Capability) -> (MemberId, RoutedMember) {
        (
            MemberId::new(id),
            RoutedMember {
                member: Member::new(id, Endpoint::new("127.0.0.1", 7000)),
                capability,
            },
        )
    }

    fn empty() -> RoutingTable {
        RoutingTable::empty(Arc::new(HashRoutingStrategy::default()), 1024)
    }

    #[test]
    fn unchanged_rings_are_reused_across_revisions() {
        let ship = Capability::new(1).with_pattern(CommandPattern::exact("Ship"));
        let first = RoutingTable::build(
            1,
            [routed("node-a", ship.clone()), routed("node-b", ship.clone())].into(),
            &empty(),
        );
        let unload = Capability::new(1)
            .with_pattern(CommandPattern::exact("Ship"))
            .with_pattern(CommandPattern::exact("Unload"));
        let second = RoutingTable::build(
            2,
            [routed("node-a", ship.clone()), routed("node-b", unload)].into(),
            &first,
        );
        assert!(Arc::ptr_eq(&first.ring("Ship"), &second.ring("Ship")));

        let third = RoutingTable::build(
            3,
            [
                routed("node-a", ship.clone().with_load_factor(3)),
                routed("node-b", ship),
            ]
            .into(),
            &second,
        );
        assert!(!Arc::ptr_eq(&second.ring("Ship"), &third.ring("Ship")));
    }

    #[test]
    fn wildcard_commands_get_rings_on_demand() {
        let table = RoutingTable::build(
            1,
            [routed(
                "node-a",
                Capability::new(1).with_patterns(["orders.*"]).unwrap(),
            )]
            .into(),
            &empty(),
        );
        let members = table.members_for("orders.Cancel");
        assert_eq!(members.len(), 1);
        assert!(table.members_for("billing.Charge").is_empty());
        assert!(Arc::ptr_eq(
            &table.ring("orders.Cancel"),
            &table.ring("orders.Cancel")
        ));
    }

    #[test]
    fn on_demand_rings_stay_bounded() {
        let table = RoutingTable::build(
            1,
            [routed(
                "node-a",
                Capability::new(1)
                    .with_pattern(CommandPattern::exact("Ship"))
                    .with_pattern(CommandPattern::Any),
            )]
            .into(),
            &empty(),
        );
        for i in 0..MAX_LAZY_RINGS * 4 {
            assert_eq!(table.members_for(&format!("Cmd{i}")).len(), 1);
        }
        assert_eq!(table.rings.len(), 1 + MAX_LAZY_RINGS);

        let overflow = format!("Cmd{}", MAX_LAZY_RINGS * 4);
        assert!(!Arc::ptr_eq(&table.ring(&overflow), &table.ring(&overflow)));
        assert_eq!(table.ring(&overflow).members().count(), 1);
        assert!(Arc::ptr_eq(&table.ring("Ship"), &table.ring("Ship")));
    }

    #[test]
    fn drained_members_take_no_ring_positions() {
        let table = RoutingTable::build(
            1,
            [
                routed(
                    "node-a",
                    Capability::new(0).with_pattern(CommandPattern::exact("Ship")),
                ),
                routed(
                    "node-b",
                    Capability::new(1).with_pattern(CommandPattern::exact("Ship")),
                ),
            ]
            .into(),
            &empty(),
        );
        let members = table.members_for("Ship");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id().as_str(), "node-b");
    }
}

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use arc_swap::ArcSwap;
use futures::future::join_all;
use spark_command_core::{
    Capability, ClusterMembership, CommandMessage, CommandSerializer, ConfigError,
    DistributedCommandBusSettings, Member, MemberId, RoutingStrategy, Transport,
};
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::discovery::{CapabilityDiscoveryMode, CapabilityQuery};
use crate::error::{DiscoveryError, ResolveError};
use crate::registry::LocalCapabilities;
use crate::table::{RoutedMember, RoutingTable};

const UNINITIALIZED: u8 = 0;
const READY: u8 = 1;
const REBUILDING: u8 = 2;

/// 路由器生命周期状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouterState {
    /// 尚未完成首次重建，所有解析都返回 `NoCapableMember`。
    Uninitialized,
    /// 路由表可用。
    Ready,
    /// 正在重建；读者继续使用上一张完整的路由表。
    Rebuilding,
}

#[derive(Debug, Default)]
struct RebuildInputs {
    members: BTreeMap<MemberId, Member>,
    pushed: BTreeMap<MemberId, Capability>,
}

/// 命令路由器。
///
/// # 设计动机（Why）
/// - **读路径零锁**：路由表由 [`ArcSwap`] 持有，`resolve` 只需 `load` 一次快照；
/// - **写路径串行**：重建由 `tokio::sync::Mutex` 串行化，按调用顺序生效，
///   互斥锁公平排队保证顺序到达的成员事件按观测顺序应用；
/// - **整表替换**：新表构建完成后一次 `store`，读者不会观察到半成品。
///
/// # 行为概览（How）
/// 1. `update_membership` / `update_member_capabilities` 更新重建输入；
/// 2. 对未被显式推送能力的成员并发发起能力查询（每个查询自带超时）；
/// 3. 查询不可用的成员被跳过并记录告警，其余成员组成新快照；
/// 4. [`RoutingTable::build`] 构建新表（复用未变化的环），原子替换并递增修订号。
///
/// # 使用契约（What）
/// - `resolve` 对固定快照与非空路由键是确定的；
/// - 负载因子为零的成员永不被选中；
/// - `update_load_factor(0)` 只影响新命令，不触碰已在途的分发。
pub struct CommandRouter {
    local: Member,
    registry: LocalCapabilities,
    discovery: CapabilityDiscoveryMode,
    table: ArcSwap<RoutingTable>,
    state: AtomicU8,
    inputs: Mutex<RebuildInputs>,
}

impl CommandRouter {
    pub fn new(
        local: Member,
        registry: LocalCapabilities,
        discovery: CapabilityDiscoveryMode,
        strategy: Arc<dyn RoutingStrategy>,
        ring_resolution: u32,
    ) -> Self {
        Self {
            local,
            registry,
            discovery,
            table: ArcSwap::from_pointee(RoutingTable::empty(strategy, ring_resolution)),
            state: AtomicU8::new(UNINITIALIZED),
            inputs: Mutex::new(RebuildInputs::default()),
        }
    }

    /// 按配置装配路由器：发现模式、路由策略、环分辨率与本地负载因子。
    pub fn from_settings(
        settings: &DistributedCommandBusSettings,
        membership: Arc<dyn ClusterMembership>,
        transport: Arc<dyn Transport>,
        serializer: Arc<dyn CommandSerializer>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let local = membership.local_member();
        let discovery = CapabilityDiscoveryMode::from_settings(
            &settings.discovery,
            membership,
            transport,
            serializer,
        )?;
        let strategy = Arc::new(settings.routing.strategy()?);
        Ok(Self::new(
            local,
            LocalCapabilities::new(settings.load_factor),
            discovery,
            strategy,
            settings.routing.ring_resolution,
        ))
    }

    pub fn local_member(&self) -> &Member {
        &self.local
    }

    /// 本地能力登记表。
    pub fn registry(&self) -> &LocalCapabilities {
        &self.registry
    }

    pub fn discovery(&self) -> &CapabilityDiscoveryMode {
        &self.discovery
    }

    pub fn state(&self) -> RouterState {
        match self.state.load(Ordering::Acquire) {
            READY => RouterState::Ready,
            REBUILDING => RouterState::Rebuilding,
            _ => RouterState::Uninitialized,
        }
    }

    /// 当前路由表的修订号，首次重建后为 1。
    pub fn revision(&self) -> u64 {
        self.table.load().revision()
    }

    /// 当前路由表快照。
    pub fn table(&self) -> Arc<RoutingTable> {
        self.table.load_full()
    }

    /// 当前能处理该命令的成员。
    pub fn members_for(&self, command_name: &str) -> Vec<Member> {
        self.table.load().members_for(command_name)
    }

    /// 解析命令名与路由键对应的成员。
    pub fn resolve(
        &self,
        command_name: &str,
        routing_key: Option<&str>,
    ) -> Result<Member, ResolveError> {
        self.resolve_with(command_name, routing_key, &HashSet::new())
    }

    /// 解析命令消息对应的成员。
    pub fn resolve_command(&self, command: &CommandMessage) -> Result<Member, ResolveError> {
        self.resolve(command.command_name(), command.routing_key())
    }

    /// 顺时针跳过 `excluded` 中的成员，供换节点重试使用。
    pub fn resolve_excluding(
        &self,
        command: &CommandMessage,
        excluded: &HashSet<MemberId>,
    ) -> Result<Member, ResolveError> {
        self.resolve_with(command.command_name(), command.routing_key(), excluded)
    }

    fn resolve_with(
        &self,
        command_name: &str,
        routing_key: Option<&str>,
        excluded: &HashSet<MemberId>,
    ) -> Result<Member, ResolveError> {
        let table = self.table.load();
        let key_hash = table.strategy().route(routing_key)?;
        table
            .resolve(command_name, key_hash, excluded)
            .ok_or_else(|| ResolveError::NoCapableMember {
                command: command_name.to_owned(),
            })
    }

    /// 以当前成员集合重建路由表。
    ///
    /// - 已离开成员的显式推送能力、能力缓存与忽略记录一并丢弃；
    /// - 成员值（端点或元数据）发生变化时，其显式推送的能力失效，回落到能力发现。
    pub async fn update_membership(&self, members: Vec<Member>) {
        let mut guard = self.inputs.lock().await;
        let inputs = &mut *guard;
        let next: BTreeMap<MemberId, Member> = members
            .into_iter()
            .map(|member| (member.id().clone(), member))
            .collect();
        let previous = std::mem::replace(&mut inputs.members, next);
        let current = &inputs.members;
        inputs
            .pushed
            .retain(|id, _| match (previous.get(id), current.get(id)) {
                (Some(before), Some(after)) => before == after,
                (None, Some(_)) => true,
                _ => false,
            });
        let ids: HashSet<MemberId> = inputs.members.keys().cloned().collect();
        self.discovery.retain_members(&ids);
        self.rebuild(inputs).await;
    }

    /// 直接采用某个成员推送来的能力并重建。
    pub async fn update_member_capabilities(&self, member: Member, capability: Capability) {
        let mut inputs = self.inputs.lock().await;
        let id = member.id().clone();
        inputs.members.insert(id.clone(), member);
        inputs.pushed.insert(id, capability);
        self.rebuild(&inputs).await;
    }

    /// 发布本地能力并在本地立即生效。
    ///
    /// 快照、发布与重建都在重建锁内完成，并发发布按取锁顺序生效，最后一次总是看到最新注册表。
    pub async fn publish_local_capabilities(&self) -> Result<(), DiscoveryError> {
        let mut inputs = self.inputs.lock().await;
        let capability = self.registry.snapshot();
        self.discovery.publish_local_capabilities(&capability)?;
        let id = self.local.id().clone();
        inputs
            .members
            .entry(id.clone())
            .or_insert_with(|| self.local.clone());
        inputs.pushed.insert(id, capability);
        self.rebuild(&inputs).await;
        Ok(())
    }

    /// 更新本地负载因子：重新发布能力并本地重建。
    ///
    /// - `0` 表示不再接收新命令；已在途的分发不受影响。
    pub async fn update_load_factor(&self, load_factor: u32) -> Result<(), DiscoveryError> {
        let previous = self.registry.set_load_factor(load_factor);
        tracing::info!(member = %self.local.id(), previous, load_factor, "local load factor updated");
        self.publish_local_capabilities().await
    }

    /// 以现有输入重新查询并重建。
    pub async fn refresh(&self) {
        let inputs = self.inputs.lock().await;
        self.rebuild(&inputs).await;
    }

    /// 当前被忽略的成员。
    pub fn ignored_members(&self) -> Vec<MemberId> {
        self.discovery.ignored_members()
    }

    /// 清空忽略名单并重建。
    pub async fn reset_ignore_list(&self) {
        self.discovery.reset_ignore_list();
        self.refresh().await;
    }

    /// 将单个成员移出忽略名单并重建。
    pub async fn remove_from_ignore_list(&self, member: &MemberId) {
        if self.discovery.remove_from_ignore_list(member) {
            self.refresh().await;
        }
    }

    async fn rebuild(&self, inputs: &RebuildInputs) {
        self.state.store(REBUILDING, Ordering::Release);

        let discovery = &self.discovery;
        let queries = inputs
            .members
            .values()
            .filter(|member| !inputs.pushed.contains_key(member.id()))
            .map(|member| async move { (member, discovery.query_capabilities(member).await) });
        let answers = join_all(queries).await;

        let mut routed = BTreeMap::new();
        for (id, capability) in &inputs.pushed {
            if let Some(member) = inputs.members.get(id) {
                routed.insert(
                    id.clone(),
                    RoutedMember {
                        member: member.clone(),
                        capability: capability.clone(),
                    },
                );
            }
        }
        for (member, answer) in answers {
            match answer {
                CapabilityQuery::Available(capability) => {
                    routed.insert(
                        member.id().clone(),
                        RoutedMember {
                            member: member.clone(),
                            capability,
                        },
                    );
                }
                CapabilityQuery::NotAvailable(reason) => {
                    tracing::warn!(member = %member.id(), reason = %reason, "member skipped during routing table rebuild");
                }
            }
        }

        let previous = self.table.load_full();
        let next = RoutingTable::build(previous.revision() + 1, routed, &previous);
        let revision = next.revision();
        let routed_members = next.members().count();
        self.table.store(Arc::new(next));
        self.state.store(READY, Ordering::Release);
        tracing::debug!(revision, members = routed_members, "routing table rebuilt");
    }

    /// 在后台任务中按顺序消费成员关系事件。
    ///
    /// - 启动时先以全量成员视图重建一次；
    /// - 每个事件先交给能力发现维护缓存，再以最新成员视图重建；
    /// - 订阅滞后时以全量视图兜底；成员关系协作方关闭后任务退出。
    pub fn spawn_membership_listener(
        self: &Arc<Self>,
        membership: Arc<dyn ClusterMembership>,
    ) -> JoinHandle<()> {
        let router = Arc::clone(self);
        let mut events = membership.subscribe();
        tokio::spawn(async move {
            router.update_membership(membership.members()).await;
            loop {
                match events.recv().await {
                    Ok(event) => {
                        tracing::trace!(member = %event.member().id(), ?event, "membership event");
                        router.discovery.on_membership_event(&event);
                        router.update_membership(membership.members()).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "membership events lagged, rebuilding from the full view");
                        router.update_membership(membership.members()).await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

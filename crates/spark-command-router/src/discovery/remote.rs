use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use bytes::Bytes;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use spark_command_core::{
    Capability, CapabilityObservation, CapabilityState, ClusterMembership, CommandSerializer,
    DiscoverySettings, Member, MemberId, MembershipEvent, Transport, TransportError,
    TransportRequest,
};

use super::ignore::IgnoreList;
use super::{CapabilityQuery, NotAvailableReason};
use crate::error::DiscoveryError;

/// 本地能力摘要的成员元数据键；对端据此感知能力变化并使缓存过期。
pub const CAPABILITY_DIGEST_METADATA_KEY: &str = "spark.command.capability.digest";

/// 远程查询模式的可调参数。
#[derive(Clone, Debug)]
pub struct RemoteQueryOptions {
    pub capabilities_path: String,
    pub query_timeout: Duration,
    pub ignore_listing: bool,
    pub ignore_requery_interval: Duration,
}

impl From<&DiscoverySettings> for RemoteQueryOptions {
    fn from(settings: &DiscoverySettings) -> Self {
        Self {
            capabilities_path: settings.capabilities_path.clone(),
            query_timeout: settings.query_timeout(),
            ignore_listing: !settings.disable_ignore_listing,
            ignore_requery_interval: settings.ignore_requery_interval(),
        }
    }
}

/// 按需向对端能力端点查询的发现模式。
///
/// # 教案式说明
/// - **意图 (Why)**：能力描述可能很大，或成员关系协作方不支持元数据；此时改为点对点查询；
/// - **逻辑 (How)**：
///   1. 本地成员直接返回最近一次发布的能力；
///   2. 被忽略的成员在未到重新查询时间前直接返回 `NotAvailable(Ignored)`；
///   3. 缓存中状态为 `Valid` 的观测直接复用；`Stale` 或缺失时发起网络查询；
///   4. 成功：写入 `Valid` 观测并移出忽略名单；失败：记入忽略名单并写入 `Ignored` 观测，
///      忽略名单关闭时只移除缓存。
/// - **契约 (What)**：
///   - 每次查询由本层以 `query_timeout` 计时，不依赖传输实现自行超时；
///   - “没有本地处理器”是成功的空能力，与查询失败严格区分；
///   - 发现失败从不向命令调用方传播，只影响路由表成员集合。
/// - **风险 (Trade-offs)**：缓存依赖元数据更新事件失效；本地发布时会写入能力摘要，
///   保证对端在能力变化后收到 `MetadataUpdated`。
pub struct RemoteQueryDiscovery {
    local: MemberId,
    membership: Arc<dyn ClusterMembership>,
    transport: Arc<dyn Transport>,
    serializer: Arc<dyn CommandSerializer>,
    options: RemoteQueryOptions,
    ignore: IgnoreList,
    cache: DashMap<MemberId, CapabilityObservation>,
    published: ArcSwap<Capability>,
}

impl RemoteQueryDiscovery {
    pub fn new(
        membership: Arc<dyn ClusterMembership>,
        transport: Arc<dyn Transport>,
        serializer: Arc<dyn CommandSerializer>,
        options: RemoteQueryOptions,
    ) -> Self {
        let local = membership.local_member().id().clone();
        Self {
            local,
            membership,
            transport,
            serializer,
            ignore: IgnoreList::new(options.ignore_listing),
            options,
            cache: DashMap::new(),
            published: ArcSwap::from_pointee(Capability::default()),
        }
    }

    pub async fn query_capabilities(&self, member: &Member) -> CapabilityQuery {
        let id = member.id();
        if *id == self.local {
            return CapabilityQuery::Available(self.published.load().as_ref().clone());
        }
        if self.ignore.contains(id)
            && !self
                .ignore
                .due_for_requery(id, self.options.ignore_requery_interval)
        {
            return CapabilityQuery::NotAvailable(NotAvailableReason::Ignored);
        }
        if let Some(observation) = self.cache.get(id)
            && observation.state() == CapabilityState::Valid
            && let Some(capability) = observation.capability()
        {
            return CapabilityQuery::Available(capability.clone());
        }

        match self.fetch(member).await {
            Ok(capability) => {
                self.cache.insert(
                    id.clone(),
                    CapabilityObservation::valid(id.clone(), capability.clone()),
                );
                if self.ignore.remove(id) {
                    tracing::info!(member = %id, "capability query succeeded, member re-included");
                }
                CapabilityQuery::Available(capability)
            }
            Err(detail) => {
                let format = self.serializer.format();
                if self.ignore.record_failure(id) {
                    tracing::warn!(member = %id, format, error = %detail, "capability query failed, member ignore-listed");
                } else {
                    tracing::debug!(member = %id, format, error = %detail, "capability query failed");
                }
                if self.ignore.contains(id) {
                    self.cache
                        .insert(id.clone(), CapabilityObservation::ignored(id.clone()));
                } else {
                    self.cache.remove(id);
                }
                CapabilityQuery::NotAvailable(NotAvailableReason::QueryFailed(detail))
            }
        }
    }

    async fn fetch(&self, member: &Member) -> Result<Capability, String> {
        let request = TransportRequest::new(self.options.capabilities_path.clone(), Bytes::new());
        let endpoint = member.endpoint();
        let limit = self.options.query_timeout;
        // 时限由本层强制，不依赖传输实现。
        let response = match tokio::time::timeout(
            limit,
            self.transport.request(endpoint, request, limit),
        )
        .await
        {
            Ok(response) => response,
            Err(_) => Err(TransportError::Timeout {
                endpoint: endpoint.to_string(),
                after: limit,
            }),
        };
        let body = response
            .and_then(|response| response.into_success(endpoint))
            .map_err(|err| err.to_string())?;
        self.serializer
            .deserialize_capability(&body)
            .map_err(|err| err.to_string())
    }

    pub fn publish_local_capabilities(&self, capability: &Capability) -> Result<(), DiscoveryError> {
        let payload = self.serializer.serialize_capability(capability)?;
        let digest = Sha256::digest(&payload);
        let mut entries = BTreeMap::new();
        entries.insert(
            CAPABILITY_DIGEST_METADATA_KEY.to_owned(),
            hex::encode(&digest[..8]),
        );
        self.published.store(Arc::new(capability.clone()));
        self.membership.publish_local_metadata(entries)?;
        Ok(())
    }

    pub fn on_membership_event(&self, event: &MembershipEvent) {
        match event {
            MembershipEvent::Joined(_) => {}
            MembershipEvent::MetadataUpdated(member) => {
                if let Some(mut observation) = self.cache.get_mut(member.id()) {
                    *observation = observation.clone().into_stale();
                }
            }
            MembershipEvent::Left(member) => {
                self.cache.remove(member.id());
                self.ignore.remove(member.id());
            }
        }
    }

    /// 丢弃不在当前成员集合中的缓存与忽略记录。
    pub fn retain_members(&self, members: &HashSet<MemberId>) {
        self.cache.retain(|id, _| members.contains(id));
        self.ignore.retain(|id| members.contains(id));
    }

    pub fn published(&self) -> Arc<Capability> {
        self.published.load_full()
    }

    pub fn ignore_list(&self) -> &IgnoreList {
        &self.ignore
    }

    /// 某个成员的缓存观测。
    pub fn observation(&self, member: &MemberId) -> Option<CapabilityObservation> {
        self.cache.get(member).map(|entry| entry.value().clone())
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use spark_command_core::{Capability, ClusterMembership, CommandSerializer, Member, MemberId};

use super::{CapabilityQuery, NotAvailableReason};
use crate::error::DiscoveryError;

/// 存放十六进制能力描述的成员元数据键。
pub const CAPABILITY_METADATA_KEY: &str = "spark.command.capability";

/// 能力随成员元数据发布的发现模式。
///
/// # 教案式说明
/// - **意图 (Why)**：成员关系协作方本就会把元数据同步到全部节点，能力搭便车即可，无需额外网络往返；
/// - **逻辑 (How)**：
///   - 发布：序列化能力 → 十六进制编码 → 写入本地成员元数据 [`CAPABILITY_METADATA_KEY`]；
///   - 查询：读取目标成员元数据并反向解码，不访问网络，不阻塞；本地成员直接返回最近一次发布的能力；
/// - **契约 (What)**：元数据缺失或无法解码时返回 `NotAvailable`；本模式没有忽略名单。
pub struct SimpleDiscovery {
    local: MemberId,
    membership: Arc<dyn ClusterMembership>,
    serializer: Arc<dyn CommandSerializer>,
    published: ArcSwap<Capability>,
}

impl SimpleDiscovery {
    pub fn new(
        membership: Arc<dyn ClusterMembership>,
        serializer: Arc<dyn CommandSerializer>,
    ) -> Self {
        let local = membership.local_member().id().clone();
        Self {
            local,
            membership,
            serializer,
            published: ArcSwap::from_pointee(Capability::default()),
        }
    }

    pub fn query_capabilities(&self, member: &Member) -> CapabilityQuery {
        if *member.id() == self.local {
            return CapabilityQuery::Available(self.published.load().as_ref().clone());
        }
        let Some(encoded) = member.metadata(CAPABILITY_METADATA_KEY) else {
            return CapabilityQuery::NotAvailable(NotAvailableReason::MissingMetadata);
        };
        let raw = match hex::decode(encoded) {
            Ok(raw) => raw,
            Err(err) => {
                return CapabilityQuery::NotAvailable(NotAvailableReason::Malformed(
                    err.to_string(),
                ));
            }
        };
        match self.serializer.deserialize_capability(&raw) {
            Ok(capability) => CapabilityQuery::Available(capability),
            Err(err) => {
                CapabilityQuery::NotAvailable(NotAvailableReason::Malformed(err.to_string()))
            }
        }
    }

    pub fn publish_local_capabilities(&self, capability: &Capability) -> Result<(), DiscoveryError> {
        let payload = self.serializer.serialize_capability(capability)?;
        let mut entries = BTreeMap::new();
        entries.insert(CAPABILITY_METADATA_KEY.to_owned(), hex::encode(&payload));
        self.membership.publish_local_metadata(entries)?;
        self.published.store(Arc::new(capability.clone()));
        Ok(())
    }

    pub fn published(&self) -> Arc<Capability> {
        self.published.load_full()
    }
}

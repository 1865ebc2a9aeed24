//! # 能力发现
//!
//! ## 核心意图（Why）
//! - 路由表需要知道“每个成员能处理哪些命令、负载因子多少”；
//! - 两种获取方式在部署上互斥，因此以带标签的枚举 [`CapabilityDiscoveryMode`] 在装配时选定。
//!
//! ## 行为契约（What）
//! - `query_capabilities` 返回 [`CapabilityQuery`]：`Available` 或带原因的 `NotAvailable`；
//! - `publish_local_capabilities` 把本地能力交给对应的传播渠道；
//! - `on_membership_event` 维护缓存新鲜度与忽略名单卫生；
//! - Simple 模式的忽略名单恒为空。

mod ignore;
mod remote;
mod simple;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use spark_command_core::{
    Capability, ClusterMembership, CommandSerializer, ConfigError, DiscoveryModeKind,
    DiscoverySettings, Member, MemberId, MembershipEvent, Transport,
};

use crate::error::DiscoveryError;

pub use ignore::{IgnoreEntry, IgnoreList};
pub use remote::{CAPABILITY_DIGEST_METADATA_KEY, RemoteQueryDiscovery, RemoteQueryOptions};
pub use simple::{CAPABILITY_METADATA_KEY, SimpleDiscovery};

/// 能力不可用的原因。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotAvailableReason {
    /// 成员元数据中没有能力描述。
    MissingMetadata,
    /// 能力描述无法解码。
    Malformed(String),
    /// 成员处于忽略名单中且尚未到重新查询时间。
    Ignored,
    /// 网络查询失败。
    QueryFailed(String),
}

impl fmt::Display for NotAvailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotAvailableReason::MissingMetadata => f.write_str("no capability metadata"),
            NotAvailableReason::Malformed(detail) => write!(f, "malformed capability: {detail}"),
            NotAvailableReason::Ignored => f.write_str("member is ignore-listed"),
            NotAvailableReason::QueryFailed(detail) => write!(f, "capability query failed: {detail}"),
        }
    }
}

/// 一次能力查询的结果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CapabilityQuery {
    Available(Capability),
    NotAvailable(NotAvailableReason),
}

/// 能力发现模式。
///
/// # 教案式说明
/// - **意图 (Why)**：发现模式在装配时确定且运行期不可切换，枚举比 trait 对象更直白，
///   也让路由器可以静态知道是否存在忽略名单；
/// - **契约 (What)**：全部方法可被并发调用；`query_capabilities` 在 Remote-Query 模式下
///   受查询超时约束，在 Simple 模式下立即返回。
pub enum CapabilityDiscoveryMode {
    Simple(SimpleDiscovery),
    RemoteQuery(RemoteQueryDiscovery),
}

impl CapabilityDiscoveryMode {
    /// 按配置选择发现模式。
    pub fn from_settings(
        settings: &DiscoverySettings,
        membership: Arc<dyn ClusterMembership>,
        transport: Arc<dyn Transport>,
        serializer: Arc<dyn CommandSerializer>,
    ) -> Result<Self, ConfigError> {
        Ok(match settings.mode()? {
            DiscoveryModeKind::Simple => {
                CapabilityDiscoveryMode::Simple(SimpleDiscovery::new(membership, serializer))
            }
            DiscoveryModeKind::RemoteQuery => {
                CapabilityDiscoveryMode::RemoteQuery(RemoteQueryDiscovery::new(
                    membership,
                    transport,
                    serializer,
                    RemoteQueryOptions::from(settings),
                ))
            }
        })
    }

    pub fn kind(&self) -> DiscoveryModeKind {
        match self {
            CapabilityDiscoveryMode::Simple(_) => DiscoveryModeKind::Simple,
            CapabilityDiscoveryMode::RemoteQuery(_) => DiscoveryModeKind::RemoteQuery,
        }
    }

    pub async fn query_capabilities(&self, member: &Member) -> CapabilityQuery {
        match self {
            CapabilityDiscoveryMode::Simple(mode) => mode.query_capabilities(member),
            CapabilityDiscoveryMode::RemoteQuery(mode) => mode.query_capabilities(member).await,
        }
    }

    pub fn publish_local_capabilities(&self, capability: &Capability) -> Result<(), DiscoveryError> {
        match self {
            CapabilityDiscoveryMode::Simple(mode) => mode.publish_local_capabilities(capability),
            CapabilityDiscoveryMode::RemoteQuery(mode) => {
                mode.publish_local_capabilities(capability)
            }
        }
    }

    /// 最近一次发布的本地能力，能力端点以此应答查询。
    pub fn local_capabilities(&self) -> Arc<Capability> {
        match self {
            CapabilityDiscoveryMode::Simple(mode) => mode.published(),
            CapabilityDiscoveryMode::RemoteQuery(mode) => mode.published(),
        }
    }

    pub fn on_membership_event(&self, event: &MembershipEvent) {
        if let CapabilityDiscoveryMode::RemoteQuery(mode) = self {
            mode.on_membership_event(event);
        }
    }

    /// 丢弃已离开成员的缓存与忽略记录。
    pub fn retain_members(&self, members: &HashSet<MemberId>) {
        if let CapabilityDiscoveryMode::RemoteQuery(mode) = self {
            mode.retain_members(members);
        }
    }

    /// 当前被忽略的成员。
    pub fn ignored_members(&self) -> Vec<MemberId> {
        match self {
            CapabilityDiscoveryMode::Simple(_) => Vec::new(),
            CapabilityDiscoveryMode::RemoteQuery(mode) => mode.ignore_list().members(),
        }
    }

    pub fn is_ignored(&self, member: &MemberId) -> bool {
        match self {
            CapabilityDiscoveryMode::Simple(_) => false,
            CapabilityDiscoveryMode::RemoteQuery(mode) => mode.ignore_list().contains(member),
        }
    }

    /// 清空忽略名单，下一次重建会重新查询全部成员。
    pub fn reset_ignore_list(&self) {
        if let CapabilityDiscoveryMode::RemoteQuery(mode) = self {
            mode.ignore_list().clear();
        }
    }

    /// 将单个成员移出忽略名单，返回其此前是否在名单中。
    pub fn remove_from_ignore_list(&self, member: &MemberId) -> bool {
        match self {
            CapabilityDiscoveryMode::Simple(_) => false,
            CapabilityDiscoveryMode::RemoteQuery(mode) => mode.ignore_list().remove(member),
        }
    }
}

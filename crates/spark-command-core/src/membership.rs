//! # 成员关系协作方契约
//!
//! ## 核心意图（Why）
//! - 集群成员关系（注册中心、gossip 等）是外部黑盒，核心只需要“列出当前成员”与“订阅变更”；
//! - 唯一的写操作是发布**本地**成员的元数据，供 Simple 能力发现模式捎带能力描述。
//!
//! ## 行为契约（What）
//! - 事件按发生顺序投递；订阅方滞后过多时由 `broadcast` 报告 `Lagged`，调用方应以
//!   [`ClusterMembership::members`] 重新取全量快照；
//! - [`InMemoryMembership`] 是进程内实现，用于嵌入式部署与测试。

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::error::MembershipError;
use crate::member::{Member, MemberId};

const EVENT_BUFFER: usize = 256;

/// 成员关系变更事件。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MembershipEvent {
    /// 新成员加入。
    Joined(Member),
    /// 成员离开。
    Left(Member),
    /// 成员元数据更新。
    MetadataUpdated(Member),
}

impl MembershipEvent {
    /// 事件涉及的成员。
    pub fn member(&self) -> &Member {
        match self {
            MembershipEvent::Joined(member)
            | MembershipEvent::Left(member)
            | MembershipEvent::MetadataUpdated(member) => member,
        }
    }
}

/// 成员关系协作方。
pub trait ClusterMembership: Send + Sync + 'static {
    /// 本地成员的当前视图。
    fn local_member(&self) -> Member;

    /// 当前全部成员（包含本地成员），按标识排序。
    fn members(&self) -> Vec<Member>;

    /// 订阅后续变更。
    fn subscribe(&self) -> broadcast::Receiver<MembershipEvent>;

    /// 以覆盖语义写入本地成员的元数据条目。
    fn publish_local_metadata(
        &self,
        entries: BTreeMap<String, String>,
    ) -> Result<(), MembershipError>;
}

/// 进程内成员关系实现。
///
/// # 教案式注释
/// - **意图 (Why)**：为单进程多节点测试与嵌入式部署提供可控的成员视图；
/// - **逻辑 (How)**：成员表由 `RwLock<BTreeMap>` 保护，事件在持有写锁期间发送，
///   保证订阅方观察到的事件顺序与成员表的修改顺序一致；本地成员另存一份副本，
///   每次修改本地条目时在同一把写锁内同步；
/// - **契约 (What)**：`join` 对已存在的成员等价于元数据更新；`leave` 不允许移除本地成员。
#[derive(Debug)]
pub struct InMemoryMembership {
    local: MemberId,
    local_member: RwLock<Member>,
    members: RwLock<BTreeMap<MemberId, Member>>,
    events: broadcast::Sender<MembershipEvent>,
}

impl InMemoryMembership {
    /// 以本地成员初始化视图。
    pub fn new(local: Member) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let mut members = BTreeMap::new();
        let local_id = local.id().clone();
        members.insert(local_id.clone(), local.clone());
        Self {
            local: local_id,
            local_member: RwLock::new(local),
            members: RwLock::new(members),
            events,
        }
    }

    /// 加入或更新一个成员。
    pub fn join(&self, member: Member) {
        let mut members = self.members.write();
        let event = match members.insert(member.id().clone(), member.clone()) {
            Some(previous) if previous == member => return,
            Some(_) => MembershipEvent::MetadataUpdated(member),
            None => MembershipEvent::Joined(member),
        };
        if let MembershipEvent::MetadataUpdated(updated) = &event {
            self.sync_local(updated);
        }
        let _ = self.events.send(event);
    }

    /// 移除一个远端成员。
    pub fn leave(&self, member: &MemberId) -> Result<(), MembershipError> {
        if member == &self.local {
            return Err(MembershipError::UnknownMember {
                member: member.to_string(),
            });
        }
        let mut members = self.members.write();
        let removed = members
            .remove(member)
            .ok_or_else(|| MembershipError::UnknownMember {
                member: member.to_string(),
            })?;
        let _ = self.events.send(MembershipEvent::Left(removed));
        Ok(())
    }

    /// 更新任一成员的单条元数据。
    pub fn update_metadata(
        &self,
        member: &MemberId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), MembershipError> {
        let mut members = self.members.write();
        let entry = members
            .get_mut(member)
            .ok_or_else(|| MembershipError::UnknownMember {
                member: member.to_string(),
            })?;
        entry.metadata_mut().insert(key.into(), value.into());
        self.sync_local(entry);
        let _ = self
            .events
            .send(MembershipEvent::MetadataUpdated(entry.clone()));
        Ok(())
    }

    /// 按标识查找成员。
    pub fn member(&self, member: &MemberId) -> Option<Member> {
        self.members.read().get(member).cloned()
    }

    /// 调用方须持有成员表写锁。
    fn sync_local(&self, member: &Member) {
        if *member.id() == self.local {
            *self.local_member.write() = member.clone();
        }
    }
}

impl ClusterMembership for InMemoryMembership {
    fn local_member(&self) -> Member {
        self.local_member.read().clone()
    }

    fn members(&self) -> Vec<Member> {
        self.members.read().values().cloned().collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.events.subscribe()
    }

    fn publish_local_metadata(
        &self,
        entries: BTreeMap<String, String>,
    ) -> Result<(), MembershipError> {
        let mut members = self.members.write();
        let local = members
            .get_mut(&self.local)
            .ok_or_else(|| MembershipError::UnknownMember {
                member: self.local.to_string(),
            })?;
        let before = local.clone();
        local.metadata_mut().extend(entries);
        if *local != before {
            *self.local_member.write() = local.clone();
            let _ = self
                .events
                .send(MembershipEvent::MetadataUpdated(local.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::Endpoint;

    fn member(id: &str, port: u16) -> Member {
        Member::new(id, Endpoint::new("127.0.0.1", port))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn events_follow_mutation_order() {
        let membership = InMemoryMembership::new(member("local", 7000));
        let mut events = membership.subscribe();

        membership.join(member("node-b", 7001));
        membership
            .update_metadata(&MemberId::new("node-b"), "zone", "a")
            .unwrap();
        membership.leave(&MemberId::new("node-b")).unwrap();

        assert!(matches!(events.recv().await.unwrap(), MembershipEvent::Joined(m) if m.id().as_str() == "node-b"));
        assert!(matches!(events.recv().await.unwrap(), MembershipEvent::MetadataUpdated(m) if m.metadata("zone") == Some("a")));
        assert!(matches!(events.recv().await.unwrap(), MembershipEvent::Left(_)));
    }

    #[test]
    fn local_member_cannot_leave_and_rejoin_is_idempotent() {
        let membership = InMemoryMembership::new(member("local", 7000));
        assert!(membership.leave(&MemberId::new("local")).is_err());

        let mut events = membership.subscribe();
        membership.join(member("node-b", 7001));
        membership.join(member("node-b", 7001));
        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_err(), "identical re-join emits nothing");
        assert_eq!(membership.members().len(), 2);
    }

    #[test]
    fn publishing_local_metadata_updates_the_view() {
        let membership = InMemoryMembership::new(member("local", 7000));
        let mut entries = BTreeMap::new();
        entries.insert("spark.command.capability".to_owned(), "cafe".to_owned());
        membership.publish_local_metadata(entries).unwrap();
        assert_eq!(
            membership.local_member().metadata("spark.command.capability"),
            Some("cafe")
        );
    }

    #[test]
    fn local_member_tracks_every_update_path() {
        let membership = InMemoryMembership::new(member("local", 7000));
        membership
            .update_metadata(&MemberId::new("local"), "zone", "a")
            .unwrap();
        assert_eq!(membership.local_member().metadata("zone"), Some("a"));

        membership.join(member("local", 7100));
        let local = membership.local_member();
        assert_eq!(local.endpoint().port(), 7100);
        assert_eq!(local.metadata("zone"), None);
        assert_eq!(
            membership.member(&MemberId::new("local")),
            Some(local)
        );
    }
}

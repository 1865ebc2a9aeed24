#![doc = r#"
# spark-command-router

## 设计动机（Why）
- **定位**：把“谁能处理什么命令、能力多大”转化为“这条命令该发往哪个成员”；
- **架构角色**：消费 `spark-command-core` 的成员关系、序列化与传输契约，
  为 `spark-command-bus` 提供 [`CommandRouter::resolve`]；
- **设计理念**：路由表是成员能力快照与路由策略的纯函数，读路径零锁、写路径整表替换。

## 核心契约（What）
- [`discovery`]：Simple / Remote-Query 两种能力发现模式，后者带缓存与忽略名单；
- [`registry`]：本地能力登记表；
- [`ring`]：单命令一致性哈希环，位置数按负载因子归一化；
- [`table`]：不可变路由表快照；
- [`router`]：重建编排、解析与成员关系监听。

## 风险与考量（Trade-offs）
- 重建需要等待全部能力查询完成（每个查询有界），慢成员会推迟新表生效，但不会阻塞读者；
- 负载因子只决定键空间上的概率质量，具体某个键落到哪个成员由哈希决定。
"#]

pub mod discovery;
pub mod error;
pub mod registry;
pub mod ring;
pub mod router;
pub mod table;

pub use discovery::{
    CAPABILITY_DIGEST_METADATA_KEY, CAPABILITY_METADATA_KEY, CapabilityDiscoveryMode,
    CapabilityQuery, IgnoreList, NotAvailableReason, RemoteQueryDiscovery, RemoteQueryOptions,
    SimpleDiscovery,
};
pub use error::{DiscoveryError, ResolveError};
pub use registry::LocalCapabilities;
pub use ring::{CommandRing, RingCandidate};
pub use router::{CommandRouter, RouterState};
pub use table::{RoutedMember, RoutingTable};

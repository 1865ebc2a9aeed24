use std::sync::Arc;

use parking_lot::RwLock;
use spark_command_core::{Capability, CommandPattern};

/// `LocalCapabilities` 充当本地成员的能力登记表。
///
/// # 教案式解读
/// - **意图（Why）**：
///   - 本地处理器注册/注销时需要一个单一事实来源，供能力发现发布与路由表重建读取；
///   - 负载因子与模式集合一起发布，二者的修改都必须整体可见。
/// - **实现策略（How）**：
///   - 内部持有 `Arc<RwLock<Capability>>`，写路径短小，读路径以 `snapshot` 复制出一份不可变能力；
///   - 克隆 `LocalCapabilities` 共享同一张表。
///
/// # 契约说明
/// - **后置条件**：
///   - `register`/`unregister` 返回是否真正改变了模式集合，调用方据此决定是否重新发布；
///   - 修改不会自动发布，发布由路由器的 `publish_local_capabilities` 负责。
#[derive(Clone, Debug)]
pub struct LocalCapabilities {
    inner: Arc<RwLock<Capability>>,
}

impl LocalCapabilities {
    #[must_use]
    pub fn new(load_factor: u32) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Capability::new(load_factor))),
        }
    }

    /// 登记一个本地可处理的命令模式。
    pub fn register(&self, pattern: CommandPattern) -> bool {
        self.inner.write().insert_pattern(pattern)
    }

    /// 注销一个命令模式。
    pub fn unregister(&self, pattern: &CommandPattern) -> bool {
        self.inner.write().remove_pattern(pattern)
    }

    /// 更新负载因子，返回旧值。
    pub fn set_load_factor(&self, load_factor: u32) -> u32 {
        let mut capability = self.inner.write();
        let previous = capability.load_factor();
        capability.set_load_factor(load_factor);
        previous
    }

    pub fn load_factor(&self) -> u32 {
        self.inner.read().load_factor()
    }

    /// 当前能力的不可变快照。
    pub fn snapshot(&self) -> Capability {
        self.inner.read().clone()
    }
}

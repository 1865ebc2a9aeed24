use std::io;
use std::time::Duration;

use socket2::SockRef;
use tokio::net::TcpStream;

/// 每条 TCP 连接（入站与出站）建立后应用的套接字选项。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 命令分发是小包往返，默认关闭 Nagle 算法以免应答被延迟合并；
/// - `SO_LINGER` 决定关闭阶段是否等待发送缓冲区排空，显式配置化后调用方无需直接操作 `socket2`。
///
/// ## 契约（What）
/// - `nodelay` 默认 `true`；`linger` 默认 `None`（遵循内核默认策略）；
/// - `apply` 失败时连接不会被使用，错误由调用方映射为传输错误。
///
/// ## 注意事项（Trade-offs）
/// - `SO_LINGER` 在不同平台的精度不同（Linux 取整到秒）；设置过小可能丢弃仍在发送缓冲区的应答。
#[derive(Clone, Debug)]
pub struct TcpSocketConfig {
    nodelay: bool,
    linger: Option<Duration>,
}

impl Default for TcpSocketConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpSocketConfig {
    pub const fn new() -> Self {
        Self {
            nodelay: true,
            linger: None,
        }
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// 设置 `SO_LINGER` 超时时长。
    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger = linger;
        self
    }

    pub fn nodelay(&self) -> bool {
        self.nodelay
    }

    pub fn linger(&self) -> Option<Duration> {
        self.linger
    }

    pub(crate) fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(self.nodelay)?;
        SockRef::from(stream).set_linger(self.linger)
    }
}

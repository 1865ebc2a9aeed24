//! 集群成员的只读视图。
//!
//! 成员由外部成员关系协作方拥有，路由器只读取 `id`、`endpoint` 与 `metadata`，从不修改。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 成员的稳定标识。
///
/// - **契约 (What)**：跨进程重启保持不变；参与环位置哈希，因此字典序即为哈希冲突时的裁决顺序。
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    /// 以任意字符串构造标识。
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// 借用底层字符串。
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// 成员的网络端点。
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// 以主机名（或 IP）与端口构造端点。
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// 主机部分。
    pub fn host(&self) -> &str {
        &self.host
    }

    /// 端口部分。
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` 形式的地址，可直接交给解析器。
    pub fn authority(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<std::net::SocketAddr> for Endpoint {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl FromStr for Endpoint {
    type Err = String;

    /// 解析 `host:port` 或 `[v6]:port`。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("endpoint `{s}` is missing a port"))?;
        let port = port
            .parse::<u16>()
            .map_err(|err| format!("endpoint `{s}` has an invalid port: {err}"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(format!("endpoint `{s}` is missing a host"));
        }
        Ok(Self::new(host, port))
    }
}

/// 集群成员。
///
/// # 教案式说明
/// - **意图 (Why)**：把身份、可达地址与元数据袋聚合为一个值对象，路由表与连接器共享同一份视图；
/// - **契约 (What)**：
///   - `metadata` 为不透明键值对，Simple 能力发现模式会在其中读取能力描述；
///   - 相等性比较覆盖全部字段，元数据变化即视为新版本成员。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    id: MemberId,
    endpoint: Endpoint,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl Member {
    /// 以空元数据构造成员。
    pub fn new(id: impl Into<MemberId>, endpoint: Endpoint) -> Self {
        Self {
            id: id.into(),
            endpoint,
            metadata: BTreeMap::new(),
        }
    }

    /// 追加一条元数据。
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 成员标识。
    pub fn id(&self) -> &MemberId {
        &self.id
    }

    /// 成员端点。
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// 读取单个元数据值。
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// 全部元数据。
    pub fn metadata_entries(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// 以新的元数据袋替换当前元数据，返回新成员值。
    pub fn with_metadata_entries(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.metadata
    }
}

impl From<String> for MemberId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

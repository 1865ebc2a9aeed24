use std::time::Duration;

use async_trait::async_trait;
use spark_command_core::{Endpoint, Transport, TransportError, TransportRequest, TransportResponse};
use tokio::net::TcpStream;

use crate::error::{self, map_io_error};
use crate::frame::{self, FrameError};
use crate::socket::TcpSocketConfig;

/// 请求/响应式 TCP 客户端。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 为能力查询与命令分发提供同一个 [`Transport`] 实现，二者仅在路径上不同；
/// - 每次请求独立建连，避免在成员频繁变化的集群中维护失效的连接池。
///
/// ## 逻辑 (How)
/// 1. 解析并连接 `endpoint.authority()`，应用 [`TcpSocketConfig`]；
/// 2. 写入请求帧，读取单个响应帧；
/// 3. 整个过程包在 `tokio::time::timeout` 中，超时即放弃连接并返回 [`TransportError::Timeout`]。
///
/// ## 契约 (What)
/// - 建连失败 → `Connect`；读写失败 → `Io`；帧损坏或超限 → `Malformed`；
/// - 非成功状态码原样返回 `Ok(response)`，由调用方解释。
#[derive(Clone, Debug, Default)]
pub struct TcpTransport {
    config: TcpSocketConfig,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TcpSocketConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TcpSocketConfig {
        &self.config
    }

    async fn round_trip(
        &self,
        authority: &str,
        request: &TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let stream = TcpStream::connect(authority)
            .await
            .map_err(|err| map_io_error(error::CONNECT, authority, err))?;
        self.config
            .apply(&stream)
            .map_err(|err| map_io_error(error::CONFIGURE, authority, err))?;

        let encoded =
            frame::encode_request(request).map_err(|err| malformed(authority, err))?;
        let (mut reader, mut writer) = stream.into_split();
        frame::write_frame(&mut writer, &encoded)
            .await
            .map_err(|err| map_io_error(error::WRITE, authority, err))?;

        frame::read_response(&mut reader)
            .await
            .map_err(|err| match err {
                FrameError::Io(source) => map_io_error(error::READ, authority, source),
                other => malformed(authority, other),
            })
    }
}

fn malformed(authority: &str, err: FrameError) -> TransportError {
    TransportError::Malformed {
        endpoint: authority.to_owned(),
        detail: err.to_string(),
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn request(
        &self,
        endpoint: &Endpoint,
        request: TransportRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let authority = endpoint.authority();
        match tokio::time::timeout(timeout, self.round_trip(&authority, &request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                endpoint: authority,
                after: timeout,
            }),
        }
    }
}

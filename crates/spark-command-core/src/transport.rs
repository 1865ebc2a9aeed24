//! # 传输协作方契约
//!
//! ## 核心意图（Why）
//! - 能力查询与命令分发都只需要“向某个端点的某条路径发送一段字节并等待一段字节”；
//! - 把这一最小契约抽象为 [`Transport`]（客户端）与 [`RequestHandler`]（服务端），
//!   具体线缆实现（TCP、HTTP 等）由独立 crate 提供。
//!
//! ## 行为契约（What）
//! - `Transport::request` 必须在 `timeout` 内返回，超时以 [`TransportError::Timeout`] 报告；
//! - 对端完成往返但状态码非 [`status::OK`] 时，实现返回 `Ok(response)`，由调用方决定如何解释。

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;
use crate::member::Endpoint;

/// 传输层使用的状态码，取值与 HTTP 语义对齐。
pub mod status {
    pub const OK: u16 = 200;
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const INTERNAL_ERROR: u16 = 500;
}

/// 请求：目标路径与负载体。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportRequest {
    path: String,
    body: Bytes,
}

impl TransportRequest {
    pub fn new(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            body: body.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_parts(self) -> (String, Bytes) {
        (self.path, self.body)
    }
}

/// 响应：状态码与负载体。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    status: u16,
    body: Bytes,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 成功响应。
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(status::OK, body)
    }

    /// 以文本描述构造失败响应。
    pub fn error(status: u16, detail: impl Into<String>) -> Self {
        Self::new(status, Bytes::from(detail.into()))
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    pub fn is_success(&self) -> bool {
        self.status == status::OK
    }

    /// 将非成功响应转换为 [`TransportError::Status`]。
    pub fn into_success(self, endpoint: &Endpoint) -> Result<Bytes, TransportError> {
        if self.is_success() {
            return Ok(self.body);
        }
        Err(TransportError::Status {
            endpoint: endpoint.to_string(),
            status: self.status,
            detail: String::from_utf8_lossy(&self.body).into_owned(),
        })
    }
}

/// 客户端传输协作方。
///
/// # 教案式说明
/// - **意图 (Why)**：能力发现与连接器共享同一个请求/响应通道，测试可用脚本化实现替换；
/// - **契约 (What)**：实现必须 `Send + Sync`，可被多个任务并发调用；`timeout` 覆盖建连、
///   发送与等待响应的全过程；
/// - **风险 (Trade-offs)**：契约不包含流式与多路复用，单次请求即一次往返。
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn request(
        &self,
        endpoint: &Endpoint,
        request: TransportRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}

/// 服务端请求处理器，由传输实现的接入循环调用。
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, request: TransportRequest) -> TransportResponse;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_success_response_becomes_status_error() {
        let endpoint = Endpoint::new("10.0.0.9", 7000);
        let response = TransportResponse::error(status::NOT_FOUND, "no route for /x");
        let err = response.into_success(&endpoint).unwrap_err();
        match err {
            TransportError::Status {
                endpoint,
                status,
                detail,
            } => {
                assert_eq!(endpoint, "10.0.0.9:7000");
                assert_eq!(status, 404);
                assert_eq!(detail, "no route for /x");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let ok = TransportResponse::ok(Bytes::from_static(b"{}"));
        assert_eq!(ok.into_success(&endpoint).unwrap(), Bytes::from_static(b"{}"));
    }
}

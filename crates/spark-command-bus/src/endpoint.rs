use std::sync::Arc;

use async_trait::async_trait;
use spark_command_core::transport::status;
use spark_command_core::{
    CommandSerializer, RequestHandler, TransportRequest, TransportResponse,
};
use spark_command_router::CommandRouter;

use crate::local::LocalSegment;

/// 本成员对外暴露的服务端端点。
///
/// # 教案式说明
/// - **意图 (Why)**：能力查询与命令分发共用一个传输服务端，按路径分流；
/// - **契约 (What)**：
///   - 能力路径：应答最近一次发布的本地能力；没有本地处理器时应答空能力，而不是错误；
///   - 分发路径：解码命令并交给本地命令段，处理器失败编码在应答体里，状态码仍为成功；
///   - 命令无法解码时应答 `400`，未知路径应答 `404`。
pub struct CommandEndpoint {
    router: Arc<CommandRouter>,
    segment: Arc<LocalSegment>,
    serializer: Arc<dyn CommandSerializer>,
    capabilities_path: String,
    dispatch_path: String,
}

impl CommandEndpoint {
    pub fn new(
        router: Arc<CommandRouter>,
        segment: Arc<LocalSegment>,
        serializer: Arc<dyn CommandSerializer>,
        capabilities_path: impl Into<String>,
        dispatch_path: impl Into<String>,
    ) -> Self {
        Self {
            router,
            segment,
            serializer,
            capabilities_path: capabilities_path.into(),
            dispatch_path: dispatch_path.into(),
        }
    }

    fn capabilities(&self) -> TransportResponse {
        let capability = self.router.discovery().local_capabilities();
        match self.serializer.serialize_capability(&capability) {
            Ok(body) => TransportResponse::ok(body),
            Err(err) => TransportResponse::error(status::INTERNAL_ERROR, err.to_string()),
        }
    }

    async fn dispatch(&self, body: &[u8]) -> TransportResponse {
        let command = match self.serializer.deserialize_command(body) {
            Ok(command) => command,
            Err(err) => {
                tracing::debug!(format = self.serializer.format(), error = %err, "rejected undecodable command");
                return TransportResponse::error(status::BAD_REQUEST, err.to_string());
            }
        };
        let reply = self.segment.dispatch(&command).await;
        match self.serializer.serialize_reply(&reply) {
            Ok(body) => TransportResponse::ok(body),
            Err(err) => {
                tracing::warn!(
                    command = command.command_name(),
                    format = self.serializer.format(),
                    error = %err,
                    "failed to encode command reply"
                );
                TransportResponse::error(status::INTERNAL_ERROR, err.to_string())
            }
        }
    }
}

#[async_trait]
impl RequestHandler for CommandEndpoint {
    async fn handle(&self, request: TransportRequest) -> TransportResponse {
        let (path, body) = request.into_parts();
        if path == self.dispatch_path {
            self.dispatch(&body).await
        } else if path == self.capabilities_path {
            self.capabilities()
        } else {
            TransportResponse::error(status::NOT_FOUND, format!("no route for {path}"))
        }
    }
}

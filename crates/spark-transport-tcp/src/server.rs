use std::net::SocketAddr;
use std::sync::Arc;

use spark_command_core::transport::status;
use spark_command_core::{Endpoint, RequestHandler, TransportResponse};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::ServeError;
use crate::frame::{self, FrameError};
use crate::socket::TcpSocketConfig;

/// 请求/响应式 TCP 服务端。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 承载本地成员的两条入站路径（能力端点与分发端点），路径分派由 [`RequestHandler`] 完成；
/// - 接入循环与每条连接都运行在独立任务中，慢请求不会阻塞其他连接。
///
/// ## 逻辑 (How)
/// - `bind`：绑定地址后立即派生接入任务，返回的实例持有实际绑定地址；
/// - 每条连接循环读取请求帧、调用处理器、写回响应帧，直到对端关闭；
/// - 帧损坏时回写 `400` 并关闭连接。
///
/// ## 契约 (What)
/// - **前置条件**：必须在 Tokio 运行时中调用 `bind`；
/// - **后置条件**：`shutdown` 返回后接入循环已退出，不再接受新连接；
///   已建立的连接任务继续处理完当前请求；
/// - 实例被丢弃时接入任务被中止。
#[derive(Debug)]
pub struct TcpServer {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_loop: Option<JoinHandle<()>>,
}

impl TcpServer {
    /// 以默认套接字选项绑定。
    pub async fn bind(
        addr: SocketAddr,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<Self, ServeError> {
        Self::bind_with_config(addr, handler, TcpSocketConfig::default()).await
    }

    /// 以给定套接字选项绑定。
    pub async fn bind_with_config(
        addr: SocketAddr,
        handler: Arc<dyn RequestHandler>,
        config: TcpSocketConfig,
    ) -> Result<Self, ServeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServeError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServeError::Bind { addr, source })?;
        let (shutdown, signal) = watch::channel(false);
        let accept_loop = tokio::spawn(accept_loop(listener, handler, config, signal));
        tracing::debug!(addr = %local_addr, "tcp server listening");
        Ok(Self {
            local_addr,
            shutdown,
            accept_loop: Some(accept_loop),
        })
    }

    /// 实际绑定地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 以成员端点形式返回绑定地址。
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::from(self.local_addr)
    }

    /// 停止接受新连接并等待接入循环退出。
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.accept_loop.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        if let Some(task) = self.accept_loop.take() {
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
    config: TcpSocketConfig,
    mut signal: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = signal.changed() => {
                if changed.is_err() || *signal.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(err) = config.apply(&stream) {
                        tracing::warn!(%peer, error = %err, "tcp configure failed, dropping connection");
                        continue;
                    }
                    tokio::spawn(serve_connection(stream, peer, Arc::clone(&handler)));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "tcp accept failed");
                }
            },
        }
    }
    tracing::debug!("tcp accept loop stopped");
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, handler: Arc<dyn RequestHandler>) {
    let (mut reader, mut writer) = stream.into_split();
    loop {
        let response = match frame::read_request(&mut reader).await {
            Ok(Some(request)) => handler.handle(request).await,
            Ok(None) => break,
            Err(FrameError::Io(err)) => {
                tracing::debug!(%peer, error = %err, "tcp read failed");
                break;
            }
            Err(err) => {
                tracing::warn!(%peer, error = %err, "malformed request frame");
                let rejection = TransportResponse::error(status::BAD_REQUEST, err.to_string());
                if let Ok(encoded) = frame::encode_response(&rejection) {
                    let _ = frame::write_frame(&mut writer, &encoded).await;
                }
                break;
            }
        };
        let encoded = match frame::encode_response(&response) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::warn!(%peer, error = %err, "response exceeds frame limit");
                match frame::encode_response(&TransportResponse::error(
                    status::INTERNAL_ERROR,
                    err.to_string(),
                )) {
                    Ok(encoded) => encoded,
                    Err(_) => break,
                }
            }
        };
        if let Err(err) = frame::write_frame(&mut writer, &encoded).await {
            tracing::debug!(%peer, error = %err, "tcp write failed");
            break;
        }
    }
}

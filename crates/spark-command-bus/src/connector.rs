//! # 命令总线连接器
//!
//! ## 核心意图（Why）
//! - 把“发往某个成员的一条命令”变成一个可等待、可取消、必然结束的分发；
//! - 远端与本地目标对调用方呈现完全相同的结果语义。
//!
//! ## 实现说明（How）
//! - 每次分发在独立任务中运行，整个往返（序列化、传输、反序列化）受同一个分发时限约束；
//! - 目标为本地成员时跳过序列化与网络，直接交给 [`LocalSegment`]；
//! - [`DispatchHandle`] 丢弃或取消时中止任务，只在本地放弃，不通知远端。
//!
//! ## 风险与考量（Trade-offs）
//! - 超时并不意味着远端没有执行命令；幂等性由调用方负责。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use spark_command_core::{
    CommandMessage, CommandReply, CommandSerializer, ConnectorSettings, Member, MemberId,
    Transport, TransportRequest,
};
use tokio::task::JoinHandle;

use crate::error::ConnectorError;
use crate::local::LocalSegment;
use crate::outcome::DispatchOutcome;

/// 连接器参数。
#[derive(Clone, Debug)]
pub struct ConnectorOptions {
    pub dispatch_path: String,
    pub dispatch_timeout: Duration,
}

impl From<&ConnectorSettings> for ConnectorOptions {
    fn from(settings: &ConnectorSettings) -> Self {
        Self {
            dispatch_path: settings.dispatch_path.clone(),
            dispatch_timeout: settings.dispatch_timeout(),
        }
    }
}

struct ConnectorInner {
    local: MemberId,
    segment: Arc<LocalSegment>,
    transport: Arc<dyn Transport>,
    serializer: Arc<dyn CommandSerializer>,
    options: ConnectorOptions,
}

/// 命令总线连接器，克隆代价为一次引用计数。
///
/// # 使用契约（What）
/// - [`Self::dispatch`] 必须在 Tokio 运行时内调用；
/// - 返回的句柄恰好产出一个 [`DispatchOutcome`]，等待时间不超过分发时限；
/// - 传输、序列化与超时失败一律归入 `ConnectorFailed`，处理器失败归入 `HandlerFailed`。
#[derive(Clone)]
pub struct CommandBusConnector {
    inner: Arc<ConnectorInner>,
}

impl CommandBusConnector {
    pub fn new(
        local: MemberId,
        segment: Arc<LocalSegment>,
        transport: Arc<dyn Transport>,
        serializer: Arc<dyn CommandSerializer>,
        options: ConnectorOptions,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectorInner {
                local,
                segment,
                transport,
                serializer,
                options,
            }),
        }
    }

    pub fn local_member(&self) -> &MemberId {
        &self.inner.local
    }

    pub fn segment(&self) -> &Arc<LocalSegment> {
        &self.inner.segment
    }

    pub fn serializer(&self) -> &Arc<dyn CommandSerializer> {
        &self.inner.serializer
    }

    pub fn options(&self) -> &ConnectorOptions {
        &self.inner.options
    }

    /// 把命令发往目标成员。
    pub fn dispatch(&self, destination: &Member, command: CommandMessage) -> DispatchHandle {
        let inner = Arc::clone(&self.inner);
        let destination = destination.clone();
        let member = destination.id().clone();
        let task = tokio::spawn(async move { inner.deliver(&destination, command).await });
        DispatchHandle { member, task }
    }
}

impl ConnectorInner {
    async fn deliver(&self, destination: &Member, command: CommandMessage) -> DispatchOutcome {
        let member = destination.id();
        let limit = self.options.dispatch_timeout;
        let attempt = async {
            if *member == self.local {
                Ok(self.segment.dispatch(&command).await)
            } else {
                self.remote(destination, &command).await
            }
        };
        let outcome = match tokio::time::timeout(limit, attempt).await {
            Ok(Ok(reply)) => DispatchOutcome::from(reply),
            Ok(Err(err)) => DispatchOutcome::ConnectorFailed(err),
            Err(_) => DispatchOutcome::ConnectorFailed(ConnectorError::Timeout {
                member: member.clone(),
                after: limit,
            }),
        };
        if let DispatchOutcome::ConnectorFailed(err) = &outcome {
            tracing::debug!(
                member = %member,
                command = command.command_name(),
                code = err.code(),
                format = self.serializer.format(),
                error = %err,
                "command dispatch failed"
            );
        }
        outcome
    }

    async fn remote(
        &self,
        destination: &Member,
        command: &CommandMessage,
    ) -> Result<CommandReply, ConnectorError> {
        let body = self.serializer.serialize_command(command)?;
        let request = TransportRequest::new(self.options.dispatch_path.clone(), body);
        let endpoint = destination.endpoint();
        let bytes = self
            .transport
            .request(endpoint, request, self.options.dispatch_timeout)
            .await
            .and_then(|response| response.into_success(endpoint))
            .map_err(|err| ConnectorError::from_transport(destination.id(), err))?;
        let reply = self.serializer.deserialize_reply(&bytes)?;
        if reply.command_identifier() != command.identifier() {
            return Err(ConnectorError::Internal {
                detail: format!(
                    "reply for `{}` received while waiting for `{}`",
                    reply.command_identifier(),
                    command.identifier()
                ),
            });
        }
        Ok(reply)
    }
}

/// 一次进行中的分发。
///
/// - 作为 `Future` 等待即可得到结果；
/// - [`Self::cancel`] 后等待得到 `ConnectorFailed(Cancelled)`，除非分发已先一步完成；
/// - 句柄被丢弃时分发任务随之中止。
#[derive(Debug)]
pub struct DispatchHandle {
    member: MemberId,
    task: JoinHandle<DispatchOutcome>,
}

impl DispatchHandle {
    /// 分发目标。
    pub fn member(&self) -> &MemberId {
        &self.member
    }

    /// 在本地放弃本次分发。
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Future for DispatchHandle {
    type Output = DispatchOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.task).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(err)) if err.is_cancelled() => {
                Poll::Ready(DispatchOutcome::ConnectorFailed(ConnectorError::Cancelled {
                    member: this.member.clone(),
                }))
            }
            Poll::Ready(Err(err)) => {
                Poll::Ready(DispatchOutcome::ConnectorFailed(ConnectorError::Internal {
                    detail: format!("dispatch task to `{}` failed: {err}", this.member),
                }))
            }
        }
    }
}

impl Drop for DispatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use spark_command_core::config::DEFAULT_CAPABILITIES_PATH;
use spark_command_core::{
    ClusterMembership, CommandMessage, CommandPattern, CommandSerializer, ConfigError,
    DistributedCommandBusSettings, RetrySettings, Transport,
};
use spark_command_router::{CommandRouter, DiscoveryError, ResolveError};
use tokio::task::JoinHandle;

use crate::connector::{CommandBusConnector, ConnectorOptions, DispatchHandle};
use crate::endpoint::CommandEndpoint;
use crate::error::{ConnectorError, SendError};
use crate::local::{CommandHandler, LocalSegment};
use crate::outcome::DispatchOutcome;

/// 分布式命令总线门面。
///
/// # 教案式说明
/// - **意图 (Why)**：把“登记处理器 → 发布能力 → 解析目标 → 分发 → 换成员重试”
///   收拢成调用方可直接使用的几个入口；
/// - **逻辑 (How)**：
///   - `subscribe` 同时写入本地命令段与能力登记表，再发布能力；
///   - `send` 先解析目标，连接器失败且仍有重试次数时，排除已失败成员后重新解析；
///   - 处理器失败与路由失败从不重试；
/// - **契约 (What)**：
///   - `retry.max_attempts` 为总尝试次数，`1` 表示不重试；
///   - 超时后重试可能导致命令在两个成员上都被执行，幂等性由调用方负责；
/// - **风险 (Trade-offs)**：重试间隔是固定值，没有退避。
pub struct DistributedCommandBus {
    router: Arc<CommandRouter>,
    connector: CommandBusConnector,
    retry: RetrySettings,
    capabilities_path: String,
}

impl DistributedCommandBus {
    pub fn new(router: Arc<CommandRouter>, connector: CommandBusConnector, retry: RetrySettings) -> Self {
        Self {
            router,
            connector,
            retry,
            capabilities_path: DEFAULT_CAPABILITIES_PATH.to_owned(),
        }
    }

    /// 覆盖服务端端点应答能力查询的路径。
    pub fn with_capabilities_path(mut self, path: impl Into<String>) -> Self {
        self.capabilities_path = path.into();
        self
    }

    /// 按配置装配路由器、本地命令段与连接器。
    pub fn from_settings(
        settings: &DistributedCommandBusSettings,
        membership: Arc<dyn ClusterMembership>,
        transport: Arc<dyn Transport>,
        serializer: Arc<dyn CommandSerializer>,
    ) -> Result<Self, ConfigError> {
        let router = Arc::new(CommandRouter::from_settings(
            settings,
            membership,
            Arc::clone(&transport),
            Arc::clone(&serializer),
        )?);
        let connector = CommandBusConnector::new(
            router.local_member().id().clone(),
            Arc::new(LocalSegment::new()),
            transport,
            serializer,
            ConnectorOptions::from(&settings.connector),
        );
        Ok(Self::new(router, connector, settings.retry.clone())
            .with_capabilities_path(settings.discovery.capabilities_path.clone()))
    }

    pub fn router(&self) -> &Arc<CommandRouter> {
        &self.router
    }

    pub fn connector(&self) -> &CommandBusConnector {
        &self.connector
    }

    /// 供传输服务端挂载的请求处理器。
    pub fn endpoint(&self) -> CommandEndpoint {
        CommandEndpoint::new(
            Arc::clone(&self.router),
            Arc::clone(self.connector.segment()),
            Arc::clone(self.connector.serializer()),
            self.capabilities_path.clone(),
            self.connector.options().dispatch_path.clone(),
        )
    }

    /// 发布本地能力并开始消费成员关系事件。
    pub async fn start(
        &self,
        membership: Arc<dyn ClusterMembership>,
    ) -> Result<JoinHandle<()>, DiscoveryError> {
        self.router.publish_local_capabilities().await?;
        Ok(self.router.spawn_membership_listener(membership))
    }

    /// 登记本地处理器并重新发布能力。
    pub async fn subscribe(
        &self,
        pattern: CommandPattern,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<(), DiscoveryError> {
        self.connector.segment().subscribe(pattern.clone(), handler);
        self.router.registry().register(pattern);
        self.router.publish_local_capabilities().await
    }

    /// 注销本地处理器；模式此前已登记时重新发布能力。
    pub async fn unsubscribe(&self, pattern: &CommandPattern) -> Result<bool, DiscoveryError> {
        let removed = self.connector.segment().unsubscribe(pattern);
        self.router.registry().unregister(pattern);
        if removed {
            self.router.publish_local_capabilities().await?;
        }
        Ok(removed)
    }

    /// 更新本地负载因子；`0` 表示不再接收新命令。
    pub async fn update_load_factor(&self, load_factor: u32) -> Result<(), DiscoveryError> {
        self.router.update_load_factor(load_factor).await
    }

    /// 解析目标并发起一次分发，不重试。
    pub fn dispatch(&self, command: CommandMessage) -> Result<DispatchHandle, ResolveError> {
        let destination = self.router.resolve_command(&command)?;
        Ok(self.connector.dispatch(&destination, command))
    }

    /// 发送命令并等待结果，按重试配置换成员重试连接器失败。
    pub async fn send(&self, command: CommandMessage) -> Result<Bytes, SendError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut excluded = HashSet::new();
        let mut last_failure: Option<ConnectorError> = None;
        let mut attempt = 1;
        loop {
            let destination = match self.router.resolve_excluding(&command, &excluded) {
                Ok(destination) => destination,
                Err(err) => {
                    return Err(match last_failure {
                        Some(failure) => SendError::Connector(failure),
                        None => SendError::Routing(err),
                    });
                }
            };
            match self.connector.dispatch(&destination, command.clone()).await {
                DispatchOutcome::Completed(payload) => return Ok(payload),
                DispatchOutcome::HandlerFailed(failure) => return Err(SendError::Handler(failure)),
                DispatchOutcome::ConnectorFailed(failure) => {
                    if attempt >= max_attempts || !failure.is_retryable() {
                        return Err(SendError::Connector(failure));
                    }
                    tracing::warn!(
                        member = %destination.id(),
                        command = command.command_name(),
                        attempt,
                        error = %failure,
                        "dispatch failed, retrying on another member"
                    );
                    excluded.insert(destination.id().clone());
                    last_failure = Some(failure);
                    attempt += 1;
                    tokio::time::sleep(self.retry.interval()).await;
                }
            }
        }
    }
}

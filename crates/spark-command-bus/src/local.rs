//! 本地命令段：本成员上真正执行命令的处理器集合。

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use spark_command_core::{CommandMessage, CommandPattern, CommandReply, HandlerFailure};

/// 本地没有处理器覆盖该命令时上报的失败码。
pub const NO_HANDLER_CODE: &str = "spark.command.no_handler";

/// 命令处理器。
///
/// # 教案式说明
/// - **意图 (Why)**：处理逻辑属于业务方，总线只负责把命令送到这里并把结果带回去；
/// - **契约 (What)**：`Err(HandlerFailure)` 会完整往返到调用方，与连接器级失败严格区分；
///   实现必须可被多个任务并发调用。
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    async fn handle(&self, command: &CommandMessage) -> Result<Bytes, HandlerFailure>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> CommandHandler for FnHandler<F>
where
    F: Fn(CommandMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, HandlerFailure>> + Send + 'static,
{
    async fn handle(&self, command: &CommandMessage) -> Result<Bytes, HandlerFailure> {
        (self.0)(command.clone()).await
    }
}

/// 以异步闭包构造处理器。
pub fn handler_fn<F, Fut>(handler: F) -> Arc<dyn CommandHandler>
where
    F: Fn(CommandMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, HandlerFailure>> + Send + 'static,
{
    Arc::new(FnHandler(handler))
}

/// 本地处理器登记表。
///
/// # 教案式说明
/// - **逻辑 (How)**：一个命令名可能同时被多个模式覆盖，选择顺序为
///   精确名 > 最长前缀 > `*`，保证同一登记状态下选择结果确定；
/// - **契约 (What)**：找不到处理器时返回带 [`NO_HANDLER_CODE`] 的业务失败应答，
///   而不是连接器失败，因为命令已经送达。
#[derive(Default)]
pub struct LocalSegment {
    handlers: DashMap<CommandPattern, Arc<dyn CommandHandler>>,
}

impl LocalSegment {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记处理器，返回被替换的旧处理器。
    pub fn subscribe(
        &self,
        pattern: CommandPattern,
        handler: Arc<dyn CommandHandler>,
    ) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.insert(pattern, handler)
    }

    /// 注销处理器，返回该模式此前是否已登记。
    pub fn unsubscribe(&self, pattern: &CommandPattern) -> bool {
        self.handlers.remove(pattern).is_some()
    }

    /// 已登记的模式，按模式排序。
    pub fn patterns(&self) -> Vec<CommandPattern> {
        let mut patterns: Vec<CommandPattern> =
            self.handlers.iter().map(|entry| entry.key().clone()).collect();
        patterns.sort();
        patterns
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// 为命令名选择处理器。
    pub fn handler_for(&self, command_name: &str) -> Option<Arc<dyn CommandHandler>> {
        if let Some(handler) = self.handlers.get(&CommandPattern::exact(command_name)) {
            return Some(Arc::clone(handler.value()));
        }
        self.handlers
            .iter()
            .filter(|entry| entry.key().matches(command_name))
            .max_by_key(|entry| specificity(entry.key()))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// 在本地执行命令并生成应答。
    pub async fn dispatch(&self, command: &CommandMessage) -> CommandReply {
        let result = match self.handler_for(command.command_name()) {
            Some(handler) => handler.handle(command).await,
            None => Err(HandlerFailure::new(
                NO_HANDLER_CODE,
                format!("no handler for command `{}`", command.command_name()),
            )),
        };
        CommandReply::from_result(command.identifier(), result)
    }
}

fn specificity(pattern: &CommandPattern) -> (u8, usize) {
    match pattern {
        CommandPattern::Exact(name) => (2, name.len()),
        CommandPattern::Prefix(prefix) => (1, prefix.len()),
        CommandPattern::Any => (0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answering(text: &'static str) -> Arc<dyn CommandHandler> {
        handler_fn(move |_command| async move { Ok(Bytes::from_static(text.as_bytes())) })
    }

    #[tokio::test]
    async fn most_specific_pattern_wins() {
        let segment = LocalSegment::new();
        segment.subscribe(CommandPattern::Any, answering("any"));
        segment.subscribe(CommandPattern::parse("orders.*").unwrap(), answering("orders"));
        segment.subscribe(
            CommandPattern::parse("orders.priority.*").unwrap(),
            answering("priority"),
        );
        segment.subscribe(CommandPattern::exact("orders.Cancel"), answering("cancel"));

        let cases = [
            ("orders.Cancel", "cancel"),
            ("orders.priority.Ship", "priority"),
            ("orders.Ship", "orders"),
            ("billing.Charge", "any"),
        ];
        for (name, expected) in cases {
            let reply = segment.dispatch(&CommandMessage::new(name, Bytes::new())).await;
            assert_eq!(reply.into_result().unwrap(), Bytes::from_static(expected.as_bytes()));
        }
    }

    #[tokio::test]
    async fn missing_handler_is_a_handler_failure() {
        let segment = LocalSegment::new();
        let command = CommandMessage::new("Ship", Bytes::new());
        let reply = segment.dispatch(&command).await;
        assert_eq!(reply.command_identifier(), command.identifier());
        let failure = reply.into_result().unwrap_err();
        assert_eq!(failure.code(), NO_HANDLER_CODE);
    }

    #[test]
    fn unsubscribe_reports_whether_pattern_was_registered() {
        let segment = LocalSegment::new();
        segment.subscribe(CommandPattern::exact("Ship"), answering("ok"));
        assert_eq!(segment.patterns(), vec![CommandPattern::exact("Ship")]);
        assert!(segment.unsubscribe(&CommandPattern::exact("Ship")));
        assert!(!segment.unsubscribe(&CommandPattern::exact("Ship")));
        assert!(segment.is_empty());
    }
}

//! 进程级 `tracing` 订阅器安装入口。

use std::sync::OnceLock;

use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;

static INSTALLED: OnceLock<()> = OnceLock::new();

/// 安装订阅器失败。
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// `install_tracing` 已成功执行过。
    #[error("tracing has already been installed by spark-command-bus")]
    AlreadyInstalled,
    /// 外部已经设置了全局订阅器。
    #[error("a global tracing subscriber is already set")]
    SubscriberAlreadySet,
    /// 过滤指令无法解析。
    #[error("invalid tracing filter `{directives}`: {detail}")]
    InvalidFilter { directives: String, detail: String },
}

impl TelemetryError {
    pub fn code(&self) -> &'static str {
        match self {
            TelemetryError::AlreadyInstalled => "spark.command.telemetry.already_installed",
            TelemetryError::SubscriberAlreadySet => "spark.command.telemetry.subscriber_set",
            TelemetryError::InvalidFilter { .. } => "spark.command.telemetry.invalid_filter",
        }
    }
}

/// 安装 `fmt + EnvFilter` 全局订阅器。
///
/// # 教案式说明
/// - **意图 (Why)**：宿主进程一行代码即可看到路由重建、忽略名单与分发失败的结构化日志；
/// - **逻辑 (How)**：
///   1. `filter` 为 `Some` 时按其解析过滤指令，否则读取 `RUST_LOG`，都没有时默认 `info`；
///   2. 检查是否已安装或外部已设置订阅器；
///   3. 组装 `registry + EnvFilter + fmt` 并设为全局默认。
/// - **契约 (What)**：只能成功一次，再次调用返回 [`TelemetryError::AlreadyInstalled`]；
///   过滤指令非法时返回 [`TelemetryError::InvalidFilter`]，不会安装任何东西。
pub fn install_tracing(filter: Option<&str>) -> Result<(), TelemetryError> {
    let filter = build_env_filter(filter)?;
    if INSTALLED.get().is_some() {
        return Err(TelemetryError::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(TelemetryError::SubscriberAlreadySet);
    }

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|_| TelemetryError::SubscriberAlreadySet)?;
    INSTALLED
        .set(())
        .map_err(|_| TelemetryError::AlreadyInstalled)
}

fn build_env_filter(directives: Option<&str>) -> Result<EnvFilter, TelemetryError> {
    match directives {
        Some(directives) => {
            EnvFilter::try_new(directives).map_err(|err| TelemetryError::InvalidFilter {
                directives: directives.to_owned(),
                detail: err.to_string(),
            })
        }
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))),
    }
}

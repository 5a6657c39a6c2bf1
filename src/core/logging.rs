//! 日志系统初始化

use crate::config::{LogLevel, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// 初始化日志系统
///
/// 配置tracing日志框架。`RUST_LOG` 环境变量优先，否则使用配置中的级别。
/// 重复调用是安全的：已经安装订阅者时直接返回 `false`。
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(config.level)));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(target: "runtime", "Logging initialized at {:?}", config.level);
    }
    installed
}

fn level_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

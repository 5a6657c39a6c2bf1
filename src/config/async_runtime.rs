use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 异步运行时配置
///
/// 用于自由线程后端（例如 native 后端的异步函数）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncConfig {
    /// 工作线程数量
    pub worker_threads: usize,

    /// 线程名前缀
    pub thread_name: String,
}

impl_default!(AsyncConfig {
    worker_threads: num_cpus::get().max(1),
    thread_name: "polyglot-async".to_string(),
});

impl AsyncConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.worker_threads == 0 || self.worker_threads > 1024 {
            return Err(ConfigError::ValidationError(
                "Invalid async worker thread count".to_string(),
            ));
        }
        if self.thread_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "Empty async thread name".to_string(),
            ));
        }
        Ok(())
    }
}

/// 统一配置系统
///
/// 提供TOML/JSON配置文件、环境变量和运行时动态调整
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub mod async_runtime;
pub mod loader;

pub use async_runtime::AsyncConfig;
pub use loader::{LoaderConfig, SerialConfig};

/// 运行时配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 运行时主配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,

    /// 加载器配置
    #[serde(default)]
    pub loader: LoaderConfig,

    /// 异步运行时配置
    #[serde(default)]
    pub async_runtime: AsyncConfig,

    /// 序列化配置
    #[serde(default)]
    pub serial: SerialConfig,
}

use crate::impl_default;

impl_default!(RuntimeConfig {
    logging: LoggingConfig::default(),
    loader: LoaderConfig::default(),
    async_runtime: AsyncConfig::default(),
    serial: SerialConfig::default(),
});

impl RuntimeConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 保存为JSON文件
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        // 加载器配置
        if let Some(val) = env::var_os("LOADER_SCRIPT_PATH") {
            let paths: Vec<PathBuf> = env::split_paths(&val)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            if !paths.is_empty() {
                self.loader.script_paths = paths;
            }
        }
        if let Some(val) = env::var_os("LOADER_LIBRARY_PATH") {
            if !val.is_empty() {
                self.loader.library_path = Some(PathBuf::from(val));
            }
        }

        // 日志配置
        if let Ok(val) = env::var("POLYGLOT_LOG_LEVEL") {
            if let Ok(level) = val.parse() {
                self.logging.level = level;
            }
        }

        // 异步运行时
        if let Ok(val) = env::var("POLYGLOT_ASYNC_WORKERS") {
            if let Ok(workers) = val.parse() {
                self.async_runtime.worker_threads = workers;
            }
        }

        // 序列化
        if let Ok(val) = env::var("SERIAL_DEFAULT_FORMAT") {
            self.serial.default_format = val;
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.loader.validate()?;
        self.async_runtime.validate()?;
        self.serial.validate()?;
        Ok(())
    }

    /// 自动查找并加载配置文件
    ///
    /// 按以下顺序查找：
    /// 1. ./polyglot.toml
    /// 2. ./polyglot.json
    /// 3. <config_dir>/polyglot_core/config.toml
    /// 4. 使用默认配置
    ///
    /// 最后应用环境变量覆盖。
    pub fn load_or_default() -> Self {
        let mut config = Self::discover().unwrap_or_else(|| {
            tracing::debug!(target: "config", "Using default configuration");
            Self::default()
        });
        config.apply_env_overrides();
        config
    }

    fn discover() -> Option<Self> {
        if let Ok(config) = Self::from_toml_file("polyglot.toml") {
            tracing::info!(target: "config", "Loaded config from polyglot.toml");
            return Some(config);
        }

        if let Ok(config) = Self::from_json_file("polyglot.json") {
            tracing::info!(target: "config", "Loaded config from polyglot.json");
            return Some(config);
        }

        let config_path = dirs::config_dir()?.join("polyglot_core").join("config.toml");
        match Self::from_toml_file(&config_path) {
            Ok(config) => {
                tracing::info!(target: "config", "Loaded config from {:?}", config_path);
                Some(config)
            }
            Err(_) => None,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,

    /// 输出日志目标（target）
    pub with_target: bool,

    /// 输出线程ID
    pub with_thread_ids: bool,
}

impl_default!(LoggingConfig {
    level: LogLevel::Info,
    with_target: true,
    with_thread_ids: false,
});

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::ParseError(format!(
                "Unknown log level: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.loader.script_paths, vec![PathBuf::from(".")]);
        assert!(config.loader.lazy_initialize);
    }

    #[test]
    fn test_toml_serialization() {
        let mut config = RuntimeConfig::default();
        config.loader.library_path = Some(PathBuf::from("/opt/loaders"));
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: RuntimeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.loader.library_path, config.loader.library_path);
        assert_eq!(
            parsed.async_runtime.worker_threads,
            config.async_runtime.worker_threads
        );
    }

    #[test]
    fn test_json_serialization() {
        let config = RuntimeConfig::default();
        let json_str = serde_json::to_string(&config).unwrap();
        let parsed: RuntimeConfig = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.serial.default_format, "json");
        assert_eq!(parsed.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed = RuntimeConfig::from_toml_str(
            r#"
            [serial]
            default_format = "bin"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.serial.default_format, "bin");
        assert_eq!(parsed.loader.script_paths, vec![PathBuf::from(".")]);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("polyglot.toml");
        let mut config = RuntimeConfig::default();
        config.async_runtime.worker_threads = 3;
        config.save_toml(&path).unwrap();

        let reloaded = RuntimeConfig::from_toml_file(&path).unwrap();
        assert_eq!(reloaded.async_runtime.worker_threads, 3);

        let json_path = dir.path().join("polyglot.json");
        config.save_json(&json_path).unwrap();
        let reloaded = RuntimeConfig::from_json_file(&json_path).unwrap();
        assert_eq!(reloaded.async_runtime.worker_threads, 3);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = RuntimeConfig::default();
        config.serial.default_format = "yaml".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = RuntimeConfig::default();
        config.async_runtime.worker_threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("POLYGLOT_ASYNC_WORKERS", "7");
        env::set_var("POLYGLOT_LOG_LEVEL", "debug");
        let mut config = RuntimeConfig::default();
        config.apply_env_overrides();
        env::remove_var("POLYGLOT_ASYNC_WORKERS");
        env::remove_var("POLYGLOT_LOG_LEVEL");

        assert_eq!(config.async_runtime.worker_threads, 7);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}

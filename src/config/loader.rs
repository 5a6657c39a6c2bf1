use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 加载器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// 脚本搜索路径（按顺序查找）
    pub script_paths: Vec<PathBuf>,

    /// 动态后端库所在目录
    pub library_path: Option<PathBuf>,

    /// 首次加载时才初始化后端
    pub lazy_initialize: bool,
}

impl_default!(LoaderConfig {
    script_paths: vec![PathBuf::from(".")],
    library_path: None,
    lazy_initialize: true,
});

impl LoaderConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.script_paths.iter().any(|p| p.as_os_str().is_empty()) {
            return Err(ConfigError::ValidationError(
                "Empty script path".to_string(),
            ));
        }
        if let Some(path) = &self.library_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError(
                    "Empty library path".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// 序列化配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// 默认格式 ("json" 或 "bin")
    pub default_format: String,
}

impl_default!(SerialConfig {
    default_format: "json".to_string(),
});

impl SerialConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        match self.default_format.as_str() {
            "json" | "bin" => Ok(()),
            other => Err(ConfigError::ValidationError(format!(
                "Unknown serial format: {}",
                other
            ))),
        }
    }
}

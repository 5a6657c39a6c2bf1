//! 路径工具

use std::path::{Path, PathBuf};

/// File extension without the dot.
pub fn path_extension(path: &str) -> Option<&str> {
    Path::new(path).extension().and_then(|e| e.to_str())
}

/// File name without directory and extension.
pub fn path_name(path: &str) -> Option<&str> {
    Path::new(path).file_stem().and_then(|s| s.to_str())
}

pub fn path_is_absolute(path: &str) -> bool {
    Path::new(path).is_absolute()
}

/// 在搜索路径中查找脚本
///
/// Absolute paths are returned as-is when they exist. Relative paths are
/// tried against each search path in order; the first existing file wins.
pub fn resolve_script(script: &Path, search_paths: &[PathBuf]) -> Option<PathBuf> {
    if script.is_absolute() {
        return script.is_file().then(|| script.to_path_buf());
    }
    search_paths
        .iter()
        .map(|dir| dir.join(script))
        .find(|candidate| candidate.is_file())
}

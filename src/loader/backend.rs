//! 后端接口
//!
//! Every language backend implements `Backend`. The registry drives it
//! through `initialize -> load -> discover -> clear -> destroy`; backends
//! never see handles or scopes, only their own opaque module objects.

use crate::config::LoaderConfig;
use crate::core::error::LoaderResult;
use crate::reflect::{Class, FunctionInterface, Signature, Type, Value};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 后端私有的模块对象
pub type BackendModule = Box<dyn Any + Send>;

/// 加载来源
#[derive(Debug, Clone, PartialEq)]
pub enum LoadSource {
    /// 一个或多个脚本文件
    Files(Vec<PathBuf>),
    /// 内存中的源码
    Memory { name: String, buffer: Vec<u8> },
    /// 预编译包
    Package(PathBuf),
}

impl LoadSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        LoadSource::Files(vec![path.into()])
    }

    pub fn memory(name: impl Into<String>, buffer: impl Into<Vec<u8>>) -> Self {
        LoadSource::Memory {
            name: name.into(),
            buffer: buffer.into(),
        }
    }

    /// Name the resulting handle is known by. Unique per backend.
    pub fn module_name(&self) -> String {
        match self {
            LoadSource::Files(paths) => paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(";"),
            LoadSource::Memory { name, .. } => name.clone(),
            LoadSource::Package(path) => path.display().to_string(),
        }
    }

    /// Reads file sources into memory, one `(name, text)` pair per file.
    pub fn read_sources(&self) -> std::io::Result<Vec<(String, String)>> {
        match self {
            LoadSource::Files(paths) => paths
                .iter()
                .map(|p| Ok((p.display().to_string(), std::fs::read_to_string(p)?)))
                .collect(),
            LoadSource::Memory { name, buffer } => {
                Ok(vec![(name.clone(), String::from_utf8_lossy(buffer).into_owned())])
            }
            LoadSource::Package(path) => Ok(vec![(
                path.display().to_string(),
                std::fs::read_to_string(path)?,
            )]),
        }
    }
}

/// 链接方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Linkage {
    /// Symbols are also published in the registry-wide scope.
    #[default]
    Global,
    /// Symbols are reachable only through the handle.
    Private,
}

/// 发现阶段导出的符号
pub enum Export {
    Function {
        name: String,
        signature: Signature,
        interface: Box<dyn FunctionInterface>,
    },
    Class(Arc<Class>),
    Value { name: String, value: Value },
}

impl Export {
    pub fn function(
        name: impl Into<String>,
        signature: Signature,
        interface: Box<dyn FunctionInterface>,
    ) -> Self {
        Export::Function {
            name: name.into(),
            signature,
            interface,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Export::Function { name, .. } => name,
            Export::Class(class) => class.name(),
            Export::Value { name, .. } => name,
        }
    }
}

/// 语言后端
pub trait Backend: Send {
    /// Canonical file extension (without the dot).
    fn extension(&self) -> &str;

    /// Named types the backend publishes.
    fn types(&self) -> Vec<Type> {
        Vec::new()
    }

    /// 一次性初始化（首次加载时调用）
    fn initialize(&mut self, config: &LoaderConfig) -> LoaderResult<()>;

    /// 追加模块搜索路径
    fn execution_path(&mut self, _path: &Path) -> LoaderResult<()> {
        Ok(())
    }

    fn load(&mut self, source: &LoadSource) -> LoaderResult<BackendModule>;

    /// Enumerates exported callables, classes and values of a loaded module.
    fn discover(&mut self, module: &mut BackendModule) -> LoaderResult<Vec<Export>>;

    /// 释放模块的后端资源
    fn clear(&mut self, module: BackendModule) -> LoaderResult<()>;

    /// 后端完全销毁
    fn destroy(&mut self);
}

/// 延迟创建后端的工厂
pub trait BackendFactory: Send {
    fn create(&self, tag: &str, config: &LoaderConfig) -> LoaderResult<Box<dyn Backend>>;
}

impl<F> BackendFactory for F
where
    F: Fn(&str, &LoaderConfig) -> LoaderResult<Box<dyn Backend>> + Send,
{
    fn create(&self, tag: &str, config: &LoaderConfig) -> LoaderResult<Box<dyn Backend>> {
        self(tag, config)
    }
}

/// Downcasts a module object created by the same backend.
pub fn module_ref<'a, T: 'static>(tag: &str, module: &'a mut BackendModule) -> LoaderResult<&'a mut T> {
    module
        .downcast_mut::<T>()
        .ok_or_else(|| crate::core::error::LoaderError::LoadFailed {
            tag: tag.to_string(),
            module: "<foreign>".to_string(),
            reason: "module object belongs to another backend".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_names() {
        assert_eq!(LoadSource::file("a/b.js").module_name(), "a/b.js");
        assert_eq!(
            LoadSource::Files(vec!["x.mock".into(), "y.mock".into()]).module_name(),
            "x.mock;y.mock"
        );
        assert_eq!(LoadSource::memory("inline", "1+1").module_name(), "inline");
    }

    #[test]
    fn test_read_memory_source() {
        let sources = LoadSource::memory("m", b"let x = 1;".to_vec()).read_sources().unwrap();
        assert_eq!(sources, vec![("m".to_string(), "let x = 1;".to_string())]);
    }

    #[test]
    fn test_module_ref_rejects_foreign_modules() {
        let mut module: BackendModule = Box::new(5u32);
        assert_eq!(*module_ref::<u32>("mock", &mut module).unwrap(), 5);
        assert!(module_ref::<String>("mock", &mut module).is_err());
    }
}

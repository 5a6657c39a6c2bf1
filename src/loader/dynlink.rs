//! 动态后端加载
//!
//! Backends shipped as shared libraries are found in the configured library
//! directory as `lib<tag>_loader` (platform prefix/suffix applied) and must
//! export `<tag>_loader_impl_interface_singleton`.

use super::backend::{Backend, BackendFactory, BackendModule, Export, LoadSource};
use crate::config::LoaderConfig;
use crate::core::error::{LoaderError, LoaderResult};
use crate::reflect::Type;
use libloading::{Library, Symbol};
use std::path::{Path, PathBuf};

type BackendConstructor = unsafe extern "C" fn() -> *mut dyn Backend;

/// 共享库后端工厂
#[derive(Debug, Clone, Default)]
pub struct DynlinkFactory {
    library_path: Option<PathBuf>,
}

impl DynlinkFactory {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    pub fn library_file(tag: &str) -> std::ffi::OsString {
        libloading::library_filename(format!("{}_loader", tag))
    }

    pub fn symbol_name(tag: &str) -> String {
        format!("{}_loader_impl_interface_singleton", tag)
    }

    fn library_dir<'a>(&'a self, config: &'a LoaderConfig) -> LoaderResult<&'a Path> {
        self.library_path
            .as_deref()
            .or(config.library_path.as_deref())
            .ok_or_else(|| LoaderError::Library("no library path configured".to_string()))
    }
}

impl BackendFactory for DynlinkFactory {
    fn create(&self, tag: &str, config: &LoaderConfig) -> LoaderResult<Box<dyn Backend>> {
        let path = self.library_dir(config)?.join(Self::library_file(tag));
        tracing::info!(target: "loader", "Loading backend library {}", path.display());

        // SAFETY: the library is trusted to follow the backend export
        // convention; it stays loaded for as long as the backend lives.
        unsafe {
            let library = Library::new(&path)
                .map_err(|e| LoaderError::Library(format!("{}: {}", path.display(), e)))?;

            let backend = {
                let symbol = Self::symbol_name(tag);
                let constructor: Symbol<BackendConstructor> = library
                    .get(symbol.as_bytes())
                    .map_err(|e| LoaderError::Symbol(format!("{}: {}", symbol, e)))?;
                let raw = constructor();
                if raw.is_null() {
                    return Err(LoaderError::Library(format!("{} returned null", symbol)));
                }
                Box::from_raw(raw)
            };

            Ok(Box::new(DynlinkBackend {
                backend,
                _library: library,
            }))
        }
    }
}

/// Keeps the library mapped while the backend it produced is alive.
struct DynlinkBackend {
    // declared first: dropped before the library is unmapped
    backend: Box<dyn Backend>,
    _library: Library,
}

impl Backend for DynlinkBackend {
    fn extension(&self) -> &str {
        self.backend.extension()
    }

    fn types(&self) -> Vec<Type> {
        self.backend.types()
    }

    fn initialize(&mut self, config: &LoaderConfig) -> LoaderResult<()> {
        self.backend.initialize(config)
    }

    fn execution_path(&mut self, path: &Path) -> LoaderResult<()> {
        self.backend.execution_path(path)
    }

    fn load(&mut self, source: &LoadSource) -> LoaderResult<BackendModule> {
        self.backend.load(source)
    }

    fn discover(&mut self, module: &mut BackendModule) -> LoaderResult<Vec<Export>> {
        self.backend.discover(module)
    }

    fn clear(&mut self, module: BackendModule) -> LoaderResult<()> {
        self.backend.clear(module)
    }

    fn destroy(&mut self) {
        self.backend.destroy();
    }
}

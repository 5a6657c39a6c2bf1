//! 加载器注册表
//!
//! Owns the tag -> backend map, every live handle and the registry-wide
//! (global) scope. All mutation goes through one mutex, so discovery never
//! races with another load or clear.
//!
//! `clear` and `destroy` detach handles under the mutex and destroy their
//! symbols after releasing it. Destroy hooks and in-flight calls may call
//! back into the registry, including clearing the handle that is running.
//!
//! A failed `load` leaves nothing behind: scope, handle, global symbols and
//! backend module are all rolled back before the error is returned.

use super::backend::{Backend, BackendFactory, BackendModule, Export, LoadSource, Linkage};
use super::path::resolve_script;
use crate::config::LoaderConfig;
use crate::core::error::{LoaderError, LoaderResult};
use crate::reflect::{DefinePolicy, Function, Scope, Value};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// 句柄标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(u64);

impl HandleId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Who defined a symbol in the global scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    Host,
    Handle(HandleId),
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Host => f.write_str("host"),
            Owner::Handle(id) => write!(f, "handle {}", id),
        }
    }
}

struct BackendEntry {
    backend: Box<dyn Backend>,
    initialized: bool,
    execution_paths: Vec<PathBuf>,
}

struct HandleEntry {
    tag: String,
    module_name: String,
    linkage: Linkage,
    module: Option<BackendModule>,
    scope: Scope,
}

struct RegistryState {
    config: LoaderConfig,
    backends: HashMap<String, BackendEntry>,
    order: Vec<String>,
    factories: HashMap<String, Box<dyn BackendFactory>>,
    handles: BTreeMap<u64, HandleEntry>,
    next_id: u64,
    global: Scope,
    owners: HashMap<String, Owner>,
}

/// 加载器注册表
pub struct LoaderRegistry {
    state: Mutex<RegistryState>,
}

impl LoaderRegistry {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                config,
                backends: HashMap::new(),
                order: Vec::new(),
                factories: HashMap::new(),
                handles: BTreeMap::new(),
                next_id: 1,
                global: Scope::new("global"),
                owners: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 注册后端
    ///
    /// Fails if a backend instance already exists for `tag`.
    pub fn register(&self, tag: &str, backend: Box<dyn Backend>) -> LoaderResult<()> {
        let mut state = self.lock();
        if state.backends.contains_key(tag) {
            return Err(LoaderError::DuplicateBackend(tag.to_string()));
        }
        state.insert_backend(tag, backend);
        tracing::info!(target: "loader", "Backend registered: {}", tag);

        if !state.config.lazy_initialize {
            state.initialize_backend(tag)?;
        }
        Ok(())
    }

    /// 注册延迟创建的后端工厂
    pub fn register_factory(&self, tag: &str, factory: Box<dyn BackendFactory>) -> LoaderResult<()> {
        let mut state = self.lock();
        if state.factories.contains_key(tag) {
            return Err(LoaderError::DuplicateBackend(tag.to_string()));
        }
        state.factories.insert(tag.to_string(), factory);
        tracing::debug!(target: "loader", "Backend factory registered: {}", tag);
        Ok(())
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        let state = self.lock();
        state.backends.contains_key(tag) || state.factories.contains_key(tag)
    }

    /// Registered tags in registration order; factory-only tags last.
    pub fn tags(&self) -> Vec<String> {
        let state = self.lock();
        let mut tags = state.order.clone();
        let mut pending: Vec<String> = state
            .factories
            .keys()
            .filter(|t| !state.backends.contains_key(*t))
            .cloned()
            .collect();
        pending.sort();
        tags.extend(pending);
        tags
    }

    /// 追加后端的模块搜索路径
    pub fn execution_path(&self, tag: &str, path: impl Into<PathBuf>) -> LoaderResult<()> {
        let path = path.into();
        let mut state = self.lock();
        state.ensure_backend(tag)?;
        let entry = state
            .backends
            .get_mut(tag)
            .ok_or_else(|| LoaderError::UnknownTag(tag.to_string()))?;
        if entry.initialized {
            entry.backend.execution_path(&path)?;
        }
        tracing::debug!(target: "loader", "Execution path for {}: {}", tag, path.display());
        entry.execution_paths.push(path);
        Ok(())
    }

    /// 在执行路径中查找脚本
    pub fn resolve_script(&self, tag: &str, script: &Path) -> LoaderResult<PathBuf> {
        let state = self.lock();
        let mut search: Vec<PathBuf> = state
            .backends
            .get(tag)
            .map(|e| e.execution_paths.clone())
            .unwrap_or_default();
        search.extend(state.config.script_paths.iter().cloned());
        resolve_script(script, &search)
            .ok_or_else(|| LoaderError::ScriptNotFound(script.display().to_string()))
    }

    /// 加载模块
    ///
    /// Creates and initializes the backend on first use, loads the source,
    /// runs discovery into a fresh scope and publishes it under a new handle.
    pub fn load(&self, tag: &str, source: &LoadSource, linkage: Linkage) -> LoaderResult<HandleId> {
        let mut state = self.lock();
        state.ensure_backend(tag)?;
        state.initialize_backend(tag)?;

        let module_name = source.module_name();
        if state
            .handles
            .values()
            .any(|h| h.tag == tag && h.module_name == module_name)
        {
            return Err(LoaderError::HandleExists {
                tag: tag.to_string(),
                module: module_name,
            });
        }

        let id = HandleId(state.next_id);
        let (module, scope) = state.load_module(tag, &module_name, source)?;

        if linkage == Linkage::Global {
            if let Err(e) = state.publish(id, &scope) {
                tracing::warn!(target: "loader", "Rolling back {} ({}): {}", module_name, tag, e);
                state.rollback(tag, module, scope);
                return Err(e);
            }
        }

        state.next_id += 1;
        tracing::info!(
            target: "loader",
            "Loaded {} with backend {} as handle {} ({} symbols)",
            module_name,
            tag,
            id,
            scope.len()
        );
        state.handles.insert(
            id.0,
            HandleEntry {
                tag: tag.to_string(),
                module_name,
                linkage,
                module: Some(module),
                scope,
            },
        );
        Ok(id)
    }

    /// 清理句柄（幂等）
    ///
    /// Returns `false` if the handle was already cleared.
    pub fn clear(&self, handle: HandleId) -> LoaderResult<bool> {
        let mut entry = {
            let mut state = self.lock();
            if handle.0 == 0 || handle.0 >= state.next_id {
                return Err(LoaderError::UnknownHandle(handle.0));
            }
            let Some(entry) = state.handles.remove(&handle.0) else {
                return Ok(false);
            };
            state.unpublish(handle, &entry);
            entry
        };

        entry.scope.clear();
        if let Some(module) = entry.module.take() {
            self.lock().backend(&entry.tag)?.clear(module)?;
        }
        tracing::info!(target: "loader", "Cleared handle {} ({})", handle, entry.module_name);
        Ok(true)
    }

    /// 销毁全部句柄和后端
    ///
    /// Handles are cleared newest first, then the global scope, then the
    /// initialized backends in reverse registration order.
    pub fn destroy(&self) {
        let (handles, mut global, mut backends) = {
            let mut state = self.lock();
            let handles = std::mem::take(&mut state.handles);
            let global = std::mem::replace(&mut state.global, Scope::new("global"));
            state.owners.clear();
            let order = std::mem::take(&mut state.order);
            let backends: Vec<(String, BackendEntry)> = order
                .into_iter()
                .filter_map(|tag| state.backends.remove(&tag).map(|entry| (tag, entry)))
                .collect();
            (handles, global, backends)
        };

        for (id, mut entry) in handles.into_iter().rev() {
            entry.scope.clear();
            let Some(module) = entry.module.take() else { continue };
            match backends.iter_mut().find(|(tag, _)| *tag == entry.tag) {
                Some((_, backend)) => {
                    if let Err(e) = backend.backend.clear(module) {
                        tracing::error!(target: "loader", "Failed to clear handle #{}: {}", id, e);
                    }
                }
                None => tracing::warn!(target: "loader", "No backend {} for handle #{}", entry.tag, id),
            }
            tracing::info!(target: "loader", "Cleared handle #{} ({})", id, entry.module_name);
        }
        global.clear();

        for (tag, mut entry) in backends.into_iter().rev() {
            if entry.initialized {
                entry.backend.destroy();
            }
            tracing::info!(target: "loader", "Backend destroyed: {}", tag);
        }
    }

    /// 在全局作用域中定义宿主符号
    pub fn define_host(&self, name: &str, value: Value, policy: DefinePolicy) -> LoaderResult<()> {
        let old = {
            let mut state = self.lock();
            if policy == DefinePolicy::Overwrite {
                if let Some(Owner::Handle(id)) = state.owners.get(name) {
                    return Err(LoaderError::SymbolConflict {
                        symbol: name.to_string(),
                        owner: Owner::Handle(*id).to_string(),
                    });
                }
            }
            let old = state.global.define(name, value, policy)?;
            state.owners.insert(name.to_string(), Owner::Host);
            old
        };
        if let Some(f) = old.and_then(|v| v.to_function().ok()) {
            f.destroy();
        }
        Ok(())
    }

    /// 按名称查找全局函数
    pub fn function(&self, name: &str) -> Option<Arc<Function>> {
        let state = self.lock();
        state.global.get(name).and_then(|v| v.to_function().ok())
    }

    /// 查找全局符号
    pub fn global(&self, name: &str) -> Option<Value> {
        self.lock().global.get(name).cloned()
    }

    pub fn handle_function(&self, handle: HandleId, name: &str) -> LoaderResult<Option<Arc<Function>>> {
        let state = self.lock();
        let entry = state.handle(handle)?;
        Ok(entry.scope.get(name).and_then(|v| v.to_function().ok()))
    }

    pub fn handle_value(&self, handle: HandleId, name: &str) -> LoaderResult<Option<Value>> {
        let state = self.lock();
        Ok(state.handle(handle)?.scope.get(name).cloned())
    }

    /// Exports a handle's scope as a `Map` value.
    pub fn handle_export(&self, handle: HandleId) -> LoaderResult<Value> {
        let state = self.lock();
        Ok(state.handle(handle)?.scope.export())
    }

    pub fn handle_names(&self, handle: HandleId) -> LoaderResult<Vec<String>> {
        let state = self.lock();
        Ok(state.handle(handle)?.scope.names())
    }

    pub fn handles(&self) -> Vec<HandleId> {
        self.lock().handles.keys().map(|id| HandleId(*id)).collect()
    }

    /// 注册表状态的 JSON 描述
    pub fn inspect(&self) -> serde_json::Value {
        let state = self.lock();
        let mut backends = serde_json::Map::new();
        for tag in &state.order {
            let Some(entry) = state.backends.get(tag) else { continue };
            let handles: Vec<serde_json::Value> = state
                .handles
                .iter()
                .filter(|(_, h)| &h.tag == tag)
                .map(|(id, h)| {
                    let linkage = match h.linkage {
                        Linkage::Global => "global",
                        Linkage::Private => "private",
                    };
                    json!({
                        "id": id,
                        "name": h.module_name,
                        "linkage": linkage,
                        "scope": h.scope.metadata(),
                    })
                })
                .collect();
            let paths: Vec<String> = entry
                .execution_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            backends.insert(
                tag.clone(),
                json!({
                    "extension": entry.backend.extension(),
                    "initialized": entry.initialized,
                    "execution_paths": paths,
                    "types": entry.backend.types().iter().map(|t| t.metadata()).collect::<Vec<_>>(),
                    "handles": handles,
                }),
            );
        }
        json!({
            "backends": backends,
            "global": state.global.names(),
        })
    }
}

impl Drop for LoaderRegistry {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl RegistryState {
    fn insert_backend(&mut self, tag: &str, backend: Box<dyn Backend>) {
        self.backends.insert(
            tag.to_string(),
            BackendEntry {
                backend,
                initialized: false,
                execution_paths: Vec::new(),
            },
        );
        self.order.push(tag.to_string());
    }

    // Unknown tags fail before anything is inserted.
    fn ensure_backend(&mut self, tag: &str) -> LoaderResult<()> {
        if self.backends.contains_key(tag) {
            return Ok(());
        }
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| LoaderError::UnknownTag(tag.to_string()))?;
        let backend = factory.create(tag, &self.config)?;
        tracing::info!(target: "loader", "Backend created lazily: {}", tag);
        self.insert_backend(tag, backend);
        Ok(())
    }

    fn initialize_backend(&mut self, tag: &str) -> LoaderResult<()> {
        let entry = self
            .backends
            .get_mut(tag)
            .ok_or_else(|| LoaderError::UnknownTag(tag.to_string()))?;
        if entry.initialized {
            return Ok(());
        }
        entry.backend.initialize(&self.config).map_err(|e| {
            tracing::error!(target: "loader", "Backend {} failed to initialize: {}", tag, e);
            match e {
                LoaderError::InitializeFailed { .. } => e,
                other => LoaderError::InitializeFailed {
                    tag: tag.to_string(),
                    reason: other.to_string(),
                },
            }
        })?;
        for path in &entry.execution_paths {
            entry.backend.execution_path(path)?;
        }
        entry.initialized = true;
        tracing::info!(target: "loader", "Backend initialized: {}", tag);
        Ok(())
    }

    fn handle(&self, handle: HandleId) -> LoaderResult<&HandleEntry> {
        self.handles
            .get(&handle.0)
            .ok_or(LoaderError::UnknownHandle(handle.0))
    }

    fn backend(&mut self, tag: &str) -> LoaderResult<&mut Box<dyn Backend>> {
        self.backends
            .get_mut(tag)
            .map(|e| &mut e.backend)
            .ok_or_else(|| LoaderError::UnknownTag(tag.to_string()))
    }

    fn load_module(
        &mut self,
        tag: &str,
        module_name: &str,
        source: &LoadSource,
    ) -> LoaderResult<(BackendModule, Scope)> {
        let backend = self.backend(tag)?;
        let mut module = backend.load(source).map_err(|e| {
            tracing::error!(target: "loader", "Backend {} failed to load {}: {}", tag, module_name, e);
            e
        })?;

        let exports = match backend.discover(&mut module) {
            Ok(exports) => exports,
            Err(e) => {
                tracing::error!(target: "loader", "Discovery of {} failed: {}", module_name, e);
                if let Err(clear_err) = backend.clear(module) {
                    tracing::warn!(target: "loader", "Clear after failed discovery: {}", clear_err);
                }
                return Err(LoaderError::DiscoverFailed {
                    tag: tag.to_string(),
                    module: module_name.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let mut scope = Scope::new(module_name);
        if let Err(e) = populate(&mut scope, exports) {
            tracing::error!(target: "loader", "Discovery of {} failed: {}", module_name, e);
            self.rollback(tag, module, scope);
            return Err(LoaderError::DiscoverFailed {
                tag: tag.to_string(),
                module: module_name.to_string(),
                reason: e.to_string(),
            });
        }
        Ok((module, scope))
    }

    fn rollback(&mut self, tag: &str, module: BackendModule, mut scope: Scope) {
        scope.clear();
        if let Ok(backend) = self.backend(tag) {
            if let Err(e) = backend.clear(module) {
                tracing::warn!(target: "loader", "Backend {} failed to release module: {}", tag, e);
            }
        }
    }

    // Merges a handle scope into the global scope; all or nothing.
    fn publish(&mut self, id: HandleId, scope: &Scope) -> LoaderResult<()> {
        if let Some(symbol) = scope.names().into_iter().find(|n| self.global.contains(n)) {
            let owner = self
                .owners
                .get(&symbol)
                .map(|o| o.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(LoaderError::SymbolConflict { symbol, owner });
        }
        self.global.append(scope, DefinePolicy::Reject)?;
        for name in scope.names() {
            self.owners.insert(name, Owner::Handle(id));
        }
        Ok(())
    }

    // Drops the handle's symbols from the global scope without destroying them.
    fn unpublish(&mut self, id: HandleId, entry: &HandleEntry) {
        if entry.linkage == Linkage::Global {
            self.global.remove(&entry.scope);
            self.owners.retain(|_, owner| *owner != Owner::Handle(id));
        }
    }
}

fn populate(scope: &mut Scope, exports: Vec<Export>) -> LoaderResult<()> {
    for export in exports {
        match export {
            Export::Function {
                name,
                signature,
                interface,
            } => {
                let function = Function::new(name.clone(), signature, interface)?;
                scope.define(&name, Value::function(function), DefinePolicy::Reject)?;
            }
            Export::Class(class) => {
                let name = class.name().to_string();
                scope.define(&name, Value::class(class), DefinePolicy::Reject)?;
            }
            Export::Value { name, value } => {
                scope.define(&name, value, DefinePolicy::Reject)?;
            }
        }
    }
    tracing::debug!(target: "loader", "Scope {} populated with {} symbols", scope.name(), scope.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{FunctionInterface, Signature};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Stats {
        initialized: AtomicUsize,
        loaded: AtomicUsize,
        cleared: AtomicUsize,
        destroyed: AtomicUsize,
    }

    struct Constant(i32);

    impl FunctionInterface for Constant {
        fn invoke(&self, _func: &Function, _args: &[Value]) -> Option<Value> {
            Some(Value::int(self.0))
        }
    }

    /// Module source is a list of `name=value` lines; `!` fails discovery.
    struct LineBackend {
        stats: Arc<Stats>,
    }

    impl Backend for LineBackend {
        fn extension(&self) -> &str {
            "line"
        }

        fn initialize(&mut self, _config: &LoaderConfig) -> LoaderResult<()> {
            self.stats.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn load(&mut self, source: &LoadSource) -> LoaderResult<BackendModule> {
            let text = source.read_sources()?.into_iter().map(|(_, t)| t).collect::<String>();
            if text.contains("syntax error") {
                return Err(LoaderError::LoadFailed {
                    tag: "line".to_string(),
                    module: source.module_name(),
                    reason: "syntax error".to_string(),
                });
            }
            self.stats.loaded.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(text))
        }

        fn discover(&mut self, module: &mut BackendModule) -> LoaderResult<Vec<Export>> {
            let text = crate::loader::backend::module_ref::<String>("line", module)?;
            let mut exports = Vec::new();
            for line in text.lines().filter(|l| !l.is_empty()) {
                if line == "!" {
                    return Err(LoaderError::Symbol("bad export".to_string()));
                }
                let (name, value) = line.split_once('=').unwrap_or((line, "0"));
                let value: i32 = value.parse().unwrap_or(0);
                exports.push(Export::function(name, Signature::new(0), Box::new(Constant(value))));
            }
            Ok(exports)
        }

        fn clear(&mut self, _module: BackendModule) -> LoaderResult<()> {
            self.stats.cleared.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn destroy(&mut self) {
            self.stats.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn registry(stats: &Arc<Stats>) -> LoaderRegistry {
        let registry = LoaderRegistry::new(LoaderConfig::default());
        registry
            .register(
                "line",
                Box::new(LineBackend {
                    stats: Arc::clone(stats),
                }),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_register_uniqueness() {
        let stats = Arc::new(Stats::default());
        let registry = registry(&stats);
        let second = registry.register(
            "line",
            Box::new(LineBackend {
                stats: Arc::clone(&stats),
            }),
        );
        assert!(matches!(second, Err(LoaderError::DuplicateBackend(_))));
        assert_eq!(registry.tags(), vec!["line".to_string()]);
    }

    #[test]
    fn test_unknown_tag_has_no_side_effects() {
        let stats = Arc::new(Stats::default());
        let registry = registry(&stats);
        let result = registry.load("py", &LoadSource::memory("m", "a=1"), Linkage::Global);
        assert!(matches!(result, Err(LoaderError::UnknownTag(_))));
        assert!(registry.handles().is_empty());
        assert_eq!(registry.tags(), vec!["line".to_string()]);
        assert!(registry.inspect()["global"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_lazy_initialize_and_load() {
        let stats = Arc::new(Stats::default());
        let registry = registry(&stats);
        assert_eq!(stats.initialized.load(Ordering::SeqCst), 0);

        let handle = registry
            .load("line", &LoadSource::memory("m", "answer=42\nzero=0"), Linkage::Global)
            .unwrap();
        assert_eq!(stats.initialized.load(Ordering::SeqCst), 1);
        assert_eq!(registry.handle_names(handle).unwrap(), vec!["answer", "zero"]);

        let answer = registry.function("answer").unwrap();
        assert_eq!(answer.call(&[]).unwrap(), Some(Value::int(42)));
        assert!(registry
            .handle_function(handle, "zero")
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_failed_discovery_rolls_back() {
        let stats = Arc::new(Stats::default());
        let registry = registry(&stats);
        let result = registry.load("line", &LoadSource::memory("m", "a=1\n!"), Linkage::Global);
        assert!(matches!(result, Err(LoaderError::DiscoverFailed { .. })));
        assert!(registry.handles().is_empty());
        assert!(registry.function("a").is_none());
        assert_eq!(stats.cleared.load(Ordering::SeqCst), 1);

        let result = registry.load("line", &LoadSource::memory("m", "syntax error"), Linkage::Global);
        assert!(matches!(result, Err(LoaderError::LoadFailed { .. })));
        assert!(registry.handles().is_empty());
    }

    #[test]
    fn test_duplicate_module_and_symbols() {
        let stats = Arc::new(Stats::default());
        let registry = registry(&stats);
        registry
            .load("line", &LoadSource::memory("m", "a=1"), Linkage::Global)
            .unwrap();

        let again = registry.load("line", &LoadSource::memory("m", "b=1"), Linkage::Global);
        assert!(matches!(again, Err(LoaderError::HandleExists { .. })));

        let clash = registry.load("line", &LoadSource::memory("n", "a=2"), Linkage::Global);
        assert!(matches!(clash, Err(LoaderError::SymbolConflict { .. })));
        assert_eq!(registry.handles().len(), 1);
        assert_eq!(registry.function("a").unwrap().call(&[]).unwrap(), Some(Value::int(1)));

        // private linkage does not touch the global scope
        let private = registry
            .load("line", &LoadSource::memory("n", "a=2"), Linkage::Private)
            .unwrap();
        let a = registry.handle_function(private, "a").unwrap().unwrap();
        assert_eq!(a.call(&[]).unwrap(), Some(Value::int(2)));
    }

    #[test]
    fn test_clear_is_idempotent_and_isolated() {
        let stats = Arc::new(Stats::default());
        let registry = registry(&stats);
        let first = registry
            .load("line", &LoadSource::memory("first", "a=1"), Linkage::Private)
            .unwrap();
        let second = registry
            .load("line", &LoadSource::memory("second", "a=2"), Linkage::Private)
            .unwrap();
        let a1 = registry.handle_function(first, "a").unwrap().unwrap();
        let a2 = registry.handle_function(second, "a").unwrap().unwrap();

        assert!(registry.clear(first).unwrap());
        assert!(!registry.clear(first).unwrap());
        assert!(matches!(
            registry.clear(HandleId(99)),
            Err(LoaderError::UnknownHandle(99))
        ));

        assert!(!a1.is_live());
        assert!(a2.is_live());
        assert_eq!(a2.call(&[]).unwrap(), Some(Value::int(2)));
        assert!(matches!(
            registry.handle_names(first),
            Err(LoaderError::UnknownHandle(_))
        ));
        assert_eq!(stats.cleared.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_factory_and_destroy() {
        let stats = Arc::new(Stats::default());
        let registry = LoaderRegistry::new(LoaderConfig::default());
        let factory_stats = Arc::clone(&stats);
        registry
            .register_factory(
                "line",
                Box::new(move |_tag: &str, _config: &LoaderConfig| -> LoaderResult<Box<dyn Backend>> {
                    Ok(Box::new(LineBackend {
                        stats: Arc::clone(&factory_stats),
                    }))
                }),
            )
            .unwrap();
        assert!(registry.is_registered("line"));

        registry
            .load("line", &LoadSource::memory("m", "a=1"), Linkage::Global)
            .unwrap();
        let a = registry.function("a").unwrap();
        registry.destroy();
        assert!(!a.is_live());
        assert_eq!(stats.cleared.load(Ordering::SeqCst), 1);
        assert_eq!(stats.destroyed.load(Ordering::SeqCst), 1);
        assert!(registry.handles().is_empty());
    }

    #[test]
    fn test_host_symbols() {
        let stats = Arc::new(Stats::default());
        let registry = registry(&stats);
        let host = Function::from_closure("host", Signature::new(0), |_| Some(Value::bool(true))).unwrap();
        registry
            .define_host("host", Value::function(host), DefinePolicy::Reject)
            .unwrap();
        assert!(registry.global("host").unwrap().to_function().unwrap().is_live());

        let clash = registry.load("line", &LoadSource::memory("m", "host=1"), Linkage::Global);
        assert!(matches!(clash, Err(LoaderError::SymbolConflict { owner, .. }) if owner == "host"));
    }

    #[test]
    fn test_inspect() {
        let stats = Arc::new(Stats::default());
        let registry = registry(&stats);
        registry.execution_path("line", "/tmp").unwrap();
        registry
            .load("line", &LoadSource::memory("m", "a=1"), Linkage::Global)
            .unwrap();
        let meta = registry.inspect();
        let line = &meta["backends"]["line"];
        assert_eq!(line["extension"], "line");
        assert_eq!(line["initialized"], true);
        assert_eq!(line["handles"][0]["name"], "m");
        assert_eq!(line["handles"][0]["scope"]["funcs"][0]["name"], "a");
        assert_eq!(meta["global"][0], "a");
    }
}

//! 原生后端
//!
//! Host-defined modules of Rust closures. Modules are registered on the
//! backend's `NativeModules` table and loaded by name (from memory, or from
//! a file/package path whose stem is the module name).
//!
//! Asynchronous functions run on a multi-threaded tokio runtime owned by the
//! backend, so their completions fire on worker threads (free-threaded).

use crate::config::{AsyncConfig, LoaderConfig};
use crate::core::error::{ClassResult, LoaderError, LoaderResult};
use crate::loader::{module_ref, path_name, Backend, BackendModule, Export, LoadSource};
use crate::reflect::{
    AsyncCompletion, Class, Exception, Function, FunctionInterface, Signature, Value,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 异步原生函数的返回值
pub type NativeFuture = BoxFuture<'static, Result<Value, Value>>;

type SyncFn = Arc<dyn Fn(&[Value]) -> Option<Value> + Send + Sync>;
type AsyncFn = Arc<dyn Fn(Vec<Value>) -> NativeFuture + Send + Sync>;
type ClassFn = Arc<dyn Fn() -> ClassResult<Arc<Class>> + Send + Sync>;

#[derive(Clone)]
enum Definition {
    Function {
        name: String,
        signature: Signature,
        body: SyncFn,
    },
    AsyncFunction {
        name: String,
        signature: Signature,
        body: AsyncFn,
    },
    Class(ClassFn),
    Value { name: String, value: Value },
}

/// 原生模块定义
#[derive(Clone)]
pub struct NativeModule {
    name: String,
    definitions: Vec<Definition>,
}

impl NativeModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definitions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function<F>(mut self, name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(&[Value]) -> Option<Value> + Send + Sync + 'static,
    {
        self.definitions.push(Definition::Function {
            name: name.into(),
            signature,
            body: Arc::new(body),
        });
        self
    }

    /// 异步函数：返回的 future 解决或拒绝调用
    pub fn async_function<F, Fut>(mut self, name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, Value>> + Send + 'static,
    {
        self.definitions.push(Definition::AsyncFunction {
            name: name.into(),
            signature,
            body: Arc::new(move |args| body(args).boxed()),
        });
        self
    }

    /// Classes are rebuilt on every load, so clearing one handle never
    /// destroys a class another handle still uses.
    pub fn class<F>(mut self, build: F) -> Self
    where
        F: Fn() -> ClassResult<Arc<Class>> + Send + Sync + 'static,
    {
        self.definitions.push(Definition::Class(Arc::new(build)));
        self
    }

    pub fn value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.definitions.push(Definition::Value {
            name: name.into(),
            value,
        });
        self
    }
}

/// 共享的原生模块表
#[derive(Clone, Default)]
pub struct NativeModules {
    modules: Arc<Mutex<HashMap<String, NativeModule>>>,
}

impl NativeModules {
    /// Adds or replaces a module definition. Already loaded handles keep
    /// the definition they were loaded from.
    pub fn define(&self, module: NativeModule) {
        let mut modules = self.modules.lock().unwrap_or_else(|e| e.into_inner());
        modules.insert(module.name.clone(), module);
    }

    pub fn get(&self, name: &str) -> Option<NativeModule> {
        self.modules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .modules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

struct SyncInterface(SyncFn);

impl FunctionInterface for SyncInterface {
    fn invoke(&self, _func: &Function, args: &[Value]) -> Option<Value> {
        (self.0)(args)
    }
}

struct AsyncInterface {
    body: AsyncFn,
    handle: tokio::runtime::Handle,
}

impl FunctionInterface for AsyncInterface {
    /// Runs the future to completion; a rejection comes back as a
    /// `Throwable` wrapping the rejected value.
    fn invoke(&self, func: &Function, args: &[Value]) -> Option<Value> {
        let (tx, rx) = futures::channel::oneshot::channel();
        let future = (self.body)(args.to_vec());
        self.handle.spawn(async move {
            let _ = tx.send(future.await);
        });
        match futures::executor::block_on(rx) {
            Ok(Ok(value)) => Some(value),
            Ok(Err(rejected)) => Some(Value::throwable(rejected)),
            Err(cancelled) => {
                tracing::error!(target: "native", "Async function {} was cancelled", func.name());
                let exception = Exception::from_error("Cancelled", &cancelled);
                Some(Value::throwable(Value::exception(exception)))
            }
        }
    }

    fn supports_await(&self) -> bool {
        true
    }

    fn await_call(&self, _func: &Function, args: &[Value], completion: AsyncCompletion) {
        let future = (self.body)(args.to_vec());
        self.handle.spawn(async move {
            completion.settle(future.await);
        });
    }
}

/// 原生后端
pub struct NativeBackend {
    config: AsyncConfig,
    modules: NativeModules,
    runtime: Option<tokio::runtime::Runtime>,
}

impl NativeBackend {
    pub fn new(config: AsyncConfig) -> Self {
        Self {
            config,
            modules: NativeModules::default(),
            runtime: None,
        }
    }

    /// Handle to the module table, usable after the backend is registered.
    pub fn modules(&self) -> NativeModules {
        self.modules.clone()
    }

    fn handle(&self) -> LoaderResult<tokio::runtime::Handle> {
        self.runtime
            .as_ref()
            .map(|rt| rt.handle().clone())
            .ok_or_else(|| LoaderError::InitializeFailed {
                tag: "native".to_string(),
                reason: "async runtime is not running".to_string(),
            })
    }
}

impl Backend for NativeBackend {
    fn extension(&self) -> &str {
        "native"
    }

    fn initialize(&mut self, _config: &LoaderConfig) -> LoaderResult<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.worker_threads)
            .thread_name(self.config.thread_name.clone())
            .enable_all()
            .build()
            .map_err(|e| LoaderError::InitializeFailed {
                tag: "native".to_string(),
                reason: e.to_string(),
            })?;
        tracing::info!(
            target: "native",
            "Native backend started {} async workers",
            self.config.worker_threads
        );
        self.runtime = Some(runtime);
        Ok(())
    }

    fn load(&mut self, source: &LoadSource) -> LoaderResult<BackendModule> {
        let name = match source {
            LoadSource::Memory { name, .. } => name.clone(),
            LoadSource::Files(paths) => paths
                .first()
                .and_then(|p| p.to_str())
                .and_then(path_name)
                .unwrap_or_default()
                .to_string(),
            LoadSource::Package(path) => path
                .to_str()
                .and_then(path_name)
                .unwrap_or_default()
                .to_string(),
        };
        let module = self.modules.get(&name).ok_or_else(|| LoaderError::LoadFailed {
            tag: "native".to_string(),
            module: name.clone(),
            reason: "no native module with this name".to_string(),
        })?;
        tracing::debug!(target: "native", "Native module {} loaded", name);
        Ok(Box::new(module))
    }

    fn discover(&mut self, module: &mut BackendModule) -> LoaderResult<Vec<Export>> {
        let handle = self.handle()?;
        let module = module_ref::<NativeModule>("native", module)?;
        let mut exports = Vec::with_capacity(module.definitions.len());
        for definition in &module.definitions {
            let export = match definition {
                Definition::Function {
                    name,
                    signature,
                    body,
                } => Export::function(name.clone(), signature.clone(), Box::new(SyncInterface(Arc::clone(body)))),
                Definition::AsyncFunction {
                    name,
                    signature,
                    body,
                } => Export::function(
                    name.clone(),
                    signature.clone(),
                    Box::new(AsyncInterface {
                        body: Arc::clone(body),
                        handle: handle.clone(),
                    }),
                ),
                Definition::Class(build) => {
                    let class = build().map_err(|e| LoaderError::DiscoverFailed {
                        tag: "native".to_string(),
                        module: module.name.clone(),
                        reason: e.to_string(),
                    })?;
                    Export::Class(class)
                }
                Definition::Value { name, value } => Export::Value {
                    name: name.clone(),
                    value: value.clone(),
                },
            };
            exports.push(export);
        }
        Ok(exports)
    }

    fn clear(&mut self, module: BackendModule) -> LoaderResult<()> {
        if let Ok(module) = module.downcast::<NativeModule>() {
            tracing::debug!(target: "native", "Native module {} cleared", module.name);
        }
        Ok(())
    }

    fn destroy(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        tracing::info!(target: "native", "Native backend destroyed");
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{Linkage, LoaderRegistry};
    use crate::reflect::{ClassInterface, Constructor, Object, ObjectInterface};
    use std::time::Duration;

    fn config() -> AsyncConfig {
        AsyncConfig {
            worker_threads: 2,
            thread_name: "native-test".to_string(),
        }
    }

    fn registry_with(module: NativeModule) -> LoaderRegistry {
        let backend = NativeBackend::new(config());
        backend.modules().define(module);
        let registry = LoaderRegistry::new(LoaderConfig::default());
        registry.register("native", Box::new(backend)).unwrap();
        registry
    }

    #[test]
    fn test_sync_function() {
        let module = NativeModule::new("math").function("sum", Signature::new(2), |args| {
            Some(Value::int(args[0].to_int().ok()? + args[1].to_int().ok()?))
        });
        let registry = registry_with(module);
        registry
            .load("native", &LoadSource::memory("math", ""), Linkage::Global)
            .unwrap();
        let sum = registry.function("sum").unwrap();
        assert_eq!(sum.call(&[Value::int(3), Value::int(4)]).unwrap(), Some(Value::int(7)));
    }

    #[test]
    fn test_async_function_settles_on_worker() {
        let module = NativeModule::new("timers").async_function("later", Signature::new(1), |args| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            match args.first() {
                Some(v) if !v.is_null() => Ok(v.clone()),
                _ => Err(Value::string("nothing to return")),
            }
        });
        let registry = registry_with(module);
        registry
            .load("native", &LoadSource::file("lib/timers.native"), Linkage::Global)
            .unwrap();
        let later = registry.function("later").unwrap();
        assert!(later.is_async());

        let future = later
            .call_async(&[Value::int(58)], Box::new(|v| v), Box::new(|v| v))
            .unwrap()
            .to_future()
            .unwrap();
        assert_eq!(future.wait_timeout(Duration::from_secs(5)), Some(Ok(Value::int(58))));

        let rejected = later
            .call_async(&[Value::null()], Box::new(|v| v), Box::new(|v| v))
            .unwrap()
            .to_future()
            .unwrap();
        assert_eq!(
            rejected.wait_timeout(Duration::from_secs(5)),
            Some(Err(Value::string("nothing to return")))
        );

        // blocking invocation of an async function
        assert_eq!(later.call(&[Value::int(1)]).unwrap(), Some(Value::int(1)));
        let thrown = later.call(&[Value::null()]).unwrap().unwrap();
        assert_eq!(thrown.to_throwable().unwrap(), Value::string("nothing to return"));
    }

    #[test]
    fn test_unknown_module() {
        let registry = registry_with(NativeModule::new("a"));
        let result = registry.load("native", &LoadSource::memory("b", ""), Linkage::Global);
        assert!(matches!(result, Err(LoaderError::LoadFailed { .. })));
    }

    struct Empty;

    impl ObjectInterface for Empty {
        fn get(&self, _object: &Object, _attribute: &str) -> Option<Value> {
            None
        }

        fn set(&self, _object: &Object, _attribute: &str, _value: Value) -> Result<(), Value> {
            Ok(())
        }

        fn method_invoke(&self, _object: &Object, _method: &str, _args: &[Value]) -> Option<Value> {
            None
        }
    }

    struct EmptyClass;

    impl ClassInterface for EmptyClass {
        fn constructor(
            &self,
            _class: &Class,
            _constructor: &Constructor,
            _args: &[Value],
        ) -> Result<Box<dyn ObjectInterface>, Value> {
            Ok(Box::new(Empty))
        }
    }

    #[test]
    fn test_classes_are_rebuilt_per_load() {
        let module = NativeModule::new("shapes")
            .class(|| Class::builder("Shape", Box::new(EmptyClass)).build())
            .value("sides", Value::int(4));
        let registry = registry_with(module);
        let first = registry
            .load("native", &LoadSource::memory("shapes", ""), Linkage::Private)
            .unwrap();
        let shape = registry.handle_value(first, "Shape").unwrap().unwrap();
        assert_eq!(registry.handle_value(first, "sides").unwrap(), Some(Value::int(4)));

        registry.clear(first).unwrap();
        let class = shape.to_class().unwrap();
        assert!(class.new_object("", &[]).is_err());

        let second = registry
            .load("native", &LoadSource::memory("shapes", ""), Linkage::Private)
            .unwrap();
        let shape = registry.handle_value(second, "Shape").unwrap().unwrap();
        let object = shape.to_class().unwrap().new_object("", &[]).unwrap();
        assert!(object.to_object().is_ok());
    }
}

//! 运行时主入口
//!
//! `Runtime` 把配置、加载器注册表、宿主函数和序列化器组合在一起，
//! 是进程使用多语言调用的入口。

use crate::backends::{MockBackend, NativeBackend, NativeModules};
use crate::config::RuntimeConfig;
use crate::core::error::{LoaderError, RuntimeError, RuntimeResult};
use crate::core::logging::init_logging;
use crate::loader::{Backend, DynlinkFactory, HandleId, Linkage, LoadSource, LoaderRegistry};
use crate::reflect::{cast, DefinePolicy, Function, RejectCallback, ResolveCallback, Signature, Value};
use crate::serial::serial_for;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 加载描述文件
///
/// ```json
/// { "language_id": "js", "path": "scripts", "scripts": ["a.js", "b.js"] }
/// ```
///
/// `path` is relative to the descriptor's directory; scripts are relative
/// to `path`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoadConfiguration {
    pub language_id: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    pub scripts: Vec<PathBuf>,
}

/// 多语言运行时
///
/// `Runtime` 负责：
/// - 注册语言后端（内置的 mock/native/js，或者动态库）
/// - 按文件、内存、包或描述文件加载模块
/// - 按名称调用全局函数，必要时把参数转换为声明的类型
///
/// # 示例
///
/// ```no_run
/// use polyglot_core::{Runtime, RuntimeConfig, Value};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let runtime = Runtime::with_default_backends(RuntimeConfig::load_or_default())?;
///     runtime.initialize();
///     runtime.load_from_file("js", &["sum.js"])?;
///     let result = runtime.call("sum", &[Value::int(3), Value::int(4)])?;
///     println!("{:?}", result);
///     Ok(())
/// }
/// ```
///
/// # 生命周期
///
/// 1. **创建**：验证配置，注册后端（默认延迟初始化）
/// 2. **使用**：加载模块，调用函数
/// 3. **销毁**：`destroy` 或 drop 时按逆序清理全部句柄和后端
pub struct Runtime {
    config: RuntimeConfig,
    registry: LoaderRegistry,
    native: Option<NativeModules>,
}

impl Runtime {
    /// 创建空运行时（不注册任何后端）
    pub fn new(config: RuntimeConfig) -> RuntimeResult<Self> {
        config.validate()?;
        let registry = LoaderRegistry::new(config.loader.clone());
        Ok(Self {
            config,
            registry,
            native: None,
        })
    }

    /// 创建运行时并注册内置后端
    pub fn with_default_backends(config: RuntimeConfig) -> RuntimeResult<Self> {
        let mut runtime = Self::new(config)?;

        runtime.register_backend("mock", Box::new(MockBackend::new()))?;

        let native = NativeBackend::new(runtime.config.async_runtime.clone());
        let modules = native.modules();
        runtime.register_backend("native", Box::new(native))?;
        runtime.native = Some(modules);

        #[cfg(feature = "js")]
        runtime.register_backend("js", Box::new(crate::backends::JsBackend::new()))?;

        Ok(runtime)
    }

    /// 初始化日志系统
    ///
    /// Returns `false` if a subscriber was already installed.
    pub fn initialize(&self) -> bool {
        let installed = init_logging(&self.config.logging);
        tracing::info!(
            target: "runtime",
            "Runtime ready with backends: {}",
            self.registry.tags().join(", ")
        );
        installed
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &LoaderRegistry {
        &self.registry
    }

    /// Module table of the built-in native backend, if registered.
    pub fn native_modules(&self) -> Option<NativeModules> {
        self.native.clone()
    }

    pub fn register_backend(&self, tag: &str, backend: Box<dyn Backend>) -> RuntimeResult<()> {
        Ok(self.registry.register(tag, backend)?)
    }

    /// 从 `library_path` 动态加载后端
    pub fn register_dynlink(&self, tag: &str) -> RuntimeResult<()> {
        let factory = DynlinkFactory::new(self.config.loader.library_path.clone());
        Ok(self.registry.register_factory(tag, Box::new(factory))?)
    }

    pub fn execution_path(&self, tag: &str, path: impl Into<PathBuf>) -> RuntimeResult<()> {
        Ok(self.registry.execution_path(tag, path)?)
    }

    pub fn load(&self, tag: &str, source: &LoadSource, linkage: Linkage) -> RuntimeResult<HandleId> {
        Ok(self.registry.load(tag, source, linkage)?)
    }

    /// 从文件加载
    ///
    /// Each path is resolved through the backend's execution paths and the
    /// configured script paths.
    pub fn load_from_file<P: AsRef<Path>>(&self, tag: &str, paths: &[P]) -> RuntimeResult<HandleId> {
        let resolved = paths
            .iter()
            .map(|p| self.registry.resolve_script(tag, p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        self.load(tag, &LoadSource::Files(resolved), Linkage::Global)
    }

    pub fn load_from_memory(&self, tag: &str, name: &str, buffer: impl Into<Vec<u8>>) -> RuntimeResult<HandleId> {
        self.load(tag, &LoadSource::memory(name, buffer), Linkage::Global)
    }

    pub fn load_from_package(&self, tag: &str, path: impl AsRef<Path>) -> RuntimeResult<HandleId> {
        let resolved = self.registry.resolve_script(tag, path.as_ref())?;
        self.load(tag, &LoadSource::Package(resolved), Linkage::Global)
    }

    /// 从描述文件加载
    pub fn load_from_configuration(&self, path: impl AsRef<Path>) -> RuntimeResult<HandleId> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let descriptor: LoadConfiguration = serde_json::from_str(&content).map_err(|e| {
            RuntimeError::Loader(LoaderError::LoadFailed {
                tag: "configuration".to_string(),
                module: path.display().to_string(),
                reason: e.to_string(),
            })
        })?;

        let mut base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        if let Some(dir) = &descriptor.path {
            base = base.join(dir);
        }
        let scripts: Vec<PathBuf> = descriptor.scripts.iter().map(|s| base.join(s)).collect();
        tracing::debug!(
            target: "runtime",
            "Configuration {} loads {} scripts with {}",
            path.display(),
            scripts.len(),
            descriptor.language_id
        );
        self.load(&descriptor.language_id, &LoadSource::Files(scripts), Linkage::Global)
    }

    pub fn function(&self, name: &str) -> Option<Arc<Function>> {
        self.registry.function(name)
    }

    /// 按名称调用全局函数
    ///
    /// Backend failures are returned as exception values inside `Ok`.
    pub fn call(&self, name: &str, args: &[Value]) -> RuntimeResult<Option<Value>> {
        let function = self
            .function(name)
            .ok_or_else(|| RuntimeError::FunctionNotFound(name.to_string()))?;
        let args = prepare_args(&function, args)?;
        Ok(function.call(&args)?)
    }

    /// 按参数名调用
    ///
    /// Each key is matched against the parameter names of the function's
    /// signature; unknown keys and unfilled parameters are errors.
    pub fn call_map(&self, name: &str, args: &[(String, Value)]) -> RuntimeResult<Option<Value>> {
        let function = self
            .function(name)
            .ok_or_else(|| RuntimeError::FunctionNotFound(name.to_string()))?;
        let args = order_args(&function, args)?;
        let args = prepare_args(&function, &args)?;
        Ok(function.call(&args)?)
    }

    /// 以序列化格式传参调用
    ///
    /// The payload decodes to either an array of positional arguments or a
    /// map of named ones.
    pub fn call_serialized(&self, name: &str, format: &str, bytes: &[u8]) -> RuntimeResult<Option<Value>> {
        let payload = serial_for(format)?.deserialize(bytes)?;
        if let Ok(items) = payload.to_array() {
            return self.call(name, &items);
        }
        match payload.to_map() {
            Ok(pairs) => {
                let named: Vec<(String, Value)> =
                    pairs.into_iter().map(|(key, value)| (key.stringify(), value)).collect();
                self.call_map(name, &named)
            }
            Err(_) => Err(RuntimeError::InvalidArguments {
                name: name.to_string(),
                found: payload.type_id(),
            }),
        }
    }

    /// 调用句柄内的函数（私有链接的模块也可以）
    pub fn call_handle(&self, handle: HandleId, name: &str, args: &[Value]) -> RuntimeResult<Option<Value>> {
        let function = self
            .registry
            .handle_function(handle, name)?
            .ok_or_else(|| RuntimeError::FunctionNotFound(name.to_string()))?;
        let args = prepare_args(&function, args)?;
        Ok(function.call(&args)?)
    }

    /// 异步调用，返回 `Future` 值
    pub fn call_async(
        &self,
        name: &str,
        args: &[Value],
        on_resolve: ResolveCallback,
        on_reject: RejectCallback,
    ) -> RuntimeResult<Value> {
        let function = self
            .function(name)
            .ok_or_else(|| RuntimeError::FunctionNotFound(name.to_string()))?;
        let args = prepare_args(&function, args)?;
        Ok(function.call_async(&args, on_resolve, on_reject)?)
    }

    /// 注册宿主函数
    pub fn register<F>(&self, name: &str, signature: Signature, body: F) -> RuntimeResult<()>
    where
        F: Fn(&[Value]) -> Option<Value> + Send + Sync + 'static,
    {
        let function = Function::from_closure(name, signature, body)?;
        self.registry
            .define_host(name, Value::function(function), DefinePolicy::Reject)?;
        tracing::debug!(target: "runtime", "Host function registered: {}", name);
        Ok(())
    }

    pub fn inspect(&self) -> serde_json::Value {
        self.registry.inspect()
    }

    /// 使用默认格式序列化
    pub fn serialize(&self, value: &Value) -> RuntimeResult<Vec<u8>> {
        self.serialize_with(&self.config.serial.default_format, value)
    }

    pub fn serialize_with(&self, format: &str, value: &Value) -> RuntimeResult<Vec<u8>> {
        Ok(serial_for(format)?.serialize(value)?)
    }

    pub fn deserialize(&self, bytes: &[u8]) -> RuntimeResult<Value> {
        self.deserialize_with(&self.config.serial.default_format, bytes)
    }

    pub fn deserialize_with(&self, format: &str, bytes: &[u8]) -> RuntimeResult<Value> {
        Ok(serial_for(format)?.deserialize(bytes)?)
    }

    pub fn clear(&self, handle: HandleId) -> RuntimeResult<bool> {
        Ok(self.registry.clear(handle)?)
    }

    /// 销毁全部句柄和后端
    pub fn destroy(&self) {
        self.registry.destroy();
        tracing::info!(target: "runtime", "Runtime destroyed");
    }
}

/// Places named arguments into their signature slots.
fn order_args(function: &Function, named: &[(String, Value)]) -> RuntimeResult<Vec<Value>> {
    let signature = function.signature();
    let mut slots: Vec<Option<Value>> = vec![None; signature.count()];
    for (key, value) in named {
        let index = signature
            .get_index(key)
            .ok_or_else(|| RuntimeError::UnknownArgument {
                name: function.name().to_string(),
                argument: key.clone(),
            })?;
        slots[index] = Some(value.clone());
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| RuntimeError::MissingArgument {
                name: function.name().to_string(),
                argument: signature
                    .get_name(index)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("#{}", index)),
            })
        })
        .collect()
}

/// Checks the argument count and casts arguments to their declared types.
/// Untyped parameters pass through unchanged.
fn prepare_args(function: &Function, args: &[Value]) -> RuntimeResult<Vec<Value>> {
    let signature = function.signature();
    if signature.count() > 0 && signature.is_typed() && args.len() != signature.count() {
        return Err(RuntimeError::ArgumentCount {
            name: function.name().to_string(),
            expected: signature.count(),
            got: args.len(),
        });
    }

    args.iter()
        .enumerate()
        .map(|(index, arg)| -> RuntimeResult<Value> {
            match signature.get_type(index) {
                Some(ty) => Ok(cast(arg.clone(), ty.id())?),
                None => Ok(arg.clone()),
            }
        })
        .collect()
}

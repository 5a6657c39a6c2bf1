//! JavaScript 后端（QuickJS）
//!
//! The QuickJS runtime is not thread safe, so a dedicated worker thread owns
//! it and every operation is a command sent over a channel. Arguments and
//! results cross the boundary as JSON.
//!
//! Every loaded module gets its own QuickJS context, and so its own global
//! object: two handles may export the same name without seeing each other,
//! and clearing a handle drops only its context. All sources of one load
//! share that module's context.
//!
//! Top-level `function` and `var` declarations of a loaded script are
//! discovered as its exports. Async functions return promises; they settle
//! through the engine's job queue after the requesting call has returned,
//! and completion callbacks run on the worker thread.

use crate::config::LoaderConfig;
use crate::core::error::{LoaderError, LoaderResult};
use crate::impl_default_and_new;
use crate::loader::{module_ref, Backend, BackendModule, Export, LoadSource};
use crate::reflect::{
    AsyncCompletion, Exception, Function, FunctionInterface, Signature, Type, TypeId, Value,
};
use crate::serial::{json_to_value, value_to_json};
use crossbeam_channel::{Receiver, Sender};
use rquickjs::function::Rest;
use rquickjs::{Context, Function as JsFunction, Object, Runtime};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

const PRELUDE: &str = r#"
function __polyglot_ok(v) {
    return JSON.stringify({ ok: true, undefined: v === undefined, value: v === undefined ? null : v });
}

function __polyglot_err(e) {
    const isError = e !== null && typeof e === 'object';
    return JSON.stringify({
        ok: false,
        message: isError && e.message !== undefined ? String(e.message) : String(e),
        label: isError && e.name ? String(e.name) : 'Error',
        stack: isError && e.stack ? String(e.stack) : '',
    });
}

// Parameter names from the source text. Slots that are not a plain
// identifier, or repeat an earlier name, are null.
function __polyglot_params(f) {
    const unnamed = function () { return new Array(f.length).fill(null); };
    const src = Function.prototype.toString.call(f);
    const arrow = /^(?:async\s+)?([A-Za-z_$][\w$]*)\s*=>/.exec(src);
    if (arrow) return [arrow[1]];

    const open = src.indexOf('(');
    if (open < 0) return unnamed();
    const parts = [];
    let depth = 0, quote = null, current = '', closed = false;
    for (let i = open + 1; i < src.length; i++) {
        const c = src[i];
        if (quote !== null) {
            if (c === '\\') { current += c + src[i + 1]; i++; continue; }
            if (c === quote) quote = null;
            current += c;
            continue;
        }
        if (c === "'" || c === '"' || c === '`') { quote = c; current += c; continue; }
        if (c === '(' || c === '[' || c === '{') depth++;
        if (c === ')' || c === ']' || c === '}') {
            if (depth === 0) { closed = true; break; }
            depth--;
        }
        if (c === ',' && depth === 0) { parts.push(current); current = ''; continue; }
        current += c;
    }
    if (!closed) return unnamed();
    parts.push(current);
    if (parts[parts.length - 1].trim().length === 0) parts.pop();

    const seen = new Set();
    return parts.map(function (p) {
        const name = p.split('=')[0].replace('...', '').trim();
        if (!/^[A-Za-z_$][\w$]*$/.test(name) || seen.has(name)) return null;
        seen.add(name);
        return name;
    });
}

function __polyglot_load(src) {
    const before = new Map();
    for (const k of Object.getOwnPropertyNames(globalThis)) before.set(k, globalThis[k]);
    try {
        (0, eval)(src);
    } catch (e) {
        return __polyglot_err(e);
    }
    const found = [];
    for (const k of Object.getOwnPropertyNames(globalThis)) {
        const v = globalThis[k];
        if (typeof v !== 'function' || before.get(k) === v) continue;
        found.push({ name: k, params: __polyglot_params(v), async: v.constructor.name === 'AsyncFunction' });
    }
    return __polyglot_ok(found);
}

function __polyglot_call(name, args, id) {
    try {
        const r = globalThis[name].apply(undefined, JSON.parse(args));
        if (r instanceof Promise) {
            r.then(
                function (v) { __polyglot_settle(id, __polyglot_ok(v)); },
                function (e) { __polyglot_settle(id, __polyglot_err(e)); });
            return JSON.stringify({ pending: true });
        }
        return __polyglot_ok(r);
    } catch (e) {
        return __polyglot_err(e);
    }
}
"#;

const TYPES: [(TypeId, &str); 7] = [
    (TypeId::Bool, "Boolean"),
    (TypeId::Double, "Number"),
    (TypeId::String, "String"),
    (TypeId::Array, "Array"),
    (TypeId::Map, "Object"),
    (TypeId::Function, "Function"),
    (TypeId::Future, "Promise"),
];

/// 脚本侧的调用结果
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Envelope {
    ok: bool,
    pending: bool,
    undefined: bool,
    value: serde_json::Value,
    message: String,
    label: String,
    stack: String,
}

impl Envelope {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            label: "Error".to_string(),
            ..Self::default()
        }
    }

    fn parse(text: &str) -> Self {
        serde_json::from_str(text)
            .unwrap_or_else(|e| Envelope::failure(format!("Malformed result envelope: {}", e)))
    }

    fn exception(&self) -> Value {
        Value::exception(Exception::new(&self.message, &self.label, 0, &self.stack))
    }

    fn into_result(self) -> Result<Option<Value>, Value> {
        if !self.ok {
            return Err(self.exception());
        }
        if self.undefined {
            Ok(None)
        } else {
            Ok(Some(json_to_value(&self.value)))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Discovered {
    name: String,
    params: Vec<Option<String>>,
    #[serde(rename = "async")]
    is_async: bool,
}

/// 工作线程命令
enum Command {
    Load {
        sources: Vec<(String, String)>,
        reply: Sender<Result<(u64, Vec<Discovered>), String>>,
    },
    Call {
        module: u64,
        function: String,
        args: String,
        reply: Sender<Envelope>,
    },
    Await {
        module: u64,
        function: String,
        args: String,
        completion: AsyncCompletion,
    },
    Clear {
        module: u64,
        reply: Sender<()>,
    },
    Shutdown,
}

enum Pending {
    Reply(Sender<Envelope>),
    Completion(AsyncCompletion),
}

fn js_string(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

fn eval(context: &Context, code: String) -> Envelope {
    match context.with(|ctx| ctx.eval::<String, _>(code)) {
        Ok(text) => Envelope::parse(&text),
        Err(e) => Envelope::failure(e.to_string()),
    }
}

/// 工作线程上的引擎状态
struct Engine {
    /// one context per loaded module; dropped before the runtime
    modules: HashMap<u64, Context>,
    runtime: Runtime,
    next_module: u64,
    settled: Arc<Mutex<Vec<(u32, String)>>>,
    pending: HashMap<u32, Pending>,
    next_id: u32,
}

impl Engine {
    fn new() -> Result<Self, String> {
        let runtime = Runtime::new().map_err(|e| e.to_string())?;
        Ok(Self {
            modules: HashMap::new(),
            runtime,
            next_module: 1,
            settled: Arc::new(Mutex::new(Vec::new())),
            pending: HashMap::new(),
            next_id: 0,
        })
    }

    /// Creates a fresh context with the console and the prelude installed.
    fn context(&self) -> Result<Context, String> {
        let context = Context::full(&self.runtime).map_err(|e| e.to_string())?;
        let queue = Arc::clone(&self.settled);
        context
            .with(|ctx| -> rquickjs::Result<()> {
                let global = ctx.globals();

                global.set(
                    "__polyglot_settle",
                    JsFunction::new(ctx.clone(), move |id: u32, envelope: String| {
                        queue
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .push((id, envelope));
                    })?,
                )?;

                let console_obj = Object::new(ctx.clone())?;
                console_obj.set(
                    "log",
                    JsFunction::new(ctx.clone(), |args: Rest<String>| {
                        tracing::info!(target: "js.console", "{}", args.0.join(" "));
                    })?,
                )?;
                console_obj.set(
                    "warn",
                    JsFunction::new(ctx.clone(), |args: Rest<String>| {
                        tracing::warn!(target: "js.console", "{}", args.0.join(" "));
                    })?,
                )?;
                console_obj.set(
                    "error",
                    JsFunction::new(ctx.clone(), |args: Rest<String>| {
                        tracing::error!(target: "js.console", "{}", args.0.join(" "));
                    })?,
                )?;
                global.set("console", console_obj)?;

                ctx.eval::<(), _>(PRELUDE)
            })
            .map_err(|e| e.to_string())?;
        Ok(context)
    }

    fn run(mut self, commands: Receiver<Command>) {
        while let Ok(command) = commands.recv() {
            match command {
                Command::Load { sources, reply } => {
                    let _ = reply.send(self.load(sources));
                }
                Command::Call {
                    module,
                    function,
                    args,
                    reply,
                } => {
                    let (id, envelope) = self.call(module, &function, &args);
                    if envelope.pending {
                        self.pending.insert(id, Pending::Reply(reply));
                    } else {
                        let _ = reply.send(envelope);
                    }
                }
                Command::Await {
                    module,
                    function,
                    args,
                    completion,
                } => {
                    let (id, envelope) = self.call(module, &function, &args);
                    if envelope.pending {
                        self.pending.insert(id, Pending::Completion(completion));
                    } else {
                        match envelope.into_result() {
                            Ok(value) => completion.resolve(value.unwrap_or_else(Value::null)),
                            Err(exception) => completion.reject(exception),
                        }
                    }
                }
                Command::Clear { module, reply } => {
                    if self.modules.remove(&module).is_none() {
                        tracing::warn!(target: "js", "JS module #{} was not loaded", module);
                    }
                    let _ = reply.send(());
                }
                Command::Shutdown => break,
            }
            self.drive();
        }
        tracing::debug!(
            target: "js",
            "JS worker stopped with {} unsettled calls",
            self.pending.len()
        );
    }

    // A failed load drops the new context with everything it defined.
    fn load(&mut self, sources: Vec<(String, String)>) -> Result<(u64, Vec<Discovered>), String> {
        let context = self.context()?;
        let mut discovered: Vec<Discovered> = Vec::new();
        for (name, source) in sources {
            let envelope = eval(&context, format!("__polyglot_load({})", js_string(&source)));
            if !envelope.ok {
                return Err(format!("{}: {}: {}", name, envelope.label, envelope.message));
            }
            let found = serde_json::from_value::<Vec<Discovered>>(envelope.value)
                .map_err(|e| format!("{}: {}", name, e))?;
            discovered.extend(found);
        }

        let id = self.next_module;
        self.next_module += 1;
        self.modules.insert(id, context);
        Ok((id, discovered))
    }

    fn call(&mut self, module: u64, function: &str, args: &str) -> (u32, Envelope) {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let envelope = match self.modules.get(&module) {
            Some(context) => eval(
                context,
                format!(
                    "__polyglot_call({}, {}, {})",
                    js_string(function),
                    js_string(args),
                    id
                ),
            ),
            None => Envelope::failure(format!("JS module #{} is not loaded", module)),
        };
        (id, envelope)
    }

    /// Runs queued promise jobs, then settles every call whose promise
    /// finished.
    fn drive(&mut self) {
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(_) => {
                    tracing::warn!(target: "js", "Pending JS job raised an uncaught exception");
                }
            }
        }

        let settled: Vec<(u32, String)> =
            std::mem::take(&mut *self.settled.lock().unwrap_or_else(|e| e.into_inner()));
        for (id, text) in settled {
            let envelope = Envelope::parse(&text);
            match self.pending.remove(&id) {
                Some(Pending::Reply(reply)) => {
                    let _ = reply.send(envelope);
                }
                Some(Pending::Completion(completion)) => match envelope.into_result() {
                    Ok(value) => completion.resolve(value.unwrap_or_else(Value::null)),
                    Err(exception) => completion.reject(exception),
                },
                None => tracing::warn!(target: "js", "Settlement for unknown call {}", id),
            }
        }

        // A blocking caller cannot wait for a promise nothing will settle.
        let stalled: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, p)| matches!(p, Pending::Reply(_)))
            .map(|(id, _)| *id)
            .collect();
        for id in stalled {
            if let Some(Pending::Reply(reply)) = self.pending.remove(&id) {
                let _ = reply.send(Envelope::failure("Promise did not settle"));
            }
        }
    }
}

/// 脚本函数
struct JsFunctionInterface {
    module: u64,
    name: String,
    is_async: bool,
    commands: Sender<Command>,
    worker: ThreadId,
}

impl JsFunctionInterface {
    fn encode_args(args: &[Value]) -> String {
        serde_json::Value::Array(args.iter().map(value_to_json).collect()).to_string()
    }

    fn on_worker(&self) -> bool {
        thread::current().id() == self.worker
    }
}

impl FunctionInterface for JsFunctionInterface {
    /// A thrown error comes back as a `Throwable` wrapping an `Exception`.
    fn invoke(&self, func: &Function, args: &[Value]) -> Option<Value> {
        if self.on_worker() {
            let reason = "Synchronous JS call from a JS completion callback";
            tracing::error!(target: "js", "{}: {}", reason, func.name());
            return Some(Value::throwable(Value::exception(Exception::new(reason, "Error", 0, ""))));
        }

        let (reply, response) = crossbeam_channel::bounded(1);
        let command = Command::Call {
            module: self.module,
            function: self.name.clone(),
            args: Self::encode_args(args),
            reply,
        };
        let envelope = match self.commands.send(command) {
            Ok(()) => response
                .recv()
                .unwrap_or_else(|_| Envelope::failure("JS worker stopped")),
            Err(_) => Envelope::failure("JS worker is not running"),
        };
        match envelope.into_result() {
            Ok(value) => value,
            Err(exception) => Some(Value::throwable(exception)),
        }
    }

    fn supports_await(&self) -> bool {
        self.is_async
    }

    fn await_call(&self, func: &Function, args: &[Value], completion: AsyncCompletion) {
        let command = Command::Await {
            module: self.module,
            function: self.name.clone(),
            args: Self::encode_args(args),
            completion,
        };
        if let Err(crossbeam_channel::SendError(Command::Await { completion, .. })) =
            self.commands.send(command)
        {
            tracing::error!(target: "js", "Cannot await {}: JS worker is not running", func.name());
            completion.reject(Value::exception(Exception::new(
                "JS worker is not running",
                "Error",
                0,
                "",
            )));
        }
    }
}

struct JsModule {
    id: u64,
    name: String,
    discovered: Vec<Discovered>,
}

struct Worker {
    commands: Sender<Command>,
    thread: JoinHandle<()>,
}

/// JavaScript 后端
pub struct JsBackend {
    worker: Option<Worker>,
}

impl_default_and_new!(JsBackend { worker: None });

impl JsBackend {
    fn worker(&self) -> LoaderResult<&Worker> {
        self.worker.as_ref().ok_or_else(|| LoaderError::InitializeFailed {
            tag: "js".to_string(),
            reason: "JS worker is not running".to_string(),
        })
    }

    fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.commands.send(Command::Shutdown);
            if worker.thread.join().is_err() {
                tracing::error!(target: "js", "JS worker panicked");
            }
        }
    }
}

impl Backend for JsBackend {
    fn extension(&self) -> &str {
        "js"
    }

    fn types(&self) -> Vec<Type> {
        TYPES.iter().map(|(id, name)| Type::new(*id, *name)).collect()
    }

    fn initialize(&mut self, _config: &LoaderConfig) -> LoaderResult<()> {
        let (commands, receiver) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let thread = thread::Builder::new()
            .name("polyglot-js".to_string())
            .spawn(move || match Engine::new() {
                Ok(engine) => {
                    let _ = ready_tx.send(Ok(()));
                    engine.run(receiver);
                }
                Err(reason) => {
                    let _ = ready_tx.send(Err(reason));
                }
            })?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err("JS worker exited during startup".to_string()));
        if let Err(reason) = ready {
            let _ = thread.join();
            return Err(LoaderError::InitializeFailed {
                tag: "js".to_string(),
                reason,
            });
        }

        tracing::info!(target: "js", "QuickJS worker started");
        self.worker = Some(Worker { commands, thread });
        Ok(())
    }

    fn load(&mut self, source: &LoadSource) -> LoaderResult<BackendModule> {
        let worker = self.worker()?;
        let name = source.module_name();
        let sources = source.read_sources()?;

        let (reply, response) = crossbeam_channel::bounded(1);
        let load_failed = |reason: String| LoaderError::LoadFailed {
            tag: "js".to_string(),
            module: name.clone(),
            reason,
        };
        worker
            .commands
            .send(Command::Load { sources, reply })
            .map_err(|_| load_failed("JS worker is not running".to_string()))?;
        let (id, discovered) = response
            .recv()
            .map_err(|_| load_failed("JS worker stopped".to_string()))?
            .map_err(load_failed)?;

        tracing::debug!(
            target: "js",
            "JS module {} loaded as #{} with {} functions",
            name,
            id,
            discovered.len()
        );
        Ok(Box::new(JsModule { id, name, discovered }))
    }

    fn discover(&mut self, module: &mut BackendModule) -> LoaderResult<Vec<Export>> {
        let worker = self.worker()?;
        let commands = worker.commands.clone();
        let worker_id = worker.thread.thread().id();
        let module = module_ref::<JsModule>("js", module)?;

        let mut exports = Vec::with_capacity(module.discovered.len());
        for found in &module.discovered {
            let mut signature = Signature::new(found.params.len());
            for (index, param) in found.params.iter().enumerate() {
                let Some(param) = param else { continue };
                signature
                    .set(index, param, None)
                    .map_err(|e| LoaderError::DiscoverFailed {
                        tag: "js".to_string(),
                        module: module.name.clone(),
                        reason: format!("{}: {}", found.name, e),
                    })?;
            }
            exports.push(Export::function(
                found.name.clone(),
                signature,
                Box::new(JsFunctionInterface {
                    module: module.id,
                    name: found.name.clone(),
                    is_async: found.is_async,
                    commands: commands.clone(),
                    worker: worker_id,
                }),
            ));
        }
        Ok(exports)
    }

    fn clear(&mut self, module: BackendModule) -> LoaderResult<()> {
        let module = match module.downcast::<JsModule>() {
            Ok(module) => module,
            Err(_) => return Ok(()),
        };
        let Ok(worker) = self.worker() else {
            return Ok(());
        };

        let (reply, response) = crossbeam_channel::bounded(1);
        if worker.commands.send(Command::Clear { module: module.id, reply }).is_ok() {
            let _ = response.recv();
        }
        tracing::debug!(target: "js", "JS module {} cleared", module.name);
        Ok(())
    }

    fn destroy(&mut self) {
        self.shutdown();
        tracing::info!(target: "js", "JS backend destroyed");
    }
}

impl Drop for JsBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{Linkage, LoaderRegistry};
    use std::time::Duration;

    const SCRIPT: &str = r#"
        function sum(a, b) { return a + b; }
        function greet(name) { return "hello " + name; }
        function nothing() {}
        function boom() { throw new TypeError("bad input"); }
        async function twice(x) { return x * 2; }
        async function refuse() { throw new Error("nope"); }
        var counter = 0;
    "#;

    fn registry() -> LoaderRegistry {
        let registry = LoaderRegistry::new(LoaderConfig::default());
        registry.register("js", Box::new(JsBackend::new())).unwrap();
        registry
    }

    fn loaded() -> LoaderRegistry {
        let registry = registry();
        registry
            .load("js", &LoadSource::memory("script.js", SCRIPT), Linkage::Global)
            .unwrap();
        registry
    }

    #[test]
    fn test_discovery() {
        let registry = loaded();
        let handle = registry.handles()[0];
        let names = registry.handle_names(handle).unwrap();
        assert_eq!(names, vec!["boom", "greet", "nothing", "refuse", "sum", "twice"]);

        let sum = registry.function("sum").unwrap();
        assert_eq!(sum.signature().count(), 2);
        assert_eq!(sum.signature().get_name(1), Some("b"));
        assert!(!sum.is_async());
        assert!(registry.function("twice").unwrap().is_async());
    }

    #[test]
    fn test_sync_calls() {
        let registry = loaded();
        let sum = registry.function("sum").unwrap();
        assert_eq!(sum.call(&[Value::int(3), Value::int(4)]).unwrap(), Some(Value::int(7)));

        let greet = registry.function("greet").unwrap();
        assert_eq!(
            greet.call(&[Value::string("js")]).unwrap(),
            Some(Value::string("hello js"))
        );
        assert_eq!(registry.function("nothing").unwrap().call(&[]).unwrap(), None);
    }

    #[test]
    fn test_thrown_error_is_exception() {
        let registry = loaded();
        let thrown = registry.function("boom").unwrap().call(&[]).unwrap().unwrap();
        let exception = thrown.to_throwable().unwrap().to_exception().unwrap();
        assert_eq!(exception.label, "TypeError");
        assert_eq!(exception.message, "bad input");
    }

    #[test]
    fn test_async_settles_after_call_returns() {
        let registry = loaded();
        let twice = registry.function("twice").unwrap();
        let future = twice
            .call_async(&[Value::int(29)], Box::new(|v| v), Box::new(|v| v))
            .unwrap()
            .to_future()
            .unwrap();
        assert_eq!(future.wait_timeout(Duration::from_secs(5)), Some(Ok(Value::int(58))));

        let refused = registry
            .function("refuse")
            .unwrap()
            .call_async(&[], Box::new(|v| v), Box::new(|v| v))
            .unwrap()
            .to_future()
            .unwrap();
        let rejected = refused.wait_timeout(Duration::from_secs(5)).unwrap().unwrap_err();
        assert_eq!(rejected.to_exception().unwrap().message, "nope");

        // blocking call drives the promise to completion
        assert_eq!(twice.call(&[Value::int(4)]).unwrap(), Some(Value::int(8)));
    }

    #[test]
    fn test_syntax_error_fails_load() {
        let registry = registry();
        let result = registry.load(
            "js",
            &LoadSource::memory("broken.js", "function ("),
            Linkage::Global,
        );
        assert!(matches!(result, Err(LoaderError::LoadFailed { .. })));
        assert!(registry.handles().is_empty());
    }

    #[test]
    fn test_clear_releases_module() {
        let registry = loaded();
        let handle = registry.handles()[0];
        let sum = registry.function("sum").unwrap();
        registry.clear(handle).unwrap();
        assert!(sum.call(&[Value::int(1), Value::int(2)]).is_err());

        registry
            .load("js", &LoadSource::memory("script.js", SCRIPT), Linkage::Global)
            .unwrap();
        let sum = registry.function("sum").unwrap();
        assert_eq!(sum.call(&[Value::int(1), Value::int(2)]).unwrap(), Some(Value::int(3)));
    }

    #[test]
    fn test_console_accepts_any_arity() {
        let registry = registry();
        let handle = registry
            .load(
                "js",
                &LoadSource::memory(
                    "chatty.js",
                    "function chatty() { console.log('a', 'b'); console.warn(); console.error('c'); return 1; }",
                ),
                Linkage::Private,
            )
            .unwrap();
        let chatty = registry.handle_function(handle, "chatty").unwrap().unwrap();
        assert_eq!(chatty.call(&[]).unwrap(), Some(Value::int(1)));
    }

    #[test]
    fn test_handles_do_not_share_globals() {
        let registry = registry();
        let a = registry
            .load(
                "js",
                &LoadSource::memory("a.js", "var base = 1; function f() { return base; }"),
                Linkage::Private,
            )
            .unwrap();
        let b = registry
            .load(
                "js",
                &LoadSource::memory("b.js", "var base = 2; function f() { return base; }"),
                Linkage::Private,
            )
            .unwrap();

        let fa = registry.handle_function(a, "f").unwrap().unwrap();
        let fb = registry.handle_function(b, "f").unwrap().unwrap();
        assert_eq!(fa.call(&[]).unwrap(), Some(Value::int(1)));
        assert_eq!(fb.call(&[]).unwrap(), Some(Value::int(2)));

        registry.clear(b).unwrap();
        assert_eq!(fa.call(&[]).unwrap(), Some(Value::int(1)));
    }

    #[test]
    fn test_rejected_global_load_keeps_existing_function() {
        let registry = registry();
        registry
            .load("js", &LoadSource::memory("a.js", "function f() { return 1; }"), Linkage::Global)
            .unwrap();
        let clash = registry.load(
            "js",
            &LoadSource::memory("b.js", "function f() { return 2; }"),
            Linkage::Global,
        );
        assert!(matches!(clash, Err(LoaderError::SymbolConflict { .. })));
        assert_eq!(registry.handles().len(), 1);

        let f = registry.function("f").unwrap();
        assert_eq!(f.call(&[]).unwrap(), Some(Value::int(1)));
    }

    #[test]
    fn test_parameter_names() {
        let registry = registry();
        let handle = registry
            .load(
                "js",
                &LoadSource::memory(
                    "params.js",
                    r#"
                    function defaults(a = g(1, 2), b = ")", ...rest) { return b; }
                    function pattern({ x, y }, z) { return z; }
                    function repeated(x, x) { return x; }
                    var arrow = y => y;
                    "#,
                ),
                Linkage::Private,
            )
            .unwrap();
        let signature = |name: &str| {
            registry
                .handle_function(handle, name)
                .unwrap()
                .unwrap()
                .signature()
                .clone()
        };

        let defaults = signature("defaults");
        assert_eq!(defaults.count(), 3);
        assert_eq!(defaults.get_name(0), Some("a"));
        assert_eq!(defaults.get_name(1), Some("b"));
        assert_eq!(defaults.get_name(2), Some("rest"));

        let pattern = signature("pattern");
        assert_eq!(pattern.count(), 2);
        assert_eq!(pattern.get_name(0), None);
        assert_eq!(pattern.get_name(1), Some("z"));

        let repeated = signature("repeated");
        assert_eq!(repeated.count(), 2);
        assert_eq!(repeated.get_name(0), Some("x"));
        assert_eq!(repeated.get_name(1), None);

        assert_eq!(signature("arrow").get_name(0), Some("y"));
    }
}

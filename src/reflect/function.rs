//! 可调用对象
//!
//! A `Function` binds a name and a `Signature` to a backend-supplied
//! `FunctionInterface`. The interface object *is* the opaque implementation:
//! whatever native state the backend needs lives inside it.
//!
//! Lifecycle: `new` runs the optional `create` hook once; `destroy` (or the
//! last `Arc` going away) marks the function dead and runs the `destroy`
//! hook once, after the last in-flight call has returned. After `destroy`
//! every new call is rejected with `FunctionError::NotLive`.
//!
//! No lock is held across `invoke`, so a call body may clear the handle
//! that owns it.

use super::future::{AsyncCompletion, RejectCallback, ResolveCallback};
use super::{Signature, Value};
use crate::core::error::{FunctionError, FunctionResult};
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// 后端提供的函数接口表
pub trait FunctionInterface: Send + Sync {
    /// 可选的一次性初始化
    fn create(&self, _func: &Function) -> Result<(), String> {
        Ok(())
    }

    /// 同步调用；`None` 表示没有返回值
    ///
    /// Foreign failures are returned as `Exception`/`Throwable` values.
    fn invoke(&self, func: &Function, args: &[Value]) -> Option<Value>;

    /// Whether `await_call` is implemented.
    fn supports_await(&self) -> bool {
        false
    }

    /// 异步调用
    ///
    /// The backend must eventually consume `completion` with `resolve` or
    /// `reject`; dropping it rejects the future.
    fn await_call(&self, _func: &Function, _args: &[Value], completion: AsyncCompletion) {
        drop(completion);
    }

    /// 释放实现（每个函数最多调用一次）
    fn destroy(&self, _func: &Function) {}
}

/// 函数
pub struct Function {
    name: String,
    signature: Signature,
    interface: Box<dyn FunctionInterface>,
    bound: RwLock<Option<Value>>,
    live: AtomicBool,
    /// in-flight calls
    calls: AtomicUsize,
    destroyed: AtomicBool,
}

/// Leaves the call on drop; the last call out of a dead function runs the
/// `destroy` hook.
struct CallGuard<'a>(&'a Function);

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        let function = self.0;
        if function.calls.fetch_sub(1, Ordering::SeqCst) == 1 && !function.live.load(Ordering::SeqCst) {
            function.finish();
        }
    }
}

impl Function {
    /// 创建函数并调用 `create` 钩子
    ///
    /// A failing `create` hook aborts creation; the `destroy` hook is not
    /// run for a function that never came alive.
    pub fn new(
        name: impl Into<String>,
        signature: Signature,
        interface: Box<dyn FunctionInterface>,
    ) -> FunctionResult<Arc<Function>> {
        let function = Self {
            name: name.into(),
            signature,
            interface,
            bound: RwLock::new(None),
            live: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
        };

        if let Err(reason) = function.interface.create(&function) {
            tracing::error!(
                target: "reflect",
                "Invalid function create hook for {}: {}",
                function.name,
                reason
            );
            function.live.store(false, Ordering::SeqCst);
            function.destroyed.store(true, Ordering::SeqCst);
            return Err(FunctionError::CreateFailed {
                name: function.name.clone(),
                reason,
            });
        }

        tracing::trace!(target: "reflect", "Function {} created", function.name);
        Ok(Arc::new(function))
    }

    /// Wraps a Rust closure as a synchronous function.
    pub fn from_closure<F>(
        name: impl Into<String>,
        signature: Signature,
        closure: F,
    ) -> FunctionResult<Arc<Function>>
    where
        F: Fn(&[Value]) -> Option<Value> + Send + Sync + 'static,
    {
        Self::new(name, signature, Box::new(ClosureInterface(closure)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn enter(&self) -> FunctionResult<CallGuard<'_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let guard = CallGuard(self);
        if !self.live.load(Ordering::SeqCst) {
            return Err(FunctionError::NotLive(self.name.clone()));
        }
        Ok(guard)
    }

    fn finish(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            self.interface.destroy(self);
            tracing::trace!(target: "reflect", "Function {} destroyed", self.name);
        }
    }

    pub fn is_async(&self) -> bool {
        self.interface.supports_await()
    }

    /// 同步调用
    ///
    /// `Ok(None)` means the function produced no value, which is not an
    /// error. Backend failures come back as `Ok(Some(exception))`.
    pub fn call(&self, args: &[Value]) -> FunctionResult<Option<Value>> {
        let _guard = self.enter()?;
        tracing::debug!(target: "reflect", "Calling {} with {} arguments", self.name, args.len());
        Ok(self.interface.invoke(self, args))
    }

    /// 异步调用
    ///
    /// Returns a `Future` value settled with the replacement value produced
    /// by whichever of `on_resolve`/`on_reject` runs. Exactly one of them
    /// runs, exactly once.
    pub fn call_async(
        &self,
        args: &[Value],
        on_resolve: ResolveCallback,
        on_reject: RejectCallback,
    ) -> FunctionResult<Value> {
        let _guard = self.enter()?;
        if !self.interface.supports_await() {
            return Err(FunctionError::Unsupported {
                name: self.name.clone(),
                operation: "await".to_string(),
            });
        }

        let (completion, future) = AsyncCompletion::new(on_resolve, on_reject);
        tracing::debug!(target: "reflect", "Awaiting {} with {} arguments", self.name, args.len());
        self.interface.await_call(self, args, completion);
        Ok(Value::future(future))
    }

    /// 销毁函数（幂等）
    ///
    /// Rejects new calls at once and never blocks. The backend `destroy`
    /// hook runs here when no call is in flight, otherwise when the last
    /// in-flight call returns. Later calls return `false` and do nothing.
    pub fn destroy(&self) -> bool {
        if !self.live.swap(false, Ordering::SeqCst) {
            return false;
        }
        if self.calls.load(Ordering::SeqCst) == 0 {
            self.finish();
        }
        true
    }

    /// 绑定闭包数据
    pub fn bind(&self, data: Value) {
        *self.bound.write().unwrap_or_else(|e| e.into_inner()) = Some(data);
    }

    pub fn bound(&self) -> Option<Value> {
        self.bound.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn unbind(&self) -> Option<Value> {
        self.bound.write().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub fn metadata(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "signature": self.signature.metadata(),
            "async": self.is_async(),
        })
    }
}

impl Drop for Function {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("args", &self.signature.count())
            .field("live", &self.is_live())
            .finish()
    }
}

struct ClosureInterface<F>(F);

impl<F> FunctionInterface for ClosureInterface<F>
where
    F: Fn(&[Value]) -> Option<Value> + Send + Sync + 'static,
{
    fn invoke(&self, _func: &Function, args: &[Value]) -> Option<Value> {
        (self.0)(args)
    }
}

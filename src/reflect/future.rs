//! 异步结果
//!
//! A `Future` settles at most once, either resolved or rejected with a
//! `Value`. Continuations registered with `then` run on whichever thread
//! settles it (or immediately, if it is already settled).
//!
//! `AsyncCompletion` is the token a backend receives from `call_async`. It
//! is consumed by `resolve`/`reject`, so a backend cannot settle twice; if it
//! is dropped unsettled the future is rejected with an `Exception`, which
//! keeps the "always eventually settles" guarantee.

use super::{Exception, Value};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

type Continuation = Box<dyn FnOnce(Result<Value, Value>) + Send + 'static>;

/// 解决回调：返回值成为后续 Future 的解决值
pub type ResolveCallback = Box<dyn FnOnce(Value) -> Value + Send + 'static>;
/// 拒绝回调：返回值成为后续 Future 的拒绝值
pub type RejectCallback = Box<dyn FnOnce(Value) -> Value + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    Pending,
    Resolved,
    Rejected,
}

enum Outcome {
    Pending(Vec<Continuation>),
    Resolved(Value),
    Rejected(Value),
}

/// 异步值
pub struct Future {
    outcome: Mutex<Outcome>,
    settled: Condvar,
}

impl Future {
    pub fn pending() -> Arc<Future> {
        Arc::new(Self {
            outcome: Mutex::new(Outcome::Pending(Vec::new())),
            settled: Condvar::new(),
        })
    }

    pub fn resolved(value: Value) -> Arc<Future> {
        let future = Self::pending();
        future.resolve(value);
        future
    }

    pub fn rejected(value: Value) -> Arc<Future> {
        let future = Self::pending();
        future.reject(value);
        future
    }

    pub fn state(&self) -> FutureState {
        match &*self.outcome.lock().unwrap_or_else(|e| e.into_inner()) {
            Outcome::Pending(_) => FutureState::Pending,
            Outcome::Resolved(_) => FutureState::Resolved,
            Outcome::Rejected(_) => FutureState::Rejected,
        }
    }

    /// Returns `false` if the future was already settled.
    pub fn resolve(&self, value: Value) -> bool {
        self.settle(Ok(value))
    }

    /// Returns `false` if the future was already settled.
    pub fn reject(&self, value: Value) -> bool {
        self.settle(Err(value))
    }

    fn settle(&self, result: Result<Value, Value>) -> bool {
        let continuations = {
            let mut outcome = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
            let waiting = match &mut *outcome {
                Outcome::Pending(waiting) => std::mem::take(waiting),
                _ => return false,
            };
            *outcome = match &result {
                Ok(value) => Outcome::Resolved(value.clone()),
                Err(value) => Outcome::Rejected(value.clone()),
            };
            waiting
        };
        self.settled.notify_all();

        for continuation in continuations {
            continuation(result.clone());
        }
        true
    }

    fn on_settle(&self, continuation: Continuation) {
        let ready = {
            let mut outcome = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
            match &mut *outcome {
                Outcome::Pending(waiting) => {
                    waiting.push(continuation);
                    return;
                }
                Outcome::Resolved(value) => Ok(value.clone()),
                Outcome::Rejected(value) => Err(value.clone()),
            }
        };
        continuation(ready);
    }

    /// 链式回调
    ///
    /// Exactly one of the callbacks runs, once. Its return value settles the
    /// returned future the same way (resolve -> resolved, reject -> rejected).
    pub fn then<R, J>(&self, on_resolve: R, on_reject: J) -> Arc<Future>
    where
        R: FnOnce(Value) -> Value + Send + 'static,
        J: FnOnce(Value) -> Value + Send + 'static,
    {
        let next = Future::pending();
        let chained = Arc::clone(&next);
        self.on_settle(Box::new(move |result| match result {
            Ok(value) => {
                chained.resolve(on_resolve(value));
            }
            Err(value) => {
                chained.reject(on_reject(value));
            }
        }));
        next
    }

    /// Non-blocking peek at the outcome.
    pub fn value(&self) -> Option<Result<Value, Value>> {
        match &*self.outcome.lock().unwrap_or_else(|e| e.into_inner()) {
            Outcome::Pending(_) => None,
            Outcome::Resolved(value) => Some(Ok(value.clone())),
            Outcome::Rejected(value) => Some(Err(value.clone())),
        }
    }

    /// 阻塞等待结果
    pub fn wait(&self) -> Result<Value, Value> {
        let mut outcome = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            match &*outcome {
                Outcome::Pending(_) => {
                    outcome = self
                        .settled
                        .wait(outcome)
                        .unwrap_or_else(|e| e.into_inner());
                }
                Outcome::Resolved(value) => return Ok(value.clone()),
                Outcome::Rejected(value) => return Err(value.clone()),
            }
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<Value, Value>> {
        let outcome = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
        let (outcome, _) = self
            .settled
            .wait_timeout_while(outcome, timeout, |o| matches!(o, Outcome::Pending(_)))
            .unwrap_or_else(|e| e.into_inner());
        match &*outcome {
            Outcome::Pending(_) => None,
            Outcome::Resolved(value) => Some(Ok(value.clone())),
            Outcome::Rejected(value) => Some(Err(value.clone())),
        }
    }
}

impl fmt::Debug for Future {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future").field("state", &self.state()).finish()
    }
}

struct Completion {
    on_resolve: ResolveCallback,
    on_reject: RejectCallback,
    next: Arc<Future>,
}

/// 异步调用完成令牌
pub struct AsyncCompletion {
    inner: Option<Completion>,
}

impl AsyncCompletion {
    /// Creates the token and the follow-up future its callbacks settle.
    pub fn new(on_resolve: ResolveCallback, on_reject: RejectCallback) -> (Self, Arc<Future>) {
        let next = Future::pending();
        let completion = Self {
            inner: Some(Completion {
                on_resolve,
                on_reject,
                next: Arc::clone(&next),
            }),
        };
        (completion, next)
    }

    /// Pass-through callbacks.
    pub fn passthrough() -> (Self, Arc<Future>) {
        Self::new(Box::new(|v| v), Box::new(|v| v))
    }

    pub fn resolve(mut self, value: Value) {
        if let Some(inner) = self.inner.take() {
            let replacement = (inner.on_resolve)(value);
            inner.next.resolve(replacement);
        }
    }

    pub fn reject(mut self, value: Value) {
        if let Some(inner) = self.inner.take() {
            let replacement = (inner.on_reject)(value);
            inner.next.reject(replacement);
        }
    }

    pub fn settle(self, result: Result<Value, Value>) {
        match result {
            Ok(value) => self.resolve(value),
            Err(value) => self.reject(value),
        }
    }
}

impl Drop for AsyncCompletion {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            tracing::warn!(target: "reflect", "Async completion dropped before settling");
            let abandoned = Value::exception(Exception::new(
                "Asynchronous call was abandoned before settling",
                "AbandonedFuture",
                -1,
                "",
            ));
            let replacement = (inner.on_reject)(abandoned);
            inner.next.reject(replacement);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::TypeId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_settles_once() {
        let f = Future::pending();
        assert_eq!(f.state(), FutureState::Pending);
        assert!(f.resolve(Value::int(1)));
        assert!(!f.reject(Value::int(2)));
        assert_eq!(f.wait(), Ok(Value::int(1)));
        assert_eq!(f.state(), FutureState::Resolved);
    }

    #[test]
    fn test_then_chains_replacement_values() {
        let f = Future::pending();
        let next = f.then(
            |v| Value::int(v.to_int().unwrap() + 1),
            |_| Value::string("unreachable"),
        );
        assert!(next.value().is_none());
        f.resolve(Value::int(57));
        assert_eq!(next.value(), Some(Ok(Value::int(58))));

        let rejected = Future::rejected(Value::string("bad")).then(
            |v| v,
            |v| Value::string(format!("wrapped {}", v.stringify())),
        );
        assert_eq!(rejected.value(), Some(Err(Value::string("wrapped bad"))));
    }

    #[test]
    fn test_completion_invokes_exactly_one_callback() {
        let resolved = Arc::new(AtomicUsize::new(0));
        let rejected = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&resolved);
        let j = Arc::clone(&rejected);
        let (completion, future) = AsyncCompletion::new(
            Box::new(move |v| {
                r.fetch_add(1, Ordering::SeqCst);
                v
            }),
            Box::new(move |v| {
                j.fetch_add(1, Ordering::SeqCst);
                v
            }),
        );

        let worker = thread::spawn(move || completion.resolve(Value::int(58)));
        worker.join().unwrap();

        assert_eq!(future.wait(), Ok(Value::int(58)));
        assert_eq!(resolved.load(Ordering::SeqCst), 1);
        assert_eq!(rejected.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dropped_completion_rejects() {
        let (completion, future) = AsyncCompletion::passthrough();
        drop(completion);
        let err = future.wait().unwrap_err();
        assert_eq!(err.type_id(), TypeId::Exception);
        assert_eq!(err.to_exception().unwrap().label, "AbandonedFuture");
    }

    #[test]
    fn test_wait_timeout() {
        let f = Future::pending();
        assert!(f.wait_timeout(Duration::from_millis(10)).is_none());
        let setter = Arc::clone(&f);
        thread::spawn(move || {
            setter.reject(Value::null());
        });
        assert_eq!(f.wait_timeout(Duration::from_secs(5)), Some(Err(Value::null())));
    }
}

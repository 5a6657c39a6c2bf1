//! 对象反射
//!
//! An `Object` is an instance handle. Deleting it runs the backend
//! destructor once; the backend `destroy` hook runs when the last handle
//! goes away. The two are kept apart so a deleted object can still be
//! released normally.

use super::class::{check_visibility, Class, Visibility};
use super::future::{AsyncCompletion, RejectCallback, ResolveCallback};
use super::Value;
use crate::core::error::{ClassError, ClassResult};
use serde_json::json;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

/// 后端提供的对象接口表
pub trait ObjectInterface: Send + Sync {
    fn create(&self, _object: &Object) -> Result<(), String> {
        Ok(())
    }

    fn get(&self, object: &Object, attribute: &str) -> Option<Value>;

    fn set(&self, object: &Object, attribute: &str, value: Value) -> Result<(), Value>;

    fn method_invoke(&self, object: &Object, method: &str, args: &[Value]) -> Option<Value>;

    fn supports_await(&self) -> bool {
        false
    }

    fn method_await(&self, _object: &Object, _method: &str, _args: &[Value], completion: AsyncCompletion) {
        drop(completion);
    }

    /// Runs the foreign destructor. Failures are reported as values.
    fn destructor(&self, _object: &Object) -> Result<(), Value> {
        Ok(())
    }

    fn destroy(&self, _object: &Object) {}
}

#[derive(Debug, Default)]
struct Lifecycle {
    deleted: bool,
    destroyed: bool,
}

/// 对象
pub struct Object {
    name: String,
    class: Weak<Class>,
    interface: Box<dyn ObjectInterface>,
    lifecycle: RwLock<Lifecycle>,
}

impl Object {
    pub(crate) fn new(
        name: String,
        class: Weak<Class>,
        interface: Box<dyn ObjectInterface>,
    ) -> ClassResult<Arc<Object>> {
        let object = Self {
            name,
            class,
            interface,
            lifecycle: RwLock::new(Lifecycle::default()),
        };
        if let Err(reason) = object.interface.create(&object) {
            tracing::error!(target: "reflect", "Invalid object create hook for {}: {}", object.name, reason);
            *object.lifecycle.write().unwrap_or_else(|e| e.into_inner()) = Lifecycle {
                deleted: true,
                destroyed: true,
            };
            return Err(ClassError::Backend {
                owner: object.name.clone(),
                reason,
            });
        }
        Ok(Arc::new(object))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` once the class has been released.
    pub fn class(&self) -> Option<Arc<Class>> {
        self.class.upgrade()
    }

    pub fn is_deleted(&self) -> bool {
        self.lifecycle.read().unwrap_or_else(|e| e.into_inner()).deleted
    }

    fn ensure_live(&self) -> ClassResult<()> {
        if self.is_deleted() {
            Err(ClassError::ObjectDeleted(self.name.clone()))
        } else {
            Ok(())
        }
    }

    // Declared instance members must be public; undeclared ones pass through
    // to the backend untouched.
    fn check_attribute(&self, attribute: &str) -> ClassResult<()> {
        if let Some(class) = self.class() {
            if let Some(declared) = class.attribute(attribute).filter(|a| !a.is_static) {
                check_visibility(&self.name, attribute, declared.visibility)?;
            }
        }
        Ok(())
    }

    fn check_method(&self, method: &str) -> ClassResult<()> {
        if let Some(class) = self.class() {
            let declared: Vec<_> = class.methods(method).iter().filter(|m| !m.is_static).collect();
            if !declared.is_empty() && declared.iter().all(|m| m.visibility != Visibility::Public) {
                check_visibility(&self.name, method, declared[0].visibility)?;
            }
        }
        Ok(())
    }

    pub fn get(&self, attribute: &str) -> ClassResult<Option<Value>> {
        self.ensure_live()?;
        self.check_attribute(attribute)?;
        Ok(self.interface.get(self, attribute))
    }

    pub fn set(&self, attribute: &str, value: Value) -> ClassResult<()> {
        self.ensure_live()?;
        self.check_attribute(attribute)?;
        self.interface
            .set(self, attribute, value)
            .map_err(|e| ClassError::Backend {
                owner: self.name.clone(),
                reason: e.stringify(),
            })
    }

    /// 调用实例方法
    pub fn call(&self, method: &str, args: &[Value]) -> ClassResult<Option<Value>> {
        self.ensure_live()?;
        self.check_method(method)?;
        tracing::debug!(target: "reflect", "Calling {}.{} with {} arguments", self.name, method, args.len());
        Ok(self.interface.method_invoke(self, method, args))
    }

    pub fn await_call(
        &self,
        method: &str,
        args: &[Value],
        on_resolve: ResolveCallback,
        on_reject: RejectCallback,
    ) -> ClassResult<Value> {
        self.ensure_live()?;
        self.check_method(method)?;
        if !self.interface.supports_await() {
            return Err(ClassError::Unsupported {
                owner: self.name.clone(),
                operation: "await".to_string(),
            });
        }
        let (completion, future) = AsyncCompletion::new(on_resolve, on_reject);
        self.interface.method_await(self, method, args, completion);
        Ok(Value::future(future))
    }

    /// 删除对象：运行析构函数（最多一次）
    pub fn delete(&self) -> ClassResult<()> {
        {
            let mut lifecycle = self.lifecycle.write().unwrap_or_else(|e| e.into_inner());
            if lifecycle.deleted {
                return Err(ClassError::ObjectDeleted(self.name.clone()));
            }
            lifecycle.deleted = true;
        }
        self.interface
            .destructor(self)
            .map_err(|e| ClassError::Backend {
                owner: self.name.clone(),
                reason: e.stringify(),
            })
    }

    pub fn metadata(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "class": self.class().map(|c| c.name().to_string()),
            "deleted": self.is_deleted(),
        })
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut().unwrap_or_else(|e| e.into_inner());
        if lifecycle.destroyed {
            return;
        }
        let run_destructor = !lifecycle.deleted;
        lifecycle.deleted = true;
        lifecycle.destroyed = true;

        if run_destructor {
            if let Err(e) = self.interface.destructor(self) {
                tracing::warn!(target: "reflect", "Destructor of {} failed: {}", self.name, e.stringify());
            }
        }
        self.interface.destroy(self);
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("name", &self.name)
            .field("deleted", &self.is_deleted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{Attribute, ClassInterface, Constructor, Method, Signature, Visibility};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counts {
        destructed: AtomicUsize,
        destroyed: AtomicUsize,
    }

    struct Point {
        counts: Arc<Counts>,
        x: RwLock<f64>,
    }

    impl ObjectInterface for Point {
        fn get(&self, _object: &Object, attribute: &str) -> Option<Value> {
            match attribute {
                "x" => Some(Value::double(*self.x.read().unwrap())),
                _ => None,
            }
        }

        fn set(&self, _object: &Object, attribute: &str, value: Value) -> Result<(), Value> {
            match attribute {
                "x" => {
                    *self.x.write().unwrap() = value.to_double().map_err(|e| Value::string(e.to_string()))?;
                    Ok(())
                }
                _ => Err(Value::string(format!("no attribute {}", attribute))),
            }
        }

        fn method_invoke(&self, _object: &Object, method: &str, args: &[Value]) -> Option<Value> {
            match method {
                "scale" => {
                    let factor = args.first()?.to_double().ok()?;
                    let mut x = self.x.write().unwrap();
                    *x *= factor;
                    Some(Value::double(*x))
                }
                _ => None,
            }
        }

        fn destructor(&self, _object: &Object) -> Result<(), Value> {
            self.counts.destructed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn destroy(&self, _object: &Object) {
            self.counts.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PointClass {
        counts: Arc<Counts>,
    }

    impl ClassInterface for PointClass {
        fn constructor(
            &self,
            _class: &Class,
            _constructor: &Constructor,
            args: &[Value],
        ) -> Result<Box<dyn ObjectInterface>, Value> {
            let x = args.first().and_then(|v| v.to_double().ok()).unwrap_or(0.0);
            Ok(Box::new(Point {
                counts: Arc::clone(&self.counts),
                x: RwLock::new(x),
            }))
        }
    }

    fn point_class(counts: &Arc<Counts>) -> Arc<Class> {
        Class::builder(
            "Point",
            Box::new(PointClass {
                counts: Arc::clone(counts),
            }),
        )
        .attribute(Attribute::new("x", None, Visibility::Public))
        .attribute(Attribute::new("secret", None, Visibility::Private))
        .method(Method::new("scale", Signature::new(1), Visibility::Public))
        .method(Method::new("reset", Signature::new(0), Visibility::Protected))
        .build()
        .unwrap()
    }

    #[test]
    fn test_attributes_and_methods() {
        let counts = Arc::new(Counts::default());
        let class = point_class(&counts);
        let obj = class.new_object("", &[Value::double(2.0)]).unwrap().to_object().unwrap();

        assert_eq!(obj.name(), "Point");
        assert_eq!(obj.get("x").unwrap(), Some(Value::double(2.0)));
        obj.set("x", Value::double(3.0)).unwrap();
        assert_eq!(obj.call("scale", &[Value::double(2.0)]).unwrap(), Some(Value::double(6.0)));

        assert!(matches!(obj.get("secret"), Err(ClassError::Inaccessible { .. })));
        assert!(matches!(obj.call("reset", &[]), Err(ClassError::Inaccessible { .. })));
        assert!(matches!(
            obj.set("y", Value::int(1)),
            Err(ClassError::Backend { .. })
        ));
        assert!(matches!(
            obj.await_call("scale", &[], Box::new(|v| v), Box::new(|v| v)),
            Err(ClassError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_delete_runs_destructor_once() {
        let counts = Arc::new(Counts::default());
        let class = point_class(&counts);
        let obj = class.new_object("", &[]).unwrap().to_object().unwrap();
        let alias = Arc::clone(&obj);

        obj.delete().unwrap();
        assert!(matches!(alias.delete(), Err(ClassError::ObjectDeleted(_))));
        assert!(matches!(alias.get("x"), Err(ClassError::ObjectDeleted(_))));
        assert_eq!(counts.destructed.load(Ordering::SeqCst), 1);
        assert_eq!(counts.destroyed.load(Ordering::SeqCst), 0);

        drop(obj);
        drop(alias);
        assert_eq!(counts.destructed.load(Ordering::SeqCst), 1);
        assert_eq!(counts.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_without_delete_runs_destructor() {
        let counts = Arc::new(Counts::default());
        let class = point_class(&counts);
        let value = class.new_object("", &[]).unwrap();
        let copy = value.clone();
        drop(value);
        assert_eq!(counts.destructed.load(Ordering::SeqCst), 0);
        drop(copy);
        assert_eq!(counts.destructed.load(Ordering::SeqCst), 1);
        assert_eq!(counts.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_metadata() {
        let counts = Arc::new(Counts::default());
        let class = point_class(&counts);
        let obj = class.new_object("", &[]).unwrap().to_object().unwrap();
        let meta = obj.metadata();
        assert_eq!(meta["class"], "Point");
        assert_eq!(meta["deleted"], false);
    }
}

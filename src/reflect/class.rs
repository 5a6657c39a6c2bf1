//! 类反射
//!
//! State machine: a `ClassBuilder` is an unregistered class; `build` runs the
//! backend `create` hook and yields a registered `Arc<Class>`; `destroy` (or
//! the last reference going away) moves it to `Destroyed` and runs the
//! backend `destroy` hook once.
//!
//! The class owns its constructor, attribute and method tables. Objects only
//! keep a weak reference back to their class.

use super::future::{AsyncCompletion, RejectCallback, ResolveCallback};
use super::object::{Object, ObjectInterface};
use super::{Signature, Type, TypeId, Value};
use crate::core::error::{ClassError, ClassResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// 成员可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        };
        f.write_str(name)
    }
}

/// 构造函数
#[derive(Debug, Clone)]
pub struct Constructor {
    pub name: Option<String>,
    pub signature: Signature,
    pub visibility: Visibility,
}

impl Constructor {
    pub fn new(signature: Signature, visibility: Visibility) -> Self {
        Self {
            name: None,
            signature,
            visibility,
        }
    }

    pub fn named(name: impl Into<String>, signature: Signature, visibility: Visibility) -> Self {
        Self {
            name: Some(name.into()),
            signature,
            visibility,
        }
    }

    pub fn metadata(&self) -> serde_json::Value {
        json!({
            "name": self.name.as_deref().unwrap_or(""),
            "visibility": self.visibility.to_string(),
            "signature": self.signature.metadata(),
        })
    }
}

/// 属性
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub ty: Option<Arc<Type>>,
    pub visibility: Visibility,
    pub is_static: bool,
}

impl Attribute {
    pub fn new(name: impl Into<String>, ty: Option<Arc<Type>>, visibility: Visibility) -> Self {
        Self {
            name: name.into(),
            ty,
            visibility,
            is_static: false,
        }
    }

    pub fn into_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn metadata(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "visibility": self.visibility.to_string(),
            "type": self.ty.as_ref().map(|t| t.metadata()).unwrap_or_else(|| json!({})),
        })
    }
}

/// 方法
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub signature: Signature,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_async: bool,
}

impl Method {
    pub fn new(name: impl Into<String>, signature: Signature, visibility: Visibility) -> Self {
        Self {
            name: name.into(),
            signature,
            visibility,
            is_static: false,
            is_async: false,
        }
    }

    pub fn into_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn into_async(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn metadata(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "visibility": self.visibility.to_string(),
            "async": self.is_async,
            "signature": self.signature.metadata(),
        })
    }
}

/// 后端提供的类接口表
pub trait ClassInterface: Send + Sync {
    fn create(&self, _class: &Class) -> Result<(), String> {
        Ok(())
    }

    /// 构造实例；失败时返回异常值
    fn constructor(
        &self,
        class: &Class,
        constructor: &Constructor,
        args: &[Value],
    ) -> Result<Box<dyn ObjectInterface>, Value>;

    fn static_get(&self, _class: &Class, _attribute: &Attribute) -> Option<Value> {
        None
    }

    fn static_set(&self, class: &Class, attribute: &Attribute, _value: Value) -> Result<(), Value> {
        Err(Value::string(format!(
            "{}.{} is read-only",
            class.name(),
            attribute.name
        )))
    }

    fn static_invoke(&self, _class: &Class, _method: &Method, _args: &[Value]) -> Option<Value> {
        None
    }

    fn supports_await(&self) -> bool {
        false
    }

    fn static_await(
        &self,
        _class: &Class,
        _method: &Method,
        _args: &[Value],
        completion: AsyncCompletion,
    ) {
        drop(completion);
    }

    fn destroy(&self, _class: &Class) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassState {
    Registered,
    Destroyed,
}

/// 未注册的类
pub struct ClassBuilder {
    name: String,
    interface: Box<dyn ClassInterface>,
    constructors: Vec<Constructor>,
    attributes: Vec<Attribute>,
    methods: Vec<Method>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>, interface: Box<dyn ClassInterface>) -> Self {
        Self {
            name: name.into(),
            interface,
            constructors: Vec::new(),
            attributes: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn constructor(mut self, constructor: Constructor) -> Self {
        self.constructors.push(constructor);
        self
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    /// 注册类（调用 `create` 钩子）
    pub fn build(self) -> ClassResult<Arc<Class>> {
        let mut attributes = HashMap::new();
        for attribute in self.attributes {
            attributes.insert(attribute.name.clone(), attribute);
        }
        let mut methods: HashMap<String, Vec<Method>> = HashMap::new();
        for method in self.methods {
            methods.entry(method.name.clone()).or_default().push(method);
        }

        let class = Class {
            name: self.name,
            interface: self.interface,
            constructors: self.constructors,
            attributes,
            methods,
            state: RwLock::new(ClassState::Registered),
        };

        if let Err(reason) = class.interface.create(&class) {
            tracing::error!(target: "reflect", "Invalid class create hook for {}: {}", class.name, reason);
            *class.state.write().unwrap_or_else(|e| e.into_inner()) = ClassState::Destroyed;
            return Err(ClassError::Backend {
                owner: class.name.clone(),
                reason,
            });
        }
        Ok(Arc::new(class))
    }
}

/// 类
pub struct Class {
    name: String,
    interface: Box<dyn ClassInterface>,
    constructors: Vec<Constructor>,
    attributes: HashMap<String, Attribute>,
    methods: HashMap<String, Vec<Method>>,
    state: RwLock<ClassState>,
}

impl Class {
    pub fn builder(name: impl Into<String>, interface: Box<dyn ClassInterface>) -> ClassBuilder {
        ClassBuilder::new(name, interface)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ClassState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn constructors(&self) -> &[Constructor] {
        &self.constructors
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn methods(&self, name: &str) -> &[Method] {
        self.methods.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn ensure_live(&self) -> ClassResult<()> {
        match self.state() {
            ClassState::Registered => Ok(()),
            ClassState::Destroyed => Err(ClassError::Destroyed(self.name.clone())),
        }
    }

    fn select_constructor(&self, name: &str, args: &[Value]) -> ClassResult<Constructor> {
        let selected = if name.is_empty() {
            if self.constructors.is_empty() {
                return Ok(Constructor::new(Signature::new(args.len()), Visibility::Public));
            }
            let ids: Vec<TypeId> = args.iter().map(Value::type_id).collect();
            self.constructors
                .iter()
                .find(|c| c.signature.compare(None, &ids))
                .or_else(|| {
                    self.constructors
                        .iter()
                        .find(|c| c.signature.count() == args.len())
                })
        } else {
            self.constructors
                .iter()
                .find(|c| c.name.as_deref() == Some(name))
        };

        let constructor = selected.ok_or_else(|| ClassError::ConstructorNotFound {
            class: self.name.clone(),
            constructor: if name.is_empty() {
                format!("<{} arguments>", args.len())
            } else {
                name.to_string()
            },
        })?;

        if constructor.visibility != Visibility::Public {
            return Err(ClassError::Inaccessible {
                owner: self.name.clone(),
                member: constructor.name.clone().unwrap_or_else(|| "constructor".to_string()),
                visibility: constructor.visibility.to_string(),
            });
        }
        Ok(constructor.clone())
    }

    /// 创建实例
    ///
    /// Selects the constructor named `constructor_name`, or (when empty) the
    /// first public one matching the argument types. Returns an `Object`
    /// value, or the backend's exception value if the constructor failed.
    pub fn new_object(self: &Arc<Self>, constructor_name: &str, args: &[Value]) -> ClassResult<Value> {
        self.ensure_live()?;
        let constructor = self.select_constructor(constructor_name, args)?;
        tracing::debug!(target: "reflect", "Constructing {} with {} arguments", self.name, args.len());

        match self.interface.constructor(self, &constructor, args) {
            Ok(interface) => {
                let object = Object::new(self.name.clone(), Arc::downgrade(self), interface)?;
                Ok(Value::object(object))
            }
            Err(exception) => Ok(exception),
        }
    }

    fn static_attribute(&self, name: &str) -> ClassResult<&Attribute> {
        let attribute = self
            .attributes
            .get(name)
            .filter(|a| a.is_static)
            .ok_or_else(|| ClassError::AttributeNotFound {
                owner: self.name.clone(),
                attribute: name.to_string(),
            })?;
        check_visibility(&self.name, name, attribute.visibility)?;
        Ok(attribute)
    }

    fn static_method(&self, name: &str, args: &[Value]) -> ClassResult<&Method> {
        let candidates: Vec<&Method> = self.methods(name).iter().filter(|m| m.is_static).collect();
        let method = select_overload(&candidates, args).ok_or_else(|| ClassError::MethodNotFound {
            owner: self.name.clone(),
            method: name.to_string(),
        })?;
        check_visibility(&self.name, name, method.visibility)?;
        Ok(method)
    }

    pub fn static_get(&self, name: &str) -> ClassResult<Option<Value>> {
        self.ensure_live()?;
        let attribute = self.static_attribute(name)?;
        Ok(self.interface.static_get(self, attribute))
    }

    pub fn static_set(&self, name: &str, value: Value) -> ClassResult<()> {
        self.ensure_live()?;
        let attribute = self.static_attribute(name)?;
        self.interface
            .static_set(self, attribute, value)
            .map_err(|e| ClassError::Backend {
                owner: self.name.clone(),
                reason: e.stringify(),
            })
    }

    pub fn static_call(&self, name: &str, args: &[Value]) -> ClassResult<Option<Value>> {
        self.ensure_live()?;
        let method = self.static_method(name, args)?;
        Ok(self.interface.static_invoke(self, method, args))
    }

    pub fn static_await(
        &self,
        name: &str,
        args: &[Value],
        on_resolve: ResolveCallback,
        on_reject: RejectCallback,
    ) -> ClassResult<Value> {
        self.ensure_live()?;
        let method = self.static_method(name, args)?;
        if !self.interface.supports_await() {
            return Err(ClassError::Unsupported {
                owner: self.name.clone(),
                operation: "await".to_string(),
            });
        }
        let (completion, future) = AsyncCompletion::new(on_resolve, on_reject);
        self.interface.static_await(self, method, args, completion);
        Ok(Value::future(future))
    }

    /// 销毁类（幂等）
    pub fn destroy(&self) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *state == ClassState::Destroyed {
            return false;
        }
        *state = ClassState::Destroyed;
        self.interface.destroy(self);
        true
    }

    pub fn metadata(&self) -> serde_json::Value {
        let mut attributes = Vec::new();
        let mut static_attributes = Vec::new();
        let mut names: Vec<&String> = self.attributes.keys().collect();
        names.sort();
        for name in names {
            let attribute = &self.attributes[name];
            if attribute.is_static {
                static_attributes.push(attribute.metadata());
            } else {
                attributes.push(attribute.metadata());
            }
        }

        let mut methods = Vec::new();
        let mut static_methods = Vec::new();
        let mut names: Vec<&String> = self.methods.keys().collect();
        names.sort();
        for name in names {
            for method in &self.methods[name] {
                if method.is_static {
                    static_methods.push(method.metadata());
                } else {
                    methods.push(method.metadata());
                }
            }
        }

        json!({
            "name": self.name,
            "constructors": self.constructors.iter().map(Constructor::metadata).collect::<Vec<_>>(),
            "attributes": attributes,
            "methods": methods,
            "static_attributes": static_attributes,
            "static_methods": static_methods,
        })
    }
}

impl Drop for Class {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

pub(crate) fn check_visibility(owner: &str, member: &str, visibility: Visibility) -> ClassResult<()> {
    if visibility == Visibility::Public {
        Ok(())
    } else {
        Err(ClassError::Inaccessible {
            owner: owner.to_string(),
            member: member.to_string(),
            visibility: visibility.to_string(),
        })
    }
}

pub(crate) fn select_overload<'a>(candidates: &[&'a Method], args: &[Value]) -> Option<&'a Method> {
    let ids: Vec<TypeId> = args.iter().map(Value::type_id).collect();
    candidates
        .iter()
        .find(|m| m.signature.compare(None, &ids))
        .or_else(|| candidates.iter().find(|m| m.signature.count() == args.len()))
        .or_else(|| candidates.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::Exception;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    struct Counter {
        value: Arc<AtomicI32>,
    }

    impl ObjectInterface for Counter {
        fn get(&self, _obj: &Object, attribute: &str) -> Option<Value> {
            (attribute == "value").then(|| Value::int(self.value.load(Ordering::SeqCst)))
        }

        fn set(&self, _obj: &Object, attribute: &str, value: Value) -> Result<(), Value> {
            if attribute != "value" {
                return Err(Value::string("unknown attribute"));
            }
            let v = value.to_int().map_err(|e| Value::string(e.to_string()))?;
            self.value.store(v, Ordering::SeqCst);
            Ok(())
        }

        fn method_invoke(&self, _obj: &Object, method: &str, _args: &[Value]) -> Option<Value> {
            match method {
                "increment" => Some(Value::int(self.value.fetch_add(1, Ordering::SeqCst) + 1)),
                _ => None,
            }
        }
    }

    struct CounterClass {
        destroyed: Arc<AtomicUsize>,
    }

    impl ClassInterface for CounterClass {
        fn constructor(
            &self,
            _class: &Class,
            constructor: &Constructor,
            args: &[Value],
        ) -> Result<Box<dyn ObjectInterface>, Value> {
            let start = match args.first() {
                Some(v) => v.to_int().map_err(|_| {
                    Value::exception(Exception::new("start must be int", "TypeError", 1, ""))
                })?,
                None => 0,
            };
            let start = if constructor.name.as_deref() == Some("from_ten") { 10 } else { start };
            Ok(Box::new(Counter {
                value: Arc::new(AtomicI32::new(start)),
            }))
        }

        fn static_get(&self, _class: &Class, attribute: &Attribute) -> Option<Value> {
            (attribute.name == "instances").then(|| Value::long(0))
        }

        fn static_invoke(&self, _class: &Class, method: &Method, args: &[Value]) -> Option<Value> {
            match method.name.as_str() {
                "describe" => Some(Value::string(format!("Counter/{}", args.len()))),
                _ => None,
            }
        }

        fn destroy(&self, _class: &Class) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counter_class(destroyed: &Arc<AtomicUsize>) -> Arc<Class> {
        let mut with_start = Signature::new(1);
        with_start.set(0, "start", Some(Type::builtin(TypeId::Int))).unwrap();

        Class::builder(
            "Counter",
            Box::new(CounterClass {
                destroyed: Arc::clone(destroyed),
            }),
        )
        .constructor(Constructor::new(Signature::new(0), Visibility::Public))
        .constructor(Constructor::new(with_start, Visibility::Public))
        .constructor(Constructor::named("from_ten", Signature::new(0), Visibility::Public))
        .constructor(Constructor::named("secret", Signature::new(0), Visibility::Private))
        .attribute(Attribute::new("value", Some(Type::builtin(TypeId::Int)), Visibility::Public))
        .attribute(Attribute::new("hidden", None, Visibility::Private))
        .attribute(Attribute::new("instances", None, Visibility::Public).into_static())
        .method(Method::new("increment", Signature::new(0), Visibility::Public))
        .method(Method::new("describe", Signature::new(0), Visibility::Public).into_static())
        .build()
        .unwrap()
    }

    #[test]
    fn test_constructor_selection() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let class = counter_class(&destroyed);

        let obj = class.new_object("", &[Value::int(5)]).unwrap().to_object().unwrap();
        assert_eq!(obj.get("value").unwrap(), Some(Value::int(5)));

        let obj = class.new_object("from_ten", &[]).unwrap().to_object().unwrap();
        assert_eq!(obj.call("increment", &[]).unwrap(), Some(Value::int(11)));

        assert!(matches!(
            class.new_object("secret", &[]),
            Err(ClassError::Inaccessible { .. })
        ));
        assert!(matches!(
            class.new_object("missing", &[]),
            Err(ClassError::ConstructorNotFound { .. })
        ));
    }

    #[test]
    fn test_constructor_failure_is_exception_value() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let class = counter_class(&destroyed);
        let result = class.new_object("", &[Value::string("x")]).unwrap();
        assert!(result.is_exception());
    }

    #[test]
    fn test_static_members() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let class = counter_class(&destroyed);
        assert_eq!(class.static_get("instances").unwrap(), Some(Value::long(0)));
        assert!(matches!(
            class.static_get("value"),
            Err(ClassError::AttributeNotFound { .. })
        ));
        assert!(matches!(
            class.static_set("instances", Value::long(1)),
            Err(ClassError::Backend { .. })
        ));
        assert_eq!(
            class.static_call("describe", &[]).unwrap(),
            Some(Value::string("Counter/0"))
        );
        assert!(matches!(
            class.static_await("describe", &[], Box::new(|v| v), Box::new(|v| v)),
            Err(ClassError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_object_keeps_weak_class_reference() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let class = counter_class(&destroyed);
        let obj = class.new_object("", &[]).unwrap().to_object().unwrap();
        assert!(obj.class().is_some());
        drop(class);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert!(obj.class().is_none());
        // instance handle still works after its class went away
        assert_eq!(obj.call("increment", &[]).unwrap(), Some(Value::int(1)));
    }

    #[test]
    fn test_destroy_state_machine() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let class = counter_class(&destroyed);
        assert_eq!(class.state(), ClassState::Registered);
        let extra = Arc::clone(&class);
        assert!(class.destroy());
        assert!(!extra.destroy());
        assert_eq!(class.state(), ClassState::Destroyed);
        assert!(matches!(
            class.new_object("", &[]),
            Err(ClassError::Destroyed(_))
        ));
        drop(class);
        drop(extra);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_metadata() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let class = counter_class(&destroyed);
        let meta = class.metadata();
        assert_eq!(meta["name"], "Counter");
        assert_eq!(meta["constructors"].as_array().unwrap().len(), 4);
        assert_eq!(meta["static_attributes"][0]["name"], "instances");
        assert_eq!(meta["methods"][0]["name"], "increment");
        assert_eq!(meta["static_methods"][0]["name"], "describe");
    }
}

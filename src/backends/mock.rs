//! 模拟后端
//!
//! Accepts any source and always discovers the same fixed set of functions.
//! Each function ignores its arguments and returns a constant picked by its
//! declared return type. Used to exercise the dispatch path without a real
//! language runtime.

use crate::config::LoaderConfig;
use crate::impl_default_and_new;
use crate::core::error::{LoaderError, LoaderResult};
use crate::loader::{module_ref, Backend, BackendModule, Export, LoadSource};
use crate::reflect::{Function, FunctionInterface, Signature, Type, TypeId, Value};
use std::collections::HashMap;
use std::sync::Arc;

static POINTER_TARGET: i32 = 15;

const TYPES: [(TypeId, &str); 10] = [
    (TypeId::Bool, "Boolean"),
    (TypeId::Char, "Char"),
    (TypeId::Short, "Short"),
    (TypeId::Int, "Integer"),
    (TypeId::Long, "Long"),
    (TypeId::Float, "Float"),
    (TypeId::Double, "Double"),
    (TypeId::String, "String"),
    (TypeId::Buffer, "Buffer"),
    (TypeId::Ptr, "Ptr"),
];

// (name, return type, [(parameter, type)])
const FUNCTIONS: [(&str, &str, &[(&str, &str)]); 8] = [
    ("my_empty_func", "Integer", &[]),
    (
        "two_doubles",
        "Double",
        &[("first_parameter", "Double"), ("second_parameter", "Double")],
    ),
    (
        "mixed_args",
        "Char",
        &[
            ("a_char", "Char"),
            ("b_int", "Integer"),
            ("c_long", "Long"),
            ("d_double", "Double"),
            ("e_ptr", "Ptr"),
        ],
    ),
    ("new_args", "String", &[("a_str", "String")]),
    ("two_str", "String", &[("a_str", "String"), ("b_str", "String")]),
    (
        "three_str",
        "String",
        &[("a_str", "String"), ("b_str", "String"), ("c_str", "String")],
    ),
    ("my_empty_func_str", "String", &[]),
    ("my_empty_func_int", "Integer", &[]),
];

struct MockModule {
    name: String,
}

/// 模拟函数
struct MockFunction;

impl FunctionInterface for MockFunction {
    fn invoke(&self, func: &Function, args: &[Value]) -> Option<Value> {
        if args.is_empty() {
            tracing::debug!(target: "mock", "Calling mock function {} without arguments", func.name());
        } else {
            for (index, arg) in args.iter().enumerate() {
                tracing::debug!(target: "mock", "Argument {}: {:?}", index, arg);
            }
            tracing::debug!(target: "mock", "Calling mock function {} with arguments ({})", func.name(), args.len());
        }

        let ret = func.signature().get_return()?;
        let value = match ret.id() {
            TypeId::Bool => Value::bool(true),
            TypeId::Char => Value::char(b'A' as i8),
            TypeId::Short => Value::short(124),
            TypeId::Int => Value::int(1234),
            TypeId::Long => Value::long(90000),
            TypeId::Float => Value::float(0.2),
            TypeId::Double => Value::double(3.1416),
            TypeId::String => Value::string("Hello World"),
            TypeId::Ptr => Value::ptr(&POINTER_TARGET as *const i32 as usize),
            other => {
                tracing::error!(target: "mock", "Unrecognized return type {}", other);
                return None;
            }
        };
        Some(value)
    }
}

/// 模拟后端
pub struct MockBackend {
    types: HashMap<&'static str, Arc<Type>>,
}

impl_default_and_new!(MockBackend {
    types: HashMap::new(),
});

impl MockBackend {
    fn named(&self, name: &str) -> Option<Arc<Type>> {
        self.types.get(name).cloned()
    }
}

impl Backend for MockBackend {
    fn extension(&self) -> &str {
        "mock"
    }

    fn types(&self) -> Vec<Type> {
        TYPES.iter().map(|(id, name)| Type::new(*id, *name)).collect()
    }

    fn initialize(&mut self, _config: &LoaderConfig) -> LoaderResult<()> {
        for (id, name) in TYPES {
            self.types.insert(name, Arc::new(Type::new(id, name)));
        }
        tracing::debug!(target: "mock", "Mock backend initialized with {} types", self.types.len());
        Ok(())
    }

    fn load(&mut self, source: &LoadSource) -> LoaderResult<BackendModule> {
        let name = source.module_name();
        match source {
            LoadSource::Files(paths) => {
                for path in paths {
                    tracing::debug!(target: "mock", "Mock module {} loaded from file", path.display());
                }
            }
            LoadSource::Memory { .. } => {
                tracing::debug!(target: "mock", "Mock module {} loaded from memory", name);
            }
            LoadSource::Package(path) => {
                tracing::debug!(target: "mock", "Mock module {} loaded from package", path.display());
            }
        }
        Ok(Box::new(MockModule { name }))
    }

    fn discover(&mut self, module: &mut BackendModule) -> LoaderResult<Vec<Export>> {
        let module = module_ref::<MockModule>("mock", module)?;
        tracing::debug!(target: "mock", "Mock module {} discovering", module.name);

        let mut exports = Vec::with_capacity(FUNCTIONS.len());
        for (name, ret, params) in FUNCTIONS {
            let mut signature = Signature::new(params.len());
            signature.set_return(self.named(ret));
            for (index, (param, ty)) in params.iter().enumerate() {
                signature
                    .set(index, param, self.named(ty))
                    .map_err(|e| LoaderError::Symbol(e.to_string()))?;
            }
            exports.push(Export::function(name, signature, Box::new(MockFunction)));
        }
        Ok(exports)
    }

    fn clear(&mut self, module: BackendModule) -> LoaderResult<()> {
        if let Ok(module) = module.downcast::<MockModule>() {
            tracing::debug!(target: "mock", "Mock module {} cleared", module.name);
        }
        Ok(())
    }

    fn destroy(&mut self) {
        self.types.clear();
        tracing::debug!(target: "mock", "Mock backend destroyed");
    }
}

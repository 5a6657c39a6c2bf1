//! 反射层
//!
//! Language-neutral model of values, types, callables, classes and scopes.
//! Backends only ever talk to the runtime through the types in this module.

pub mod cast;
pub mod class;
pub mod exception;
pub mod function;
pub mod future;
pub mod object;
pub mod parse;
pub mod scope;
pub mod signature;
pub mod stringify;
pub mod type_id;
pub mod value;

pub use cast::cast;
pub use class::{
    Attribute, Class, ClassBuilder, ClassInterface, ClassState, Constructor, Method, Visibility,
};
pub use exception::Exception;
pub use function::{Function, FunctionInterface};
pub use future::{AsyncCompletion, Future, FutureState, RejectCallback, ResolveCallback};
pub use object::{Object, ObjectInterface};
pub use parse::parse_as;
pub use scope::{DefinePolicy, Scope};
pub use signature::{Parameter, Signature, Type};
pub use type_id::TypeId;
pub use value::{Finalizer, Value, ValueData};

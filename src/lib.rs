//! # Polyglot Core
//!
//! A runtime core for calling functions across language boundaries.
//!
//! ## Features
//!
//! - **Values**: reference-counted, type-tagged values shared by every backend
//! - **Type Lattice**: casts between scalar, string, buffer and array values
//! - **Callables**: functions, classes and objects with backend-provided hooks
//! - **Loader**: per-language backends with load/discover/clear lifecycles
//! - **Backends**: mock, native (Rust closures) and JavaScript (QuickJS)
//!
//! ### Example
//!
//! ```no_run
//! use polyglot_core::{Runtime, RuntimeConfig, Value};
//!
//! let runtime = Runtime::with_default_backends(RuntimeConfig::default()).unwrap();
//! runtime.load_from_memory("js", "sum.js", "function sum(a, b) { return a + b; }").unwrap();
//! assert_eq!(runtime.call("sum", &[Value::int(3), Value::int(4)]).unwrap(), Some(Value::int(7)));
//! ```
//!
//! ## Modules
//!
//! - [`core`]: errors, logging and helper macros
//! - [`config`]: runtime configuration
//! - [`reflect`]: values, casts, signatures, functions, classes, objects, scopes
//! - [`loader`]: backend registry
//! - [`serial`]: value serialization
//! - [`backends`]: built-in language backends
//! - [`runtime`]: process-facing facade

/// Errors, logging and helper macros
pub mod core;
/// Configuration system
pub mod config;
/// Value model and callable abstractions
pub mod reflect;
/// Backend registry and module lifecycle
pub mod loader;
/// JSON and binary value serialization
pub mod serial;
/// Built-in language backends
pub mod backends;
/// Runtime facade
pub mod runtime;

pub use crate::config::RuntimeConfig;
pub use crate::core::error::{RuntimeError, RuntimeResult};
pub use crate::loader::{HandleId, Linkage, LoadSource, LoaderRegistry};
pub use crate::reflect::{Function, Signature, Type, TypeId, Value};
pub use crate::runtime::Runtime;

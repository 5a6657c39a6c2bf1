//! 内置语言后端
//!
//! - `mock` - fixed discovery table, constant return values
//! - `native` - Rust closures registered by the host
//! - `js` - QuickJS scripts (feature `js`)

pub mod mock;
pub mod native;

#[cfg(feature = "js")]
pub mod js;

pub use mock::MockBackend;
pub use native::{NativeBackend, NativeFuture, NativeModule, NativeModules};

#[cfg(feature = "js")]
pub use js::JsBackend;

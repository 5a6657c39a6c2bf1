//! 核心模块
//!
//! 包含运行时的基础设施：
//! - `error` - 错误类型定义
//! - `logging` - 日志系统初始化
//! - `macros` - 通用宏

pub mod error;
pub mod logging;
#[macro_use]
pub mod macros;

// 重新导出错误类型
pub use error::{
    CastError, CastResult, ClassError, ClassResult, FunctionError, FunctionResult, LoaderError,
    LoaderResult, RuntimeError, RuntimeResult, ScopeError, ScopeResult, SerialError,
    SerialResult, SignatureError, SignatureResult, ValueError, ValueResult,
};
pub use logging::init_logging;

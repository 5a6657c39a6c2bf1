//! 统一错误处理模块
//!
//! 提供运行时范围内的统一错误类型定义
//!
//! ## 错误类型分层
//!
//! - **反射层错误** (`ValueError`, `CastError`, `SignatureError`, `FunctionError`,
//!   `ClassError`, `ScopeError`): 值、类型转换、可调用对象的错误
//! - **加载层错误** (`LoaderError`): 后端注册、加载、发现、清理的错误
//! - **序列化错误** (`SerialError`)
//!
//! `RuntimeError` 可以同时处理以上所有层的错误。
//!
//! Backend failures inside a foreign language are *not* errors at this level:
//! they travel as `Exception`/`Throwable` values inside `Ok(Some(value))`.

use crate::reflect::TypeId;
use thiserror::Error;

/// 运行时核心错误类型
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Initialization error: {0}")]
    Init(String),

    #[error("Value error: {0}")]
    Value(#[from] ValueError),

    #[error("Cast error: {0}")]
    Cast(#[from] CastError),

    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("Function error: {0}")]
    Function(#[from] FunctionError),

    #[error("Class error: {0}")]
    Class(#[from] ClassError),

    #[error("Scope error: {0}")]
    Scope(#[from] ScopeError),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Serial error: {0}")]
    Serial(#[from] SerialError),

    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Invalid number of arguments for {name}: expected {expected}, got {got}")]
    ArgumentCount {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("Unknown argument {argument} for {name}")]
    UnknownArgument { name: String, argument: String },

    #[error("Missing argument {argument} for {name}")]
    MissingArgument { name: String, argument: String },

    #[error("Arguments for {name} must be an array or a map, found {found:?}")]
    InvalidArguments { name: String, found: TypeId },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 值错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("Type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch { expected: TypeId, found: TypeId },

    #[error("Invalid payload size for {id:?}: expected {expected} bytes, got {got}")]
    InvalidSize {
        id: TypeId,
        expected: usize,
        got: usize,
    },

    #[error("Invalid UTF-8 payload: {0}")]
    InvalidUtf8(String),

    #[error("Values of type {0:?} cannot be created from raw bytes")]
    NotRawConstructible(TypeId),
}

/// 类型转换错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CastError {
    #[error("Unsupported cast from {from:?} to {to:?}")]
    Unsupported { from: TypeId, to: TypeId },

    #[error("Cast from {from:?} to {to:?} is not implemented")]
    NotImplemented { from: TypeId, to: TypeId },

    #[error("Cannot parse {input:?} as {to:?}")]
    Parse { input: String, to: TypeId },
}

/// 签名错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignatureError {
    #[error("Signature index {index} out of range (count {count})")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Duplicated parameter name: {0}")]
    DuplicateName(String),
}

/// 可调用对象错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FunctionError {
    #[error("Function {0} is no longer live")]
    NotLive(String),

    #[error("Function {name} does not support {operation}")]
    Unsupported { name: String, operation: String },

    #[error("Create hook of function {name} failed: {reason}")]
    CreateFailed { name: String, reason: String },
}

/// 类与对象错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassError {
    #[error("Class {0} has been destroyed")]
    Destroyed(String),

    #[error("Object {0} has been deleted")]
    ObjectDeleted(String),

    #[error("Constructor not found in class {class}: {constructor}")]
    ConstructorNotFound { class: String, constructor: String },

    #[error("Member {member} of {owner} is not accessible ({visibility})")]
    Inaccessible {
        owner: String,
        member: String,
        visibility: String,
    },

    #[error("Attribute not found in {owner}: {attribute}")]
    AttributeNotFound { owner: String, attribute: String },

    #[error("Method not found in {owner}: {method}")]
    MethodNotFound { owner: String, method: String },

    #[error("{owner} does not support {operation}")]
    Unsupported { owner: String, operation: String },

    #[error("Backend failure in {owner}: {reason}")]
    Backend { owner: String, reason: String },
}

/// 作用域错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScopeError {
    #[error("Symbol {symbol} already defined in scope {scope}")]
    Duplicate { scope: String, symbol: String },

    #[error("Symbol not found in scope {scope}: {symbol}")]
    NotFound { scope: String, symbol: String },
}

/// 加载器错误
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Backend already registered for tag: {0}")]
    DuplicateBackend(String),

    #[error("No backend registered for tag: {0}")]
    UnknownTag(String),

    #[error("Backend {tag} failed to initialize: {reason}")]
    InitializeFailed { tag: String, reason: String },

    #[error("Backend {tag} failed to load {module}: {reason}")]
    LoadFailed {
        tag: String,
        module: String,
        reason: String,
    },

    #[error("Backend {tag} failed to discover {module}: {reason}")]
    DiscoverFailed {
        tag: String,
        module: String,
        reason: String,
    },

    #[error("Module {module} already loaded by backend {tag}")]
    HandleExists { tag: String, module: String },

    #[error("Unknown handle: {0}")]
    UnknownHandle(u64),

    #[error("Symbol conflict: {symbol} already defined in the global scope by {owner}")]
    SymbolConflict { symbol: String, owner: String },

    #[error("Script not found: {0}")]
    ScriptNotFound(String),

    #[error("Failed to load library: {0}")]
    Library(String),

    #[error("Failed to get backend symbol: {0}")]
    Symbol(String),

    #[error("Function error: {0}")]
    Function(#[from] FunctionError),

    #[error("Scope error: {0}")]
    Scope(#[from] ScopeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 序列化错误
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("Unknown serial format: {0}")]
    UnknownFormat(String),

    #[error("Values of type {0:?} cannot be serialized")]
    Unsupported(TypeId),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Deserialize error: {0}")]
    Deserialize(String),
}

/// 运行时结果类型别名
pub type RuntimeResult<T> = Result<T, RuntimeError>;
pub type ValueResult<T> = Result<T, ValueError>;
pub type CastResult<T> = Result<T, CastError>;
pub type SignatureResult<T> = Result<T, SignatureError>;
pub type FunctionResult<T> = Result<T, FunctionError>;
pub type ClassResult<T> = Result<T, ClassError>;
pub type ScopeResult<T> = Result<T, ScopeError>;
pub type LoaderResult<T> = Result<T, LoaderError>;
pub type SerialResult<T> = Result<T, SerialError>;

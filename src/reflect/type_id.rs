//! 类型标签
//!
//! The closed, versioned set of type tags. The discriminants are stable and
//! define the total order used by promotion and demotion:
//! `Bool < Char < Short < Int < Long < Float < Double`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::mem;

/// 值类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum TypeId {
    Bool = 0,
    Char = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    String = 7,
    Buffer = 8,
    Array = 9,
    Map = 10,
    Ptr = 11,
    Future = 12,
    Function = 13,
    Null = 14,
    Class = 15,
    Object = 16,
    Exception = 17,
    Throwable = 18,
}

impl TypeId {
    /// 所有类型标签（按序）
    pub const ALL: [TypeId; 19] = [
        TypeId::Bool,
        TypeId::Char,
        TypeId::Short,
        TypeId::Int,
        TypeId::Long,
        TypeId::Float,
        TypeId::Double,
        TypeId::String,
        TypeId::Buffer,
        TypeId::Array,
        TypeId::Map,
        TypeId::Ptr,
        TypeId::Future,
        TypeId::Function,
        TypeId::Null,
        TypeId::Class,
        TypeId::Object,
        TypeId::Exception,
        TypeId::Throwable,
    ];

    /// Scalar tags that round-trip through `String`.
    pub const SCALARS: [TypeId; 7] = [
        TypeId::Bool,
        TypeId::Char,
        TypeId::Short,
        TypeId::Int,
        TypeId::Long,
        TypeId::Float,
        TypeId::Double,
    ];

    pub fn from_u32(id: u32) -> Option<TypeId> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeId::Bool => "Bool",
            TypeId::Char => "Char",
            TypeId::Short => "Short",
            TypeId::Int => "Int",
            TypeId::Long => "Long",
            TypeId::Float => "Float",
            TypeId::Double => "Double",
            TypeId::String => "String",
            TypeId::Buffer => "Buffer",
            TypeId::Array => "Array",
            TypeId::Map => "Map",
            TypeId::Ptr => "Ptr",
            TypeId::Future => "Future",
            TypeId::Function => "Function",
            TypeId::Null => "Null",
            TypeId::Class => "Class",
            TypeId::Object => "Object",
            TypeId::Exception => "Exception",
            TypeId::Throwable => "Throwable",
        }
    }

    pub fn from_name(name: &str) -> Option<TypeId> {
        Self::ALL.iter().copied().find(|id| id.name() == name)
    }

    /// `Bool..=Long`
    pub fn is_integer(self) -> bool {
        self >= TypeId::Bool && self <= TypeId::Long
    }

    /// `Float..=Double`
    pub fn is_decimal(self) -> bool {
        self == TypeId::Float || self == TypeId::Double
    }

    pub fn is_number(self) -> bool {
        self.is_integer() || self.is_decimal()
    }

    /// Tags strictly below `Buffer` (numbers and strings).
    pub fn is_scalar(self) -> bool {
        self < TypeId::Buffer
    }

    pub fn is_container(self) -> bool {
        matches!(self, TypeId::Buffer | TypeId::Array | TypeId::Map)
    }

    pub fn is_callable(self) -> bool {
        matches!(self, TypeId::Function | TypeId::Class | TypeId::Object)
    }

    pub fn is_error(self) -> bool {
        matches!(self, TypeId::Exception | TypeId::Throwable)
    }

    /// 标量的规范字节大小；变长类型返回 `None`
    pub fn canonical_size(self) -> Option<usize> {
        match self {
            TypeId::Bool | TypeId::Char => Some(1),
            TypeId::Short => Some(mem::size_of::<i16>()),
            TypeId::Int => Some(mem::size_of::<i32>()),
            TypeId::Long => Some(mem::size_of::<i64>()),
            TypeId::Float => Some(mem::size_of::<f32>()),
            TypeId::Double => Some(mem::size_of::<f64>()),
            TypeId::Ptr => Some(mem::size_of::<usize>()),
            TypeId::Null => Some(0),
            _ => None,
        }
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//! 通用值容器
//!
//! `Value` is the tagged, atomically reference-counted cell that carries any
//! datum across a language boundary. Cloning a `Value` increments the count,
//! dropping it decrements; the payload (and its finalizer) is released exactly
//! once, when the last handle goes away. Child values of arrays, maps and
//! throwables are released recursively by the same mechanism.

use super::{Class, Exception, Function, Future, Object, TypeId};
use crate::core::error::{ValueError, ValueResult};
use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// 值析构回调，在最后一个引用释放时调用一次
pub type Finalizer = Box<dyn FnOnce(&ValueData) + Send + 'static>;

/// 值的负载
#[derive(Clone)]
pub enum ValueData {
    Bool(bool),
    /// C `char`: signed, one byte. Rendered as a Latin-1 character.
    Char(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Buffer(Vec<u8>),
    Array(Vec<Value>),
    /// Ordered `(key, value)` pairs.
    Map(Vec<(Value, Value)>),
    /// Opaque address; never dereferenced by the core.
    Ptr(usize),
    Future(Arc<Future>),
    Function(Arc<Function>),
    Null,
    Class(Arc<Class>),
    Object(Arc<Object>),
    Exception(Arc<Exception>),
    /// Wraps any value thrown by a backend.
    Throwable(Value),
}

impl ValueData {
    pub fn type_id(&self) -> TypeId {
        match self {
            ValueData::Bool(_) => TypeId::Bool,
            ValueData::Char(_) => TypeId::Char,
            ValueData::Short(_) => TypeId::Short,
            ValueData::Int(_) => TypeId::Int,
            ValueData::Long(_) => TypeId::Long,
            ValueData::Float(_) => TypeId::Float,
            ValueData::Double(_) => TypeId::Double,
            ValueData::String(_) => TypeId::String,
            ValueData::Buffer(_) => TypeId::Buffer,
            ValueData::Array(_) => TypeId::Array,
            ValueData::Map(_) => TypeId::Map,
            ValueData::Ptr(_) => TypeId::Ptr,
            ValueData::Future(_) => TypeId::Future,
            ValueData::Function(_) => TypeId::Function,
            ValueData::Null => TypeId::Null,
            ValueData::Class(_) => TypeId::Class,
            ValueData::Object(_) => TypeId::Object,
            ValueData::Exception(_) => TypeId::Exception,
            ValueData::Throwable(_) => TypeId::Throwable,
        }
    }
}

impl PartialEq for ValueData {
    fn eq(&self, other: &Self) -> bool {
        use ValueData::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (Short(a), Short(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Double(a), Double(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Buffer(a), Buffer(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Ptr(a), Ptr(b)) => a == b,
            (Null, Null) => true,
            (Future(a), Future(b)) => Arc::ptr_eq(a, b),
            (Function(a), Function(b)) => Arc::ptr_eq(a, b),
            (Class(a), Class(b)) => Arc::ptr_eq(a, b),
            (Object(a), Object(b)) => Arc::ptr_eq(a, b),
            (Exception(a), Exception(b)) => a == b,
            (Throwable(a), Throwable(b)) => a == b,
            _ => false,
        }
    }
}

struct ValueCell {
    data: RwLock<ValueData>,
    finalizer: Mutex<Option<Finalizer>>,
}

impl Drop for ValueCell {
    fn drop(&mut self) {
        let finalizer = self
            .finalizer
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(finalizer) = finalizer {
            let data = self.data.get_mut().unwrap_or_else(|e| e.into_inner());
            finalizer(data);
        }
    }
}

/// 引用计数的通用值
#[derive(Clone)]
pub struct Value {
    cell: Arc<ValueCell>,
}

macro_rules! scalar_accessors {
    ($($variant:ident: $ty:ty => $getter:ident, $setter:ident;)*) => {
        impl Value {
            $(
                #[doc = concat!("Reads the payload as `", stringify!($ty), "`; fails unless the tag is `", stringify!($variant), "`.")]
                pub fn $getter(&self) -> ValueResult<$ty> {
                    match &*self.data() {
                        ValueData::$variant(v) => Ok(*v),
                        other => Err(ValueError::TypeMismatch {
                            expected: TypeId::$variant,
                            found: other.type_id(),
                        }),
                    }
                }

                #[doc = concat!("Overwrites the `", stringify!($variant), "` payload in place.")]
                pub fn $setter(&self, value: $ty) -> ValueResult<()> {
                    match &mut *self.data_mut() {
                        ValueData::$variant(slot) => {
                            *slot = value;
                            Ok(())
                        }
                        other => Err(ValueError::TypeMismatch {
                            expected: TypeId::$variant,
                            found: other.type_id(),
                        }),
                    }
                }
            )*
        }
    };
}

scalar_accessors! {
    Bool: bool => to_bool, set_bool;
    Char: i8 => to_char, set_char;
    Short: i16 => to_short, set_short;
    Int: i32 => to_int, set_int;
    Long: i64 => to_long, set_long;
    Float: f32 => to_float, set_float;
    Double: f64 => to_double, set_double;
    Ptr: usize => to_ptr, set_ptr;
}

macro_rules! handle_accessors {
    ($($variant:ident: $ty:ty => $getter:ident;)*) => {
        impl Value {
            $(
                pub fn $getter(&self) -> ValueResult<$ty> {
                    match &*self.data() {
                        ValueData::$variant(v) => Ok(v.clone()),
                        other => Err(ValueError::TypeMismatch {
                            expected: TypeId::$variant,
                            found: other.type_id(),
                        }),
                    }
                }
            )*
        }
    };
}

handle_accessors! {
    String: String => to_string;
    Buffer: Vec<u8> => to_buffer;
    Array: Vec<Value> => to_array;
    Map: Vec<(Value, Value)> => to_map;
    Future: Arc<Future> => to_future;
    Function: Arc<Function> => to_function;
    Class: Arc<Class> => to_class;
    Object: Arc<Object> => to_object;
    Exception: Arc<Exception> => to_exception;
    Throwable: Value => to_throwable;
}

impl Value {
    /// 创建值，引用计数从1开始
    pub fn new(data: ValueData) -> Self {
        Self {
            cell: Arc::new(ValueCell {
                data: RwLock::new(data),
                finalizer: Mutex::new(None),
            }),
        }
    }

    /// 从原始字节创建值
    ///
    /// Scalars are decoded from native-endian bytes of exactly their canonical
    /// size. Strings must be UTF-8; one trailing NUL is tolerated. Composite
    /// and callable tags cannot be built from bytes.
    pub fn create(id: TypeId, bytes: &[u8]) -> ValueResult<Self> {
        let data = match id {
            TypeId::Bool => ValueData::Bool(fixed::<1>(id, bytes)?[0] != 0),
            TypeId::Char => ValueData::Char(i8::from_ne_bytes(fixed(id, bytes)?)),
            TypeId::Short => ValueData::Short(i16::from_ne_bytes(fixed(id, bytes)?)),
            TypeId::Int => ValueData::Int(i32::from_ne_bytes(fixed(id, bytes)?)),
            TypeId::Long => ValueData::Long(i64::from_ne_bytes(fixed(id, bytes)?)),
            TypeId::Float => ValueData::Float(f32::from_ne_bytes(fixed(id, bytes)?)),
            TypeId::Double => ValueData::Double(f64::from_ne_bytes(fixed(id, bytes)?)),
            TypeId::Ptr => ValueData::Ptr(usize::from_ne_bytes(fixed(id, bytes)?)),
            TypeId::Null => {
                fixed::<0>(id, bytes)?;
                ValueData::Null
            }
            TypeId::String => {
                let trimmed = bytes.strip_suffix(&[0]).unwrap_or(bytes);
                let text = std::str::from_utf8(trimmed)
                    .map_err(|e| ValueError::InvalidUtf8(e.to_string()))?;
                ValueData::String(text.to_string())
            }
            TypeId::Buffer => ValueData::Buffer(bytes.to_vec()),
            other => return Err(ValueError::NotRawConstructible(other)),
        };
        Ok(Self::new(data))
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ValueData::Bool(value))
    }

    pub fn char(value: i8) -> Self {
        Self::new(ValueData::Char(value))
    }

    pub fn short(value: i16) -> Self {
        Self::new(ValueData::Short(value))
    }

    pub fn int(value: i32) -> Self {
        Self::new(ValueData::Int(value))
    }

    pub fn long(value: i64) -> Self {
        Self::new(ValueData::Long(value))
    }

    pub fn float(value: f32) -> Self {
        Self::new(ValueData::Float(value))
    }

    pub fn double(value: f64) -> Self {
        Self::new(ValueData::Double(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueData::String(value.into()))
    }

    pub fn buffer(value: impl Into<Vec<u8>>) -> Self {
        Self::new(ValueData::Buffer(value.into()))
    }

    pub fn array(values: Vec<Value>) -> Self {
        Self::new(ValueData::Array(values))
    }

    pub fn map(pairs: Vec<(Value, Value)>) -> Self {
        Self::new(ValueData::Map(pairs))
    }

    pub fn ptr(address: usize) -> Self {
        Self::new(ValueData::Ptr(address))
    }

    pub fn future(future: Arc<Future>) -> Self {
        Self::new(ValueData::Future(future))
    }

    pub fn function(function: Arc<Function>) -> Self {
        Self::new(ValueData::Function(function))
    }

    pub fn null() -> Self {
        Self::new(ValueData::Null)
    }

    pub fn class(class: Arc<Class>) -> Self {
        Self::new(ValueData::Class(class))
    }

    pub fn object(object: Arc<Object>) -> Self {
        Self::new(ValueData::Object(object))
    }

    pub fn exception(exception: Exception) -> Self {
        Self::new(ValueData::Exception(Arc::new(exception)))
    }

    pub fn throwable(inner: Value) -> Self {
        Self::new(ValueData::Throwable(inner))
    }

    pub fn type_id(&self) -> TypeId {
        self.data().type_id()
    }

    /// 当前引用计数
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.cell)
    }

    /// Two handles to the same cell.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    pub fn is_null(&self) -> bool {
        matches!(&*self.data(), ValueData::Null)
    }

    /// `Exception` or `Throwable`.
    pub fn is_exception(&self) -> bool {
        self.type_id().is_error()
    }

    /// 读取负载（持有期间阻止写入）
    pub fn data(&self) -> RwLockReadGuard<'_, ValueData> {
        self.cell.data.read().unwrap_or_else(|e| e.into_inner())
    }

    /// 可变负载视图，仅在持有引用期间有效
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, ValueData> {
        self.cell.data.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Payload size in bytes. Scalars report their canonical size; strings
    /// and buffers their byte length; arrays and maps the size of their
    /// element handles; callables the size of one handle.
    pub fn size(&self) -> usize {
        match &*self.data() {
            ValueData::String(s) => s.len(),
            ValueData::Buffer(b) => b.len(),
            ValueData::Array(items) => items.len() * mem::size_of::<Value>(),
            ValueData::Map(pairs) => pairs.len() * 2 * mem::size_of::<Value>(),
            other => other
                .type_id()
                .canonical_size()
                .unwrap_or(mem::size_of::<usize>()),
        }
    }

    /// Element count for containers and strings.
    pub fn count(&self) -> Option<usize> {
        match &*self.data() {
            ValueData::String(s) => Some(s.chars().count()),
            ValueData::Buffer(b) => Some(b.len()),
            ValueData::Array(items) => Some(items.len()),
            ValueData::Map(pairs) => Some(pairs.len()),
            _ => None,
        }
    }

    /// 原始字节（标量为本机字节序）
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        let bytes = match &*self.data() {
            ValueData::Bool(v) => vec![u8::from(*v)],
            ValueData::Char(v) => v.to_ne_bytes().to_vec(),
            ValueData::Short(v) => v.to_ne_bytes().to_vec(),
            ValueData::Int(v) => v.to_ne_bytes().to_vec(),
            ValueData::Long(v) => v.to_ne_bytes().to_vec(),
            ValueData::Float(v) => v.to_ne_bytes().to_vec(),
            ValueData::Double(v) => v.to_ne_bytes().to_vec(),
            ValueData::Ptr(v) => v.to_ne_bytes().to_vec(),
            ValueData::String(s) => s.as_bytes().to_vec(),
            ValueData::Buffer(b) => b.clone(),
            ValueData::Null => Vec::new(),
            _ => return None,
        };
        Some(bytes)
    }

    /// Overwrites a string payload in place, keeping at most the current
    /// byte length (cut back to a character boundary).
    pub fn set_string(&self, value: &str) -> ValueResult<()> {
        match &mut *self.data_mut() {
            ValueData::String(slot) => {
                let mut end = value.len().min(slot.len());
                while !value.is_char_boundary(end) {
                    end -= 1;
                }
                *slot = value[..end].to_string();
                Ok(())
            }
            other => Err(ValueError::TypeMismatch {
                expected: TypeId::String,
                found: other.type_id(),
            }),
        }
    }

    /// Overwrites the leading bytes of a buffer payload in place; returns
    /// how many bytes were written.
    pub fn set_buffer(&self, value: &[u8]) -> ValueResult<usize> {
        match &mut *self.data_mut() {
            ValueData::Buffer(slot) => {
                let written = value.len().min(slot.len());
                slot[..written].copy_from_slice(&value[..written]);
                Ok(written)
            }
            other => Err(ValueError::TypeMismatch {
                expected: TypeId::Buffer,
                found: other.type_id(),
            }),
        }
    }

    /// 深拷贝
    ///
    /// Arrays, maps and throwables are copied element by element into fresh
    /// cells. Callables and futures are shared. The finalizer is not copied.
    pub fn copy(&self) -> Value {
        let data = match &*self.data() {
            ValueData::Array(items) => ValueData::Array(items.iter().map(Value::copy).collect()),
            ValueData::Map(pairs) => ValueData::Map(
                pairs
                    .iter()
                    .map(|(key, value)| (key.copy(), value.copy()))
                    .collect(),
            ),
            ValueData::Throwable(inner) => ValueData::Throwable(inner.copy()),
            other => other.clone(),
        };
        Value::new(data)
    }

    /// 设置析构回调（替换已有回调）
    pub fn set_finalizer<F>(&self, finalizer: F)
    where
        F: FnOnce(&ValueData) + Send + 'static,
    {
        *self.cell.finalizer.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(finalizer));
    }

    /// Detaches the finalizer, e.g. to move it onto another value.
    pub fn take_finalizer(&self) -> Option<Finalizer> {
        self.cell
            .finalizer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    pub fn has_finalizer(&self) -> bool {
        self.cell
            .finalizer
            .lock()
            .map(|f| f.is_some())
            .unwrap_or(false)
    }

    /// Looks up a map entry whose key stringifies to `key`.
    pub fn map_get(&self, key: &str) -> Option<Value> {
        match &*self.data() {
            ValueData::Map(pairs) => pairs
                .iter()
                .find(|(k, _)| k.stringify() == key)
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }
}

fn fixed<const N: usize>(id: TypeId, bytes: &[u8]) -> ValueResult<[u8; N]> {
    <[u8; N]>::try_from(bytes).map_err(|_| ValueError::InvalidSize {
        id,
        expected: N,
        got: bytes.len(),
    })
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        *self.data() == *other.data()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Value")
            .field(&self.type_id())
            .field(&self.stringify())
            .finish()
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::bool(value)
    }
}

impl From<i16> for Value {
    fn from(value: i16) -> Self {
        Value::short(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::long(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::float(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::string(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::array(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_scalar_accessors() {
        let v = Value::int(56464);
        assert_eq!(v.type_id(), TypeId::Int);
        assert_eq!(v.to_int(), Ok(56464));
        assert_eq!(
            v.to_long(),
            Err(ValueError::TypeMismatch {
                expected: TypeId::Long,
                found: TypeId::Int
            })
        );

        v.set_int(7).unwrap();
        assert_eq!(v.to_int(), Ok(7));
        assert!(v.set_double(1.0).is_err());
    }

    #[test]
    fn test_create_from_bytes() {
        let v = Value::create(TypeId::Long, &90000i64.to_ne_bytes()).unwrap();
        assert_eq!(v.to_long(), Ok(90000));

        let v = Value::create(TypeId::String, b"Hello World\0").unwrap();
        assert_eq!(v.to_string().unwrap(), "Hello World");
        assert_eq!(v.size(), 11);

        assert_eq!(
            Value::create(TypeId::Int, &[1, 2]).err(),
            Some(ValueError::InvalidSize {
                id: TypeId::Int,
                expected: 4,
                got: 2
            })
        );
        assert!(matches!(
            Value::create(TypeId::Array, &[]),
            Err(ValueError::NotRawConstructible(TypeId::Array))
        ));
        assert!(Value::create(TypeId::String, &[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_bytes_round_trip() {
        for v in [
            Value::bool(true),
            Value::char(-3),
            Value::short(-124),
            Value::int(1234),
            Value::long(-90000),
            Value::float(0.2),
            Value::double(3.1416),
            Value::ptr(0xdead_beef),
            Value::null(),
        ] {
            let bytes = v.to_bytes().unwrap();
            assert_eq!(bytes.len(), v.size());
            let back = Value::create(v.type_id(), &bytes).unwrap();
            assert_eq!(back, v);
        }
    }

    #[test]
    fn test_set_string_truncates_to_allocation() {
        let v = Value::string("abc");
        v.set_string("wxyz").unwrap();
        assert_eq!(v.to_string().unwrap(), "wxy");

        v.set_string("q").unwrap();
        assert_eq!(v.to_string().unwrap(), "q");

        let v = Value::string("ab");
        v.set_string("é!").unwrap();
        assert_eq!(v.to_string().unwrap(), "é");
    }

    #[test]
    fn test_set_buffer_in_place() {
        let v = Value::buffer(vec![0u8; 3]);
        assert_eq!(v.set_buffer(&[1, 2, 3, 4]).unwrap(), 3);
        assert_eq!(v.to_buffer().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_finalizer_runs_once_at_last_release() {
        let calls = Arc::new(AtomicUsize::new(0));
        let v = Value::int(5);
        let counter = Arc::clone(&calls);
        v.set_finalizer(move |data| {
            assert_eq!(data.type_id(), TypeId::Int);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let a = v.clone();
        let b = a.clone();
        assert_eq!(v.ref_count(), 3);
        drop(a);
        drop(v);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        drop(b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_take_finalizer_moves_ownership() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = Value::string("payload");
        let counter = Arc::clone(&calls);
        source.set_finalizer(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let target = source.copy();
        assert!(!target.has_finalizer());
        if let Some(finalizer) = source.take_finalizer() {
            target.set_finalizer(finalizer);
        }
        drop(source);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        drop(target);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_children_released_recursively() {
        let calls = Arc::new(AtomicUsize::new(0));
        let child = Value::int(1);
        let counter = Arc::clone(&calls);
        child.set_finalizer(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let array = Value::array(vec![child]);
        let map = Value::map(vec![(Value::string("k"), array.clone())]);
        drop(array);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        drop(map);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deep_copy() {
        let inner = Value::int(1);
        let array = Value::array(vec![inner.clone()]);
        let copy = array.copy();
        assert_eq!(copy, array);
        assert!(!copy.ptr_eq(&array));

        inner.set_int(2).unwrap();
        assert_eq!(array.to_array().unwrap()[0].to_int(), Ok(2));
        assert_eq!(copy.to_array().unwrap()[0].to_int(), Ok(1));
    }

    #[test]
    fn test_map_get() {
        let map = Value::map(vec![
            (Value::string("a"), Value::int(1)),
            (Value::int(2), Value::string("two")),
        ]);
        assert_eq!(map.map_get("a"), Some(Value::int(1)));
        assert_eq!(map.map_get("2"), Some(Value::string("two")));
        assert_eq!(map.map_get("missing"), None);
        assert_eq!(map.count(), Some(2));
    }

    #[test]
    fn test_values_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Value>();
    }
}

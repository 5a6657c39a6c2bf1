//! 二进制序列化（bincode）
//!
//! Lossless for every data tag. Callables, futures, classes and objects
//! cannot cross a byte boundary and are rejected.

use super::Serial;
use crate::core::error::{SerialError, SerialResult};
use crate::reflect::{Exception, Value, ValueData};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
enum Wire {
    Bool(bool),
    Char(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Buffer(Vec<u8>),
    Array(Vec<Wire>),
    Map(Vec<(Wire, Wire)>),
    Ptr(u64),
    Null,
    Exception(Exception),
    Throwable(Box<Wire>),
}

impl Wire {
    fn from_value(value: &Value) -> SerialResult<Wire> {
        let wire = match &*value.data() {
            ValueData::Bool(v) => Wire::Bool(*v),
            ValueData::Char(v) => Wire::Char(*v),
            ValueData::Short(v) => Wire::Short(*v),
            ValueData::Int(v) => Wire::Int(*v),
            ValueData::Long(v) => Wire::Long(*v),
            ValueData::Float(v) => Wire::Float(*v),
            ValueData::Double(v) => Wire::Double(*v),
            ValueData::String(v) => Wire::String(v.clone()),
            ValueData::Buffer(v) => Wire::Buffer(v.clone()),
            ValueData::Array(items) => {
                Wire::Array(items.iter().map(Wire::from_value).collect::<SerialResult<_>>()?)
            }
            ValueData::Map(pairs) => Wire::Map(
                pairs
                    .iter()
                    .map(|(k, v)| Ok((Wire::from_value(k)?, Wire::from_value(v)?)))
                    .collect::<SerialResult<_>>()?,
            ),
            ValueData::Ptr(v) => Wire::Ptr(*v as u64),
            ValueData::Null => Wire::Null,
            ValueData::Exception(e) => Wire::Exception((**e).clone()),
            ValueData::Throwable(inner) => Wire::Throwable(Box::new(Wire::from_value(inner)?)),
            other => return Err(SerialError::Unsupported(other.type_id())),
        };
        Ok(wire)
    }

    fn into_value(self) -> Value {
        match self {
            Wire::Bool(v) => Value::bool(v),
            Wire::Char(v) => Value::char(v),
            Wire::Short(v) => Value::short(v),
            Wire::Int(v) => Value::int(v),
            Wire::Long(v) => Value::long(v),
            Wire::Float(v) => Value::float(v),
            Wire::Double(v) => Value::double(v),
            Wire::String(v) => Value::string(v),
            Wire::Buffer(v) => Value::buffer(v),
            Wire::Array(items) => Value::array(items.into_iter().map(Wire::into_value).collect()),
            Wire::Map(pairs) => Value::map(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.into_value(), v.into_value()))
                    .collect(),
            ),
            Wire::Ptr(v) => Value::ptr(v as usize),
            Wire::Null => Value::null(),
            Wire::Exception(e) => Value::exception(e),
            Wire::Throwable(inner) => Value::throwable(inner.into_value()),
        }
    }
}

pub struct BinarySerial;

impl Serial for BinarySerial {
    fn name(&self) -> &str {
        "bin"
    }

    fn serialize(&self, value: &Value) -> SerialResult<Vec<u8>> {
        let wire = Wire::from_value(value)?;
        bincode::serialize(&wire).map_err(|e| SerialError::Serialize(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> SerialResult<Value> {
        let wire: Wire =
            bincode::deserialize(bytes).map_err(|e| SerialError::Deserialize(e.to_string()))?;
        Ok(wire.into_value())
    }
}

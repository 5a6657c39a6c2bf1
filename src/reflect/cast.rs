//! 类型转换
//!
//! Rules, checked in order:
//!
//! 1. equal tags: identity (the same cell is returned)
//! 2. any tag -> `String`: stringify
//! 3. `String` -> `Buffer` (UTF-8 bytes) / `Array` (one element) / anything else (parse)
//! 4. number -> `Buffer` (native-endian payload) / `Array` (one element)
//! 5. `Array` of one element -> number: unwrap, casting the element recursively
//! 6. anything involving `Map`: not implemented
//! 7. number -> number: promotion / demotion
//!
//! Demotion semantics:
//! - to `Bool`: non-zero is `true` (for decimals, `x != 0.0`; NaN is `true`)
//! - integer narrowing keeps the low-order bytes (two's complement wrap)
//! - `Double -> Float` rounds to nearest
//! - decimal -> integer goes through `i64` with Rust `as` semantics
//!   (truncation toward zero, saturation at the `i64` bounds, NaN -> 0),
//!   then narrows like an integer.

use super::parse::parse_as;
use super::{TypeId, Value, ValueData};
use crate::core::error::{CastError, CastResult};

#[derive(Debug, Clone, Copy)]
enum Number {
    Integer(i64),
    Decimal(f64),
}

impl Value {
    /// 转换为目标类型（消耗原值）
    pub fn cast(self, target: TypeId) -> CastResult<Value> {
        cast(self, target)
    }
}

/// 将值转换为目标类型
pub fn cast(value: Value, target: TypeId) -> CastResult<Value> {
    let source = value.type_id();

    if source == target {
        return Ok(value);
    }

    let result = cast_different(&value, source, target);
    if let Err(e) = &result {
        tracing::debug!(target: "reflect", "Cast {} -> {} failed: {}", source, target, e);
    }
    result
}

fn cast_different(value: &Value, source: TypeId, target: TypeId) -> CastResult<Value> {
    if target == TypeId::String {
        return Ok(Value::string(value.stringify()));
    }

    if source == TypeId::String {
        let text = value.to_string().map_err(|_| unsupported(source, target))?;
        return match target {
            TypeId::Buffer => Ok(Value::buffer(text.into_bytes())),
            TypeId::Array => Ok(Value::array(vec![value.clone()])),
            _ => parse_as(&text, target),
        };
    }

    if source.is_number() {
        match target {
            TypeId::Buffer => {
                let bytes = value.to_bytes().ok_or_else(|| unsupported(source, target))?;
                return Ok(Value::buffer(bytes));
            }
            TypeId::Array => return Ok(Value::array(vec![value.clone()])),
            _ => {}
        }
    }

    if source == TypeId::Array && target.is_number() {
        let items = value.to_array().map_err(|_| unsupported(source, target))?;
        return match items.as_slice() {
            [single] => cast(single.clone(), target),
            _ => Err(unsupported(source, target)),
        };
    }

    if source == TypeId::Map || target == TypeId::Map {
        return Err(CastError::NotImplemented {
            from: source,
            to: target,
        });
    }

    if source.is_number() && target.is_number() {
        let number = read_number(value).ok_or_else(|| unsupported(source, target))?;
        return Ok(convert_number(number, target));
    }

    Err(unsupported(source, target))
}

fn read_number(value: &Value) -> Option<Number> {
    let number = match &*value.data() {
        ValueData::Bool(v) => Number::Integer(i64::from(*v)),
        ValueData::Char(v) => Number::Integer(i64::from(*v)),
        ValueData::Short(v) => Number::Integer(i64::from(*v)),
        ValueData::Int(v) => Number::Integer(i64::from(*v)),
        ValueData::Long(v) => Number::Integer(*v),
        ValueData::Float(v) => Number::Decimal(f64::from(*v)),
        ValueData::Double(v) => Number::Decimal(*v),
        _ => return None,
    };
    Some(number)
}

fn convert_number(number: Number, target: TypeId) -> Value {
    let integer = match number {
        Number::Integer(n) => n,
        Number::Decimal(x) => x as i64,
    };

    match target {
        TypeId::Bool => Value::bool(match number {
            Number::Integer(n) => n != 0,
            Number::Decimal(x) => x != 0.0,
        }),
        TypeId::Char => Value::char(integer as i8),
        TypeId::Short => Value::short(integer as i16),
        TypeId::Int => Value::int(integer as i32),
        TypeId::Long => Value::long(integer),
        TypeId::Float => Value::float(match number {
            Number::Integer(n) => n as f32,
            Number::Decimal(x) => x as f32,
        }),
        _ => Value::double(match number {
            Number::Integer(n) => n as f64,
            Number::Decimal(x) => x,
        }),
    }
}

fn unsupported(from: TypeId, to: TypeId) -> CastError {
    CastError::Unsupported { from, to }
}

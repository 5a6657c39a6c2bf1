//! 字符串解析（`String -> T` 转换路径）
//!
//! Accepts exactly the literals produced by `stringify` for each tag.

use super::{TypeId, Value};
use crate::core::error::{CastError, CastResult};
use std::str::FromStr;

/// 将字符串解析为目标类型的值
pub fn parse_as(text: &str, target: TypeId) -> CastResult<Value> {
    let value = match target {
        TypeId::Bool => match text {
            "true" => Value::bool(true),
            "false" => Value::bool(false),
            _ => return Err(parse_error(text, target)),
        },
        TypeId::Char => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if (c as u32) <= 0xff => Value::char(c as u32 as u8 as i8),
                _ => return Err(parse_error(text, target)),
            }
        }
        TypeId::Short => Value::short(number(text, target)?),
        TypeId::Int => Value::int(number(text, target)?),
        TypeId::Long => Value::long(number(text, target)?),
        TypeId::Float => Value::float(number(text, target)?),
        TypeId::Double => Value::double(number(text, target)?),
        TypeId::String => Value::string(text),
        TypeId::Ptr => {
            let digits = text
                .strip_prefix("0x")
                .or_else(|| text.strip_prefix("0X"))
                .ok_or_else(|| parse_error(text, target))?;
            let address =
                usize::from_str_radix(digits, 16).map_err(|_| parse_error(text, target))?;
            Value::ptr(address)
        }
        TypeId::Null => match text {
            "(null)" | "null" => Value::null(),
            _ => return Err(parse_error(text, target)),
        },
        other => {
            return Err(CastError::Unsupported {
                from: TypeId::String,
                to: other,
            })
        }
    };
    Ok(value)
}

fn number<T: FromStr>(text: &str, target: TypeId) -> CastResult<T> {
    text.trim().parse().map_err(|_| parse_error(text, target))
}

fn parse_error(text: &str, target: TypeId) -> CastError {
    CastError::Parse {
        input: text.to_string(),
        to: target,
    }
}

//! JSON 序列化
//!
//! Callables, futures, classes and objects have no JSON form; they are
//! rendered with their descriptive string (`"[Function sum]"`) so that
//! inspection output stays readable. Deserializing never produces them.

use super::Serial;
use crate::core::error::{SerialError, SerialResult};
use crate::reflect::stringify::stringify_data;
use crate::reflect::{Value, ValueData};
use serde_json::{json, Map, Number};

pub struct JsonSerial;

impl Serial for JsonSerial {
    fn name(&self) -> &str {
        "json"
    }

    fn serialize(&self, value: &Value) -> SerialResult<Vec<u8>> {
        serde_json::to_vec(&value_to_json(value)).map_err(|e| SerialError::Serialize(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> SerialResult<Value> {
        let json: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| SerialError::Deserialize(e.to_string()))?;
        Ok(json_to_value(&json))
    }
}

fn number(x: f64) -> serde_json::Value {
    Number::from_f64(x)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// 值转换为 JSON
pub fn value_to_json(value: &Value) -> serde_json::Value {
    let data = value.data();
    match &*data {
        ValueData::Bool(v) => json!(v),
        ValueData::Char(v) => json!(char::from(*v as u8).to_string()),
        ValueData::Short(v) => json!(v),
        ValueData::Int(v) => json!(v),
        ValueData::Long(v) => json!(v),
        ValueData::Float(v) => number(f64::from(*v)),
        ValueData::Double(v) => number(*v),
        ValueData::String(v) => json!(v),
        ValueData::Buffer(bytes) => json!(bytes),
        ValueData::Array(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        ValueData::Map(pairs) => {
            let mut object = Map::new();
            for (k, v) in pairs {
                let key = match &*k.data() {
                    ValueData::String(s) => s.clone(),
                    _ => k.stringify(),
                };
                object.insert(key, value_to_json(v));
            }
            serde_json::Value::Object(object)
        }
        ValueData::Ptr(v) => json!(format!("{:#x}", v)),
        ValueData::Null => serde_json::Value::Null,
        ValueData::Exception(e) => e.metadata(),
        ValueData::Throwable(inner) => json!({ "throwable": value_to_json(inner) }),
        ValueData::Future(_) | ValueData::Function(_) | ValueData::Class(_) | ValueData::Object(_) => {
            json!(stringify_data(&data))
        }
    }
}

/// JSON 转换为值
///
/// Integers that fit in 32 bits become `Int`, larger ones `Long`; other
/// numbers become `Double`. Objects become maps with string keys.
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::null(),
        serde_json::Value::Bool(b) => Value::bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                match i32::try_from(i) {
                    Ok(small) => Value::int(small),
                    Err(_) => Value::long(i),
                }
            } else {
                Value::double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::string(s.clone()),
        serde_json::Value::Array(items) => Value::array(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(object) => Value::map(
            object
                .iter()
                .map(|(k, v)| (Value::string(k.clone()), json_to_value(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{Exception, Function, Signature};

    #[test]
    fn test_serialize_composites() {
        let value = Value::map(vec![
            (Value::string("n"), Value::int(3)),
            (Value::string("list"), Value::array(vec![Value::bool(true), Value::null()])),
            (Value::string("c"), Value::char(b'A' as i8)),
        ]);
        let bytes = JsonSerial.serialize(&value).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, json!({"n": 3, "list": [true, null], "c": "A"}));
    }

    #[test]
    fn test_deserialize_numbers() {
        let value = JsonSerial.deserialize(br#"[1, 5000000000, 2.5, "x"]"#).unwrap();
        assert_eq!(
            value.to_array().unwrap(),
            vec![
                Value::int(1),
                Value::long(5_000_000_000),
                Value::double(2.5),
                Value::string("x")
            ]
        );
        assert!(JsonSerial.deserialize(b"{").is_err());
    }

    #[test]
    fn test_callables_render_as_strings() {
        let f = Function::from_closure("sum", Signature::new(2), |_| None).unwrap();
        assert_eq!(value_to_json(&Value::function(f)), json!("[Function sum]"));
        assert_eq!(value_to_json(&Value::double(f64::NAN)), serde_json::Value::Null);
    }

    #[test]
    fn test_exception_shape() {
        let e = Value::exception(Exception::new("boom", "Error", 2, "at main"));
        let json = value_to_json(&e);
        assert_eq!(json["label"], "Error");
        assert_eq!(json["code"], 2);
    }
}

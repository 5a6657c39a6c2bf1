//! 序列化层
//!
//! Formats are selected by name: `"json"` or `"bin"`.

pub mod binary;
pub mod json;

pub use binary::BinarySerial;
pub use json::{json_to_value, value_to_json, JsonSerial};

use crate::core::error::{SerialError, SerialResult};
use crate::reflect::Value;

/// 序列化格式
pub trait Serial: Send + Sync {
    fn name(&self) -> &str;

    fn serialize(&self, value: &Value) -> SerialResult<Vec<u8>>;

    fn deserialize(&self, bytes: &[u8]) -> SerialResult<Value>;
}

/// 按名称选择格式
pub fn serial_for(format: &str) -> SerialResult<Box<dyn Serial>> {
    match format {
        "json" => Ok(Box::new(JsonSerial)),
        "bin" => Ok(Box::new(BinarySerial)),
        other => Err(SerialError::UnknownFormat(other.to_string())),
    }
}

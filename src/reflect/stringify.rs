//! 值的文本表示
//!
//! Used for diagnostics and as the `* -> String` cast path. Numbers use the
//! shortest representation that parses back to the same bits, so
//! `parse(stringify(x)) == x` holds for every scalar.

use super::future::FutureState;
use super::value::{Value, ValueData};

impl Value {
    /// 按类型格式化为字符串
    pub fn stringify(&self) -> String {
        stringify_data(&self.data())
    }
}

pub(crate) fn stringify_data(data: &ValueData) -> String {
    match data {
        ValueData::Bool(v) => if *v { "true" } else { "false" }.to_string(),
        ValueData::Char(v) => char::from(*v as u8).to_string(),
        ValueData::Short(v) => v.to_string(),
        ValueData::Int(v) => v.to_string(),
        ValueData::Long(v) => v.to_string(),
        ValueData::Float(v) => v.to_string(),
        ValueData::Double(v) => v.to_string(),
        ValueData::String(v) => v.clone(),
        ValueData::Buffer(v) => hex::encode(v),
        ValueData::Array(items) => {
            let parts: Vec<String> = items.iter().map(Value::stringify).collect();
            format!("[{}]", parts.join(","))
        }
        ValueData::Map(pairs) => {
            let parts: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("{}:{}", k.stringify(), v.stringify()))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        ValueData::Ptr(v) => format!("{:#x}", v),
        ValueData::Future(f) => match f.state() {
            FutureState::Pending => "[Future pending]".to_string(),
            FutureState::Resolved => "[Future resolved]".to_string(),
            FutureState::Rejected => "[Future rejected]".to_string(),
        },
        ValueData::Function(f) => format!("[Function {}]", f.name()),
        ValueData::Null => "(null)".to_string(),
        ValueData::Class(c) => format!("[Class {}]", c.name()),
        ValueData::Object(o) => format!("[Object {}]", o.name()),
        ValueData::Exception(e) => format!("[Exception {}]", e),
        ValueData::Throwable(inner) => format!("[Throwable {}]", inner.stringify()),
    }
}

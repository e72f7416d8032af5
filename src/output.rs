//! Render the value tree to JSON or YAML
//!
//! Big integers (the u8/s8 products) render as decimal string literals:
//! JSON has no arbitrary-precision integer type. Byte sequences render as
//! arrays of small integers. Lazy instances are realized in declaration
//! order when an object is serialized.

use format_lang::{Error, Value};
use serde_json::{Map, Number, Value as JsonValue};

pub fn to_json(value: &Value) -> Result<JsonValue, Error> {
    match value {
        Value::Null => Ok(JsonValue::Null),
        Value::Int(v) => Ok(JsonValue::from(*v)),
        Value::BigInt(v) => Ok(JsonValue::String(v.to_string())),
        Value::Float(v) => Ok(Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)),
        Value::Bool(b) => Ok(JsonValue::Bool(*b)),
        Value::Str(s) => Ok(JsonValue::String(s.clone())),
        Value::Bytes(bytes) => Ok(JsonValue::Array(
            bytes.iter().map(|&b| JsonValue::from(b)).collect(),
        )),
        Value::List(items) => Ok(JsonValue::Array(
            items.iter().map(to_json).collect::<Result<Vec<_>, _>>()?,
        )),
        Value::Obj(_) => {
            let mut map = Map::new();
            for (name, field) in value.entries()? {
                map.insert(name, to_json(&field)?);
            }
            Ok(JsonValue::Object(map))
        }
        Value::Stream(_) => Err(Error::Base("cannot serialize a stream".into())),
    }
}

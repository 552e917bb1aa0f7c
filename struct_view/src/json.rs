/* JSON conversion for record values
 *
 * Records map to objects in declaration order, arrays to arrays and char
 * arrays to strings, fixed ones without their trailing NUL padding. 128-bit
 * integers that do not fit in 64 bits are written as decimal strings;
 * strings are accepted for any numeric member.
 */

use crate::value::{RecordValue, Value};
use serde_json::{Map, Number, Value as JsonValue};
use std::sync::Arc;
use struct_layout::{
    LayoutError, LayoutResult, MemberType, PrimitiveType, RecordMetadata, Scalar,
};

pub fn to_json(value: &RecordValue) -> JsonValue {
    let mut object = Map::new();
    for desc in value.metadata().members() {
        let json = match value.get(&desc.name) {
            Some(Value::Text(text)) if desc.fixed_length().is_some() => {
                JsonValue::String(text.trim_end_matches('\0').to_string())
            }
            Some(field) => value_to_json(field),
            None => continue,
        };
        object.insert(desc.name.clone(), json);
    }
    JsonValue::Object(object)
}

fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Scalar(scalar) => scalar_to_json(*scalar),
        Value::Text(text) => JsonValue::String(text.clone()),
        Value::Array(items) => JsonValue::Array(items.iter().map(value_to_json).collect()),
        Value::Record(record) => to_json(record),
    }
}

fn scalar_to_json(scalar: Scalar) -> JsonValue {
    match scalar {
        Scalar::Unsigned(v) => match u64::try_from(v) {
            Ok(small) => JsonValue::from(small),
            Err(_) => JsonValue::String(v.to_string()),
        },
        Scalar::Signed(v) => match i64::try_from(v) {
            Ok(small) => JsonValue::from(small),
            Err(_) => JsonValue::String(v.to_string()),
        },
        Scalar::Float(v) => Number::from_f64(v).map_or(JsonValue::Null, JsonValue::Number),
    }
}

/* Builds a record value of type `meta` from a JSON object */
pub fn from_json(meta: &Arc<RecordMetadata>, json: &JsonValue) -> LayoutResult<RecordValue> {
    let object = json
        .as_object()
        .ok_or_else(|| LayoutError::invalid_value(meta.name(), "expected a JSON object"))?;

    let mut record = RecordValue::new(Arc::clone(meta));
    for (name, field) in object {
        let desc = meta.member(name)?;
        let value = match (&desc.ty, desc.is_array()) {
            (MemberType::Primitive(prim), false) => {
                Value::Scalar(scalar_from_json(*prim, field, name)?)
            }
            (MemberType::Primitive(prim), true) => match field {
                JsonValue::String(text) if prim.byte_width() == 1 => Value::Text(text.clone()),
                JsonValue::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|item| scalar_from_json(*prim, item, name).map(Value::Scalar))
                        .collect::<LayoutResult<Vec<_>>>()?,
                ),
                _ => return Err(LayoutError::invalid_value(name, "expected a JSON array")),
            },
            (MemberType::Record(nested), false) => Value::Record(from_json(nested, field)?),
            (MemberType::Record(nested), true) => match field {
                JsonValue::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|item| from_json(nested, item).map(Value::Record))
                        .collect::<LayoutResult<Vec<_>>>()?,
                ),
                _ => return Err(LayoutError::invalid_value(name, "expected a JSON array")),
            },
        };
        record.set(name, value)?;
    }
    Ok(record)
}

fn scalar_from_json(prim: PrimitiveType, json: &JsonValue, member: &str) -> LayoutResult<Scalar> {
    let invalid = || {
        LayoutError::invalid_value(member, format!("'{json}' is not a valid {prim} value"))
    };

    match json {
        JsonValue::Number(number) if prim.is_float() => {
            number.as_f64().map(Scalar::Float).ok_or_else(invalid)
        }
        JsonValue::Number(number) => number
            .as_u64()
            .map(|v| Scalar::Unsigned(v as u128))
            .or_else(|| number.as_i64().map(|v| Scalar::Signed(v as i128)))
            .or_else(|| number.as_f64().map(Scalar::Float))
            .ok_or_else(invalid),
        JsonValue::String(text) if prim == PrimitiveType::Char && text.len() == 1 => {
            Ok(Scalar::Unsigned(text.as_bytes()[0] as u128))
        }
        JsonValue::String(text) if prim.is_float() => {
            text.trim().parse::<f64>().map(Scalar::Float).map_err(|_| invalid())
        }
        JsonValue::String(text) => {
            let text = text.trim();
            text.parse::<u128>()
                .map(Scalar::Unsigned)
                .or_else(|_| text.parse::<i128>().map(Scalar::Signed))
                .map_err(|_| invalid())
        }
        _ => Err(invalid()),
    }
}

use prost_reflect::{DynamicMessage, FieldDescriptor, Kind, MapKey, MessageDescriptor, Value};
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    #[error("message {message} must be a JSON object")]
    NotAnObject { message: String },

    #[error("unknown field '{field}' for message {message}")]
    UnknownField { message: String, field: String },

    #[error("field '{field}' expects {expected}")]
    InvalidValue { field: String, expected: &'static str },

    #[error("field '{field}' has no enum value '{value}'")]
    UnknownEnumValue { field: String, value: String },
}

type Result<T> = std::result::Result<T, ConvertError>;

/// Builds a request message from a JSON object.
///
/// Fields are matched by proto name first, then by JSON (camelCase) name. `null` leaves a
/// field unset. Values must already have the field's type: numbers for numeric fields
/// (numeric strings are accepted for 64-bit integers), names or numbers for enums.
pub fn json_to_message(desc: &MessageDescriptor, json: &Json) -> Result<DynamicMessage> {
    let Json::Object(fields) = json else {
        return Err(ConvertError::NotAnObject {
            message: desc.full_name().to_string(),
        });
    };

    let mut msg = DynamicMessage::new(desc.clone());
    for (name, value) in fields {
        let field = desc
            .get_field_by_name(name)
            .or_else(|| desc.get_field_by_json_name(name))
            .ok_or_else(|| ConvertError::UnknownField {
                message: desc.full_name().to_string(),
                field: name.clone(),
            })?;

        if value.is_null() {
            continue;
        }

        let converted = field_value(&field, value)?;
        msg.try_set_field(&field, converted)
            .map_err(|_| invalid(&field, "a value of the declared type"))?;
    }

    Ok(msg)
}

fn invalid(field: &FieldDescriptor, expected: &'static str) -> ConvertError {
    ConvertError::InvalidValue {
        field: field.name().to_string(),
        expected,
    }
}

fn field_value(field: &FieldDescriptor, value: &Json) -> Result<Value> {
    if field.is_map() {
        let Kind::Message(entry) = field.kind() else {
            return Err(invalid(field, "a map"));
        };
        let (Some(key_field), Some(value_field)) = (
            entry.get_field_by_name("key"),
            entry.get_field_by_name("value"),
        ) else {
            return Err(invalid(field, "a map"));
        };
        let Json::Object(entries) = value else {
            return Err(invalid(field, "an object"));
        };

        let mut out = std::collections::HashMap::with_capacity(entries.len());
        for (k, v) in entries {
            out.insert(
                map_key(field, key_field.kind(), k)?,
                scalar_value(field, value_field.kind(), v)?,
            );
        }
        return Ok(Value::Map(out));
    }

    if field.is_list() {
        let Json::Array(items) = value else {
            return Err(invalid(field, "an array"));
        };
        let kind = field.kind();
        return items
            .iter()
            .map(|item| scalar_value(field, kind.clone(), item))
            .collect::<Result<Vec<_>>>()
            .map(Value::List);
    }

    scalar_value(field, field.kind(), value)
}

fn map_key(field: &FieldDescriptor, kind: Kind, key: &str) -> Result<MapKey> {
    let parse_err = |expected| invalid(field, expected);
    Ok(match kind {
        Kind::String => MapKey::String(key.to_string()),
        Kind::Bool => match key {
            "true" => MapKey::Bool(true),
            "false" => MapKey::Bool(false),
            _ => return Err(parse_err("boolean map keys")),
        },
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
            MapKey::I32(key.parse().map_err(|_| parse_err("int32 map keys"))?)
        }
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
            MapKey::I64(key.parse().map_err(|_| parse_err("int64 map keys"))?)
        }
        Kind::Uint32 | Kind::Fixed32 => {
            MapKey::U32(key.parse().map_err(|_| parse_err("uint32 map keys"))?)
        }
        Kind::Uint64 | Kind::Fixed64 => {
            MapKey::U64(key.parse().map_err(|_| parse_err("uint64 map keys"))?)
        }
        _ => return Err(parse_err("a supported map key type")),
    })
}

fn as_i64(value: &Json) -> Option<i64> {
    match value {
        Json::Number(n) => n.as_i64(),
        Json::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_u64(value: &Json) -> Option<u64> {
    match value {
        Json::Number(n) => n.as_u64(),
        Json::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn scalar_value(field: &FieldDescriptor, kind: Kind, value: &Json) -> Result<Value> {
    Ok(match kind {
        Kind::Bool => Value::Bool(value.as_bool().ok_or_else(|| invalid(field, "a boolean"))?),
        Kind::String => Value::String(
            value
                .as_str()
                .ok_or_else(|| invalid(field, "a string"))?
                .to_string(),
        ),
        Kind::Bytes => {
            let s = value.as_str().ok_or_else(|| invalid(field, "a string"))?;
            Value::Bytes(bytes::Bytes::copy_from_slice(s.as_bytes()))
        }

        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => Value::I32(
            as_i64(value)
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(|| invalid(field, "an int32"))?,
        ),
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
            Value::I64(as_i64(value).ok_or_else(|| invalid(field, "an int64"))?)
        }
        Kind::Uint32 | Kind::Fixed32 => Value::U32(
            as_u64(value)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| invalid(field, "a uint32"))?,
        ),
        Kind::Uint64 | Kind::Fixed64 => {
            Value::U64(as_u64(value).ok_or_else(|| invalid(field, "a uint64"))?)
        }

        #[allow(clippy::cast_possible_truncation)]
        Kind::Float => Value::F32(value.as_f64().ok_or_else(|| invalid(field, "a number"))? as f32),
        Kind::Double => Value::F64(value.as_f64().ok_or_else(|| invalid(field, "a number"))?),

        Kind::Enum(enum_desc) => match value {
            Json::String(name) => {
                let v = enum_desc.get_value_by_name(name).ok_or_else(|| {
                    ConvertError::UnknownEnumValue {
                        field: field.name().to_string(),
                        value: name.clone(),
                    }
                })?;
                Value::EnumNumber(v.number())
            }
            Json::Number(n) => {
                let number = n
                    .as_i64()
                    .and_then(|n| i32::try_from(n).ok())
                    .ok_or_else(|| invalid(field, "an enum name or number"))?;
                if enum_desc.get_value(number).is_none() {
                    return Err(ConvertError::UnknownEnumValue {
                        field: field.name().to_string(),
                        value: number.to_string(),
                    });
                }
                Value::EnumNumber(number)
            }
            _ => return Err(invalid(field, "an enum name or number")),
        },

        Kind::Message(msg_desc) => Value::Message(json_to_message(&msg_desc, value)?),
    })
}

/// Renders the populated fields of a message as JSON, keyed by proto field name.
///
/// Enums are rendered by name when the number is known. 64-bit integers stay JSON numbers.
pub fn message_to_json(msg: &DynamicMessage) -> Json {
    let mut out = serde_json::Map::new();
    for (field, value) in msg.fields() {
        out.insert(field.name().to_string(), value_to_json(&field.kind(), value));
    }
    Json::Object(out)
}

fn value_to_json(kind: &Kind, value: &Value) -> Json {
    match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::I32(i) => Json::from(*i),
        Value::I64(i) => Json::from(*i),
        Value::U32(u) => Json::from(*u),
        Value::U64(u) => Json::from(*u),
        Value::F32(f) => serde_json::Number::from_f64(f64::from(*f)).map_or(Json::Null, Json::Number),
        Value::F64(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(b) => Json::String(String::from_utf8_lossy(b).into_owned()),
        Value::EnumNumber(n) => match kind {
            Kind::Enum(desc) => desc
                .get_value(*n)
                .map_or_else(|| Json::from(*n), |v| Json::String(v.name().to_string())),
            _ => Json::from(*n),
        },
        Value::Message(m) => message_to_json(m),
        Value::List(items) => Json::Array(items.iter().map(|v| value_to_json(kind, v)).collect()),
        Value::Map(entries) => {
            let value_kind = match kind {
                Kind::Message(entry) => entry.get_field_by_name("value").map(|f| f.kind()),
                _ => None,
            };
            let mut out = serde_json::Map::new();
            for (k, v) in entries {
                let key = match k {
                    MapKey::Bool(b) => b.to_string(),
                    MapKey::I32(i) => i.to_string(),
                    MapKey::I64(i) => i.to_string(),
                    MapKey::U32(u) => u.to_string(),
                    MapKey::U64(u) => u.to_string(),
                    MapKey::String(s) => s.clone(),
                };
                let rendered = match &value_kind {
                    Some(vk) => value_to_json(vk, v),
                    None => value_to_json(kind, v),
                };
                out.insert(key, rendered);
            }
            Json::Object(out)
        }
    }
}

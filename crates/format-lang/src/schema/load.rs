// Schema loader: JSON schema document → in-memory model
//
// Deserializes the document into raw serde structs, then builds the typed
// model: attribute expressions are compiled up front, type references stay
// textual for late binding at interpretation time.

use crate::error::Error;
use crate::expr;
use crate::expr::ast::Expr;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::rc::Rc;

use super::{
    BuiltinType, Endian, EndianSpec, EnumSpec, FieldSpec, FieldType, InstanceSpec, Meta,
    ParamSpec, Repeat, Schema, SwitchType, TypeSpec,
};

/// Parse a JSON schema source into the model.
pub fn load(source: &str) -> Result<Schema, Error> {
    let doc: JsonValue = serde_json::from_str(source)
        .map_err(|e| Error::validation(format!("malformed schema document: {}", e)))?;
    from_document(&doc)
}

/// Build the model from an already-parsed schema document.
pub fn from_document(doc: &JsonValue) -> Result<Schema, Error> {
    let raw: RawType = from_json_value(doc, "schema")?;
    let root = build_type(raw, None)?;
    Ok(Schema {
        root: Rc::new(root),
    })
}

// ========== Raw document shapes ==========

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawType {
    meta: RawMeta,
    params: Vec<RawParam>,
    seq: Vec<RawField>,
    instances: serde_json::Map<String, JsonValue>,
    types: serde_json::Map<String, JsonValue>,
    enums: serde_json::Map<String, JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMeta {
    id: Option<String>,
    endian: Option<JsonValue>,
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawParam {
    id: String,
    #[serde(rename = "type")]
    ty: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawField {
    id: Option<String>,
    #[serde(rename = "type")]
    ty: Option<RawTypeRef>,
    size: Option<JsonValue>,
    #[serde(rename = "size-eos")]
    size_eos: bool,
    repeat: Option<String>,
    #[serde(rename = "repeat-expr")]
    repeat_expr: Option<JsonValue>,
    #[serde(rename = "repeat-until")]
    repeat_until: Option<String>,
    #[serde(rename = "if")]
    cond: Option<String>,
    contents: Option<JsonValue>,
    encoding: Option<String>,
    terminator: Option<u8>,
    include: bool,
    consume: Option<bool>,
    #[serde(rename = "eos-error")]
    eos_error: Option<bool>,
    #[serde(rename = "enum")]
    enum_ref: Option<String>,
    pos: Option<JsonValue>,
    io: Option<String>,
    process: Option<String>,
    doc: Option<String>,
    /// Only meaningful on instances.
    value: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTypeRef {
    Name(String),
    Switch(RawSwitch),
}

#[derive(Debug, Deserialize)]
struct RawSwitch {
    #[serde(rename = "switch-on")]
    on: String,
    cases: serde_json::Map<String, JsonValue>,
    #[serde(default)]
    default: Option<String>,
}

fn from_json_value<T: serde::de::DeserializeOwned>(
    value: &JsonValue,
    what: &str,
) -> Result<T, Error> {
    serde_json::from_value(value.clone())
        .map_err(|e| Error::validation(format!("malformed {}: {}", what, e)))
}

// ========== Model building ==========

fn build_type(raw: RawType, name: Option<&str>) -> Result<TypeSpec, Error> {
    let meta = Meta {
        id: raw.meta.id.or_else(|| name.map(str::to_string)),
        endian: raw.meta.endian.as_ref().map(build_endian).transpose()?,
        encoding: raw.meta.encoding,
    };

    let params = raw
        .params
        .into_iter()
        .map(|p| ParamSpec { id: p.id, ty: p.ty })
        .collect();

    let seq = raw
        .seq
        .into_iter()
        .map(|f| build_field(f).map(Rc::new))
        .collect::<Result<Vec<_>, _>>()?;

    let mut instances = Vec::new();
    for (id, body) in &raw.instances {
        let raw_field: RawField = from_json_value(body, &format!("instance '{}'", id))?;
        instances.push(Rc::new(build_instance(id.clone(), raw_field)?));
    }

    let mut types = FxHashMap::default();
    for (id, body) in &raw.types {
        let raw_type: RawType = from_json_value(body, &format!("type '{}'", id))?;
        types.insert(id.clone(), Rc::new(build_type(raw_type, Some(id))?));
    }

    let mut enums = FxHashMap::default();
    for (id, body) in &raw.enums {
        enums.insert(id.clone(), Rc::new(build_enum(id, body)?));
    }

    Ok(TypeSpec {
        meta,
        params,
        seq,
        instances,
        types,
        enums,
    })
}

fn build_endian(value: &JsonValue) -> Result<EndianSpec, Error> {
    match value {
        JsonValue::String(s) => Ok(EndianSpec::Fixed(endian_from_str(s)?)),
        JsonValue::Object(map) => {
            let on = map
                .get("switch-on")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| Error::validation("endianness switch requires 'switch-on'"))?;
            let cases_raw = map
                .get("cases")
                .and_then(JsonValue::as_object)
                .ok_or_else(|| Error::validation("endianness switch requires 'cases'"))?;
            let mut cases = FxHashMap::default();
            for (key, case) in cases_raw {
                let s = case.as_str().ok_or_else(|| {
                    Error::validation("endianness case value must be 'le' or 'be'")
                })?;
                cases.insert(key.clone(), endian_from_str(s)?);
            }
            Ok(EndianSpec::Switch {
                on: expr::parse(on)?,
                cases,
            })
        }
        _ => Err(Error::validation(
            "endianness must be 'le', 'be' or a switch object",
        )),
    }
}

fn endian_from_str(s: &str) -> Result<Endian, Error> {
    match s {
        "le" => Ok(Endian::Little),
        "be" => Ok(Endian::Big),
        _ => Err(Error::validation(format!(
            "bad endianness '{}', expected 'le' or 'be'",
            s
        ))),
    }
}

fn build_field(raw: RawField) -> Result<FieldSpec, Error> {
    let field_name = raw.id.clone().unwrap_or_else(|| "<anonymous>".to_string());

    let repeat = match raw.repeat.as_deref() {
        None => None,
        Some("expr") => {
            let count = raw.repeat_expr.as_ref().ok_or_else(|| {
                Error::validation(format!(
                    "field '{}': repeat 'expr' requires 'repeat-expr'",
                    field_name
                ))
            })?;
            Some(Repeat::Count(expr_from_json(count, &field_name)?))
        }
        Some("until") => {
            let until = raw.repeat_until.as_deref().ok_or_else(|| {
                Error::validation(format!(
                    "field '{}': repeat 'until' requires 'repeat-until'",
                    field_name
                ))
            })?;
            Some(Repeat::Until(expr::parse(until)?))
        }
        Some("eos") => Some(Repeat::Eos),
        Some(other) => {
            return Err(Error::validation(format!(
                "field '{}': bad repeat kind '{}'",
                field_name, other
            )));
        }
    };

    if raw.size.is_some() && raw.size_eos {
        return Err(Error::validation(format!(
            "field '{}': 'size' and 'size-eos' are mutually exclusive",
            field_name
        )));
    }

    Ok(FieldSpec {
        id: raw.id,
        ty: raw.ty.map(build_type_ref).transpose()?,
        size: raw
            .size
            .as_ref()
            .map(|v| expr_from_json(v, &field_name))
            .transpose()?,
        size_eos: raw.size_eos,
        repeat,
        cond: raw.cond.as_deref().map(expr::parse).transpose()?,
        contents: raw
            .contents
            .as_ref()
            .map(|v| contents_from_json(v, &field_name))
            .transpose()?,
        encoding: raw.encoding,
        terminator: raw.terminator,
        include: raw.include,
        consume: raw.consume.unwrap_or(true),
        eos_error: raw.eos_error.unwrap_or(true),
        enum_ref: raw.enum_ref,
        pos: raw
            .pos
            .as_ref()
            .map(|v| expr_from_json(v, &field_name))
            .transpose()?,
        io: raw.io.as_deref().map(expr::parse).transpose()?,
        process: raw.process,
        doc: raw.doc,
    })
}

fn build_instance(id: String, raw: RawField) -> Result<InstanceSpec, Error> {
    let value = raw
        .value
        .as_ref()
        .map(|v| expr_from_json(v, &id))
        .transpose()?;
    let field = build_field(raw)?;
    Ok(InstanceSpec { id, value, field })
}

fn build_type_ref(raw: RawTypeRef) -> Result<FieldType, Error> {
    match raw {
        RawTypeRef::Name(name) => type_ref_from_str(&name),
        RawTypeRef::Switch(sw) => {
            let mut cases = Vec::new();
            for (key, case) in &sw.cases {
                let name = case.as_str().ok_or_else(|| {
                    Error::validation(format!("switch case '{}' must name a type", key))
                })?;
                cases.push((key.clone(), type_ref_from_str(name)?));
            }
            let default = sw
                .default
                .as_deref()
                .map(type_ref_from_str)
                .transpose()?;
            Ok(FieldType::Switch(Box::new(SwitchType {
                on: expr::parse(&sw.on)?,
                cases,
                default,
            })))
        }
    }
}

/// Parse a textual type reference: a built-in name, or a user type name
/// with optional parenthesized argument expressions.
fn type_ref_from_str(s: &str) -> Result<FieldType, Error> {
    let s = s.trim();
    if let Some(bt) = BuiltinType::from_str(s) {
        return Ok(FieldType::Builtin(bt));
    }
    if let Some(open) = s.find('(') {
        let name = s[..open].trim();
        let rest = &s[open + 1..];
        let close = rest
            .rfind(')')
            .ok_or_else(|| Error::validation(format!("unbalanced '(' in type reference '{}'", s)))?;
        if !rest[close + 1..].trim().is_empty() {
            return Err(Error::validation(format!(
                "trailing text after ')' in type reference '{}'",
                s
            )));
        }
        let args = split_args(&rest[..close])
            .into_iter()
            .map(|a| expr::parse(a.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(FieldType::User {
            name: name.to_string(),
            args,
        });
    }
    Ok(FieldType::User {
        name: s.to_string(),
        args: Vec::new(),
    })
}

/// Split a type-argument list at top-level commas, respecting brackets and
/// string quotes.
fn split_args(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    if s.trim().is_empty() {
        return out;
    }
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth -= 1,
                b',' if depth == 0 => {
                    out.push(&s[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
        i += 1;
    }
    out.push(&s[start..]);
    out
}

/// An attribute expression: a plain number, or a string compiled by the
/// expression parser.
fn expr_from_json(value: &JsonValue, field_name: &str) -> Result<Expr, Error> {
    match value {
        JsonValue::Number(n) => {
            let v = n.as_i64().ok_or_else(|| {
                Error::validation(format!(
                    "field '{}': numeric attribute must be an integer",
                    field_name
                ))
            })?;
            Ok(Expr::int(v))
        }
        JsonValue::String(s) => expr::parse(s),
        _ => Err(Error::validation(format!(
            "field '{}': attribute must be a number or an expression string",
            field_name
        ))),
    }
}

/// A contents literal: a byte array (integers 0–255) or a string.
fn contents_from_json(value: &JsonValue, field_name: &str) -> Result<Vec<u8>, Error> {
    match value {
        JsonValue::Array(items) => {
            let mut bytes = Vec::with_capacity(items.len());
            for item in items {
                let b = item.as_u64().filter(|&b| b <= 0xFF).ok_or_else(|| {
                    Error::validation(format!(
                        "field '{}': contents bytes must be integers 0-255",
                        field_name
                    ))
                })?;
                bytes.push(b as u8);
            }
            Ok(bytes)
        }
        JsonValue::String(s) => Ok(s.as_bytes().to_vec()),
        _ => Err(Error::validation(format!(
            "field '{}': contents must be a byte array or a string",
            field_name
        ))),
    }
}

fn build_enum(id: &str, body: &JsonValue) -> Result<EnumSpec, Error> {
    let map = body
        .as_object()
        .ok_or_else(|| Error::validation(format!("enum '{}' must be an object", id)))?;
    let mut pairs = Vec::new();
    for (key, name) in map {
        let value = parse_int_key(key).ok_or_else(|| {
            Error::validation(format!("enum '{}': bad integer key '{}'", id, key))
        })?;
        let name = name
            .as_str()
            .ok_or_else(|| Error::validation(format!("enum '{}': member name must be a string", id)))?;
        pairs.push((value, name.to_string()));
    }
    Ok(EnumSpec { pairs })
}

fn parse_int_key(key: &str) -> Option<i64> {
    if let Some(hex) = key.strip_prefix("0x").or_else(|| key.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        key.parse().ok()
    }
}

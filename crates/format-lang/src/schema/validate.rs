// Schema validator: checks the raw schema document against the model invariants
//
// Runs over the parsed JSON document (not the built model) so it can report
// shape errors the loader would otherwise surface one at a time. Produces a
// report with all errors and warnings; strict mode promotes warnings to
// errors.

use serde_json::Value as JsonValue;

/// One finding, with its path within the schema document.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// The validator's result: all findings, already split by severity.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

/// Attribute keys a field spec may carry.
const FIELD_KEYS: &[&str] = &[
    "id",
    "type",
    "size",
    "size-eos",
    "repeat",
    "repeat-expr",
    "repeat-until",
    "if",
    "contents",
    "encoding",
    "terminator",
    "include",
    "consume",
    "eos-error",
    "enum",
    "pos",
    "io",
    "process",
    "doc",
    "value",
];

struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

/// Validate a schema document. In strict mode warnings become errors.
pub fn validate(doc: &JsonValue, strict: bool) -> ValidationReport {
    let mut v = Validator {
        errors: Vec::new(),
        warnings: Vec::new(),
    };
    v.check_root(doc);

    let Validator {
        mut errors,
        mut warnings,
    } = v;
    if strict {
        errors.append(&mut warnings);
    }
    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

impl Validator {
    fn error(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.into(),
        });
    }

    fn warning(&mut self, path: &str, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.into(),
        });
    }

    fn check_root(&mut self, doc: &JsonValue) {
        let Some(root) = doc.as_object() else {
            self.error("/", "schema document must be an object");
            return;
        };
        match root.get("meta").and_then(JsonValue::as_object) {
            None => self.error("/meta", "missing root meta section"),
            Some(meta) => match meta.get("id") {
                None => self.error("/meta/id", "missing root meta id"),
                Some(JsonValue::String(_)) => {}
                Some(_) => self.error("/meta/id", "root meta id must be a string"),
            },
        }
        self.check_type(doc, "", &mut Vec::new());
    }

    /// Validate one type definition; `enum_scope` is the chain of enum
    /// tables visible at this level, innermost last.
    fn check_type<'a>(
        &mut self,
        doc: &'a JsonValue,
        path: &str,
        enum_scope: &mut Vec<&'a serde_json::Map<String, JsonValue>>,
    ) {
        let Some(ty) = doc.as_object() else {
            self.error(path, "type definition must be an object");
            return;
        };

        if let Some(meta) = ty.get("meta").and_then(JsonValue::as_object) {
            if let Some(endian) = meta.get("endian") {
                self.check_endian(endian, &format!("{}/meta/endian", path));
            }
        }

        let pushed = match ty.get("enums") {
            Some(JsonValue::Object(enums)) => {
                enum_scope.push(enums);
                true
            }
            Some(_) => {
                self.error(&format!("{}/enums", path), "enums must be an object");
                false
            }
            None => false,
        };

        match ty.get("seq") {
            None => {}
            Some(JsonValue::Array(fields)) => {
                for (i, field) in fields.iter().enumerate() {
                    self.check_field(field, &format!("{}/seq/{}", path, i), &enum_scope[..]);
                }
            }
            Some(_) => self.error(&format!("{}/seq", path), "seq must be an array"),
        }

        if let Some(instances) = ty.get("instances") {
            match instances.as_object() {
                Some(map) => {
                    for (name, body) in map {
                        self.check_field(
                            body,
                            &format!("{}/instances/{}", path, name),
                            &enum_scope[..],
                        );
                    }
                }
                None => self.error(&format!("{}/instances", path), "instances must be an object"),
            }
        }

        if let Some(types) = ty.get("types") {
            match types.as_object() {
                Some(map) => {
                    for (name, body) in map {
                        if !is_canonical_ident(name) {
                            self.warning(
                                &format!("{}/types/{}", path, name),
                                "non-canonical identifier casing",
                            );
                        }
                        self.check_type(body, &format!("{}/types/{}", path, name), enum_scope);
                    }
                }
                None => self.error(&format!("{}/types", path), "types must be an object"),
            }
        }

        if pushed {
            enum_scope.pop();
        }
    }

    fn check_endian(&mut self, endian: &JsonValue, path: &str) {
        match endian {
            JsonValue::String(s) if s == "le" || s == "be" => {}
            JsonValue::String(s) => {
                self.error(path, format!("bad endianness '{}', expected 'le' or 'be'", s));
            }
            JsonValue::Object(map) => {
                if !map.contains_key("switch-on") || !map.contains_key("cases") {
                    self.error(path, "endianness switch requires 'switch-on' and 'cases'");
                }
            }
            _ => self.error(path, "endianness must be a string or a switch object"),
        }
    }

    fn check_field(
        &mut self,
        field: &JsonValue,
        path: &str,
        enum_scope: &[&serde_json::Map<String, JsonValue>],
    ) {
        let Some(map) = field.as_object() else {
            self.error(path, "field spec must be an object");
            return;
        };

        if let Some(id) = map.get("id").and_then(JsonValue::as_str) {
            if !is_canonical_ident(id) {
                self.warning(path, "non-canonical identifier casing");
            }
        }
        for key in map.keys() {
            if !FIELD_KEYS.contains(&key.as_str()) {
                self.warning(path, format!("unknown attribute '{}'", key));
            }
        }

        match map.get("repeat").and_then(JsonValue::as_str) {
            None => {
                if map.get("repeat").is_some() {
                    self.error(path, "repeat must be 'expr', 'until' or 'eos'");
                }
            }
            Some("expr") => {
                if !map.contains_key("repeat-expr") {
                    self.error(path, "repeat 'expr' requires 'repeat-expr'");
                }
            }
            Some("until") => {
                if !map.contains_key("repeat-until") {
                    self.error(path, "repeat 'until' requires 'repeat-until'");
                }
            }
            Some("eos") => {}
            Some(other) => {
                self.error(path, format!("bad repeat kind '{}'", other));
            }
        }

        if map.contains_key("size") && map.get("size-eos").and_then(JsonValue::as_bool) == Some(true)
        {
            self.error(path, "'size' and 'size-eos' are mutually exclusive");
        }

        if let Some(contents) = map.get("contents") {
            match contents {
                JsonValue::String(_) => {}
                JsonValue::Array(items) => {
                    if !items
                        .iter()
                        .all(|i| i.as_u64().is_some_and(|b| b <= 0xFF))
                    {
                        self.error(path, "contents bytes must be integers 0-255");
                    }
                }
                _ => self.error(path, "contents must be a byte array or a string"),
            }
        }

        if let Some(enum_name) = map.get("enum").and_then(JsonValue::as_str) {
            let resolved = enum_scope
                .iter()
                .rev()
                .any(|scope| scope.contains_key(enum_name));
            if !resolved {
                self.error(path, format!("reference to unknown enum '{}'", enum_name));
            }
        }
    }
}

/// Canonical identifiers are lower snake case.
fn is_canonical_ident(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && s.starts_with(|c: char| c.is_ascii_lowercase() || c == '_')
}

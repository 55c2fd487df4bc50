//! Settings schema validation
//!
//! Plugins declare their settings as a JSON-Schema object:
//!
//! ```json
//! {
//!   "title": "Arguments",
//!   "type": "object",
//!   "properties": {
//!     "api_key": {"title": "Api Key", "maxLength": 128, "type": "string"}
//!   },
//!   "required": ["api_key"]
//! }
//! ```
//!
//! Only the keywords that plugin schemas use are supported. Validation stops
//! at the first violation. Messages use the phrasing of Python's
//! `jsonschema` package, e.g. `'api_key' is a required property`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// The first constraint a settings object failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub message: String,
}

impl SchemaViolation {
    fn new(message: String) -> Self {
        Self { message }
    }
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SchemaViolation {}

/// Build the JSON instance that represents an organisation's settings
pub fn settings_instance(settings: &BTreeMap<String, String>) -> Value {
    Value::Object(
        settings
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect(),
    )
}

/// Validate `instance` against `schema`
///
/// Object-level errors (`type`, `required`, `additionalProperties`) are
/// reported before errors on individual properties.
pub fn validate(instance: &Value, schema: &Value) -> Result<(), SchemaViolation> {
    if let Some(message) = check_type(instance, schema) {
        return Err(SchemaViolation::new(message));
    }

    let Some(object) = instance.as_object() else {
        return check_value(instance, schema).map_err(SchemaViolation::new);
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(key) {
                return Err(SchemaViolation::new(format!(
                    "{} is a required property",
                    py_repr_str(key)
                )));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);

    if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
        let unexpected: Vec<String> = object
            .keys()
            .filter(|key| !properties.is_some_and(|props| props.contains_key(*key)))
            .map(|key| py_repr_str(key))
            .collect();

        if !unexpected.is_empty() {
            let verb = if unexpected.len() == 1 { "was" } else { "were" };
            return Err(SchemaViolation::new(format!(
                "Additional properties are not allowed ({} {} unexpected)",
                unexpected.join(", "),
                verb
            )));
        }
    }

    if let Some(properties) = properties {
        for (name, property_schema) in properties {
            if let Some(value) = object.get(name) {
                validate_property(value, property_schema)?;
            }
        }
    }

    Ok(())
}

fn validate_property(value: &Value, schema: &Value) -> Result<(), SchemaViolation> {
    if let Some(message) = check_type(value, schema) {
        return Err(SchemaViolation::new(message));
    }

    check_value(value, schema).map_err(SchemaViolation::new)
}

/// Keyword checks that apply to a single value
fn check_value(value: &Value, schema: &Value) -> Result<(), String> {
    if let Some(options) = schema.get("enum").and_then(Value::as_array) {
        if !options.contains(value) {
            return Err(format!(
                "{} is not one of {}",
                py_repr(value),
                py_repr(&Value::Array(options.clone()))
            ));
        }
    }

    if let Some(text) = value.as_str() {
        let length = text.chars().count() as u64;

        if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
            if length > max {
                return Err(format!("{} is too long", py_repr_str(text)));
            }
        }

        if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
            if length < min {
                return Err(format!("{} is too short", py_repr_str(text)));
            }
        }

        if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
            match regex::Regex::new(pattern) {
                Ok(re) if !re.is_match(text) => {
                    return Err(format!(
                        "{} does not match {}",
                        py_repr_str(text),
                        py_repr_str(pattern)
                    ));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Ignoring invalid schema pattern '{}': {}", pattern, e);
                }
            }
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if number < min {
                return Err(format!(
                    "{} is less than the minimum of {}",
                    py_repr(value),
                    py_repr(&schema["minimum"])
                ));
            }
        }

        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if number > max {
                return Err(format!(
                    "{} is greater than the maximum of {}",
                    py_repr(value),
                    py_repr(&schema["maximum"])
                ));
            }
        }
    }

    Ok(())
}

/// Returns the violation message if `value` does not match the `type` keyword
fn check_type(value: &Value, schema: &Value) -> Option<String> {
    let expected: Vec<&str> = match schema.get("type")? {
        Value::String(name) => vec![name.as_str()],
        Value::Array(names) => names.iter().filter_map(Value::as_str).collect(),
        _ => return None,
    };

    if expected.iter().any(|name| is_of_type(value, name)) {
        return None;
    }

    let names: Vec<String> = expected.iter().map(|name| py_repr_str(name)).collect();
    Some(format!("{} is not of type {}", py_repr(value), names.join(", ")))
}

fn is_of_type(value: &Value, name: &str) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
            _ => false,
        },
        // Unknown type names never reject a value
        _ => true,
    }
}

/// Render a value the way Python's `repr` does
fn py_repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => py_repr_str(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(py_repr).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => py_repr_map(map),
    }
}

fn py_repr_map(map: &Map<String, Value>) -> String {
    let entries: Vec<String> = map
        .iter()
        .map(|(key, value)| format!("{}: {}", py_repr_str(key), py_repr(value)))
        .collect();
    format!("{{{}}}", entries.join(", "))
}

fn py_repr_str(text: &str) -> String {
    // Single quotes unless the text contains one and no double quote
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            // Controls and separators other than the plain space are not printable
            c if c.is_control() || (c.is_whitespace() && c != ' ') => {
                let code = c as u32;
                if code <= 0xff {
                    out.push_str(&format!("\\x{:02x}", code));
                } else if code <= 0xffff {
                    out.push_str(&format!("\\u{:04x}", code));
                } else {
                    out.push_str(&format!("\\U{:08x}", code));
                }
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

//! Canonical document validation against a JSON Schema.
//!
//! Only the keywords the document schema uses are evaluated: `type`,
//! `enum`, `const`, `required`, `properties`, `additionalProperties`,
//! `items`, `minLength`, `maxLength`, `minItems`, `maxItems` and `pattern`.

use crate::error::{IngestError, IngestResult};
use corpus_core::{CanonicalDocument, SyllabusStructure};
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

/// Schema shipped with the binary and written by `corpus init`.
pub const BUILTIN_SCHEMA: &str = include_str!("../schema/canonical_document.json");

/// Checks documents against a loaded schema.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    schema: Value,
}

impl SchemaValidator {
    /// Wrap an already parsed schema.
    pub fn from_value(schema: Value) -> IngestResult<Self> {
        if !schema.is_object() {
            return Err(IngestError::FatalConfig(
                "schema must be a JSON object".to_string(),
            ));
        }
        Ok(Self { schema })
    }

    /// Load the schema file. A missing or malformed schema is fatal.
    pub fn from_file(path: &Path) -> IngestResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            IngestError::FatalConfig(format!("cannot read schema {:?}: {}", path, e))
        })?;
        let schema = serde_json::from_str(&text).map_err(|e| {
            IngestError::FatalConfig(format!("invalid schema {:?}: {}", path, e))
        })?;
        debug!("Loaded schema from {:?}", path);
        Self::from_value(schema)
    }

    /// The schema compiled into the binary.
    pub fn builtin() -> IngestResult<Self> {
        let schema = serde_json::from_str(BUILTIN_SCHEMA)
            .map_err(|e| IngestError::FatalConfig(format!("invalid built-in schema: {}", e)))?;
        Self::from_value(schema)
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Every violation found in `instance`, as `path: message` strings.
    pub fn violations(&self, instance: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        check(&self.schema, instance, "$", &mut errors);
        errors
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.violations(instance).is_empty()
    }

    /// Validate a canonical document, logging the violations.
    pub fn validate(&self, doc: &CanonicalDocument) -> IngestResult<Vec<String>> {
        let violations = self.violations(&serde_json::to_value(doc)?);
        for violation in &violations {
            debug!("Validation error: {}", violation);
        }
        Ok(violations)
    }
}

/// Syllabi skip the schema: they are valid when they name their specialty.
pub fn validate_syllabus(structure: &SyllabusStructure) -> Vec<String> {
    if structure.is_valid() {
        Vec::new()
    } else {
        vec!["$.specialite: syllabus specialite is empty".to_string()]
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false)
            }
            _ => false,
        },
        _ => true,
    }
}

fn as_count(schema: &Value, key: &str) -> Option<usize> {
    schema.get(key).and_then(Value::as_u64).map(|n| n as usize)
}

fn check(schema: &Value, value: &Value, path: &str, errors: &mut Vec<String>) {
    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| type_matches(t, value)) {
            errors.push(format!(
                "{}: expected {}, got {}",
                path,
                allowed.join(" or "),
                type_name(value)
            ));
            return;
        }
    }

    if let Some(constant) = schema.get("const") {
        if constant != value {
            errors.push(format!("{}: must equal {}", path, constant));
        }
    }

    if let Some(options) = schema.get("enum").and_then(Value::as_array) {
        if !options.contains(value) {
            errors.push(format!("{}: {} is not one of the allowed values", path, value));
        }
    }

    match value {
        Value::String(s) => check_string(schema, s, path, errors),
        Value::Array(items) => check_array(schema, items, path, errors),
        Value::Object(map) => check_object(schema, map, path, errors),
        _ => {}
    }
}

fn check_string(schema: &Value, s: &str, path: &str, errors: &mut Vec<String>) {
    let len = s.chars().count();
    if let Some(min) = as_count(schema, "minLength") {
        if len < min {
            errors.push(format!("{}: shorter than {} characters", path, min));
        }
    }
    if let Some(max) = as_count(schema, "maxLength") {
        if len > max {
            errors.push(format!("{}: longer than {} characters", path, max));
        }
    }
    if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
        match Regex::new(pattern) {
            Ok(re) if !re.is_match(s) => {
                errors.push(format!("{}: does not match /{}/", path, pattern));
            }
            Ok(_) => {}
            Err(e) => warn!("Ignoring invalid schema pattern {}: {}", pattern, e),
        }
    }
}

fn check_array(schema: &Value, items: &[Value], path: &str, errors: &mut Vec<String>) {
    if let Some(min) = as_count(schema, "minItems") {
        if items.len() < min {
            errors.push(format!("{}: fewer than {} items", path, min));
        }
    }
    if let Some(max) = as_count(schema, "maxItems") {
        if items.len() > max {
            errors.push(format!("{}: more than {} items", path, max));
        }
    }
    if let Some(item_schema) = schema.get("items").filter(|s| s.is_object()) {
        for (i, item) in items.iter().enumerate() {
            check(item_schema, item, &format!("{}[{}]", path, i), errors);
        }
    }
}

fn check_object(
    schema: &Value,
    map: &serde_json::Map<String, Value>,
    path: &str,
    errors: &mut Vec<String>,
) {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !map.contains_key(key) {
                errors.push(format!("{}: missing required property '{}'", path, key));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    for (key, child) in map {
        let child_path = format!("{}.{}", path, key);
        match properties.and_then(|p| p.get(key)) {
            Some(child_schema) => check(child_schema, child, &child_path, errors),
            None => match schema.get("additionalProperties") {
                Some(Value::Bool(false)) => {
                    errors.push(format!("{}: unexpected property", child_path));
                }
                Some(extra) if extra.is_object() => check(extra, child, &child_path, errors),
                _ => {}
            },
        }
    }
}

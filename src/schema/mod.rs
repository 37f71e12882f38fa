//! Schema document access
//!
//! Schema documents are in-memory `serde_json` trees. The helpers here
//! enforce the input contract with descriptive, path-carrying errors: a
//! missing or mistyped required field is schema corruption and aborts the
//! run.

pub mod classify;
pub mod resources;

use serde_json::{Map, Value};

use crate::error::{DerivationError, Result};
use crate::paths::{JsonPathExpression, JsonPathSegment};

pub use classify::{determine_schema_kind, SchemaKind};

/// Walks a JSON schema tree along a canonical path, descending through
/// `properties` for property segments and `items` for array segments
pub fn resolve_schema_at_path<'a>(
    root_schema: &'a Map<String, Value>,
    path: &JsonPathExpression,
) -> Result<&'a Map<String, Value>> {
    let mut current = root_schema;

    for segment in path.segments() {
        current = match segment {
            JsonPathSegment::Property { name } => {
                let properties = require_object(current.get("properties"), "schema properties")?;
                match properties.get(name) {
                    Some(Value::Object(property_schema)) => property_schema,
                    _ => {
                        return Err(DerivationError::SchemaCorruption(format!(
                            "Path '{path}' does not resolve to a schema node"
                        )))
                    }
                }
            }
            JsonPathSegment::AnyArrayElement => match current.get("items") {
                Some(Value::Object(items_schema)) => items_schema,
                _ => {
                    return Err(DerivationError::SchemaCorruption(format!(
                        "Path '{path}' does not resolve to a schema node"
                    )))
                }
            },
        };
    }

    Ok(current)
}

/// Requires a value to be a JSON object
pub fn require_object<'a>(
    value: Option<&'a Value>,
    property_path: &str,
) -> Result<&'a Map<String, Value>> {
    match value {
        Some(Value::Object(object)) => Ok(object),
        Some(_) => Err(DerivationError::SchemaCorruption(format!(
            "Expected {property_path} to be an object, invalid schema document"
        ))),
        None => Err(DerivationError::SchemaCorruption(format!(
            "Expected {property_path} to be present, invalid schema document"
        ))),
    }
}

/// Requires a named property to be a non-empty string
pub fn require_string<'a>(
    object: &'a Map<String, Value>,
    property_name: &str,
    context_path: &str,
) -> Result<&'a str> {
    let value = match object.get(property_name) {
        Some(Value::String(value)) => value,
        Some(_) => {
            return Err(DerivationError::SchemaCorruption(format!(
                "Expected {context_path}.{property_name} to be a string, invalid schema document"
            )))
        }
        None => {
            return Err(DerivationError::SchemaCorruption(format!(
                "Expected {context_path}.{property_name} to be present, invalid schema document"
            )))
        }
    };

    if value.trim().is_empty() {
        return Err(DerivationError::SchemaCorruption(format!(
            "Expected {context_path}.{property_name} to be non-empty, invalid schema document"
        )));
    }

    Ok(value)
}

/// Requires a named property to be a boolean
pub fn require_bool(
    object: &Map<String, Value>,
    property_name: &str,
    context_path: &str,
) -> Result<bool> {
    match object.get(property_name) {
        Some(Value::Bool(value)) => Ok(*value),
        Some(_) => Err(DerivationError::SchemaCorruption(format!(
            "Expected {context_path}.{property_name} to be a boolean, invalid schema document"
        ))),
        None => Err(DerivationError::SchemaCorruption(format!(
            "Expected {context_path}.{property_name} to be present, invalid schema document"
        ))),
    }
}

/// Requires a named property to be an array
pub fn require_array<'a>(
    object: &'a Map<String, Value>,
    property_name: &str,
    context_path: &str,
) -> Result<&'a Vec<Value>> {
    match object.get(property_name) {
        Some(Value::Array(values)) => Ok(values),
        Some(_) => Err(DerivationError::SchemaCorruption(format!(
            "Expected {context_path}.{property_name} to be an array, invalid schema document"
        ))),
        None => Err(DerivationError::SchemaCorruption(format!(
            "Expected {context_path}.{property_name} to be present, invalid schema document"
        ))),
    }
}

/// Reads an optional string property, rejecting non-string values
pub fn optional_string<'a>(
    object: &'a Map<String, Value>,
    property_name: &str,
    context_path: &str,
) -> Result<Option<&'a str>> {
    match object.get(property_name) {
        Some(Value::String(value)) => Ok(Some(value)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(DerivationError::SchemaCorruption(format!(
            "Expected {context_path}.{property_name} to be a string, invalid schema document"
        ))),
    }
}

/// Reads an optional boolean property, rejecting non-boolean values
pub fn optional_bool(
    object: &Map<String, Value>,
    property_name: &str,
    context_path: &str,
) -> Result<Option<bool>> {
    match object.get(property_name) {
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(DerivationError::SchemaCorruption(format!(
            "Expected {context_path}.{property_name} to be a boolean, invalid schema document"
        ))),
    }
}

/// Reads an optional unsigned integer property, rejecting other shapes
pub fn optional_u32(
    object: &Map<String, Value>,
    property_name: &str,
    context_path: &str,
) -> Result<Option<u32>> {
    match object.get(property_name) {
        Some(Value::Number(number)) => match number.as_u64() {
            Some(value) if value <= u64::from(u32::MAX) => Ok(Some(value as u32)),
            _ => Err(DerivationError::SchemaCorruption(format!(
                "Expected {context_path}.{property_name} to be a non-negative integer, invalid schema document"
            ))),
        },
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(DerivationError::SchemaCorruption(format!(
            "Expected {context_path}.{property_name} to be a number, invalid schema document"
        ))),
    }
}

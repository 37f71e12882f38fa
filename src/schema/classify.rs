//! Schema-kind classification
//!
//! Classifies a JSON Schema node as object, array, or scalar. An explicit
//! `type` keyword wins; otherwise the presence of `items` or `properties`
//! decides. The root schema must classify as an object.

use serde_json::{Map, Value};

use crate::error::{DerivationError, Result};

/// Structural classification of a JSON Schema node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Object,
    Array,
    Scalar,
}

/// Classifies a schema node, enforcing the root-must-be-object rule
pub fn determine_schema_kind(
    schema: &Map<String, Value>,
    path: &str,
    is_root: bool,
) -> Result<SchemaKind> {
    let kind = match schema.get("type") {
        Some(Value::String(schema_type)) => match schema_type.as_str() {
            "object" => SchemaKind::Object,
            "array" => SchemaKind::Array,
            _ => SchemaKind::Scalar,
        },
        Some(_) => {
            return Err(DerivationError::SchemaCorruption(format!(
                "Expected schema type to be a string at {path}.type"
            )))
        }
        None => {
            if schema.contains_key("items") {
                SchemaKind::Array
            } else if schema.contains_key("properties") {
                SchemaKind::Object
            } else {
                SchemaKind::Scalar
            }
        }
    };

    if is_root && kind != SchemaKind::Object {
        return Err(DerivationError::SchemaCorruption(format!(
            "Expected JSON schema root to be an object at {path}"
        )));
    }

    Ok(kind)
}

//! Structural schema validation step

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::builder::context::RelationalModelBuilderContext;
use crate::builder::RelationalModelBuilderStep;
use crate::error::{DerivationError, Result};
use crate::paths::{JsonPathExpression, EXTENSION_PROPERTY_NAME};
use crate::schema::{determine_schema_kind, SchemaKind};

/// Keywords outside the supported subset; the builder assumes a fully
/// dereferenced, constrained schema
const UNSUPPORTED_KEYWORDS: [&str; 6] = [
    "$ref",
    "oneOf",
    "anyOf",
    "allOf",
    "enum",
    "patternProperties",
];

/// Validates the insert schema for the assumptions derivation relies on
///
/// The root must classify as an object, unsupported keywords are rejected
/// with path-carrying errors, arrays must have object items (except
/// descriptor scalar arrays), and every identity path must land on a
/// discovered scalar path.
pub struct ValidateJsonSchemaStep;

impl RelationalModelBuilderStep for ValidateJsonSchemaStep {
    fn name(&self) -> &'static str {
        "validate-json-schema"
    }

    fn execute(&self, context: &mut RelationalModelBuilderContext) -> Result<()> {
        let json_schema_for_insert = context.require_json_schema_for_insert()?.clone();

        let Value::Object(root_schema) = &json_schema_for_insert else {
            return Err(DerivationError::SchemaCorruption(
                "Expected JSON schema root to be an object at $".to_string(),
            ));
        };

        let mut scalar_paths = BTreeSet::new();
        let mut array_paths = BTreeSet::new();

        validate_schema(
            root_schema,
            "$",
            true,
            &JsonPathExpression::root(),
            context,
            &mut scalar_paths,
            &mut array_paths,
        )?;

        validate_identity_paths(context, &scalar_paths)?;

        Ok(())
    }
}

fn validate_schema(
    schema: &Map<String, Value>,
    schema_path: &str,
    is_root: bool,
    json_path: &JsonPathExpression,
    context: &RelationalModelBuilderContext,
    scalar_paths: &mut BTreeSet<String>,
    array_paths: &mut BTreeSet<String>,
) -> Result<()> {
    reject_unsupported_keywords(schema, schema_path)?;

    match determine_schema_kind(schema, schema_path, is_root)? {
        SchemaKind::Object => validate_object_schema(
            schema,
            schema_path,
            json_path,
            context,
            scalar_paths,
            array_paths,
        ),
        SchemaKind::Array => validate_array_schema(
            schema,
            schema_path,
            json_path,
            context,
            scalar_paths,
            array_paths,
        ),
        SchemaKind::Scalar => {
            scalar_paths.insert(json_path.canonical().to_string());
            Ok(())
        }
    }
}

fn validate_object_schema(
    schema: &Map<String, Value>,
    schema_path: &str,
    json_path: &JsonPathExpression,
    context: &RelationalModelBuilderContext,
    scalar_paths: &mut BTreeSet<String>,
    array_paths: &mut BTreeSet<String>,
) -> Result<()> {
    let Some(properties) = schema.get("properties") else {
        return Ok(());
    };

    let Value::Object(properties) = properties else {
        return Err(DerivationError::SchemaCorruption(format!(
            "Expected properties to be an object at {schema_path}.properties"
        )));
    };

    let mut property_names: Vec<&String> = properties.keys().collect();
    property_names.sort();

    for property_name in property_names {
        if property_name == EXTENSION_PROPERTY_NAME {
            continue;
        }

        let Some(Value::Object(property_schema)) = properties.get(property_name) else {
            return Err(DerivationError::SchemaCorruption(format!(
                "Expected property schema to be an object at {schema_path}.properties.{property_name}"
            )));
        };

        validate_schema(
            property_schema,
            &format!("{schema_path}.properties.{property_name}"),
            false,
            &json_path.append_property(property_name.clone())?,
            context,
            scalar_paths,
            array_paths,
        )?;
    }

    Ok(())
}

fn validate_array_schema(
    schema: &Map<String, Value>,
    schema_path: &str,
    json_path: &JsonPathExpression,
    context: &RelationalModelBuilderContext,
    scalar_paths: &mut BTreeSet<String>,
    array_paths: &mut BTreeSet<String>,
) -> Result<()> {
    let Some(Value::Object(items_schema)) = schema.get("items") else {
        return Err(DerivationError::SchemaCorruption(format!(
            "Array schema items must be an object at {schema_path}.items"
        )));
    };

    let array_element_path = json_path.append_any_array_element()?;
    array_paths.insert(array_element_path.canonical().to_string());

    let items_schema_path = format!("{schema_path}.items");
    let items_kind = determine_schema_kind(items_schema, &items_schema_path, false)?;

    if items_kind != SchemaKind::Object {
        if items_kind == SchemaKind::Array {
            return Err(DerivationError::SchemaCorruption(format!(
                "Array schema items must be type object at {}",
                json_path.canonical()
            )));
        }

        // Scalar arrays are tables too, and only descriptor value arrays
        // have a column contract for that shape.
        if context.try_descriptor_path(&array_element_path).is_none() {
            return Err(DerivationError::SchemaCorruption(format!(
                "Array schema items must be type object at {}",
                json_path.canonical()
            )));
        }
    }

    validate_schema(
        items_schema,
        &items_schema_path,
        false,
        &array_element_path,
        context,
        scalar_paths,
        array_paths,
    )
}

fn reject_unsupported_keywords(schema: &Map<String, Value>, schema_path: &str) -> Result<()> {
    for keyword in UNSUPPORTED_KEYWORDS {
        if schema.contains_key(keyword) {
            return Err(DerivationError::SchemaCorruption(format!(
                "Unsupported JSON schema keyword '{keyword}' at {schema_path}"
            )));
        }
    }

    Ok(())
}

fn validate_identity_paths(
    context: &RelationalModelBuilderContext,
    scalar_paths: &BTreeSet<String>,
) -> Result<()> {
    let mut missing: Vec<&str> = context
        .identity_json_paths
        .iter()
        .map(|path| path.canonical())
        .filter(|canonical| !scalar_paths.contains(*canonical))
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    missing.sort();

    Err(DerivationError::SchemaCorruption(format!(
        "identityJsonPaths were not found in the JSON schema for resource '{}:{}': {}",
        context.require_project_name()?,
        context.require_resource_name()?,
        missing.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::context::DescriptorPathSource;
    use serde_json::json;
    use std::sync::Arc;

    fn context_with_schema(schema: Value) -> RelationalModelBuilderContext {
        let mut context = RelationalModelBuilderContext::new(
            Arc::new(json!({})),
            "schools",
            DescriptorPathSource::Precomputed,
            Default::default(),
        );
        context.project_name = Some("Ed-Fi".to_string());
        context.resource_name = Some("School".to_string());
        context.json_schema_for_insert = Some(schema);
        context
    }

    #[test]
    fn accepts_a_constrained_object_schema() {
        let mut context = context_with_schema(json!({
            "type": "object",
            "properties": {
                "schoolId": { "type": "integer" },
                "addresses": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": { "city": { "type": "string" } }
                    }
                }
            }
        }));

        assert!(ValidateJsonSchemaStep.execute(&mut context).is_ok());
    }

    #[test]
    fn rejects_a_non_object_root() {
        let mut context = context_with_schema(json!({ "type": "array", "items": {} }));
        assert!(ValidateJsonSchemaStep.execute(&mut context).is_err());
    }

    #[test]
    fn rejects_unsupported_keywords_with_the_schema_path() {
        let mut context = context_with_schema(json!({
            "type": "object",
            "properties": {
                "level": { "type": "string", "enum": ["low", "high"] }
            }
        }));

        let message = ValidateJsonSchemaStep.execute(&mut context).unwrap_err().to_string();
        assert!(message.contains("'enum'"));
        assert!(message.contains("$.properties.level"));
    }

    #[test]
    fn rejects_scalar_array_items_without_a_descriptor_contract() {
        let mut context = context_with_schema(json!({
            "type": "object",
            "properties": {
                "tags": { "type": "array", "items": { "type": "string" } }
            }
        }));

        let message = ValidateJsonSchemaStep.execute(&mut context).unwrap_err().to_string();
        assert!(message.contains("must be type object at $.tags"));
    }

    #[test]
    fn identity_paths_must_resolve_to_scalars() {
        let mut context = context_with_schema(json!({
            "type": "object",
            "properties": { "schoolId": { "type": "integer" } }
        }));
        context.identity_json_paths =
            vec![JsonPathExpression::compile("$.missingId").unwrap()];

        let message = ValidateJsonSchemaStep.execute(&mut context).unwrap_err().to_string();
        assert!(message.contains("$.missingId"));
    }
}

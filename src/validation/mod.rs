//! Contract validation for shared-storage resources
//!
//! Descriptor resources must satisfy the fixed descriptor contract before
//! their storage kind is rewritten to the shared descriptor table. Validation
//! failures are collected and reported together rather than one at a time.

use serde_json::{Map, Value};

use crate::error::{DerivationError, Result};
use crate::models::{QualifiedResourceName, DESCRIPTOR_NAME_SUFFIX};
use crate::schema;

const REQUIRED_CONTRACT_PROPERTIES: [&str; 2] = ["namespace", "codeValue"];
const OPTIONAL_STRING_CONTRACT_PROPERTIES: [&str; 2] = ["shortDescription", "description"];
const OPTIONAL_DATE_CONTRACT_PROPERTIES: [&str; 2] = ["effectiveBeginDate", "effectiveEndDate"];

/// Checks the descriptor naming convention: resource names must end in
/// `Descriptor` before the shared-table storage kind may apply
pub fn validate_descriptor_naming(resource: &QualifiedResourceName) -> Result<()> {
    if resource.resource_name.ends_with(DESCRIPTOR_NAME_SUFFIX) {
        return Ok(());
    }

    Err(DerivationError::ContractViolation(format!(
        "Resource '{resource}' uses shared descriptor storage but its name does not end in '{DESCRIPTOR_NAME_SUFFIX}'"
    )))
}

/// Validates a descriptor resource schema against the fixed descriptor
/// contract, aggregating every violation into one error
pub fn validate_descriptor_contract(
    resource_schema: &Map<String, Value>,
    resource: &QualifiedResourceName,
) -> Result<()> {
    let mut messages = Vec::new();

    let insert_schema = match schema::require_object(
        resource_schema.get("jsonSchemaForInsert"),
        "resourceSchema.jsonSchemaForInsert",
    ) {
        Ok(insert_schema) => insert_schema,
        Err(error) => {
            return Err(DerivationError::ContractViolation(format!(
                "Descriptor resource '{resource}' failed contract validation: {error}"
            )))
        }
    };

    let properties = match insert_schema.get("properties") {
        Some(Value::Object(properties)) => Some(properties),
        Some(_) => {
            messages.push("jsonSchemaForInsert.properties must be an object".to_string());
            None
        }
        None => {
            messages.push("jsonSchemaForInsert.properties is missing".to_string());
            None
        }
    };

    if let Some(properties) = properties {
        for property_name in REQUIRED_CONTRACT_PROPERTIES {
            match property_schema_type(properties, property_name) {
                Some("string") => {}
                Some(other) => messages.push(format!(
                    "contract property '{property_name}' must be a string schema, found type '{other}'"
                )),
                None => messages.push(format!("contract property '{property_name}' is missing")),
            }
        }

        for property_name in OPTIONAL_STRING_CONTRACT_PROPERTIES {
            if let Some(other) = non_string_property_type(properties, property_name) {
                messages.push(format!(
                    "contract property '{property_name}' must be a string schema, found type '{other}'"
                ));
            }
        }

        for property_name in OPTIONAL_DATE_CONTRACT_PROPERTIES {
            if let Some(Value::Object(property)) = properties.get(property_name) {
                let format = property.get("format").and_then(Value::as_str);
                if format != Some("date") {
                    messages.push(format!(
                        "contract property '{property_name}' must declare format 'date'"
                    ));
                }
            }
        }
    }

    if messages.is_empty() {
        return Ok(());
    }

    Err(DerivationError::ContractViolation(format!(
        "Descriptor resource '{resource}' failed contract validation: {}",
        messages.join("; ")
    )))
}

fn property_schema_type<'a>(
    properties: &'a Map<String, Value>,
    property_name: &str,
) -> Option<&'a str> {
    match properties.get(property_name) {
        Some(Value::Object(property)) => property.get("type").and_then(Value::as_str).or(Some("")),
        _ => None,
    }
}

fn non_string_property_type<'a>(
    properties: &'a Map<String, Value>,
    property_name: &str,
) -> Option<&'a str> {
    match property_schema_type(properties, property_name) {
        Some("string") | None => None,
        Some(other) => Some(other),
    }
}

//! Resource schema accessors
//!
//! Readers for the per-resource input contract: the required extension flag,
//! the optional resource-name override, identity paths, decimal validation
//! metadata, name overrides, and the document paths mapping that drives
//! descriptor and reference binding.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::{optional_bool, optional_string, require_array, require_bool, require_object, require_string};
use crate::error::{DerivationError, Result};
use crate::models::QualifiedResourceName;
use crate::naming;
use crate::paths::JsonPathExpression;

/// Descriptor reference information for one canonical JSONPath
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorPathInfo {
    /// The JSONPath of the descriptor value in the document
    pub descriptor_value_path: JsonPathExpression,
    /// The descriptor resource expected at this path
    pub descriptor_resource: QualifiedResourceName,
}

/// Decimal precision metadata declared for a scalar path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalValidationInfo {
    pub path: JsonPathExpression,
    pub total_digits: Option<u8>,
    pub decimal_places: Option<u8>,
}

/// One identity-part pair under a document reference mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceJsonPathPair {
    /// Identity path on the target resource
    pub identity_json_path: JsonPathExpression,
    /// Path of the projected identity value in the referencing document
    pub reference_json_path: JsonPathExpression,
}

/// A document reference declared by the resource's paths mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReferenceMapping {
    pub is_part_of_identity: bool,
    pub is_required: bool,
    /// The JSONPath of the reference object in the document
    pub reference_object_path: JsonPathExpression,
    pub target_resource: QualifiedResourceName,
    pub reference_json_paths: Vec<ReferenceJsonPathPair>,
}

/// Resolves the logical resource name: an explicit `resourceName` override
/// when present, otherwise the singularized PascalCase endpoint name
pub fn resource_name(resource_key: &str, resource_schema: &Map<String, Value>) -> Result<String> {
    if let Some(name) = optional_string(resource_schema, "resourceName", resource_key)? {
        if name.trim().is_empty() {
            return Err(DerivationError::SchemaCorruption(format!(
                "Expected {resource_key}.resourceName to be non-empty, invalid schema document"
            )));
        }
        return Ok(name.to_string());
    }

    Ok(naming::to_collection_base_name(resource_key))
}

/// Reads the required `isResourceExtension` flag
///
/// Absence or a wrong type is fatal schema corruption: the flag decides
/// whether a resource is modeled independently at all.
pub fn is_resource_extension(
    resource_schema: &Map<String, Value>,
    resource_label: &str,
) -> Result<bool> {
    require_bool(resource_schema, "isResourceExtension", resource_label)
}

/// Reads the required `isDescriptor` flag
pub fn is_descriptor(resource_schema: &Map<String, Value>, resource_label: &str) -> Result<bool> {
    require_bool(resource_schema, "isDescriptor", resource_label)
}

/// Compiles the resource's `identityJsonPaths` entries
pub fn identity_json_paths(
    resource_schema: &Map<String, Value>,
    resource_label: &str,
) -> Result<Vec<JsonPathExpression>> {
    let raw_paths = require_array(resource_schema, "identityJsonPaths", resource_label)?;
    let mut compiled = Vec::with_capacity(raw_paths.len());

    for raw_path in raw_paths {
        let Value::String(path) = raw_path else {
            return Err(DerivationError::SchemaCorruption(format!(
                "Expected {resource_label}.identityJsonPaths entries to be strings, invalid schema document"
            )));
        };
        compiled.push(JsonPathExpression::compile(path)?);
    }

    Ok(compiled)
}

/// Extracts decimal validation metadata keyed by canonical path
pub fn decimal_validation_infos(
    resource_schema: &Map<String, Value>,
    resource_label: &str,
) -> Result<BTreeMap<String, DecimalValidationInfo>> {
    let mut infos = BTreeMap::new();

    let Some(raw_infos) = resource_schema.get("decimalPropertyValidationInfos") else {
        return Ok(infos);
    };

    let Value::Array(raw_infos) = raw_infos else {
        return Err(DerivationError::SchemaCorruption(format!(
            "Expected {resource_label}.decimalPropertyValidationInfos to be an array, invalid schema document"
        )));
    };

    for raw_info in raw_infos {
        let info = require_object(Some(raw_info), "decimalPropertyValidationInfos entry")?;
        let path = JsonPathExpression::compile(require_string(info, "path", resource_label)?)?;
        let total_digits = read_optional_u8(info, "totalDigits", resource_label)?;
        let decimal_places = read_optional_u8(info, "decimalPlaces", resource_label)?;

        let canonical = path.canonical().to_string();
        let previous = infos.insert(
            canonical.clone(),
            DecimalValidationInfo {
                path,
                total_digits,
                decimal_places,
            },
        );

        if previous.is_some() {
            return Err(DerivationError::SchemaCorruption(format!(
                "Decimal validation info for '{canonical}' is defined more than once on {resource_label}"
            )));
        }
    }

    Ok(infos)
}

/// Extracts column name overrides keyed by canonical source path
pub fn relational_name_overrides(
    resource_schema: &Map<String, Value>,
    resource_label: &str,
) -> Result<BTreeMap<String, String>> {
    let mut overrides = BTreeMap::new();

    let Some(raw_overrides) = resource_schema.get("relationalNameOverrides") else {
        return Ok(overrides);
    };

    let Value::Object(raw_overrides) = raw_overrides else {
        return Err(DerivationError::SchemaCorruption(format!(
            "Expected {resource_label}.relationalNameOverrides to be an object, invalid schema document"
        )));
    };

    for (raw_path, raw_name) in raw_overrides {
        let Value::String(name) = raw_name else {
            return Err(DerivationError::SchemaCorruption(format!(
                "Expected {resource_label}.relationalNameOverrides['{raw_path}'] to be a string, invalid schema document"
            )));
        };

        let canonical = JsonPathExpression::compile(raw_path)?.canonical().to_string();
        overrides.insert(canonical, name.clone());
    }

    Ok(overrides)
}

/// Extracts descriptor path information from the resource's paths mapping
///
/// Entries flagged as descriptor references map a descriptor value path to
/// the descriptor resource expected at that path.
pub fn descriptor_path_entries(
    resource_schema: &Map<String, Value>,
    resource_label: &str,
) -> Result<Vec<(String, DescriptorPathInfo)>> {
    let mut entries = Vec::new();

    for (mapping_key, mapping) in document_paths_mapping(resource_schema, resource_label)? {
        let mapping_label = format!("{resource_label}.documentPathsMapping['{mapping_key}']");

        if !require_bool(mapping, "isReference", &mapping_label)? {
            continue;
        }

        if !optional_bool(mapping, "isDescriptor", &mapping_label)?.unwrap_or(false) {
            continue;
        }

        let path = JsonPathExpression::compile(require_string(mapping, "path", &mapping_label)?)?;
        let descriptor_resource = QualifiedResourceName::new(
            require_string(mapping, "projectName", &mapping_label)?,
            require_string(mapping, "resourceName", &mapping_label)?,
        );

        entries.push((
            path.canonical().to_string(),
            DescriptorPathInfo {
                descriptor_value_path: path,
                descriptor_resource,
            },
        ));
    }

    Ok(entries)
}

/// Extracts document reference mappings (non-descriptor references)
pub fn document_reference_mappings(
    resource_schema: &Map<String, Value>,
    resource_label: &str,
) -> Result<Vec<DocumentReferenceMapping>> {
    let mut mappings = Vec::new();

    for (mapping_key, mapping) in document_paths_mapping(resource_schema, resource_label)? {
        let mapping_label = format!("{resource_label}.documentPathsMapping['{mapping_key}']");

        if !require_bool(mapping, "isReference", &mapping_label)? {
            continue;
        }

        if optional_bool(mapping, "isDescriptor", &mapping_label)?.unwrap_or(false) {
            continue;
        }

        let target_resource = QualifiedResourceName::new(
            require_string(mapping, "projectName", &mapping_label)?,
            require_string(mapping, "resourceName", &mapping_label)?,
        );
        let is_required = optional_bool(mapping, "isRequired", &mapping_label)?.unwrap_or(false);
        let is_part_of_identity =
            optional_bool(mapping, "isPartOfIdentity", &mapping_label)?.unwrap_or(false);

        let raw_pairs = require_array(mapping, "referenceJsonPaths", &mapping_label)?;
        if raw_pairs.is_empty() {
            return Err(DerivationError::SchemaCorruption(format!(
                "Expected {mapping_label}.referenceJsonPaths to be non-empty, invalid schema document"
            )));
        }

        let mut pairs = Vec::with_capacity(raw_pairs.len());
        for raw_pair in raw_pairs {
            let pair = require_object(Some(raw_pair), "referenceJsonPaths entry")?;
            pairs.push(ReferenceJsonPathPair {
                identity_json_path: JsonPathExpression::compile(require_string(
                    pair,
                    "identityJsonPath",
                    &mapping_label,
                )?)?,
                reference_json_path: JsonPathExpression::compile(require_string(
                    pair,
                    "referenceJsonPath",
                    &mapping_label,
                )?)?,
            });
        }

        let reference_object_path = pairs[0]
            .reference_json_path
            .parent()
            .ok_or_else(|| {
                DerivationError::SchemaCorruption(format!(
                    "Reference path '{}' in {mapping_label} has no parent reference object",
                    pairs[0].reference_json_path
                ))
            })?;

        for pair in &pairs {
            if !pair.reference_json_path.starts_with(&reference_object_path) {
                return Err(DerivationError::SchemaCorruption(format!(
                    "Reference path '{}' in {mapping_label} does not share the reference object path '{}'",
                    pair.reference_json_path, reference_object_path
                )));
            }
        }

        mappings.push(DocumentReferenceMapping {
            is_part_of_identity,
            is_required,
            reference_object_path,
            target_resource,
            reference_json_paths: pairs,
        });
    }

    Ok(mappings)
}

/// Enumerates `documentPathsMapping` entries in ordinal key order
fn document_paths_mapping<'a>(
    resource_schema: &'a Map<String, Value>,
    resource_label: &str,
) -> Result<Vec<(&'a String, &'a Map<String, Value>)>> {
    let Some(raw_mapping) = resource_schema.get("documentPathsMapping") else {
        return Ok(Vec::new());
    };

    let Value::Object(raw_mapping) = raw_mapping else {
        return Err(DerivationError::SchemaCorruption(format!(
            "Expected {resource_label}.documentPathsMapping to be an object, invalid schema document"
        )));
    };

    let mut entries = Vec::with_capacity(raw_mapping.len());
    for (key, value) in raw_mapping {
        let Value::Object(mapping) = value else {
            return Err(DerivationError::SchemaCorruption(format!(
                "Expected {resource_label}.documentPathsMapping['{key}'] to be an object, invalid schema document"
            )));
        };
        entries.push((key, mapping));
    }

    entries.sort_by(|a, b| a.0.cmp(b.0));

    Ok(entries)
}

fn read_optional_u8(
    object: &Map<String, Value>,
    property_name: &str,
    context_path: &str,
) -> Result<Option<u8>> {
    match super::optional_u32(object, property_name, context_path)? {
        Some(value) if value <= u32::from(u8::MAX) => Ok(Some(value as u8)),
        Some(_) => Err(DerivationError::SchemaCorruption(format!(
            "Expected {context_path}.{property_name} to fit decimal precision bounds, invalid schema document"
        ))),
        None => Ok(None),
    }
}

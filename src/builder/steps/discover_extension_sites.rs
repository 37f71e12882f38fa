//! Extension-site discovery step

use serde_json::{Map, Value};

use crate::builder::context::RelationalModelBuilderContext;
use crate::builder::RelationalModelBuilderStep;
use crate::error::{DerivationError, Result};
use crate::models::ExtensionSite;
use crate::paths::{JsonPathExpression, EXTENSION_PROPERTY_NAME};
use crate::schema::{determine_schema_kind, SchemaKind};

/// Discovers `_ext` extension sites in the insert schema
///
/// Each `_ext` object found under a table scope registers an extension site
/// carrying the owning scope, the extension path, and the extension project
/// keys declared beneath it.
pub struct DiscoverExtensionSitesStep;

impl RelationalModelBuilderStep for DiscoverExtensionSitesStep {
    fn name(&self) -> &'static str {
        "discover-extension-sites"
    }

    fn execute(&self, context: &mut RelationalModelBuilderContext) -> Result<()> {
        let json_schema_for_insert = context.require_json_schema_for_insert()?.clone();

        let Value::Object(root_schema) = &json_schema_for_insert else {
            return Err(DerivationError::SchemaCorruption(
                "Expected JSON schema root to be an object at $".to_string(),
            ));
        };

        let mut extension_sites = Vec::new();

        discover(
            root_schema,
            &JsonPathExpression::root(),
            &JsonPathExpression::root(),
            &mut extension_sites,
        )?;

        context.extension_sites = extension_sites;

        Ok(())
    }
}

fn discover(
    schema: &Map<String, Value>,
    json_path: &JsonPathExpression,
    owning_scope: &JsonPathExpression,
    extension_sites: &mut Vec<ExtensionSite>,
) -> Result<()> {
    match determine_schema_kind(schema, json_path.canonical(), false)? {
        SchemaKind::Object => {
            let Some(properties) = schema.get("properties") else {
                return Ok(());
            };

            let Value::Object(properties) = properties else {
                return Err(DerivationError::SchemaCorruption(format!(
                    "Expected properties to be an object at {}",
                    json_path.canonical()
                )));
            };

            let mut property_names: Vec<&String> = properties.keys().collect();
            property_names.sort();

            for property_name in property_names {
                let Some(Value::Object(property_schema)) = properties.get(property_name) else {
                    return Err(DerivationError::SchemaCorruption(format!(
                        "Expected property schema to be an object at {}.{property_name}",
                        json_path.canonical()
                    )));
                };

                let property_path = json_path.append_property(property_name.clone())?;

                if property_name == EXTENSION_PROPERTY_NAME {
                    extension_sites.push(build_extension_site(
                        property_schema,
                        owning_scope,
                        &property_path,
                    )?);
                    continue;
                }

                discover(property_schema, &property_path, owning_scope, extension_sites)?;
            }

            Ok(())
        }
        SchemaKind::Array => {
            let Some(Value::Object(items_schema)) = schema.get("items") else {
                return Err(DerivationError::SchemaCorruption(format!(
                    "Array schema items must be an object at {}",
                    json_path.canonical()
                )));
            };

            let array_scope = json_path.append_any_array_element()?;

            // An array element starts a new table scope; extension objects
            // beneath it belong to that scope.
            discover(items_schema, &array_scope, &array_scope, extension_sites)
        }
        SchemaKind::Scalar => Ok(()),
    }
}

fn build_extension_site(
    extension_schema: &Map<String, Value>,
    owning_scope: &JsonPathExpression,
    extension_path: &JsonPathExpression,
) -> Result<ExtensionSite> {
    let Some(properties) = extension_schema.get("properties") else {
        return Ok(ExtensionSite {
            owning_scope: owning_scope.clone(),
            extension_path: extension_path.clone(),
            project_keys: Vec::new(),
        });
    };

    let Value::Object(properties) = properties else {
        return Err(DerivationError::SchemaCorruption(format!(
            "Expected extension properties to be an object at {}",
            extension_path.canonical()
        )));
    };

    let mut project_keys = Vec::with_capacity(properties.len());
    for (project_key, project_schema) in properties {
        if project_key.trim().is_empty() {
            return Err(DerivationError::SchemaCorruption(format!(
                "Extension project keys must be non-empty at {}",
                extension_path.canonical()
            )));
        }

        if !matches!(project_schema, Value::Object(_)) {
            return Err(DerivationError::SchemaCorruption(format!(
                "Expected extension project schema to be an object at {}.{project_key}",
                extension_path.canonical()
            )));
        }

        project_keys.push(project_key.clone());
    }

    project_keys.sort();

    Ok(ExtensionSite {
        owning_scope: owning_scope.clone(),
        extension_path: extension_path.clone(),
        project_keys,
    })
}

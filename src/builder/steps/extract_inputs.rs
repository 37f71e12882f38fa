//! Input extraction step

use std::collections::BTreeMap;

use crate::builder::context::{DescriptorPathSource, RelationalModelBuilderContext};
use crate::builder::RelationalModelBuilderStep;
use crate::error::{DerivationError, Result};
use crate::schema::resources::{self, DescriptorPathInfo};
use crate::schema::{require_object, require_string};

/// Extracts the schema inputs required to build a relational resource model
/// and populates the context with normalized values and precompiled paths
pub struct ExtractInputsStep;

impl RelationalModelBuilderStep for ExtractInputsStep {
    fn name(&self) -> &'static str {
        "extract-inputs"
    }

    fn execute(&self, context: &mut RelationalModelBuilderContext) -> Result<()> {
        let api_schema_root = context.api_schema_root.clone();
        let project_schema = require_object(api_schema_root.get("projectSchema"), "projectSchema")?;

        let project_name = require_string(project_schema, "projectName", "projectSchema")?;
        let project_endpoint_name =
            require_string(project_schema, "projectEndpointName", "projectSchema")?;
        let project_version = require_string(project_schema, "projectVersion", "projectSchema")?;

        if context.resource_endpoint_name.trim().is_empty() {
            return Err(DerivationError::InvariantViolation(
                "Resource endpoint name must be provided".to_string(),
            ));
        }

        let resource_schemas = require_object(
            project_schema.get("resourceSchemas"),
            "projectSchema.resourceSchemas",
        )?;

        let resource_schema = require_object(
            resource_schemas.get(&context.resource_endpoint_name),
            &format!(
                "projectSchema.resourceSchemas['{}']",
                context.resource_endpoint_name
            ),
        )?;

        let resource_name = resources::resource_name(&context.resource_endpoint_name, resource_schema)?;
        let resource_label = format!("{project_name}:{resource_name}");

        let is_descriptor = resources::is_descriptor(resource_schema, &resource_label)?;

        let json_schema_for_insert = resource_schema.get("jsonSchemaForInsert").ok_or_else(|| {
            DerivationError::SchemaCorruption(format!(
                "Expected {resource_label}.jsonSchemaForInsert to be present, invalid schema document"
            ))
        })?;

        let identity_json_paths = resources::identity_json_paths(resource_schema, &resource_label)?;
        let decimal_validation_infos =
            resources::decimal_validation_infos(resource_schema, &resource_label)?;
        let document_reference_mappings =
            resources::document_reference_mappings(resource_schema, &resource_label)?;
        let name_overrides = resources::relational_name_overrides(resource_schema, &resource_label)?;

        let descriptor_paths = match context.descriptor_path_source {
            DescriptorPathSource::Precomputed => context.descriptor_paths_by_json_path.clone(),
            DescriptorPathSource::ComputedInline => {
                let mut computed: BTreeMap<String, DescriptorPathInfo> = BTreeMap::new();
                for (canonical, info) in
                    resources::descriptor_path_entries(resource_schema, &resource_label)?
                {
                    computed.insert(canonical, info);
                }
                computed
            }
        };

        context.project_name = Some(project_name.to_string());
        context.project_endpoint_name = Some(project_endpoint_name.to_string());
        context.project_version = Some(project_version.to_string());
        context.resource_name = Some(resource_name);
        context.is_descriptor_resource = Some(is_descriptor);
        context.json_schema_for_insert = Some(json_schema_for_insert.clone());
        context.identity_json_paths = identity_json_paths;
        context.decimal_validation_infos = decimal_validation_infos;
        context.document_reference_mappings = document_reference_mappings;
        context.name_overrides = name_overrides;
        context.descriptor_paths_by_json_path = descriptor_paths;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::paths::JsonPathExpression;

    fn api_schema_root() -> Arc<serde_json::Value> {
        Arc::new(json!({
            "projectSchema": {
                "projectName": "Ed-Fi",
                "projectEndpointName": "ed-fi",
                "projectVersion": "5.0.0",
                "resourceSchemas": {
                    "schools": {
                        "resourceName": "School",
                        "isDescriptor": false,
                        "identityJsonPaths": ["$.schoolId"],
                        "documentPathsMapping": {
                            "GradeLevelDescriptor": {
                                "isReference": true,
                                "isDescriptor": true,
                                "projectName": "Ed-Fi",
                                "resourceName": "GradeLevelDescriptor",
                                "path": "$.gradeLevelDescriptor"
                            }
                        },
                        "jsonSchemaForInsert": {
                            "type": "object",
                            "properties": {
                                "schoolId": { "type": "integer", "format": "int64" },
                                "gradeLevelDescriptor": { "type": "string" }
                            }
                        }
                    }
                }
            }
        }))
    }

    #[test]
    fn extracts_project_and_resource_metadata() {
        let mut context = RelationalModelBuilderContext::new(
            api_schema_root(),
            "schools",
            DescriptorPathSource::Precomputed,
            Default::default(),
        );

        ExtractInputsStep.execute(&mut context).unwrap();

        assert_eq!(context.project_name.as_deref(), Some("Ed-Fi"));
        assert_eq!(context.resource_name.as_deref(), Some("School"));
        assert_eq!(context.is_descriptor_resource, Some(false));
        assert_eq!(context.identity_json_paths.len(), 1);
        // Precomputed descriptor paths are left untouched.
        assert!(context.descriptor_paths_by_json_path.is_empty());
    }

    #[test]
    fn computes_descriptor_paths_inline_when_requested() {
        let mut context = RelationalModelBuilderContext::new(
            api_schema_root(),
            "schools",
            DescriptorPathSource::ComputedInline,
            Default::default(),
        );

        ExtractInputsStep.execute(&mut context).unwrap();

        let path = JsonPathExpression::compile("$.gradeLevelDescriptor").unwrap();
        let info = context.try_descriptor_path(&path).expect("inline descriptor path");
        assert_eq!(info.descriptor_resource.resource_name, "GradeLevelDescriptor");
    }

    #[test]
    fn unknown_resource_endpoints_are_rejected() {
        let mut context = RelationalModelBuilderContext::new(
            api_schema_root(),
            "sections",
            DescriptorPathSource::Precomputed,
            Default::default(),
        );

        let error = ExtractInputsStep.execute(&mut context).unwrap_err();
        assert!(error.to_string().contains("resourceSchemas['sections']"));
    }
}

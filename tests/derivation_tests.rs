//! End-to-end derivation tests

use anyhow::Result;
use relational_modelling_sdk::{
    derive_relational_model_set, ColumnKind, DerivationError, DerivedRelationalModelSet,
    DiscriminatorStrategy, ResourceStorageKind, TableConstraint,
};
use serde_json::{json, Value};

fn core_project() -> Value {
    json!({
        "projectSchema": {
            "projectName": "Ed-Fi",
            "projectEndpointName": "ed-fi",
            "projectVersion": "5.0.0",
            "isExtensionProject": false,
            "resourceSchemas": {
                "schools": {
                    "resourceName": "School",
                    "isDescriptor": false,
                    "isResourceExtension": false,
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
                        "required": ["schoolId", "nameOfInstitution", "gradeLevelDescriptor"],
                        "properties": {
                            "schoolId": { "type": "integer", "format": "int64" },
                            "nameOfInstitution": { "type": "string", "maxLength": 75 },
                            "gradeLevelDescriptor": { "type": "string", "maxLength": 306 },
                            "addresses": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "required": ["city"],
                                    "properties": {
                                        "city": { "type": "string", "maxLength": 30 },
                                        "periods": {
                                            "type": "array",
                                            "items": {
                                                "type": "object",
                                                "properties": {
                                                    "beginDate": { "type": "string", "format": "date" }
                                                }
                                            }
                                        }
                                    }
                                }
                            },
                            "_ext": {
                                "type": "object",
                                "properties": {
                                    "sample": { "type": "object", "properties": {} }
                                }
                            }
                        }
                    }
                },
                "sessions": {
                    "resourceName": "Session",
                    "isDescriptor": false,
                    "isResourceExtension": false,
                    "identityJsonPaths": ["$.sessionName", "$.schoolReference.schoolId"],
                    "documentPathsMapping": {
                        "School": {
                            "isReference": true,
                            "projectName": "Ed-Fi",
                            "resourceName": "School",
                            "isRequired": true,
                            "isPartOfIdentity": true,
                            "referenceJsonPaths": [
                                {
                                    "identityJsonPath": "$.schoolId",
                                    "referenceJsonPath": "$.schoolReference.schoolId"
                                }
                            ]
                        }
                    },
                    "jsonSchemaForInsert": {
                        "type": "object",
                        "required": ["sessionName", "schoolReference"],
                        "properties": {
                            "sessionName": { "type": "string", "maxLength": 60 },
                            "schoolReference": {
                                "type": "object",
                                "required": ["schoolId"],
                                "properties": {
                                    "schoolId": { "type": "integer", "format": "int64" }
                                }
                            }
                        }
                    }
                },
                "gradeLevelDescriptors": {
                    "resourceName": "GradeLevelDescriptor",
                    "isDescriptor": true,
                    "isResourceExtension": false,
                    "identityJsonPaths": ["$.namespace", "$.codeValue"],
                    "jsonSchemaForInsert": descriptor_insert_schema()
                },
                "contactDescriptors": {
                    "resourceName": "ContactDescriptor",
                    "isDescriptor": true,
                    "isResourceExtension": false,
                    "identityJsonPaths": ["$.namespace", "$.codeValue"],
                    "jsonSchemaForInsert": descriptor_insert_schema()
                }
            }
        }
    })
}

fn descriptor_insert_schema() -> Value {
    json!({
        "type": "object",
        "required": ["namespace", "codeValue", "shortDescription"],
        "properties": {
            "namespace": { "type": "string", "maxLength": 255 },
            "codeValue": { "type": "string", "maxLength": 50 },
            "shortDescription": { "type": "string", "maxLength": 75 },
            "description": { "type": "string", "maxLength": 1024 },
            "effectiveBeginDate": { "type": "string", "format": "date" },
            "effectiveEndDate": { "type": "string", "format": "date" }
        }
    })
}

fn extension_project() -> Value {
    json!({
        "projectSchema": {
            "projectName": "Sample",
            "projectEndpointName": "sample",
            "projectVersion": "1.0.0",
            "isExtensionProject": true,
            "resourceSchemas": {
                "schools": {
                    "resourceName": "School",
                    "isDescriptor": false,
                    "isResourceExtension": true,
                    "identityJsonPaths": [],
                    "jsonSchemaForInsert": { "type": "object", "properties": {} }
                }
            }
        }
    })
}

fn derive_standard_set() -> Result<DerivedRelationalModelSet> {
    Ok(derive_relational_model_set(vec![core_project(), extension_project()])?)
}

mod determinism_tests {
    use super::*;

    #[test]
    fn shuffled_input_order_produces_byte_identical_output() -> Result<()> {
        let forward = derive_relational_model_set(vec![core_project(), extension_project()])?;
        let reversed = derive_relational_model_set(vec![extension_project(), core_project()])?;

        assert_eq!(serde_json::to_string(&forward)?, serde_json::to_string(&reversed)?);
        Ok(())
    }

    #[test]
    fn repeated_runs_are_idempotent() -> Result<()> {
        let first = derive_standard_set()?;
        let second = derive_standard_set()?;

        assert_eq!(first, second);
        Ok(())
    }
}

mod model_shape_tests {
    use super::*;

    #[test]
    fn every_model_has_exactly_one_root_scoped_table() -> Result<()> {
        let set = derive_standard_set()?;

        for model in &set.concrete_resources_in_name_order {
            let roots: Vec<_> = model
                .relational_model
                .tables_in_read_dependency_order
                .iter()
                .filter(|table| table.json_scope.is_root())
                .collect();

            assert_eq!(roots.len(), 1, "resource {}", model.resource);
            assert_eq!(model.relational_model.root.table, roots[0].table);
        }

        Ok(())
    }

    #[test]
    fn collection_tables_follow_the_root_plus_ordinals_convention() -> Result<()> {
        let set = derive_standard_set()?;
        let school = find_model(&set, "School");

        let tables: Vec<&str> = school
            .relational_model
            .tables_in_read_dependency_order
            .iter()
            .map(|table| table.table.name.as_str())
            .collect();

        assert_eq!(
            tables,
            vec!["School", "SchoolExt", "SchoolAddress", "SchoolAddressPeriod"]
        );

        let periods = &school.relational_model.tables_in_read_dependency_order[3];
        let key: Vec<&str> = periods
            .key
            .columns
            .iter()
            .map(|key_column| key_column.column_name.as_str())
            .collect();
        assert_eq!(key, vec!["School_DocumentId", "AddressOrdinal", "Ordinal"]);

        Ok(())
    }

    #[test]
    fn root_identity_unique_constraint_covers_identity_columns() -> Result<()> {
        let set = derive_standard_set()?;
        let school = find_model(&set, "School");

        let unique = school
            .relational_model
            .root
            .constraints
            .iter()
            .find_map(|constraint| match constraint {
                TableConstraint::Unique { columns, .. } => Some(columns),
                _ => None,
            })
            .expect("root natural key present");

        let names: Vec<&str> = unique.iter().map(|column| column.as_str()).collect();
        assert_eq!(names, vec!["SchoolId"]);

        Ok(())
    }

    fn find_model<'a>(
        set: &'a DerivedRelationalModelSet,
        resource_name: &str,
    ) -> &'a relational_modelling_sdk::ConcreteResourceModel {
        set.concrete_resources_in_name_order
            .iter()
            .find(|model| model.resource.resource_name == resource_name)
            .unwrap_or_else(|| panic!("model {resource_name} not derived"))
    }
}

mod extension_tests {
    use super::*;

    #[test]
    fn extension_resources_are_never_modeled_independently() -> Result<()> {
        let set = derive_standard_set()?;

        assert!(set
            .concrete_resources_in_name_order
            .iter()
            .all(|model| model.resource.project_name != "Sample"));

        Ok(())
    }

    #[test]
    fn extension_sites_register_under_the_base_resource() -> Result<()> {
        let set = derive_standard_set()?;

        let (_, sites) = set
            .extension_sites_by_resource
            .iter()
            .find(|(resource, _)| resource.resource_name == "School")
            .expect("extension sites for School");

        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].owning_scope.canonical(), "$");
        assert_eq!(sites[0].extension_path.canonical(), "$._ext");
        assert_eq!(sites[0].project_keys, vec!["sample"]);

        Ok(())
    }

    #[test]
    fn extension_tables_live_in_the_extension_project_schema() -> Result<()> {
        let set = derive_standard_set()?;
        let school = set
            .concrete_resources_in_name_order
            .iter()
            .find(|model| model.resource.resource_name == "School")
            .unwrap();

        let extension_table = school
            .relational_model
            .tables_in_read_dependency_order
            .iter()
            .find(|table| table.table.name == "SchoolExt")
            .expect("extension table derived");

        assert_eq!(extension_table.table.schema.as_str(), "sample");
        assert_eq!(extension_table.json_scope.canonical(), "$._ext.sample");

        match &extension_table.constraints[0] {
            TableConstraint::ForeignKey { target_table, .. } => {
                assert_eq!(target_table.to_string(), "edfi.School");
            }
            other => panic!("expected a foreign key, found {other:?}"),
        }

        Ok(())
    }

    #[test]
    fn unknown_extension_project_keys_are_rejected() {
        let error = derive_relational_model_set(vec![core_project()]).unwrap_err();
        assert!(matches!(error, DerivationError::SchemaCorruption(_)));
        assert!(error.to_string().contains("'sample'"));
    }
}

mod descriptor_tests {
    use super::*;

    #[test]
    fn descriptor_resources_map_to_shared_storage_with_the_fixed_contract() -> Result<()> {
        let set = derive_standard_set()?;

        let contact = set
            .concrete_resources_in_name_order
            .iter()
            .find(|model| model.resource.resource_name == "ContactDescriptor")
            .expect("ContactDescriptor derived");

        assert_eq!(contact.storage_kind, ResourceStorageKind::SharedDescriptorTable);
        assert_eq!(contact.relational_model.root.table.to_string(), "dms.Descriptor");

        let metadata = contact.descriptor_metadata.as_ref().expect("descriptor metadata");
        assert_eq!(metadata.column_contract.namespace.as_str(), "Namespace");
        assert_eq!(metadata.column_contract.code_value.as_str(), "CodeValue");
        assert!(metadata.column_contract.discriminator.is_none());
        assert_eq!(
            metadata.discriminator_strategy,
            DiscriminatorStrategy::ResourceKeyId
        );

        Ok(())
    }

    #[test]
    fn descriptor_flagged_resource_without_the_suffix_is_a_contract_violation() {
        let mut project = core_project();
        project["projectSchema"]["resourceSchemas"]["contacts"] = json!({
            "resourceName": "Contact",
            "isDescriptor": true,
            "isResourceExtension": false,
            "identityJsonPaths": ["$.namespace", "$.codeValue"],
            "jsonSchemaForInsert": descriptor_insert_schema()
        });

        let error =
            derive_relational_model_set(vec![project, extension_project()]).unwrap_err();
        assert!(matches!(error, DerivationError::ContractViolation(_)));
        assert!(error.to_string().contains("Contact"));
    }

    #[test]
    fn contract_validation_failures_abort_with_aggregated_messages() {
        let mut project = core_project();
        project["projectSchema"]["resourceSchemas"]["brokenDescriptors"] = json!({
            "resourceName": "BrokenDescriptor",
            "isDescriptor": true,
            "isResourceExtension": false,
            "identityJsonPaths": [],
            "jsonSchemaForInsert": {
                "type": "object",
                "properties": { "codeValue": { "type": "integer" } }
            }
        });

        let error =
            derive_relational_model_set(vec![project, extension_project()]).unwrap_err();
        let message = error.to_string();
        assert!(message.contains("'namespace' is missing"));
        assert!(message.contains("'codeValue' must be a string schema"));
    }

    #[test]
    fn descriptor_edges_bind_to_the_shared_descriptor_table() -> Result<()> {
        let set = derive_standard_set()?;
        let school = set
            .concrete_resources_in_name_order
            .iter()
            .find(|model| model.resource.resource_name == "School")
            .unwrap();

        let edges = &school.relational_model.descriptor_edge_sources;
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].descriptor_value_path.canonical(), "$.gradeLevelDescriptor");
        assert_eq!(edges[0].fk_column.as_str(), "GradeLevelDescriptor_DescriptorId");
        assert_eq!(edges[0].descriptor_resource.resource_name, "GradeLevelDescriptor");

        let descriptor_fk = school
            .relational_model
            .root
            .columns
            .iter()
            .find(|column| column.kind == ColumnKind::DescriptorFk)
            .expect("descriptor FK column");
        assert_eq!(descriptor_fk.column_name.as_str(), "GradeLevelDescriptor_DescriptorId");

        Ok(())
    }
}

mod reference_tests {
    use super::*;

    #[test]
    fn references_bind_fk_and_identity_columns() -> Result<()> {
        let set = derive_standard_set()?;
        let session = set
            .concrete_resources_in_name_order
            .iter()
            .find(|model| model.resource.resource_name == "Session")
            .unwrap();

        let bindings = &session.relational_model.document_reference_bindings;
        assert_eq!(bindings.len(), 1);

        let binding = &bindings[0];
        assert!(binding.is_identity_component);
        assert_eq!(binding.reference_object_path.canonical(), "$.schoolReference");
        assert_eq!(binding.fk_column.as_str(), "SchoolReference_DocumentId");
        assert_eq!(binding.target_resource.resource_name, "School");
        assert_eq!(binding.identity_bindings.len(), 1);
        assert_eq!(
            binding.identity_bindings[0].column.as_str(),
            "SchoolReference_SchoolId"
        );

        let root = &session.relational_model.root;
        assert!(root
            .columns
            .iter()
            .any(|column| column.kind == ColumnKind::DocumentFk
                && column.column_name.as_str() == "SchoolReference_DocumentId"));

        let fk_constraint = root.constraints.iter().find_map(|constraint| match constraint {
            TableConstraint::ForeignKey { columns, target_table, .. }
                if columns.first().map(|c| c.as_str()) == Some("SchoolReference_DocumentId") =>
            {
                Some(target_table.to_string())
            }
            _ => None,
        });
        assert_eq!(fk_constraint.as_deref(), Some("edfi.School"));

        Ok(())
    }

    #[test]
    fn session_natural_key_spans_scalar_and_reference_identity_columns() -> Result<()> {
        let set = derive_standard_set()?;
        let session = set
            .concrete_resources_in_name_order
            .iter()
            .find(|model| model.resource.resource_name == "Session")
            .unwrap();

        let unique = session
            .relational_model
            .root
            .constraints
            .iter()
            .find_map(|constraint| match constraint {
                TableConstraint::Unique { columns, .. } => Some(columns),
                _ => None,
            })
            .expect("session natural key present");

        let names: Vec<&str> = unique.iter().map(|column| column.as_str()).collect();
        assert_eq!(names, vec!["SessionName", "SchoolReference_SchoolId"]);

        Ok(())
    }
}

mod schema_corruption_tests {
    use super::*;

    #[test]
    fn missing_extension_flag_is_fatal() {
        let mut project = core_project();
        project["projectSchema"]["resourceSchemas"]["schools"]
            .as_object_mut()
            .unwrap()
            .remove("isResourceExtension");

        let error =
            derive_relational_model_set(vec![project, extension_project()]).unwrap_err();
        assert!(matches!(error, DerivationError::SchemaCorruption(_)));
        assert!(error.to_string().contains("isResourceExtension"));
    }

    #[test]
    fn non_boolean_extension_flag_is_fatal() {
        let mut project = core_project();
        project["projectSchema"]["resourceSchemas"]["schools"]["isResourceExtension"] =
            json!("false");

        let error =
            derive_relational_model_set(vec![project, extension_project()]).unwrap_err();
        assert!(error.to_string().contains("to be a boolean"));
    }

    #[test]
    fn non_object_schema_root_is_fatal() {
        let mut project = core_project();
        project["projectSchema"]["resourceSchemas"]["schools"]["jsonSchemaForInsert"] =
            json!({ "type": "array", "items": { "type": "object" } });

        let error =
            derive_relational_model_set(vec![project, extension_project()]).unwrap_err();
        assert!(error.to_string().contains("root to be an object"));
    }

    #[test]
    fn duplicate_concrete_resources_are_fatal() {
        let mut duplicate = core_project();
        duplicate["projectSchema"]["projectEndpointName"] = json!("ed-fi-copy");

        let error = derive_relational_model_set(vec![
            core_project(),
            duplicate,
            extension_project(),
        ])
        .unwrap_err();

        // Same project name and resource names, different endpoint.
        assert!(matches!(error, DerivationError::InvariantViolation(_)));
        assert!(error.to_string().contains("Duplicate concrete resources"));
    }
}

mod collision_tests {
    use super::*;

    #[test]
    fn in_table_column_collisions_report_both_source_paths() {
        let mut project = core_project();
        project["projectSchema"]["resourceSchemas"]["schools"]["jsonSchemaForInsert"]
            ["properties"]["name_of_institution"] = json!({ "type": "string", "maxLength": 75 });

        let error =
            derive_relational_model_set(vec![project, extension_project()]).unwrap_err();
        assert!(matches!(error, DerivationError::NamingCollision(_)));
        let message = error.to_string();
        assert!(message.contains("$.nameOfInstitution"));
        assert!(message.contains("$.name_of_institution"));
    }

    #[test]
    fn name_overrides_resolve_in_table_collisions() -> Result<()> {
        let mut project = core_project();
        project["projectSchema"]["resourceSchemas"]["schools"]["jsonSchemaForInsert"]
            ["properties"]["name_of_institution"] = json!({ "type": "string", "maxLength": 75 });
        project["projectSchema"]["resourceSchemas"]["schools"]["relationalNameOverrides"] =
            json!({ "$.name_of_institution": "LegacyNameOfInstitution" });

        let set = derive_relational_model_set(vec![project, extension_project()])?;
        let school = set
            .concrete_resources_in_name_order
            .iter()
            .find(|model| model.resource.resource_name == "School")
            .unwrap();

        assert!(school
            .relational_model
            .root
            .columns
            .iter()
            .any(|column| column.column_name.as_str() == "LegacyNameOfInstitution"));

        Ok(())
    }

    #[test]
    fn unmatched_name_overrides_are_rejected() {
        let mut project = core_project();
        project["projectSchema"]["resourceSchemas"]["schools"]["relationalNameOverrides"] =
            json!({ "$.doesNotExist": "Anything" });

        let error =
            derive_relational_model_set(vec![project, extension_project()]).unwrap_err();
        assert!(error.to_string().contains("did not match any derived column"));
    }

    #[test]
    fn descriptor_resources_converging_on_shared_columns_do_not_collide() -> Result<()> {
        // Two descriptor resources derive identical columns on dms.Descriptor;
        // the shared descriptor scope is exempt from collision detection.
        let set = derive_standard_set()?;

        let descriptor_models = set
            .concrete_resources_in_name_order
            .iter()
            .filter(|model| model.storage_kind == ResourceStorageKind::SharedDescriptorTable)
            .count();
        assert_eq!(descriptor_models, 2);

        Ok(())
    }
}

mod abstract_identity_tests {
    use super::*;

    fn project_with_abstract_resources() -> Value {
        let mut project = core_project();
        project["projectSchema"]["abstractResources"] = json!({
            "educationOrganizations": {
                "resourceName": "EducationOrganization",
                "identityJsonPaths": ["$.educationOrganizationId"],
                "jsonSchemaForInsert": {
                    "type": "object",
                    "required": ["educationOrganizationId"],
                    "properties": {
                        "educationOrganizationId": { "type": "integer", "format": "int64" }
                    }
                }
            }
        });
        project["projectSchema"]["resourceSchemas"]["schools"]["isSubclass"] = json!(true);
        project["projectSchema"]["resourceSchemas"]["schools"]["superclassProjectName"] =
            json!("Ed-Fi");
        project["projectSchema"]["resourceSchemas"]["schools"]["superclassResourceName"] =
            json!("EducationOrganization");
        project
    }

    #[test]
    fn abstract_resources_get_identity_bridging_tables() -> Result<()> {
        let set = derive_relational_model_set(vec![
            project_with_abstract_resources(),
            extension_project(),
        ])?;

        assert_eq!(set.abstract_identity_tables_in_name_order.len(), 1);

        let info = &set.abstract_identity_tables_in_name_order[0];
        assert_eq!(info.resource.resource_name, "EducationOrganization");
        assert_eq!(info.table_model.table.to_string(), "edfi.EducationOrganizationIdentity");

        let columns: Vec<&str> = info
            .table_model
            .columns
            .iter()
            .map(|column| column.column_name.as_str())
            .collect();
        assert_eq!(columns, vec!["DocumentId", "Discriminator", "EducationOrganizationId"]);

        assert!(info
            .table_model
            .constraints
            .iter()
            .any(|constraint| matches!(constraint, TableConstraint::Unique { .. })));

        Ok(())
    }

    #[test]
    fn abstract_resources_without_members_are_rejected() {
        let mut project = project_with_abstract_resources();
        project["projectSchema"]["resourceSchemas"]["schools"]["isSubclass"] = json!(false);

        let error =
            derive_relational_model_set(vec![project, extension_project()]).unwrap_err();
        assert!(error.to_string().contains("has no concrete members"));
    }
}

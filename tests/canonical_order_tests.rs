//! Canonical ordering tests over derived models

use anyhow::Result;
use relational_modelling_sdk::{derive_relational_model_set, TableConstraint};
use serde_json::{json, Value};

fn project() -> Value {
    json!({
        "projectSchema": {
            "projectName": "Ed-Fi",
            "projectEndpointName": "ed-fi",
            "projectVersion": "5.0.0",
            "isExtensionProject": false,
            "resourceSchemas": {
                "students": {
                    "resourceName": "Student",
                    "isDescriptor": false,
                    "isResourceExtension": false,
                    "identityJsonPaths": ["$.studentUniqueId"],
                    "documentPathsMapping": {
                        "SexDescriptor": {
                            "isReference": true,
                            "isDescriptor": true,
                            "projectName": "Ed-Fi",
                            "resourceName": "SexDescriptor",
                            "path": "$.sexDescriptor"
                        }
                    },
                    "jsonSchemaForInsert": {
                        "type": "object",
                        "required": ["studentUniqueId"],
                        "properties": {
                            "studentUniqueId": { "type": "string", "maxLength": 32 },
                            "zebraLabel": { "type": "string", "maxLength": 20 },
                            "aardvarkLabel": { "type": "string", "maxLength": 20 },
                            "sexDescriptor": { "type": "string", "maxLength": 306 },
                            "addresses": {
                                "type": "array",
                                "items": {
                                    "type": "object",
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
                            "birthDate": { "type": "string", "format": "date" }
                        }
                    }
                }
            }
        }
    })
}

mod table_order_tests {
    use super::*;

    #[test]
    fn tables_order_by_array_depth_then_scope() -> Result<()> {
        let set = derive_relational_model_set(vec![project()])?;
        let student = &set.concrete_resources_in_name_order[0];

        let scopes: Vec<&str> = student
            .relational_model
            .tables_in_read_dependency_order
            .iter()
            .map(|table| table.json_scope.canonical())
            .collect();

        assert_eq!(scopes, vec!["$", "$.addresses[*]", "$.addresses[*].periods[*]"]);

        // Read and write dependency order agree after canonicalization.
        assert_eq!(
            student.relational_model.tables_in_read_dependency_order,
            student.relational_model.tables_in_write_dependency_order
        );

        Ok(())
    }
}

mod column_order_tests {
    use super::*;

    #[test]
    fn columns_group_as_key_then_descriptor_fk_then_scalars() -> Result<()> {
        let set = derive_relational_model_set(vec![project()])?;
        let root = &set.concrete_resources_in_name_order[0].relational_model.root;

        let names: Vec<&str> = root
            .columns
            .iter()
            .map(|column| column.column_name.as_str())
            .collect();

        assert_eq!(
            names,
            vec![
                "DocumentId",
                "SexDescriptor_DescriptorId",
                "AardvarkLabel",
                "BirthDate",
                "StudentUniqueId",
                "ZebraLabel",
            ]
        );

        Ok(())
    }

    #[test]
    fn key_columns_keep_their_declared_key_order() -> Result<()> {
        let set = derive_relational_model_set(vec![project()])?;
        let periods = set.concrete_resources_in_name_order[0]
            .relational_model
            .tables_in_read_dependency_order
            .iter()
            .find(|table| table.json_scope.canonical() == "$.addresses[*].periods[*]")
            .expect("periods table derived");

        // The composite key order is structural, not alphabetical.
        let leading: Vec<&str> = periods
            .columns
            .iter()
            .take(3)
            .map(|column| column.column_name.as_str())
            .collect();
        assert_eq!(leading, vec!["Student_DocumentId", "AddressOrdinal", "Ordinal"]);

        Ok(())
    }
}

mod constraint_order_tests {
    use super::*;

    #[test]
    fn unique_constraints_order_before_foreign_keys() -> Result<()> {
        let set = derive_relational_model_set(vec![project()])?;
        let root = &set.concrete_resources_in_name_order[0].relational_model.root;

        let first_fk_position = root
            .constraints
            .iter()
            .position(|constraint| matches!(constraint, TableConstraint::ForeignKey { .. }))
            .expect("root has FK constraints");
        let last_unique_position = root
            .constraints
            .iter()
            .rposition(|constraint| matches!(constraint, TableConstraint::Unique { .. }))
            .expect("root has a natural key");

        assert!(last_unique_position < first_fk_position);

        Ok(())
    }
}

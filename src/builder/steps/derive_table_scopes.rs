//! Table-scope and key derivation step

use serde_json::{Map, Value};

use crate::builder::context::RelationalModelBuilderContext;
use crate::builder::RelationalModelBuilderStep;
use crate::error::{DerivationError, Result};
use crate::models::{
    ColumnKind, DbColumnModel, DbColumnName, DbKeyColumn, DbSchemaName, DbTableModel, DbTableName,
    QualifiedResourceName, ReferentialAction, RelationalResourceModel, RelationalScalarType,
    ResourceStorageKind, ScalarKind, TableConstraint, TableKey, DESCRIPTOR_TABLE_NAME,
    DOCUMENT_TABLE_NAME,
};
use crate::naming;
use crate::paths::{JsonPathExpression, JsonPathSegment, EXTENSION_PROPERTY_NAME};
use crate::schema::{determine_schema_kind, SchemaKind};

/// Derives the base table inventory from the insert schema
///
/// Creates the root table (`$`) and one child table per array path, including
/// nested arrays. Child table keys are a composite of the root document id,
/// ancestor ordinals, and the current `Ordinal` column. Object schemas are
/// inline containers and do not create tables; the `_ext` property is skipped
/// here and handled by extension mapping. Descriptor resources short-circuit
/// to the shared descriptor root table.
pub struct DeriveTableScopesAndKeysStep;

impl RelationalModelBuilderStep for DeriveTableScopesAndKeysStep {
    fn name(&self) -> &'static str {
        "derive-table-scopes-and-keys"
    }

    fn execute(&self, context: &mut RelationalModelBuilderContext) -> Result<()> {
        let project_name = context.require_project_name()?.to_string();
        let project_endpoint_name = context.require_project_endpoint_name()?.to_string();
        let resource_name = context.require_resource_name()?.to_string();
        let is_descriptor = context.require_is_descriptor_resource()?;
        let json_schema_for_insert = context.require_json_schema_for_insert()?.clone();

        let Value::Object(root_schema) = &json_schema_for_insert else {
            return Err(DerivationError::SchemaCorruption(
                "Expected JSON schema root to be an object at $".to_string(),
            ));
        };

        let physical_schema = naming::normalize_schema_name(&project_endpoint_name);
        let root_base_name = naming::to_pascal_case(&resource_name);
        let resource = QualifiedResourceName::new(project_name, resource_name);

        if is_descriptor {
            let root = create_descriptor_root_table();

            context.resource_model = Some(RelationalResourceModel {
                resource,
                physical_schema,
                storage_kind: ResourceStorageKind::SharedDescriptorTable,
                root: root.clone(),
                tables_in_read_dependency_order: vec![root.clone()],
                tables_in_write_dependency_order: vec![root],
                document_reference_bindings: Vec::new(),
                descriptor_edge_sources: Vec::new(),
            });

            return Ok(());
        }

        let root_scope = TableScope {
            table: create_root_table(&physical_schema, &root_base_name),
            collection_base_names: Vec::new(),
        };

        let mut table_scopes = vec![root_scope];

        discover_tables(
            root_schema,
            &JsonPathExpression::root(),
            &[],
            0,
            &mut table_scopes,
            &physical_schema,
            &root_base_name,
        )?;

        let root = table_scopes[0].table.clone();
        let tables: Vec<DbTableModel> =
            table_scopes.into_iter().map(|scope| scope.table).collect();

        context.resource_model = Some(RelationalResourceModel {
            resource,
            physical_schema,
            storage_kind: ResourceStorageKind::RelationalTables,
            root,
            tables_in_read_dependency_order: tables.clone(),
            tables_in_write_dependency_order: tables,
            document_reference_bindings: Vec::new(),
            descriptor_edge_sources: Vec::new(),
        });

        Ok(())
    }
}

/// A derived table along with the collection-name chain used for key and FK
/// column derivation
struct TableScope {
    table: DbTableModel,
    collection_base_names: Vec<String>,
}

fn create_root_table(schema: &DbSchemaName, root_base_name: &str) -> DbTableModel {
    let table_name = DbTableName::new(schema.clone(), root_base_name);
    let key = TableKey {
        columns: vec![DbKeyColumn {
            column_name: naming::document_id_column(),
            kind: ColumnKind::ParentKeyPart,
        }],
    };

    let fk_name = naming::foreign_key_name(&table_name.name, &[naming::document_id_column()]);

    DbTableModel {
        columns: build_key_columns(&key),
        constraints: vec![TableConstraint::ForeignKey {
            name: fk_name,
            columns: vec![naming::document_id_column()],
            target_table: DOCUMENT_TABLE_NAME.clone(),
            target_columns: vec![naming::document_id_column()],
            on_delete: ReferentialAction::Cascade,
            on_update: ReferentialAction::NoAction,
        }],
        table: table_name,
        json_scope: JsonPathExpression::root(),
        key,
    }
}

fn create_descriptor_root_table() -> DbTableModel {
    let key = TableKey {
        columns: vec![DbKeyColumn {
            column_name: naming::document_id_column(),
            kind: ColumnKind::ParentKeyPart,
        }],
    };

    let fk_name =
        naming::foreign_key_name(&DESCRIPTOR_TABLE_NAME.name, &[naming::document_id_column()]);

    DbTableModel {
        columns: build_key_columns(&key),
        constraints: vec![TableConstraint::ForeignKey {
            name: fk_name,
            columns: vec![naming::document_id_column()],
            target_table: DOCUMENT_TABLE_NAME.clone(),
            target_columns: vec![naming::document_id_column()],
            on_delete: ReferentialAction::Cascade,
            on_update: ReferentialAction::NoAction,
        }],
        table: DESCRIPTOR_TABLE_NAME.clone(),
        json_scope: JsonPathExpression::root(),
        key,
    }
}

fn discover_tables(
    schema: &Map<String, Value>,
    scope_path: &JsonPathExpression,
    collection_base_names: &[String],
    parent_index: usize,
    tables: &mut Vec<TableScope>,
    schema_name: &DbSchemaName,
    root_base_name: &str,
) -> Result<()> {
    match determine_schema_kind(schema, scope_path.canonical(), false)? {
        SchemaKind::Object => {
            let Some(properties) = schema.get("properties") else {
                return Ok(());
            };

            let Value::Object(properties) = properties else {
                return Err(DerivationError::SchemaCorruption(format!(
                    "Expected properties to be an object at {}",
                    scope_path.canonical()
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
                        "Expected property schema to be an object at {}.{property_name}",
                        scope_path.canonical()
                    )));
                };

                discover_tables(
                    property_schema,
                    &scope_path.append_property(property_name.clone())?,
                    collection_base_names,
                    parent_index,
                    tables,
                    schema_name,
                    root_base_name,
                )?;
            }

            Ok(())
        }
        SchemaKind::Array => {
            let Some(Value::Object(items_schema)) = schema.get("items") else {
                return Err(DerivationError::SchemaCorruption(format!(
                    "Array schema items must be an object at {}",
                    scope_path.canonical()
                )));
            };

            let Some(JsonPathSegment::Property { name: property_name }) =
                scope_path.segments().last()
            else {
                return Err(DerivationError::SchemaCorruption(format!(
                    "Array schema must be rooted at a property segment at {}",
                    scope_path.canonical()
                )));
            };

            // Scalar descriptor arrays also get a collection table; the
            // descriptor FK becomes its single non-key column.
            let collection_base_name = naming::to_collection_base_name(property_name);

            let mut next_collection_base_names = collection_base_names.to_vec();
            next_collection_base_names.push(collection_base_name);

            let json_scope = scope_path.append_any_array_element()?;

            let child = create_child_table(
                schema_name,
                root_base_name,
                &tables[parent_index],
                &next_collection_base_names,
                &json_scope,
            );

            tables.push(child);
            let child_index = tables.len() - 1;

            discover_tables(
                items_schema,
                &json_scope,
                &next_collection_base_names,
                child_index,
                tables,
                schema_name,
                root_base_name,
            )
        }
        SchemaKind::Scalar => Ok(()),
    }
}

/// Creates a child table for an array scope with a composite key and a
/// cascading FK to its parent
fn create_child_table(
    schema_name: &DbSchemaName,
    root_base_name: &str,
    parent: &TableScope,
    collection_base_names: &[String],
    json_scope: &JsonPathExpression,
) -> TableScope {
    let table_name = DbTableName::new(
        schema_name.clone(),
        build_collection_table_name(root_base_name, collection_base_names),
    );
    let key = build_child_table_key(root_base_name, collection_base_names);

    let parent_key_columns =
        build_parent_key_column_names(root_base_name, &parent.collection_base_names);
    let fk_name = naming::foreign_key_name(&table_name.name, &parent_key_columns);

    let constraints = vec![TableConstraint::ForeignKey {
        name: fk_name,
        columns: parent_key_columns,
        target_table: parent.table.table.clone(),
        target_columns: parent
            .table
            .key
            .columns
            .iter()
            .map(|key_column| key_column.column_name.clone())
            .collect(),
        on_delete: ReferentialAction::Cascade,
        on_update: ReferentialAction::NoAction,
    }];

    TableScope {
        table: DbTableModel {
            columns: build_key_columns(&key),
            constraints,
            table: table_name,
            json_scope: json_scope.clone(),
            key,
        },
        collection_base_names: collection_base_names.to_vec(),
    }
}

/// Child-table PK: root document id, ancestor ordinals, then the current
/// `Ordinal`
fn build_child_table_key(root_base_name: &str, collection_base_names: &[String]) -> TableKey {
    let mut key_columns = vec![DbKeyColumn {
        column_name: naming::root_document_id_column(root_base_name),
        kind: ColumnKind::ParentKeyPart,
    }];

    for collection_base_name in &collection_base_names[..collection_base_names.len() - 1] {
        key_columns.push(DbKeyColumn {
            column_name: naming::parent_collection_ordinal_column(collection_base_name),
            kind: ColumnKind::ParentKeyPart,
        });
    }

    key_columns.push(DbKeyColumn {
        column_name: naming::ordinal_column(),
        kind: ColumnKind::Ordinal,
    });

    TableKey { columns: key_columns }
}

/// FK column list for a child table: the parent's key parts projected onto
/// the child
fn build_parent_key_column_names(
    root_base_name: &str,
    parent_collection_base_names: &[String],
) -> Vec<DbColumnName> {
    let mut key_columns = vec![naming::root_document_id_column(root_base_name)];

    for collection_base_name in parent_collection_base_names {
        key_columns.push(naming::parent_collection_ordinal_column(collection_base_name));
    }

    key_columns
}

fn build_collection_table_name(root_base_name: &str, collection_base_names: &[String]) -> String {
    let mut name = root_base_name.to_string();
    for collection_base_name in collection_base_names {
        name.push_str(collection_base_name);
    }
    name
}

/// Seeds a table's column inventory with its key columns
fn build_key_columns(key: &TableKey) -> Vec<DbColumnModel> {
    key.columns
        .iter()
        .map(|key_column| DbColumnModel {
            column_name: key_column.column_name.clone(),
            kind: key_column.kind,
            scalar_type: Some(key_column_scalar_type(key_column)),
            is_nullable: false,
            source_json_path: None,
            target_resource: None,
        })
        .collect()
}

/// Document ids are 64-bit, ordinals 32-bit
fn key_column_scalar_type(key_column: &DbKeyColumn) -> RelationalScalarType {
    match key_column.kind {
        ColumnKind::Ordinal => RelationalScalarType::new(ScalarKind::Int32),
        ColumnKind::ParentKeyPart if naming::is_document_id_column(&key_column.column_name) => {
            RelationalScalarType::new(ScalarKind::Int64)
        }
        _ => RelationalScalarType::new(ScalarKind::Int32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::context::DescriptorPathSource;
    use serde_json::json;
    use std::sync::Arc;

    fn context_for(resource_name: &str, is_descriptor: bool, schema: Value) -> RelationalModelBuilderContext {
        let mut context = RelationalModelBuilderContext::new(
            Arc::new(json!({})),
            "schools",
            DescriptorPathSource::Precomputed,
            Default::default(),
        );
        context.project_name = Some("Ed-Fi".to_string());
        context.project_endpoint_name = Some("ed-fi".to_string());
        context.resource_name = Some(resource_name.to_string());
        context.is_descriptor_resource = Some(is_descriptor);
        context.json_schema_for_insert = Some(schema);
        context
    }

    #[test]
    fn derives_root_and_nested_collection_tables() {
        let mut context = context_for(
            "School",
            false,
            json!({
                "type": "object",
                "properties": {
                    "schoolId": { "type": "integer" },
                    "addresses": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "city": { "type": "string" },
                                "periods": {
                                    "type": "array",
                                    "items": {
                                        "type": "object",
                                        "properties": { "beginDate": { "type": "string", "format": "date" } }
                                    }
                                }
                            }
                        }
                    }
                }
            }),
        );

        DeriveTableScopesAndKeysStep.execute(&mut context).unwrap();

        let model = context.resource_model.as_ref().unwrap();
        assert_eq!(model.tables_in_read_dependency_order.len(), 3);

        let root = &model.tables_in_read_dependency_order[0];
        assert_eq!(root.table.to_string(), "edfi.School");
        assert_eq!(root.json_scope.canonical(), "$");
        assert_eq!(root.key.columns.len(), 1);
        assert_eq!(root.key.columns[0].column_name.as_str(), "DocumentId");

        let addresses = &model.tables_in_read_dependency_order[1];
        assert_eq!(addresses.table.name, "SchoolAddress");
        assert_eq!(addresses.json_scope.canonical(), "$.addresses[*]");
        let address_key: Vec<&str> = addresses
            .key
            .columns
            .iter()
            .map(|key_column| key_column.column_name.as_str())
            .collect();
        assert_eq!(address_key, vec!["School_DocumentId", "Ordinal"]);

        let periods = &model.tables_in_read_dependency_order[2];
        assert_eq!(periods.table.name, "SchoolAddressPeriod");
        let period_key: Vec<&str> = periods
            .key
            .columns
            .iter()
            .map(|key_column| key_column.column_name.as_str())
            .collect();
        assert_eq!(
            period_key,
            vec!["School_DocumentId", "AddressOrdinal", "Ordinal"]
        );

        match &periods.constraints[0] {
            TableConstraint::ForeignKey { columns, target_table, on_delete, .. } => {
                assert_eq!(target_table.name, "SchoolAddress");
                assert_eq!(*on_delete, ReferentialAction::Cascade);
                let fk_columns: Vec<&str> =
                    columns.iter().map(DbColumnName::as_str).collect();
                assert_eq!(fk_columns, vec!["School_DocumentId", "AddressOrdinal"]);
            }
            other => panic!("expected a foreign key, found {other:?}"),
        }
    }

    #[test]
    fn descriptor_resources_use_the_shared_descriptor_root() {
        let mut context = context_for(
            "TermDescriptor",
            true,
            json!({ "type": "object", "properties": {} }),
        );

        DeriveTableScopesAndKeysStep.execute(&mut context).unwrap();

        let model = context.resource_model.as_ref().unwrap();
        assert_eq!(model.storage_kind, ResourceStorageKind::SharedDescriptorTable);
        assert_eq!(model.root.table.to_string(), "dms.Descriptor");
        assert_eq!(model.tables_in_read_dependency_order.len(), 1);
        // The owning project schema is preserved even though storage is shared.
        assert_eq!(model.physical_schema.as_str(), "edfi");
    }

    #[test]
    fn root_tables_reference_the_shared_document_table() {
        let mut context = context_for(
            "School",
            false,
            json!({ "type": "object", "properties": { "schoolId": { "type": "integer" } } }),
        );

        DeriveTableScopesAndKeysStep.execute(&mut context).unwrap();

        let model = context.resource_model.as_ref().unwrap();
        match &model.root.constraints[0] {
            TableConstraint::ForeignKey { target_table, on_delete, .. } => {
                assert_eq!(target_table.to_string(), "dms.Document");
                assert_eq!(*on_delete, ReferentialAction::Cascade);
            }
            other => panic!("expected a foreign key, found {other:?}"),
        }
    }
}

//! Canonical ordering
//!
//! Imposes the single deterministic, input-order-independent sort on every
//! output collection. All string comparisons are strict ordinal (byte-wise)
//! comparisons; locale-aware or case-insensitive substitutes would change
//! canonical output between environments.

use std::collections::BTreeMap;

use crate::error::{DerivationError, Result};
use crate::models::{
    ColumnKind, DbColumnModel, DbTableModel, DescriptorEdgeSource, DocumentReferenceBinding,
    ExtensionSite, RelationalResourceModel, TableConstraint,
};

/// Reorders a table's columns and constraints into canonical order
///
/// Columns group as: key columns (in declared key order), descriptor FKs,
/// scalars, then everything else, with the column name as the final ordinal
/// tiebreak. Constraints order unique-before-foreign-key, then by name.
pub fn canonicalize_table(table: &DbTableModel) -> DbTableModel {
    let key_column_order: BTreeMap<&str, usize> = table
        .key
        .columns
        .iter()
        .enumerate()
        .map(|(index, key_column)| (key_column.column_name.as_str(), index))
        .collect();

    let mut columns = table.columns.clone();
    columns.sort_by(|a, b| {
        column_group(a, &key_column_order)
            .cmp(&column_group(b, &key_column_order))
            .then_with(|| {
                column_key_index(a, &key_column_order).cmp(&column_key_index(b, &key_column_order))
            })
            .then_with(|| a.column_name.as_str().cmp(b.column_name.as_str()))
    });

    let mut constraints = table.constraints.clone();
    constraints.sort_by(|a, b| {
        constraint_group(a)
            .cmp(&constraint_group(b))
            .then_with(|| a.name().cmp(b.name()))
    });

    DbTableModel {
        columns,
        constraints,
        ..table.clone()
    }
}

/// Applies canonical ordering to a complete resource model
///
/// Tables order by array depth of their JSON scope, then scope, then table
/// name. Exactly one table must carry the root scope `$`; its absence is a
/// fatal modeling invariant violation.
pub fn canonicalize_resource_model(
    model: &RelationalResourceModel,
) -> Result<RelationalResourceModel> {
    let mut tables: Vec<DbTableModel> = model
        .tables_in_read_dependency_order
        .iter()
        .map(canonicalize_table)
        .collect();

    tables.sort_by(|a, b| {
        a.json_scope
            .array_depth()
            .cmp(&b.json_scope.array_depth())
            .then_with(|| a.json_scope.canonical().cmp(b.json_scope.canonical()))
            .then_with(|| a.table.schema.as_str().cmp(b.table.schema.as_str()))
            .then_with(|| a.table.name.cmp(&b.table.name))
    });

    let mut root_tables = tables.iter().filter(|table| table.json_scope.is_root());
    let root = match (root_tables.next(), root_tables.next()) {
        (Some(root), None) => root.clone(),
        (Some(_), Some(_)) => {
            return Err(DerivationError::InvariantViolation(format!(
                "More than one table carries the root scope '$' on resource '{}'",
                model.resource
            )))
        }
        (None, _) => {
            return Err(DerivationError::InvariantViolation(format!(
                "Root table scope '$' was not found on resource '{}'",
                model.resource
            )))
        }
    };

    let mut document_reference_bindings = model.document_reference_bindings.clone();
    document_reference_bindings.sort_by(compare_document_reference_bindings);

    let mut descriptor_edge_sources = model.descriptor_edge_sources.clone();
    descriptor_edge_sources.sort_by(compare_descriptor_edges);

    Ok(RelationalResourceModel {
        resource: model.resource.clone(),
        physical_schema: model.physical_schema.clone(),
        storage_kind: model.storage_kind,
        root,
        tables_in_read_dependency_order: tables.clone(),
        tables_in_write_dependency_order: tables,
        document_reference_bindings,
        descriptor_edge_sources,
    })
}

/// Produces a stable ordering for extension sites, normalizing project key
/// order within each site
pub fn canonicalize_extension_sites(extension_sites: &[ExtensionSite]) -> Vec<ExtensionSite> {
    let mut sites: Vec<ExtensionSite> = extension_sites
        .iter()
        .map(|site| {
            let mut project_keys = site.project_keys.clone();
            project_keys.sort();
            ExtensionSite {
                owning_scope: site.owning_scope.clone(),
                extension_path: site.extension_path.clone(),
                project_keys,
            }
        })
        .collect();

    sites.sort_by(|a, b| {
        a.owning_scope
            .canonical()
            .cmp(b.owning_scope.canonical())
            .then_with(|| a.extension_path.canonical().cmp(b.extension_path.canonical()))
            .then_with(|| a.project_keys.join("|").cmp(&b.project_keys.join("|")))
    });

    sites
}

fn compare_document_reference_bindings(
    a: &DocumentReferenceBinding,
    b: &DocumentReferenceBinding,
) -> std::cmp::Ordering {
    a.reference_object_path
        .cmp(&b.reference_object_path)
        .then_with(|| a.table.schema.as_str().cmp(b.table.schema.as_str()))
        .then_with(|| a.table.name.cmp(&b.table.name))
        .then_with(|| a.fk_column.as_str().cmp(b.fk_column.as_str()))
        .then_with(|| a.target_resource.project_name.cmp(&b.target_resource.project_name))
        .then_with(|| a.target_resource.resource_name.cmp(&b.target_resource.resource_name))
        .then_with(|| a.is_identity_component.cmp(&b.is_identity_component))
}

fn compare_descriptor_edges(
    a: &DescriptorEdgeSource,
    b: &DescriptorEdgeSource,
) -> std::cmp::Ordering {
    a.table
        .schema
        .as_str()
        .cmp(b.table.schema.as_str())
        .then_with(|| a.table.name.cmp(&b.table.name))
        .then_with(|| a.descriptor_value_path.cmp(&b.descriptor_value_path))
        .then_with(|| a.fk_column.as_str().cmp(b.fk_column.as_str()))
        .then_with(|| a.descriptor_resource.project_name.cmp(&b.descriptor_resource.project_name))
        .then_with(|| {
            a.descriptor_resource
                .resource_name
                .cmp(&b.descriptor_resource.resource_name)
        })
        .then_with(|| a.is_identity_component.cmp(&b.is_identity_component))
}

fn column_group(column: &DbColumnModel, key_column_order: &BTreeMap<&str, usize>) -> u8 {
    if key_column_order.contains_key(column.column_name.as_str()) {
        return 0;
    }

    match column.kind {
        ColumnKind::DescriptorFk => 1,
        ColumnKind::Scalar => 2,
        _ => 3,
    }
}

fn column_key_index(column: &DbColumnModel, key_column_order: &BTreeMap<&str, usize>) -> usize {
    key_column_order
        .get(column.column_name.as_str())
        .copied()
        .unwrap_or(usize::MAX)
}

fn constraint_group(constraint: &TableConstraint) -> u8 {
    match constraint {
        TableConstraint::Unique { .. } => 1,
        TableConstraint::ForeignKey { .. } => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DbColumnName, DbKeyColumn, DbSchemaName, DbTableName, RelationalScalarType, ScalarKind,
        TableKey,
    };
    use crate::paths::JsonPathExpression;

    fn column(name: &str, kind: ColumnKind) -> DbColumnModel {
        DbColumnModel {
            column_name: DbColumnName::new(name),
            kind,
            scalar_type: Some(RelationalScalarType::new(ScalarKind::String)),
            is_nullable: false,
            source_json_path: None,
            target_resource: None,
        }
    }

    fn table_with(scope: &str, name: &str, columns: Vec<DbColumnModel>, key: Vec<&str>) -> DbTableModel {
        DbTableModel {
            table: DbTableName::new(DbSchemaName::new("edfi"), name),
            json_scope: JsonPathExpression::compile(scope).unwrap(),
            key: TableKey {
                columns: key
                    .into_iter()
                    .map(|column_name| DbKeyColumn {
                        column_name: DbColumnName::new(column_name),
                        kind: ColumnKind::ParentKeyPart,
                    })
                    .collect(),
            },
            columns,
            constraints: Vec::new(),
        }
    }

    #[test]
    fn columns_group_by_kind_with_key_columns_first() {
        let table = table_with(
            "$",
            "School",
            vec![
                column("Z", ColumnKind::Scalar),
                column("C", ColumnKind::Scalar),
                column("D_DescriptorId", ColumnKind::DescriptorFk),
                column("A", ColumnKind::ParentKeyPart),
                column("B", ColumnKind::ParentKeyPart),
            ],
            vec!["B", "A"],
        );

        let canonical = canonicalize_table(&table);
        let names: Vec<&str> = canonical
            .columns
            .iter()
            .map(|column| column.column_name.as_str())
            .collect();

        assert_eq!(names, vec!["B", "A", "D_DescriptorId", "C", "Z"]);
    }

    #[test]
    fn tables_order_by_array_depth_before_name() {
        let model = RelationalResourceModel {
            resource: crate::models::QualifiedResourceName::new("Ed-Fi", "School"),
            physical_schema: DbSchemaName::new("edfi"),
            storage_kind: crate::models::ResourceStorageKind::RelationalTables,
            root: table_with("$", "School", Vec::new(), vec![]),
            tables_in_read_dependency_order: vec![
                table_with("$.addresses[*].periods[*]", "AAA", Vec::new(), vec![]),
                table_with("$.addresses[*]", "ZZZ", Vec::new(), vec![]),
                table_with("$", "School", Vec::new(), vec![]),
            ],
            tables_in_write_dependency_order: Vec::new(),
            document_reference_bindings: Vec::new(),
            descriptor_edge_sources: Vec::new(),
        };

        let canonical = canonicalize_resource_model(&model).unwrap();
        let scopes: Vec<&str> = canonical
            .tables_in_read_dependency_order
            .iter()
            .map(|table| table.json_scope.canonical())
            .collect();

        assert_eq!(scopes, vec!["$", "$.addresses[*]", "$.addresses[*].periods[*]"]);
    }

    #[test]
    fn missing_root_table_is_an_invariant_violation() {
        let model = RelationalResourceModel {
            resource: crate::models::QualifiedResourceName::new("Ed-Fi", "School"),
            physical_schema: DbSchemaName::new("edfi"),
            storage_kind: crate::models::ResourceStorageKind::RelationalTables,
            root: table_with("$", "School", Vec::new(), vec![]),
            tables_in_read_dependency_order: vec![table_with(
                "$.addresses[*]",
                "SchoolAddress",
                Vec::new(),
                vec![],
            )],
            tables_in_write_dependency_order: Vec::new(),
            document_reference_bindings: Vec::new(),
            descriptor_edge_sources: Vec::new(),
        };

        let error = canonicalize_resource_model(&model).unwrap_err();
        assert!(error.to_string().contains("Root table scope '$'"));
    }

    #[test]
    fn unique_constraints_order_before_foreign_keys() {
        let mut table = table_with("$", "School", Vec::new(), vec![]);
        table.constraints = vec![
            TableConstraint::ForeignKey {
                name: "FK_A".to_string(),
                columns: Vec::new(),
                target_table: DbTableName::new(DbSchemaName::new("dms"), "Document"),
                target_columns: Vec::new(),
                on_delete: crate::models::ReferentialAction::NoAction,
                on_update: crate::models::ReferentialAction::NoAction,
            },
            TableConstraint::Unique {
                name: "UQ_B".to_string(),
                columns: Vec::new(),
            },
        ];

        let canonical = canonicalize_table(&table);
        assert_eq!(canonical.constraints[0].name(), "UQ_B");
        assert_eq!(canonical.constraints[1].name(), "FK_A");
    }
}

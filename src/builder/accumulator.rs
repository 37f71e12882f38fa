//! Table/column accumulator
//!
//! Assembles one table's columns and constraints while rejecting column name
//! collisions. Seeded from the table's existing inventory, including
//! synthetic key columns that have no explicit source path; those fall back
//! to the table's JSON scope when a collision is reported.

use std::collections::BTreeMap;

use crate::error::{DerivationError, Result};
use crate::models::{DbColumnModel, DbTableModel, TableConstraint};

/// Mutable builder for a single table's column and constraint inventory
#[derive(Debug)]
pub struct TableColumnAccumulator {
    definition: DbTableModel,
    columns: Vec<DbColumnModel>,
    constraints: Vec<TableConstraint>,
    column_sources: BTreeMap<String, String>,
}

impl TableColumnAccumulator {
    /// Seeds an accumulator from a table's existing columns and constraints
    pub fn new(table: &DbTableModel) -> Self {
        let scope_fallback = table.json_scope.canonical().to_string();
        let mut column_sources = BTreeMap::new();

        for column in &table.columns {
            column_sources.insert(
                column.column_name.as_str().to_string(),
                column_source(column, &scope_fallback),
            );
        }

        for key_column in &table.key.columns {
            column_sources
                .entry(key_column.column_name.as_str().to_string())
                .or_insert_with(|| scope_fallback.clone());
        }

        TableColumnAccumulator {
            columns: table.columns.clone(),
            constraints: table.constraints.clone(),
            definition: table.clone(),
            column_sources,
        }
    }

    /// The table definition this accumulator was seeded from
    pub fn definition(&self) -> &DbTableModel {
        &self.definition
    }

    /// Adds a column, failing immediately on a name collision
    ///
    /// The error reports both colliding source paths so the cause can be
    /// resolved through an explicit name override.
    pub fn add_column(&mut self, column: DbColumnModel) -> Result<()> {
        let scope_fallback = self.definition.json_scope.canonical().to_string();
        let source = column_source(&column, &scope_fallback);
        let name = column.column_name.as_str().to_string();

        if let Some(existing_source) = self.column_sources.get(&name) {
            return Err(DerivationError::NamingCollision(format!(
                "Column name '{name}' on table '{}' is derived from both '{existing_source}' and '{source}'",
                self.definition.table
            )));
        }

        self.column_sources.insert(name, source);
        self.columns.push(column);

        Ok(())
    }

    /// Adds a constraint to the accumulated inventory
    pub fn add_constraint(&mut self, constraint: TableConstraint) {
        self.constraints.push(constraint);
    }

    /// Whether a constraint with the given name is already present
    pub fn has_constraint(&self, name: &str) -> bool {
        self.constraints.iter().any(|constraint| constraint.name() == name)
    }

    /// Emits an immutable snapshot with the accumulated columns and constraints
    pub fn build(self) -> DbTableModel {
        DbTableModel {
            columns: self.columns,
            constraints: self.constraints,
            ..self.definition
        }
    }
}

fn column_source(column: &DbColumnModel, scope_fallback: &str) -> String {
    column
        .source_json_path
        .as_ref()
        .map(|path| path.canonical().to_string())
        .unwrap_or_else(|| scope_fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ColumnKind, DbColumnName, DbKeyColumn, DbSchemaName, DbTableName, RelationalScalarType,
        ScalarKind, TableKey,
    };
    use crate::paths::JsonPathExpression;

    fn seed_table() -> DbTableModel {
        DbTableModel {
            table: DbTableName::new(DbSchemaName::new("edfi"), "School"),
            json_scope: JsonPathExpression::root(),
            key: TableKey {
                columns: vec![DbKeyColumn {
                    column_name: DbColumnName::new("DocumentId"),
                    kind: ColumnKind::ParentKeyPart,
                }],
            },
            columns: vec![DbColumnModel {
                column_name: DbColumnName::new("DocumentId"),
                kind: ColumnKind::ParentKeyPart,
                scalar_type: Some(RelationalScalarType::new(ScalarKind::Int64)),
                is_nullable: false,
                source_json_path: None,
                target_resource: None,
            }],
            constraints: Vec::new(),
        }
    }

    fn scalar_column(name: &str, path: &str) -> DbColumnModel {
        DbColumnModel {
            column_name: DbColumnName::new(name),
            kind: ColumnKind::Scalar,
            scalar_type: Some(RelationalScalarType::new(ScalarKind::String)),
            is_nullable: false,
            source_json_path: Some(JsonPathExpression::compile(path).unwrap()),
            target_resource: None,
        }
    }

    #[test]
    fn accumulates_columns_and_builds_a_snapshot() {
        let mut accumulator = TableColumnAccumulator::new(&seed_table());
        accumulator.add_column(scalar_column("NameOfInstitution", "$.nameOfInstitution")).unwrap();

        let table = accumulator.build();
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.columns[1].column_name.as_str(), "NameOfInstitution");
    }

    #[test]
    fn collisions_report_both_source_paths() {
        let mut accumulator = TableColumnAccumulator::new(&seed_table());
        accumulator.add_column(scalar_column("Name", "$.name")).unwrap();

        let error = accumulator.add_column(scalar_column("Name", "$.otherName")).unwrap_err();
        let message = error.to_string();
        assert!(message.contains("$.name"));
        assert!(message.contains("$.otherName"));
        assert!(message.contains("edfi.School"));
    }

    #[test]
    fn synthetic_key_columns_fall_back_to_the_table_scope() {
        let mut accumulator = TableColumnAccumulator::new(&seed_table());

        let error = accumulator
            .add_column(scalar_column("DocumentId", "$.documentId"))
            .unwrap_err();
        assert!(error.to_string().contains("'$'"));
    }
}

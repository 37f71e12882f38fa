//! Table, key, and constraint models

use serde::{Deserialize, Serialize};

use super::column::{ColumnKind, DbColumnModel};
use super::identifiers::{DbColumnName, DbTableName};
use crate::paths::JsonPathExpression;

/// A primary-key column and its semantic role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbKeyColumn {
    pub column_name: DbColumnName,
    pub kind: ColumnKind,
}

/// Primary key definition for a derived table
///
/// Column order is semantically significant: it fixes key-column position and
/// downstream FK column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableKey {
    pub columns: Vec<DbKeyColumn>,
}

/// Referential actions supported by derived foreign keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReferentialAction {
    NoAction,
    Cascade,
}

/// A table constraint derived from schema and metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TableConstraint {
    /// A UNIQUE constraint over one or more columns
    Unique {
        name: String,
        columns: Vec<DbColumnName>,
    },
    /// A foreign key constraint
    ForeignKey {
        name: String,
        columns: Vec<DbColumnName>,
        target_table: DbTableName,
        target_columns: Vec<DbColumnName>,
        on_delete: ReferentialAction,
        on_update: ReferentialAction,
    },
}

impl TableConstraint {
    /// The physical constraint name
    pub fn name(&self) -> &str {
        match self {
            TableConstraint::Unique { name, .. } => name,
            TableConstraint::ForeignKey { name, .. } => name,
        }
    }
}

/// The model for a physical table derived from a JSONPath scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbTableModel {
    pub table: DbTableName,
    /// The owning JSONPath scope for rows in this table (`$` for the root
    /// table, or a repeated, possibly nested, array element scope)
    pub json_scope: JsonPathExpression,
    pub key: TableKey,
    /// All columns, including key parts and derived scalar/FK columns
    pub columns: Vec<DbColumnModel>,
    pub constraints: Vec<TableConstraint>,
}

//! Column models for derived tables

use serde::{Deserialize, Serialize};

use super::identifiers::{DbColumnName, QualifiedResourceName};
use crate::paths::JsonPathExpression;

/// The semantic role of a derived column within a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnKind {
    /// A scalar value projected from the source JSON document
    Scalar,
    /// A foreign key to another resource's document
    DocumentFk,
    /// A foreign key to the shared descriptor table
    DescriptorFk,
    /// The array ordering column that preserves element order in collection tables
    Ordinal,
    /// A key-part column inherited from an ancestor scope
    ParentKeyPart,
}

/// Dialect-neutral scalar type categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScalarKind {
    String,
    Int32,
    Int64,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Time,
}

/// Storage type metadata for a scalar column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationalScalarType {
    pub kind: ScalarKind,
    /// Maximum string length when `kind` is `String`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    /// Precision and scale when `kind` is `Decimal`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision_scale: Option<(u8, u8)>,
}

impl RelationalScalarType {
    pub fn new(kind: ScalarKind) -> Self {
        RelationalScalarType {
            kind,
            max_length: None,
            precision_scale: None,
        }
    }

    pub fn string_with_max_length(max_length: u32) -> Self {
        RelationalScalarType {
            kind: ScalarKind::String,
            max_length: Some(max_length),
            precision_scale: None,
        }
    }

    pub fn decimal_with_precision(precision: u8, scale: u8) -> Self {
        RelationalScalarType {
            kind: ScalarKind::Decimal,
            max_length: None,
            precision_scale: Some((precision, scale)),
        }
    }
}

/// A derived table column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbColumnModel {
    pub column_name: DbColumnName,
    pub kind: ColumnKind,
    /// Scalar type metadata when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scalar_type: Option<RelationalScalarType>,
    pub is_nullable: bool,
    /// The JSONPath that sources the column value, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_json_path: Option<JsonPathExpression>,
    /// The referenced resource for FK columns, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_resource: Option<QualifiedResourceName>,
}

//! Resource-level model types
//!
//! One `RelationalResourceModel` is derived per concrete resource. Set-level
//! passes rewrite models by whole-value replacement only, so outputs of
//! earlier stages are never silently altered in place.

use serde::{Deserialize, Serialize};

use super::descriptor::DescriptorMetadata;
use super::identifiers::{DbColumnName, DbSchemaName, DbTableName, QualifiedResourceName};
use super::table::DbTableModel;
use crate::paths::JsonPathExpression;

/// The storage strategy for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceStorageKind {
    /// Default: per-project schema tables (root plus collection tables)
    RelationalTables,
    /// Descriptor resources stored in the shared descriptor table
    SharedDescriptorTable,
}

/// The derived relational model for a single concrete resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationalResourceModel {
    pub resource: QualifiedResourceName,
    /// The owning project schema; for shared-storage resources this can
    /// differ from the root table's schema
    pub physical_schema: DbSchemaName,
    pub storage_kind: ResourceStorageKind,
    /// The root table (JSON scope `$`)
    pub root: DbTableModel,
    /// Tables in read reconstitution order (root first, then collections)
    pub tables_in_read_dependency_order: Vec<DbTableModel>,
    /// Tables in write flattening order
    pub tables_in_write_dependency_order: Vec<DbTableModel>,
    pub document_reference_bindings: Vec<DocumentReferenceBinding>,
    pub descriptor_edge_sources: Vec<DescriptorEdgeSource>,
}

/// Binds a referenced identity JSONPath under a reference object to its
/// stored local column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceIdentityBinding {
    pub reference_json_path: JsonPathExpression,
    pub column: DbColumnName,
}

/// An FK edge from a table to another resource's document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReferenceBinding {
    /// Whether the reference participates in the resource identity projection
    pub is_identity_component: bool,
    pub reference_object_path: JsonPathExpression,
    /// The table owning the scope that contains the reference path
    pub table: DbTableName,
    pub fk_column: DbColumnName,
    pub target_resource: QualifiedResourceName,
    /// Per-identity-part bindings for locally stored reference identity columns
    pub identity_bindings: Vec<ReferenceIdentityBinding>,
}

/// An FK edge from a table to the shared descriptor table
///
/// Structurally analogous to a document reference binding but always resolves
/// to the fixed descriptor contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorEdgeSource {
    pub is_identity_component: bool,
    pub descriptor_value_path: JsonPathExpression,
    pub table: DbTableName,
    pub fk_column: DbColumnName,
    pub descriptor_resource: QualifiedResourceName,
}

/// A location where named extension projects may attach additional data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionSite {
    /// The JSONPath scope of the table that owns the extension site
    pub owning_scope: JsonPathExpression,
    /// The JSONPath of the extension object under the owning scope
    pub extension_path: JsonPathExpression,
    /// The extension project keys present under this site
    pub project_keys: Vec<String>,
}

/// A configured project schema and its physical database schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSchemaInfo {
    pub project_endpoint_name: String,
    pub project_name: String,
    pub project_version: String,
    pub is_extension_project: bool,
    pub physical_schema: DbSchemaName,
}

/// Set-level wrapper for one concrete resource's derived model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcreteResourceModel {
    pub resource: QualifiedResourceName,
    pub storage_kind: ResourceStorageKind,
    pub relational_model: RelationalResourceModel,
    /// Present when `storage_kind` is the shared descriptor table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor_metadata: Option<DescriptorMetadata>,
}

/// Derived identity-bridging table for an abstract resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractIdentityTableInfo {
    pub resource: QualifiedResourceName,
    pub table_model: DbTableModel,
}

/// The complete derived relational model inventory for a schema set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedRelationalModelSet {
    pub project_schemas_in_endpoint_order: Vec<ProjectSchemaInfo>,
    pub concrete_resources_in_name_order: Vec<ConcreteResourceModel>,
    pub abstract_identity_tables_in_name_order: Vec<AbstractIdentityTableInfo>,
    /// Extension sites keyed by owning resource, in canonical resource order
    pub extension_sites_by_resource: Vec<(QualifiedResourceName, Vec<ExtensionSite>)>,
}

//! Data model for derived relational storage
//!
//! Closed shape sets (path segments, column kinds, constraints) are explicit
//! sum types with exhaustive matching so that new variants force review of
//! every consumer.

pub mod column;
pub mod descriptor;
pub mod identifiers;
pub mod resource;
pub mod table;

pub use column::{ColumnKind, DbColumnModel, RelationalScalarType, ScalarKind};
pub use descriptor::{
    canonical_descriptor_metadata, DescriptorColumnContract, DescriptorMetadata,
    DiscriminatorStrategy, DESCRIPTOR_NAME_SUFFIX, DESCRIPTOR_TABLE_NAME, DOCUMENT_TABLE_NAME,
    SHARED_SCHEMA_NAME,
};
pub use identifiers::{DbColumnName, DbSchemaName, DbTableName, QualifiedResourceName};
pub use resource::{
    AbstractIdentityTableInfo, ConcreteResourceModel, DerivedRelationalModelSet,
    DescriptorEdgeSource, DocumentReferenceBinding, ExtensionSite, ProjectSchemaInfo,
    ReferenceIdentityBinding, RelationalResourceModel, ResourceStorageKind,
};
pub use table::{DbKeyColumn, DbTableModel, ReferentialAction, TableConstraint, TableKey};

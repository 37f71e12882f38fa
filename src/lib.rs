//! Relational Modelling SDK
//!
//! Compiles document-oriented JSON Schema definitions of API resources into a
//! canonical relational storage model: tables, keys, columns, and
//! foreign-key relationships suitable for materializing JSON documents into a
//! relational store.
//!
//! Provides:
//! - A per-resource builder pipeline (input extraction, structural
//!   validation, extension-site discovery, table/key derivation, column and
//!   descriptor-edge derivation, canonical ordering)
//! - A set-level pass pipeline spanning every resource across every project
//!   (base traversal, descriptor mapping, extension tables, abstract
//!   identity tables, reference binding, constraint derivation)
//! - Deterministic canonicalization of every output collection
//! - Identifier-collision detection with aggregated reporting
//!
//! The whole derivation is synchronous, idempotent, and free of external
//! side effects: identical input always yields an identical canonical model.

pub mod builder;
pub mod collision;
pub mod error;
pub mod models;
pub mod naming;
pub mod ordering;
pub mod passes;
pub mod paths;
pub mod schema;
pub mod validation;

use serde_json::Value;

// Re-export commonly used types
pub use builder::{
    DescriptorPathSource, RelationalModelBuilderContext, RelationalModelBuilderStep,
    RelationalModelPipeline, TableColumnAccumulator,
};
pub use collision::{IdentifierCollisionDetector, IdentifierCollisionOrigin};
pub use error::{DerivationError, Result};
pub use models::{
    AbstractIdentityTableInfo, ColumnKind, ConcreteResourceModel, DbColumnModel, DbColumnName,
    DbKeyColumn, DbSchemaName, DbTableModel, DbTableName, DerivedRelationalModelSet,
    DescriptorEdgeSource, DescriptorMetadata, DiscriminatorStrategy, DocumentReferenceBinding,
    ExtensionSite, ProjectSchemaInfo, QualifiedResourceName, ReferenceIdentityBinding,
    ReferentialAction, RelationalResourceModel, RelationalScalarType, ResourceStorageKind,
    ScalarKind, TableConstraint, TableKey,
};
pub use passes::{RelationalModelSetBuilderContext, RelationalModelSetPass};
pub use paths::{JsonPathExpression, JsonPathSegment};
pub use schema::SchemaKind;

/// Derives the canonical relational model set from one schema document per
/// project
///
/// Runs the standard set-level pass registry in declared order and freezes
/// the result. Any failure aborts the derivation immediately; callers must
/// treat a failure as "this schema set cannot be served" rather than running
/// with a partial model.
pub fn derive_relational_model_set(
    project_schemas: Vec<Value>,
) -> Result<DerivedRelationalModelSet> {
    let mut context = RelationalModelSetBuilderContext::new(project_schemas)?;
    let passes = passes::standard_passes();

    passes::run_passes(&passes, &mut context)?;

    context.build_result()
}

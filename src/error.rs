//! Error taxonomy for relational model derivation
//!
//! Every failure at this layer reflects structurally invalid input, not a
//! transient condition, so nothing here is retried internally. Callers must
//! treat any failure as "this schema set cannot be served".

use thiserror::Error;

/// Error raised while deriving a relational model set
#[derive(Debug, Error)]
pub enum DerivationError {
    /// A required field is missing or mistyped in a schema document
    #[error("Schema corruption: {0}")]
    SchemaCorruption(String),

    /// A modeling invariant was broken (e.g. no root-scoped table)
    #[error("Modeling invariant violation: {0}")]
    InvariantViolation(String),

    /// Distinct identifiers collapsed onto one physical name
    #[error("Naming collision: {0}")]
    NamingCollision(String),

    /// A shared-descriptor-table resource failed naming or contract validation
    #[error("Contract violation: {0}")]
    ContractViolation(String),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, DerivationError>;

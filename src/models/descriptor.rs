//! Shared descriptor table contract
//!
//! Descriptor resources are controlled-vocabulary code/value resources. All of
//! them are stored in one shared physical table with a fixed column contract,
//! discriminated by resource identity rather than per-resource tables.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::identifiers::{DbColumnName, DbSchemaName, DbTableName};

/// Required suffix for descriptor resource names
pub const DESCRIPTOR_NAME_SUFFIX: &str = "Descriptor";

/// The internal schema owning the shared document and descriptor tables
pub static SHARED_SCHEMA_NAME: Lazy<DbSchemaName> = Lazy::new(|| DbSchemaName::new("dms"));

/// The shared document table every root table references
pub static DOCUMENT_TABLE_NAME: Lazy<DbTableName> =
    Lazy::new(|| DbTableName::new(SHARED_SCHEMA_NAME.clone(), "Document"));

/// The shared descriptor table
pub static DESCRIPTOR_TABLE_NAME: Lazy<DbTableName> =
    Lazy::new(|| DbTableName::new(SHARED_SCHEMA_NAME.clone(), "Descriptor"));

/// Discriminator strategy for descriptor resources in the shared table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscriminatorStrategy {
    /// Discriminate by the owning resource identity
    ResourceKeyId,
    /// Discriminate by a dedicated column on the shared table
    DescriptorColumn,
    /// Both strategies are recorded
    Both,
}

/// The canonical column contract for the shared descriptor table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorColumnContract {
    pub namespace: DbColumnName,
    pub code_value: DbColumnName,
    pub short_description: Option<DbColumnName>,
    pub description: Option<DbColumnName>,
    pub effective_begin_date: Option<DbColumnName>,
    pub effective_end_date: Option<DbColumnName>,
    pub discriminator: Option<DbColumnName>,
}

/// Metadata attached to resources stored in the shared descriptor table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorMetadata {
    pub column_contract: DescriptorColumnContract,
    pub discriminator_strategy: DiscriminatorStrategy,
}

/// Builds the fixed descriptor metadata attached to every mapped descriptor
/// resource: the canonical column contract with no discriminator column,
/// keyed by resource identity.
pub fn canonical_descriptor_metadata() -> DescriptorMetadata {
    DescriptorMetadata {
        column_contract: DescriptorColumnContract {
            namespace: DbColumnName::new("Namespace"),
            code_value: DbColumnName::new("CodeValue"),
            short_description: Some(DbColumnName::new("ShortDescription")),
            description: Some(DbColumnName::new("Description")),
            effective_begin_date: Some(DbColumnName::new("EffectiveBeginDate")),
            effective_end_date: Some(DbColumnName::new("EffectiveEndDate")),
            discriminator: None,
        },
        discriminator_strategy: DiscriminatorStrategy::ResourceKeyId,
    }
}

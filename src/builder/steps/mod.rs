//! Builder pipeline steps

mod canonicalize_ordering;
mod derive_columns;
mod derive_table_scopes;
mod discover_extension_sites;
mod extract_inputs;
mod validate_schema;

pub use canonicalize_ordering::CanonicalizeOrderingStep;
pub use derive_columns::DeriveColumnsAndDescriptorEdgesStep;
pub use derive_table_scopes::DeriveTableScopesAndKeysStep;
pub use discover_extension_sites::DiscoverExtensionSitesStep;
pub use extract_inputs::ExtractInputsStep;
pub use validate_schema::ValidateJsonSchemaStep;

pub(crate) use derive_columns::resolve_scalar_type;

//! Final ordering step for the per-resource pipeline

use crate::builder::context::RelationalModelBuilderContext;
use crate::builder::RelationalModelBuilderStep;
use crate::error::{DerivationError, Result};
use crate::ordering;

/// Applies canonical ordering to the derived resource model and its extension
/// sites so the output is independent of source enumeration order
pub struct CanonicalizeOrderingStep;

impl RelationalModelBuilderStep for CanonicalizeOrderingStep {
    fn name(&self) -> &'static str {
        "canonicalize-ordering"
    }

    fn execute(&self, context: &mut RelationalModelBuilderContext) -> Result<()> {
        let resource_model = context.resource_model.as_ref().ok_or_else(|| {
            DerivationError::InvariantViolation(
                "Resource model must be derived before canonicalizing ordering".to_string(),
            )
        })?;

        let canonical_model = ordering::canonicalize_resource_model(resource_model)?;
        let canonical_sites = ordering::canonicalize_extension_sites(&context.extension_sites);

        context.resource_model = Some(canonical_model);
        context.extension_sites = canonical_sites;

        Ok(())
    }
}

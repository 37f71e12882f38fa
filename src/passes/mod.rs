//! Set-level pass pipeline
//!
//! Passes run in ascending declared order over the shared builder context.
//! Base traversal derives each concrete resource model; later passes enrich
//! models with descriptor storage mapping, extension tables, abstract
//! identity tables, cross-resource reference bindings, and constraints,
//! before a final canonicalization sweep.

pub mod abstract_identity;
pub mod base_traversal;
pub mod canonical_sweep;
pub mod constraint_derivation;
pub mod context;
pub mod descriptor_mapping;
pub mod extension_tables;
pub mod reference_binding;

use tracing::info;

use crate::error::{DerivationError, Result};

pub use abstract_identity::AbstractIdentityTableDerivationPass;
pub use base_traversal::BaseTraversalPass;
pub use canonical_sweep::CanonicalizeModelSetPass;
pub use constraint_derivation::ConstraintDerivationPass;
pub use context::{ConcreteResourceSchemaContext, RelationalModelSetBuilderContext};
pub use descriptor_mapping::DescriptorTableMappingPass;
pub use extension_tables::ExtensionTableDerivationPass;
pub use reference_binding::ReferenceBindingPass;

/// One pass over the shared set-level context
pub trait RelationalModelSetPass {
    /// Stable pass name used in logs
    fn name(&self) -> &'static str;

    /// The unique ordering position for this pass
    fn order(&self) -> u32;

    /// Executes the pass against the shared context
    fn execute(&self, context: &mut RelationalModelSetBuilderContext) -> Result<()>;
}

/// The standard pass registry in declared order
pub fn standard_passes() -> Vec<Box<dyn RelationalModelSetPass>> {
    vec![
        Box::new(BaseTraversalPass),
        Box::new(DescriptorTableMappingPass),
        Box::new(ExtensionTableDerivationPass),
        Box::new(AbstractIdentityTableDerivationPass),
        Box::new(ReferenceBindingPass),
        Box::new(ConstraintDerivationPass),
        Box::new(CanonicalizeModelSetPass),
    ]
}

/// Runs passes in ascending order; duplicate orders are rejected
pub fn run_passes(
    passes: &[Box<dyn RelationalModelSetPass>],
    context: &mut RelationalModelSetBuilderContext,
) -> Result<()> {
    let mut ordered: Vec<&Box<dyn RelationalModelSetPass>> = passes.iter().collect();
    ordered.sort_by_key(|pass| pass.order());

    for window in ordered.windows(2) {
        if window[0].order() == window[1].order() {
            return Err(DerivationError::InvariantViolation(format!(
                "Set passes '{}' and '{}' declare the same order {}",
                window[0].name(),
                window[1].name(),
                window[0].order()
            )));
        }
    }

    for pass in ordered {
        info!(pass = pass.name(), order = pass.order(), "Running set pass");
        pass.execute(context)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedPass(&'static str, u32);

    impl RelationalModelSetPass for NamedPass {
        fn name(&self) -> &'static str {
            self.0
        }

        fn order(&self) -> u32 {
            self.1
        }

        fn execute(&self, _context: &mut RelationalModelSetBuilderContext) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn duplicate_pass_orders_are_rejected() {
        let passes: Vec<Box<dyn RelationalModelSetPass>> =
            vec![Box::new(NamedPass("a", 10)), Box::new(NamedPass("b", 10))];
        let mut context = RelationalModelSetBuilderContext::new(Vec::new()).unwrap();

        let error = run_passes(&passes, &mut context).unwrap_err();
        assert!(error.to_string().contains("same order 10"));
    }

    #[test]
    fn standard_pass_orders_are_unique_and_ascending() {
        let passes = standard_passes();
        let mut orders: Vec<u32> = passes.iter().map(|pass| pass.order()).collect();
        let original = orders.clone();
        orders.sort();
        orders.dedup();

        assert_eq!(orders.len(), passes.len());
        assert_eq!(orders, original);
        assert_eq!(passes[0].order(), 0);
    }
}

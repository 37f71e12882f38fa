//! Per-resource builder pipeline
//!
//! Runs an ordered sequence of steps over a fresh per-resource context and
//! produces one resource model plus its extension sites. The pipeline itself
//! is stateless and reusable; each step owns a disjoint concern and fails
//! fast when a prerequisite output is absent.

pub mod accumulator;
pub mod context;
pub mod steps;

use tracing::debug;

use crate::error::{DerivationError, Result};
use crate::models::{ExtensionSite, RelationalResourceModel};

pub use accumulator::TableColumnAccumulator;
pub use context::{
    AppliedNameOverride, DescriptorPathSource, RelationalModelBuilderContext,
};

/// One step of the per-resource builder pipeline
pub trait RelationalModelBuilderStep {
    /// Stable step name used in logs
    fn name(&self) -> &'static str;

    /// Executes the step against the shared per-resource context
    fn execute(&self, context: &mut RelationalModelBuilderContext) -> Result<()>;
}

/// The configured, reusable step sequence for one resource derivation
pub struct RelationalModelPipeline {
    steps: Vec<Box<dyn RelationalModelBuilderStep>>,
}

impl RelationalModelPipeline {
    /// Builds the standard pipeline: input extraction, structural validation,
    /// extension-site discovery, table-scope/key derivation, column and
    /// descriptor-edge derivation, and final ordering
    pub fn standard() -> Self {
        RelationalModelPipeline {
            steps: vec![
                Box::new(steps::ExtractInputsStep),
                Box::new(steps::ValidateJsonSchemaStep),
                Box::new(steps::DiscoverExtensionSitesStep),
                Box::new(steps::DeriveTableScopesAndKeysStep),
                Box::new(steps::DeriveColumnsAndDescriptorEdgesStep),
                Box::new(steps::CanonicalizeOrderingStep),
            ],
        }
    }

    /// Builds a pipeline from an explicit step sequence
    pub fn with_steps(steps: Vec<Box<dyn RelationalModelBuilderStep>>) -> Self {
        RelationalModelPipeline { steps }
    }

    /// Runs every step in configured order and freezes the result
    ///
    /// The derived model and extension sites are moved out of the context;
    /// the context must not be reused for another resource.
    pub fn run(
        &self,
        context: &mut RelationalModelBuilderContext,
    ) -> Result<(RelationalResourceModel, Vec<ExtensionSite>)> {
        for step in &self.steps {
            debug!(
                step = step.name(),
                resource = %context.resource_endpoint_name,
                "Running builder step"
            );
            step.execute(context)?;
        }

        let resource_model = context.resource_model.take().ok_or_else(|| {
            DerivationError::InvariantViolation(format!(
                "The builder pipeline produced no resource model for '{}'",
                context.resource_endpoint_name
            ))
        })?;

        Ok((resource_model, std::mem::take(&mut context.extension_sites)))
    }
}

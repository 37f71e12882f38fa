//! Base traversal pass (order 0)

use tracing::{debug, info};

use crate::builder::{DescriptorPathSource, RelationalModelBuilderContext, RelationalModelPipeline};
use crate::error::Result;
use crate::models::ConcreteResourceModel;
use crate::passes::context::RelationalModelSetBuilderContext;
use crate::passes::RelationalModelSetPass;
use crate::schema::resources;

/// Runs the per-resource builder pipeline for every concrete, non-extension
/// resource in canonical name order
///
/// Resources flagged as extensions are excluded from independent modeling;
/// they contribute only to their base resource's extension sites. The
/// extension flag must be present and boolean on every resource schema.
pub struct BaseTraversalPass;

impl RelationalModelSetPass for BaseTraversalPass {
    fn name(&self) -> &'static str {
        "base-traversal"
    }

    fn order(&self) -> u32 {
        0
    }

    fn execute(&self, context: &mut RelationalModelSetBuilderContext) -> Result<()> {
        let pipeline = RelationalModelPipeline::standard();
        let entries = context.resource_entries().to_vec();

        for entry in entries {
            let resource = entry.resource();
            let resource_schema = context.resource_schema(&entry)?;

            if resources::is_resource_extension(resource_schema, &resource.to_string())? {
                debug!(resource = %resource, "Skipping resource extension");
                continue;
            }

            let schema_root = context.schema_root_for_project(entry.project_index);
            let descriptor_paths = context.descriptor_paths_for(&resource);

            // A fresh context per resource; it is frozen once the pipeline
            // completes.
            let mut builder_context = RelationalModelBuilderContext::new(
                schema_root,
                entry.resource_endpoint_name.clone(),
                DescriptorPathSource::Precomputed,
                descriptor_paths,
            );

            let (relational_model, extension_sites) = pipeline.run(&mut builder_context)?;

            context.record_applied_name_overrides(&builder_context.applied_name_overrides);

            info!(
                resource = %resource,
                tables = relational_model.tables_in_read_dependency_order.len(),
                "Derived relational model"
            );

            context.concrete_resources.push(ConcreteResourceModel {
                resource: relational_model.resource.clone(),
                storage_kind: relational_model.storage_kind,
                relational_model,
                descriptor_metadata: None,
            });

            context.register_extension_sites(resource, extension_sites)?;
        }

        Ok(())
    }
}

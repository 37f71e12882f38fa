//! Descriptor-resource mapping pass (order 10)

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::Result;
use crate::models::{
    canonical_descriptor_metadata, ConcreteResourceModel, QualifiedResourceName,
    RelationalResourceModel, ResourceStorageKind,
};
use crate::passes::context::RelationalModelSetBuilderContext;
use crate::passes::RelationalModelSetPass;
use crate::schema::resources;
use crate::validation;

/// Rewrites descriptor resources to shared-descriptor-table storage
///
/// Builds a (project, resource) schema lookup once, validates each descriptor
/// resource against the fixed descriptor contract, and replaces the model
/// whole-value with the canonical column contract and discriminator strategy
/// attached. Models already carrying the shared storage kind are defensively
/// re-checked against the naming convention.
pub struct DescriptorTableMappingPass;

impl RelationalModelSetPass for DescriptorTableMappingPass {
    fn name(&self) -> &'static str {
        "descriptor-table-mapping"
    }

    fn order(&self) -> u32 {
        10
    }

    fn execute(&self, context: &mut RelationalModelSetBuilderContext) -> Result<()> {
        // One lookup up front instead of a linear scan per model.
        let entry_indices: BTreeMap<QualifiedResourceName, usize> = context
            .resource_entries()
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.resource(), index))
            .collect();

        for model_index in 0..context.concrete_resources.len() {
            let model = &context.concrete_resources[model_index];
            let resource = model.resource.clone();
            let already_shared = model.storage_kind == ResourceStorageKind::SharedDescriptorTable;

            let Some(entry_index) = entry_indices.get(&resource).copied() else {
                continue;
            };

            let entry = context.resource_entries()[entry_index].clone();
            let resource_schema = context.resource_schema(&entry)?;
            let is_descriptor = resources::is_descriptor(resource_schema, &resource.to_string())?;

            if !is_descriptor {
                if already_shared {
                    validation::validate_descriptor_naming(&resource)?;
                }
                continue;
            }

            validation::validate_descriptor_naming(&resource)?;
            validation::validate_descriptor_contract(resource_schema, &resource)?;

            debug!(resource = %resource, "Mapping descriptor resource to shared storage");

            let model = &context.concrete_resources[model_index];
            let relational_model = RelationalResourceModel {
                storage_kind: ResourceStorageKind::SharedDescriptorTable,
                ..model.relational_model.clone()
            };

            context.replace_resource(
                model_index,
                ConcreteResourceModel {
                    resource,
                    storage_kind: ResourceStorageKind::SharedDescriptorTable,
                    relational_model,
                    descriptor_metadata: Some(canonical_descriptor_metadata()),
                },
            );
        }

        Ok(())
    }
}

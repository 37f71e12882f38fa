//! Shared set-level builder context
//!
//! Aggregates the schema documents for every project, the concrete resource
//! schemas in canonical name order, the evolving concrete resource models,
//! descriptor-path lookups, and the extension-site registry. The context is
//! mutated by exactly one pass at a time, in declared order; its caches are
//! scoped to one derivation run and never shared across runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::builder::AppliedNameOverride;
use crate::collision::IdentifierCollisionDetector;
use crate::error::{DerivationError, Result};
use crate::models::{
    AbstractIdentityTableInfo, ConcreteResourceModel, DerivedRelationalModelSet, ExtensionSite,
    ProjectSchemaInfo, QualifiedResourceName,
};
use crate::naming;
use crate::ordering;
use crate::schema::resources::{self, DescriptorPathInfo};
use crate::schema::{require_bool, require_object, require_string};

/// One concrete resource schema entry, in canonical name order
#[derive(Debug, Clone)]
pub struct ConcreteResourceSchemaContext {
    pub project_index: usize,
    pub project_name: String,
    pub project_endpoint_name: String,
    pub resource_endpoint_name: String,
    pub resource_name: String,
}

impl ConcreteResourceSchemaContext {
    /// The qualified resource identity for this entry
    pub fn resource(&self) -> QualifiedResourceName {
        QualifiedResourceName::new(&self.project_name, &self.resource_name)
    }
}

/// Shared mutable context passed through set-level derivation passes
pub struct RelationalModelSetBuilderContext {
    documents: Vec<Value>,
    project_infos: Vec<ProjectSchemaInfo>,
    resource_entries: Vec<ConcreteResourceSchemaContext>,

    /// Concrete resource models, appended by base traversal and replaced by
    /// index (whole-value) by later passes
    pub concrete_resources: Vec<ConcreteResourceModel>,
    /// Abstract identity tables, appended by abstract identity derivation
    pub abstract_identity_tables: Vec<AbstractIdentityTableInfo>,

    descriptor_paths_by_resource:
        BTreeMap<QualifiedResourceName, BTreeMap<String, DescriptorPathInfo>>,
    extension_sites_by_resource: BTreeMap<QualifiedResourceName, Vec<ExtensionSite>>,
    applied_name_overrides: BTreeMap<(String, String, String), String>,
    schema_root_cache: HashMap<String, Arc<Value>>,
    collision_detector: IdentifierCollisionDetector,
}

impl RelationalModelSetBuilderContext {
    /// Builds a context from one schema document per project
    ///
    /// Validates project-level structure, orders projects by endpoint name
    /// and resources by (project, resource) name, and precomputes descriptor
    /// paths per resource.
    pub fn new(project_schemas: Vec<Value>) -> Result<Self> {
        let mut projects: Vec<(ProjectSchemaInfo, Value)> = Vec::with_capacity(project_schemas.len());

        for document in project_schemas {
            let project_schema = require_object(document.get("projectSchema"), "projectSchema")?;
            let project_name = require_string(project_schema, "projectName", "projectSchema")?;
            let project_endpoint_name =
                require_string(project_schema, "projectEndpointName", "projectSchema")?;
            let project_version = require_string(project_schema, "projectVersion", "projectSchema")?;
            let is_extension_project =
                require_bool(project_schema, "isExtensionProject", "projectSchema")?;
            require_object(
                project_schema.get("resourceSchemas"),
                "projectSchema.resourceSchemas",
            )?;

            let info = ProjectSchemaInfo {
                project_endpoint_name: project_endpoint_name.to_string(),
                project_name: project_name.to_string(),
                project_version: project_version.to_string(),
                is_extension_project,
                physical_schema: naming::normalize_schema_name(project_endpoint_name),
            };

            projects.push((info, document));
        }

        projects.sort_by(|a, b| a.0.project_endpoint_name.cmp(&b.0.project_endpoint_name));

        for window in projects.windows(2) {
            if window[0].0.project_endpoint_name == window[1].0.project_endpoint_name {
                return Err(DerivationError::SchemaCorruption(format!(
                    "Project endpoint name '{}' is configured more than once",
                    window[0].0.project_endpoint_name
                )));
            }
        }

        let (project_infos, documents): (Vec<ProjectSchemaInfo>, Vec<Value>) =
            projects.into_iter().unzip();

        let mut context = RelationalModelSetBuilderContext {
            documents,
            project_infos,
            resource_entries: Vec::new(),
            concrete_resources: Vec::new(),
            abstract_identity_tables: Vec::new(),
            descriptor_paths_by_resource: BTreeMap::new(),
            extension_sites_by_resource: BTreeMap::new(),
            applied_name_overrides: BTreeMap::new(),
            schema_root_cache: HashMap::new(),
            collision_detector: IdentifierCollisionDetector::new(),
        };

        context.resource_entries = context.build_resource_entries_in_name_order()?;
        context.descriptor_paths_by_resource = context.build_descriptor_paths_by_resource()?;

        Ok(context)
    }

    /// Project schemas in canonical endpoint order
    pub fn project_infos(&self) -> &[ProjectSchemaInfo] {
        &self.project_infos
    }

    /// Concrete resource schema entries in canonical (project, resource) order
    pub fn resource_entries(&self) -> &[ConcreteResourceSchemaContext] {
        &self.resource_entries
    }

    /// The `projectSchema` object for a project
    pub fn project_schema_object(&self, project_index: usize) -> Result<&Map<String, Value>> {
        require_object(
            self.documents[project_index].get("projectSchema"),
            "projectSchema",
        )
    }

    /// Resolves or creates the cached schema root for a project endpoint
    ///
    /// Repeated resources within one project share the same root object
    /// rather than rebuilding it. The cache lives and dies with this run.
    pub fn schema_root_for_project(&mut self, project_index: usize) -> Arc<Value> {
        let endpoint = self.project_infos[project_index].project_endpoint_name.clone();

        if let Some(root) = self.schema_root_cache.get(&endpoint) {
            return Arc::clone(root);
        }

        let root = Arc::new(self.documents[project_index].clone());
        self.schema_root_cache.insert(endpoint, Arc::clone(&root));
        root
    }

    /// The resource schema object for an entry
    pub fn resource_schema(
        &self,
        entry: &ConcreteResourceSchemaContext,
    ) -> Result<&Map<String, Value>> {
        let project_schema = self.project_schema_object(entry.project_index)?;
        let resource_schemas = require_object(
            project_schema.get("resourceSchemas"),
            "projectSchema.resourceSchemas",
        )?;

        require_object(
            resource_schemas.get(&entry.resource_endpoint_name),
            &format!(
                "projectSchema.resourceSchemas['{}']",
                entry.resource_endpoint_name
            ),
        )
    }

    /// Descriptor paths precomputed for a resource, keyed by canonical path
    pub fn descriptor_paths_for(
        &self,
        resource: &QualifiedResourceName,
    ) -> BTreeMap<String, DescriptorPathInfo> {
        self.descriptor_paths_by_resource
            .get(resource)
            .cloned()
            .unwrap_or_default()
    }

    /// Registers extension sites discovered for a resource
    pub fn register_extension_sites(
        &mut self,
        resource: QualifiedResourceName,
        extension_sites: Vec<ExtensionSite>,
    ) -> Result<()> {
        if self.extension_sites_by_resource.contains_key(&resource) {
            return Err(DerivationError::InvariantViolation(format!(
                "Extension sites are already registered for resource '{resource}'"
            )));
        }

        self.extension_sites_by_resource.insert(resource, extension_sites);

        Ok(())
    }

    /// Extension sites registered for a resource
    pub fn extension_sites_for(&self, resource: &QualifiedResourceName) -> &[ExtensionSite] {
        self.extension_sites_by_resource
            .get(resource)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All registered extension sites keyed by owning resource
    pub fn extension_sites_by_resource(
        &self,
    ) -> &BTreeMap<QualifiedResourceName, Vec<ExtensionSite>> {
        &self.extension_sites_by_resource
    }

    /// Records name overrides applied while deriving a resource
    pub fn record_applied_name_overrides(&mut self, overrides: &[AppliedNameOverride]) {
        for applied in overrides {
            self.applied_name_overrides.insert(
                (
                    applied.schema.clone(),
                    applied.table.clone(),
                    applied.column.clone(),
                ),
                applied.original.clone(),
            );
        }
    }

    /// The pre-override identifier for a column, when an override applied
    pub fn original_column_name(&self, schema: &str, table: &str, column: &str) -> Option<&str> {
        self.applied_name_overrides
            .get(&(schema.to_string(), table.to_string(), column.to_string()))
            .map(String::as_str)
    }

    /// The collision detector shared across the run
    pub fn collision_detector_mut(&mut self) -> &mut IdentifierCollisionDetector {
        &mut self.collision_detector
    }

    /// Runs the aggregated collision check
    pub fn check_collisions(&self) -> Result<()> {
        self.collision_detector.check()
    }

    /// Finds the index of a derived concrete resource model
    pub fn find_resource_index(&self, resource: &QualifiedResourceName) -> Option<usize> {
        self.concrete_resources
            .iter()
            .position(|model| &model.resource == resource)
    }

    /// Replaces a concrete resource model by index (whole-value update)
    pub fn replace_resource(&mut self, index: usize, model: ConcreteResourceModel) {
        self.concrete_resources[index] = model;
    }

    /// Freezes the context into the immutable derived model set
    pub fn build_result(mut self) -> Result<DerivedRelationalModelSet> {
        self.concrete_resources.sort_by(|a, b| {
            a.resource
                .project_name
                .cmp(&b.resource.project_name)
                .then_with(|| a.resource.resource_name.cmp(&b.resource.resource_name))
        });

        self.abstract_identity_tables.sort_by(|a, b| {
            a.resource
                .project_name
                .cmp(&b.resource.project_name)
                .then_with(|| a.resource.resource_name.cmp(&b.resource.resource_name))
        });

        let extension_sites_by_resource: Vec<(QualifiedResourceName, Vec<ExtensionSite>)> = self
            .extension_sites_by_resource
            .into_iter()
            .map(|(resource, sites)| (resource, ordering::canonicalize_extension_sites(&sites)))
            .collect();

        Ok(DerivedRelationalModelSet {
            project_schemas_in_endpoint_order: self.project_infos,
            concrete_resources_in_name_order: self.concrete_resources,
            abstract_identity_tables_in_name_order: self.abstract_identity_tables,
            extension_sites_by_resource,
        })
    }

    /// Enumerates and orders all resource schema entries across all projects
    fn build_resource_entries_in_name_order(&self) -> Result<Vec<ConcreteResourceSchemaContext>> {
        let mut entries = Vec::new();

        for (project_index, info) in self.project_infos.iter().enumerate() {
            let project_schema = self.project_schema_object(project_index)?;
            let resource_schemas = require_object(
                project_schema.get("resourceSchemas"),
                "projectSchema.resourceSchemas",
            )?;

            for (resource_key, resource_schema) in resource_schemas {
                if resource_key.trim().is_empty() {
                    return Err(DerivationError::SchemaCorruption(
                        "Expected resource schema entry keys to be non-empty, invalid schema document"
                            .to_string(),
                    ));
                }

                let Value::Object(resource_schema) = resource_schema else {
                    return Err(DerivationError::SchemaCorruption(format!(
                        "Expected projectSchema.resourceSchemas['{resource_key}'] to be an object, invalid schema document"
                    )));
                };

                entries.push(ConcreteResourceSchemaContext {
                    project_index,
                    project_name: info.project_name.clone(),
                    project_endpoint_name: info.project_endpoint_name.clone(),
                    resource_endpoint_name: resource_key.clone(),
                    resource_name: resources::resource_name(resource_key, resource_schema)?,
                });
            }
        }

        entries.sort_by(|a, b| {
            a.project_name
                .cmp(&b.project_name)
                .then_with(|| a.resource_name.cmp(&b.resource_name))
        });

        let mut duplicates = Vec::new();
        for window in entries.windows(2) {
            if window[0].project_name == window[1].project_name
                && window[0].resource_name == window[1].resource_name
            {
                duplicates.push(window[1].resource().to_string());
            }
        }

        if !duplicates.is_empty() {
            return Err(DerivationError::InvariantViolation(format!(
                "Duplicate concrete resources detected for: {}",
                duplicates.join(", ")
            )));
        }

        Ok(entries)
    }

    /// Precomputes descriptor paths declared by each resource's paths mapping
    fn build_descriptor_paths_by_resource(
        &self,
    ) -> Result<BTreeMap<QualifiedResourceName, BTreeMap<String, DescriptorPathInfo>>> {
        let mut paths_by_resource = BTreeMap::new();

        for entry in &self.resource_entries {
            let resource_schema = self.resource_schema(entry)?;
            let resource = entry.resource();

            let descriptor_entries =
                resources::descriptor_path_entries(resource_schema, &resource.to_string())?;

            if descriptor_entries.is_empty() {
                continue;
            }

            let mut paths = BTreeMap::new();
            for (canonical, info) in descriptor_entries {
                paths.insert(canonical, info);
            }

            paths_by_resource.insert(resource, paths);
        }

        Ok(paths_by_resource)
    }
}

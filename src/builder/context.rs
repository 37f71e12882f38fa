//! Per-resource builder context
//!
//! A context is created fresh per concrete resource, mutated in place by the
//! pipeline steps, and frozen when the pipeline completes. Steps that depend
//! on a prior step's output fail fast with a descriptive error when that
//! output is absent.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{DerivationError, Result};
use crate::models::{ExtensionSite, RelationalResourceModel};
use crate::paths::JsonPathExpression;
use crate::schema::resources::{DecimalValidationInfo, DescriptorPathInfo, DocumentReferenceMapping};

/// Indicates where descriptor-path information comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorPathSource {
    /// Supplied by the set-level context before the pipeline runs
    Precomputed,
    /// Computed by the input extraction step from the resource's own schema
    ComputedInline,
}

/// A column name override consumed during derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedNameOverride {
    pub schema: String,
    pub table: String,
    pub column: String,
    /// The derived name the override replaced
    pub original: String,
}

/// Mutable state threaded through the per-resource builder pipeline
#[derive(Debug)]
pub struct RelationalModelBuilderContext {
    /// The wrapped schema document root for the owning project
    pub api_schema_root: Arc<Value>,
    /// The resource's endpoint name within the project schema
    pub resource_endpoint_name: String,
    pub descriptor_path_source: DescriptorPathSource,
    /// Descriptor path info keyed by canonical JSONPath
    pub descriptor_paths_by_json_path: BTreeMap<String, DescriptorPathInfo>,

    // Populated by input extraction.
    pub project_name: Option<String>,
    pub project_endpoint_name: Option<String>,
    pub project_version: Option<String>,
    pub resource_name: Option<String>,
    pub is_descriptor_resource: Option<bool>,
    pub json_schema_for_insert: Option<Value>,
    pub identity_json_paths: Vec<JsonPathExpression>,
    pub decimal_validation_infos: BTreeMap<String, DecimalValidationInfo>,
    pub document_reference_mappings: Vec<DocumentReferenceMapping>,
    /// Column name overrides keyed by canonical source path
    pub name_overrides: BTreeMap<String, String>,
    /// Override paths consumed while deriving columns
    pub consumed_name_overrides: Vec<String>,
    pub applied_name_overrides: Vec<AppliedNameOverride>,

    // Populated by derivation steps.
    pub resource_model: Option<RelationalResourceModel>,
    pub extension_sites: Vec<ExtensionSite>,
}

impl RelationalModelBuilderContext {
    /// Creates a fresh context with precomputed descriptor paths
    pub fn new(
        api_schema_root: Arc<Value>,
        resource_endpoint_name: impl Into<String>,
        descriptor_path_source: DescriptorPathSource,
        descriptor_paths_by_json_path: BTreeMap<String, DescriptorPathInfo>,
    ) -> Self {
        RelationalModelBuilderContext {
            api_schema_root,
            resource_endpoint_name: resource_endpoint_name.into(),
            descriptor_path_source,
            descriptor_paths_by_json_path,
            project_name: None,
            project_endpoint_name: None,
            project_version: None,
            resource_name: None,
            is_descriptor_resource: None,
            json_schema_for_insert: None,
            identity_json_paths: Vec::new(),
            decimal_validation_infos: BTreeMap::new(),
            document_reference_mappings: Vec::new(),
            name_overrides: BTreeMap::new(),
            consumed_name_overrides: Vec::new(),
            applied_name_overrides: Vec::new(),
            resource_model: None,
            extension_sites: Vec::new(),
        }
    }

    /// Looks up descriptor path info for a canonical path, failing when absent
    pub fn descriptor_path(&self, path: &JsonPathExpression) -> Result<&DescriptorPathInfo> {
        self.try_descriptor_path(path).ok_or_else(|| {
            DerivationError::InvariantViolation(format!(
                "Descriptor path '{path}' was not found for resource '{}'",
                self.resource_endpoint_name
            ))
        })
    }

    /// Looks up descriptor path info for a canonical path
    ///
    /// Later steps use this accessor so they stay agnostic of whether the
    /// paths were precomputed or computed inline.
    pub fn try_descriptor_path(&self, path: &JsonPathExpression) -> Option<&DescriptorPathInfo> {
        self.descriptor_paths_by_json_path.get(path.canonical())
    }

    /// The project name, failing fast when extraction has not run
    pub fn require_project_name(&self) -> Result<&str> {
        require_context_value(self.project_name.as_deref(), "project name")
    }

    /// The project endpoint name, failing fast when extraction has not run
    pub fn require_project_endpoint_name(&self) -> Result<&str> {
        require_context_value(self.project_endpoint_name.as_deref(), "project endpoint name")
    }

    /// The resource name, failing fast when extraction has not run
    pub fn require_resource_name(&self) -> Result<&str> {
        require_context_value(self.resource_name.as_deref(), "resource name")
    }

    /// Whether the resource is a descriptor, failing fast when unknown
    pub fn require_is_descriptor_resource(&self) -> Result<bool> {
        self.is_descriptor_resource.ok_or_else(|| {
            DerivationError::InvariantViolation(
                "Descriptor flag must be extracted before it is read".to_string(),
            )
        })
    }

    /// The insert schema, failing fast when extraction has not run
    pub fn require_json_schema_for_insert(&self) -> Result<&Value> {
        self.json_schema_for_insert.as_ref().ok_or_else(|| {
            DerivationError::InvariantViolation(
                "Insert schema must be extracted before derivation".to_string(),
            )
        })
    }

    /// The derived resource model, failing fast when derivation has not run
    pub fn require_resource_model(&self) -> Result<&RelationalResourceModel> {
        self.resource_model.as_ref().ok_or_else(|| {
            DerivationError::InvariantViolation(
                "Resource model must be derived before it is read".to_string(),
            )
        })
    }
}

fn require_context_value<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str> {
    value.ok_or_else(|| {
        DerivationError::InvariantViolation(format!("The {what} must be extracted before it is read"))
    })
}

//! Reference binding pass (order 30)

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::builder::steps::resolve_scalar_type;
use crate::builder::TableColumnAccumulator;
use crate::error::{DerivationError, Result};
use crate::models::{
    ColumnKind, ConcreteResourceModel, DbColumnModel, DbColumnName, DbTableModel,
    DocumentReferenceBinding, QualifiedResourceName, ReferenceIdentityBinding,
    RelationalResourceModel, RelationalScalarType, ScalarKind,
};
use crate::naming;
use crate::passes::context::RelationalModelSetBuilderContext;
use crate::passes::RelationalModelSetPass;
use crate::paths::{JsonPathExpression, JsonPathSegment};
use crate::schema::resources::{self, DecimalValidationInfo, DocumentReferenceMapping};
use crate::schema::{determine_schema_kind, resolve_schema_at_path, SchemaKind};

/// Binds document references into derived tables
///
/// Each reference mapping adds a `*_DocumentId` FK column on the table owning
/// the reference scope, plus locally stored identity-component columns, and
/// emits a `DocumentReferenceBinding` with per-component sub-bindings.
pub struct ReferenceBindingPass;

impl RelationalModelSetPass for ReferenceBindingPass {
    fn name(&self) -> &'static str {
        "reference-binding"
    }

    fn order(&self) -> u32 {
        30
    }

    fn execute(&self, context: &mut RelationalModelSetBuilderContext) -> Result<()> {
        let entries = context.resource_entries().to_vec();

        for entry in entries {
            let resource = entry.resource();
            let resource_schema = context.resource_schema(&entry)?;
            let resource_label = resource.to_string();

            if resources::is_resource_extension(resource_schema, &resource_label)? {
                continue;
            }

            let mappings = resources::document_reference_mappings(resource_schema, &resource_label)?;
            if mappings.is_empty() {
                continue;
            }

            let identity_paths: Vec<String> =
                resources::identity_json_paths(resource_schema, &resource_label)?
                    .iter()
                    .map(|path| path.canonical().to_string())
                    .collect();
            let decimal_infos =
                resources::decimal_validation_infos(resource_schema, &resource_label)?;

            let Some(Value::Object(insert_schema)) = resource_schema.get("jsonSchemaForInsert")
            else {
                return Err(DerivationError::SchemaCorruption(format!(
                    "Expected {resource_label}.jsonSchemaForInsert to be present, invalid schema document"
                )));
            };
            let insert_schema = insert_schema.clone();

            let Some(model_index) = context.find_resource_index(&resource) else {
                return Err(DerivationError::InvariantViolation(format!(
                    "Concrete resource '{resource}' was not found for reference binding"
                )));
            };

            let model = context.concrete_resources[model_index].clone();
            let relational_model = apply_reference_mappings(
                &model.relational_model,
                &mappings,
                &insert_schema,
                &identity_paths,
                &decimal_infos,
                &resource,
            )?;

            context.replace_resource(
                model_index,
                ConcreteResourceModel {
                    relational_model,
                    ..model
                },
            );
        }

        Ok(())
    }
}

fn apply_reference_mappings(
    resource_model: &RelationalResourceModel,
    mappings: &[DocumentReferenceMapping],
    insert_schema: &Map<String, Value>,
    identity_paths: &[String],
    decimal_infos: &BTreeMap<String, DecimalValidationInfo>,
    resource: &QualifiedResourceName,
) -> Result<RelationalResourceModel> {
    let mut accumulators: BTreeMap<String, TableColumnAccumulator> = resource_model
        .tables_in_read_dependency_order
        .iter()
        .map(|table| {
            (
                table.json_scope.canonical().to_string(),
                TableColumnAccumulator::new(table),
            )
        })
        .collect();

    let mut document_reference_bindings = resource_model.document_reference_bindings.clone();
    let mut bound_paths: Vec<String> = document_reference_bindings
        .iter()
        .map(|binding| binding.reference_object_path.canonical().to_string())
        .collect();

    for mapping in mappings {
        let reference_path = &mapping.reference_object_path;

        if bound_paths.contains(&reference_path.canonical().to_string()) {
            return Err(DerivationError::InvariantViolation(format!(
                "Reference object path '{reference_path}' on resource '{resource}' is already bound"
            )));
        }
        bound_paths.push(reference_path.canonical().to_string());

        let owning_scope = resolve_owning_scope(&accumulators, reference_path, resource)?;
        let reference_base_name = reference_base_name(reference_path, &owning_scope)?;
        let is_nullable = !mapping.is_required;

        let fk_column = DbColumnName::new(format!("{reference_base_name}_DocumentId"));

        let (owning_table, identity_bindings) = {
            let accumulator = accumulators
                .get_mut(owning_scope.canonical())
                .expect("owning scope resolved against accumulator keys");
            let owning_table = accumulator.definition().table.clone();

            accumulator.add_column(DbColumnModel {
                column_name: fk_column.clone(),
                kind: ColumnKind::DocumentFk,
                scalar_type: Some(RelationalScalarType::new(ScalarKind::Int64)),
                is_nullable,
                source_json_path: Some(reference_path.clone()),
                target_resource: Some(mapping.target_resource.clone()),
            })?;

            let mut identity_bindings = Vec::with_capacity(mapping.reference_json_paths.len());

            for pair in &mapping.reference_json_paths {
                let schema_node = resolve_schema_at_path(insert_schema, &pair.reference_json_path)?;

                if determine_schema_kind(
                    schema_node,
                    pair.reference_json_path.canonical(),
                    false,
                )? != SchemaKind::Scalar
                {
                    return Err(DerivationError::SchemaCorruption(format!(
                        "Reference identity path '{}' on resource '{resource}' must resolve to a scalar schema",
                        pair.reference_json_path
                    )));
                }

                let scalar_type =
                    resolve_scalar_type(schema_node, &pair.reference_json_path, decimal_infos)?;
                let identity_part_base = identity_part_base_name(&pair.identity_json_path)?;
                let column_name =
                    DbColumnName::new(format!("{reference_base_name}_{identity_part_base}"));

                accumulator.add_column(DbColumnModel {
                    column_name: column_name.clone(),
                    kind: ColumnKind::Scalar,
                    scalar_type: Some(scalar_type),
                    is_nullable,
                    source_json_path: Some(pair.reference_json_path.clone()),
                    target_resource: None,
                })?;

                identity_bindings.push(ReferenceIdentityBinding {
                    reference_json_path: pair.reference_json_path.clone(),
                    column: column_name,
                });
            }

            (owning_table, identity_bindings)
        };

        debug!(
            resource = %resource,
            reference = %reference_path,
            target = %mapping.target_resource,
            "Bound document reference"
        );

        document_reference_bindings.push(DocumentReferenceBinding {
            is_identity_component: mapping.is_part_of_identity
                || mapping.reference_json_paths.iter().any(|pair| {
                    identity_paths.contains(&pair.reference_json_path.canonical().to_string())
                }),
            reference_object_path: reference_path.clone(),
            table: owning_table,
            fk_column,
            target_resource: mapping.target_resource.clone(),
            identity_bindings,
        });
    }

    let updated_tables: Vec<DbTableModel> = resource_model
        .tables_in_read_dependency_order
        .iter()
        .map(|table| {
            accumulators
                .remove(table.json_scope.canonical())
                .expect("accumulator seeded for every table scope")
                .build()
        })
        .collect();

    let updated_root = updated_tables
        .iter()
        .find(|table| table.json_scope.is_root())
        .cloned()
        .ok_or_else(|| {
            DerivationError::InvariantViolation(format!(
                "Root table scope '$' was not found on resource '{resource}'"
            ))
        })?;

    Ok(RelationalResourceModel {
        root: updated_root,
        tables_in_read_dependency_order: updated_tables.clone(),
        tables_in_write_dependency_order: updated_tables,
        document_reference_bindings,
        ..resource_model.clone()
    })
}

/// The owning table scope is the longest table scope that prefixes the
/// reference object path
fn resolve_owning_scope(
    accumulators: &BTreeMap<String, TableColumnAccumulator>,
    reference_path: &JsonPathExpression,
    resource: &QualifiedResourceName,
) -> Result<JsonPathExpression> {
    let mut best: Option<&JsonPathExpression> = None;

    for accumulator in accumulators.values() {
        let scope = &accumulator.definition().json_scope;

        if !reference_path.starts_with(scope) {
            continue;
        }

        if best.map(|current| scope.segments().len() > current.segments().len()).unwrap_or(true) {
            best = Some(scope);
        }
    }

    best.cloned().ok_or_else(|| {
        DerivationError::InvariantViolation(format!(
            "No table scope owns reference path '{reference_path}' on resource '{resource}'"
        ))
    })
}

/// PascalCase concatenation of the reference path's property segments
/// relative to its owning scope
fn reference_base_name(
    reference_path: &JsonPathExpression,
    owning_scope: &JsonPathExpression,
) -> Result<String> {
    let relative_segments = &reference_path.segments()[owning_scope.segments().len()..];

    let mut base_name = String::new();
    for segment in relative_segments {
        match segment {
            JsonPathSegment::Property { name } => base_name.push_str(&naming::to_pascal_case(name)),
            JsonPathSegment::AnyArrayElement => {
                return Err(DerivationError::SchemaCorruption(format!(
                    "Reference object path '{reference_path}' must not nest arrays below its owning scope"
                )))
            }
        }
    }

    if base_name.is_empty() {
        return Err(DerivationError::SchemaCorruption(format!(
            "Reference object path '{reference_path}' must extend its owning table scope"
        )));
    }

    Ok(base_name)
}

/// PascalCase concatenation of an identity path's property segments
fn identity_part_base_name(identity_path: &JsonPathExpression) -> Result<String> {
    let mut base_name = String::new();

    for segment in identity_path.segments() {
        match segment {
            JsonPathSegment::Property { name } => base_name.push_str(&naming::to_pascal_case(name)),
            JsonPathSegment::AnyArrayElement => {
                return Err(DerivationError::SchemaCorruption(format!(
                    "Reference identity path '{identity_path}' must not traverse arrays"
                )))
            }
        }
    }

    if base_name.is_empty() {
        return Err(DerivationError::SchemaCorruption(format!(
            "Reference identity path '{identity_path}' must contain at least one property segment"
        )));
    }

    Ok(base_name)
}

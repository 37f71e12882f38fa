//! Constraint derivation pass (order 40)

use std::collections::{BTreeMap, HashMap};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, warn};

use crate::error::{DerivationError, Result};
use crate::models::{
    ConcreteResourceModel, DbColumnName, DbTableName, QualifiedResourceName, ReferentialAction,
    RelationalResourceModel, ResourceStorageKind, TableConstraint,
};
use crate::naming;
use crate::passes::context::RelationalModelSetBuilderContext;
use crate::passes::RelationalModelSetPass;

/// Derives foreign-key constraints for document reference bindings and the
/// root natural-key unique constraint over identity columns
///
/// Reference FKs target the referenced resource's root table (or its abstract
/// identity table). The cross-resource reference graph is checked for cycles;
/// cycles are diagnosed, not fatal, since deferred constraint enforcement
/// handles them downstream.
pub struct ConstraintDerivationPass;

impl RelationalModelSetPass for ConstraintDerivationPass {
    fn name(&self) -> &'static str {
        "constraint-derivation"
    }

    fn order(&self) -> u32 {
        40
    }

    fn execute(&self, context: &mut RelationalModelSetBuilderContext) -> Result<()> {
        let mut reference_targets: BTreeMap<QualifiedResourceName, DbTableName> = context
            .concrete_resources
            .iter()
            .map(|model| {
                (
                    model.resource.clone(),
                    model.relational_model.root.table.clone(),
                )
            })
            .collect();

        for identity_table in &context.abstract_identity_tables {
            reference_targets
                .entry(identity_table.resource.clone())
                .or_insert_with(|| identity_table.table_model.table.clone());
        }

        diagnose_reference_cycles(&context.concrete_resources);

        let identity_paths_by_resource = collect_identity_paths(context)?;

        for model_index in 0..context.concrete_resources.len() {
            let model = context.concrete_resources[model_index].clone();
            let identity_paths = identity_paths_by_resource
                .get(&model.resource)
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            let relational_model =
                apply_constraints(&model.relational_model, &reference_targets, identity_paths)?;

            if relational_model == model.relational_model {
                continue;
            }

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

fn apply_constraints(
    resource_model: &RelationalResourceModel,
    reference_targets: &BTreeMap<QualifiedResourceName, DbTableName>,
    identity_paths: &[String],
) -> Result<RelationalResourceModel> {
    let mut tables = resource_model.tables_in_read_dependency_order.clone();

    for binding in &resource_model.document_reference_bindings {
        let Some(target_table) = reference_targets.get(&binding.target_resource) else {
            warn!(
                target = %binding.target_resource,
                reference = %binding.reference_object_path,
                "Reference target has no derived table; skipping FK constraint"
            );
            continue;
        };

        let Some(table) = tables
            .iter_mut()
            .find(|table| table.table == binding.table)
        else {
            return Err(DerivationError::InvariantViolation(format!(
                "Table '{}' owning a reference binding was not found on resource '{}'",
                binding.table, resource_model.resource
            )));
        };

        let constraint_name =
            naming::foreign_key_name(&table.table.name, &[binding.fk_column.clone()]);

        if table
            .constraints
            .iter()
            .any(|constraint| constraint.name() == constraint_name)
        {
            continue;
        }

        debug!(
            table = %table.table,
            target = %target_table,
            "Derived reference FK constraint"
        );

        table.constraints.push(TableConstraint::ForeignKey {
            name: constraint_name,
            columns: vec![binding.fk_column.clone()],
            target_table: target_table.clone(),
            target_columns: vec![naming::document_id_column()],
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        });
    }

    if resource_model.storage_kind == ResourceStorageKind::RelationalTables {
        add_root_identity_constraint(&mut tables, resource_model, identity_paths);
    }

    let root = tables
        .iter()
        .find(|table| table.json_scope.is_root())
        .cloned()
        .ok_or_else(|| {
            DerivationError::InvariantViolation(format!(
                "Root table scope '$' was not found on resource '{}'",
                resource_model.resource
            ))
        })?;

    Ok(RelationalResourceModel {
        root,
        tables_in_read_dependency_order: tables.clone(),
        tables_in_write_dependency_order: tables,
        ..resource_model.clone()
    })
}

/// Adds the natural-key unique constraint over the root table's identity
/// columns, in declared identity order
fn add_root_identity_constraint(
    tables: &mut [crate::models::DbTableModel],
    resource_model: &RelationalResourceModel,
    identity_paths: &[String],
) {
    if identity_paths.is_empty() {
        return;
    }

    let Some(root) = tables.iter_mut().find(|table| table.json_scope.is_root()) else {
        return;
    };

    let mut identity_columns: Vec<DbColumnName> = Vec::with_capacity(identity_paths.len());

    for identity_path in identity_paths {
        let column = root.columns.iter().find(|column| {
            column
                .source_json_path
                .as_ref()
                .map(|path| path.canonical() == identity_path)
                .unwrap_or(false)
        });

        match column {
            Some(column) => identity_columns.push(column.column_name.clone()),
            None => {
                warn!(
                    resource = %resource_model.resource,
                    path = %identity_path,
                    "Identity path is not stored on the root table; omitting it from the natural key"
                );
            }
        }
    }

    if identity_columns.is_empty() {
        return;
    }

    let constraint_name = naming::unique_constraint_name(&root.table.name, &identity_columns);

    if root
        .constraints
        .iter()
        .any(|constraint| constraint.name() == constraint_name)
    {
        return;
    }

    root.constraints.push(TableConstraint::Unique {
        name: constraint_name,
        columns: identity_columns,
    });
}

/// Builds the cross-resource reference graph and reports cycles
fn diagnose_reference_cycles(concrete_resources: &[ConcreteResourceModel]) {
    let mut graph: DiGraph<QualifiedResourceName, ()> = DiGraph::new();
    let mut nodes: HashMap<QualifiedResourceName, NodeIndex> = HashMap::new();

    for model in concrete_resources {
        let source = *nodes
            .entry(model.resource.clone())
            .or_insert_with(|| graph.add_node(model.resource.clone()));

        for binding in &model.relational_model.document_reference_bindings {
            let target = *nodes
                .entry(binding.target_resource.clone())
                .or_insert_with(|| graph.add_node(binding.target_resource.clone()));
            graph.add_edge(source, target, ());
        }
    }

    if is_cyclic_directed(&graph) {
        warn!("Cross-resource reference graph contains cycles; FK enforcement order is not total");
    }
}

fn collect_identity_paths(
    context: &RelationalModelSetBuilderContext,
) -> Result<BTreeMap<QualifiedResourceName, Vec<String>>> {
    let mut identity_paths_by_resource = BTreeMap::new();

    for entry in context.resource_entries() {
        let resource = entry.resource();
        let resource_schema = context.resource_schema(entry)?;
        let resource_label = resource.to_string();

        if crate::schema::resources::is_resource_extension(resource_schema, &resource_label)? {
            continue;
        }

        let identity_paths: Vec<String> =
            crate::schema::resources::identity_json_paths(resource_schema, &resource_label)?
                .iter()
                .map(|path| path.canonical().to_string())
                .collect();

        identity_paths_by_resource.insert(resource, identity_paths);
    }

    Ok(identity_paths_by_resource)
}

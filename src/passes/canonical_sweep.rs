//! Final canonicalization sweep (order 50)

use tracing::debug;

use crate::collision::IdentifierCollisionOrigin;
use crate::error::Result;
use crate::models::{AbstractIdentityTableInfo, ConcreteResourceModel, DbTableModel};
use crate::ordering;
use crate::passes::context::RelationalModelSetBuilderContext;
use crate::passes::RelationalModelSetPass;

/// Re-canonicalizes every derived model after enrichment and runs the
/// aggregated identifier collision check
///
/// Later passes append tables, columns, and constraints in traversal order;
/// this sweep restores the canonical order everywhere so two runs over the
/// same logical schema produce identical output, then verifies that no two
/// distinct identifiers collapsed onto one physical name.
pub struct CanonicalizeModelSetPass;

impl RelationalModelSetPass for CanonicalizeModelSetPass {
    fn name(&self) -> &'static str {
        "canonicalize-model-set"
    }

    fn order(&self) -> u32 {
        50
    }

    fn execute(&self, context: &mut RelationalModelSetBuilderContext) -> Result<()> {
        for model_index in 0..context.concrete_resources.len() {
            let model = &context.concrete_resources[model_index];
            let canonical = ordering::canonicalize_resource_model(&model.relational_model)?;

            context.replace_resource(
                model_index,
                ConcreteResourceModel {
                    relational_model: canonical,
                    ..model.clone()
                },
            );
        }

        let canonical_identity_tables: Vec<AbstractIdentityTableInfo> = context
            .abstract_identity_tables
            .iter()
            .map(|info| AbstractIdentityTableInfo {
                resource: info.resource.clone(),
                table_model: ordering::canonicalize_table(&info.table_model),
            })
            .collect();
        context.abstract_identity_tables = canonical_identity_tables;

        register_identifiers(context);

        debug!(
            resources = context.concrete_resources.len(),
            "Running aggregated identifier collision check"
        );

        context.check_collisions()
    }
}

/// Registers every final table and column identifier with its origin
fn register_identifiers(context: &mut RelationalModelSetBuilderContext) {
    struct Registration {
        table: crate::models::DbTableName,
        column: Option<crate::models::DbColumnName>,
        original: Option<String>,
        origin: IdentifierCollisionOrigin,
    }

    let mut registrations = Vec::new();

    let collect_table = |table: &DbTableModel, resource_label: &str, registrations: &mut Vec<Registration>| {
        registrations.push(Registration {
            table: table.table.clone(),
            column: None,
            original: None,
            origin: IdentifierCollisionOrigin {
                description: "derived table".to_string(),
                resource_label: Some(resource_label.to_string()),
                json_path: Some(table.json_scope.canonical().to_string()),
            },
        });

        for column in &table.columns {
            let original = context
                .original_column_name(
                    table.table.schema.as_str(),
                    &table.table.name,
                    column.column_name.as_str(),
                )
                .map(str::to_string);

            let json_path = column
                .source_json_path
                .as_ref()
                .map(|path| path.canonical().to_string())
                .unwrap_or_else(|| table.json_scope.canonical().to_string());

            registrations.push(Registration {
                table: table.table.clone(),
                column: Some(column.column_name.clone()),
                original,
                origin: IdentifierCollisionOrigin {
                    description: "derived column".to_string(),
                    resource_label: Some(resource_label.to_string()),
                    json_path: Some(json_path),
                },
            });
        }
    };

    for model in &context.concrete_resources {
        let resource_label = model.resource.to_string();
        for table in &model.relational_model.tables_in_read_dependency_order {
            collect_table(table, &resource_label, &mut registrations);
        }
    }

    for info in &context.abstract_identity_tables {
        let resource_label = info.resource.to_string();
        collect_table(&info.table_model, &resource_label, &mut registrations);
    }

    let detector = context.collision_detector_mut();
    for registration in registrations {
        match registration.column {
            Some(column) => detector.register_column(
                &registration.table,
                &column,
                registration.original.as_deref(),
                registration.origin,
            ),
            None => detector.register_table(
                &registration.table,
                registration.original.as_deref(),
                registration.origin,
            ),
        }
    }
}

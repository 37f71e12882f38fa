//! Extension-table derivation pass (order 20)

use tracing::debug;

use crate::error::{DerivationError, Result};
use crate::models::{
    ConcreteResourceModel, DbTableModel, DbTableName, ProjectSchemaInfo, QualifiedResourceName,
    ReferentialAction, RelationalResourceModel, TableConstraint,
};
use crate::naming;
use crate::passes::context::RelationalModelSetBuilderContext;
use crate::passes::RelationalModelSetPass;

/// Derives one extension table per (extension site, extension project)
///
/// The extension table lives in the extension project's physical schema,
/// mirrors the owning table's key, and cascades deletes from its owner. Each
/// extension project key must resolve to a configured extension project by
/// endpoint name or project name.
pub struct ExtensionTableDerivationPass;

impl RelationalModelSetPass for ExtensionTableDerivationPass {
    fn name(&self) -> &'static str {
        "extension-table-derivation"
    }

    fn order(&self) -> u32 {
        20
    }

    fn execute(&self, context: &mut RelationalModelSetBuilderContext) -> Result<()> {
        let resources_with_sites: Vec<QualifiedResourceName> = context
            .extension_sites_by_resource()
            .iter()
            .filter(|(_, sites)| !sites.is_empty())
            .map(|(resource, _)| resource.clone())
            .collect();

        for resource in resources_with_sites {
            let Some(model_index) = context.find_resource_index(&resource) else {
                return Err(DerivationError::InvariantViolation(format!(
                    "Concrete resource '{resource}' was not found for extension table derivation"
                )));
            };

            let sites = context.extension_sites_for(&resource).to_vec();
            let model = context.concrete_resources[model_index].clone();
            let mut tables = model.relational_model.tables_in_read_dependency_order.clone();
            let mut added = false;

            for site in &sites {
                let Some(owning_table) = tables
                    .iter()
                    .find(|table| table.json_scope == site.owning_scope)
                    .cloned()
                else {
                    return Err(DerivationError::InvariantViolation(format!(
                        "Owning table scope '{}' was not found for an extension site on resource '{resource}'",
                        site.owning_scope
                    )));
                };

                for project_key in &site.project_keys {
                    let extension_project =
                        resolve_extension_project(context.project_infos(), project_key, &resource)?;

                    let extension_table = build_extension_table(
                        &owning_table,
                        &extension_project,
                        site.extension_path.append_property(project_key.clone())?,
                    );

                    debug!(
                        resource = %resource,
                        table = %extension_table.table,
                        "Derived extension table"
                    );

                    tables.push(extension_table);
                    added = true;
                }
            }

            if !added {
                continue;
            }

            let relational_model = RelationalResourceModel {
                tables_in_read_dependency_order: tables.clone(),
                tables_in_write_dependency_order: tables,
                ..model.relational_model.clone()
            };

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

/// Resolves an extension project key by endpoint name first, then project
/// name; the resolved project must be an extension project
fn resolve_extension_project(
    projects: &[ProjectSchemaInfo],
    project_key: &str,
    resource: &QualifiedResourceName,
) -> Result<ProjectSchemaInfo> {
    let resolved = projects
        .iter()
        .find(|project| project.project_endpoint_name == project_key)
        .or_else(|| {
            projects
                .iter()
                .find(|project| project.project_name == project_key)
        });

    let Some(project) = resolved else {
        return Err(DerivationError::SchemaCorruption(format!(
            "Extension project key '{project_key}' on resource '{resource}' does not match any configured project"
        )));
    };

    if !project.is_extension_project {
        return Err(DerivationError::SchemaCorruption(format!(
            "Extension project key '{project_key}' on resource '{resource}' resolves to non-extension project '{}'",
            project.project_endpoint_name
        )));
    }

    Ok(project.clone())
}

fn build_extension_table(
    owning_table: &DbTableModel,
    extension_project: &ProjectSchemaInfo,
    json_scope: crate::paths::JsonPathExpression,
) -> DbTableModel {
    let table_name = DbTableName::new(
        extension_project.physical_schema.clone(),
        format!("{}Ext", owning_table.table.name),
    );

    let key_column_names: Vec<_> = owning_table
        .key
        .columns
        .iter()
        .map(|key_column| key_column.column_name.clone())
        .collect();

    let key_columns: Vec<_> = owning_table
        .columns
        .iter()
        .filter(|column| {
            key_column_names
                .iter()
                .any(|name| name == &column.column_name)
        })
        .cloned()
        .collect();

    let fk_name = naming::foreign_key_name(&table_name.name, &key_column_names);

    DbTableModel {
        table: table_name,
        json_scope,
        key: owning_table.key.clone(),
        columns: key_columns,
        constraints: vec![TableConstraint::ForeignKey {
            name: fk_name,
            columns: key_column_names.clone(),
            target_table: owning_table.table.clone(),
            target_columns: key_column_names,
            on_delete: ReferentialAction::Cascade,
            on_update: ReferentialAction::NoAction,
        }],
    }
}

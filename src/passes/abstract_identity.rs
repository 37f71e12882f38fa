//! Abstract-identity-table derivation pass (order 25)

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::builder::steps::resolve_scalar_type;
use crate::error::{DerivationError, Result};
use crate::models::{
    AbstractIdentityTableInfo, ColumnKind, DbColumnModel, DbColumnName, DbKeyColumn, DbTableModel,
    DbTableName, QualifiedResourceName, ReferentialAction, RelationalScalarType, ScalarKind,
    TableConstraint, TableKey, DOCUMENT_TABLE_NAME,
};
use crate::naming;
use crate::passes::context::RelationalModelSetBuilderContext;
use crate::passes::RelationalModelSetPass;
use crate::paths::JsonPathSegment;
use crate::schema::resources;
use crate::schema::{optional_bool, optional_string, require_object, resolve_schema_at_path};

const DISCRIMINATOR_COLUMN: &str = "Discriminator";
const DISCRIMINATOR_MAX_LENGTH: u32 = 128;

/// Derives one identity-bridging table per abstract resource
///
/// The table is keyed by `DocumentId`, carries the abstract identity columns
/// plus a `Discriminator` column, references the shared document table, and
/// is unique over the identity projection. An abstract resource without at
/// least one concrete subclass member is an error.
pub struct AbstractIdentityTableDerivationPass;

impl RelationalModelSetPass for AbstractIdentityTableDerivationPass {
    fn name(&self) -> &'static str {
        "abstract-identity-table-derivation"
    }

    fn order(&self) -> u32 {
        25
    }

    fn execute(&self, context: &mut RelationalModelSetBuilderContext) -> Result<()> {
        let members_by_superclass = build_subclass_members(context)?;

        let mut derived = Vec::new();

        for (project_index, project) in context.project_infos().iter().enumerate() {
            let project_schema = context.project_schema_object(project_index)?;

            let Some(abstract_resources) = project_schema.get("abstractResources") else {
                continue;
            };

            let Value::Object(abstract_resources) = abstract_resources else {
                return Err(DerivationError::SchemaCorruption(
                    "Expected projectSchema.abstractResources to be an object, invalid schema document"
                        .to_string(),
                ));
            };

            let mut abstract_keys: Vec<&String> = abstract_resources.keys().collect();
            abstract_keys.sort();

            for abstract_key in abstract_keys {
                let abstract_schema = require_object(
                    abstract_resources.get(abstract_key),
                    &format!("projectSchema.abstractResources['{abstract_key}']"),
                )?;

                let resource_name = resources::resource_name(abstract_key, abstract_schema)?;
                let resource =
                    QualifiedResourceName::new(project.project_name.clone(), resource_name);

                let members = members_by_superclass.get(&resource).map(Vec::len).unwrap_or(0);
                if members == 0 {
                    return Err(DerivationError::InvariantViolation(format!(
                        "Abstract resource '{resource}' has no concrete members"
                    )));
                }

                let table_model = build_identity_table(
                    project,
                    &resource,
                    abstract_schema,
                )?;

                debug!(resource = %resource, table = %table_model.table, "Derived abstract identity table");

                derived.push(AbstractIdentityTableInfo {
                    resource,
                    table_model,
                });
            }
        }

        context.abstract_identity_tables.extend(derived);

        Ok(())
    }
}

/// Maps each declared superclass to its concrete subclass members
fn build_subclass_members(
    context: &RelationalModelSetBuilderContext,
) -> Result<BTreeMap<QualifiedResourceName, Vec<QualifiedResourceName>>> {
    let mut members: BTreeMap<QualifiedResourceName, Vec<QualifiedResourceName>> = BTreeMap::new();

    for entry in context.resource_entries() {
        let resource = entry.resource();
        let resource_schema = context.resource_schema(entry)?;
        let resource_label = resource.to_string();

        if resources::is_resource_extension(resource_schema, &resource_label)? {
            continue;
        }

        if !optional_bool(resource_schema, "isSubclass", &resource_label)?.unwrap_or(false) {
            continue;
        }

        let superclass_project =
            optional_string(resource_schema, "superclassProjectName", &resource_label)?;
        let superclass_resource =
            optional_string(resource_schema, "superclassResourceName", &resource_label)?;

        let (Some(superclass_project), Some(superclass_resource)) =
            (superclass_project, superclass_resource)
        else {
            return Err(DerivationError::SchemaCorruption(format!(
                "Subclass resource '{resource_label}' must declare its superclass project and resource names"
            )));
        };

        members
            .entry(QualifiedResourceName::new(superclass_project, superclass_resource))
            .or_default()
            .push(resource);
    }

    Ok(members)
}

fn build_identity_table(
    project: &crate::models::ProjectSchemaInfo,
    resource: &QualifiedResourceName,
    abstract_schema: &Map<String, Value>,
) -> Result<DbTableModel> {
    let resource_label = resource.to_string();
    let identity_paths = resources::identity_json_paths(abstract_schema, &resource_label)?;
    let decimal_infos = resources::decimal_validation_infos(abstract_schema, &resource_label)?;
    let insert_schema = require_object(
        abstract_schema.get("jsonSchemaForInsert"),
        &format!("{resource_label}.jsonSchemaForInsert"),
    )?;

    let table_name = DbTableName::new(
        project.physical_schema.clone(),
        format!("{}Identity", naming::to_pascal_case(&resource.resource_name)),
    );

    let key = TableKey {
        columns: vec![DbKeyColumn {
            column_name: naming::document_id_column(),
            kind: ColumnKind::ParentKeyPart,
        }],
    };

    let mut columns = vec![DbColumnModel {
        column_name: naming::document_id_column(),
        kind: ColumnKind::ParentKeyPart,
        scalar_type: Some(RelationalScalarType::new(ScalarKind::Int64)),
        is_nullable: false,
        source_json_path: None,
        target_resource: None,
    }];

    let mut identity_column_names = Vec::with_capacity(identity_paths.len());

    for identity_path in &identity_paths {
        let mut name_segments = Vec::new();
        for segment in identity_path.segments() {
            match segment {
                JsonPathSegment::Property { name } => name_segments.push(name.clone()),
                JsonPathSegment::AnyArrayElement => {
                    return Err(DerivationError::SchemaCorruption(format!(
                        "Abstract identity path '{identity_path}' on '{resource_label}' must not traverse arrays"
                    )))
                }
            }
        }

        let schema_node = resolve_schema_at_path(insert_schema, identity_path)?;
        let scalar_type = resolve_scalar_type(schema_node, identity_path, &decimal_infos)?;

        let column_name = DbColumnName::new(
            name_segments
                .iter()
                .map(|segment| naming::to_pascal_case(segment))
                .collect::<String>(),
        );

        identity_column_names.push(column_name.clone());
        columns.push(DbColumnModel {
            column_name,
            kind: ColumnKind::Scalar,
            scalar_type: Some(scalar_type),
            is_nullable: false,
            source_json_path: Some(identity_path.clone()),
            target_resource: None,
        });
    }

    columns.push(DbColumnModel {
        column_name: DbColumnName::new(DISCRIMINATOR_COLUMN),
        kind: ColumnKind::Scalar,
        scalar_type: Some(RelationalScalarType::string_with_max_length(
            DISCRIMINATOR_MAX_LENGTH,
        )),
        is_nullable: false,
        source_json_path: None,
        target_resource: None,
    });

    let mut constraints = vec![TableConstraint::ForeignKey {
        name: naming::foreign_key_name(&table_name.name, &[naming::document_id_column()]),
        columns: vec![naming::document_id_column()],
        target_table: DOCUMENT_TABLE_NAME.clone(),
        target_columns: vec![naming::document_id_column()],
        on_delete: ReferentialAction::Cascade,
        on_update: ReferentialAction::NoAction,
    }];

    if !identity_column_names.is_empty() {
        constraints.push(TableConstraint::Unique {
            name: naming::unique_constraint_name(&table_name.name, &identity_column_names),
            columns: identity_column_names,
        });
    }

    Ok(DbTableModel {
        table: table_name,
        json_scope: crate::paths::JsonPathExpression::root(),
        key,
        columns,
        constraints,
    })
}

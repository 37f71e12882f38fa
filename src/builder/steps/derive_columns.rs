//! Column and descriptor-edge derivation step

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::builder::accumulator::TableColumnAccumulator;
use crate::builder::context::{AppliedNameOverride, RelationalModelBuilderContext};
use crate::builder::RelationalModelBuilderStep;
use crate::error::{DerivationError, Result};
use crate::models::{
    ColumnKind, DbColumnModel, DbColumnName, DbTableModel, DescriptorEdgeSource,
    RelationalResourceModel, RelationalScalarType, ScalarKind, TableConstraint,
    DESCRIPTOR_TABLE_NAME,
};
use crate::naming;
use crate::paths::{JsonPathExpression, EXTENSION_PROPERTY_NAME};
use crate::schema::resources::DecimalValidationInfo;
use crate::schema::{determine_schema_kind, optional_u32, SchemaKind};

/// Walks the insert schema and fills the derived tables with scalar columns,
/// descriptor FK columns, and descriptor edge metadata
///
/// Column names concatenate the PascalCase property segments relative to the
/// owning table scope. Explicit name overrides are applied here; an override
/// that matches no derived column is an error.
pub struct DeriveColumnsAndDescriptorEdgesStep;

impl RelationalModelBuilderStep for DeriveColumnsAndDescriptorEdgesStep {
    fn name(&self) -> &'static str {
        "derive-columns-and-descriptor-edges"
    }

    fn execute(&self, context: &mut RelationalModelBuilderContext) -> Result<()> {
        let resource_model = context.require_resource_model()?.clone();
        let json_schema_for_insert = context.require_json_schema_for_insert()?.clone();

        let Value::Object(root_schema) = &json_schema_for_insert else {
            return Err(DerivationError::SchemaCorruption(
                "Expected JSON schema root to be an object at $".to_string(),
            ));
        };

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

        if !accumulators.contains_key("$") {
            return Err(DerivationError::InvariantViolation(format!(
                "Root table scope '$' was not found on resource '{}'",
                resource_model.resource
            )));
        }

        let identity_paths: BTreeSet<String> = context
            .identity_json_paths
            .iter()
            .map(|path| path.canonical().to_string())
            .collect();

        // Reference object subtrees are bound by the reference-binding pass;
        // walking them here would store every reference property twice.
        let reference_object_paths: BTreeSet<String> = context
            .document_reference_mappings
            .iter()
            .map(|mapping| mapping.reference_object_path.canonical().to_string())
            .collect();

        let mut walk = SchemaWalk {
            context: &*context,
            identity_paths,
            reference_object_paths,
            used_descriptor_paths: BTreeSet::new(),
            descriptor_edge_sources: Vec::new(),
            consumed_overrides: Vec::new(),
            applied_overrides: Vec::new(),
        };

        walk.walk_object(
            root_schema,
            &mut accumulators,
            "$",
            &JsonPathExpression::root(),
            &[],
            false,
        )?;

        walk.ensure_all_descriptor_paths_used()?;
        walk.ensure_all_overrides_consumed()?;

        let descriptor_edge_sources = walk.descriptor_edge_sources;
        let consumed_overrides = walk.consumed_overrides;
        let applied_overrides = walk.applied_overrides;

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
            .expect("root table checked above")
            .clone();

        context.consumed_name_overrides = consumed_overrides;
        context.applied_name_overrides = applied_overrides;
        context.resource_model = Some(RelationalResourceModel {
            root: updated_root,
            tables_in_read_dependency_order: updated_tables.clone(),
            tables_in_write_dependency_order: updated_tables,
            descriptor_edge_sources,
            ..resource_model
        });

        Ok(())
    }
}

struct SchemaWalk<'a> {
    context: &'a RelationalModelBuilderContext,
    identity_paths: BTreeSet<String>,
    reference_object_paths: BTreeSet<String>,
    used_descriptor_paths: BTreeSet<String>,
    descriptor_edge_sources: Vec<DescriptorEdgeSource>,
    consumed_overrides: Vec<String>,
    applied_overrides: Vec<AppliedNameOverride>,
}

impl SchemaWalk<'_> {
    fn walk_object(
        &mut self,
        schema: &Map<String, Value>,
        accumulators: &mut BTreeMap<String, TableColumnAccumulator>,
        scope_key: &str,
        scope_path: &JsonPathExpression,
        column_segments: &[String],
        has_optional_ancestor: bool,
    ) -> Result<()> {
        let Some(properties) = schema.get("properties") else {
            return Ok(());
        };

        let Value::Object(properties) = properties else {
            return Err(DerivationError::SchemaCorruption(format!(
                "Expected properties to be an object at {}",
                scope_path.canonical()
            )));
        };

        let required_properties = required_properties(schema, scope_path)?;

        let mut property_names: Vec<&String> = properties.keys().collect();
        property_names.sort();

        for property_name in property_names {
            if property_name == EXTENSION_PROPERTY_NAME {
                continue;
            }

            let Some(Value::Object(property_schema)) = properties.get(property_name) else {
                return Err(DerivationError::SchemaCorruption(format!(
                    "Expected property schema to be an object at {}.{property_name}",
                    scope_path.canonical()
                )));
            };

            let property_path = scope_path.append_property(property_name.clone())?;

            if self.reference_object_paths.contains(property_path.canonical()) {
                continue;
            }

            let mut property_column_segments = column_segments.to_vec();
            property_column_segments.push(property_name.clone());

            let is_optional = !required_properties.contains(property_name);
            let is_x_nullable = x_nullable(property_schema, &property_path)?;
            let is_nullable = has_optional_ancestor || is_optional || is_x_nullable;

            match determine_schema_kind(property_schema, property_path.canonical(), false)? {
                SchemaKind::Object => self.walk_object(
                    property_schema,
                    accumulators,
                    scope_key,
                    &property_path,
                    &property_column_segments,
                    is_nullable,
                )?,
                SchemaKind::Array => {
                    self.walk_array(property_schema, accumulators, &property_path)?
                }
                SchemaKind::Scalar => self.add_scalar_or_descriptor_column(
                    property_schema,
                    accumulators,
                    scope_key,
                    &property_column_segments,
                    &property_path,
                    is_nullable,
                )?,
            }
        }

        Ok(())
    }

    fn walk_array(
        &mut self,
        schema: &Map<String, Value>,
        accumulators: &mut BTreeMap<String, TableColumnAccumulator>,
        array_path: &JsonPathExpression,
    ) -> Result<()> {
        let Some(Value::Object(items_schema)) = schema.get("items") else {
            return Err(DerivationError::SchemaCorruption(format!(
                "Array schema items must be an object at {}",
                array_path.canonical()
            )));
        };

        let element_path = array_path.append_any_array_element()?;
        let element_scope_key = element_path.canonical().to_string();

        if !accumulators.contains_key(&element_scope_key) {
            return Err(DerivationError::InvariantViolation(format!(
                "Child table scope '{element_scope_key}' was not found"
            )));
        }

        match determine_schema_kind(items_schema, &element_scope_key, false)? {
            SchemaKind::Object => self.walk_object(
                items_schema,
                accumulators,
                &element_scope_key,
                &element_path,
                &[],
                false,
            ),
            SchemaKind::Scalar => {
                // Scalar arrays carry descriptor values; anything else was
                // rejected by schema validation.
                let descriptor_base_name = {
                    let descriptor_path = self.context.descriptor_path(&element_path)?;
                    naming::to_pascal_case(&descriptor_path.descriptor_resource.resource_name)
                };

                self.add_descriptor_column(
                    accumulators,
                    &element_scope_key,
                    &descriptor_base_name,
                    &element_path,
                    false,
                )
            }
            SchemaKind::Array => Err(DerivationError::SchemaCorruption(format!(
                "Array schema items must be type object at {}",
                array_path.canonical()
            ))),
        }
    }

    fn add_scalar_or_descriptor_column(
        &mut self,
        schema: &Map<String, Value>,
        accumulators: &mut BTreeMap<String, TableColumnAccumulator>,
        scope_key: &str,
        column_segments: &[String],
        source_path: &JsonPathExpression,
        is_nullable: bool,
    ) -> Result<()> {
        if self.context.try_descriptor_path(source_path).is_some() {
            let base_name = self.resolve_column_base_name(
                accumulators,
                scope_key,
                column_segments,
                source_path,
            )?;

            return self.add_descriptor_column(
                accumulators,
                scope_key,
                &base_name,
                source_path,
                is_nullable,
            );
        }

        let scalar_type = resolve_scalar_type(schema, source_path, &self.context.decimal_validation_infos)?;
        let base_name =
            self.resolve_column_base_name(accumulators, scope_key, column_segments, source_path)?;

        let accumulator = accumulators
            .get_mut(scope_key)
            .expect("accumulator present for scope");

        accumulator.add_column(DbColumnModel {
            column_name: DbColumnName::new(base_name),
            kind: ColumnKind::Scalar,
            scalar_type: Some(scalar_type),
            is_nullable,
            source_json_path: Some(source_path.clone()),
            target_resource: None,
        })
    }

    fn add_descriptor_column(
        &mut self,
        accumulators: &mut BTreeMap<String, TableColumnAccumulator>,
        scope_key: &str,
        descriptor_base_name: &str,
        source_path: &JsonPathExpression,
        is_nullable: bool,
    ) -> Result<()> {
        let descriptor_path = self.context.descriptor_path(source_path)?.clone();
        let column_name = naming::descriptor_id_column(descriptor_base_name);

        let accumulator = accumulators
            .get_mut(scope_key)
            .expect("accumulator present for scope");
        let table = accumulator.definition().table.clone();

        accumulator.add_column(DbColumnModel {
            column_name: column_name.clone(),
            kind: ColumnKind::DescriptorFk,
            scalar_type: Some(RelationalScalarType::new(ScalarKind::Int64)),
            is_nullable,
            source_json_path: Some(descriptor_path.descriptor_value_path.clone()),
            target_resource: Some(descriptor_path.descriptor_resource.clone()),
        })?;

        accumulator.add_constraint(TableConstraint::ForeignKey {
            name: naming::foreign_key_name(&table.name, &[column_name.clone()]),
            columns: vec![column_name.clone()],
            target_table: DESCRIPTOR_TABLE_NAME.clone(),
            target_columns: vec![naming::document_id_column()],
            on_delete: crate::models::ReferentialAction::NoAction,
            on_update: crate::models::ReferentialAction::NoAction,
        });

        self.descriptor_edge_sources.push(DescriptorEdgeSource {
            is_identity_component: self.identity_paths.contains(source_path.canonical()),
            descriptor_value_path: descriptor_path.descriptor_value_path.clone(),
            table,
            fk_column: column_name,
            descriptor_resource: descriptor_path.descriptor_resource,
        });

        self.used_descriptor_paths
            .insert(source_path.canonical().to_string());

        Ok(())
    }

    /// Concatenates PascalCase segments into the derived base name, applying
    /// any explicit override declared for the source path
    fn resolve_column_base_name(
        &mut self,
        accumulators: &BTreeMap<String, TableColumnAccumulator>,
        scope_key: &str,
        column_segments: &[String],
        source_path: &JsonPathExpression,
    ) -> Result<String> {
        if column_segments.is_empty() {
            return Err(DerivationError::InvariantViolation(format!(
                "Column path '{source_path}' must contain at least one segment"
            )));
        }

        let derived: String = column_segments
            .iter()
            .map(|segment| naming::to_pascal_case(segment))
            .collect();

        let Some(override_name) = self.context.name_overrides.get(source_path.canonical()) else {
            return Ok(derived);
        };

        let table = &accumulators
            .get(scope_key)
            .expect("accumulator present for scope")
            .definition()
            .table;

        self.consumed_overrides.push(source_path.canonical().to_string());
        self.applied_overrides.push(AppliedNameOverride {
            schema: table.schema.as_str().to_string(),
            table: table.name.clone(),
            column: override_name.clone(),
            original: derived,
        });

        Ok(override_name.clone())
    }

    fn ensure_all_descriptor_paths_used(&self) -> Result<()> {
        let mut missing: Vec<&str> = self
            .context
            .descriptor_paths_by_json_path
            .keys()
            .filter(|path| !self.used_descriptor_paths.contains(*path))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        missing.sort();

        Err(DerivationError::SchemaCorruption(format!(
            "Descriptor paths were not found in the JSON schema: {}",
            missing.join(", ")
        )))
    }

    fn ensure_all_overrides_consumed(&self) -> Result<()> {
        let consumed: BTreeSet<&str> =
            self.consumed_overrides.iter().map(String::as_str).collect();

        let unused: Vec<&str> = self
            .context
            .name_overrides
            .keys()
            .map(String::as_str)
            .filter(|path| !consumed.contains(*path))
            .collect();

        if unused.is_empty() {
            return Ok(());
        }

        Err(DerivationError::InvariantViolation(format!(
            "relationalNameOverrides entries did not match any derived column on resource '{}': {}",
            self.context.resource_endpoint_name,
            unused.join(", ")
        )))
    }
}

/// Resolves the dialect-neutral scalar type for a scalar schema node
pub(crate) fn resolve_scalar_type(
    schema: &Map<String, Value>,
    source_path: &JsonPathExpression,
    decimal_infos: &BTreeMap<String, DecimalValidationInfo>,
) -> Result<RelationalScalarType> {
    let Some(Value::String(schema_type)) = schema.get("type") else {
        return Err(DerivationError::SchemaCorruption(format!(
            "Schema type must be a string at {source_path}"
        )));
    };

    match schema_type.as_str() {
        "string" => resolve_string_type(schema, source_path),
        "integer" => {
            let format = optional_format(schema, source_path)?;
            Ok(match format.as_deref() {
                Some("int64") => RelationalScalarType::new(ScalarKind::Int64),
                _ => RelationalScalarType::new(ScalarKind::Int32),
            })
        }
        "number" => resolve_decimal_type(source_path, decimal_infos),
        "boolean" => Ok(RelationalScalarType::new(ScalarKind::Boolean)),
        other => Err(DerivationError::SchemaCorruption(format!(
            "Unsupported scalar type '{other}' at {source_path}"
        ))),
    }
}

fn resolve_string_type(
    schema: &Map<String, Value>,
    source_path: &JsonPathExpression,
) -> Result<RelationalScalarType> {
    if let Some(format) = optional_format(schema, source_path)? {
        match format.as_str() {
            "date" => return Ok(RelationalScalarType::new(ScalarKind::Date)),
            "date-time" => return Ok(RelationalScalarType::new(ScalarKind::DateTime)),
            "time" => return Ok(RelationalScalarType::new(ScalarKind::Time)),
            _ => {}
        }
    }

    match optional_u32(schema, "maxLength", source_path.canonical())? {
        Some(0) => Err(DerivationError::SchemaCorruption(format!(
            "String schema maxLength must be positive at {source_path}"
        ))),
        Some(max_length) => Ok(RelationalScalarType::string_with_max_length(max_length)),
        None => Ok(RelationalScalarType::new(ScalarKind::String)),
    }
}

fn resolve_decimal_type(
    source_path: &JsonPathExpression,
    decimal_infos: &BTreeMap<String, DecimalValidationInfo>,
) -> Result<RelationalScalarType> {
    let Some(info) = decimal_infos.get(source_path.canonical()) else {
        return Ok(RelationalScalarType::new(ScalarKind::Decimal));
    };

    let (Some(total_digits), Some(decimal_places)) = (info.total_digits, info.decimal_places)
    else {
        return Ok(RelationalScalarType::new(ScalarKind::Decimal));
    };

    if total_digits == 0 {
        return Err(DerivationError::SchemaCorruption(format!(
            "Decimal total digits must be positive at {source_path}"
        )));
    }

    if decimal_places > total_digits {
        return Err(DerivationError::SchemaCorruption(format!(
            "Decimal places cannot exceed total digits at {source_path}"
        )));
    }

    Ok(RelationalScalarType::decimal_with_precision(total_digits, decimal_places))
}

fn optional_format(
    schema: &Map<String, Value>,
    source_path: &JsonPathExpression,
) -> Result<Option<String>> {
    match schema.get("format") {
        Some(Value::String(format)) => Ok(Some(format.clone())),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(DerivationError::SchemaCorruption(format!(
            "Expected format to be a string at {source_path}.format"
        ))),
    }
}

fn x_nullable(schema: &Map<String, Value>, path: &JsonPathExpression) -> Result<bool> {
    match schema.get("x-nullable") {
        Some(Value::Bool(value)) => Ok(*value),
        Some(Value::Null) | None => Ok(false),
        Some(_) => Err(DerivationError::SchemaCorruption(format!(
            "Expected x-nullable to be a boolean at {path}"
        ))),
    }
}

fn required_properties(
    schema: &Map<String, Value>,
    scope_path: &JsonPathExpression,
) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();

    let Some(required) = schema.get("required") else {
        return Ok(names);
    };

    let Value::Array(required) = required else {
        return Err(DerivationError::SchemaCorruption(format!(
            "Expected required to be an array at {scope_path}.required"
        )));
    };

    for entry in required {
        let Value::String(name) = entry else {
            return Err(DerivationError::SchemaCorruption(format!(
                "Expected required entries to be strings at {scope_path}.required"
            )));
        };

        if name.trim().is_empty() {
            return Err(DerivationError::SchemaCorruption(format!(
                "Expected required entries to be non-empty at {scope_path}.required"
            )));
        }

        names.insert(name.clone());
    }

    Ok(names)
}

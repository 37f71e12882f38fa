//! Identifier collision detection
//!
//! Post-hoc check that no two distinct original identifiers collapse onto one
//! final identifier within a collision scope. Registrations accumulate during
//! derivation; the check runs once after all name overrides have been
//! applied, and reports every collision across every scope in a single
//! aggregated error.
//!
//! The shared descriptor table and its columns are deliberately exempt: many
//! descriptor resources legitimately converge on the same physical
//! identifiers there. The exemption is a narrow special case for that one
//! scope and is not generalized to other shared tables.

use std::collections::BTreeMap;

use crate::error::{DerivationError, Result};
use crate::models::{DbColumnName, DbTableName, DESCRIPTOR_TABLE_NAME, SHARED_SCHEMA_NAME};

/// The kind of identifier a collision scope covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IdentifierCollisionKind {
    Table,
    Column,
}

impl IdentifierCollisionKind {
    fn label(self) -> &'static str {
        match self {
            IdentifierCollisionKind::Table => "table",
            IdentifierCollisionKind::Column => "column",
        }
    }
}

/// A collision scope: identifiers of one kind within one schema (and table,
/// for column identifiers)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct IdentifierCollisionScope {
    kind: IdentifierCollisionKind,
    schema: String,
    /// Empty for schema-scoped identifier kinds
    table: String,
}

/// Where a registered identifier came from, for diagnostics and deduplication
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IdentifierCollisionOrigin {
    pub description: String,
    pub resource_label: Option<String>,
    pub json_path: Option<String>,
}

#[derive(Debug, Clone)]
struct IdentifierCollisionSource {
    original_name: String,
    origin: IdentifierCollisionOrigin,
}

/// Collects identifier registrations and reports collapsed identifiers
#[derive(Debug, Default)]
pub struct IdentifierCollisionDetector {
    registrations: BTreeMap<IdentifierCollisionScope, BTreeMap<String, Vec<IdentifierCollisionSource>>>,
}

impl IdentifierCollisionDetector {
    pub fn new() -> Self {
        IdentifierCollisionDetector::default()
    }

    /// Registers a table identifier
    ///
    /// `original_name` is the pre-override identifier; pass `None` when no
    /// override applied and the final name is also the original.
    pub fn register_table(
        &mut self,
        table: &DbTableName,
        original_name: Option<&str>,
        origin: IdentifierCollisionOrigin,
    ) {
        self.register(
            IdentifierCollisionScope {
                kind: IdentifierCollisionKind::Table,
                schema: table.schema.as_str().to_string(),
                table: String::new(),
            },
            table.name.clone(),
            original_name.unwrap_or(&table.name).to_string(),
            origin,
        );
    }

    /// Registers a column identifier within its owning table
    pub fn register_column(
        &mut self,
        table: &DbTableName,
        column: &DbColumnName,
        original_name: Option<&str>,
        origin: IdentifierCollisionOrigin,
    ) {
        self.register(
            IdentifierCollisionScope {
                kind: IdentifierCollisionKind::Column,
                schema: table.schema.as_str().to_string(),
                table: table.name.clone(),
            },
            column.as_str().to_string(),
            original_name.unwrap_or(column.as_str()).to_string(),
            origin,
        );
    }

    /// Checks every scope and reports all collisions together in one error
    pub fn check(&self) -> Result<()> {
        let mut collision_lines = Vec::new();

        for (scope, final_names) in &self.registrations {
            for (final_name, sources) in final_names {
                let exempt = is_shared_descriptor_element(scope, final_name);

                // One structural cause may be registered many times; distinct
                // causes for the same final name are the actual collisions.
                let mut causes: BTreeMap<(String, IdentifierCollisionOrigin), ()> = BTreeMap::new();
                for source in sources {
                    let mut origin = source.origin.clone();
                    if exempt {
                        origin.resource_label = None;
                    }
                    causes.insert((source.original_name.clone(), origin), ());
                }

                if causes.len() <= 1 {
                    continue;
                }

                let descriptions: Vec<String> = causes
                    .keys()
                    .map(|(original_name, origin)| format_cause(original_name, origin))
                    .collect();

                collision_lines.push(format!(
                    "{} '{}' in scope '{}' collapses {} distinct identifiers: {}",
                    scope.kind.label(),
                    final_name,
                    format_scope(scope),
                    descriptions.len(),
                    descriptions.join("; ")
                ));
            }
        }

        if collision_lines.is_empty() {
            return Ok(());
        }

        Err(DerivationError::NamingCollision(collision_lines.join(" | ")))
    }

    fn register(
        &mut self,
        scope: IdentifierCollisionScope,
        final_name: String,
        original_name: String,
        origin: IdentifierCollisionOrigin,
    ) {
        self.registrations
            .entry(scope)
            .or_default()
            .entry(final_name)
            .or_default()
            .push(IdentifierCollisionSource {
                original_name,
                origin,
            });
    }
}

/// Whether an identifier belongs to the shared descriptor table scope, which
/// many descriptor resources legitimately share
fn is_shared_descriptor_element(scope: &IdentifierCollisionScope, final_name: &str) -> bool {
    if scope.schema != SHARED_SCHEMA_NAME.as_str() {
        return false;
    }

    match scope.kind {
        IdentifierCollisionKind::Table => final_name == DESCRIPTOR_TABLE_NAME.name,
        IdentifierCollisionKind::Column => scope.table == DESCRIPTOR_TABLE_NAME.name,
    }
}

fn format_scope(scope: &IdentifierCollisionScope) -> String {
    if scope.table.is_empty() {
        scope.schema.clone()
    } else {
        format!("{}.{}", scope.schema, scope.table)
    }
}

fn format_cause(original_name: &str, origin: &IdentifierCollisionOrigin) -> String {
    let mut cause = format!("'{original_name}' ({})", origin.description);

    if let Some(resource_label) = &origin.resource_label {
        cause.push_str(&format!(" from resource '{resource_label}'"));
    }

    if let Some(json_path) = &origin.json_path {
        cause.push_str(&format!(" at '{json_path}'"));
    }

    cause
}

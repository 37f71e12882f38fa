//! Deterministic naming conventions
//!
//! Pure, stateless helpers used when deriving physical schemas, tables,
//! columns, and constraints from resource metadata. A restricted,
//! cross-database-safe identifier policy applies:
//!
//! - Schema names normalize to lowercase ASCII letters/digits with a
//!   guaranteed leading letter.
//! - Property and collection segments become PascalCase identifiers.
//! - Collection tables and key parts follow the root-plus-ordinals templates.

use crate::models::{DbColumnName, DbSchemaName};

/// The standard document id column used by the shared document table and
/// resource root tables
pub fn document_id_column() -> DbColumnName {
    DbColumnName::new("DocumentId")
}

/// The standard ordering column used by collection tables to preserve array
/// element order
pub fn ordinal_column() -> DbColumnName {
    DbColumnName::new("Ordinal")
}

/// Whether the column represents a document id, either the root `DocumentId`
/// or a prefixed `*_DocumentId` key part
pub fn is_document_id_column(column_name: &DbColumnName) -> bool {
    column_name.as_str() == "DocumentId" || column_name.as_str().ends_with("_DocumentId")
}

/// Normalizes a project endpoint name into a physical schema identifier
///
/// Strips non-ASCII-alphanumerics, lowercases, and prefixes a letter when the
/// result is empty or not letter-led, guaranteeing a valid identifier.
pub fn normalize_schema_name(project_endpoint_name: &str) -> DbSchemaName {
    let mut normalized = String::with_capacity(project_endpoint_name.len());

    for character in project_endpoint_name.chars() {
        if character.is_ascii_alphanumeric() {
            normalized.push(character.to_ascii_lowercase());
        }
    }

    if !normalized.chars().next().is_some_and(|c| c.is_ascii_lowercase()) {
        normalized.insert(0, 'p');
    }

    DbSchemaName::new(normalized)
}

/// Converts an arbitrary identifier into PascalCase by capitalizing the first
/// character of every alphanumeric run and dropping everything else
pub fn to_pascal_case(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut next_upper = true;

    for character in value.chars() {
        if character.is_alphanumeric() {
            if next_upper {
                result.extend(character.to_uppercase());
            } else {
                result.push(character);
            }
            next_upper = false;
        } else {
            next_upper = true;
        }
    }

    result
}

/// Applies ordered suffix rules to singularize a collection property name
///
/// `ies` becomes `y`; `ches`/`shes`/`xes`/`zes`/`ses` drop `es`; a trailing
/// `s` (but not `ss`) drops; anything else is unchanged.
pub fn singularize_collection_segment(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }

    let lower = value.to_lowercase();

    if lower.ends_with("ies") {
        let mut singular = value[..value.len() - 3].to_string();
        singular.push('y');
        return singular;
    }

    if ["ches", "shes", "xes", "zes", "ses"]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
    {
        return value[..value.len() - 2].to_string();
    }

    if lower.ends_with('s') && !lower.ends_with("ss") {
        return value[..value.len() - 1].to_string();
    }

    value.to_string()
}

/// Produces the base name for a collection table by singularizing and
/// PascalCasing the collection property name
pub fn to_collection_base_name(collection_property_name: &str) -> String {
    to_pascal_case(&singularize_collection_segment(collection_property_name))
}

/// Column name for the root document id key part on a collection table
/// (e.g. `School_DocumentId`)
pub fn root_document_id_column(root_base_name: &str) -> DbColumnName {
    DbColumnName::new(format!("{root_base_name}_DocumentId"))
}

/// Column name for an ancestor collection ordinal key part
/// (e.g. `AddressOrdinal`)
pub fn parent_collection_ordinal_column(parent_collection_base_name: &str) -> DbColumnName {
    DbColumnName::new(format!("{parent_collection_base_name}Ordinal"))
}

/// Column name for a descriptor FK column given its base name
/// (e.g. `SchoolTypeDescriptor_DescriptorId`)
pub fn descriptor_id_column(descriptor_base_name: &str) -> DbColumnName {
    DbColumnName::new(format!("{descriptor_base_name}_DescriptorId"))
}

/// Foreign key constraint name for a table and its local columns
pub fn foreign_key_name(table_name: &str, columns: &[DbColumnName]) -> String {
    format!("FK_{table_name}_{}", join_column_names(columns))
}

/// Unique constraint name for a table and its columns
pub fn unique_constraint_name(table_name: &str, columns: &[DbColumnName]) -> String {
    format!("UQ_{table_name}_{}", join_column_names(columns))
}

fn join_column_names(columns: &[DbColumnName]) -> String {
    columns
        .iter()
        .map(DbColumnName::as_str)
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_schema_names_to_lowercase_ascii() {
        assert_eq!(normalize_schema_name("Ed-Fi").as_str(), "edfi");
        assert_eq!(normalize_schema_name("sample-extension").as_str(), "sampleextension");
    }

    #[test]
    fn normalized_schema_names_are_letter_led() {
        assert_eq!(normalize_schema_name("2024-data").as_str(), "p2024data");
        assert_eq!(normalize_schema_name("--").as_str(), "p");
        assert_eq!(normalize_schema_name("").as_str(), "p");
    }

    #[test]
    fn pascal_case_capitalizes_each_run() {
        assert_eq!(to_pascal_case("gradeLevelDescriptor"), "GradeLevelDescriptor");
        assert_eq!(to_pascal_case("ed-fi"), "EdFi");
        assert_eq!(to_pascal_case("begin_date"), "BeginDate");
        assert_eq!(to_pascal_case(""), "");
    }

    #[test]
    fn singularizes_with_ordered_suffix_rules() {
        assert_eq!(singularize_collection_segment("Categories"), "Category");
        assert_eq!(singularize_collection_segment("Addresses"), "Address");
        assert_eq!(singularize_collection_segment("boxes"), "box");
        assert_eq!(singularize_collection_segment("periods"), "period");
        assert_eq!(singularize_collection_segment("Data"), "Data");
        assert_eq!(singularize_collection_segment("class"), "class");
    }

    #[test]
    fn builds_collection_base_names() {
        assert_eq!(to_collection_base_name("gradeLevels"), "GradeLevel");
        assert_eq!(to_collection_base_name("addresses"), "Address");
    }

    #[test]
    fn derived_column_templates() {
        assert_eq!(root_document_id_column("School").as_str(), "School_DocumentId");
        assert_eq!(parent_collection_ordinal_column("Address").as_str(), "AddressOrdinal");
        assert_eq!(
            descriptor_id_column("SchoolTypeDescriptor").as_str(),
            "SchoolTypeDescriptor_DescriptorId"
        );
    }

    #[test]
    fn recognizes_document_id_columns() {
        assert!(is_document_id_column(&document_id_column()));
        assert!(is_document_id_column(&root_document_id_column("School")));
        assert!(!is_document_id_column(&ordinal_column()));
    }

    #[test]
    fn constraint_name_templates() {
        let columns = vec![DbColumnName::new("School_DocumentId"), DbColumnName::new("Ordinal")];
        assert_eq!(
            foreign_key_name("SchoolAddress", &columns),
            "FK_SchoolAddress_School_DocumentId_Ordinal"
        );
        assert_eq!(
            unique_constraint_name("School", &columns[..1]),
            "UQ_School_School_DocumentId"
        );
    }
}

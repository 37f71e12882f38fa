//! Logical and physical identifier types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a resource by project and resource name
///
/// Stable cross-project identity, usable as a map key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualifiedResourceName {
    pub project_name: String,
    pub resource_name: String,
}

impl QualifiedResourceName {
    pub fn new(project_name: impl Into<String>, resource_name: impl Into<String>) -> Self {
        QualifiedResourceName {
            project_name: project_name.into(),
            resource_name: resource_name.into(),
        }
    }
}

impl fmt::Display for QualifiedResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project_name, self.resource_name)
    }
}

/// A normalized physical database schema name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DbSchemaName(pub String);

impl DbSchemaName {
    pub fn new(value: impl Into<String>) -> Self {
        DbSchemaName(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DbSchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully qualified physical table name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DbTableName {
    pub schema: DbSchemaName,
    pub name: String,
}

impl DbTableName {
    pub fn new(schema: DbSchemaName, name: impl Into<String>) -> Self {
        DbTableName {
            schema,
            name: name.into(),
        }
    }
}

impl fmt::Display for DbTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A physical database column name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DbColumnName(pub String);

impl DbColumnName {
    pub fn new(value: impl Into<String>) -> Self {
        DbColumnName(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DbColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

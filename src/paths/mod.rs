//! Canonical JSONPath representation
//!
//! A constrained JSONPath syntax is used as the universal key for lookup and
//! ordering during derivation: `$` as the root, `.propertyName` segments, and
//! `[*]` array wildcards (which must follow a property segment). The canonical
//! string is the sole source of truth for equality, ordering, and map keys;
//! the segment list supports structural analysis such as array depth and
//! extension-segment detection.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{DerivationError, Result};

/// The reserved property name under which extension projects attach data
pub const EXTENSION_PROPERTY_NAME: &str = "_ext";

/// A single segment of a canonical JSONPath expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum JsonPathSegment {
    /// A property segment (`.propertyName`)
    Property { name: String },
    /// An array wildcard segment (`[*]`)
    AnyArrayElement,
}

impl JsonPathSegment {
    /// Creates a property segment
    pub fn property(name: impl Into<String>) -> Self {
        JsonPathSegment::Property { name: name.into() }
    }
}

/// A canonical JSONPath expression with its structured segment representation
///
/// Equality, ordering, and hashing all delegate to the canonical string so
/// that two expressions built through different construction routes compare
/// identically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonPathExpression {
    canonical: String,
    segments: Vec<JsonPathSegment>,
}

impl JsonPathExpression {
    /// Returns the root expression `$`
    pub fn root() -> Self {
        JsonPathExpression {
            canonical: "$".to_string(),
            segments: Vec::new(),
        }
    }

    /// Parses a JSONPath string into a canonical expression
    pub fn compile(json_path: &str) -> Result<Self> {
        let bytes = json_path.as_bytes();

        if json_path.is_empty() {
            return Err(DerivationError::SchemaCorruption(
                "JSONPath must not be empty".to_string(),
            ));
        }

        if bytes[0] != b'$' {
            return Err(DerivationError::SchemaCorruption(format!(
                "JSONPath '{json_path}' must start with '$'"
            )));
        }

        if json_path.len() == 1 {
            return Ok(JsonPathExpression::root());
        }

        let mut segments = Vec::new();
        let chars: Vec<char> = json_path.chars().collect();
        let mut index = 1;

        while index < chars.len() {
            match chars[index] {
                '.' => {
                    index += 1;
                    let start = index;
                    while index < chars.len() && chars[index] != '.' && chars[index] != '[' {
                        if !is_valid_property_character(chars[index]) {
                            return Err(DerivationError::SchemaCorruption(format!(
                                "JSONPath '{json_path}' contains invalid property character '{}'",
                                chars[index]
                            )));
                        }
                        index += 1;
                    }

                    if index == start {
                        return Err(DerivationError::SchemaCorruption(format!(
                            "JSONPath '{json_path}' has an empty property segment"
                        )));
                    }

                    let name: String = chars[start..index].iter().collect();
                    segments.push(JsonPathSegment::Property { name });
                }
                '[' => {
                    if !matches!(segments.last(), Some(JsonPathSegment::Property { .. })) {
                        return Err(DerivationError::SchemaCorruption(format!(
                            "JSONPath '{json_path}' has an array wildcard that does not follow a property segment"
                        )));
                    }

                    if index + 2 >= chars.len() || chars[index + 1] != '*' || chars[index + 2] != ']'
                    {
                        return Err(DerivationError::SchemaCorruption(format!(
                            "JSONPath '{json_path}' array segments must use the wildcard [*]"
                        )));
                    }

                    segments.push(JsonPathSegment::AnyArrayElement);
                    index += 3;
                    continue;
                }
                other => {
                    return Err(DerivationError::SchemaCorruption(format!(
                        "JSONPath '{json_path}' contains unexpected character '{other}'"
                    )));
                }
            }
        }

        Ok(JsonPathExpression {
            canonical: build_canonical(&segments),
            segments,
        })
    }

    /// Builds a canonical expression from a validated segment sequence
    pub fn from_segments(segments: Vec<JsonPathSegment>) -> Result<Self> {
        validate_segments(&segments)?;

        Ok(JsonPathExpression {
            canonical: build_canonical(&segments),
            segments,
        })
    }

    /// The canonical string form (e.g. `$.addresses[*].periods[*]`)
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// The structured segment sequence
    pub fn segments(&self) -> &[JsonPathSegment] {
        &self.segments
    }

    /// Whether this is the root expression `$`
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Counts the array wildcard segments; parent scopes always order ahead
    /// of deeper array scopes
    pub fn array_depth(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, JsonPathSegment::AnyArrayElement))
            .count()
    }

    /// Whether any property segment is the reserved `_ext` extension segment
    pub fn has_extension_segment(&self) -> bool {
        self.segments.iter().any(|segment| {
            matches!(segment, JsonPathSegment::Property { name } if name == EXTENSION_PROPERTY_NAME)
        })
    }

    /// Returns a new expression with a property segment appended
    pub fn append_property(&self, name: impl Into<String>) -> Result<Self> {
        let mut segments = self.segments.clone();
        segments.push(JsonPathSegment::Property { name: name.into() });
        JsonPathExpression::from_segments(segments)
    }

    /// Returns a new expression with an array wildcard appended
    pub fn append_any_array_element(&self) -> Result<Self> {
        let mut segments = self.segments.clone();
        segments.push(JsonPathSegment::AnyArrayElement);
        JsonPathExpression::from_segments(segments)
    }

    /// Returns the expression with its final segment removed, or `None` at
    /// the root
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }

        let segments = self.segments[..self.segments.len() - 1].to_vec();
        Some(JsonPathExpression {
            canonical: build_canonical(&segments),
            segments,
        })
    }

    /// Whether `prefix` is a (non-strict) structural prefix of this path
    pub fn starts_with(&self, prefix: &JsonPathExpression) -> bool {
        if prefix.segments.len() > self.segments.len() {
            return false;
        }

        self.segments[..prefix.segments.len()] == prefix.segments[..]
    }
}

impl PartialEq for JsonPathExpression {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for JsonPathExpression {}

impl PartialOrd for JsonPathExpression {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for JsonPathExpression {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl Hash for JsonPathExpression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for JsonPathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

fn build_canonical(segments: &[JsonPathSegment]) -> String {
    let mut canonical = String::from("$");

    for segment in segments {
        match segment {
            JsonPathSegment::Property { name } => {
                canonical.push('.');
                canonical.push_str(name);
            }
            JsonPathSegment::AnyArrayElement => canonical.push_str("[*]"),
        }
    }

    canonical
}

fn validate_segments(segments: &[JsonPathSegment]) -> Result<()> {
    let mut previous: Option<&JsonPathSegment> = None;

    for segment in segments {
        match segment {
            JsonPathSegment::Property { name } => {
                if name.is_empty() || !name.chars().all(is_valid_property_character) {
                    return Err(DerivationError::SchemaCorruption(format!(
                        "JSONPath property name '{name}' is invalid"
                    )));
                }
            }
            JsonPathSegment::AnyArrayElement => {
                if !matches!(previous, Some(JsonPathSegment::Property { .. })) {
                    return Err(DerivationError::SchemaCorruption(
                        "JSONPath array wildcards must follow a property segment".to_string(),
                    ));
                }
            }
        }

        previous = Some(segment);
    }

    Ok(())
}

fn is_valid_property_character(character: char) -> bool {
    character == '_' || character == '-' || character.is_alphanumeric()
}

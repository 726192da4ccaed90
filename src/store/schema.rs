//! Schema inference and insert validation.
//!
//! A collection's schema is never stored. It is inferred on demand from one
//! sample document (the oldest in the collection) and maps each field name to
//! a tag from the closed set in [`FieldType`]. The guard enforces that every
//! insert conforms to the baseline: no unknown fields, no type drift, and no
//! collection-wide field left absent from a new document (omitted fields are
//! filled with the type's zero value).
//!
//! Divergent writes are rejected with a [`SchemaViolation`] naming exactly
//! what the model must fix; the violation serializes into the tool-result
//! payload so the model can recover by calling the schema-extension
//! operation.
//!
//! The generated `id` field and `null` values sit outside the schema: `id`
//! is never part of a baseline, and a `null` proposed for a known field is
//! treated as omitted (zero-filled). A `null` in the baseline sample leaves
//! that field out of the schema entirely.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Name of the generated unique identifier field on stored documents.
pub const ID_FIELD: &str = "id";

/// Closed set of semantic type tags for schema inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    List,
    Map,
}

impl FieldType {
    /// Classify a JSON value. `None` for `null`, which has no tag.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) => Some(Self::String),
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    Some(Self::Integer)
                } else {
                    Some(Self::Float)
                }
            }
            Value::Bool(_) => Some(Self::Boolean),
            Value::Array(_) => Some(Self::List),
            Value::Object(_) => Some(Self::Map),
            Value::Null => None,
        }
    }

    /// The zero value used to fill omitted fields.
    pub fn zero(&self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Integer => Value::from(0),
            Self::Float => Value::from(0.0),
            Self::Boolean => Value::Bool(false),
            Self::List => Value::Array(Vec::new()),
            Self::Map => Value::Object(Map::new()),
        }
    }

    /// The tag's display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::List => "list",
            Self::Map => "map",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Field name → type tag, ordered for stable display.
pub type Schema = BTreeMap<String, FieldType>;

/// Why a proposed write diverged from the schema baseline.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaViolation {
    /// The proposed document carries fields the baseline does not know.
    #[error("document contains fields that are not in the current schema: {fields:?}")]
    UnknownFields { fields: Vec<String> },

    /// A shared field's value type differs from the baseline's.
    #[error("type mismatch for field '{field}': expected '{expected}', got '{actual}'")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        actual: FieldType,
    },
}

/// Infer the schema baseline from a sample document. The `id` field and
/// null-valued fields are excluded.
pub fn infer_schema(sample: &Map<String, Value>) -> Schema {
    sample
        .iter()
        .filter(|(key, _)| key.as_str() != ID_FIELD)
        .filter_map(|(key, value)| FieldType::of(value).map(|tag| (key.clone(), tag)))
        .collect()
}

/// Validate a proposed document against the collection's sample.
///
/// With no sample (empty collection) the document is accepted verbatim and
/// becomes the schema baseline. Otherwise unknown fields and type drift are
/// rejected, and the returned document is the proposed fields unioned with
/// zero values for every baseline field the caller omitted.
pub fn validate_insert(
    sample: Option<&Map<String, Value>>,
    proposed: &Map<String, Value>,
) -> Result<Map<String, Value>, SchemaViolation> {
    let sample = match sample {
        Some(sample) => sample,
        None => return Ok(proposed.clone()),
    };

    let schema = infer_schema(sample);

    let unknown: Vec<String> = proposed
        .keys()
        .filter(|key| !schema.contains_key(*key))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(SchemaViolation::UnknownFields { fields: unknown });
    }

    for (key, value) in proposed {
        let expected = schema[key];
        match FieldType::of(value) {
            Some(actual) if actual != expected => {
                return Err(SchemaViolation::TypeMismatch {
                    field: key.clone(),
                    expected,
                    actual,
                });
            }
            _ => {}
        }
    }

    let mut validated = Map::new();
    for (key, expected) in &schema {
        match proposed.get(key) {
            Some(value) if !value.is_null() => {
                validated.insert(key.clone(), value.clone());
            }
            _ => {
                validated.insert(key.clone(), expected.zero());
            }
        }
    }
    Ok(validated)
}

//! Lightweight value-shape schemas.
//!
//! Full JSON-schema validation happens upstream in the workspace loader.
//! The coordinator only needs enough shape information to materialize the
//! context layout and to catch type-level mistakes at run boundaries --
//! in particular the integer/float distinction, which the storage layer
//! must preserve.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shape violation found while validating a value against a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A value had a different JSON type than the schema declared.
    #[error("type mismatch at `{path}`: expected {expected}, found {found}")]
    TypeMismatch {
        /// Dotted path to the offending value (empty for the root).
        path: String,
        /// The declared shape.
        expected: &'static str,
        /// The JSON type actually found.
        found: &'static str,
    },

    /// A required object field was absent.
    #[error("missing required field `{field}` at `{path}`")]
    MissingField {
        /// Dotted path to the enclosing object (empty for the root).
        path: String,
        /// Name of the missing field.
        field: String,
    },
}

/// Declarative shape of a JSON value.
///
/// `Integer` and `Number` are distinct: an `Integer` slot rejects floats,
/// while a `Number` slot accepts both. `Any` opts a subtree out of shape
/// checking entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSchema {
    /// JSON null.
    Null,
    /// JSON boolean.
    Boolean,
    /// JSON number restricted to integers.
    Integer,
    /// Any JSON number.
    Number,
    /// JSON string.
    String,
    /// JSON array with homogeneous element shape.
    Array(Box<ValueSchema>),
    /// JSON object with declared fields.
    Object {
        /// Field name → shape, in declaration order.
        fields: IndexMap<String, ValueSchema>,
        /// Names of fields that must be present.
        #[serde(default)]
        required: Vec<String>,
    },
    /// Any JSON value; no shape checking.
    Any,
}

impl ValueSchema {
    /// An object schema with no declared fields.
    #[must_use]
    pub fn empty_object() -> Self {
        Self::Object {
            fields: IndexMap::new(),
            required: Vec::new(),
        }
    }

    /// Convenience constructor for object schemas.
    #[must_use]
    pub fn object<I>(fields: I, required: &[&str]) -> Self
    where
        I: IntoIterator<Item = (&'static str, ValueSchema)>,
    {
        Self::Object {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect(),
            required: required.iter().map(|&r| r.to_owned()).collect(),
        }
    }

    /// Validate `value` against this schema.
    pub fn validate(&self, value: &serde_json::Value) -> Result<(), SchemaError> {
        self.validate_at(value, "")
    }

    fn validate_at(&self, value: &serde_json::Value, path: &str) -> Result<(), SchemaError> {
        use serde_json::Value;

        let mismatch = |expected: &'static str| SchemaError::TypeMismatch {
            path: path.to_owned(),
            expected,
            found: json_type_name(value),
        };

        match self {
            Self::Any => Ok(()),
            Self::Null => match value {
                Value::Null => Ok(()),
                _ => Err(mismatch("null")),
            },
            Self::Boolean => match value {
                Value::Bool(_) => Ok(()),
                _ => Err(mismatch("boolean")),
            },
            Self::Integer => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(()),
                _ => Err(mismatch("integer")),
            },
            Self::Number => match value {
                Value::Number(_) => Ok(()),
                _ => Err(mismatch("number")),
            },
            Self::String => match value {
                Value::String(_) => Ok(()),
                _ => Err(mismatch("string")),
            },
            Self::Array(element) => match value {
                Value::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        element.validate_at(item, &join_path(path, &i.to_string()))?;
                    }
                    Ok(())
                }
                _ => Err(mismatch("array")),
            },
            Self::Object { fields, required } => match value {
                Value::Object(map) => {
                    for field in required {
                        if !map.contains_key(field) {
                            return Err(SchemaError::MissingField {
                                path: path.to_owned(),
                                field: field.clone(),
                            });
                        }
                    }
                    for (name, shape) in fields {
                        if let Some(v) = map.get(name) {
                            shape.validate_at(v, &join_path(path, name))?;
                        }
                    }
                    Ok(())
                }
                _ => Err(mismatch("object")),
            },
        }
    }

    /// The default value a context slot of this shape is materialized with.
    #[must_use]
    pub fn default_value(&self) -> serde_json::Value {
        match self {
            Self::Array(_) => serde_json::Value::Array(Vec::new()),
            Self::Object { fields, .. } => {
                let map = fields
                    .iter()
                    .map(|(name, shape)| (name.clone(), shape.default_value()))
                    .collect();
                serde_json::Value::Object(map)
            }
            _ => serde_json::Value::Null,
        }
    }
}

fn join_path(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_owned()
    } else {
        format!("{base}.{segment}")
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_rejects_floats() {
        assert!(ValueSchema::Integer.validate(&json!(3)).is_ok());
        assert!(ValueSchema::Integer.validate(&json!(-7)).is_ok());
        let err = ValueSchema::Integer.validate(&json!(3.5)).unwrap_err();
        assert!(err.to_string().contains("expected integer"));
    }

    #[test]
    fn number_accepts_both() {
        assert!(ValueSchema::Number.validate(&json!(3)).is_ok());
        assert!(ValueSchema::Number.validate(&json!(3.5)).is_ok());
    }

    #[test]
    fn object_required_field_enforced() {
        let schema = ValueSchema::object([("items", ValueSchema::Array(Box::new(ValueSchema::String)))], &["items"]);
        assert!(schema.validate(&json!({"items": ["a"]})).is_ok());

        let err = schema.validate(&json!({})).unwrap_err();
        assert!(err.to_string().contains("missing required field `items`"));
    }

    #[test]
    fn object_optional_field_checked_when_present() {
        let schema = ValueSchema::object([("count", ValueSchema::Integer)], &[]);
        assert!(schema.validate(&json!({})).is_ok());
        assert!(schema.validate(&json!({"count": 2})).is_ok());
        assert!(schema.validate(&json!({"count": "two"})).is_err());
    }

    #[test]
    fn array_elements_validated_with_index_path() {
        let schema = ValueSchema::Array(Box::new(ValueSchema::String));
        let err = schema.validate(&json!(["ok", 1])).unwrap_err();
        assert!(err.to_string().contains("at `1`"));
    }

    #[test]
    fn nested_path_in_error() {
        let schema = ValueSchema::object(
            [("inner", ValueSchema::object([("flag", ValueSchema::Boolean)], &[]))],
            &[],
        );
        let err = schema
            .validate(&json!({"inner": {"flag": "yes"}}))
            .unwrap_err();
        assert!(err.to_string().contains("at `inner.flag`"));
    }

    #[test]
    fn any_accepts_everything() {
        for v in [json!(null), json!(true), json!(1.5), json!("s"), json!([]), json!({})] {
            assert!(ValueSchema::Any.validate(&v).is_ok());
        }
    }

    #[test]
    fn default_value_materializes_structure() {
        let schema = ValueSchema::object(
            [
                ("questions", ValueSchema::Array(Box::new(ValueSchema::String))),
                ("meta", ValueSchema::object([("round", ValueSchema::Integer)], &[])),
            ],
            &[],
        );
        assert_eq!(
            schema.default_value(),
            json!({"questions": [], "meta": {"round": null}})
        );
    }

    #[test]
    fn serde_roundtrip() {
        let schema = ValueSchema::object(
            [("xs", ValueSchema::Array(Box::new(ValueSchema::Number)))],
            &["xs"],
        );
        let json = serde_json::to_string(&schema).unwrap();
        let back: ValueSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
    }
}

//! Transition guard conditions.
//!
//! Conditions are evaluated by the dispatcher against the context store
//! *before* the routing planner runs, so the planner stays pure. A
//! transition with no condition matches unconditionally.

use serde::{Deserialize, Serialize};

/// A guard on a transition, testing one context path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Context path the predicate reads (e.g. `state.verdict`).
    pub path: String,
    /// The test applied to the value at `path`.
    pub predicate: Predicate,
}

impl Condition {
    /// Build a condition.
    #[must_use]
    pub fn new(path: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            path: path.into(),
            predicate,
        }
    }

    /// Evaluate against the value read from the context (`None` = absent).
    #[must_use]
    pub fn evaluate(&self, value: Option<&serde_json::Value>) -> bool {
        self.predicate.test(value)
    }
}

/// Predicate applied to a context value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// The path resolves to any value, including `null`.
    Exists,
    /// The value is truthy: not absent, not `null`, not `false`, not `0`,
    /// not `""`, not an empty array or object.
    Truthy,
    /// The value equals the given JSON value.
    Equals(serde_json::Value),
    /// The value is absent or differs from the given JSON value.
    NotEquals(serde_json::Value),
}

impl Predicate {
    /// Apply this predicate to a resolved value (`None` = absent).
    #[must_use]
    pub fn test(&self, value: Option<&serde_json::Value>) -> bool {
        use serde_json::Value;
        match self {
            Self::Exists => value.is_some(),
            Self::Truthy => match value {
                None | Some(Value::Null) | Some(Value::Bool(false)) => false,
                Some(Value::Number(n)) => n.as_f64() != Some(0.0),
                Some(Value::String(s)) => !s.is_empty(),
                Some(Value::Array(a)) => !a.is_empty(),
                Some(Value::Object(o)) => !o.is_empty(),
                Some(Value::Bool(true)) => true,
            },
            Self::Equals(expected) => value == Some(expected),
            Self::NotEquals(expected) => value != Some(expected),
        }
    }
}

//! Declarative path mappings.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An ordered set of `target ← source` path assignments.
///
/// Used in three places, with the same shape but different path universes:
///
/// - a node's `input_mapping` -- target keys in the task's input object,
///   sources are context paths (`input.*` / `state.*`)
/// - a node's `output_mapping` -- targets are context paths, sources are
///   paths *into the action's output value* (the empty source selects the
///   whole output)
/// - the workflow-level `output_mapping` -- target keys in the run's final
///   output, sources are context paths
///
/// Entries evaluate in declaration order; later entries see earlier writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mapping(IndexMap<String, String>);

impl Mapping {
    /// An empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapping from `(target, source)` pairs.
    #[must_use]
    pub fn from_pairs<I, T, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, S)>,
        T: Into<String>,
        S: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(t, s)| (t.into(), s.into()))
                .collect(),
        )
    }

    /// Add an assignment, replacing any existing one for the same target.
    pub fn insert(&mut self, target: impl Into<String>, source: impl Into<String>) {
        self.0.insert(target.into(), source.into());
    }

    /// Iterate `(target, source)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(t, s)| (t.as_str(), s.as_str()))
    }

    /// Returns `true` if no assignments are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of assignments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

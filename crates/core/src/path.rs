//! Token lineage paths.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::refs::NodeRef;

/// Dotted lineage string identifying where in the fan-out tree a token sits.
///
/// The root token of a run has path `root`. A token spawned as branch `i`
/// of a fan-out that fired when node `n` completed gets the parent's path
/// extended with `.n.i`; the continuation token created by a fan-in at
/// target node `t` gets the fan-out parent's path extended with `.t.join`.
///
/// Example: `root.ideate.0.judge.2` -- the third judge branch under the
/// first ideate branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenPath(String);

impl TokenPath {
    /// The path of a run's root token.
    #[must_use]
    pub fn root() -> Self {
        Self("root".to_owned())
    }

    /// Path of branch `index` spawned when the node at this path completed.
    #[must_use]
    pub fn child(&self, spawned_at: &NodeRef, index: u32) -> Self {
        Self(format!("{}.{}.{}", self.0, spawned_at, index))
    }

    /// Path of the continuation token created by a fan-in at `target`.
    #[must_use]
    pub fn join(&self, target: &NodeRef) -> Self {
        Self(format!("{}.{}.join", self.0, target))
    }

    /// Returns `true` if `self` is `ancestor` or a descendant of it.
    ///
    /// Segment-aware: `root.a.10` is not a descendant of `root.a.1`.
    #[must_use]
    pub fn starts_with(&self, ancestor: &Self) -> bool {
        self.0 == ancestor.0
            || (self.0.starts_with(&ancestor.0)
                && self.0.as_bytes().get(ancestor.0.len()) == Some(&b'.'))
    }

    /// The path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

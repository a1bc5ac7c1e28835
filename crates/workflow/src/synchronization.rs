//! Fan-in synchronization declarations.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use weft_core::{NodeRef, TransitionRef};

/// Fan-in declaration attached to a transition.
///
/// Declares that tokens of `sibling_group` converge before the transition's
/// target node runs: the group's completions are joined per `strategy`,
/// branch outputs are optionally combined per `merge`, and exactly one
/// continuation token carries execution past the join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synchronization {
    /// How many sibling completions the join waits for.
    pub strategy: FanInStrategy,
    /// The fan-out whose siblings this fan-in joins.
    pub sibling_group: TransitionRef,
    /// How per-branch outputs combine into the shared context.
    #[serde(default)]
    pub merge: Option<MergeConfig>,
    /// Deadline measured from the first sibling's arrival at the group.
    #[serde(default, rename = "timeout_ms", with = "crate::serde_duration_opt")]
    pub timeout: Option<Duration>,
    /// What to do when the deadline expires.
    #[serde(default)]
    pub on_timeout: TimeoutPolicy,
}

/// Quorum strategy for a fan-in point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanInStrategy {
    /// Wait for every sibling to settle.
    All,
    /// The first successful sibling wins; the rest are cancelled.
    Any,
    /// Wait for M successful completions out of the group.
    MOfN(u32),
}

impl fmt::Display for FanInStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Any => write!(f, "any"),
            Self::MOfN(m) => write!(f, "m_of_n({m})"),
        }
    }
}

/// Policy applied when a fan-in deadline expires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Fail the workflow.
    #[default]
    Fail,
    /// Activate the fan-in with whatever siblings have succeeded so far.
    ProceedWithAvailable,
}

/// How per-branch outputs combine into a single context target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Path into each branch's captured output (empty selects the whole
    /// output).
    pub source: String,
    /// Context path the combined value is written to.
    pub target: String,
    /// The combining operator.
    pub strategy: MergeStrategy,
}

/// Merge operator for fan-in branch outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Push each contributor's source value into the target array, in
    /// `branch_index` order.
    Append,
    /// Shallow-merge object keys; higher `branch_index` wins on conflict.
    Merge,
    /// Each source must be `{key, value}`; stored as `target[key]`.
    /// Duplicate keys are a conflict.
    Keyed,
    /// The highest-`branch_index` contributor's source value wins outright.
    LastWins,
}

/// The identifier at-most-one-activation is enforced on.
///
/// One fan-in point is the pair of a sibling group and the node the join
/// feeds, rendered `"<sibling_group>:<target_node>"`. Its uniqueness in the
/// per-run coordination table is the sole synchronization primitive that
/// makes concurrent activation attempts safe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FanInPath(String);

impl FanInPath {
    /// Build the path for a sibling group converging at `target`.
    #[must_use]
    pub fn new(sibling_group: &TransitionRef, target: &NodeRef) -> Self {
        Self(format!("{sibling_group}:{target}"))
    }

    /// The path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split back into `(sibling_group, target_node)`.
    #[must_use]
    pub fn parts(&self) -> Option<(TransitionRef, NodeRef)> {
        let (group, target) = self.0.split_once(':')?;
        Some((TransitionRef::from(group), NodeRef::from(target)))
    }
}

impl fmt::Display for FanInPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//! Fine-grained planner trace events.

use serde::{Deserialize, Serialize};
use weft_core::{NodeRef, TokenId, TransitionRef};

/// A planner-level trace event.
///
/// Emitted alongside routing decisions so a run can be reconstructed at
/// the granularity of individual synchronization checks and condition
/// evaluations. Wrapped in [`RunEvent::Trace`](crate::RunEvent::Trace)
/// when it crosses the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    /// A transition's guard condition was evaluated.
    ConditionEvaluated {
        /// The guarded transition.
        transition: TransitionRef,
        /// Whether the condition matched.
        matched: bool,
    },

    /// A fan-out's spawn count was computed.
    SpawnComputed {
        /// The fan-out transition.
        transition: TransitionRef,
        /// Number of siblings the transition will spawn.
        count: u32,
    },

    /// A synchronization strategy was checked against sibling counts.
    SyncChecked {
        /// The fan-in under consideration, as `group:target`.
        fan_in_path: String,
        /// Successful completions so far (including the subject token).
        succeeded: u32,
        /// Failed siblings so far.
        failed: u32,
        /// Size of the sibling group.
        total: u32,
        /// Whether the check activated the fan-in.
        activated: bool,
    },

    /// A dispatch batch boundary: one planner invocation produced
    /// `decisions` decisions for the dispatcher to apply atomically.
    DispatchBatch {
        /// The token whose event was planned (absent for timeouts).
        token: Option<TokenId>,
        /// The node that token sat at.
        node: Option<NodeRef>,
        /// Number of decisions in the batch.
        decisions: usize,
    },
}

//! Planner decisions: the closed instruction set the dispatcher applies.

use std::time::Duration;

use weft_core::{NodeRef, TokenId, TransitionRef};
use weft_telemetry::TraceEvent;
use weft_workflow::FanInPath;

use crate::status::TokenStatus;
use crate::token::TokenSpec;

/// Reference to a token within one decision batch.
///
/// Token IDs are assigned by the store when `CreateToken` decisions are
/// applied, so decisions about tokens created in the same batch refer to
/// them by their position among the batch's `CreateToken`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRef {
    /// A token that already exists in the store.
    Existing(TokenId),
    /// The n-th token created by this batch (0-based, counting
    /// `CreateToken` decisions in order).
    Created(usize),
}

/// One routing decision. The dispatcher applies a batch of these as a
/// single logical step.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Persist a new token.
    CreateToken(TokenSpec),

    /// Hand a pending token to the action executor.
    MarkForDispatch(TokenRef),

    /// Park a token at a fan-in point.
    MarkWaiting {
        /// The parked token.
        token: TokenId,
        /// The fan-in it waits on.
        fan_in_path: FanInPath,
        /// Deadline measured from the group's first arrival, if declared.
        timeout: Option<Duration>,
    },

    /// Attempt to activate a fan-in point. The dispatcher inserts the
    /// coordination record; on conflict the decision is a no-op, on
    /// success it merges branch outputs and creates the continuation.
    ActivateFanIn {
        /// The point being activated.
        fan_in_path: FanInPath,
        /// The joined sibling group.
        sibling_group: TransitionRef,
        /// The node the continuation executes.
        target: NodeRef,
        /// Contributors, in `branch_index` order.
        merged: Vec<TokenId>,
        /// The arrival that triggered activation (`None` for timeouts).
        winner: Option<TokenId>,
    },

    /// Change a token's status.
    UpdateStatus {
        /// The token.
        token: TokenId,
        /// The new status.
        status: TokenStatus,
    },

    /// Fail the whole workflow.
    FailWorkflow {
        /// Why the workflow failed.
        reason: String,
    },
}

/// The event a planner invocation routes.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanEvent {
    /// A token's action completed successfully.
    TokenCompleted {
        /// The completed token.
        token: TokenId,
    },
    /// A token's action failed or timed out.
    TokenFailed {
        /// The failed token.
        token: TokenId,
        /// Its terminal status (`Failed` or `TimedOut`).
        terminal: TokenStatus,
        /// Error description.
        reason: String,
    },
    /// A fan-in deadline expired.
    FanInTimeout {
        /// The timed-out point.
        fan_in_path: FanInPath,
    },
}

/// What one planner invocation produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanOutcome {
    /// Decisions, in application order.
    pub decisions: Vec<Decision>,
    /// Fine-grained trace of how the decisions were reached.
    pub trace: Vec<TraceEvent>,
}

impl PlanOutcome {
    /// Returns `true` if the batch contains a `FailWorkflow`.
    #[must_use]
    pub fn fails_workflow(&self) -> bool {
        self.decisions
            .iter()
            .any(|d| matches!(d, Decision::FailWorkflow { .. }))
    }

    /// Number of `CreateToken` decisions in the batch.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| matches!(d, Decision::CreateToken(_)))
            .count()
    }
}

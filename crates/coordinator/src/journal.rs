//! Run journal for audit and debugging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weft_core::{NodeRef, RunId, TokenId, TokenPath, WorkflowId};

/// A journal entry recording a significant event during a run.
///
/// The journal is an append-only audit log owned by the dispatcher and
/// returned on the run outcome. It is a record, not the source of truth --
/// the token and context stores are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEntry {
    /// The run was started.
    RunStarted {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The workflow being run.
        workflow_id: WorkflowId,
    },

    /// A token was created.
    TokenSpawned {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The new token.
        token: TokenId,
        /// The node it will execute.
        node: NodeRef,
        /// Its lineage path.
        path: TokenPath,
    },

    /// A token was handed to the action executor.
    TokenDispatched {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The dispatched token.
        token: TokenId,
        /// The node being executed.
        node: NodeRef,
    },

    /// A token's action completed successfully.
    NodeCompleted {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The completed token.
        token: TokenId,
        /// The node that completed.
        node: NodeRef,
    },

    /// A token's action failed or timed out.
    NodeFailed {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The failed token.
        token: TokenId,
        /// The node that failed.
        node: NodeRef,
        /// Error description.
        error: String,
    },

    /// A token parked at a fan-in point.
    TokenWaiting {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The parked token.
        token: TokenId,
        /// The fan-in it waits on, as `group:target`.
        fan_in_path: String,
    },

    /// A fan-in point activated.
    FanInActivated {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The activated point, as `group:target`.
        fan_in_path: String,
        /// Contributors whose outputs were merged.
        merged: Vec<TokenId>,
    },

    /// A planned activation lost the uniqueness race (benign).
    FanInRaceLost {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The contested point, as `group:target`.
        fan_in_path: String,
    },

    /// Branch outputs were combined into the context.
    BranchesMerged {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The merge target path.
        target: String,
        /// How many branches contributed.
        contributors: usize,
    },

    /// A sub-workflow child run was started for a token.
    SubworkflowStarted {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The parked parent token.
        token: TokenId,
        /// The child run.
        child_run: RunId,
    },

    /// A sub-workflow child run reached a terminal state.
    SubworkflowCompleted {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The parent token.
        token: TokenId,
        /// The child run.
        child_run: RunId,
        /// Whether the child completed successfully.
        success: bool,
    },

    /// A fan-in deadline expired.
    TimeoutFired {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The timed-out point, as `group:target`.
        fan_in_path: String,
    },

    /// A result callback arrived for a terminal token and was dropped.
    ResultDropped {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The terminal token the result belonged to.
        token: TokenId,
    },

    /// The run completed successfully.
    RunCompleted {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
    },

    /// The run failed.
    RunFailed {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// Failure description.
        reason: String,
    },
}

impl JournalEntry {
    /// Get the timestamp of this entry.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::RunStarted { timestamp, .. }
            | Self::TokenSpawned { timestamp, .. }
            | Self::TokenDispatched { timestamp, .. }
            | Self::NodeCompleted { timestamp, .. }
            | Self::NodeFailed { timestamp, .. }
            | Self::TokenWaiting { timestamp, .. }
            | Self::FanInActivated { timestamp, .. }
            | Self::FanInRaceLost { timestamp, .. }
            | Self::BranchesMerged { timestamp, .. }
            | Self::SubworkflowStarted { timestamp, .. }
            | Self::SubworkflowCompleted { timestamp, .. }
            | Self::TimeoutFired { timestamp, .. }
            | Self::ResultDropped { timestamp, .. }
            | Self::RunCompleted { timestamp }
            | Self::RunFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the token associated with this entry, if any.
    #[must_use]
    pub fn token(&self) -> Option<TokenId> {
        match self {
            Self::TokenSpawned { token, .. }
            | Self::TokenDispatched { token, .. }
            | Self::NodeCompleted { token, .. }
            | Self::NodeFailed { token, .. }
            | Self::TokenWaiting { token, .. }
            | Self::SubworkflowStarted { token, .. }
            | Self::SubworkflowCompleted { token, .. }
            | Self::ResultDropped { token, .. } => Some(*token),
            _ => None,
        }
    }
}

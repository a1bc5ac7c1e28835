//! Token status tracking.

use serde::{Deserialize, Serialize};

/// The status of a single token.
///
/// Terminal statuses are [`Completed`](Self::Completed),
/// [`Failed`](Self::Failed), [`TimedOut`](Self::TimedOut) and
/// [`Cancelled`](Self::Cancelled). A token parked at
/// [`WaitingForSiblings`](Self::WaitingForSiblings) does not count as
/// active work -- the fan-in that releases it is driven by its siblings --
/// while [`WaitingForSubworkflow`](Self::WaitingForSubworkflow) does,
/// because a child run is in flight on its behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// Created, not yet handed to the executor.
    Pending,
    /// Handed to the action executor.
    Dispatched,
    /// The action is running.
    Executing,
    /// Arrived at a fan-in point; waiting for the sibling quorum.
    WaitingForSiblings,
    /// Parked while a child run executes this node's sub-workflow.
    WaitingForSubworkflow,
    /// The node's work finished successfully.
    Completed,
    /// The node's work failed.
    Failed,
    /// The node's work (or its fan-in wait) exceeded its deadline.
    TimedOut,
    /// Superseded by a fan-in activation or a workflow failure.
    Cancelled,
}

impl TokenStatus {
    /// Returns `true` if the token has reached a final status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    /// Returns `true` if the token counts toward the run's active work.
    ///
    /// This is the workflow-completion predicate: a run is done when no
    /// token is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != Self::WaitingForSiblings
    }

    /// Returns `true` if the token finished successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns `true` for the two parked statuses.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::WaitingForSiblings | Self::WaitingForSubworkflow)
    }

    /// Returns `true` if the token is in the executor's hands.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Dispatched | Self::Executing)
    }
}

impl std::fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Dispatched => write!(f, "dispatched"),
            Self::Executing => write!(f, "executing"),
            Self::WaitingForSiblings => write!(f, "waiting_for_siblings"),
            Self::WaitingForSubworkflow => write!(f, "waiting_for_subworkflow"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TokenStatus; 9] = [
        TokenStatus::Pending,
        TokenStatus::Dispatched,
        TokenStatus::Executing,
        TokenStatus::WaitingForSiblings,
        TokenStatus::WaitingForSubworkflow,
        TokenStatus::Completed,
        TokenStatus::Failed,
        TokenStatus::TimedOut,
        TokenStatus::Cancelled,
    ];

    #[test]
    fn terminal_statuses() {
        assert!(TokenStatus::Completed.is_terminal());
        assert!(TokenStatus::Failed.is_terminal());
        assert!(TokenStatus::TimedOut.is_terminal());
        assert!(TokenStatus::Cancelled.is_terminal());

        assert!(!TokenStatus::Pending.is_terminal());
        assert!(!TokenStatus::Dispatched.is_terminal());
        assert!(!TokenStatus::Executing.is_terminal());
        assert!(!TokenStatus::WaitingForSiblings.is_terminal());
        assert!(!TokenStatus::WaitingForSubworkflow.is_terminal());
    }

    #[test]
    fn waiting_for_siblings_is_not_active() {
        assert!(!TokenStatus::WaitingForSiblings.is_active());
    }

    #[test]
    fn waiting_for_subworkflow_is_active() {
        // A child run is working on this token's behalf.
        assert!(TokenStatus::WaitingForSubworkflow.is_active());
    }

    #[test]
    fn in_flight_statuses() {
        assert!(TokenStatus::Pending.is_in_flight());
        assert!(TokenStatus::Dispatched.is_in_flight());
        assert!(TokenStatus::Executing.is_in_flight());
        assert!(!TokenStatus::WaitingForSiblings.is_in_flight());
        assert!(!TokenStatus::Completed.is_in_flight());
    }

    #[test]
    fn success_status() {
        assert!(TokenStatus::Completed.is_success());
        assert!(!TokenStatus::Failed.is_success());
        assert!(!TokenStatus::Cancelled.is_success());
    }

    #[test]
    fn display_formatting() {
        assert_eq!(TokenStatus::Pending.to_string(), "pending");
        assert_eq!(
            TokenStatus::WaitingForSiblings.to_string(),
            "waiting_for_siblings"
        );
        assert_eq!(
            TokenStatus::WaitingForSubworkflow.to_string(),
            "waiting_for_subworkflow"
        );
        assert_eq!(TokenStatus::TimedOut.to_string(), "timed_out");
    }

    #[test]
    fn serde_roundtrip() {
        for status in &ALL {
            let json = serde_json::to_string(status).unwrap();
            let back: TokenStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(*status, back, "roundtrip failed for {status}");
        }
    }

    #[test]
    fn serde_rename_snake_case() {
        let json = serde_json::to_string(&TokenStatus::WaitingForSiblings).unwrap();
        assert_eq!(json, "\"waiting_for_siblings\"");
    }
}

//! Token status state machine validation.

use weft_core::TokenId;

use crate::error::CoordinatorError;
use crate::status::TokenStatus;

/// Returns `true` if the status transition from `from` to `to` is legal.
///
/// The lifecycle:
///
/// ```text
/// pending ── dispatched ── executing ─┬─ completed
///    │                                ├─ failed
///    │                                ├─ timed_out
///    │                                └─ waiting_for_siblings ─┬─ completed
///    │                                                         └─ timed_out
///    └─ waiting_for_subworkflow ─┬─ completed
///                                └─ failed
/// ```
///
/// plus cancellation from every non-terminal status. Terminal statuses
/// transition nowhere.
#[must_use]
pub fn can_transition(from: TokenStatus, to: TokenStatus) -> bool {
    use TokenStatus as S;
    matches!(
        (from, to),
        (S::Pending, S::Dispatched)
            | (S::Pending, S::WaitingForSubworkflow)
            | (S::Pending, S::Cancelled)
            | (S::Dispatched, S::Executing)
            | (S::Dispatched, S::Cancelled)
            | (S::Executing, S::Completed)
            | (S::Executing, S::Failed)
            | (S::Executing, S::TimedOut)
            | (S::Executing, S::WaitingForSiblings)
            | (S::Executing, S::Cancelled)
            | (S::WaitingForSiblings, S::Completed)
            | (S::WaitingForSiblings, S::TimedOut)
            | (S::WaitingForSiblings, S::Cancelled)
            | (S::WaitingForSubworkflow, S::Completed)
            | (S::WaitingForSubworkflow, S::Failed)
            | (S::WaitingForSubworkflow, S::WaitingForSiblings)
            | (S::WaitingForSubworkflow, S::Cancelled)
    )
}

/// Validate a status transition, returning an error if illegal.
pub fn validate_transition(
    token: TokenId,
    from: TokenStatus,
    to: TokenStatus,
) -> Result<(), CoordinatorError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(CoordinatorError::InvalidTransition {
            token,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenStatus as S;

    #[test]
    fn happy_path_transitions() {
        assert!(can_transition(S::Pending, S::Dispatched));
        assert!(can_transition(S::Dispatched, S::Executing));
        assert!(can_transition(S::Executing, S::Completed));
    }

    #[test]
    fn failure_transitions() {
        assert!(can_transition(S::Executing, S::Failed));
        assert!(can_transition(S::Executing, S::TimedOut));
    }

    #[test]
    fn fan_in_wait_and_release() {
        assert!(can_transition(S::Executing, S::WaitingForSiblings));
        assert!(can_transition(S::WaitingForSiblings, S::Completed));
        assert!(can_transition(S::WaitingForSiblings, S::TimedOut));
        assert!(can_transition(S::WaitingForSiblings, S::Cancelled));
    }

    #[test]
    fn subworkflow_parking() {
        assert!(can_transition(S::Pending, S::WaitingForSubworkflow));
        assert!(can_transition(S::WaitingForSubworkflow, S::Completed));
        assert!(can_transition(S::WaitingForSubworkflow, S::Failed));
        // A sub-workflow node inside a fan-out can converge at a fan-in.
        assert!(can_transition(S::WaitingForSubworkflow, S::WaitingForSiblings));
    }

    #[test]
    fn cancellation_from_non_terminal() {
        assert!(can_transition(S::Pending, S::Cancelled));
        assert!(can_transition(S::Dispatched, S::Cancelled));
        assert!(can_transition(S::Executing, S::Cancelled));
        assert!(can_transition(S::WaitingForSiblings, S::Cancelled));
        assert!(can_transition(S::WaitingForSubworkflow, S::Cancelled));
    }

    #[test]
    fn terminal_statuses_transition_nowhere() {
        for terminal in [S::Completed, S::Failed, S::TimedOut, S::Cancelled] {
            for target in [
                S::Pending,
                S::Dispatched,
                S::Executing,
                S::WaitingForSiblings,
                S::WaitingForSubworkflow,
                S::Completed,
                S::Failed,
                S::TimedOut,
                S::Cancelled,
            ] {
                assert!(
                    !can_transition(terminal, target),
                    "terminal {terminal} must not transition to {target}"
                );
            }
        }
    }

    #[test]
    fn no_skipping_dispatch() {
        assert!(!can_transition(S::Pending, S::Executing));
        assert!(!can_transition(S::Pending, S::Completed));
    }

    #[test]
    fn no_rewinding() {
        assert!(!can_transition(S::Executing, S::Pending));
        assert!(!can_transition(S::Dispatched, S::Pending));
        assert!(!can_transition(S::WaitingForSiblings, S::Pending));
    }

    #[test]
    fn validate_reports_token_and_statuses() {
        let err = validate_transition(TokenId::new(7), S::Completed, S::Pending).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("invalid transition"));
        assert!(msg.contains("completed"));
        assert!(msg.contains("pending"));
        assert!(msg.contains('7'));
    }

    #[test]
    fn validate_ok_on_legal_transition() {
        assert!(validate_transition(TokenId::new(1), S::Pending, S::Dispatched).is_ok());
    }
}

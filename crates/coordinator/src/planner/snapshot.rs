//! The state snapshot the planner plans over.
//!
//! The planner is pure: everything it needs -- the subject token, its
//! sibling group's statuses, the outgoing transitions with conditions
//! already evaluated and `foreach` collections already resolved -- is
//! captured here by the dispatcher before planning.

use weft_core::{TokenId, TransitionRef};
use weft_workflow::FanInPath;

use crate::status::TokenStatus;
use crate::token::Token;

/// One outgoing transition, as seen at planning time.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionView {
    /// The transition's ref (the full definition is looked up in the
    /// workflow).
    pub transition_ref: TransitionRef,
    /// Whether the guard condition matched (`true` for unconditional
    /// edges).
    pub condition_matched: bool,
    /// Whether the edge declares a guard at all.
    pub has_condition: bool,
    /// Resolved spawn count: `Count(n)` → n, `ForEach` → collection
    /// length, plain edge → 1.
    pub spawn_count: u32,
    /// The resolved `foreach` elements, present only for `ForEach` edges.
    pub items: Option<Vec<serde_json::Value>>,
}

/// One sibling's state, as seen at planning time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiblingInfo {
    /// The sibling token.
    pub token: TokenId,
    /// Its position in the fan-out.
    pub branch_index: u32,
    /// Its status when the snapshot was taken.
    pub status: TokenStatus,
}

/// Everything the planner sees for one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanSnapshot {
    /// The subject token (absent for timeout events).
    pub token: Option<Token>,
    /// Transitions leaving the subject's node, in priority order, with
    /// conditions pre-evaluated.
    pub transitions: Vec<TransitionView>,
    /// The relevant sibling group's members (the subject's group, or the
    /// timed-out fan-in's group). Includes the subject itself.
    pub siblings: Vec<SiblingInfo>,
    /// Fan-in points that have already activated in this run.
    pub activated: Vec<FanInPath>,
}

impl PlanSnapshot {
    /// Returns `true` if the given fan-in point has already activated.
    #[must_use]
    pub fn is_activated(&self, fan_in_path: &FanInPath) -> bool {
        self.activated.contains(fan_in_path)
    }

    /// Siblings other than `subject` currently in the executor's hands.
    #[must_use]
    pub fn in_flight_siblings(&self, subject: TokenId) -> Vec<SiblingInfo> {
        self.siblings
            .iter()
            .filter(|s| s.token != subject && s.status.is_in_flight())
            .copied()
            .collect()
    }

    /// Siblings other than `subject` parked at the fan-in.
    #[must_use]
    pub fn waiting_siblings(&self, subject: TokenId) -> Vec<SiblingInfo> {
        self.siblings
            .iter()
            .filter(|s| s.token != subject && s.status == TokenStatus::WaitingForSiblings)
            .copied()
            .collect()
    }

    /// Successful siblings (completed or parked), including `subject` if
    /// listed, in `branch_index` order.
    #[must_use]
    pub fn succeeded_siblings(&self) -> Vec<SiblingInfo> {
        let mut succeeded: Vec<SiblingInfo> = self
            .siblings
            .iter()
            .filter(|s| {
                matches!(
                    s.status,
                    TokenStatus::Completed | TokenStatus::WaitingForSiblings
                )
            })
            .copied()
            .collect();
        succeeded.sort_by_key(|s| s.branch_index);
        succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::NodeRef;

    fn sibling(id: u64, index: u32, status: TokenStatus) -> SiblingInfo {
        SiblingInfo {
            token: TokenId::new(id),
            branch_index: index,
            status,
        }
    }

    #[test]
    fn in_flight_excludes_subject_and_settled() {
        let snapshot = PlanSnapshot {
            siblings: vec![
                sibling(2, 0, TokenStatus::Executing), // subject
                sibling(3, 1, TokenStatus::Executing),
                sibling(4, 2, TokenStatus::WaitingForSiblings),
                sibling(5, 3, TokenStatus::Failed),
            ],
            ..Default::default()
        };
        let in_flight = snapshot.in_flight_siblings(TokenId::new(2));
        assert_eq!(in_flight.len(), 1);
        assert_eq!(in_flight[0].token, TokenId::new(3));
    }

    #[test]
    fn waiting_excludes_subject() {
        let snapshot = PlanSnapshot {
            siblings: vec![
                sibling(2, 0, TokenStatus::WaitingForSiblings),
                sibling(3, 1, TokenStatus::WaitingForSiblings),
            ],
            ..Default::default()
        };
        let waiting = snapshot.waiting_siblings(TokenId::new(2));
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].token, TokenId::new(3));
    }

    #[test]
    fn succeeded_sorted_by_branch_index() {
        let snapshot = PlanSnapshot {
            siblings: vec![
                sibling(5, 2, TokenStatus::Completed),
                sibling(3, 0, TokenStatus::WaitingForSiblings),
                sibling(4, 1, TokenStatus::Executing),
            ],
            ..Default::default()
        };
        let succeeded = snapshot.succeeded_siblings();
        let indices: Vec<u32> = succeeded.iter().map(|s| s.branch_index).collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn activated_lookup() {
        let path = FanInPath::new(&TransitionRef::from("g"), &NodeRef::from("t"));
        let snapshot = PlanSnapshot {
            activated: vec![path.clone()],
            ..Default::default()
        };
        assert!(snapshot.is_activated(&path));
        let other = FanInPath::new(&TransitionRef::from("g"), &NodeRef::from("u"));
        assert!(!snapshot.is_activated(&other));
    }
}

//! The per-run token table.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use weft_core::{RunId, TokenId, TransitionRef};

use crate::error::CoordinatorError;
use crate::status::TokenStatus;
use crate::token::{Token, TokenSpec};
use crate::transition::validate_transition;

/// Aggregated sibling-group state, as the synchronization planner sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiblingCounts {
    /// Size of the group (every sibling's `branch_total`).
    pub total: u32,
    /// Siblings that finished successfully -- `Completed`, or parked at
    /// the fan-in (`WaitingForSiblings`).
    pub succeeded: u32,
    /// Siblings that terminated without success -- `Failed`, `TimedOut`
    /// or `Cancelled`.
    pub failed: u32,
}

impl SiblingCounts {
    /// Siblings that have arrived at an outcome, one way or the other.
    #[must_use]
    pub fn settled(&self) -> u32 {
        self.succeeded + self.failed
    }
}

/// The per-run table of tokens.
///
/// Owned by the dispatcher; all access is from the run's single
/// callback-processing loop, so the store is a plain ordered map. Token
/// IDs are allocated monotonically, which makes iteration order creation
/// order.
#[derive(Debug)]
pub struct TokenStore {
    run_id: RunId,
    tokens: BTreeMap<TokenId, Token>,
    next: TokenId,
}

impl TokenStore {
    /// Create an empty store for a run.
    #[must_use]
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            tokens: BTreeMap::new(),
            next: TokenId::new(1),
        }
    }

    /// Persist a new `Pending` token and return its id.
    ///
    /// Enforces the sibling-group invariants: `branch_index <
    /// branch_total`, and all members of one group share `branch_total`
    /// and `parent`.
    pub fn create(&mut self, spec: TokenSpec) -> Result<TokenId, CoordinatorError> {
        if spec.branch_index >= spec.branch_total {
            return Err(CoordinatorError::InvalidTokenSpec(format!(
                "branch_index {} out of range for branch_total {}",
                spec.branch_index, spec.branch_total
            )));
        }
        if let Some(group) = &spec.sibling_group {
            if let Some(existing) = self.tokens.values().find(|t| t.in_group(group)) {
                if existing.branch_total != spec.branch_total || existing.parent != spec.parent {
                    return Err(CoordinatorError::InvalidTokenSpec(format!(
                        "sibling group `{group}` members disagree on branch_total or parent"
                    )));
                }
            }
        }

        let id = self.next;
        self.next = self.next.next();
        let now = Utc::now();
        self.tokens.insert(
            id,
            Token {
                id,
                run_id: self.run_id,
                node_ref: spec.node_ref,
                status: TokenStatus::Pending,
                parent: spec.parent,
                path: spec.path,
                sibling_group: spec.sibling_group,
                branch_index: spec.branch_index,
                branch_total: spec.branch_total,
                foreach_item: spec.foreach_item,
                spawned_by: spec.spawned_by,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    /// Look up a token.
    pub fn get(&self, id: TokenId) -> Result<&Token, CoordinatorError> {
        self.tokens.get(&id).ok_or(CoordinatorError::TokenNotFound(id))
    }

    /// Change a token's status, validating the transition.
    ///
    /// Setting the status a token already has is a no-op (`Ok(false)`),
    /// which is what makes re-applied dispatch batches idempotent.
    pub fn update_status(
        &mut self,
        id: TokenId,
        new_status: TokenStatus,
    ) -> Result<bool, CoordinatorError> {
        let token = self
            .tokens
            .get_mut(&id)
            .ok_or(CoordinatorError::TokenNotFound(id))?;
        if token.status == new_status {
            return Ok(false);
        }
        validate_transition(id, token.status, new_status)?;
        token.status = new_status;
        token.updated_at = Utc::now();
        Ok(true)
    }

    /// Aggregate counts for a sibling group.
    #[must_use]
    pub fn sibling_counts(&self, group: &TransitionRef) -> SiblingCounts {
        let mut counts = SiblingCounts {
            total: 0,
            succeeded: 0,
            failed: 0,
        };
        for token in self.tokens.values().filter(|t| t.in_group(group)) {
            // Equal across the group by construction.
            counts.total = token.branch_total;
            match token.status {
                TokenStatus::Completed | TokenStatus::WaitingForSiblings => counts.succeeded += 1,
                TokenStatus::Failed | TokenStatus::TimedOut | TokenStatus::Cancelled => {
                    counts.failed += 1;
                }
                _ => {}
            }
        }
        counts
    }

    /// Number of tokens that count toward the run's active work.
    ///
    /// Zero is the workflow-completion predicate.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.tokens
            .values()
            .filter(|t| t.status.is_active())
            .count()
    }

    /// Tokens of `group` parked at a fan-in.
    #[must_use]
    pub fn list_waiting(&self, group: &TransitionRef) -> Vec<&Token> {
        self.tokens
            .values()
            .filter(|t| t.in_group(group) && t.status == TokenStatus::WaitingForSiblings)
            .collect()
    }

    /// All tokens of `group`, ordered by `branch_index`.
    #[must_use]
    pub fn tokens_in_group(&self, group: &TransitionRef) -> Vec<&Token> {
        let mut tokens: Vec<&Token> = self.tokens.values().filter(|t| t.in_group(group)).collect();
        tokens.sort_by_key(|t| t.branch_index);
        tokens
    }

    /// Tokens parked at any fan-in, across all groups.
    #[must_use]
    pub fn any_waiting_for_siblings(&self) -> bool {
        self.tokens
            .values()
            .any(|t| t.status == TokenStatus::WaitingForSiblings)
    }

    /// Every non-terminal token.
    #[must_use]
    pub fn non_terminal(&self) -> Vec<&Token> {
        self.tokens.values().filter(|t| !t.is_terminal()).collect()
    }

    /// Total tokens created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` if no token has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// A snapshot of every token, in creation order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Token> {
        self.tokens.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use weft_core::{NodeRef, TokenPath};

    fn branch_spec(parent: TokenId, group: &str, index: u32, total: u32) -> TokenSpec {
        TokenSpec {
            node_ref: NodeRef::from("work"),
            parent: Some(parent),
            path: TokenPath::root().child(&NodeRef::from("start"), index),
            sibling_group: Some(TransitionRef::from(group)),
            branch_index: index,
            branch_total: total,
            foreach_item: None,
            spawned_by: Some(TransitionRef::from(group)),
        }
    }

    fn store_with_root() -> (TokenStore, TokenId) {
        let mut store = TokenStore::new(RunId::v4());
        let root = store
            .create(TokenSpec::root(NodeRef::from("start")))
            .unwrap();
        (store, root)
    }

    #[test]
    fn create_assigns_monotonic_ids() {
        let (mut store, root) = store_with_root();
        let a = store.create(branch_spec(root, "fan", 0, 2)).unwrap();
        let b = store.create(branch_spec(root, "fan", 1, 2)).unwrap();
        assert!(root < a && a < b);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn create_starts_pending() {
        let (store, root) = store_with_root();
        assert_eq!(store.get(root).unwrap().status, TokenStatus::Pending);
    }

    #[test]
    fn get_missing_token_fails() {
        let (store, _) = store_with_root();
        let err = store.get(TokenId::new(99)).unwrap_err();
        assert!(matches!(err, CoordinatorError::TokenNotFound(_)));
    }

    #[test]
    fn branch_index_must_be_in_range() {
        let (mut store, root) = store_with_root();
        let err = store.create(branch_spec(root, "fan", 3, 3)).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn sibling_group_coherence_enforced() {
        let (mut store, root) = store_with_root();
        store.create(branch_spec(root, "fan", 0, 3)).unwrap();

        // Different branch_total for the same group.
        let err = store.create(branch_spec(root, "fan", 1, 4)).unwrap_err();
        assert!(err.to_string().contains("disagree"));

        // Different parent for the same group.
        let mut spec = branch_spec(root, "fan", 1, 3);
        spec.parent = Some(TokenId::new(42));
        let err = store.create(spec).unwrap_err();
        assert!(err.to_string().contains("disagree"));
    }

    #[test]
    fn update_status_validates_transitions() {
        let (mut store, root) = store_with_root();
        assert!(store.update_status(root, TokenStatus::Dispatched).unwrap());
        assert!(store.update_status(root, TokenStatus::Executing).unwrap());
        assert!(store.update_status(root, TokenStatus::Completed).unwrap());

        let err = store
            .update_status(root, TokenStatus::Pending)
            .unwrap_err();
        assert!(err.to_string().contains("invalid transition"));
    }

    #[test]
    fn update_status_same_status_is_noop() {
        let (mut store, root) = store_with_root();
        assert!(!store.update_status(root, TokenStatus::Pending).unwrap());
        // Terminal same-status is also a no-op, not an error.
        store.update_status(root, TokenStatus::Cancelled).unwrap();
        assert!(!store.update_status(root, TokenStatus::Cancelled).unwrap());
    }

    #[test]
    fn sibling_counts_classify_statuses() {
        let (mut store, root) = store_with_root();
        let group = TransitionRef::from("fan");
        let a = store.create(branch_spec(root, "fan", 0, 4)).unwrap();
        let b = store.create(branch_spec(root, "fan", 1, 4)).unwrap();
        let c = store.create(branch_spec(root, "fan", 2, 4)).unwrap();
        let _d = store.create(branch_spec(root, "fan", 3, 4)).unwrap();

        for id in [a, b, c] {
            store.update_status(id, TokenStatus::Dispatched).unwrap();
            store.update_status(id, TokenStatus::Executing).unwrap();
        }
        store.update_status(a, TokenStatus::Completed).unwrap();
        store
            .update_status(b, TokenStatus::WaitingForSiblings)
            .unwrap();
        store.update_status(c, TokenStatus::Failed).unwrap();

        let counts = store.sibling_counts(&group);
        assert_eq!(counts.total, 4);
        assert_eq!(counts.succeeded, 2); // completed + waiting
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.settled(), 3);
    }

    #[test]
    fn active_count_excludes_waiting_for_siblings_and_terminal() {
        let (mut store, root) = store_with_root();
        let a = store.create(branch_spec(root, "fan", 0, 2)).unwrap();
        let b = store.create(branch_spec(root, "fan", 1, 2)).unwrap();

        // root pending, a waiting, b completed
        store.update_status(a, TokenStatus::Dispatched).unwrap();
        store.update_status(a, TokenStatus::Executing).unwrap();
        store
            .update_status(a, TokenStatus::WaitingForSiblings)
            .unwrap();
        store.update_status(b, TokenStatus::Dispatched).unwrap();
        store.update_status(b, TokenStatus::Executing).unwrap();
        store.update_status(b, TokenStatus::Completed).unwrap();

        assert_eq!(store.active_count(), 1); // just the pending root
        assert!(store.any_waiting_for_siblings());
    }

    #[test]
    fn list_waiting_filters_by_group_and_status() {
        let (mut store, root) = store_with_root();
        let a = store.create(branch_spec(root, "fan", 0, 2)).unwrap();
        let _b = store.create(branch_spec(root, "fan", 1, 2)).unwrap();
        store.update_status(a, TokenStatus::Dispatched).unwrap();
        store.update_status(a, TokenStatus::Executing).unwrap();
        store
            .update_status(a, TokenStatus::WaitingForSiblings)
            .unwrap();

        let waiting = store.list_waiting(&TransitionRef::from("fan"));
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id, a);
    }

    #[test]
    fn tokens_in_group_ordered_by_branch_index() {
        let (mut store, root) = store_with_root();
        // Created out of branch order.
        store.create(branch_spec(root, "fan", 2, 3)).unwrap();
        store.create(branch_spec(root, "fan", 0, 3)).unwrap();
        store.create(branch_spec(root, "fan", 1, 3)).unwrap();

        let indices: Vec<u32> = store
            .tokens_in_group(&TransitionRef::from("fan"))
            .iter()
            .map(|t| t.branch_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn snapshot_in_creation_order() {
        let (mut store, root) = store_with_root();
        let a = store.create(branch_spec(root, "fan", 0, 2)).unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, root);
        assert_eq!(snapshot[1].id, a);
    }
}

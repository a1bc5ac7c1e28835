//! The token: a single persistent unit of pending or executing work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weft_core::{NodeRef, RunId, TokenId, TokenPath, TransitionRef};

use crate::status::TokenStatus;

/// A single pending or executing unit of work at a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Monotonic, unique within the run.
    pub id: TokenId,
    /// The owning run.
    pub run_id: RunId,
    /// The node this token executes.
    pub node_ref: NodeRef,
    /// Current lifecycle status.
    pub status: TokenStatus,
    /// The token whose completion caused this one (`None` for the root).
    pub parent: Option<TokenId>,
    /// Dotted lineage path, e.g. `root.ideate.0.judge.2`.
    pub path: TokenPath,
    /// Sibling group, iff this token is one of a fan-out's siblings.
    pub sibling_group: Option<TransitionRef>,
    /// 0-based position within the fan-out.
    pub branch_index: u32,
    /// Total siblings in the fan-out (`1` means not really parallel).
    pub branch_total: u32,
    /// The `foreach` element bound to this branch, if any.
    #[serde(default)]
    pub foreach_item: Option<ForeachBinding>,
    /// The transition that spawned this token (`None` for the root and
    /// for fan-in continuations).
    #[serde(default)]
    pub spawned_by: Option<TransitionRef>,
    /// When this token was created.
    pub created_at: DateTime<Utc>,
    /// When this token last changed status.
    pub updated_at: DateTime<Utc>,
}

impl Token {
    /// Returns `true` if the token has reached a final status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns `true` if this token belongs to `group`.
    #[must_use]
    pub fn in_group(&self, group: &TransitionRef) -> bool {
        self.sibling_group.as_ref() == Some(group)
    }
}

/// A `foreach` collection element bound to one spawned branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeachBinding {
    /// The input key the element is delivered under.
    pub var: String,
    /// The element itself, captured when the transition fired.
    pub value: serde_json::Value,
}

/// Everything needed to create a token. IDs and timestamps are assigned
/// by the token store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSpec {
    /// The node the token will execute.
    pub node_ref: NodeRef,
    /// The causing token (`None` for the root).
    pub parent: Option<TokenId>,
    /// Lineage path.
    pub path: TokenPath,
    /// Sibling group, for fan-out branches.
    pub sibling_group: Option<TransitionRef>,
    /// 0-based branch position.
    pub branch_index: u32,
    /// Total branches in the fan-out.
    pub branch_total: u32,
    /// `foreach` element for this branch.
    #[serde(default)]
    pub foreach_item: Option<ForeachBinding>,
    /// The spawning transition, used for idempotent re-creation.
    #[serde(default)]
    pub spawned_by: Option<TransitionRef>,
}

impl TokenSpec {
    /// The spec for a run's root token.
    #[must_use]
    pub fn root(initial_node: NodeRef) -> Self {
        Self {
            node_ref: initial_node,
            parent: None,
            path: TokenPath::root(),
            sibling_group: None,
            branch_index: 0,
            branch_total: 1,
            foreach_item: None,
            spawned_by: None,
        }
    }

    /// The spec for the single continuation token a fan-in creates.
    #[must_use]
    pub fn continuation(target: NodeRef, parent: TokenId, parent_path: &TokenPath) -> Self {
        Self {
            path: parent_path.join(&target),
            node_ref: target,
            parent: Some(parent),
            sibling_group: None,
            branch_index: 0,
            branch_total: 1,
            foreach_item: None,
            spawned_by: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn root_spec() {
        let spec = TokenSpec::root(NodeRef::from("start"));
        assert_eq!(spec.path, TokenPath::root());
        assert!(spec.parent.is_none());
        assert!(spec.sibling_group.is_none());
        assert_eq!(spec.branch_total, 1);
    }

    #[test]
    fn continuation_spec() {
        let parent_path = TokenPath::root();
        let spec = TokenSpec::continuation(NodeRef::from("collect"), TokenId::new(1), &parent_path);
        assert_eq!(spec.path.as_str(), "root.collect.join");
        assert_eq!(spec.parent, Some(TokenId::new(1)));
        assert!(spec.sibling_group.is_none());
        assert_eq!((spec.branch_index, spec.branch_total), (0, 1));
    }

    #[test]
    fn token_group_membership() {
        let token = Token {
            id: TokenId::new(2),
            run_id: RunId::v4(),
            node_ref: NodeRef::from("n"),
            status: TokenStatus::Pending,
            parent: Some(TokenId::new(1)),
            path: TokenPath::root().child(&NodeRef::from("start"), 0),
            sibling_group: Some(TransitionRef::from("fan")),
            branch_index: 0,
            branch_total: 3,
            foreach_item: None,
            spawned_by: Some(TransitionRef::from("fan")),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(token.in_group(&TransitionRef::from("fan")));
        assert!(!token.in_group(&TransitionRef::from("other")));
        assert!(!token.is_terminal());
    }

    #[test]
    fn token_serde_roundtrip() {
        let token = Token {
            id: TokenId::new(3),
            run_id: RunId::v4(),
            node_ref: NodeRef::from("process"),
            status: TokenStatus::Executing,
            parent: Some(TokenId::new(1)),
            path: TokenPath::root().child(&NodeRef::from("start"), 2),
            sibling_group: Some(TransitionRef::from("each")),
            branch_index: 2,
            branch_total: 3,
            foreach_item: Some(ForeachBinding {
                var: "item".into(),
                value: serde_json::json!("c"),
            }),
            spawned_by: Some(TransitionRef::from("each")),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&token).unwrap();
        let back: Token = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
    }
}

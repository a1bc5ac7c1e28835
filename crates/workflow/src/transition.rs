//! Workflow graph edges.

use serde::{Deserialize, Serialize};
use weft_core::{NodeRef, TransitionRef};

use crate::condition::Condition;
use crate::synchronization::Synchronization;

/// A directed edge between two nodes.
///
/// An edge may fan out -- statically via [`SpawnMode::Count`] or dynamically
/// via [`SpawnMode::ForEach`] -- in which case its `transition_ref` names the
/// sibling group of the tokens it spawns. An edge may also declare a
/// [`Synchronization`], making its target node a fan-in point for a
/// previously spawned sibling group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Unique reference within the workflow.
    pub transition_ref: TransitionRef,
    /// Source node.
    pub from_node: NodeRef,
    /// Target node.
    pub to_node: NodeRef,
    /// Evaluation priority; lower fires first. Ties break by definition
    /// order.
    #[serde(default)]
    pub priority: i32,
    /// Guard condition; `None` matches unconditionally.
    #[serde(default)]
    pub condition: Option<Condition>,
    /// How many tokens firing this edge spawns.
    #[serde(default)]
    pub spawn: SpawnMode,
    /// Fan-in declaration, if the target node joins a sibling group.
    #[serde(default)]
    pub synchronization: Option<Synchronization>,
}

impl Transition {
    /// An unconditional 1:1 edge.
    #[must_use]
    pub fn new(
        transition_ref: impl Into<TransitionRef>,
        from_node: impl Into<NodeRef>,
        to_node: impl Into<NodeRef>,
    ) -> Self {
        Self {
            transition_ref: transition_ref.into(),
            from_node: from_node.into(),
            to_node: to_node.into(),
            priority: 0,
            condition: None,
            spawn: SpawnMode::Single,
            synchronization: None,
        }
    }

    /// Set the spawn mode.
    #[must_use]
    pub fn with_spawn(mut self, spawn: SpawnMode) -> Self {
        self.spawn = spawn;
        self
    }

    /// Attach a guard condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Attach a fan-in declaration.
    #[must_use]
    pub fn with_synchronization(mut self, sync: Synchronization) -> Self {
        self.synchronization = Some(sync);
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Returns `true` if this edge can spawn more than one token.
    #[must_use]
    pub fn is_fan_out(&self) -> bool {
        !matches!(self.spawn, SpawnMode::Single)
    }
}

/// How many tokens a transition spawns when it fires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnMode {
    /// Ordinary 1:1 edge.
    #[default]
    Single,
    /// Static fan-out of N parallel siblings.
    Count(u32),
    /// Dynamic fan-out: one sibling per element of the collection found at
    /// a context path, evaluated when the transition fires. An empty
    /// collection fires no work.
    ForEach {
        /// Context path resolving to an array.
        collection: String,
        /// Input key each sibling receives its element under.
        item_var: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Predicate;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_edge_defaults() {
        let t = Transition::new("t1", "a", "b");
        assert_eq!(t.priority, 0);
        assert!(t.condition.is_none());
        assert_eq!(t.spawn, SpawnMode::Single);
        assert!(!t.is_fan_out());
    }

    #[test]
    fn count_fan_out() {
        let t = Transition::new("t1", "a", "b").with_spawn(SpawnMode::Count(3));
        assert!(t.is_fan_out());
    }

    #[test]
    fn foreach_fan_out() {
        let t = Transition::new("t1", "a", "b").with_spawn(SpawnMode::ForEach {
            collection: "input.items".into(),
            item_var: "item".into(),
        });
        assert!(t.is_fan_out());
    }

    #[test]
    fn builder_chain() {
        let t = Transition::new("t1", "a", "b")
            .with_priority(5)
            .with_condition(Condition::new("state.go", Predicate::Truthy));
        assert_eq!(t.priority, 5);
        assert!(t.condition.is_some());
    }

    #[test]
    fn spawn_mode_serde_shapes() {
        assert_eq!(serde_json::to_string(&SpawnMode::Single).unwrap(), "\"single\"");
        assert_eq!(serde_json::to_string(&SpawnMode::Count(3)).unwrap(), r#"{"count":3}"#);
        let json = serde_json::to_string(&SpawnMode::ForEach {
            collection: "input.items".into(),
            item_var: "item".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"for_each":{"collection":"input.items","item_var":"item"}}"#);
    }

    #[test]
    fn transition_serde_roundtrip() {
        let t = Transition::new("t1", "a", "b").with_spawn(SpawnMode::Count(2));
        let json = serde_json::to_string(&t).unwrap();
        let back: Transition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}

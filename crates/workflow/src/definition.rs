//! The workflow definition: graph, schemas, and output mapping.

use serde::{Deserialize, Serialize};
use weft_core::{NodeRef, TransitionRef, WorkflowId};

use crate::mapping::Mapping;
use crate::node::NodeDefinition;
use crate::schema::ValueSchema;
use crate::synchronization::Synchronization;
use crate::transition::Transition;

/// An immutable workflow definition.
///
/// Produced by the workspace loader, which also validates structural
/// invariants (no unreachable nodes, sibling groups name existing
/// fan-outs, state reads dominated by writes). The coordinator treats a
/// definition as read-only for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Stable identifier.
    pub id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// Definition version; runs pin the version they started with.
    pub version: u32,
    /// The node the root token is created at.
    pub initial_node: NodeRef,
    /// Graph vertices.
    pub nodes: Vec<NodeDefinition>,
    /// Graph edges.
    pub transitions: Vec<Transition>,
    /// Shape of the run input.
    pub input_schema: ValueSchema,
    /// Shape of the mutable `state.*` region.
    pub context_schema: ValueSchema,
    /// Shape of the run's final output.
    pub output_schema: ValueSchema,
    /// Final output keys ← context paths, evaluated at finalization.
    #[serde(default)]
    pub output_mapping: Mapping,
}

impl WorkflowDefinition {
    /// Look up a node by reference.
    #[must_use]
    pub fn node(&self, node_ref: &NodeRef) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| &n.node_ref == node_ref)
    }

    /// Look up a transition by reference.
    #[must_use]
    pub fn transition(&self, transition_ref: &TransitionRef) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|t| &t.transition_ref == transition_ref)
    }

    /// Transitions leaving `node_ref`, ordered by priority ascending with
    /// ties broken by definition order.
    #[must_use]
    pub fn transitions_from(&self, node_ref: &NodeRef) -> Vec<&Transition> {
        let mut out: Vec<(usize, &Transition)> = self
            .transitions
            .iter()
            .enumerate()
            .filter(|(_, t)| &t.from_node == node_ref)
            .collect();
        out.sort_by_key(|&(pos, t)| (t.priority, pos));
        out.into_iter().map(|(_, t)| t).collect()
    }

    /// The synchronization declared on the transition a sibling group
    /// converges through at `target`, if any.
    #[must_use]
    pub fn synchronization_at(
        &self,
        sibling_group: &TransitionRef,
        target: &NodeRef,
    ) -> Option<&Synchronization> {
        self.transitions
            .iter()
            .filter(|t| &t.to_node == target)
            .filter_map(|t| t.synchronization.as_ref())
            .find(|s| &s.sibling_group == sibling_group)
    }

    /// Find the synchronization (and its carrying transition) for a fan-in
    /// path's `(sibling_group, target)` pair.
    #[must_use]
    pub fn synchronization_for(
        &self,
        sibling_group: &TransitionRef,
        target: &NodeRef,
    ) -> Option<(&Transition, &Synchronization)> {
        self.transitions
            .iter()
            .filter(|t| &t.to_node == target)
            .filter_map(|t| t.synchronization.as_ref().map(|s| (t, s)))
            .find(|(_, s)| &s.sibling_group == sibling_group)
    }
}

//! Workflow graph vertices.

use serde::{Deserialize, Serialize};
use weft_core::{NodeRef, TaskId, WorkflowId};

use crate::mapping::Mapping;

/// A vertex in the workflow graph.
///
/// A node binds either to a task (dispatched to the action executor) or to
/// a nested sub-workflow (run as a child of the current run). Its
/// `input_mapping` assembles the task/child input from the context; its
/// `output_mapping` writes the result back into the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique reference within the workflow.
    pub node_ref: NodeRef,
    /// What executing this node means.
    pub binding: NodeBinding,
    /// Task/child input keys ← context paths.
    #[serde(default)]
    pub input_mapping: Mapping,
    /// Context paths ← paths into the task/child output.
    #[serde(default)]
    pub output_mapping: Mapping,
}

impl NodeDefinition {
    /// A node bound to a task.
    #[must_use]
    pub fn task(node_ref: impl Into<NodeRef>, task_id: TaskId, version: u32) -> Self {
        Self {
            node_ref: node_ref.into(),
            binding: NodeBinding::Task { task_id, version },
            input_mapping: Mapping::new(),
            output_mapping: Mapping::new(),
        }
    }

    /// A node bound to a nested sub-workflow.
    #[must_use]
    pub fn subworkflow(
        node_ref: impl Into<NodeRef>,
        workflow_id: WorkflowId,
        version: u32,
    ) -> Self {
        Self {
            node_ref: node_ref.into(),
            binding: NodeBinding::Subworkflow {
                workflow_id,
                version,
            },
            input_mapping: Mapping::new(),
            output_mapping: Mapping::new(),
        }
    }

    /// Set the input mapping.
    #[must_use]
    pub fn with_input_mapping(mut self, mapping: Mapping) -> Self {
        self.input_mapping = mapping;
        self
    }

    /// Set the output mapping.
    #[must_use]
    pub fn with_output_mapping(mut self, mapping: Mapping) -> Self {
        self.output_mapping = mapping;
        self
    }
}

/// What a node executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeBinding {
    /// Dispatch a task to the action executor.
    Task {
        /// The task to run.
        task_id: TaskId,
        /// Version pinned at definition time.
        version: u32,
    },
    /// Run a nested sub-workflow; the parent token parks until the child
    /// run reaches a terminal state.
    Subworkflow {
        /// The child workflow definition.
        workflow_id: WorkflowId,
        /// Version pinned at definition time.
        version: u32,
    },
}

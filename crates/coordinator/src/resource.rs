//! Catalog resource types: tasks, actions, prompt specs, model profiles.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use weft_core::{ActionId, ModelProfileId, PromptSpecId, TaskId};

use crate::error::CoordinatorError;

/// A task: a named, versioned binding of a node to an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Stable identifier.
    pub id: TaskId,
    /// Human-readable name.
    pub name: String,
    /// Version pinned by the run.
    pub version: u32,
    /// The action the task executes.
    pub action_id: ActionId,
    /// The action version pinned by this task.
    pub action_version: u32,
    /// Per-dispatch deadline handed to the executor.
    #[serde(default, rename = "timeout_ms", with = "serde_duration_opt")]
    pub timeout: Option<Duration>,
    /// Retry policy, honored by the executor. The coordinator only ever
    /// observes terminal outcomes.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

/// Retry policy carried opaquely to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Base backoff in milliseconds.
    pub backoff_ms: u64,
}

/// An action: a versioned, kind-tagged implementation descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    /// Stable identifier.
    pub id: ActionId,
    /// Human-readable name.
    pub name: String,
    /// Version pinned by the run.
    pub version: u32,
    /// Which executor entry point runs this action.
    pub kind: ActionKind,
    /// Kind-specific implementation payload, validated by
    /// [`ActionKind::validate_implementation`] before dispatch.
    pub implementation: serde_json::Value,
}

/// The ten action kinds the dispatch table routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Large-language-model call.
    Llm,
    /// HTTP request.
    Http,
    /// Shell command.
    Shell,
    /// MCP tool invocation.
    Mcp,
    /// Registered in-process tool.
    Tool,
    /// Context store manipulation.
    Context,
    /// Vector store operation.
    Vector,
    /// Metric emission.
    Metric,
    /// Human-in-the-loop prompt.
    Human,
    /// Nested workflow started through the executor.
    Workflow,
}

impl ActionKind {
    /// The implementation fields this kind requires.
    #[must_use]
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::Llm => &["model", "prompt"],
            Self::Http => &["method", "url"],
            Self::Shell => &["command"],
            Self::Mcp => &["server", "tool"],
            Self::Tool => &["name"],
            Self::Context => &["operation", "path"],
            Self::Vector => &["store", "operation"],
            Self::Metric => &["name", "kind"],
            Self::Human => &["prompt"],
            Self::Workflow => &["workflow_id"],
        }
    }

    /// Check that an implementation payload has this kind's required
    /// shape: a JSON object carrying every required field.
    pub fn validate_implementation(
        self,
        implementation: &serde_json::Value,
    ) -> Result<(), CoordinatorError> {
        let Some(map) = implementation.as_object() else {
            return Err(CoordinatorError::InvalidImplementation {
                kind: self.as_str(),
                reason: "implementation must be an object".into(),
            });
        };
        for field in self.required_fields() {
            if !map.contains_key(*field) {
                return Err(CoordinatorError::InvalidImplementation {
                    kind: self.as_str(),
                    reason: format!("missing required field `{field}`"),
                });
            }
        }
        Ok(())
    }

    /// The kind's wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Http => "http",
            Self::Shell => "shell",
            Self::Mcp => "mcp",
            Self::Tool => "tool",
            Self::Context => "context",
            Self::Vector => "vector",
            Self::Metric => "metric",
            Self::Human => "human",
            Self::Workflow => "workflow",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named prompt template, referenced by LLM actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSpec {
    /// Stable identifier.
    pub id: PromptSpecId,
    /// Human-readable name.
    pub name: String,
    /// The template body; rendering is out of the coordinator's scope.
    pub template: String,
}

/// A named model configuration, referenced by LLM actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Stable identifier.
    pub id: ModelProfileId,
    /// Human-readable name.
    pub name: String,
    /// Provider name, e.g. `anthropic`.
    pub provider: String,
    /// Provider-specific model name.
    pub model: String,
    /// Sampling parameters, opaque to the coordinator.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

mod serde_duration_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match duration {
            Some(d) => (d.as_millis() as u64).serialize(s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let opt: Option<u64> = Option::deserialize(d)?;
        Ok(opt.map(Duration::from_millis))
    }
}

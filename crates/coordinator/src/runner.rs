//! The run controller: one instance per workflow run.
//!
//! A run is a single-consumer loop over an unbounded channel of
//! [`RunMessage`]s: action results from the executor, child-run
//! completions, and fan-in timeouts. Processing one message at a time is
//! the cooperative scheduling model the context store's last-write-wins
//! semantics and the `append` merge ordering rest on -- all parallelism
//! lives between runs and inside the action executor.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use weft_core::{RunId, TokenId, WorkflowId};
use weft_telemetry::EventBus;
use weft_workflow::WorkflowDefinition;

use crate::dispatcher::Dispatcher;
use crate::error::CoordinatorError;
use crate::executor::ActionExecutor;
use crate::journal::JournalEntry;
use crate::repository::{RepositoryCache, ResourceRepository};
use crate::token::Token;

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every token settled and the final output was extracted.
    Completed,
    /// The run failed; see [`RunFailure`].
    Failed,
}

/// What a failed run exposes to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFailure {
    /// Why the run failed.
    pub reason: String,
    /// The token whose event triggered the failure, when attributable.
    pub failing_token: Option<TokenId>,
    /// The context regions at failure time.
    pub context_snapshot: serde_json::Value,
}

/// The result of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// The run's identifier.
    pub run_id: RunId,
    /// The workflow that ran.
    pub workflow_id: WorkflowId,
    /// Terminal status.
    pub status: RunStatus,
    /// The extracted final output, on success.
    pub output: Option<serde_json::Value>,
    /// Failure details, on failure.
    pub failure: Option<RunFailure>,
    /// Every token the run created, in creation order.
    pub tokens: Vec<Token>,
    /// The run's audit journal.
    pub journal: Vec<JournalEntry>,
}

impl RunOutcome {
    /// Returns `true` if the run completed successfully.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// A single workflow run, from input validation to final output.
pub struct WorkflowRun {
    run_id: RunId,
    definition: Arc<WorkflowDefinition>,
    repository: Arc<dyn ResourceRepository>,
    executor: Arc<dyn ActionExecutor>,
    events: Arc<EventBus>,
    depth: u32,
}

impl WorkflowRun {
    /// Prepare a run of `definition`.
    #[must_use]
    pub fn new(
        definition: Arc<WorkflowDefinition>,
        repository: Arc<dyn ResourceRepository>,
        executor: Arc<dyn ActionExecutor>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            run_id: RunId::v4(),
            definition,
            repository,
            executor,
            events,
            depth: 0,
        }
    }

    /// A child run started for a sub-workflow node.
    pub(crate) fn child(
        run_id: RunId,
        definition: Arc<WorkflowDefinition>,
        repository: Arc<dyn ResourceRepository>,
        executor: Arc<dyn ActionExecutor>,
        events: Arc<EventBus>,
        depth: u32,
    ) -> Self {
        Self {
            run_id,
            definition,
            repository,
            executor,
            events,
            depth,
        }
    }

    /// This run's identifier.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Drive the run to a terminal state.
    ///
    /// Start-time problems (definition errors, input that fails the
    /// schema) return `Err` and create nothing. Everything after start --
    /// action failures, quorum exhaustion, merge conflicts, timeouts --
    /// resolves to an `Ok` outcome with [`RunStatus::Failed`].
    pub async fn execute(self, input: serde_json::Value) -> Result<RunOutcome, CoordinatorError> {
        self.execute_boxed(input).await
    }

    /// Type-erased recursion point: sub-workflow nodes start child runs
    /// of the same shape, so the future must be boxed somewhere.
    pub(crate) fn execute_boxed(
        self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<RunOutcome, CoordinatorError>> + Send>> {
        Box::pin(self.execute_inner(input))
    }

    async fn execute_inner(
        self,
        input: serde_json::Value,
    ) -> Result<RunOutcome, CoordinatorError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let resources = Arc::new(RepositoryCache::new(Arc::clone(&self.repository)));
        let mut dispatcher = Dispatcher::new(
            self.run_id,
            self.depth,
            Arc::clone(&self.definition),
            resources,
            Arc::clone(&self.executor),
            Arc::clone(&self.events),
            tx,
        );

        dispatcher.start(input).await?;

        // One message at a time. The run is off-CPU whenever the channel
        // is empty: awaiting executor results, a parked fan-in, or a
        // child run.
        while !dispatcher.is_settled() {
            let Some(message) = rx.recv().await else {
                break;
            };
            if let Err(err) = dispatcher.handle(message).await {
                tracing::error!(run_id = %self.run_id, error = %err, "run halted by internal error");
                dispatcher.fail_internal(&err);
                break;
            }
        }

        Ok(dispatcher.finalize())
    }
}

impl std::fmt::Debug for WorkflowRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRun")
            .field("run_id", &self.run_id)
            .field("workflow", &self.definition.name)
            .field("depth", &self.depth)
            .finish()
    }
}

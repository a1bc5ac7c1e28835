//! The action executor interface.
//!
//! The coordinator never runs actions itself. Dispatchable tokens are
//! handed to an [`ActionExecutor`] as a [`TaskDispatch`]; the executor
//! delivers a [`TaskResult`] asynchronously through the [`ResultSink`] it
//! was given. Results re-enter the run's single-consumer loop, where they
//! serialize with every other callback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use weft_core::{NodeRef, RunId, TokenId};
use weft_workflow::FanInPath;

use crate::error::CoordinatorError;
use crate::resource::{ActionKind, RetryPolicy};
use crate::runner::RunOutcome;

/// Everything the executor needs to run one token's action.
#[derive(Debug, Clone)]
pub struct TaskDispatch {
    /// The owning run.
    pub run_id: RunId,
    /// The token being executed.
    pub token: TokenId,
    /// The node the token sits at.
    pub node: NodeRef,
    /// Which executor entry point to use.
    pub kind: ActionKind,
    /// Kind-specific implementation payload.
    pub implementation: serde_json::Value,
    /// The node's mapped input.
    pub input: serde_json::Value,
    /// Deadline for this dispatch, if the task declares one.
    pub timeout: Option<Duration>,
    /// Retry policy, honored entirely by the executor.
    pub retry: Option<RetryPolicy>,
    /// Cooperative cancellation signal. The coordinator cancels it when
    /// the token is superseded; honoring it is best-effort.
    pub cancellation: CancellationToken,
}

/// Terminal outcome of one dispatched action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The action produced an output.
    Completed,
    /// The action failed.
    Failed,
    /// The action exceeded its deadline.
    TimedOut,
}

/// The result the executor delivers for one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// The token the dispatch belonged to.
    pub token: TokenId,
    /// Terminal outcome.
    pub status: TaskStatus,
    /// The action's output, present on success.
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    /// Error description, present on failure.
    #[serde(default)]
    pub error: Option<String>,
}

impl TaskResult {
    /// A successful result.
    #[must_use]
    pub fn completed(token: TokenId, output: serde_json::Value) -> Self {
        Self {
            token,
            status: TaskStatus::Completed,
            output: Some(output),
            error: None,
        }
    }

    /// A failed result.
    #[must_use]
    pub fn failed(token: TokenId, error: impl Into<String>) -> Self {
        Self {
            token,
            status: TaskStatus::Failed,
            output: None,
            error: Some(error.into()),
        }
    }

    /// A timed-out result.
    #[must_use]
    pub fn timed_out(token: TokenId) -> Self {
        Self {
            token,
            status: TaskStatus::TimedOut,
            output: None,
            error: Some("action deadline exceeded".into()),
        }
    }
}

/// Runs dispatched actions and reports their terminal outcomes.
///
/// `dispatch` must hand the work off and return promptly -- it is called
/// from the run's single-consumer loop, and a blocking implementation
/// stalls the whole run. The executor may run many dispatches of the same
/// run in parallel; their results serialize when they re-enter the loop.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Start executing a task. The result is delivered later through
    /// `sink`; a result for a token the coordinator has since cancelled
    /// is dropped silently.
    async fn dispatch(&self, task: TaskDispatch, sink: ResultSink);
}

#[async_trait]
impl<T: ActionExecutor + ?Sized> ActionExecutor for Arc<T> {
    async fn dispatch(&self, task: TaskDispatch, sink: ResultSink) {
        (**self).dispatch(task, sink).await;
    }
}

/// Handle the executor uses to deliver results into a run's loop.
#[derive(Debug, Clone)]
pub struct ResultSink {
    tx: mpsc::UnboundedSender<RunMessage>,
}

impl ResultSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<RunMessage>) -> Self {
        Self { tx }
    }

    /// Deliver a task result. Returns silently if the run is gone.
    pub fn submit(&self, result: TaskResult) {
        let _ = self.tx.send(RunMessage::Task(result));
    }
}

/// A message entering the run's single-consumer loop.
#[derive(Debug)]
pub(crate) enum RunMessage {
    /// An action result from the executor.
    Task(TaskResult),
    /// A child run reached a terminal state.
    Subworkflow {
        token: TokenId,
        child_run: RunId,
        outcome: Box<Result<RunOutcome, CoordinatorError>>,
    },
    /// A fan-in deadline expired.
    FanInTimeout(FanInPath),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_result() {
        let result = TaskResult::completed(TokenId::new(1), serde_json::json!({"q": "Q0"}));
        assert_eq!(result.status, TaskStatus::Completed);
        assert!(result.output.is_some());
        assert!(result.error.is_none());
    }

    #[test]
    fn failed_result() {
        let result = TaskResult::failed(TokenId::new(1), "connection refused");
        assert_eq!(result.status, TaskStatus::Failed);
        assert!(result.output.is_none());
        assert_eq!(result.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn timed_out_result() {
        let result = TaskResult::timed_out(TokenId::new(1));
        assert_eq!(result.status, TaskStatus::TimedOut);
        assert!(result.error.is_some());
    }

    #[test]
    fn result_serde_roundtrip() {
        let result = TaskResult::completed(TokenId::new(4), serde_json::json!([1, 2]));
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"status\":\"completed\""));
        let back: TaskResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    #[tokio::test]
    async fn sink_delivers_into_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ResultSink::new(tx);
        sink.submit(TaskResult::completed(TokenId::new(2), serde_json::json!(null)));

        match rx.recv().await {
            Some(RunMessage::Task(result)) => assert_eq!(result.token, TokenId::new(2)),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn sink_survives_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = ResultSink::new(tx);
        // Must not panic when the run is gone.
        sink.submit(TaskResult::timed_out(TokenId::new(3)));
    }
}

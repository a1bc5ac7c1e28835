//! The dispatch executor: the sole writer of run state.
//!
//! The dispatcher owns the token store, context store, and fan-in table
//! for one run. It processes one message at a time (the run loop in
//! [`runner`](crate::runner) serializes them), turns each into a planner
//! invocation, and applies the resulting decision batch as a single
//! logical step in the phase order: creates, status changes, fan-in
//! activations, dispatches, failure check.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use weft_context::{ContextError, ContextStore, resolve_in_value};
use weft_core::{NodeRef, RunId, TokenId};
use weft_telemetry::{EventBus, RunEvent};
use weft_workflow::{FanInPath, NodeBinding, NodeDefinition, SpawnMode, WorkflowDefinition};

use crate::error::CoordinatorError;
use crate::executor::{ActionExecutor, ResultSink, RunMessage, TaskDispatch, TaskResult, TaskStatus};
use crate::fan_in::FanInTable;
use crate::idempotency::{SpawnKey, SpawnLedger};
use crate::journal::JournalEntry;
use crate::planner::{
    self, Decision, PlanEvent, PlanOutcome, PlanSnapshot, SiblingInfo, TokenRef, TransitionView,
};
use crate::repository::RepositoryCache;
use crate::runner::{RunFailure, RunOutcome, RunStatus, WorkflowRun};
use crate::status::TokenStatus;
use crate::store::TokenStore;
use crate::token::{Token, TokenSpec};

pub(crate) struct Dispatcher {
    run_id: RunId,
    depth: u32,
    definition: Arc<WorkflowDefinition>,
    resources: Arc<RepositoryCache>,
    executor: Arc<dyn ActionExecutor>,
    events: Arc<EventBus>,
    tokens: TokenStore,
    context: ContextStore,
    fan_ins: FanInTable,
    journal: Vec<JournalEntry>,
    ledger: SpawnLedger,
    tx: mpsc::UnboundedSender<RunMessage>,
    timers: HashMap<FanInPath, CancellationToken>,
    action_cancels: HashMap<TokenId, CancellationToken>,
    failure: Option<RunFailure>,
}

impl Dispatcher {
    pub(crate) fn new(
        run_id: RunId,
        depth: u32,
        definition: Arc<WorkflowDefinition>,
        resources: Arc<RepositoryCache>,
        executor: Arc<dyn ActionExecutor>,
        events: Arc<EventBus>,
        tx: mpsc::UnboundedSender<RunMessage>,
    ) -> Self {
        Self {
            tokens: TokenStore::new(run_id),
            context: ContextStore::new(run_id),
            fan_ins: FanInTable::new(run_id),
            run_id,
            depth,
            definition,
            resources,
            executor,
            events,
            journal: Vec::new(),
            ledger: SpawnLedger::new(),
            tx,
            timers: HashMap::new(),
            action_cancels: HashMap::new(),
            failure: None,
        }
    }

    /// Initialize stores, validate input, create and dispatch the root
    /// token.
    pub(crate) async fn start(&mut self, input: Value) -> Result<(), CoordinatorError> {
        self.context.initialize(
            self.definition.input_schema.clone(),
            &self.definition.context_schema,
            self.definition.output_schema.clone(),
        );
        self.context
            .initialize_with_input(input)
            .map_err(|e| match e {
                ContextError::Validation(schema_err) => {
                    CoordinatorError::InputValidation(schema_err.to_string())
                }
                other => CoordinatorError::Context(other),
            })?;

        info!(run_id = %self.run_id, workflow = %self.definition.name, depth = self.depth, "workflow run started");
        self.journal.push(JournalEntry::RunStarted {
            timestamp: Utc::now(),
            workflow_id: self.definition.id,
        });
        self.events.emit(RunEvent::WorkflowStarted {
            run_id: self.run_id,
            workflow_id: self.definition.id,
        });

        let root = self
            .tokens
            .create(TokenSpec::root(self.definition.initial_node.clone()))?;
        self.note_spawn(root);
        self.dispatch_token(root).await
    }

    /// Process one run-loop message.
    pub(crate) async fn handle(&mut self, message: RunMessage) -> Result<(), CoordinatorError> {
        match message {
            RunMessage::Task(result) => self.on_task_result(result).await,
            RunMessage::Subworkflow {
                token,
                child_run,
                outcome,
            } => self.on_subworkflow(token, child_run, *outcome).await,
            RunMessage::FanInTimeout(path) => self.on_timeout(path).await,
        }
    }

    /// Returns `true` when the run has nothing left to do.
    pub(crate) fn is_settled(&self) -> bool {
        self.failure.is_some() || self.tokens.active_count() == 0
    }

    /// Record an internal invariant violation as a run failure.
    pub(crate) fn fail_internal(&mut self, err: &CoordinatorError) {
        if self.failure.is_none() {
            self.failure = Some(RunFailure {
                reason: format!("internal error: {err}"),
                failing_token: None,
                context_snapshot: self.context.snapshot(),
            });
        }
    }

    /// Tear down timers, settle leftovers, extract the final output, and
    /// build the run outcome.
    pub(crate) fn finalize(mut self) -> RunOutcome {
        for (_, timer) in self.timers.drain() {
            timer.cancel();
        }
        for (_, cancel) in self.action_cancels.drain() {
            cancel.cancel();
        }

        // Tokens parked at a fan-in with nothing in flight and no pending
        // deadline can never be released.
        if self.failure.is_none() && self.tokens.any_waiting_for_siblings() {
            self.failure = Some(RunFailure {
                reason: "fan-in starved: waiting siblings with no in-flight work".into(),
                failing_token: None,
                context_snapshot: self.context.snapshot(),
            });
        }

        if self.failure.is_some() {
            for token in self.tokens.non_terminal().iter().map(|t| t.id).collect::<Vec<_>>() {
                let _ = self.tokens.update_status(token, TokenStatus::Cancelled);
            }
        }

        if let Some(failure) = self.failure.take() {
            warn!(run_id = %self.run_id, reason = %failure.reason, "workflow run failed");
            self.journal.push(JournalEntry::RunFailed {
                timestamp: Utc::now(),
                reason: failure.reason.clone(),
            });
            self.events.emit(RunEvent::WorkflowFailed {
                run_id: self.run_id,
                reason: failure.reason.clone(),
            });
            return RunOutcome {
                run_id: self.run_id,
                workflow_id: self.definition.id,
                status: RunStatus::Failed,
                output: None,
                failure: Some(failure),
                tokens: self.tokens.snapshot(),
                journal: self.journal,
            };
        }

        match self.context.extract_output(&self.definition.output_mapping) {
            Ok(output) => {
                info!(run_id = %self.run_id, tokens = self.tokens.len(), "workflow run completed");
                self.journal.push(JournalEntry::RunCompleted {
                    timestamp: Utc::now(),
                });
                self.events.emit(RunEvent::WorkflowCompleted {
                    run_id: self.run_id,
                });
                RunOutcome {
                    run_id: self.run_id,
                    workflow_id: self.definition.id,
                    status: RunStatus::Completed,
                    output: Some(output),
                    failure: None,
                    tokens: self.tokens.snapshot(),
                    journal: self.journal,
                }
            }
            Err(e) => {
                let failure = RunFailure {
                    reason: format!("output extraction failed: {e}"),
                    failing_token: None,
                    context_snapshot: self.context.snapshot(),
                };
                self.journal.push(JournalEntry::RunFailed {
                    timestamp: Utc::now(),
                    reason: failure.reason.clone(),
                });
                self.events.emit(RunEvent::WorkflowFailed {
                    run_id: self.run_id,
                    reason: failure.reason.clone(),
                });
                RunOutcome {
                    run_id: self.run_id,
                    workflow_id: self.definition.id,
                    status: RunStatus::Failed,
                    output: None,
                    failure: Some(failure),
                    tokens: self.tokens.snapshot(),
                    journal: self.journal,
                }
            }
        }
    }

    // ── callbacks ───────────────────────────────────────────────────

    async fn on_task_result(&mut self, result: TaskResult) -> Result<(), CoordinatorError> {
        let Ok(token) = self.tokens.get(result.token).cloned() else {
            warn!(run_id = %self.run_id, token = %result.token, "result for unknown token dropped");
            return Ok(());
        };
        if token.is_terminal() {
            // Cancelled (or otherwise settled) before its result arrived.
            debug!(run_id = %self.run_id, token = %token.id, status = %token.status, "dropping result for terminal token");
            self.journal.push(JournalEntry::ResultDropped {
                timestamp: Utc::now(),
                token: token.id,
            });
            return Ok(());
        }
        self.action_cancels.remove(&token.id);

        match result.status {
            TaskStatus::Completed => {
                let output = result.output.unwrap_or(Value::Null);
                self.record_success(&token, output).await
            }
            TaskStatus::Failed | TaskStatus::TimedOut => {
                let terminal = if result.status == TaskStatus::Failed {
                    TokenStatus::Failed
                } else {
                    TokenStatus::TimedOut
                };
                let reason = result
                    .error
                    .unwrap_or_else(|| "action failed without detail".into());
                self.record_failure(&token, terminal, reason).await
            }
        }
    }

    async fn on_subworkflow(
        &mut self,
        token_id: TokenId,
        child_run: RunId,
        outcome: Result<RunOutcome, CoordinatorError>,
    ) -> Result<(), CoordinatorError> {
        let Ok(token) = self.tokens.get(token_id).cloned() else {
            warn!(run_id = %self.run_id, token = %token_id, "child-run result for unknown token dropped");
            return Ok(());
        };
        if token.is_terminal() {
            self.journal.push(JournalEntry::ResultDropped {
                timestamp: Utc::now(),
                token: token.id,
            });
            return Ok(());
        }

        match outcome {
            Ok(child) if child.status == RunStatus::Completed => {
                self.journal.push(JournalEntry::SubworkflowCompleted {
                    timestamp: Utc::now(),
                    token: token.id,
                    child_run,
                    success: true,
                });
                let output = child.output.unwrap_or(Value::Null);
                self.record_success(&token, output).await
            }
            Ok(child) => {
                self.journal.push(JournalEntry::SubworkflowCompleted {
                    timestamp: Utc::now(),
                    token: token.id,
                    child_run,
                    success: false,
                });
                let reason = child
                    .failure
                    .map(|f| format!("sub-workflow failed: {}", f.reason))
                    .unwrap_or_else(|| "sub-workflow failed".into());
                self.record_failure(&token, TokenStatus::Failed, reason).await
            }
            Err(e) => {
                self.journal.push(JournalEntry::SubworkflowCompleted {
                    timestamp: Utc::now(),
                    token: token.id,
                    child_run,
                    success: false,
                });
                self.record_failure(
                    &token,
                    TokenStatus::Failed,
                    format!("sub-workflow error: {e}"),
                )
                .await
            }
        }
    }

    async fn on_timeout(&mut self, fan_in_path: FanInPath) -> Result<(), CoordinatorError> {
        self.timers.remove(&fan_in_path);
        self.journal.push(JournalEntry::TimeoutFired {
            timestamp: Utc::now(),
            fan_in_path: fan_in_path.as_str().to_owned(),
        });
        debug!(run_id = %self.run_id, fan_in = %fan_in_path, "fan-in deadline expired");

        let snapshot = self.snapshot_for_timeout(&fan_in_path);
        let event = PlanEvent::FanInTimeout { fan_in_path };
        let definition = Arc::clone(&self.definition);
        let outcome = planner::plan(&event, &definition, &snapshot)?;
        self.apply(outcome, None).await
    }

    /// A successful node result: write outputs, capture the branch, plan
    /// the continuation.
    async fn record_success(&mut self, token: &Token, output: Value) -> Result<(), CoordinatorError> {
        let node = self.node_definition(&token.node_ref)?;
        for (target, source) in node.output_mapping.iter() {
            let value =
                resolve_in_value(&output, source)?.ok_or_else(|| ContextError::MissingValue {
                    path: format!("{source} (in output of node {})", token.node_ref),
                })?;
            self.context.write(target, value, token.id)?;
        }
        self.context
            .capture_branch_output(&token.node_ref, token.id, token.branch_index, output);

        self.journal.push(JournalEntry::NodeCompleted {
            timestamp: Utc::now(),
            token: token.id,
            node: token.node_ref.clone(),
        });
        self.events.emit(RunEvent::NodeCompleted {
            run_id: self.run_id,
            token: token.id,
            node: token.node_ref.clone(),
        });
        debug!(run_id = %self.run_id, token = %token.id, node = %token.node_ref, "node completed");

        let snapshot = self.build_snapshot(token)?;
        let event = PlanEvent::TokenCompleted { token: token.id };
        let definition = Arc::clone(&self.definition);
        let outcome = planner::plan(&event, &definition, &snapshot)?;
        self.apply(outcome, Some(token.id)).await
    }

    /// A failed node result: record it and let the planner route the
    /// failure.
    async fn record_failure(
        &mut self,
        token: &Token,
        terminal: TokenStatus,
        reason: String,
    ) -> Result<(), CoordinatorError> {
        self.journal.push(JournalEntry::NodeFailed {
            timestamp: Utc::now(),
            token: token.id,
            node: token.node_ref.clone(),
            error: reason.clone(),
        });
        debug!(run_id = %self.run_id, token = %token.id, node = %token.node_ref, %reason, "node failed");

        let snapshot = self.build_snapshot(token)?;
        let event = PlanEvent::TokenFailed {
            token: token.id,
            terminal,
            reason,
        };
        let definition = Arc::clone(&self.definition);
        let outcome = planner::plan(&event, &definition, &snapshot)?;
        self.apply(outcome, Some(token.id)).await
    }

    // ── snapshot construction ───────────────────────────────────────

    /// Capture everything the planner needs for a token event: outgoing
    /// transitions with conditions evaluated and `foreach` collections
    /// resolved, plus the sibling group's statuses.
    fn build_snapshot(&self, token: &Token) -> Result<PlanSnapshot, CoordinatorError> {
        let mut views = Vec::new();
        for transition in self.definition.transitions_from(&token.node_ref) {
            let (condition_matched, has_condition) = match &transition.condition {
                None => (true, false),
                Some(condition) => {
                    let value = self.context.read(&condition.path)?;
                    (condition.evaluate(value.as_ref()), true)
                }
            };
            let (spawn_count, items) = match &transition.spawn {
                SpawnMode::Single => (1, None),
                SpawnMode::Count(n) => (*n, None),
                SpawnMode::ForEach { collection, .. } => {
                    let value =
                        self.context
                            .read(collection)?
                            .ok_or_else(|| ContextError::MissingValue {
                                path: collection.clone(),
                            })?;
                    let Value::Array(items) = value else {
                        return Err(ContextError::Traversal {
                            path: collection.clone(),
                            reason: "foreach collection is not an array",
                        }
                        .into());
                    };
                    (items.len() as u32, Some(items))
                }
            };
            views.push(TransitionView {
                transition_ref: transition.transition_ref.clone(),
                condition_matched,
                has_condition,
                spawn_count,
                items,
            });
        }

        let siblings = match &token.sibling_group {
            Some(group) => self
                .tokens
                .tokens_in_group(group)
                .iter()
                .map(|t| SiblingInfo {
                    token: t.id,
                    branch_index: t.branch_index,
                    status: t.status,
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(PlanSnapshot {
            token: Some(token.clone()),
            transitions: views,
            siblings,
            activated: self.fan_ins.activated_paths(),
        })
    }

    fn snapshot_for_timeout(&self, fan_in_path: &FanInPath) -> PlanSnapshot {
        let siblings = fan_in_path
            .parts()
            .map(|(group, _)| {
                self.tokens
                    .tokens_in_group(&group)
                    .iter()
                    .map(|t| SiblingInfo {
                        token: t.id,
                        branch_index: t.branch_index,
                        status: t.status,
                    })
                    .collect()
            })
            .unwrap_or_default();
        PlanSnapshot {
            token: None,
            transitions: Vec::new(),
            siblings,
            activated: self.fan_ins.activated_paths(),
        }
    }

    // ── decision application ────────────────────────────────────────

    /// Apply one decision batch as a single logical step, in the phase
    /// order: creates, status changes, activations, dispatches, failure.
    async fn apply(
        &mut self,
        outcome: PlanOutcome,
        subject: Option<TokenId>,
    ) -> Result<(), CoordinatorError> {
        for trace in outcome.trace {
            self.events.emit(RunEvent::Trace {
                run_id: self.run_id,
                trace,
            });
        }

        // Phase 1: creates (IDs assigned in decision order).
        let mut created = Vec::new();
        for decision in &outcome.decisions {
            if let Decision::CreateToken(spec) = decision {
                created.push(self.create_token(spec)?);
            }
        }

        // Phase 2: status changes and fan-in parking.
        for decision in &outcome.decisions {
            match decision {
                Decision::UpdateStatus { token, status } => {
                    let changed = self.tokens.update_status(*token, *status)?;
                    if changed && *status == TokenStatus::Cancelled {
                        if let Some(cancel) = self.action_cancels.remove(token) {
                            cancel.cancel();
                        }
                    }
                }
                Decision::MarkWaiting {
                    token,
                    fan_in_path,
                    timeout,
                } => {
                    let changed = self
                        .tokens
                        .update_status(*token, TokenStatus::WaitingForSiblings)?;
                    if changed {
                        self.journal.push(JournalEntry::TokenWaiting {
                            timestamp: Utc::now(),
                            token: *token,
                            fan_in_path: fan_in_path.as_str().to_owned(),
                        });
                    }
                    if let Some(timeout) = timeout {
                        self.register_timer(fan_in_path, *timeout);
                    }
                }
                _ => {}
            }
        }

        // Phase 3: fan-in activations. On a lost race the decision (and
        // the continuation planned under it) is discarded.
        let mut continuations = Vec::new();
        for decision in &outcome.decisions {
            if let Decision::ActivateFanIn {
                fan_in_path,
                sibling_group,
                target,
                merged,
                winner,
            } = decision
            {
                if let Some(continuation) = self.activate_fan_in(
                    fan_in_path,
                    sibling_group,
                    target,
                    merged,
                    *winner,
                )? {
                    continuations.push(continuation);
                }
            }
        }

        // Phase 4: dispatches (including freshly created continuations).
        for decision in &outcome.decisions {
            if let Decision::MarkForDispatch(token_ref) = decision {
                let id = match token_ref {
                    TokenRef::Existing(id) => *id,
                    TokenRef::Created(index) => {
                        *created.get(*index).ok_or_else(|| {
                            CoordinatorError::Definition(format!(
                                "dispatch references batch token #{index}, only {} created",
                                created.len()
                            ))
                        })?
                    }
                };
                self.dispatch_token(id).await?;
            }
        }
        for continuation in continuations {
            self.dispatch_token(continuation).await?;
        }

        // Phase 5: workflow failure.
        for decision in &outcome.decisions {
            if let Decision::FailWorkflow { reason } = decision {
                if self.failure.is_none() {
                    self.failure = Some(RunFailure {
                        reason: reason.clone(),
                        failing_token: subject,
                        context_snapshot: self.context.snapshot(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Create a token idempotently: a spawn key seen before yields the
    /// previously created token.
    fn create_token(&mut self, spec: &TokenSpec) -> Result<TokenId, CoordinatorError> {
        let key = SpawnKey {
            parent: spec.parent,
            scope: spec
                .spawned_by
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_else(|| format!("node:{}", spec.node_ref)),
            branch_index: spec.branch_index,
        };
        if let Some(existing) = self.ledger.existing(&key) {
            return Ok(existing);
        }
        let id = self.tokens.create(spec.clone())?;
        self.ledger.record(key, id);
        self.note_spawn(id);
        Ok(id)
    }

    /// Won or lost the activation race; on a win, merge branch outputs
    /// and create the continuation token.
    fn activate_fan_in(
        &mut self,
        fan_in_path: &FanInPath,
        sibling_group: &weft_core::TransitionRef,
        target: &NodeRef,
        merged: &[TokenId],
        winner: Option<TokenId>,
    ) -> Result<Option<TokenId>, CoordinatorError> {
        if !self
            .fan_ins
            .try_activate(fan_in_path.clone(), winner, merged.to_vec())
        {
            debug!(run_id = %self.run_id, fan_in = %fan_in_path, "fan-in activation race lost");
            self.journal.push(JournalEntry::FanInRaceLost {
                timestamp: Utc::now(),
                fan_in_path: fan_in_path.as_str().to_owned(),
            });
            return Ok(None);
        }
        if let Some(timer) = self.timers.remove(fan_in_path) {
            timer.cancel();
        }

        info!(run_id = %self.run_id, fan_in = %fan_in_path, merged = merged.len(), "fan-in activated");
        self.journal.push(JournalEntry::FanInActivated {
            timestamp: Utc::now(),
            fan_in_path: fan_in_path.as_str().to_owned(),
            merged: merged.to_vec(),
        });
        self.events.emit(RunEvent::FanInActivated {
            run_id: self.run_id,
            fan_in_path: fan_in_path.as_str().to_owned(),
            merged: merged.to_vec(),
        });

        let first = merged.first().copied().ok_or_else(|| {
            CoordinatorError::Definition(format!("fan-in {fan_in_path} activated with no contributors"))
        })?;
        let (siblings_node, group_parent) = {
            let token = self.tokens.get(first)?;
            (token.node_ref.clone(), token.parent)
        };

        if let Some((_, sync_decl)) = self
            .definition
            .synchronization_for(sibling_group, target)
        {
            if let Some(config) = &sync_decl.merge {
                self.context
                    .merge(&siblings_node, config, merged, winner.unwrap_or_default())?;
                self.journal.push(JournalEntry::BranchesMerged {
                    timestamp: Utc::now(),
                    target: config.target.clone(),
                    contributors: merged.len(),
                });
                self.events.emit(RunEvent::BranchesMerged {
                    run_id: self.run_id,
                    target: config.target.clone(),
                    contributors: merged.len(),
                });
            }
        }

        // Exactly one continuation carries execution past the join. Its
        // parent is the fan-out parent the siblings share.
        let parent = group_parent.unwrap_or(first);
        let parent_path = self.tokens.get(parent)?.path.clone();
        let key = SpawnKey::continuation(parent, fan_in_path.as_str());
        if let Some(existing) = self.ledger.existing(&key) {
            return Ok(Some(existing));
        }
        let spec = TokenSpec::continuation(target.clone(), parent, &parent_path);
        let id = self.tokens.create(spec)?;
        self.ledger.record(key, id);
        self.note_spawn(id);
        Ok(Some(id))
    }

    fn register_timer(&mut self, fan_in_path: &FanInPath, timeout: std::time::Duration) {
        if self.timers.contains_key(fan_in_path) || self.fan_ins.is_activated(fan_in_path) {
            return;
        }
        let cancel = CancellationToken::new();
        let tx = self.tx.clone();
        let path = fan_in_path.clone();
        let guard = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = guard.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    let _ = tx.send(RunMessage::FanInTimeout(path));
                }
            }
        });
        self.timers.insert(fan_in_path.clone(), cancel);
    }

    // ── dispatch ────────────────────────────────────────────────────

    /// Hand a pending token to the action executor, or start a child run
    /// for a sub-workflow node. A token no longer pending is left alone,
    /// which makes re-applied batches dispatch at most once.
    async fn dispatch_token(&mut self, id: TokenId) -> Result<(), CoordinatorError> {
        let token = self.tokens.get(id)?.clone();
        if token.status != TokenStatus::Pending {
            return Ok(());
        }
        let node = self.node_definition(&token.node_ref)?;
        let input = self.node_input(&node, &token)?;

        match node.binding {
            NodeBinding::Task { task_id, version } => {
                self.tokens.update_status(id, TokenStatus::Dispatched)?;
                let task = self.resources.task(task_id, version).await?;
                let action = self
                    .resources
                    .action(task.action_id, task.action_version)
                    .await?;
                action.kind.validate_implementation(&action.implementation)?;

                let cancel = CancellationToken::new();
                self.action_cancels.insert(id, cancel.clone());
                self.tokens.update_status(id, TokenStatus::Executing)?;

                self.journal.push(JournalEntry::TokenDispatched {
                    timestamp: Utc::now(),
                    token: id,
                    node: token.node_ref.clone(),
                });
                self.events.emit(RunEvent::NodeStarted {
                    run_id: self.run_id,
                    token: id,
                    node: token.node_ref.clone(),
                });
                debug!(run_id = %self.run_id, token = %id, node = %token.node_ref, kind = %action.kind, "dispatching token");

                let dispatch = TaskDispatch {
                    run_id: self.run_id,
                    token: id,
                    node: token.node_ref.clone(),
                    kind: action.kind,
                    implementation: action.implementation.clone(),
                    input,
                    timeout: task.timeout,
                    retry: task.retry,
                    cancellation: cancel,
                };
                self.executor
                    .dispatch(dispatch, ResultSink::new(self.tx.clone()))
                    .await;
                Ok(())
            }
            NodeBinding::Subworkflow {
                workflow_id,
                version,
            } => {
                self.tokens
                    .update_status(id, TokenStatus::WaitingForSubworkflow)?;
                let child_definition = self
                    .resources
                    .workflow_definition(workflow_id, version)
                    .await?;
                let child_run = RunId::v4();

                self.journal.push(JournalEntry::SubworkflowStarted {
                    timestamp: Utc::now(),
                    token: id,
                    child_run,
                });
                self.events.emit(RunEvent::NodeStarted {
                    run_id: self.run_id,
                    token: id,
                    node: token.node_ref.clone(),
                });
                debug!(run_id = %self.run_id, token = %id, child = %child_run, "starting sub-workflow run");

                let child = WorkflowRun::child(
                    child_run,
                    child_definition,
                    self.resources.repository(),
                    Arc::clone(&self.executor),
                    Arc::clone(&self.events),
                    self.depth + 1,
                );
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let outcome = child.execute_boxed(input).await;
                    let _ = tx.send(RunMessage::Subworkflow {
                        token: id,
                        child_run,
                        outcome: Box::new(outcome),
                    });
                });
                Ok(())
            }
        }
    }

    /// Assemble a node's input from its mapping plus the token's
    /// `foreach` binding.
    fn node_input(&self, node: &NodeDefinition, token: &Token) -> Result<Value, CoordinatorError> {
        let mut input = serde_json::Map::new();
        for (target, source) in node.input_mapping.iter() {
            let value = self
                .context
                .read(source)?
                .ok_or_else(|| ContextError::MissingValue {
                    path: source.to_owned(),
                })?;
            input.insert(target.to_owned(), value);
        }
        if let Some(binding) = &token.foreach_item {
            input.insert(binding.var.clone(), binding.value.clone());
        }
        Ok(Value::Object(input))
    }

    fn node_definition(&self, node_ref: &NodeRef) -> Result<NodeDefinition, CoordinatorError> {
        self.definition
            .node(node_ref)
            .cloned()
            .ok_or_else(|| CoordinatorError::Definition(format!("unknown node `{node_ref}`")))
    }

    fn note_spawn(&mut self, id: TokenId) {
        if let Ok(token) = self.tokens.get(id) {
            self.journal.push(JournalEntry::TokenSpawned {
                timestamp: Utc::now(),
                token: token.id,
                node: token.node_ref.clone(),
                path: token.path.clone(),
            });
            self.events.emit(RunEvent::TokenSpawned {
                run_id: self.run_id,
                token: token.id,
                node: token.node_ref.clone(),
                path: token.path.clone(),
            });
        }
    }
}

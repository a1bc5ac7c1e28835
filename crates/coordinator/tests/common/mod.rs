//! Shared harness for coordinator integration tests.
//!
//! The [`ScriptedExecutor`] stands in for the real action executor: nodes
//! either auto-respond through a registered closure, or are held so the
//! test controls completion order and timing -- which is how the
//! ordering-under-races properties are exercised deterministically.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use weft_coordinator::{
    ActionDefinition, ActionExecutor, ActionKind, CoordinatorError, InMemoryRepository,
    ResourceRepository, ResultSink, RunOutcome, TaskDefinition, TaskDispatch, TaskResult,
    WorkflowRun,
};
use weft_core::{ActionId, NodeRef, TaskId, TokenId};
use weft_telemetry::{EventBus, EventSubscriber};
use weft_workflow::WorkflowDefinition;

type Responder = Arc<dyn Fn(&TaskDispatch) -> TaskResult + Send + Sync>;

/// Test double for the action executor.
pub struct ScriptedExecutor {
    responders: Mutex<HashMap<NodeRef, Responder>>,
    hold: Mutex<HashSet<NodeRef>>,
    held: Mutex<Vec<(TaskDispatch, ResultSink)>>,
    seen: Mutex<Vec<TaskDispatch>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            responders: Mutex::new(HashMap::new()),
            hold: Mutex::new(HashSet::new()),
            held: Mutex::new(Vec::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Auto-respond for a node with a closure over the dispatch.
    pub fn respond_with(
        &self,
        node: &str,
        f: impl Fn(&TaskDispatch) -> TaskResult + Send + Sync + 'static,
    ) {
        self.responders
            .lock()
            .insert(NodeRef::from(node), Arc::new(f));
    }

    /// Auto-complete a node with a fixed output.
    pub fn respond(&self, node: &str, output: Value) {
        self.respond_with(node, move |task| {
            TaskResult::completed(task.token, output.clone())
        });
    }

    /// Auto-fail a node with a fixed error.
    pub fn respond_failed(&self, node: &str, error: &str) {
        let error = error.to_owned();
        self.respond_with(node, move |task| TaskResult::failed(task.token, error.clone()));
    }

    /// Hold every dispatch for a node until the test releases it.
    pub fn hold_node(&self, node: &str) {
        self.hold.lock().insert(NodeRef::from(node));
    }

    /// Number of dispatches currently held.
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }

    /// Tokens of held dispatches, ascending (= branch order, since token
    /// ids are allocated in creation order).
    pub fn held_tokens(&self) -> Vec<TokenId> {
        let mut tokens: Vec<TokenId> = self.held.lock().iter().map(|(t, _)| t.token).collect();
        tokens.sort();
        tokens
    }

    /// The held dispatch for a token, if any.
    pub fn held_task(&self, token: TokenId) -> Option<TaskDispatch> {
        self.held
            .lock()
            .iter()
            .find(|(t, _)| t.token == token)
            .map(|(t, _)| t.clone())
    }

    /// Release a held dispatch with a successful output.
    pub fn complete(&self, token: TokenId, output: Value) {
        self.release(token, TaskResult::completed(token, output));
    }

    /// Release a held dispatch with a failure.
    pub fn fail(&self, token: TokenId, error: &str) {
        self.release(token, TaskResult::failed(token, error));
    }

    /// Release a held dispatch with an arbitrary result.
    pub fn release(&self, token: TokenId, result: TaskResult) {
        let entry = {
            let mut held = self.held.lock();
            let index = held.iter().position(|(t, _)| t.token == token);
            index.map(|i| held.remove(i))
        };
        if let Some((_, sink)) = entry {
            sink.submit(result);
        }
    }

    /// Every dispatch seen so far, in dispatch order.
    pub fn dispatches(&self) -> Vec<TaskDispatch> {
        self.seen.lock().clone()
    }

    /// How many dispatches targeted a node.
    pub fn dispatch_count(&self, node: &str) -> usize {
        let node = NodeRef::from(node);
        self.seen.lock().iter().filter(|t| t.node == node).count()
    }
}

#[async_trait]
impl ActionExecutor for ScriptedExecutor {
    async fn dispatch(&self, task: TaskDispatch, sink: ResultSink) {
        self.seen.lock().push(task.clone());
        if self.hold.lock().contains(&task.node) {
            self.held.lock().push((task, sink));
            return;
        }
        let responder = self.responders.lock().get(&task.node).cloned();
        let result = match responder {
            Some(f) => f(&task),
            None => TaskResult::completed(task.token, json!({})),
        };
        sink.submit(result);
    }
}

/// Repository + executor + event bus wired for one test.
pub struct Harness {
    pub repo: Arc<InMemoryRepository>,
    pub executor: Arc<ScriptedExecutor>,
    pub events: Arc<EventBus>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            repo: Arc::new(InMemoryRepository::new()),
            executor: Arc::new(ScriptedExecutor::new()),
            events: Arc::new(EventBus::new(1024)),
        }
    }

    /// Subscribe to run events (call before starting the run).
    pub fn subscribe(&self) -> EventSubscriber {
        self.events.subscribe()
    }

    /// Register a task + tool action pair and return the task id.
    pub fn register_task(&self, name: &str) -> TaskId {
        let action_id = ActionId::v4();
        self.repo.insert_action(ActionDefinition {
            id: action_id,
            name: name.into(),
            version: 1,
            kind: ActionKind::Tool,
            implementation: json!({"name": name}),
        });
        let task_id = TaskId::v4();
        self.repo.insert_task(TaskDefinition {
            id: task_id,
            name: name.into(),
            version: 1,
            action_id,
            action_version: 1,
            timeout: None,
            retry: None,
        });
        task_id
    }

    /// Spawn a run of `definition`; the test drives the executor while
    /// the run loop works, then awaits the handle.
    pub fn run(
        &self,
        definition: WorkflowDefinition,
        input: Value,
    ) -> tokio::task::JoinHandle<Result<RunOutcome, CoordinatorError>> {
        let repo: Arc<dyn ResourceRepository> = self.repo.clone();
        let executor: Arc<dyn ActionExecutor> = self.executor.clone();
        let run = WorkflowRun::new(Arc::new(definition), repo, executor, self.events.clone());
        tokio::spawn(run.execute(input))
    }
}

/// Poll until `cond` holds, or panic after ~4 seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not met within deadline");
}

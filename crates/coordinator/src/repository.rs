//! The read-only resource repository interface and its per-run cache.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use weft_core::{ActionId, ModelProfileId, PromptSpecId, TaskId, WorkflowId};
use weft_workflow::WorkflowDefinition;

use crate::error::CoordinatorError;
use crate::resource::{ActionDefinition, ModelProfile, PromptSpec, TaskDefinition};

/// Read-only access to the resource catalog.
///
/// Every definition a run uses is version-pinned at run start; the
/// coordinator never observes catalog mutations mid-run (see
/// [`RepositoryCache`]).
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Fetch a workflow definition at a pinned version.
    async fn workflow_definition(
        &self,
        id: WorkflowId,
        version: u32,
    ) -> Result<Arc<WorkflowDefinition>, CoordinatorError>;

    /// Fetch a task at a pinned version.
    async fn task(&self, id: TaskId, version: u32) -> Result<Arc<TaskDefinition>, CoordinatorError>;

    /// Fetch an action at a pinned version.
    async fn action(
        &self,
        id: ActionId,
        version: u32,
    ) -> Result<Arc<ActionDefinition>, CoordinatorError>;

    /// Fetch a prompt spec.
    async fn prompt_spec(&self, id: PromptSpecId) -> Result<Arc<PromptSpec>, CoordinatorError>;

    /// Fetch a model profile.
    async fn model_profile(
        &self,
        id: ModelProfileId,
    ) -> Result<Arc<ModelProfile>, CoordinatorError>;
}

/// Per-run read-through cache over a [`ResourceRepository`].
///
/// The first fetch of each `(id, version)` pair goes to the repository;
/// every later fetch within the run sees the pinned copy.
pub struct RepositoryCache {
    repository: Arc<dyn ResourceRepository>,
    workflows: DashMap<(WorkflowId, u32), Arc<WorkflowDefinition>>,
    tasks: DashMap<(TaskId, u32), Arc<TaskDefinition>>,
    actions: DashMap<(ActionId, u32), Arc<ActionDefinition>>,
}

impl RepositoryCache {
    /// Wrap a repository with an empty cache.
    #[must_use]
    pub fn new(repository: Arc<dyn ResourceRepository>) -> Self {
        Self {
            repository,
            workflows: DashMap::new(),
            tasks: DashMap::new(),
            actions: DashMap::new(),
        }
    }

    /// The underlying repository, for handing to child runs.
    #[must_use]
    pub fn repository(&self) -> Arc<dyn ResourceRepository> {
        Arc::clone(&self.repository)
    }

    /// Fetch (and pin) a workflow definition.
    pub async fn workflow_definition(
        &self,
        id: WorkflowId,
        version: u32,
    ) -> Result<Arc<WorkflowDefinition>, CoordinatorError> {
        if let Some(hit) = self.workflows.get(&(id, version)) {
            return Ok(Arc::clone(&hit));
        }
        let fetched = self.repository.workflow_definition(id, version).await?;
        self.workflows.insert((id, version), Arc::clone(&fetched));
        Ok(fetched)
    }

    /// Fetch (and pin) a task.
    pub async fn task(
        &self,
        id: TaskId,
        version: u32,
    ) -> Result<Arc<TaskDefinition>, CoordinatorError> {
        if let Some(hit) = self.tasks.get(&(id, version)) {
            return Ok(Arc::clone(&hit));
        }
        let fetched = self.repository.task(id, version).await?;
        self.tasks.insert((id, version), Arc::clone(&fetched));
        Ok(fetched)
    }

    /// Fetch (and pin) an action.
    pub async fn action(
        &self,
        id: ActionId,
        version: u32,
    ) -> Result<Arc<ActionDefinition>, CoordinatorError> {
        if let Some(hit) = self.actions.get(&(id, version)) {
            return Ok(Arc::clone(&hit));
        }
        let fetched = self.repository.action(id, version).await?;
        self.actions.insert((id, version), Arc::clone(&fetched));
        Ok(fetched)
    }
}

impl std::fmt::Debug for RepositoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryCache")
            .field("workflows", &self.workflows.len())
            .field("tasks", &self.tasks.len())
            .field("actions", &self.actions.len())
            .finish()
    }
}

/// In-memory repository for embedders and tests.
#[derive(Default)]
pub struct InMemoryRepository {
    workflows: DashMap<(WorkflowId, u32), Arc<WorkflowDefinition>>,
    tasks: DashMap<(TaskId, u32), Arc<TaskDefinition>>,
    actions: DashMap<(ActionId, u32), Arc<ActionDefinition>>,
    prompt_specs: DashMap<PromptSpecId, Arc<PromptSpec>>,
    model_profiles: DashMap<ModelProfileId, Arc<ModelProfile>>,
}

impl InMemoryRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow definition under its id and version.
    pub fn insert_workflow(&self, definition: WorkflowDefinition) {
        self.workflows
            .insert((definition.id, definition.version), Arc::new(definition));
    }

    /// Register a task under its id and version.
    pub fn insert_task(&self, task: TaskDefinition) {
        self.tasks.insert((task.id, task.version), Arc::new(task));
    }

    /// Register an action under its id and version.
    pub fn insert_action(&self, action: ActionDefinition) {
        self.actions
            .insert((action.id, action.version), Arc::new(action));
    }

    /// Register a prompt spec.
    pub fn insert_prompt_spec(&self, spec: PromptSpec) {
        self.prompt_specs.insert(spec.id, Arc::new(spec));
    }

    /// Register a model profile.
    pub fn insert_model_profile(&self, profile: ModelProfile) {
        self.model_profiles.insert(profile.id, Arc::new(profile));
    }
}

#[async_trait]
impl ResourceRepository for InMemoryRepository {
    async fn workflow_definition(
        &self,
        id: WorkflowId,
        version: u32,
    ) -> Result<Arc<WorkflowDefinition>, CoordinatorError> {
        self.workflows
            .get(&(id, version))
            .map(|r| Arc::clone(&r))
            .ok_or(CoordinatorError::ResourceNotFound {
                kind: "workflow",
                key: format!("{id}@{version}"),
            })
    }

    async fn task(&self, id: TaskId, version: u32) -> Result<Arc<TaskDefinition>, CoordinatorError> {
        self.tasks
            .get(&(id, version))
            .map(|r| Arc::clone(&r))
            .ok_or(CoordinatorError::ResourceNotFound {
                kind: "task",
                key: format!("{id}@{version}"),
            })
    }

    async fn action(
        &self,
        id: ActionId,
        version: u32,
    ) -> Result<Arc<ActionDefinition>, CoordinatorError> {
        self.actions
            .get(&(id, version))
            .map(|r| Arc::clone(&r))
            .ok_or(CoordinatorError::ResourceNotFound {
                kind: "action",
                key: format!("{id}@{version}"),
            })
    }

    async fn prompt_spec(&self, id: PromptSpecId) -> Result<Arc<PromptSpec>, CoordinatorError> {
        self.prompt_specs
            .get(&id)
            .map(|r| Arc::clone(&r))
            .ok_or(CoordinatorError::ResourceNotFound {
                kind: "prompt_spec",
                key: id.to_string(),
            })
    }

    async fn model_profile(
        &self,
        id: ModelProfileId,
    ) -> Result<Arc<ModelProfile>, CoordinatorError> {
        self.model_profiles
            .get(&id)
            .map(|r| Arc::clone(&r))
            .ok_or(CoordinatorError::ResourceNotFound {
                kind: "model_profile",
                key: id.to_string(),
            })
    }
}

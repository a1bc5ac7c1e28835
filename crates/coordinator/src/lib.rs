#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Coordinator
//!
//! The workflow coordination core: token lifecycle, pure routing and
//! synchronization planning, and the dispatch executor that drives
//! declaratively-defined workflows to completion.
//!
//! One [`WorkflowRun`] is instantiated per run. It owns a private token
//! table, context store, and fan-in coordination table, and lives until
//! every token reaches a terminal state. Control flow per step: an action
//! result arrives → the [`planner`] computes a decision batch → the
//! dispatcher applies it atomically → newly dispatchable tokens are
//! handed to the [`ActionExecutor`] → on the next callback the cycle
//! repeats. The planner is pure; all state mutation is concentrated in
//! the dispatcher.
//!
//! External collaborators plug in through three seams:
//!
//! - [`ActionExecutor`] -- runs dispatched actions, delivers
//!   [`TaskResult`]s asynchronously
//! - [`ResourceRepository`] -- read-only, version-pinned resource catalog
//! - [`weft_telemetry::EventBus`] -- typed run events

mod dispatcher;

pub mod error;
pub mod executor;
pub mod fan_in;
pub mod idempotency;
pub mod journal;
pub mod planner;
pub mod repository;
pub mod resource;
pub mod runner;
pub mod status;
pub mod store;
pub mod token;
pub mod transition;

pub use error::CoordinatorError;
pub use executor::{ActionExecutor, ResultSink, TaskDispatch, TaskResult, TaskStatus};
pub use fan_in::{FanInRecord, FanInTable};
pub use idempotency::{SpawnKey, SpawnLedger};
pub use journal::JournalEntry;
pub use planner::{
    Decision, PlanEvent, PlanOutcome, PlanSnapshot, SiblingInfo, TokenRef, TransitionView, plan,
};
pub use repository::{InMemoryRepository, RepositoryCache, ResourceRepository};
pub use resource::{
    ActionDefinition, ActionKind, ModelProfile, PromptSpec, RetryPolicy, TaskDefinition,
};
pub use runner::{RunFailure, RunOutcome, RunStatus, WorkflowRun};
pub use status::TokenStatus;
pub use store::{SiblingCounts, TokenStore};
pub use token::{ForeachBinding, Token, TokenSpec};
pub use transition::{can_transition, validate_transition};

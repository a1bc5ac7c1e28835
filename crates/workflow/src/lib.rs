#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Workflow
//!
//! The immutable workflow definition model: the directed graph of nodes and
//! transitions that the coordinator drives tokens through.
//!
//! A definition is produced by the workspace loader (out of scope here) and
//! treated as read-only for the lifetime of a run. This crate defines:
//!
//! - [`WorkflowDefinition`] -- the graph plus its schemas and output mapping
//! - [`NodeDefinition`] and [`NodeBinding`] -- a vertex bound to a task or a
//!   nested sub-workflow
//! - [`Transition`] and [`SpawnMode`] -- edges, including static fan-out
//!   (`spawn_count`) and dynamic fan-out (`foreach`)
//! - [`Synchronization`], [`FanInStrategy`], [`MergeConfig`] -- fan-in
//!   declarations on a transition
//! - [`Condition`] -- pre-evaluated edge guards
//! - [`Mapping`] -- declarative input/output path mappings
//! - [`ValueSchema`] -- the lightweight shape model contexts are laid out
//!   and validated against

pub mod condition;
pub mod definition;
pub mod mapping;
pub mod node;
pub mod schema;
pub mod synchronization;
pub mod transition;

pub use condition::{Condition, Predicate};
pub use definition::WorkflowDefinition;
pub use mapping::Mapping;
pub use node::{NodeBinding, NodeDefinition};
pub use schema::{SchemaError, ValueSchema};
pub use synchronization::{
    FanInPath, FanInStrategy, MergeConfig, MergeStrategy, Synchronization, TimeoutPolicy,
};
pub use transition::{SpawnMode, Transition};

/// Serde helper for `Option<Duration>` serialized as milliseconds.
pub(crate) mod serde_duration_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serialize an `Option<Duration>` as an optional integer of milliseconds.
    pub fn serialize<S: Serializer>(duration: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match duration {
            Some(d) => (d.as_millis() as u64).serialize(s),
            None => s.serialize_none(),
        }
    }

    /// Deserialize an optional integer of milliseconds into `Option<Duration>`.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let opt: Option<u64> = Option::deserialize(d)?;
        Ok(opt.map(Duration::from_millis))
    }
}

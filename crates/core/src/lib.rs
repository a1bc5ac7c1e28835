#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Core
//!
//! Identifier types shared by every Weft crate.
//!
//! - UUID-backed entity identifiers ([`RunId`], [`WorkflowId`], [`TaskId`],
//!   [`ActionId`], [`PromptSpecId`], [`ModelProfileId`]) via `domain-key`
//!   wrappers -- `Copy`, 16 bytes, compile-time incompatible with each other
//! - [`TokenId`] -- run-local monotonic token identifier, ordered by creation
//! - [`TokenPath`] -- dotted lineage string correlating a token with the
//!   fan-outs that produced it
//! - [`NodeRef`] and [`TransitionRef`] -- workflow-graph reference keys

pub mod id;
pub mod path;
pub mod refs;

pub use id::{
    ActionId, ModelProfileId, PromptSpecId, RunId, TaskId, TokenId, UuidParseError, WorkflowId,
};
pub use path::TokenPath;
pub use refs::{NodeRef, TransitionRef};

/// Common prelude for Weft crates.
pub mod prelude {
    pub use super::{
        ActionId, ModelProfileId, NodeRef, PromptSpecId, RunId, TaskId, TokenId, TokenPath,
        TransitionRef, WorkflowId,
    };
}

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Context
//!
//! The per-run structured key-value store. Every workflow run owns one
//! [`ContextStore`], laid out from the definition's schemas and addressed
//! by dotted paths with JSON-pointer escapes.
//!
//! Regions:
//!
//! - `input.*` -- immutable after run start
//! - `state.*` -- mutable; node output mappings write here
//! - `output.*` -- populated by terminal-node mappings and the
//!   workflow-level output mapping at finalization
//! - `_branches.<node>.<token>` -- internal branch-scoped output capture,
//!   feeding the fan-in [`merge`](ContextStore::merge) operators
//!
//! All mutation happens from the dispatcher, one result callback at a
//! time, so the store needs no internal locking; last-write-wins is exact.

pub mod error;
pub mod merge;
pub mod path;
pub mod store;

pub use error::ContextError;
pub use path::ContextPath;
pub use store::{BranchCapture, ContextStore, WriteRecord, resolve_in_value};

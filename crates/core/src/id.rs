//! Unique identifiers for Weft entities.
//!
//! Entity identifiers are strongly-typed UUID wrappers built on
//! [`domain-key`](https://crates.io/crates/domain-key) `Uuid<D>` types. Each
//! identifier is parameterized by a unique domain marker, so a [`WorkflowId`]
//! can never be passed where a [`TaskId`] is expected.
//!
//! All UUID identifiers are `Copy` (16 bytes, stack-allocated) and support:
//! - `v4()` for random generation
//! - `nil()` for zero-valued default
//! - `parse(&str)` for string parsing
//! - Full serde support (serializes as UUID string)
//! - `Display`, `FromStr`, `Eq`, `Ord`, `Hash`
//!
//! [`TokenId`] is different: tokens are created in dispatch order within a
//! single run, and downstream ordering guarantees (strict `branch_index`
//! append order, journal replay) rely on creation order being observable.
//! It is therefore a monotonic `u64` allocated by the token store, not a
//! random UUID.

use serde::{Deserialize, Serialize};
use std::fmt;

use domain_key::define_uuid;

// Re-export for downstream parse error handling
pub use domain_key::UuidParseError;

// Entity identifiers -- UUID-based, Copy, 16 bytes each
define_uuid!(pub RunIdDomain => RunId);
define_uuid!(pub WorkflowIdDomain => WorkflowId);
define_uuid!(pub TaskIdDomain => TaskId);
define_uuid!(pub ActionIdDomain => ActionId);
define_uuid!(pub PromptSpecIdDomain => PromptSpecId);
define_uuid!(pub ModelProfileIdDomain => ModelProfileId);

/// Run-local token identifier.
///
/// Monotonic within one workflow run: a token created later always compares
/// greater than one created earlier. Allocated by the token store, starting
/// at `1` (so `TokenId::default()` is never a live token).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TokenId(u64);

impl TokenId {
    /// Wrap a raw sequence number.
    #[must_use]
    pub fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// The raw sequence number.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// The identifier following this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

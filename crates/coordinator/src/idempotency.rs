//! Idempotent token creation.
//!
//! Dispatch batches may be re-applied (a callback retried after a partial
//! apply). Token creation is the one decision that would otherwise
//! duplicate work, so every spawn carries a deterministic key: the batch
//! that re-runs finds the key already recorded and reuses the original
//! token instead of minting a second one.

use std::collections::HashMap;

use weft_core::TokenId;

/// Deterministic identity of one spawn decision.
///
/// `(parent token, spawn scope, branch index)` -- the scope is the spawning
/// transition's ref, or the fan-in path for continuation tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpawnKey {
    /// The token whose completion caused the spawn (`None` for the root).
    pub parent: Option<TokenId>,
    /// The spawning transition ref or fan-in path.
    pub scope: String,
    /// Branch position within the spawn.
    pub branch_index: u32,
}

impl SpawnKey {
    /// Key for one branch of a transition's fan-out.
    #[must_use]
    pub fn branch(parent: TokenId, transition: impl Into<String>, branch_index: u32) -> Self {
        Self {
            parent: Some(parent),
            scope: transition.into(),
            branch_index,
        }
    }

    /// Key for a fan-in's continuation token.
    #[must_use]
    pub fn continuation(parent: TokenId, fan_in_path: impl Into<String>) -> Self {
        Self {
            parent: Some(parent),
            scope: fan_in_path.into(),
            branch_index: 0,
        }
    }
}

/// Tracks which spawn keys have produced a token.
#[derive(Debug, Default)]
pub struct SpawnLedger {
    seen: HashMap<SpawnKey, TokenId>,
}

impl SpawnLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The token a key already produced, if any.
    #[must_use]
    pub fn existing(&self, key: &SpawnKey) -> Option<TokenId> {
        self.seen.get(key).copied()
    }

    /// Record that `key` produced `token`.
    pub fn record(&mut self, key: SpawnKey, token: TokenId) {
        self.seen.insert(key, token);
    }

    /// Number of recorded spawns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

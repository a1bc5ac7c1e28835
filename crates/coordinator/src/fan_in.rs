//! The fan-in coordination table.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weft_core::{RunId, TokenId};
use weft_workflow::FanInPath;

/// The record inserted when a fan-in activates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanInRecord {
    /// The activated fan-in point.
    pub fan_in_path: FanInPath,
    /// The sibling whose arrival (or the timeout) won the activation.
    pub winner: Option<TokenId>,
    /// The contributors whose outputs were merged, in `branch_index`
    /// order.
    pub merged: Vec<TokenId>,
    /// When the activation happened.
    pub activated_at: DateTime<Utc>,
}

/// Per-run table enforcing at-most-one activation per fan-in point.
///
/// Keyed by `(run_id, fan_in_path)`; the run id is fixed per table, so the
/// map key is the path alone. First insert wins -- every later attempt for
/// the same path reports a lost race and must downgrade to a no-op. This
/// is the only synchronization primitive the merge-once guarantee rests
/// on.
#[derive(Debug)]
pub struct FanInTable {
    run_id: RunId,
    records: HashMap<FanInPath, FanInRecord>,
}

impl FanInTable {
    /// Create an empty table for a run.
    #[must_use]
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            records: HashMap::new(),
        }
    }

    /// The owning run.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Attempt to activate a fan-in point.
    ///
    /// Returns `true` if this call won (the record was inserted), `false`
    /// if the point was already activated -- the benign lost-race case.
    pub fn try_activate(
        &mut self,
        fan_in_path: FanInPath,
        winner: Option<TokenId>,
        merged: Vec<TokenId>,
    ) -> bool {
        if self.records.contains_key(&fan_in_path) {
            return false;
        }
        self.records.insert(
            fan_in_path.clone(),
            FanInRecord {
                fan_in_path,
                winner,
                merged,
                activated_at: Utc::now(),
            },
        );
        true
    }

    /// Returns `true` if the point has already activated.
    #[must_use]
    pub fn is_activated(&self, fan_in_path: &FanInPath) -> bool {
        self.records.contains_key(fan_in_path)
    }

    /// The activation record for a point, if it activated.
    #[must_use]
    pub fn record(&self, fan_in_path: &FanInPath) -> Option<&FanInRecord> {
        self.records.get(fan_in_path)
    }

    /// Every activated path.
    #[must_use]
    pub fn activated_paths(&self) -> Vec<FanInPath> {
        self.records.keys().cloned().collect()
    }
}

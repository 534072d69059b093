//! Snapshot building for presentation adapters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::board::{MatchState, PlayerNames, StateDelta};
use super::ServeSlot;

/// Everything an adapter needs to render the scoreboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreboardSnapshot {
    pub left_score: u32,
    pub right_score: u32,
    /// Slot currently holding serve, if any
    pub serving: Option<ServeSlot>,
    pub names: PlayerNames,
    pub is_swapped: bool,
    pub total_points: u32,
    /// Bumped once per state change
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// Builds versioned snapshots from the live match state
pub struct SnapshotBuilder {
    version: u64,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self { version: 0 }
    }

    /// Snapshot after `delta`; only non-empty deltas advance the version
    pub fn build(&mut self, state: &MatchState, delta: &StateDelta) -> ScoreboardSnapshot {
        if !delta.is_empty() {
            self.version += 1;
        }
        self.current(state)
    }

    /// Snapshot of the state as of the latest version
    pub fn current(&self, state: &MatchState) -> ScoreboardSnapshot {
        ScoreboardSnapshot {
            left_score: state.left_score,
            right_score: state.right_score,
            serving: state.serve,
            names: state.names.clone(),
            is_swapped: state.is_swapped,
            total_points: state.total_points,
            version: self.version,
            updated_at: Utc::now(),
        }
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

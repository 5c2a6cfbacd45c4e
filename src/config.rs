use serde::{Deserialize, Serialize};

use crate::ledger::types::DARTS_PER_TURN;

/// Tunables shared by the ingestion engine, the statistics calculator and
/// the delivery lanes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Turns started above this remaining score count toward "average until".
    pub checkout_threshold: i32,
    /// How many opening turns feed the first-nine metrics.
    pub first_turns: usize,
    pub darts_per_turn: u32,
    pub lanes: usize,
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            checkout_threshold: 170,
            first_turns: 3,
            darts_per_turn: DARTS_PER_TURN,
            lanes: 4,
            queue_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn with_lanes(mut self, lanes: usize) -> Self {
        self.lanes = lanes.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

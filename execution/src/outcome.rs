//! Round outcome persistence boundary.

use std::sync::{Arc, Mutex};

use crashline_types::RoundOutcome;
use tracing::{info, warn};

/// Receives each finished round exactly once, after every wager is final.
pub trait OutcomeSink: Send {
    fn record_round_outcome(&mut self, outcome: &RoundOutcome);
}

/// Emits outcomes as structured log lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingOutcomeSink;

impl OutcomeSink for TracingOutcomeSink {
    fn record_round_outcome(&mut self, outcome: &RoundOutcome) {
        let frozen = outcome.frozen().count();
        match serde_json::to_string(outcome) {
            Ok(json) => info!(
                round_id = outcome.round_id,
                crash_point = %outcome.crash_point,
                participants = outcome.participants.len(),
                real_stakes = outcome.real_stakes(),
                real_winnings = outcome.real_winnings(),
                frozen,
                outcome = %json,
                "round outcome"
            ),
            Err(err) => warn!(?err, round_id = outcome.round_id, "failed to encode round outcome"),
        }
    }
}

/// Keeps outcomes in memory; clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct MemoryOutcomes {
    outcomes: Arc<Mutex<Vec<RoundOutcome>>>,
}

impl MemoryOutcomes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<RoundOutcome> {
        match self.outcomes.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl OutcomeSink for MemoryOutcomes {
    fn record_round_outcome(&mut self, outcome: &RoundOutcome) {
        let mut guard = match self.outcomes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(outcome.clone());
    }
}

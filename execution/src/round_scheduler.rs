//! Round scheduler for the crash table.
//!
//! Pure phase-transition guards and timing calculations, kept apart from the engine so the
//! engine's `tick` reads as a list of "if the guard holds, transition" steps and tests can drive
//! time by hand.
//!
//! ## Phases
//!
//! 1. **Waiting** - idle until the waiting period elapses
//! 2. **Betting** - bets accepted strictly before the betting deadline
//! 3. **Flying** - multiplier climbing; ends at the crash point or the flight bound
//! 4. **Crashed** - result held for the cooldown, then back to Waiting
//!
//! ## Clock
//!
//! Every guard takes `now_ms` from the caller. The engine never reads the wall clock itself.
//!
//! ```rust,ignore
//! use crashline_execution::round_scheduler::{PhaseConfig, RoundScheduler};
//!
//! let scheduler = RoundScheduler::new(PhaseConfig::default());
//! let deadline = scheduler.betting_deadline(now_ms);
//! assert!(scheduler.is_betting_open(Phase::Betting, deadline, now_ms));
//! ```

use crashline_types::Phase;

/// Phase configuration with durations in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseConfig {
    /// Idle time between cooldown and the next betting window. Zero opens betting on the next tick.
    pub waiting_ms: u64,
    /// Duration of the betting window.
    pub betting_ms: u64,
    /// How long the crashed result stays on screen.
    pub cooldown_ms: u64,
    /// Hard bound on flight time in case a crash point is never reached.
    pub max_flight_ms: u64,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            waiting_ms: 0,
            betting_ms: 10_000,
            cooldown_ms: 5_000,
            max_flight_ms: 120_000,
        }
    }
}

impl PhaseConfig {
    pub fn new(waiting_ms: u64, betting_ms: u64, cooldown_ms: u64, max_flight_ms: u64) -> Self {
        Self {
            waiting_ms,
            betting_ms,
            cooldown_ms,
            max_flight_ms,
        }
    }

    /// Validate the configuration. Waiting may be zero; every other duration must be > 0.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.betting_ms == 0 {
            return Err("betting_ms must be greater than zero");
        }
        if self.cooldown_ms == 0 {
            return Err("cooldown_ms must be greater than zero");
        }
        if self.max_flight_ms == 0 {
            return Err("max_flight_ms must be greater than zero");
        }
        Ok(())
    }
}

/// Pure state machine for crash round phases.
#[derive(Clone, Debug)]
pub struct RoundScheduler {
    config: PhaseConfig,
}

impl RoundScheduler {
    pub fn new(config: PhaseConfig) -> Self {
        Self { config }
    }

    /// Round ids are time-derived but strictly increasing even if the clock stalls.
    pub fn next_round_id(previous: u64, now_ms: u64) -> u64 {
        now_ms.max(previous.saturating_add(1))
    }

    pub fn can_open_betting(&self, phase: Phase, phase_ends_at_ms: u64, now_ms: u64) -> bool {
        matches!(phase, Phase::Waiting) && now_ms >= phase_ends_at_ms
    }

    /// A bet is accepted strictly before the deadline; a request at the deadline is late.
    pub fn is_betting_open(&self, phase: Phase, deadline_ms: u64, now_ms: u64) -> bool {
        matches!(phase, Phase::Betting) && now_ms < deadline_ms
    }

    pub fn can_launch(&self, phase: Phase, deadline_ms: u64, now_ms: u64) -> bool {
        matches!(phase, Phase::Betting) && now_ms >= deadline_ms
    }

    pub fn can_cash_out(&self, phase: Phase) -> bool {
        matches!(phase, Phase::Flying)
    }

    pub fn flight_exhausted(&self, flight_started_at_ms: u64, now_ms: u64) -> bool {
        now_ms.saturating_sub(flight_started_at_ms) >= self.config.max_flight_ms
    }

    pub fn can_reset(&self, phase: Phase, phase_ends_at_ms: u64, now_ms: u64) -> bool {
        matches!(phase, Phase::Crashed) && now_ms >= phase_ends_at_ms
    }

    pub fn waiting_phase_timing(&self, now_ms: u64) -> u64 {
        now_ms.saturating_add(self.config.waiting_ms)
    }

    pub fn betting_deadline(&self, now_ms: u64) -> u64 {
        now_ms.saturating_add(self.config.betting_ms)
    }

    pub fn cooldown_phase_timing(&self, now_ms: u64) -> u64 {
        now_ms.saturating_add(self.config.cooldown_ms)
    }
}

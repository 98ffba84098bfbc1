//! Crashline execution layer.
//!
//! Game logic for the crash table and the mines side game, plus the money path both share.
//!
//! ## Determinism requirements
//! - Do not read the wall clock inside execution; every operation takes `now_ms` from the caller.
//! - Randomness comes from an injected source ([`crash::CrashPointSource`], seeded `StdRng`s) so
//!   tests can replay a round exactly.
//!
//! ## Money invariants
//! Every stake and payout goes through [`Cashier`]. For real-money wagers the player delta and the
//! house-bank delta of each event sum to zero. An escrow stays in the [`journal`] until its wager
//! settles, which is what lets [`Cashier::recover_open_escrows`] refund a round that a crash or
//! restart interrupted.
//!
//! ## Minimal round (example)
//! ```rust,ignore
//! use crashline_execution::crash::{BetRequest, BotRoster, CrashEngine, EngineConfig, TieredCrashPoints};
//! use crashline_execution::{Cashier, MemoryJournal, MemoryLedger, TracingOutcomeSink};
//!
//! let mut cashier = Cashier::new(MemoryLedger::new(), MemoryJournal::new());
//! let mut engine = CrashEngine::new(
//!     EngineConfig::default(),
//!     TieredCrashPoints::from_entropy(),
//!     BotRoster::generate(8, 100, 5_000, 7),
//!     TracingOutcomeSink,
//! );
//! for event in engine.tick(&mut cashier, now_ms) {
//!     // broadcast
//! }
//! ```

pub mod cashier;
pub mod crash;
pub mod journal;
pub mod ledger;
pub mod mines;
pub mod outcome;
pub mod round_scheduler;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use cashier::{Cashier, RecoveryReport};
pub use crash::{BetRequest, CrashEngine, EngineConfig, EngineEvent};
pub use journal::{
    EscrowJournal, EscrowState, EscrowTicket, FileJournal, JournalEntry, JournalError, MemoryJournal,
};
pub use ledger::{Account, BalanceLedger, LedgerError, MemoryLedger};
pub use mines::{MinesCashout, MinesConfig, MinesPaytable, MinesTable};
pub use outcome::{MemoryOutcomes, OutcomeSink, TracingOutcomeSink};
pub use round_scheduler::{PhaseConfig, RoundScheduler};

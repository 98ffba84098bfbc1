//! The crash game: bet book, bots, multiplier clock, crash point draws and the round engine.

pub mod bets;
pub mod bots;
pub mod clock;
pub mod crash_point;
pub mod engine;


pub use bets::{Bet, BetBook};
pub use bots::{BotProfile, BotRoster, RiskProfile};
pub use clock::{MultiplierClock, DEFAULT_GROWTH_PER_SECOND};
pub use crash_point::{sanitize_crash_point, CrashPointSource, TieredCrashPoints};
pub use engine::{BetRequest, CrashEngine, EngineConfig, EngineEvent};

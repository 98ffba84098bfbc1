//! Casino domain types.
//!
//! Defines the round/bet/settlement views and constants shared by the execution layer and the
//! table service.

mod constants;
mod error;
mod mines;
mod multiplier;
mod round;
mod wager;

pub use constants::*;
pub use error::*;
pub use mines::*;
pub use multiplier::*;
pub use round::*;
pub use wager::*;

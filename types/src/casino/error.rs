use thiserror::Error as ThisError;

use super::Multiplier;

/// Rejection reasons for bet, cash-out and mines requests.
///
/// Every variant maps to a stable machine-readable code via [`BetError::code`]; rejections never
/// mutate round state or balances.
#[derive(Clone, Debug, ThisError, PartialEq, Eq)]
pub enum BetError {
    #[error("stake must be greater than zero")]
    InvalidStake,
    #[error("stake {stake} outside table limits [{min}, {max}]")]
    StakeOutOfRange { stake: u64, min: u64, max: u64 },
    #[error("auto cash-out {0} must be above 1.00x")]
    InvalidAutoCashout(Multiplier),
    #[error("display name too long (len={len}, max={max})")]
    DisplayNameTooLong { len: usize, max: usize },
    #[error("betting is closed for this round")]
    BettingClosed,
    #[error("round is not in flight")]
    NotFlying,
    #[error("participant already has a bet this round")]
    DuplicateBet,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("bet already settled")]
    AlreadySettled,
    #[error("no active bet")]
    NoActiveBet,
    #[error("balance ledger unavailable: {0}")]
    LedgerUnavailable(String),
    #[error("mine count {got} outside [{min}, {max}]")]
    InvalidMineCount { got: u8, min: u8, max: u8 },
    #[error("cell {0} is not on the board")]
    InvalidCell(u8),
    #[error("cell {0} already revealed")]
    CellAlreadyRevealed(u8),
    #[error("a game is already in progress")]
    GameInProgress,
    #[error("reveal at least one cell before cashing out")]
    NothingRevealed,
}

impl BetError {
    pub fn code(&self) -> &'static str {
        match self {
            BetError::InvalidStake => "INVALID_STAKE",
            BetError::StakeOutOfRange { .. } => "STAKE_OUT_OF_RANGE",
            BetError::InvalidAutoCashout(_) => "INVALID_AUTO_CASHOUT",
            BetError::DisplayNameTooLong { .. } => "DISPLAY_NAME_TOO_LONG",
            BetError::BettingClosed => "BETTING_CLOSED",
            BetError::NotFlying => "NOT_FLYING",
            BetError::DuplicateBet => "DUPLICATE_BET",
            BetError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            BetError::AlreadySettled => "ALREADY_SETTLED",
            BetError::NoActiveBet => "NO_ACTIVE_BET",
            BetError::LedgerUnavailable(_) => "LEDGER_UNAVAILABLE",
            BetError::InvalidMineCount { .. } => "INVALID_MINE_COUNT",
            BetError::InvalidCell(_) => "INVALID_CELL",
            BetError::CellAlreadyRevealed(_) => "CELL_ALREADY_REVEALED",
            BetError::GameInProgress => "GAME_IN_PROGRESS",
            BetError::NothingRevealed => "NOTHING_REVEALED",
        }
    }

    /// Validation rejections: the request was malformed or arrived in the wrong phase.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            BetError::InsufficientFunds
                | BetError::AlreadySettled
                | BetError::NoActiveBet
                | BetError::LedgerUnavailable(_)
        )
    }
}

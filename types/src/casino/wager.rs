use serde::{Deserialize, Serialize};

/// Which balance a wager draws from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    Demo,
    Real,
}

impl LedgerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerMode::Demo => "demo",
            LedgerMode::Real => "real",
        }
    }

    /// Only real-money wagers move the house bank.
    pub fn touches_house_bank(&self) -> bool {
        matches!(self, LedgerMode::Real)
    }
}

/// Game a wager belongs to. Every game shares the same escrow/payout path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    Crash,
    Mines,
}

impl GameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::Crash => "crash",
            GameKind::Mines => "mines",
        }
    }
}

/// Result of an accepted cash-out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashoutReceipt {
    pub multiplier: super::Multiplier,
    pub win_amount: u64,
}

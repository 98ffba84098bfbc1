use serde::Serialize;

use super::{CashoutReceipt, LedgerMode, Multiplier};

/// Player-facing view of an open mines board. Mine positions stay hidden until the game ends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinesView {
    pub game_id: u64,
    pub stake: u64,
    pub mode: LedgerMode,
    pub mine_count: u8,
    pub revealed: Vec<u8>,
    pub multiplier: Multiplier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_multiplier: Option<Multiplier>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum RevealOutcome {
    /// Safe cell; the board stays open.
    Safe { board: MinesView },
    /// Every safe cell revealed; the board was cashed out automatically.
    Cleared {
        receipt: CashoutReceipt,
        mines: Vec<u8>,
    },
    /// Hit a mine; the stake is forfeited.
    Mine { cell: u8, mines: Vec<u8> },
}

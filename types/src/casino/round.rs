use serde::{Deserialize, Serialize};

use super::{LedgerMode, Multiplier};

/// Crash round lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Idle between rounds.
    Waiting,
    /// Accepting bets until the betting deadline.
    Betting,
    /// Multiplier climbing; cash-outs allowed, bets rejected.
    Flying,
    /// Terminal snapshot held through the cooldown.
    Crashed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Waiting => "waiting",
            Phase::Betting => "betting",
            Phase::Flying => "flying",
            Phase::Crashed => "crashed",
        }
    }
}

/// Public view of one participant's bet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub display_name: String,
    pub stake: u64,
    pub is_bot: bool,
    pub cashed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cashout_multiplier: Option<Multiplier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_amount: Option<u64>,
}

/// Everything observers need to render the table.
///
/// `multiplier` is the live multiplier while flying and the crash point once crashed; the crash
/// point itself is never exposed before the crash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSnapshot {
    pub round_id: u64,
    pub phase: Phase,
    pub multiplier: Multiplier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub betting_deadline: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flight_started_at: Option<u64>,
    pub participants: Vec<ParticipantView>,
    pub history: Vec<Multiplier>,
}

/// How a single wager ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SettlementStatus {
    /// Escrowed, outcome not yet known.
    Pending,
    /// Paid out `win_amount`.
    Won { win_amount: u64 },
    /// Stake forfeited to the house.
    Lost,
    /// Stake returned without a result (shutdown/restart).
    Refunded,
    /// Payout could not be applied; held for manual reconciliation.
    Frozen { win_amount: u64 },
    /// Stake could not be returned; held for manual reconciliation.
    RefundFrozen { amount: u64 },
}

impl SettlementStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, SettlementStatus::Pending)
    }

    /// Settled on paper but not in the ledger.
    pub fn is_frozen(&self) -> bool {
        matches!(
            self,
            SettlementStatus::Frozen { .. } | SettlementStatus::RefundFrozen { .. }
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    pub participant_id: String,
    pub is_bot: bool,
    pub mode: LedgerMode,
    pub stake: u64,
    #[serde(flatten)]
    pub status: SettlementStatus,
}

/// Persisted once per round after every wager is final.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundOutcome {
    pub round_id: u64,
    pub crash_point: Multiplier,
    pub participants: Vec<ParticipantView>,
    pub settlements: Vec<SettlementRecord>,
}

impl RoundOutcome {
    /// Real-money stakes escrowed into the house bank this round.
    pub fn real_stakes(&self) -> u64 {
        self.settlements
            .iter()
            .filter(|record| !record.is_bot && record.mode == LedgerMode::Real)
            .map(|record| record.stake)
            .sum()
    }

    /// Real-money winnings paid out of the house bank this round.
    pub fn real_winnings(&self) -> u64 {
        self.settlements
            .iter()
            .filter(|record| !record.is_bot && record.mode == LedgerMode::Real)
            .filter_map(|record| match record.status {
                SettlementStatus::Won { win_amount } => Some(win_amount),
                _ => None,
            })
            .sum()
    }

    pub fn frozen(&self) -> impl Iterator<Item = &SettlementRecord> {
        self.settlements
            .iter()
            .filter(|record| record.status.is_frozen())
    }
}

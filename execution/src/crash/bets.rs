use std::collections::HashMap;

use crashline_types::{BetError, GameKind, LedgerMode, Multiplier, ParticipantView, SettlementStatus};

use crate::journal::EscrowTicket;

/// One participant's stake in one round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bet {
    pub participant_id: String,
    pub display_name: String,
    pub is_bot: bool,
    pub stake: u64,
    pub mode: LedgerMode,
    pub auto_cashout: Option<Multiplier>,
    /// Set once when the bet cashes out and never cleared.
    pub cashout_multiplier: Option<Multiplier>,
    pub settlement: SettlementStatus,
}

impl Bet {
    pub fn cashed_out(&self) -> bool {
        self.cashout_multiplier.is_some()
    }

    pub fn win_amount(&self) -> Option<u64> {
        self.cashout_multiplier
            .map(|multiplier| multiplier.apply(self.stake))
    }

    pub fn ticket(&self, round_id: u64) -> EscrowTicket {
        EscrowTicket {
            game: GameKind::Crash,
            round_id,
            participant_id: self.participant_id.clone(),
            mode: self.mode,
            stake: self.stake,
        }
    }

    pub fn view(&self) -> ParticipantView {
        ParticipantView {
            display_name: self.display_name.clone(),
            stake: self.stake,
            is_bot: self.is_bot,
            cashed_out: self.cashed_out(),
            cashout_multiplier: self.cashout_multiplier,
            win_amount: self.win_amount(),
        }
    }
}

/// The authoritative bet list of a single round, in insertion (display) order.
#[derive(Clone, Debug, Default)]
pub struct BetBook {
    bets: Vec<Bet>,
    index: HashMap<String, usize>,
    sealed: bool,
}

impl BetBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.index.contains_key(participant_id)
    }

    pub fn get(&self, participant_id: &str) -> Option<&Bet> {
        self.index.get(participant_id).map(|idx| &self.bets[*idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bet> {
        self.bets.iter()
    }

    pub fn insert(&mut self, bet: Bet) -> Result<(), BetError> {
        if self.sealed {
            return Err(BetError::BettingClosed);
        }
        if self.index.contains_key(&bet.participant_id) {
            return Err(BetError::DuplicateBet);
        }
        self.index.insert(bet.participant_id.clone(), self.bets.len());
        self.bets.push(bet);
        Ok(())
    }

    /// Latch the cash-out. Exactly one call per bet succeeds.
    pub fn latch_cashout(
        &mut self,
        participant_id: &str,
        multiplier: Multiplier,
    ) -> Result<&Bet, BetError> {
        if self.sealed {
            return Err(BetError::AlreadySettled);
        }
        let idx = *self.index.get(participant_id).ok_or(BetError::NoActiveBet)?;
        let bet = &mut self.bets[idx];
        if bet.cashed_out() || bet.settlement.is_final() {
            return Err(BetError::AlreadySettled);
        }
        bet.cashout_multiplier = Some(multiplier);
        Ok(bet)
    }

    /// Record how a bet ended. A final status is never overwritten.
    pub fn settle(&mut self, participant_id: &str, status: SettlementStatus) -> bool {
        if self.sealed {
            return false;
        }
        let Some(idx) = self.index.get(participant_id) else {
            return false;
        };
        let bet = &mut self.bets[*idx];
        if bet.settlement.is_final() {
            return false;
        }
        bet.settlement = status;
        true
    }

    /// Open bets whose auto cash-out is at or below `live`, in display order.
    pub fn due_auto_cashouts(&self, live: Multiplier) -> Vec<(String, Multiplier)> {
        self.bets
            .iter()
            .filter(|bet| !bet.cashed_out() && !bet.settlement.is_final())
            .filter_map(|bet| match bet.auto_cashout {
                Some(target) if target <= live => Some((bet.participant_id.clone(), target)),
                _ => None,
            })
            .collect()
    }

    pub fn pending(&self) -> Vec<String> {
        self.bets
            .iter()
            .filter(|bet| !bet.settlement.is_final())
            .map(|bet| bet.participant_id.clone())
            .collect()
    }

    /// Freeze the list once the round has settled.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn views(&self) -> Vec<ParticipantView> {
        self.bets.iter().map(Bet::view).collect()
    }
}

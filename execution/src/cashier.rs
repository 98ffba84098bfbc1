//! The one money path every game uses.
//!
//! A wager moves through the cashier exactly twice: [`Cashier::escrow`] when it is placed and one
//! of [`Cashier::pay_out`], [`Cashier::forfeit`] or [`Cashier::refund`] when it ends. Each step
//! applies its user mutation and the matching house-bank mutation as a pair; if the second half
//! fails the first is reversed before the error is returned.
//!
//! Settlements are journaled before money moves. An escrow only reads as open once nothing has
//! been paid against it, so restart recovery never applies a settlement twice.

use crashline_types::{BetError, SettlementStatus};
use tracing::{debug, error, info, warn};

use crate::journal::{EscrowJournal, EscrowState, EscrowTicket, JournalEntry};
use crate::ledger::{BalanceLedger, LedgerError};

/// What start-up recovery did with the escrows left behind by the previous process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub refunded: Vec<EscrowTicket>,
    /// Forfeits whose journal entry outlived the process. The stake was already the house's.
    pub closed: Vec<EscrowTicket>,
    /// Frozen settlements and settlements that may or may not have reached the ledger.
    pub unreconciled: Vec<JournalEntry>,
}

pub struct Cashier<L> {
    ledger: L,
    journal: Box<dyn EscrowJournal>,
}

impl<L: BalanceLedger> Cashier<L> {
    pub fn new(ledger: L, journal: impl EscrowJournal + 'static) -> Self {
        Self {
            ledger,
            journal: Box::new(journal),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn journal_entries(&self) -> Vec<JournalEntry> {
        self.journal.entries()
    }

    /// Take the stake off the player's balance and into the house's custody.
    pub fn escrow(&mut self, ticket: &EscrowTicket) -> Result<(), BetError> {
        if ticket.stake == 0 {
            return Err(BetError::InvalidStake);
        }
        self.ledger
            .debit(&ticket.participant_id, ticket.mode, ticket.stake)
            .map_err(bet_error)?;

        if ticket.mode.touches_house_bank() {
            if let Err(err) = self.ledger.adjust_house_bank(ticket.stake as i128) {
                warn!(?err, participant = %ticket.participant_id, "house bank rejected escrow");
                self.undo_debit(ticket, ticket.stake);
                return Err(bet_error(err));
            }
        }

        if let Err(err) = self.journal.open(ticket) {
            warn!(?err, participant = %ticket.participant_id, "escrow journal rejected entry");
            if let Err(undo) = self.transfer_with_retry(ticket, ticket.stake) {
                error!(
                    ?undo,
                    participant = %ticket.participant_id,
                    stake = ticket.stake,
                    "failed to release escrow after journal error"
                );
                self.record(ticket, EscrowState::FrozenRefund { amount: ticket.stake });
            }
            return Err(BetError::LedgerUnavailable(err.to_string()));
        }

        debug!(
            game = ticket.game.as_str(),
            round_id = ticket.round_id,
            participant = %ticket.participant_id,
            mode = ticket.mode.as_str(),
            stake = ticket.stake,
            "stake escrowed"
        );
        Ok(())
    }

    /// Credit winnings. Retried once; a second failure freezes the payout for reconciliation.
    pub fn pay_out(&mut self, ticket: &EscrowTicket, win_amount: u64) -> SettlementStatus {
        let frozen = EscrowState::FrozenWin { win_amount };
        if let Err(err) = self.journal.mark(ticket, EscrowState::Settling { credit: win_amount }) {
            error!(?err, key = %ticket.key(), win_amount, "could not journal payout, freezing it");
            self.record(ticket, frozen);
            return SettlementStatus::Frozen { win_amount };
        }
        match self.transfer_with_retry(ticket, win_amount) {
            Ok(()) => {
                self.close(ticket);
                SettlementStatus::Won { win_amount }
            }
            Err(err) => {
                error!(
                    ?err,
                    game = ticket.game.as_str(),
                    round_id = ticket.round_id,
                    participant = %ticket.participant_id,
                    win_amount,
                    "payout frozen for manual reconciliation"
                );
                self.record(ticket, frozen);
                SettlementStatus::Frozen { win_amount }
            }
        }
    }

    /// The stake already sits with the house; only the journal changes.
    pub fn forfeit(&mut self, ticket: &EscrowTicket) -> SettlementStatus {
        if let Err(err) = self.journal.close(ticket) {
            warn!(?err, key = %ticket.key(), "failed to close forfeited escrow, marking it settled");
            self.record(ticket, EscrowState::Settling { credit: 0 });
        }
        SettlementStatus::Lost
    }

    /// Return the stake untouched.
    pub fn refund(&mut self, ticket: &EscrowTicket) -> SettlementStatus {
        let amount = ticket.stake;
        let frozen = EscrowState::FrozenRefund { amount };
        if let Err(err) = self.journal.mark(ticket, EscrowState::Settling { credit: amount }) {
            error!(?err, key = %ticket.key(), amount, "could not journal refund, freezing it");
            self.record(ticket, frozen);
            return SettlementStatus::RefundFrozen { amount };
        }
        match self.transfer_with_retry(ticket, amount) {
            Ok(()) => {
                self.close(ticket);
                SettlementStatus::Refunded
            }
            Err(err) => {
                error!(
                    ?err,
                    participant = %ticket.participant_id,
                    amount,
                    "refund frozen for manual reconciliation"
                );
                self.record(ticket, frozen);
                SettlementStatus::RefundFrozen { amount }
            }
        }
    }

    /// Refund every escrow a previous process left open. Anything else in the journal is
    /// reported, never paid.
    pub fn recover_open_escrows(&mut self) -> RecoveryReport {
        let mut report = RecoveryReport::default();
        for entry in self.journal.entries() {
            match entry.state {
                EscrowState::Open => match self.refund(&entry.ticket) {
                    SettlementStatus::Refunded => report.refunded.push(entry.ticket),
                    _ => report.unreconciled.push(JournalEntry {
                        state: EscrowState::FrozenRefund {
                            amount: entry.ticket.stake,
                        },
                        ticket: entry.ticket,
                    }),
                },
                EscrowState::Settling { credit: 0 } => match self.journal.close(&entry.ticket) {
                    Ok(()) => report.closed.push(entry.ticket),
                    Err(err) => {
                        warn!(?err, key = %entry.ticket.key(), "failed to close forfeited escrow");
                        report.unreconciled.push(entry);
                    }
                },
                state => {
                    warn!(key = %entry.ticket.key(), ?state, "settlement awaiting reconciliation");
                    report.unreconciled.push(entry);
                }
            }
        }
        if !report.refunded.is_empty() {
            info!(refunded = report.refunded.len(), "refunded escrows from interrupted rounds");
        }
        report
    }

    fn transfer_with_retry(&mut self, ticket: &EscrowTicket, amount: u64) -> Result<(), LedgerError> {
        match self.transfer_out(ticket, amount) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(?err, participant = %ticket.participant_id, amount, "ledger transfer failed, retrying once");
                self.transfer_out(ticket, amount)
            }
        }
    }

    /// Credit the player and debit the house bank as one unit.
    fn transfer_out(&mut self, ticket: &EscrowTicket, amount: u64) -> Result<(), LedgerError> {
        self.ledger
            .credit(&ticket.participant_id, ticket.mode, amount)?;
        if ticket.mode.touches_house_bank() {
            if let Err(err) = self.ledger.adjust_house_bank(-(amount as i128)) {
                self.undo_credit(ticket, amount);
                return Err(err);
            }
        }
        Ok(())
    }

    fn undo_debit(&mut self, ticket: &EscrowTicket, amount: u64) {
        if let Err(err) = self
            .ledger
            .credit(&ticket.participant_id, ticket.mode, amount)
        {
            error!(?err, participant = %ticket.participant_id, amount, "failed to reverse debit");
        }
    }

    fn undo_credit(&mut self, ticket: &EscrowTicket, amount: u64) {
        if let Err(err) = self
            .ledger
            .debit(&ticket.participant_id, ticket.mode, amount)
        {
            error!(?err, participant = %ticket.participant_id, amount, "failed to reverse credit");
        }
    }

    /// A failed close leaves the entry `Settling`, which recovery reports instead of refunding.
    fn close(&mut self, ticket: &EscrowTicket) {
        if let Err(err) = self.journal.close(ticket) {
            error!(?err, key = %ticket.key(), "failed to close escrow journal entry");
        }
    }

    fn record(&mut self, ticket: &EscrowTicket, state: EscrowState) {
        if let Err(err) = self.journal.mark(ticket, state) {
            error!(?err, key = %ticket.key(), ?state, "failed to journal settlement state");
        }
    }
}

pub(crate) fn bet_error(err: LedgerError) -> BetError {
    match err {
        LedgerError::InsufficientFunds => BetError::InsufficientFunds,
        LedgerError::Unavailable(reason) => BetError::LedgerUnavailable(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::MemoryJournal;
    use crate::ledger::MemoryLedger;
    use crate::mocks::{FlakyJournal, FlakyLedger};
    use crashline_types::{GameKind, LedgerMode};
    use std::sync::atomic::Ordering;

    fn ticket(mode: LedgerMode, stake: u64) -> EscrowTicket {
        EscrowTicket {
            game: GameKind::Crash,
            round_id: 1,
            participant_id: "alice".to_string(),
            mode,
            stake,
        }
    }

    fn funded(mode: LedgerMode, amount: u64) -> MemoryLedger {
        let mut ledger = MemoryLedger::new();
        ledger.deposit("alice", mode, amount);
        ledger
    }

    #[test]
    fn test_real_escrow_moves_stake_into_bank() {
        let mut cashier = Cashier::new(funded(LedgerMode::Real, 5_000), MemoryJournal::new());
        cashier.escrow(&ticket(LedgerMode::Real, 1_000)).unwrap();

        assert_eq!(cashier.ledger().account("alice").real, 4_000);
        assert_eq!(cashier.ledger().house_bank(), 1_000);
        assert_eq!(cashier.journal_entries().len(), 1);
    }

    #[test]
    fn test_demo_escrow_leaves_bank_alone() {
        let mut cashier = Cashier::new(funded(LedgerMode::Demo, 5_000), MemoryJournal::new());
        let demo = ticket(LedgerMode::Demo, 1_000);
        cashier.escrow(&demo).unwrap();
        assert_eq!(cashier.pay_out(&demo, 3_000), SettlementStatus::Won { win_amount: 3_000 });

        assert_eq!(cashier.ledger().account("alice").demo, 7_000);
        assert_eq!(cashier.ledger().house_bank(), 0);
    }

    #[test]
    fn test_insufficient_funds_leaves_no_trace() {
        let mut cashier = Cashier::new(funded(LedgerMode::Real, 500), MemoryJournal::new());
        assert_eq!(
            cashier.escrow(&ticket(LedgerMode::Real, 1_000)),
            Err(BetError::InsufficientFunds)
        );
        assert_eq!(cashier.ledger().account("alice").real, 500);
        assert_eq!(cashier.ledger().house_bank(), 0);
        assert!(cashier.journal_entries().is_empty());
    }

    #[test]
    fn test_bank_failure_reverses_escrow_debit() {
        let mut ledger = FlakyLedger::new(funded(LedgerMode::Real, 5_000));
        ledger.fail_bank_adjustments = 1;
        let mut cashier = Cashier::new(ledger, MemoryJournal::new());

        let err = cashier.escrow(&ticket(LedgerMode::Real, 1_000)).unwrap_err();
        assert_eq!(err.code(), "LEDGER_UNAVAILABLE");
        assert_eq!(cashier.ledger().inner.account("alice").real, 5_000);
        assert_eq!(cashier.ledger().inner.house_bank(), 0);
        assert!(cashier.journal_entries().is_empty());
    }

    #[test]
    fn test_payout_is_retried_once() {
        let mut cashier = Cashier::new(
            FlakyLedger::new(funded(LedgerMode::Real, 5_000)),
            MemoryJournal::new(),
        );
        let stake = ticket(LedgerMode::Real, 1_000);
        cashier.escrow(&stake).unwrap();
        cashier.ledger_mut().fail_credits = 1;

        assert_eq!(
            cashier.pay_out(&stake, 2_500),
            SettlementStatus::Won { win_amount: 2_500 }
        );
        assert_eq!(cashier.ledger().inner.account("alice").real, 6_500);
        assert_eq!(cashier.ledger().inner.house_bank(), -1_500);
        assert!(cashier.journal_entries().is_empty());
    }

    #[test]
    fn test_payout_freezes_after_second_failure() {
        let mut cashier = Cashier::new(
            FlakyLedger::new(funded(LedgerMode::Real, 5_000)),
            MemoryJournal::new(),
        );
        let stake = ticket(LedgerMode::Real, 1_000);
        cashier.escrow(&stake).unwrap();
        cashier.ledger_mut().fail_credits = 2;

        assert_eq!(
            cashier.pay_out(&stake, 2_500),
            SettlementStatus::Frozen { win_amount: 2_500 }
        );
        // Nothing paid, nothing lost: the stake is still with the house and the win is on record.
        assert_eq!(cashier.ledger().inner.account("alice").real, 4_000);
        assert_eq!(cashier.ledger().inner.house_bank(), 1_000);
        let entries = cashier.journal_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].state, EscrowState::FrozenWin { win_amount: 2_500 });
    }

    #[test]
    fn test_half_applied_payout_is_rolled_back() {
        let mut cashier = Cashier::new(
            FlakyLedger::new(funded(LedgerMode::Real, 5_000)),
            MemoryJournal::new(),
        );
        let stake = ticket(LedgerMode::Real, 1_000);
        cashier.escrow(&stake).unwrap();
        cashier.ledger_mut().fail_bank_adjustments = 2;

        assert!(matches!(
            cashier.pay_out(&stake, 2_000),
            SettlementStatus::Frozen { .. }
        ));
        assert_eq!(cashier.ledger().inner.account("alice").real, 4_000);
        assert_eq!(cashier.ledger().inner.house_bank(), 1_000);
    }

    #[test]
    fn test_forfeit_keeps_stake_with_house() {
        let mut cashier = Cashier::new(funded(LedgerMode::Real, 500), MemoryJournal::new());
        let stake = ticket(LedgerMode::Real, 500);
        cashier.escrow(&stake).unwrap();
        assert_eq!(cashier.forfeit(&stake), SettlementStatus::Lost);

        assert_eq!(cashier.ledger().account("alice").real, 0);
        assert_eq!(cashier.ledger().house_bank(), 500);
        assert!(cashier.journal_entries().is_empty());
    }

    #[test]
    fn test_recover_refunds_open_and_reports_frozen() {
        let mut journal = MemoryJournal::new();
        let open = ticket(LedgerMode::Real, 700);
        let frozen = EscrowTicket {
            participant_id: "bob".to_string(),
            ..ticket(LedgerMode::Real, 300)
        };
        journal.open(&open).unwrap();
        journal
            .mark(&frozen, EscrowState::FrozenWin { win_amount: 900 })
            .unwrap();

        // The previous process already moved both stakes into the bank.
        let mut ledger = MemoryLedger::with_house_bank(1_000);
        ledger.deposit("alice", LedgerMode::Real, 0);
        let mut cashier = Cashier::new(ledger, journal);

        let report = cashier.recover_open_escrows();
        assert_eq!(report.refunded, vec![open]);
        assert_eq!(report.unreconciled.len(), 1);
        assert_eq!(report.unreconciled[0].ticket.participant_id, "bob");

        assert_eq!(cashier.ledger().account("alice").real, 700);
        assert_eq!(cashier.ledger().house_bank(), 300);
        assert_eq!(cashier.journal_entries().len(), 1);

        // Running recovery again must not refund twice.
        let again = cashier.recover_open_escrows();
        assert!(again.refunded.is_empty());
        assert_eq!(cashier.ledger().account("alice").real, 700);
    }

    #[test]
    fn test_paid_win_with_stuck_journal_is_not_refunded_on_restart() {
        let journal = FlakyJournal::default();
        let failures = journal.failures.clone();
        let mut cashier = Cashier::new(funded(LedgerMode::Real, 1_000), journal);
        let stake = ticket(LedgerMode::Real, 1_000);
        cashier.escrow(&stake).unwrap();

        failures.closes.store(1, Ordering::SeqCst);
        assert_eq!(
            cashier.pay_out(&stake, 2_500),
            SettlementStatus::Won { win_amount: 2_500 }
        );
        assert_eq!(cashier.ledger().account("alice").real, 2_500);
        assert_eq!(cashier.ledger().house_bank(), -1_500);

        let report = cashier.recover_open_escrows();
        assert!(report.refunded.is_empty());
        assert_eq!(report.unreconciled.len(), 1);
        assert_eq!(
            report.unreconciled[0].state,
            EscrowState::Settling { credit: 2_500 }
        );
        assert_eq!(cashier.ledger().account("alice").real, 2_500);
        assert_eq!(cashier.ledger().house_bank(), -1_500);
    }

    #[test]
    fn test_forfeit_with_stuck_journal_is_not_refunded_on_restart() {
        let journal = FlakyJournal::default();
        let failures = journal.failures.clone();
        let mut cashier = Cashier::new(funded(LedgerMode::Real, 1_000), journal);
        let stake = ticket(LedgerMode::Real, 1_000);
        cashier.escrow(&stake).unwrap();

        failures.closes.store(1, Ordering::SeqCst);
        assert_eq!(cashier.forfeit(&stake), SettlementStatus::Lost);

        let report = cashier.recover_open_escrows();
        assert!(report.refunded.is_empty());
        assert_eq!(report.closed, vec![stake]);
        assert!(cashier.journal_entries().is_empty());
        assert_eq!(cashier.ledger().account("alice").real, 0);
        assert_eq!(cashier.ledger().house_bank(), 1_000);
    }

    #[test]
    fn test_unjournaled_payout_moves_no_money() {
        let journal = FlakyJournal::default();
        let failures = journal.failures.clone();
        let mut cashier = Cashier::new(funded(LedgerMode::Real, 1_000), journal);
        let stake = ticket(LedgerMode::Real, 1_000);
        cashier.escrow(&stake).unwrap();

        failures.marks.store(1, Ordering::SeqCst);
        assert_eq!(
            cashier.pay_out(&stake, 2_500),
            SettlementStatus::Frozen { win_amount: 2_500 }
        );
        assert_eq!(cashier.ledger().account("alice").real, 0);
        assert_eq!(cashier.ledger().house_bank(), 1_000);
        assert_eq!(
            cashier.journal_entries()[0].state,
            EscrowState::FrozenWin { win_amount: 2_500 }
        );
    }

    #[test]
    fn test_failed_refund_is_frozen_as_a_refund() {
        let mut cashier = Cashier::new(
            FlakyLedger::new(funded(LedgerMode::Real, 1_000)),
            MemoryJournal::new(),
        );
        let stake = ticket(LedgerMode::Real, 1_000);
        cashier.escrow(&stake).unwrap();
        cashier.ledger_mut().fail_credits = 2;

        assert_eq!(
            cashier.refund(&stake),
            SettlementStatus::RefundFrozen { amount: 1_000 }
        );
        assert_eq!(
            cashier.journal_entries()[0].state,
            EscrowState::FrozenRefund { amount: 1_000 }
        );
        let report = cashier.recover_open_escrows();
        assert!(report.refunded.is_empty());
        assert_eq!(report.unreconciled.len(), 1);
    }

    #[test]
    fn test_unreleased_escrow_is_journaled_as_frozen_refund() {
        let journal = FlakyJournal::default();
        journal.failures.opens.store(1, Ordering::SeqCst);
        let mut ledger = FlakyLedger::new(funded(LedgerMode::Real, 1_000));
        ledger.fail_credits = 2;
        let mut cashier = Cashier::new(ledger, journal);
        let stake = ticket(LedgerMode::Real, 1_000);

        let err = cashier.escrow(&stake).unwrap_err();
        assert_eq!(err.code(), "LEDGER_UNAVAILABLE");
        assert_eq!(cashier.ledger().inner.account("alice").real, 0);
        assert_eq!(
            cashier.journal_entries(),
            vec![JournalEntry {
                ticket: stake,
                state: EscrowState::FrozenRefund { amount: 1_000 },
            }]
        );
    }
}

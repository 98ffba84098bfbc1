//! Test doubles for the external collaborators.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crashline_types::{LedgerMode, Multiplier};

use crate::crash::CrashPointSource;
use crate::journal::{EscrowJournal, EscrowState, EscrowTicket, JournalEntry, JournalError, MemoryJournal};
use crate::ledger::{BalanceLedger, LedgerError, MemoryLedger};

/// Wraps a [`MemoryLedger`] and fails the next N calls of each kind.
#[derive(Clone, Debug, Default)]
pub struct FlakyLedger {
    pub inner: MemoryLedger,
    pub fail_debits: usize,
    pub fail_credits: usize,
    pub fail_bank_adjustments: usize,
}

impl FlakyLedger {
    pub fn new(inner: MemoryLedger) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }
}

fn take_failure(budget: &mut usize) -> Result<(), LedgerError> {
    if *budget > 0 {
        *budget -= 1;
        return Err(LedgerError::Unavailable("injected failure".to_string()));
    }
    Ok(())
}

impl BalanceLedger for FlakyLedger {
    fn balance(&self, user: &str, mode: LedgerMode) -> Result<u64, LedgerError> {
        self.inner.balance(user, mode)
    }

    fn debit(&mut self, user: &str, mode: LedgerMode, amount: u64) -> Result<(), LedgerError> {
        take_failure(&mut self.fail_debits)?;
        self.inner.debit(user, mode, amount)
    }

    fn credit(&mut self, user: &str, mode: LedgerMode, amount: u64) -> Result<(), LedgerError> {
        take_failure(&mut self.fail_credits)?;
        self.inner.credit(user, mode, amount)
    }

    fn adjust_house_bank(&mut self, delta: i128) -> Result<(), LedgerError> {
        take_failure(&mut self.fail_bank_adjustments)?;
        self.inner.adjust_house_bank(delta)
    }
}

/// Failure budgets for [`FlakyJournal`], shared so a test can arm them after the journal has been
/// handed to a cashier.
#[derive(Debug, Default)]
pub struct JournalFailures {
    pub opens: AtomicUsize,
    pub marks: AtomicUsize,
    pub closes: AtomicUsize,
}

fn take_journal_failure(budget: &AtomicUsize) -> Result<(), JournalError> {
    let armed = budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok();
    if armed {
        return Err(JournalError::Io(std::io::Error::other("injected failure")));
    }
    Ok(())
}

/// Wraps a [`MemoryJournal`] and fails the next N writes of each kind without changing it.
#[derive(Clone, Debug, Default)]
pub struct FlakyJournal {
    pub inner: MemoryJournal,
    pub failures: Arc<JournalFailures>,
}

impl EscrowJournal for FlakyJournal {
    fn open(&mut self, ticket: &EscrowTicket) -> Result<(), JournalError> {
        take_journal_failure(&self.failures.opens)?;
        self.inner.open(ticket)
    }

    fn mark(&mut self, ticket: &EscrowTicket, state: EscrowState) -> Result<(), JournalError> {
        take_journal_failure(&self.failures.marks)?;
        self.inner.mark(ticket, state)
    }

    fn close(&mut self, ticket: &EscrowTicket) -> Result<(), JournalError> {
        take_journal_failure(&self.failures.closes)?;
        self.inner.close(ticket)
    }

    fn entries(&self) -> Vec<JournalEntry> {
        self.inner.entries()
    }
}

/// Replays a fixed list of crash points, then repeats the last one.
#[derive(Clone, Debug)]
pub struct FixedCrashPoints {
    queue: VecDeque<Multiplier>,
    last: Multiplier,
}

impl FixedCrashPoints {
    pub fn new(points: impl IntoIterator<Item = u32>) -> Self {
        let queue: VecDeque<Multiplier> = points
            .into_iter()
            .map(Multiplier::from_hundredths)
            .collect();
        let last = queue.back().copied().unwrap_or(Multiplier::ONE);
        Self { queue, last }
    }
}

impl CrashPointSource for FixedCrashPoints {
    fn draw(&mut self) -> Multiplier {
        match self.queue.pop_front() {
            Some(point) => {
                self.last = point;
                point
            }
            None => self.last,
        }
    }
}

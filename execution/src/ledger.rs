//! Balance ledger collaborator.
//!
//! [`BalanceLedger`] is the boundary to whatever store actually holds player money. Every game
//! talks to it through [`crate::Cashier`], which pairs user and house-bank mutations so that
//! `user_delta + bank_delta == 0` for each real-money event.

use std::collections::HashMap;

use crashline_types::LedgerMode;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

pub trait BalanceLedger {
    fn balance(&self, user: &str, mode: LedgerMode) -> Result<u64, LedgerError>;

    /// Remove `amount` from the user's balance. Never takes a balance below zero.
    fn debit(&mut self, user: &str, mode: LedgerMode, amount: u64) -> Result<(), LedgerError>;

    fn credit(&mut self, user: &str, mode: LedgerMode, amount: u64) -> Result<(), LedgerError>;

    /// Signed adjustment of the house bank (positive when the house gains).
    fn adjust_house_bank(&mut self, delta: i128) -> Result<(), LedgerError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Account {
    pub real: u64,
    pub demo: u64,
}

impl Account {
    fn slot(&mut self, mode: LedgerMode) -> &mut u64 {
        match mode {
            LedgerMode::Real => &mut self.real,
            LedgerMode::Demo => &mut self.demo,
        }
    }

    pub fn get(&self, mode: LedgerMode) -> u64 {
        match mode {
            LedgerMode::Real => self.real,
            LedgerMode::Demo => self.demo,
        }
    }
}

/// In-process ledger used by the table service and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryLedger {
    accounts: HashMap<String, Account>,
    house_bank: i128,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_house_bank(house_bank: i128) -> Self {
        Self {
            accounts: HashMap::new(),
            house_bank,
        }
    }

    /// Fund an account from outside the game (deposit, demo grant).
    pub fn deposit(&mut self, user: &str, mode: LedgerMode, amount: u64) {
        let slot = self.accounts.entry(user.to_string()).or_default().slot(mode);
        *slot = slot.saturating_add(amount);
    }

    pub fn account(&self, user: &str) -> Account {
        self.accounts.get(user).copied().unwrap_or_default()
    }

    pub fn has_account(&self, user: &str) -> bool {
        self.accounts.contains_key(user)
    }

    pub fn house_bank(&self) -> i128 {
        self.house_bank
    }
}

impl BalanceLedger for MemoryLedger {
    fn balance(&self, user: &str, mode: LedgerMode) -> Result<u64, LedgerError> {
        Ok(self.account(user).get(mode))
    }

    fn debit(&mut self, user: &str, mode: LedgerMode, amount: u64) -> Result<(), LedgerError> {
        let Some(account) = self.accounts.get_mut(user) else {
            return Err(LedgerError::InsufficientFunds);
        };
        let slot = account.slot(mode);
        if *slot < amount {
            return Err(LedgerError::InsufficientFunds);
        }
        *slot -= amount;
        Ok(())
    }

    fn credit(&mut self, user: &str, mode: LedgerMode, amount: u64) -> Result<(), LedgerError> {
        let slot = self.accounts.entry(user.to_string()).or_default().slot(mode);
        *slot = slot.saturating_add(amount);
        Ok(())
    }

    fn adjust_house_bank(&mut self, delta: i128) -> Result<(), LedgerError> {
        self.house_bank = self.house_bank.saturating_add(delta);
        Ok(())
    }
}

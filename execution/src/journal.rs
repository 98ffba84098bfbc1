//! Escrow journal.
//!
//! Every stake held in escrow is written here before the bet is accepted and removed once the
//! wager settles. A settlement is marked [`EscrowState::Settling`] before any money moves, so an
//! entry that is still [`EscrowState::Open`] when the process starts belonged to a round that never
//! finished and is safe to refund through [`crate::Cashier::recover_open_escrows`]. Anything else
//! stays in the journal until someone reconciles it by hand.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crashline_types::{GameKind, LedgerMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal io: {0}")]
    Io(#[from] io::Error),
    #[error("journal encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A stake held by the house on behalf of one participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowTicket {
    pub game: GameKind,
    /// Crash round id or mines game id.
    pub round_id: u64,
    pub participant_id: String,
    pub mode: LedgerMode,
    pub stake: u64,
}

impl EscrowTicket {
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.game.as_str(),
            self.round_id,
            self.participant_id
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EscrowState {
    /// Stake held, no settlement started.
    #[default]
    Open,
    /// A settlement crediting `credit` has started. Whether it reached the ledger is unknown.
    Settling { credit: u64 },
    /// Winnings that could not be credited.
    FrozenWin { win_amount: u64 },
    /// A stake that could not be returned.
    FrozenRefund { amount: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub ticket: EscrowTicket,
    #[serde(flatten)]
    pub state: EscrowState,
}

pub trait EscrowJournal: Send {
    fn open(&mut self, ticket: &EscrowTicket) -> Result<(), JournalError>;
    /// Move an entry to `state`, creating it if it is missing.
    fn mark(&mut self, ticket: &EscrowTicket, state: EscrowState) -> Result<(), JournalError>;
    fn close(&mut self, ticket: &EscrowTicket) -> Result<(), JournalError>;
    fn entries(&self) -> Vec<JournalEntry>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryJournal {
    entries: BTreeMap<String, JournalEntry>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EscrowJournal for MemoryJournal {
    fn open(&mut self, ticket: &EscrowTicket) -> Result<(), JournalError> {
        self.mark(ticket, EscrowState::Open)
    }

    fn mark(&mut self, ticket: &EscrowTicket, state: EscrowState) -> Result<(), JournalError> {
        self.entries.insert(
            ticket.key(),
            JournalEntry {
                ticket: ticket.clone(),
                state,
            },
        );
        Ok(())
    }

    fn close(&mut self, ticket: &EscrowTicket) -> Result<(), JournalError> {
        self.entries.remove(&ticket.key());
        Ok(())
    }

    fn entries(&self) -> Vec<JournalEntry> {
        self.entries.values().cloned().collect()
    }
}

/// JSON file journal. The whole map is rewritten (temp file + rename) on every change, which is
/// fine for the handful of escrows a single table holds at once.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    inner: MemoryJournal,
}

impl FileJournal {
    /// Open (or create) the journal at `path`, loading any entries left by a previous process.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let mut inner = MemoryJournal::new();
        match fs::read(&path) {
            Ok(bytes) if !bytes.is_empty() => {
                let entries: Vec<JournalEntry> = serde_json::from_slice(&bytes)?;
                for entry in entries {
                    inner.entries.insert(entry.ticket.key(), entry);
                }
            }
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        Ok(Self { path, inner })
    }

    fn flush(&self) -> Result<(), JournalError> {
        let bytes = serde_json::to_vec_pretty(&self.inner.entries())?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn apply(
        &mut self,
        change: impl FnOnce(&mut MemoryJournal) -> Result<(), JournalError>,
    ) -> Result<(), JournalError> {
        let previous = self.inner.clone();
        change(&mut self.inner)?;
        if let Err(err) = self.flush() {
            self.inner = previous;
            return Err(err);
        }
        Ok(())
    }
}

impl EscrowJournal for FileJournal {
    fn open(&mut self, ticket: &EscrowTicket) -> Result<(), JournalError> {
        self.apply(|inner| inner.open(ticket))
    }

    fn mark(&mut self, ticket: &EscrowTicket, state: EscrowState) -> Result<(), JournalError> {
        self.apply(|inner| inner.mark(ticket, state))
    }

    fn close(&mut self, ticket: &EscrowTicket) -> Result<(), JournalError> {
        self.apply(|inner| inner.close(ticket))
    }

    fn entries(&self) -> Vec<JournalEntry> {
        self.inner.entries()
    }
}

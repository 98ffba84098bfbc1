//! Shared domain types for crashline.
//!
//! Everything here is plain data: the execution layer mutates it and the table service
//! serializes it onto the wire.

pub mod casino;

pub use casino::{
    BetError, CashoutReceipt, GameKind, LedgerMode, MinesView, Multiplier, ParticipantView, Phase,
    RevealOutcome, RoundOutcome, RoundSnapshot, SettlementRecord, SettlementStatus,
};

//! Everything the service mutates, owned in one place so a single lock covers it.

use std::collections::HashMap;

use crashline_execution::crash::{BotRoster, CrashPointSource, TieredCrashPoints};
use crashline_execution::{
    BalanceLedger, BetRequest, Cashier, CrashEngine, EngineEvent, EscrowJournal, MemoryLedger,
    MinesCashout, MinesTable, RecoveryReport, TracingOutcomeSink,
};
use crashline_types::casino::MAX_DISPLAY_NAME_LENGTH;
use crashline_types::{
    BetError, CashoutReceipt, LedgerMode, MinesView, Multiplier, ParticipantView, RevealOutcome,
    RoundOutcome, RoundSnapshot, SettlementStatus,
};
use tracing::{info, warn};

use crate::config::CrashTableConfig;
use crate::messages::{BalanceMessage, OutboundEvent, RoundResultMessage};

pub struct Casino {
    engine: CrashEngine,
    mines: MinesTable,
    cashier: Cashier<MemoryLedger>,
    names: HashMap<String, String>,
    demo_balance: u64,
    real_balance: u64,
}

impl Casino {
    pub fn new(config: &CrashTableConfig, journal: impl EscrowJournal + 'static) -> Self {
        match config.crash_seed {
            Some(seed) => Self::with_crash_points(config, TieredCrashPoints::seeded(seed), journal),
            None => Self::with_crash_points(config, TieredCrashPoints::from_entropy(), journal),
        }
    }

    pub fn with_crash_points(
        config: &CrashTableConfig,
        crash_points: impl CrashPointSource + 'static,
        journal: impl EscrowJournal + 'static,
    ) -> Self {
        let bots = BotRoster::generate(
            config.bot_count,
            config.bot_stake_min,
            config.bot_stake_max,
            config.bot_seed,
        );
        let engine = CrashEngine::new(
            config.engine_config(),
            crash_points,
            bots,
            TracingOutcomeSink,
        );
        let mines = match config.mines_seed {
            Some(seed) => MinesTable::seeded(config.mines_config(), seed),
            None => MinesTable::from_entropy(config.mines_config()),
        };
        Self {
            engine,
            mines,
            cashier: Cashier::new(MemoryLedger::new(), journal),
            names: HashMap::new(),
            demo_balance: config.demo_balance,
            real_balance: config.real_balance,
        }
    }

    /// Refund escrows left open by a previous process.
    pub fn recover(&mut self) -> RecoveryReport {
        self.cashier.recover_open_escrows()
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        self.engine.snapshot()
    }

    pub fn tick(&mut self, now_ms: u64) -> Vec<OutboundEvent> {
        let events = self.engine.tick(&mut self.cashier, now_ms);
        let mut outbound = Vec::with_capacity(events.len());
        for event in events {
            match event {
                EngineEvent::Snapshot(payload) => outbound.push(OutboundEvent::State {
                    player_id: None,
                    payload,
                }),
                EngineEvent::RoundSettled(outcome) => outbound.extend(self.round_results(&outcome)),
            }
        }
        outbound
    }

    /// Register a player. The first join grants the configured starting balances.
    pub fn join(
        &mut self,
        player_id: &str,
        display_name: Option<String>,
    ) -> Result<BalanceMessage, BetError> {
        if let Some(name) = display_name.filter(|name| !name.trim().is_empty()) {
            let len = name.chars().count();
            if len > MAX_DISPLAY_NAME_LENGTH {
                return Err(BetError::DisplayNameTooLong {
                    len,
                    max: MAX_DISPLAY_NAME_LENGTH,
                });
            }
            self.names.insert(player_id.to_string(), name);
        }

        let ledger = self.cashier.ledger_mut();
        if !ledger.has_account(player_id) {
            ledger.deposit(player_id, LedgerMode::Demo, self.demo_balance);
            ledger.deposit(player_id, LedgerMode::Real, self.real_balance);
            info!(player = %player_id, demo = self.demo_balance, real = self.real_balance, "player joined");
        }
        Ok(self.balance(player_id))
    }

    pub fn balance(&self, player_id: &str) -> BalanceMessage {
        let account = self.cashier.ledger().account(player_id);
        BalanceMessage {
            real: account.real,
            demo: account.demo,
        }
    }

    pub fn bet(
        &mut self,
        player_id: &str,
        amount: u64,
        mode: LedgerMode,
        auto_cashout: Option<Multiplier>,
        now_ms: u64,
    ) -> Result<ParticipantView, BetError> {
        let request = BetRequest {
            participant_id: player_id.to_string(),
            display_name: self.names.get(player_id).cloned(),
            stake: amount,
            mode,
            auto_cashout,
        };
        self.engine.place_bet(&mut self.cashier, request, now_ms)
    }

    pub fn cash_out(&mut self, player_id: &str, now_ms: u64) -> Result<CashoutReceipt, BetError> {
        self.engine.cash_out(&mut self.cashier, player_id, now_ms)
    }

    pub fn mines_start(
        &mut self,
        player_id: &str,
        amount: u64,
        mode: LedgerMode,
        mine_count: u8,
        now_ms: u64,
    ) -> Result<MinesView, BetError> {
        self.mines
            .start(&mut self.cashier, player_id, amount, mode, mine_count, now_ms)
    }

    pub fn mines_view(&self, player_id: &str) -> Result<MinesView, BetError> {
        self.mines.view(player_id).ok_or(BetError::NoActiveBet)
    }

    pub fn mines_reveal(&mut self, player_id: &str, cell: u8) -> Result<RevealOutcome, BetError> {
        self.mines.reveal(&mut self.cashier, player_id, cell)
    }

    pub fn mines_cash_out(&mut self, player_id: &str) -> Result<MinesCashout, BetError> {
        self.mines.cash_out(&mut self.cashier, player_id)
    }

    /// Refund the in-flight round and every open mines game. Returns `(crash, mines)` refunds.
    pub fn shutdown(&mut self) -> (usize, usize) {
        let crash = self
            .engine
            .abort_round(&mut self.cashier)
            .iter()
            .filter(|record| !record.is_bot)
            .filter(|record| record.status == SettlementStatus::Refunded)
            .count();
        let mines = self.mines.abort_all(&mut self.cashier);
        let open = self.cashier.journal_entries().len();
        if open > 0 {
            warn!(open, "escrow journal not empty after shutdown");
        }
        (crash, mines)
    }

    fn round_results(&self, outcome: &RoundOutcome) -> Vec<OutboundEvent> {
        outcome
            .settlements
            .iter()
            .filter(|record| !record.is_bot)
            .map(|record| {
                let balance = match self.cashier.ledger().balance(&record.participant_id, record.mode) {
                    Ok(balance) => balance,
                    Err(err) => {
                        warn!(?err, player = %record.participant_id, "balance lookup failed");
                        0
                    }
                };
                OutboundEvent::RoundResult {
                    player_id: record.participant_id.clone(),
                    payload: RoundResultMessage {
                        round_id: outcome.round_id,
                        crash_point: outcome.crash_point,
                        stake: record.stake,
                        mode: record.mode,
                        status: record.status,
                        balance,
                    },
                }
            })
            .collect()
    }
}

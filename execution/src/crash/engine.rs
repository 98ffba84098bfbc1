//! Crash round engine.
//!
//! [`CrashEngine`] is the only thing that mutates round state. The host calls [`CrashEngine::tick`]
//! on a fixed period and forwards player requests to [`CrashEngine::place_bet`] and
//! [`CrashEngine::cash_out`]; all three take `now_ms` from the caller and a [`Cashier`] for money
//! movement. The host is expected to hold one lock around the engine and the cashier so that a
//! request and its ledger mutations are applied as a unit.
//!
//! Per flying tick the order is fixed: refresh the multiplier, run auto cash-outs, then check for
//! the crash. A bot whose target equals the crash point therefore wins.

use std::collections::VecDeque;

use crashline_types::casino::{
    HISTORY_CAPACITY, MAX_CRASH_POINT_HUNDREDTHS, MAX_DISPLAY_NAME_LENGTH,
};
use crashline_types::{
    BetError, CashoutReceipt, LedgerMode, Multiplier, ParticipantView, Phase, RoundOutcome,
    RoundSnapshot, SettlementRecord, SettlementStatus,
};
use tracing::{debug, info, warn};

use super::bets::{Bet, BetBook};
use super::bots::BotRoster;
use super::clock::{MultiplierClock, DEFAULT_GROWTH_PER_SECOND};
use super::crash_point::{sanitize_crash_point, CrashPointSource};
use crate::cashier::Cashier;
use crate::ledger::BalanceLedger;
use crate::outcome::OutcomeSink;
use crate::round_scheduler::{PhaseConfig, RoundScheduler};

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub phases: PhaseConfig,
    pub growth_per_second: f64,
    /// Smallest accepted stake in minor units.
    pub min_stake: u64,
    /// Largest accepted stake in minor units.
    pub max_stake: u64,
    pub history_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            phases: PhaseConfig::default(),
            growth_per_second: DEFAULT_GROWTH_PER_SECOND,
            min_stake: 10,
            max_stake: 10_000_000,
            history_capacity: HISTORY_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), &'static str> {
        self.phases.validate()?;
        if !self.growth_per_second.is_finite() || self.growth_per_second <= 0.0 {
            return Err("growth_per_second must be a positive number");
        }
        if self.reachable_multiplier() < Multiplier::from_hundredths(MAX_CRASH_POINT_HUNDREDTHS) {
            return Err("max_flight_ms is too short to reach the highest crash point");
        }
        if self.min_stake == 0 {
            return Err("min_stake must be greater than zero");
        }
        if self.min_stake > self.max_stake {
            return Err("min_stake must not exceed max_stake");
        }
        if self.history_capacity == 0 {
            return Err("history_capacity must be greater than zero");
        }
        Ok(())
    }

    /// Highest multiplier the clock shows before the flight bound ends a round.
    pub fn reachable_multiplier(&self) -> Multiplier {
        MultiplierClock::new(self.growth_per_second).at(self.phases.max_flight_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BetRequest {
    pub participant_id: String,
    pub display_name: Option<String>,
    pub stake: u64,
    pub mode: LedgerMode,
    pub auto_cashout: Option<Multiplier>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// Current table state; emitted on every flying tick and every phase change.
    Snapshot(RoundSnapshot),
    /// The round crashed and every wager is final.
    RoundSettled(RoundOutcome),
}

pub struct CrashEngine {
    config: EngineConfig,
    scheduler: RoundScheduler,
    clock: MultiplierClock,
    crash_points: Box<dyn CrashPointSource>,
    bots: BotRoster,
    outcomes: Box<dyn OutcomeSink>,

    round_id: u64,
    phase: Phase,
    phase_ends_at_ms: u64,
    flight_started_at_ms: Option<u64>,
    crash_point: Multiplier,
    current: Multiplier,
    book: BetBook,
    history: VecDeque<Multiplier>,
}

impl CrashEngine {
    pub fn new(
        config: EngineConfig,
        crash_points: impl CrashPointSource + 'static,
        bots: BotRoster,
        outcomes: impl OutcomeSink + 'static,
    ) -> Self {
        let scheduler = RoundScheduler::new(config.phases);
        let clock = MultiplierClock::new(config.growth_per_second);
        let history = VecDeque::with_capacity(config.history_capacity);
        Self {
            config,
            scheduler,
            clock,
            crash_points: Box::new(crash_points),
            bots,
            outcomes: Box::new(outcomes),
            round_id: 0,
            phase: Phase::Waiting,
            phase_ends_at_ms: 0,
            flight_started_at_ms: None,
            crash_point: Multiplier::ONE,
            current: Multiplier::ONE,
            book: BetBook::new(),
            history,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round_id(&self) -> u64 {
        self.round_id
    }

    pub fn current_multiplier(&self) -> Multiplier {
        self.current
    }

    pub fn bets(&self) -> &BetBook {
        &self.book
    }

    pub fn bet(&self, participant_id: &str) -> Option<&Bet> {
        self.book.get(participant_id)
    }

    pub fn history(&self) -> impl Iterator<Item = &Multiplier> {
        self.history.iter()
    }

    #[cfg(test)]
    pub(crate) fn crash_point(&self) -> Multiplier {
        self.crash_point
    }

    /// Advance the state machine to `now_ms`.
    pub fn tick<L: BalanceLedger>(
        &mut self,
        cashier: &mut Cashier<L>,
        now_ms: u64,
    ) -> Vec<EngineEvent> {
        let mut settled = None;
        let changed = match self.phase {
            Phase::Waiting => {
                let due = self
                    .scheduler
                    .can_open_betting(self.phase, self.phase_ends_at_ms, now_ms);
                if due {
                    self.open_betting(now_ms);
                }
                due
            }
            Phase::Betting => {
                let due = self
                    .scheduler
                    .can_launch(self.phase, self.phase_ends_at_ms, now_ms);
                if due {
                    self.launch(now_ms);
                }
                due
            }
            Phase::Flying => {
                settled = self.fly(cashier, now_ms);
                true
            }
            Phase::Crashed => {
                let due = self
                    .scheduler
                    .can_reset(self.phase, self.phase_ends_at_ms, now_ms);
                if due {
                    self.phase = Phase::Waiting;
                    self.phase_ends_at_ms = self.scheduler.waiting_phase_timing(now_ms);
                    debug!(round_id = self.round_id, "cooldown over");
                }
                due
            }
        };

        let mut events = Vec::new();
        if changed {
            events.push(EngineEvent::Snapshot(self.snapshot()));
        }
        if let Some(outcome) = settled {
            events.push(EngineEvent::RoundSettled(outcome));
        }
        events
    }

    /// Accept a bet if the betting window is open at `now_ms` and the stake can be escrowed.
    pub fn place_bet<L: BalanceLedger>(
        &mut self,
        cashier: &mut Cashier<L>,
        request: BetRequest,
        now_ms: u64,
    ) -> Result<ParticipantView, BetError> {
        if !self
            .scheduler
            .is_betting_open(self.phase, self.phase_ends_at_ms, now_ms)
        {
            return Err(BetError::BettingClosed);
        }
        if request.stake == 0 {
            return Err(BetError::InvalidStake);
        }
        if request.stake < self.config.min_stake || request.stake > self.config.max_stake {
            return Err(BetError::StakeOutOfRange {
                stake: request.stake,
                min: self.config.min_stake,
                max: self.config.max_stake,
            });
        }
        if let Some(target) = request.auto_cashout {
            if target <= Multiplier::ONE {
                return Err(BetError::InvalidAutoCashout(target));
            }
        }
        let display_name = request
            .display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| request.participant_id.clone());
        let name_len = display_name.chars().count();
        if name_len > MAX_DISPLAY_NAME_LENGTH {
            return Err(BetError::DisplayNameTooLong {
                len: name_len,
                max: MAX_DISPLAY_NAME_LENGTH,
            });
        }
        if self.book.contains(&request.participant_id) {
            return Err(BetError::DuplicateBet);
        }

        let bet = Bet {
            participant_id: request.participant_id,
            display_name,
            is_bot: false,
            stake: request.stake,
            mode: request.mode,
            auto_cashout: request.auto_cashout,
            cashout_multiplier: None,
            settlement: SettlementStatus::Pending,
        };
        let ticket = bet.ticket(self.round_id);
        cashier.escrow(&ticket)?;

        let view = bet.view();
        if let Err(err) = self.book.insert(bet) {
            cashier.refund(&ticket);
            return Err(err);
        }
        info!(
            round_id = self.round_id,
            participant = %ticket.participant_id,
            stake = ticket.stake,
            mode = ticket.mode.as_str(),
            "bet placed"
        );
        Ok(view)
    }

    /// Cash out at the live multiplier as of `now_ms`.
    pub fn cash_out<L: BalanceLedger>(
        &mut self,
        cashier: &mut Cashier<L>,
        participant_id: &str,
        now_ms: u64,
    ) -> Result<CashoutReceipt, BetError> {
        if !self.scheduler.can_cash_out(self.phase) {
            return Err(BetError::NotFlying);
        }
        let bet = self.book.get(participant_id).ok_or(BetError::NoActiveBet)?;
        if bet.is_bot {
            return Err(BetError::NoActiveBet);
        }
        if bet.cashed_out() || bet.settlement.is_final() {
            return Err(BetError::AlreadySettled);
        }

        let live = self.refresh_multiplier(now_ms);
        if live >= self.crash_point || self.flight_exhausted(now_ms) {
            // Crashed between ticks; the next tick settles the round.
            return Err(BetError::NotFlying);
        }
        self.settle_cashout(cashier, participant_id, live)
    }

    /// Refund every open wager of the in-flight round and go idle. Used on shutdown.
    pub fn abort_round<L: BalanceLedger>(
        &mut self,
        cashier: &mut Cashier<L>,
    ) -> Vec<SettlementRecord> {
        if !matches!(self.phase, Phase::Betting | Phase::Flying) {
            return Vec::new();
        }
        for participant_id in self.book.pending() {
            let Some(bet) = self.book.get(&participant_id) else {
                continue;
            };
            let status = if bet.is_bot {
                SettlementStatus::Refunded
            } else {
                cashier.refund(&bet.ticket(self.round_id))
            };
            self.book.settle(&participant_id, status);
        }
        let records = self.settlement_records();
        self.book.seal();
        warn!(
            round_id = self.round_id,
            phase = self.phase.as_str(),
            refunded = records
                .iter()
                .filter(|record| record.status == SettlementStatus::Refunded && !record.is_bot)
                .count(),
            "round aborted"
        );
        self.phase = Phase::Waiting;
        self.flight_started_at_ms = None;
        self.current = Multiplier::ONE;
        records
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        let multiplier = match self.phase {
            Phase::Waiting | Phase::Betting => Multiplier::ONE,
            Phase::Flying => self.current,
            Phase::Crashed => self.crash_point,
        };
        let participants = match self.phase {
            Phase::Waiting => Vec::new(),
            _ => self.book.views(),
        };
        RoundSnapshot {
            round_id: self.round_id,
            phase: self.phase,
            multiplier,
            betting_deadline: (self.phase == Phase::Betting).then_some(self.phase_ends_at_ms),
            flight_started_at: match self.phase {
                Phase::Flying | Phase::Crashed => self.flight_started_at_ms,
                _ => None,
            },
            participants,
            history: self.history.iter().copied().collect(),
        }
    }

    fn open_betting(&mut self, now_ms: u64) {
        self.round_id = RoundScheduler::next_round_id(self.round_id, now_ms);
        self.crash_point = sanitize_crash_point(self.round_id, self.crash_points.draw());
        self.current = Multiplier::ONE;
        self.flight_started_at_ms = None;
        self.book = BetBook::new();
        self.phase = Phase::Betting;
        self.phase_ends_at_ms = self.scheduler.betting_deadline(now_ms);

        for bet in self.bots.draw_bets() {
            if let Err(err) = self.book.insert(bet) {
                warn!(?err, round_id = self.round_id, "skipped bot bet");
            }
        }
        info!(
            round_id = self.round_id,
            bots = self.book.len(),
            deadline = self.phase_ends_at_ms,
            "betting open"
        );
    }

    fn launch(&mut self, now_ms: u64) {
        self.phase = Phase::Flying;
        self.flight_started_at_ms = Some(now_ms);
        self.current = Multiplier::ONE;
        info!(
            round_id = self.round_id,
            participants = self.book.len(),
            "round launched"
        );
    }

    fn fly<L: BalanceLedger>(&mut self, cashier: &mut Cashier<L>, now_ms: u64) -> Option<RoundOutcome> {
        let live = self.refresh_multiplier(now_ms);

        for (participant_id, target) in self.book.due_auto_cashouts(live) {
            if let Err(err) = self.settle_cashout(cashier, &participant_id, target) {
                warn!(?err, round_id = self.round_id, participant = %participant_id, "auto cash-out failed");
            }
        }

        let exhausted = self.flight_exhausted(now_ms);
        if live >= self.crash_point || exhausted {
            return Some(self.crash(cashier, now_ms, exhausted));
        }
        None
    }

    fn refresh_multiplier(&mut self, now_ms: u64) -> Multiplier {
        let Some(started) = self.flight_started_at_ms else {
            return self.current;
        };
        let live = self
            .clock
            .at(now_ms.saturating_sub(started))
            .min(self.crash_point);
        if live > self.current {
            self.current = live;
        }
        self.current
    }

    fn flight_exhausted(&self, now_ms: u64) -> bool {
        self.flight_started_at_ms
            .map(|started| self.scheduler.flight_exhausted(started, now_ms))
            .unwrap_or(false)
    }

    fn settle_cashout<L: BalanceLedger>(
        &mut self,
        cashier: &mut Cashier<L>,
        participant_id: &str,
        multiplier: Multiplier,
    ) -> Result<CashoutReceipt, BetError> {
        let bet = self.book.latch_cashout(participant_id, multiplier)?.clone();
        let win_amount = multiplier.apply(bet.stake);
        let status = if bet.is_bot {
            SettlementStatus::Won { win_amount }
        } else {
            cashier.pay_out(&bet.ticket(self.round_id), win_amount)
        };
        self.book.settle(participant_id, status);

        debug!(
            round_id = self.round_id,
            participant = %participant_id,
            multiplier = %multiplier,
            win_amount,
            bot = bet.is_bot,
            "cashed out"
        );
        match status {
            SettlementStatus::Frozen { .. } => Err(BetError::LedgerUnavailable(
                "payout frozen for reconciliation".to_string(),
            )),
            _ => Ok(CashoutReceipt {
                multiplier,
                win_amount,
            }),
        }
    }

    fn crash<L: BalanceLedger>(
        &mut self,
        cashier: &mut Cashier<L>,
        now_ms: u64,
        exhausted: bool,
    ) -> RoundOutcome {
        if exhausted && self.current < self.crash_point {
            warn!(
                round_id = self.round_id,
                drawn = %self.crash_point,
                reached = %self.current,
                "flight bound reached before crash point"
            );
            self.crash_point = self.current;
        }
        self.current = self.crash_point;
        self.phase = Phase::Crashed;
        self.phase_ends_at_ms = self.scheduler.cooldown_phase_timing(now_ms);

        for participant_id in self.book.pending() {
            let Some(bet) = self.book.get(&participant_id) else {
                continue;
            };
            let status = if bet.is_bot {
                SettlementStatus::Lost
            } else {
                cashier.forfeit(&bet.ticket(self.round_id))
            };
            self.book.settle(&participant_id, status);
        }

        let outcome = RoundOutcome {
            round_id: self.round_id,
            crash_point: self.crash_point,
            participants: self.book.views(),
            settlements: self.settlement_records(),
        };
        self.book.seal();

        self.history.push_front(self.crash_point);
        self.history.truncate(self.config.history_capacity);

        self.outcomes.record_round_outcome(&outcome);
        info!(
            round_id = self.round_id,
            crash_point = %self.crash_point,
            participants = outcome.participants.len(),
            "round crashed"
        );
        outcome
    }

    fn settlement_records(&self) -> Vec<SettlementRecord> {
        self.book
            .iter()
            .map(|bet| SettlementRecord {
                participant_id: bet.participant_id.clone(),
                is_bot: bet.is_bot,
                mode: bet.mode,
                stake: bet.stake,
                status: bet.settlement,
            })
            .collect()
    }
}

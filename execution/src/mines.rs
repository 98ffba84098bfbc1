//! Mines: a single-player reveal game on a 5x5 board.
//!
//! A player escrows a stake, picks how many mines to hide and then reveals cells one at a time.
//! Every safe reveal raises the payout along [`MinesPaytable`]; a mine forfeits the stake. Clearing
//! every safe cell cashes out automatically. Money moves through the same [`Cashier`] as the crash
//! game, keyed by [`GameKind::Mines`] and the game id.

use std::collections::HashMap;

use crashline_types::casino::{
    MINES_GRID_CELLS, MINES_HOUSE_EDGE_BPS, MINES_MAX_COUNT, MINES_MIN_COUNT,
};
use crashline_types::{
    BetError, CashoutReceipt, GameKind, LedgerMode, MinesView, Multiplier, RevealOutcome,
    SettlementStatus,
};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cashier::Cashier;
use crate::journal::EscrowTicket;
use crate::ledger::BalanceLedger;
use crate::round_scheduler::RoundScheduler;

const BPS_SCALE: u128 = 10_000;

/// Payout multiplier for `revealed` safe cells on a board hiding `mine_count` mines.
///
/// The fair multiplier is the inverse probability of surviving every reveal,
/// `prod (cells - i) / (cells - mines - i)`, scaled by `1 - edge` and floored to hundredths. Never
/// below 1.00x.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MinesPaytable {
    edge_bps: u32,
}

impl Default for MinesPaytable {
    fn default() -> Self {
        Self {
            edge_bps: MINES_HOUSE_EDGE_BPS,
        }
    }
}

impl MinesPaytable {
    pub fn with_edge_bps(edge_bps: u32) -> Self {
        Self {
            edge_bps: edge_bps.min(BPS_SCALE as u32),
        }
    }

    pub fn edge_bps(&self) -> u32 {
        self.edge_bps
    }

    pub fn multiplier(&self, mine_count: u8, revealed: u8) -> Multiplier {
        if revealed == 0 {
            return Multiplier::ONE;
        }
        let cells = u128::from(MINES_GRID_CELLS);
        let mines = u128::from(mine_count);
        let revealed = u128::from(revealed);
        if mines >= cells || revealed > cells - mines {
            return Multiplier::ONE;
        }

        let mut numerator: u128 = 1;
        let mut denominator: u128 = 1;
        for i in 0..revealed {
            numerator *= cells - i;
            denominator *= cells - mines - i;
        }
        let hundredths = numerator * (BPS_SCALE - u128::from(self.edge_bps)) * 100
            / (denominator * BPS_SCALE);
        let hundredths = u32::try_from(hundredths).unwrap_or(u32::MAX);
        Multiplier::from_hundredths(hundredths).max(Multiplier::ONE)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MinesConfig {
    pub min_stake: u64,
    pub max_stake: u64,
    pub paytable: MinesPaytable,
}

impl Default for MinesConfig {
    fn default() -> Self {
        Self {
            min_stake: 10,
            max_stake: 10_000_000,
            paytable: MinesPaytable::default(),
        }
    }
}

/// Settlement of a voluntary cash-out, with the board revealed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinesCashout {
    pub receipt: CashoutReceipt,
    pub mines: Vec<u8>,
}

#[derive(Clone, Debug)]
struct MinesGame {
    game_id: u64,
    stake: u64,
    mode: LedgerMode,
    mine_count: u8,
    /// Sorted mine positions.
    mines: Vec<u8>,
    revealed: Vec<u8>,
}

impl MinesGame {
    fn ticket(&self, player_id: &str) -> EscrowTicket {
        EscrowTicket {
            game: GameKind::Mines,
            round_id: self.game_id,
            participant_id: player_id.to_string(),
            mode: self.mode,
            stake: self.stake,
        }
    }

    fn safe_cells(&self) -> usize {
        usize::from(MINES_GRID_CELLS - self.mine_count)
    }

    fn is_cleared(&self) -> bool {
        self.revealed.len() >= self.safe_cells()
    }
}

/// Open mines games, at most one per player.
pub struct MinesTable<R = StdRng> {
    config: MinesConfig,
    rng: R,
    games: HashMap<String, MinesGame>,
    last_game_id: u64,
}

impl MinesTable<StdRng> {
    pub fn from_entropy(config: MinesConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn seeded(config: MinesConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> MinesTable<R> {
    pub fn with_rng(config: MinesConfig, rng: R) -> Self {
        Self {
            config,
            rng,
            games: HashMap::new(),
            last_game_id: 0,
        }
    }

    pub fn open_games(&self) -> usize {
        self.games.len()
    }

    /// The player's open board, if any. Mine positions stay hidden.
    pub fn view(&self, player_id: &str) -> Option<MinesView> {
        self.games
            .get(player_id)
            .map(|game| self.view_of(game))
    }

    pub fn start<L: BalanceLedger>(
        &mut self,
        cashier: &mut Cashier<L>,
        player_id: &str,
        stake: u64,
        mode: LedgerMode,
        mine_count: u8,
        now_ms: u64,
    ) -> Result<MinesView, BetError> {
        if self.games.contains_key(player_id) {
            return Err(BetError::GameInProgress);
        }
        if stake == 0 {
            return Err(BetError::InvalidStake);
        }
        if stake < self.config.min_stake || stake > self.config.max_stake {
            return Err(BetError::StakeOutOfRange {
                stake,
                min: self.config.min_stake,
                max: self.config.max_stake,
            });
        }
        if !(MINES_MIN_COUNT..=MINES_MAX_COUNT).contains(&mine_count) {
            return Err(BetError::InvalidMineCount {
                got: mine_count,
                min: MINES_MIN_COUNT,
                max: MINES_MAX_COUNT,
            });
        }

        let game_id = RoundScheduler::next_round_id(self.last_game_id, now_ms);
        let mut mines: Vec<u8> = index::sample(
            &mut self.rng,
            usize::from(MINES_GRID_CELLS),
            usize::from(mine_count),
        )
        .into_iter()
        .filter_map(|cell| u8::try_from(cell).ok())
        .collect();
        mines.sort_unstable();

        let game = MinesGame {
            game_id,
            stake,
            mode,
            mine_count,
            mines,
            revealed: Vec::new(),
        };
        cashier.escrow(&game.ticket(player_id))?;
        self.last_game_id = game_id;

        info!(
            game_id,
            player = %player_id,
            stake,
            mine_count,
            mode = mode.as_str(),
            "mines game started"
        );
        let view = self.view_of(&game);
        self.games.insert(player_id.to_string(), game);
        Ok(view)
    }

    pub fn reveal<L: BalanceLedger>(
        &mut self,
        cashier: &mut Cashier<L>,
        player_id: &str,
        cell: u8,
    ) -> Result<RevealOutcome, BetError> {
        let game = self
            .games
            .get_mut(player_id)
            .ok_or(BetError::NoActiveBet)?;
        if cell >= MINES_GRID_CELLS {
            return Err(BetError::InvalidCell(cell));
        }
        if game.revealed.contains(&cell) {
            return Err(BetError::CellAlreadyRevealed(cell));
        }

        if game.mines.binary_search(&cell).is_ok() {
            let Some(game) = self.games.remove(player_id) else {
                return Err(BetError::NoActiveBet);
            };
            cashier.forfeit(&game.ticket(player_id));
            info!(game_id = game.game_id, player = %player_id, cell, "mine hit");
            return Ok(RevealOutcome::Mine {
                cell,
                mines: game.mines,
            });
        }

        game.revealed.push(cell);
        debug!(game_id = game.game_id, player = %player_id, cell, revealed = game.revealed.len(), "safe reveal");
        if game.is_cleared() {
            let settled = self.settle(cashier, player_id)?;
            return Ok(RevealOutcome::Cleared {
                receipt: settled.receipt,
                mines: settled.mines,
            });
        }

        let board = self.view_of(&self.games[player_id]);
        Ok(RevealOutcome::Safe { board })
    }

    pub fn cash_out<L: BalanceLedger>(
        &mut self,
        cashier: &mut Cashier<L>,
        player_id: &str,
    ) -> Result<MinesCashout, BetError> {
        let game = self.games.get(player_id).ok_or(BetError::NoActiveBet)?;
        if game.revealed.is_empty() {
            return Err(BetError::NothingRevealed);
        }
        self.settle(cashier, player_id)
    }

    /// Refund every open game. Used on shutdown.
    pub fn abort_all<L: BalanceLedger>(&mut self, cashier: &mut Cashier<L>) -> usize {
        let mut refunded = 0;
        for (player_id, game) in self.games.drain() {
            match cashier.refund(&game.ticket(&player_id)) {
                SettlementStatus::Refunded => refunded += 1,
                status => {
                    warn!(game_id = game.game_id, player = %player_id, ?status, "mines refund not applied")
                }
            }
        }
        if refunded > 0 {
            warn!(refunded, "aborted open mines games");
        }
        refunded
    }

    #[cfg(test)]
    pub(crate) fn mines_of(&self, player_id: &str) -> Vec<u8> {
        self.games
            .get(player_id)
            .map(|game| game.mines.clone())
            .unwrap_or_default()
    }

    fn settle<L: BalanceLedger>(
        &mut self,
        cashier: &mut Cashier<L>,
        player_id: &str,
    ) -> Result<MinesCashout, BetError> {
        let game = self.games.remove(player_id).ok_or(BetError::NoActiveBet)?;
        let multiplier = self.multiplier_of(&game);
        let win_amount = multiplier.apply(game.stake);

        let status = cashier.pay_out(&game.ticket(player_id), win_amount);
        info!(
            game_id = game.game_id,
            player = %player_id,
            multiplier = %multiplier,
            win_amount,
            "mines cashed out"
        );
        if let SettlementStatus::Frozen { .. } = status {
            return Err(BetError::LedgerUnavailable(
                "payout frozen for reconciliation".to_string(),
            ));
        }
        Ok(MinesCashout {
            receipt: CashoutReceipt {
                multiplier,
                win_amount,
            },
            mines: game.mines,
        })
    }

    fn multiplier_of(&self, game: &MinesGame) -> Multiplier {
        let revealed = u8::try_from(game.revealed.len()).unwrap_or(u8::MAX);
        self.config.paytable.multiplier(game.mine_count, revealed)
    }

    fn view_of(&self, game: &MinesGame) -> MinesView {
        let next_multiplier = (!game.is_cleared()).then(|| {
            let next = u8::try_from(game.revealed.len() + 1).unwrap_or(u8::MAX);
            self.config.paytable.multiplier(game.mine_count, next)
        });
        MinesView {
            game_id: game.game_id,
            stake: game.stake,
            mode: game.mode,
            mine_count: game.mine_count,
            revealed: game.revealed.clone(),
            multiplier: self.multiplier_of(game),
            next_multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{EscrowState, MemoryJournal};
    use crate::ledger::MemoryLedger;
    use crate::mocks::FlakyLedger;

    fn cashier(user: &str, amount: u64) -> Cashier<MemoryLedger> {
        let mut ledger = MemoryLedger::new();
        ledger.deposit(user, LedgerMode::Real, amount);
        Cashier::new(ledger, MemoryJournal::new())
    }

    fn table() -> MinesTable {
        MinesTable::seeded(MinesConfig::default(), 11)
    }

    fn first_safe(table: &MinesTable, player: &str) -> u8 {
        let mines = table.mines_of(player);
        (0..MINES_GRID_CELLS)
            .find(|cell| !mines.contains(cell))
            .unwrap()
    }

    #[test]
    fn test_paytable_reference_values() {
        let paytable = MinesPaytable::default();
        assert_eq!(paytable.multiplier(3, 0), Multiplier::ONE);
        // 25/24 * 0.97 = 1.0104
        assert_eq!(paytable.multiplier(1, 1).hundredths(), 101);
        // 25/22 * 0.97 = 1.1022
        assert_eq!(paytable.multiplier(3, 1).hundredths(), 110);
        // (25*24)/(20*19) * 0.97 = 1.5315
        assert_eq!(paytable.multiplier(5, 2).hundredths(), 153);
        assert_eq!(paytable.multiplier(24, 1).hundredths(), 2_425);
        assert_eq!(paytable.multiplier(1, 24).hundredths(), 2_425);
        // Past the last safe cell there is nothing to pay.
        assert_eq!(paytable.multiplier(24, 2), Multiplier::ONE);
    }

    #[test]
    fn test_paytable_rises_with_each_reveal() {
        let paytable = MinesPaytable::default();
        for mines in MINES_MIN_COUNT..=MINES_MAX_COUNT {
            let safe = MINES_GRID_CELLS - mines;
            for revealed in 1..safe {
                assert!(
                    paytable.multiplier(mines, revealed) <= paytable.multiplier(mines, revealed + 1),
                    "mines={mines} revealed={revealed}"
                );
            }
        }
    }

    #[test]
    fn test_zero_edge_pays_fair_odds() {
        let paytable = MinesPaytable::with_edge_bps(0);
        assert_eq!(paytable.multiplier(24, 1).hundredths(), 2_500);
        assert_eq!(paytable.multiplier(12, 13).hundredths(), 520_030_000);
    }

    #[test]
    fn test_start_escrows_and_hides_mines() {
        let mut cashier = cashier("alice", 1_000);
        let mut table = table();

        let view = table
            .start(&mut cashier, "alice", 200, LedgerMode::Real, 3, 5_000)
            .unwrap();
        assert_eq!(view.game_id, 5_000);
        assert_eq!(view.mine_count, 3);
        assert!(view.revealed.is_empty());
        assert_eq!(view.multiplier, Multiplier::ONE);
        assert_eq!(view.next_multiplier, Some(Multiplier::from_hundredths(110)));

        let mines = table.mines_of("alice");
        assert_eq!(mines.len(), 3);
        assert!(mines.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(mines.iter().all(|cell| *cell < MINES_GRID_CELLS));

        assert_eq!(cashier.ledger().account("alice").real, 800);
        assert_eq!(cashier.ledger().house_bank(), 200);
        assert_eq!(cashier.journal_entries().len(), 1);
    }

    #[test]
    fn test_start_validation() {
        let mut cashier = cashier("bob", 1_000);
        let mut table = table();

        assert_eq!(
            table.start(&mut cashier, "bob", 100, LedgerMode::Real, 0, 1),
            Err(BetError::InvalidMineCount {
                got: 0,
                min: 1,
                max: 24
            })
        );
        assert!(matches!(
            table.start(&mut cashier, "bob", 100, LedgerMode::Real, 25, 1),
            Err(BetError::InvalidMineCount { got: 25, .. })
        ));
        assert_eq!(
            table.start(&mut cashier, "bob", 0, LedgerMode::Real, 3, 1),
            Err(BetError::InvalidStake)
        );
        assert_eq!(
            table.start(&mut cashier, "bob", 5_000, LedgerMode::Real, 3, 1),
            Err(BetError::InsufficientFunds)
        );
        assert_eq!(table.open_games(), 0);

        table
            .start(&mut cashier, "bob", 100, LedgerMode::Real, 3, 1)
            .unwrap();
        assert_eq!(
            table.start(&mut cashier, "bob", 100, LedgerMode::Real, 3, 2),
            Err(BetError::GameInProgress)
        );
        assert_eq!(cashier.ledger().account("bob").real, 900);
    }

    #[test]
    fn test_game_ids_strictly_increase() {
        let mut ledger = MemoryLedger::new();
        ledger.deposit("a", LedgerMode::Demo, 1_000);
        ledger.deposit("b", LedgerMode::Demo, 1_000);
        let mut cashier = Cashier::new(ledger, MemoryJournal::new());
        let mut table = table();

        let first = table
            .start(&mut cashier, "a", 100, LedgerMode::Demo, 3, 7)
            .unwrap();
        let second = table
            .start(&mut cashier, "b", 100, LedgerMode::Demo, 3, 7)
            .unwrap();
        assert_eq!(first.game_id, 7);
        assert_eq!(second.game_id, 8);
    }

    #[test]
    fn test_safe_reveal_then_cash_out() {
        let mut cashier = cashier("carol", 1_000);
        let mut table = table();
        table
            .start(&mut cashier, "carol", 1_000, LedgerMode::Real, 3, 1)
            .unwrap();
        assert_eq!(
            table.cash_out(&mut cashier, "carol"),
            Err(BetError::NothingRevealed)
        );

        let cell = first_safe(&table, "carol");
        let RevealOutcome::Safe { board } = table.reveal(&mut cashier, "carol", cell).unwrap() else {
            panic!("expected a safe reveal");
        };
        assert_eq!(board.revealed, vec![cell]);
        assert_eq!(board.multiplier, Multiplier::from_hundredths(110));
        assert_eq!(
            table.reveal(&mut cashier, "carol", cell),
            Err(BetError::CellAlreadyRevealed(cell))
        );
        assert_eq!(
            table.reveal(&mut cashier, "carol", MINES_GRID_CELLS),
            Err(BetError::InvalidCell(MINES_GRID_CELLS))
        );

        let mines = table.mines_of("carol");
        let settled = table.cash_out(&mut cashier, "carol").unwrap();
        assert_eq!(settled.receipt.win_amount, 1_100);
        assert_eq!(settled.mines, mines);
        assert_eq!(cashier.ledger().account("carol").real, 1_100);
        assert_eq!(cashier.ledger().house_bank(), -100);
        assert!(cashier.journal_entries().is_empty());
        assert_eq!(table.open_games(), 0);
        assert_eq!(
            table.cash_out(&mut cashier, "carol"),
            Err(BetError::NoActiveBet)
        );
    }

    #[test]
    fn test_mine_hit_forfeits_stake() {
        let mut cashier = cashier("dave", 1_000);
        let mut table = table();
        table
            .start(&mut cashier, "dave", 400, LedgerMode::Real, 5, 1)
            .unwrap();
        let mines = table.mines_of("dave");

        let outcome = table.reveal(&mut cashier, "dave", mines[0]).unwrap();
        assert_eq!(
            outcome,
            RevealOutcome::Mine {
                cell: mines[0],
                mines
            }
        );
        assert_eq!(cashier.ledger().account("dave").real, 600);
        assert_eq!(cashier.ledger().house_bank(), 400);
        assert!(cashier.journal_entries().is_empty());
        assert!(table.view("dave").is_none());
    }

    #[test]
    fn test_clearing_board_cashes_out() {
        let mut cashier = cashier("erin", 1_000);
        let mut table = table();
        table
            .start(&mut cashier, "erin", 100, LedgerMode::Real, 24, 1)
            .unwrap();

        let cell = first_safe(&table, "erin");
        let outcome = table.reveal(&mut cashier, "erin", cell).unwrap();
        let RevealOutcome::Cleared { receipt, mines } = outcome else {
            panic!("expected the board to clear, got {outcome:?}");
        };
        assert_eq!(receipt.multiplier.hundredths(), 2_425);
        assert_eq!(receipt.win_amount, 2_425);
        assert_eq!(mines.len(), 24);
        assert_eq!(cashier.ledger().account("erin").real, 900 + 2_425);
        assert_eq!(table.open_games(), 0);
    }

    #[test]
    fn test_frozen_payout_reported() {
        let mut ledger = MemoryLedger::new();
        ledger.deposit("gina", LedgerMode::Real, 1_000);
        let mut cashier = Cashier::new(FlakyLedger::new(ledger), MemoryJournal::new());
        let mut table = MinesTable::seeded(MinesConfig::default(), 3);
        table
            .start(&mut cashier, "gina", 500, LedgerMode::Real, 1, 1)
            .unwrap();
        let mines = table.mines_of("gina");
        let cell = (0..MINES_GRID_CELLS).find(|cell| !mines.contains(cell)).unwrap();
        table.reveal(&mut cashier, "gina", cell).unwrap();

        cashier.ledger_mut().fail_credits = 2;
        assert!(matches!(
            table.cash_out(&mut cashier, "gina"),
            Err(BetError::LedgerUnavailable(_))
        ));
        let entries = cashier.journal_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].state, EscrowState::FrozenWin { win_amount: 505 });
        assert_eq!(table.open_games(), 0);
    }

    #[test]
    fn test_abort_all_refunds_open_games() {
        let mut ledger = MemoryLedger::new();
        ledger.deposit("hana", LedgerMode::Real, 1_000);
        ledger.deposit("ivan", LedgerMode::Demo, 1_000);
        let mut cashier = Cashier::new(ledger, MemoryJournal::new());
        let mut table = table();
        table
            .start(&mut cashier, "hana", 300, LedgerMode::Real, 3, 1)
            .unwrap();
        table
            .start(&mut cashier, "ivan", 300, LedgerMode::Demo, 3, 2)
            .unwrap();

        assert_eq!(table.abort_all(&mut cashier), 2);
        assert_eq!(cashier.ledger().account("hana").real, 1_000);
        assert_eq!(cashier.ledger().account("ivan").demo, 1_000);
        assert_eq!(cashier.ledger().house_bank(), 0);
        assert!(cashier.journal_entries().is_empty());
        assert_eq!(table.open_games(), 0);
    }
}

//! Synthetic participants that keep the table from looking empty.
//!
//! Bots never touch the balance ledger. They only appear in the bet book and leave it through the
//! engine's per-tick auto cash-out check.

use crashline_types::{LedgerMode, Multiplier, SettlementStatus};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::bets::Bet;

const BOT_NAMES: [&str; 12] = [
    "Ace", "Blaze", "Comet", "Dune", "Echo", "Flint", "Gale", "Halo", "Iris", "Jinx", "Koda",
    "Lynx",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RiskProfile {
    Low,
    Medium,
    High,
}

impl RiskProfile {
    /// Auto cash-out range in hundredths, `low` inclusive and `high` exclusive.
    pub fn threshold_range(&self) -> (u32, u32) {
        match self {
            RiskProfile::Low => (200, 500),
            RiskProfile::Medium => (500, 1_500),
            RiskProfile::High => (1_000, 4_000),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotProfile {
    pub id: String,
    pub display_name: String,
    pub stake_min: u64,
    pub stake_max: u64,
    pub risk: RiskProfile,
}

#[derive(Clone, Debug)]
pub struct BotRoster {
    bots: Vec<BotProfile>,
    rng: StdRng,
}

impl BotRoster {
    pub fn new(bots: Vec<BotProfile>, seed: u64) -> Self {
        Self {
            bots,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), 0)
    }

    /// `count` bots cycling through low, medium and high risk.
    pub fn generate(count: usize, stake_min: u64, stake_max: u64, seed: u64) -> Self {
        let bots = (0..count)
            .map(|idx| {
                let risk = match idx % 3 {
                    0 => RiskProfile::Low,
                    1 => RiskProfile::Medium,
                    _ => RiskProfile::High,
                };
                let name = BOT_NAMES[idx % BOT_NAMES.len()];
                let display_name = if idx < BOT_NAMES.len() {
                    name.to_string()
                } else {
                    format!("{name}{}", idx / BOT_NAMES.len())
                };
                BotProfile {
                    id: format!("bot-{idx:03}"),
                    display_name,
                    stake_min,
                    stake_max,
                    risk,
                }
            })
            .collect();
        Self::new(bots, seed)
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }

    pub fn profiles(&self) -> &[BotProfile] {
        &self.bots
    }

    /// One bet per bot for the round that just opened.
    pub fn draw_bets(&mut self) -> Vec<Bet> {
        let mut bets = Vec::with_capacity(self.bots.len());
        for profile in &self.bots {
            let stake = if profile.stake_min >= profile.stake_max {
                profile.stake_min
            } else {
                self.rng.gen_range(profile.stake_min..=profile.stake_max)
            };
            let (low, high) = profile.risk.threshold_range();
            let threshold = self.rng.gen_range(low..high);
            bets.push(Bet {
                participant_id: profile.id.clone(),
                display_name: profile.display_name.clone(),
                is_bot: true,
                stake: stake.max(1),
                mode: LedgerMode::Demo,
                auto_cashout: Some(Multiplier::from_hundredths(threshold)),
                cashout_multiplier: None,
                settlement: SettlementStatus::Pending,
            });
        }
        bets
    }
}

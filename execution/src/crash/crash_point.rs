//! Crash point policy.
//!
//! The distribution is a published constant, not a function of the round: it never looks at
//! who is betting or how much.

use crashline_types::casino::{MAX_CRASH_POINT_HUNDREDTHS, MIN_CRASH_POINT_HUNDREDTHS};
use crashline_types::Multiplier;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

/// One band of the tiered distribution, bounds in hundredths (`low` inclusive, `high` exclusive).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrashTier {
    pub weight_pct: u32,
    pub low: u32,
    pub high: u32,
}

/// 70% in [1.00, 4.00), 20% in [4.00, 20.00), 10% in [20.00, 100.00).
pub const CRASH_TIERS: [CrashTier; 3] = [
    CrashTier {
        weight_pct: 70,
        low: 100,
        high: 400,
    },
    CrashTier {
        weight_pct: 20,
        low: 400,
        high: 2_000,
    },
    CrashTier {
        weight_pct: 10,
        low: 2_000,
        high: 10_000,
    },
];

pub const MIN_CRASH_POINT: Multiplier = Multiplier::from_hundredths(MIN_CRASH_POINT_HUNDREDTHS);
pub const MAX_CRASH_POINT: Multiplier = Multiplier::from_hundredths(MAX_CRASH_POINT_HUNDREDTHS);

/// Where the engine gets each round's crash point.
pub trait CrashPointSource: Send {
    fn draw(&mut self) -> Multiplier;
}

/// Draws from [`CRASH_TIERS`].
#[derive(Clone, Debug)]
pub struct TieredCrashPoints<R = StdRng> {
    rng: R,
}

impl TieredCrashPoints<StdRng> {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> TieredCrashPoints<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng + Send> CrashPointSource for TieredCrashPoints<R> {
    fn draw(&mut self) -> Multiplier {
        let roll = self.rng.gen_range(0..100u32);
        let mut cumulative = 0;
        for tier in CRASH_TIERS {
            cumulative += tier.weight_pct;
            if roll < cumulative {
                return Multiplier::from_hundredths(self.rng.gen_range(tier.low..tier.high));
            }
        }
        // Weights sum to 100, so this is unreachable; fall back to the floor.
        MIN_CRASH_POINT
    }
}

/// Clamp a drawn crash point into the valid range, logging anything that needed clamping.
pub fn sanitize_crash_point(round_id: u64, raw: Multiplier) -> Multiplier {
    let clamped = raw.clamp(MIN_CRASH_POINT, MAX_CRASH_POINT);
    if clamped != raw {
        warn!(round_id, raw = %raw, clamped = %clamped, "crash point outside valid range");
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_weights_cover_everything() {
        let total: u32 = CRASH_TIERS.iter().map(|tier| tier.weight_pct).sum();
        assert_eq!(total, 100);
        for pair in CRASH_TIERS.windows(2) {
            assert_eq!(pair[0].high, pair[1].low, "tiers must be contiguous");
        }
        assert_eq!(CRASH_TIERS[0].low, MIN_CRASH_POINT.hundredths());
        assert_eq!(CRASH_TIERS[2].high, MAX_CRASH_POINT.hundredths());
    }

    #[test]
    fn test_distribution_matches_policy() {
        let mut source = TieredCrashPoints::seeded(7);
        let draws = 100_000;
        let mut counts = [0u32; 3];
        for _ in 0..draws {
            let point = source.draw().hundredths();
            assert!((100..10_000).contains(&point), "draw {point} out of range");
            let tier = CRASH_TIERS
                .iter()
                .position(|tier| (tier.low..tier.high).contains(&point))
                .unwrap();
            counts[tier] += 1;
        }
        let fractions: Vec<f64> = counts.iter().map(|c| *c as f64 / draws as f64).collect();
        assert!((fractions[0] - 0.70).abs() < 0.01, "low tier {}", fractions[0]);
        assert!((fractions[1] - 0.20).abs() < 0.01, "mid tier {}", fractions[1]);
        assert!((fractions[2] - 0.10).abs() < 0.01, "high tier {}", fractions[2]);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = TieredCrashPoints::seeded(99);
        let mut b = TieredCrashPoints::seeded(99);
        for _ in 0..32 {
            assert_eq!(a.draw(), b.draw());
        }
    }

    #[test]
    fn test_sanitize_clamps_anomalies() {
        assert_eq!(
            sanitize_crash_point(1, Multiplier::from_hundredths(0)),
            MIN_CRASH_POINT
        );
        assert_eq!(
            sanitize_crash_point(1, Multiplier::from_hundredths(99)),
            MIN_CRASH_POINT
        );
        assert_eq!(
            sanitize_crash_point(1, Multiplier::from_hundredths(1_000_000)),
            MAX_CRASH_POINT
        );
        assert_eq!(
            sanitize_crash_point(1, Multiplier::from_hundredths(333)),
            Multiplier::from_hundredths(333)
        );
    }
}

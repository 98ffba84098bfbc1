use crashline_types::Multiplier;

/// Default growth: ~1.82x after 10s, ~6x after 30s, 100x after ~77s.
pub const DEFAULT_GROWTH_PER_SECOND: f64 = 0.06;

/// Multiplier as a pure function of flight time: `e^(growth * seconds)` floored to hundredths.
///
/// Depends on nothing but elapsed time, so any observer holding the flight start time computes
/// the same value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MultiplierClock {
    growth_per_second: f64,
}

impl Default for MultiplierClock {
    fn default() -> Self {
        Self::new(DEFAULT_GROWTH_PER_SECOND)
    }
}

impl MultiplierClock {
    /// Non-positive or non-finite growth falls back to the default curve.
    pub fn new(growth_per_second: f64) -> Self {
        let growth_per_second = if growth_per_second.is_finite() && growth_per_second > 0.0 {
            growth_per_second
        } else {
            DEFAULT_GROWTH_PER_SECOND
        };
        Self { growth_per_second }
    }

    pub fn growth_per_second(&self) -> f64 {
        self.growth_per_second
    }

    pub fn at(&self, elapsed_ms: u64) -> Multiplier {
        if elapsed_ms == 0 {
            return Multiplier::ONE;
        }
        let value = (self.growth_per_second * elapsed_ms as f64 / 1_000.0).exp();
        if !value.is_finite() {
            return Multiplier::from_hundredths(u32::MAX);
        }
        Multiplier::from_f64_floor(value).max(Multiplier::ONE)
    }

    /// First whole millisecond at which the clock shows at least `target`.
    pub fn first_ms_reaching(&self, target: Multiplier) -> u64 {
        if target <= Multiplier::ONE {
            return 0;
        }
        let estimate = (target.as_f64().ln() / self.growth_per_second * 1_000.0).floor() as u64;
        let mut ms = estimate.saturating_sub(2);
        while self.at(ms) < target {
            ms += 1;
        }
        while ms > 0 && self.at(ms - 1) >= target {
            ms -= 1;
        }
        ms
    }
}

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::MULTIPLIER_SCALE;

/// Payout multiplier in fixed-point hundredths (`250` is 2.50x).
///
/// Settlement math never touches floats: `stake * hundredths / 100`, floored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Multiplier(u32);

impl Multiplier {
    pub const ONE: Multiplier = Multiplier(MULTIPLIER_SCALE);

    pub const fn from_hundredths(hundredths: u32) -> Self {
        Self(hundredths)
    }

    pub const fn hundredths(self) -> u32 {
        self.0
    }

    /// Floor a float multiplier to hundredths. Non-finite or negative values map to zero.
    pub fn from_f64_floor(value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return Self(0);
        }
        // Nudge before flooring so 2.5 stored as 2.4999999 still reads 2.50.
        let scaled = (value * MULTIPLIER_SCALE as f64 + 1e-7).floor();
        Self(scaled.min(u32::MAX as f64) as u32)
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / MULTIPLIER_SCALE as f64
    }

    /// Winnings for `stake` at this multiplier, floored to the minor unit.
    pub fn apply(self, stake: u64) -> u64 {
        let product = stake as u128 * self.0 as u128 / MULTIPLIER_SCALE as u128;
        product.min(u64::MAX as u128) as u64
    }

    pub fn clamp(self, min: Multiplier, max: Multiplier) -> Multiplier {
        Ord::clamp(self, min, max)
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02}x",
            self.0 / MULTIPLIER_SCALE,
            self.0 % MULTIPLIER_SCALE
        )
    }
}

impl Serialize for Multiplier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Multiplier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        if !value.is_finite() || value < 0.0 {
            return Err(serde::de::Error::custom("multiplier must be a non-negative number"));
        }
        Ok(Multiplier::from_f64_floor(value))
    }
}

use crashline_execution::round_scheduler::PhaseConfig;
use crashline_execution::{EngineConfig, MinesConfig, MinesPaytable};
use crashline_types::casino::{HISTORY_CAPACITY, MAX_CRASH_POINT_HUNDREDTHS};
use crashline_types::Multiplier;
use thiserror::Error;
use tracing::Level;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("{field}: min {min} exceeds max {max}")]
    InvertedRange {
        field: &'static str,
        min: u64,
        max: u64,
    },
    #[error("growth rate must be a positive number (got {value})")]
    InvalidGrowth { value: f64 },
    #[error("max_flight_ms {max_flight_ms} only reaches {reachable}, below the highest crash point")]
    FlightTooShort {
        max_flight_ms: u64,
        reachable: Multiplier,
    },
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct CrashTableConfig {
    pub waiting_ms: u64,
    pub betting_ms: u64,
    pub cooldown_ms: u64,
    pub max_flight_ms: u64,
    pub tick_ms: u64,
    pub growth_per_second: f64,
    pub min_stake: u64,
    pub max_stake: u64,
    pub history_capacity: usize,
    pub bot_count: usize,
    pub bot_stake_min: u64,
    pub bot_stake_max: u64,
    pub bot_seed: u64,
    /// Fixed seed for crash point draws; entropy when unset.
    pub crash_seed: Option<u64>,
    pub mines_seed: Option<u64>,
    pub mines_edge_bps: u32,
    /// Demo balance granted the first time a player joins.
    pub demo_balance: u64,
    /// Real balance granted the first time a player joins.
    pub real_balance: u64,
    pub log_level: String,
}

impl Default for CrashTableConfig {
    fn default() -> Self {
        Self {
            waiting_ms: 0,
            betting_ms: 10_000,
            cooldown_ms: 5_000,
            max_flight_ms: 120_000,
            tick_ms: 100,
            growth_per_second: 0.06,
            min_stake: 10,
            max_stake: 10_000_000,
            history_capacity: HISTORY_CAPACITY,
            bot_count: 8,
            bot_stake_min: 100,
            bot_stake_max: 5_000,
            bot_seed: 42,
            crash_seed: None,
            mines_seed: None,
            mines_edge_bps: 300,
            demo_balance: 100_000,
            real_balance: 0,
            log_level: "info".to_string(),
        }
    }
}

impl CrashTableConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read `CRASH_TABLE_*` keys through `lookup`. Missing or unparsable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |key: &str| lookup(key).map(|raw| raw.trim().to_string());
        Self {
            waiting_ms: parse_or(read("CRASH_TABLE_WAITING_MS"), defaults.waiting_ms),
            betting_ms: parse_or(read("CRASH_TABLE_BETTING_MS"), defaults.betting_ms),
            cooldown_ms: parse_or(read("CRASH_TABLE_COOLDOWN_MS"), defaults.cooldown_ms),
            max_flight_ms: parse_or(read("CRASH_TABLE_MAX_FLIGHT_MS"), defaults.max_flight_ms),
            tick_ms: parse_or(read("CRASH_TABLE_TICK_MS"), defaults.tick_ms),
            growth_per_second: parse_or(read("CRASH_TABLE_GROWTH_PER_SECOND"), defaults.growth_per_second),
            min_stake: parse_or(read("CRASH_TABLE_MIN_STAKE"), defaults.min_stake),
            max_stake: parse_or(read("CRASH_TABLE_MAX_STAKE"), defaults.max_stake),
            history_capacity: parse_or(read("CRASH_TABLE_HISTORY_CAPACITY"), defaults.history_capacity),
            bot_count: parse_or(read("CRASH_TABLE_BOT_COUNT"), defaults.bot_count),
            bot_stake_min: parse_or(read("CRASH_TABLE_BOT_STAKE_MIN"), defaults.bot_stake_min),
            bot_stake_max: parse_or(read("CRASH_TABLE_BOT_STAKE_MAX"), defaults.bot_stake_max),
            bot_seed: parse_or(read("CRASH_TABLE_BOT_SEED"), defaults.bot_seed),
            crash_seed: read("CRASH_TABLE_CRASH_SEED").and_then(|raw| raw.parse().ok()),
            mines_seed: read("CRASH_TABLE_MINES_SEED").and_then(|raw| raw.parse().ok()),
            mines_edge_bps: parse_or(read("CRASH_TABLE_MINES_EDGE_BPS"), defaults.mines_edge_bps),
            demo_balance: parse_or(read("CRASH_TABLE_DEMO_BALANCE"), defaults.demo_balance),
            real_balance: parse_or(read("CRASH_TABLE_REAL_BALANCE"), defaults.real_balance),
            log_level: read("CRASH_TABLE_LOG_LEVEL")
                .filter(|raw| !raw.is_empty())
                .unwrap_or(defaults.log_level),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_nonzero("betting_ms", self.betting_ms)?;
        ensure_nonzero("cooldown_ms", self.cooldown_ms)?;
        ensure_nonzero("max_flight_ms", self.max_flight_ms)?;
        ensure_nonzero("tick_ms", self.tick_ms)?;
        ensure_nonzero("min_stake", self.min_stake)?;
        ensure_nonzero("history_capacity", self.history_capacity as u64)?;
        ensure_ordered("stake", self.min_stake, self.max_stake)?;
        ensure_ordered("bot_stake", self.bot_stake_min, self.bot_stake_max)?;
        if !self.growth_per_second.is_finite() || self.growth_per_second <= 0.0 {
            return Err(ConfigError::InvalidGrowth {
                value: self.growth_per_second,
            });
        }
        let reachable = self.engine_config().reachable_multiplier();
        if reachable < Multiplier::from_hundredths(MAX_CRASH_POINT_HUNDREDTHS) {
            return Err(ConfigError::FlightTooShort {
                max_flight_ms: self.max_flight_ms,
                reachable,
            });
        }
        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        self.log_level
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            phases: PhaseConfig::new(
                self.waiting_ms,
                self.betting_ms,
                self.cooldown_ms,
                self.max_flight_ms,
            ),
            growth_per_second: self.growth_per_second,
            min_stake: self.min_stake,
            max_stake: self.max_stake,
            history_capacity: self.history_capacity,
        }
    }

    pub fn mines_config(&self) -> MinesConfig {
        MinesConfig {
            min_stake: self.min_stake,
            max_stake: self.max_stake,
            paytable: MinesPaytable::with_edge_bps(self.mines_edge_bps),
        }
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, fallback: T) -> T {
    raw.and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(fallback)
}

fn ensure_nonzero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value });
    }
    Ok(())
}

fn ensure_ordered(field: &'static str, min: u64, max: u64) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::InvertedRange { field, min, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = CrashTableConfig::from_lookup(|_| None);
        assert_eq!(config, CrashTableConfig::default());
        config.validate().unwrap();
        assert_eq!(config.log_level().unwrap(), Level::INFO);
        assert!(config.engine_config().validate().is_ok());
    }

    #[test]
    fn test_reads_overrides() {
        let config = CrashTableConfig::from_lookup(lookup(&[
            ("CRASH_TABLE_BETTING_MS", "7000"),
            ("CRASH_TABLE_GROWTH_PER_SECOND", "0.08"),
            ("CRASH_TABLE_BOT_COUNT", " 3 "),
            ("CRASH_TABLE_CRASH_SEED", "99"),
            ("CRASH_TABLE_LOG_LEVEL", "debug"),
        ]));
        assert_eq!(config.betting_ms, 7_000);
        assert_eq!(config.growth_per_second, 0.08);
        assert_eq!(config.bot_count, 3);
        assert_eq!(config.crash_seed, Some(99));
        assert_eq!(config.log_level().unwrap(), Level::DEBUG);
        assert_eq!(config.engine_config().phases.betting_ms, 7_000);
    }

    #[test]
    fn test_unparsable_values_keep_defaults() {
        let config = CrashTableConfig::from_lookup(lookup(&[
            ("CRASH_TABLE_TICK_MS", "fast"),
            ("CRASH_TABLE_CRASH_SEED", ""),
        ]));
        assert_eq!(config.tick_ms, 100);
        assert_eq!(config.crash_seed, None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = CrashTableConfig {
            betting_ms: 0,
            ..CrashTableConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidNonZero {
                field: "betting_ms",
                value: 0
            })
        );

        let config = CrashTableConfig {
            min_stake: 500,
            max_stake: 100,
            ..CrashTableConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedRange { field: "stake", .. })
        ));

        let config = CrashTableConfig {
            growth_per_second: -0.1,
            ..CrashTableConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidGrowth { .. })));

        let config = CrashTableConfig {
            growth_per_second: 0.03,
            ..CrashTableConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FlightTooShort { max_flight_ms: 120_000, reachable })
                if reachable < Multiplier::from_hundredths(MAX_CRASH_POINT_HUNDREDTHS)
        ));

        let config = CrashTableConfig {
            log_level: "loud".to_string(),
            ..CrashTableConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLogLevel { .. })));
    }
}

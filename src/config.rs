use crate::{o_error, o_info};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Identity and endpoint settings, read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub token: String,
    pub account_token: String,
    pub callsign: String,
    pub faction: String,
    pub base_url: String,
    pub data_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            token: env::var("SPACETRADERS_TOKEN").unwrap_or_default(),
            account_token: env::var("SPACETRADERS_ACCOUNT_TOKEN").unwrap_or_default(),
            callsign: env::var("SPACETRADERS_CALLSIGN").unwrap_or_default(),
            faction: env::var("SPACETRADERS_FACTION").unwrap_or_else(|_| "COSMIC".to_string()),
            base_url: env::var("SPACETRADERS_BASE_URL")
                .unwrap_or_else(|_| crate::API_BASE_URL.to_string()),
            data_dir: env::var("SPACETRADERS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
        }
    }
}

/// Tunables loaded from `<data_dir>/fleet.toml`. Every field has a default,
/// so a missing or partial file is fine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub capital: CapitalConfig,
    pub scheduler: SchedulerConfig,
    pub fleet: FleetShipsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapitalConfig {
    /// Minimum balance before gate construction hauling is allowed
    pub gate_floor: i64,
    /// Minimum balance to start trade missions
    pub trade_min: i64,
    /// Below this balance, all cargo ships are parked
    pub idle_threshold: i64,
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            gate_floor: 300_000,
            trade_min: 50_000,
            idle_threshold: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Token refill rate per second (upstream API limit is 2/s)
    pub rate: f64,
    /// Maximum tokens held at once
    pub burst: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { rate: 2.0, burst: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetShipsConfig {
    /// Ships the commander must never touch
    pub skip_ships: Vec<String>,
    /// Ships that exist but should always stay parked
    pub disabled_ships: Vec<String>,
    /// Cap on cargo ships assigned to the active contract
    pub max_contract_ships: usize,
}

impl Default for FleetShipsConfig {
    fn default() -> Self {
        Self {
            skip_ships: Vec::new(),
            disabled_ships: Vec::new(),
            max_contract_ships: 2,
        }
    }
}

impl FleetConfig {
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(config) => {
                    o_info!("⚙️  Loaded fleet config from {}", path.display());
                    config
                }
                Err(e) => {
                    o_error!("❌ Invalid fleet config {}: {} - using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_capital_policy() {
        let config = FleetConfig::default();
        assert_eq!(config.capital.gate_floor, 300_000);
        assert_eq!(config.capital.trade_min, 50_000);
        assert_eq!(config.capital.idle_threshold, 30_000);
        assert_eq!(config.scheduler.rate, 2.0);
        assert_eq!(config.scheduler.burst, 10);
        assert_eq!(config.fleet.max_contract_ships, 2);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let parsed: FleetConfig = toml::from_str(
            "[capital]\ngate_floor = 500000\n",
        )
        .unwrap();
        assert_eq!(parsed.capital.gate_floor, 500_000);
        assert_eq!(parsed.capital.trade_min, 50_000);
        assert_eq!(parsed.scheduler.burst, 10);
    }
}

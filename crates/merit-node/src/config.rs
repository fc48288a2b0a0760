use anyhow::Result;
use merit_ledger::LedgerConfig;
use merit_reaper::ReaperConfig;
use merit_store::EventStoreConfig;
use merit_types::RepAmount;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSettings,
    pub store: StoreSettings,
    pub ledger: LedgerSettings,
    pub reaper: ReaperSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// In-memory event log window; durable storage keeps full history.
    pub event_retention: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    pub min_bond: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperSettings {
    pub enabled: bool,
    pub initial_delay_secs: u64,
    pub interval_secs: u64,
    pub jitter_percent: f64,
    pub slash_percent: f64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings {
                name: "merit-node".to_string(),
            },
            store: StoreSettings {
                event_retention: 1000,
            },
            ledger: LedgerSettings { min_bond: 1 },
            reaper: ReaperSettings {
                enabled: true,
                initial_delay_secs: 5,
                interval_secs: 300,
                jitter_percent: 0.10,
                slash_percent: 0.5,
            },
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(name) = env::var("NODE_ID") {
            if !name.is_empty() {
                self.node.name = name;
            }
        }
        if let Ok(retention) = env::var("MERIT_EVENT_RETENTION") {
            if let Ok(val) = retention.parse() {
                self.store.event_retention = val;
            }
        }
        if let Ok(min_bond) = env::var("MERIT_MIN_BOND") {
            if let Ok(val) = min_bond.parse() {
                self.ledger.min_bond = val;
            }
        }
        if let Ok(enabled) = env::var("REAPER_ENABLED") {
            self.reaper.enabled = enabled != "false";
        }
        if let Ok(interval) = env::var("REAPER_INTERVAL_SECS") {
            if let Ok(val) = interval.parse() {
                self.reaper.interval_secs = val;
            }
        }
        if let Ok(jitter) = env::var("REAPER_JITTER_PERCENT") {
            if let Ok(val) = jitter.parse() {
                self.reaper.jitter_percent = val;
            }
        }
        if let Ok(slash) = env::var("REAPER_SLASH_PERCENT") {
            if let Ok(val) = slash.parse() {
                self.reaper.slash_percent = val;
            }
        }
    }

    pub fn store_config(&self) -> EventStoreConfig {
        EventStoreConfig {
            retention: self.store.event_retention,
        }
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            min_bond: RepAmount::new(self.ledger.min_bond),
        }
    }

    pub fn reaper_config(&self) -> ReaperConfig {
        ReaperConfig {
            enabled: self.reaper.enabled,
            initial_delay: Duration::from_secs(self.reaper.initial_delay_secs),
            base_interval: Duration::from_secs(self.reaper.interval_secs),
            jitter_percent: self.reaper.jitter_percent,
            slash_percent: self.reaper.slash_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides() {
        env::set_var("NODE_ID", "merit-test");
        env::set_var("MERIT_EVENT_RETENTION", "250");
        env::set_var("MERIT_MIN_BOND", "100");
        env::set_var("REAPER_ENABLED", "false");
        env::set_var("REAPER_INTERVAL_SECS", "60");
        env::set_var("REAPER_SLASH_PERCENT", "0.25");

        let mut config = NodeConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.node.name, "merit-test");
        assert_eq!(config.store.event_retention, 250);
        assert_eq!(config.ledger.min_bond, 100);
        assert!(!config.reaper.enabled);
        assert_eq!(config.reaper.interval_secs, 60);
        assert_eq!(config.reaper.slash_percent, 0.25);

        env::remove_var("NODE_ID");
        env::remove_var("MERIT_EVENT_RETENTION");
        env::remove_var("MERIT_MIN_BOND");
        env::remove_var("REAPER_ENABLED");
        env::remove_var("REAPER_INTERVAL_SECS");
        env::remove_var("REAPER_SLASH_PERCENT");
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = NodeConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: NodeConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.store.event_retention, config.store.event_retention);
        assert_eq!(parsed.reaper.interval_secs, config.reaper.interval_secs);
    }
}

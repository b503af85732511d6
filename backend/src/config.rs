//! # Ledger Configuration
//!
//! Runtime settings for the ledger engine, resolved in three layers:
//!
//! 1. Built-in defaults (`LedgerConfig::default()`)
//! 2. An optional YAML file
//! 3. Environment overrides (`SITE_LEDGER_DATABASE_URL`, `SITE_LEDGER_LOG`)
//!
//! ## YAML Format
//!
//! ```yaml
//! database_url: "sqlite:site_ledger.db"
//! log_filter: "info"
//! invariant_tolerance: "0.01"
//! repair:
//!   concurrency: 4
//!   include_transaction_dates: false
//! ```

use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// The database URL used when nothing else is configured
pub const DATABASE_URL: &str = "sqlite:site_ledger.db";

pub const DATABASE_URL_ENV: &str = "SITE_LEDGER_DATABASE_URL";
pub const LOG_FILTER_ENV: &str = "SITE_LEDGER_LOG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub database_url: String,
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info,site_ledger=debug`
    pub log_filter: String,
    /// Largest accepted gap between `income - expenses` and the remaining balance
    pub invariant_tolerance: Decimal,
    pub repair: RepairConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// How many projects `repair-all` rebuilds at the same time
    pub concurrency: usize,
    /// Also rebuild dates that have transactions but no summary row yet
    pub include_transaction_dates: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: DATABASE_URL.to_string(),
            log_filter: "info".to_string(),
            invariant_tolerance: Decimal::new(1, 2),
            repair: RepairConfig::default(),
        }
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            include_transaction_dates: false,
        }
    }
}

impl LedgerConfig {
    /// Resolve the configuration from an optional YAML file plus the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => {
                debug!("No config file given, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML config file; missing keys fall back to defaults
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let yaml_content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: LedgerConfig = serde_yaml::from_str(&yaml_content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        info!("Loaded ledger config from {:?}", path);
        Ok(config)
    }

    /// Apply environment overrides using the given lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(DATABASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            debug!("Database URL overridden by {}", DATABASE_URL_ENV);
            self.database_url = url;
        }
        if let Some(filter) = lookup(LOG_FILTER_ENV).filter(|v| !v.trim().is_empty()) {
            self.log_filter = filter;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.invariant_tolerance <= Decimal::ZERO {
            return Err(anyhow!(
                "invariant_tolerance must be positive, got {}",
                self.invariant_tolerance
            ));
        }
        if self.repair.concurrency == 0 {
            return Err(anyhow!("repair.concurrency must be at least 1"));
        }
        Ok(())
    }
}

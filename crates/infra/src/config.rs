//! Workflow configuration.
//!
//! Values come from the environment; anything missing falls back to
//! [`WorkflowConfig::default`].

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use stockroom_lines::TaxRate;

pub const TAX_RATE_VAR: &str = "STOCKROOM_TAX_RATE";
pub const COMMIT_ATTEMPTS_VAR: &str = "STOCKROOM_COMMIT_ATTEMPTS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Captured on every new order.
    pub tax_rate: TaxRate,
    /// How often a workflow action is re-decided after losing an optimistic
    /// concurrency race. At least 1.
    pub max_commit_attempts: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            tax_rate: TaxRate::DEFAULT,
            max_commit_attempts: 3,
        }
    }
}

impl WorkflowConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(TAX_RATE_VAR) {
            let rate = Decimal::from_str(raw.trim()).map_err(|e| ConfigError::Invalid {
                key: TAX_RATE_VAR,
                reason: e.to_string(),
            })?;
            config.tax_rate = TaxRate::new(rate).map_err(|e| ConfigError::Invalid {
                key: TAX_RATE_VAR,
                reason: e.to_string(),
            })?;
        }

        if let Some(raw) = lookup(COMMIT_ATTEMPTS_VAR) {
            let attempts = raw.trim().parse::<u32>().map_err(|e| ConfigError::Invalid {
                key: COMMIT_ATTEMPTS_VAR,
                reason: e.to_string(),
            })?;
            if attempts == 0 {
                return Err(ConfigError::Invalid {
                    key: COMMIT_ATTEMPTS_VAR,
                    reason: "must be at least 1".to_string(),
                });
            }
            config.max_commit_attempts = attempts;
        }

        Ok(config)
    }
}

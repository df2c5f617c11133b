//! Module configuration fixed at deployment.

use crate::clock::DAY_SECS;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default inactivity threshold: 360 days.
pub const DEFAULT_INACTIVITY_THRESHOLD_SECS: u64 = 360 * DAY_SECS;

/// Longest accepted inactivity threshold: 100 years.
pub const MAX_INACTIVITY_THRESHOLD_DAYS: u64 = 100 * 365;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Inactivity threshold must be positive")]
    ZeroThreshold,

    #[error("Inactivity threshold of {0} seconds exceeds the 100-year maximum")]
    ThresholdTooLarge(u64),
}

/// How a fungible or native balance is split between heirs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistributionPolicy {
    /// `live balance / registered heirs` at the moment of each claim.
    #[default]
    RegisteredHeirs,
    /// `live balance / heirs that have not yet claimed this asset`.
    /// The last claimant sweeps whatever is left.
    RemainingHeirs,
}

/// Succession module settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Seconds without a heartbeat before a wallet may be proposed dead.
    /// Elapsed time must be strictly greater.
    #[serde(default = "default_threshold")]
    pub inactivity_threshold_secs: u64,

    #[serde(default)]
    pub distribution: DistributionPolicy,
}

fn default_threshold() -> u64 {
    DEFAULT_INACTIVITY_THRESHOLD_SECS
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold_secs: DEFAULT_INACTIVITY_THRESHOLD_SECS,
            distribution: DistributionPolicy::default(),
        }
    }
}

impl ModuleConfig {
    /// Threshold given in days. Out-of-range values saturate and are
    /// rejected by [`validate`](Self::validate).
    pub fn with_threshold_days(days: u64) -> Self {
        Self {
            inactivity_threshold_secs: days.saturating_mul(DAY_SECS),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inactivity_threshold_secs == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.inactivity_threshold_secs > MAX_INACTIVITY_THRESHOLD_DAYS * DAY_SECS {
            return Err(ConfigError::ThresholdTooLarge(self.inactivity_threshold_secs));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_360_days() {
        let config = ModuleConfig::default();
        assert_eq!(config.inactivity_threshold_secs, 360 * 86_400);
        assert_eq!(config.distribution, DistributionPolicy::RegisteredHeirs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let config = ModuleConfig::with_threshold_days(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroThreshold));
    }

    #[test]
    fn test_oversized_threshold_rejected() {
        let config = ModuleConfig::with_threshold_days(u64::MAX / DAY_SECS + 1);
        assert_eq!(config.inactivity_threshold_secs, u64::MAX);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ThresholdTooLarge(u64::MAX))
        );

        assert!(ModuleConfig::with_threshold_days(MAX_INACTIVITY_THRESHOLD_DAYS)
            .validate()
            .is_ok());
        assert!(ModuleConfig::with_threshold_days(MAX_INACTIVITY_THRESHOLD_DAYS + 1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_serde_defaults() {
        let config: ModuleConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ModuleConfig::default());

        let config: ModuleConfig =
            serde_json::from_str(r#"{"distribution":"remaining-heirs"}"#).unwrap();
        assert_eq!(config.distribution, DistributionPolicy::RemainingHeirs);
    }
}

//! Keeper configuration, parsed from TOML file + environment variable overrides.
//!
//! Priority: environment variables > config file > defaults.

use anyhow::{Context, Result};
use lastwill_succession::{
    Address, DistributionPolicy, LivenessConfig, ModuleConfig, DAY_SECS,
    MAX_INACTIVITY_THRESHOLD_DAYS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Top-level keeper configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeeperConfig {
    /// General keeper settings
    #[serde(default)]
    pub keeper: KeeperSection,

    /// Succession module parameters
    #[serde(default)]
    pub succession: SuccessionSection,

    /// When to warn about approaching inactivity
    #[serde(default)]
    pub liveness: LivenessConfig,

    /// Wallets to watch. Empty means every wallet in the state file.
    #[serde(default)]
    pub wallets: Vec<WatchedWallet>,
}

/// General keeper settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperSection {
    /// Data directory (state snapshot)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Check interval in seconds (default: 1 hour)
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Call `propose` on wallets past the threshold
    #[serde(default = "default_true")]
    pub auto_propose: bool,

    /// Call `settle` on wallets with a valid proposal
    #[serde(default = "default_true")]
    pub auto_settle: bool,

    /// Address the module is enabled under on managed wallets
    #[serde(default = "default_module_address")]
    pub module_address: String,
}

impl Default for KeeperSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            check_interval_secs: default_check_interval(),
            log_level: default_log_level(),
            auto_propose: true,
            auto_settle: true,
            module_address: default_module_address(),
        }
    }
}

/// Succession module parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessionSection {
    /// Inactivity threshold in days
    #[serde(default = "default_threshold_days")]
    pub inactivity_threshold_days: u64,

    /// How fungible balances are split between heirs
    #[serde(default)]
    pub distribution: DistributionPolicy,
}

impl Default for SuccessionSection {
    fn default() -> Self {
        Self {
            inactivity_threshold_days: default_threshold_days(),
            distribution: DistributionPolicy::default(),
        }
    }
}

/// A wallet the keeper should look after
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedWallet {
    /// Human-readable label
    pub label: String,

    /// Wallet address (0x-prefixed hex)
    pub address: String,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data")
}

fn default_check_interval() -> u64 {
    3600 // 1 hour
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_module_address() -> String {
    Address::ZERO.to_string()
}

fn default_threshold_days() -> u64 {
    360
}

// ============================================================================
// Loading & environment override
// ============================================================================

impl KeeperConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: KeeperConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `LASTWILL_DATA_DIR`
    /// - `LASTWILL_CHECK_INTERVAL`
    /// - `LASTWILL_LOG_LEVEL`
    /// - `LASTWILL_THRESHOLD_DAYS`
    /// - `LASTWILL_AUTO_PROPOSE`
    /// - `LASTWILL_AUTO_SETTLE`
    /// - `LASTWILL_MODULE_ADDRESS`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LASTWILL_DATA_DIR") {
            self.keeper.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("LASTWILL_CHECK_INTERVAL") {
            if let Ok(secs) = v.parse::<u64>() {
                self.keeper.check_interval_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("LASTWILL_LOG_LEVEL") {
            self.keeper.log_level = v;
        }
        if let Ok(v) = std::env::var("LASTWILL_THRESHOLD_DAYS") {
            if let Ok(days) = v.parse::<u64>() {
                self.succession.inactivity_threshold_days = days;
            }
        }
        if let Ok(v) = std::env::var("LASTWILL_AUTO_PROPOSE") {
            if let Ok(flag) = v.parse::<bool>() {
                self.keeper.auto_propose = flag;
            }
        }
        if let Ok(v) = std::env::var("LASTWILL_AUTO_SETTLE") {
            if let Ok(flag) = v.parse::<bool>() {
                self.keeper.auto_settle = flag;
            }
        }
        if let Ok(v) = std::env::var("LASTWILL_MODULE_ADDRESS") {
            self.keeper.module_address = v;
        }
    }

    /// Module settings derived from the `[succession]` section.
    pub fn module_config(&self) -> Result<ModuleConfig> {
        let days = self.succession.inactivity_threshold_days;
        let inactivity_threshold_secs = days
            .checked_mul(DAY_SECS)
            .with_context(|| format!("succession.inactivity_threshold_days = {} overflows", days))?;

        let config = ModuleConfig {
            inactivity_threshold_secs,
            distribution: self.succession.distribution,
        };
        config
            .validate()
            .context("succession section is invalid")?;
        Ok(config)
    }

    /// Parsed module address.
    pub fn module_address(&self) -> Result<Address> {
        Address::from_str(&self.keeper.module_address)
            .with_context(|| format!("Invalid module address: {}", self.keeper.module_address))
    }

    /// Parsed watch list as `(label, address)`.
    pub fn watched_wallets(&self) -> Result<Vec<(String, Address)>> {
        self.wallets
            .iter()
            .map(|w| {
                let address = Address::from_str(&w.address).with_context(|| {
                    format!("Invalid address for wallet '{}': {}", w.label, w.address)
                })?;
                Ok((w.label.clone(), address))
            })
            .collect()
    }

    /// Path of the persisted module state.
    pub fn state_path(&self) -> PathBuf {
        self.keeper.data_dir.join("succession_state.json")
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        // Threshold must be positive
        anyhow::ensure!(
            self.succession.inactivity_threshold_days > 0,
            "succession.inactivity_threshold_days must be > 0"
        );
        anyhow::ensure!(
            self.succession.inactivity_threshold_days <= MAX_INACTIVITY_THRESHOLD_DAYS,
            "succession.inactivity_threshold_days must be <= {}",
            MAX_INACTIVITY_THRESHOLD_DAYS
        );
        self.module_config()?;

        // Check interval must be at least 60 seconds
        anyhow::ensure!(
            self.keeper.check_interval_secs >= 60,
            "keeper.check_interval_secs must be >= 60"
        );

        self.liveness
            .validate()
            .context("liveness thresholds are invalid")?;

        self.module_address()?;
        self.watched_wallets()?;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn minimal_toml() -> &'static str {
        r#"
[keeper]
data_dir = "/tmp/lastwill"
"#
    }

    fn full_toml() -> &'static str {
        r#"
[keeper]
data_dir = "/custom/data"
check_interval_secs = 600
log_level = "debug"
auto_propose = true
auto_settle = false
module_address = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee"

[succession]
inactivity_threshold_days = 180
distribution = "remaining-heirs"

[liveness]
checkin_threshold = 0.3
critical_threshold = 0.8

[[wallets]]
label = "family-safe"
address = "0x168dd867b3d896c5cb80dd4e759b3aa14e321d57"

[[wallets]]
label = "treasury"
address = "0x1616161616161616161616161616161616161616"
"#
    }

    fn load(toml: &str) -> KeeperConfig {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", toml).unwrap();
        KeeperConfig::from_file(file.path()).unwrap()
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = load(minimal_toml());
        assert_eq!(config.keeper.data_dir, PathBuf::from("/tmp/lastwill"));
        assert_eq!(config.keeper.check_interval_secs, 3600); // default
        assert!(config.keeper.auto_propose);
        assert!(config.keeper.auto_settle);
        assert_eq!(config.succession.inactivity_threshold_days, 360);
        assert!(config.wallets.is_empty());
        assert_eq!(config.module_address().unwrap(), Address::ZERO);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = load("");
        assert_eq!(config.keeper.data_dir, PathBuf::from("/data"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config = load(full_toml());

        assert_eq!(config.keeper.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.keeper.check_interval_secs, 600);
        assert_eq!(config.keeper.log_level, "debug");
        assert!(!config.keeper.auto_settle);
        assert_eq!(config.succession.distribution, DistributionPolicy::RemainingHeirs);
        assert!((config.liveness.checkin_threshold - 0.3).abs() < f64::EPSILON);

        let module = config.module_config().unwrap();
        assert_eq!(module.inactivity_threshold_secs, 180 * 86_400);

        let wallets = config.watched_wallets().unwrap();
        assert_eq!(wallets.len(), 2);
        assert_eq!(wallets[0].0, "family-safe");
        assert_eq!(wallets[1].1, Address::repeat_byte(0x16));
        assert_eq!(config.module_address().unwrap(), Address::repeat_byte(0xee));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = load(minimal_toml());

        std::env::set_var("LASTWILL_DATA_DIR", "/env/data");
        std::env::set_var("LASTWILL_CHECK_INTERVAL", "1800");
        std::env::set_var("LASTWILL_THRESHOLD_DAYS", "90");
        std::env::set_var("LASTWILL_AUTO_SETTLE", "false");

        config.apply_env_overrides();

        assert_eq!(config.keeper.data_dir, PathBuf::from("/env/data"));
        assert_eq!(config.keeper.check_interval_secs, 1800);
        assert_eq!(config.succession.inactivity_threshold_days, 90);
        assert!(!config.keeper.auto_settle);

        // Clean up
        std::env::remove_var("LASTWILL_DATA_DIR");
        std::env::remove_var("LASTWILL_CHECK_INTERVAL");
        std::env::remove_var("LASTWILL_THRESHOLD_DAYS");
        std::env::remove_var("LASTWILL_AUTO_SETTLE");
    }

    #[test]
    fn test_validation_zero_threshold() {
        let config = load(
            r#"
[succession]
inactivity_threshold_days = 0
"#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_threshold_overflow() {
        let mut config = load(minimal_toml());
        config.succession.inactivity_threshold_days = u64::MAX / DAY_SECS + 1;
        assert!(config.module_config().is_err());
        assert!(config.validate().is_err());

        config.succession.inactivity_threshold_days = MAX_INACTIVITY_THRESHOLD_DAYS + 1;
        assert!(config.validate().is_err());

        config.succession.inactivity_threshold_days = MAX_INACTIVITY_THRESHOLD_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_check_interval_too_low() {
        let config = load(
            r#"
[keeper]
check_interval_secs = 30
"#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bad_wallet_address() {
        let config = load(
            r#"
[[wallets]]
label = "broken"
address = "0x1234"
"#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bad_liveness() {
        let config = load(
            r#"
[liveness]
checkin_threshold = 0.9
critical_threshold = 0.5
"#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = load(full_toml());
        let serialized = toml::to_string_pretty(&config).unwrap();

        let reparsed: KeeperConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(
            reparsed.succession.inactivity_threshold_days,
            config.succession.inactivity_threshold_days
        );
        assert_eq!(reparsed.wallets.len(), config.wallets.len());
    }
}

//! Persistent snapshot of the succession module
//!
//! Everything the module owns per wallet, serializable to JSON so a keeper
//! can pick up where it left off after a restart.

use crate::assets::AssetConfiguration;
use crate::config::ModuleConfig;
use crate::ledger::ClaimLedger;
use crate::record::{SuccessionStatus, WalletSuccessionRecord};
use crate::types::{Address, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Errors from state operations
#[derive(Error, Debug)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("State was written by a module with {stored:?}, refusing to run with {requested:?}")]
    ConfigMismatch {
        stored: ModuleConfig,
        requested: ModuleConfig,
    },
}

/// Everything the module keeps for one wallet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletState {
    /// Liveness record; `None` until the first heartbeat
    pub record: Option<WalletSuccessionRecord>,
    /// Registered assets and heirs
    #[serde(default)]
    pub assets: AssetConfiguration,
    /// Paid claims; stays empty until settlement
    #[serde(default)]
    pub ledger: ClaimLedger,
}

impl WalletState {
    pub fn status(&self) -> Option<SuccessionStatus> {
        self.record.as_ref().map(|r| r.status)
    }

    pub fn is_settled(&self) -> bool {
        self.record.as_ref().is_some_and(|r| r.is_settled())
    }
}

/// Full module state (all wallets)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessionState {
    /// Managed wallets by address
    pub wallets: BTreeMap<Address, WalletState>,
    /// When this snapshot was taken (unix timestamp)
    pub taken_at: Option<Timestamp>,
    /// Configuration of the module that wrote the snapshot
    #[serde(default)]
    pub module: Option<ModuleConfig>,
}

impl SuccessionState {
    /// Create empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Load state from file, or create empty if not exists
    pub fn load(path: &Path) -> Result<Self, StateError> {
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            let state: SuccessionState = serde_json::from_str(&contents)?;
            Ok(state)
        } else {
            Ok(Self::new())
        }
    }

    /// Save state to file.
    ///
    /// Writes a sibling temp file and renames it over `path`, so readers see
    /// either the old snapshot or the new one.
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        let tmp_path = temp_path(path);
        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// The configuration to run with.
    ///
    /// A snapshot remembers the configuration of the module that wrote it;
    /// resuming under a different one would move every deadline. Fresh
    /// state adopts `requested`.
    pub fn resolve_config(&self, requested: &ModuleConfig) -> Result<ModuleConfig, StateError> {
        match &self.module {
            Some(stored) if stored != requested => Err(StateError::ConfigMismatch {
                stored: stored.clone(),
                requested: requested.clone(),
            }),
            Some(stored) => Ok(stored.clone()),
            None => Ok(requested.clone()),
        }
    }

    /// Replace `wallet`'s record with `updated` only if it still equals
    /// `base`, the record the change was computed from.
    ///
    /// Returns `false` and leaves the state alone when something else
    /// advanced the record in the meantime.
    pub fn merge_record(
        &mut self,
        wallet: &Address,
        base: &WalletSuccessionRecord,
        updated: WalletSuccessionRecord,
    ) -> bool {
        match self.wallets.get_mut(wallet) {
            Some(ws) if ws.record.as_ref() == Some(base) => {
                ws.record = Some(updated);
                true
            }
            _ => false,
        }
    }

    pub fn get_wallet(&self, wallet: &Address) -> Option<&WalletState> {
        self.wallets.get(wallet)
    }

    /// All wallet addresses, sorted
    pub fn wallet_addresses(&self) -> Vec<Address> {
        self.wallets.keys().copied().collect()
    }

    /// Number of wallets in each status. Wallets without a record are skipped.
    pub fn count_by_status(&self, status: SuccessionStatus) -> usize {
        self.wallets
            .values()
            .filter(|w| w.status() == Some(status))
            .count()
    }
}

fn temp_path(path: &Path) -> std::path::PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

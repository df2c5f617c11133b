//! Liveness evaluation for managed wallets.
//!
//! Pure logic with no I/O and no locking. Takes a record and a time,
//! returns a recommendation. Owners use it to know when to transact again;
//! keepers use it to know which wallets can be proposed or settled.
//!
//! # How It Works
//!
//! Every wallet transaction resets the inactivity clock. Evaluation measures
//! how much of the threshold has elapsed:
//!
//! ```text
//! |--- Healthy ---|--- CheckinRecommended ---|--- CheckinRequired ---|--- Proposable
//! 0%             50%                        90%                    100%
//! ```
//!
//! Proposed wallets are `Settleable`, settled ones `Settled`.

use crate::record::{SuccessionStatus, WalletSuccessionRecord};
use crate::types::{Address, Timestamp};
use serde::{Deserialize, Serialize};

/// When to nudge owners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// Fraction of the threshold elapsed before recommending activity (0.0–1.0).
    /// Default: 0.5 (halfway point).
    #[serde(default = "default_checkin")]
    pub checkin_threshold: f64,

    /// Fraction of the threshold elapsed before activity is critical (0.0–1.0).
    /// Default: 0.9.
    #[serde(default = "default_critical")]
    pub critical_threshold: f64,
}

fn default_checkin() -> f64 {
    0.5
}

fn default_critical() -> f64 {
    0.9
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            checkin_threshold: default_checkin(),
            critical_threshold: default_critical(),
        }
    }
}

impl LivenessConfig {
    /// Validate that thresholds are sensible.
    pub fn validate(&self) -> Result<(), LivenessError> {
        if self.checkin_threshold <= 0.0 || self.checkin_threshold >= 1.0 {
            return Err(LivenessError::InvalidThreshold(
                "checkin_threshold must be between 0.0 and 1.0 exclusive".into(),
            ));
        }
        if self.critical_threshold <= self.checkin_threshold || self.critical_threshold >= 1.0 {
            return Err(LivenessError::InvalidThreshold(
                "critical_threshold must be between checkin_threshold and 1.0 exclusive".into(),
            ));
        }
        Ok(())
    }
}

/// What the evaluation recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LivenessAction {
    /// Far from the threshold. No action needed.
    Healthy,
    /// Past the check-in fraction. Owners should transact soon.
    CheckinRecommended,
    /// Past the critical fraction. Owners must transact now.
    CheckinRequired,
    /// Threshold exceeded. Anyone may propose.
    Proposable,
    /// Proposal pending and still valid. Anyone may settle.
    Settleable,
    /// Succession is final.
    Settled,
}

impl LivenessAction {
    /// Lower is more urgent.
    fn priority(self) -> u8 {
        match self {
            LivenessAction::Settleable => 0,
            LivenessAction::Proposable => 1,
            LivenessAction::CheckinRequired => 2,
            LivenessAction::CheckinRecommended => 3,
            LivenessAction::Healthy => 4,
            LivenessAction::Settled => 5,
        }
    }

    /// A keeper can move the wallet forward.
    pub fn is_actionable(self) -> bool {
        matches!(self, LivenessAction::Proposable | LivenessAction::Settleable)
    }
}

/// Full liveness status for a wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessStatus {
    pub wallet: Address,
    pub status: SuccessionStatus,
    /// Fraction of the threshold elapsed (0.0–1.0+).
    pub elapsed_fraction: f64,
    /// Seconds until the wallet becomes proposable (negative once past).
    pub seconds_remaining: i64,
    /// Recommended action.
    pub action: LivenessAction,
}

/// Errors from liveness evaluation.
#[derive(Debug, thiserror::Error)]
pub enum LivenessError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
}

/// Evaluate one wallet's record at `now`.
///
/// # Arguments
/// * `wallet`: the wallet address (for reporting)
/// * `record`: its liveness record
/// * `now`: current unix time
/// * `threshold_secs`: the module's inactivity threshold
/// * `config`: nudge fractions
pub fn evaluate_liveness(
    wallet: &Address,
    record: &WalletSuccessionRecord,
    now: Timestamp,
    threshold_secs: u64,
    config: &LivenessConfig,
) -> LivenessStatus {
    let elapsed = record.inactive_for(now);
    let elapsed_fraction = if threshold_secs == 0 {
        1.0 // Degenerate case: zero threshold is always exceeded
    } else {
        elapsed as f64 / threshold_secs as f64
    };
    // Proposable once elapsed > threshold, i.e. at threshold + 1
    let seconds_remaining = i64::try_from(threshold_secs)
        .unwrap_or(i64::MAX)
        .saturating_add(1)
        .saturating_sub(i64::try_from(elapsed).unwrap_or(i64::MAX));

    let action = match record.status {
        SuccessionStatus::Settled => LivenessAction::Settled,
        SuccessionStatus::Proposed if record.has_live_proposal() => LivenessAction::Settleable,
        _ if record.is_inactive(now, threshold_secs) => LivenessAction::Proposable,
        _ if elapsed_fraction >= config.critical_threshold => LivenessAction::CheckinRequired,
        _ if elapsed_fraction >= config.checkin_threshold => LivenessAction::CheckinRecommended,
        _ => LivenessAction::Healthy,
    };

    LivenessStatus {
        wallet: *wallet,
        status: record.status,
        elapsed_fraction,
        seconds_remaining,
        action,
    }
}

/// Batch evaluate many wallets.
///
/// Returns statuses sorted by urgency (most urgent first), ties broken by
/// elapsed fraction (longest inactive first).
pub fn evaluate_batch(
    records: &[(Address, WalletSuccessionRecord)],
    now: Timestamp,
    threshold_secs: u64,
    config: &LivenessConfig,
) -> Vec<LivenessStatus> {
    let mut statuses: Vec<LivenessStatus> = records
        .iter()
        .map(|(wallet, record)| evaluate_liveness(wallet, record, now, threshold_secs, config))
        .collect();

    statuses.sort_by(|a, b| {
        a.action.priority().cmp(&b.action.priority()).then(
            a.elapsed_fraction
                .partial_cmp(&b.elapsed_fraction)
                .unwrap_or(std::cmp::Ordering::Equal)
                .reverse(),
        )
    });

    statuses
}

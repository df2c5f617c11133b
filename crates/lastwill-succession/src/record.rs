//! Per-wallet liveness record and its transitions.
//!
//! Pure logic: every transition takes `now` and the threshold explicitly, so
//! the module decides where time comes from.

use crate::error::SuccessionError;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuccessionStatus {
    /// Owners are presumed alive.
    Active,
    /// Someone declared the wallet dead; any heartbeat cancels this.
    Proposed,
    /// Terminal. Claims are open.
    Settled,
}

/// Liveness state of one managed wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSuccessionRecord {
    pub status: SuccessionStatus,
    /// Timestamp of the most recent heartbeat.
    pub last_activity: Timestamp,
    /// Liveness generation, incremented on every heartbeat.
    pub epoch: u64,
    /// Epoch the pending proposal belongs to. `None` while Active; kept
    /// after settlement for audit.
    pub proposal_epoch: Option<u64>,
    /// When the pending (or settled) proposal was created. Audit only.
    pub proposal_timestamp: Option<Timestamp>,
}

impl WalletSuccessionRecord {
    /// Record created by a wallet's first heartbeat.
    pub fn new(now: Timestamp) -> Self {
        Self {
            status: SuccessionStatus::Active,
            last_activity: now,
            epoch: 1,
            proposal_epoch: None,
            proposal_timestamp: None,
        }
    }

    /// Seconds since the last heartbeat (zero if the clock went backwards).
    pub fn inactive_for(&self, now: Timestamp) -> u64 {
        now.saturating_sub(self.last_activity)
    }

    /// Strictly more than `threshold` seconds without a heartbeat.
    pub fn is_inactive(&self, now: Timestamp, threshold: u64) -> bool {
        self.inactive_for(now) > threshold
    }

    /// A proposal exists and no heartbeat has invalidated it.
    pub fn has_live_proposal(&self) -> bool {
        self.status == SuccessionStatus::Proposed && self.proposal_epoch == Some(self.epoch)
    }

    /// Record owner activity.
    ///
    /// Returns `true` if a pending proposal was cancelled.
    pub fn heartbeat(&mut self, now: Timestamp) -> bool {
        // Keep last_activity monotonic even if callers race with a skewed clock.
        self.last_activity = self.last_activity.max(now);
        self.epoch = self.epoch.saturating_add(1);

        if self.status == SuccessionStatus::Proposed {
            self.status = SuccessionStatus::Active;
            self.proposal_epoch = None;
            self.proposal_timestamp = None;
            true
        } else {
            false
        }
    }

    /// First phase: declare the wallet dead.
    pub fn propose(&mut self, now: Timestamp, threshold: u64) -> Result<(), SuccessionError> {
        if self.has_live_proposal() {
            return Err(SuccessionError::DuplicateProposal);
        }
        if self.status != SuccessionStatus::Active || !self.is_inactive(now, threshold) {
            return Err(SuccessionError::NotDead);
        }

        self.status = SuccessionStatus::Proposed;
        self.proposal_epoch = Some(self.epoch);
        self.proposal_timestamp = Some(now);
        Ok(())
    }

    /// Second phase: make succession final.
    pub fn settle(&mut self, now: Timestamp, threshold: u64) -> Result<(), SuccessionError> {
        if !self.has_live_proposal() || !self.is_inactive(now, threshold) {
            return Err(SuccessionError::NotDead);
        }

        self.status = SuccessionStatus::Settled;
        Ok(())
    }

    pub fn is_settled(&self) -> bool {
        self.status == SuccessionStatus::Settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::DAY_SECS;

    const THRESHOLD: u64 = 360 * DAY_SECS;
    const T0: Timestamp = 1_700_000_000;

    #[test]
    fn test_new_record_is_active() {
        let record = WalletSuccessionRecord::new(T0);
        assert_eq!(record.status, SuccessionStatus::Active);
        assert_eq!(record.epoch, 1);
        assert!(record.proposal_epoch.is_none());
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut record = WalletSuccessionRecord::new(T0);
        assert_eq!(
            record.propose(T0 + THRESHOLD, THRESHOLD),
            Err(SuccessionError::NotDead)
        );
        assert!(record.propose(T0 + THRESHOLD + 1, THRESHOLD).is_ok());
        assert_eq!(record.status, SuccessionStatus::Proposed);
        assert_eq!(record.proposal_epoch, Some(1));
        assert_eq!(record.proposal_timestamp, Some(T0 + THRESHOLD + 1));
    }

    #[test]
    fn test_duplicate_proposal() {
        let mut record = WalletSuccessionRecord::new(T0);
        let later = T0 + 361 * DAY_SECS;
        record.propose(later, THRESHOLD).unwrap();
        assert_eq!(
            record.propose(later, THRESHOLD),
            Err(SuccessionError::DuplicateProposal)
        );
    }

    #[test]
    fn test_heartbeat_cancels_proposal() {
        let mut record = WalletSuccessionRecord::new(T0);
        let later = T0 + 361 * DAY_SECS;
        record.propose(later, THRESHOLD).unwrap();

        assert!(record.heartbeat(later + 1));
        assert_eq!(record.status, SuccessionStatus::Active);
        assert_eq!(record.epoch, 2);
        assert!(record.proposal_epoch.is_none());

        // A second heartbeat has nothing left to cancel
        assert!(!record.heartbeat(later + 2));
        assert_eq!(record.epoch, 3);
    }

    #[test]
    fn test_settle_requires_live_proposal() {
        let mut record = WalletSuccessionRecord::new(T0);
        let later = T0 + 400 * DAY_SECS;
        assert_eq!(record.settle(later, THRESHOLD), Err(SuccessionError::NotDead));

        record.propose(later, THRESHOLD).unwrap();
        record.heartbeat(later);
        assert_eq!(
            record.settle(later + THRESHOLD + 1, THRESHOLD),
            Err(SuccessionError::NotDead)
        );
    }

    #[test]
    fn test_settle_rechecks_threshold() {
        let mut record = WalletSuccessionRecord::new(T0);
        let later = T0 + 361 * DAY_SECS;
        record.propose(later, THRESHOLD).unwrap();
        // A clock that jumped backwards must not settle a fresh wallet
        assert_eq!(record.settle(T0 + 10, THRESHOLD), Err(SuccessionError::NotDead));
        assert!(record.settle(later + DAY_SECS, THRESHOLD).is_ok());
        assert!(record.is_settled());
    }

    #[test]
    fn test_settled_is_terminal() {
        let mut record = WalletSuccessionRecord::new(T0);
        let later = T0 + 361 * DAY_SECS;
        record.propose(later, THRESHOLD).unwrap();
        record.settle(later, THRESHOLD).unwrap();

        assert!(!record.heartbeat(later + 5));
        assert_eq!(record.status, SuccessionStatus::Settled);
        assert_eq!(record.last_activity, later + 5);

        let far = later + 1000 * DAY_SECS;
        assert_eq!(record.propose(far, THRESHOLD), Err(SuccessionError::NotDead));
        assert_eq!(record.settle(far, THRESHOLD), Err(SuccessionError::NotDead));
        assert_eq!(record.status, SuccessionStatus::Settled);
    }

    #[test]
    fn test_last_activity_is_monotonic() {
        let mut record = WalletSuccessionRecord::new(T0);
        record.heartbeat(T0 - 100);
        assert_eq!(record.last_activity, T0);
        assert_eq!(record.inactive_for(T0 - 100), 0);
    }
}

//! The daemon loop: periodically scans managed wallets and pokes the switch.

use crate::config::KeeperConfig;
use anyhow::{Context, Result};
use lastwill_succession::{
    evaluate_batch, Address, Clock, LivenessAction, ModuleConfig, SuccessionEvent,
    SuccessionModule, SuccessionState, SuccessionStatus, SystemClock, Timestamp,
    WalletSuccessionRecord,
};
use std::path::Path;
use std::time::Duration;

/// What one check cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Wallets evaluated
    pub evaluated: usize,
    /// Wallets proposed this cycle
    pub proposed: Vec<Address>,
    /// Wallets settled this cycle
    pub settled: Vec<Address>,
    /// Wallets whose owners should check in soon
    pub needs_checkin: Vec<Address>,
}

/// Run the daemon loop. Blocks forever (until shutdown signal).
pub async fn run(config: KeeperConfig) -> Result<()> {
    log::info!("LastWill keeper starting…");
    log::info!(
        "  Threshold:  {} days",
        config.succession.inactivity_threshold_days
    );
    log::info!(
        "  Interval:   {} seconds ({:.1} hours)",
        config.keeper.check_interval_secs,
        config.keeper.check_interval_secs as f64 / 3600.0
    );
    log::info!("  Data dir:   {}", config.keeper.data_dir.display());
    log::info!(
        "  Auto:       propose={} settle={}",
        config.keeper.auto_propose,
        config.keeper.auto_settle
    );

    // Ensure data directory exists
    std::fs::create_dir_all(&config.keeper.data_dir).with_context(|| {
        format!(
            "Failed to create data dir: {}",
            config.keeper.data_dir.display()
        )
    })?;

    let interval = Duration::from_secs(config.keeper.check_interval_secs);

    // Run first check immediately, then loop
    let mut first = true;
    loop {
        if !first {
            log::info!(
                "Sleeping {} seconds until next check…",
                config.keeper.check_interval_secs
            );
            tokio::time::sleep(interval).await;
        }
        first = false;

        match run_check_cycle(&config).await {
            Ok(report) => log::info!(
                "Check cycle completed: {} evaluated, {} proposed, {} settled, {} need a check-in.",
                report.evaluated,
                report.proposed.len(),
                report.settled.len(),
                report.needs_checkin.len()
            ),
            Err(e) => log::error!("Check cycle failed: {:#}", e),
        }
    }
}

/// Execute a single check cycle against the wall clock.
pub async fn run_check_cycle(config: &KeeperConfig) -> Result<CycleReport> {
    check_cycle_with_clock(config, SystemClock)
}

/// Load the snapshot, evaluate every watched wallet, advance the ones past
/// their threshold and write the snapshot back.
fn check_cycle_with_clock(config: &KeeperConfig, clock: impl Clock + 'static) -> Result<CycleReport> {
    let pending = advance(config, clock)?;
    pending.commit(&config.state_path())
}

/// A cycle whose transitions have been computed but not yet written.
struct PendingCycle {
    /// State as loaded at the start of the cycle
    base: SuccessionState,
    module: SuccessionModule,
    report: CycleReport,
}

fn advance(config: &KeeperConfig, clock: impl Clock + 'static) -> Result<PendingCycle> {
    log::info!("Starting check cycle…");

    let state_path = config.state_path();
    let base = SuccessionState::load(&state_path)
        .with_context(|| format!("Failed to load state from {}", state_path.display()))?;

    let module = SuccessionModule::resume(
        config.module_address()?,
        &config.module_config()?,
        clock,
        base.clone(),
    )
    .with_context(|| format!("Configuration does not match {}", state_path.display()))?;
    let now = module.now();
    log::info!("Now: {}  |  Wallets: {}", format_timestamp(now), module.wallet_count());

    let records = watched_records(config, &module)?;
    let statuses = evaluate_batch(
        &records,
        now,
        module.config().inactivity_threshold_secs,
        &config.liveness,
    );

    let mut report = CycleReport {
        evaluated: statuses.len(),
        ..CycleReport::default()
    };

    for status in &statuses {
        match status.action {
            LivenessAction::Proposable if config.keeper.auto_propose => {
                match module.propose(&status.wallet) {
                    Ok(epoch) => {
                        log::warn!("[{}] Proposed at epoch {}", status.wallet, epoch);
                        report.proposed.push(status.wallet);
                    }
                    Err(e) => log::error!("[{}] Propose failed: {}", status.wallet, e),
                }
            }
            LivenessAction::Settleable if config.keeper.auto_settle => {
                match module.settle(&status.wallet) {
                    Ok(()) => {
                        log::warn!("[{}] 🔴 Settled, claims are open", status.wallet);
                        report.settled.push(status.wallet);
                    }
                    Err(e) => log::error!("[{}] Settle failed: {}", status.wallet, e),
                }
            }
            LivenessAction::CheckinRequired => {
                log::warn!(
                    "[{}] ⚠️  Check-in required: {:.1} days until proposable",
                    status.wallet,
                    status.seconds_remaining as f64 / 86_400.0
                );
                report.needs_checkin.push(status.wallet);
            }
            LivenessAction::CheckinRecommended => {
                log::info!(
                    "[{}] Check-in recommended ({:.0}% of threshold elapsed)",
                    status.wallet,
                    status.elapsed_fraction * 100.0
                );
                report.needs_checkin.push(status.wallet);
            }
            action => log::debug!("[{}] {:?}", status.wallet, action),
        }
    }

    for event in module.take_events() {
        log_event(&event);
    }

    Ok(PendingCycle {
        base,
        module,
        report,
    })
}

impl PendingCycle {
    /// Write this cycle's transitions into the latest state on disk.
    ///
    /// The file is re-read first, so activity recorded by another writer
    /// while the cycle ran survives. A transition computed from a record
    /// that has since moved on is dropped; the next cycle re-evaluates it.
    fn commit(self, state_path: &Path) -> Result<CycleReport> {
        let PendingCycle {
            base,
            module,
            mut report,
        } = self;

        let mut latest = SuccessionState::load(state_path)
            .with_context(|| format!("Failed to reload state from {}", state_path.display()))?;
        latest
            .resolve_config(module.config())
            .with_context(|| format!("Configuration of {} changed during the cycle", state_path.display()))?;

        let snapshot = module.snapshot();
        let changed: Vec<Address> = report.proposed.iter().chain(&report.settled).copied().collect();
        for wallet in changed {
            let before = base.get_wallet(&wallet).and_then(|ws| ws.record.as_ref());
            let after = snapshot.get_wallet(&wallet).and_then(|ws| ws.record.clone());
            let merged = match (before, after) {
                (Some(before), Some(after)) => latest.merge_record(&wallet, before, after),
                _ => false,
            };
            if !merged {
                log::warn!("[{}] Record changed while the cycle ran; transition dropped", wallet);
                report.proposed.retain(|w| *w != wallet);
                report.settled.retain(|w| *w != wallet);
            }
        }

        latest.module = snapshot.module;
        latest.taken_at = snapshot.taken_at;
        latest
            .save(state_path)
            .with_context(|| format!("Failed to save state to {}", state_path.display()))?;

        Ok(report)
    }
}

/// What the state file holds, as reported by `--validate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSummary {
    pub exists: bool,
    pub wallets: usize,
    pub active: usize,
    pub proposed: usize,
    pub settled: usize,
    /// Configuration recorded by the module that wrote the file
    pub stored: Option<ModuleConfig>,
    /// Whether the keeper's own configuration may resume from this file
    pub compatible: bool,
    pub taken_at: Option<Timestamp>,
}

/// Read the state file without changing it.
pub fn inspect_state(config: &KeeperConfig) -> Result<StateSummary> {
    let state_path = config.state_path();
    let state = SuccessionState::load(&state_path)
        .with_context(|| format!("Failed to load state from {}", state_path.display()))?;
    let requested = config.module_config()?;

    Ok(StateSummary {
        exists: state_path.exists(),
        wallets: state.wallets.len(),
        active: state.count_by_status(SuccessionStatus::Active),
        proposed: state.count_by_status(SuccessionStatus::Proposed),
        settled: state.count_by_status(SuccessionStatus::Settled),
        compatible: state.resolve_config(&requested).is_ok(),
        stored: state.module,
        taken_at: state.taken_at,
    })
}

/// Records for the configured watch list, or every wallet when it is empty.
fn watched_records(
    config: &KeeperConfig,
    module: &SuccessionModule,
) -> Result<Vec<(Address, WalletSuccessionRecord)>> {
    let watched = config.watched_wallets()?;

    let wallets: Vec<Address> = if watched.is_empty() {
        module.wallets()
    } else {
        watched.iter().map(|(_, address)| *address).collect()
    };

    let mut records = Vec::with_capacity(wallets.len());
    for wallet in wallets {
        match module.record(&wallet) {
            Some(record) => records.push((wallet, record)),
            None => {
                let label = watched
                    .iter()
                    .find(|(_, address)| *address == wallet)
                    .map(|(label, _)| label.as_str())
                    .unwrap_or("-");
                log::warn!("[{}] '{}' has never sent a heartbeat; skipping", wallet, label);
            }
        }
    }
    Ok(records)
}

fn log_event(event: &SuccessionEvent) {
    match event {
        SuccessionEvent::Proposed { wallet, epoch, at } => {
            log::info!("[{}] event: proposed (epoch {}) at {}", wallet, epoch, format_timestamp(*at));
        }
        SuccessionEvent::Settled { wallet, at } => {
            log::info!("[{}] event: settled at {}", wallet, format_timestamp(*at));
        }
        other => log::debug!("[{}] event: {:?}", other.wallet(), other),
    }
}

pub fn format_timestamp(ts: Timestamp) -> String {
    i64::try_from(ts)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchedWallet;
    use lastwill_succession::test_utils::{addr, GENESIS, MODULE_BYTE};
    use lastwill_succession::ManualClock;

    /// Config pointing at `dir`, with the module address used by the fixtures.
    fn test_config(dir: &std::path::Path) -> KeeperConfig {
        let mut config = KeeperConfig::default();
        config.keeper.data_dir = dir.to_path_buf();
        config.keeper.module_address = addr(MODULE_BYTE).to_string();
        config
    }

    /// Persist a snapshot where `wallets` last transacted at GENESIS.
    fn seed_state(config: &KeeperConfig, wallets: &[Address]) {
        let module = SuccessionModule::from_state(
            addr(MODULE_BYTE),
            config.module_config().unwrap(),
            ManualClock::new(GENESIS),
            SuccessionState::new(),
        );
        for wallet in wallets {
            module.heartbeat(wallet);
        }
        module.snapshot().save(&config.state_path()).unwrap();
    }

    fn days(n: u64) -> u64 {
        n * 86_400
    }

    #[test]
    fn test_cycle_on_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let report = check_cycle_with_clock(&config, ManualClock::new(GENESIS)).unwrap();
        assert_eq!(report, CycleReport::default());
        assert!(config.state_path().exists());
    }

    #[test]
    fn test_cycle_proposes_then_settles() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let wallet = addr(0x16);
        seed_state(&config, &[wallet]);

        let clock = ManualClock::new(GENESIS + days(300));
        let report = check_cycle_with_clock(&config, clock).unwrap();
        assert_eq!(report.evaluated, 1);
        assert!(report.proposed.is_empty());
        assert_eq!(report.needs_checkin, vec![wallet]);

        let clock = ManualClock::new(GENESIS + days(361));
        let report = check_cycle_with_clock(&config, clock).unwrap();
        assert_eq!(report.proposed, vec![wallet]);

        let state = SuccessionState::load(&config.state_path()).unwrap();
        assert_eq!(
            state.get_wallet(&wallet).unwrap().status(),
            Some(SuccessionStatus::Proposed)
        );

        let clock = ManualClock::new(GENESIS + days(362));
        let report = check_cycle_with_clock(&config, clock).unwrap();
        assert_eq!(report.settled, vec![wallet]);

        let state = SuccessionState::load(&config.state_path()).unwrap();
        assert!(state.get_wallet(&wallet).unwrap().is_settled());
    }

    #[test]
    fn test_auto_settle_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.keeper.auto_settle = false;
        let wallet = addr(0x16);
        seed_state(&config, &[wallet]);

        let clock = ManualClock::new(GENESIS + days(361));
        check_cycle_with_clock(&config, clock.clone()).unwrap();
        clock.advance_days(1);
        let report = check_cycle_with_clock(&config, clock).unwrap();
        assert!(report.settled.is_empty());

        let state = SuccessionState::load(&config.state_path()).unwrap();
        assert_eq!(state.count_by_status(SuccessionStatus::Proposed), 1);
    }

    #[test]
    fn test_watch_list_filters_wallets() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        let (watched, ignored) = (addr(0x16), addr(0x17));
        seed_state(&config, &[watched, ignored]);

        config.wallets = vec![
            WatchedWallet {
                label: "family-safe".into(),
                address: watched.to_string(),
            },
            WatchedWallet {
                label: "never-seen".into(),
                address: addr(0x18).to_string(),
            },
        ];

        let clock = ManualClock::new(GENESIS + days(361));
        let report = check_cycle_with_clock(&config, clock).unwrap();
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.proposed, vec![watched]);

        let state = SuccessionState::load(&config.state_path()).unwrap();
        assert_eq!(
            state.get_wallet(&ignored).unwrap().status(),
            Some(SuccessionStatus::Active)
        );
    }

    #[test]
    fn test_corrupt_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::write(config.state_path(), "not json").unwrap();

        assert!(check_cycle_with_clock(&config, ManualClock::new(GENESIS)).is_err());
    }

    #[test]
    fn test_restart_with_shorter_threshold_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        let wallet = addr(0x16);
        seed_state(&config, &[wallet]);

        config.succession.inactivity_threshold_days = 30;
        let clock = ManualClock::new(GENESIS + days(32));
        assert!(check_cycle_with_clock(&config, clock.clone()).is_err());
        clock.advance_days(1);
        assert!(check_cycle_with_clock(&config, clock).is_err());

        let state = SuccessionState::load(&config.state_path()).unwrap();
        assert_eq!(
            state.get_wallet(&wallet).unwrap().status(),
            Some(SuccessionStatus::Active)
        );
        assert_eq!(
            state.module.unwrap().inactivity_threshold_secs,
            days(360)
        );
    }

    #[test]
    fn test_state_without_stored_config_adopts_keeper_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let wallet = addr(0x16);
        seed_state(&config, &[wallet]);

        let mut state = SuccessionState::load(&config.state_path()).unwrap();
        state.module = None;
        state.save(&config.state_path()).unwrap();

        check_cycle_with_clock(&config, ManualClock::new(GENESIS + days(1))).unwrap();
        let state = SuccessionState::load(&config.state_path()).unwrap();
        assert_eq!(state.module, Some(config.module_config().unwrap()));
    }

    #[test]
    fn test_heartbeat_during_cycle_wins() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let (busy, idle) = (addr(0x16), addr(0x17));
        seed_state(&config, &[busy, idle]);

        let now = GENESIS + days(361);
        let pending = advance(&config, ManualClock::new(now)).unwrap();
        assert_eq!(pending.report.proposed.len(), 2);

        // Another writer records activity before the cycle commits
        let writer = SuccessionModule::resume(
            addr(MODULE_BYTE),
            &config.module_config().unwrap(),
            ManualClock::new(now),
            SuccessionState::load(&config.state_path()).unwrap(),
        )
        .unwrap();
        writer.heartbeat(&busy);
        writer.snapshot().save(&config.state_path()).unwrap();

        let report = pending.commit(&config.state_path()).unwrap();
        assert_eq!(report.proposed, vec![idle]);

        let state = SuccessionState::load(&config.state_path()).unwrap();
        let record = state.get_wallet(&busy).unwrap().record.clone().unwrap();
        assert_eq!(record.status, SuccessionStatus::Active);
        assert_eq!(record.epoch, 2);
        assert_eq!(record.last_activity, now);
        assert_eq!(
            state.get_wallet(&idle).unwrap().status(),
            Some(SuccessionStatus::Proposed)
        );
    }

    #[test]
    fn test_inspect_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());

        let summary = inspect_state(&config).unwrap();
        assert!(!summary.exists);
        assert!(summary.compatible);
        assert_eq!(summary.wallets, 0);

        seed_state(&config, &[addr(0x16), addr(0x17)]);
        check_cycle_with_clock(&config, ManualClock::new(GENESIS + days(361))).unwrap();

        let summary = inspect_state(&config).unwrap();
        assert!(summary.exists);
        assert_eq!((summary.wallets, summary.active, summary.proposed), (2, 0, 2));
        assert_eq!(summary.stored, Some(config.module_config().unwrap()));
        assert_eq!(summary.taken_at, Some(GENESIS + days(361)));

        config.succession.inactivity_threshold_days = 30;
        assert!(!inspect_state(&config).unwrap().compatible);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_timestamp(u64::MAX), u64::MAX.to_string());
    }

    #[tokio::test]
    async fn test_run_check_cycle_wall_clock() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        seed_state(&config, &[addr(0x16)]);

        // GENESIS is far enough in the past that the wallet is overdue
        let report = run_check_cycle(&config).await.unwrap();
        assert_eq!(report.proposed, vec![addr(0x16)]);
    }
}

//! LastWill Keeper: headless daemon that advances the succession switch
//!
//! Anyone may propose and settle an inactive wallet; the keeper does it on
//! a schedule so heirs don't have to. Designed for Docker / cron deployment.
//!
//! # Usage
//!
//! ```bash
//! lastwill-keeper --config /path/to/lastwill-keeper.toml
//! lastwill-keeper --check    # Run one check cycle and exit
//! lastwill-keeper --validate # Validate config and exit
//! ```

mod config;
mod daemon;

use anyhow::{Context, Result};
use std::path::PathBuf;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut config_path = PathBuf::from("/config/lastwill-keeper.toml");
    let mut one_shot = false;
    let mut validate_only = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    config_path = PathBuf::from(&args[i]);
                } else {
                    anyhow::bail!("--config requires a path argument");
                }
            }
            "--check" | "--once" => {
                one_shot = true;
            }
            "--validate" => {
                validate_only = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--version" | "-V" => {
                println!("lastwill-keeper {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            other => {
                anyhow::bail!("Unknown argument: {}", other);
            }
        }
        i += 1;
    }

    let mut keeper_config = config::KeeperConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    keeper_config.apply_env_overrides();

    keeper_config
        .validate()
        .context("Configuration validation failed")?;

    // Init logger
    std::env::set_var("RUST_LOG", &keeper_config.keeper.log_level);
    env_logger::init();

    if validate_only {
        return print_validation_report(&keeper_config);
    }

    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;

    if one_shot {
        log::info!("Running single check cycle…");
        let report = rt.block_on(daemon::run_check_cycle(&keeper_config))?;
        log::info!(
            "Done: {} evaluated, {} proposed, {} settled, {} need a check-in.",
            report.evaluated,
            report.proposed.len(),
            report.settled.len(),
            report.needs_checkin.len()
        );
    } else {
        let shutdown = rt.block_on(async {
            tokio::select! {
                result = daemon::run(keeper_config) => result,
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Received shutdown signal. Exiting…");
                    Ok(())
                }
            }
        });

        if let Err(e) = shutdown {
            log::error!("Keeper error: {:#}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Summarize what the keeper would act on, without touching the state file.
fn print_validation_report(keeper_config: &config::KeeperConfig) -> Result<()> {
    let module = keeper_config.module_config()?;
    let state = daemon::inspect_state(keeper_config)?;

    println!("Configuration is valid.");
    println!("  Module:         {}", keeper_config.keeper.module_address);
    println!(
        "  Threshold:      {} days, {:?}",
        keeper_config.succession.inactivity_threshold_days, module.distribution
    );
    println!(
        "  Cycle:          every {} secs, propose={} settle={}",
        keeper_config.keeper.check_interval_secs,
        keeper_config.keeper.auto_propose,
        keeper_config.keeper.auto_settle
    );
    println!(
        "  Warn at:        {:.0}% / {:.0}% of threshold",
        keeper_config.liveness.checkin_threshold * 100.0,
        keeper_config.liveness.critical_threshold * 100.0
    );

    println!("  State file:     {}", keeper_config.state_path().display());
    if state.exists {
        println!(
            "                  {} wallets: {} active, {} proposed, {} settled",
            state.wallets, state.active, state.proposed, state.settled
        );
        if let Some(at) = state.taken_at {
            println!("                  last written {}", daemon::format_timestamp(at));
        }
    } else {
        println!("                  not created yet");
    }

    match &state.stored {
        Some(stored) if !state.compatible => {
            println!(
                "  ❌ State was written with a {} second threshold ({:?}); this config asks for {} seconds ({:?}).",
                stored.inactivity_threshold_secs,
                stored.distribution,
                module.inactivity_threshold_secs,
                module.distribution
            );
            anyhow::bail!("Configuration does not match the deployed module");
        }
        Some(_) => println!("  Deployed:       matches state file"),
        None => println!("  Deployed:       will be recorded on the first cycle"),
    }

    let watched = keeper_config.watched_wallets()?;
    if watched.is_empty() {
        println!("  Watching:       every wallet in the state file");
    } else {
        println!("  Watching:");
        for (label, address) in watched {
            println!("    {:<20} {}", label, address);
        }
    }
    Ok(())
}

fn print_help() {
    println!(
        r#"LastWill Keeper: advances the succession switch of inactive wallets

Every cycle the keeper reads the succession state file, proposes wallets
that have been inactive for longer than the threshold, settles proposed
wallets that still show no activity, and warns about owners who should
check in soon. Heirs then claim their shares
against the settled wallet.

The threshold and distribution policy are recorded in the state file on
the first cycle. A later run with a different [succession] section is
refused instead of moving every deadline.

USAGE:
    lastwill-keeper [OPTIONS]

OPTIONS:
    -c, --config <PATH>   Config file path (default: /config/lastwill-keeper.toml)
    --check, --once       Run a single check cycle and exit
    --validate            Check config against the state file and exit
    -h, --help            Show this help message
    -V, --version         Show version

ENVIRONMENT VARIABLES (override config file):
    LASTWILL_DATA_DIR         Directory holding succession_state.json
    LASTWILL_CHECK_INTERVAL   Seconds between cycles (>= 60)
    LASTWILL_LOG_LEVEL        Log level (error/warn/info/debug/trace)
    LASTWILL_THRESHOLD_DAYS   Inactivity threshold in days (must match the state file)
    LASTWILL_AUTO_PROPOSE     Propose overdue wallets (true/false)
    LASTWILL_AUTO_SETTLE      Settle proposed wallets (true/false)
    LASTWILL_MODULE_ADDRESS   Module address wallets enabled (0x-prefixed hex)

EXAMPLES:
    # Hourly keeper for a family wallet
    lastwill-keeper --config /config/lastwill-keeper.toml

    # One cycle from cron, proposing but never settling
    LASTWILL_AUTO_SETTLE=false lastwill-keeper --config keeper.toml --check

    # See which wallets are watched and whether the state file matches
    lastwill-keeper --config keeper.toml --validate
"#
    );
}

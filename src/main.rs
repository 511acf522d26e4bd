//! vsphone-guardian - cloud-phone app supervisor
//!
//! Periodically checks every configured cloud phone over ADB and relaunches
//! the designated app through its deep link when it is not running.
//!
//! # Usage
//!
//! ```bash
//! # Run with ./config.json (or ./config.toml)
//! vsphone-guardian
//!
//! # Explicit config, one check, then exit
//! vsphone-guardian --config accounts.toml --once
//!
//! # Check a config file without touching any device
//! vsphone-guardian --config accounts.toml validate
//! ```
//!
//! # Environment Variables
//!
//! - `VSPHONE_GUARDIAN_CONFIG`: config path when `--config` is not given
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use vsphone_guardian::config::{defaults, MonitorConfig};
use vsphone_guardian::device::{AdbAgent, DeviceAgent};
use vsphone_guardian::scheduler::{AppContext, MonitorScheduler};
use vsphone_guardian::stats::StatsStore;
use vsphone_guardian::storage::ProcessLock;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "vsphone-guardian")]
#[command(about = "Keeps a designated app running on VSPhone cloud phones")]
#[command(version)]
struct CliArgs {
    /// Config file (.json or .toml). Defaults to $VSPHONE_GUARDIAN_CONFIG,
    /// then ./config.json, then ./config.toml
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory for the stats file and the process lock
    #[arg(long, value_name = "DIR", default_value = defaults::DATA_DIR)]
    data_dir: PathBuf,

    /// Directory for the daily-rolling log file
    #[arg(long, value_name = "DIR", default_value = defaults::LOG_DIR)]
    log_dir: PathBuf,

    /// Run a single check and exit
    #[arg(long)]
    once: bool,

    /// Do not verify that the adb binary is installed at startup
    #[arg(long)]
    skip_adb_check: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Load and validate the config, print a summary, and exit
    Validate,
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Initialize logging: stdout plus a daily-rolling file
    let file_appender = tracing_appender::rolling::daily(&args.log_dir, defaults::LOG_FILE_NAME);
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_target(false).with_ansi(false).with_writer(file_writer))
        .init();

    let (config, config_path) = MonitorConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    if let Some(SubCommand::Validate) = args.command {
        print_summary(&config, &config_path);
        return Ok(());
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  vsphone-guardian {}", env!("CARGO_PKG_VERSION"));
    info!("  Cloud-phone app supervisor");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "📄 Config: {} | {} account(s), {} device(s)",
        config_path.display(),
        config.accounts.len(),
        config.device_count()
    );
    info!(
        "⏱️  Check every {}s | restart delay {}s | max {} restart(s) per device per check",
        config.monitoring.check_interval_seconds,
        config.monitoring.restart_delay_seconds,
        config.monitoring.max_restart_attempts
    );

    let agent = AdbAgent::new(&config.adb);
    if args.skip_adb_check {
        warn!("Skipping adb installation check");
    } else {
        let version = agent
            .check_installed()
            .await
            .context("adb is not installed or not on PATH")?;
        info!("🔌 {}", version);
    }

    let _lock = ProcessLock::acquire(&args.data_dir)?;

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, finishing the current check...");
        shutdown_token.cancel();
    });

    let stats_store = StatsStore::new(args.data_dir.join(defaults::STATS_FILE_NAME));
    let ctx = AppContext::from_config(
        &config,
        Arc::new(agent) as Arc<dyn DeviceAgent>,
        stats_store,
        cancel_token,
    )
    .context("Failed to build control-plane clients")?;

    let mut scheduler = MonitorScheduler::new(ctx);
    let stats = if args.once {
        scheduler
            .run_tick()
            .await
            .context("Single check failed")?;
        scheduler.stats().clone()
    } else {
        scheduler.run().await
    };

    info!(
        "✓ vsphone-guardian stopped after {} check(s), {} restart(s) in total",
        stats.total_checks, stats.total_restarts
    );
    Ok(())
}

fn print_summary(config: &MonitorConfig, path: &std::path::Path) {
    println!("Config OK: {}", path.display());
    for account in config.to_accounts() {
        println!(
            "  account '{}' ({}), {} device(s)",
            account.name,
            account.credential.access_key_hint(),
            account.devices.len()
        );
        for device in &account.devices {
            let packages: Vec<&str> = device.apps.iter().map(|a| a.package.as_str()).collect();
            println!(
                "    {} '{}' @ {} -> {}",
                device.device_id,
                device.display_name,
                device.address,
                packages.join(", ")
            );
        }
    }
    println!(
        "  check interval {}s, restart delay {}s, offline policy {:?}",
        config.monitoring.check_interval_seconds,
        config.monitoring.restart_delay_seconds,
        config.monitoring.offline_policy
    );
}

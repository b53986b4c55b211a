//! hwtime daemon entry point.
//!
//! Brings up the timing core on the configured tick source, keeps a
//! repeating status notification armed, and logs extended timestamps,
//! host clock readings, and RTC registers until the run time elapses or a
//! shutdown signal arrives.

mod signals;
mod stats;

use anyhow::{Context, Result};
use clap::Parser;
use hwtime_common::config::{TickSourceDriver, TimingConfig};
use hwtime_core::{
    NotifyHandler, SimulatedBoard, SimulatedTickSource, SystemClock, TickSource,
    DEFAULT_SLOT_COUNT,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::signals::ShutdownSignal;
use crate::stats::{NotificationStats, StatsSnapshot};

/// hwtime daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "hwtimed",
    about = "Hardware timing core daemon - extended timestamps and timer notifications",
    version,
    long_about = None
)]
struct Args {
    /// Path to a timing configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Total run time, e.g. "10s" (overrides config file).
    #[arg(long, short = 't', value_parser = humantime::parse_duration)]
    run_time: Option<Duration>,

    /// Starting tick count (overrides config file).
    #[arg(long)]
    initial_ticks: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting hwtime daemon");

    let mut config = load_config(&args)?;
    if let Some(run_time) = args.run_time {
        config.daemon.run_time = run_time;
    }
    if let Some(ticks) = args.initial_ticks {
        config.tick_source.initial_ticks = ticks;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        ?config.tick_source.driver,
        initial_ticks = config.tick_source.initial_ticks,
        ?config.daemon.run_time,
        "Configuration loaded"
    );

    let shutdown = ShutdownSignal::install();
    run_daemon(&config, &shutdown)
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "hwtimed={},hwtime_core={},hwtime_common={}",
        level, level, level
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `HWTIME_CONFIG_PATH` environment variable
/// 3. Built-in defaults
fn load_config(args: &Args) -> Result<TimingConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return TimingConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path));
    }

    if let Ok(env_path) = std::env::var("HWTIME_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from HWTIME_CONFIG_PATH");
            return TimingConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from HWTIME_CONFIG_PATH={:?}", env_path)
            });
        }
        warn!(
            path = %env_path,
            "HWTIME_CONFIG_PATH set but file does not exist, using defaults"
        );
    }

    info!("No config file found, using built-in defaults");
    Ok(TimingConfig::default())
}

/// Create the tick source selected by configuration.
fn create_tick_source(config: &TimingConfig) -> Arc<SimulatedTickSource> {
    match config.tick_source.driver {
        TickSourceDriver::Simulated => {
            info!("Using simulated tick source");
            Arc::new(SimulatedTickSource::from_config(
                &config.tick_source,
                DEFAULT_SLOT_COUNT,
            ))
        }
    }
}

/// Request shutdown once any delivered timestamp has gone backwards.
///
/// Returns `true` if this call made the request.
fn stop_on_regression(snapshot: &StatsSnapshot, shutdown: &ShutdownSignal) -> bool {
    if snapshot.non_monotonic == 0 || shutdown.requested() {
        return false;
    }
    warn!(
        non_monotonic = snapshot.non_monotonic,
        "Notification timestamps went backwards, stopping"
    );
    shutdown.request();
    true
}

/// Main daemon run loop.
fn run_daemon(config: &TimingConfig, shutdown: &ShutdownSignal) -> Result<()> {
    let source = create_tick_source(config);
    let board = SimulatedBoard::from_config(&config.rtc);
    let clock: SystemClock<_, _> = SystemClock::new(Arc::clone(&source), board);

    match (clock.rtc_time(), clock.rtc_date()) {
        (Ok(time), Ok(date)) => info!(?time, ?date, "RTC registers"),
        (Err(e), _) | (_, Err(e)) => warn!(error = %e, "RTC unavailable"),
    }

    let period_us = u64::try_from(config.daemon.report_interval.as_micros()).unwrap_or(u64::MAX);
    let stats = Arc::new(NotificationStats::new(period_us));
    let report = {
        let stats = Arc::clone(&stats);
        NotifyHandler::new(move |_, timestamp_us| stats.record(timestamp_us))
    };
    let slot = clock
        .register_timer_notification_relative(&report, period_us, 0, true)
        .context("Failed to register status notification")?;
    info!(slot, period_us, "Status notification armed");

    let halfway_fired_at = Arc::new(AtomicU64::new(0));
    let halfway = {
        let fired_at = Arc::clone(&halfway_fired_at);
        NotifyHandler::new(move |_, timestamp_us| fired_at.store(timestamp_us, Ordering::Relaxed))
    };
    let run_us = u64::try_from(config.daemon.run_time.as_micros()).unwrap_or(u64::MAX);
    let trigger_us = clock.total_microseconds().saturating_add(run_us / 2);
    if let Err(e) = clock.register_timer_notification_absolute(&halfway, trigger_us, 0) {
        warn!(error = %e, trigger_us, "Halfway notification not armed");
    }

    let mut pump = source
        .spawn_pump(config.tick_source.pump_interval)
        .context("Failed to start tick pump")?;

    let started = Instant::now();
    loop {
        let remaining = config.daemon.run_time.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            info!("Run time elapsed");
            break;
        }
        if shutdown.wait(config.daemon.report_interval.min(remaining)) {
            info!("Shutdown requested");
            break;
        }

        let snapshot = stats.snapshot();
        info!(
            fires = snapshot.fires,
            last_timestamp_us = snapshot.last_timestamp_us,
            max_jitter_us = snapshot.max_jitter_us,
            high = clock.microseconds_high_portion(),
            low = clock.current_microseconds(),
            os_time_us = clock.os_time_us().unwrap_or_default(),
            armed = clock.notifications().armed_count(),
            "Status"
        );

        stop_on_regression(&snapshot, shutdown);
    }

    pump.stop();

    if let Err(e) = clock.deregister_timer_notification(&report) {
        warn!(error = %e, "Failed to deregister status notification");
    }
    let halfway_expired = clock.is_timer_notification_expired(&halfway).unwrap_or(false);

    let snapshot = stats.snapshot();
    info!(
        fires = snapshot.fires,
        max_jitter_us = snapshot.max_jitter_us,
        non_monotonic = snapshot.non_monotonic,
        halfway_expired,
        halfway_fired_at = halfway_fired_at.load(Ordering::Relaxed),
        final_ticks = source.total_ticks(),
        "hwtime daemon stopped"
    );

    if snapshot.non_monotonic > 0 {
        anyhow::bail!(
            "{} notification timestamps went backwards",
            snapshot.non_monotonic
        );
    }
    Ok(())
}

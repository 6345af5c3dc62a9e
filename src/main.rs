use anyhow::Result;
use tokio::signal;

use std::io;
use std::process::ExitCode;

mod config;
mod cross_check;
mod db;
mod error;
mod monitor;
mod report;
mod station;

use config::GlobalConfig;
use db::Journal;
use monitor::Monitor;
use report::Reporter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging();

    match run().await {
        Ok(()) => {
            log::info!("Weather station stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&filters)
        .init();
}

async fn run() -> Result<()> {
    let config = GlobalConfig::from_env()?;
    log::debug!("Configuration: {config:?}");

    let sensors = station::open(&config.sensors)?;

    let mut reporter = Reporter::new(io::stdout());
    reporter.banner(sensors.primary.name(), config.measurement_period)?;

    let mut monitor = Monitor::new(
        sensors,
        reporter,
        config.thresholds,
        config.max_consecutive_failures,
    );

    if let Some(db_path) = &config.db_path {
        monitor = monitor.with_journal(open_journal(db_path)?);
    }

    monitor
        .run(config.measurement_period, shutdown_signal())
        .await
}

fn open_journal(db_path: &str) -> Result<Journal> {
    let mut journal = Journal::open(db_path)?;

    log::info!("Journaling to {db_path} ({} entries)", journal.count()?);
    if let Some(last) = journal.recent(1)?.first() {
        log::info!(
            "Last entry: {} {} {:.1} C {:.1} %",
            last.meas_time.format("%Y-%m-%d %H:%M:%S"),
            last.sensor,
            last.temperature,
            last.humidity
        );
    }

    Ok(journal)
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        log::error!("Unable to listen for Ctrl+C, running until killed: {e}");
        std::future::pending::<()>().await;
    }
}

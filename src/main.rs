//! pagepilot - drive web GUIs in an already-running browser.
//!
//! Reads a task configuration, runs every prompt through the configured
//! workflow and prints exactly one JSON line on stdout. Logs go to stderr and
//! to a daily log file under `~/.pagepilot/logs`.

mod cli;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pagepilot_cdp::CdpConnector;
use pagepilot_config::{ConfigLoader, ConfigValidator, TaskConfig};
use pagepilot_core::{AutomationError, Runner};

use crate::cli::Cli;

fn pagepilot_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pagepilot")
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = pagepilot_dir().join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("pagepilot")
        .filename_suffix("log")
        .max_log_files(14)
        .build(&log_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Flushes the file writer on exit.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        // stdout carries the result line only
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_ansi(true),
        )
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

/// Load, override and validate the task configuration.
fn load_config(cli: &Cli) -> Result<TaskConfig, AutomationError> {
    let mut config = ConfigLoader::load_input(&cli.input, cli.input_source())?;
    cli.apply(&mut config);

    let validation = ConfigValidator::validate(&config);
    for warning in &validation.warnings {
        warn!(path = %warning.path, "{}", warning.message);
    }
    validation.into_result()?;
    Ok(config)
}

async fn run(cli: Cli) -> (Value, bool) {
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid task configuration");
            return (output::setup_failure(&e), false);
        }
    };

    let download_dir = pagepilot_dir().join("downloads");
    let connector = Arc::new(CdpConnector::new(download_dir));

    match Runner::new(config).run(connector).await {
        Ok(report) if report.succeeded() => (output::success(&report), true),
        Ok(report) => (output::run_failure(&report), false),
        Err(e) => {
            error!(error = %e, "Run aborted");
            (output::setup_failure(&e), false)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        tracing_subscriber::fmt().with_writer(std::io::stderr).init();
        warn!(error = %e, "File logging disabled");
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match output::usage_failure(&e) {
            Some(record) => {
                error!(error = %e.kind(), "Invalid arguments");
                println!("{}", record);
                return ExitCode::FAILURE;
            }
            None => e.exit(),
        },
    };
    info!(version = env!("CARGO_PKG_VERSION"), "pagepilot starting");

    let (record, ok) = run(cli).await;
    println!("{}", record);

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

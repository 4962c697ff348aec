// src/main.rs
use anyhow::Context;
use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod fetcher;
mod myki_client;
mod processor;
mod report;
mod session;
mod tracker;
mod working_days;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod processor_tests;

use config::{load_config, load_user_passwords, resolve_all};
use fetcher::DEFAULT_MAX_PAGES;
use myki_client::MykiClient;
use report::{load_existing_report, save_report};
use session::load_session;
use tracker::{process_user, RunOutcome};
use working_days::HolidayCalendar;

/// Tracks work attendance from myki "Touch off" events at a target station.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to the unified multi-user config file.
    #[arg(default_value = "config/myki_config.json")]
    config: PathBuf,

    /// Output report file. Defaults to $OUTPUT_DIR/attendance.json.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Directory holding the saved session files from the auth phase.
    /// Defaults to $AUTH_DATA_DIR or ./auth_data.
    #[arg(long)]
    auth_data_dir: Option<PathBuf>,

    /// Pagination safety ceiling for the transactions API.
    #[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
    max_pages: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => {
            info!("Completed successfully - all users processed");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            error!("Completed with errors - some users failed to process");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Runs the whole tracking workflow. Returns Ok(true) when every configured
/// user processed cleanly, Ok(false) when at least one user failed (the
/// report still reflects the users that succeeded), and Err only for
/// run-level failures such as an invalid config file.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    info!("Myki Attendance Tracker");
    info!("Configuration file: {:?}", cli.config);

    // Fail fast on configuration problems before any network activity. The
    // password check mirrors the auth phase's pre-flight validation even
    // though this phase only consumes the saved sessions.
    let users = load_config(&cli.config)?;
    let resolved = resolve_all(&users)?;
    load_user_passwords(users.keys()).context("Credential validation failed")?;

    let output_path = cli.output.unwrap_or_else(|| {
        PathBuf::from(env::var("OUTPUT_DIR").unwrap_or_else(|_| "output".to_string()))
            .join("attendance.json")
    });
    let auth_data_dir = cli.auth_data_dir.unwrap_or_else(|| {
        PathBuf::from(env::var("AUTH_DATA_DIR").unwrap_or_else(|_| "auth_data".to_string()))
    });

    // One holiday table for the whole run, spanning every user's period with
    // a year of margin on each side.
    let first_year = resolved
        .values()
        .map(|c| chrono::Datelike::year(&c.start_date))
        .min()
        .unwrap_or(2025);
    let last_year = resolved
        .values()
        .map(|c| chrono::Datelike::year(&c.end_date))
        .max()
        .unwrap_or(first_year);
    let holidays = HolidayCalendar::for_year_range(first_year - 1, last_year + 1);

    let mut report = load_existing_report(&output_path);
    let mut outcome = RunOutcome::new();

    // Strictly sequential: one user at a time; a failure isolates to that
    // user and leaves their prior record untouched.
    for (username, user_config) in &resolved {
        let result = async {
            let session = load_session(&auth_data_dir, username)?;
            let client = MykiClient::new(&session)?;
            process_user(
                username,
                user_config,
                &client,
                report.users.get(username),
                &holidays,
                cli.max_pages,
            )
            .await
        }
        .await;

        match result {
            Ok(record) => {
                report.users.insert(username.clone(), record);
                outcome.succeeded.push(username.clone());
            }
            Err(e) => {
                error!("Failed to process user '{}': {}", username, e);
                outcome.failed.push((username.clone(), e));
            }
        }
    }

    if !outcome.succeeded.is_empty() {
        save_report(&report, &output_path, &cli.config.to_string_lossy())?;
    }

    outcome.log_summary();
    Ok(outcome.failed.is_empty())
}

// src/tracker.rs
use chrono::{DateTime, FixedOffset};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{error, info};

use crate::config::ResolvedUserConfig;
use crate::fetcher::{fetch_all_transactions, TransactionSource};
use crate::myki_client::MykiError;
use crate::processor::{
    calculate_attendance_days, filter_transactions, parse_transaction_datetime, StationMatch,
};
use crate::report::{
    effective_skip_dates, filter_new_transactions, latest_processed_date, update_user_record,
    UserRecord,
};
use crate::session::SessionError;
use crate::working_days::HolidayCalendar;

/// Why one user's run failed. Categorized so the summary can point at a
/// remedy; one user's failure never stops the others.
#[derive(Error, Debug)]
pub enum UserError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("API error: {0}")]
    Api(#[from] MykiError),
}

impl UserError {
    pub fn category(&self) -> &'static str {
        match self {
            UserError::Session(_) => "session",
            UserError::Api(_) => "api",
        }
    }

    pub fn suggested_remedy(&self) -> &'static str {
        match self {
            UserError::Session(_) => "Run the authentication phase to regenerate session data",
            UserError::Api(_) => "Check API connectivity and re-run the authentication phase",
        }
    }
}

/// Runs the whole pipeline for one user: fetch, incremental cutoff, filter,
/// attendance calculation, merge. Pure with respect to `existing` - it either
/// returns a complete updated record or fails with no side effects.
pub async fn process_user<S: TransactionSource + ?Sized>(
    username: &str,
    config: &ResolvedUserConfig,
    source: &S,
    existing: Option<&UserRecord>,
    holidays: &HolidayCalendar,
    max_pages: u32,
) -> Result<UserRecord, UserError> {
    info!("Processing user: {}", username);
    info!(
        "  Target station: '{}', period {} to {}, {} skip date(s), {} manual date(s)",
        config.target_station,
        config.start_date,
        config.end_date,
        config.skip_dates.len(),
        config.manual_attendance_dates.len()
    );

    // Manual attendance wins over a conflicting skip date.
    let effective_skips: HashSet<_> =
        effective_skip_dates(&config.skip_dates, &config.manual_attendance_dates);

    let all_transactions = fetch_all_transactions(source, &config.card_number, max_pages).await?;

    let cutoff = latest_processed_date(existing);
    let new_transactions = filter_new_transactions(&all_transactions, cutoff);

    let station_match = if config.case_insensitive_station {
        StationMatch::CaseInsensitive
    } else {
        StationMatch::Exact
    };
    let filtered = filter_transactions(
        &new_transactions,
        &config.target_station,
        config.start_date,
        config.end_date,
        station_match,
    );
    info!(
        "  {} relevant transaction(s) (touch off at '{}' within range)",
        filtered.len(),
        config.target_station
    );

    let attendance_days = calculate_attendance_days(&filtered, &effective_skips, holidays);
    info!("  {} working day(s) with attendance", attendance_days.len());

    // The watermark advances to the latest transaction actually used this run.
    let latest_txn: Option<DateTime<FixedOffset>> = filtered
        .iter()
        .filter_map(|txn| parse_transaction_datetime(&txn.transaction_date_time).ok())
        .max();

    let record = update_user_record(
        existing,
        attendance_days,
        latest_txn,
        &config.target_station,
        config.start_date,
        config.end_date,
        &effective_skips,
        &config.manual_attendance_dates,
        holidays,
    );

    if let Some(stats) = &record.statistics {
        info!(
            "  Statistics: {} working days, {} attended, {} missed, {}%",
            stats.total_working_days,
            stats.days_attended,
            stats.days_missed,
            stats.attendance_percentage
        );
    }

    info!("Successfully processed user: {}", username);
    Ok(record)
}

/// Per-user outcomes for the run summary.
pub struct RunOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, UserError)>,
}

impl RunOutcome {
    pub fn new() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn log_summary(&self) {
        let total = self.succeeded.len() + self.failed.len();
        info!("Summary: {} user(s) total", total);
        info!("  Successful: {}", self.succeeded.len());
        info!("  Failed: {}", self.failed.len());

        for (username, err) in &self.failed {
            error!(
                "User '{}' failed ({} error): {}",
                username,
                err.category(),
                err
            );
            error!("  Suggestion: {}", err.suggested_remedy());
        }
    }
}

impl Default for RunOutcome {
    fn default() -> Self {
        Self::new()
    }
}

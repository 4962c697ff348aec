// src/report.rs
//
// Persisted report model and the incremental-merge step. The merge is pure
// copy-on-write: it reads the previous record and returns a complete new one,
// so a failure partway through one user can never corrupt stored state.

use anyhow::Context;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::myki_client::Transaction;
use crate::processor::parse_transaction_datetime;
use crate::working_days::{is_working_day, HolidayCalendar};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStats {
    pub month: String,
    pub working_days: u32,
    pub days_attended: u32,
    pub days_missed: u32,
    pub attendance_percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_working_days: u32,
    pub days_attended: u32,
    pub days_missed: u32,
    pub attendance_percentage: f64,
    pub first_attendance: Option<String>,
    pub last_attendance: Option<String>,
    pub period_start: String,
    pub period_end: String,
    pub monthly_breakdown: Vec<MonthlyStats>,
}

/// One tracked user's persisted state. Created empty on first encounter of a
/// username; mutated only by `update_user_record`; rewritten wholesale on
/// each run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default)]
    pub attendance_days: Vec<String>,
    #[serde(default)]
    pub manual_attendance_dates: Vec<String>,
    #[serde(default)]
    pub skip_dates: Vec<String>,
    #[serde(default)]
    pub latest_processed_date: Option<String>,
    #[serde(default)]
    pub target_station: String,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub statistics: Option<Statistics>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub generated_at: String,
    pub config_path: String,
    pub total_users: usize,
}

/// The full report: a metadata block plus one record per username, keyed at
/// the top level of the JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Report {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ReportMetadata>,
    #[serde(flatten)]
    pub users: BTreeMap<String, UserRecord>,
}

pub fn utc_now_string() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Loads the previous run's report. A missing file means a first run; an
/// unreadable or malformed file is logged and treated the same way (the
/// watermark semantics make the resulting reprocessing harmless).
pub fn load_existing_report(path: &Path) -> Report {
    if !path.exists() {
        info!(
            "No existing output file at {:?} - first run, will process all transactions",
            path
        );
        return Report::default();
    }

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!("Failed to read existing output {:?}: {} - starting fresh", path, e);
            return Report::default();
        }
    };

    match serde_json::from_str::<Report>(&contents) {
        Ok(report) => {
            info!(
                "Loaded existing output from {:?} ({} user(s))",
                path,
                report.users.len()
            );
            report
        }
        Err(e) => {
            warn!(
                "Existing output file {:?} contains malformed JSON: {} - starting fresh",
                path, e
            );
            Report::default()
        }
    }
}

/// Rewrites the whole report file with a fresh metadata block.
pub fn save_report(report: &Report, output_path: &Path, config_path: &str) -> anyhow::Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {:?}", parent))?;
    }

    let to_write = Report {
        metadata: Some(ReportMetadata {
            generated_at: utc_now_string(),
            config_path: config_path.to_string(),
            total_users: report.users.len(),
        }),
        users: report.users.clone(),
    };

    let json = serde_json::to_string_pretty(&to_write)?;
    fs::write(output_path, json)
        .with_context(|| format!("Failed to write output file {:?}", output_path))?;

    info!(
        "Saved output for {} user(s) to {:?}",
        to_write.users.len(),
        output_path
    );
    Ok(())
}

/// The incremental cutoff for a user: the stored watermark, parsed. Absent or
/// unparseable watermarks mean a first run.
pub fn latest_processed_date(record: Option<&UserRecord>) -> Option<DateTime<FixedOffset>> {
    let value = record?.latest_processed_date.as_deref()?;
    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => Some(dt),
        Err(e) => {
            warn!(
                "Invalid latestProcessedDate '{}' ({}) - treating as first run",
                value, e
            );
            None
        }
    }
}

/// Keeps only transactions with timestamp strictly greater than the cutoff.
/// Strict `>`, not `>=`, so the transaction that set the current watermark is
/// never reprocessed. A missing cutoff passes everything through.
pub fn filter_new_transactions(
    transactions: &[Transaction],
    cutoff: Option<DateTime<FixedOffset>>,
) -> Vec<Transaction> {
    let Some(cutoff) = cutoff else {
        debug!(
            "No latest processed date - keeping all {} transactions (first run)",
            transactions.len()
        );
        return transactions.to_vec();
    };

    let mut new_transactions = Vec::new();
    for txn in transactions {
        match parse_transaction_datetime(&txn.transaction_date_time) {
            Ok(dt) if dt > cutoff => new_transactions.push(txn.clone()),
            Ok(_) => {}
            Err(_) => {
                warn!(
                    "Skipping transaction with invalid datetime: '{}'",
                    txn.transaction_date_time
                );
            }
        }
    }

    debug!(
        "Filtered to {} new transactions (after {}), skipped {}",
        new_transactions.len(),
        cutoff.to_rfc3339(),
        transactions.len() - new_transactions.len()
    );
    new_transactions
}

/// Configured skip dates minus any date also declared as manual attendance:
/// a manual declaration always wins the conflict.
pub fn effective_skip_dates(
    skip_dates: &[NaiveDate],
    manual_attendance_dates: &[NaiveDate],
) -> HashSet<NaiveDate> {
    let manual: HashSet<&NaiveDate> = manual_attendance_dates.iter().collect();
    skip_dates
        .iter()
        .filter(|d| !manual.contains(d))
        .copied()
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Recomputes statistics in full - a pure function of the merged attendance,
/// the manual dates, the period bounds, the effective skip set and the
/// holiday table. Days attended counts the union of API-observed and manual
/// dates, so a date present in both counts once.
pub fn calculate_statistics(
    attendance_days: &[String],
    manual_attendance_dates: &[NaiveDate],
    start_date: NaiveDate,
    end_date: NaiveDate,
    effective_skips: &HashSet<NaiveDate>,
    holidays: &HolidayCalendar,
) -> Statistics {
    let api_dates: Vec<NaiveDate> = attendance_days
        .iter()
        .filter_map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .collect();

    let mut all_attended: BTreeSet<NaiveDate> = api_dates.iter().copied().collect();
    all_attended.extend(manual_attendance_dates.iter().copied());

    // Working-day counts for the period and per month.
    let mut total_working_days: u32 = 0;
    let mut monthly_working_days: BTreeMap<String, u32> = BTreeMap::new();
    let mut current = start_date;
    while current <= end_date {
        if is_working_day(current, effective_skips, holidays) {
            total_working_days += 1;
            *monthly_working_days.entry(month_key(current)).or_insert(0) += 1;
        }
        current += Duration::days(1);
    }

    let days_attended = all_attended.len() as u32;
    let days_missed = total_working_days.saturating_sub(days_attended);
    let attendance_percentage = if total_working_days > 0 {
        round2(days_attended as f64 / total_working_days as f64 * 100.0)
    } else {
        0.0
    };

    let mut monthly_attended: BTreeMap<String, u32> = BTreeMap::new();
    for date in &all_attended {
        *monthly_attended.entry(month_key(*date)).or_insert(0) += 1;
    }

    let monthly_breakdown = monthly_working_days
        .iter()
        .map(|(month, &working_days)| {
            let attended = monthly_attended.get(month).copied().unwrap_or(0);
            let percentage = if working_days > 0 {
                round2(attended as f64 / working_days as f64 * 100.0)
            } else {
                0.0
            };
            MonthlyStats {
                month: month.clone(),
                working_days,
                days_attended: attended,
                days_missed: working_days.saturating_sub(attended),
                attendance_percentage: percentage,
            }
        })
        .collect();

    Statistics {
        total_working_days,
        days_attended,
        days_missed,
        attendance_percentage,
        // First/last attendance come from the API-observed set only.
        first_attendance: attendance_days.first().cloned(),
        last_attendance: attendance_days.last().cloned(),
        period_start: start_date.format("%Y-%m-%d").to_string(),
        period_end: end_date.format("%Y-%m-%d").to_string(),
        monthly_breakdown,
    }
}

/// Merges newly computed attendance into the user's previous record and
/// returns the complete updated record.
///
/// Idempotent and monotonic: re-running with the same or a subset of
/// already-seen transactions never removes, reorders or duplicates recorded
/// dates, and the watermark only ever advances.
#[allow(clippy::too_many_arguments)]
pub fn update_user_record(
    existing: Option<&UserRecord>,
    new_attendance_days: Vec<String>,
    latest_txn_datetime: Option<DateTime<FixedOffset>>,
    target_station: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    effective_skips: &HashSet<NaiveDate>,
    manual_attendance_dates: &[NaiveDate],
    holidays: &HolidayCalendar,
) -> UserRecord {
    let mut record = existing.cloned().unwrap_or_default();

    // Union-merge attendance days; BTreeSet gives dedup + sorted order.
    let existing_count = record.attendance_days.len();
    let mut merged: BTreeSet<String> = record.attendance_days.iter().cloned().collect();
    merged.extend(new_attendance_days);
    record.attendance_days = merged.into_iter().collect();
    debug!(
        "Merged attendance days: {} existing, {} total unique",
        existing_count,
        record.attendance_days.len()
    );

    // Advance the watermark to max(existing, latest transaction used this
    // run); unchanged when nothing new was used, null only when both absent.
    let existing_watermark = record
        .latest_processed_date
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok());
    let new_watermark = match (existing_watermark, latest_txn_datetime) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };
    record.latest_processed_date = new_watermark.map(|dt| dt.to_rfc3339());

    record.target_station = target_station.to_string();

    let mut skip_strings: Vec<String> = effective_skips
        .iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect();
    skip_strings.sort();
    record.skip_dates = skip_strings;

    let mut manual_strings: Vec<String> = manual_attendance_dates
        .iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect();
    manual_strings.sort();
    record.manual_attendance_dates = manual_strings;

    record.statistics = Some(calculate_statistics(
        &record.attendance_days,
        manual_attendance_dates,
        start_date,
        end_date,
        effective_skips,
        holidays,
    ));

    record.last_updated = Some(utc_now_string());

    record
}

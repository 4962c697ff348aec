// src/processor.rs
use chrono::{DateTime, FixedOffset, NaiveDate};
use std::collections::{BTreeSet, HashSet};
use tracing::warn;

use crate::myki_client::Transaction;
use crate::working_days::{is_working_day, HolidayCalendar};

pub const TOUCH_OFF: &str = "Touch off";

/// Parses the API's ISO 8601 timestamp (e.g. "2025-10-29T13:04:45+11:00")
/// keeping the UTC offset.
pub fn parse_transaction_datetime(
    value: &str,
) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value)
}

/// The transaction's local calendar date: parse the timestamp, discard the
/// time and offset.
pub fn parse_transaction_date(value: &str) -> Result<NaiveDate, chrono::ParseError> {
    Ok(parse_transaction_datetime(value)?.date_naive())
}

/// How the target station is matched against the transaction description.
/// Exact is the documented contract; CaseInsensitive is the opt-in escape
/// hatch for descriptions that differ only in casing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationMatch {
    Exact,
    CaseInsensitive,
}

impl StationMatch {
    fn matches(self, description: &str, target: &str) -> bool {
        match self {
            StationMatch::Exact => description == target,
            StationMatch::CaseInsensitive => description.eq_ignore_ascii_case(target),
        }
    }
}

/// Reduces a raw transaction list to the attendance-relevant events: target
/// station, "Touch off" subtype, local date within [start, end] inclusive.
/// Malformed timestamps are logged and skipped. Input order is preserved.
pub fn filter_transactions(
    transactions: &[Transaction],
    target_station: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    station_match: StationMatch,
) -> Vec<Transaction> {
    let mut filtered = Vec::new();

    for txn in transactions {
        if !station_match.matches(&txn.description, target_station) {
            continue;
        }
        if txn.transaction_type != TOUCH_OFF {
            continue;
        }
        let txn_date = match parse_transaction_date(&txn.transaction_date_time) {
            Ok(date) => date,
            Err(_) => {
                warn!(
                    "Skipping transaction with invalid date: '{}'",
                    txn.transaction_date_time
                );
                continue;
            }
        };
        if txn_date < start_date || txn_date > end_date {
            continue;
        }
        filtered.push(txn.clone());
    }

    filtered
}

/// Turns filtered transactions into the deduplicated, ascending list of
/// working-day attendance dates as `YYYY-MM-DD` strings. Multiplicities and
/// intra-day ordering are discarded; only date-level presence matters.
pub fn calculate_attendance_days(
    transactions: &[Transaction],
    skip_dates: &HashSet<NaiveDate>,
    holidays: &HolidayCalendar,
) -> Vec<String> {
    let mut days: BTreeSet<NaiveDate> = BTreeSet::new();

    for txn in transactions {
        let txn_date = match parse_transaction_date(&txn.transaction_date_time) {
            Ok(date) => date,
            Err(_) => continue,
        };
        if is_working_day(txn_date, skip_dates, holidays) {
            days.insert(txn_date);
        }
    }

    days.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect()
}

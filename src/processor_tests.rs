// src/processor_tests.rs

#[cfg(test)]
mod tests {
    use crate::myki_client::Transaction;
    use crate::processor::*;
    use crate::working_days::HolidayCalendar;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    const STATION: &str = "Heathmont Station";

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn make_txn(txn_type: &str, description: &str, dt: &str) -> Transaction {
        Transaction {
            transaction_type: txn_type.to_string(),
            description: description.to_string(),
            transaction_date_time: dt.to_string(),
        }
    }

    #[test]
    fn test_parse_transaction_date() {
        assert_eq!(
            parse_transaction_date("2025-10-29T13:04:45+11:00").unwrap(),
            d(2025, 10, 29)
        );
        assert!(parse_transaction_date("not a timestamp").is_err());
        assert!(parse_transaction_date("").is_err());
    }

    #[test]
    fn test_filter_exactness() {
        let start = d(2025, 5, 1);
        let end = d(2025, 5, 31);
        let transactions = vec![
            // Kept: exact station, touch off, inside range.
            make_txn("Touch off", STATION, "2025-05-15T17:00:00+10:00"),
            // Dropped: station cased differently (exact match contract).
            make_txn("Touch off", "HEATHMONT STATION", "2025-05-15T17:00:00+10:00"),
            // Dropped: wrong subtype.
            make_txn("Touch on", STATION, "2025-05-15T08:00:00+10:00"),
            // Dropped: before the range.
            make_txn("Touch off", STATION, "2025-04-30T17:00:00+10:00"),
            // Dropped: after the range.
            make_txn("Touch off", STATION, "2025-06-01T17:00:00+10:00"),
        ];

        let filtered = filter_transactions(&transactions, STATION, start, end, StationMatch::Exact);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].transaction_date_time, "2025-05-15T17:00:00+10:00");
    }

    #[test]
    fn test_filter_boundary_dates_inclusive() {
        let start = d(2025, 5, 1);
        let end = d(2025, 5, 31);
        let transactions = vec![
            make_txn("Touch off", STATION, "2025-05-01T07:00:00+10:00"),
            make_txn("Touch off", STATION, "2025-05-31T23:59:59+10:00"),
        ];

        let filtered = filter_transactions(&transactions, STATION, start, end, StationMatch::Exact);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn test_filter_case_insensitive_option() {
        let transactions = vec![make_txn(
            "Touch off",
            "HEATHMONT STATION",
            "2025-05-15T17:00:00+10:00",
        )];

        let exact = filter_transactions(
            &transactions,
            STATION,
            d(2025, 5, 1),
            d(2025, 5, 31),
            StationMatch::Exact,
        );
        assert!(exact.is_empty());

        let relaxed = filter_transactions(
            &transactions,
            STATION,
            d(2025, 5, 1),
            d(2025, 5, 31),
            StationMatch::CaseInsensitive,
        );
        assert_eq!(relaxed.len(), 1);
    }

    #[test]
    fn test_filter_skips_malformed_timestamp() {
        let transactions = vec![
            make_txn("Touch off", STATION, "garbage"),
            make_txn("Touch off", STATION, "2025-05-15T17:00:00+10:00"),
        ];

        let filtered = filter_transactions(
            &transactions,
            STATION,
            d(2025, 5, 1),
            d(2025, 5, 31),
            StationMatch::Exact,
        );
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_filter_preserves_input_order() {
        let transactions = vec![
            make_txn("Touch off", STATION, "2025-05-20T17:00:00+10:00"),
            make_txn("Touch off", STATION, "2025-05-15T17:00:00+10:00"),
        ];

        let filtered = filter_transactions(
            &transactions,
            STATION,
            d(2025, 5, 1),
            d(2025, 5, 31),
            StationMatch::Exact,
        );
        assert_eq!(filtered[0].transaction_date_time, "2025-05-20T17:00:00+10:00");
        assert_eq!(filtered[1].transaction_date_time, "2025-05-15T17:00:00+10:00");
    }

    #[test]
    fn test_calculate_attendance_days_dedup_and_sort() {
        let calendar = HolidayCalendar::for_year_range(2025, 2025);
        let transactions = vec![
            make_txn("Touch off", STATION, "2025-05-20T17:00:00+10:00"), // Tuesday
            make_txn("Touch off", STATION, "2025-05-19T17:00:00+10:00"), // Monday
            make_txn("Touch off", STATION, "2025-05-19T17:30:00+10:00"), // Monday again
            make_txn("Touch off", STATION, "2025-05-24T17:00:00+10:00"), // Saturday
        ];

        let days = calculate_attendance_days(&transactions, &HashSet::new(), &calendar);
        assert_eq!(days, vec!["2025-05-19".to_string(), "2025-05-20".to_string()]);
    }

    #[test]
    fn test_calculate_attendance_days_respects_skips_and_holidays() {
        let calendar = HolidayCalendar::for_year_range(2025, 2025);
        let skips: HashSet<NaiveDate> = [d(2025, 5, 20)].into_iter().collect();
        let transactions = vec![
            make_txn("Touch off", STATION, "2025-05-19T17:00:00+10:00"), // kept
            make_txn("Touch off", STATION, "2025-05-20T17:00:00+10:00"), // skip date
            make_txn("Touch off", STATION, "2025-04-25T17:00:00+10:00"), // ANZAC Day
        ];

        let days = calculate_attendance_days(&transactions, &skips, &calendar);
        assert_eq!(days, vec!["2025-05-19".to_string()]);
    }
}

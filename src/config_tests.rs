// src/config_tests.rs

#[cfg(test)]
mod tests {
    use crate::config::*;
    use chrono::{Local, NaiveDate};
    use std::fs;
    use std::path::PathBuf;

    fn write_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "myki-tracker-config-{}-{}.json",
            name,
            std::process::id()
        ));
        fs::write(&path, contents).unwrap();
        path
    }

    fn valid_user() -> UserConfig {
        UserConfig {
            myki_card_number: Some("308425279093478".to_string()),
            target_station: Some("Heathmont Station".to_string()),
            start_date: Some("2025-01-01".to_string()),
            end_date: Some("2025-06-30".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_config_filters_comment_keys() {
        let path = write_config(
            "comments",
            r#"{
                "users": {
                    "_comment": "underscore keys are documentation, not users",
                    "koustubh": {
                        "mykiCardNumber": "308425279093478",
                        "targetStation": "Heathmont Station",
                        "startDate": "2025-01-01"
                    }
                }
            }"#,
        );

        let users = load_config(&path).unwrap();
        assert_eq!(users.len(), 1);
        assert!(users.contains_key("koustubh"));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_config_missing_file() {
        let path = std::env::temp_dir().join("myki-tracker-no-such-config.json");
        assert!(matches!(load_config(&path), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_config_rejects_empty_users() {
        let path = write_config("empty", r#"{"users": {"_note": "nobody here"}}"#);
        assert!(matches!(load_config(&path), Err(ConfigError::NoUsers)));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_config_rejects_invalid_json() {
        let path = write_config("invalid", "{ not json");
        assert!(matches!(load_config(&path), Err(ConfigError::Json(_))));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_resolve_user_happy_path() {
        let mut user = valid_user();
        user.skip_dates = vec!["2025-03-10".to_string()];
        user.manual_attendance_dates = vec!["2025-02-14".to_string()];

        let resolved = resolve_user("koustubh", &user).unwrap();
        assert_eq!(resolved.card_number, "308425279093478");
        assert_eq!(resolved.target_station, "Heathmont Station");
        assert_eq!(
            resolved.start_date,
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
        assert_eq!(
            resolved.end_date,
            NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
        );
        assert_eq!(resolved.skip_dates.len(), 1);
        assert_eq!(resolved.manual_attendance_dates.len(), 1);
        assert!(!resolved.case_insensitive_station);
    }

    #[test]
    fn test_resolve_user_names_missing_field() {
        let mut user = valid_user();
        user.target_station = None;

        match resolve_user("koustubh", &user) {
            Err(ConfigError::MissingField { username, field }) => {
                assert_eq!(username, "koustubh");
                assert_eq!(field, "targetStation");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_user_invalid_date() {
        let mut user = valid_user();
        user.start_date = Some("01/01/2025".to_string());

        match resolve_user("koustubh", &user) {
            Err(ConfigError::InvalidDate { field, value, .. }) => {
                assert_eq!(field, "startDate");
                assert_eq!(value, "01/01/2025");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_user_manual_date_outside_period() {
        let mut user = valid_user();
        user.manual_attendance_dates = vec!["2025-07-01".to_string()];

        match resolve_user("koustubh", &user) {
            Err(ConfigError::DateOutOfPeriod { field, value, end, .. }) => {
                assert_eq!(field, "manualAttendanceDates");
                assert_eq!(value, "2025-07-01");
                assert_eq!(end, "2025-06-30");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_user_rejects_password_in_config() {
        let mut user = valid_user();
        user.myki_password = Some("hunter2".to_string());

        match resolve_user("koustubh", &user) {
            Err(ConfigError::ForbiddenField { field, .. }) => {
                assert_eq!(field, "mykiPassword");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_user_end_date_defaults_to_today() {
        let mut user = valid_user();
        user.end_date = None;

        let resolved = resolve_user("koustubh", &user).unwrap();
        assert_eq!(resolved.end_date, Local::now().date_naive());
    }

    #[test]
    fn test_load_user_passwords() {
        // Unique usernames so the env vars cannot collide with other tests.
        std::env::set_var("MYKI_PASSWORD_PWTEST_PRESENT", "secret");

        let present = vec!["pwtest_present".to_string()];
        let passwords = load_user_passwords(present.iter()).unwrap();
        assert_eq!(passwords["pwtest_present"], "secret");

        let mixed = vec![
            "pwtest_present".to_string(),
            "pwtest_absent".to_string(),
        ];
        match load_user_passwords(mixed.iter()) {
            Err(ConfigError::MissingEnvVars(missing)) => {
                assert_eq!(missing.len(), 1);
                assert!(missing[0].contains("MYKI_PASSWORD_PWTEST_ABSENT"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        std::env::remove_var("MYKI_PASSWORD_PWTEST_PRESENT");
    }
}

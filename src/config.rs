// src/config.rs
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0} (see config/myki_config.example.json)")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file {path}")]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("Invalid JSON in configuration file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid unified config: 'users' section is empty")]
    NoUsers,

    #[error("Missing required field '{field}' for user '{username}'")]
    MissingField { username: String, field: String },

    #[error("Invalid date format in {field} for user '{username}': '{value}' (expected YYYY-MM-DD)")]
    InvalidDate {
        username: String,
        field: String,
        value: String,
    },

    #[error("Date {value} in {field} for user '{username}' is outside the period {start} to {end}")]
    DateOutOfPeriod {
        username: String,
        field: String,
        value: String,
        start: String,
        end: String,
    },

    #[error("Forbidden field '{field}' present for user '{username}': credentials belong in environment variables, not the config file")]
    ForbiddenField { username: String, field: String },

    #[error("Missing required environment variables for passwords:\n{}", .0.join("\n"))]
    MissingEnvVars(Vec<String>),
}

/// Raw per-user entry as written in the config file. Required fields are
/// Options here so validation can report which one is missing by name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    pub myki_card_number: Option<String>,
    pub target_station: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub skip_dates: Vec<String>,
    #[serde(default)]
    pub manual_attendance_dates: Vec<String>,
    #[serde(default)]
    pub case_insensitive_station: bool,
    // Rejected during validation; only here so we can name the offence.
    pub myki_password: Option<String>,
}

/// A validated, parsed per-user configuration record.
#[derive(Debug, Clone)]
pub struct ResolvedUserConfig {
    pub card_number: String,
    pub target_station: String,
    pub start_date: NaiveDate,
    /// Configured end date, or today when unset.
    pub end_date: NaiveDate,
    pub skip_dates: Vec<NaiveDate>,
    pub manual_attendance_dates: Vec<NaiveDate>,
    pub case_insensitive_station: bool,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    users: BTreeMap<String, serde_json::Value>,
}

/// Loads the unified multi-user config. Keys starting with `_` are comments
/// and ignored.
pub fn load_config(path: &Path) -> Result<BTreeMap<String, UserConfig>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        source: e,
        path: path.to_path_buf(),
    })?;
    let raw: RawConfig = serde_json::from_str(&contents)?;

    let mut users = BTreeMap::new();
    for (username, value) in raw.users {
        if username.starts_with('_') {
            continue;
        }
        let user: UserConfig = serde_json::from_value(value)?;
        users.insert(username, user);
    }

    if users.is_empty() {
        return Err(ConfigError::NoUsers);
    }

    info!("Loaded config from {:?} ({} user(s) to track)", path, users.len());
    Ok(users)
}

fn parse_date(
    username: &str,
    field: &str,
    value: &str,
) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| ConfigError::InvalidDate {
        username: username.to_string(),
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Validates and parses one user's config. Fails fast before any network
/// activity, naming the offending user/field/value.
pub fn resolve_user(username: &str, config: &UserConfig) -> Result<ResolvedUserConfig, ConfigError> {
    let missing = |field: &str| ConfigError::MissingField {
        username: username.to_string(),
        field: field.to_string(),
    };

    if config.myki_password.is_some() {
        return Err(ConfigError::ForbiddenField {
            username: username.to_string(),
            field: "mykiPassword".to_string(),
        });
    }

    let card_number = config
        .myki_card_number
        .clone()
        .ok_or_else(|| missing("mykiCardNumber"))?;
    let target_station = config
        .target_station
        .clone()
        .ok_or_else(|| missing("targetStation"))?;
    let start_str = config.start_date.clone().ok_or_else(|| missing("startDate"))?;

    let start_date = parse_date(username, "startDate", &start_str)?;
    let end_date = match &config.end_date {
        Some(value) => parse_date(username, "endDate", value)?,
        None => Local::now().date_naive(),
    };

    let mut skip_dates = Vec::new();
    for value in &config.skip_dates {
        skip_dates.push(parse_date(username, "skipDates", value)?);
    }

    let mut manual_attendance_dates = Vec::new();
    for value in &config.manual_attendance_dates {
        let date = parse_date(username, "manualAttendanceDates", value)?;
        if date < start_date || date > end_date {
            return Err(ConfigError::DateOutOfPeriod {
                username: username.to_string(),
                field: "manualAttendanceDates".to_string(),
                value: value.clone(),
                start: start_date.format("%Y-%m-%d").to_string(),
                end: end_date.format("%Y-%m-%d").to_string(),
            });
        }
        manual_attendance_dates.push(date);
    }

    Ok(ResolvedUserConfig {
        card_number,
        target_station,
        start_date,
        end_date,
        skip_dates,
        manual_attendance_dates,
        case_insensitive_station: config.case_insensitive_station,
    })
}

/// Resolves every configured user, failing on the first invalid one.
pub fn resolve_all(
    users: &BTreeMap<String, UserConfig>,
) -> Result<BTreeMap<String, ResolvedUserConfig>, ConfigError> {
    let mut resolved = BTreeMap::new();
    for (username, config) in users {
        resolved.insert(username.clone(), resolve_user(username, config)?);
    }
    info!("Config validation passed for {} user(s)", resolved.len());
    Ok(resolved)
}

/// Credential lookup keyed by config username: `MYKI_PASSWORD_<USERNAME>`
/// (uppercased) must be set for every tracked user. All missing variables are
/// reported together.
pub fn load_user_passwords<'a, I>(usernames: I) -> Result<BTreeMap<String, String>, ConfigError>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut passwords = BTreeMap::new();
    let mut missing = Vec::new();

    for username in usernames {
        let var_name = format!("MYKI_PASSWORD_{}", username.to_uppercase());
        match env::var(&var_name) {
            Ok(password) => {
                passwords.insert(username.clone(), password);
            }
            Err(_) => missing.push(format!("  - {}", var_name)),
        }
    }

    if !missing.is_empty() {
        return Err(ConfigError::MissingEnvVars(missing));
    }

    info!("Loaded passwords for {} user(s)", passwords.len());
    Ok(passwords)
}

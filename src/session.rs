// src/session.rs
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session file not found: {0} (run the authentication phase first)")]
    NotFound(PathBuf),

    #[error("Failed to read session file {path}")]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("Session file {path} is not valid JSON")]
    Json {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },
}

/// Extra headers captured from the identity provider's auth request
/// (x-verifytoken, x-ptvwebauth).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthRequestData {
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Opaque credential bundle written by the browser-automation phase.
/// This module only reads it back; it has no awareness of how the
/// bot-mitigation challenge was passed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionBundle {
    #[serde(default)]
    pub cookies: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub auth_request: Option<AuthRequestData>,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Loads the saved session for one user. Multi-user runs keep one file per
/// config key (`session_<key>.json`); an empty key means `session.json`.
pub fn load_session(auth_data_dir: &Path, username_key: &str) -> Result<SessionBundle, SessionError> {
    let file_name = if username_key.is_empty() {
        "session.json".to_string()
    } else {
        format!("session_{}.json", username_key)
    };
    let path = auth_data_dir.join(file_name);

    if !path.exists() {
        return Err(SessionError::NotFound(path));
    }

    let json_string = fs::read_to_string(&path).map_err(|e| SessionError::Io {
        source: e,
        path: path.clone(),
    })?;
    let bundle: SessionBundle =
        serde_json::from_str(&json_string).map_err(|e| SessionError::Json {
            source: e,
            path: path.clone(),
        })?;

    info!(
        "Loaded session from {:?} ({} cookies, {} headers, bearer token {})",
        path,
        bundle.cookies.len(),
        bundle.headers.len(),
        if bundle.bearer_token.is_some() {
            "present"
        } else {
            "MISSING"
        }
    );
    if let Some(ts) = &bundle.timestamp {
        info!("Session captured at: {}", ts);
    }
    if bundle.bearer_token.is_none() {
        warn!("Session has no bearer token; API calls may be rejected");
    }

    Ok(bundle)
}

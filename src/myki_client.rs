// src/myki_client.rs

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, COOKIE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::session::SessionBundle;

pub const MYKI_API_BASE_URL: &str = "https://mykiapi.ptv.vic.gov.au/v2";

/// One transaction record as the Myki API returns it. Transactions carry no
/// identity beyond their fields; duplicates across pages are tolerated
/// downstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default)]
    pub transaction_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub transaction_date_time: String,
}

// The transactions endpoint is not consistent about its envelope: sometimes a
// bare list, sometimes {"transactions": [...]}, sometimes {"data": [...]}.
// Normalize here so everything inward only ever sees Vec<Transaction>.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TransactionsResponse {
    List(Vec<Transaction>),
    Wrapped { transactions: Vec<Transaction> },
    Data { data: Vec<Transaction> },
    Other(serde_json::Value),
}

impl TransactionsResponse {
    pub fn into_transactions(self) -> Vec<Transaction> {
        match self {
            TransactionsResponse::List(txns) => txns,
            TransactionsResponse::Wrapped { transactions } => transactions,
            TransactionsResponse::Data { data } => data,
            TransactionsResponse::Other(value) => {
                warn!("Unrecognized transactions response shape: {}", value);
                Vec::new()
            }
        }
    }
}

// Machine-readable error body the API attaches to non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub message: Option<String>,
}

#[derive(Error, Debug)]
pub enum MykiError {
    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),

    #[error("JSON processing error")]
    Json(#[from] serde_json::Error),

    #[error("Invalid header value in session data: {0}")]
    InvalidHeader(String),

    #[error("Myki API error: Status={status}, Message='{message}'")]
    ApiError { status: StatusCode, message: String },
}

/// Authenticated client for the Myki JSON API. Replays the session bundle
/// captured by the browser phase as plain HTTP headers and cookies.
#[derive(Clone)]
pub struct MykiClient {
    http_client: Client,
    base_url: String,
    headers: HeaderMap,
}

impl MykiClient {
    pub fn new(session: &SessionBundle) -> Result<Self, MykiError> {
        let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let headers = build_headers(session)?;

        Ok(Self {
            http_client,
            base_url: MYKI_API_BASE_URL.trim_end_matches('/').to_string(),
            headers,
        })
    }

    /// Fetches one page of transaction history for a card. The endpoint is a
    /// POST carrying the card number in the body and the page index as a
    /// query parameter.
    pub async fn get_transactions(
        &self,
        card_number: &str,
        page: u32,
    ) -> Result<Vec<Transaction>, MykiError> {
        let url = format!("{}/myki/transactions", self.base_url);
        debug!("POST {} (page {})", url, page);

        let response = self
            .http_client
            .post(&url)
            .headers(self.headers.clone())
            .query(&[("page", page)])
            .json(&json!({ "mykiCardNumber": card_number }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            let message = match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(parsed) => parsed.message.unwrap_or(body),
                Err(_) => body,
            };
            return Err(MykiError::ApiError { status, message });
        }

        let parsed = response.json::<TransactionsResponse>().await?;
        Ok(parsed.into_transactions())
    }
}

/// Assembles the request headers the portal expects: standard JSON headers,
/// the browser identity headers from the captured session, the identity
/// provider's verification tokens, the PassthruAuth cookie echoed as a
/// header, and the bearer token.
fn build_headers(session: &SessionBundle) -> Result<HeaderMap, MykiError> {
    let mut headers = HeaderMap::new();

    let value = |v: &str| {
        HeaderValue::from_str(v).map_err(|_| MykiError::InvalidHeader(v.to_string()))
    };
    let name = |n: &str| {
        HeaderName::from_bytes(n.as_bytes()).map_err(|_| MykiError::InvalidHeader(n.to_string()))
    };

    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (key, fallback) in [
        ("User-Agent", "Mozilla/5.0"),
        ("Origin", "https://transport.vic.gov.au"),
        ("Referer", "https://transport.vic.gov.au/"),
    ] {
        let v = session
            .headers
            .get(key)
            .map(String::as_str)
            .unwrap_or(fallback);
        headers.insert(name(key)?, value(v)?);
    }

    if let Some(auth_request) = &session.auth_request {
        for token_header in ["x-verifytoken", "x-ptvwebauth"] {
            if let Some(v) = auth_request.headers.get(token_header) {
                headers.insert(name(token_header)?, value(v)?);
            }
        }
    }

    if let Some(passthru) = session.cookies.get("PassthruAuth") {
        headers.insert(name("x-passthruauth")?, value(passthru)?);
    }

    if !session.cookies.is_empty() {
        let cookie_line = session
            .cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ");
        headers.insert(COOKIE, value(&cookie_line)?);
    }

    if let Some(token) = &session.bearer_token {
        headers.insert(AUTHORIZATION, value(&format!("Bearer {}", token))?);
    } else {
        warn!("Building Myki client without a bearer token");
    }

    Ok(headers)
}

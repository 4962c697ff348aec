// src/fetcher.rs
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::myki_client::{MykiClient, MykiError, Transaction};

/// Safety valve against runaway pagination; overridable from the CLI.
pub const DEFAULT_MAX_PAGES: u32 = 5;

/// One operation: get page N of transactions for card C. The real client
/// implements this; tests substitute their own sources.
#[async_trait]
pub trait TransactionSource {
    async fn transactions_page(
        &self,
        card_number: &str,
        page: u32,
    ) -> Result<Vec<Transaction>, MykiError>;
}

#[async_trait]
impl TransactionSource for MykiClient {
    async fn transactions_page(
        &self,
        card_number: &str,
        page: u32,
    ) -> Result<Vec<Transaction>, MykiError> {
        self.get_transactions(card_number, page).await
    }
}

/// True when the error is the API's end-of-data signal: a 409 whose message
/// says the txnTimestamp pagination cursor was empty. Any other 409 is a
/// genuine error. Detection inspects the structured message payload, never
/// the page index.
pub fn is_pagination_end(error: &MykiError) -> bool {
    match error {
        MykiError::ApiError { status, message } if *status == StatusCode::CONFLICT => {
            message.contains("txnTimestamp")
                && message.contains("Expected a non-empty value")
                && message.contains("null")
        }
        _ => false,
    }
}

/// Fetches successive pages of a card's transaction history, accumulating in
/// request order, until the sentinel end-of-data error or the page ceiling.
/// Genuine errors abort immediately with no partial results.
pub async fn fetch_all_transactions<S: TransactionSource + ?Sized>(
    source: &S,
    card_number: &str,
    max_pages: u32,
) -> Result<Vec<Transaction>, MykiError> {
    let mut all_transactions = Vec::new();
    let mut page = 0;

    info!("Fetching transactions for card {}...", card_number);

    while page < max_pages {
        debug!("Fetching page {}", page);
        match source.transactions_page(card_number, page).await {
            Ok(page_transactions) => {
                debug!("Retrieved {} transactions on page {}", page_transactions.len(), page);
                all_transactions.extend(page_transactions);
                page += 1;
            }
            Err(e) if is_pagination_end(&e) => {
                info!("Reached end of transaction data (page {})", page);
                break;
            }
            Err(e) => {
                warn!("API error on page {}: {}", page, e);
                return Err(e);
            }
        }
    }

    if page >= max_pages {
        warn!("Reached maximum page limit ({})", max_pages);
    }

    info!("Total transactions fetched: {}", all_transactions.len());
    Ok(all_transactions)
}

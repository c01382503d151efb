//! Crawler-specific error types.

use thiserror::Error;

use roomdex_federation::FederationError;

/// Errors that can occur in crawl operations.
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error(transparent)]
    Federation(#[from] FederationError),

    #[error("Storage error: {0}")]
    Storage(String),
}

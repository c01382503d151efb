//! Federation-specific error types.

use thiserror::Error;

/// Errors that can occur in federation operations.
#[derive(Debug, Error)]
pub enum FederationError {
    // ── Key management ──────────────────────────────────────────────────────

    #[error("Malformed signing key entry: {0}")]
    KeyLoad(String),

    #[error("No verify key found for key ID '{0}'")]
    KeyNotFound(String),

    #[error("Key server for '{0}' claims to be '{1}'")]
    KeyServerMismatch(String, String),

    // ── Signature verification ───────────────────────────────────────────────

    #[error("Missing Authorization header on federated request")]
    MissingAuthHeader,

    #[error("Malformed Authorization header: {0}")]
    MalformedAuthHeader(String),

    #[error("Authorization headers carry mixed origins")]
    MixedOrigins,

    #[error("Request destination '{0}' is not this server")]
    WrongDestination(String),

    #[error("Signature verification failed")]
    InvalidSignature,

    // ── Remote communication ─────────────────────────────────────────────────

    #[error("HTTP error communicating with remote server '{0}': {1}")]
    RemoteHttp(String, String),

    #[error("Remote server '{0}' returned an unexpected response: {1}")]
    RemoteProtocol(String, String),

    // ── General ─────────────────────────────────────────────────────────────

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for FederationError {
    fn from(e: reqwest::Error) -> Self {
        let server = e.url().map(|u| u.host_str().unwrap_or("?").to_owned()).unwrap_or_default();
        FederationError::RemoteHttp(server, e.to_string())
    }
}

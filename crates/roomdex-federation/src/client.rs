//! Server-to-server HTTP client.
//!
//! The [`FederationClient`] handles all outbound communication to remote
//! homeservers. Directory and alias queries are signed with every local key
//! pair before being sent; key and version probes are unauthenticated, like
//! Matrix itself treats them.
//!
//! The crawler consumes the client through the [`Federation`] trait so tests
//! can substitute a canned implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{
    discovery::{ServerLocation, ServerLocator},
    error::FederationError,
    keys::ServerKeyPair,
    signatures::sign_request,
    types::{
        DirectoryResponse, PublicRoomsResponse, ServerKeyDocument, ServerSoftware,
        ServerVersionResponse, SupportResponse, WellKnownClient,
    },
};

/// How many times a request is attempted when the remote answers 5xx.
const MAX_ATTEMPTS: u32 = 3;

/// Base backoff between attempts; multiplied by the attempt number.
const RETRY_BACKOFF: Duration = Duration::from_millis(300);

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Outbound federation operations the crawler depends on.
#[async_trait]
pub trait Federation: Send + Sync {
    /// Resolve a server name to its federation endpoint.
    async fn location(&self, server_name: &str) -> ServerLocation;

    /// `GET /_matrix/federation/v1/version`
    async fn version(&self, server_name: &str) -> Result<ServerSoftware, FederationError>;

    /// `GET /_matrix/key/v2/server`
    async fn server_keys(&self, server_name: &str) -> Result<ServerKeyDocument, FederationError>;

    /// `GET /_matrix/federation/v1/publicRooms?limit=&since=`
    async fn public_rooms(
        &self,
        server_name: &str,
        limit: u32,
        since: Option<&str>,
    ) -> Result<PublicRoomsResponse, FederationError>;

    /// `GET /_matrix/federation/v1/query/directory?room_alias=`
    async fn query_directory(
        &self,
        server_name: &str,
        alias: &str,
    ) -> Result<DirectoryResponse, FederationError>;

    /// `GET https://{server}/.well-known/matrix/client`
    async fn well_known_client(
        &self,
        server_name: &str,
    ) -> Result<WellKnownClient, FederationError>;

    /// `GET https://{server}/.well-known/matrix/support` (MSC1929)
    async fn support_contacts(&self, server_name: &str)
    -> Result<SupportResponse, FederationError>;
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Async HTTP client for outbound federation requests.
pub struct FederationClient {
    server_name: String,
    keys: Arc<Vec<ServerKeyPair>>,
    http: Client,
    locator: Arc<ServerLocator>,
}

impl FederationClient {
    pub fn new(
        server_name: impl Into<String>,
        keys: Arc<Vec<ServerKeyPair>>,
        locator: Arc<ServerLocator>,
    ) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("Roomdex/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build federation http client");

        Self { server_name: server_name.into(), keys, http, locator }
    }

    // ── Request helpers ──────────────────────────────────────────────────────

    /// GET with bounded retries. Only 5xx responses are retried; 4xx and
    /// transport errors fail immediately.
    async fn get_with_retry(
        &self,
        destination: &str,
        url: &str,
        host: Option<&str>,
        auth: Option<&[String]>,
    ) -> Result<reqwest::Response, FederationError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut req = self.http.get(url);
            if let Some(host) = host {
                req = req.header("Host", host);
            }
            if let Some(headers) = auth {
                for value in headers {
                    req = req.header(reqwest::header::AUTHORIZATION, value.as_str());
                }
            }

            let resp = req.send().await?;
            if resp.status().is_server_error() && attempt < MAX_ATTEMPTS {
                warn!(
                    "GET {} returned {}, retrying (attempt {}/{})",
                    url,
                    resp.status(),
                    attempt,
                    MAX_ATTEMPTS
                );
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                continue;
            }
            return resp
                .error_for_status()
                .map_err(|e| FederationError::RemoteHttp(destination.to_owned(), e.to_string()));
        }
    }

    async fn signed_get<T: DeserializeOwned>(
        &self,
        destination: &str,
        uri: &str,
    ) -> Result<T, FederationError> {
        let location = self.locator.resolve(destination).await;
        let url = format!("{}{}", location.api_url, uri);
        let auth = sign_request(&self.keys, &self.server_name, destination, "GET", uri, None);
        debug!("Federation GET {}", url);
        let resp =
            self.get_with_retry(destination, &url, Some(&location.host), Some(&auth)).await?;
        Ok(resp.json().await?)
    }

    async fn plain_get<T: DeserializeOwned>(
        &self,
        destination: &str,
        uri: &str,
    ) -> Result<T, FederationError> {
        let location = self.locator.resolve(destination).await;
        let url = format!("{}{}", location.api_url, uri);
        debug!("Federation GET {}", url);
        let resp = self.get_with_retry(destination, &url, Some(&location.host), None).await?;
        Ok(resp.json().await?)
    }

    /// GET against the bare server name (well-known endpoints live on the
    /// front-facing host, not the delegated federation endpoint).
    async fn front_get<T: DeserializeOwned>(
        &self,
        server_name: &str,
        path: &str,
    ) -> Result<T, FederationError> {
        let url = format!("https://{server_name}{path}");
        let resp = self.get_with_retry(server_name, &url, None, None).await?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Federation for FederationClient {
    async fn location(&self, server_name: &str) -> ServerLocation {
        self.locator.resolve(server_name).await
    }

    async fn version(&self, server_name: &str) -> Result<ServerSoftware, FederationError> {
        let resp: ServerVersionResponse =
            self.plain_get(server_name, "/_matrix/federation/v1/version").await?;
        Ok(resp.server)
    }

    async fn server_keys(&self, server_name: &str) -> Result<ServerKeyDocument, FederationError> {
        self.plain_get(server_name, "/_matrix/key/v2/server").await
    }

    async fn public_rooms(
        &self,
        server_name: &str,
        limit: u32,
        since: Option<&str>,
    ) -> Result<PublicRoomsResponse, FederationError> {
        self.signed_get(server_name, &public_rooms_uri(limit, since)).await
    }

    async fn query_directory(
        &self,
        server_name: &str,
        alias: &str,
    ) -> Result<DirectoryResponse, FederationError> {
        let uri = format!("/_matrix/federation/v1/query/directory?room_alias={}", urlencoded(alias));
        self.signed_get(server_name, &uri).await
    }

    async fn well_known_client(
        &self,
        server_name: &str,
    ) -> Result<WellKnownClient, FederationError> {
        self.front_get(server_name, "/.well-known/matrix/client").await
    }

    async fn support_contacts(
        &self,
        server_name: &str,
    ) -> Result<SupportResponse, FederationError> {
        self.front_get(server_name, "/.well-known/matrix/support").await
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn public_rooms_uri(limit: u32, since: Option<&str>) -> String {
    let mut uri = format!("/_matrix/federation/v1/publicRooms?limit={limit}");
    if let Some(token) = since {
        uri.push_str("&since=");
        uri.push_str(&urlencoded(token));
    }
    uri
}

fn urlencoded(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

//! Canned federation client for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use roomdex_federation::discovery::ServerLocation;
use roomdex_federation::error::FederationError;
use roomdex_federation::types::{
    DirectoryResponse, PublicRoomsResponse, ServerKeyDocument, ServerSoftware, SupportResponse,
    WellKnownClient,
};
use roomdex_federation::Federation;

/// A [`Federation`] implementation backed by in-memory fixtures.
#[derive(Default)]
pub(crate) struct StubFederation {
    /// Servers whose key and version endpoints answer.
    pub online: HashSet<String>,
    /// Servers whose public-rooms directory answers.
    pub indexable: HashSet<String>,
    /// Directory pages per server, addressed by the numeric since token.
    pub pages: HashMap<String, Vec<PublicRoomsResponse>>,
    /// Directory query responses keyed by room alias.
    pub directory: HashMap<String, DirectoryResponse>,
    /// MSC1929 responses keyed by server name.
    pub support: HashMap<String, SupportResponse>,
    /// When set, key probes block until a permit is released.
    pub gate: Option<Arc<Semaphore>>,
}

impl StubFederation {
    fn offline(&self, server_name: &str) -> FederationError {
        FederationError::RemoteHttp(server_name.to_owned(), "stub: unreachable".into())
    }
}

#[async_trait]
impl Federation for StubFederation {
    async fn location(&self, server_name: &str) -> ServerLocation {
        ServerLocation {
            api_url: format!("https://{server_name}:8448"),
            host: server_name.to_owned(),
        }
    }

    async fn version(&self, server_name: &str) -> Result<ServerSoftware, FederationError> {
        if !self.online.contains(server_name) {
            return Err(self.offline(server_name));
        }
        Ok(ServerSoftware { name: "Synapse".into(), version: "1.99.0".into() })
    }

    async fn server_keys(&self, server_name: &str) -> Result<ServerKeyDocument, FederationError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if !self.online.contains(server_name) {
            return Err(self.offline(server_name));
        }
        Ok(ServerKeyDocument {
            server_name: server_name.to_owned(),
            verify_keys: Default::default(),
            old_verify_keys: Default::default(),
            valid_until_ts: 0,
            signatures: Default::default(),
        })
    }

    async fn public_rooms(
        &self,
        server_name: &str,
        limit: u32,
        since: Option<&str>,
    ) -> Result<PublicRoomsResponse, FederationError> {
        if !self.indexable.contains(server_name) {
            return Err(self.offline(server_name));
        }
        if limit == 1 {
            // Indexability probe.
            return Ok(PublicRoomsResponse::default());
        }
        let pages = match self.pages.get(server_name) {
            Some(pages) => pages,
            None => return Ok(PublicRoomsResponse::default()),
        };
        let index: usize = since.map(|s| s.parse().unwrap_or(0)).unwrap_or(0);
        Ok(pages.get(index).cloned().unwrap_or_default())
    }

    async fn query_directory(
        &self,
        _server_name: &str,
        alias: &str,
    ) -> Result<DirectoryResponse, FederationError> {
        Ok(self.directory.get(alias).cloned().unwrap_or_default())
    }

    async fn well_known_client(
        &self,
        server_name: &str,
    ) -> Result<WellKnownClient, FederationError> {
        Err(self.offline(server_name))
    }

    async fn support_contacts(
        &self,
        server_name: &str,
    ) -> Result<SupportResponse, FederationError> {
        self.support.get(server_name).cloned().ok_or_else(|| self.offline(server_name))
    }
}

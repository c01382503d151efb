//! Peer verification key fetching and caching.
//!
//! `lookup_keys` pulls `/_matrix/key/v2/server` from the peer, rejects
//! documents whose embedded `server_name` differs from the requested name,
//! and caches the decoded key set until its `valid_until_ts` passes.
//!
//! The notary variant re-signs a fetched document with this instance's own
//! keys so it can vouch for peers. Pass-through signing only — it does not
//! alter trust, and callers must still verify the original signatures.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use roomdex_common::cache::BoundedCache;

use crate::{
    discovery::ServerLocator,
    error::FederationError,
    keys::ServerKeyPair,
    signatures::canonical_json,
    types::{ServerKeyDocument, VerifyKeySet},
};

/// Upper bound on cached peer key sets.
const CACHE_CAPACITY: usize = 8_192;

/// Fetches and caches peers' published Ed25519 verify keys.
pub struct KeyResolver {
    locator: Arc<ServerLocator>,
    http: reqwest::Client,
    cache: BoundedCache<String, VerifyKeySet>,
    own_keys: Arc<Vec<ServerKeyPair>>,
    server_name: String,
}

impl KeyResolver {
    pub fn new(
        locator: Arc<ServerLocator>,
        own_keys: Arc<Vec<ServerKeyPair>>,
        server_name: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("Roomdex/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build key resolver http client");
        Self {
            locator,
            http,
            cache: BoundedCache::new(CACHE_CAPACITY),
            own_keys,
            server_name: server_name.into(),
        }
    }

    /// Return the peer's current verify keys, from cache when still valid.
    pub async fn lookup_keys(&self, server_name: &str) -> Result<VerifyKeySet, FederationError> {
        let now_ms = Utc::now().timestamp_millis();
        if let Some(cached) = self.cache.get(&server_name.to_owned()).await {
            if !cached.is_expired(now_ms) {
                return Ok(cached);
            }
            debug!("Verify keys for {} expired, refetching", server_name);
        }

        let doc = self.fetch_document(server_name).await?;
        if doc.server_name != server_name {
            // A key server answering for a different name must not be cached.
            return Err(FederationError::KeyServerMismatch(
                server_name.to_owned(),
                doc.server_name,
            ));
        }

        let set = decode_key_set(&doc);
        self.cache.add(server_name.to_owned(), set.clone()).await;
        Ok(set)
    }

    /// Fetch the peer's key document and re-sign it with every local key.
    pub async fn notary_keys(&self, server_name: &str) -> Result<Value, FederationError> {
        let mut doc = self.fetch_raw(server_name).await?;
        notarize(&mut doc, &self.own_keys, &self.server_name)?;
        Ok(doc)
    }

    async fn fetch_document(
        &self,
        server_name: &str,
    ) -> Result<ServerKeyDocument, FederationError> {
        let location = self.locator.resolve(server_name).await;
        let url = format!("{}/_matrix/key/v2/server", location.api_url);
        debug!("Fetching server keys from {}", url);
        let resp = self
            .http
            .get(&url)
            .header("Host", location.host.as_str())
            .send()
            .await?
            .error_for_status()
            .map_err(|e| FederationError::RemoteHttp(server_name.to_owned(), e.to_string()))?;
        Ok(resp.json().await?)
    }

    async fn fetch_raw(&self, server_name: &str) -> Result<Value, FederationError> {
        let location = self.locator.resolve(server_name).await;
        let url = format!("{}/_matrix/key/v2/server", location.api_url);
        let resp = self
            .http
            .get(&url)
            .header("Host", location.host.as_str())
            .send()
            .await?
            .error_for_status()
            .map_err(|e| FederationError::RemoteHttp(server_name.to_owned(), e.to_string()))?;
        Ok(resp.json().await?)
    }
}

/// Decode the document's verify keys, dropping entries that are not valid
/// unpadded-base64 32-byte Ed25519 keys.
fn decode_key_set(doc: &ServerKeyDocument) -> VerifyKeySet {
    let mut set = VerifyKeySet {
        server_name: doc.server_name.clone(),
        valid_until_ts: doc.valid_until_ts,
        keys: Default::default(),
    };
    for (key_id, vk) in &doc.verify_keys {
        match STANDARD_NO_PAD.decode(&vk.key) {
            Ok(bytes) if bytes.len() == 32 => {
                set.keys.insert(key_id.clone(), vk.key.clone());
            }
            _ => warn!("Dropping undecodable verify key {} from {}", key_id, doc.server_name),
        }
    }
    set
}

/// Attach this instance's signatures to a fetched key document, signing the
/// canonical JSON of the document minus its `signatures` field.
fn notarize(
    doc: &mut Value,
    keys: &[ServerKeyPair],
    server_name: &str,
) -> Result<(), FederationError> {
    let mut signing_obj = doc.clone();
    if let Some(obj) = signing_obj.as_object_mut() {
        obj.remove("signatures");
    }
    let canonical = canonical_json(&signing_obj);

    let sigs = doc
        .as_object_mut()
        .ok_or_else(|| FederationError::RemoteProtocol(server_name.into(), "not an object".into()))?
        .entry("signatures")
        .or_insert_with(|| Value::Object(serde_json::Map::new()))
        .as_object_mut()
        .ok_or_else(|| {
            FederationError::RemoteProtocol(server_name.into(), "malformed signatures".into())
        })?
        .entry(server_name)
        .or_insert_with(|| Value::Object(serde_json::Map::new()))
        .as_object_mut()
        .ok_or_else(|| {
            FederationError::RemoteProtocol(server_name.into(), "malformed signatures".into())
        })?;

    for kp in keys {
        sigs.insert(kp.key_id.clone(), Value::String(kp.sign_json(&canonical)));
    }
    Ok(())
}

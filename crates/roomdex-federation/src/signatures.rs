//! Federation request signing and verification.
//!
//! All server-to-server HTTP requests carry one signed Authorization header
//! per local key:
//!
//! ```text
//! Authorization: X-Matrix origin="roomdex.example.com",
//!                destination="matrix.org",
//!                key="ed25519:a_ZOeT",
//!                sig="<unpadded-base64-signature>"
//! ```
//!
//! The signed content is the canonical JSON of a request object:
//!
//! ```json
//! {
//!   "method":      "GET",
//!   "uri":         "/_matrix/federation/v1/publicRooms?limit=100",
//!   "origin":      "roomdex.example.com",
//!   "destination": "matrix.org",
//!   "content":     { ... }   // only present for requests with a body
//! }
//! ```
//!
//! The object is serialised as canonical JSON (sorted keys, no extra
//! whitespace) before signing, per the Matrix canonical-JSON rules.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::{
    error::FederationError,
    key_resolver::KeyResolver,
    keys::{ServerKeyPair, verify_signature},
    types::VerifyKeySet,
};

/// Server name that disables inbound signature validation.
///
/// Deployments running under the default name skip verification entirely;
/// this is an escape hatch for local development, never for production.
const DEV_SERVER_NAME: &str = "localhost";

// ─── Signing ─────────────────────────────────────────────────────────────────

/// A parsed (or to-be-serialised) `X-Matrix` Authorization entry.
#[derive(Debug, Clone)]
pub struct XMatrixAuth {
    pub origin: String,
    pub destination: Option<String>,
    pub key_id: String,
    pub sig: String,
}

impl XMatrixAuth {
    /// Build the `Authorization: X-Matrix …` header value.
    pub fn to_header(&self) -> String {
        match &self.destination {
            Some(dest) => format!(
                r#"X-Matrix origin="{}",destination="{}",key="{}",sig="{}""#,
                self.origin, dest, self.key_id, self.sig,
            ),
            None => format!(
                r#"X-Matrix origin="{}",key="{}",sig="{}""#,
                self.origin, self.key_id, self.sig,
            ),
        }
    }

    /// Parse an `X-Matrix` Authorization header value.
    pub fn parse(header: &str) -> Result<Self, FederationError> {
        let params = header.strip_prefix("X-Matrix ").ok_or_else(|| {
            FederationError::MalformedAuthHeader("must start with 'X-Matrix '".into())
        })?;

        let mut origin = None;
        let mut destination = None;
        let mut key = None;
        let mut sig = None;

        for part in params.split(',') {
            let part = part.trim();
            if let Some(v) = quoted_value(part, "origin") {
                origin = Some(v);
            } else if let Some(v) = quoted_value(part, "destination") {
                destination = Some(v);
            } else if let Some(v) = quoted_value(part, "key") {
                key = Some(v);
            } else if let Some(v) = quoted_value(part, "sig") {
                sig = Some(v);
            }
        }

        Ok(Self {
            origin: origin
                .ok_or_else(|| FederationError::MalformedAuthHeader("missing 'origin'".into()))?,
            destination,
            key_id: key
                .ok_or_else(|| FederationError::MalformedAuthHeader("missing 'key'".into()))?,
            sig: sig.ok_or_else(|| FederationError::MalformedAuthHeader("missing 'sig'".into()))?,
        })
    }
}

fn quoted_value(part: &str, name: &str) -> Option<String> {
    part.strip_prefix(name)?
        .strip_prefix("=\"")?
        .strip_suffix('"')
        .map(str::to_owned)
}

/// Sign an outbound federation request with every local key, producing one
/// Authorization header value per key.
///
/// # Arguments
///
/// * `keys`        — this instance's signing key pairs
/// * `origin`      — this instance's server name
/// * `destination` — remote server's name
/// * `method`      — HTTP method, uppercase (e.g. `"GET"`)
/// * `uri`         — request URI path + query
/// * `content`     — request body (pass `None` for GET requests)
pub fn sign_request(
    keys: &[ServerKeyPair],
    origin: &str,
    destination: &str,
    method: &str,
    uri: &str,
    content: Option<&Value>,
) -> Vec<String> {
    let canonical = build_signing_object(method, uri, origin, Some(destination), content);
    keys.iter()
        .map(|kp| {
            XMatrixAuth {
                origin: origin.to_owned(),
                destination: Some(destination.to_owned()),
                key_id: kp.key_id.clone(),
                sig: kp.sign_json(&canonical),
            }
            .to_header()
        })
        .collect()
}

// ─── Verification ────────────────────────────────────────────────────────────

/// Validates inbound federation requests against the origin's published keys.
pub struct RequestValidator {
    resolver: Arc<KeyResolver>,
    server_name: String,
}

impl RequestValidator {
    pub fn new(resolver: Arc<KeyResolver>, server_name: impl Into<String>) -> Self {
        Self { resolver, server_name: server_name.into() }
    }

    /// Validate an inbound request and return the origin server name.
    ///
    /// Every Authorization entry must verify; a single failure rejects the
    /// whole request.
    pub async fn validate(
        &self,
        method: &str,
        uri: &str,
        content: Option<&Value>,
        auth_headers: &[String],
    ) -> Result<String, FederationError> {
        if self.server_name == DEV_SERVER_NAME {
            warn!("Running as '{DEV_SERVER_NAME}' — inbound signature validation is DISABLED");
            return Ok(auth_headers
                .first()
                .and_then(|h| XMatrixAuth::parse(h).ok())
                .map(|a| a.origin)
                .unwrap_or_else(|| DEV_SERVER_NAME.to_owned()));
        }

        if auth_headers.is_empty() {
            return Err(FederationError::MissingAuthHeader);
        }
        let entries = auth_headers
            .iter()
            .map(|h| XMatrixAuth::parse(h))
            .collect::<Result<Vec<_>, _>>()?;

        let origin = single_origin(&entries)?;
        let keys = self.resolver.lookup_keys(&origin).await?;
        verify_entries(&entries, &keys, method, uri, &self.server_name, content)?;
        Ok(origin)
    }
}

/// All entries must agree on one origin; mixed-origin sets are a spoofing
/// vector and rejected outright.
fn single_origin(entries: &[XMatrixAuth]) -> Result<String, FederationError> {
    let first = entries.first().ok_or(FederationError::MissingAuthHeader)?;
    if entries.iter().any(|e| e.origin != first.origin) {
        return Err(FederationError::MixedOrigins);
    }
    Ok(first.origin.clone())
}

/// Verify every parsed Authorization entry against `keys`.
pub(crate) fn verify_entries(
    entries: &[XMatrixAuth],
    keys: &VerifyKeySet,
    method: &str,
    uri: &str,
    server_name: &str,
    content: Option<&Value>,
) -> Result<(), FederationError> {
    let origin = single_origin(entries)?;
    let canonical = build_signing_object(method, uri, &origin, Some(server_name), content);

    for entry in entries {
        if let Some(dest) = &entry.destination {
            if dest != server_name {
                return Err(FederationError::WrongDestination(dest.clone()));
            }
        }
        let pubkey = keys
            .keys
            .get(&entry.key_id)
            .ok_or_else(|| FederationError::KeyNotFound(entry.key_id.clone()))?;
        verify_signature(pubkey, &entry.sig, canonical.as_bytes())?;
    }
    Ok(())
}

// ─── Canonical JSON ──────────────────────────────────────────────────────────

/// Build the canonical JSON object that is signed for an HTTP request.
fn build_signing_object(
    method: &str,
    uri: &str,
    origin: &str,
    destination: Option<&str>,
    content: Option<&Value>,
) -> String {
    let mut map = BTreeMap::new();
    map.insert("method", Value::String(method.to_uppercase()));
    map.insert("uri", Value::String(uri.to_owned()));
    map.insert("origin", Value::String(origin.to_owned()));
    if let Some(dest) = destination {
        map.insert("destination", Value::String(dest.to_owned()));
    }
    if let Some(body) = content {
        map.insert("content", sort_keys(body));
    }
    // BTreeMap serialisation gives sorted keys with no extra whitespace.
    serde_json::to_string(&map).expect("BTreeMap serialisation is infallible")
}

/// Produce canonical JSON (sorted keys, no extra whitespace) per the Matrix
/// canonical-JSON rules.
pub fn canonical_json(value: &Value) -> String {
    sort_keys(value).to_string()
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: serde_json::Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), sort_keys(v)))
                .collect::<BTreeMap<_, _>>()
                .into_iter()
                .collect();
            Value::Object(sorted)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

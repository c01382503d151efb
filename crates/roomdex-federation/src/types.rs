//! Federation wire types — well-known delegation, key documents, version and
//! public-rooms responses.
//!
//! Field names follow the Matrix S2S API; unknown fields are ignored so the
//! crawler keeps working against servers that extend the payloads.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ─── Well-known delegation ───────────────────────────────────────────────────

/// Response shape for `/.well-known/matrix/server`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellKnownServer {
    /// The delegated `host[:port]` federation endpoint.
    #[serde(rename = "m.server")]
    pub server: String,
}

/// Response shape for `/.well-known/matrix/client`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellKnownClient {
    #[serde(rename = "m.homeserver")]
    pub homeserver: WellKnownHomeserver,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellKnownHomeserver {
    pub base_url: String,
}

// ─── Server keys ─────────────────────────────────────────────────────────────

/// A single public verify key entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyKey {
    /// Unpadded-base64 Ed25519 public key bytes.
    pub key: String,
}

/// An expired verify key kept for verifying old signatures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OldVerifyKey {
    pub key: String,
    pub expired_ts: i64,
}

/// The signed key document served at `/_matrix/key/v2/server`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerKeyDocument {
    pub server_name: String,
    #[serde(default)]
    pub verify_keys: HashMap<String, VerifyKey>,
    #[serde(default)]
    pub old_verify_keys: HashMap<String, OldVerifyKey>,
    /// Unix millisecond timestamp after which this document must be re-fetched.
    #[serde(default)]
    pub valid_until_ts: i64,
    #[serde(default)]
    pub signatures: HashMap<String, HashMap<String, String>>,
}

/// A peer's verify keys in decoded, cacheable form.
#[derive(Debug, Clone)]
pub struct VerifyKeySet {
    pub server_name: String,
    pub valid_until_ts: i64,
    /// Key ID → unpadded-base64 public key.
    pub keys: HashMap<String, String>,
}

impl VerifyKeySet {
    /// Whether the key set has outlived its advertised lifetime.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.valid_until_ts > 0 && now_ms > self.valid_until_ts
    }
}

// ─── Version ─────────────────────────────────────────────────────────────────

/// Response shape for `/_matrix/federation/v1/version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerVersionResponse {
    pub server: ServerSoftware,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSoftware {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

// ─── Public rooms directory ──────────────────────────────────────────────────

/// Paginated response from `/_matrix/federation/v1/publicRooms`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicRoomsResponse {
    #[serde(default)]
    pub chunk: Vec<PublicRoomEntry>,
    #[serde(default)]
    pub next_batch: Option<String>,
    #[serde(default)]
    pub prev_batch: Option<String>,
    #[serde(default)]
    pub total_room_count_estimate: Option<u64>,
}

/// A single public-room entry in a directory chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicRoomEntry {
    pub room_id: String,
    #[serde(default)]
    pub canonical_alias: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub num_joined_members: i64,
    #[serde(default)]
    pub room_type: Option<String>,
    #[serde(default)]
    pub join_rule: Option<String>,
    #[serde(default)]
    pub guest_can_join: bool,
    #[serde(default)]
    pub world_readable: bool,
}

// ─── Room directory query ────────────────────────────────────────────────────

/// Response from `/_matrix/federation/v1/query/directory`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryResponse {
    #[serde(default)]
    pub room_id: String,
    /// Servers known to participate in the room.
    #[serde(default)]
    pub servers: Vec<String>,
}

// ─── MSC1929 support contacts ────────────────────────────────────────────────

/// Response shape for `/.well-known/matrix/support`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupportResponse {
    #[serde(default)]
    pub contacts: Vec<SupportContact>,
    #[serde(default)]
    pub support_page: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupportContact {
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub matrix_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl SupportContact {
    pub fn is_moderator(&self) -> bool {
        matches!(self.role.as_deref(), Some("m.role.moderator"))
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role.as_deref(), Some("m.role.admin"))
    }
}

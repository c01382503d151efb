//! Core domain models shared across all Roomdex services.
//!
//! These are the "truth" types — what the data repository stores and the
//! search index consumes downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discovered Matrix homeserver.
///
/// Mutated only by discovery. Transient failures mark a server `online = false`;
/// physical removal happens only after it stays offline past the retention
/// threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    /// Bare server name (e.g. "example.com").
    pub name: String,

    /// Resolved federation API base URL (e.g. "https://fed.example.com:8448").
    pub api_url: String,

    /// Hostname used for TLS SNI / the `Host` header when the API URL points
    /// at a resolved IP address.
    pub federation_host: String,

    /// Homeserver software name as reported by `/version` (e.g. "Synapse").
    pub software: String,

    /// Homeserver software version as reported by `/version`.
    pub software_version: String,

    /// Whether the server answered the last liveness probe.
    pub online: bool,

    /// Whether the server publishes its public room directory over federation.
    pub indexable: bool,

    /// MSC1929 support contacts, if published.
    pub contacts: ServerContacts,

    /// When the server was last confirmed online.
    pub online_at: DateTime<Utc>,
}

/// Support contacts published at `/.well-known/matrix/support` (MSC1929).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerContacts {
    pub emails: Vec<String>,
    pub mxids: Vec<String>,
    pub url: String,
}

/// A public room pulled from a homeserver's room directory.
///
/// Created or overwritten on each parse pass. Persisted only if it passed
/// the room admission checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Room {
    /// Room ID (`!opaque:server`).
    pub id: String,

    /// Canonical alias (`#name:server`).
    pub alias: String,

    pub name: String,

    /// Room topic with directory tags stripped out.
    pub topic: String,

    /// Avatar as an `mxc://` URI, as published by the directory.
    pub avatar: String,

    /// Avatar as an externally fetchable HTTP URL.
    pub avatar_url: String,

    /// Joined member count (denormalized for ranking).
    pub members: i64,

    /// Room type (e.g. "m.space"), empty for plain rooms.
    pub room_type: String,

    pub join_rule: String,

    pub guest_joinable: bool,

    pub world_readable: bool,

    /// The server whose directory this room was pulled from.
    pub server: String,

    /// Contact email, from a topic tag or the owning server's contacts.
    pub email: String,

    /// Room language, from a topic tag (e.g. "EN").
    pub language: String,

    /// When this room was last parsed.
    pub parsed_at: DateTime<Utc>,
}

/// Extract the server part of a Matrix identifier.
///
/// Identifiers carry a sigil-prefixed localpart and a trailing server name:
/// `!abc:example.com`, `#room:example.com:8448`, `@user:example.com`.
/// Returns `None` when the identifier has no `:server` segment.
pub fn server_from_id(id: &str) -> Option<&str> {
    let rest = id.get(1..)?;
    let (_, server) = rest.split_once(':')?;
    if server.is_empty() { None } else { Some(server) }
}

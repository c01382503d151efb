//! Admission checks for servers and rooms.
//!
//! The validator decides which servers are worth crawling and which rooms may
//! enter the dataset. Server checks go over the federation client; room
//! checks are pure and consulted both at parse time and on every stored-room
//! traversal, so blocklist changes retroactively evict rooms.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use roomdex_common::models::Room;
use roomdex_federation::Federation;

use crate::blocklist::Blocklist;

/// Server names must fit `[MIN_NAME_LEN, MAX_NAME_LEN]`.
const MIN_NAME_LEN: usize = 4;
const MAX_NAME_LEN: usize = 77;

/// RFC-1034-style hostname: dot-separated labels of at most 63 characters,
/// no leading/trailing hyphens.
static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$")
        .expect("hostname regex is valid")
});

/// Liveness probe result. Partial data is kept for diagnostics even when the
/// server is judged offline.
#[derive(Debug, Default, Clone)]
pub struct OnlineStatus {
    /// Server name as claimed by its own key server.
    pub name: String,
    pub software: String,
    pub version: String,
    pub online: bool,
}

/// Composite admission checks for servers and rooms.
pub struct Validator {
    fed: Arc<dyn Federation>,
    blocklist: Arc<Blocklist>,
    server_name: String,
}

impl Validator {
    pub fn new(
        fed: Arc<dyn Federation>,
        blocklist: Arc<Blocklist>,
        server_name: impl Into<String>,
    ) -> Self {
        Self { fed, blocklist, server_name: server_name.into() }
    }

    /// Whether `name` is a plausible remote server name.
    pub fn domain(&self, name: &str) -> bool {
        if name == self.server_name {
            return false;
        }
        if name.len() < MIN_NAME_LEN || name.len() > MAX_NAME_LEN {
            return false;
        }
        HOSTNAME_RE.is_match(name)
    }

    /// Probe liveness: the peer's key server must claim an identity, and its
    /// `/version` endpoint must answer.
    pub async fn is_online(&self, name: &str) -> OnlineStatus {
        if !self.domain(name) {
            return OnlineStatus::default();
        }

        let doc = match self.fed.server_keys(name).await {
            Ok(doc) => doc,
            Err(e) => {
                debug!("Key probe failed for {}: {}", name, e);
                return OnlineStatus { name: name.to_owned(), ..Default::default() };
            }
        };
        if doc.server_name.is_empty() {
            return OnlineStatus { name: name.to_owned(), ..Default::default() };
        }

        match self.fed.version(name).await {
            Ok(software) => OnlineStatus {
                name: doc.server_name,
                software: software.name,
                version: software.version,
                online: true,
            },
            Err(e) => {
                debug!("Version probe failed for {}: {}", name, e);
                OnlineStatus { name: doc.server_name, ..Default::default() }
            }
        }
    }

    /// Whether the server publishes its public room directory over federation.
    pub async fn is_indexable(&self, name: &str) -> bool {
        if !self.domain(name) || self.blocklist.by_server(name) {
            return false;
        }
        self.fed.public_rooms(name, 1, None).await.is_ok()
    }

    /// Whether a room pulled from `probing_server`'s directory may enter the
    /// dataset.
    pub fn is_room_allowed(&self, probing_server: &str, room: &Room) -> bool {
        if room.id.is_empty() || room.alias.is_empty() {
            return false;
        }
        if self.blocklist.by_id(&room.id) || self.blocklist.by_id(&room.alias) {
            return false;
        }
        if !room.server.is_empty() && self.blocklist.by_server(&room.server) {
            return false;
        }
        if self.blocklist.by_server(probing_server) {
            return false;
        }
        !self.topic_opts_out(&room.topic)
    }

    /// Legacy opt-out marker: `{ourName}:noindex` in the topic, with the
    /// spacing variants seen in the wild.
    fn topic_opts_out(&self, topic: &str) -> bool {
        let topic = topic.to_lowercase();
        let name = self.server_name.to_lowercase();
        [format!("{name}:noindex"), format!("{name} : noindex"), format!("{name}: noindex")]
            .iter()
            .any(|marker| topic.contains(marker))
    }
}

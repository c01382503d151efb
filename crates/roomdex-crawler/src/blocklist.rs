//! Server deny-list.
//!
//! Static entries come from configuration and never change at runtime.
//! Dynamic entries are added during a crawl (e.g. by moderation) and cleared
//! at the start of the next full discovery cycle.

use std::collections::HashSet;
use std::sync::RwLock;

use roomdex_common::models::server_from_id;

/// Static + dynamic server name deny-list.
///
/// Thread-safe; membership checks are taken on every server and room the
/// crawler touches.
pub struct Blocklist {
    fixed: HashSet<String>,
    dynamic: RwLock<HashSet<String>>,
}

impl Blocklist {
    pub fn new(static_entries: &[String]) -> Self {
        Self {
            fixed: static_entries.iter().cloned().collect(),
            dynamic: RwLock::new(HashSet::new()),
        }
    }

    /// Whether `server_name` is blocklisted.
    pub fn by_server(&self, server_name: &str) -> bool {
        self.fixed.contains(server_name)
            || self.dynamic.read().expect("blocklist lock poisoned").contains(server_name)
    }

    /// Whether the server embedded in a Matrix identifier (`!x:server`,
    /// `#x:server`) is blocklisted.
    pub fn by_id(&self, id: &str) -> bool {
        match server_from_id(id) {
            Some(server) => self.by_server(server),
            None => false,
        }
    }

    /// Add a dynamic entry, effective until the next [`reset`](Self::reset).
    pub fn add(&self, server_name: impl Into<String>) {
        self.dynamic.write().expect("blocklist lock poisoned").insert(server_name.into());
    }

    /// Clear the dynamic half. Static entries are untouched.
    pub fn reset(&self) {
        self.dynamic.write().expect("blocklist lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.fixed.len() + self.dynamic.read().expect("blocklist lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

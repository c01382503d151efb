//! # roomdex-federation
//!
//! Matrix server-to-server (S2S) protocol layer for Roomdex.
//!
//! ## Architecture
//!
//! The crawler only ever acts as a federation *client*: it resolves bare
//! server names to reachable API endpoints, fetches peer verification keys,
//! and issues signed directory/version queries.
//!
//! ```text
//!  roomdex.example.com            matrix.org
//!       │                             │
//!       ├── GET /.well-known/matrix/server ──► (delegation)
//!       ├── GET /_matrix/key/v2/server ─────► (verify keys)
//!       ├── GET /_matrix/federation/v1/publicRooms?since=… ──► (directory)
//!       │                             │
//! ```
//!
//! ## Key concepts
//!
//! - **Server keys** (`keys.rs`): this instance holds one or more Ed25519 key
//!   pairs, loaded from config at startup. Every outbound request is signed
//!   with all of them.
//! - **Discovery** (`discovery.rs`): resolves `server.tld` → actual S2S
//!   endpoint via `/.well-known/matrix/server`, `_matrix-fed._tcp` SRV DNS,
//!   or direct HTTPS fallback, preserving the TLS host across IP delegation.
//! - **Key resolver** (`key_resolver.rs`): fetches and caches peers'
//!   published verify keys, honouring `valid_until_ts`.
//! - **Signed requests** (`signatures.rs`): the `X-Matrix` Authorization
//!   scheme over canonical JSON, both outbound signing and inbound
//!   verification.
//! - **Federation client** (`client.rs`): async HTTP client behind the
//!   [`Federation`] trait the crawler consumes.

pub mod client;
pub mod discovery;
pub mod error;
pub mod key_resolver;
pub mod keys;
pub mod signatures;
pub mod types;

pub use client::{Federation, FederationClient};
pub use discovery::{ServerLocation, ServerLocator};
pub use error::FederationError;
pub use key_resolver::KeyResolver;
pub use keys::ServerKeyPair;

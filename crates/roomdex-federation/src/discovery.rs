//! Server discovery — resolves a bare server name to a reachable HTTPS base
//! URL and the hostname to present during TLS.
//!
//! Resolution order (first success wins, result cached for the process
//! lifetime):
//!
//! 1. **Cache hit** — return immediately.
//! 2. **`.well-known/matrix/server`** — follow the delegated `host[:port]`.
//!    A portless delegated host goes through the `_matrix-fed._tcp` SRV
//!    sub-chain; when the SRV target differs from the delegated host it is
//!    resolved to an address while the delegated host is kept as the TLS
//!    host, so certificate validation still sees the right name.
//! 3. **Direct SRV** — `_matrix-fed._tcp` lookup on the original server name.
//! 4. **Direct HTTPS fallback** — `https://<name>:8448`.
//!
//! Matrix delegation is expected to be stable, so cached entries are never
//! evicted synchronously. A resolution may instead emit the server name on a
//! fire-and-forget channel so the crawler can refresh liveness data in the
//! background without blocking the caller.

use std::net::IpAddr;
use std::time::Duration;

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use roomdex_common::cache::BoundedCache;

use crate::types::WellKnownServer;

/// Default federation port.
const DEFAULT_FED_PORT: u16 = 8448;

/// Upper bound on cached resolutions.
const CACHE_CAPACITY: usize = 8_192;

/// DNS service name for federation SRV delegation.
const SRV_SERVICE: &str = "_matrix-fed._tcp";

/// A resolved federation endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLocation {
    /// Federation API base URL, e.g. `https://fed.example.com:8448`.
    pub api_url: String,
    /// Hostname for TLS SNI / the `Host` header. Differs from the URL host
    /// when SRV delegation points at a raw address.
    pub host: String,
}

/// Resolves and caches federation endpoints for bare server names.
///
/// Thread-safe, suitable for sharing across crawler workers via `Arc`.
pub struct ServerLocator {
    http: reqwest::Client,
    resolver: TokioAsyncResolver,
    cache: BoundedCache<String, ServerLocation>,
    rediscover: Option<UnboundedSender<String>>,
}

impl ServerLocator {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent(concat!("Roomdex/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build discovery http client");
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|_| {
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });
        Self { http, resolver, cache: BoundedCache::new(CACHE_CAPACITY), rediscover: None }
    }

    /// Emit every freshly resolved server name on `tx` so the caller can
    /// schedule a background re-discovery. Sends are fire-and-forget.
    pub fn with_rediscovery(mut self, tx: UnboundedSender<String>) -> Self {
        self.rediscover = Some(tx);
        self
    }

    /// Resolve `server_name` to a federation endpoint.
    ///
    /// Infallible: the final fallback step always yields a location. Each
    /// remote step is bounded by the HTTP/DNS client timeouts.
    pub async fn resolve(&self, server_name: &str) -> ServerLocation {
        if let Some(cached) = self.cache.get(&server_name.to_owned()).await {
            debug!("Discovery cache hit: {} → {}", server_name, cached.api_url);
            return cached;
        }

        let location = self.resolve_uncached(server_name).await;
        self.cache.add(server_name.to_owned(), location.clone()).await;

        if let Some(tx) = &self.rediscover {
            let _ = tx.send(server_name.to_owned());
        }

        location
    }

    // ── Resolution chain ─────────────────────────────────────────────────────

    async fn resolve_uncached(&self, server_name: &str) -> ServerLocation {
        if let Some(location) = self.from_well_known(server_name).await {
            debug!("Discovery (well-known): {} → {}", server_name, location.api_url);
            return location;
        }

        if let Some(location) = self.srv_chain(server_name).await {
            debug!("Discovery (SRV): {} → {}", server_name, location.api_url);
            return location;
        }

        let location = direct_location(server_name, DEFAULT_FED_PORT);
        debug!("Discovery (fallback): {} → {}", server_name, location.api_url);
        location
    }

    async fn from_well_known(&self, server_name: &str) -> Option<ServerLocation> {
        let url = format!("https://{server_name}/.well-known/matrix/server");
        let resp = self.http.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        // A malformed body is treated as an absent well-known so the chain
        // continues with the next step.
        let wk: WellKnownServer = resp.json().await.ok()?;
        Some(self.delegated(&wk.server).await)
    }

    /// Apply the port/SRV rules to a delegated `host[:port]`.
    async fn delegated(&self, delegated: &str) -> ServerLocation {
        let (host, port) = split_host_port(delegated);
        if port.is_some() {
            // An explicit port is authoritative for both URL and TLS host.
            return ServerLocation {
                api_url: format!("https://{delegated}"),
                host: host.to_owned(),
            };
        }
        match self.srv_chain(host).await {
            Some(location) => location,
            None => direct_location(host, DEFAULT_FED_PORT),
        }
    }

    /// SRV sub-chain on `host`: returns `None` when no SRV record exists.
    async fn srv_chain(&self, host: &str) -> Option<ServerLocation> {
        let (target, port) = self.lookup_srv(host).await?;
        if target == host {
            return Some(direct_location(host, port));
        }
        // The SRV target is a different hostname; connect to its address but
        // keep `host` as the TLS name the remote certificate must match.
        match self.lookup_ip(&target).await {
            Some(ip) => Some(ServerLocation {
                api_url: format!("https://{}:{}", fmt_host(&ip.to_string()), port),
                host: host.to_owned(),
            }),
            None => Some(direct_location(host, DEFAULT_FED_PORT)),
        }
    }

    async fn lookup_srv(&self, host: &str) -> Option<(String, u16)> {
        let name = format!("{SRV_SERVICE}.{host}.");
        let lookup = self.resolver.srv_lookup(name).await.ok()?;
        let record = lookup.iter().next()?;
        let target = record.target().to_utf8();
        Some((target.trim_end_matches('.').to_owned(), record.port()))
    }

    async fn lookup_ip(&self, host: &str) -> Option<IpAddr> {
        self.resolver.lookup_ip(host).await.ok()?.iter().next()
    }
}

impl Default for ServerLocator {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn direct_location(host: &str, port: u16) -> ServerLocation {
    ServerLocation {
        api_url: format!("https://{}:{}", fmt_host(host), port),
        host: host.to_owned(),
    }
}

/// Bracket bare IPv6 literals for use in a URL authority.
fn fmt_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_owned()
    }
}

/// Split `host[:port]`, handling bracketed and bare IPv6 literals.
fn split_host_port(s: &str) -> (&str, Option<u16>) {
    if let Some(rest) = s.strip_prefix('[') {
        if let Some((host, after)) = rest.split_once(']') {
            let port = after.strip_prefix(':').and_then(|p| p.parse().ok());
            return (host, port);
        }
        return (s, None);
    }
    match s.rsplit_once(':') {
        // A second colon in the host part means a bare IPv6 literal, not a port.
        Some((host, p)) if !host.contains(':') => match p.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (s, None),
        },
        _ => (s, None),
    }
}

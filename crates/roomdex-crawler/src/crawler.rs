//! Crawl orchestration.
//!
//! The [`Crawler`] runs three kinds of operations — server discovery, room
//! parsing, and stored-room traversal — each single-flight: a request to
//! start one while it is already running is a rejected no-op, never queued.
//!
//! Inside a pass, work fans out over a bounded [`WorkerPool`] and joins at a
//! single drain barrier. Task failures are isolated: one server's timeout or
//! panic never aborts its siblings, and persistence errors skip the item.

use std::collections::{BTreeSet, HashSet};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use roomdex_common::models::{Room, Server, ServerContacts};
use roomdex_federation::Federation;
use roomdex_federation::types::{PublicRoomEntry, SupportResponse};

use crate::blocklist::Blocklist;
use crate::media::MediaResolver;
use crate::pool::WorkerPool;
use crate::repository::DataRepository;
use crate::rooms;
use crate::validator::Validator;

// ─── Configuration & reports ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Default worker pool size.
    pub workers: usize,
    /// Seed homeservers for discovery.
    pub servers: Vec<String>,
    /// Page size for public-rooms pagination.
    pub rooms_page_limit: u32,
    /// Rooms not reparsed within this many days are purged.
    pub room_retention_days: i64,
    /// Servers offline for longer than this many days are purged.
    pub server_retention_days: i64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 16,
            servers: Vec::new(),
            rooms_page_limit: 10_000,
            room_retention_days: 7,
            server_retention_days: 30,
        }
    }
}

/// Outcome of a discovery pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub total: usize,
    pub online: usize,
    pub indexable: usize,
    pub offline: usize,
    pub failed: usize,
}

/// Outcome of a room-parsing pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsingReport {
    pub servers: usize,
    pub rooms: usize,
    pub discovered: usize,
    pub failed: usize,
}

/// HTTP-status-like outcome of an ad hoc server registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddServerOutcome {
    AlreadyKnown,
    Created,
    Unprocessable,
}

enum ServerStatus {
    Offline,
    Online,
    Indexable,
}

// ─── Single-flight state ─────────────────────────────────────────────────────

#[derive(Default)]
struct OpFlags {
    discovering: AtomicBool,
    parsing: AtomicBool,
    traversing: AtomicBool,
}

/// RAII token for a single-flight operation; the flag is released on drop.
struct OpGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> OpGuard<'a> {
    fn try_start(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

// ─── Crawler ─────────────────────────────────────────────────────────────────

/// Orchestrates discovery and room parsing over the worker pool.
///
/// Process-wide singleton: the single-flight flags belong to one instance.
pub struct Crawler {
    repo: Arc<dyn DataRepository>,
    fed: Arc<dyn Federation>,
    validator: Arc<Validator>,
    blocklist: Arc<Blocklist>,
    media: Arc<dyn MediaResolver>,
    cfg: CrawlerConfig,
    ops: OpFlags,
}

impl Crawler {
    pub fn new(
        repo: Arc<dyn DataRepository>,
        fed: Arc<dyn Federation>,
        validator: Arc<Validator>,
        blocklist: Arc<Blocklist>,
        media: Arc<dyn MediaResolver>,
        cfg: CrawlerConfig,
    ) -> Arc<Self> {
        Arc::new(Self { repo, fed, validator, blocklist, media, cfg, ops: OpFlags::default() })
    }

    // ── Discovery ────────────────────────────────────────────────────────────

    /// Probe a candidate set of servers and persist the results.
    ///
    /// Candidates default to the configured seeds plus every server already
    /// known to the data store; `overrides` restricts the pass to an explicit
    /// set (used for the secondary pass after room parsing). Servers found
    /// offline are marked, never deleted here.
    ///
    /// Returns `None` when a discovery pass is already running.
    pub async fn discover_servers(
        self: &Arc<Self>,
        workers: usize,
        overrides: Option<Vec<String>>,
    ) -> Option<DiscoveryReport> {
        let Some(_guard) = OpGuard::try_start(&self.ops.discovering) else {
            warn!("Discovery already running — ignoring trigger");
            return None;
        };

        let full_cycle = overrides.is_none();
        if full_cycle {
            // Dynamic blocklist entries last until the next full cycle.
            self.blocklist.reset();
        }

        let candidates: Vec<String> = match overrides {
            Some(list) => list.into_iter().collect::<BTreeSet<_>>().into_iter().collect(),
            None => {
                let mut set: BTreeSet<String> = self.cfg.servers.iter().cloned().collect();
                match self.repo.filter_servers(&|_| true).await {
                    Ok(known) => set.extend(known.into_iter().map(|s| s.name)),
                    Err(e) => error!("Failed to list known servers: {e}"),
                }
                set.into_iter().collect()
            }
        };

        let pool_size = workers.min(candidates.len()).max(1);
        info!("Discovering {} servers with {} workers", candidates.len(), pool_size);

        let online = Arc::new(AtomicUsize::new(0));
        let indexable = Arc::new(AtomicUsize::new(0));
        let offline_names: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let mut pool = WorkerPool::new(pool_size);
        for name in &candidates {
            let this = Arc::clone(self);
            let name = name.clone();
            let online = online.clone();
            let indexable = indexable.clone();
            let offline_names = offline_names.clone();
            pool.spawn(async move {
                match this.discover_server(&name).await {
                    ServerStatus::Indexable => {
                        online.fetch_add(1, Ordering::Relaxed);
                        indexable.fetch_add(1, Ordering::Relaxed);
                    }
                    ServerStatus::Online => {
                        online.fetch_add(1, Ordering::Relaxed);
                    }
                    ServerStatus::Offline => offline_names.lock().await.push(name),
                }
            });
        }
        let failed = pool.wait().await;

        let offline = offline_names.lock().await.clone();
        if !offline.is_empty() {
            if let Err(e) = self.repo.mark_servers_offline(&offline).await {
                error!("Failed to mark servers offline: {e}");
            }
        }

        let report = DiscoveryReport {
            total: candidates.len(),
            online: online.load(Ordering::Relaxed),
            indexable: indexable.load(Ordering::Relaxed),
            offline: offline.len(),
            failed,
        };
        info!(
            "Discovery complete: {}/{} online, {} indexable, {} offline, {} failed",
            report.online, report.total, report.indexable, report.offline, report.failed
        );
        Some(report)
    }

    /// Probe one server and persist what was learned.
    async fn discover_server(&self, name: &str) -> ServerStatus {
        let status = self.validator.is_online(name).await;
        if !status.online {
            debug!("{} is offline", name);
            return ServerStatus::Offline;
        }

        let location = self.fed.location(name).await;
        let contacts = self.server_contacts(name).await;
        let indexable = self.validator.is_indexable(name).await;

        // Best-effort client delegation lookup, diagnostics only.
        if let Ok(wk) = self.fed.well_known_client(name).await {
            debug!("{} advertises client API at {}", name, wk.homeserver.base_url);
        }

        let server = Server {
            name: name.to_owned(),
            api_url: location.api_url,
            federation_host: location.host,
            software: status.software,
            software_version: status.version,
            online: true,
            indexable,
            contacts,
            online_at: Utc::now(),
        };
        if let Err(e) = self.repo.add_server(server).await {
            error!("Failed to persist server {name}: {e}");
        }

        if indexable { ServerStatus::Indexable } else { ServerStatus::Online }
    }

    /// Register a single server synchronously.
    pub async fn add_server(&self, name: &str) -> AddServerOutcome {
        match self.repo.has_server(name).await {
            Ok(true) => return AddServerOutcome::AlreadyKnown,
            Ok(false) => {}
            Err(e) => {
                error!("Failed to check server {name}: {e}");
                return AddServerOutcome::Unprocessable;
            }
        }
        if !self.validator.domain(name) {
            return AddServerOutcome::Unprocessable;
        }
        match self.discover_server(name).await {
            ServerStatus::Offline => AddServerOutcome::Unprocessable,
            _ => AddServerOutcome::Created,
        }
    }

    /// Register servers in bulk, asynchronously. Names already known or
    /// failing the domain check are skipped.
    pub fn add_servers(self: &Arc<Self>, names: Vec<String>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            for name in names {
                if matches!(this.repo.has_server(&name).await, Ok(true)) {
                    continue;
                }
                if !this.validator.domain(&name) {
                    continue;
                }
                let _ = this.discover_server(&name).await;
            }
        });
    }

    // ── Room parsing ─────────────────────────────────────────────────────────

    /// Pull and normalize the public room directory of every indexable
    /// server, then run the secondary discovery pass and housekeeping.
    ///
    /// Returns `None` when a parsing pass is already running.
    pub async fn parse_rooms(self: &Arc<Self>, workers: usize) -> Option<ParsingReport> {
        let Some(_guard) = OpGuard::try_start(&self.ops.parsing) else {
            warn!("Room parsing already running — ignoring trigger");
            return None;
        };

        let servers: Vec<Server> = match self.repo.filter_servers(&|s| s.indexable).await {
            Ok(list) => {
                list.into_iter().filter(|s| !self.blocklist.by_server(&s.name)).collect()
            }
            Err(e) => {
                error!("Failed to list indexable servers: {e}");
                return Some(ParsingReport::default());
            }
        };

        let pool_size = workers.min(servers.len()).max(1);
        info!("Parsing rooms from {} servers with {} workers", servers.len(), pool_size);

        let discovered: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        let parsed = Arc::new(AtomicUsize::new(0));

        let mut pool = WorkerPool::new(pool_size);
        for server in &servers {
            let this = Arc::clone(self);
            let server = server.clone();
            let discovered = discovered.clone();
            let parsed = parsed.clone();
            pool.spawn(async move {
                this.parse_server_rooms(server, discovered, parsed).await;
            });
        }
        let failed = pool.wait().await;
        if failed > 0 {
            warn!("{failed} room parsing tasks failed");
        }

        if let Err(e) = self.repo.flush_room_batch().await {
            error!("Failed to flush room batch: {e}");
        }

        // Secondary discovery, bounded to servers first observed this pass.
        let mut fresh: Vec<String> = Vec::new();
        for name in discovered.lock().await.iter() {
            if self.blocklist.by_server(name) || !self.validator.domain(name) {
                continue;
            }
            if matches!(self.repo.has_server(name).await, Ok(true)) {
                continue;
            }
            fresh.push(name.clone());
        }
        if !fresh.is_empty() {
            info!("Observed {} new servers during parsing", fresh.len());
            if let Err(e) = self.repo.batch_servers(fresh.clone()).await {
                error!("Failed to register observed servers: {e}");
            }
            self.discover_servers(workers, Some(fresh.clone())).await;
        }

        self.housekeeping().await;

        let report = ParsingReport {
            servers: servers.len(),
            rooms: parsed.load(Ordering::Relaxed),
            discovered: fresh.len(),
            failed,
        };
        info!(
            "Parsing complete: {} rooms from {} servers, {} new servers observed",
            report.rooms, report.servers, report.discovered
        );
        Some(report)
    }

    /// Walk one server's directory. Pages are fetched strictly in since-token
    /// order so the remote cursor stays consistent; pagination is never
    /// parallelized within a server.
    async fn parse_server_rooms(
        &self,
        server: Server,
        discovered: Arc<Mutex<HashSet<String>>>,
        parsed: Arc<AtomicUsize>,
    ) {
        let mut since: Option<String> = None;
        loop {
            let page = match self
                .fed
                .public_rooms(&server.name, self.cfg.rooms_page_limit, since.as_deref())
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!("Public rooms fetch failed for {}: {}", server.name, e);
                    break;
                }
            };
            if page.chunk.is_empty() {
                break;
            }
            for entry in &page.chunk {
                self.process_room(&server, entry, &discovered, &parsed).await;
            }
            match page.next_batch {
                Some(token) if !token.is_empty() => since = Some(token),
                _ => break,
            }
        }
    }

    async fn process_room(
        &self,
        server: &Server,
        entry: &PublicRoomEntry,
        discovered: &Mutex<HashSet<String>>,
        parsed: &AtomicUsize,
    ) {
        let fallback_email = server.contacts.emails.first().map(String::as_str).unwrap_or("");
        let (room, noindex) = rooms::from_directory_entry(
            entry,
            &server.name,
            fallback_email,
            self.media.as_ref(),
        );
        if noindex {
            debug!("Room {} opted out of indexing", room.id);
            return;
        }
        if !self.validator.is_room_allowed(&server.name, &room) {
            debug!("Room {} rejected", room.id);
            return;
        }

        {
            let mut set = discovered.lock().await;
            set.extend(rooms::servers_of_room(&room));
        }
        if let Ok(dir) = self.fed.query_directory(&server.name, &room.alias).await {
            discovered.lock().await.extend(dir.servers);
        }

        if let Err(e) = self.repo.add_room_batch(room).await {
            error!("Failed to queue room from {}: {}", server.name, e);
            return;
        }
        parsed.fetch_add(1, Ordering::Relaxed);
    }

    /// Post-parse maintenance: advisory member-count ranking, stale room
    /// purge, wholesale mapping rebuild, long-offline server purge.
    async fn housekeeping(&self) {
        let room_cutoff = Utc::now() - Duration::days(self.cfg.room_retention_days);
        let mut sizes: Vec<(String, i64)> = Vec::new();
        let mut pairs: Vec<(String, String)> = Vec::new();
        let mut stale: Vec<String> = Vec::new();

        let walked = self
            .repo
            .each_room(&mut |id, room| {
                if room.parsed_at < room_cutoff {
                    stale.push(id.to_owned());
                } else {
                    sizes.push((id.to_owned(), room.members));
                    pairs.push((id.to_owned(), room.alias.clone()));
                }
                ControlFlow::Continue(())
            })
            .await;
        if let Err(e) = walked {
            error!("Housekeeping room walk failed: {e}");
            return;
        }

        // Descending member count; tie order is unspecified and advisory.
        sizes.sort_by(|a, b| b.1.cmp(&a.1));
        let biggest: Vec<String> = sizes.into_iter().map(|(id, _)| id).collect();
        if let Err(e) = self.repo.set_biggest_rooms(biggest).await {
            error!("Failed to store room ranking: {e}");
        }

        if !stale.is_empty() {
            info!("Purging {} rooms not reparsed within {} days", stale.len(), self.cfg.room_retention_days);
            if let Err(e) = self.repo.remove_rooms(&stale).await {
                error!("Failed to purge stale rooms: {e}");
            }
        }

        if let Err(e) = self.repo.recreate_room_mapping(pairs).await {
            error!("Failed to rebuild room mapping: {e}");
        }

        let server_cutoff = Utc::now() - Duration::days(self.cfg.server_retention_days);
        let dead_filter = move |s: &Server| !s.online && s.online_at < server_cutoff;
        match self.repo.filter_servers(&dead_filter).await {
            Ok(dead) if !dead.is_empty() => {
                let names: Vec<String> = dead.into_iter().map(|s| s.name).collect();
                info!(
                    "Purging {} servers offline for more than {} days",
                    names.len(),
                    self.cfg.server_retention_days
                );
                if let Err(e) = self.repo.remove_servers(&names).await {
                    error!("Failed to purge offline servers: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => error!("Failed to list offline servers: {e}"),
        }
    }

    // ── Traversal ────────────────────────────────────────────────────────────

    /// Visit every stored room that is still admissible. Rooms failing the
    /// current admission checks are removed as a side effect. The handler may
    /// return `ControlFlow::Break` to stop early.
    ///
    /// Returns `None` when a traversal is already running or the walk failed.
    pub async fn each_room(
        &self,
        handler: &mut (dyn FnMut(&Room) -> ControlFlow<()> + Send),
    ) -> Option<()> {
        let Some(_guard) = OpGuard::try_start(&self.ops.traversing) else {
            warn!("Room traversal already running — ignoring trigger");
            return None;
        };

        let mut disallowed: Vec<String> = Vec::new();
        let validator = self.validator.clone();
        let walked = self
            .repo
            .each_room(&mut |id, room| {
                if !validator.is_room_allowed(&room.server, room) {
                    disallowed.push(id.to_owned());
                    return ControlFlow::Continue(());
                }
                handler(room)
            })
            .await;
        if let Err(e) = walked {
            error!("Room traversal failed: {e}");
            return None;
        }

        if !disallowed.is_empty() {
            info!("Removing {} rooms no longer admissible", disallowed.len());
            if let Err(e) = self.repo.remove_rooms(&disallowed).await {
                error!("Failed to remove disallowed rooms: {e}");
            }
        }
        Some(())
    }

    // ── Contacts ─────────────────────────────────────────────────────────────

    /// Best-effort MSC1929 fetch. Moderator contacts are preferred, then
    /// admins, then anything listed. Never blocks discovery on failure.
    pub async fn server_contacts(&self, name: &str) -> ServerContacts {
        match self.fed.support_contacts(name).await {
            Ok(resp) => contacts_from_support(resp),
            Err(_) => ServerContacts::default(),
        }
    }
}

fn contacts_from_support(resp: SupportResponse) -> ServerContacts {
    let moderators: Vec<_> = resp.contacts.iter().filter(|c| c.is_moderator()).collect();
    let chosen: Vec<_> = if !moderators.is_empty() {
        moderators
    } else {
        let admins: Vec<_> = resp.contacts.iter().filter(|c| c.is_admin()).collect();
        if !admins.is_empty() { admins } else { resp.contacts.iter().collect() }
    };

    let mut contacts =
        ServerContacts { url: resp.support_page.clone().unwrap_or_default(), ..Default::default() };
    for contact in chosen {
        if let Some(email) = contact.email_address.as_deref() {
            if !email.is_empty() && !contacts.emails.iter().any(|e| e == email) {
                contacts.emails.push(email.to_owned());
            }
        }
        if let Some(mxid) = contact.matrix_id.as_deref() {
            if !mxid.is_empty() && !contacts.mxids.iter().any(|m| m == mxid) {
                contacts.mxids.push(mxid.to_owned());
            }
        }
    }
    contacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    use tokio::sync::Semaphore;

    use roomdex_federation::types::{
        DirectoryResponse, PublicRoomsResponse, SupportContact,
    };

    use crate::media::AvatarProxy;
    use crate::repository::memory::InMemoryRepository;
    use crate::testing::StubFederation;

    const SELF_NAME: &str = "roomdex.example.com";

    fn build(
        stub: StubFederation,
        seed: &[&str],
        blocked: &[String],
    ) -> (Arc<Crawler>, Arc<InMemoryRepository>, Arc<Blocklist>) {
        let fed: Arc<dyn Federation> = Arc::new(stub);
        let blocklist = Arc::new(Blocklist::new(blocked));
        let validator = Arc::new(Validator::new(fed.clone(), blocklist.clone(), SELF_NAME));
        let repo = Arc::new(InMemoryRepository::new(2));
        let media = Arc::new(AvatarProxy::new("https://roomdex.example.com"));
        let cfg = CrawlerConfig {
            workers: 4,
            servers: seed.iter().map(|s| s.to_string()).collect(),
            rooms_page_limit: 100,
            ..Default::default()
        };
        let crawler =
            Crawler::new(repo.clone(), fed, validator, blocklist.clone(), media, cfg);
        (crawler, repo, blocklist)
    }

    fn online_server(name: &str) -> Server {
        Server {
            name: name.into(),
            api_url: format!("https://{name}:8448"),
            federation_host: name.into(),
            software: "Synapse".into(),
            software_version: "1.99.0".into(),
            online: true,
            indexable: true,
            contacts: ServerContacts::default(),
            online_at: Utc::now(),
        }
    }

    fn entry(id: &str, alias: &str, members: i64, topic: &str) -> PublicRoomEntry {
        PublicRoomEntry {
            room_id: id.into(),
            canonical_alias: if alias.is_empty() { None } else { Some(alias.into()) },
            name: Some("room".into()),
            topic: Some(topic.into()),
            num_joined_members: members,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn discovery_classifies_servers() {
        let mut stub = StubFederation::default();
        stub.online.insert("alpha.example.com".into());
        stub.online.insert("beta.example.com".into());
        stub.indexable.insert("alpha.example.com".into());
        stub.support.insert(
            "alpha.example.com".into(),
            SupportResponse {
                contacts: vec![SupportContact {
                    email_address: Some("admin@alpha.example.com".into()),
                    matrix_id: Some("@admin:alpha.example.com".into()),
                    role: Some("m.role.admin".into()),
                }],
                support_page: Some("https://alpha.example.com/support".into()),
            },
        );

        let (crawler, repo, _) =
            build(stub, &["alpha.example.com", "beta.example.com"], &[]);
        // A previously known server that no longer answers.
        repo.add_server(online_server("down.example.com")).await.unwrap();

        let report = crawler.discover_servers(4, None).await.expect("not busy");
        assert_eq!(report.total, 3);
        assert_eq!(report.online, 2);
        assert_eq!(report.indexable, 1);
        assert_eq!(report.offline, 1);
        assert_eq!(report.failed, 0);

        let alpha = repo.server("alpha.example.com").await.unwrap();
        assert!(alpha.online && alpha.indexable);
        assert_eq!(alpha.contacts.emails, vec!["admin@alpha.example.com".to_owned()]);
        assert_eq!(alpha.api_url, "https://alpha.example.com:8448");

        let beta = repo.server("beta.example.com").await.unwrap();
        assert!(beta.online && !beta.indexable);

        // Offline servers are marked, never deleted.
        let down = repo.server("down.example.com").await.unwrap();
        assert!(!down.online);
    }

    #[tokio::test]
    async fn concurrent_discovery_is_a_rejected_no_op() {
        let gate = Arc::new(Semaphore::new(0));
        let mut stub = StubFederation::default();
        stub.online.insert("slow.example.com".into());
        stub.gate = Some(gate.clone());

        let (crawler, repo, _) = build(stub, &["slow.example.com"], &[]);

        let first = {
            let crawler = crawler.clone();
            tokio::spawn(async move { crawler.discover_servers(1, None).await })
        };
        // Let the first pass reach the gated key probe.
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        assert!(crawler.discover_servers(1, None).await.is_none());
        assert_eq!(repo.server_count().await, 0);

        gate.add_permits(8);
        let report = first.await.unwrap().expect("first run completes");
        assert_eq!(report.online, 1);
        assert_eq!(repo.server_count().await, 1);
    }

    #[tokio::test]
    async fn add_server_outcomes() {
        let mut stub = StubFederation::default();
        stub.online.insert("alpha.example.com".into());

        let (crawler, _, _) = build(stub, &[], &[]);
        assert_eq!(crawler.add_server("alpha.example.com").await, AddServerOutcome::Created);
        assert_eq!(
            crawler.add_server("alpha.example.com").await,
            AddServerOutcome::AlreadyKnown
        );
        assert_eq!(crawler.add_server("not a name").await, AddServerOutcome::Unprocessable);
        assert_eq!(
            crawler.add_server("gone.example.com").await,
            AddServerOutcome::Unprocessable
        );
    }

    #[tokio::test]
    async fn parse_rooms_end_to_end() {
        let mut stub = StubFederation::default();
        stub.online.insert("alpha.example.com".into());
        stub.online.insert("friend.example.org".into());
        stub.indexable.insert("alpha.example.com".into());
        stub.pages.insert(
            "alpha.example.com".into(),
            vec![
                PublicRoomsResponse {
                    chunk: vec![
                        entry(
                            "!r1:alpha.example.com",
                            "#rust:alpha.example.com",
                            10,
                            "Hello (MRS-language:EN-MRS)",
                        ),
                        entry(
                            "!r2:alpha.example.com",
                            "#spam:alpha.example.com",
                            99,
                            "spam MRS-noindex-MRS",
                        ),
                    ],
                    next_batch: Some("1".into()),
                    ..Default::default()
                },
                PublicRoomsResponse {
                    chunk: vec![
                        // No alias — rejected by admission.
                        entry("!r3:alpha.example.com", "", 7, ""),
                        entry("!r4:alpha.example.com", "#big:alpha.example.com", 50, ""),
                    ],
                    ..Default::default()
                },
            ],
        );
        stub.directory.insert(
            "#rust:alpha.example.com".into(),
            DirectoryResponse {
                room_id: "!r1:alpha.example.com".into(),
                servers: vec!["friend.example.org".into()],
            },
        );

        let (crawler, repo, _) = build(stub, &[], &[]);
        repo.add_server(online_server("alpha.example.com")).await.unwrap();

        let report = crawler.parse_rooms(2).await.expect("not busy");
        assert_eq!(report.servers, 1);
        assert_eq!(report.rooms, 2);
        assert_eq!(report.discovered, 1);

        assert_eq!(repo.room_count().await, 2);
        let r1 = repo.get_room("!r1:alpha.example.com").await.unwrap().unwrap();
        assert_eq!(r1.topic, "Hello");
        assert_eq!(r1.language, "EN");
        assert!(repo.get_room("!r2:alpha.example.com").await.unwrap().is_none());

        // Ranking is by descending member count.
        assert_eq!(
            repo.biggest_rooms().await,
            vec!["!r4:alpha.example.com".to_owned(), "!r1:alpha.example.com".to_owned()]
        );
        assert_eq!(
            repo.alias_of("!r1:alpha.example.com").await.as_deref(),
            Some("#rust:alpha.example.com")
        );

        // The newly-observed server went through the secondary discovery pass.
        let friend = repo.server("friend.example.org").await.unwrap();
        assert!(friend.online);
    }

    #[tokio::test]
    async fn each_room_removes_disallowed_and_honours_break() {
        let (crawler, repo, blocklist) = build(StubFederation::default(), &[], &[]);
        for (id, alias, server) in [
            ("!a:good.example.com", "#a:good.example.com", "good.example.com"),
            ("!b:bad.example.com", "#b:bad.example.com", "bad.example.com"),
            ("!c:good.example.com", "#c:good.example.com", "good.example.com"),
        ] {
            repo.add_room_batch(Room {
                id: id.into(),
                alias: alias.into(),
                server: server.into(),
                parsed_at: Utc::now(),
                ..Default::default()
            })
            .await
            .unwrap();
        }
        repo.flush_room_batch().await.unwrap();
        blocklist.add("bad.example.com");

        let mut visited = Vec::new();
        crawler
            .each_room(&mut |room| {
                visited.push(room.id.clone());
                ControlFlow::Continue(())
            })
            .await
            .expect("not busy");
        assert_eq!(visited, vec!["!a:good.example.com", "!c:good.example.com"]);
        assert_eq!(repo.room_count().await, 2);

        let mut seen = 0;
        crawler
            .each_room(&mut |_| {
                seen += 1;
                ControlFlow::Break(())
            })
            .await
            .expect("not busy");
        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn housekeeping_purges_stale_rooms_and_dead_servers() {
        let (crawler, repo, _) = build(StubFederation::default(), &[], &[]);

        repo.add_room_batch(Room {
            id: "!old:x.example.com".into(),
            alias: "#old:x.example.com".into(),
            server: "x.example.com".into(),
            parsed_at: Utc::now() - Duration::days(10),
            ..Default::default()
        })
        .await
        .unwrap();
        repo.add_room_batch(Room {
            id: "!new:x.example.com".into(),
            alias: "#new:x.example.com".into(),
            server: "x.example.com".into(),
            parsed_at: Utc::now(),
            ..Default::default()
        })
        .await
        .unwrap();
        repo.flush_room_batch().await.unwrap();

        let mut dead = online_server("dead.example.com");
        dead.online = false;
        dead.indexable = false;
        dead.online_at = Utc::now() - Duration::days(40);
        repo.add_server(dead).await.unwrap();

        crawler.parse_rooms(2).await.expect("not busy");

        assert!(repo.get_room("!old:x.example.com").await.unwrap().is_none());
        assert!(repo.get_room("!new:x.example.com").await.unwrap().is_some());
        assert_eq!(repo.alias_of("!old:x.example.com").await, None);
        assert_eq!(
            repo.alias_of("!new:x.example.com").await.as_deref(),
            Some("#new:x.example.com")
        );
        assert!(repo.server("dead.example.com").await.is_none());
    }
}

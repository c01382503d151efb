//! Durable storage contract consumed by the crawler.
//!
//! Persistence engine internals live outside this crate; the crawler only
//! relies on the operations below being atomic per call and durable. It never
//! holds a transaction open across a network call — persistence is
//! incremental and idempotent, so re-running a crawl converges to the same
//! end state.

pub mod memory;

use std::ops::ControlFlow;

use async_trait::async_trait;

use roomdex_common::models::{Room, Server};

use crate::error::CrawlerError;

/// Predicate used by [`DataRepository::filter_servers`].
pub type ServerPredicate<'a> = &'a (dyn Fn(&Server) -> bool + Send + Sync);

/// Visitor used by [`DataRepository::each_room`]; return
/// `ControlFlow::Break(())` to stop the traversal early.
pub type RoomVisitor<'a> = &'a mut (dyn FnMut(&str, &Room) -> ControlFlow<()> + Send);

/// Storage operations the crawler depends on.
#[async_trait]
pub trait DataRepository: Send + Sync {
    /// Insert or overwrite a discovered server record.
    async fn add_server(&self, server: Server) -> Result<(), CrawlerError>;

    /// Register server names for future discovery without probing them now.
    async fn batch_servers(&self, names: Vec<String>) -> Result<(), CrawlerError>;

    async fn has_server(&self, name: &str) -> Result<bool, CrawlerError>;

    /// All server records matching `predicate`.
    async fn filter_servers(
        &self,
        predicate: ServerPredicate<'_>,
    ) -> Result<Vec<Server>, CrawlerError>;

    /// Flag servers as offline. Never deletes.
    async fn mark_servers_offline(&self, names: &[String]) -> Result<(), CrawlerError>;

    async fn remove_servers(&self, names: &[String]) -> Result<(), CrawlerError>;

    /// Queue a room for a batched write.
    async fn add_room_batch(&self, room: Room) -> Result<(), CrawlerError>;

    /// Drain any queued rooms to storage.
    async fn flush_room_batch(&self) -> Result<(), CrawlerError>;

    async fn get_room(&self, id: &str) -> Result<Option<Room>, CrawlerError>;

    /// Visit every stored room.
    async fn each_room(&self, visitor: RoomVisitor<'_>) -> Result<(), CrawlerError>;

    async fn remove_rooms(&self, ids: &[String]) -> Result<(), CrawlerError>;

    /// Record a single room ID ↔ alias pair.
    async fn add_room_mapping(&self, id: &str, alias: &str) -> Result<(), CrawlerError>;

    /// Replace the whole room ID ↔ alias mapping.
    async fn recreate_room_mapping(
        &self,
        pairs: Vec<(String, String)>,
    ) -> Result<(), CrawlerError>;

    /// Store the advisory member-count ranking.
    async fn set_biggest_rooms(&self, ids: Vec<String>) -> Result<(), CrawlerError>;
}

//! In-memory reference implementation of the storage contract.
//!
//! Backs tests and single-process deployments; durable backends implement the
//! same [`DataRepository`] trait elsewhere. Room writes go through an internal
//! [`Batcher`] so batched-write behaviour matches production storage.

use std::collections::{BTreeMap, HashMap};
use std::ops::ControlFlow;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use roomdex_common::models::{Room, Server, ServerContacts};

use crate::batch::Batcher;
use crate::error::CrawlerError;
use crate::repository::{DataRepository, RoomVisitor, ServerPredicate};

#[derive(Default)]
struct RoomMapping {
    alias_by_id: HashMap<String, String>,
    id_by_alias: HashMap<String, String>,
}

/// Thread-safe in-memory repository.
pub struct InMemoryRepository {
    servers: RwLock<HashMap<String, Server>>,
    rooms: Arc<RwLock<BTreeMap<String, Room>>>,
    mapping: RwLock<RoomMapping>,
    biggest: RwLock<Vec<String>>,
    batch: Batcher<Room>,
}

impl InMemoryRepository {
    pub fn new(batch_size: usize) -> Self {
        let rooms: Arc<RwLock<BTreeMap<String, Room>>> = Arc::new(RwLock::new(BTreeMap::new()));
        let sink_rooms = rooms.clone();
        let batch = Batcher::new(batch_size, move |items: Vec<Room>| {
            let rooms = sink_rooms.clone();
            async move {
                let mut map = rooms.write().await;
                for room in items {
                    map.insert(room.id.clone(), room);
                }
            }
        });
        Self {
            servers: RwLock::new(HashMap::new()),
            rooms,
            mapping: RwLock::new(RoomMapping::default()),
            biggest: RwLock::new(Vec::new()),
            batch,
        }
    }

    // Inspection helpers for wiring and tests.

    pub async fn server(&self, name: &str) -> Option<Server> {
        self.servers.read().await.get(name).cloned()
    }

    pub async fn server_count(&self) -> usize {
        self.servers.read().await.len()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn biggest_rooms(&self) -> Vec<String> {
        self.biggest.read().await.clone()
    }

    pub async fn alias_of(&self, id: &str) -> Option<String> {
        self.mapping.read().await.alias_by_id.get(id).cloned()
    }

    pub async fn id_of(&self, alias: &str) -> Option<String> {
        self.mapping.read().await.id_by_alias.get(alias).cloned()
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new(1_000)
    }
}

#[async_trait]
impl DataRepository for InMemoryRepository {
    async fn add_server(&self, server: Server) -> Result<(), CrawlerError> {
        self.servers.write().await.insert(server.name.clone(), server);
        Ok(())
    }

    async fn batch_servers(&self, names: Vec<String>) -> Result<(), CrawlerError> {
        let mut servers = self.servers.write().await;
        for name in names {
            servers.entry(name.clone()).or_insert_with(|| Server {
                name,
                api_url: String::new(),
                federation_host: String::new(),
                software: String::new(),
                software_version: String::new(),
                online: false,
                indexable: false,
                contacts: ServerContacts::default(),
                online_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn has_server(&self, name: &str) -> Result<bool, CrawlerError> {
        Ok(self.servers.read().await.contains_key(name))
    }

    async fn filter_servers(
        &self,
        predicate: ServerPredicate<'_>,
    ) -> Result<Vec<Server>, CrawlerError> {
        Ok(self.servers.read().await.values().filter(|s| predicate(s)).cloned().collect())
    }

    async fn mark_servers_offline(&self, names: &[String]) -> Result<(), CrawlerError> {
        let mut servers = self.servers.write().await;
        for name in names {
            if let Some(server) = servers.get_mut(name) {
                server.online = false;
                server.indexable = false;
            }
        }
        Ok(())
    }

    async fn remove_servers(&self, names: &[String]) -> Result<(), CrawlerError> {
        let mut servers = self.servers.write().await;
        for name in names {
            servers.remove(name);
        }
        Ok(())
    }

    async fn add_room_batch(&self, room: Room) -> Result<(), CrawlerError> {
        self.batch.add(room).await;
        Ok(())
    }

    async fn flush_room_batch(&self) -> Result<(), CrawlerError> {
        self.batch.flush().await;
        Ok(())
    }

    async fn get_room(&self, id: &str) -> Result<Option<Room>, CrawlerError> {
        Ok(self.rooms.read().await.get(id).cloned())
    }

    async fn each_room(&self, visitor: RoomVisitor<'_>) -> Result<(), CrawlerError> {
        let rooms = self.rooms.read().await;
        for (id, room) in rooms.iter() {
            if let ControlFlow::Break(()) = visitor(id, room) {
                break;
            }
        }
        Ok(())
    }

    async fn remove_rooms(&self, ids: &[String]) -> Result<(), CrawlerError> {
        let mut rooms = self.rooms.write().await;
        for id in ids {
            rooms.remove(id);
        }
        Ok(())
    }

    async fn add_room_mapping(&self, id: &str, alias: &str) -> Result<(), CrawlerError> {
        let mut mapping = self.mapping.write().await;
        mapping.alias_by_id.insert(id.to_owned(), alias.to_owned());
        mapping.id_by_alias.insert(alias.to_owned(), id.to_owned());
        Ok(())
    }

    async fn recreate_room_mapping(
        &self,
        pairs: Vec<(String, String)>,
    ) -> Result<(), CrawlerError> {
        let mut mapping = self.mapping.write().await;
        mapping.alias_by_id.clear();
        mapping.id_by_alias.clear();
        for (id, alias) in pairs {
            mapping.alias_by_id.insert(id.clone(), alias.clone());
            mapping.id_by_alias.insert(alias, id);
        }
        Ok(())
    }

    async fn set_biggest_rooms(&self, ids: Vec<String>) -> Result<(), CrawlerError> {
        *self.biggest.write().await = ids;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str, online: bool) -> Server {
        Server {
            name: name.into(),
            api_url: format!("https://{name}:8448"),
            federation_host: name.into(),
            software: "Synapse".into(),
            software_version: "1.99.0".into(),
            online,
            indexable: online,
            contacts: ServerContacts::default(),
            online_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn server_round_trip_and_offline_marking() {
        let repo = InMemoryRepository::new(10);
        repo.add_server(server("one.example.com", true)).await.unwrap();
        repo.add_server(server("two.example.com", true)).await.unwrap();
        assert!(repo.has_server("one.example.com").await.unwrap());

        repo.mark_servers_offline(&["one.example.com".into()]).await.unwrap();
        let online = repo.filter_servers(&|s| s.online).await.unwrap();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].name, "two.example.com");
        // Marking offline must not delete.
        assert_eq!(repo.server_count().await, 2);
    }

    #[tokio::test]
    async fn batched_names_become_placeholders() {
        let repo = InMemoryRepository::new(10);
        repo.add_server(server("known.example.com", true)).await.unwrap();
        repo.batch_servers(vec!["known.example.com".into(), "new.example.com".into()])
            .await
            .unwrap();

        // Existing records are untouched, new names get offline placeholders.
        assert!(repo.server("known.example.com").await.unwrap().online);
        let placeholder = repo.server("new.example.com").await.unwrap();
        assert!(!placeholder.online);
    }

    #[tokio::test]
    async fn room_batching_flushes_through() {
        let repo = InMemoryRepository::new(2);
        for i in 0..3 {
            let room =
                Room { id: format!("!r{i}:example.com"), ..Default::default() };
            repo.add_room_batch(room).await.unwrap();
        }
        // Two rooms crossed the threshold, one is still buffered.
        assert_eq!(repo.room_count().await, 2);
        repo.flush_room_batch().await.unwrap();
        assert_eq!(repo.room_count().await, 3);
        assert!(repo.get_room("!r2:example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn mapping_is_rebuilt_wholesale() {
        let repo = InMemoryRepository::new(10);
        repo.add_room_mapping("!a:x.com", "#a:x.com").await.unwrap();
        repo.recreate_room_mapping(vec![("!b:x.com".into(), "#b:x.com".into())]).await.unwrap();
        assert_eq!(repo.alias_of("!a:x.com").await, None);
        assert_eq!(repo.alias_of("!b:x.com").await.as_deref(), Some("#b:x.com"));
        assert_eq!(repo.id_of("#b:x.com").await.as_deref(), Some("!b:x.com"));
    }
}

//! Real-time relay hub.
//!
//! The hub keeps one bounded outbound queue per connection and a set of
//! rooms, one per project. Events are fanned out best effort: a peer whose
//! queue is full or closed simply misses the event.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use api_protocol::{Actor, ClientEvent, PresenceStatus, ServerEvent, project_room};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

/// Identifier of one relay connection.
pub type ConnectionId = Uuid;

/// Default capacity of each connection's outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// A connected user, as tracked by the presence registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub connection_id: ConnectionId,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

/// Tracks which connections belong to which user.
///
/// The in-memory implementation only sees connections of the current
/// process; a multi-instance deployment needs a shared backing store.
#[async_trait]
pub trait PresenceRegistry: Send + Sync {
    /// Records a new connection.
    async fn register(&self, entry: PresenceEntry);

    /// Removes a connection and returns its entry.
    async fn unregister(&self, connection_id: ConnectionId) -> Option<PresenceEntry>;

    /// Lists all connected users, one entry per connection.
    async fn connected_users(&self) -> Vec<PresenceEntry>;

    /// Returns true if the user has at least one connection.
    async fn is_user_online(&self, user_id: Uuid) -> bool;

    /// Lists the connections of a user.
    async fn connections_of(&self, user_id: Uuid) -> Vec<ConnectionId>;
}

/// Process-local presence registry.
#[derive(Debug, Default)]
pub struct MemoryPresenceRegistry {
    entries: RwLock<HashMap<ConnectionId, PresenceEntry>>,
}

impl MemoryPresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceRegistry for MemoryPresenceRegistry {
    async fn register(&self, entry: PresenceEntry) {
        self.entries.write().await.insert(entry.connection_id, entry);
    }

    async fn unregister(&self, connection_id: ConnectionId) -> Option<PresenceEntry> {
        self.entries.write().await.remove(&connection_id)
    }

    async fn connected_users(&self) -> Vec<PresenceEntry> {
        let mut entries: Vec<PresenceEntry> =
            self.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        entries
    }

    async fn is_user_online(&self, user_id: Uuid) -> bool {
        self.entries
            .read()
            .await
            .values()
            .any(|e| e.user_id == user_id)
    }

    async fn connections_of(&self, user_id: Uuid) -> Vec<ConnectionId> {
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.connection_id)
            .collect()
    }
}

struct Connection {
    actor: Actor,
    sender: mpsc::Sender<ServerEvent>,
    rooms: HashSet<String>,
}

/// Handle returned by [`RelayHub::connect`].
#[derive(Debug)]
pub struct RelayConnection {
    pub id: ConnectionId,
    /// Events to write to the transport.
    pub events: mpsc::Receiver<ServerEvent>,
}

/// Room-based fan-out of relay events.
pub struct RelayHub {
    presence: Arc<dyn PresenceRegistry>,
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    rooms: RwLock<HashMap<String, HashSet<ConnectionId>>>,
    queue_capacity: usize,
}

impl std::fmt::Debug for RelayHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayHub")
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new(Arc::new(MemoryPresenceRegistry::new()))
    }
}

impl RelayHub {
    /// Creates a hub backed by the given presence registry.
    pub fn new(presence: Arc<dyn PresenceRegistry>) -> Self {
        Self {
            presence,
            connections: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Sets the capacity of each connection's outbound queue.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Registers an authenticated connection.
    pub async fn connect(&self, actor: Actor) -> RelayConnection {
        let id = Uuid::new_v4();
        let (sender, events) = mpsc::channel(self.queue_capacity);

        self.presence
            .register(PresenceEntry {
                connection_id: id,
                user_id: actor.id,
                joined_at: Utc::now(),
            })
            .await;

        tracing::info!(connection_id = %id, user_id = %actor.id, "Relay connection opened");

        self.connections.write().await.insert(
            id,
            Connection {
                actor,
                sender,
                rooms: HashSet::new(),
            },
        );

        RelayConnection { id, events }
    }

    /// Removes a connection from all rooms and tells everyone else the user
    /// went offline.
    pub async fn disconnect(&self, id: ConnectionId) {
        let Some(connection) = self.connections.write().await.remove(&id) else {
            return;
        };

        {
            let mut rooms = self.rooms.write().await;
            for room in &connection.rooms {
                if let Some(members) = rooms.get_mut(room) {
                    members.remove(&id);
                    if members.is_empty() {
                        rooms.remove(room);
                    }
                }
            }
        }

        self.presence.unregister(id).await;

        tracing::info!(
            connection_id = %id,
            user_id = %connection.actor.id,
            "Relay connection closed"
        );

        self.broadcast_except(
            id,
            ServerEvent::user_status(connection.actor, PresenceStatus::Offline),
        )
        .await;
    }

    /// Adds a connection to a project room.
    pub async fn join(&self, id: ConnectionId, project_id: Uuid) -> bool {
        let room = project_room(project_id);
        let mut connections = self.connections.write().await;
        let Some(connection) = connections.get_mut(&id) else {
            return false;
        };
        connection.rooms.insert(room.clone());
        self.rooms.write().await.entry(room).or_default().insert(id);

        tracing::debug!(connection_id = %id, project_id = %project_id, "Joined project room");
        true
    }

    /// Removes a connection from a project room.
    pub async fn leave(&self, id: ConnectionId, project_id: Uuid) {
        let room = project_room(project_id);
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.get_mut(&id) {
            connection.rooms.remove(&room);
        }
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(&room) {
            members.remove(&id);
            if members.is_empty() {
                rooms.remove(&room);
            }
        }

        tracing::debug!(connection_id = %id, project_id = %project_id, "Left project room");
    }

    /// Returns true if the connection is in the project's room.
    pub async fn is_in_room(&self, id: ConnectionId, project_id: Uuid) -> bool {
        self.rooms
            .read()
            .await
            .get(&project_room(project_id))
            .is_some_and(|members| members.contains(&id))
    }

    /// Returns the identity attached to a connection.
    pub async fn actor(&self, id: ConnectionId) -> Option<Actor> {
        self.connections
            .read()
            .await
            .get(&id)
            .map(|c| c.actor.clone())
    }

    /// Replaces the identity stamped on a connection's future events.
    pub async fn update_actor(&self, id: ConnectionId, actor: Actor) -> bool {
        match self.connections.write().await.get_mut(&id) {
            Some(connection) => {
                connection.actor = actor;
                true
            }
            None => false,
        }
    }

    /// Removes every connection of a user from a project room. Returns the
    /// number of connections evicted.
    pub async fn evict_user_from_project(&self, user_id: Uuid, project_id: Uuid) -> usize {
        let room = project_room(project_id);
        let mut connections = self.connections.write().await;
        let mut rooms = self.rooms.write().await;

        let mut evicted = 0;
        for (id, connection) in connections.iter_mut() {
            if connection.actor.id != user_id || !connection.rooms.remove(&room) {
                continue;
            }
            if let Some(members) = rooms.get_mut(&room) {
                members.remove(id);
            }
            evicted += 1;
        }
        if rooms.get(&room).is_some_and(HashSet::is_empty) {
            rooms.remove(&room);
        }

        if evicted > 0 {
            tracing::info!(
                user_id = %user_id,
                project_id = %project_id,
                evicted,
                "Evicted user from project room"
            );
        }
        evicted
    }

    /// Stamps a room-scoped client event with the sender and re-emits it to
    /// every other connection in the room. Returns the number of peers the
    /// event was queued for.
    pub async fn relay(&self, origin: ConnectionId, event: ClientEvent) -> usize {
        let Some(actor) = self.actor(origin).await else {
            return 0;
        };
        let name = event.name();
        let Some((project_id, relayed)) = event.into_relayed(actor, Utc::now()) else {
            return 0;
        };

        let delivered = self
            .emit_to_room_except(&project_room(project_id), Some(origin), relayed)
            .await;
        tracing::debug!(
            connection_id = %origin,
            project_id = %project_id,
            event = name,
            delivered,
            "Relayed event"
        );
        delivered
    }

    /// Tells every other connection that the user of `origin` is online.
    pub async fn announce_online(&self, origin: ConnectionId) -> usize {
        let Some(actor) = self.actor(origin).await else {
            return 0;
        };
        self.broadcast_except(origin, ServerEvent::user_status(actor, PresenceStatus::Online))
            .await
    }

    /// Sends an event to a single connection.
    pub async fn send_to(&self, id: ConnectionId, event: ServerEvent) -> bool {
        let connections = self.connections.read().await;
        connections
            .get(&id)
            .is_some_and(|connection| Self::deliver(id, connection, event))
    }

    /// Sends an event to every connection in a project room.
    pub async fn emit_to_project(&self, project_id: Uuid, event: ServerEvent) -> usize {
        self.emit_to_room_except(&project_room(project_id), None, event)
            .await
    }

    /// Sends an event to every connection of a user.
    pub async fn emit_to_user(&self, user_id: Uuid, event: ServerEvent) -> usize {
        let targets = self.presence.connections_of(user_id).await;
        let connections = self.connections.read().await;
        targets
            .into_iter()
            .filter_map(|id| connections.get(&id).map(|c| (id, c)))
            .filter(|(id, c)| Self::deliver(*id, c, event.clone()))
            .count()
    }

    /// Sends an event to every connection.
    pub async fn emit_to_all(&self, event: ServerEvent) -> usize {
        let connections = self.connections.read().await;
        connections
            .iter()
            .filter(|(id, c)| Self::deliver(**id, c, event.clone()))
            .count()
    }

    /// Lists connected users.
    pub async fn connected_users(&self) -> Vec<PresenceEntry> {
        self.presence.connected_users().await
    }

    /// Returns true if the user has at least one open connection.
    pub async fn is_user_online(&self, user_id: Uuid) -> bool {
        self.presence.is_user_online(user_id).await
    }

    async fn broadcast_except(&self, origin: ConnectionId, event: ServerEvent) -> usize {
        let connections = self.connections.read().await;
        connections
            .iter()
            .filter(|(id, _)| **id != origin)
            .filter(|(id, c)| Self::deliver(**id, c, event.clone()))
            .count()
    }

    async fn emit_to_room_except(
        &self,
        room: &str,
        origin: Option<ConnectionId>,
        event: ServerEvent,
    ) -> usize {
        let connections = self.connections.read().await;
        let rooms = self.rooms.read().await;
        let Some(members) = rooms.get(room) else {
            return 0;
        };
        members
            .iter()
            .filter(|id| Some(**id) != origin)
            .filter_map(|id| connections.get(id).map(|c| (*id, c)))
            .filter(|(id, c)| Self::deliver(*id, c, event.clone()))
            .count()
    }

    fn deliver(id: ConnectionId, connection: &Connection, event: ServerEvent) -> bool {
        match connection.sender.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(connection_id = %id, "Relay queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn actor(name: &str) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            name: name.to_string(),
            avatar: None,
        }
    }

    fn task_created(project_id: Uuid) -> ClientEvent {
        ClientEvent::TaskCreated {
            project_id,
            task: json!({"title": "Write brief"}),
        }
    }

    #[tokio::test]
    async fn test_room_fan_out_without_self_echo() {
        let hub = RelayHub::default();
        let project = Uuid::new_v4();
        let other_project = Uuid::new_v4();

        let mut a = hub.connect(actor("Ada")).await;
        let mut b = hub.connect(actor("Grace")).await;
        let mut c = hub.connect(actor("Alan")).await;
        hub.join(a.id, project).await;
        hub.join(b.id, project).await;
        hub.join(c.id, other_project).await;

        let delivered = hub.relay(a.id, task_created(project)).await;
        assert_eq!(delivered, 1);

        match b.events.try_recv().unwrap() {
            ServerEvent::TaskCreated { created_by, .. } => assert_eq!(created_by.name, "Ada"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(a.events.try_recv().is_err());
        assert!(c.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_stops_delivery() {
        let hub = RelayHub::default();
        let project = Uuid::new_v4();
        let a = hub.connect(actor("Ada")).await;
        let mut b = hub.connect(actor("Grace")).await;
        hub.join(a.id, project).await;
        hub.join(b.id, project).await;
        hub.leave(b.id, project).await;

        assert!(!hub.is_in_room(b.id, project).await);
        assert_eq!(hub.relay(a.id, task_created(project)).await, 0);
        assert!(b.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_presence_and_offline_broadcast() {
        let hub = RelayHub::default();
        let ada = actor("Ada");
        let ada_id = ada.id;
        let a = hub.connect(ada).await;
        let mut b = hub.connect(actor("Grace")).await;

        assert!(hub.is_user_online(ada_id).await);
        assert_eq!(hub.connected_users().await.len(), 2);

        assert_eq!(hub.announce_online(a.id).await, 1);
        match b.events.try_recv().unwrap() {
            ServerEvent::UserStatus { status, user_id, .. } => {
                assert_eq!(status, PresenceStatus::Online);
                assert_eq!(user_id, ada_id);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        hub.disconnect(a.id).await;
        assert!(!hub.is_user_online(ada_id).await);
        match b.events.try_recv().unwrap() {
            ServerEvent::UserStatus { status, .. } => {
                assert_eq!(status, PresenceStatus::Offline)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_full_queue_drops_events() {
        let hub = RelayHub::default().with_queue_capacity(1);
        let project = Uuid::new_v4();
        let a = hub.connect(actor("Ada")).await;
        let mut b = hub.connect(actor("Grace")).await;
        hub.join(a.id, project).await;
        hub.join(b.id, project).await;

        assert_eq!(hub.relay(a.id, task_created(project)).await, 1);
        assert_eq!(hub.relay(a.id, task_created(project)).await, 0);

        assert!(b.events.try_recv().is_ok());
        assert!(b.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_server_side_emitters() {
        let hub = RelayHub::default();
        let project = Uuid::new_v4();
        let ada = actor("Ada");
        let ada_id = ada.id;
        let mut a1 = hub.connect(ada.clone()).await;
        let mut a2 = hub.connect(ada).await;
        let mut b = hub.connect(actor("Grace")).await;
        hub.join(b.id, project).await;

        assert_eq!(hub.emit_to_user(ada_id, ServerEvent::error("hi")).await, 2);
        assert!(a1.events.try_recv().is_ok());
        assert!(a2.events.try_recv().is_ok());
        assert!(b.events.try_recv().is_err());

        assert_eq!(hub.emit_to_project(project, ServerEvent::error("room")).await, 1);
        assert!(b.events.try_recv().is_ok());

        assert_eq!(hub.emit_to_all(ServerEvent::error("all")).await, 3);
    }

    #[tokio::test]
    async fn test_disconnect_cleans_rooms() {
        let hub = RelayHub::default();
        let project = Uuid::new_v4();
        let a = hub.connect(actor("Ada")).await;
        hub.join(a.id, project).await;
        hub.disconnect(a.id).await;

        assert!(!hub.is_in_room(a.id, project).await);
        assert!(!hub.join(a.id, project).await);
        assert_eq!(hub.emit_to_project(project, ServerEvent::error("x")).await, 0);
    }

    #[tokio::test]
    async fn test_evict_user_from_project() {
        let hub = RelayHub::default();
        let project = Uuid::new_v4();
        let other_project = Uuid::new_v4();
        let grace = actor("Grace");
        let grace_id = grace.id;

        let a = hub.connect(actor("Ada")).await;
        let mut b1 = hub.connect(grace.clone()).await;
        let b2 = hub.connect(grace).await;
        for id in [a.id, b1.id, b2.id] {
            hub.join(id, project).await;
        }
        hub.join(b1.id, other_project).await;

        assert_eq!(hub.evict_user_from_project(grace_id, project).await, 2);
        assert!(!hub.is_in_room(b1.id, project).await);
        assert!(!hub.is_in_room(b2.id, project).await);
        assert!(hub.is_in_room(b1.id, other_project).await);
        assert!(hub.is_in_room(a.id, project).await);

        assert_eq!(hub.relay(a.id, task_created(project)).await, 0);
        assert!(b1.events.try_recv().is_err());
        assert_eq!(hub.evict_user_from_project(grace_id, project).await, 0);
    }

    #[tokio::test]
    async fn test_update_actor_restamps_events() {
        let hub = RelayHub::default();
        let project = Uuid::new_v4();
        let ada = actor("Ada");
        let a = hub.connect(ada.clone()).await;
        let mut b = hub.connect(actor("Grace")).await;
        hub.join(a.id, project).await;
        hub.join(b.id, project).await;

        assert!(
            hub.update_actor(
                a.id,
                Actor {
                    name: "Ada King".to_string(),
                    ..ada
                }
            )
            .await
        );
        hub.relay(a.id, task_created(project)).await;

        match b.events.try_recv().unwrap() {
            ServerEvent::TaskCreated { created_by, .. } => assert_eq!(created_by.name, "Ada King"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!hub.update_actor(Uuid::new_v4(), actor("Nobody")).await);
    }
}

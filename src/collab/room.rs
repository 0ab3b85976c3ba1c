use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::document::DocumentState;
use super::protocol::Member;
use crate::error::{CollabError, Result};

/// A client connected to a room
#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub room_id: String,
}

/// A collaboration room. `members` holds connection ids in join order so
/// every client can render the same roster.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub members: Vec<String>,
    pub document: DocumentState,
    pub created_at: std::time::SystemTime,
}

/// Snapshot handed to a client when it enters a room
#[derive(Debug, Clone)]
pub struct JoinSnapshot {
    pub members: Vec<Member>,
    pub document: DocumentState,
    pub room_created: bool,
}

/// Outcome of removing a client from its room
#[derive(Debug, Clone)]
pub struct LeaveInfo {
    pub room_id: String,
    pub name: String,
    pub room_closed: bool,
}

#[derive(Default)]
struct Registry {
    rooms: HashMap<String, Room>,
    clients: HashMap<String, Client>,
}

/// Tracks rooms and their membership. Rooms come into existence on first
/// join and are torn down when the last member leaves. All membership
/// mutations go through one lock so concurrent joins and leaves for the
/// same room cannot interleave.
pub struct RoomManager {
    registry: RwLock<Registry>,
}

/// A room id is an opaque token; bound its shape so it can travel in URLs
/// and log lines untouched.
pub fn is_valid_room_id(room_id: &str) -> bool {
    (4..=64).contains(&room_id.len())
        && room_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl RoomManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: RwLock::new(Registry::default()),
        })
    }

    /// Add a client to a room, creating the room on first join.
    /// Re-joining the same room with the same connection id is a no-op and
    /// returns the current snapshot.
    pub async fn join(
        &self,
        room_id: String,
        client_id: String,
        name: String,
    ) -> Result<JoinSnapshot> {
        if !is_valid_room_id(&room_id) {
            return Err(CollabError::InvalidRoomId(room_id));
        }

        let mut registry = self.registry.write().await;

        if let Some(existing) = registry.clients.get(&client_id) {
            if existing.room_id != room_id {
                return Err(CollabError::InvalidMessage(format!(
                    "client {} is already in room {}",
                    client_id, existing.room_id
                )));
            }
        }

        let room_created = !registry.rooms.contains_key(&room_id);
        let room = registry
            .rooms
            .entry(room_id.clone())
            .or_insert_with(|| Room {
                id: room_id.clone(),
                members: Vec::new(),
                document: DocumentState::default(),
                created_at: std::time::SystemTime::now(),
            });

        if !room.members.iter().any(|id| id == &client_id) {
            room.members.push(client_id.clone());
        }
        let document = room.document.clone();

        registry.clients.insert(
            client_id.clone(),
            Client {
                id: client_id.clone(),
                name,
                room_id: room_id.clone(),
            },
        );

        let members = Self::roster_locked(&registry, &room_id);
        if room_created {
            tracing::info!(room_id = %room_id, client_id = %client_id, "Room created on first join");
        } else {
            tracing::info!(room_id = %room_id, client_id = %client_id, "Client joined room");
        }

        Ok(JoinSnapshot {
            members,
            document,
            room_created,
        })
    }

    /// Remove a client from its room. Returns None when the client was
    /// never registered. The room is destroyed when its last member leaves.
    pub async fn leave(&self, client_id: &str) -> Option<LeaveInfo> {
        let mut registry = self.registry.write().await;

        let client = registry.clients.remove(client_id)?;
        let room_id = client.room_id.clone();

        let room_closed = match registry.rooms.get_mut(&room_id) {
            Some(room) => {
                room.members.retain(|id| id != client_id);
                room.members.is_empty()
            }
            None => false,
        };

        if room_closed {
            registry.rooms.remove(&room_id);
            tracing::info!(room_id = %room_id, "Room removed (last member left)");
        } else {
            tracing::info!(client_id = %client_id, room_id = %room_id, "Client left room");
        }

        Some(LeaveInfo {
            room_id,
            name: client.name,
            room_closed,
        })
    }

    /// Roster of a room in join order. An unknown room yields an empty
    /// roster (a room of one that just closed looks the same to callers).
    pub async fn roster(&self, room_id: &str) -> Vec<Member> {
        let registry = self.registry.read().await;
        Self::roster_locked(&registry, room_id)
    }

    fn roster_locked(registry: &Registry, room_id: &str) -> Vec<Member> {
        let Some(room) = registry.rooms.get(room_id) else {
            return Vec::new();
        };
        room.members
            .iter()
            .filter_map(|id| registry.clients.get(id))
            .map(|c| Member {
                id: c.id.clone(),
                name: c.name.clone(),
            })
            .collect()
    }

    /// Member connection ids of a room, join order
    pub async fn member_ids(&self, room_id: &str) -> Vec<String> {
        let registry = self.registry.read().await;
        registry
            .rooms
            .get(room_id)
            .map(|r| r.members.clone())
            .unwrap_or_default()
    }

    /// Overwrite a room's document (last writer wins). Returns false when
    /// the room no longer exists.
    pub async fn update_document(
        &self,
        room_id: &str,
        code: String,
        language_tag: String,
    ) -> bool {
        let mut registry = self.registry.write().await;
        match registry.rooms.get_mut(room_id) {
            Some(room) => {
                room.document.apply(code, language_tag);
                true
            }
            None => false,
        }
    }

    /// Current document of a room
    pub async fn document(&self, room_id: &str) -> Option<DocumentState> {
        let registry = self.registry.read().await;
        registry.rooms.get(room_id).map(|r| r.document.clone())
    }

    /// Get client information
    pub async fn client(&self, client_id: &str) -> Option<Client> {
        let registry = self.registry.read().await;
        registry.clients.get(client_id).cloned()
    }

    /// Check if a room exists
    pub async fn room_exists(&self, room_id: &str) -> bool {
        let registry = self.registry.read().await;
        registry.rooms.contains_key(room_id)
    }
}

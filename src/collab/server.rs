use std::collections::HashMap;
use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::{mpsc, RwLock};
use warp::ws::Message;

use super::document::language_by_extension;
use super::protocol::{CollabMessage, RunOutput};
use super::room::RoomManager;
use crate::error::{CollabError, Result};
use crate::executor::ExecutorClient;

/// Generate a connection identifier, unique per live connection
pub fn generate_client_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

/// The collaboration server: room registry plus one outbound channel per
/// live connection. Membership mutations are serialized inside the
/// RoomManager; fan-out happens independently per connection with no
/// ordering guarantee across connections.
pub struct CollabServer {
    rooms: Arc<RoomManager>,
    connections: RwLock<HashMap<String, mpsc::UnboundedSender<Message>>>,
    executor: ExecutorClient,
}

impl CollabServer {
    pub fn new(executor: ExecutorClient) -> Self {
        Self {
            rooms: RoomManager::new(),
            connections: RwLock::new(HashMap::new()),
            executor,
        }
    }

    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }

    /// Handle a join: register the connection, add it to the room, send the
    /// roster/document snapshot back and announce the member to the rest of
    /// the room.
    pub async fn join(
        &self,
        client_id: &str,
        sender: mpsc::UnboundedSender<Message>,
        room_id: String,
        display_name: String,
    ) -> Result<()> {
        {
            let connections = self.connections.read().await;
            if connections.contains_key(client_id) {
                tracing::warn!(client_id = %client_id, "Connection already joined, ignoring duplicate join");
                return Ok(());
            }
        }

        let snapshot = self
            .rooms
            .join(room_id.clone(), client_id.to_string(), display_name.clone())
            .await?;

        {
            let mut connections = self.connections.write().await;
            connections.insert(client_id.to_string(), sender.clone());
        }

        self.fan_out(
            &room_id,
            Some(client_id),
            &CollabMessage::MemberJoined {
                member: super::protocol::Member {
                    id: client_id.to_string(),
                    name: display_name,
                },
            },
        )
        .await;

        let ack = CollabMessage::RoomJoined {
            client_id: client_id.to_string(),
            room_id,
            members: snapshot.members,
            document: snapshot.document,
        };
        let text = serde_json::to_string(&ack)?;
        if sender.send(Message::text(text)).is_err() {
            // Connection died mid-join; undo the membership so the room
            // does not carry a ghost member
            self.leave(client_id).await;
            return Err(CollabError::ConnectionClosed);
        }

        Ok(())
    }

    /// Handle a disconnect or explicit leave: drop the connection, remove
    /// the client from its room and tell the remaining members.
    pub async fn leave(&self, client_id: &str) {
        {
            let mut connections = self.connections.write().await;
            connections.remove(client_id);
        }

        if let Some(info) = self.rooms.leave(client_id).await {
            if !info.room_closed {
                self.fan_out(
                    &info.room_id,
                    Some(client_id),
                    &CollabMessage::MemberLeft {
                        client_id: client_id.to_string(),
                    },
                )
                .await;
            }
        }
    }

    /// Broadcast a buffer update to every other member of the room, after
    /// recording it as the room's current document (last writer wins).
    pub async fn code_change(
        &self,
        client_id: &str,
        room_id: String,
        code: String,
        language_tag: String,
    ) {
        match self.rooms.client(client_id).await {
            Some(client) if client.room_id == room_id => {}
            Some(client) => {
                tracing::warn!(
                    client_id = %client_id,
                    claimed_room = %room_id,
                    actual_room = %client.room_id,
                    "Dropping code change for a room the client is not in"
                );
                return;
            }
            None => {
                tracing::warn!(client_id = %client_id, "Dropping code change from unjoined connection");
                return;
            }
        }

        self.rooms
            .update_document(&room_id, code.clone(), language_tag.clone())
            .await;

        self.fan_out(
            &room_id,
            Some(client_id),
            &CollabMessage::CodeChange {
                room_id: room_id.clone(),
                code,
                language_tag,
            },
        )
        .await;
    }

    /// Forward a run request to the executor without blocking the session
    /// loop; the outcome is delivered to the requesting connection only,
    /// echoing the request id for correlation.
    pub async fn dispatch_run(&self, client_id: &str, code: String, extension: String, request_id: u64) {
        let sender = {
            let connections = self.connections.read().await;
            connections.get(client_id).cloned()
        };
        let Some(sender) = sender else {
            tracing::warn!(client_id = %client_id, "Dropping run request from unknown connection");
            return;
        };

        // The extension must come from the fixed language table; anything
        // else resolves immediately instead of round-tripping the executor
        if let Err(e) = language_by_extension(&extension) {
            self.send_to(
                client_id,
                &CollabMessage::RunResult {
                    request_id,
                    success: false,
                    output: RunOutput::Failure {
                        stderr: e.to_string(),
                    },
                    started_at: None,
                    ended_at: None,
                },
            )
            .await;
            return;
        }

        tracing::info!(
            client_id = %client_id,
            extension = %extension,
            request_id = request_id,
            "Dispatching run request to executor"
        );

        let executor = self.executor.clone();
        let client_id = client_id.to_string();
        tokio::spawn(async move {
            let outcome = executor.execute(&code, &extension).await;

            let result = CollabMessage::RunResult {
                request_id,
                success: outcome.success,
                output: outcome.output,
                started_at: outcome.started_at,
                ended_at: outcome.ended_at,
            };

            match serde_json::to_string(&result) {
                Ok(text) => {
                    if sender.send(Message::text(text)).is_err() {
                        tracing::debug!(
                            client_id = %client_id,
                            request_id = request_id,
                            "Requester disconnected before run result arrived"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize run result");
                }
            }
        });
    }

    /// Send a message to one connection
    pub async fn send_to(&self, client_id: &str, message: &CollabMessage) {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return;
            }
        };

        let connections = self.connections.read().await;
        if let Some(sender) = connections.get(client_id) {
            if sender.send(Message::text(text)).is_err() {
                tracing::debug!(client_id = %client_id, "Dropping message for closed connection");
            }
        }
    }

    /// Serialize once and deliver to every member of a room, optionally
    /// excluding one connection (the sender of the original event).
    async fn fan_out(&self, room_id: &str, exclude: Option<&str>, message: &CollabMessage) {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize broadcast");
                return;
            }
        };

        let member_ids = self.rooms.member_ids(room_id).await;
        let connections = self.connections.read().await;

        for member_id in member_ids {
            if exclude == Some(member_id.as_str()) {
                continue;
            }
            if let Some(sender) = connections.get(&member_id) {
                if sender.send(Message::text(text.clone())).is_err() {
                    tracing::debug!(
                        client_id = %member_id,
                        room_id = %room_id,
                        "Skipping broadcast to closed connection"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorConfig;

    fn test_server() -> CollabServer {
        let executor = ExecutorClient::new(ExecutorConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 1,
        })
        .unwrap();
        CollabServer::new(executor)
    }

    fn parse(message: Message) -> CollabMessage {
        serde_json::from_str(message.to_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_join_sends_snapshot_and_announces() {
        let server = test_server();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        server
            .join("a", tx_a, "room-1".to_string(), "Ada".to_string())
            .await
            .unwrap();
        let ack = parse(rx_a.recv().await.unwrap());
        match ack {
            CollabMessage::RoomJoined {
                client_id, members, ..
            } => {
                assert_eq!(client_id, "a");
                assert_eq!(members.len(), 1);
            }
            other => panic!("expected RoomJoined, got {:?}", other),
        }

        server
            .join("b", tx_b, "room-1".to_string(), "Brian".to_string())
            .await
            .unwrap();

        // Existing member hears about the newcomer
        match parse(rx_a.recv().await.unwrap()) {
            CollabMessage::MemberJoined { member } => {
                assert_eq!(member.id, "b");
                assert_eq!(member.name, "Brian");
            }
            other => panic!("expected MemberJoined, got {:?}", other),
        }

        // Newcomer's snapshot lists both members in join order
        match parse(rx_b.recv().await.unwrap()) {
            CollabMessage::RoomJoined { members, .. } => {
                let ids: Vec<&str> = members.iter().map(|m| m.id.as_str()).collect();
                assert_eq!(ids, ["a", "b"]);
            }
            other => panic!("expected RoomJoined, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_code_change_excludes_sender() {
        let server = test_server();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        server
            .join("a", tx_a, "room-1".to_string(), "Ada".to_string())
            .await
            .unwrap();
        server
            .join("b", tx_b, "room-1".to_string(), "Brian".to_string())
            .await
            .unwrap();
        rx_a.recv().await.unwrap(); // RoomJoined
        rx_a.recv().await.unwrap(); // MemberJoined(b)
        rx_b.recv().await.unwrap(); // RoomJoined

        server
            .code_change("a", "room-1".to_string(), "x=1".to_string(), "Python".to_string())
            .await;

        match parse(rx_b.recv().await.unwrap()) {
            CollabMessage::CodeChange { code, language_tag, .. } => {
                assert_eq!(code, "x=1");
                assert_eq!(language_tag, "Python");
            }
            other => panic!("expected CodeChange, got {:?}", other),
        }
        assert!(rx_a.try_recv().is_err(), "sender must not receive its own change");

        let doc = server.rooms().document("room-1").await.unwrap();
        assert_eq!(doc.code, "x=1");
    }

    #[tokio::test]
    async fn test_code_change_from_unjoined_connection_dropped() {
        let server = test_server();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        server
            .join("a", tx_a, "room-1".to_string(), "Ada".to_string())
            .await
            .unwrap();
        rx_a.recv().await.unwrap();

        server
            .code_change("ghost", "room-1".to_string(), "x".to_string(), "C".to_string())
            .await;

        assert!(rx_a.try_recv().is_err());
        let doc = server.rooms().document("room-1").await.unwrap();
        assert_ne!(doc.code, "x");
    }

    #[tokio::test]
    async fn test_leave_announces_to_remaining() {
        let server = test_server();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        server
            .join("a", tx_a, "room-1".to_string(), "Ada".to_string())
            .await
            .unwrap();
        server
            .join("b", tx_b, "room-1".to_string(), "Brian".to_string())
            .await
            .unwrap();
        rx_a.recv().await.unwrap();
        rx_a.recv().await.unwrap();
        rx_b.recv().await.unwrap();

        server.leave("b").await;

        match parse(rx_a.recv().await.unwrap()) {
            CollabMessage::MemberLeft { client_id } => assert_eq!(client_id, "b"),
            other => panic!("expected MemberLeft, got {:?}", other),
        }

        assert!(server.rooms().room_exists("room-1").await);
        server.leave("a").await;
        assert!(!server.rooms().room_exists("room-1").await);
    }

    #[tokio::test]
    async fn test_run_with_unknown_extension_fails_without_executor() {
        let server = test_server();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        server
            .join("a", tx_a, "room-1".to_string(), "Ada".to_string())
            .await
            .unwrap();
        rx_a.recv().await.unwrap(); // RoomJoined

        server.dispatch_run("a", "x".to_string(), "cobol".to_string(), 5).await;

        match parse(rx_a.recv().await.unwrap()) {
            CollabMessage::RunResult {
                request_id,
                success,
                output,
                started_at,
                ..
            } => {
                assert_eq!(request_id, 5);
                assert!(!success);
                assert!(output.display_text().contains("cobol"));
                assert_eq!(started_at, None);
            }
            other => panic!("expected RunResult, got {:?}", other),
        }
    }

    #[test]
    fn test_generated_client_ids_are_distinct() {
        let a = generate_client_id();
        let b = generate_client_id();
        assert_eq!(a.len(), 12);
        assert_ne!(a, b);
    }
}

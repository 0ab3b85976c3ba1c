use std::sync::Arc;

use tokio::sync::mpsc;
use warp::ws::Message;

use super::protocol::CollabMessage;
use super::server::{generate_client_id, CollabServer};

/// Per-connection event handler. Messages for one connection are handled
/// one at a time by the websocket read loop, so session state needs no
/// locking.
pub struct SessionHandler {
    server: Arc<CollabServer>,
    sender: mpsc::UnboundedSender<Message>,
    client_id: String,
    joined: bool,
}

impl SessionHandler {
    pub fn new(server: Arc<CollabServer>, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            server,
            sender,
            client_id: generate_client_id(),
            joined: false,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub async fn handle_message(&mut self, message: CollabMessage) {
        match message {
            CollabMessage::Join {
                room_id,
                display_name,
            } => {
                match self
                    .server
                    .join(&self.client_id, self.sender.clone(), room_id, display_name)
                    .await
                {
                    Ok(()) => self.joined = true,
                    Err(e) => {
                        tracing::warn!(client_id = %self.client_id, error = %e, "Join rejected");
                        self.send_error(e.to_string());
                    }
                }
            }

            CollabMessage::CodeChange {
                room_id,
                code,
                language_tag,
            } => {
                if !self.joined {
                    tracing::warn!(client_id = %self.client_id, "Code change before join, dropping");
                    return;
                }
                self.server
                    .code_change(&self.client_id, room_id, code, language_tag)
                    .await;
            }

            CollabMessage::Run {
                code,
                extension,
                request_id,
            } => {
                self.server
                    .dispatch_run(&self.client_id, code, extension, request_id)
                    .await;
            }

            // Server-originated events arriving from a client are protocol
            // misuse; log and ignore.
            other => {
                tracing::debug!(
                    client_id = %self.client_id,
                    message = ?other,
                    "Ignoring unexpected client message"
                );
            }
        }
    }

    /// Tear down this connection's room membership. Called exactly once
    /// when the websocket closes.
    pub async fn cleanup(&mut self) {
        if self.joined {
            self.server.leave(&self.client_id).await;
            self.joined = false;
        }
    }

    fn send_error(&self, message: String) {
        let error = CollabMessage::Error { message };
        if let Ok(text) = serde_json::to_string(&error) {
            let _ = self.sender.send(Message::text(text));
        }
    }
}

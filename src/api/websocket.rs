use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::collab::protocol::CollabMessage;
use crate::collab::{CollabServer, SessionHandler};

pub async fn handle_collab_websocket(websocket: WebSocket, server: Arc<CollabServer>) {
    tracing::info!("New collaboration WebSocket connection established");

    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let mut session = SessionHandler::new(server, tx);

    // Spawn task to send messages to client
    let sender_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_sender.send(message).await {
                tracing::error!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(message) => {
                if message.is_close() {
                    break;
                }
                handle_websocket_message(&mut session, message).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "WebSocket error");
                break;
            }
        }
    }

    session.cleanup().await;
    sender_task.abort();
    tracing::info!(client_id = %session.client_id(), "Collaboration WebSocket connection closed");
}

async fn handle_websocket_message(session: &mut SessionHandler, message: Message) {
    if let Ok(text) = message.to_str() {
        tracing::debug!(client_id = %session.client_id(), "Received collab message: {}", text);

        match serde_json::from_str::<CollabMessage>(text) {
            Ok(collab_message) => {
                session.handle_message(collab_message).await;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    raw_message = %text,
                    "Failed to parse collab message"
                );
            }
        }
    }
}

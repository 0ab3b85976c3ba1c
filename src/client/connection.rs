use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::collab::protocol::CollabMessage;
use crate::error::{CollabError, Result};

/// Build the collaboration WebSocket URL for a `host:port` server address
pub fn websocket_url(server: &str) -> String {
    format!("ws://{}/collab", server)
}

/// Ask the server whether a room id is valid before opening a WebSocket.
/// Returns whether the room already exists; a non-200 answer surfaces the
/// server's message and the caller must abort entry into the room.
pub async fn verify_room(server: &str, room_id: &str) -> Result<bool> {
    let url = format!("http://{}/room/verify/{}", server, room_id);
    let response = reqwest::get(&url)
        .await
        .map_err(|e| CollabError::Connection(e.to_string()))?;

    if !response.status().is_success() {
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let message = body["message"]
            .as_str()
            .unwrap_or("room verification failed")
            .to_string();
        return Err(CollabError::RoomVerification(message));
    }

    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| CollabError::Connection(e.to_string()))?;
    Ok(body["exists"].as_bool().unwrap_or(false))
}

/// Cheap clonable handle for sending on a connection, usable while the
/// owning Connection is parked in `next_event`
#[derive(Clone)]
pub struct ConnectionSender {
    outgoing: mpsc::UnboundedSender<WsMessage>,
}

impl ConnectionSender {
    pub fn send(&self, message: &CollabMessage) -> Result<()> {
        let text = serde_json::to_string(message)?;
        self.outgoing
            .send(WsMessage::Text(text))
            .map_err(|_| CollabError::ConnectionClosed)
    }
}

/// An explicitly owned connection to the coordination service. Holds the
/// single persistent WebSocket for one client; no room operation is
/// possible until `connect` resolves. Dropping the connection tears down
/// its reader/writer tasks, which also discards any request correlation
/// state tied to it.
pub struct Connection {
    outgoing: mpsc::UnboundedSender<WsMessage>,
    events: mpsc::UnboundedReceiver<CollabMessage>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl Connection {
    /// Open the persistent connection. Fails with a connection error when
    /// the endpoint is unreachable.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| CollabError::Connection(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<WsMessage>();
        let writer_task = tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                if write.send(message).await.is_err() {
                    break;
                }
            }
        });

        let (event_tx, events) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(async move {
            while let Some(result) = read.next().await {
                match result {
                    Ok(WsMessage::Text(text)) => {
                        match serde_json::from_str::<CollabMessage>(&text) {
                            Ok(message) => {
                                if event_tx.send(message).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Dropping unparseable server message");
                            }
                        }
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
            // event_tx drops here; next_event returns None to the caller
        });

        Ok(Self {
            outgoing,
            events,
            reader_task,
            writer_task,
        })
    }

    /// Send one message to the server
    pub fn send(&self, message: &CollabMessage) -> Result<()> {
        self.sender().send(message)
    }

    /// Handle for sending from elsewhere while this connection is being
    /// polled for events
    pub fn sender(&self) -> ConnectionSender {
        ConnectionSender {
            outgoing: self.outgoing.clone(),
        }
    }

    /// Next inbound event, None once the connection is closed. Events are
    /// delivered one at a time in receipt order; the caller's handler runs
    /// to completion before the next event is taken.
    pub async fn next_event(&mut self) -> Option<CollabMessage> {
        self.events.recv().await
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

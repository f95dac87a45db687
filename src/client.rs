//! Wire-level client for the collaboration server.
//!
//! Owns the WebSocket connection, turns server frames into [`ClientEvent`]s,
//! and correlates request acknowledgements: `create-room` and `join-room`
//! replies arrive on a dedicated channel in request order, so the awaitable
//! helpers resolve with their typed reply or time out after five seconds.
//!
//! This is the transport contract only; the editor buffer consuming the
//! events lives elsewhere.

use crate::protocol::{
    ClientMessage, CreateRoomReply, CursorPos, CursorUpdatePayload, DocumentSyncPayload,
    JoinRoomReply, LanguageChangedPayload, Operation, OperationAckPayload, OperationErrorPayload,
    ProtocolError, ServerMessage, SyncErrorPayload, UserJoinedPayload,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Connect and request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Server-initiated traffic surfaced to the application.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    DocumentUpdate(Operation),
    UserJoined(UserJoinedPayload),
    UserLeft(String),
    CursorUpdate(CursorUpdatePayload),
    LanguageChanged(LanguageChangedPayload),
    OperationAck(OperationAckPayload),
    OperationError(OperationErrorPayload),
    DocumentSync(DocumentSyncPayload),
    SyncError(SyncErrorPayload),
    Disconnected,
}

/// Typed acknowledgement replies, delivered in request order.
#[derive(Debug, Clone)]
enum AckReply {
    Create(CreateRoomReply),
    Join(JoinRoomReply),
}

pub struct CollabClient {
    server_url: String,
    state: Arc<RwLock<ConnectionState>>,
    outgoing_tx: Option<mpsc::Sender<WsMessage>>,
    event_tx: mpsc::Sender<ClientEvent>,
    event_rx: Option<mpsc::Receiver<ClientEvent>>,
    ack_rx: Option<mpsc::Receiver<AckReply>>,
}

impl CollabClient {
    /// `server_url` is the HTTP origin, e.g. `ws://127.0.0.1:3001`.
    pub fn new(server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            server_url: server_url.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            event_tx,
            event_rx: Some(event_rx),
            ack_rx: None,
        }
    }

    /// Take the event receiver (can only be taken once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.event_rx.take()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Open the WebSocket and spawn the reader/writer tasks.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let url = format!("{}/ws", self.server_url);
        let connected =
            tokio::time::timeout(REQUEST_TIMEOUT, tokio_tungstenite::connect_async(&url)).await;

        let ws_stream = match connected {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                *self.state.write().await = ConnectionState::Disconnected;
                log::warn!("Failed to connect to {url}: {e}");
                return Err(ProtocolError::ConnectionClosed);
            }
            Err(_) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::Timeout);
            }
        };

        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: drain the outgoing channel into the socket.
        let (out_tx, mut out_rx) = mpsc::channel::<WsMessage>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if ws_writer.send(msg).await.is_err() {
                    break;
                }
            }
        });

        // Reader task: decode frames, route acks and events.
        let (ack_tx, ack_rx) = mpsc::channel::<AckReply>(16);
        self.ack_rx = Some(ack_rx);
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => match ServerMessage::decode(&text) {
                        Ok(message) => {
                            let routed = match message {
                                ServerMessage::CreateRoomAck(reply) => {
                                    ack_tx.send(AckReply::Create(reply)).await.is_ok()
                                }
                                ServerMessage::JoinRoomAck(reply) => {
                                    ack_tx.send(AckReply::Join(reply)).await.is_ok()
                                }
                                other => {
                                    let event = match other {
                                        ServerMessage::DocumentUpdate(op) => {
                                            ClientEvent::DocumentUpdate(op)
                                        }
                                        ServerMessage::UserJoined(p) => ClientEvent::UserJoined(p),
                                        ServerMessage::UserLeft(sid) => ClientEvent::UserLeft(sid),
                                        ServerMessage::CursorUpdate(p) => {
                                            ClientEvent::CursorUpdate(p)
                                        }
                                        ServerMessage::LanguageChanged(p) => {
                                            ClientEvent::LanguageChanged(p)
                                        }
                                        ServerMessage::OperationAck(p) => {
                                            ClientEvent::OperationAck(p)
                                        }
                                        ServerMessage::OperationError(p) => {
                                            ClientEvent::OperationError(p)
                                        }
                                        ServerMessage::DocumentSync(p) => {
                                            ClientEvent::DocumentSync(p)
                                        }
                                        ServerMessage::SyncError(p) => ClientEvent::SyncError(p),
                                        ServerMessage::CreateRoomAck(_)
                                        | ServerMessage::JoinRoomAck(_) => unreachable!(),
                                    };
                                    event_tx.send(event).await.is_ok()
                                }
                            };
                            if !routed {
                                break;
                            }
                        }
                        Err(e) => {
                            log::warn!("Dropping undecodable server frame: {e}");
                        }
                    },
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }

            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(ClientEvent::Disconnected).await;
        });

        *self.state.write().await = ConnectionState::Connected;
        Ok(())
    }

    /// Request a new room; resolves with the acknowledgement.
    pub async fn create_room(
        &mut self,
        user_name: Option<&str>,
    ) -> Result<CreateRoomReply, ProtocolError> {
        self.send_message(&ClientMessage::CreateRoom {
            user_name: user_name.map(str::to_string),
        })
        .await?;
        match self.await_ack().await? {
            AckReply::Create(reply) => Ok(reply),
            AckReply::Join(_) => Err(ProtocolError::InvalidPayload(
                "join reply to create request".into(),
            )),
        }
    }

    /// Request to join `room_id`; resolves with the acknowledgement.
    pub async fn join_room(
        &mut self,
        room_id: &str,
        user_name: Option<&str>,
    ) -> Result<JoinRoomReply, ProtocolError> {
        self.send_message(&ClientMessage::JoinRoom {
            room_id: room_id.to_string(),
            user_name: user_name.map(str::to_string),
        })
        .await?;
        match self.await_ack().await? {
            AckReply::Join(reply) => Ok(reply),
            AckReply::Create(_) => Err(ProtocolError::InvalidPayload(
                "create reply to join request".into(),
            )),
        }
    }

    /// Fire-and-forget edit; the reply arrives as an
    /// [`ClientEvent::OperationAck`] or [`ClientEvent::OperationError`].
    pub async fn send_operation(&self, op: Operation) -> Result<(), ProtocolError> {
        self.send_message(&ClientMessage::DocumentOperation(op)).await
    }

    pub async fn send_cursor(&self, position: CursorPos) -> Result<(), ProtocolError> {
        self.send_message(&ClientMessage::CursorPosition(position)).await
    }

    pub async fn send_language_change(&self, language: &str) -> Result<(), ProtocolError> {
        self.send_message(&ClientMessage::LanguageChange {
            language: language.to_string(),
        })
        .await
    }

    /// Ask for a full document snapshot; the reply arrives as a
    /// [`ClientEvent::DocumentSync`] or [`ClientEvent::SyncError`].
    pub async fn request_sync(&self) -> Result<(), ProtocolError> {
        self.send_message(&ClientMessage::RequestSync).await
    }

    /// Close the connection cleanly.
    pub async fn close(&self) -> Result<(), ProtocolError> {
        self.send_raw(WsMessage::Close(None)).await
    }

    async fn send_message(&self, message: &ClientMessage) -> Result<(), ProtocolError> {
        self.send_raw(WsMessage::Text(message.encode())).await
    }

    async fn send_raw(&self, msg: WsMessage) -> Result<(), ProtocolError> {
        match &self.outgoing_tx {
            Some(tx) => tx
                .send(msg)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    async fn await_ack(&mut self) -> Result<AckReply, ProtocolError> {
        let rx = self.ack_rx.as_mut().ok_or(ProtocolError::ConnectionClosed)?;
        match tokio::time::timeout(REQUEST_TIMEOUT, rx.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(ProtocolError::ConnectionClosed),
            Err(_) => Err(ProtocolError::Timeout),
        }
    }
}

//! The collaboration server: HTTP app, WebSocket session loop, and the
//! message dispatcher.
//!
//! ```text
//! Client A ──┐
//!             ├── /ws upgrade ── session task ── RoomRegistry ── Room
//! Client B ──┘                        │                           │
//!                                     │                     BroadcastGroup
//!                                     └──── /health, /room/{id} ──┘
//! ```
//!
//! Each connection runs one task: a `tokio::select!` over the socket and
//! the room's broadcast channel. Dispatch takes the room lock, mutates,
//! publishes broadcasts in apply order, and releases the lock before any
//! socket write happens. A session is bound to at most one room at a time.

use crate::broadcast::{BroadcastGroup, OutboundFrame};
use crate::config::Config;
use crate::http;
use crate::presence::Presence;
use crate::protocol::{
    is_valid_room_id, normalize_room_id, unix_millis, ClientMessage, CreateRoomReply, CursorPos,
    CursorUpdatePayload, DocumentSyncPayload, JoinRoomReply, LanguageChangedPayload, Operation,
    ProtocolError, RoomError, ServerMessage, UserJoinedPayload,
};
use crate::registry::RoomRegistry;
use crate::room::SYNC_HISTORY_LIMIT;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderValue, Method};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

/// Server-wide counters.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
}

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub stats: Arc<RwLock<ServerStats>>,
    pub config: Arc<Config>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(RoomRegistry::new(
            config.max_users_per_room,
            config.broadcast_capacity,
        ));
        Self {
            registry,
            stats: Arc::new(RwLock::new(ServerStats::default())),
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }
}

/// A session's link to its room's fan-out channel.
struct RoomSubscription {
    rx: broadcast::Receiver<OutboundFrame>,
    group: Arc<BroadcastGroup>,
}

pub struct CollabServer {
    state: AppState,
}

impl CollabServer {
    pub fn new(config: Config) -> Self {
        Self {
            state: AppState::new(config),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the HTTP app: the WebSocket upgrade plus the introspection
    /// routes, with CORS for the dev editor origin.
    pub fn router(&self) -> Router {
        let cors = match self.state.config.cors_origin.parse::<HeaderValue>() {
            Ok(origin) => CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET]),
            Err(e) => {
                log::warn!(
                    "Invalid cors_origin {:?}: {e}; CORS disabled",
                    self.state.config.cors_origin
                );
                CorsLayer::new()
            }
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(http::health))
            .route("/room/:id", get(http::room_detail))
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Bind, start the idle sweep, and serve until the process exits.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let config = &self.state.config;
        Arc::clone(&self.state.registry).spawn_sweeper(
            Duration::from_secs(config.sweep_interval_secs),
            config.idle_room_ms(),
        );

        let listener = tokio::net::TcpListener::bind(config.server_address()).await?;
        log::info!(
            "Collaboration server listening on {}",
            config.server_address()
        );
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One connection's lifetime: read frames, dispatch, forward broadcasts,
/// clean up the room binding on close.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4();
    let (mut ws_tx, mut ws_rx) = socket.split();

    {
        let mut stats = state.stats.write().await;
        stats.total_connections += 1;
        stats.active_connections += 1;
    }
    log::info!("Session {session_id} connected");

    let mut current_room: Option<String> = None;
    let mut subscription: Option<RoomSubscription> = None;

    loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        {
                            let mut stats = state.stats.write().await;
                            stats.total_messages += 1;
                        }
                        match ClientMessage::parse(&text) {
                            Ok(message) => {
                                let replies = dispatch(
                                    message,
                                    &state,
                                    session_id,
                                    &mut current_room,
                                    &mut subscription,
                                )
                                .await;
                                let mut failed = false;
                                for reply in replies {
                                    if ws_tx
                                        .send(Message::Text(reply.encode()))
                                        .await
                                        .is_err()
                                    {
                                        failed = true;
                                        break;
                                    }
                                }
                                if failed {
                                    break;
                                }
                            }
                            Err(ProtocolError::UnknownEvent(name)) => {
                                log::warn!("Session {session_id}: ignoring unknown event {name:?}");
                            }
                            Err(e) => {
                                log::warn!("Session {session_id}: dropping malformed frame: {e}");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if ws_tx.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        log::info!("Session {session_id} closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("Session {session_id} socket error: {e}");
                        break;
                    }
                }
            }

            frame = async {
                match subscription {
                    Some(ref mut sub) => sub.rx.recv().await,
                    // No room yet: park this arm.
                    None => std::future::pending().await,
                }
            } => {
                match frame {
                    Ok(frame) => {
                        if frame.origin == Some(session_id) {
                            continue; // our own broadcast
                        }
                        if ws_tx
                            .send(Message::Text(frame.payload.as_ref().clone()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("Session {session_id} lagged by {n} broadcast frames");
                        if let Some(ref sub) = subscription {
                            sub.group.note_lagged(n);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        subscription = None;
                    }
                }
            }
        }
    }

    cleanup_session(&state, session_id, current_room.take()).await;
    let mut stats = state.stats.write().await;
    stats.active_connections = stats.active_connections.saturating_sub(1);
}

/// Remove the session from its room, announce the departure, and drop the
/// room if it is now empty.
async fn cleanup_session(state: &AppState, session_id: Uuid, current_room: Option<String>) {
    let Some(room_id) = current_room else {
        return;
    };
    let Some(room) = state.registry.lookup(&room_id).await else {
        return;
    };

    let empty = {
        let mut guard = room.lock().await;
        if guard.remove_user(&session_id.to_string()).is_some() {
            guard.publish(None, &ServerMessage::UserLeft(session_id.to_string()));
            log::info!("Session {session_id} left room {room_id}");
        }
        guard.member_count() == 0
    };
    if empty {
        state.registry.remove_if_empty(&room_id).await;
    }
}

/// Route one inbound message. Returns the replies addressed to the sender;
/// broadcasts to the rest of the room are published from inside, under the
/// room lock, so they carry the apply order.
async fn dispatch(
    message: ClientMessage,
    state: &AppState,
    session_id: Uuid,
    current_room: &mut Option<String>,
    subscription: &mut Option<RoomSubscription>,
) -> Vec<ServerMessage> {
    match message {
        ClientMessage::CreateRoom { user_name } => {
            handle_create_room(state, session_id, user_name, current_room, subscription).await
        }
        ClientMessage::JoinRoom { room_id, user_name } => {
            handle_join_room(
                state,
                session_id,
                room_id,
                user_name,
                current_room,
                subscription,
            )
            .await
        }
        ClientMessage::DocumentOperation(op) => {
            handle_document_operation(state, session_id, op, current_room).await
        }
        ClientMessage::CursorPosition(position) => {
            handle_cursor_position(state, session_id, position, current_room).await;
            Vec::new()
        }
        ClientMessage::LanguageChange { language } => {
            handle_language_change(state, session_id, language, current_room).await;
            Vec::new()
        }
        ClientMessage::RequestSync => handle_request_sync(state, current_room).await,
    }
}

async fn handle_create_room(
    state: &AppState,
    session_id: Uuid,
    user_name: Option<String>,
    current_room: &mut Option<String>,
    subscription: &mut Option<RoomSubscription>,
) -> Vec<ServerMessage> {
    if current_room.is_some() {
        return vec![ServerMessage::CreateRoomAck(CreateRoomReply::failure(
            RoomError::AlreadyInRoom,
        ))];
    }

    let (room_id, room) = state.registry.create().await;
    let mut guard = room.lock().await;
    let presence = Presence::allocate(session_id, user_name, guard.member_count());
    match guard.add_user(presence) {
        Ok(user) => {
            *subscription = Some(RoomSubscription {
                rx: guard.broadcast().subscribe(),
                group: guard.broadcast().clone(),
            });
            let reply = CreateRoomReply::ok(
                room_id.clone(),
                guard.document_text(),
                guard.user_list(),
                user,
                guard.stats(),
            );
            drop(guard);
            *current_room = Some(room_id.clone());
            log::info!("Session {session_id} created room {room_id}");
            vec![ServerMessage::CreateRoomAck(reply)]
        }
        Err(err) => {
            drop(guard);
            // The creator never joined; drop the orphan room.
            state.registry.remove_if_empty(&room_id).await;
            vec![ServerMessage::CreateRoomAck(CreateRoomReply::failure(err))]
        }
    }
}

async fn handle_join_room(
    state: &AppState,
    session_id: Uuid,
    raw_room_id: String,
    user_name: Option<String>,
    current_room: &mut Option<String>,
    subscription: &mut Option<RoomSubscription>,
) -> Vec<ServerMessage> {
    let room_id = normalize_room_id(&raw_room_id);
    if !is_valid_room_id(&room_id) {
        return vec![ServerMessage::JoinRoomAck(JoinRoomReply::failure(
            RoomError::InvalidRoomId,
        ))];
    }

    // Idempotent rejoin: same room, same session. Reply with current state,
    // add nothing, announce nothing.
    if current_room.as_deref() == Some(room_id.as_str()) {
        let Some(room) = state.registry.lookup(&room_id).await else {
            return vec![ServerMessage::JoinRoomAck(JoinRoomReply::failure(
                RoomError::RoomNotFound,
            ))];
        };
        let mut guard = room.lock().await;
        guard.update_user_activity(&session_id.to_string());
        let users = guard.user_list();
        let Some(user) = users.iter().find(|u| u.id == session_id.to_string()).cloned() else {
            return vec![ServerMessage::JoinRoomAck(JoinRoomReply::failure(
                RoomError::RoomNotFound,
            ))];
        };
        let reply = JoinRoomReply::ok(
            guard.document_text(),
            users,
            user,
            guard.stats(),
            guard.history_len(),
        );
        return vec![ServerMessage::JoinRoomAck(reply)];
    }

    if current_room.is_some() {
        return vec![ServerMessage::JoinRoomAck(JoinRoomReply::failure(
            RoomError::AlreadyInRoom,
        ))];
    }

    let Some(room) = state.registry.lookup(&room_id).await else {
        return vec![ServerMessage::JoinRoomAck(JoinRoomReply::failure(
            RoomError::RoomNotFound,
        ))];
    };

    let mut guard = room.lock().await;
    let presence = Presence::allocate(session_id, user_name, guard.member_count());
    match guard.add_user(presence) {
        Ok(user) => {
            *subscription = Some(RoomSubscription {
                rx: guard.broadcast().subscribe(),
                group: guard.broadcast().clone(),
            });
            // Announced only after the member is in; the joiner filters out
            // its own frame, the ack below carries its full state.
            guard.publish(
                Some(session_id),
                &ServerMessage::UserJoined(UserJoinedPayload {
                    user: user.clone(),
                    user_count: guard.member_count(),
                }),
            );
            let reply = JoinRoomReply::ok(
                guard.document_text(),
                guard.user_list(),
                user,
                guard.stats(),
                guard.history_len(),
            );
            drop(guard);
            *current_room = Some(room_id.clone());
            log::info!("Session {session_id} joined room {room_id}");
            vec![ServerMessage::JoinRoomAck(reply)]
        }
        Err(err) => vec![ServerMessage::JoinRoomAck(JoinRoomReply::failure(err))],
    }
}

async fn handle_document_operation(
    state: &AppState,
    session_id: Uuid,
    op: Operation,
    current_room: &Option<String>,
) -> Vec<ServerMessage> {
    let Some(room_id) = current_room.as_deref() else {
        log::debug!("Session {session_id}: document-operation with no room binding");
        return Vec::new();
    };
    let Some(room) = state.registry.lookup(room_id).await else {
        log::warn!("Session {session_id} bound to missing room {room_id}");
        return Vec::new();
    };

    let mut guard = room.lock().await;
    guard.update_user_activity(&session_id.to_string());

    if !guard.validate_operation(&op) {
        drop(guard);
        log::warn!(
            "Session {session_id}: invalid {} operation {:?} in room {room_id}",
            op.kind.name(),
            op.id
        );
        return vec![ServerMessage::operation_error(RoomError::InvalidOperation, op)];
    }

    let stamped = op.stamped(session_id, room_id);
    match guard.apply_operation(stamped.clone()) {
        Ok(outcome) => {
            guard.publish(
                Some(session_id),
                &ServerMessage::DocumentUpdate(stamped.clone()),
            );
            drop(guard);
            log::debug!(
                "Applied {} {} in room {room_id}: {} -> {} units",
                stamped.kind.name(),
                stamped.id,
                outcome.previous_length,
                outcome.new_length
            );
            vec![ServerMessage::operation_ack(stamped)]
        }
        Err(err) => {
            drop(guard);
            vec![ServerMessage::operation_error(err, stamped)]
        }
    }
}

async fn handle_cursor_position(
    state: &AppState,
    session_id: Uuid,
    position: CursorPos,
    current_room: &Option<String>,
) {
    let Some(room_id) = current_room.as_deref() else {
        return;
    };
    let Some(room) = state.registry.lookup(room_id).await else {
        return;
    };

    let mut guard = room.lock().await;
    if let Some(user) = guard.set_cursor(&session_id.to_string(), position) {
        guard.publish(
            Some(session_id),
            &ServerMessage::CursorUpdate(CursorUpdatePayload {
                user_id: session_id.to_string(),
                position,
                user,
            }),
        );
    }
}

async fn handle_language_change(
    state: &AppState,
    session_id: Uuid,
    language: String,
    current_room: &Option<String>,
) {
    let Some(room_id) = current_room.as_deref() else {
        return;
    };
    let Some(room) = state.registry.lookup(room_id).await else {
        return;
    };

    let mut guard = room.lock().await;
    let sid = session_id.to_string();
    if let Some(user_name) = guard.member_name(&sid) {
        guard.update_user_activity(&sid);
        guard.publish(
            Some(session_id),
            &ServerMessage::LanguageChanged(LanguageChangedPayload {
                user_id: sid,
                language,
                user_name,
            }),
        );
    }
}

async fn handle_request_sync(
    state: &AppState,
    current_room: &Option<String>,
) -> Vec<ServerMessage> {
    let Some(room_id) = current_room.as_deref() else {
        return vec![ServerMessage::sync_error(RoomError::RoomNotFound)];
    };
    let Some(room) = state.registry.lookup(room_id).await else {
        return vec![ServerMessage::sync_error(RoomError::RoomNotFound)];
    };

    let guard = room.lock().await;
    let payload = DocumentSyncPayload {
        document: guard.document_text(),
        version: guard.history_len(),
        operations: guard.recent_operations(SYNC_HISTORY_LIMIT),
        timestamp: unix_millis(),
    };
    vec![ServerMessage::DocumentSync(payload)]
}

//! JSON wire protocol between editor clients and the collaboration server.
//!
//! Every frame is a text message carrying an envelope:
//!
//! ```text
//! {"event": "<name>", "data": <payload>}
//! ```
//!
//! Client→server events: `create-room`, `join-room`, `document-operation`,
//! `cursor-position`, `language-change`, `request-sync`.
//!
//! Server→client events: the acknowledgement pair for each request
//! (`create-room-ack`, `join-room-ack`, `operation-ack` / `operation-error`,
//! `document-sync` / `sync-error`) plus the room broadcasts (`user-joined`,
//! `user-left`, `document-update`, `cursor-update`, `language-changed`).
//!
//! Two legacy client shapes are tolerated: `create-room` with no payload at
//! all, and `join-room` whose payload is a bare room-id string instead of an
//! object.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Milliseconds since the Unix epoch, the timestamp unit used on the wire.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ───────────────────────────────────────────────────────────────────
// Room identifiers
// ───────────────────────────────────────────────────────────────────

/// Room ids are exactly six characters drawn from `[A-Z0-9]`.
pub const ROOM_ID_LEN: usize = 6;

/// Uppercase a client-supplied room id. Ids are case-insensitive on the wire
/// and stored uppercase.
pub fn normalize_room_id(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Lexical check on an already-normalized room id.
pub fn is_valid_room_id(id: &str) -> bool {
    id.len() == ROOM_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

// ───────────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────────

/// User-visible request failures. `Display` renders the exact strings the
/// protocol promises to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomError {
    InvalidRoomId,
    RoomNotFound,
    AlreadyInRoom,
    RoomFull,
    InvalidUserData,
    InvalidOperation,
}

impl std::fmt::Display for RoomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RoomError::InvalidRoomId => "Invalid room ID format",
            RoomError::RoomNotFound => "Room not found",
            RoomError::AlreadyInRoom => "Already in a different room",
            RoomError::RoomFull => "Room is full",
            RoomError::InvalidUserData => "Invalid user data",
            RoomError::InvalidOperation => "Invalid operation",
        };
        f.write_str(s)
    }
}

impl std::error::Error for RoomError {}

/// Transport/framing errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    MalformedFrame(String),
    InvalidPayload(String),
    UnknownEvent(String),
    ConnectionClosed,
    Timeout,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedFrame(e) => write!(f, "Malformed frame: {e}"),
            Self::InvalidPayload(e) => write!(f, "Invalid payload: {e}"),
            Self::UnknownEvent(name) => write!(f, "Unknown event: {name}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::Timeout => write!(f, "Request timed out"),
        }
    }
}

impl std::error::Error for ProtocolError {}

// ───────────────────────────────────────────────────────────────────
// Operations
// ───────────────────────────────────────────────────────────────────

/// The kind-specific half of an operation. Flattened into [`Operation`] so
/// the wire shape stays a single object tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OperationKind {
    Insert { content: String },
    Delete { length: i64 },
    /// Cursor-positioning no-op: accepted and logged, text unchanged.
    Retain { length: i64 },
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Insert { .. } => "insert",
            OperationKind::Delete { .. } => "delete",
            OperationKind::Retain { .. } => "retain",
        }
    }
}

/// A text operation as it travels on the wire.
///
/// `position` is an index into the document's UTF-16 code units. Clients
/// assign `id`; the server stamps `user_id`, `timestamp`, and `room_id`
/// when it accepts the operation. `position` is signed so that out-of-range
/// client input reaches validation instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(flatten)]
    pub kind: OperationKind,
    pub position: i64,
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
}

impl Operation {
    pub fn insert(position: i64, content: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Insert {
                content: content.into(),
            },
            position,
            id: id.into(),
            user_id: None,
            timestamp: None,
            room_id: None,
        }
    }

    pub fn delete(position: i64, length: i64, id: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Delete { length },
            position,
            id: id.into(),
            user_id: None,
            timestamp: None,
            room_id: None,
        }
    }

    pub fn retain(position: i64, length: i64, id: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Retain { length },
            position,
            id: id.into(),
            user_id: None,
            timestamp: None,
            room_id: None,
        }
    }

    /// Authoritative copy with server-assigned provenance.
    pub fn stamped(mut self, session_id: Uuid, room_id: &str) -> Self {
        self.user_id = Some(session_id.to_string());
        self.timestamp = Some(unix_millis());
        self.room_id = Some(room_id.to_string());
        self
    }
}

/// A history entry: an accepted operation plus the instant it was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedOperation {
    #[serde(flatten)]
    pub operation: Operation,
    pub applied_at: u64,
}

// ───────────────────────────────────────────────────────────────────
// Presence views
// ───────────────────────────────────────────────────────────────────

/// Cursor coordinates. The shape is free-form on the wire; missing fields
/// default to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CursorPos {
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

impl CursorPos {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A member as clients see it in `users` lists and broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub color: String,
    pub cursor: CursorPos,
    pub is_active: bool,
}

/// Per-room statistics exposed through acks and the HTTP surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStats {
    pub id: String,
    pub user_count: usize,
    pub max_users: usize,
    pub document_length: usize,
    pub operation_count: usize,
    pub created_at: u64,
    pub last_activity: u64,
    /// Here "active" means last activity within the past five minutes.
    pub is_active: bool,
}

// ───────────────────────────────────────────────────────────────────
// Client → server messages
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    CreateRoom {
        user_name: Option<String>,
    },
    JoinRoom {
        room_id: String,
        user_name: Option<String>,
    },
    DocumentOperation(Operation),
    CursorPosition(CursorPos),
    LanguageChange {
        language: String,
    },
    RequestSync,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomRequest {
    #[serde(default)]
    user_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRoomRequest {
    room_id: String,
    #[serde(default)]
    user_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LanguageChangeRequest {
    language: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ClientMessage {
    /// Parse an inbound text frame.
    ///
    /// Tolerates the legacy shapes: `create-room` without a payload, and
    /// `join-room` whose payload is a bare room-id string.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;

        match envelope.event.as_str() {
            "create-room" => {
                let req: CreateRoomRequest = if envelope.data.is_null() {
                    CreateRoomRequest::default()
                } else {
                    serde_json::from_value(envelope.data)
                        .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?
                };
                Ok(ClientMessage::CreateRoom {
                    user_name: req.user_name,
                })
            }
            "join-room" => match envelope.data {
                // Legacy shape: bare room-id string.
                Value::String(room_id) => Ok(ClientMessage::JoinRoom {
                    room_id,
                    user_name: None,
                }),
                data => {
                    let req: JoinRoomRequest = serde_json::from_value(data)
                        .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
                    Ok(ClientMessage::JoinRoom {
                        room_id: req.room_id,
                        user_name: req.user_name,
                    })
                }
            },
            "document-operation" => {
                let op: Operation = serde_json::from_value(envelope.data)
                    .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
                Ok(ClientMessage::DocumentOperation(op))
            }
            "cursor-position" => {
                // Free-form payload: take what parses, default the rest.
                let pos = serde_json::from_value(envelope.data).unwrap_or_default();
                Ok(ClientMessage::CursorPosition(pos))
            }
            "language-change" => {
                let req: LanguageChangeRequest = serde_json::from_value(envelope.data)
                    .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
                Ok(ClientMessage::LanguageChange {
                    language: req.language,
                })
            }
            "request-sync" => Ok(ClientMessage::RequestSync),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    /// Serialize to an outbound text frame (used by the client handle).
    pub fn encode(&self) -> String {
        let (event, data) = match self {
            ClientMessage::CreateRoom { user_name } => (
                "create-room",
                match user_name {
                    Some(name) => serde_json::json!({ "userName": name }),
                    None => Value::Null,
                },
            ),
            ClientMessage::JoinRoom { room_id, user_name } => (
                "join-room",
                serde_json::json!({ "roomId": room_id, "userName": user_name }),
            ),
            ClientMessage::DocumentOperation(op) => (
                "document-operation",
                serde_json::to_value(op).unwrap_or(Value::Null),
            ),
            ClientMessage::CursorPosition(pos) => (
                "cursor-position",
                serde_json::to_value(pos).unwrap_or(Value::Null),
            ),
            ClientMessage::LanguageChange { language } => (
                "language-change",
                serde_json::json!({ "language": language }),
            ),
            ClientMessage::RequestSync => ("request-sync", Value::Null),
        };
        serde_json::json!({ "event": event, "data": data }).to_string()
    }
}

// ───────────────────────────────────────────────────────────────────
// Server → client messages
// ───────────────────────────────────────────────────────────────────

/// Reply to `create-room`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<UserView>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_stats: Option<RoomStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CreateRoomReply {
    pub fn ok(
        room_id: String,
        document: String,
        users: Vec<UserView>,
        user: UserView,
        room_stats: RoomStats,
    ) -> Self {
        Self {
            success: true,
            room_id: Some(room_id),
            document: Some(document),
            users: Some(users),
            user: Some(user),
            room_stats: Some(room_stats),
            error: None,
        }
    }

    pub fn failure(error: RoomError) -> Self {
        Self {
            success: false,
            room_id: None,
            document: None,
            users: None,
            user: None,
            room_stats: None,
            error: Some(error.to_string()),
        }
    }
}

/// Reply to `join-room`. Carries `documentVersion` (the history length),
/// which `create-room`'s reply does not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<UserView>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_stats: Option<RoomStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_version: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JoinRoomReply {
    pub fn ok(
        document: String,
        users: Vec<UserView>,
        user: UserView,
        room_stats: RoomStats,
        document_version: usize,
    ) -> Self {
        Self {
            success: true,
            document: Some(document),
            users: Some(users),
            user: Some(user),
            room_stats: Some(room_stats),
            document_version: Some(document_version),
            error: None,
        }
    }

    pub fn failure(error: RoomError) -> Self {
        Self {
            success: false,
            document: None,
            users: None,
            user: None,
            room_stats: None,
            document_version: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoinedPayload {
    pub user: UserView,
    pub user_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationAckPayload {
    pub success: bool,
    pub operation_id: String,
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationErrorPayload {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    pub operation_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdatePayload {
    pub user_id: String,
    pub position: CursorPos,
    pub user: UserView,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageChangedPayload {
    pub user_id: String,
    pub language: String,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSyncPayload {
    pub document: String,
    pub version: usize,
    pub operations: Vec<AppliedOperation>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncErrorPayload {
    pub error: String,
}

/// Everything the server can emit. Serializes straight to the wire
/// envelope via the adjacent `event`/`data` tagging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    CreateRoomAck(CreateRoomReply),
    JoinRoomAck(JoinRoomReply),
    UserJoined(UserJoinedPayload),
    /// Payload is the leaving member's session id.
    UserLeft(String),
    DocumentUpdate(Operation),
    OperationAck(OperationAckPayload),
    OperationError(OperationErrorPayload),
    CursorUpdate(CursorUpdatePayload),
    LanguageChanged(LanguageChangedPayload),
    DocumentSync(DocumentSyncPayload),
    SyncError(SyncErrorPayload),
}

impl ServerMessage {
    pub fn operation_ack(operation: Operation) -> Self {
        ServerMessage::OperationAck(OperationAckPayload {
            success: true,
            operation_id: operation.id.clone(),
            operation,
        })
    }

    pub fn operation_error(error: RoomError, operation: Operation) -> Self {
        ServerMessage::OperationError(OperationErrorPayload {
            error: error.to_string(),
            operation_id: operation.id.clone(),
            operation: Some(operation),
        })
    }

    pub fn sync_error(error: RoomError) -> Self {
        ServerMessage::SyncError(SyncErrorPayload {
            error: error.to_string(),
        })
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            log::error!("Failed to encode server message: {e}");
            String::from("{\"event\":\"sync-error\",\"data\":{\"error\":\"encode failure\"}}")
        })
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_normalize() {
        assert_eq!(normalize_room_id("abc123"), "ABC123");
        assert_eq!(normalize_room_id("  xyz789 "), "XYZ789");
    }

    #[test]
    fn test_room_id_lexical_rules() {
        assert!(is_valid_room_id("ABC123"));
        assert!(is_valid_room_id("ZZZZZZ"));
        assert!(is_valid_room_id("000000"));
        assert!(!is_valid_room_id("ABC12")); // too short
        assert!(!is_valid_room_id("ABC1234")); // too long
        assert!(!is_valid_room_id("abc123")); // not normalized
        assert!(!is_valid_room_id("ABC-12")); // bad character
        assert!(!is_valid_room_id(""));
    }

    #[test]
    fn test_parse_create_room_with_name() {
        let msg = ClientMessage::parse(
            r#"{"event":"create-room","data":{"userName":"Alice"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::CreateRoom {
                user_name: Some("Alice".into())
            }
        );
    }

    #[test]
    fn test_parse_create_room_legacy_no_payload() {
        let msg = ClientMessage::parse(r#"{"event":"create-room"}"#).unwrap();
        assert_eq!(msg, ClientMessage::CreateRoom { user_name: None });

        let msg = ClientMessage::parse(r#"{"event":"create-room","data":null}"#).unwrap();
        assert_eq!(msg, ClientMessage::CreateRoom { user_name: None });
    }

    #[test]
    fn test_parse_join_room_object() {
        let msg = ClientMessage::parse(
            r#"{"event":"join-room","data":{"roomId":"abc123","userName":"Bob"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinRoom {
                room_id: "abc123".into(),
                user_name: Some("Bob".into())
            }
        );
    }

    #[test]
    fn test_parse_join_room_legacy_bare_string() {
        let msg = ClientMessage::parse(r#"{"event":"join-room","data":"ABC123"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinRoom {
                room_id: "ABC123".into(),
                user_name: None
            }
        );
    }

    #[test]
    fn test_parse_document_operation_insert() {
        let msg = ClientMessage::parse(
            r#"{"event":"document-operation","data":{"type":"insert","position":0,"content":"X","id":"op1"}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::DocumentOperation(op) => {
                assert_eq!(op.position, 0);
                assert_eq!(op.id, "op1");
                assert_eq!(
                    op.kind,
                    OperationKind::Insert {
                        content: "X".into()
                    }
                );
            }
            other => panic!("Expected DocumentOperation, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_document_operation_negative_position() {
        // A negative position must parse; validation rejects it later.
        let msg = ClientMessage::parse(
            r#"{"event":"document-operation","data":{"type":"delete","position":-1,"length":2,"id":"op2"}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::DocumentOperation(op) => assert_eq!(op.position, -1),
            other => panic!("Expected DocumentOperation, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_cursor_position_freeform() {
        let msg =
            ClientMessage::parse(r#"{"event":"cursor-position","data":{"line":3,"column":7}}"#)
                .unwrap();
        assert_eq!(msg, ClientMessage::CursorPosition(CursorPos::new(3, 7)));

        // Missing fields default to zero.
        let msg = ClientMessage::parse(r#"{"event":"cursor-position","data":{}}"#).unwrap();
        assert_eq!(msg, ClientMessage::CursorPosition(CursorPos::default()));
    }

    #[test]
    fn test_parse_unknown_event() {
        let err = ClientMessage::parse(r#"{"event":"teleport","data":{}}"#).unwrap_err();
        match err {
            ProtocolError::UnknownEvent(name) => assert_eq!(name, "teleport"),
            other => panic!("Expected UnknownEvent, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_malformed_frame() {
        assert!(ClientMessage::parse("not json").is_err());
        assert!(ClientMessage::parse(r#"{"data":{}}"#).is_err());
    }

    #[test]
    fn test_client_message_roundtrip() {
        let original = ClientMessage::JoinRoom {
            room_id: "ABC123".into(),
            user_name: Some("Alice".into()),
        };
        let parsed = ClientMessage::parse(&original.encode()).unwrap();
        assert_eq!(parsed, original);

        let op = Operation::insert(5, "hi", "op9");
        let original = ClientMessage::DocumentOperation(op);
        let parsed = ClientMessage::parse(&original.encode()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_operation_stamping() {
        let session = Uuid::new_v4();
        let op = Operation::insert(0, "X", "op1").stamped(session, "ABC123");
        assert_eq!(op.user_id, Some(session.to_string()));
        assert_eq!(op.room_id, Some("ABC123".into()));
        assert!(op.timestamp.is_some());
    }

    #[test]
    fn test_operation_wire_shape() {
        let op = Operation::delete(3, 2, "op4");
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["type"], "delete");
        assert_eq!(value["position"], 3);
        assert_eq!(value["length"], 2);
        assert_eq!(value["id"], "op4");
        // Unstamped fields stay off the wire.
        assert!(value.get("userId").is_none());
        assert!(value.get("roomId").is_none());
    }

    #[test]
    fn test_server_message_envelope_shape() {
        let msg = ServerMessage::UserLeft("session-1".into());
        let value: Value = serde_json::from_str(&msg.encode()).unwrap();
        assert_eq!(value["event"], "user-left");
        assert_eq!(value["data"], "session-1");
    }

    #[test]
    fn test_server_message_roundtrip() {
        let op = Operation::insert(0, "X", "op1");
        let msg = ServerMessage::operation_ack(op);
        let decoded = ServerMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_failure_reply_shape() {
        let reply = JoinRoomReply::failure(RoomError::RoomFull);
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Room is full");
        assert!(value.get("document").is_none());
        assert!(value.get("documentVersion").is_none());
    }

    #[test]
    fn test_error_strings_exact() {
        assert_eq!(RoomError::InvalidRoomId.to_string(), "Invalid room ID format");
        assert_eq!(RoomError::RoomNotFound.to_string(), "Room not found");
        assert_eq!(
            RoomError::AlreadyInRoom.to_string(),
            "Already in a different room"
        );
        assert_eq!(RoomError::RoomFull.to_string(), "Room is full");
        assert_eq!(RoomError::InvalidUserData.to_string(), "Invalid user data");
        assert_eq!(RoomError::InvalidOperation.to_string(), "Invalid operation");
    }

    #[test]
    fn test_create_reply_has_no_version_field() {
        let stats = RoomStats {
            id: "ABC123".into(),
            user_count: 1,
            max_users: 10,
            document_length: 0,
            operation_count: 0,
            created_at: 0,
            last_activity: 0,
            is_active: true,
        };
        let user = UserView {
            id: "u1".into(),
            name: "Alice".into(),
            color: "#FF6B6B".into(),
            cursor: CursorPos::default(),
            is_active: true,
        };
        let reply =
            CreateRoomReply::ok("ABC123".into(), String::new(), vec![user.clone()], user, stats);
        let value = serde_json::to_value(&reply).unwrap();
        assert!(value.get("documentVersion").is_none());
        assert_eq!(value["roomId"], "ABC123");
    }
}

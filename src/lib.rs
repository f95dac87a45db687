//! # coedit — room-based real-time collaborative text editing
//!
//! A collaboration server: clients join named rooms over WebSocket, emit
//! positional text operations against the shared document, and the server
//! linearizes, applies, acknowledges, and fans the updates out to every
//! other member.
//!
//! ```text
//! ┌──────────────┐    WebSocket     ┌──────────────┐
//! │ CollabClient │ ◄──────────────► │ CollabServer │
//! │  (per user)  │   JSON frames    │  (authority) │
//! └──────────────┘                  └──────┬───────┘
//!                                          │
//!                                   ┌──────┴───────┐
//!                                   │ RoomRegistry │
//!                                   └──────┬───────┘
//!                                          │ per room
//!                              ┌───────────┴───────────┐
//!                              │ Room                  │
//!                              │  document · members   │
//!                              │  history · broadcast  │
//!                              └───────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — JSON wire envelope, messages, operations
//! - [`document`] — UTF-16 code-unit text buffer
//! - [`room`] — per-room state machine (validate, apply, membership)
//! - [`registry`] — room lifecycle and the idle sweep
//! - [`broadcast`] — per-room fan-out with per-recipient FIFO ordering
//! - [`server`] — HTTP app and WebSocket session loop
//! - [`http`] — `/health` and `/room/{id}` introspection
//! - [`client`] — wire-level client handle
//!
//! Documents live in memory only; a process restart discards all rooms.

pub mod broadcast;
pub mod client;
pub mod config;
pub mod document;
pub mod http;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod server;

// Re-exports for convenience
pub use broadcast::{BroadcastGroup, BroadcastStats, OutboundFrame};
pub use client::{ClientEvent, CollabClient, ConnectionState};
pub use config::Config;
pub use document::Document;
pub use presence::Presence;
pub use protocol::{
    ClientMessage, CreateRoomReply, CursorPos, JoinRoomReply, Operation, OperationKind,
    ProtocolError, RoomError, RoomStats, ServerMessage, UserView,
};
pub use registry::RoomRegistry;
pub use room::{Room, HISTORY_LIMIT, MAX_USERS, WELCOME_DOCUMENT};
pub use server::{AppState, CollabServer, ServerStats};

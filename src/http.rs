//! Read-only HTTP introspection: `GET /health` and `GET /room/{id}`.
//!
//! No authentication; these exist for operators and dashboards. The
//! handlers are thin wrappers over snapshot builders so the response
//! shapes are unit-testable without a socket.

use crate::protocol::{unix_millis, AppliedOperation, RoomStats, UserView};
use crate::room::RECENT_OPS_LIMIT;
use crate::server::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, OnceLock};
use sysinfo::System;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub used: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub total: u64,
    pub active: u64,
    pub messages: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// Seconds since the server started.
    pub uptime: u64,
    pub memory: MemoryStats,
    /// Number of live rooms.
    pub rooms: usize,
    pub connections: ConnectionStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub server: ServerInfo,
    pub rooms: Vec<RoomStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetail {
    #[serde(flatten)]
    pub stats: RoomStats,
    pub users: Vec<UserView>,
    pub recent_operations: Vec<AppliedOperation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn memory_stats() -> MemoryStats {
    let monitor = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new()));
    match monitor.lock() {
        Ok(mut sys) => {
            sys.refresh_memory();
            MemoryStats {
                used: sys.used_memory(),
                total: sys.total_memory(),
            }
        }
        Err(_) => MemoryStats { used: 0, total: 0 },
    }
}

pub(crate) async fn health_snapshot(state: &AppState) -> HealthResponse {
    let rooms = state.registry.stats_snapshot().await;
    let connections = {
        let stats = state.stats.read().await;
        ConnectionStats {
            total: stats.total_connections,
            active: stats.active_connections,
            messages: stats.total_messages,
        }
    };
    HealthResponse {
        status: "ok".to_string(),
        timestamp: unix_millis(),
        server: ServerInfo {
            uptime: state.started_at.elapsed().as_secs(),
            memory: memory_stats(),
            rooms: rooms.len(),
            connections,
        },
        rooms,
    }
}

pub(crate) async fn room_snapshot(state: &AppState, raw_id: &str) -> Option<RoomDetail> {
    let room = state.registry.lookup(raw_id).await?;
    let guard = room.lock().await;
    Some(RoomDetail {
        stats: guard.stats(),
        users: guard.user_list(),
        recent_operations: guard.recent_operations(RECENT_OPS_LIMIT),
    })
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    log::debug!("Health check requested");
    Json(health_snapshot(&state).await)
}

/// `GET /room/{id}` — id is case-insensitive.
pub async fn room_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RoomDetail>, (StatusCode, Json<ErrorBody>)> {
    match room_snapshot(&state, &id).await {
        Some(detail) => Ok(Json(detail)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "Room not found".to_string(),
            }),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::presence::Presence;
    use crate::protocol::Operation;
    use uuid::Uuid;

    fn test_state() -> AppState {
        AppState::new(Config::default())
    }

    #[tokio::test]
    async fn test_health_snapshot_empty() {
        let state = test_state();
        let health = health_snapshot(&state).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.server.rooms, 0);
        assert!(health.rooms.is_empty());
        assert!(health.timestamp > 0);
    }

    #[tokio::test]
    async fn test_health_snapshot_lists_rooms() {
        let state = test_state();
        let (id, _room) = state.registry.create().await;

        let health = health_snapshot(&state).await;
        assert_eq!(health.server.rooms, 1);
        assert_eq!(health.rooms.len(), 1);
        assert_eq!(health.rooms[0].id, id);
    }

    #[tokio::test]
    async fn test_room_snapshot_detail() {
        let state = test_state();
        let (id, room) = state.registry.create().await;
        {
            let mut guard = room.lock().await;
            guard
                .add_user(Presence::allocate(Uuid::new_v4(), Some("Alice".into()), 0))
                .unwrap();
            for i in 0..15 {
                guard
                    .apply_operation(Operation::retain(0, 1, format!("op{i}")))
                    .unwrap();
            }
        }

        let detail = room_snapshot(&state, &id).await.unwrap();
        assert_eq!(detail.stats.id, id);
        assert_eq!(detail.users.len(), 1);
        assert_eq!(detail.users[0].name, "Alice");
        // Only the most recent ten operations are shown.
        assert_eq!(detail.recent_operations.len(), RECENT_OPS_LIMIT);
        assert_eq!(detail.recent_operations[0].operation.id, "op5");
    }

    #[tokio::test]
    async fn test_room_snapshot_case_insensitive() {
        let state = test_state();
        let (id, _room) = state.registry.create().await;
        assert!(room_snapshot(&state, &id.to_ascii_lowercase()).await.is_some());
    }

    #[tokio::test]
    async fn test_room_snapshot_not_found() {
        let state = test_state();
        assert!(room_snapshot(&state, "ZZZZZZ").await.is_none());
    }

    #[tokio::test]
    async fn test_room_detail_wire_shape_is_flat() {
        let state = test_state();
        let (id, _room) = state.registry.create().await;
        let detail = room_snapshot(&state, &id).await.unwrap();
        let value = serde_json::to_value(&detail).unwrap();
        // Stats fields are flattened alongside users/recentOperations.
        assert_eq!(value["id"], id);
        assert!(value.get("userCount").is_some());
        assert!(value.get("recentOperations").is_some());
        assert!(value.get("stats").is_none());
    }
}

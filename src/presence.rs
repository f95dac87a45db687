//! Per-member presence: display identity plus cursor and activity state.
//!
//! Display names come from a fixed pool indexed by how many members the
//! room already has, falling back to "User N". Colors come from a fixed
//! 12-color palette driven by a process-global round-robin counter, so two
//! members of the same room can end up with the same color when other
//! rooms have consumed intermediate palette slots.

use crate::protocol::{unix_millis, CursorPos, UserView};
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// A member counts as active while they have been seen in the last 30 s.
pub const ACTIVE_WINDOW_MS: u64 = 30_000;

/// Default display names, picked by the joining member's index.
pub const USER_NAMES: [&str; 12] = [
    "Alice", "Bob", "Charlie", "Diana", "Eve", "Frank", "Grace", "Henry", "Ivy", "Jack", "Kate",
    "Liam",
];

/// Cursor/selection colors, assigned round-robin across the whole process.
pub const USER_COLORS: [&str; 12] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
    "#BB8FCE", "#85C1E9", "#F8C471", "#82E0AA",
];

static COLOR_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Palette color for an allocation index.
pub fn color_for_index(index: usize) -> &'static str {
    USER_COLORS[index % USER_COLORS.len()]
}

/// Next palette color. Process-global and monotone; colors are not uniqued
/// within a room.
pub fn next_color() -> &'static str {
    color_for_index(COLOR_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Default name for the member joining a room that already has
/// `existing_count` members.
pub fn default_name(existing_count: usize) -> String {
    USER_NAMES
        .get(existing_count)
        .map(|n| n.to_string())
        .unwrap_or_else(|| format!("User {}", existing_count + 1))
}

/// A member's record within a room.
#[derive(Debug, Clone, PartialEq)]
pub struct Presence {
    pub id: String,
    pub name: String,
    pub color: String,
    pub cursor: CursorPos,
    pub joined_at: u64,
    pub last_seen: u64,
}

impl Presence {
    /// Build the presence record for a joining session. A supplied name is
    /// kept verbatim (membership validation rejects empty names); otherwise
    /// one is drawn from the pool.
    pub fn allocate(session_id: Uuid, requested_name: Option<String>, existing_count: usize) -> Self {
        let name = requested_name.unwrap_or_else(|| default_name(existing_count));
        let now = unix_millis();
        Self {
            id: session_id.to_string(),
            name,
            color: next_color().to_string(),
            cursor: CursorPos::default(),
            joined_at: now,
            last_seen: now,
        }
    }

    pub fn is_active(&self, now: u64) -> bool {
        now.saturating_sub(self.last_seen) < ACTIVE_WINDOW_MS
    }

    /// Snapshot for the wire with `isActive` computed at call time.
    pub fn view(&self, now: u64) -> UserView {
        UserView {
            id: self.id.clone(),
            name: self.name.clone(),
            color: self.color.clone(),
            cursor: self.cursor,
            is_active: self.is_active(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_name_from_pool() {
        assert_eq!(default_name(0), "Alice");
        assert_eq!(default_name(3), "Diana");
        assert_eq!(default_name(11), "Liam");
    }

    #[test]
    fn test_default_name_overflow() {
        assert_eq!(default_name(12), "User 13");
        assert_eq!(default_name(20), "User 21");
    }

    #[test]
    fn test_color_for_index_cycles_palette() {
        assert_eq!(color_for_index(0), USER_COLORS[0]);
        assert_eq!(color_for_index(11), USER_COLORS[11]);
        assert_eq!(color_for_index(12), USER_COLORS[0]);
        assert_eq!(color_for_index(25), USER_COLORS[1]);
    }

    #[test]
    fn test_colors_are_palette_members() {
        for _ in 0..30 {
            assert!(USER_COLORS.contains(&next_color()));
        }
    }

    #[test]
    fn test_allocate_keeps_requested_name() {
        let p = Presence::allocate(Uuid::new_v4(), Some("Zoe".into()), 5);
        assert_eq!(p.name, "Zoe");
    }

    #[test]
    fn test_allocate_pools_name_when_absent() {
        let p = Presence::allocate(Uuid::new_v4(), None, 1);
        assert_eq!(p.name, "Bob");
    }

    #[test]
    fn test_allocate_keeps_empty_name_for_validation() {
        let p = Presence::allocate(Uuid::new_v4(), Some(String::new()), 0);
        assert!(p.name.is_empty());
    }

    #[test]
    fn test_cursor_starts_at_origin() {
        let p = Presence::allocate(Uuid::new_v4(), None, 0);
        assert_eq!(p.cursor, CursorPos::default());
    }

    #[test]
    fn test_is_active_window() {
        let mut p = Presence::allocate(Uuid::new_v4(), None, 0);
        let now = p.last_seen;
        assert!(p.is_active(now));
        assert!(p.is_active(now + ACTIVE_WINDOW_MS - 1));
        assert!(!p.is_active(now + ACTIVE_WINDOW_MS));

        p.last_seen = now + 60_000;
        assert!(p.is_active(now + 60_000));
    }

    #[test]
    fn test_view_snapshot() {
        let id = Uuid::new_v4();
        let p = Presence::allocate(id, Some("Alice".into()), 0);
        let view = p.view(p.last_seen);
        assert_eq!(view.id, id.to_string());
        assert_eq!(view.name, "Alice");
        assert!(view.is_active);
        assert_eq!(view.cursor, CursorPos::default());
    }
}

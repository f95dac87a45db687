//! A room: one shared document, its members, and the bounded log of
//! applied operations.
//!
//! Every mutation happens under the room's lock (owned by the registry);
//! none of the methods here suspend. The validate→apply→publish sequence
//! therefore defines the room's total apply order, and the broadcast
//! channel preserves it per recipient.

use crate::broadcast::BroadcastGroup;
use crate::document::Document;
use crate::presence::Presence;
use crate::protocol::{
    unix_millis, AppliedOperation, CursorPos, Operation, OperationKind, RoomError, RoomStats,
    ServerMessage, UserView,
};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

/// Hard cap on members per room.
pub const MAX_USERS: usize = 10;

/// Applied operations kept per room; older entries are discarded.
pub const HISTORY_LIMIT: usize = 1000;

/// History entries returned by a `document-sync` reply.
pub const SYNC_HISTORY_LIMIT: usize = 50;

/// History entries shown by the `/room/{id}` introspection endpoint.
pub const RECENT_OPS_LIMIT: usize = 10;

/// A room counts as active in its stats while it saw activity in the last
/// five minutes.
pub const ROOM_ACTIVE_WINDOW_MS: u64 = 5 * 60 * 1000;

/// Initial contents of every newly created room.
pub const WELCOME_DOCUMENT: &str = "// Welcome to the collaborative editor!\n// Start typing to see real-time collaboration in action\n\nconsole.log(\"Hello, collaborative world!\");";

/// Result of a successful apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub previous_length: usize,
    pub new_length: usize,
}

pub struct Room {
    id: String,
    document: Document,
    members: HashMap<String, Presence>,
    history: VecDeque<AppliedOperation>,
    created_at: u64,
    last_activity: u64,
    max_users: usize,
    broadcast: Arc<BroadcastGroup>,
}

impl Room {
    pub fn new(id: String, max_users: usize, broadcast_capacity: usize) -> Self {
        let now = unix_millis();
        Self {
            id,
            document: Document::new(WELCOME_DOCUMENT),
            members: HashMap::new(),
            history: VecDeque::new(),
            created_at: now,
            last_activity: now,
            max_users,
            broadcast: Arc::new(BroadcastGroup::new(broadcast_capacity)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn document_text(&self) -> String {
        self.document.text()
    }

    pub fn document_len(&self) -> usize {
        self.document.len()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn contains_member(&self, session_id: &str) -> bool {
        self.members.contains_key(session_id)
    }

    pub fn broadcast(&self) -> &Arc<BroadcastGroup> {
        &self.broadcast
    }

    /// Publish a broadcast in apply order. Call while holding the room
    /// lock; the channel send is synchronous, the socket writes happen in
    /// each member's own task.
    pub fn publish(&self, origin: Option<Uuid>, message: &ServerMessage) {
        self.broadcast.publish(origin, message);
    }

    /// Admit a member. Fails with `RoomFull` at capacity and with
    /// `InvalidUserData` when the presence carries no name or color.
    pub fn add_user(&mut self, mut presence: Presence) -> Result<UserView, RoomError> {
        if self.members.len() >= self.max_users {
            return Err(RoomError::RoomFull);
        }
        if presence.name.trim().is_empty() || presence.color.is_empty() {
            return Err(RoomError::InvalidUserData);
        }
        let now = unix_millis();
        presence.joined_at = now;
        presence.last_seen = now;
        let view = presence.view(now);
        self.members.insert(presence.id.clone(), presence);
        self.last_activity = now;
        Ok(view)
    }

    /// Remove a member. Idempotent; always bumps the activity clock.
    pub fn remove_user(&mut self, session_id: &str) -> Option<Presence> {
        self.last_activity = unix_millis();
        self.members.remove(session_id)
    }

    /// Mark a member as seen now.
    pub fn update_user_activity(&mut self, session_id: &str) {
        if let Some(member) = self.members.get_mut(session_id) {
            member.last_seen = unix_millis();
        }
    }

    /// Store a member's cursor and return their refreshed view.
    pub fn set_cursor(&mut self, session_id: &str, cursor: CursorPos) -> Option<UserView> {
        match self.members.entry(session_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let now = unix_millis();
                let member = entry.get_mut();
                member.cursor = cursor;
                member.last_seen = now;
                Some(member.view(now))
            }
            Entry::Vacant(_) => None,
        }
    }

    pub fn member_name(&self, session_id: &str) -> Option<String> {
        self.members.get(session_id).map(|m| m.name.clone())
    }

    /// The §-style validity predicate over the current document:
    /// position in `0..=len`, inserts non-empty, deletes positive-length
    /// and in-bounds, retains positive-length.
    pub fn validate_operation(&self, op: &Operation) -> bool {
        if op.position < 0 {
            return false;
        }
        let position = op.position as usize;
        let doc_len = self.document.len();
        if position > doc_len {
            return false;
        }
        match &op.kind {
            OperationKind::Insert { content } => !content.is_empty(),
            OperationKind::Delete { length } => {
                *length > 0 && position + *length as usize <= doc_len
            }
            OperationKind::Retain { length } => *length > 0,
        }
    }

    /// Apply a validated operation: mutate the document, log it to the
    /// bounded history, bump the activity clock. The document is left
    /// unchanged on any failure.
    pub fn apply_operation(&mut self, op: Operation) -> Result<ApplyOutcome, RoomError> {
        if !self.validate_operation(&op) {
            return Err(RoomError::InvalidOperation);
        }
        let previous_length = self.document.len();
        let position = op.position as usize;
        match &op.kind {
            OperationKind::Insert { content } => self
                .document
                .insert(position, content)
                .map_err(|_| RoomError::InvalidOperation)?,
            OperationKind::Delete { length } => self
                .document
                .delete(position, *length as usize)
                .map_err(|_| RoomError::InvalidOperation)?,
            OperationKind::Retain { .. } => {}
        }

        let now = unix_millis();
        self.history.push_back(AppliedOperation {
            operation: op,
            applied_at: now,
        });
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.last_activity = now;

        Ok(ApplyOutcome {
            previous_length,
            new_length: self.document.len(),
        })
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// The most recent `limit` history entries, oldest first.
    pub fn recent_operations(&self, limit: usize) -> Vec<AppliedOperation> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Member snapshot with `isActive` computed now.
    pub fn user_list(&self) -> Vec<UserView> {
        let now = unix_millis();
        self.members.values().map(|m| m.view(now)).collect()
    }

    pub fn stats(&self) -> RoomStats {
        let now = unix_millis();
        RoomStats {
            id: self.id.clone(),
            user_count: self.members.len(),
            max_users: self.max_users,
            document_length: self.document.len(),
            operation_count: self.history.len(),
            created_at: self.created_at,
            last_activity: self.last_activity,
            is_active: now.saturating_sub(self.last_activity) < ROOM_ACTIVE_WINDOW_MS,
        }
    }

    /// Empty and idle past the threshold.
    pub fn should_cleanup(&self, idle_ms: u64) -> bool {
        self.members.is_empty() && unix_millis().saturating_sub(self.last_activity) > idle_ms
    }

    #[cfg(test)]
    pub(crate) fn set_last_activity(&mut self, value: u64) {
        self.last_activity = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::Presence;

    fn test_room() -> Room {
        Room::new("ABC123".into(), MAX_USERS, 64)
    }

    fn member(name: &str) -> Presence {
        Presence::allocate(Uuid::new_v4(), Some(name.into()), 0)
    }

    #[test]
    fn test_new_room_has_welcome_document() {
        let room = test_room();
        assert_eq!(room.document_text(), WELCOME_DOCUMENT);
        assert_eq!(room.member_count(), 0);
        assert_eq!(room.history_len(), 0);
    }

    #[test]
    fn test_add_and_remove_user() {
        let mut room = test_room();
        let p = member("Alice");
        let id = p.id.clone();

        let view = room.add_user(p).unwrap();
        assert_eq!(view.name, "Alice");
        assert_eq!(room.member_count(), 1);
        assert!(room.contains_member(&id));

        let removed = room.remove_user(&id).unwrap();
        assert_eq!(removed.name, "Alice");
        assert_eq!(room.member_count(), 0);
    }

    #[test]
    fn test_remove_user_idempotent() {
        let mut room = test_room();
        assert!(room.remove_user("nobody").is_none());
        assert!(room.remove_user("nobody").is_none());
    }

    #[test]
    fn test_room_full() {
        let mut room = test_room();
        for i in 0..MAX_USERS {
            room.add_user(member(&format!("User{i}"))).unwrap();
        }
        let err = room.add_user(member("Overflow")).unwrap_err();
        assert_eq!(err, RoomError::RoomFull);
        assert_eq!(room.member_count(), MAX_USERS);
    }

    #[test]
    fn test_invalid_user_data() {
        let mut room = test_room();
        let err = room.add_user(member("")).unwrap_err();
        assert_eq!(err, RoomError::InvalidUserData);
        let err = room.add_user(member("   ")).unwrap_err();
        assert_eq!(err, RoomError::InvalidUserData);
    }

    #[test]
    fn test_validate_insert_bounds() {
        let room = test_room();
        let len = room.document_len() as i64;
        assert!(room.validate_operation(&Operation::insert(0, "X", "a")));
        assert!(room.validate_operation(&Operation::insert(len, "X", "b")));
        assert!(!room.validate_operation(&Operation::insert(len + 1, "X", "c")));
        assert!(!room.validate_operation(&Operation::insert(-1, "X", "d")));
        assert!(!room.validate_operation(&Operation::insert(0, "", "e")));
    }

    #[test]
    fn test_validate_delete_bounds() {
        let room = test_room();
        let len = room.document_len() as i64;
        assert!(room.validate_operation(&Operation::delete(0, 1, "a")));
        assert!(room.validate_operation(&Operation::delete(0, len, "b")));
        assert!(room.validate_operation(&Operation::delete(len - 1, 1, "c")));
        assert!(!room.validate_operation(&Operation::delete(len, 1, "d")));
        assert!(!room.validate_operation(&Operation::delete(0, len + 1, "e")));
        assert!(!room.validate_operation(&Operation::delete(0, 0, "f")));
    }

    #[test]
    fn test_validate_retain() {
        let room = test_room();
        assert!(room.validate_operation(&Operation::retain(0, 5, "a")));
        assert!(!room.validate_operation(&Operation::retain(0, 0, "b")));
    }

    #[test]
    fn test_apply_insert() {
        let mut room = test_room();
        let before = room.document_len();
        let outcome = room.apply_operation(Operation::insert(0, "X", "op1")).unwrap();
        assert_eq!(outcome.previous_length, before);
        assert_eq!(outcome.new_length, before + 1);
        assert!(room.document_text().starts_with("X// Welcome"));
        assert_eq!(room.history_len(), 1);
    }

    #[test]
    fn test_apply_delete() {
        let mut room = test_room();
        let before = room.document_len();
        let outcome = room.apply_operation(Operation::delete(0, 3, "op1")).unwrap();
        assert_eq!(outcome.new_length, before - 3);
        assert!(room.document_text().starts_with("Welcome"));
    }

    #[test]
    fn test_apply_retain_leaves_document() {
        let mut room = test_room();
        let before = room.document_text();
        let outcome = room.apply_operation(Operation::retain(5, 3, "op1")).unwrap();
        assert_eq!(outcome.previous_length, outcome.new_length);
        assert_eq!(room.document_text(), before);
        assert_eq!(room.history_len(), 1);
    }

    #[test]
    fn test_apply_invalid_leaves_state() {
        let mut room = test_room();
        let before = room.document_text();
        let len = room.document_len() as i64;
        let err = room.apply_operation(Operation::delete(len, 1, "op1")).unwrap_err();
        assert_eq!(err, RoomError::InvalidOperation);
        assert_eq!(room.document_text(), before);
        assert_eq!(room.history_len(), 0);
    }

    #[test]
    fn test_insert_then_delete_roundtrip() {
        let mut room = test_room();
        let original = room.document_text();
        room.apply_operation(Operation::insert(10, "hello", "op1")).unwrap();
        room.apply_operation(Operation::delete(10, 5, "op2")).unwrap();
        assert_eq!(room.document_text(), original);
    }

    #[test]
    fn test_history_ring_bounded() {
        let mut room = test_room();
        for i in 0..(HISTORY_LIMIT + 25) {
            room.apply_operation(Operation::retain(0, 1, format!("op{i}"))).unwrap();
        }
        assert_eq!(room.history_len(), HISTORY_LIMIT);
        // The oldest entries were discarded.
        let recent = room.recent_operations(HISTORY_LIMIT);
        assert_eq!(recent.first().unwrap().operation.id, "op25");
        assert_eq!(
            recent.last().unwrap().operation.id,
            format!("op{}", HISTORY_LIMIT + 24)
        );
    }

    #[test]
    fn test_recent_operations_limit() {
        let mut room = test_room();
        for i in 0..20 {
            room.apply_operation(Operation::retain(0, 1, format!("op{i}"))).unwrap();
        }
        let recent = room.recent_operations(10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].operation.id, "op10");
        assert_eq!(recent[9].operation.id, "op19");
    }

    #[test]
    fn test_set_cursor() {
        let mut room = test_room();
        let p = member("Alice");
        let id = p.id.clone();
        room.add_user(p).unwrap();

        let view = room.set_cursor(&id, CursorPos::new(4, 2)).unwrap();
        assert_eq!(view.cursor, CursorPos::new(4, 2));
        assert!(room.set_cursor("ghost", CursorPos::default()).is_none());
    }

    #[test]
    fn test_stats_shape() {
        let mut room = test_room();
        room.add_user(member("Alice")).unwrap();
        room.apply_operation(Operation::insert(0, "X", "op1")).unwrap();

        let stats = room.stats();
        assert_eq!(stats.id, "ABC123");
        assert_eq!(stats.user_count, 1);
        assert_eq!(stats.max_users, MAX_USERS);
        assert_eq!(stats.document_length, room.document_len());
        assert_eq!(stats.operation_count, 1);
        assert!(stats.is_active);
    }

    #[test]
    fn test_should_cleanup() {
        let idle_ms = 30 * 60 * 1000;
        let mut room = test_room();
        assert!(!room.should_cleanup(idle_ms)); // fresh

        room.set_last_activity(unix_millis() - idle_ms - 1000);
        assert!(room.should_cleanup(idle_ms)); // empty and idle

        room.add_user(member("Alice")).unwrap();
        room.set_last_activity(unix_millis() - idle_ms - 1000);
        assert!(!room.should_cleanup(idle_ms)); // occupied
    }

    #[test]
    fn test_version_proxy_is_history_len() {
        let mut room = test_room();
        assert_eq!(room.history_len(), 0);
        room.apply_operation(Operation::insert(0, "a", "op1")).unwrap();
        room.apply_operation(Operation::insert(0, "b", "op2")).unwrap();
        assert_eq!(room.history_len(), 2);
    }
}

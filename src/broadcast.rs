//! Fan-out to the other members of a room.
//!
//! Each room owns one broadcast channel. Every member's connection task
//! subscribes and receives frames in publish order, which the room makes
//! equal to apply order by publishing while it holds its own lock (the
//! channel send is synchronous and never blocks). Frames carry the
//! originating session id so each receiver can skip its own messages;
//! the actual socket write happens in the receiver's task with no lock
//! held.
//!
//! Reference: Kleppmann, Chapter 8 — Broadcast Protocols

use crate::protocol::ServerMessage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// A pre-encoded frame on a room's channel.
///
/// `origin` is `Some` for member-originated broadcasts (the originator's
/// connection task drops the frame) and `None` for server-originated ones
/// that every subscriber should receive.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    pub origin: Option<Uuid>,
    pub payload: Arc<String>,
}

/// Snapshot of a group's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_lagged: u64,
}

/// Counters kept in atomics so publishing never takes a lock.
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_lagged: AtomicU64,
}

/// The fan-out channel for a single room.
pub struct BroadcastGroup {
    sender: broadcast::Sender<OutboundFrame>,
    capacity: usize,
    stats: AtomicBroadcastStats,
}

impl BroadcastGroup {
    /// `capacity` bounds how many frames a slow receiver may buffer before
    /// it starts lagging and dropping the oldest.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            stats: AtomicBroadcastStats {
                messages_sent: AtomicU64::new(0),
                messages_lagged: AtomicU64::new(0),
            },
        }
    }

    /// Subscribe a member's connection task. Frames published after this
    /// call are delivered FIFO.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundFrame> {
        self.sender.subscribe()
    }

    /// Publish a message to every subscriber except (by receiver-side
    /// filtering) the originator. Returns the subscriber count.
    pub fn publish(&self, origin: Option<Uuid>, message: &ServerMessage) -> usize {
        let frame = OutboundFrame {
            origin,
            payload: Arc::new(message.encode()),
        };
        let count = self.sender.send(frame).unwrap_or(0);
        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Record that a receiver lagged and dropped frames.
    pub fn note_lagged(&self, dropped: u64) {
        self.stats.messages_lagged.fetch_add(dropped, Ordering::Relaxed);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            messages_lagged: self.stats.messages_lagged.load(Ordering::Relaxed),
        }
    }
}

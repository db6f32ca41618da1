//! Event system for TripAI
//!
//! Provides the sync progress events and the EventBus that carries them.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted while the pending queue is drained
///
/// Per drain: one `DrainStarted`, then one `ItemStarted` per queued item
/// (with `current` counting 1..=total) followed by either `ItemSynced` or
/// `ItemFailed`, then exactly one `DrainCompleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A drain took its snapshot of the queue
    DrainStarted {
        total: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An item is about to be analyzed
    ItemStarted {
        /// 1-based position in the snapshot
        current: usize,
        total: usize,
        pending_id: Uuid,
    },

    /// An item was analyzed and its placeholder reconciled
    ItemSynced {
        pending_id: Uuid,
        server_id: i64,
        name: String,
    },

    /// An item failed and stays queued for the next drain
    ItemFailed { pending_id: Uuid, reason: String },

    /// The drain finished; emitted exactly once per drain
    DrainCompleted {
        success_count: usize,
        fail_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Central event distribution bus
///
/// Wraps `tokio::sync::broadcast`:
/// - Non-blocking publish (slow subscribers don't block the drain)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use tripai_common::events::{EventBus, SyncEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SyncEvent::DrainStarted {
///     total: 0,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(SyncEvent::DrainStarted { total: 0, .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}

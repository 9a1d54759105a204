//! Engine event system for dataset, selection and connection notifications.
//!
//! Events are a side channel for observers (loggers, dashboards that want to
//! redraw on change). The authoritative state is always the engine itself;
//! a lagging receiver only misses notifications, never data.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use nodewatch_types::NodeId;

/// Events emitted by an [`Engine`](crate::Engine).
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum EngineEvent {
    /// A new snapshot replaced the dataset.
    SnapshotApplied {
        /// Store revision after the update.
        revision: u64,
        /// Number of nodes in the new snapshot.
        node_count: usize,
    },
    /// The selected node changed.
    SelectionChanged {
        /// Newly selected node id.
        node_id: NodeId,
        /// Whether the node is present in the current dataset.
        present: bool,
    },
    /// The remote source reported a failure. The dataset is unchanged.
    ConnectionError {
        /// Human-readable error.
        error: String,
    },
    /// The engine was disposed.
    Stopped,
}

/// Sender for engine events.
pub type EventSender = broadcast::Sender<EngineEvent>;

/// Receiver for engine events.
pub type EventReceiver = broadcast::Receiver<EngineEvent>;

/// Fan-out of engine events to any number of receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: EngineEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

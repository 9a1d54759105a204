//! The synchronization engine and its selection interface.
//!
//! [`Engine`] subscribes once to the node collection of a [`RemoteSource`],
//! keeps the latest snapshot in a [`SnapshotStore`] and answers selection
//! queries by lookup. Changing the selected node never touches the
//! subscription.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nodewatch_core::{ConnectionStatus, Engine, EngineOptions, MockSource};
//! use serde_json::json;
//!
//! let source = Arc::new(MockSource::new());
//! let engine = Engine::start(source.clone(), EngineOptions::default()).unwrap();
//! assert_eq!(engine.status(), ConnectionStatus::Connecting);
//!
//! source.push(json!({
//!     "greenhouse": { "temp": 21.5, "dateTime": "01-06-24 10:00:00" },
//!     "cellar": { "temp": 12.0 }
//! }));
//! engine.select_node("greenhouse").unwrap();
//! assert_eq!(engine.selected().unwrap().temperature, Some(21.5));
//!
//! // The next push updates the selected record without re-selecting.
//! source.push(json!({ "greenhouse": { "temp": 22.0 } }));
//! assert_eq!(engine.selected().unwrap().temperature, Some(22.0));
//! assert_eq!(source.subscribe_calls(), 1);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use nodewatch_types::{DatasetSnapshot, NodeId, ResolvedView, TelemetryRecord};

use crate::display::NodeView;
use crate::error::{Error, Result};
use crate::events::{EngineEvent, EventDispatcher, EventReceiver};
use crate::store::{SelectionPolicy, SnapshotStore};
use crate::subscription::{RemoteSource, SubscriptionController};
use crate::timestamp::Locale;

/// Default database path of the node collection.
pub const DEFAULT_PATH: &str = "nodes";

/// Options for [`Engine::start`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Path of the node collection in the remote source.
    /// Default: `"nodes"`.
    pub path: String,
    /// How selecting an unknown node id is handled.
    pub policy: SelectionPolicy,
    /// Locale for display values.
    pub locale: Locale,
    /// Node selected before any data arrives. Applied regardless of `policy`.
    pub initial_selection: Option<NodeId>,
    /// Capacity of the event broadcast channel.
    /// Default: 100.
    pub event_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            path: DEFAULT_PATH.to_string(),
            policy: SelectionPolicy::default(),
            locale: Locale::default(),
            initial_selection: None,
            event_capacity: 100,
        }
    }
}

impl EngineOptions {
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    #[must_use]
    pub fn initial_selection(mut self, id: impl Into<NodeId>) -> Self {
        self.initial_selection = Some(id.into());
        self
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.path.trim_matches('/').is_empty() {
            return Err(Error::invalid_config("path must not be empty"));
        }
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be > 0"));
        }
        Ok(())
    }
}

/// Health of the live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Subscribed, no data received yet.
    Connecting,
    /// The last delivery was a valid snapshot.
    Live,
    /// The source reported an error. Data shown is the last good snapshot.
    Offline { error: String },
    /// The engine was disposed.
    Stopped,
}

impl ConnectionStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionStatus::Live)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Live => write!(f, "live"),
            ConnectionStatus::Offline { error } => write!(f, "offline ({error})"),
            ConnectionStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Read and select nodes. This is what presentation code depends on.
pub trait NodeSelection {
    /// Ids of all nodes in the current snapshot, sorted.
    fn node_ids(&self) -> Vec<NodeId>;

    /// The selected node's record in the current snapshot.
    fn selected(&self) -> Option<TelemetryRecord>;

    /// Select a node by id.
    fn select_node(&self, id: &str) -> Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared with the subscription callbacks.
struct Shared {
    store: Mutex<SnapshotStore>,
    status: watch::Sender<ConnectionStatus>,
    events: EventDispatcher,
}

impl Shared {
    fn on_snapshot(&self, snapshot: DatasetSnapshot) {
        let node_count = snapshot.len();
        let revision = {
            let mut store = lock(&self.store);
            store.apply_snapshot(snapshot);
            store.revision()
        };
        debug!("Applied snapshot revision {} with {} nodes", revision, node_count);

        self.status.send_if_modified(|status| {
            if status.is_live() {
                false
            } else {
                *status = ConnectionStatus::Live;
                true
            }
        });
        self.events.send(EngineEvent::SnapshotApplied {
            revision,
            node_count,
        });
    }

    fn on_error(&self, error: Error) {
        warn!("Keeping last snapshot after source error: {}", error);
        let message = error.to_string();
        self.status.send_replace(ConnectionStatus::Offline {
            error: message.clone(),
        });
        self.events.send(EngineEvent::ConnectionError { error: message });
    }
}

/// Live node telemetry engine.
///
/// All updates to the dataset and the selection go through one mutex, so
/// pushes and selection changes are applied one at a time in the order they
/// happen. No method blocks on I/O.
///
/// Dropping the engine disposes it.
pub struct Engine {
    shared: Arc<Shared>,
    controller: SubscriptionController,
    locale: Locale,
    stopped: AtomicBool,
}

impl Engine {
    /// Subscribe to `options.path` on `source` and start tracking it.
    ///
    /// This is the only place the engine subscribes. Pushes are applied as
    /// they arrive on whatever thread the source delivers them.
    pub fn start<S>(source: S, options: EngineOptions) -> Result<Self>
    where
        S: RemoteSource + 'static,
    {
        options.validate()?;

        let mut store = SnapshotStore::with_policy(options.policy);
        if let Some(id) = &options.initial_selection {
            store.preselect(id);
        }
        let (status, _) = watch::channel(ConnectionStatus::Connecting);
        let shared = Arc::new(Shared {
            store: Mutex::new(store),
            status,
            events: EventDispatcher::new(options.event_capacity),
        });

        let controller = SubscriptionController::new(Arc::new(source), options.path);

        // Callbacks hold a weak reference so a transport that never lets go
        // of its listener does not keep the engine state alive.
        let on_update: Weak<Shared> = Arc::downgrade(&shared);
        let on_error: Weak<Shared> = Arc::downgrade(&shared);
        controller.start(
            move |snapshot| {
                if let Some(shared) = on_update.upgrade() {
                    shared.on_snapshot(snapshot);
                }
            },
            move |error| {
                if let Some(shared) = on_error.upgrade() {
                    shared.on_error(error);
                }
            },
        )?;

        info!("Engine started on {}", controller.description());
        Ok(Self {
            shared,
            controller,
            locale: options.locale,
            stopped: AtomicBool::new(false),
        })
    }

    fn ensure_running(&self) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(Error::Stopped);
        }
        Ok(())
    }

    /// Ids of all nodes in the current snapshot, sorted.
    pub fn node_ids(&self) -> Vec<NodeId> {
        lock(&self.shared.store).list_ids()
    }

    /// The selected node's record in the current snapshot.
    pub fn selected(&self) -> Option<TelemetryRecord> {
        lock(&self.shared.store).current_selection().cloned()
    }

    /// Select a node by id. See [`SelectionPolicy`] for unknown ids.
    ///
    /// Returns [`Error::Stopped`] after [`dispose`](Self::dispose).
    pub fn select_node(&self, id: &str) -> Result<()> {
        self.ensure_running()?;
        let present = {
            let mut store = lock(&self.shared.store);
            store.select(id)?;
            store.current_selection().is_some()
        };

        debug!("Selected node '{}' (present: {})", id, present);
        self.shared.events.send(EngineEvent::SelectionChanged {
            node_id: id.to_string(),
            present,
        });
        Ok(())
    }

    /// The selected node id, whether or not it is in the current snapshot.
    pub fn selected_id(&self) -> Option<NodeId> {
        lock(&self.shared.store).selected_id().map(str::to_string)
    }

    /// Node ids and the selected record, read under one lock.
    pub fn resolved_view(&self) -> ResolvedView {
        lock(&self.shared.store).resolved_view()
    }

    /// Display values for the selected node.
    pub fn selected_view(&self, now: OffsetDateTime) -> Option<NodeView> {
        let store = lock(&self.shared.store);
        let id = store.selected_id()?;
        let record = store.current_selection()?;
        Some(NodeView::from_record(id, record, now, self.locale))
    }

    /// Display values for every node, in id order.
    pub fn node_views(&self, now: OffsetDateTime) -> Vec<NodeView> {
        let store = lock(&self.shared.store);
        store
            .dataset()
            .iter()
            .map(|(id, record)| NodeView::from_record(id, record, now, self.locale))
            .collect()
    }

    /// A copy of the current snapshot.
    pub fn dataset(&self) -> DatasetSnapshot {
        lock(&self.shared.store).dataset().clone()
    }

    /// Number of snapshots applied so far.
    pub fn revision(&self) -> u64 {
        lock(&self.shared.store).revision()
    }

    /// When the last snapshot was applied.
    pub fn last_updated(&self) -> Option<OffsetDateTime> {
        lock(&self.shared.store).last_updated()
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Subscribe to engine events.
    pub fn subscribe_events(&self) -> EventReceiver {
        self.shared.events.subscribe()
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Source and path, for logs and status lines.
    pub fn description(&self) -> String {
        self.controller.description()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stop the subscription and clear all state.
    ///
    /// Synchronous and idempotent. Once this returns, no push from the
    /// source reaches the engine, even if the transport ignores the
    /// unsubscribe.
    pub fn dispose(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        self.controller.stop_active();
        lock(&self.shared.store).clear();
        self.shared.status.send_replace(ConnectionStatus::Stopped);
        self.shared.events.send(EngineEvent::Stopped);
        info!("Engine on {} stopped", self.controller.description());
    }
}

impl NodeSelection for Engine {
    fn node_ids(&self) -> Vec<NodeId> {
        Engine::node_ids(self)
    }

    fn selected(&self) -> Option<TelemetryRecord> {
        Engine::selected(self)
    }

    fn select_node(&self, id: &str) -> Result<()> {
        Engine::select_node(self, id)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("source", &self.controller.description())
            .field("status", &self.status())
            .field("revision", &self.revision())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::source::MockSource;
    use serde_json::json;
    use time::macros::datetime;

    fn started() -> (Arc<MockSource>, Engine) {
        let source = Arc::new(MockSource::new());
        let engine = Engine::start(source.clone(), EngineOptions::default()).unwrap();
        (source, engine)
    }

    #[test]
    fn test_start_subscribes_once_at_default_path() {
        let (source, engine) = started();
        assert_eq!(source.subscribe_calls(), 1);
        assert_eq!(source.subscribed_paths(), vec!["nodes".to_string()]);
        assert_eq!(engine.status(), ConnectionStatus::Connecting);
        assert_eq!(engine.description(), "mock source at 'nodes'");
    }

    #[test]
    fn test_options_validate() {
        assert!(EngineOptions::default().validate().is_ok());
        assert!(EngineOptions::default().path("/").validate().is_err());

        let options = EngineOptions {
            event_capacity: 0,
            ..EngineOptions::default()
        };
        assert!(matches!(options.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_start_fails_when_source_rejects() {
        let source = Arc::new(MockSource::new());
        source.reject_subscriptions(true);
        let result = Engine::start(source, EngineOptions::default());
        assert!(matches!(result, Err(Error::Connection(_))));
    }

    #[test]
    fn test_push_makes_status_live() {
        let (source, engine) = started();
        source.push(json!({ "a": { "temp": 1 } }));
        assert_eq!(engine.status(), ConnectionStatus::Live);
        assert_eq!(engine.revision(), 1);
        assert!(engine.last_updated().is_some());
    }

    #[test]
    fn test_error_keeps_dataset() {
        let (source, engine) = started();
        source.push(json!({ "a": { "temp": 1 } }));
        engine.select_node("a").unwrap();

        source.fail(TransportError::Http("network down".to_string()));
        assert!(matches!(engine.status(), ConnectionStatus::Offline { .. }));
        assert_eq!(engine.node_ids(), vec!["a".to_string()]);
        assert_eq!(engine.selected().unwrap().temperature, Some(1.0));

        source.push(json!({ "a": { "temp": 2 } }));
        assert!(engine.status().is_live());
    }

    #[test]
    fn test_initial_selection() {
        let source = Arc::new(MockSource::new());
        let engine =
            Engine::start(source.clone(), EngineOptions::default().initial_selection("b")).unwrap();
        assert_eq!(engine.selected_id().as_deref(), Some("b"));
        assert!(engine.selected().is_none());

        source.push(json!({ "b": { "hum": 40 } }));
        assert_eq!(engine.selected().unwrap().humidity, Some(40.0));
    }

    #[test]
    fn test_selected_view() {
        let (source, engine) = started();
        source.push(json!({ "north": { "temp": 18.5, "dateTime": "01-06-24 10:00:00" } }));
        assert!(engine.selected_view(datetime!(2024-06-01 12:00:00 UTC)).is_none());

        engine.select_node("north").unwrap();
        let view = engine
            .selected_view(datetime!(2024-06-01 12:00:00 UTC))
            .unwrap();
        assert_eq!(view.title, "Node North");
        assert_eq!(view.temperature, "18.5 °C");
        assert_eq!(view.humidity, "N/A");
        assert_eq!(view.last_sync.relative, "2 h ago");
    }

    #[test]
    fn test_node_views_in_id_order() {
        let (source, engine) = started();
        source.push(json!({ "b": {}, "a": {} }));
        let views = engine.node_views(OffsetDateTime::UNIX_EPOCH);
        let ids: Vec<_> = views.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_dispose_stops_and_clears() {
        let (source, engine) = started();
        source.push(json!({ "a": {} }));
        engine.select_node("a").unwrap();

        engine.dispose();
        assert!(engine.is_stopped());
        assert_eq!(engine.status(), ConnectionStatus::Stopped);
        assert!(engine.node_ids().is_empty());
        assert!(engine.selected_id().is_none());
        assert_eq!(source.subscriber_count(), 0);
        assert!(matches!(engine.select_node("a"), Err(Error::Stopped)));

        // Idempotent.
        engine.dispose();
    }

    #[test]
    fn test_drop_unsubscribes() {
        let (source, engine) = started();
        drop(engine);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_events() {
        let (source, engine) = started();
        let mut events = engine.subscribe_events();

        source.push(json!({ "a": {} }));
        engine.select_node("a").unwrap();
        source.fail(TransportError::Closed);
        engine.dispose();

        assert_eq!(
            events.recv().await.unwrap(),
            EngineEvent::SnapshotApplied {
                revision: 1,
                node_count: 1
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            EngineEvent::SelectionChanged {
                node_id: "a".to_string(),
                present: true
            }
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            EngineEvent::ConnectionError { .. }
        ));
        assert_eq!(events.recv().await.unwrap(), EngineEvent::Stopped);
    }

    #[tokio::test]
    async fn test_watch_status() {
        let (source, engine) = started();
        let mut status = engine.watch_status();
        assert_eq!(*status.borrow(), ConnectionStatus::Connecting);

        source.push(json!({}));
        status.changed().await.unwrap();
        assert_eq!(*status.borrow_and_update(), ConnectionStatus::Live);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConnectionStatus::Live.to_string(), "live");
        let offline = ConnectionStatus::Offline {
            error: "Connection error: Stream closed by server".to_string(),
        };
        assert_eq!(
            offline.to_string(),
            "offline (Connection error: Stream closed by server)"
        );
        let json = serde_json::to_string(&offline).unwrap();
        assert!(json.contains("\"state\":\"offline\""));
    }
}

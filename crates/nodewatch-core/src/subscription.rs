//! Lifecycle of the single live subscription to the remote node collection.
//!
//! A [`RemoteSource`] pushes the entire value at a path every time anything
//! under it changes. [`SubscriptionController`] owns at most one such
//! subscription, decodes each push into a [`DatasetSnapshot`] and hands it to
//! the caller's update callback.
//!
//! # Delivery guarantees
//!
//! - Each push is delivered at most once, in the order the transport
//!   produced them, and one delivery runs to completion before the next
//!   starts.
//! - [`SubscriptionController::stop`] is immediate: once it returns, no
//!   callback of that subscription runs again, even if the transport keeps
//!   firing after being told to unsubscribe.
//! - Failures are reported to the error callback and never retried here.
//!
//! Callbacks must not call [`SubscriptionController::start`] on the same
//! controller; they may call [`SubscriptionController::stop`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use serde_json::Value;
use tracing::{debug, info, warn};

use nodewatch_types::DatasetSnapshot;

use crate::error::{Error, Result, TransportError};

/// One delivery from a transport: the whole value at the path, or a failure.
pub type Push = std::result::Result<Value, TransportError>;

/// Callback a [`RemoteSource`] invokes with every [`Push`].
pub type Listener = Arc<dyn Fn(Push) + Send + Sync>;

/// A realtime data source that pushes whole values at a path.
///
/// Implementations must invoke the listener with the complete current value
/// at `path` whenever it changes, and may invoke it with an error when the
/// transport fails. They are free to keep invoking the listener after
/// unsubscribing; the controller guards against that.
pub trait RemoteSource: Send + Sync {
    /// Start pushing the value at `path` to `listener`.
    fn subscribe(&self, path: &str, listener: Listener) -> Result<Unsubscribe>;

    /// Short human-readable description, used in logs.
    fn description(&self) -> String {
        "remote source".to_string()
    }
}

impl<S: RemoteSource + ?Sized> RemoteSource for Arc<S> {
    fn subscribe(&self, path: &str, listener: Listener) -> Result<Unsubscribe> {
        (**self).subscribe(path, listener)
    }

    fn description(&self) -> String {
        (**self).description()
    }
}

/// Releases a transport subscription.
///
/// Runs the release action at most once, either through
/// [`unsubscribe`](Self::unsubscribe) or on drop.
pub struct Unsubscribe(Option<Box<dyn FnOnce() + Send>>);

impl Unsubscribe {
    /// Wrap a release action.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(release)))
    }

    /// A release action that does nothing.
    pub fn noop() -> Self {
        Self(None)
    }

    /// Release the subscription now.
    pub fn unsubscribe(mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Unsubscribe")
            .field(&if self.0.is_some() { "pending" } else { "released" })
            .finish()
    }
}

/// Identifies one started subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-subscription delivery gate.
///
/// Deliveries hold `delivery` while the callback runs, so closing the gate
/// waits for an in-flight delivery and every later one sees `open == false`.
struct Gate {
    open: AtomicBool,
    delivery: Mutex<()>,
    delivering_on: Mutex<Option<ThreadId>>,
}

impl Gate {
    fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            delivery: Mutex::new(()),
            delivering_on: Mutex::new(None),
        }
    }

    fn deliver(&self, callback: impl FnOnce()) -> bool {
        if !self.open.load(Ordering::Acquire) {
            return false;
        }
        let _delivery = lock(&self.delivery);
        if !self.open.load(Ordering::Acquire) {
            return false;
        }

        *lock(&self.delivering_on) = Some(thread::current().id());
        callback();
        *lock(&self.delivering_on) = None;
        true
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);

        // Closed from inside a callback: the delivery lock is ours already.
        if *lock(&self.delivering_on) == Some(thread::current().id()) {
            return;
        }
        drop(lock(&self.delivery));
    }
}

struct ActiveSubscription {
    handle: SubscriptionHandle,
    gate: Arc<Gate>,
    unsubscribe: Unsubscribe,
}

impl ActiveSubscription {
    fn shut_down(self) {
        self.gate.close();
        self.unsubscribe.unsubscribe();
    }
}

/// Owns the live subscription to one path of a [`RemoteSource`].
pub struct SubscriptionController {
    source: Arc<dyn RemoteSource>,
    path: String,
    active: Mutex<Option<ActiveSubscription>>,
    next_id: AtomicU64,
}

impl SubscriptionController {
    /// Create a controller for `path` on `source`. Nothing is subscribed yet.
    pub fn new(source: Arc<dyn RemoteSource>, path: impl Into<String>) -> Self {
        Self {
            source,
            path: path.into(),
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe and start delivering decoded snapshots.
    ///
    /// `on_update` receives every push that decodes into a dataset.
    /// `on_error` receives [`Error::Connection`] for transport failures and
    /// [`Error::InvalidPayload`] for pushes that are not a dataset.
    ///
    /// If a subscription is already active it is stopped first and replaced.
    pub fn start<U, E>(&self, on_update: U, on_error: E) -> Result<SubscriptionHandle>
    where
        U: Fn(DatasetSnapshot) + Send + Sync + 'static,
        E: Fn(Error) + Send + Sync + 'static,
    {
        let previous = lock(&self.active).take();
        if let Some(previous) = previous {
            info!(
                "Replacing subscription {} on {}",
                previous.handle.id(),
                self.description()
            );
            previous.shut_down();
        }

        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let gate = Arc::new(Gate::new());
        let listener_gate = Arc::clone(&gate);
        let path = self.path.clone();

        let listener: Listener = Arc::new(move |pushed: Push| {
            let delivered = listener_gate.deliver(|| match pushed {
                Ok(value) => match DatasetSnapshot::from_value(value) {
                    Ok(snapshot) => {
                        debug!("Delivering {} nodes from '{}'", snapshot.len(), path);
                        on_update(snapshot);
                    }
                    Err(e) => {
                        warn!("Discarding push from '{}': {}", path, e);
                        on_error(Error::InvalidPayload(e));
                    }
                },
                Err(e) => {
                    warn!("Transport error on '{}': {}", path, e);
                    on_error(Error::Connection(e));
                }
            });
            if !delivered {
                debug!("Dropped push for stopped subscription {}", handle.id());
            }
        });

        let unsubscribe = match self.source.subscribe(&self.path, listener) {
            Ok(unsubscribe) => unsubscribe,
            Err(e) => {
                gate.close();
                return Err(e);
            }
        };

        let displaced = lock(&self.active).replace(ActiveSubscription {
            handle,
            gate,
            unsubscribe,
        });
        if let Some(displaced) = displaced {
            displaced.shut_down();
        }

        info!("Subscribed to {} (subscription {})", self.description(), handle.id());
        Ok(handle)
    }

    /// Stop the subscription identified by `handle`.
    ///
    /// Returns `false` if `handle` is not the active subscription (already
    /// stopped or replaced).
    pub fn stop(&self, handle: SubscriptionHandle) -> bool {
        let stopped = {
            let mut active = lock(&self.active);
            match active.as_ref() {
                Some(current) if current.handle == handle => active.take(),
                _ => None,
            }
        };

        match stopped {
            Some(subscription) => {
                subscription.shut_down();
                info!("Stopped subscription {} on {}", handle.id(), self.description());
                true
            }
            None => false,
        }
    }

    /// Stop whatever subscription is active. Returns `false` if none was.
    pub fn stop_active(&self) -> bool {
        let stopped = lock(&self.active).take();
        match stopped {
            Some(subscription) => {
                let handle = subscription.handle;
                subscription.shut_down();
                info!("Stopped subscription {} on {}", handle.id(), self.description());
                true
            }
            None => false,
        }
    }

    /// Whether a subscription is currently active.
    pub fn is_active(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Handle of the active subscription, if any.
    pub fn active_handle(&self) -> Option<SubscriptionHandle> {
        lock(&self.active).as_ref().map(|a| a.handle)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Source and path, for logs.
    pub fn description(&self) -> String {
        format!("{} at '{}'", self.source.description(), self.path)
    }
}

impl Drop for SubscriptionController {
    fn drop(&mut self) {
        let active = self.active.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(subscription) = active.take() {
            subscription.shut_down();
        }
    }
}

impl fmt::Debug for SubscriptionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionController")
            .field("source", &self.source.description())
            .field("path", &self.path)
            .field("active", &self.active_handle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockSource;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn collecting() -> (
        Arc<Mutex<Vec<DatasetSnapshot>>>,
        impl Fn(DatasetSnapshot) + Send + Sync + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |snapshot| sink.lock().unwrap().push(snapshot))
    }

    fn counting_errors() -> (Arc<AtomicUsize>, impl Fn(Error) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        (count, move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_start_delivers_decoded_snapshots() {
        let source = Arc::new(MockSource::new());
        let controller = SubscriptionController::new(source.clone(), "nodes");
        let (seen, on_update) = collecting();
        let (errors, on_error) = counting_errors();

        controller.start(on_update, on_error).unwrap();
        assert!(controller.is_active());
        assert_eq!(source.subscriber_count(), 1);

        source.push(json!({ "a": { "temp": 21.5 } }));
        source.push(json!({ "b": { "temp": 19.0 } }));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].ids(), vec!["a".to_string()]);
        assert_eq!(seen[1].ids(), vec!["b".to_string()]);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_errors_are_reported() {
        let source = Arc::new(MockSource::new());
        let controller = SubscriptionController::new(source.clone(), "nodes");
        let (seen, on_update) = collecting();
        let (errors, on_error) = counting_errors();
        controller.start(on_update, on_error).unwrap();

        source.fail(TransportError::Http("connection reset".to_string()));
        source.push(json!("not a dataset"));

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(errors.load(Ordering::SeqCst), 2);
        assert!(controller.is_active());
    }

    #[test]
    fn test_stop_is_immediate_even_if_transport_ignores_it() {
        let source = Arc::new(MockSource::ignoring_unsubscribe());
        let controller = SubscriptionController::new(source.clone(), "nodes");
        let (seen, on_update) = collecting();
        let (errors, on_error) = counting_errors();

        let handle = controller.start(on_update, on_error).unwrap();
        source.push(json!({ "a": {} }));
        assert!(controller.stop(handle));
        assert!(!controller.is_active());

        // The transport still has the listener, but nothing gets through.
        assert_eq!(source.subscriber_count(), 1);
        source.push(json!({ "b": {} }));
        source.fail(TransportError::Closed);

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stop_releases_transport_subscription() {
        let source = Arc::new(MockSource::new());
        let controller = SubscriptionController::new(source.clone(), "nodes");
        let handle = controller.start(|_| {}, |_| {}).unwrap();

        assert!(controller.stop(handle));
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn test_stale_handle_is_noop() {
        let source = Arc::new(MockSource::new());
        let controller = SubscriptionController::new(source.clone(), "nodes");
        let handle = controller.start(|_| {}, |_| {}).unwrap();

        assert!(controller.stop(handle));
        assert!(!controller.stop(handle));
        assert!(!controller.stop_active());
    }

    #[test]
    fn test_start_replaces_active_subscription() {
        let source = Arc::new(MockSource::new());
        let controller = SubscriptionController::new(source.clone(), "nodes");
        let (first_seen, first_update) = collecting();
        let (second_seen, second_update) = collecting();

        let first = controller.start(first_update, |_| {}).unwrap();
        let second = controller.start(second_update, |_| {}).unwrap();
        assert_ne!(first, second);
        assert_eq!(controller.active_handle(), Some(second));
        assert_eq!(source.subscriber_count(), 1);

        source.push(json!({ "a": {} }));
        assert!(first_seen.lock().unwrap().is_empty());
        assert_eq!(second_seen.lock().unwrap().len(), 1);

        // The replaced handle is stale now.
        assert!(!controller.stop(first));
        assert!(controller.is_active());
    }

    #[test]
    fn test_subscribe_failure_leaves_controller_idle() {
        let source = Arc::new(MockSource::new());
        source.reject_subscriptions(true);
        let controller = SubscriptionController::new(source.clone(), "nodes");

        let result = controller.start(|_| {}, |_| {});
        assert!(result.is_err());
        assert!(!controller.is_active());
    }

    #[test]
    fn test_stop_from_inside_callback() {
        let source = Arc::new(MockSource::new());
        let controller = Arc::new(SubscriptionController::new(source.clone(), "nodes"));
        let calls = Arc::new(AtomicUsize::new(0));

        let inner = Arc::clone(&controller);
        let counter = Arc::clone(&calls);
        controller
            .start(
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    inner.stop_active();
                },
                |_| {},
            )
            .unwrap();

        source.push(json!({}));
        source.push(json!({}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!controller.is_active());
    }

    #[test]
    fn test_drop_releases_subscription() {
        let source = Arc::new(MockSource::new());
        {
            let controller = SubscriptionController::new(source.clone(), "nodes");
            controller.start(|_| {}, |_| {}).unwrap();
            assert_eq!(source.subscriber_count(), 1);
        }
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn test_description() {
        let controller = SubscriptionController::new(Arc::new(MockSource::new()), "nodes");
        assert_eq!(controller.description(), "mock source at 'nodes'");
        assert_eq!(controller.path(), "nodes");
    }

    #[test]
    fn test_unsubscribe_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let unsubscribe = Unsubscribe::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        unsubscribe.unsubscribe();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let counter = Arc::clone(&count);
        drop(Unsubscribe::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}

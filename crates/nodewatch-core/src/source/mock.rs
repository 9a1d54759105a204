//! In-memory remote source for testing.
//!
//! [`MockSource`] behaves like a realtime database path: every push replaces
//! the stored value and is delivered to all listeners, and a new subscriber
//! immediately receives the stored value if there is one.
//!
//! # Features
//!
//! - **Failure injection**: deliver transport errors with [`MockSource::fail`]
//!   or refuse new subscriptions with [`MockSource::reject_subscriptions`]
//! - **Misbehaving transports**: [`MockSource::ignoring_unsubscribe`] keeps
//!   listeners registered after they unsubscribe
//! - **Call counting**: [`MockSource::subscribe_calls`] for asserting that
//!   consumers subscribe only once

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::error::{Error, Result, TransportError};
use crate::subscription::{Listener, RemoteSource, Unsubscribe};

type Listeners = Arc<Mutex<Vec<(u64, Listener)>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mock remote source.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use nodewatch_core::{Engine, EngineOptions, MockSource};
/// use serde_json::json;
///
/// let source = Arc::new(MockSource::new());
/// let engine = Engine::start(source.clone(), EngineOptions::default()).unwrap();
///
/// source.push(json!({ "a": { "temp": 21.5 } }));
/// assert_eq!(engine.node_ids(), vec!["a".to_string()]);
/// ```
#[derive(Default)]
pub struct MockSource {
    listeners: Listeners,
    current: Mutex<Option<Value>>,
    next_id: AtomicU64,
    ignore_unsubscribe: bool,
    reject: AtomicBool,
    subscribe_calls: AtomicUsize,
    paths: Mutex<Vec<String>>,
}

impl std::fmt::Debug for MockSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSource")
            .field("subscribers", &self.subscriber_count())
            .field("ignore_unsubscribe", &self.ignore_unsubscribe)
            .finish()
    }
}

impl MockSource {
    /// Create an empty mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock source that already holds a value.
    pub fn with_value(value: Value) -> Self {
        let source = Self::new();
        *lock(&source.current) = Some(value);
        source
    }

    /// Create a mock source whose unsubscribe does nothing, so listeners
    /// keep receiving pushes after they unsubscribe.
    pub fn ignoring_unsubscribe() -> Self {
        Self {
            ignore_unsubscribe: true,
            ..Self::default()
        }
    }

    /// Replace the stored value and deliver it to every listener.
    pub fn push(&self, value: Value) {
        *lock(&self.current) = Some(value.clone());
        for listener in self.snapshot_listeners() {
            listener(Ok(value.clone()));
        }
    }

    /// Deliver a transport failure to every listener. The stored value is kept.
    pub fn fail(&self, error: TransportError) {
        for listener in self.snapshot_listeners() {
            listener(Err(error.clone()));
        }
    }

    /// Make subsequent [`subscribe`](RemoteSource::subscribe) calls fail.
    pub fn reject_subscriptions(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Number of listeners currently registered.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Total number of successful `subscribe` calls so far.
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Paths passed to `subscribe`, in call order.
    pub fn subscribed_paths(&self) -> Vec<String> {
        lock(&self.paths).clone()
    }

    // Listeners are called without holding the lock so they may unsubscribe.
    fn snapshot_listeners(&self) -> Vec<Listener> {
        lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

impl RemoteSource for MockSource {
    fn subscribe(&self, path: &str, listener: Listener) -> Result<Unsubscribe> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(Error::Connection(TransportError::Http(
                "mock source rejected subscription".to_string(),
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.listeners).push((id, Arc::clone(&listener)));
        lock(&self.paths).push(path.to_string());
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);

        let current = lock(&self.current).clone();
        if let Some(value) = current {
            listener(Ok(value));
        }

        if self.ignore_unsubscribe {
            return Ok(Unsubscribe::noop());
        }
        let listeners = Arc::clone(&self.listeners);
        Ok(Unsubscribe::new(move || {
            lock(&listeners).retain(|(registered, _)| *registered != id);
        }))
    }

    fn description(&self) -> String {
        "mock source".to_string()
    }
}

//! File-based remote source.
//!
//! Polls a JSON document on disk and pushes it whenever its modification
//! time changes. Useful for demos and for replaying exported database dumps.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde_json::Value;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result, TransportError};
use crate::subscription::{Listener, RemoteSource, Unsubscribe};

/// Options for [`FileSource`].
#[derive(Debug, Clone)]
pub struct FileSourceOptions {
    /// How often the file's modification time is checked.
    /// Default: 1 second.
    pub poll_interval: Duration,
}

impl Default for FileSourceOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl FileSourceOptions {
    pub fn with_interval(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::invalid_config("poll_interval must be > 0"));
        }
        Ok(())
    }
}

/// A remote source backed by a JSON file.
///
/// The subscription path selects a member of the document: for path
/// `"nodes"` and a document `{"nodes": {...}}` the inner object is pushed.
/// If the document has no such member, the whole document is pushed, so a
/// file holding just the node collection works with any path.
///
/// Subscribing requires a tokio runtime; polling runs on a spawned task that
/// stops when the returned [`Unsubscribe`] is released.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    options: FileSourceOptions,
}

impl FileSource {
    /// Create a new file source for the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_options(path, FileSourceOptions::default())
    }

    pub fn with_options<P: AsRef<Path>>(path: P, options: FileSourceOptions) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            options,
        }
    }

    /// Returns the path being monitored.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn modified_time(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

/// Pick the member at `member` if present, else the whole document.
fn select_member(document: Value, member: &str) -> Value {
    let member = member.trim_matches('/');
    if member.is_empty() {
        return document;
    }
    let pointer = format!("/{member}");
    match document.pointer(&pointer) {
        Some(inner) => inner.clone(),
        None => document,
    }
}

async fn read_document(path: &Path) -> std::result::Result<Value, TransportError> {
    let content = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&content)
        .map_err(|e| TransportError::Stream(format!("invalid JSON in {}: {}", path.display(), e)))
}

impl RemoteSource for FileSource {
    fn subscribe(&self, member: &str, listener: Listener) -> Result<Unsubscribe> {
        self.options.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::invalid_config(format!("file source needs a tokio runtime: {e}")))?;

        let cancel_token = CancellationToken::new();
        let task_token = cancel_token.clone();
        let path = self.path.clone();
        let member = member.to_string();
        let poll_interval = self.options.poll_interval;

        info!("Watching {} every {:?}", path.display(), poll_interval);

        runtime.spawn(async move {
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_modified: Option<SystemTime> = None;
            let mut last_error: Option<TransportError> = None;

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!("File watch on {} cancelled", path.display());
                        break;
                    }
                    _ = ticker.tick() => {
                        let current = modified_time(&path).await;
                        let changed = match (last_modified, current) {
                            (None, _) => true,
                            (Some(_), None) => last_error.is_none(),
                            (Some(last), Some(current)) => current != last,
                        };
                        if !changed {
                            continue;
                        }

                        match read_document(&path).await {
                            Ok(document) => {
                                last_modified = current;
                                last_error = None;
                                listener(Ok(select_member(document, &member)));
                            }
                            Err(e) => {
                                // Report each distinct failure once, not on every tick.
                                if last_error.as_ref() != Some(&e) {
                                    warn!("Failed to read {}: {}", path.display(), e);
                                    listener(Err(e.clone()));
                                    last_error = Some(e);
                                }
                                if current.is_some() {
                                    last_modified = current;
                                }
                            }
                        }
                    }
                }
            }
        });

        Ok(Unsubscribe::new(move || cancel_token.cancel()))
    }

    fn description(&self) -> String {
        format!("file: {}", self.path.display())
    }
}

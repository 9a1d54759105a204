//! Firebase Realtime Database source over the REST streaming API.
//!
//! Opens `GET {url}/{path}.json` with `Accept: text/event-stream` and keeps
//! a local copy of the tree at `path`. Every `put` or `patch` event is
//! applied to that copy and the whole tree is pushed to the listener, so
//! consumers always see a complete value, never a delta.
//!
//! The stream is not reconnected on failure. Errors are pushed to the
//! listener and the task ends.

use std::time::Duration;

use bytes::{Buf, BytesMut};
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result, TransportError};
use crate::subscription::{Listener, RemoteSource, Unsubscribe};

/// Connection settings for [`FirebaseSource`].
#[derive(Debug, Clone)]
pub struct FirebaseOptions {
    /// Database URL, e.g. `https://my-project-default-rtdb.firebaseio.com`.
    pub url: String,
    /// Database secret or ID token, sent as the `auth` query parameter.
    pub auth: Option<String>,
    /// Timeout for establishing the connection.
    /// Default: 10 seconds.
    pub connect_timeout: Duration,
    /// Longest silence tolerated on an open stream. The server sends a
    /// keep-alive every 30 seconds.
    /// Default: 90 seconds.
    pub idle_timeout: Duration,
}

impl FirebaseOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth: None,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(90),
        }
    }

    #[must_use]
    pub fn auth(mut self, auth: impl Into<String>) -> Self {
        self.auth = Some(auth.into());
        self
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(Error::invalid_config("database url must not be empty"));
        }
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(Error::invalid_config(format!(
                "database url must start with http:// or https://, got '{url}'"
            )));
        }
        if self.idle_timeout.is_zero() {
            return Err(Error::invalid_config("idle_timeout must be > 0"));
        }
        Ok(())
    }
}

/// A [`RemoteSource`] streaming from a Firebase Realtime Database.
#[derive(Debug, Clone)]
pub struct FirebaseSource {
    client: Client,
    options: FirebaseOptions,
}

impl FirebaseSource {
    /// Create a source. No connection is made until a subscription starts.
    pub fn new(options: FirebaseOptions) -> Result<Self> {
        options.validate()?;
        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(|e| Error::Connection(TransportError::Http(e.to_string())))?;
        Ok(Self { client, options })
    }

    /// The REST URL streamed for `path`.
    pub fn stream_url(&self, path: &str) -> String {
        format!(
            "{}/{}.json",
            self.options.url.trim().trim_end_matches('/'),
            path.trim_matches('/')
        )
    }
}

impl RemoteSource for FirebaseSource {
    fn subscribe(&self, path: &str, listener: Listener) -> Result<Unsubscribe> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::invalid_config(format!("firebase source needs a tokio runtime: {e}"))
        })?;

        let cancel_token = CancellationToken::new();
        let task_token = cancel_token.clone();
        let client = self.client.clone();
        let url = self.stream_url(path);
        let auth = self.options.auth.clone();
        let idle_timeout = self.options.idle_timeout;

        runtime.spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {
                    debug!("Stream from {} cancelled", url);
                }
                result = run_stream(&client, &url, auth.as_deref(), idle_timeout, &listener) => {
                    if let Err(e) = result {
                        warn!("Stream from {} ended: {}", url, e);
                        listener(Err(e));
                    }
                }
            }
        });

        Ok(Unsubscribe::new(move || cancel_token.cancel()))
    }

    fn description(&self) -> String {
        format!("firebase: {}", self.options.url)
    }
}

async fn run_stream(
    client: &Client,
    url: &str,
    auth: Option<&str>,
    idle_timeout: Duration,
    listener: &Listener,
) -> std::result::Result<(), TransportError> {
    let mut request = client.get(url).header(ACCEPT, "text/event-stream");
    if let Some(auth) = auth {
        request = request.query(&[("auth", auth)]);
    }

    let response = request
        .send()
        .await
        .map_err(|e| TransportError::Http(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(TransportError::Status {
            status: status.as_u16(),
            message,
        });
    }

    info!("Streaming {}", url);
    let mut body = response.bytes_stream();
    let mut parser = SseParser::default();
    let mut tree = Value::Null;

    loop {
        let chunk = match tokio::time::timeout(idle_timeout, body.next()).await {
            Err(_) => return Err(TransportError::Timeout(idle_timeout)),
            Ok(None) => return Err(TransportError::Closed),
            Ok(Some(chunk)) => chunk.map_err(|e| TransportError::Http(e.to_string()))?,
        };

        for event in parser.feed(&chunk) {
            if apply_event(&mut tree, &event)? {
                listener(Ok(tree.clone()));
            }
        }
    }
}

/// One server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SseEvent {
    event: String,
    data: String,
}

/// Incremental `text/event-stream` decoder.
///
/// Chunks may split lines and events anywhere; complete events are returned
/// as soon as their terminating blank line arrives.
#[derive(Debug, Default)]
struct SseParser {
    buffer: BytesMut,
    pending: SseEvent,
    has_data: bool,
}

impl SseParser {
    fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw = self.buffer.split_to(newline);
            self.buffer.advance(1);
            let text = String::from_utf8_lossy(&raw);
            let line = text.strip_suffix('\r').unwrap_or(text.as_ref());

            if line.is_empty() {
                if !self.pending.event.is_empty() || self.has_data {
                    events.push(std::mem::take(&mut self.pending));
                }
                self.has_data = false;
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.pending.event = value.to_string(),
                "data" => {
                    if self.has_data {
                        self.pending.data.push('\n');
                    }
                    self.pending.data.push_str(value);
                    self.has_data = true;
                }
                _ => {}
            }
        }

        events
    }
}

#[derive(Debug, Deserialize)]
struct PathData {
    path: String,
    data: Value,
}

/// Apply one streaming event to the local tree.
///
/// Returns `true` if the tree changed and should be pushed.
fn apply_event(tree: &mut Value, event: &SseEvent) -> std::result::Result<bool, TransportError> {
    match event.event.as_str() {
        "put" | "patch" => {
            let update: PathData = serde_json::from_str(&event.data).map_err(|e| {
                TransportError::Stream(format!("malformed {} event: {}", event.event, e))
            })?;
            let segments: Vec<&str> = update.path.split('/').filter(|s| !s.is_empty()).collect();

            if event.event == "put" {
                set_at(tree, &segments, update.data);
            } else {
                let Value::Object(children) = update.data else {
                    return Err(TransportError::Stream(
                        "patch event data is not an object".to_string(),
                    ));
                };
                for (key, value) in children {
                    let mut child_path = segments.clone();
                    child_path.extend(key.split('/').filter(|s| !s.is_empty()));
                    set_at(tree, &child_path, value);
                }
            }
            Ok(true)
        }
        "keep-alive" => Ok(false),
        "cancel" => Err(TransportError::Cancelled(event.data.trim_matches('"').to_string())),
        "auth_revoked" => Err(TransportError::Cancelled("auth revoked".to_string())),
        other => {
            debug!("Ignoring stream event '{}'", other);
            Ok(false)
        }
    }
}

/// Write `data` at `segments` under `target`, creating objects along the way.
/// `null` deletes, and objects left empty are removed like the server does.
fn set_at(target: &mut Value, segments: &[&str], data: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *target = data;
        return;
    };

    if let Value::Array(items) = target {
        let indexed: Map<String, Value> = std::mem::take(items)
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect();
        *target = Value::Object(indexed);
    }
    if !target.is_object() {
        if data.is_null() {
            return;
        }
        *target = Value::Object(Map::new());
    }
    let Value::Object(map) = target else {
        return;
    };

    if rest.is_empty() && data.is_null() {
        map.remove(*first);
    } else {
        let child = map.entry(first.to_string()).or_insert(Value::Null);
        set_at(child, rest, data);
        let emptied = child.is_null() || child.as_object().is_some_and(Map::is_empty);
        if emptied {
            map.remove(*first);
        }
    }

    if map.is_empty() {
        *target = Value::Null;
    }
}

//! Live synchronization and node selection for IoT telemetry dashboards.
//!
//! This crate keeps a local, always-current copy of a remote collection of
//! sensor nodes and lets presentation code pick one node to look at.
//!
//! # Features
//!
//! - **Single live subscription**: subscribe once, receive the whole
//!   collection on every change, stop immediately on demand
//! - **Snapshot store**: each push replaces the dataset; the selected node is
//!   resolved by lookup so it is never stale
//! - **Selection interface**: [`NodeSelection`] for list/select/read
//! - **Timestamp normalization**: day-first node timestamps and standard
//!   encodings, rendered with relative ages in English or Spanish
//! - **Sources**: in-memory mock, polled JSON file, and Firebase Realtime
//!   Database streaming (feature `firebase`)
//!
//! # Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`timestamp`] | Raw timestamp → date, time and relative age |
//! | [`store`] | Latest snapshot plus the selected node id |
//! | [`subscription`] | Start/stop of the live subscription, decoding, delivery gate |
//! | [`engine`] | Wires the above together behind [`NodeSelection`] |
//! | [`display`] | Ready-to-render strings for one node |
//! | [`source`] | [`RemoteSource`] implementations |
//!
//! # Quick Start
//!
//! ```no_run
//! use nodewatch_core::source::{FileSource, FileSourceOptions};
//! use nodewatch_core::{Engine, EngineOptions, NodeSelection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = FileSource::with_options("nodes.json", FileSourceOptions::default());
//!     let engine = Engine::start(source, EngineOptions::default())?;
//!
//!     let mut status = engine.watch_status();
//!     status.changed().await?;
//!
//!     for id in engine.node_ids() {
//!         println!("{id}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod display;
pub mod engine;
pub mod error;
pub mod events;
pub mod source;
pub mod store;
pub mod subscription;
pub mod timestamp;

pub use display::NodeView;
pub use engine::{ConnectionStatus, DEFAULT_PATH, Engine, EngineOptions, NodeSelection};
pub use error::{Error, Result, TransportError};
pub use events::{EngineEvent, EventDispatcher, EventReceiver, EventSender};
pub use source::{FileSource, MockSource};
#[cfg(feature = "firebase")]
pub use source::FirebaseSource;
pub use store::{SelectionPolicy, SnapshotStore};
pub use subscription::{
    Listener, Push, RemoteSource, SubscriptionController, SubscriptionHandle, Unsubscribe,
};
pub use timestamp::{Locale, NormalizedTimestamp, RelativeAge, normalize, normalize_with};

// Re-export from nodewatch-types
pub use nodewatch_types::{
    DatasetSnapshot, Location, NodeId, ParseError, ResolvedView, TelemetryRecord,
};

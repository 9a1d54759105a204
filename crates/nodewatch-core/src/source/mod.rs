//! [`RemoteSource`](crate::RemoteSource) implementations.
//!
//! - [`MockSource`]: in-memory pushes for tests and demos
//! - [`FileSource`]: polls a JSON document on disk
//! - [`FirebaseSource`]: realtime database REST streaming (feature `firebase`)

mod file;
#[cfg(feature = "firebase")]
mod firebase;
mod mock;

pub use file::{FileSource, FileSourceOptions};
#[cfg(feature = "firebase")]
pub use firebase::{FirebaseOptions, FirebaseSource};
pub use mock::MockSource;

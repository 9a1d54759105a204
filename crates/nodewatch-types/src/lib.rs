//! Platform-agnostic types for live IoT node telemetry.
//!
//! This crate provides the data model shared by the synchronization engine
//! (nodewatch-core) and its consumers.
//!
//! # Features
//!
//! - [`TelemetryRecord`]: the latest reading of one node, decoded leniently
//! - [`DatasetSnapshot`]: the full node-id → record mapping from one remote push
//! - [`ResolvedView`]: the derived view handed to presentation code
//! - Error types for payload decoding
//!
//! # Example
//!
//! ```
//! use nodewatch_types::DatasetSnapshot;
//!
//! let snapshot = DatasetSnapshot::from_json(
//!     r#"{"a": {"temp": 21.5, "hum": 60, "dateTime": "01-06-24 10:00:00"}}"#,
//! ).unwrap();
//!
//! assert_eq!(snapshot.get("a").unwrap().temperature, Some(21.5));
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{DatasetSnapshot, Location, NodeId, ResolvedView, TelemetryRecord};


/// Property-based tests for payload decoding.
///
/// Decoding is fed by a remote store that other programs write to, so it
/// must never panic on arbitrary input.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    proptest! {
        #[test]
        fn snapshot_from_json_never_panics(input in ".{0,200}") {
            let _ = DatasetSnapshot::from_json(&input);
        }

        #[test]
        fn numeric_fields_survive_decoding(temp in -1.0e6f64..1.0e6, hum in 0.0f64..100.0) {
            let record: TelemetryRecord =
                serde_json::from_value(json!({ "temp": temp, "hum": hum })).unwrap();
            prop_assert_eq!(record.temperature, Some(temp));
            prop_assert_eq!(record.humidity, Some(hum));
        }

        #[test]
        fn location_present_only_with_both_coordinates(
            lat in proptest::option::of(-90.0f64..90.0),
            lng in proptest::option::of(-180.0f64..180.0),
        ) {
            let record: TelemetryRecord =
                serde_json::from_value(json!({ "location": { "lat": lat, "lng": lng } })).unwrap();
            prop_assert_eq!(record.location.is_some(), lat.is_some() && lng.is_some());
        }
    }
}

//! Display values for a single node.
//!
//! [`NodeView`] turns a [`TelemetryRecord`] into ready-to-render strings.
//! Absent readings render as `"N/A"`; a reading of zero renders as `0`.

use serde::Serialize;
use time::OffsetDateTime;

use nodewatch_types::TelemetryRecord;

use crate::timestamp::{Locale, NormalizedTimestamp, normalize_with};

/// Placeholder for readings a node did not report.
pub const NOT_AVAILABLE: &str = "N/A";

/// Ready-to-render values for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeView {
    pub id: String,
    /// `"Node "` followed by the capitalized id.
    pub title: String,
    pub temperature: String,
    pub humidity: String,
    pub light: String,
    /// `"lat, lng"` when both coordinates are known.
    pub location: String,
    pub last_sync: NormalizedTimestamp,
}

impl NodeView {
    /// Build the view for `record`, with relative time measured from `now`.
    pub fn from_record(id: &str, record: &TelemetryRecord, now: OffsetDateTime, locale: Locale) -> Self {
        Self {
            id: id.to_string(),
            title: node_title(id),
            temperature: with_unit(record.temperature, "°C"),
            humidity: with_unit(record.humidity, "%"),
            light: with_unit(record.light, "lux"),
            location: record
                .location
                .map_or_else(|| NOT_AVAILABLE.to_string(), |loc| loc.to_string()),
            last_sync: normalize_with(&record.timestamp, now, locale),
        }
    }
}

/// `"Node "` plus the id with its first letter upper-cased and the rest
/// lower-cased.
pub fn node_title(id: &str) -> String {
    format!("Node {}", capitalize(id))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    }
}

fn with_unit(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(value) => format!("{value} {unit}"),
        None => NOT_AVAILABLE.to_string(),
    }
}

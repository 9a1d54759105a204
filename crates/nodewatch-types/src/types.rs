//! Core types for node telemetry data.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ParseError, ParseResult};

/// Opaque node identifier, unique within a dataset snapshot.
pub type NodeId = String;

/// GPS position of a node.
///
/// A location is only ever constructed with both coordinates present. Partial
/// locations on the wire (one coordinate missing or `null`) are decoded as
/// no location at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
}

impl Location {
    /// Create a new location.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.lat, self.lng)
    }
}

/// The latest telemetry reported by a single node.
///
/// Field names on the wire follow the remote store (`dateTime`, `temp`,
/// `hum`, `light`, `location`); the long names are accepted too. When a
/// record carries both, the wire name wins. Every sensor field is optional
/// and decoded leniently: numbers and numeric strings are accepted, anything
/// else is treated as absent. A reading of `0` is a real value and is never
/// confused with a missing one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetryRecord {
    /// Raw timestamp string as reported by the node.
    ///
    /// Accepts either `DD-MM-YY HH:MM:SS` or any standard date/time encoding.
    #[serde(rename = "dateTime")]
    pub timestamp: String,

    /// Temperature in °C.
    #[serde(rename = "temp", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Relative humidity in percent.
    #[serde(rename = "hum", skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,

    /// Illuminance in lux.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light: Option<f64>,

    /// GPS position, present only when both coordinates are.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

const TIMESTAMP_KEYS: &[&str] = &["dateTime", "timestamp"];
const TEMPERATURE_KEYS: &[&str] = &["temp", "temperature"];
const HUMIDITY_KEYS: &[&str] = &["hum", "humidity"];

impl TelemetryRecord {
    /// Create an empty record carrying only a timestamp.
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            ..Default::default()
        }
    }

    /// Decode a record from a raw JSON object.
    ///
    /// Each field is looked up under its names in priority order; the first
    /// non-null value is used. Decoding never fails: unusable values leave
    /// the field absent.
    pub fn from_object(map: &Map<String, Value>) -> Self {
        let number = |keys: &[&str]| first_present(map, keys).and_then(number_from_value);

        let timestamp = match first_present(map, TIMESTAMP_KEYS) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };

        Self {
            timestamp,
            temperature: number(TEMPERATURE_KEYS),
            humidity: number(HUMIDITY_KEYS),
            light: number(&["light"]),
            location: map.get("location").and_then(location_from_value),
        }
    }

    /// Set the temperature.
    #[must_use]
    pub fn with_temperature(mut self, value: f64) -> Self {
        self.temperature = Some(value);
        self
    }

    /// Set the humidity.
    #[must_use]
    pub fn with_humidity(mut self, value: f64) -> Self {
        self.humidity = Some(value);
        self
    }

    /// Set the light level.
    #[must_use]
    pub fn with_light(mut self, value: f64) -> Self {
        self.light = Some(value);
        self
    }

    /// Set the location.
    #[must_use]
    pub fn with_location(mut self, lat: f64, lng: f64) -> Self {
        self.location = Some(Location::new(lat, lng));
        self
    }

    pub fn has_temperature(&self) -> bool {
        self.temperature.is_some()
    }

    pub fn has_humidity(&self) -> bool {
        self.humidity.is_some()
    }

    pub fn has_light(&self) -> bool {
        self.light.is_some()
    }

    pub fn has_location(&self) -> bool {
        self.location.is_some()
    }
}

impl<'de> Deserialize<'de> for TelemetryRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Object(map) => Ok(Self::from_object(&map)),
            other => Err(D::Error::custom(format!(
                "expected an object, got {}",
                value_kind(&other)
            ))),
        }
    }
}

/// First non-null value stored under any of `keys`, in order.
fn first_present<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find(|value| !value.is_null())
}

/// Decode a JSON value as a finite number, accepting numeric strings.
fn number_from_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn location_from_value(value: &Value) -> Option<Location> {
    let Value::Object(map) = value else {
        return None;
    };
    let lat = map.get("lat").and_then(number_from_value)?;
    let lng = map.get("lng").and_then(number_from_value)?;
    Some(Location { lat, lng })
}

/// The complete current state of every node, as delivered by one remote push.
///
/// A snapshot is always replaced wholesale, never merged, so consumers can
/// assume it is complete. Node ids iterate in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DatasetSnapshot(BTreeMap<NodeId, TelemetryRecord>);

impl DatasetSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a snapshot from the raw value held by the remote store.
    ///
    /// - `null` decodes to an empty snapshot (no nodes yet).
    /// - An object maps each key to a node record.
    /// - An array maps each index to a node record; `null` holes are skipped.
    ///   Realtime databases return integer-keyed children this way.
    ///
    /// Entries that are not objects are skipped with a warning rather than
    /// failing the whole snapshot.
    pub fn from_value(value: Value) -> ParseResult<Self> {
        let entries: Vec<(NodeId, Value)> = match value {
            Value::Null => Vec::new(),
            Value::Object(map) => map.into_iter().collect(),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| (index.to_string(), item))
                .collect(),
            Value::Bool(_) => return Err(ParseError::UnexpectedShape("boolean")),
            Value::Number(_) => return Err(ParseError::UnexpectedShape("number")),
            Value::String(_) => return Err(ParseError::UnexpectedShape("string")),
        };

        let mut nodes = BTreeMap::new();
        for (id, entry) in entries {
            match entry {
                Value::Null => {}
                Value::Object(map) => {
                    nodes.insert(id, TelemetryRecord::from_object(&map));
                }
                other => warn!(
                    "Skipping node '{}': expected an object, got {}",
                    id,
                    value_kind(&other)
                ),
            }
        }

        Ok(Self(nodes))
    }

    /// Decode a snapshot from a JSON document.
    pub fn from_json(json: &str) -> ParseResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Look up a node's record.
    pub fn get(&self, id: &str) -> Option<&TelemetryRecord> {
        self.0.get(id)
    }

    /// Check whether a node is present.
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    /// Node ids in sorted order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.0.keys().cloned().collect()
    }

    /// Insert or replace a node's record.
    pub fn insert(&mut self, id: impl Into<NodeId>, record: TelemetryRecord) -> Option<TelemetryRecord> {
        self.0.insert(id.into(), record)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, NodeId, TelemetryRecord> {
        self.0.iter()
    }
}

impl FromIterator<(NodeId, TelemetryRecord)> for DatasetSnapshot {
    fn from_iter<I: IntoIterator<Item = (NodeId, TelemetryRecord)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a DatasetSnapshot {
    type Item = (&'a NodeId, &'a TelemetryRecord);
    type IntoIter = btree_map::Iter<'a, NodeId, TelemetryRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<'de> Deserialize<'de> for DatasetSnapshot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Derived view handed to presentation code: every node id plus the
/// resolved record of the selected node, if any.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedView {
    /// Node ids in the current snapshot, sorted.
    pub node_ids: Vec<NodeId>,
    /// Id of the selected node, even when it is absent from the snapshot.
    pub selected_id: Option<NodeId>,
    /// Record of the selected node in the current snapshot.
    pub selected: Option<TelemetryRecord>,
}

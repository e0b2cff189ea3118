//! Telemetry types and their flat-file row encoding
//!
//! The destination object is a header line followed by one comma-separated
//! row per [`TelemetryRecord`]. The column order below is a contract with the
//! downstream model-training job; reordering it is a breaking change.
//!
//! Field values are carried exactly as the producer sent them. Nothing is
//! coerced or range-checked: a string `"80"` for `bookings` is written as
//! `80`, and a number is written with the producer's own digits.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Column names, in row order.
pub const FIELD_NAMES: [&str; 7] = [
    "entity_id",
    "timestamp",
    "occupancy_rate",
    "bookings",
    "cancellations",
    "revenue_per_room",
    "average_stay_length",
];

/// Header line of the destination object (without the trailing newline).
pub const CSV_HEADER: &str =
    "entity_id,timestamp,occupancy_rate,bookings,cancellations,revenue_per_room,average_stay_length";

/// Legacy producer name for `entity_id`. Used only when `entity_id` is absent.
pub const ENTITY_ID_ALIAS: &str = "hotel_id";

/// A required field was not present in the payload object.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("missing required field `{0}`")]
pub struct MissingField(pub &'static str);

/// One field value, kept as the JSON value the producer sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldValue(Value);

impl FieldValue {
    pub fn as_json(&self) -> &Value {
        &self.0
    }

    pub fn into_json(self) -> Value {
        self.0
    }
}

impl<T: Into<Value>> From<T> for FieldValue {
    fn from(value: T) -> Self {
        FieldValue(value.into())
    }
}

/// Strings are written without quotes; everything else in its JSON form.
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

/// One measurement event emitted by a monitored unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub entity_id: FieldValue,
    /// ISO-8601 generation time, as sent.
    pub timestamp: FieldValue,
    pub occupancy_rate: FieldValue,
    pub bookings: FieldValue,
    pub cancellations: FieldValue,
    pub revenue_per_room: FieldValue,
    pub average_stay_length: FieldValue,
}

impl TelemetryRecord {
    /// Take the seven fields from a payload object. Unknown keys are ignored.
    pub fn from_object(fields: &Map<String, Value>) -> Result<Self, MissingField> {
        let field = |name: &'static str| {
            fields
                .get(name)
                .cloned()
                .map(FieldValue)
                .ok_or(MissingField(name))
        };

        let entity_id = fields
            .get("entity_id")
            .or_else(|| fields.get(ENTITY_ID_ALIAS))
            .cloned()
            .map(FieldValue)
            .ok_or(MissingField("entity_id"))?;

        Ok(Self {
            entity_id,
            timestamp: field("timestamp")?,
            occupancy_rate: field("occupancy_rate")?,
            bookings: field("bookings")?,
            cancellations: field("cancellations")?,
            revenue_per_room: field("revenue_per_room")?,
            average_stay_length: field("average_stay_length")?,
        })
    }

    /// Render the record as one row, without a trailing newline.
    ///
    /// No quoting or escaping is applied.
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.entity_id,
            self.timestamp,
            self.occupancy_rate,
            self.bookings,
            self.cancellations,
            self.revenue_per_room,
            self.average_stay_length,
        )
    }
}

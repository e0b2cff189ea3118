//! Stream transport event shapes
//!
//! A batch arrives as `{"Records": [{"kinesis": {"data": "<base64>"}}, ...]}`.
//! Only `kinesis.data` is needed to decode a record; the remaining fields are
//! carried for diagnostics. Every field is optional at this level so one
//! malformed record cannot make the whole batch unparseable.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

/// One invocation's worth of stream records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<StreamRecord>,
}

impl StreamBatch {
    pub fn new(records: Vec<StreamRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A single record as delivered by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinesis: Option<KinesisData>,

    #[serde(rename = "eventID", default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

/// Transport-level payload envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KinesisData {
    /// Base64-encoded producer payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
}

impl StreamRecord {
    /// Wrap an already base64-encoded payload.
    pub fn from_encoded(data: impl Into<String>) -> Self {
        Self {
            kinesis: Some(KinesisData {
                data: Some(data.into()),
                ..KinesisData::default()
            }),
            event_id: None,
        }
    }

    /// Encode `value` as JSON and wrap it the way the transport would.
    pub fn from_json<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        let json = serde_json::to_vec(value)?;
        Ok(Self::from_encoded(STANDARD.encode(json)))
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.kinesis
            .get_or_insert_with(KinesisData::default)
            .partition_key = Some(partition_key.into());
        self
    }

    /// The encoded payload, if the transport supplied one.
    pub fn payload(&self) -> Option<&str> {
        self.kinesis.as_ref()?.data.as_deref()
    }
}

//! Shared helpers for hotelflow-ingest integration tests
//!
//! Handlers built here run against [`MemoryStorage`], so every store call is
//! recorded and can be asserted on.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine};
use hotelflow_ingest::{
    DestinationSettings, IngestConfig, IngestHandler, MemoryStorage, MergePolicy,
    ObjectLocation, ObjectStoreMerger, StreamBatch, StreamRecord, TelemetryRecord,
};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_BUCKET: &str = "hotelflow-test";
pub const DATA_KEY: &str = "hotel_data/hotel_data.csv";

pub const HEADER: &str =
    "entity_id,timestamp,occupancy_rate,bookings,cancellations,revenue_per_room,average_stay_length";

pub fn destination() -> ObjectLocation {
    ObjectLocation::new(TEST_BUCKET, DATA_KEY)
}

pub fn config(policy: MergePolicy) -> IngestConfig {
    IngestConfig {
        destination: DestinationSettings::new(TEST_BUCKET),
        merge: policy,
        ..IngestConfig::default()
    }
}

pub fn handler(storage: &MemoryStorage) -> IngestHandler<ObjectStoreMerger> {
    IngestHandler::from_config(&config(MergePolicy::default()), Arc::new(storage.clone()))
}

pub fn handler_with(
    storage: &MemoryStorage,
    policy: MergePolicy,
    timeout: Option<Duration>,
) -> IngestHandler<ObjectStoreMerger> {
    let config = IngestConfig {
        invocation_timeout: timeout,
        ..config(policy)
    };
    IngestHandler::from_config(&config, Arc::new(storage.clone()))
}

/// Stream record carrying `json` exactly as the producer wrote it.
pub fn raw_record(json: &str) -> StreamRecord {
    StreamRecord::from_encoded(STANDARD.encode(json))
}

pub fn telemetry(entity_id: i64) -> TelemetryRecord {
    TelemetryRecord {
        entity_id: entity_id.into(),
        timestamp: format!("2024-03-01T12:00:{:02}", entity_id % 60).into(),
        occupancy_rate: 0.5.into(),
        bookings: (10 + entity_id as u64).into(),
        cancellations: 1.into(),
        revenue_per_room: 99.5.into(),
        average_stay_length: 2.0.into(),
    }
}

pub fn batch_of(records: &[TelemetryRecord]) -> StreamBatch {
    StreamBatch::new(
        records
            .iter()
            .map(|r| StreamRecord::from_json(r).expect("record serializes"))
            .collect(),
    )
}

/// Data lines of the stored object, header excluded.
pub fn data_rows(storage: &MemoryStorage) -> Vec<String> {
    storage
        .object_text(&destination())
        .unwrap_or_default()
        .lines()
        .skip(1)
        .map(str::to_string)
        .collect()
}

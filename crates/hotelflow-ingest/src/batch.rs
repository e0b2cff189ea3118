//! Batch processor
//!
//! Applies the decoder to every record of an invocation batch. A bad record
//! is logged and set aside; it never aborts the rest of the batch.

use crate::decode::{decode, DecodeError};
use crate::event::StreamRecord;
use hotelflow_common::TelemetryRecord;
use tracing::{info, warn};

/// A record that was dropped from the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    /// Position of the record in the incoming batch.
    pub index: usize,
    pub event_id: Option<String>,
    pub error: DecodeError,
}

/// Decoded records, in input order, plus the records that were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub records: Vec<TelemetryRecord>,
    pub failures: Vec<RecordFailure>,
}

impl BatchOutcome {
    /// Number of records the batch carried.
    pub fn received(&self) -> usize {
        self.records.len() + self.failures.len()
    }
}

/// Decode every record independently.
///
/// The output keeps the relative order of the records that decoded.
pub fn process_batch(raw: &[StreamRecord]) -> BatchOutcome {
    let mut outcome = BatchOutcome {
        records: Vec::with_capacity(raw.len()),
        failures: Vec::new(),
    };

    for (index, record) in raw.iter().enumerate() {
        match decode(record) {
            Ok(telemetry) => outcome.records.push(telemetry),
            Err(error) => {
                warn!(
                    record_index = index,
                    event_id = record.event_id.as_deref().unwrap_or("-"),
                    error = %error,
                    "Skipping undecodable record"
                );
                outcome.failures.push(RecordFailure {
                    index,
                    event_id: record.event_id.clone(),
                    error,
                });
            },
        }
    }

    info!(
        received = raw.len(),
        decoded = outcome.records.len(),
        failed = outcome.failures.len(),
        "Processed batch"
    );

    outcome
}

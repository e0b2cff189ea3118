//! Hotelflow Ingest Library
//!
//! Moves hotel telemetry from a record stream into one aggregate CSV object.
//!
//! # Pipeline
//!
//! - **[`event`]**: stream batch envelope (`{"Records": [{"kinesis": {"data": ...}}]}`)
//! - **[`decode`]**: base64 + JSON payload to [`TelemetryRecord`]
//! - **[`batch`]**: per-record decoding; bad records are logged and skipped
//! - **[`merge`]**: read-modify-write append into the destination object
//! - **[`handler`]**: invocation entry point producing `{statusCode, body}`
//!
//! # Example
//!
//! ```no_run
//! use hotelflow_ingest::{IngestConfig, IngestHandler, S3Storage, StreamBatch};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load()?;
//!     let store = Arc::new(S3Storage::new(config.s3.clone()).await);
//!     let handler = IngestHandler::from_config(&config, store);
//!
//!     let batch: StreamBatch = serde_json::from_str(r#"{"Records": []}"#)?;
//!     let response = handler.handle(&batch).await;
//!     println!("{}", serde_json::to_string(&response)?);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod batch;
pub mod config;
pub mod decode;
pub mod error;
pub mod event;
pub mod handler;
pub mod merge;
pub mod storage;

pub use batch::{process_batch, BatchOutcome, RecordFailure};
pub use config::{DestinationSettings, IngestConfig};
pub use decode::{decode, decode_payload, DecodeError};
pub use error::{ConfigError, IngestError, Result};
pub use event::{StreamBatch, StreamRecord};
pub use handler::{IngestHandler, IngestResponse, IngestSummary};
pub use hotelflow_common::TelemetryRecord;
pub use merge::{
    ConcurrencyMode, MergeError, MergeMode, MergePolicy, MergeReport, MergeStage,
    ObjectStoreMerger, RecordSink,
};
pub use storage::{MemoryStorage, ObjectLocation, S3Storage, StorageBackend, StorageError};

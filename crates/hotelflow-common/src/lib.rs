//! Hotelflow Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the hotelflow workspace.
//!
//! # Overview
//!
//! - **Types**: the [`TelemetryRecord`](types::TelemetryRecord), its uncoerced field values and CSV row form
//! - **Checksums**: content digests reported after a destination write
//! - **Logging**: `tracing` subscriber initialisation shared by every binary
//! - **Error Handling**: common error and result types
//!
//! # Example
//!
//! ```
//! use hotelflow_common::types::{TelemetryRecord, CSV_HEADER};
//!
//! let record = TelemetryRecord {
//!     entity_id: 3.into(),
//!     timestamp: "2024-01-01T00:00:00".into(),
//!     occupancy_rate: 0.75.into(),
//!     bookings: "80".into(),
//!     cancellations: 4.into(),
//!     revenue_per_room: 150.0.into(),
//!     average_stay_length: 2.3.into(),
//! };
//!
//! assert!(CSV_HEADER.starts_with("entity_id,"));
//! assert_eq!(record.to_csv_row(), "3,2024-01-01T00:00:00,0.75,80,4,150.0,2.3");
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
pub use types::{FieldValue, TelemetryRecord};

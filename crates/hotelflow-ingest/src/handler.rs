//! Invocation entry point
//!
//! Resolves the destination, decodes the batch and merges the surviving
//! records. Invocation-fatal errors become a 500 response; per-record decode
//! failures only shrink the merged batch.

use crate::batch::process_batch;
use crate::config::{DestinationSettings, IngestConfig};
use crate::error::Result;
use crate::event::StreamBatch;
use crate::merge::{MergeReport, ObjectStoreMerger, RecordSink};
use crate::storage::{ObjectLocation, StorageBackend};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, instrument, Instrument};
use uuid::Uuid;

pub const STATUS_OK: u16 = 200;
pub const STATUS_ERROR: u16 = 500;

/// Transport response: `{"statusCode": 200|500, "body": "<message>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub status_code: u16,
    pub body: String,
}

impl IngestResponse {
    pub fn success(body: impl Into<String>) -> Self {
        Self {
            status_code: STATUS_OK,
            body: body.into(),
        }
    }

    pub fn failure(body: impl Into<String>) -> Self {
        Self {
            status_code: STATUS_ERROR,
            body: body.into(),
        }
    }

    /// 500 response for an invocation-fatal error.
    pub fn error(err: impl std::fmt::Display) -> Self {
        Self::failure(format!("Error processing data: {}", err))
    }

    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }
}

/// What one successful invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub destination: ObjectLocation,
    pub received: usize,
    pub decoded: usize,
    pub rejected: usize,
    pub merge: MergeReport,
}

impl IngestSummary {
    fn message(&self) -> String {
        format!(
            "Merged {} of {} records into {}",
            self.merge.rows_appended, self.received, self.destination
        )
    }
}

pub struct IngestHandler<S> {
    destination: DestinationSettings,
    sink: S,
    invocation_timeout: Option<Duration>,
}

impl<S: RecordSink> IngestHandler<S> {
    pub fn new(destination: DestinationSettings, sink: S) -> Self {
        Self {
            destination,
            sink,
            invocation_timeout: None,
        }
    }

    /// Deadline applied by [`handle`](Self::handle), measured from invocation start.
    pub fn with_invocation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    pub async fn handle(&self, batch: &StreamBatch) -> IngestResponse {
        let deadline = self.invocation_timeout.map(|t| Instant::now() + t);
        self.handle_with_deadline(batch, deadline).await
    }

    pub async fn handle_with_deadline(
        &self,
        batch: &StreamBatch,
        deadline: Option<Instant>,
    ) -> IngestResponse {
        let span = tracing::info_span!(
            "invocation",
            invocation_id = %Uuid::new_v4(),
            records = batch.len()
        );

        async move {
            match self.run(batch, deadline).await {
                Ok(summary) => IngestResponse::success(summary.message()),
                Err(err) => {
                    error!(error = %err, "Invocation failed");
                    IngestResponse::error(err)
                },
            }
        }
        .instrument(span)
        .await
    }

    /// Run the pipeline, returning the typed outcome instead of a response.
    #[instrument(skip_all)]
    pub async fn run(&self, batch: &StreamBatch, deadline: Option<Instant>) -> Result<IngestSummary> {
        let destination = self.destination.resolve()?;

        let outcome = process_batch(&batch.records);
        let merge = self
            .sink
            .append(&destination, &outcome.records, deadline)
            .await?;

        let summary = IngestSummary {
            destination,
            received: outcome.received(),
            decoded: outcome.records.len(),
            rejected: outcome.failures.len(),
            merge,
        };
        info!(
            destination = %summary.destination,
            received = summary.received,
            rows_appended = summary.merge.rows_appended,
            rejected = summary.rejected,
            "Invocation complete"
        );
        Ok(summary)
    }
}

impl IngestHandler<ObjectStoreMerger> {
    /// Handler merging into `store` with the configured policy and deadline.
    pub fn from_config(config: &IngestConfig, store: Arc<dyn StorageBackend>) -> Self {
        let merger = ObjectStoreMerger::new(store, config.merge.clone());
        Self::new(config.destination.clone(), merger)
            .with_invocation_timeout(config.invocation_timeout)
    }
}

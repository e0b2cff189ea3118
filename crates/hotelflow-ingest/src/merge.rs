//! Object store merger
//!
//! Appends decoded records to the destination object with a
//! read-modify-write:
//!
//! 1. probe the destination (HEAD, no body transfer)
//! 2. absent: start from the header line; present: fetch the full content
//! 3. append one row per record, in order
//! 4. replace the whole object in a single write
//!
//! In [`ConcurrencyMode::Conditional`] the write in step 4 is guarded by the
//! version seen in step 1, and a lost race restarts the merge from step 1.
//! [`ConcurrencyMode::Unconditional`] skips the guard; overlapping merges are
//! then last-writer-wins and callers must ensure a single writer per
//! destination.
//!
//! The whole object is held in memory, so cost grows with the file. The
//! [`RecordSink`] trait is the seam for a streaming strategy.

use crate::storage::{
    ObjectLocation, StorageBackend, StorageError, WritePrecondition, WriteResult,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use hotelflow_common::checksum::sha256_hex;
use hotelflow_common::types::{TelemetryRecord, CSV_HEADER};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Default number of merge attempts under write contention.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 50;

/// Upper bound on a single retry delay.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 2_000;

/// How concurrent merges into the same destination are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyMode {
    /// Version-guarded writes with bounded retry on conflict.
    #[default]
    Conditional,
    /// Plain writes; last writer wins.
    Unconditional,
}

impl std::str::FromStr for ConcurrencyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conditional" | "cas" => Ok(ConcurrencyMode::Conditional),
            "unconditional" | "last-writer-wins" => Ok(ConcurrencyMode::Unconditional),
            _ => Err(format!("unknown concurrency mode '{}'", s)),
        }
    }
}

impl fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyMode::Conditional => write!(f, "conditional"),
            ConcurrencyMode::Unconditional => write!(f, "unconditional"),
        }
    }
}

/// Concurrency and retry settings for the merger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePolicy {
    pub mode: ConcurrencyMode,
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            mode: ConcurrencyMode::Conditional,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

impl MergePolicy {
    pub fn unconditional() -> Self {
        Self {
            mode: ConcurrencyMode::Unconditional,
            ..Self::default()
        }
    }

    /// Delay after the given failed attempt (1-based): exponential, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// What a merge did to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// No records; the store was not touched.
    Noop,
    /// The destination did not exist and was created with a header.
    Bootstrap,
    /// Rows were appended to an existing destination.
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub mode: MergeMode,
    pub rows_appended: usize,
    pub bytes_written: usize,
    /// Version token of the object after the write.
    pub version: Option<String>,
    pub attempts: u32,
    /// SHA-256 of the written content.
    pub checksum: Option<String>,
}

impl MergeReport {
    fn noop() -> Self {
        Self {
            mode: MergeMode::Noop,
            rows_appended: 0,
            bytes_written: 0,
            version: None,
            attempts: 0,
            checksum: None,
        }
    }
}

/// Step of the merge that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStage {
    Probe,
    Fetch,
    Write,
    Backoff,
}

impl fmt::Display for MergeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStage::Probe => write!(f, "probe"),
            MergeStage::Fetch => write!(f, "fetch"),
            MergeStage::Write => write!(f, "write"),
            MergeStage::Backoff => write!(f, "retry backoff"),
        }
    }
}

/// Invocation-fatal merge failure. Nothing is partially written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("{stage} of {location} failed: {source}")]
    Storage {
        stage: MergeStage,
        location: String,
        #[source]
        source: StorageError,
    },

    #[error("{stage} of {location} timed out")]
    Timeout { stage: MergeStage, location: String },

    #[error("gave up merging into {location} after {attempts} conflicting writes")]
    ConflictRetriesExhausted { location: String, attempts: u32 },
}

impl MergeError {
    pub fn stage(&self) -> Option<MergeStage> {
        match self {
            MergeError::Storage { stage, .. } | MergeError::Timeout { stage, .. } => Some(*stage),
            MergeError::ConflictRetriesExhausted { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, MergeError::Timeout { .. })
    }
}

/// Destination for decoded records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Append `records` to `destination`, finishing before `deadline` if one is given.
    async fn append(
        &self,
        destination: &ObjectLocation,
        records: &[TelemetryRecord],
        deadline: Option<Instant>,
    ) -> Result<MergeReport, MergeError>;
}

enum Attempt {
    Committed(MergeReport),
    Conflict,
}

/// Read-modify-write merger over an injected [`StorageBackend`].
#[derive(Clone)]
pub struct ObjectStoreMerger {
    store: Arc<dyn StorageBackend>,
    policy: MergePolicy,
}

impl ObjectStoreMerger {
    pub fn new(store: Arc<dyn StorageBackend>, policy: MergePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &MergePolicy {
        &self.policy
    }

    #[instrument(
        skip(self, records),
        fields(destination = %destination, rows = records.len(), mode = %self.policy.mode)
    )]
    pub async fn merge(
        &self,
        destination: &ObjectLocation,
        records: &[TelemetryRecord],
        deadline: Option<Instant>,
    ) -> Result<MergeReport, MergeError> {
        if records.is_empty() {
            debug!("No records to merge, leaving destination untouched");
            return Ok(MergeReport::noop());
        }

        let rows = render_rows(records);
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.attempt(destination, &rows, records.len(), deadline).await? {
                Attempt::Committed(mut report) => {
                    report.attempts = attempt;
                    info!(
                        merge_mode = ?report.mode,
                        rows_appended = report.rows_appended,
                        bytes_written = report.bytes_written,
                        attempts = attempt,
                        "Merged records into destination"
                    );
                    return Ok(report);
                },
                Attempt::Conflict if attempt < max_attempts => {
                    let backoff = self.policy.backoff(attempt);
                    if deadline.is_some_and(|d| Instant::now() + backoff >= d) {
                        return Err(MergeError::Timeout {
                            stage: MergeStage::Backoff,
                            location: destination.to_string(),
                        });
                    }
                    warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Destination changed during merge, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                },
                Attempt::Conflict => {},
            }
        }

        Err(MergeError::ConflictRetriesExhausted {
            location: destination.to_string(),
            attempts: max_attempts,
        })
    }

    async fn attempt(
        &self,
        destination: &ObjectLocation,
        rows: &str,
        row_count: usize,
        deadline: Option<Instant>,
    ) -> Result<Attempt, MergeError> {
        let conditional = self.policy.mode == ConcurrencyMode::Conditional;

        let meta = self
            .bounded(MergeStage::Probe, destination, deadline, self.store.head(destination))
            .await?;

        let (mode, prefix, precondition) = match meta {
            None => {
                debug!("Destination does not exist, bootstrapping with header");
                let precondition = if conditional {
                    WritePrecondition::DoesNotExist
                } else {
                    WritePrecondition::None
                };
                let header = Bytes::from(format!("{}\n", CSV_HEADER));
                (MergeMode::Bootstrap, header, precondition)
            },
            Some(meta) => {
                let fetched = self
                    .bounded(MergeStage::Fetch, destination, deadline, self.store.get(destination))
                    .await;
                let existing = match fetched {
                    Ok(data) => data,
                    // Deleted between probe and fetch: another writer is active.
                    Err(MergeError::Storage {
                        source: StorageError::NotFound(_),
                        ..
                    }) if conditional => return Ok(Attempt::Conflict),
                    Err(err) => return Err(err),
                };
                debug!(existing_bytes = existing.len(), "Appending to existing destination");

                let precondition = match (conditional, meta.version) {
                    (true, Some(version)) => WritePrecondition::MatchesVersion(version),
                    (true, None) => {
                        warn!("Destination has no version token, writing unconditionally");
                        WritePrecondition::None
                    },
                    (false, _) => WritePrecondition::None,
                };
                (MergeMode::Append, existing, precondition)
            },
        };

        let mut content = BytesMut::with_capacity(prefix.len() + rows.len());
        content.extend_from_slice(&prefix);
        content.extend_from_slice(rows.as_bytes());
        let content = content.freeze();

        let bytes_written = content.len();
        let checksum = sha256_hex(&content);

        let written = self
            .bounded(
                MergeStage::Write,
                destination,
                deadline,
                self.store.put(destination, content, precondition),
            )
            .await?;

        match written {
            WriteResult::Success { version } => Ok(Attempt::Committed(MergeReport {
                mode,
                rows_appended: row_count,
                bytes_written,
                version,
                attempts: 0,
                checksum: Some(checksum),
            })),
            WriteResult::PreconditionFailed { current_version } => {
                debug!(?current_version, "Conditional write lost the race");
                Ok(Attempt::Conflict)
            },
        }
    }

    /// Run one store call, bounded by the invocation deadline.
    async fn bounded<T, F>(
        &self,
        stage: MergeStage,
        destination: &ObjectLocation,
        deadline: Option<Instant>,
        op: F,
    ) -> Result<T, MergeError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        let result = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, op).await.map_err(|_| {
                MergeError::Timeout {
                    stage,
                    location: destination.to_string(),
                }
            })?,
            None => op.await,
        };

        result.map_err(|source| match source {
            StorageError::Timeout(_) => MergeError::Timeout {
                stage,
                location: destination.to_string(),
            },
            source => MergeError::Storage {
                stage,
                location: destination.to_string(),
                source,
            },
        })
    }
}

#[async_trait]
impl RecordSink for ObjectStoreMerger {
    async fn append(
        &self,
        destination: &ObjectLocation,
        records: &[TelemetryRecord],
        deadline: Option<Instant>,
    ) -> Result<MergeReport, MergeError> {
        self.merge(destination, records, deadline).await
    }
}

/// One newline-terminated row per record.
pub fn render_rows(records: &[TelemetryRecord]) -> String {
    let mut rows = String::new();
    for record in records {
        rows.push_str(&record.to_csv_row());
        rows.push('\n');
    }
    rows
}

//! Object storage abstraction
//!
//! The merger only needs three operations against the destination object: a
//! metadata probe, a full read and a whole-object write with an optional
//! precondition. [`StorageBackend`] captures exactly that so the S3 client and
//! the in-memory test store are interchangeable.
//!
//! Version tokens are opaque strings (the S3 `ETag`, a counter in memory).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

pub mod config;
pub mod memory;
pub mod s3;

pub use memory::{FailureKind, MemoryStorage, OpKind, StorageOp};
pub use s3::S3Storage;

/// Bucket and key of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Metadata returned by a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    /// Version token usable in [`WritePrecondition::MatchesVersion`].
    pub version: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Precondition for a whole-object write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritePrecondition {
    /// Write only if no object exists at the location.
    DoesNotExist,
    /// Write only if the current object has this version token.
    MatchesVersion(String),
    /// Write unconditionally (last writer wins).
    None,
}

/// Outcome of a write. A failed precondition is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    Success { version: Option<String> },
    PreconditionFailed { current_version: Option<String> },
}

/// Backend failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("permission denied for {location}: {message}")]
    PermissionDenied { location: String, message: String },

    #[error("request timed out for {0}")]
    Timeout(String),

    #[error("storage unreachable for {location}: {message}")]
    Unavailable { location: String, message: String },

    #[error("storage error for {location}: {message}")]
    Backend { location: String, message: String },
}

/// Object store capability injected into the merger.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Metadata of the object, or `None` if it does not exist.
    async fn head(&self, location: &ObjectLocation) -> Result<Option<ObjectMeta>, StorageError>;

    /// Full object content. Returns `StorageError::NotFound` if absent.
    async fn get(&self, location: &ObjectLocation) -> Result<Bytes, StorageError>;

    /// Replace the whole object, subject to `precondition`.
    async fn put(
        &self,
        location: &ObjectLocation,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult, StorageError>;
}

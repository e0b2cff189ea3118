//! In-memory storage backend with operation recording.
//!
//! Used by tests and local dry runs. Every call is recorded before it is
//! served so tests can assert on store access, failures can be injected per
//! operation kind, and an artificial latency makes concurrent merges
//! interleave.

use super::{
    ObjectLocation, ObjectMeta, StorageBackend, StorageError, WritePrecondition, WriteResult,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Kind of storage call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Head,
    Get,
    Put,
}

/// A recorded storage call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    Head {
        location: ObjectLocation,
    },
    Get {
        location: ObjectLocation,
    },
    Put {
        location: ObjectLocation,
        size: usize,
        precondition: WritePrecondition,
    },
}

impl StorageOp {
    pub fn kind(&self) -> OpKind {
        match self {
            StorageOp::Head { .. } => OpKind::Head,
            StorageOp::Get { .. } => OpKind::Get,
            StorageOp::Put { .. } => OpKind::Put,
        }
    }
}

/// Failure served for an injected operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    PermissionDenied,
    Unavailable,
    Timeout,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    version: u64,
    last_modified: DateTime<Utc>,
}

impl StoredObject {
    fn meta(&self) -> ObjectMeta {
        ObjectMeta {
            size: self.data.len() as u64,
            version: Some(self.version.to_string()),
            last_modified: Some(self.last_modified),
        }
    }
}

/// Shared-state in-memory store. Clones observe the same objects and log.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<ObjectLocation, StoredObject>>>,
    operations: Arc<Mutex<Vec<StorageOp>>>,
    failures: Arc<Mutex<HashMap<OpKind, FailureKind>>>,
    latency: Option<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that sleeps for `latency` before serving each call.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Seed an object without recording an operation.
    pub fn insert(&self, location: &ObjectLocation, data: impl Into<Bytes>) {
        let mut objects = lock(&self.objects);
        let version = objects.get(location).map_or(1, |o| o.version + 1);
        objects.insert(
            location.clone(),
            StoredObject {
                data: data.into(),
                version,
                last_modified: Utc::now(),
            },
        );
    }

    /// Current content of an object, without recording an operation.
    pub fn object(&self, location: &ObjectLocation) -> Option<Bytes> {
        lock(&self.objects).get(location).map(|o| o.data.clone())
    }

    /// Current content as text, for assertions.
    pub fn object_text(&self, location: &ObjectLocation) -> Option<String> {
        self.object(location)
            .map(|data| String::from_utf8_lossy(&data).into_owned())
    }

    pub fn operations(&self) -> Vec<StorageOp> {
        lock(&self.operations).clone()
    }

    pub fn operation_count(&self) -> usize {
        lock(&self.operations).len()
    }

    pub fn count(&self, kind: OpKind) -> usize {
        lock(&self.operations)
            .iter()
            .filter(|op| op.kind() == kind)
            .count()
    }

    pub fn clear_operations(&self) {
        lock(&self.operations).clear();
    }

    /// Make every subsequent call of `kind` fail.
    pub fn inject_failure(&self, kind: OpKind, failure: FailureKind) {
        lock(&self.failures).insert(kind, failure);
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    async fn enter(&self, op: StorageOp) -> Result<(), StorageError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let kind = op.kind();
        let location = match &op {
            StorageOp::Head { location }
            | StorageOp::Get { location }
            | StorageOp::Put { location, .. } => location.to_string(),
        };
        lock(&self.operations).push(op);

        match lock(&self.failures).get(&kind) {
            None => Ok(()),
            Some(FailureKind::PermissionDenied) => Err(StorageError::PermissionDenied {
                location,
                message: "injected access denied".to_string(),
            }),
            Some(FailureKind::Unavailable) => Err(StorageError::Unavailable {
                location,
                message: "injected outage".to_string(),
            }),
            Some(FailureKind::Timeout) => Err(StorageError::Timeout(location)),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn head(&self, location: &ObjectLocation) -> Result<Option<ObjectMeta>, StorageError> {
        self.enter(StorageOp::Head {
            location: location.clone(),
        })
        .await?;

        Ok(lock(&self.objects).get(location).map(StoredObject::meta))
    }

    async fn get(&self, location: &ObjectLocation) -> Result<Bytes, StorageError> {
        self.enter(StorageOp::Get {
            location: location.clone(),
        })
        .await?;

        lock(&self.objects)
            .get(location)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(location.to_string()))
    }

    async fn put(
        &self,
        location: &ObjectLocation,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult, StorageError> {
        self.enter(StorageOp::Put {
            location: location.clone(),
            size: data.len(),
            precondition: precondition.clone(),
        })
        .await?;

        let mut objects = lock(&self.objects);
        let current = objects.get(location);
        let current_version = current.map(|o| o.version.to_string());

        let satisfied = match &precondition {
            WritePrecondition::None => true,
            WritePrecondition::DoesNotExist => current.is_none(),
            WritePrecondition::MatchesVersion(expected) => {
                current_version.as_deref() == Some(expected.as_str())
            },
        };
        if !satisfied {
            return Ok(WriteResult::PreconditionFailed { current_version });
        }

        let version = current.map_or(1, |o| o.version + 1);
        objects.insert(
            location.clone(),
            StoredObject {
                data,
                version,
                last_modified: Utc::now(),
            },
        );

        Ok(WriteResult::Success {
            version: Some(version.to_string()),
        })
    }
}

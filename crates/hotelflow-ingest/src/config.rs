//! Ingest configuration
//!
//! Everything comes from the environment. A `.env` file in the working
//! directory is loaded first when present.
//!
//! | Variable | Default |
//! |---|---|
//! | `S3_BUCKET_NAME` (or `S3_BUCKET`) | required |
//! | `HOTELFLOW_DATA_KEY` | `hotel_data/hotel_data.csv` |
//! | `HOTELFLOW_CONCURRENCY_MODE` | `conditional` |
//! | `HOTELFLOW_MAX_MERGE_ATTEMPTS` | `5` |
//! | `HOTELFLOW_RETRY_BACKOFF_MS` | `50` |
//! | `HOTELFLOW_INVOCATION_TIMEOUT_SECS` | unset |
//!
//! S3 connection variables are read by [`S3Config::from_env`].
//!
//! A missing bucket is not a load error: it is reported per invocation so the
//! handler can answer with a failure response instead of refusing to start.

use crate::error::ConfigError;
use crate::merge::MergePolicy;
use crate::storage::config::S3Config;
use crate::storage::ObjectLocation;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Fixed key of the aggregate CSV object.
pub const DEFAULT_DATA_KEY: &str = "hotel_data/hotel_data.csv";

pub const BUCKET_VAR: &str = "S3_BUCKET_NAME";
pub const BUCKET_ALIAS_VAR: &str = "S3_BUCKET";
pub const DATA_KEY_VAR: &str = "HOTELFLOW_DATA_KEY";
pub const CONCURRENCY_MODE_VAR: &str = "HOTELFLOW_CONCURRENCY_MODE";
pub const MAX_ATTEMPTS_VAR: &str = "HOTELFLOW_MAX_MERGE_ATTEMPTS";
pub const BACKOFF_VAR: &str = "HOTELFLOW_RETRY_BACKOFF_MS";
pub const TIMEOUT_VAR: &str = "HOTELFLOW_INVOCATION_TIMEOUT_SECS";

/// Where merged records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationSettings {
    pub bucket: Option<String>,
    pub key: String,
}

impl Default for DestinationSettings {
    fn default() -> Self {
        Self {
            bucket: None,
            key: DEFAULT_DATA_KEY.to_string(),
        }
    }
}

impl DestinationSettings {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        Self {
            bucket: non_empty(BUCKET_VAR).or_else(|| non_empty(BUCKET_ALIAS_VAR)),
            key: non_empty(DATA_KEY_VAR).unwrap_or_else(|| DEFAULT_DATA_KEY.to_string()),
        }
    }

    /// The destination object, or [`ConfigError::MissingBucket`].
    pub fn resolve(&self) -> Result<ObjectLocation, ConfigError> {
        match &self.bucket {
            Some(bucket) if !bucket.trim().is_empty() => {
                Ok(ObjectLocation::new(bucket.trim(), self.key.clone()))
            },
            _ => Err(ConfigError::MissingBucket),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IngestConfig {
    pub destination: DestinationSettings,
    pub s3: S3Config,
    pub merge: MergePolicy,
    /// Deadline applied to each invocation that does not bring its own.
    pub invocation_timeout: Option<Duration>,
}

impl IngestConfig {
    /// Load `.env` if present, then read and validate the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }
        let config = Self::from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = MergePolicy::default();

        let merge = MergePolicy {
            mode: parse_var(CONCURRENCY_MODE_VAR)?.unwrap_or(defaults.mode),
            max_attempts: parse_var(MAX_ATTEMPTS_VAR)?.unwrap_or(defaults.max_attempts),
            initial_backoff: parse_var(BACKOFF_VAR)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_backoff),
            max_backoff: defaults.max_backoff,
        };

        Ok(Self {
            destination: DestinationSettings::from_env(),
            s3: S3Config::from_env(),
            merge,
            invocation_timeout: parse_var(TIMEOUT_VAR)?.map(Duration::from_secs),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.merge.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: MAX_ATTEMPTS_VAR,
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }
        if self.invocation_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::Invalid {
                var: TIMEOUT_VAR,
                value: "0".to_string(),
                reason: "timeout must be positive".to_string(),
            });
        }
        if self.destination.key.trim().is_empty() {
            return Err(ConfigError::Invalid {
                var: DATA_KEY_VAR,
                value: self.destination.key.clone(),
                reason: "key must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn non_empty(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
    }
}

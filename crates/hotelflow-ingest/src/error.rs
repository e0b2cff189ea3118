use crate::merge::MergeError;
use thiserror::Error;

/// Invalid or missing deployment configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("S3_BUCKET_NAME environment variable not set")]
    MissingBucket,

    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Invocation-fatal failure. Per-record decode problems never end up here.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Merge(#[from] MergeError),
}

pub type Result<T> = std::result::Result<T, IngestError>;

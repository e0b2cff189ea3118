//! S3 implementation of [`StorageBackend`].
//!
//! Conditional writes map onto S3's `If-None-Match: *` (bootstrap) and
//! `If-Match: <etag>` (append). S3 answers a lost race with 412, or 409 when
//! two conditional writes collide in flight; both become
//! [`WriteResult::PreconditionFailed`].

use super::config::S3Config;
use super::{
    ObjectLocation, ObjectMeta, StorageBackend, StorageError, WritePrecondition, WriteResult,
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{http::HttpResponse, Credentials, Region},
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
    Client,
};
use bytes::Bytes;
use tracing::{debug, info, instrument};

const CONTENT_TYPE: &str = "text/csv";

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    pub async fn new(config: S3Config) -> Self {
        let builder = Self::config_builder(&config).await;
        info!(region = %config.region, endpoint = ?config.endpoint, "S3 client initialized");

        Self::from_client(Client::from_conf(builder.build()))
    }

    /// SDK configuration for `config`, before it is built into a client.
    ///
    /// Callers may layer further settings (retry, timeouts) on the result.
    pub async fn config_builder(config: &S3Config) -> aws_sdk_s3::config::Builder {
        debug!("Initializing S3 storage with config: {:?}", redacted(config));

        let mut builder = match config.static_credentials() {
            Some((access_key, secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "hotelflow-static");
                aws_sdk_s3::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .credentials_provider(credentials)
                    .region(Region::new(config.region.clone()))
            },
            None => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        builder = builder.force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        builder
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    #[instrument(skip(self), fields(location = %location))]
    async fn head(&self, location: &ObjectLocation) -> Result<Option<ObjectMeta>, StorageError> {
        let result = self
            .client
            .head_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await;

        match result {
            Ok(output) => Ok(Some(ObjectMeta {
                size: output.content_length().unwrap_or(0).max(0) as u64,
                version: output.e_tag().map(str::to_string),
                last_modified: output.last_modified().and_then(|dt| {
                    chrono::DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
                }),
            })),
            Err(err)
                if err.as_service_error().is_some_and(|e| e.is_not_found())
                    || status_of(&err) == Some(404) =>
            {
                debug!("Object does not exist");
                Ok(None)
            },
            Err(err) => Err(classify(err, location)),
        }
    }

    #[instrument(skip(self), fields(location = %location))]
    async fn get(&self, location: &ObjectLocation) -> Result<Bytes, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    StorageError::NotFound(location.to_string())
                } else {
                    classify(err, location)
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Unavailable {
                location: location.to_string(),
                message: format!("failed to read response body: {}", e),
            })?
            .into_bytes();

        debug!("Downloaded {} bytes", data.len());

        Ok(data)
    }

    #[instrument(skip(self, data), fields(location = %location, size = data.len()))]
    async fn put(
        &self,
        location: &ObjectLocation,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult, StorageError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .content_type(CONTENT_TYPE)
            .body(ByteStream::from(data));

        request = match &precondition {
            WritePrecondition::DoesNotExist => request.if_none_match("*"),
            WritePrecondition::MatchesVersion(etag) => request.if_match(etag),
            WritePrecondition::None => request,
        };

        match request.send().await {
            Ok(output) => {
                debug!("Uploaded object");
                Ok(WriteResult::Success {
                    version: output.e_tag().map(str::to_string),
                })
            },
            Err(err) if matches!(status_of(&err), Some(409 | 412)) => {
                debug!(?precondition, "Conditional write rejected");
                Ok(WriteResult::PreconditionFailed {
                    current_version: None,
                })
            },
            Err(err) => Err(classify(err, location)),
        }
    }
}

fn status_of<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|response| response.status().as_u16())
}

fn classify<E>(err: SdkError<E, HttpResponse>, location: &ObjectLocation) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let location = location.to_string();
    let status = status_of(&err);
    let message = DisplayErrorContext(&err).to_string();

    match (&err, status) {
        (SdkError::TimeoutError(_), _) => StorageError::Timeout(location),
        (SdkError::DispatchFailure(_), _) => StorageError::Unavailable { location, message },
        (_, Some(401 | 403)) => StorageError::PermissionDenied { location, message },
        (_, Some(404)) => StorageError::NotFound(location),
        (_, Some(500..=599)) => StorageError::Unavailable { location, message },
        _ => StorageError::Backend { location, message },
    }
}

fn redacted(config: &S3Config) -> S3Config {
    S3Config {
        secret_key: config.secret_key.as_ref().map(|_| "***".to_string()),
        ..config.clone()
    }
}

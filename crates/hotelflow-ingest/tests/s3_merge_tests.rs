//! S3 merge integration tests
//!
//! **Requirements**:
//! - MinIO or S3 reachable at `S3_ENDPOINT` (e.g. "http://localhost:9000")
//! - An existing bucket named by `S3_BUCKET_NAME`
//! - Credentials via `S3_ACCESS_KEY`/`S3_SECRET_KEY` or the AWS default chain
//!
//! Tests are skipped when either variable is missing.
//!
//! **Running tests**:
//! ```bash
//! S3_ENDPOINT=http://localhost:9000 S3_PATH_STYLE=true S3_BUCKET_NAME=hotelflow-test \
//!     cargo test --test s3_merge_tests
//! ```

use hotelflow_ingest::storage::config::S3Config;
use hotelflow_ingest::storage::{StorageBackend, WritePrecondition, WriteResult};
use hotelflow_ingest::{
    DestinationSettings, IngestConfig, IngestHandler, MergeMode, MergePolicy, ObjectLocation,
    ObjectStoreMerger, S3Storage, StreamBatch, StreamRecord, TelemetryRecord,
};
use std::sync::Arc;
use uuid::Uuid;

const HEADER: &str =
    "entity_id,timestamp,occupancy_rate,bookings,cancellations,revenue_per_room,average_stay_length";

/// Setup helper that creates an S3Storage and a fresh key if S3 is available
async fn setup_storage() -> Option<(Arc<S3Storage>, ObjectLocation)> {
    if std::env::var("S3_ENDPOINT").is_err() {
        return None;
    }
    let bucket = std::env::var("S3_BUCKET_NAME").ok()?;

    let storage = S3Storage::new(S3Config::from_env()).await;
    let key = format!("test/hotelflow/{}/hotel_data.csv", Uuid::new_v4());
    Some((Arc::new(storage), ObjectLocation::new(bucket, key)))
}

fn record(entity_id: i64) -> TelemetryRecord {
    TelemetryRecord {
        entity_id: entity_id.into(),
        timestamp: "2024-01-01T00:00:00".into(),
        occupancy_rate: 0.75.into(),
        bookings: 80.into(),
        cancellations: 4.into(),
        revenue_per_room: 150.0.into(),
        average_stay_length: 2.3.into(),
    }
}

#[tokio::test]
async fn test_s3_head_missing_object() {
    let Some((storage, location)) = setup_storage().await else {
        println!("Skipping test: S3_ENDPOINT or S3_BUCKET_NAME not configured");
        return;
    };

    let meta = storage.head(&location).await.expect("Head should succeed");
    assert!(meta.is_none());
}

#[tokio::test]
async fn test_s3_bootstrap_then_append() {
    let Some((storage, location)) = setup_storage().await else {
        println!("Skipping test: S3_ENDPOINT or S3_BUCKET_NAME not configured");
        return;
    };
    let merger = ObjectStoreMerger::new(storage.clone(), MergePolicy::default());

    let first = merger
        .merge(&location, &[record(1)], None)
        .await
        .expect("Bootstrap should succeed");
    assert_eq!(first.mode, MergeMode::Bootstrap);

    let second = merger
        .merge(&location, &[record(2), record(3)], None)
        .await
        .expect("Append should succeed");
    assert_eq!(second.mode, MergeMode::Append);

    let content = storage.get(&location).await.expect("Get should succeed");
    let expected = format!(
        "{}\n{}\n{}\n{}\n",
        HEADER,
        record(1).to_csv_row(),
        record(2).to_csv_row(),
        record(3).to_csv_row()
    );
    assert_eq!(String::from_utf8_lossy(&content), expected);

    let meta = storage.head(&location).await.unwrap().expect("Object should exist");
    assert_eq!(meta.size, expected.len() as u64);
    assert_eq!(meta.version, second.version);
}

#[tokio::test]
async fn test_s3_stale_version_is_rejected() {
    let Some((storage, location)) = setup_storage().await else {
        println!("Skipping test: S3_ENDPOINT or S3_BUCKET_NAME not configured");
        return;
    };

    let created = storage
        .put(&location, "v1".into(), WritePrecondition::DoesNotExist)
        .await
        .expect("Create should succeed");
    let v1 = match created {
        WriteResult::Success { version: Some(version) } => version,
        other => panic!("expected a version token, got {:?}", other),
    };

    storage
        .put(&location, "v2".into(), WritePrecondition::MatchesVersion(v1.clone()))
        .await
        .expect("Fresh write should succeed");

    let stale = storage
        .put(&location, "v3".into(), WritePrecondition::MatchesVersion(v1))
        .await
        .expect("Stale write should not be an error");
    assert!(matches!(stale, WriteResult::PreconditionFailed { .. }));

    let again = storage
        .put(&location, "v4".into(), WritePrecondition::DoesNotExist)
        .await
        .expect("Duplicate create should not be an error");
    assert!(matches!(again, WriteResult::PreconditionFailed { .. }));
}

#[tokio::test]
async fn test_s3_handler_end_to_end() {
    let Some((storage, location)) = setup_storage().await else {
        println!("Skipping test: S3_ENDPOINT or S3_BUCKET_NAME not configured");
        return;
    };

    let config = IngestConfig {
        destination: DestinationSettings {
            bucket: Some(location.bucket.clone()),
            key: location.key.clone(),
        },
        ..IngestConfig::default()
    };
    let handler = IngestHandler::from_config(&config, storage.clone());
    let batch = StreamBatch::new(vec![
        StreamRecord::from_json(&record(3)).unwrap(),
        StreamRecord::from_encoded("not base64"),
    ]);

    let response = handler.handle(&batch).await;
    assert!(response.is_success(), "unexpected response: {:?}", response);

    let content = storage.get(&location).await.unwrap();
    assert_eq!(
        String::from_utf8_lossy(&content),
        format!("{}\n3,2024-01-01T00:00:00,0.75,80,4,150.0,2.3\n", HEADER)
    );
}

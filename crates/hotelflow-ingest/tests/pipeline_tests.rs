//! End-to-end pipeline tests
//!
//! Stream batch in, CSV object out, against the in-memory store.

mod common;

use common::*;
use hotelflow_ingest::storage::{FailureKind, OpKind};
use hotelflow_ingest::{
    DestinationSettings, IngestConfig, IngestHandler, MemoryStorage, StreamBatch, StreamRecord,
};
use std::sync::Arc;

#[tokio::test]
async fn test_single_record_into_empty_destination() {
    let storage = MemoryStorage::new();
    let batch = StreamBatch::new(vec![raw_record(
        r#"{"hotel_id": 3, "timestamp": "2024-01-01T00:00:00", "occupancy_rate": 0.75,
            "bookings": 80, "cancellations": 4, "revenue_per_room": 150.0,
            "average_stay_length": 2.3}"#,
    )]);

    let response = handler(&storage).handle(&batch).await;

    assert!(response.is_success(), "unexpected response: {:?}", response);
    assert_eq!(
        storage.object_text(&destination()).unwrap(),
        "entity_id,timestamp,occupancy_rate,bookings,cancellations,revenue_per_room,average_stay_length\n\
         3,2024-01-01T00:00:00,0.75,80,4,150.0,2.3\n"
    );
}

#[tokio::test]
async fn test_kinesis_event_json_end_to_end() {
    let storage = MemoryStorage::new();
    let event = r#"{
        "Records": [{
            "eventID": "shardId-000000000000:4960",
            "kinesis": {
                "partitionKey": "3",
                "sequenceNumber": "4960",
                "data": "eyJlbnRpdHlfaWQiOiAzLCAidGltZXN0YW1wIjogIjIwMjQtMDEtMDFUMDA6MDA6MDAiLCAib2NjdXBhbmN5X3JhdGUiOiAwLjc1LCAiYm9va2luZ3MiOiA4MCwgImNhbmNlbGxhdGlvbnMiOiA0LCAicmV2ZW51ZV9wZXJfcm9vbSI6IDE1MC4wLCAiYXZlcmFnZV9zdGF5X2xlbmd0aCI6IDIuM30="
            }
        }]
    }"#;
    let batch: StreamBatch = serde_json::from_str(event).unwrap();

    let response = handler(&storage).handle(&batch).await;

    assert!(response.is_success());
    assert_eq!(data_rows(&storage), vec!["3,2024-01-01T00:00:00,0.75,80,4,150.0,2.3"]);
}

#[tokio::test]
async fn test_string_valued_fields_are_merged_as_sent() {
    let storage = MemoryStorage::new();
    let batch = StreamBatch::new(vec![raw_record(
        r#"{"entity_id": "3", "timestamp": "2024-01-01T00:00:00", "occupancy_rate": 0.75,
            "bookings": "80", "cancellations": 4, "revenue_per_room": 150.0,
            "average_stay_length": 2.3}"#,
    )]);

    let response = handler(&storage).handle(&batch).await;

    assert!(response.is_success(), "unexpected response: {:?}", response);
    assert!(response.body.starts_with("Merged 1 of 1 records"));
    assert_eq!(data_rows(&storage), vec!["3,2024-01-01T00:00:00,0.75,80,4,150.0,2.3"]);
}

#[tokio::test]
async fn test_entity_id_and_hotel_id_both_present() {
    let storage = MemoryStorage::new();
    let batch = StreamBatch::new(vec![raw_record(
        r#"{"entity_id": 3, "hotel_id": 41, "timestamp": "2024-01-01T00:00:00",
            "occupancy_rate": 0.75, "bookings": 80, "cancellations": 4,
            "revenue_per_room": 150.0, "average_stay_length": 2.3}"#,
    )]);

    let response = handler(&storage).handle(&batch).await;

    assert!(response.is_success(), "unexpected response: {:?}", response);
    assert_eq!(data_rows(&storage), vec!["3,2024-01-01T00:00:00,0.75,80,4,150.0,2.3"]);
}

#[tokio::test]
async fn test_numbers_are_written_with_producer_digits() {
    let storage = MemoryStorage::new();
    let batch = StreamBatch::new(vec![
        raw_record(
            r#"{"entity_id": 3, "timestamp": "2024-01-01T00:00:00", "occupancy_rate": 1,
                "bookings": 80, "cancellations": 4, "revenue_per_room": 150,
                "average_stay_length": 2}"#,
        ),
        raw_record(
            r#"{"entity_id": 4, "timestamp": "2024-01-01T00:00:01", "occupancy_rate": 1e-7,
                "bookings": 80, "cancellations": 4, "revenue_per_room": 150.50,
                "average_stay_length": 2.0}"#,
        ),
    ]);

    let response = handler(&storage).handle(&batch).await;

    assert!(response.is_success(), "unexpected response: {:?}", response);
    assert_eq!(
        data_rows(&storage),
        vec![
            "3,2024-01-01T00:00:00,1,80,4,150,2",
            "4,2024-01-01T00:00:01,1e-7,80,4,150.50,2.0",
        ]
    );
}

#[tokio::test]
async fn test_bad_record_is_skipped_and_rest_merged() {
    let storage = MemoryStorage::new();
    let good = telemetry(1);
    let batch = StreamBatch::new(vec![
        StreamRecord::from_json(&good).unwrap(),
        StreamRecord::from_encoded("this is not base64!"),
    ]);

    let response = handler(&storage).handle(&batch).await;

    assert!(response.is_success());
    assert_eq!(
        response.body,
        format!("Merged 1 of 2 records into {}", destination())
    );
    assert_eq!(data_rows(&storage), vec![good.to_csv_row()]);
}

#[tokio::test]
async fn test_decode_failures_keep_order_of_survivors() {
    let storage = MemoryStorage::new();
    let batch = StreamBatch::new(vec![
        StreamRecord::from_json(&telemetry(1)).unwrap(),
        raw_record(r#"{"entity_id": 2, "timestamp": "#),
        StreamRecord::from_json(&telemetry(3)).unwrap(),
        raw_record("[1, 2, 3]"),
        StreamRecord::default(),
        StreamRecord::from_json(&telemetry(4)).unwrap(),
    ]);

    let summary = handler(&storage).run(&batch, None).await.unwrap();

    assert_eq!(summary.received, 6);
    assert_eq!(summary.rejected, 3);
    assert_eq!(
        data_rows(&storage),
        vec![
            telemetry(1).to_csv_row(),
            telemetry(3).to_csv_row(),
            telemetry(4).to_csv_row()
        ]
    );
}

#[tokio::test]
async fn test_missing_bucket_fails_without_store_access() {
    let storage = MemoryStorage::new();
    let handler = IngestHandler::from_config(&IngestConfig::default(), Arc::new(storage.clone()));

    let response = handler.handle(&batch_of(&[telemetry(1)])).await;

    assert_eq!(response.status_code, 500);
    assert!(response.body.starts_with("Error processing data:"));
    assert!(response.body.contains("S3_BUCKET_NAME"));
    assert_eq!(storage.operation_count(), 0);
}

#[tokio::test]
async fn test_blank_bucket_is_missing_bucket() {
    let storage = MemoryStorage::new();
    let config = IngestConfig {
        destination: DestinationSettings {
            bucket: Some(String::new()),
            ..DestinationSettings::default()
        },
        ..IngestConfig::default()
    };
    let handler = IngestHandler::from_config(&config, Arc::new(storage.clone()));

    assert_eq!(handler.handle(&StreamBatch::default()).await.status_code, 500);
    assert_eq!(storage.operation_count(), 0);
}

#[tokio::test]
async fn test_all_undecodable_is_noop_success() {
    let storage = MemoryStorage::new();
    let batch = StreamBatch::new(vec![
        StreamRecord::from_encoded("@@@"),
        raw_record(r#"{"entity_id": 1}"#),
    ]);

    let response = handler(&storage).handle(&batch).await;

    assert!(response.is_success());
    assert_eq!(
        response.body,
        format!("Merged 0 of 2 records into {}", destination())
    );
    assert_eq!(storage.operation_count(), 0);
    assert!(storage.object(&destination()).is_none());
}

#[tokio::test]
async fn test_empty_batch_is_noop_success() {
    let storage = MemoryStorage::new();
    let response = handler(&storage).handle(&StreamBatch::default()).await;

    assert!(response.is_success());
    assert_eq!(storage.operation_count(), 0);
}

#[tokio::test]
async fn test_successive_invocations_append() {
    let storage = MemoryStorage::new();
    let handler = handler(&storage);

    handler.handle(&batch_of(&[telemetry(1), telemetry(2)])).await;
    handler.handle(&batch_of(&[telemetry(3)])).await;

    let content = storage.object_text(&destination()).unwrap();
    assert_eq!(content.matches(HEADER).count(), 1);
    assert_eq!(
        data_rows(&storage),
        vec![
            telemetry(1).to_csv_row(),
            telemetry(2).to_csv_row(),
            telemetry(3).to_csv_row()
        ]
    );
}

#[tokio::test]
async fn test_duplicate_deliveries_are_not_deduplicated() {
    let storage = MemoryStorage::new();
    let record = StreamRecord::from_json(&telemetry(5)).unwrap();

    handler(&storage)
        .handle(&StreamBatch::new(vec![record.clone(), record]))
        .await;

    assert_eq!(data_rows(&storage).len(), 2);
}

#[tokio::test]
async fn test_injected_failures_become_500() {
    for (kind, stage) in [
        (OpKind::Head, "probe"),
        (OpKind::Get, "fetch"),
        (OpKind::Put, "write"),
    ] {
        let storage = MemoryStorage::new();
        storage.insert(&destination(), format!("{}\n", HEADER));
        storage.inject_failure(kind, FailureKind::Unavailable);

        let response = handler(&storage).handle(&batch_of(&[telemetry(1)])).await;

        assert_eq!(response.status_code, 500, "{:?} failure", kind);
        assert!(
            response.body.starts_with(&format!("Error processing data: {} of", stage)),
            "unexpected body: {}",
            response.body
        );
        assert_eq!(
            storage.object_text(&destination()).unwrap(),
            format!("{}\n", HEADER)
        );
    }
}

#[tokio::test]
async fn test_permission_denied_names_cause() {
    let storage = MemoryStorage::new();
    storage.inject_failure(OpKind::Put, FailureKind::PermissionDenied);

    let response = handler(&storage).handle(&batch_of(&[telemetry(1)])).await;

    assert_eq!(response.status_code, 500);
    assert!(response.body.contains("permission denied"));
}

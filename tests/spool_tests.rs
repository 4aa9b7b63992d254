// DurableSpool tests: connect, init, store, read back, mark_sent

mod common;

use chrono::{TimeZone, Utc};
use common::aggregate;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use std::io::Write;
use telemetry_agent::error::SpoolError;
use telemetry_agent::spool::{DurableSpool, Spool};
use tempfile::TempDir;

/// Aggregate as the previous agent spooled it: offset-less timestamp, integer zeros, no rates.
const LEGACY_PAYLOAD: &str = r#"{
    "timestamp": "2024-05-01T12:00:00.123456",
    "system_info": {"hostname": "old-host", "ip_address": "192.168.1.20", "os": "Linux",
                    "platform": "Linux-5.15-x86_64", "processor": "x86_64", "machine": "x86_64"},
    "metrics": {
        "cpu": {"usage_percent": 12.5, "core_count": 8, "frequency_mhz": null,
                "per_core": [10.0, 15.0], "min": 12.5, "max": 12.5, "std_dev": 0},
        "memory": {"total": 16000, "used": 8000, "percent": 50.0,
                   "used_avg": 8000, "percent_avg": 50.0, "peak_usage": 8000},
        "disk": {"total": 500000, "used": 100000, "percent": 20.0,
                 "used_avg": 100000, "percent_avg": 20.0},
        "network": {"bytes_sent": 10, "bytes_recv": 20, "packets_sent": 1, "packets_recv": 2,
                    "errin": 0, "errout": 0, "bytes_sent_total": 10, "bytes_recv_total": 20,
                    "packets_sent_total": 1, "packets_recv_total": 2,
                    "errors_in_total": 0, "errors_out_total": 0}
    }
}"#;

/// Inserts a row the way the previous agent did: bare zlib stream, no version byte.
async fn insert_legacy_row(db_path: &std::path::Path, json: &str) {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json.as_bytes()).unwrap();
    let data = encoder.finish().unwrap();

    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}", db_path.display()))
        .await
        .unwrap();
    sqlx::query("INSERT INTO metrics (timestamp, data, sent) VALUES ($1, $2, 0)")
        .bind("2024-05-01T12:00:00.123456")
        .bind(data)
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;
}

async fn open_spool(dir: &TempDir) -> DurableSpool {
    let path = dir.path().join("data").join("metrics.db");
    let spool = DurableSpool::connect(path.to_str().unwrap()).await.unwrap();
    spool.init().await.unwrap();
    spool
}

#[tokio::test]
async fn spool_connect_creates_parent_dir_and_init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let spool = open_spool(&dir).await;
    // Second init is no-op (IF NOT EXISTS)
    spool.init().await.unwrap();
    assert!(dir.path().join("data").join("metrics.db").exists());
    assert_eq!(spool.count_unsent().await.unwrap(), 0);
}

#[tokio::test]
async fn stored_payload_decompresses_to_original_json() {
    let dir = TempDir::new().unwrap();
    let spool = open_spool(&dir).await;
    let payload = aggregate(33.0);

    let id = spool.store(&payload).await.unwrap();
    let records = spool.unsent(10).await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.id, id);
    assert!(!record.sent);
    assert_eq!(record.timestamp, payload.timestamp.to_rfc3339());
    assert_eq!(
        record.payload_json().unwrap(),
        serde_json::to_vec(&payload).unwrap()
    );
    assert_eq!(record.aggregate().unwrap(), payload);
}

#[tokio::test]
async fn records_come_back_oldest_first_with_limit() {
    let dir = TempDir::new().unwrap();
    let spool = open_spool(&dir).await;
    for i in 1..=4 {
        spool.store(&aggregate(i as f64)).await.unwrap();
    }
    assert_eq!(spool.count_unsent().await.unwrap(), 4);

    let records = spool.unsent(2).await.unwrap();
    let cpu: Vec<f64> = records
        .iter()
        .map(|r| r.aggregate().unwrap().metrics.cpu.usage_percent)
        .collect();
    assert_eq!(cpu, vec![1.0, 2.0]);
    assert!(records[0].id < records[1].id);
}

#[tokio::test]
async fn mark_sent_hides_record_from_unsent() {
    let dir = TempDir::new().unwrap();
    let spool = open_spool(&dir).await;
    let first = spool.store(&aggregate(1.0)).await.unwrap();
    spool.store(&aggregate(2.0)).await.unwrap();

    assert!(spool.mark_sent(first).await.unwrap());
    // Already sent: nothing to update.
    assert!(!spool.mark_sent(first).await.unwrap());
    assert!(!spool.mark_sent(9_999).await.unwrap());

    assert_eq!(spool.count_unsent().await.unwrap(), 1);
    let remaining = spool.unsent(10).await.unwrap();
    assert_eq!(remaining[0].aggregate().unwrap().metrics.cpu.usage_percent, 2.0);
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let spool = open_spool(&dir).await;
        spool.store(&aggregate(7.0)).await.unwrap();
    }
    let spool = open_spool(&dir).await;
    assert_eq!(spool.count_unsent().await.unwrap(), 1);
}

#[tokio::test]
async fn legacy_record_with_naive_timestamp_reads_back() {
    let dir = TempDir::new().unwrap();
    let spool = open_spool(&dir).await;
    insert_legacy_row(&dir.path().join("data").join("metrics.db"), LEGACY_PAYLOAD).await;

    let records = spool.unsent(10).await.unwrap();
    assert_eq!(records.len(), 1);
    let legacy = records[0].aggregate().unwrap();
    let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
        + chrono::Duration::microseconds(123_456);
    assert_eq!(legacy.timestamp, expected);
    assert_eq!(legacy.system_info.hostname, "old-host");
    assert_eq!(legacy.metrics.cpu.std_dev, 0.0);
    assert_eq!(legacy.metrics.cpu.frequency_mhz, None);
    assert!(legacy.metrics.network.transfer_rate_send.is_none());
}

#[tokio::test]
async fn unparseable_payload_is_a_decode_error() {
    let dir = TempDir::new().unwrap();
    let spool = open_spool(&dir).await;
    insert_legacy_row(&dir.path().join("data").join("metrics.db"), r#"{"timestamp":"yesterday"}"#)
        .await;

    let records = spool.unsent(10).await.unwrap();
    assert!(records[0].payload_json().is_ok());
    let err = records[0].aggregate().unwrap_err();
    assert!(matches!(err, SpoolError::Decode(_)), "{err:?}");
}

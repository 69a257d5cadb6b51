//! Streaming writes: blobs, record streams, aborts, and capability checks.

use std::{
    io::{Read, Write},
    sync::Arc,
};

use futures::TryStreamExt as _;
use lode_codec::{Codec, CodecError, GzipCompressor, JsonlCodec};
use lode_common::{Metadata, Record};
use lode_dataset::{BlobRowCount, Dataset, DatasetConfig, WriteError};
use lode_store::{MemoryStore, Store as _};
use serde_json::json;

fn blob_dataset(store: &MemoryStore) -> Dataset {
    Dataset::new("blobs", Arc::new(store.clone()), DatasetConfig::default()).unwrap()
}

fn record_dataset(store: &MemoryStore) -> Dataset {
    Dataset::new(
        "events",
        Arc::new(store.clone()),
        DatasetConfig {
            codec: Some(Arc::new(JsonlCodec)),
            ..Default::default()
        },
    )
    .unwrap()
}

#[tokio::test]
async fn streaming_blob_commit_round_trips() {
    let store = MemoryStore::new();
    let dataset = blob_dataset(&store);

    let mut writer = dataset
        .write_blob_stream([("kind", "raw")].into_iter().collect())
        .await
        .unwrap();
    writer.write_bytes(b"hello ").await.unwrap();
    writer.write_bytes(b"blob world").await.unwrap();
    let snapshot = writer.commit().await.unwrap();

    assert_eq!(snapshot.manifest.codec, "noop");
    assert_eq!(snapshot.manifest.row_count, 1);
    let file = &snapshot.manifest.files()[0];
    assert_eq!(file.size_bytes, 16);

    let chunks: Vec<bytes::Bytes> = dataset
        .open_blob(&snapshot.id, &file.path)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(chunks.concat(), b"hello blob world");
}

#[tokio::test]
async fn streaming_blob_abort_leaves_nothing() {
    let store = MemoryStore::new();
    let dataset = blob_dataset(&store);
    let reader = dataset.reader();

    // Pre-abort state: one committed snapshot.
    let mut writer = dataset.write_blob_stream(Metadata::new()).await.unwrap();
    writer.write_bytes(b"keep me").await.unwrap();
    let kept = writer.commit().await.unwrap();
    let before = reader.list_segments(dataset.id()).await.unwrap();

    let mut writer = dataset.write_blob_stream(Metadata::new()).await.unwrap();
    writer.write_bytes(&vec![0u8; 4096]).await.unwrap();
    writer.write_bytes(&vec![1u8; 4096]).await.unwrap();
    writer.abort().await;

    // No manifest, no data object, and discovery is unchanged.
    let after = reader.list_segments(dataset.id()).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, kept.id);

    let all_keys = store.list("").await.unwrap();
    let mine: Vec<_> = all_keys
        .iter()
        .filter(|k| !k.contains(kept.id.as_str()))
        .collect();
    assert!(mine.is_empty(), "leftover objects: {mine:?}");
}

#[tokio::test]
async fn streaming_records_commit_round_trips() {
    let store = MemoryStore::new();
    let dataset = record_dataset(&store);

    let mut writer = dataset.write_stream(Metadata::new()).await.unwrap();
    for i in 0..10 {
        writer.write_record(&json!({"seq": i})).await.unwrap();
    }
    let snapshot = writer.commit().await.unwrap();

    assert_eq!(snapshot.manifest.row_count, 10);
    let records = dataset.read(&snapshot.id).await.unwrap();
    assert_eq!(records.len(), 10);
    assert_eq!(records[0], json!({"seq": 0}));
    assert_eq!(records[9], json!({"seq": 9}));
}

#[tokio::test]
async fn streaming_records_through_compressor() {
    let store = MemoryStore::new();
    let dataset = Dataset::new(
        "events",
        Arc::new(store.clone()),
        DatasetConfig {
            codec: Some(Arc::new(JsonlCodec)),
            compressor: Some(Arc::new(GzipCompressor)),
            ..Default::default()
        },
    )
    .unwrap();

    let mut writer = dataset.write_stream(Metadata::new()).await.unwrap();
    for i in 0..100 {
        writer.write_record(&json!({"seq": i, "pad": "x".repeat(64)})).await.unwrap();
    }
    let snapshot = writer.commit().await.unwrap();

    assert!(snapshot.manifest.files()[0].path.ends_with(".jsonl.gz"));
    assert_eq!(dataset.read(&snapshot.id).await.unwrap().len(), 100);
}

/// A codec that needs its whole input before it can write anything, like
/// footer-based columnar formats.
#[derive(Debug, Clone, Copy)]
struct PackedCodec;

impl Codec for PackedCodec {
    fn name(&self) -> &str {
        "packed"
    }

    fn file_extension(&self) -> Option<&str> {
        Some(".packed")
    }

    fn encode(&self, writer: &mut dyn Write, records: &[Record]) -> Result<(), CodecError> {
        serde_json::to_writer(writer, records).map_err(|err| CodecError::SchemaViolation {
            message: err.to_string(),
        })
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<Vec<Record>, CodecError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        serde_json::from_slice(&buf).map_err(|err| CodecError::InvalidFormat {
            codec: "packed".to_string(),
            message: err.to_string(),
        })
    }
}

#[tokio::test]
async fn non_streamable_codec_rejects_streaming_writes() {
    let store = MemoryStore::new();
    let dataset = Dataset::new(
        "events",
        Arc::new(store.clone()),
        DatasetConfig {
            codec: Some(Arc::new(PackedCodec)),
            ..Default::default()
        },
    )
    .unwrap();

    let err = dataset.write_stream(Metadata::new()).await.err().unwrap();
    assert!(matches!(
        err,
        WriteError::Codec(CodecError::NotStreamable { .. })
    ));
    assert!(store.is_empty().await);

    // Batch writes still work.
    let records = vec![json!({"id": 1}), json!({"id": 2})];
    let snapshot = dataset.write(&records, Metadata::new()).await.unwrap();
    assert_eq!(snapshot.manifest.codec, "packed");
    assert_eq!(dataset.read(&snapshot.id).await.unwrap(), records);
}

#[tokio::test]
async fn blob_row_count_is_caller_chosen() {
    let store = MemoryStore::new();
    let dataset = blob_dataset(&store);

    let mut writer = dataset
        .write_blob_stream(Metadata::new())
        .await
        .unwrap()
        .blob_row_count(BlobRowCount::Zero);
    writer.write_bytes(b"x").await.unwrap();
    let snapshot = writer.commit().await.unwrap();
    assert_eq!(snapshot.manifest.row_count, 0);
}

#[tokio::test]
async fn mode_mismatch_is_rejected_without_poisoning() {
    let store = MemoryStore::new();
    let dataset = record_dataset(&store);

    let mut writer = dataset.write_stream(Metadata::new()).await.unwrap();
    let err = writer.write_bytes(b"raw").await.unwrap_err();
    assert!(matches!(err, WriteError::NotBlob { .. }));

    // The stream is still usable after the misuse.
    writer.write_record(&json!({"ok": true})).await.unwrap();
    let snapshot = writer.commit().await.unwrap();
    assert_eq!(snapshot.manifest.row_count, 1);
}

#[tokio::test]
async fn record_writes_on_blob_writer_are_rejected() {
    let store = MemoryStore::new();
    let dataset = blob_dataset(&store);
    let mut writer = dataset.write_blob_stream(Metadata::new()).await.unwrap();
    let err = writer.write_record(&json!({})).await.unwrap_err();
    assert!(matches!(err, WriteError::BlobOnly { .. }));
    writer.abort().await;
}

#[tokio::test]
async fn blob_writes_on_record_dataset_are_rejected() {
    let store = MemoryStore::new();
    let dataset = record_dataset(&store);
    let err = dataset.write_blob_stream(Metadata::new()).await.err().unwrap();
    assert!(matches!(err, WriteError::NotBlob { .. }));

    let blob = blob_dataset(&store);
    let err = blob.write_stream(Metadata::new()).await.err().unwrap();
    assert!(matches!(err, WriteError::BlobOnly { .. }));
}

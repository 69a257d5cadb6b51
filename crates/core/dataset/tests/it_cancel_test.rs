//! Cancellation of in-flight writes.

use std::sync::Arc;

use lode_codec::JsonlCodec;
use lode_common::Metadata;
use lode_dataset::{Dataset, DatasetConfig, WriteError};
use lode_store::MemoryStore;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn dataset(store: &MemoryStore) -> Dataset {
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
async fn cancelled_write_commits_nothing() {
    let store = MemoryStore::new();
    let dataset = dataset(&store);

    let token = CancellationToken::new();
    token.cancel();

    let records: Vec<_> = (0..100).map(|i| json!({"seq": i})).collect();
    let err = dataset
        .write_with_cancel(&records, Metadata::new(), &token)
        .await
        .unwrap_err();
    assert!(matches!(err, WriteError::Cancelled));

    // Cleanup ran despite the cancelled caller context: no data objects,
    // no manifest, nothing discoverable.
    assert!(store.is_empty().await);
    let reader = dataset.reader();
    assert!(reader.list_datasets().await.unwrap().is_empty());
}

#[tokio::test]
async fn uncancelled_token_does_not_interfere() {
    let store = MemoryStore::new();
    let dataset = dataset(&store);
    let token = CancellationToken::new();
    let snapshot = dataset
        .write_with_cancel(&[json!({"id": 1})], Metadata::new(), &token)
        .await
        .unwrap();
    assert_eq!(dataset.read(&snapshot.id).await.unwrap().len(), 1);
}

//! Range-read capability detection through the reader.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use lode_common::Metadata;
use lode_dataset::{Dataset, DatasetConfig, ReadError, Reader};
use lode_store::{ByteStream, MemoryStore, ObjectSink, Store, StoreError};

/// Delegating store that does not expose the range-read capability.
#[derive(Clone)]
struct NoRangeStore(MemoryStore);

#[async_trait]
impl Store for NoRangeStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        self.0.put(key, data).await
    }

    async fn put_stream(&self, key: &str) -> Result<Box<dyn ObjectSink>, StoreError> {
        self.0.put_stream(key).await
    }

    async fn get(&self, key: &str) -> Result<ByteStream, StoreError> {
        self.0.get(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.0.exists(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.0.list(prefix).await
    }
}

async fn blob_snapshot(store: &MemoryStore) -> (lode_dataset::Snapshot, String) {
    let dataset = Dataset::new("blobs", Arc::new(store.clone()), DatasetConfig::default()).unwrap();
    let mut writer = dataset.write_blob_stream(Metadata::new()).await.unwrap();
    writer.write_bytes(b"0123456789").await.unwrap();
    let snapshot = writer.commit().await.unwrap();
    let path = snapshot.manifest.files()[0].path.clone();
    (snapshot, path)
}

#[tokio::test]
async fn range_capable_store_serves_true_ranges() {
    let store = MemoryStore::new();
    let (snapshot, path) = blob_snapshot(&store).await;

    let reader = Reader::new(Arc::new(store));
    let dataset = "blobs".parse().unwrap();

    let bytes = reader
        .read_file_range(&dataset, &snapshot.id, &path, 2, 4)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"2345");

    // Past-EOF ranges clamp; at-EOF offsets yield empty.
    let tail = reader
        .read_file_range(&dataset, &snapshot.id, &path, 8, 100)
        .await
        .unwrap();
    assert_eq!(&tail[..], b"89");
    let empty = reader
        .read_file_range(&dataset, &snapshot.id, &path, 10, 1)
        .await
        .unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn incapable_store_surfaces_range_read_not_supported() {
    let inner = MemoryStore::new();
    let (snapshot, path) = blob_snapshot(&inner).await;

    let reader = Reader::new(Arc::new(NoRangeStore(inner)));
    let err = reader
        .read_file_range(&"blobs".parse().unwrap(), &snapshot.id, &path, 0, 4)
        .await
        .unwrap_err();
    assert!(matches!(err, ReadError::RangeReadNotSupported));
}

#[tokio::test]
async fn unlisted_paths_are_not_served() {
    let store = MemoryStore::new();
    let (snapshot, _) = blob_snapshot(&store).await;

    let reader = Reader::new(Arc::new(store));
    let err = reader
        .read_file_range(
            &"blobs".parse().unwrap(),
            &snapshot.id,
            "datasets/blobs/other/object",
            0,
            4,
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

//! In-memory store implementation (not crash-safe).

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::{
    ByteStream, MutableStore, ObjectSink, RangeReadStore, SizedReader, Store, StoreError,
    validate_key,
};

/// In-memory implementation of [`Store`] (not crash-safe).
///
/// Contents are lost on process exit, so this is suitable for development,
/// testing, and embedding. The one-shot [`put`](Store::put) is atomic under
/// an internal lock; [`put_stream`](Store::put_stream) buffers and installs
/// the object on finish with a final existence re-check, so its overwrite
/// protection is stronger than the contract requires. `list` and `exists`
/// are immediately consistent. Range reads are true ranges over the stored
/// buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
}

impl MemoryStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut objects = self.objects.write().await;
        if objects.contains_key(key) {
            return Err(StoreError::AlreadyExists {
                path: key.to_string(),
            });
        }
        objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn put_stream(&self, key: &str) -> Result<Box<dyn ObjectSink>, StoreError> {
        validate_key(key)?;
        if self.exists(key).await? {
            return Err(StoreError::AlreadyExists {
                path: key.to_string(),
            });
        }
        Ok(Box::new(MemorySink {
            store: self.clone(),
            key: key.to_string(),
            buf: Vec::new(),
        }))
    }

    async fn get(&self, key: &str) -> Result<ByteStream, StoreError> {
        validate_key(key)?;
        let objects = self.objects.read().await;
        let data = objects.get(key).cloned().ok_or_else(|| StoreError::NotFound {
            path: key.to_string(),
        })?;
        let stream = futures::stream::once(async move { Ok::<Bytes, StoreError>(data) });
        Ok(Box::pin(stream))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let objects = self.objects.read().await;
        Ok(objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn as_range_read(&self) -> Option<&dyn RangeReadStore> {
        Some(self)
    }
}

#[async_trait]
impl MutableStore for MemoryStore {
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.objects.write().await.remove(key);
        Ok(())
    }
}

#[async_trait]
impl RangeReadStore for MemoryStore {
    async fn stat(&self, key: &str) -> Result<u64, StoreError> {
        validate_key(key)?;
        let objects = self.objects.read().await;
        objects
            .get(key)
            .map(|data| data.len() as u64)
            .ok_or_else(|| StoreError::NotFound {
                path: key.to_string(),
            })
    }

    async fn read_range(&self, key: &str, offset: u64, length: u64) -> Result<Bytes, StoreError> {
        validate_key(key)?;
        if offset.checked_add(length).is_none() {
            return Err(StoreError::InvalidPath {
                path: key.to_string(),
                reason: "range offset + length overflows".to_string(),
            });
        }
        let objects = self.objects.read().await;
        let data = objects.get(key).ok_or_else(|| StoreError::NotFound {
            path: key.to_string(),
        })?;
        let size = data.len() as u64;
        if offset >= size {
            return Ok(Bytes::new());
        }
        let end = (offset + length).min(size);
        Ok(data.slice(offset as usize..end as usize))
    }

    async fn reader_at(&self, key: &str) -> Result<SizedReader<'_>, StoreError> {
        let size = self.stat(key).await?;
        Ok(SizedReader::new(self, key, size))
    }
}

struct MemorySink {
    store: MemoryStore,
    key: String,
    buf: Vec<u8>,
}

#[async_trait]
impl ObjectSink for MemorySink {
    async fn write(&mut self, chunk: Bytes) -> Result<(), StoreError> {
        self.buf.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<(), StoreError> {
        self.store.put(&self.key, Bytes::from(self.buf)).await
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

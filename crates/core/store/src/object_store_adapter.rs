//! Adapter over the [`object_store`] crate.
//!
//! This is the production adapter: one type covering AWS S3, Google Cloud
//! Storage, Azure Blob Storage, the local filesystem, and the crate's
//! in-memory backend, selected by URL scheme. Cloud providers are
//! configured from the environment (`AWS_*`, `GOOGLE_*`, `AZURE_*`) the
//! usual way.
//!
//! Guarantees, per backend primitive:
//! - One-shot [`put`](crate::Store::put) uses `PutMode::Create`
//!   (`If-None-Match: "*"` on stores that support it), so overwrite
//!   protection is atomic.
//! - [`put_stream`](crate::Store::put_stream) runs a preflight existence
//!   check and then a buffered multipart upload; overwrite protection is
//!   best-effort for the duration of the upload.
//! - `list` and `exists` inherit the backend's consistency (strong on S3,
//!   GCS, Azure, and local fs).
//! - Range reads are true ranged requests.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt as _;
use object_store::{
    ObjectStore as _, PutMode, PutOptions, PutPayload,
    aws::AmazonS3Builder,
    azure::MicrosoftAzureBuilder,
    buffered::BufWriter,
    gcp::GoogleCloudStorageBuilder,
    local::LocalFileSystem,
    memory::InMemory,
    path::Path,
};
use tokio::io::AsyncWriteExt as _;

use crate::{
    ByteStream, DEFAULT_ONE_SHOT_LIMIT, MutableStore, ObjectSink, RangeReadStore, SizedReader,
    Store, StoreError, validate_key,
};

/// [`Store`] adapter backed by any [`object_store::ObjectStore`].
#[derive(Debug, Clone)]
pub struct ObjectStoreAdapter {
    inner: Arc<dyn object_store::ObjectStore>,
    one_shot_limit: usize,
}

impl ObjectStoreAdapter {
    /// Wraps an existing backend.
    pub fn new(inner: Arc<dyn object_store::ObjectStore>) -> Self {
        Self {
            inner,
            one_shot_limit: DEFAULT_ONE_SHOT_LIMIT,
        }
    }

    /// Creates an adapter from a URL.
    ///
    /// Supported schemes: `s3://bucket[/prefix]`, `gs://bucket[/prefix]`,
    /// `az://container[/prefix]`, `file:///path`, `memory://`.
    pub fn from_url(url: &str) -> Result<Self, AdapterCreationError> {
        let scheme = url.split_once("://").map(|(scheme, _)| scheme);
        let inner: Arc<dyn object_store::ObjectStore> = match scheme {
            Some("memory") => Arc::new(InMemory::new()),
            Some("file") => {
                let path = url.trim_start_matches("file://");
                let store = LocalFileSystem::new_with_prefix(path)
                    .map_err(|source| AdapterCreationError::new(url, source))?;
                Arc::new(store)
            }
            Some("s3" | "s3a") => {
                let store = AmazonS3Builder::from_env()
                    .with_url(url)
                    .build()
                    .map_err(|source| AdapterCreationError::new(url, source))?;
                Arc::new(store)
            }
            Some("gs") => {
                let store = GoogleCloudStorageBuilder::from_env()
                    .with_url(url)
                    .build()
                    .map_err(|source| AdapterCreationError::new(url, source))?;
                Arc::new(store)
            }
            Some("az" | "azure" | "abfs" | "abfss") => {
                let store = MicrosoftAzureBuilder::from_env()
                    .with_url(url)
                    .build()
                    .map_err(|source| AdapterCreationError::new(url, source))?;
                Arc::new(store)
            }
            _ => return Err(AdapterCreationError::unsupported(url)),
        };
        Ok(Self::new(inner))
    }

    /// Overrides the one-shot size threshold.
    pub fn with_one_shot_limit(mut self, limit: usize) -> Self {
        self.one_shot_limit = limit;
        self
    }

    fn parse_path(key: &str) -> Result<Path, StoreError> {
        validate_key(key)?;
        Path::parse(key).map_err(|err| StoreError::InvalidPath {
            path: key.to_string(),
            reason: err.to_string(),
        })
    }
}

fn map_backend_err(err: object_store::Error, path: &str) -> StoreError {
    match err {
        object_store::Error::NotFound { .. } => StoreError::NotFound {
            path: path.to_string(),
        },
        object_store::Error::AlreadyExists { .. } => StoreError::AlreadyExists {
            path: path.to_string(),
        },
        source => StoreError::Backend {
            path: path.to_string(),
            source,
        },
    }
}

#[async_trait]
impl Store for ObjectStoreAdapter {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        let path = Self::parse_path(key)?;
        self.inner
            .put_opts(
                &path,
                PutPayload::from(data),
                PutOptions::from(PutMode::Create),
            )
            .await
            .map_err(|err| map_backend_err(err, key))?;
        Ok(())
    }

    async fn put_stream(&self, key: &str) -> Result<Box<dyn ObjectSink>, StoreError> {
        let path = Self::parse_path(key)?;
        if self.exists(key).await? {
            return Err(StoreError::AlreadyExists {
                path: key.to_string(),
            });
        }
        let writer = BufWriter::with_capacity(self.inner.clone(), path, self.one_shot_limit);
        Ok(Box::new(BufWriterSink {
            writer,
            key: key.to_string(),
        }))
    }

    async fn get(&self, key: &str) -> Result<ByteStream, StoreError> {
        let path = Self::parse_path(key)?;
        let result = self
            .inner
            .get(&path)
            .await
            .map_err(|err| map_backend_err(err, key))?;
        let key = key.to_string();
        Ok(result
            .into_stream()
            .map(move |chunk| chunk.map_err(|err| map_backend_err(err, &key)))
            .boxed())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = Self::parse_path(key)?;
        match self.inner.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(map_backend_err(err, key)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let path = if prefix.is_empty() {
            None
        } else {
            Some(Path::parse(prefix.trim_end_matches('/')).map_err(|err| {
                StoreError::InvalidPath {
                    path: prefix.to_string(),
                    reason: err.to_string(),
                }
            })?)
        };
        let mut stream = self.inner.list(path.as_ref());
        let mut keys = Vec::new();
        while let Some(meta) = stream.next().await {
            let meta = meta.map_err(|err| map_backend_err(err, prefix))?;
            keys.push(meta.location.as_ref().to_string());
        }
        Ok(keys)
    }

    fn one_shot_limit(&self) -> usize {
        self.one_shot_limit
    }

    fn as_range_read(&self) -> Option<&dyn RangeReadStore> {
        Some(self)
    }
}

#[async_trait]
impl MutableStore for ObjectStoreAdapter {
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = Self::parse_path(key)?;
        match self.inner.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(err) => Err(map_backend_err(err, key)),
        }
    }
}

#[async_trait]
impl RangeReadStore for ObjectStoreAdapter {
    async fn stat(&self, key: &str) -> Result<u64, StoreError> {
        let path = Self::parse_path(key)?;
        let meta = self
            .inner
            .head(&path)
            .await
            .map_err(|err| map_backend_err(err, key))?;
        Ok(meta.size)
    }

    async fn read_range(&self, key: &str, offset: u64, length: u64) -> Result<Bytes, StoreError> {
        let path = Self::parse_path(key)?;
        let Some(requested_end) = offset.checked_add(length) else {
            return Err(StoreError::InvalidPath {
                path: key.to_string(),
                reason: "range offset + length overflows".to_string(),
            });
        };
        // Clamp against the object's size so out-of-bounds ranges degrade to
        // "available bytes" rather than a backend error.
        let size = self.stat(key).await?;
        if offset >= size {
            return Ok(Bytes::new());
        }
        let end = requested_end.min(size);
        self.inner
            .get_range(&path, offset..end)
            .await
            .map_err(|err| map_backend_err(err, key))
    }

    async fn reader_at(&self, key: &str) -> Result<SizedReader<'_>, StoreError> {
        let size = self.stat(key).await?;
        Ok(SizedReader::new(self, key, size))
    }
}

struct BufWriterSink {
    writer: BufWriter,
    key: String,
}

#[async_trait]
impl ObjectSink for BufWriterSink {
    async fn write(&mut self, chunk: Bytes) -> Result<(), StoreError> {
        self.writer
            .write_all(&chunk)
            .await
            .map_err(|source| StoreError::Io {
                path: self.key.clone(),
                source,
            })
    }

    async fn finish(mut self: Box<Self>) -> Result<(), StoreError> {
        self.writer
            .shutdown()
            .await
            .map_err(|source| StoreError::Io {
                path: self.key.clone(),
                source,
            })
    }

    async fn abort(mut self: Box<Self>) -> Result<(), StoreError> {
        self.writer
            .abort()
            .await
            .map_err(|err| map_backend_err(err, &self.key))
    }
}

/// Failed to create an object store adapter from a URL.
#[derive(Debug, thiserror::Error)]
#[error("failed to create object store for {url}")]
pub struct AdapterCreationError {
    url: String,
    #[source]
    source: Option<object_store::Error>,
}

impl AdapterCreationError {
    fn new(url: &str, source: object_store::Error) -> Self {
        Self {
            url: url.to_string(),
            source: Some(source),
        }
    }

    fn unsupported(url: &str) -> Self {
        Self {
            url: url.to_string(),
            source: None,
        }
    }
}

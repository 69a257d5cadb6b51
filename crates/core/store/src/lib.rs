//! Backend-agnostic object store contracts.
//!
//! [`Store`] is the adapter contract every backend satisfies: keyed byte
//! objects with no-overwrite puts, streamed gets, prefix listing, and a
//! non-mutating existence check. Deletion lives on the separate
//! [`MutableStore`] capability so the public dataset surface can hold a
//! store without ever reaching deletion. Range reads are an optional
//! capability ([`RangeReadStore`]) discovered through
//! [`Store::as_range_read`]; consumers fall back to whole-object reads or
//! surface the lack of support — they never simulate range reads by
//! downloading everything.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

pub mod memory;
pub mod object_store_adapter;

pub use memory::MemoryStore;
pub use object_store_adapter::ObjectStoreAdapter;

/// Byte chunks of one object, streamed in order.
pub type ByteStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// Default cutoff between the one-shot and streaming put paths.
pub const DEFAULT_ONE_SHOT_LIMIT: usize = 8 * 1024 * 1024;

/// A keyed, write-once object store.
///
/// Keys are forward-slash separated; adapters must not inject
/// backend-specific separators. Adapters document their `list`/`exists`
/// consistency guarantees and their one-shot size threshold.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Writes a complete object atomically.
    ///
    /// Fails with [`StoreError::AlreadyExists`] when the key is taken,
    /// using the backend's conditional-create primitive where one exists.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError>;

    /// Opens a streaming upload to `key`.
    ///
    /// This is the multipart path: a preflight existence check runs before
    /// the upload starts, but overwrite protection is best-effort from then
    /// on — there is a TOCTOU window on backends without conditional
    /// multipart completion. Callers must provide single-writer coordination
    /// per key when streaming.
    async fn put_stream(&self, key: &str) -> Result<Box<dyn ObjectSink>, StoreError>;

    /// Streams the object's bytes. [`StoreError::NotFound`] when absent.
    async fn get(&self, key: &str) -> Result<ByteStream, StoreError>;

    /// Whether an object exists at `key`. Never mutates.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Lists keys under a prefix, unordered. Pagination is the adapter's
    /// concern; the full listing is returned.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Largest payload the adapter accepts through the atomic one-shot
    /// [`put`](Store::put) before callers should switch to
    /// [`put_stream`](Store::put_stream).
    fn one_shot_limit(&self) -> usize {
        DEFAULT_ONE_SHOT_LIMIT
    }

    /// Range-read capability, when the adapter has one.
    fn as_range_read(&self) -> Option<&dyn RangeReadStore> {
        None
    }
}

/// Internal mutable capability: a [`Store`] that can delete objects.
///
/// Deletion is never reachable from the public dataset surface; this trait
/// exists for writer cleanup of uncommitted objects and for GC and
/// administrative tooling.
#[async_trait]
pub trait MutableStore: Store {
    /// Deletes the object at `key`. Idempotent: deleting a missing key
    /// succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// An in-progress streaming upload returned by [`Store::put_stream`].
///
/// The object becomes visible only after [`finish`](ObjectSink::finish)
/// returns. Dropping a sink without finishing abandons the upload; whether
/// partial bytes remain visible is adapter-defined, which is why writers
/// pair sinks with explicit best-effort cleanup.
#[async_trait]
pub trait ObjectSink: Send {
    /// Appends a chunk to the upload.
    async fn write(&mut self, chunk: Bytes) -> Result<(), StoreError>;

    /// Completes the upload, making the object visible.
    async fn finish(self: Box<Self>) -> Result<(), StoreError>;

    /// Abandons the upload and releases backend resources.
    async fn abort(self: Box<Self>) -> Result<(), StoreError>;
}

/// Optional capability: true range reads over stored objects.
#[async_trait]
pub trait RangeReadStore: Send + Sync {
    /// Size of the object at `key` in bytes.
    async fn stat(&self, key: &str) -> Result<u64, StoreError>;

    /// Reads up to `length` bytes starting at `offset`.
    ///
    /// A true range read, never a full download. Returns the available
    /// bytes when the range extends past EOF, an empty slice when
    /// `offset >= size`, and [`StoreError::InvalidPath`] when
    /// `offset + length` overflows.
    async fn read_range(&self, key: &str, offset: u64, length: u64) -> Result<Bytes, StoreError>;

    /// Opens a sized random-access reader over the object.
    async fn reader_at(&self, key: &str) -> Result<SizedReader<'_>, StoreError>;
}

/// A sized random-access reader over one object.
///
/// Reads borrow the reader immutably, so concurrent reads at different
/// offsets on the same object are safe.
pub struct SizedReader<'a> {
    store: &'a dyn RangeReadStore,
    key: String,
    size: u64,
}

impl<'a> SizedReader<'a> {
    /// Builds a reader from a store, key, and the object's known size.
    pub fn new(store: &'a dyn RangeReadStore, key: impl Into<String>, size: u64) -> Self {
        Self {
            store,
            key: key.into(),
            size,
        }
    }

    /// Object size in bytes.
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Reads up to `length` bytes at `offset`, with the same clamping rules
    /// as [`RangeReadStore::read_range`].
    pub async fn read_at(&self, offset: u64, length: u64) -> Result<Bytes, StoreError> {
        self.store.read_range(&self.key, offset, length).await
    }
}

/// Validates a key before it reaches a backend.
///
/// Keys must be non-empty, relative, slash-separated, and free of empty or
/// `.`/`..` components.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(invalid_path(key, "key is empty"));
    }
    if key.starts_with('/') {
        return Err(invalid_path(key, "key must be relative"));
    }
    if key.contains('\\') {
        return Err(invalid_path(key, "backslash separators are not allowed"));
    }
    for component in key.split('/') {
        if component.is_empty() {
            return Err(invalid_path(key, "empty path component"));
        }
        if component == "." || component == ".." {
            return Err(invalid_path(key, "relative path components are not allowed"));
        }
    }
    Ok(())
}

fn invalid_path(path: &str, reason: &str) -> StoreError {
    StoreError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Errors surfaced by store adapters.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No object exists at the key. An expected outcome callers branch on.
    #[error("object not found: {path}")]
    NotFound { path: String },

    /// An object already exists at the key. Write-path integrity is
    /// preserved; callers may retry under a fresh key.
    #[error("object already exists: {path}")]
    AlreadyExists { path: String },

    /// The key (or a range argument) is not valid for this store.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Transport or backend failure, source preserved for unwrapping.
    #[error("object store backend error: {path}")]
    Backend {
        path: String,
        #[source]
        source: object_store::Error,
    },

    /// Local I/O failure while streaming.
    #[error("i/o error: {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

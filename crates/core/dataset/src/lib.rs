//! Snapshot persistence: datasets, the write pipeline, and the read path.
//!
//! A [`Dataset`] binds an object store, a codec (or none, for blob-only
//! datasets), a compressor, a partitioner, a layout, and an optional
//! checksum at construction. Writes stream records (or raw bytes) through
//! the bound components into final object-store paths and publish the
//! snapshot atomically by putting its manifest; manifest presence is the
//! commit signal. The [`Reader`] discovers datasets and segments by listing
//! for manifests under the layout's prefixes and validates every manifest
//! it loads.
//!
//! Concurrency: readers are shareable; concurrent writers to one dataset
//! must be serialized externally. The streaming write path's overwrite
//! protection is best-effort (see [`lode_store::Store::put_stream`]), so
//! single-writer coordination matters most there.

use lode_common::ManifestValidationError;

pub mod dataset;
pub mod iter;
pub(crate) mod pipeline;
pub mod read;
pub mod stream;

pub use dataset::{Dataset, DatasetConfig, Snapshot};
pub use iter::{
    EmptyIterator, ListingIterator, ObjectIterator, ObjectRef, RecordIterator,
    SegmentFileIterator, SegmentIterator,
};
pub use read::{Reader, SegmentRef};
pub use stream::{BlobRowCount, SnapshotWriter};

/// Errors surfaced by the write path.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// Caller-supplied metadata is unusable. Recoverable by the caller.
    #[error("invalid metadata: {reason}")]
    InvalidMetadata { reason: String },

    /// The operation was cancelled through its cancellation token.
    /// Best-effort cleanup of partial objects has already run.
    #[error("write cancelled")]
    Cancelled,

    /// The dataset is blob-only (no codec bound); record operations do not
    /// apply.
    #[error("dataset {dataset} is blob-only; it cannot encode records")]
    BlobOnly { dataset: String },

    /// The dataset has a codec bound; blob operations do not apply.
    #[error("dataset {dataset} encodes records; it cannot accept raw blobs")]
    NotBlob { dataset: String },

    /// The streaming writer is no longer in a writable state.
    #[error("streaming write already {state}")]
    Finished { state: &'static str },

    /// Codec failure, including `CodecNotStreamable` for streaming writes
    /// on a non-streamable codec.
    #[error(transparent)]
    Codec(#[from] lode_codec::CodecError),

    /// Store failure. `AlreadyExists` here means a commit collision: the
    /// snapshot id (or a data path under it) was already taken, and no data
    /// from this writer was accepted.
    #[error(transparent)]
    Store(#[from] lode_store::StoreError),

    /// The assembled manifest failed self-validation before the commit put.
    #[error("assembled manifest failed validation")]
    ManifestInvalid(#[from] ManifestValidationError),

    /// The assembled manifest could not be serialized to JSON.
    #[error("failed to serialize manifest")]
    ManifestSerialize(#[source] serde_json::Error),
}

impl WriteError {
    /// Whether this is a commit collision (`PathExists`).
    pub fn is_already_exists(&self) -> bool {
        matches!(self, WriteError::Store(err) if err.is_already_exists())
    }
}

/// Errors surfaced by the read path.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// Store failure, including `NotFound` for missing manifests.
    #[error(transparent)]
    Store(#[from] lode_store::StoreError),

    /// The dataset has no committed snapshots. An expected outcome callers
    /// branch on.
    #[error("dataset {dataset} has no snapshots")]
    NoSnapshots { dataset: String },

    /// The manifest object is not decodable JSON. Distinct from
    /// [`ManifestInvalid`](ReadError::ManifestInvalid): this is corruption
    /// at the serialization layer, not a schema-level validation failure.
    #[error("failed to decode manifest at {path}")]
    ManifestDecode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The manifest decoded but failed validation; the wrapped error names
    /// the offending field.
    #[error(transparent)]
    ManifestInvalid(#[from] ManifestValidationError),

    /// The manifest names a codec this build cannot decode.
    #[error("no codec available for {codec:?}")]
    UnsupportedCodec { codec: String },

    /// The manifest names a compressor this build cannot decode.
    #[error("no compressor available for {compressor:?}")]
    UnsupportedCompressor { compressor: String },

    /// The dataset is blob-only; there are no records to decode.
    #[error("dataset {dataset} is blob-only; open its files as byte streams")]
    BlobOnly { dataset: String },

    /// Codec-level decode failure (`InvalidFormat`).
    #[error(transparent)]
    Codec(#[from] lode_codec::CodecError),

    /// The store has no range-read capability. Static: callers reconfigure
    /// or fall back to whole-object reads.
    #[error("store does not support range reads")]
    RangeReadNotSupported,
}

impl ReadError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReadError::Store(err) if err.is_not_found())
    }

    /// The offending manifest field, when this is a validation failure.
    pub fn manifest_field(&self) -> Option<&str> {
        match self {
            ReadError::ManifestInvalid(err) => Some(&err.field),
            _ => None,
        }
    }
}

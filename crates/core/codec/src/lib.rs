//! Record serialization, byte-stream compression, and partitioning.
//!
//! These are the pluggable stages of the write pipeline. A dataset binds
//! one codec (or none, for blob-only datasets), one compressor (noop
//! canonical — never absent), and one partitioner at construction; the
//! bindings are recorded by name in every manifest the dataset commits.

use std::io::{Read, Write};

use lode_common::Record;

pub mod compress;
pub mod jsonl;
pub mod partition;

pub use compress::{CompressWrite, Compressor, GzipCompressor, NoopCompressor, ZstdCompressor};
pub use jsonl::JsonlCodec;
pub use partition::{FieldPartitioner, NoopPartitioner, Partitioner};

/// Codec name reserved for blob-only datasets (no record encoding).
pub const NOOP_CODEC_NAME: &str = "noop";

/// Resolves a built-in codec from its manifest name.
///
/// Returns `None` for `"noop"` (blob-only, nothing to decode) and for names
/// this build does not ship.
pub fn codec_for_name(name: &str) -> Option<std::sync::Arc<dyn Codec>> {
    match name {
        "jsonl" => Some(std::sync::Arc::new(JsonlCodec)),
        _ => None,
    }
}

/// Resolves a built-in compressor from its manifest name.
pub fn compressor_for_name(name: &str) -> Option<std::sync::Arc<dyn Compressor>> {
    match name {
        "noop" => Some(std::sync::Arc::new(NoopCompressor)),
        "gzip" => Some(std::sync::Arc::new(GzipCompressor)),
        "zstd" => Some(std::sync::Arc::new(ZstdCompressor)),
        _ => None,
    }
}

/// Record serialization format.
pub trait Codec: Send + Sync {
    fn name(&self) -> &str;

    /// Extension appended to data file names, including the dot.
    fn file_extension(&self) -> Option<&str> {
        None
    }

    /// Encodes a batch of records onto `writer`.
    fn encode(&self, writer: &mut dyn Write, records: &[Record]) -> Result<(), CodecError>;

    /// Decodes all records from `reader`.
    fn decode(&self, reader: &mut dyn Read) -> Result<Vec<Record>, CodecError>;

    /// Whether [`stream_encoder`](Codec::stream_encoder) is supported.
    ///
    /// Codecs that buffer until close (footer-based formats) cannot stream;
    /// streaming-write operations on datasets bound to such codecs fail
    /// with [`CodecError::NotStreamable`].
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Starts a record-at-a-time encoder over `writer`.
    fn stream_encoder<'a>(
        &self,
        writer: Box<dyn Write + Send + 'a>,
    ) -> Result<Box<dyn StreamEncoder + 'a>, CodecError> {
        drop(writer);
        Err(CodecError::NotStreamable {
            codec: self.name().to_string(),
        })
    }
}

/// Incremental encoder produced by a streamable codec.
pub trait StreamEncoder: Send {
    fn encode_record(&mut self, record: &Record) -> Result<(), CodecError>;

    /// Flushes any buffered output. Must be called to complete the stream.
    fn finish(self: Box<Self>) -> Result<(), CodecError>;
}

/// Errors surfaced by codecs.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The codec cannot encode records one at a time. Static capability:
    /// callers reconfigure rather than retry.
    #[error("codec {codec:?} does not support streaming encode")]
    NotStreamable { codec: String },

    /// A record does not fit the codec's expected shape.
    #[error("record violates codec schema: {message}")]
    SchemaViolation { message: String },

    /// Input bytes are not valid for this codec. Non-retryable: indicates
    /// corruption or an incompatible producer.
    #[error("malformed {codec} input: {message}")]
    InvalidFormat { codec: String, message: String },

    #[error("codec i/o error")]
    Io(#[from] std::io::Error),
}

//! Core types shared across the lode workspace.
//!
//! This crate holds the vocabulary of the persistence engine: validated
//! dataset and snapshot identifiers, snapshot metadata, the persisted
//! manifest schema and its validator, the [`Layout`] path grammar, and
//! streaming checksum components.

pub mod checksum;
pub mod id;
pub mod layout;
pub mod manifest;
pub mod metadata;

pub use checksum::{Checksum, HashWriter, Md5Checksum, Sha256Checksum};
pub use id::{DatasetId, IdError, SnapshotId};
pub use layout::{DefaultLayout, Layout};
pub use manifest::{
    FileRef, MANIFEST_FORMAT_VERSION, MANIFEST_SCHEMA_NAME, Manifest, ManifestValidationError,
    validate_manifest,
};
pub use metadata::Metadata;

/// A single record handed to and returned by codecs.
///
/// Lode never inspects record contents; the codec and partitioner bound to a
/// dataset agree on the record shape out-of-band.
pub type Record = serde_json::Value;

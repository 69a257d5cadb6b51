//! The persisted snapshot manifest and its validator.
//!
//! A manifest is a JSON document whose presence at the layout's manifest
//! path is the commit signal for a snapshot: readers treat a snapshot as
//! existing iff its manifest object exists. Data objects referenced by a
//! committed manifest are never overwritten or mutated.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Schema identifier written into every manifest.
pub const MANIFEST_SCHEMA_NAME: &str = "lode-manifest";

/// Current manifest format version.
pub const MANIFEST_FORMAT_VERSION: &str = "1.0.0";

/// A reference to one data object recorded in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileRef {
    /// Object key, relative to the store's logical root.
    #[serde(default)]
    pub path: String,
    /// Object size in bytes.
    #[serde(default)]
    pub size_bytes: i64,
    /// `"<algo>:<hex>"` digest, present when the dataset has a checksum
    /// component bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// The persisted snapshot manifest (`lode-manifest`, format `1.0.0`).
///
/// Required fields are plain values decoded leniently (`#[serde(default)]`),
/// so a manifest missing a field still *decodes* and the absence is reported
/// by [`validate_manifest`] under the field's canonical JSON name. Fields
/// where "absent" and "empty" must be distinguished (`metadata`, `files`)
/// are `Option`s. Unknown fields are ignored on read; `schema_name` and
/// `format_version` gate breaking changes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub schema_name: String,
    #[serde(default)]
    pub format_version: String,
    #[serde(default)]
    pub dataset_id: String,
    #[serde(default)]
    pub snapshot_id: String,
    /// Previous snapshot in the dataset's linear history; absent iff this is
    /// the first snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_snapshot_id: Option<String>,
    /// Commit instant, UTC. `None` models the zero value for validation.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Caller metadata. Must be present (possibly empty), never null.
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
    /// Data objects in encoding order. Must be present, may be empty.
    #[serde(default)]
    pub files: Option<Vec<FileRef>>,
    #[serde(default)]
    pub row_count: i64,
    #[serde(default)]
    pub codec: String,
    #[serde(default)]
    pub compressor: String,
    #[serde(default)]
    pub partitioner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timestamp: Option<DateTime<Utc>>,
}

impl Manifest {
    /// Returns the recorded files, treating an absent list as empty.
    ///
    /// Only meaningful on a validated manifest, where `files` is guaranteed
    /// present.
    pub fn files(&self) -> &[FileRef] {
        self.files.as_deref().unwrap_or_default()
    }
}

/// A manifest failed validation.
///
/// `field` is the canonical JSON name of the first offending field
/// (validation order is deterministic), so callers can machine-interpret
/// failures without string parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid manifest: {field}: {message}")]
pub struct ManifestValidationError {
    pub field: String,
    pub message: String,
}

impl ManifestValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Checks that a manifest carries every required field.
///
/// Checks run in a fixed order and the first failure wins:
/// `schema_name`, `format_version`, `dataset_id`, `snapshot_id`,
/// `created_at`, `metadata`, `files`, `row_count`, `codec`, `compressor`,
/// `partitioner`, then per-file `path` and `size_bytes`.
///
/// Optional fields (`parent_snapshot_id`, `min_timestamp`, `max_timestamp`,
/// per-file `checksum`) are not validated beyond type-checking at decode.
pub fn validate_manifest(manifest: &Manifest) -> Result<(), ManifestValidationError> {
    if manifest.schema_name.is_empty() {
        return Err(ManifestValidationError::new("schema_name", "is required"));
    }
    if manifest.format_version.is_empty() {
        return Err(ManifestValidationError::new(
            "format_version",
            "is required",
        ));
    }

    if manifest.dataset_id.is_empty() {
        return Err(ManifestValidationError::new("dataset_id", "is required"));
    }
    if manifest.snapshot_id.is_empty() {
        return Err(ManifestValidationError::new("snapshot_id", "is required"));
    }

    if manifest.created_at.is_none() {
        return Err(ManifestValidationError::new("created_at", "is required"));
    }

    if manifest.metadata.is_none() {
        return Err(ManifestValidationError::new(
            "metadata",
            "must not be null (use an empty map for no metadata)",
        ));
    }

    let Some(files) = &manifest.files else {
        return Err(ManifestValidationError::new(
            "files",
            "must not be null (use an empty list for no files)",
        ));
    };

    if manifest.row_count < 0 {
        return Err(ManifestValidationError::new(
            "row_count",
            "must be non-negative",
        ));
    }

    if manifest.codec.is_empty() {
        return Err(ManifestValidationError::new("codec", "is required"));
    }
    if manifest.compressor.is_empty() {
        return Err(ManifestValidationError::new("compressor", "is required"));
    }
    if manifest.partitioner.is_empty() {
        return Err(ManifestValidationError::new("partitioner", "is required"));
    }

    for (i, file) in files.iter().enumerate() {
        if file.path.is_empty() {
            return Err(ManifestValidationError::new(
                format!("files[{i}].path"),
                "is required",
            ));
        }
        if file.size_bytes < 0 {
            return Err(ManifestValidationError::new(
                format!("files[{i}].size_bytes"),
                "must be non-negative",
            ));
        }
    }

    Ok(())
}

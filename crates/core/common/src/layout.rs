//! Storage path construction and manifest path recognition.
//!
//! Layouts are pluggable but every implementation must preserve three
//! properties: manifests remain discoverable by listing under a stable
//! prefix, file paths recorded in manifests resolve under the same logical
//! key space, and manifest presence keeps its commit-signal meaning.

use crate::id::{DatasetId, SnapshotId};

/// Pure functional mapping between identifiers and object-store keys.
///
/// Layouts carry no state; all methods are deterministic functions of their
/// arguments. Keys use forward-slash separators regardless of backend.
pub trait Layout: Send + Sync {
    /// Prefix for discovering all datasets.
    fn datasets_prefix(&self) -> String;

    /// Prefix for discovering the segments of one dataset.
    fn segments_prefix(&self, dataset: &DatasetId) -> String;

    /// Key of a segment's manifest.
    fn manifest_path(&self, dataset: &DatasetId, segment: &SnapshotId) -> String;

    /// Prefix under which a segment's data objects live.
    fn data_prefix(&self, dataset: &DatasetId, segment: &SnapshotId) -> String;

    /// Whether `path` is a manifest at its canonical location.
    ///
    /// Strays must be rejected: a `manifest.json` outside the canonical
    /// shape never counts as a commit.
    fn is_manifest(&self, path: &str) -> bool;

    /// Extracts the dataset id from a manifest path.
    ///
    /// `None` if the path is not a canonical manifest path.
    fn parse_dataset_id(&self, manifest_path: &str) -> Option<DatasetId>;

    /// Extracts the segment id from a manifest path.
    ///
    /// `None` if the path is not a canonical manifest path.
    fn parse_segment_id(&self, manifest_path: &str) -> Option<SnapshotId>;

    /// Extracts the partition fragment from a data-file path.
    ///
    /// Empty when the file is not partitioned.
    fn extract_partition_path(&self, file_path: &str) -> String;
}

const DATASETS_DIR: &str = "datasets";
const SNAPSHOTS_DIR: &str = "snapshots";
const MANIFEST_FILE: &str = "manifest.json";
const DATA_DIR: &str = "data";

/// The reference layout:
///
/// ```text
/// datasets/<dataset>/snapshots/<segment>/
///   manifest.json
///   data/[<partition>/]<file>
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLayout;

impl DefaultLayout {
    /// Checks that a path matches exactly
    /// `datasets/<dataset>/snapshots/<segment>/manifest.json`.
    fn split_manifest_path(path: &str) -> Option<(&str, &str)> {
        let mut parts = path.split('/');
        let (a, dataset, c, segment, e) = (
            parts.next()?,
            parts.next()?,
            parts.next()?,
            parts.next()?,
            parts.next()?,
        );
        if parts.next().is_some() {
            return None;
        }
        (a == DATASETS_DIR
            && !dataset.is_empty()
            && c == SNAPSHOTS_DIR
            && !segment.is_empty()
            && e == MANIFEST_FILE)
            .then_some((dataset, segment))
    }
}

impl Layout for DefaultLayout {
    fn datasets_prefix(&self) -> String {
        format!("{DATASETS_DIR}/")
    }

    fn segments_prefix(&self, dataset: &DatasetId) -> String {
        format!("{DATASETS_DIR}/{dataset}/{SNAPSHOTS_DIR}/")
    }

    fn manifest_path(&self, dataset: &DatasetId, segment: &SnapshotId) -> String {
        format!("{DATASETS_DIR}/{dataset}/{SNAPSHOTS_DIR}/{segment}/{MANIFEST_FILE}")
    }

    fn data_prefix(&self, dataset: &DatasetId, segment: &SnapshotId) -> String {
        format!("{DATASETS_DIR}/{dataset}/{SNAPSHOTS_DIR}/{segment}/{DATA_DIR}")
    }

    fn is_manifest(&self, path: &str) -> bool {
        Self::split_manifest_path(path).is_some()
    }

    fn parse_dataset_id(&self, manifest_path: &str) -> Option<DatasetId> {
        let (dataset, _) = Self::split_manifest_path(manifest_path)?;
        dataset.parse().ok()
    }

    fn parse_segment_id(&self, manifest_path: &str) -> Option<SnapshotId> {
        let (_, segment) = Self::split_manifest_path(manifest_path)?;
        segment.parse().ok()
    }

    fn extract_partition_path(&self, file_path: &str) -> String {
        let parts: Vec<&str> = file_path.split('/').collect();
        let Some(data_idx) = parts.iter().position(|p| *p == DATA_DIR) else {
            return String::new();
        };
        // Everything between "data" and the filename is the partition path.
        if data_idx + 1 >= parts.len() {
            return String::new();
        }
        parts[data_idx + 1..parts.len() - 1].join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::{DefaultLayout, Layout};
    use crate::id::{DatasetId, SnapshotId};

    fn ids() -> (DatasetId, SnapshotId) {
        ("events".parse().unwrap(), "seg1".parse().unwrap())
    }

    #[test]
    fn canonical_paths() {
        let layout = DefaultLayout;
        let (dataset, segment) = ids();
        assert_eq!(layout.datasets_prefix(), "datasets/");
        assert_eq!(layout.segments_prefix(&dataset), "datasets/events/snapshots/");
        assert_eq!(
            layout.manifest_path(&dataset, &segment),
            "datasets/events/snapshots/seg1/manifest.json"
        );
        assert_eq!(
            layout.data_prefix(&dataset, &segment),
            "datasets/events/snapshots/seg1/data"
        );
    }

    #[test]
    fn parse_inverts_manifest_path() {
        let layout = DefaultLayout;
        let (dataset, segment) = ids();
        let path = layout.manifest_path(&dataset, &segment);
        assert_eq!(layout.parse_dataset_id(&path), Some(dataset));
        assert_eq!(layout.parse_segment_id(&path), Some(segment));
    }

    #[test]
    fn accepts_canonical_manifest_paths() {
        let layout = DefaultLayout;
        assert!(layout.is_manifest("datasets/ds1/snapshots/seg1/manifest.json"));
        assert!(layout.is_manifest("datasets/a/snapshots/b/manifest.json"));
    }

    #[test]
    fn rejects_stray_manifest_paths() {
        let layout = DefaultLayout;
        for path in [
            "",
            "manifest.json",
            "datasets/x/misc/manifest.json",
            "datasets/x/snapshots/manifest.json",
            "datasets/x/snapshots/y/sub/manifest.json",
            "datasets/x/snapshots/y/manifest.txt",
            "datasets//snapshots/y/manifest.json",
            "datasets/x/snapshots//manifest.json",
            "other/x/snapshots/y/manifest.json",
        ] {
            assert!(!layout.is_manifest(path), "accepted stray: {path:?}");
            assert_eq!(layout.parse_dataset_id(path), None, "parsed stray: {path:?}");
            assert_eq!(layout.parse_segment_id(path), None, "parsed stray: {path:?}");
        }
    }

    #[test]
    fn extract_partition_path_variants() {
        let layout = DefaultLayout;
        assert_eq!(
            layout.extract_partition_path(
                "datasets/ds/snapshots/seg/data/dt=2026-01-01/part-00000.jsonl"
            ),
            "dt=2026-01-01"
        );
        assert_eq!(
            layout.extract_partition_path(
                "datasets/ds/snapshots/seg/data/region=eu/dt=2026-01-01/part-00000.jsonl"
            ),
            "region=eu/dt=2026-01-01"
        );
        assert_eq!(
            layout.extract_partition_path("datasets/ds/snapshots/seg/data/part-00000.jsonl"),
            ""
        );
        assert_eq!(layout.extract_partition_path("no/data/component"), "");
        assert_eq!(layout.extract_partition_path(""), "");
    }
}

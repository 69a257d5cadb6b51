//! Dataset and segment discovery, manifest loading, and record reads.

use std::{collections::BTreeSet, sync::Arc};

use bytes::Bytes;
use futures::TryStreamExt as _;
use lode_common::{DatasetId, DefaultLayout, Layout, Manifest, SnapshotId, validate_manifest};
use lode_store::Store;
use tracing::debug;

use crate::{
    ReadError,
    iter::{ListingIterator, RecordIterator, SegmentFileIterator},
};

/// A reference to one committed segment of a dataset.
///
/// "Segment" and "snapshot" name the same thing; the read API uses the
/// former.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRef {
    pub id: SnapshotId,
    /// Key of the segment's manifest, resolvable on the same store.
    pub manifest_path: String,
}

/// Read-side entry point: discovers datasets and segments by scanning for
/// manifests under the layout's prefixes, and validates every manifest it
/// loads.
///
/// Readers are cheap to clone and safe to share; they hold no mutable
/// state beyond the store's own concurrency guarantees.
#[derive(Clone)]
pub struct Reader {
    store: Arc<dyn Store>,
    layout: Arc<dyn Layout>,
}

impl Reader {
    /// A reader over `store` with the default layout.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_layout(store, Arc::new(DefaultLayout))
    }

    pub fn with_layout(store: Arc<dyn Store>, layout: Arc<dyn Layout>) -> Self {
        Self { store, layout }
    }

    /// All datasets with at least one committed snapshot, sorted.
    ///
    /// Only paths the layout recognizes as canonical manifests count;
    /// stray `manifest.json` objects elsewhere never surface a dataset.
    pub async fn list_datasets(&self) -> Result<Vec<DatasetId>, ReadError> {
        let keys = self.store.list(&self.layout.datasets_prefix()).await?;
        let ids: BTreeSet<DatasetId> = keys
            .iter()
            .filter(|key| self.layout.is_manifest(key))
            .filter_map(|key| self.layout.parse_dataset_id(key))
            .collect();
        Ok(ids.into_iter().collect())
    }

    /// Committed segments of a dataset, oldest first.
    ///
    /// Ordered lexicographically by snapshot id; writer-allocated ids are
    /// UUIDv7, so lexical order is creation order along the parent chain.
    pub async fn list_segments(&self, dataset: &DatasetId) -> Result<Vec<SegmentRef>, ReadError> {
        let keys = self.store.list(&self.layout.segments_prefix(dataset)).await?;
        let ids: BTreeSet<SnapshotId> = keys
            .iter()
            .filter(|key| self.layout.is_manifest(key))
            .filter_map(|key| self.layout.parse_segment_id(key))
            .collect();
        Ok(ids
            .into_iter()
            .map(|id| {
                let manifest_path = self.layout.manifest_path(dataset, &id);
                SegmentRef { id, manifest_path }
            })
            .collect())
    }

    /// Iterates a dataset's committed segments, oldest first.
    pub async fn iter_segments(
        &self,
        dataset: &DatasetId,
    ) -> Result<crate::iter::SegmentIterator, ReadError> {
        Ok(crate::iter::SegmentIterator::new(
            self.list_segments(dataset).await?,
        ))
    }

    /// The dataset's newest segment, or [`ReadError::NoSnapshots`].
    pub async fn current_segment(&self, dataset: &DatasetId) -> Result<SegmentRef, ReadError> {
        self.list_segments(dataset)
            .await?
            .pop()
            .ok_or_else(|| ReadError::NoSnapshots {
                dataset: dataset.to_string(),
            })
    }

    /// Loads and validates a segment's manifest.
    ///
    /// Decode failures ([`ReadError::ManifestDecode`]) and validation
    /// failures ([`ReadError::ManifestInvalid`]) are distinct categories.
    pub async fn get_manifest(
        &self,
        dataset: &DatasetId,
        segment: &SnapshotId,
    ) -> Result<Manifest, ReadError> {
        let path = self.layout.manifest_path(dataset, segment);
        let chunks: Vec<Bytes> = self.store.get(&path).await?.try_collect().await?;
        let bytes = chunks.concat();

        let manifest: Manifest =
            serde_json::from_slice(&bytes).map_err(|source| ReadError::ManifestDecode {
                path: path.clone(),
                source,
            })?;
        validate_manifest(&manifest)?;

        debug!(%dataset, %segment, files = manifest.files().len(), "loaded manifest");
        Ok(manifest)
    }

    /// Opens a lazy record iterator over a segment.
    ///
    /// The codec and compressor are resolved from the names the manifest
    /// records; blob-only segments (`codec == "noop"`) have no records to
    /// decode.
    pub async fn open_records(
        &self,
        dataset: &DatasetId,
        segment: &SnapshotId,
    ) -> Result<RecordIterator, ReadError> {
        let manifest = self.get_manifest(dataset, segment).await?;
        if manifest.codec == lode_codec::NOOP_CODEC_NAME {
            return Err(ReadError::BlobOnly {
                dataset: dataset.to_string(),
            });
        }
        let codec =
            lode_codec::codec_for_name(&manifest.codec).ok_or_else(|| ReadError::UnsupportedCodec {
                codec: manifest.codec.clone(),
            })?;
        let compressor = lode_codec::compressor_for_name(&manifest.compressor).ok_or_else(|| {
            ReadError::UnsupportedCompressor {
                compressor: manifest.compressor.clone(),
            }
        })?;
        Ok(RecordIterator::new(
            self.store.clone(),
            codec,
            compressor,
            manifest.files().to_vec(),
        ))
    }

    /// Iterates the files recorded in a segment's manifest.
    pub async fn segment_files(
        &self,
        dataset: &DatasetId,
        segment: &SnapshotId,
    ) -> Result<SegmentFileIterator, ReadError> {
        let manifest = self.get_manifest(dataset, segment).await?;
        Ok(SegmentFileIterator::new(
            dataset.clone(),
            segment.clone(),
            manifest.files().to_vec(),
        ))
    }

    /// Reads a byte range of one data object recorded in a segment's
    /// manifest.
    ///
    /// Requires the store's range-read capability; without it this surfaces
    /// [`ReadError::RangeReadNotSupported`] rather than simulating the
    /// range by downloading the whole object.
    pub async fn read_file_range(
        &self,
        dataset: &DatasetId,
        segment: &SnapshotId,
        path: &str,
        offset: u64,
        length: u64,
    ) -> Result<Bytes, ReadError> {
        let manifest = self.get_manifest(dataset, segment).await?;
        if !manifest.files().iter().any(|file| file.path == path) {
            return Err(ReadError::Store(lode_store::StoreError::NotFound {
                path: path.to_string(),
            }));
        }
        let range = self
            .store
            .as_range_read()
            .ok_or(ReadError::RangeReadNotSupported)?;
        Ok(range.read_range(path, offset, length).await?)
    }

    /// Iterates the objects actually present under a segment's data
    /// prefix, committed or not. Useful for garbage-collection tooling.
    pub async fn list_segment_objects(
        &self,
        dataset: &DatasetId,
        segment: &SnapshotId,
    ) -> Result<ListingIterator, ReadError> {
        let prefix = format!("{}/", self.layout.data_prefix(dataset, segment));
        let keys = self.store.list(&prefix).await?;
        Ok(ListingIterator::new(dataset.clone(), segment.clone(), keys))
    }
}

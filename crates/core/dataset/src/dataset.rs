//! Datasets and the batch write pipeline.

use std::sync::Arc;

use chrono::Utc;
use lode_codec::{Codec, CodecError, Compressor, NoopCompressor, NoopPartitioner, Partitioner};
use lode_common::{
    Checksum, DatasetId, DefaultLayout, FileRef, IdError, Layout, MANIFEST_FORMAT_VERSION,
    MANIFEST_SCHEMA_NAME, Manifest, Metadata, Record, SnapshotId, validate_manifest,
};
use lode_store::{ByteStream, MutableStore, Store, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    ReadError, WriteError,
    iter::RecordIterator,
    pipeline::{ObjectTap, upload_object},
    read::Reader,
    stream::SnapshotWriter,
};

/// A snapshot committed by a write.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub dataset: DatasetId,
    pub id: SnapshotId,
    pub manifest: Manifest,
}

/// Component bindings for a [`Dataset`].
///
/// `codec: None` declares a blob-only dataset (manifests record the codec
/// as `"noop"`). Compressor, partitioner, and layout default to their noop
/// or reference implementations; the checksum component is genuinely
/// optional and, when absent, manifests omit per-file checksums.
#[derive(Default)]
pub struct DatasetConfig {
    pub codec: Option<Arc<dyn Codec>>,
    pub compressor: Option<Arc<dyn Compressor>>,
    pub partitioner: Option<Arc<dyn Partitioner>>,
    pub layout: Option<Arc<dyn Layout>>,
    pub checksum: Option<Arc<dyn Checksum>>,
}

/// A named container of snapshots, bound to its components at construction.
///
/// Bindings are immutable for the dataset's lifetime. The dataset supports
/// concurrent readers; concurrent writers must be serialized externally
/// (single-writer per dataset) — commit collisions surface as
/// `AlreadyExists`, but the streaming path's overwrite protection is only
/// best-effort.
pub struct Dataset {
    pub(crate) id: DatasetId,
    pub(crate) store: Arc<dyn MutableStore>,
    pub(crate) codec: Option<Arc<dyn Codec>>,
    pub(crate) compressor: Arc<dyn Compressor>,
    pub(crate) partitioner: Arc<dyn Partitioner>,
    pub(crate) layout: Arc<dyn Layout>,
    pub(crate) checksum: Option<Arc<dyn Checksum>>,
}

impl Dataset {
    /// Creates a dataset bound to `store` and the components in `config`.
    pub fn new(
        id: &str,
        store: Arc<dyn MutableStore>,
        config: DatasetConfig,
    ) -> Result<Self, IdError> {
        Ok(Self {
            id: id.parse()?,
            store,
            codec: config.codec,
            compressor: config
                .compressor
                .unwrap_or_else(|| Arc::new(NoopCompressor)),
            partitioner: config
                .partitioner
                .unwrap_or_else(|| Arc::new(NoopPartitioner)),
            layout: config.layout.unwrap_or_else(|| Arc::new(DefaultLayout)),
            checksum: config.checksum,
        })
    }

    pub fn id(&self) -> &DatasetId {
        &self.id
    }

    /// The store, without the mutable capability.
    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn layout(&self) -> &dyn Layout {
        &*self.layout
    }

    /// A reader over this dataset's store and layout.
    pub fn reader(&self) -> Reader {
        Reader::with_layout(self.store(), self.layout.clone())
    }

    /// The dataset's current head snapshot, if any.
    pub(crate) async fn head(&self) -> Result<Option<SnapshotId>, StoreError> {
        let keys = self
            .store
            .list(&self.layout.segments_prefix(&self.id))
            .await?;
        Ok(keys
            .iter()
            .filter(|key| self.layout.is_manifest(key))
            .filter_map(|key| self.layout.parse_segment_id(key))
            .max())
    }

    fn manifest_name(&self) -> (String, String, String) {
        let codec = self
            .codec
            .as_ref()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| lode_codec::NOOP_CODEC_NAME.to_string());
        (
            codec,
            self.compressor.name().to_string(),
            self.partitioner.name().to_string(),
        )
    }

    pub(crate) fn data_file_name(&self, index: usize) -> String {
        let codec_ext = self
            .codec
            .as_ref()
            .and_then(|codec| codec.file_extension())
            .unwrap_or_default();
        let comp_ext = self.compressor.file_extension().unwrap_or_default();
        format!("part-{index:05}{codec_ext}{comp_ext}")
    }

    pub(crate) fn build_manifest(
        &self,
        snapshot: &SnapshotId,
        parent: Option<&SnapshotId>,
        metadata: Metadata,
        files: Vec<FileRef>,
        row_count: i64,
    ) -> Manifest {
        let (codec, compressor, partitioner) = self.manifest_name();
        Manifest {
            schema_name: MANIFEST_SCHEMA_NAME.to_string(),
            format_version: MANIFEST_FORMAT_VERSION.to_string(),
            dataset_id: self.id.to_string(),
            snapshot_id: snapshot.to_string(),
            parent_snapshot_id: parent.map(|parent| parent.to_string()),
            created_at: Some(Utc::now()),
            metadata: Some(metadata.into_inner()),
            files: Some(files),
            row_count,
            codec,
            compressor,
            partitioner,
            min_timestamp: None,
            max_timestamp: None,
        }
    }

    pub(crate) fn check_metadata(metadata: &Metadata) -> Result<(), WriteError> {
        if let Some(key) = metadata.invalid_key() {
            return Err(WriteError::InvalidMetadata {
                reason: format!("empty metadata key {key:?}"),
            });
        }
        Ok(())
    }

    pub(crate) fn allocate_snapshot_id() -> SnapshotId {
        // UUIDv7 is time-ordered, so snapshot ids sort lexicographically in
        // creation order.
        Uuid::now_v7()
            .to_string()
            .parse()
            .expect("uuid is a valid snapshot id")
    }

    /// Writes a batch of records as one new snapshot.
    ///
    /// Equivalent to [`write_with_cancel`](Dataset::write_with_cancel) with
    /// a token that never fires.
    pub async fn write(
        &self,
        records: &[Record],
        metadata: Metadata,
    ) -> Result<Snapshot, WriteError> {
        self.write_with_cancel(records, metadata, &CancellationToken::new())
            .await
    }

    /// Writes a batch of records as one new snapshot, atomically from the
    /// reader's perspective.
    ///
    /// Records are partitioned, each partition is encoded through the
    /// codec, compressor, and checksum pipeline into its final object path,
    /// and the snapshot becomes visible only when the manifest put
    /// succeeds. Any data-object failure aborts the commit with best-effort
    /// deletion of already-written objects (run outside `cancel`, so a
    /// cancelled caller still gets cleanup); a manifest put failure may
    /// leak data objects, which are garbage-collectable by their
    /// deterministic snapshot prefix.
    #[instrument(skip_all, fields(dataset = %self.id), err)]
    pub async fn write_with_cancel(
        &self,
        records: &[Record],
        metadata: Metadata,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, WriteError> {
        Self::check_metadata(&metadata)?;
        let codec = self
            .codec
            .clone()
            .ok_or_else(|| WriteError::BlobOnly {
                dataset: self.id.to_string(),
            })?;

        let snapshot_id = Self::allocate_snapshot_id();
        let parent = self.head().await?;
        let data_prefix = self.layout.data_prefix(&self.id, &snapshot_id);

        let mut written_paths: Vec<String> = Vec::new();
        let mut files: Vec<FileRef> = Vec::new();

        for (index, (fragment, partition)) in self.partition(records).into_iter().enumerate() {
            let file_name = self.data_file_name(index);
            let path = if fragment.is_empty() {
                format!("{data_prefix}/{file_name}")
            } else {
                format!("{data_prefix}/{fragment}/{file_name}")
            };

            let result = self
                .write_partition_object(&codec, &partition, &path, cancel)
                .await;
            match result {
                Ok(file) => {
                    written_paths.push(path);
                    files.push(file);
                }
                Err(err) => {
                    self.cleanup_objects(&written_paths).await;
                    return Err(err);
                }
            }
        }

        let manifest = self.build_manifest(
            &snapshot_id,
            parent.as_ref(),
            metadata,
            files,
            records.len() as i64,
        );
        self.commit_manifest(&snapshot_id, &manifest).await?;

        debug!(snapshot = %snapshot_id, rows = records.len(), "committed snapshot");
        Ok(Snapshot {
            dataset: self.id.clone(),
            id: snapshot_id,
            manifest,
        })
    }

    /// Groups records by partition fragment, preserving encounter order
    /// within each fragment.
    fn partition<'r>(&self, records: &'r [Record]) -> Vec<(String, Vec<&'r Record>)> {
        let mut partitions: Vec<(String, Vec<&Record>)> = Vec::new();
        for record in records {
            let fragment = self.partitioner.partition_path(record);
            match partitions.iter_mut().find(|(f, _)| *f == fragment) {
                Some((_, bucket)) => bucket.push(record),
                None => partitions.push((fragment, vec![record])),
            }
        }
        partitions
    }

    /// Encodes one partition through the pipeline and uploads it.
    async fn write_partition_object(
        &self,
        codec: &Arc<dyn Codec>,
        records: &[&Record],
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<FileRef, WriteError> {
        let tap = ObjectTap::new(self.checksum.as_deref());
        let mut writer = self
            .compressor
            .wrap(Box::new(tap.clone()))
            .map_err(CodecError::Io)?;

        if codec.supports_streaming() {
            let mut encoder = codec.stream_encoder(Box::new(&mut writer))?;
            for &record in records {
                if cancel.is_cancelled() {
                    return Err(WriteError::Cancelled);
                }
                encoder.encode_record(record)?;
            }
            encoder.finish()?;
        } else {
            if cancel.is_cancelled() {
                return Err(WriteError::Cancelled);
            }
            let owned: Vec<Record> = records.iter().map(|&record| record.clone()).collect();
            codec.encode(&mut writer, &owned)?;
        }
        writer.finish().map_err(CodecError::Io)?;

        let data = tap.drain();
        let (size_bytes, checksum) = tap.finalize();

        if cancel.is_cancelled() {
            return Err(WriteError::Cancelled);
        }
        upload_object(&*self.store, path, data).await?;

        Ok(FileRef {
            path: path.to_string(),
            size_bytes: size_bytes as i64,
            checksum,
        })
    }

    pub(crate) async fn commit_manifest(
        &self,
        snapshot: &SnapshotId,
        manifest: &Manifest,
    ) -> Result<(), WriteError> {
        validate_manifest(manifest)?;
        let bytes = serde_json::to_vec_pretty(manifest).map_err(WriteError::ManifestSerialize)?;
        let path = self.layout.manifest_path(&self.id, snapshot);
        // One-shot conditional put: a duplicate snapshot id fails here and
        // nothing from this writer becomes visible.
        self.store.put(&path, bytes.into()).await?;
        Ok(())
    }

    /// Best-effort deletion of uncommitted objects. Runs on its own,
    /// independent of the caller's cancellation.
    pub(crate) async fn cleanup_objects(&self, paths: &[String]) {
        for path in paths {
            if let Err(err) = self.store.delete(path).await {
                warn!(%path, error = %err, "failed to clean up uncommitted object");
            }
        }
    }

    /// Opens a streaming record write.
    ///
    /// Requires a streamable codec; footer-based codecs fail with
    /// `CodecNotStreamable`. The returned writer must be committed for the
    /// snapshot to become visible; dropping it without committing is an
    /// abort.
    pub async fn write_stream(&self, metadata: Metadata) -> Result<SnapshotWriter, WriteError> {
        Self::check_metadata(&metadata)?;
        let codec = self
            .codec
            .clone()
            .ok_or_else(|| WriteError::BlobOnly {
                dataset: self.id.to_string(),
            })?;
        if !codec.supports_streaming() {
            return Err(CodecError::NotStreamable {
                codec: codec.name().to_string(),
            }
            .into());
        }
        SnapshotWriter::open(self, Some(codec), metadata).await
    }

    /// Opens a streaming blob write on a blob-only dataset.
    ///
    /// Bytes flow to the final object path as they arrive; no temp objects.
    pub async fn write_blob_stream(
        &self,
        metadata: Metadata,
    ) -> Result<SnapshotWriter, WriteError> {
        Self::check_metadata(&metadata)?;
        if self.codec.is_some() {
            return Err(WriteError::NotBlob {
                dataset: self.id.to_string(),
            });
        }
        SnapshotWriter::open(self, None, metadata).await
    }

    /// Reads every record of a snapshot into memory.
    pub async fn read(&self, segment: &SnapshotId) -> Result<Vec<Record>, ReadError> {
        self.open_records(segment).await?.collect_records().await
    }

    /// Opens a lazy record iterator over a snapshot, using this dataset's
    /// bound codec and compressor for the inverse pipeline.
    pub async fn open_records(&self, segment: &SnapshotId) -> Result<RecordIterator, ReadError> {
        let codec = self.codec.clone().ok_or_else(|| ReadError::BlobOnly {
            dataset: self.id.to_string(),
        })?;
        let manifest = self.reader().get_manifest(&self.id, segment).await?;
        Ok(RecordIterator::new(
            self.store(),
            codec,
            self.compressor.clone(),
            manifest.files().to_vec(),
        ))
    }

    /// Streams one data object of a snapshot, decompressed.
    ///
    /// With the canonical noop compressor the bytes stream straight
    /// through; with a real compressor the object is buffered and
    /// decompressed whole before streaming out.
    pub async fn open_blob(
        &self,
        segment: &SnapshotId,
        path: &str,
    ) -> Result<ByteStream, ReadError> {
        let manifest = self.reader().get_manifest(&self.id, segment).await?;
        if !manifest.files().iter().any(|file| file.path == path) {
            return Err(ReadError::Store(StoreError::NotFound {
                path: path.to_string(),
            }));
        }

        let raw = self.store.get(path).await?;
        if self.compressor.name() == "noop" {
            return Ok(raw);
        }

        use futures::TryStreamExt as _;
        let chunks: Vec<bytes::Bytes> = raw.try_collect().await?;
        let compressed = chunks.concat();
        let mut reader = self
            .compressor
            .unwrap(Box::new(compressed.as_slice()))
            .map_err(CodecError::Io)?;
        let mut decompressed = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut decompressed)
            .map_err(CodecError::Io)?;
        let data = bytes::Bytes::from(decompressed);
        let stream =
            futures::stream::once(async move { Ok::<bytes::Bytes, StoreError>(data) });
        Ok(Box::pin(stream))
    }
}

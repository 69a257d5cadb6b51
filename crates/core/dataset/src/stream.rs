//! Streaming snapshot writes.
//!
//! A [`SnapshotWriter`] moves through `Open → Writing → {Committed |
//! Aborted | Failed}`. Bytes flow through the compressor and checksum tap
//! straight into the store's streaming sink at the final object path — no
//! temp objects. Nothing becomes visible to readers unless
//! [`commit`](SnapshotWriter::commit) succeeds in putting the manifest.

use std::{io::Write as _, sync::Arc};

use bytes::Bytes;
use chrono::Utc;
use lode_codec::{Codec, CodecError, StreamEncoder};
use lode_common::{
    DatasetId, FileRef, MANIFEST_FORMAT_VERSION, MANIFEST_SCHEMA_NAME, Manifest, Metadata, Record,
    SnapshotId, validate_manifest,
};
use lode_store::{MutableStore, ObjectSink};
use tracing::{debug, warn};

use crate::{
    WriteError,
    dataset::{Dataset, Snapshot},
    pipeline::{CompressHandle, ObjectTap},
};

/// How `row_count` is recorded for blob snapshots: the number of objects,
/// or zero. The choice is the caller's and is recorded as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlobRowCount {
    #[default]
    Objects,
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Writing,
    Committed,
    Aborted,
    Failed,
}

impl StreamState {
    fn name(self) -> &'static str {
        match self {
            StreamState::Writing => "writing",
            StreamState::Committed => "committed",
            StreamState::Aborted => "aborted",
            StreamState::Failed => "failed",
        }
    }
}

/// An in-progress streaming write of one snapshot.
///
/// Holds the single data object's upload open. On backends without
/// conditional multipart completion the overwrite protection of that
/// upload is best-effort, so streaming writes require single-writer
/// coordination per snapshot path.
#[must_use = "dropping a streaming write without committing aborts it"]
pub struct SnapshotWriter {
    dataset: DatasetId,
    snapshot: SnapshotId,
    parent: Option<SnapshotId>,
    store: Arc<dyn MutableStore>,
    manifest_path: String,
    data_path: String,
    codec_name: String,
    compressor_name: String,
    partitioner_name: String,
    metadata: Option<Metadata>,
    tap: ObjectTap,
    compress: CompressHandle,
    encoder: Option<Box<dyn StreamEncoder>>,
    sink: Option<Box<dyn ObjectSink>>,
    rows: i64,
    blob_row_count: BlobRowCount,
    state: StreamState,
}

impl SnapshotWriter {
    pub(crate) async fn open(
        dataset: &Dataset,
        codec: Option<Arc<dyn Codec>>,
        metadata: Metadata,
    ) -> Result<Self, WriteError> {
        let snapshot = Dataset::allocate_snapshot_id();
        let parent = dataset.head().await?;

        let data_prefix = dataset.layout.data_prefix(&dataset.id, &snapshot);
        let file_name = match &codec {
            Some(_) => dataset.data_file_name(0),
            None => format!(
                "blob-00000{}",
                dataset.compressor.file_extension().unwrap_or_default()
            ),
        };
        let data_path = format!("{data_prefix}/{file_name}");

        // The sink opens at the final path; data flows as it arrives.
        let sink = dataset.store.put_stream(&data_path).await?;

        let tap = ObjectTap::new(dataset.checksum.as_deref());
        let compress = CompressHandle::new(
            dataset
                .compressor
                .wrap(Box::new(tap.clone()))
                .map_err(CodecError::Io)?,
        );
        let encoder = match &codec {
            Some(codec) => Some(codec.stream_encoder(Box::new(compress.clone()))?),
            None => None,
        };

        Ok(Self {
            dataset: dataset.id.clone(),
            snapshot: snapshot.clone(),
            parent,
            store: dataset.store.clone(),
            manifest_path: dataset.layout.manifest_path(&dataset.id, &snapshot),
            data_path,
            codec_name: codec
                .as_ref()
                .map(|codec| codec.name().to_string())
                .unwrap_or_else(|| lode_codec::NOOP_CODEC_NAME.to_string()),
            compressor_name: dataset.compressor.name().to_string(),
            partitioner_name: dataset.partitioner.name().to_string(),
            metadata: Some(metadata),
            tap,
            compress,
            encoder,
            sink: Some(sink),
            rows: 0,
            blob_row_count: BlobRowCount::default(),
            state: StreamState::Writing,
        })
    }

    pub fn dataset_id(&self) -> &DatasetId {
        &self.dataset
    }

    /// The id the snapshot will commit under.
    pub fn snapshot_id(&self) -> &SnapshotId {
        &self.snapshot
    }

    /// Overrides how `row_count` is recorded for blob snapshots.
    pub fn blob_row_count(mut self, choice: BlobRowCount) -> Self {
        self.blob_row_count = choice;
        self
    }

    fn check_writable(&self) -> Result<(), WriteError> {
        match self.state {
            StreamState::Writing => Ok(()),
            state => Err(WriteError::Finished { state: state.name() }),
        }
    }

    /// Appends one record. Only valid on record-mode writers.
    pub async fn write_record(&mut self, record: &Record) -> Result<(), WriteError> {
        self.check_writable()?;
        // A mode mismatch is caller error and does not poison the stream.
        let Some(encoder) = self.encoder.as_mut() else {
            return Err(WriteError::BlobOnly {
                dataset: self.dataset.to_string(),
            });
        };
        if let Err(err) = encoder.encode_record(record) {
            self.state = StreamState::Failed;
            return Err(err.into());
        }
        self.rows += 1;
        self.ship_compressed().await
    }

    /// Appends raw bytes. Only valid on blob-mode writers.
    pub async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WriteError> {
        self.check_writable()?;
        if self.encoder.is_some() {
            return Err(WriteError::NotBlob {
                dataset: self.dataset.to_string(),
            });
        }
        if let Err(err) = self.compress.write_all(bytes) {
            self.state = StreamState::Failed;
            return Err(CodecError::Io(err).into());
        }
        self.ship_compressed().await
    }

    /// Ships compressed bytes accumulated in the tap to the store sink,
    /// failing the stream on sink errors.
    async fn ship_compressed(&mut self) -> Result<(), WriteError> {
        let data = self.tap.drain();
        if data.is_empty() {
            return Ok(());
        }
        let Some(sink) = self.sink.as_mut() else {
            return Err(WriteError::Finished {
                state: self.state.name(),
            });
        };
        if let Err(err) = sink.write(Bytes::from(data)).await {
            self.state = StreamState::Failed;
            return Err(err.into());
        }
        Ok(())
    }

    /// Closes the data stream and publishes the snapshot's manifest.
    ///
    /// The snapshot is visible iff this returns `Ok`. The data stream must
    /// close successfully *and* the manifest put must succeed; on failure
    /// the writer runs best-effort cleanup of the partial data object and
    /// reports the original error.
    pub async fn commit(mut self) -> Result<Snapshot, WriteError> {
        match self.commit_inner().await {
            Ok(snapshot) => {
                self.state = StreamState::Committed;
                debug!(
                    dataset = %self.dataset,
                    snapshot = %self.snapshot,
                    "committed streaming snapshot"
                );
                Ok(snapshot)
            }
            Err(err) => {
                self.state = StreamState::Failed;
                self.cleanup().await;
                Err(err)
            }
        }
    }

    async fn commit_inner(&mut self) -> Result<Snapshot, WriteError> {
        self.check_writable()?;

        if let Some(encoder) = self.encoder.take() {
            encoder.finish()?;
        }
        if let Some(writer) = self.compress.take() {
            writer.finish().map_err(CodecError::Io)?;
        }

        let trailer = self.tap.drain();
        let Some(mut sink) = self.sink.take() else {
            return Err(WriteError::Finished {
                state: self.state.name(),
            });
        };
        if !trailer.is_empty() {
            sink.write(Bytes::from(trailer)).await?;
        }
        sink.finish().await?;

        let (size_bytes, checksum) = self.tap.finalize();
        let row_count = if self.codec_name == lode_codec::NOOP_CODEC_NAME {
            match self.blob_row_count {
                BlobRowCount::Objects => 1,
                BlobRowCount::Zero => 0,
            }
        } else {
            self.rows
        };

        let manifest = Manifest {
            schema_name: MANIFEST_SCHEMA_NAME.to_string(),
            format_version: MANIFEST_FORMAT_VERSION.to_string(),
            dataset_id: self.dataset.to_string(),
            snapshot_id: self.snapshot.to_string(),
            parent_snapshot_id: self.parent.as_ref().map(|parent| parent.to_string()),
            created_at: Some(Utc::now()),
            metadata: Some(self.metadata.take().unwrap_or_default().into_inner()),
            files: Some(vec![FileRef {
                path: self.data_path.clone(),
                size_bytes: size_bytes as i64,
                checksum,
            }]),
            row_count,
            codec: self.codec_name.clone(),
            compressor: self.compressor_name.clone(),
            partitioner: self.partitioner_name.clone(),
            min_timestamp: None,
            max_timestamp: None,
        };

        validate_manifest(&manifest)?;
        let bytes = serde_json::to_vec_pretty(&manifest).map_err(WriteError::ManifestSerialize)?;
        self.store.put(&self.manifest_path, bytes.into()).await?;

        Ok(Snapshot {
            dataset: self.dataset.clone(),
            id: self.snapshot.clone(),
            manifest,
        })
    }

    /// Abandons the write. Best-effort: the partial data object is deleted
    /// if possible, and no manifest is ever written.
    pub async fn abort(mut self) {
        if matches!(self.state, StreamState::Committed | StreamState::Aborted) {
            return;
        }
        self.state = StreamState::Aborted;
        self.cleanup().await;
    }

    async fn cleanup(&mut self) {
        if let Some(sink) = self.sink.take()
            && let Err(err) = sink.abort().await
        {
            warn!(path = %self.data_path, error = %err, "failed to abort data upload");
        }
        if let Err(err) = self.store.delete(&self.data_path).await {
            warn!(path = %self.data_path, error = %err, "failed to delete partial data object");
        }
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        // Close-without-commit is an abort. Cleanup needs the runtime, so
        // it is spawned detached; without a runtime the partial object is
        // left for prefix GC.
        if matches!(self.state, StreamState::Writing | StreamState::Failed) {
            warn!(
                dataset = %self.dataset,
                snapshot = %self.snapshot,
                "streaming write dropped without commit; aborting"
            );
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let store = self.store.clone();
                let path = self.data_path.clone();
                handle.spawn(async move {
                    let _ = store.delete(&path).await;
                });
            }
        }
    }
}

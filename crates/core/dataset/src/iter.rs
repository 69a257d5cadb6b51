//! Lifecycle-compliant lazy iterators.
//!
//! All iterators obey the same laws: advancing returns `false` on
//! exhaustion or after close, the current item is only valid after a
//! successful advance, the error accessor is callable at any time, and
//! close is idempotent and releases held buffers. No implicit ordering, no
//! hidden buffering that changes visibility. Iterators are single-owner;
//! they are not for concurrent use.

use std::{collections::VecDeque, sync::Arc};

use bytes::Bytes;
use futures::TryStreamExt as _;
use lode_codec::{Codec, Compressor};
use lode_common::{DatasetId, FileRef, Record, SnapshotId};
use lode_store::Store;

use crate::ReadError;

/// A reference to one object yielded during iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub dataset: DatasetId,
    pub segment: SnapshotId,
    /// Object key, resolvable on the dataset's store.
    pub path: String,
}

/// Sequential access to object references.
pub trait ObjectIterator {
    /// Advances to the next object. Returns `false` on exhaustion or after
    /// [`close`](ObjectIterator::close).
    fn advance(&mut self) -> bool;

    /// The current object. Only valid after the most recent
    /// [`advance`](ObjectIterator::advance) returned `true`.
    fn current(&self) -> Option<&ObjectRef>;

    /// Any error encountered. Callable at any time, including after
    /// exhaustion or close.
    fn err(&self) -> Option<&ReadError>;

    /// Releases held resources. Idempotent.
    fn close(&mut self);
}

/// Iterates the files recorded in one segment's manifest, in manifest
/// order.
pub struct SegmentFileIterator {
    dataset: DatasetId,
    segment: SnapshotId,
    files: Vec<FileRef>,
    index: usize,
    current: Option<ObjectRef>,
    closed: bool,
}

impl SegmentFileIterator {
    pub fn new(dataset: DatasetId, segment: SnapshotId, files: Vec<FileRef>) -> Self {
        Self {
            dataset,
            segment,
            files,
            index: 0,
            current: None,
            closed: false,
        }
    }
}

impl ObjectIterator for SegmentFileIterator {
    fn advance(&mut self) -> bool {
        if self.closed || self.index >= self.files.len() {
            self.current = None;
            return false;
        }
        self.current = Some(ObjectRef {
            dataset: self.dataset.clone(),
            segment: self.segment.clone(),
            path: self.files[self.index].path.clone(),
        });
        self.index += 1;
        true
    }

    fn current(&self) -> Option<&ObjectRef> {
        self.current.as_ref()
    }

    fn err(&self) -> Option<&ReadError> {
        None
    }

    fn close(&mut self) {
        self.closed = true;
        self.files = Vec::new();
        self.current = None;
    }
}

/// Iterates raw listing results for one segment. Ordering is whatever the
/// store returned.
pub struct ListingIterator {
    dataset: DatasetId,
    segment: SnapshotId,
    keys: Vec<String>,
    index: usize,
    current: Option<ObjectRef>,
    closed: bool,
}

impl ListingIterator {
    pub fn new(dataset: DatasetId, segment: SnapshotId, keys: Vec<String>) -> Self {
        Self {
            dataset,
            segment,
            keys,
            index: 0,
            current: None,
            closed: false,
        }
    }
}

impl ObjectIterator for ListingIterator {
    fn advance(&mut self) -> bool {
        if self.closed || self.index >= self.keys.len() {
            self.current = None;
            return false;
        }
        self.current = Some(ObjectRef {
            dataset: self.dataset.clone(),
            segment: self.segment.clone(),
            path: self.keys[self.index].clone(),
        });
        self.index += 1;
        true
    }

    fn current(&self) -> Option<&ObjectRef> {
        self.current.as_ref()
    }

    fn err(&self) -> Option<&ReadError> {
        None
    }

    fn close(&mut self) {
        self.closed = true;
        self.keys = Vec::new();
        self.current = None;
    }
}

/// Iterates a dataset's committed segments, oldest first.
///
/// Obeys the same lifecycle laws as the object iterators, yielding
/// [`SegmentRef`](crate::read::SegmentRef)s instead of object references.
pub struct SegmentIterator {
    segments: Vec<crate::read::SegmentRef>,
    index: usize,
    current: Option<crate::read::SegmentRef>,
    closed: bool,
}

impl SegmentIterator {
    pub fn new(segments: Vec<crate::read::SegmentRef>) -> Self {
        Self {
            segments,
            index: 0,
            current: None,
            closed: false,
        }
    }

    /// Advances to the next segment. Returns `false` on exhaustion or
    /// after [`close`](SegmentIterator::close).
    pub fn advance(&mut self) -> bool {
        if self.closed || self.index >= self.segments.len() {
            self.current = None;
            return false;
        }
        self.current = Some(self.segments[self.index].clone());
        self.index += 1;
        true
    }

    /// The current segment. Only valid after the most recent
    /// [`advance`](SegmentIterator::advance) returned `true`.
    pub fn current(&self) -> Option<&crate::read::SegmentRef> {
        self.current.as_ref()
    }

    pub fn err(&self) -> Option<&ReadError> {
        None
    }

    /// Releases the segment list. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
        self.segments = Vec::new();
        self.current = None;
    }
}

/// An iterator that yields nothing.
#[derive(Debug, Default)]
pub struct EmptyIterator {
    closed: bool,
}

impl EmptyIterator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectIterator for EmptyIterator {
    fn advance(&mut self) -> bool {
        false
    }

    fn current(&self) -> Option<&ObjectRef> {
        None
    }

    fn err(&self) -> Option<&ReadError> {
        None
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Lazily yields the records of a segment, file by file, through the
/// inverse compressor and codec pipeline.
///
/// Files are fetched one at a time on demand; records within a file keep
/// their encoding order and files keep manifest order. Errors are sticky:
/// after a failure [`advance`](RecordIterator::advance) returns `false`
/// and [`err`](RecordIterator::err) reports the cause.
pub struct RecordIterator {
    store: Arc<dyn Store>,
    codec: Arc<dyn Codec>,
    compressor: Arc<dyn Compressor>,
    files: VecDeque<FileRef>,
    pending: std::vec::IntoIter<Record>,
    current: Option<Record>,
    error: Option<ReadError>,
    closed: bool,
}

impl RecordIterator {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        codec: Arc<dyn Codec>,
        compressor: Arc<dyn Compressor>,
        files: Vec<FileRef>,
    ) -> Self {
        Self {
            store,
            codec,
            compressor,
            files: files.into(),
            pending: Vec::new().into_iter(),
            current: None,
            error: None,
            closed: false,
        }
    }

    /// Advances to the next record, fetching the next file when the
    /// current one is drained.
    pub async fn advance(&mut self) -> bool {
        if self.closed || self.error.is_some() {
            self.current = None;
            return false;
        }
        loop {
            if let Some(record) = self.pending.next() {
                self.current = Some(record);
                return true;
            }
            let Some(file) = self.files.pop_front() else {
                self.current = None;
                return false;
            };
            match self.load_file(&file).await {
                Ok(records) => self.pending = records.into_iter(),
                Err(err) => {
                    self.error = Some(err);
                    self.current = None;
                    return false;
                }
            }
        }
    }

    async fn load_file(&self, file: &FileRef) -> Result<Vec<Record>, ReadError> {
        let chunks: Vec<Bytes> = self.store.get(&file.path).await?.try_collect().await?;
        let bytes = chunks.concat();
        let mut reader = self
            .compressor
            .unwrap(Box::new(bytes.as_slice()))
            .map_err(lode_codec::CodecError::Io)?;
        Ok(self.codec.decode(&mut reader)?)
    }

    /// The current record. Only valid after the most recent
    /// [`advance`](RecordIterator::advance) returned `true`.
    pub fn current(&self) -> Option<&Record> {
        self.current.as_ref()
    }

    /// Any error encountered. Callable at any time.
    pub fn err(&self) -> Option<&ReadError> {
        self.error.as_ref()
    }

    /// Releases buffered records and remaining file references. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
        self.files = VecDeque::new();
        self.pending = Vec::new().into_iter();
        self.current = None;
    }

    /// Drains the iterator into a vector, failing on the first error.
    pub async fn collect_records(mut self) -> Result<Vec<Record>, ReadError> {
        let mut records = Vec::new();
        while self.advance().await {
            if let Some(record) = self.current.take() {
                records.push(record);
            }
        }
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(records),
        }
    }
}

#[cfg(test)]
mod tests {
    use lode_common::FileRef;

    use super::{EmptyIterator, ObjectIterator as _, SegmentFileIterator};

    fn files(n: usize) -> Vec<FileRef> {
        (0..n)
            .map(|i| FileRef {
                path: format!("datasets/d/snapshots/s/data/part-{i:05}.jsonl"),
                size_bytes: 1,
                checksum: None,
            })
            .collect()
    }

    #[test]
    fn yields_files_in_manifest_order() {
        let mut iter =
            SegmentFileIterator::new("d".parse().unwrap(), "s".parse().unwrap(), files(3));
        let mut seen = Vec::new();
        while iter.advance() {
            seen.push(iter.current().unwrap().path.clone());
        }
        assert_eq!(seen.len(), 3);
        assert!(seen[0].ends_with("part-00000.jsonl"));
        assert!(seen[2].ends_with("part-00002.jsonl"));
        assert!(iter.err().is_none());
    }

    #[test]
    fn advance_after_close_returns_false() {
        let mut iter =
            SegmentFileIterator::new("d".parse().unwrap(), "s".parse().unwrap(), files(3));
        assert!(iter.advance());
        iter.close();
        assert!(!iter.advance());
        assert!(iter.current().is_none());
        assert!(iter.err().is_none());
    }

    #[test]
    fn close_is_idempotent() {
        let mut iter =
            SegmentFileIterator::new("d".parse().unwrap(), "s".parse().unwrap(), files(1));
        iter.close();
        iter.close();
        assert!(!iter.advance());
    }

    #[test]
    fn exhaustion_then_advance_stays_false() {
        let mut iter =
            SegmentFileIterator::new("d".parse().unwrap(), "s".parse().unwrap(), files(1));
        assert!(iter.advance());
        assert!(!iter.advance());
        assert!(!iter.advance());
        assert!(iter.err().is_none());
    }

    #[test]
    fn empty_iterator_obeys_the_laws() {
        let mut iter = EmptyIterator::new();
        assert!(!iter.advance());
        assert!(iter.current().is_none());
        assert!(iter.err().is_none());
        iter.close();
        iter.close();
        assert!(!iter.advance());
    }
}

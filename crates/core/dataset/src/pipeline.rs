//! Shared plumbing of the write pipeline.
//!
//! Encoded records flow codec → compressor → [`ObjectTap`] → store. The tap
//! sits at the bottom: it counts the object's bytes, feeds the checksum
//! hasher, and buffers compressed output until the caller drains it into a
//! store sink. Both the batch writer and the streaming writer are built on
//! these pieces.

use std::{
    io::{self, Write},
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use lode_codec::CompressWrite;
use lode_common::{Checksum, HashWriter};
use lode_store::{Store, StoreError};

/// Terminal byte sink of the write pipeline.
///
/// Clones share state, which is what lets the compressor own one handle as
/// its output while the writer keeps another to drain and finalize.
#[derive(Clone)]
pub(crate) struct ObjectTap {
    state: Arc<Mutex<TapState>>,
}

struct TapState {
    buf: Vec<u8>,
    written: u64,
    hasher: Option<Box<dyn HashWriter>>,
}

impl ObjectTap {
    pub(crate) fn new(checksum: Option<&dyn Checksum>) -> Self {
        Self {
            state: Arc::new(Mutex::new(TapState {
                buf: Vec::new(),
                written: 0,
                hasher: checksum.map(|c| c.hasher()),
            })),
        }
    }

    /// Takes the bytes accumulated since the last drain.
    pub(crate) fn drain(&self) -> Vec<u8> {
        let mut state = self.state.lock().expect("object tap lock poisoned");
        std::mem::take(&mut state.buf)
    }

    /// Total bytes written and the finalized digest, consuming the hasher.
    pub(crate) fn finalize(&self) -> (u64, Option<String>) {
        let mut state = self.state.lock().expect("object tap lock poisoned");
        let digest = state.hasher.take().map(|hasher| hasher.finalize());
        (state.written, digest)
    }
}

impl Write for ObjectTap {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().expect("object tap lock poisoned");
        if let Some(hasher) = state.hasher.as_mut() {
            hasher.update(data);
        }
        state.written += data.len() as u64;
        state.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Cloneable handle over the compressor stage.
///
/// The stream encoder owns one handle as its output writer while the
/// snapshot writer keeps another so it can finish the compressor after the
/// encoder is done. Writing after [`take`](CompressHandle::take) fails with
/// `BrokenPipe`.
#[derive(Clone)]
pub(crate) struct CompressHandle {
    inner: Arc<Mutex<Option<Box<dyn CompressWrite + 'static>>>>,
}

impl CompressHandle {
    pub(crate) fn new(writer: Box<dyn CompressWrite + 'static>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(writer))),
        }
    }

    pub(crate) fn take(&self) -> Option<Box<dyn CompressWrite + 'static>> {
        self.inner.lock().expect("compress handle lock poisoned").take()
    }
}

impl Write for CompressHandle {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().expect("compress handle lock poisoned");
        match inner.as_mut() {
            Some(writer) => writer.write(data),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "compressor already finished",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut inner = self.inner.lock().expect("compress handle lock poisoned");
        match inner.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

/// Uploads a fully buffered object, picking the one-shot path when the
/// payload fits the adapter's threshold and the streaming path otherwise.
pub(crate) async fn upload_object(
    store: &dyn Store,
    key: &str,
    data: Vec<u8>,
) -> Result<(), StoreError> {
    if data.len() <= store.one_shot_limit() {
        return store.put(key, Bytes::from(data)).await;
    }
    let mut sink = store.put_stream(key).await?;
    // Re-chunk so the sink sees bounded writes rather than one huge buffer.
    let chunk_size = store.one_shot_limit().max(1);
    let mut data = Bytes::from(data);
    while !data.is_empty() {
        let take = data.len().min(chunk_size);
        let chunk = data.split_to(take);
        if let Err(err) = sink.write(chunk).await {
            let _ = sink.abort().await;
            return Err(err);
        }
    }
    sink.finish().await
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use lode_common::{Checksum as _, Md5Checksum};

    use super::ObjectTap;

    #[test]
    fn tap_counts_hashes_and_buffers() {
        let tap = ObjectTap::new(Some(&Md5Checksum));
        let mut writer = tap.clone();
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();

        assert_eq!(tap.drain(), b"hello world");
        assert!(tap.drain().is_empty());

        let (written, digest) = tap.finalize();
        assert_eq!(written, 11);
        let expected = {
            let mut hasher = Md5Checksum.hasher();
            hasher.update(b"hello world");
            hasher.finalize()
        };
        assert_eq!(digest.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn tap_without_checksum_has_no_digest() {
        let tap = ObjectTap::new(None);
        let mut writer = tap.clone();
        writer.write_all(b"data").unwrap();
        let (written, digest) = tap.finalize();
        assert_eq!(written, 4);
        assert_eq!(digest, None);
    }
}

//! Byte-stream compression.

use std::io::{self, Read, Write};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};

/// Byte-stream compressor bound to a dataset.
///
/// Datasets always have a compressor; "no compression" is the canonical
/// [`NoopCompressor`], never an absent binding.
pub trait Compressor: Send + Sync {
    fn name(&self) -> &str;

    /// Extension appended to data file names, including the dot.
    fn file_extension(&self) -> Option<&str> {
        None
    }

    /// Wraps a sink; compressed output flows into `writer` as input is
    /// written. [`CompressWrite::finish`] must be called to flush trailers.
    fn wrap<'a>(
        &self,
        writer: Box<dyn Write + Send + 'a>,
    ) -> io::Result<Box<dyn CompressWrite + 'a>>;

    /// Wraps a source; reads yield decompressed bytes.
    fn unwrap<'a>(
        &self,
        reader: Box<dyn Read + Send + 'a>,
    ) -> io::Result<Box<dyn Read + Send + 'a>>;
}

/// A compressing writer that must be finished to complete the stream.
pub trait CompressWrite: Write + Send {
    /// Flushes buffered data and writes any end-of-stream trailer.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Pass-through compressor; records as `"noop"` in manifests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn name(&self) -> &str {
        "noop"
    }

    fn wrap<'a>(
        &self,
        writer: Box<dyn Write + Send + 'a>,
    ) -> io::Result<Box<dyn CompressWrite + 'a>> {
        Ok(Box::new(PassthroughWrite(writer)))
    }

    fn unwrap<'a>(
        &self,
        reader: Box<dyn Read + Send + 'a>,
    ) -> io::Result<Box<dyn Read + Send + 'a>> {
        Ok(reader)
    }
}

struct PassthroughWrite<'a>(Box<dyn Write + Send + 'a>);

impl Write for PassthroughWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl CompressWrite for PassthroughWrite<'_> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.0.flush()
    }
}

/// Gzip via `flate2`, default level. Extension `.gz`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn name(&self) -> &str {
        "gzip"
    }

    fn file_extension(&self) -> Option<&str> {
        Some(".gz")
    }

    fn wrap<'a>(
        &self,
        writer: Box<dyn Write + Send + 'a>,
    ) -> io::Result<Box<dyn CompressWrite + 'a>> {
        Ok(Box::new(GzipWrite(GzEncoder::new(
            writer,
            Compression::default(),
        ))))
    }

    fn unwrap<'a>(
        &self,
        reader: Box<dyn Read + Send + 'a>,
    ) -> io::Result<Box<dyn Read + Send + 'a>> {
        Ok(Box::new(GzDecoder::new(reader)))
    }
}

struct GzipWrite<'a>(GzEncoder<Box<dyn Write + Send + 'a>>);

impl Write for GzipWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl CompressWrite for GzipWrite<'_> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        self.0.finish().map(|_| ())
    }
}

/// Zstandard via `zstd`, default level. Extension `.zst`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdCompressor;

impl Compressor for ZstdCompressor {
    fn name(&self) -> &str {
        "zstd"
    }

    fn file_extension(&self) -> Option<&str> {
        Some(".zst")
    }

    fn wrap<'a>(
        &self,
        writer: Box<dyn Write + Send + 'a>,
    ) -> io::Result<Box<dyn CompressWrite + 'a>> {
        let encoder = zstd::stream::write::Encoder::new(writer, 0)?;
        Ok(Box::new(ZstdWrite(encoder)))
    }

    fn unwrap<'a>(
        &self,
        reader: Box<dyn Read + Send + 'a>,
    ) -> io::Result<Box<dyn Read + Send + 'a>> {
        let decoder = zstd::stream::read::Decoder::new(reader)?;
        Ok(Box::new(decoder))
    }
}

struct ZstdWrite<'a>(zstd::stream::write::Encoder<'static, Box<dyn Write + Send + 'a>>);

impl Write for ZstdWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl CompressWrite for ZstdWrite<'_> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        self.0.finish().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read as _, Write as _};

    use super::{Compressor, GzipCompressor, NoopCompressor, ZstdCompressor};

    fn round_trip(compressor: &dyn Compressor, input: &[u8]) -> Vec<u8> {
        let mut compressed = Vec::new();
        {
            let mut writer = compressor.wrap(Box::new(&mut compressed)).unwrap();
            writer.write_all(input).unwrap();
            writer.finish().unwrap();
        }
        let mut output = Vec::new();
        compressor
            .unwrap(Box::new(compressed.as_slice()))
            .unwrap()
            .read_to_end(&mut output)
            .unwrap();
        output
    }

    #[test]
    fn noop_passes_bytes_through() {
        let mut compressed = Vec::new();
        {
            let mut writer = NoopCompressor.wrap(Box::new(&mut compressed)).unwrap();
            writer.write_all(b"plain").unwrap();
            writer.finish().unwrap();
        }
        assert_eq!(compressed, b"plain");
        assert_eq!(round_trip(&NoopCompressor, b"plain"), b"plain");
    }

    #[test]
    fn gzip_round_trip() {
        let input = b"repetitive repetitive repetitive data".repeat(50);
        let mut compressed = Vec::new();
        {
            let mut writer = GzipCompressor.wrap(Box::new(&mut compressed)).unwrap();
            writer.write_all(&input).unwrap();
            writer.finish().unwrap();
        }
        assert!(compressed.len() < input.len());
        assert_eq!(round_trip(&GzipCompressor, &input), input);
    }

    #[test]
    fn zstd_round_trip() {
        let input = b"repetitive repetitive repetitive data".repeat(50);
        assert_eq!(round_trip(&ZstdCompressor, &input), input);
    }

    #[test]
    fn names_and_extensions() {
        assert_eq!(NoopCompressor.name(), "noop");
        assert_eq!(NoopCompressor.file_extension(), None);
        assert_eq!(GzipCompressor.name(), "gzip");
        assert_eq!(GzipCompressor.file_extension(), Some(".gz"));
        assert_eq!(ZstdCompressor.name(), "zstd");
        assert_eq!(ZstdCompressor.file_extension(), Some(".zst"));
    }
}

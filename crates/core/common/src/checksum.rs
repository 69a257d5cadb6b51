//! Streaming checksum components.

use md5::Digest as _;

/// A checksum algorithm that can be bound to a dataset.
///
/// When a dataset has a checksum component, every data object's manifest
/// entry carries a digest formatted `"<name>:<hex>"`.
pub trait Checksum: Send + Sync {
    fn name(&self) -> &'static str;

    /// Starts a new streaming hasher.
    fn hasher(&self) -> Box<dyn HashWriter>;
}

/// A streaming hasher fed from the write pipeline.
pub trait HashWriter: Send {
    fn update(&mut self, bytes: &[u8]);

    /// Consumes the hasher and returns the `"<name>:<hex>"` digest.
    fn finalize(self: Box<Self>) -> String;
}

/// MD5 checksums (`"md5:<32 hex chars>"`).
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Checksum;

impl Checksum for Md5Checksum {
    fn name(&self) -> &'static str {
        "md5"
    }

    fn hasher(&self) -> Box<dyn HashWriter> {
        Box::new(Md5Hasher(md5::Md5::new()))
    }
}

struct Md5Hasher(md5::Md5);

impl HashWriter for Md5Hasher {
    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finalize(self: Box<Self>) -> String {
        format!("md5:{}", hex::encode(self.0.finalize()))
    }
}

/// SHA-256 checksums (`"sha256:<64 hex chars>"`).
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Checksum;

impl Checksum for Sha256Checksum {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn hasher(&self) -> Box<dyn HashWriter> {
        Box::new(Sha256Hasher(sha2::Sha256::new()))
    }
}

struct Sha256Hasher(sha2::Sha256);

impl HashWriter for Sha256Hasher {
    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finalize(self: Box<Self>) -> String {
        format!("sha256:{}", hex::encode(self.0.finalize()))
    }
}

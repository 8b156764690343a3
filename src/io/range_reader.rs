use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Positional byte access to a slide resource.
///
/// A slide can run to tens of gigabytes, so nothing above this trait ever
/// reads a file front to back: the TIFF parser fetches headers and IFDs by
/// offset, and tile reads fetch exactly the payload ranges the placement
/// arrays name. Implementations are shared across concurrent tile fetches
/// and must be thread-safe.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`. A range past the end
    /// of the resource is an error, not a short read.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Stable identifier for logs and cache keys; the path, for local
    /// files.
    fn identifier(&self) -> &str;
}

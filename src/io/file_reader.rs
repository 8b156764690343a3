use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::RangeReader;
use crate::error::IoError;

/// Local-file implementation of RangeReader.
///
/// Uses positional reads so the file handle carries no seek state and can be
/// shared across concurrent tile fetches. Reads run on the blocking thread
/// pool to keep the async runtime responsive during large tile reads.
#[derive(Clone)]
pub struct FileRangeReader {
    file: Arc<std::fs::File>,
    size: u64,
    identifier: String,
}

impl FileRangeReader {
    /// Open a file for range reading.
    ///
    /// The file size is captured once at open; slides are immutable inputs.
    /// Returns `IoError::NotFound` if the path does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let identifier = path.display().to_string();

        let file = std::fs::File::open(path).map_err(|e| IoError::from_fs(&identifier, &e))?;
        let size = file
            .metadata()
            .map_err(|e| IoError::from_fs(&identifier, &e))?
            .len();

        Ok(Self {
            file: Arc::new(file),
            size,
            identifier,
        })
    }
}

#[async_trait]
impl RangeReader for FileRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        // Validate range bounds
        if offset.saturating_add(len as u64) > self.size {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.size,
            });
        }

        // Handle zero-length reads
        if len == 0 {
            return Ok(Bytes::new());
        }

        let file = self.file.clone();
        let identifier = self.identifier.clone();

        let buf = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, IoError> {
            use std::os::unix::fs::FileExt;

            let mut buf = vec![0u8; len];
            file.read_exact_at(&mut buf, offset)
                .map_err(|e| IoError::from_fs(&identifier, &e))?;
            Ok(buf)
        })
        .await
        .map_err(|e| IoError::File(format!("blocking read task failed: {}", e)))??;

        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

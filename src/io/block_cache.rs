use std::num::NonZeroUsize;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use lru::LruCache;
use tokio::sync::Mutex;

use super::RangeReader;
use crate::error::IoError;

/// Default block size, 256 KiB. Metadata reads cluster at the head and
/// tail of a slide, so after the first fetch nearly all of the IFD walk
/// and tag-array loads are cache hits.
pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;

/// Default capacity in blocks (100 x 256 KiB = 25.6 MiB).
const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Read cache at block granularity over any [`RangeReader`].
///
/// TIFF parsing issues many small reads at scattered offsets: the
/// header, each IFD, then the tile offset and byte-count arrays. Rounded
/// up to blocks those collapse into a handful of larger reads. Tile
/// payload reads pass through here too; a conversion band advances
/// monotonically through a level, so a modest capacity covers its
/// working set.
///
/// Two tasks missing on the same block may both fetch it; the later
/// insert wins. The input is immutable, so the duplicate fetch is the
/// whole cost, and accepting it keeps the locking flat.
pub struct BlockCache<R> {
    inner: R,
    block_size: usize,
    blocks: Mutex<LruCache<u64, Bytes>>,
}

impl<R: RangeReader> BlockCache<R> {
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY)
    }

    /// Cache with a custom block size and block count. Zero values are
    /// clamped to one.
    pub fn with_capacity(inner: R, block_size: usize, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            block_size: block_size.max(1),
            blocks: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// A block's bytes, from cache or from the source. The lock drops
    /// while the source read is in flight.
    async fn block(&self, index: u64) -> Result<Bytes, IoError> {
        if let Some(data) = self.blocks.lock().await.get(&index) {
            return Ok(data.clone());
        }

        let offset = index * self.block_size as u64;
        let size = self.inner.size();
        let remaining = size.saturating_sub(offset);
        if remaining == 0 {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: self.block_size as u64,
                size,
            });
        }

        // The file's last block is usually short.
        let len = (self.block_size as u64).min(remaining) as usize;
        let data = self.inner.read_exact_at(offset, len).await?;

        self.blocks.lock().await.put(index, data.clone());
        Ok(data)
    }

    /// Number of blocks currently resident.
    pub async fn cached_blocks(&self) -> usize {
        self.blocks.lock().await.len()
    }
}

#[async_trait]
impl<R: RangeReader + 'static> RangeReader for BlockCache<R> {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let size = self.inner.size();
        if offset.saturating_add(len as u64) > size {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size,
            });
        }
        if len == 0 {
            return Ok(Bytes::new());
        }

        let block_size = self.block_size as u64;
        let first = offset / block_size;
        let last = (offset + len as u64 - 1) / block_size;

        if first == last {
            // The common case: one block, zero copies.
            let block = self.block(first).await?;
            let start = (offset % block_size) as usize;
            return Ok(block.slice(start..start + len));
        }

        let mut out = BytesMut::with_capacity(len);
        let mut cursor = offset;
        let mut remaining = len;
        for index in first..=last {
            let block = self.block(index).await?;
            let start = (cursor % block_size) as usize;
            let take = (block.len() - start).min(remaining);
            out.extend_from_slice(&block[start..start + take]);
            cursor += take as u64;
            remaining -= take;
        }
        Ok(out.freeze())
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}

//! LRU cache of decoded tiles.
//!
//! Conversions read the source in horizontal bands whose height is not a
//! multiple of the tile height, so consecutive bands revisit a row of
//! source tiles. Caching the decoded pixels keeps each tile's decompress
//! at one.
//!
//! Keys are (level, tile x, tile y); each open slide owns its own cache
//! so no slide identifier is needed. Eviction is by total pixel bytes,
//! with an entry-count bound on top so LRU bookkeeping stays cheap.

use std::num::NonZeroUsize;
use std::sync::Arc;

use image::RgbImage;
use lru::LruCache;
use tokio::sync::Mutex;

/// Default capacity, 256 MiB: about two rows of 512x512 RGB tiles across
/// a 100k-pixel-wide slide.
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Identifies one decoded tile within a slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    pub level: u32,
    pub tile_x: u32,
    pub tile_y: u32,
}

impl TileCacheKey {
    pub fn new(level: u32, tile_x: u32, tile_y: u32) -> Self {
        Self {
            level,
            tile_x,
            tile_y,
        }
    }
}

struct Inner {
    lru: LruCache<TileCacheKey, Arc<RgbImage>>,
    bytes: usize,
}

/// Byte-bounded LRU cache of decoded tiles.
///
/// Shareable across tasks behind an `Arc`; hits hand back an
/// `Arc<RgbImage>` so no pixels are copied. The LRU map and the byte
/// counter sit under one lock, keeping the two always consistent.
pub struct TileCache {
    inner: Mutex<Inner>,
    max_bytes: usize,
}

impl TileCache {
    /// Cache with the default 256 MiB capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Cache bounded to `max_bytes` of decoded pixels.
    pub fn with_capacity(max_bytes: usize) -> Self {
        Self::with_capacity_and_entries(max_bytes, DEFAULT_MAX_ENTRIES)
    }

    /// Cache bounded both by bytes and by entry count.
    pub fn with_capacity_and_entries(max_bytes: usize, max_entries: usize) -> Self {
        let entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                lru: LruCache::new(entries),
                bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Fetch a tile, marking it most recently used.
    pub async fn get(&self, key: &TileCacheKey) -> Option<Arc<RgbImage>> {
        self.inner.lock().await.lru.get(key).cloned()
    }

    /// Membership test that leaves the LRU order untouched.
    pub async fn contains(&self, key: &TileCacheKey) -> bool {
        self.inner.lock().await.lru.contains(key)
    }

    /// Insert a tile, then evict from the cold end until the byte bound
    /// holds. Re-inserting an existing key replaces it and refreshes its
    /// position.
    pub async fn put(&self, key: TileCacheKey, tile: Arc<RgbImage>) {
        let mut inner = self.inner.lock().await;

        inner.bytes += tile.as_raw().len();
        // push() hands back either the value this key previously held or,
        // at the entry bound, the coldest entry; both leave the cache.
        if let Some((_, displaced)) = inner.lru.push(key, tile) {
            inner.bytes = inner.bytes.saturating_sub(displaced.as_raw().len());
        }

        while inner.bytes > self.max_bytes {
            match inner.lru.pop_lru() {
                Some((_, evicted)) => {
                    inner.bytes = inner.bytes.saturating_sub(evicted.as_raw().len());
                }
                None => break,
            }
        }
    }

    /// Number of cached tiles.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.lru.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.lru.is_empty()
    }

    /// Total decoded bytes currently held.
    pub async fn size(&self) -> usize {
        self.inner.lock().await.bytes
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

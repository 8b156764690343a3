//! Tile decode, encode, and caching.
//!
//! This layer sits between region assembly / conversion above and the
//! format readers below. Compressed tile payloads come up from a reader,
//! [`decode_tile`] turns them into RGB pixels, [`TileCache`] keeps the
//! decoded pixels around while neighboring requests need them, and
//! [`JpegTileEncoder`] compresses output planes when writing pyramids.
//!
//! ```
//! use wsitk_utils::tile::{TileCache, TileCacheKey, white_tile};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = TileCache::with_capacity(50 * 1024 * 1024);
//!     let key = TileCacheKey::new(0, 1, 2);
//!
//!     if let Some(tile) = cache.get(&key).await {
//!         println!("cache hit: {}x{}", tile.width(), tile.height());
//!     } else {
//!         cache.put(key, Arc::new(white_tile(512, 512))).await;
//!     }
//! }
//! ```

mod cache;
mod decoder;
mod encoder;

pub use cache::{TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
pub use decoder::{decode_tile, white_tile};
pub use encoder::{
    clamp_quality, JpegTileEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};

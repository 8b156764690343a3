//! Conversion pipelines from WSI formats to analysis-friendly outputs.
//!
//! # Architecture
//!
//! ```text
//!                  +----------------+
//!                  |  resolve_crop  |  full / auto / explicit region
//!                  +----------------+
//!                          |
//!           +--------------+--------------+
//!           v                             v
//! +------------------+          +---------------------+
//! |  convert_to_zarr |          | convert_to_ome_tiff |
//! +------------------+          +---------------------+
//!   bands -> chunked              bands -> JPEG tiles,
//!   uint8 YXC arrays              plane-separated pages
//! ```
//!
//! Both pipelines stream the source in horizontal bands through
//! [`read_region`](crate::slide::read_region), so peak memory is a few
//! bands regardless of slide size. Cropping semantics are shared: the
//! same [`CropMode`] resolves to a level 0 region before any pixels move.

mod crop;
mod ometiff;
mod zarr;

pub use crop::{resolve_crop, CropMode};
pub use ometiff::{convert_to_ome_tiff, OmeTiffConvertOptions};
pub use zarr::{convert_to_zarr, ZarrConvertOptions, DEFAULT_BAND_SIZE};

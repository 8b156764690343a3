//! # wsitk-utils
//!
//! Conversion utilities for Whole Slide Images (WSI) used in digital
//! pathology pipelines.
//!
//! This library reads pyramidal slide files (Aperio SVS and generic tiled
//! TIFF/BigTIFF) with native parsers and converts them to analysis-friendly
//! formats: pyramidal Zarr v2 stores and OME-TIFF files.
//!
//! ## Features
//!
//! - **Native slide parsing**: TIFF/BigTIFF structure, SVS metadata, JPEG
//!   and JPEG 2000 tile payloads, without an OpenSlide dependency
//! - **Range-based reading**: Fetches only the bytes each tile needs, with
//!   block and decoded-tile caching on top
//! - **Zarr export**: Pyramid levels as uncompressed `uint8` YXC arrays
//!   with slide metadata in the group attributes
//! - **OME-TIFF export**: Plane-separated, JPEG-compressed, tiled BigTIFF
//!   pyramids with an OME-XML description
//! - **Cropping**: Explicit crop rectangles or automatic tissue cropping
//!   when the scanner recorded a region of interest
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`io`] - I/O layer with file range reader and block caching
//! - [`mod@format`] - TIFF/SVS parsers and JPEG handling
//! - [`slide`] - Slide handle, metadata summary, and region reads
//! - [`tile`] - Tile decoding, encoding, and caching
//! - [`zarr`] - Zarr v2 store writer
//! - [`ome`] - OME-XML builder and OME-TIFF writer
//! - [`convert`] - Conversion pipelines tying the layers together
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsitk_utils::{convert_to_zarr, CropMode, Slide, ZarrConvertOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let slide = Slide::open("slides/sample.svs").await?;
//!
//!     let options = ZarrConvertOptions {
//!         crop: CropMode::Full,
//!         ..Default::default()
//!     };
//!     let store = convert_to_zarr(&slide, "out/sample".as_ref(), &options).await?;
//!     println!("wrote {}", store.display());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod io;
pub mod ome;
pub mod slide;
pub mod tile;
pub mod zarr;

// Re-export commonly used types
pub use config::{Cli, Command, InfoArgs, ToOmeTiffArgs, ToZarrArgs};
pub use convert::{
    convert_to_ome_tiff, convert_to_zarr, resolve_crop, CropMode, OmeTiffConvertOptions,
    ZarrConvertOptions, DEFAULT_BAND_SIZE,
};
pub use error::{ConvertError, FormatError, IoError, OmeError, TiffError, TileError, ZarrError};
pub use format::tiff::{
    parse_u32_array, parse_u64_array, validate_level, validate_pyramid, ByteOrder, Compression,
    FieldType, Ifd, IfdEntry, PyramidLevel, TiffHeader, TiffPyramid, TiffTag, TileData,
    ValidationError, ValidationResult, ValueReader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE,
};
pub use format::{detect_format, is_tiff_header, SlideFormat};
pub use format::{
    is_abbreviated_stream, is_complete_stream, merge_jpeg_tables, prepare_tile_jpeg,
    GenericTiffLevelData, GenericTiffReader, SvsLevelData, SvsMetadata, SvsReader,
};
pub use io::{BlockCache, FileRangeReader, RangeReader};
pub use ome::{build_ome_xml, OmeImageInfo, OmeTiffOptions, OmeTiffWriter, DEFAULT_TILE_SIZE};
pub use slide::{read_region, read_region_scaled, LevelInfo, Region, Slide, SlideInfo, SlideReader};
pub use tile::{
    clamp_quality, decode_tile, white_tile, JpegTileEncoder, TileCache,
    TileCacheKey, DEFAULT_JPEG_QUALITY, DEFAULT_TILE_CACHE_CAPACITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
pub use zarr::{ArrayMetadata, GroupMetadata, PyramidAttrs, ZarrArrayWriter, ZarrGroup};

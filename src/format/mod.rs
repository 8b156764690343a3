//! Slide file format support.
//!
//! [`detect::detect_format`] sniffs a file and picks a reader: Aperio
//! SVS when the base ImageDescription carries the vendor marker,
//! otherwise any tiled pyramidal TIFF falls to the generic reader. Both
//! sit on the shared `tiff` parsing layer; `jpeg` holds the stream
//! surgery SVS tiles need before a decoder will accept them.

pub mod detect;
pub mod generic_tiff;
pub mod jpeg;
pub mod svs;
pub mod tiff;

pub use detect::{detect_format, is_tiff_header, SlideFormat};
pub use generic_tiff::{GenericTiffLevelData, GenericTiffReader};
pub use jpeg::{
    is_abbreviated_stream, is_complete_stream, merge_jpeg_tables, prepare_tile_jpeg,
};
pub use svs::{SvsLevelData, SvsMetadata, SvsReader};

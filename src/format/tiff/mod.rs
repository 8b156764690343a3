//! TIFF and BigTIFF parsing, the substrate under every slide format
//! this crate reads.
//!
//! The pieces layer bottom-up: `tags` names the vocabulary, `parser`
//! decodes headers and IFDs honoring the file's declared byte order,
//! `values` fetches entry values wherever they live (inline or behind an
//! offset), `pyramid` classifies the IFD chain into resolution levels,
//! and `validation` decides whether the result is something the tile
//! readers can work with. Classic 32-bit files and 64-bit BigTIFF are
//! handled uniformly; callers only ever see [`TiffHeader::is_bigtiff`].

mod parser;
mod pyramid;
mod tags;
mod validation;
mod values;

pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use pyramid::{PyramidLevel, TiffPyramid, TileData};
pub use tags::{
    Compression, FieldType, TiffTag, RESOLUTION_UNIT_CM, RESOLUTION_UNIT_INCH,
};
pub use validation::{
    validate_level, validate_pyramid, ValidationError, ValidationResult,
};
pub use values::{parse_u32_array, parse_u64_array, ValueReader};

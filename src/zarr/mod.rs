//! Zarr v2 store writing.
//!
//! Converted pyramids land in a Zarr v2 group with one array per level,
//! named `"0"`, `"1"`, ... from finest to coarsest. Arrays are
//! uncompressed `uint8` with YXC axes so downstream analysis tools can
//! memory-map or range-read them without a codec.
//!
//! # Example
//!
//! ```no_run
//! use wsitk_utils::zarr::ZarrGroup;
//! # fn main() -> Result<(), wsitk_utils::ZarrError> {
//! let group = ZarrGroup::create("out/pyramid_0.zarr")?;
//! let array = group.create_array("0", [1536, 2048, 3], [4096, 4096, 3])?;
//!
//! let band = image::RgbImage::new(2048, 256);
//! array.write_rows(0, &band)?;
//! # Ok(())
//! # }
//! ```

mod metadata;
mod writer;

pub use metadata::{ArrayMetadata, GroupMetadata, PyramidAttrs, DTYPE_U8, ZARR_FORMAT};
pub use writer::{ZarrArrayWriter, ZarrGroup};

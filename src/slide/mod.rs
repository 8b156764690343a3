//! Format-independent slide access.
//!
//! [`Slide::open`] detects the file format, builds the matching reader
//! behind the [`SlideReader`] trait, and wires in block and tile caches.
//! From there [`read_region`] assembles arbitrary pixel rectangles out
//! of decoded tiles, which is all the conversion pipelines above (Zarr,
//! OME-TIFF) ever ask for.
//!
//! ```ignore
//! use wsitk_utils::slide::{read_region, Region, Slide};
//!
//! let slide = Slide::open("path/to/slide.svs").await?;
//! println!(
//!     "{}x{}, {} levels",
//!     slide.info().width,
//!     slide.info().height,
//!     slide.info().level_count,
//! );
//!
//! let pixels = read_region(&slide, 0, Region::new(1024, 2048, 512, 512)).await?;
//! ```

mod open;
mod reader;
mod region;

pub use open::{Slide, SlideInfo};
pub use reader::{LevelInfo, SlideReader};
pub use region::{read_region, read_region_scaled, Region};

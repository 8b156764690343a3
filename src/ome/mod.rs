//! OME-TIFF output: metadata document and pyramidal BigTIFF writer.
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |   OmeImageInfo   | --> |  build_ome_xml   |  OME-XML document
//! +------------------+     +------------------+
//!                                   |
//!                                   v
//!                          +------------------+
//!                          |  OmeTiffWriter   |  plane-separated BigTIFF
//!                          +------------------+
//! ```
//!
//! [`OmeImageInfo`] collects the slide metadata that belongs in the OME-XML
//! header (acquisition date, scanner, magnification, pixel size), and
//! [`build_ome_xml`] renders it. [`OmeTiffWriter`] stores the document in
//! the first IFD of the output file alongside the JPEG tile pyramid.
//!
//! # Example
//!
//! ```no_run
//! use wsitk_utils::ome::{build_ome_xml, OmeImageInfo, OmeTiffOptions, OmeTiffWriter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let info = OmeImageInfo {
//!     size_x: 4096,
//!     size_y: 4096,
//!     size_c: 3,
//!     physical_size_x: Some(0.25),
//!     physical_size_y: Some(0.25),
//!     ..Default::default()
//! };
//! let xml = build_ome_xml(&info);
//!
//! let writer = OmeTiffWriter::create("out.ome.tiff", 4096, 4096, 3, OmeTiffOptions::default())?;
//! // ... write all tiles ...
//! writer.finish(&xml, "wsitk-utils 0.1.0", Some((0.25, 0.25)))?;
//! # Ok(())
//! # }
//! ```

mod writer;
mod xml;

pub use writer::{OmeTiffOptions, OmeTiffWriter, DEFAULT_TILE_SIZE};
pub use xml::{build_ome_xml, parse_scan_datetime, OmeImageInfo, OME_SCHEMA_2016};

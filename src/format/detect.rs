//! Slide format sniffing.
//!
//! Conversion starts by classifying the input file so the right parser can
//! take over. Everything this crate reads is TIFF-shaped, so detection is a
//! header check followed by a peek at the first ImageDescription:
//!
//! - Aperio scanners stamp `Aperio` into the description of the baseline
//!   image, which marks the file as SVS.
//! - Any other tiled TIFF/BigTIFF falls through to the generic reader.
//!
//! Files that are not TIFF at all are rejected here, before any pyramid
//! parsing or pixel work happens.

use crate::error::FormatError;
use crate::io::RangeReader;

use super::tiff::{ByteOrder, Ifd, TiffHeader, TiffTag, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};

/// Vendor marker Aperio writes into the first ImageDescription.
const APERIO_MARKER: &[u8] = b"Aperio";

/// How much of the first ImageDescription to fetch when sniffing.
///
/// The Aperio marker sits at the very start of the description; reading a
/// single KiB covers it with plenty of slack while keeping the probe cheap.
const DESCRIPTION_PROBE_LEN: usize = 1024;

/// Classified slide container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideFormat {
    /// Aperio SVS: TIFF with vendor metadata and (usually) abbreviated
    /// JPEG tile streams sharing a JPEGTables segment.
    AperioSvs,

    /// Plain tiled pyramidal TIFF or BigTIFF.
    GenericTiff,
}

impl SlideFormat {
    /// Human-readable format name, used in logs and `info` output.
    pub const fn name(&self) -> &'static str {
        match self {
            SlideFormat::AperioSvs => "Aperio SVS",
            SlideFormat::GenericTiff => "Generic Pyramidal TIFF",
        }
    }
}

/// Classify a slide file.
///
/// Parses the TIFF header, walks to the first IFD, and inspects its
/// ImageDescription for vendor markers. Returns
/// [`FormatError::UnsupportedFormat`] when the file is not a TIFF of any
/// flavor.
pub async fn detect_format<R: RangeReader>(reader: &R) -> Result<SlideFormat, FormatError> {
    if reader.size() < BIGTIFF_HEADER_SIZE as u64 {
        return Err(FormatError::UnsupportedFormat {
            reason: "File too small to be a valid TIFF".to_string(),
        });
    }

    let header_bytes = reader.read_exact_at(0, BIGTIFF_HEADER_SIZE).await?;
    let header = TiffHeader::parse(&header_bytes, reader.size())?;

    match first_image_description(reader, &header).await? {
        Some(desc) if contains_marker(&desc, APERIO_MARKER) => Ok(SlideFormat::AperioSvs),
        _ => Ok(SlideFormat::GenericTiff),
    }
}

/// Fetch up to [`DESCRIPTION_PROBE_LEN`] bytes of the first IFD's
/// ImageDescription, or `None` when the tag is absent or empty.
async fn first_image_description<R: RangeReader>(
    reader: &R,
    header: &TiffHeader,
) -> Result<Option<Vec<u8>>, FormatError> {
    let count_bytes = reader
        .read_exact_at(header.first_ifd_offset, header.ifd_count_size())
        .await?;
    let entry_count = Ifd::read_entry_count(&count_bytes, header)?;

    let ifd_size = Ifd::calculate_size(entry_count, header);
    let ifd_bytes = reader
        .read_exact_at(header.first_ifd_offset, ifd_size)
        .await?;
    let ifd = Ifd::parse(&ifd_bytes, header)?;

    let entry = match ifd.get_entry_by_tag(TiffTag::ImageDescription) {
        Some(e) => e,
        None => return Ok(None),
    };

    let len = (entry.count as usize).min(DESCRIPTION_PROBE_LEN);
    if len == 0 {
        return Ok(None);
    }

    let bytes = if entry.is_inline {
        entry.value_offset_bytes[..len.min(entry.value_offset_bytes.len())].to_vec()
    } else {
        let offset = entry.value_offset(header.byte_order);
        reader.read_exact_at(offset, len).await?.to_vec()
    };

    Ok(Some(bytes))
}

fn contains_marker(haystack: &[u8], marker: &[u8]) -> bool {
    haystack.windows(marker.len()).any(|w| w == marker)
}

/// Cheap structural check that a byte slice starts like a TIFF or BigTIFF
/// file, without parsing offsets or validating against a file size.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }

    let byte_order = match (bytes[0], bytes[1]) {
        (0x49, 0x49) => ByteOrder::LittleEndian,
        (0x4D, 0x4D) => ByteOrder::BigEndian,
        _ => return false,
    };

    // 42 is classic TIFF, 43 is BigTIFF.
    matches!(byte_order.read_u16(&bytes[2..4]), 42 | 43)
}

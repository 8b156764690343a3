//! Fetching tag values.
//!
//! An IFD entry stores its value inline when it fits in the entry's value
//! field (4 bytes classic, 8 bytes BigTIFF) and behind a file offset
//! otherwise. [`ValueReader`] hides that split: it hands back the value
//! bytes wherever they live, honoring the file's byte order, and decodes
//! the handful of shapes the readers need (offset arrays, resolution
//! rationals, ASCII strings, opaque JPEGTables blobs).
//!
//! Array values are fetched with one ranged read for the whole array, not
//! per element; TileOffsets on a big level can run to tens of thousands of
//! entries.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

/// Decodes entry values against a file's header (byte order, offsets).
pub struct ValueReader<'a, R: RangeReader> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    /// The exact bytes of an entry's value, inline or fetched from the
    /// entry's offset.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            let bytes = self.reader.read_exact_at(offset, size as usize).await?;
            Ok(bytes)
        }
    }

    /// Decode an integer array (Short, Long, or Long8 elements) to u64.
    ///
    /// The shape TileOffsets and TileByteCounts take; one ranged read
    /// covers the whole array.
    pub async fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.count == 0 {
            return Ok(Vec::new());
        }
        if !matches!(
            field_type,
            FieldType::Short | FieldType::Long | FieldType::Long8
        ) {
            return Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!(
                    "expected Short, Long, or Long8 for array, got {:?}",
                    field_type
                ),
            });
        }

        let bytes = self.read_bytes(entry).await?;
        Ok(parse_u64_array(
            &bytes,
            entry.count as usize,
            field_type,
            self.header.byte_order,
        ))
    }

    /// Decode the first rational (u32 numerator over u32 denominator).
    ///
    /// XResolution/YResolution store pixel density this way; combined with
    /// ResolutionUnit it yields microns per pixel.
    pub async fn read_rational(&self, entry: &IfdEntry) -> Result<(u32, u32), TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if field_type != FieldType::Rational {
            return Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("expected Rational type, got {:?}", field_type),
            });
        }
        if entry.count == 0 {
            return Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: "expected at least one rational value".to_string(),
            });
        }

        let bytes = self.read_bytes(entry).await?;
        Ok((
            self.header.byte_order.read_u32(&bytes[0..4]),
            self.header.byte_order.read_u32(&bytes[4..8]),
        ))
    }

    /// Decode an ASCII entry to a string, dropping the NUL terminator and
    /// anything after it.
    pub async fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if field_type != FieldType::Ascii {
            return Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("expected Ascii type for string, got {:?}", field_type),
            });
        }

        let bytes = self.read_bytes(entry).await?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Fetch an entry's value as opaque bytes; how JPEGTables is read.
    pub async fn read_raw_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        self.read_bytes(entry).await
    }
}

/// Decode `count` integer elements of `field_type` from raw bytes,
/// widening everything to u64. Elements that would run past the end of the
/// buffer are dropped.
pub fn parse_u64_array(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Vec<u64> {
    let elem = field_type.size_in_bytes();
    let decode: fn(ByteOrder, &[u8]) -> u64 = match field_type {
        FieldType::Short => |bo, b| bo.read_u16(b) as u64,
        FieldType::Long => |bo, b| bo.read_u32(b) as u64,
        FieldType::Long8 => |bo, b| bo.read_u64(b),
        _ => return Vec::new(),
    };

    bytes
        .chunks_exact(elem)
        .take(count)
        .map(|chunk| decode(byte_order, chunk))
        .collect()
}

/// Decode `count` Short or Long elements to u32. See [`parse_u64_array`].
pub fn parse_u32_array(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Vec<u32> {
    if !matches!(field_type, FieldType::Short | FieldType::Long) {
        return Vec::new();
    }
    parse_u64_array(bytes, count, field_type, byte_order)
        .into_iter()
        .map(|v| v as u32)
        .collect()
}

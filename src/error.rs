use thiserror::Error;

/// I/O errors that can occur when reading slide bytes
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from the local filesystem
    #[error("File error: {0}")]
    File(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

impl IoError {
    /// Map a filesystem error to the matching variant.
    pub fn from_fs(path: &str, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(path.to_string()),
            _ => IoError::File(format!("{}: {}", path, err)),
        }
    }
}

/// Errors related to format detection and validation
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF parsing error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// File format is not supported
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0} (supported: JPEG, JPEG 2000, uncompressed)")]
    UnsupportedCompression(String),

    /// File uses strips instead of tiles
    #[error("Unsupported organization: file uses strips instead of tiles")]
    StripOrganization,

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Errors that can occur when decoding or encoding tile pixel data
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Tile data could not be decoded
    #[error("Tile decode error: {message}")]
    DecodeError { message: String },

    /// Pixel data could not be encoded
    #[error("Tile encode error: {message}")]
    EncodeError { message: String },

    /// Tile uses a compression this build cannot decode
    #[error("Undecodable compression: {0}")]
    UndecodableCompression(String),

    /// Raw tile buffer does not match the expected tile geometry
    #[error("Tile size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Errors produced by the Zarr store writer
#[derive(Debug, Clone, Error)]
pub enum ZarrError {
    /// Filesystem error while creating or writing the store
    #[error("Zarr store error at {path}: {message}")]
    StoreIo { path: String, message: String },

    /// Metadata document could not be serialized
    #[error("Zarr metadata error: {0}")]
    Metadata(String),

    /// Band write falls outside the array shape
    #[error("Zarr write out of bounds: {message}")]
    OutOfBounds { message: String },

    /// Band buffer does not match the array width or channel count
    #[error("Zarr shape mismatch: {message}")]
    ShapeMismatch { message: String },
}

/// Errors produced by the OME-TIFF writer
#[derive(Debug, Clone, Error)]
pub enum OmeError {
    /// Filesystem error while writing the output file
    #[error("OME-TIFF write error at {path}: {message}")]
    Io { path: String, message: String },

    /// Tile encoding failed
    #[error("OME-TIFF tile error: {0}")]
    Tile(#[from] TileError),

    /// Output geometry is unusable (zero-sized image or tile)
    #[error("Invalid OME-TIFF geometry: {message}")]
    Geometry { message: String },
}

/// Top-level error for the conversion pipelines
#[derive(Debug, Clone, Error)]
pub enum ConvertError {
    /// I/O error reading the source slide
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Source slide could not be opened
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Source TIFF structure error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// Tile decode/encode error
    #[error("Tile error: {0}")]
    Tile(#[from] TileError),

    /// Zarr store write error
    #[error("Zarr error: {0}")]
    Zarr(#[from] ZarrError),

    /// OME-TIFF write error
    #[error("OME-TIFF error: {0}")]
    Ome(#[from] OmeError),

    /// Crop region clamped to zero area
    #[error("Empty crop region: ({x0}, {y0}) {width}x{height} leaves nothing to convert")]
    EmptyCrop {
        x0: u32,
        y0: u32,
        width: u32,
        height: u32,
    },

    /// Destination path error
    #[error("Output error at {path}: {message}")]
    Output { path: String, message: String },
}

use thiserror::Error;

/// Errors that can occur when parsing a TIFF/BigTIFF container.
///
/// These map directly onto the error kinds a handler must translate into a
/// fail-closed [`crate::models::ScanResult`]: any variant here means the
/// caller should treat the file as not clean.
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading or writing the file.
    #[error("I/O error: {0}")]
    Io(String),

    /// File is too small to contain a valid TIFF header.
    #[error("file too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid TIFF magic bytes (not `II` or `MM`).
    #[error("invalid byte-order marker: expected 'II' or 'MM', got {0:?}")]
    InvalidByteOrder([u8; 2]),

    /// Invalid TIFF version number (not 42 classic or 43 BigTIFF).
    #[error("invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8).
    #[error("invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// IFD offset points outside the file or is otherwise unusable.
    #[error("invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// The IFD entry count exceeds the corruption guard (1000 entries).
    #[error("implausible IFD entry count: {0}")]
    ImplausibleEntryCount(u64),
}

impl From<std::io::Error> for TiffError {
    fn from(e: std::io::Error) -> Self {
        TiffError::Io(e.to_string())
    }
}

/// Errors surfaced by a format handler's scan/anonymize operations.
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// The file did not parse as a TIFF/BigTIFF container.
    #[error("not a TIFF file: {0}")]
    NotATiff(#[from] TiffError),

    /// An IFD was structurally corrupt; the handler continued with whatever
    /// it could read, but the result cannot be trusted as clean.
    #[error("corrupt IFD at offset {0}")]
    CorruptIfd(u64),

    /// Underlying I/O failure that aborted the operation outright.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A TIFF data type code outside the enumerated set was encountered.
    /// Non-fatal by contract (§4.1): the tag is read conservatively and the
    /// scan continues. Retained as a named error for diagnostics.
    #[error("unsupported field type code: {0}")]
    UnsupportedType(u16),
}

/// Errors from the per-file pipeline (copy, verify, hashing, timestamp reset).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source file not found: {0}")]
    NotFound(String),

    #[error("no format handler recognizes this file: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("format error: {0}")]
    Format(#[from] FormatError),
}

/// Errors from loading a [`crate::scanner::PatternConfig`] JSON overlay.
#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("I/O error reading pattern config: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed pattern config JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("invalid regex in pattern config ({label:?}): {source}")]
    InvalidPattern {
        label: String,
        #[source]
        source: regex::Error,
    },
}

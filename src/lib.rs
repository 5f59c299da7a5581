//! # PathSafe
//!
//! A PHI-redaction engine for whole-slide-image (WSI) TIFF and BigTIFF
//! container files.
//!
//! PathSafe parses the TIFF/BigTIFF structure of a pathology slide file,
//! locates protected health information wherever a given scanner vendor
//! is known to embed it — private tag ranges, pipe-delimited descriptions,
//! embedded XML or XMP blocks, EXIF/GPS sub-IFDs, label and macro
//! photographs of the physical slide — and overwrites it in place without
//! resizing the file or moving any IFD. A deliberately narrow raw-byte
//! regex sweep and a filename check back up the structured passes for
//! anything a vendor-specific parser can't reach.
//!
//! ## Architecture
//!
//! - [`tiff`] - binary TIFF/BigTIFF header, IFD, and tag-value parsing
//! - [`editor`] - in-place, fixed-size byte editing primitives (blank, unlink, pad)
//! - [`scanner`] - PHI pattern matching over bytes, strings, dates, and filenames
//! - [`models`] - shared result and finding types
//! - [`format`] - per-vendor handlers (NDPI, SVS, BIF, SCN, generic) and the registry
//! - [`pipeline`] - the per-file copy/verify/hash/timestamp operation around a handler
//! - [`config`] - pattern-overlay and CLI configuration types
//! - [`error`] - error types for each layer

pub mod config;
pub mod editor;
pub mod error;
pub mod format;
pub mod models;
pub mod pipeline;
pub mod scanner;
pub mod tiff;

pub use config::{AppConfig, Cli, Command};
pub use error::{FormatError, PipelineError, ScannerError, TiffError};
pub use format::{FormatHandler, FormatInfo, HandlerRegistry, LabelMacroPolicy};
pub use models::{
    AnonymizationResult, AnonymizeMode, FindingSource, IntegrityStatus, PhiFinding, ScanResult,
};
pub use pipeline::{anonymize_file, PipelineOptions};
pub use scanner::PatternConfig;

//! Vendor-specific format handlers for whole-slide-image TIFF containers.
//!
//! Each handler in this module knows where a given vendor hides PHI inside
//! an otherwise standard TIFF/BigTIFF structure — a private tag range, a
//! pipe-delimited description, an embedded XML or XMP block — and shares
//! the structural scan/redact primitives in [`base`]. [`registry`] picks
//! the right handler for a given file.

pub mod base;
pub mod bif;
pub mod generic_tiff;
pub mod ndpi;
pub mod registry;
pub mod scn;
pub mod svs;

pub use base::{FormatHandler, FormatInfo, LabelMacroPolicy};
pub use registry::HandlerRegistry;

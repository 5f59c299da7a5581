//! Read-only TIFF/BigTIFF binary parser (§4.1).
//!
//! Supports classic TIFF (32-bit offsets) and BigTIFF (64-bit offsets), both
//! byte orders. Never writes; the in-place editor lives in [`crate::editor`].

mod header;
mod ifd;
mod tags;
mod values;

pub use header::{ByteOrder, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use ifd::{
    find_tag_in_ifd, iter_ifds, next_pointer_offset, read_ifd, IfdEntry, MAX_IFD_CHAIN,
    MAX_IFD_ENTRIES,
};
pub use tags::*;
pub use values::{
    decode_ascii_lossy, read_tag_bytes, read_tag_long_array, read_tag_numeric, read_tag_string,
    trim_trailing_nuls, NumericValue,
};

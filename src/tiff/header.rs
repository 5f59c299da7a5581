use crate::error::TiffError;
use std::io::{Read, Seek, SeekFrom};

/// Byte order of a TIFF file, selected by the two-byte marker at offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        let b = [bytes[0], bytes[1]];
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(b),
            ByteOrder::BigEndian => u16::from_be_bytes(b),
        }
    }

    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        let b = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(b),
            ByteOrder::BigEndian => u32::from_be_bytes(b),
        }
    }

    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&bytes[..8]);
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(b),
            ByteOrder::BigEndian => u64::from_be_bytes(b),
        }
    }

    pub fn read_i16(self, bytes: &[u8]) -> i16 {
        self.read_u16(bytes) as i16
    }

    pub fn read_i32(self, bytes: &[u8]) -> i32 {
        self.read_u32(bytes) as i32
    }

    pub fn read_f32(self, bytes: &[u8]) -> f32 {
        f32::from_bits(self.read_u32(bytes))
    }

    pub fn read_f64(self, bytes: &[u8]) -> f64 {
        f64::from_bits(self.read_u64(bytes))
    }

    pub fn write_u32(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }

    pub fn write_u64(self, value: u64) -> [u8; 8] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }
}

pub const TIFF_HEADER_SIZE: u64 = 8;
pub const BIGTIFF_HEADER_SIZE: u64 = 16;

/// Parsed TIFF/BigTIFF file header.
///
/// Lifetime: derived fresh from each file open, never mutated except when
/// the first IFD in the chain is unlinked (the editor rewrites
/// `first_ifd_offset`'s on-disk location directly; this in-memory struct is
/// simply re-derived afterward).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub byte_order: ByteOrder,
    pub is_bigtiff: bool,
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Byte offset of the first-IFD pointer field within the header, used by
    /// `unlink_ifd` when the target is the first IFD in the chain.
    pub fn first_ifd_pointer_offset(&self) -> u64 {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    pub fn ifd_count_size(&self) -> u64 {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    pub fn ifd_entry_size(&self) -> u64 {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    pub fn ifd_next_offset_size(&self) -> u64 {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    pub fn value_offset_size(&self) -> u64 {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    pub fn inline_threshold(&self) -> u64 {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    /// Parses the header of an already-open, seekable reader.
    ///
    /// Any structural problem returns `None` semantics via `Err`: callers
    /// treat a parse failure as "not a TIFF" rather than propagating it as a
    /// hard error, per §4.1.
    pub fn parse<R: Read + Seek>(reader: &mut R, file_size: u64) -> Result<Self, TiffError> {
        if file_size < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE,
                actual: file_size,
            });
        }

        reader.seek(SeekFrom::Start(0))?;
        let mut bo_bytes = [0u8; 2];
        reader.read_exact(&mut bo_bytes)?;
        let byte_order = match &bo_bytes {
            b"II" => ByteOrder::LittleEndian,
            b"MM" => ByteOrder::BigEndian,
            _ => return Err(TiffError::InvalidByteOrder(bo_bytes)),
        };

        let mut magic_bytes = [0u8; 2];
        reader.read_exact(&mut magic_bytes)?;
        let magic = byte_order.read_u16(&magic_bytes);

        match magic {
            42 => {
                let mut offset_bytes = [0u8; 4];
                reader.read_exact(&mut offset_bytes)?;
                let first_ifd_offset = byte_order.read_u32(&offset_bytes) as u64;
                Ok(TiffHeader {
                    byte_order,
                    is_bigtiff: false,
                    first_ifd_offset,
                })
            }
            43 => {
                if file_size < BIGTIFF_HEADER_SIZE {
                    return Err(TiffError::FileTooSmall {
                        required: BIGTIFF_HEADER_SIZE,
                        actual: file_size,
                    });
                }
                let mut bytesize_bytes = [0u8; 2];
                reader.read_exact(&mut bytesize_bytes)?;
                let bytesize = byte_order.read_u16(&bytesize_bytes);
                if bytesize != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(bytesize));
                }
                let mut reserved = [0u8; 2];
                reader.read_exact(&mut reserved)?;
                let mut offset_bytes = [0u8; 8];
                reader.read_exact(&mut offset_bytes)?;
                let first_ifd_offset = byte_order.read_u64(&offset_bytes);
                Ok(TiffHeader {
                    byte_order,
                    is_bigtiff: true,
                    first_ifd_offset,
                })
            }
            other => Err(TiffError::InvalidVersion(other)),
        }
    }
}

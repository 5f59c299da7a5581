use crate::error::TiffError;
use crate::tiff::header::TiffHeader;
use crate::tiff::tags::{element_size, tag_name};
use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom};

/// Maximum number of entries accepted in a single IFD before it is treated
/// as corrupt (§4.1 robustness rule). Guards against allocating huge
/// buffers for a garbage entry count.
pub const MAX_IFD_ENTRIES: u64 = 1000;

/// Maximum number of IFDs followed in a single chain walk (§4.1).
pub const MAX_IFD_CHAIN: usize = 100;

/// A single IFD entry: tag id, data type, element count, and the two
/// offsets needed to locate both the entry record and its value bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag_id: u16,
    pub dtype: u16,
    pub count: u64,
    /// Where this entry's value bytes live — inside the entry record
    /// itself if `is_inline`, otherwise at an out-of-line offset.
    pub value_offset: u64,
    /// Where the entry record itself starts in the file.
    pub entry_offset: u64,
    pub is_inline: bool,
}

impl IfdEntry {
    pub fn tag_name(&self) -> String {
        tag_name(self.tag_id)
    }

    pub fn total_size(&self) -> u64 {
        element_size(self.dtype) * self.count
    }
}

/// Reads all entries of one IFD plus the offset of the next IFD in the
/// chain (0 if this is the last one). Truncated reads mid-entry-loop stop
/// at the last complete entry rather than erroring (§4.1).
pub fn read_ifd<R: Read + Seek>(
    reader: &mut R,
    header: &TiffHeader,
    ifd_offset: u64,
) -> Result<(Vec<IfdEntry>, u64), TiffError> {
    reader.seek(SeekFrom::Start(ifd_offset))?;

    let count_size = header.ifd_count_size() as usize;
    let mut count_buf = vec![0u8; count_size];
    reader.read_exact(&mut count_buf)?;
    let num_entries = if header.is_bigtiff {
        header.byte_order.read_u64(&count_buf)
    } else {
        header.byte_order.read_u16(&count_buf) as u64
    };

    if num_entries > MAX_IFD_ENTRIES {
        return Err(TiffError::ImplausibleEntryCount(num_entries));
    }

    let entry_size = header.ifd_entry_size() as usize;
    let inline_threshold = header.inline_threshold();
    let mut entries = Vec::with_capacity(num_entries as usize);

    for _ in 0..num_entries {
        let entry_offset = reader.stream_position()?;
        let mut buf = vec![0u8; entry_size];
        match reader.read_exact(&mut buf) {
            Ok(()) => {}
            Err(_) => break,
        }

        let tag_id = header.byte_order.read_u16(&buf[0..2]);
        let dtype = header.byte_order.read_u16(&buf[2..4]);

        let (count, value_field) = if header.is_bigtiff {
            (header.byte_order.read_u64(&buf[4..12]), &buf[12..20])
        } else {
            (header.byte_order.read_u32(&buf[4..8]) as u64, &buf[8..12])
        };

        let total = element_size(dtype) * count;
        let (value_offset, is_inline) = if total <= inline_threshold {
            (entry_offset + (entry_size as u64 - inline_threshold), true)
        } else if header.is_bigtiff {
            (header.byte_order.read_u64(value_field), false)
        } else {
            (header.byte_order.read_u32(value_field) as u64, false)
        };

        entries.push(IfdEntry {
            tag_id,
            dtype,
            count,
            value_offset,
            entry_offset,
            is_inline,
        });
    }

    let next_size = header.ifd_next_offset_size() as usize;
    let mut next_buf = vec![0u8; next_size];
    let next_offset = match reader.read_exact(&mut next_buf) {
        Ok(()) => {
            if header.is_bigtiff {
                header.byte_order.read_u64(&next_buf)
            } else {
                header.byte_order.read_u32(&next_buf) as u64
            }
        }
        Err(_) => 0,
    };

    Ok((entries, next_offset))
}

/// Byte offset of an IFD's next-pointer field, used by `unlink_ifd` to
/// rewrite a predecessor's link without re-reading the whole IFD.
pub fn next_pointer_offset(header: &TiffHeader, ifd_offset: u64, num_entries: u64) -> u64 {
    ifd_offset + header.ifd_count_size() + num_entries * header.ifd_entry_size()
}

/// Walks the IFD chain from the header's first-IFD offset, yielding
/// `(ifd_offset, entries)` pairs in order. Terminates on a zero next-offset,
/// a self-loop/back-edge (already-seen offset), or the chain-length cap.
pub fn iter_ifds<R: Read + Seek>(
    reader: &mut R,
    header: &TiffHeader,
) -> Result<Vec<(u64, Vec<IfdEntry>)>, TiffError> {
    let mut result = Vec::new();
    let mut offset = header.first_ifd_offset;
    let mut seen = HashSet::new();
    let mut count = 0usize;

    while offset != 0 && count < MAX_IFD_CHAIN {
        if !seen.insert(offset) {
            break;
        }
        let (entries, next_offset) = match read_ifd(reader, header, offset) {
            Ok(v) => v,
            Err(_) => break,
        };
        result.push((offset, entries));
        offset = next_offset;
        count += 1;
    }

    Ok(result)
}

/// Finds the first entry with the given tag id in one IFD.
pub fn find_tag_in_ifd(entries: &[IfdEntry], target_tag: u16) -> Option<IfdEntry> {
    entries.iter().find(|e| e.tag_id == target_tag).copied()
}

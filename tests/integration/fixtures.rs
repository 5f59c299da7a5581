//! In-memory classic-TIFF fixture builder for integration tests.
//!
//! Builds a minimal, syntactically valid little-endian classic TIFF with
//! caller-specified IFDs and tag values, writes it to a temp file with a
//! chosen extension, and hands back the open handle so the test can drive
//! a format handler against a real path.

use tempfile::NamedTempFile;

#[derive(Clone)]
pub struct Tag {
    pub id: u16,
    pub dtype: u16,
    pub count: u32,
    pub value: Vec<u8>,
}

impl Tag {
    pub fn ascii(id: u16, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        Tag { id, dtype: 2, count: bytes.len() as u32, value: bytes }
    }

    pub fn float(id: u16, v: f32) -> Self {
        Tag { id, dtype: 11, count: 1, value: v.to_le_bytes().to_vec() }
    }

    pub fn long_array(id: u16, vals: &[u32]) -> Self {
        let mut value = Vec::new();
        for v in vals {
            value.extend_from_slice(&v.to_le_bytes());
        }
        Tag { id, dtype: 4, count: vals.len() as u32, value }
    }

    pub fn bytes_value(id: u16, dtype: u16, bytes: Vec<u8>) -> Self {
        let count = bytes.len() as u32;
        Tag { id, dtype, count, value: bytes }
    }
}

fn ifd_entries_size(n: usize) -> u64 {
    2 + 12 * n as u64 + 4
}

/// Builds a classic, little-endian TIFF with one IFD per slice of `ifds`,
/// chained in order. Tag value bytes longer than 4 are written out-of-line
/// right after that IFD's entry table.
pub fn build_classic_tiff(ifds: &[Vec<Tag>]) -> Vec<u8> {
    let mut positions = Vec::new();
    let mut cursor = 8u64;
    for tags in ifds {
        let entries_size = ifd_entries_size(tags.len());
        let ifd_start = cursor;
        let overflow_start = ifd_start + entries_size;
        let overflow_size: u64 = tags
            .iter()
            .filter(|t| t.value.len() > 4)
            .map(|t| t.value.len() as u64)
            .sum();
        positions.push((ifd_start, overflow_start));
        cursor = overflow_start + overflow_size;
    }

    let mut buf = vec![0u8; cursor as usize];
    buf[0] = b'I';
    buf[1] = b'I';
    buf[2] = 42;
    buf[3] = 0;
    buf[4..8].copy_from_slice(&(positions.first().map(|p| p.0).unwrap_or(0) as u32).to_le_bytes());

    for (i, tags) in ifds.iter().enumerate() {
        let (ifd_start, overflow_start) = positions[i];
        let mut pos = ifd_start as usize;
        buf[pos..pos + 2].copy_from_slice(&(tags.len() as u16).to_le_bytes());
        pos += 2;
        let mut overflow_cursor = overflow_start as usize;
        for t in tags {
            buf[pos..pos + 2].copy_from_slice(&t.id.to_le_bytes());
            buf[pos + 2..pos + 4].copy_from_slice(&t.dtype.to_le_bytes());
            buf[pos + 4..pos + 8].copy_from_slice(&t.count.to_le_bytes());
            if t.value.len() <= 4 {
                let mut inline = [0u8; 4];
                inline[..t.value.len()].copy_from_slice(&t.value);
                buf[pos + 8..pos + 12].copy_from_slice(&inline);
            } else {
                buf[pos + 8..pos + 12].copy_from_slice(&(overflow_cursor as u32).to_le_bytes());
                buf[overflow_cursor..overflow_cursor + t.value.len()].copy_from_slice(&t.value);
                overflow_cursor += t.value.len();
            }
            pos += 12;
        }
        let next_ifd = positions.get(i + 1).map(|p| p.0).unwrap_or(0) as u32;
        buf[pos..pos + 4].copy_from_slice(&next_ifd.to_le_bytes());
    }

    buf
}

fn bigtiff_ifd_entries_size(n: usize) -> u64 {
    8 + 20 * n as u64 + 8
}

/// Builds a BigTIFF (64-bit offsets) with one IFD per slice of `ifds`,
/// chained in order. Tag value bytes longer than 8 are written out-of-line
/// right after that IFD's entry table.
pub fn build_bigtiff(ifds: &[Vec<Tag>]) -> Vec<u8> {
    let mut positions = Vec::new();
    let mut cursor = 16u64;
    for tags in ifds {
        let entries_size = bigtiff_ifd_entries_size(tags.len());
        let ifd_start = cursor;
        let overflow_start = ifd_start + entries_size;
        let overflow_size: u64 = tags
            .iter()
            .filter(|t| t.value.len() > 8)
            .map(|t| t.value.len() as u64)
            .sum();
        positions.push((ifd_start, overflow_start));
        cursor = overflow_start + overflow_size;
    }

    let mut buf = vec![0u8; cursor as usize];
    buf[0] = b'I';
    buf[1] = b'I';
    buf[2] = 43;
    buf[3] = 0;
    buf[4] = 8;
    buf[5] = 0;
    buf[8..16].copy_from_slice(&positions.first().map(|p| p.0).unwrap_or(0).to_le_bytes());

    for (i, tags) in ifds.iter().enumerate() {
        let (ifd_start, overflow_start) = positions[i];
        let mut pos = ifd_start as usize;
        buf[pos..pos + 8].copy_from_slice(&(tags.len() as u64).to_le_bytes());
        pos += 8;
        let mut overflow_cursor = overflow_start as usize;
        for t in tags {
            buf[pos..pos + 2].copy_from_slice(&t.id.to_le_bytes());
            buf[pos + 2..pos + 4].copy_from_slice(&t.dtype.to_le_bytes());
            buf[pos + 4..pos + 12].copy_from_slice(&(t.count as u64).to_le_bytes());
            if t.value.len() <= 8 {
                let mut inline = [0u8; 8];
                inline[..t.value.len()].copy_from_slice(&t.value);
                buf[pos + 12..pos + 20].copy_from_slice(&inline);
            } else {
                buf[pos + 12..pos + 20].copy_from_slice(&(overflow_cursor as u64).to_le_bytes());
                buf[overflow_cursor..overflow_cursor + t.value.len()].copy_from_slice(&t.value);
                overflow_cursor += t.value.len();
            }
            pos += 20;
        }
        let next_ifd = positions.get(i + 1).map(|p| p.0).unwrap_or(0);
        buf[pos..pos + 8].copy_from_slice(&next_ifd.to_le_bytes());
    }

    buf
}

/// Writes `bytes` to a fresh temp file with the given extension and
/// returns the still-open handle (dropping it deletes the file).
pub fn write_fixture(bytes: &[u8], extension: &str) -> NamedTempFile {
    use std::io::Write;
    let mut file = tempfile::Builder::new()
        .prefix("pathsafe-fixture-")
        .suffix(&format!(".{extension}"))
        .tempfile()
        .expect("create temp fixture file");
    file.write_all(bytes).expect("write fixture bytes");
    file.flush().expect("flush fixture file");
    file
}

use crate::error::TiffError;
use crate::tiff::header::TiffHeader;
use crate::tiff::ifd::IfdEntry;
use crate::tiff::tags::FieldType;
use std::io::{Read, Seek, SeekFrom};

/// Reads the raw bytes of a tag's value, `total_size()` bytes long, from
/// `value_offset`. Never interprets the bytes.
pub fn read_tag_bytes<R: Read + Seek>(
    reader: &mut R,
    entry: &IfdEntry,
) -> Result<Vec<u8>, TiffError> {
    reader.seek(SeekFrom::Start(entry.value_offset))?;
    let mut buf = vec![0u8; entry.total_size() as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Reads a tag's value as an ASCII string: trailing NULs stripped, non-ASCII
/// bytes replaced with the Unicode replacement character.
pub fn read_tag_string<R: Read + Seek>(
    reader: &mut R,
    entry: &IfdEntry,
) -> Result<String, TiffError> {
    let raw = read_tag_bytes(reader, entry)?;
    let trimmed = trim_trailing_nuls(&raw);
    Ok(decode_ascii_lossy(trimmed))
}

pub fn trim_trailing_nuls(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map(|i| i + 1).unwrap_or(0);
    &bytes[..end]
}

pub fn decode_ascii_lossy(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
        .collect()
}

/// A numeric tag value: either a single scalar or a short list (≤10
/// elements, per §4.1). ASCII/undefined types and longer counts return
/// `None` rather than a numeric value.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    IntList(Vec<i64>),
    UIntList(Vec<u64>),
    FloatList(Vec<f64>),
}

/// Reads a tag's value as a numeric type, respecting endianness and dtype.
/// Returns `None` for ASCII/undefined types or counts beyond 10 elements.
pub fn read_tag_numeric<R: Read + Seek>(
    reader: &mut R,
    header: &TiffHeader,
    entry: &IfdEntry,
) -> Result<Option<NumericValue>, TiffError> {
    let ft = match FieldType::from_u16(entry.dtype) {
        Some(ft) => ft,
        None => return Ok(None),
    };
    if matches!(ft, FieldType::Ascii | FieldType::Undefined) {
        return Ok(None);
    }
    if entry.count == 0 || entry.count > 10 {
        return Ok(None);
    }

    reader.seek(SeekFrom::Start(entry.value_offset))?;
    let elem_size = ft.size_in_bytes() as usize;
    let mut buf = vec![0u8; elem_size * entry.count as usize];
    reader.read_exact(&mut buf)?;

    let bo = header.byte_order;
    let single = entry.count == 1;

    let value = match ft {
        FieldType::Byte => {
            let vals: Vec<u64> = buf.iter().map(|&b| b as u64).collect();
            if single {
                NumericValue::UInt(vals[0])
            } else {
                NumericValue::UIntList(vals)
            }
        }
        FieldType::SByte => {
            let vals: Vec<i64> = buf.iter().map(|&b| (b as i8) as i64).collect();
            if single {
                NumericValue::Int(vals[0])
            } else {
                NumericValue::IntList(vals)
            }
        }
        FieldType::Short => {
            let vals: Vec<u64> = buf.chunks_exact(2).map(|c| bo.read_u16(c) as u64).collect();
            if single {
                NumericValue::UInt(vals[0])
            } else {
                NumericValue::UIntList(vals)
            }
        }
        FieldType::SShort => {
            let vals: Vec<i64> = buf.chunks_exact(2).map(|c| bo.read_i16(c) as i64).collect();
            if single {
                NumericValue::Int(vals[0])
            } else {
                NumericValue::IntList(vals)
            }
        }
        FieldType::Long => {
            let vals: Vec<u64> = buf.chunks_exact(4).map(|c| bo.read_u32(c) as u64).collect();
            if single {
                NumericValue::UInt(vals[0])
            } else {
                NumericValue::UIntList(vals)
            }
        }
        FieldType::Long8 => {
            let vals: Vec<u64> = buf.chunks_exact(8).map(|c| bo.read_u64(c)).collect();
            if single {
                NumericValue::UInt(vals[0])
            } else {
                NumericValue::UIntList(vals)
            }
        }
        FieldType::SLong => {
            let vals: Vec<i64> = buf.chunks_exact(4).map(|c| bo.read_i32(c) as i64).collect();
            if single {
                NumericValue::Int(vals[0])
            } else {
                NumericValue::IntList(vals)
            }
        }
        FieldType::Float => {
            let vals: Vec<f64> = buf.chunks_exact(4).map(|c| bo.read_f32(c) as f64).collect();
            if single {
                NumericValue::Float(vals[0])
            } else {
                NumericValue::FloatList(vals)
            }
        }
        FieldType::Double => {
            let vals: Vec<f64> = buf.chunks_exact(8).map(|c| bo.read_f64(c)).collect();
            if single {
                NumericValue::Float(vals[0])
            } else {
                NumericValue::FloatList(vals)
            }
        }
        FieldType::Rational | FieldType::SRational => {
            // Two 32-bit components; treat as a float ratio (num/denom).
            let vals: Vec<f64> = buf
                .chunks_exact(8)
                .map(|c| {
                    if ft == FieldType::Rational {
                        let num = bo.read_u32(&c[0..4]) as f64;
                        let den = bo.read_u32(&c[4..8]) as f64;
                        if den == 0.0 { 0.0 } else { num / den }
                    } else {
                        let num = bo.read_i32(&c[0..4]) as f64;
                        let den = bo.read_i32(&c[4..8]) as f64;
                        if den == 0.0 { 0.0 } else { num / den }
                    }
                })
                .collect();
            if single {
                NumericValue::Float(vals[0])
            } else {
                NumericValue::FloatList(vals)
            }
        }
        FieldType::Ascii | FieldType::Undefined => unreachable!("filtered above"),
    };

    Ok(Some(value))
}

/// Reads a strip/tile offset-or-count array: a sequence of 32-bit (classic)
/// or 64-bit (BigTIFF) integers. Handles both the inline single-value case
/// and the out-of-line array case transparently.
pub fn read_tag_long_array<R: Read + Seek>(
    reader: &mut R,
    header: &TiffHeader,
    entry: &IfdEntry,
) -> Result<Vec<u64>, TiffError> {
    let elem_size = FieldType::from_u16(entry.dtype)
        .map(FieldType::size_in_bytes)
        .unwrap_or(4);
    reader.seek(SeekFrom::Start(entry.value_offset))?;
    let mut buf = vec![0u8; (elem_size * entry.count) as usize];
    reader.read_exact(&mut buf)?;

    let bo = header.byte_order;
    let values = buf
        .chunks_exact(elem_size as usize)
        .map(|c| match elem_size {
            1 => c[0] as u64,
            2 => bo.read_u16(c) as u64,
            8 => bo.read_u64(c),
            _ => bo.read_u32(c) as u64,
        })
        .collect();
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiff::header::ByteOrder;
    use std::io::Cursor;

    fn entry(dtype: u16, count: u64, value_offset: u64) -> IfdEntry {
        IfdEntry {
            tag_id: 1,
            dtype,
            count,
            value_offset,
            entry_offset: 0,
            is_inline: false,
        }
    }

    fn header() -> TiffHeader {
        TiffHeader {
            byte_order: ByteOrder::LittleEndian,
            is_bigtiff: false,
            first_ifd_offset: 0,
        }
    }

    #[test]
    fn reads_ascii_string_trims_nuls() {
        let mut data = b"hello\0\0\0".to_vec();
        let mut cur = Cursor::new(std::mem::take(&mut data));
        let e = entry(2, 8, 0);
        let s = read_tag_string(&mut cur, &e).unwrap();
        assert_eq!(s, "hello");
    }

    #[test]
    fn reads_long_array() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&100u32.to_le_bytes());
        buf.extend_from_slice(&200u32.to_le_bytes());
        let mut cur = Cursor::new(buf);
        let e = entry(4, 2, 0);
        let h = header();
        let vals = read_tag_long_array(&mut cur, &h, &e).unwrap();
        assert_eq!(vals, vec![100, 200]);
    }

    #[test]
    fn numeric_scalar_short() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&7u16.to_le_bytes());
        let mut cur = Cursor::new(buf);
        let e = entry(3, 1, 0);
        let h = header();
        let v = read_tag_numeric(&mut cur, &h, &e).unwrap().unwrap();
        assert_eq!(v, NumericValue::UInt(7));
    }

    #[test]
    fn numeric_float_single() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(-1.0f32).to_le_bytes());
        let mut cur = Cursor::new(buf);
        let e = entry(11, 1, 0);
        let h = header();
        let v = read_tag_numeric(&mut cur, &h, &e).unwrap().unwrap();
        assert_eq!(v, NumericValue::Float(-1.0));
    }

    #[test]
    fn numeric_ascii_returns_none() {
        let mut buf = vec![0u8; 4];
        let mut cur = Cursor::new(std::mem::take(&mut buf));
        let e = entry(2, 4, 0);
        let h = header();
        assert!(read_tag_numeric(&mut cur, &h, &e).unwrap().is_none());
    }

    #[test]
    fn numeric_too_many_elements_returns_none() {
        let mut buf = vec![0u8; 22];
        let mut cur = Cursor::new(std::mem::take(&mut buf));
        let e = entry(3, 11, 0);
        let h = header();
        assert!(read_tag_numeric(&mut cur, &h, &e).unwrap().is_none());
    }
}

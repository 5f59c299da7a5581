//! Shared TIFF-handler scaffolding (§4.4, §9 re-architecture note).
//!
//! Every vendor handler composes the same five sweeps -- DateTime tags,
//! extra-metadata tags, the EXIF sub-IFD, the GPS sub-IFD, and label/macro
//! blanking -- over its own tag set. Rather than a base class with virtual
//! hooks, each sweep here is a free function taking the bits of policy that
//! vary per handler (which tags to skip, how to recognize a label/macro
//! image). Handlers call these from their own `scan`/`anonymize` and layer
//! their format-specific text rewriting on top.

use crate::editor::{blank_ifd_image_data, blank_tag, is_ifd_image_blanked, unlink_ifd};
use crate::error::FormatError;
use crate::models::{FindingSource, PhiFinding, ScanResult};
use crate::scanner::{self, PatternConfig};
use crate::tiff::{
    find_tag_in_ifd, iter_ifds, read_tag_bytes, read_tag_long_array, read_tag_string, IfdEntry,
    TiffHeader, TAG_EXIF_IFD, TAG_GPS_IFD,
};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// The uniform interface every vendor handler implements (§4.4).
///
/// `scan` is pure and never mutates the file; `anonymize` writes in place
/// and returns the findings it cleared. The pipeline (`crate::pipeline`)
/// calls `scan` again after `anonymize` to verify.
pub trait FormatHandler: Send + Sync {
    fn format_name(&self) -> &'static str;

    fn can_handle(&self, path: &Path) -> bool;

    fn scan(&self, path: &Path) -> ScanResult;

    fn anonymize(&self, path: &Path) -> Result<Vec<PhiFinding>, FormatError>;

    fn get_info(&self, path: &Path) -> Result<FormatInfo, FormatError>;

    /// The handler's own pattern set (defaults plus any JSON overlay),
    /// exposed so the pipeline can run the filename-only check (§4.5 step 8)
    /// without paying for a full structural rescan when verification is
    /// skipped.
    fn patterns(&self) -> &PatternConfig;
}

/// Coarse structural summary returned by `FormatHandler::get_info`, useful
/// for the development binary's human-readable output.
#[derive(Debug, Clone)]
pub struct FormatInfo {
    pub format_name: String,
    pub is_bigtiff: bool,
    pub byte_order: &'static str,
    pub ifd_count: usize,
}

pub fn open_readonly(path: &Path) -> Result<File, FormatError> {
    Ok(File::open(path)?)
}

pub fn open_read_write(path: &Path) -> Result<File, FormatError> {
    Ok(OpenOptions::new().read(true).write(true).open(path)?)
}

/// Parses a file's header and full IFD chain in one call. Shared by every
/// handler's `scan`/`anonymize` entry point.
pub fn parse_structure<F: Read + Seek>(
    f: &mut F,
) -> Result<(TiffHeader, Vec<(u64, Vec<IfdEntry>)>), FormatError> {
    let len = f.seek(SeekFrom::End(0))?;
    f.seek(SeekFrom::Start(0))?;
    let header = TiffHeader::parse(f, len)?;
    let ifds = iter_ifds(f, &header)?;
    Ok((header, ifds))
}

/// Decides whether one IFD holds the diagnostic tissue image or a
/// label/macro/thumbnail photograph of the physical slide, and whether a
/// blanked label/macro IFD should additionally be unlinked from the chain.
///
/// Implemented per format: NDPI classifies by the `SOURCELENS` tag value;
/// every other handler classifies by `ImageDescription` text (§4.4 step 5).
pub trait LabelMacroPolicy {
    fn is_label_or_macro(
        &self,
        f: &mut File,
        header: &TiffHeader,
        entries: &[IfdEntry],
    ) -> Result<bool, FormatError>;

    /// NDPI is the documented exception that blanks without unlinking
    /// (§4.4 NDPI specialization, DESIGN.md open-question decision).
    fn unlink_after_blank(&self) -> bool {
        true
    }
}

/// Classifies an IFD as label/macro/thumbnail by scanning its
/// `ImageDescription` (tag 270) for the case-insensitive substrings `label`,
/// `macro`, or `thumbnail`. Shared by SVS, BIF, SCN, and generic TIFF.
pub fn classify_by_image_description(
    f: &mut File,
    entries: &[IfdEntry],
) -> Result<bool, FormatError> {
    let Some(entry) = find_tag_in_ifd(entries, crate::tiff::TAG_IMAGE_DESCRIPTION) else {
        return Ok(false);
    };
    if entry.dtype != 2 {
        return Ok(false);
    }
    let text = read_tag_string(f, &entry)?.to_ascii_lowercase();
    Ok(text.contains("label") || text.contains("macro") || text.contains("thumbnail"))
}

/// Sweeps the given DateTime-family tags (e.g. 306/36867/36868) across every
/// IFD, reporting any non-empty, non-sentinel value (§4.4 step 1).
pub fn scan_datetime_tags(
    f: &mut File,
    ifds: &[(u64, Vec<IfdEntry>)],
    date_tags: &[u16],
) -> Result<Vec<PhiFinding>, FormatError> {
    let mut findings = Vec::new();
    let mut seen_offsets = std::collections::HashSet::new();
    for (_, entries) in ifds {
        for entry in entries {
            if !date_tags.contains(&entry.tag_id) || entry.total_size() == 0 {
                continue;
            }
            if !seen_offsets.insert(entry.value_offset) {
                continue;
            }
            let value = read_tag_string(f, entry)?;
            if value.is_empty() || scanner::is_date_anonymized(&value) {
                continue;
            }
            findings.push(tag_finding(entry, &value));
        }
    }
    Ok(findings)
}

/// Blanks every non-empty, non-sentinel DateTime tag value found by
/// [`scan_datetime_tags`]. Returns the findings that were cleared.
pub fn redact_datetime_tags(
    f: &mut File,
    ifds: &[(u64, Vec<IfdEntry>)],
    date_tags: &[u16],
) -> Result<Vec<PhiFinding>, FormatError> {
    let findings = scan_datetime_tags(f, ifds, date_tags)?;
    let mut cleared = Vec::with_capacity(findings.len());
    for (_, entries) in ifds {
        for entry in entries {
            if !date_tags.contains(&entry.tag_id) {
                continue;
            }
            if let Some(found) = findings.iter().find(|p| p.offset == entry.value_offset) {
                blank_tag(f, entry)?;
                cleared.push(found.clone());
            }
        }
    }
    Ok(cleared)
}

/// Sweeps the handler's extra-metadata tag set (Software, Artist,
/// HostComputer, XMP, Copyright, IPTC, ICCProfile, UserComment,
/// ImageUniqueID by default) across every IFD, excluding any tag id the
/// handler has claimed for its own structured rewriting (§4.4 step 2).
pub fn scan_extra_metadata(
    f: &mut File,
    ifds: &[(u64, Vec<IfdEntry>)],
    excludes: &[u16],
) -> Result<Vec<PhiFinding>, FormatError> {
    let mut findings = Vec::new();
    let mut seen_offsets = std::collections::HashSet::new();
    for (_, entries) in ifds {
        for entry in entries {
            if excludes.contains(&entry.tag_id) {
                continue;
            }
            if !crate::tiff::EXTRA_METADATA_TAGS.contains(&entry.tag_id) {
                continue;
            }
            if entry.dtype != 2 && entry.dtype != 7 {
                continue;
            }
            if entry.total_size() == 0 || !seen_offsets.insert(entry.value_offset) {
                continue;
            }
            let raw = read_tag_bytes(f, entry)?;
            if raw.iter().all(|&b| b == 0) || raw.iter().all(|&b| b == 0 || b == b'X') {
                continue;
            }
            let preview = crate::tiff::decode_ascii_lossy(crate::tiff::trim_trailing_nuls(&raw));
            if preview.is_empty() {
                continue;
            }
            findings.push(tag_finding(entry, &preview));
        }
    }
    Ok(findings)
}

/// Blanks every tag reported by [`scan_extra_metadata`].
pub fn redact_extra_metadata(
    f: &mut File,
    ifds: &[(u64, Vec<IfdEntry>)],
    excludes: &[u16],
) -> Result<Vec<PhiFinding>, FormatError> {
    let findings = scan_extra_metadata(f, ifds, excludes)?;
    for (_, entries) in ifds {
        for entry in entries {
            if findings.iter().any(|p| p.offset == entry.value_offset) {
                blank_tag(f, entry)?;
            }
        }
    }
    Ok(findings)
}

const EXIF_DATE_TIME_ORIGINAL: u16 = 36867;
const EXIF_DATE_TIME_DIGITIZED: u16 = 36868;
const EXIF_USER_COMMENT: u16 = 37510;
const EXIF_IMAGE_UNIQUE_ID: u16 = 42016;
const EXIF_SUBSEC_TIME: u16 = 37520;
const EXIF_SUBSEC_TIME_ORIGINAL: u16 = 37521;
const EXIF_SUBSEC_TIME_DIGITIZED: u16 = 37522;

const EXIF_SUBIFD_PHI_TAGS: &[u16] = &[
    EXIF_DATE_TIME_ORIGINAL,
    EXIF_DATE_TIME_DIGITIZED,
    EXIF_USER_COMMENT,
    EXIF_IMAGE_UNIQUE_ID,
    EXIF_SUBSEC_TIME,
    EXIF_SUBSEC_TIME_ORIGINAL,
    EXIF_SUBSEC_TIME_DIGITIZED,
];

/// Locates the EXIF sub-IFD (tag 34665) pointed to from a main IFD, if any.
fn exif_subifd_entries(
    f: &mut File,
    header: &TiffHeader,
    main_entries: &[IfdEntry],
) -> Result<Option<Vec<IfdEntry>>, FormatError> {
    let Some(exif_ptr) = find_tag_in_ifd(main_entries, TAG_EXIF_IFD) else {
        return Ok(None);
    };
    let offsets = read_tag_long_array(f, header, &exif_ptr)?;
    let Some(&offset) = offsets.first() else {
        return Ok(None);
    };
    if offset == 0 {
        return Ok(None);
    }
    let (entries, _next) = crate::tiff::read_ifd(f, header, offset)?;
    Ok(Some(entries))
}

/// Scans every main IFD's EXIF sub-IFD for DateTimeOriginal/Digitized,
/// UserComment, SubSecTime*, and ImageUniqueID (§4.4 step 3).
pub fn scan_exif_subifd(
    f: &mut File,
    header: &TiffHeader,
    ifds: &[(u64, Vec<IfdEntry>)],
) -> Result<Vec<PhiFinding>, FormatError> {
    let mut findings = Vec::new();
    for (_, main_entries) in ifds {
        let Some(sub_entries) = exif_subifd_entries(f, header, main_entries)? else {
            continue;
        };
        for entry in &sub_entries {
            if !EXIF_SUBIFD_PHI_TAGS.contains(&entry.tag_id) || entry.total_size() == 0 {
                continue;
            }
            let raw = read_tag_bytes(f, entry)?;
            if raw.iter().all(|&b| b == 0) {
                continue;
            }
            let preview = crate::tiff::decode_ascii_lossy(crate::tiff::trim_trailing_nuls(&raw));
            if preview.is_empty() {
                continue;
            }
            findings.push(tag_finding(entry, &preview));
        }
    }
    Ok(findings)
}

/// Blanks every EXIF sub-IFD tag reported by [`scan_exif_subifd`].
pub fn redact_exif_subifd(
    f: &mut File,
    header: &TiffHeader,
    ifds: &[(u64, Vec<IfdEntry>)],
) -> Result<Vec<PhiFinding>, FormatError> {
    let mut cleared = Vec::new();
    for (_, main_entries) in ifds {
        let Some(sub_entries) = exif_subifd_entries(f, header, main_entries)? else {
            continue;
        };
        for entry in &sub_entries {
            if !EXIF_SUBIFD_PHI_TAGS.contains(&entry.tag_id) || entry.total_size() == 0 {
                continue;
            }
            let raw = read_tag_bytes(f, entry)?;
            if raw.iter().all(|&b| b == 0) {
                continue;
            }
            let preview = crate::tiff::decode_ascii_lossy(crate::tiff::trim_trailing_nuls(&raw));
            if preview.is_empty() {
                continue;
            }
            cleared.push(tag_finding(entry, &preview));
            blank_tag(f, entry)?;
        }
    }
    Ok(cleared)
}

/// Locates the GPS sub-IFD (tag 34853) pointed to from a main IFD, if any.
fn gps_subifd_entries(
    f: &mut File,
    header: &TiffHeader,
    main_entries: &[IfdEntry],
) -> Result<Option<Vec<IfdEntry>>, FormatError> {
    let Some(gps_ptr) = find_tag_in_ifd(main_entries, TAG_GPS_IFD) else {
        return Ok(None);
    };
    let offsets = read_tag_long_array(f, header, &gps_ptr)?;
    let Some(&offset) = offsets.first() else {
        return Ok(None);
    };
    if offset == 0 {
        return Ok(None);
    }
    let (entries, _next) = crate::tiff::read_ifd(f, header, offset)?;
    Ok(Some(entries))
}

/// Every entry in a GPS sub-IFD is location PHI unconditionally (§4.4 step
/// 4) -- no content inspection needed, unlike the other sweeps.
pub fn scan_gps_subifd(
    f: &mut File,
    header: &TiffHeader,
    ifds: &[(u64, Vec<IfdEntry>)],
) -> Result<Vec<PhiFinding>, FormatError> {
    let mut findings = Vec::new();
    for (_, main_entries) in ifds {
        let Some(sub_entries) = gps_subifd_entries(f, header, main_entries)? else {
            continue;
        };
        for entry in &sub_entries {
            if entry.total_size() == 0 {
                continue;
            }
            let raw = read_tag_bytes(f, entry)?;
            if raw.iter().all(|&b| b == 0) {
                continue;
            }
            let preview = format!("GPS tag {} ({} bytes)", entry.tag_id, entry.total_size());
            findings.push(PhiFinding {
                offset: entry.value_offset,
                length: entry.total_size(),
                tag_id: Some(entry.tag_id),
                tag_name: format!("GPS_{}", entry.tag_id),
                value_preview: preview,
                source: FindingSource::TiffTag,
            });
        }
    }
    Ok(findings)
}

/// Blanks every GPS sub-IFD entry unconditionally.
pub fn redact_gps_subifd(
    f: &mut File,
    header: &TiffHeader,
    ifds: &[(u64, Vec<IfdEntry>)],
) -> Result<Vec<PhiFinding>, FormatError> {
    let findings = scan_gps_subifd(f, header, ifds)?;
    for (_, main_entries) in ifds {
        let Some(sub_entries) = gps_subifd_entries(f, header, main_entries)? else {
            continue;
        };
        for entry in &sub_entries {
            if findings.iter().any(|p| p.offset == entry.value_offset) {
                blank_tag(f, entry)?;
            }
        }
    }
    Ok(findings)
}

/// Runs the label/macro classify-blank-unlink pass over every IFD (§4.4
/// step 5). Returns the number of IFDs blanked (not findings -- label/macro
/// content is pixel data, never a textual [`PhiFinding`] per the data
/// model's `ImageContent` note).
pub fn redact_label_macro_ifds(
    f: &mut File,
    header: &mut TiffHeader,
    ifds: &[(u64, Vec<IfdEntry>)],
    policy: &dyn LabelMacroPolicy,
) -> Result<usize, FormatError> {
    let mut blanked = 0usize;
    for (ifd_offset, entries) in ifds {
        if !policy.is_label_or_macro(f, header, entries)? {
            continue;
        }
        let already_blanked = is_ifd_image_blanked(f, header, entries)?;
        if !already_blanked {
            blank_ifd_image_data(f, header, entries)?;
            blanked += 1;
        }
        if policy.unlink_after_blank() {
            unlink_ifd(f, header, *ifd_offset)?;
        }
    }
    Ok(blanked)
}

/// Computes the SHA-256 of every diagnostic (non label/macro) IFD's
/// concatenated strip/tile bytes, keyed by IFD offset. Used by the pipeline
/// for the pre/post image-integrity check (§4.5).
pub fn diagnostic_ifd_hashes(
    f: &mut File,
    header: &TiffHeader,
    ifds: &[(u64, Vec<IfdEntry>)],
    policy: &dyn LabelMacroPolicy,
) -> Result<BTreeMap<u64, String>, FormatError> {
    use sha2::{Digest, Sha256};

    let mut out = BTreeMap::new();
    for (ifd_offset, entries) in ifds {
        if policy.is_label_or_macro(f, header, entries)? {
            continue;
        }
        let mut offset_entry = None;
        let mut count_entry = None;
        for entry in entries {
            match entry.tag_id {
                273 => offset_entry = Some(*entry),
                279 => count_entry = Some(*entry),
                324 if offset_entry.is_none() => offset_entry = Some(*entry),
                325 if count_entry.is_none() => count_entry = Some(*entry),
                _ => {}
            }
        }
        let (Some(offset_entry), Some(count_entry)) = (offset_entry, count_entry) else {
            continue;
        };
        let offsets = read_tag_long_array(f, header, &offset_entry)?;
        let counts = read_tag_long_array(f, header, &count_entry)?;
        if offsets.len() != counts.len() {
            continue;
        }
        let mut hasher = Sha256::new();
        for (off, cnt) in offsets.iter().zip(counts.iter()) {
            if *cnt == 0 {
                continue;
            }
            f.seek(std::io::SeekFrom::Start(*off))?;
            let mut remaining = *cnt;
            let mut buf = [0u8; 65536];
            while remaining > 0 {
                let chunk = remaining.min(buf.len() as u64) as usize;
                f.read_exact(&mut buf[..chunk])?;
                hasher.update(&buf[..chunk]);
                remaining -= chunk as u64;
            }
        }
        out.insert(*ifd_offset, hex::encode(hasher.finalize()));
    }
    Ok(out)
}

/// Reads the first 256 KiB of the file for the raw-byte safety sweep
/// (§4.4 step 6, deliberately capped per §9).
pub const RAW_SWEEP_WINDOW: usize = 256 * 1024;

pub fn read_raw_sweep_window(f: &mut File) -> Result<Vec<u8>, FormatError> {
    f.seek(std::io::SeekFrom::Start(0))?;
    let len = f.metadata()?.len().min(RAW_SWEEP_WINDOW as u64) as usize;
    let mut buf = vec![0u8; len];
    f.read_exact(&mut buf)?;
    Ok(buf)
}

/// Runs the byte-regex safety sweep over the first 256 KiB, skipping any
/// offset already reported by a structured sweep.
pub fn scan_raw_bytes(
    patterns: &PatternConfig,
    data: &[u8],
    skip_offsets: &std::collections::HashSet<usize>,
) -> Vec<PhiFinding> {
    scanner::scan_bytes(patterns, data, skip_offsets)
        .into_iter()
        .map(|m| PhiFinding {
            offset: m.offset as u64,
            length: m.length as u64,
            tag_id: None,
            tag_name: m.label.clone(),
            value_preview: String::from_utf8_lossy(&m.matched).to_string(),
            source: FindingSource::RegexScan,
        })
        .collect()
}

/// Overwrites every raw-byte match with an equal-length run of `'X'`,
/// in place, at the offsets found in the first 256 KiB.
pub fn redact_raw_bytes(
    f: &mut File,
    patterns: &PatternConfig,
    skip_offsets: &std::collections::HashSet<usize>,
) -> Result<Vec<PhiFinding>, FormatError> {
    let window = read_raw_sweep_window(f)?;
    let findings = scan_raw_bytes(patterns, &window, skip_offsets);
    for finding in &findings {
        let replacement = vec![b'X'; finding.length as usize];
        crate::editor::overwrite_range_padded(
            f,
            finding.offset,
            finding.length as usize,
            &replacement,
        )?;
    }
    Ok(findings)
}

/// Scans a file's base name for PHI (§4.4 step 7, reported but never fixed).
pub fn scan_filename_phi(patterns: &PatternConfig, path: &Path) -> Vec<PhiFinding> {
    scanner::scan_filename(patterns, path)
        .into_iter()
        .map(|m| PhiFinding {
            offset: m.offset as u64,
            length: m.length as u64,
            tag_id: None,
            tag_name: m.label.clone(),
            value_preview: m.matched.clone(),
            source: FindingSource::Filename,
        })
        .collect()
}

fn tag_finding(entry: &IfdEntry, value: &str) -> PhiFinding {
    PhiFinding {
        offset: entry.value_offset,
        length: entry.total_size(),
        tag_id: Some(entry.tag_id),
        tag_name: entry.tag_name(),
        value_preview: value.to_string(),
        source: FindingSource::TiffTag,
    }
}

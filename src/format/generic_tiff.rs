//! Generic pyramidal-TIFF fallback handler (§4.4 Generic specialization).
//!
//! Used for any TIFF/BigTIFF container that doesn't match a recognized
//! vendor extension, and as the handler the registry falls back to when a
//! vendor-specific `can_handle` rejects a file. Rather than trusting a
//! vendor schema, it scans every ASCII-valued tag in every IFD for string
//! PHI matches and, on redaction, blanks the entire matched tag value —
//! see the Open Question on this in the design notes for why the whole
//! field is cleared instead of just the matched substring.

use crate::editor::overwrite_tag_padded;
use crate::error::FormatError;
use crate::format::base::{
    classify_by_image_description, open_read_write, open_readonly, parse_structure,
    read_raw_sweep_window, redact_datetime_tags, redact_exif_subifd, redact_extra_metadata,
    redact_gps_subifd, redact_label_macro_ifds, redact_raw_bytes, scan_datetime_tags,
    scan_exif_subifd, scan_extra_metadata, scan_filename_phi, scan_gps_subifd, scan_raw_bytes,
    FormatHandler, FormatInfo, LabelMacroPolicy,
};
use crate::models::{FindingSource, PhiFinding, ScanResult};
use crate::scanner::{scan_string, PatternConfig};
use crate::tiff::{
    decode_ascii_lossy, read_tag_bytes, trim_trailing_nuls, FieldType, IfdEntry, TiffHeader,
    DATE_TIME_TAGS,
};
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

struct GenericLabelMacroPolicy;

impl LabelMacroPolicy for GenericLabelMacroPolicy {
    fn is_label_or_macro(
        &self,
        f: &mut std::fs::File,
        _header: &TiffHeader,
        entries: &[IfdEntry],
    ) -> Result<bool, FormatError> {
        classify_by_image_description(f, entries)
    }
}

fn is_ascii_entry(entry: &IfdEntry) -> bool {
    matches!(FieldType::from_u16(entry.dtype), Some(FieldType::Ascii) | Some(FieldType::Undefined))
}

fn all_same_byte(bytes: &[u8]) -> bool {
    match bytes.first() {
        Some(&first) => bytes.iter().all(|&b| b == first),
        None => true,
    }
}

/// Scans every ASCII/Undefined tag in an IFD against the configured string
/// patterns, skipping tags already blanked to zero or 'X' runs.
fn scan_ifd_ascii_tags(
    f: &mut std::fs::File,
    patterns: &PatternConfig,
    entries: &[IfdEntry],
) -> Result<Vec<PhiFinding>, FormatError> {
    let mut findings = Vec::new();
    for entry in entries {
        if !is_ascii_entry(entry) || entry.total_size() == 0 {
            continue;
        }
        let raw = read_tag_bytes(f, entry)?;
        if all_same_byte(&raw) {
            continue;
        }
        let trimmed = trim_trailing_nuls(&raw);
        let text = decode_ascii_lossy(trimmed);
        for m in scan_string(patterns, &text) {
            findings.push(PhiFinding {
                offset: entry.value_offset,
                length: entry.total_size(),
                tag_id: Some(entry.tag_id),
                tag_name: entry.tag_name(),
                value_preview: m.matched,
                source: FindingSource::RegexScan,
            });
        }
    }
    Ok(findings)
}

/// Blanks any ASCII/Undefined tag whose text matches a configured pattern.
/// The entire field is overwritten with an 'X' run (preserving a trailing
/// NUL), not just the matched substring, since a generic tag carries no
/// schema telling us where the PHI substring ends and free-form text
/// begins.
fn redact_ifd_ascii_tags(
    f: &mut std::fs::File,
    patterns: &PatternConfig,
    entries: &[IfdEntry],
) -> Result<Vec<PhiFinding>, FormatError> {
    let mut findings = Vec::new();
    for entry in entries {
        if !is_ascii_entry(entry) || entry.total_size() == 0 {
            continue;
        }
        let raw = read_tag_bytes(f, entry)?;
        if all_same_byte(&raw) {
            continue;
        }
        let trimmed = trim_trailing_nuls(&raw);
        let text = decode_ascii_lossy(trimmed);
        let matches = scan_string(patterns, &text);
        if matches.is_empty() {
            continue;
        }

        let total = entry.total_size() as usize;
        let mut replacement = vec![b'X'; total];
        if total > 0 {
            replacement[total - 1] = 0;
        }
        overwrite_tag_padded(f, entry, &replacement)?;

        for m in matches {
            findings.push(PhiFinding {
                offset: entry.value_offset,
                length: entry.total_size(),
                tag_id: Some(entry.tag_id),
                tag_name: entry.tag_name(),
                value_preview: m.matched,
                source: FindingSource::RegexScan,
            });
        }
    }
    Ok(findings)
}

pub struct GenericTiffHandler {
    patterns: PatternConfig,
}

impl GenericTiffHandler {
    pub fn new(patterns: PatternConfig) -> Self {
        GenericTiffHandler { patterns }
    }
}

impl Default for GenericTiffHandler {
    fn default() -> Self {
        GenericTiffHandler::new(PatternConfig::default())
    }
}

impl FormatHandler for GenericTiffHandler {
    fn format_name(&self) -> &'static str {
        "generic_tiff"
    }

    fn can_handle(&self, path: &Path) -> bool {
        let Ok(mut f) = open_readonly(path) else { return false };
        parse_structure(&mut f).is_ok()
    }

    fn scan(&self, path: &Path) -> ScanResult {
        let start = Instant::now();
        let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        let mut f = match open_readonly(path) {
            Ok(f) => f,
            Err(e) => {
                return ScanResult::failed(
                    path.to_path_buf(),
                    self.format_name(),
                    Vec::new(),
                    file_size,
                    start.elapsed(),
                    e.to_string(),
                )
            }
        };

        let mut findings = Vec::new();
        let mut had_error = None;

        match parse_structure(&mut f) {
            Ok((header, ifds)) => {
                for (_, entries) in &ifds {
                    match scan_ifd_ascii_tags(&mut f, &self.patterns, entries) {
                        Ok(mut v) => findings.append(&mut v),
                        Err(e) => had_error = Some(e.to_string()),
                    }
                }
                match scan_datetime_tags(&mut f, &ifds, DATE_TIME_TAGS) {
                    Ok(mut v) => findings.append(&mut v),
                    Err(e) => had_error = Some(e.to_string()),
                }
                match scan_extra_metadata(&mut f, &ifds, &[]) {
                    Ok(mut v) => findings.append(&mut v),
                    Err(e) => had_error = Some(e.to_string()),
                }
                match scan_exif_subifd(&mut f, &header, &ifds) {
                    Ok(mut v) => findings.append(&mut v),
                    Err(e) => had_error = Some(e.to_string()),
                }
                match scan_gps_subifd(&mut f, &header, &ifds) {
                    Ok(mut v) => findings.append(&mut v),
                    Err(e) => had_error = Some(e.to_string()),
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "generic tiff structure unreadable, falling back to raw sweep");
                had_error = Some(e.to_string());
            }
        }

        let skip: HashSet<usize> = findings.iter().map(|p| p.offset as usize).collect();
        match read_raw_sweep_window(&mut f) {
            Ok(window) => findings.extend(scan_raw_bytes(&self.patterns, &window, &skip)),
            Err(e) => had_error = Some(e.to_string()),
        }

        findings.extend(scan_filename_phi(&self.patterns, path));

        match had_error {
            Some(e) => ScanResult::failed(
                path.to_path_buf(),
                self.format_name(),
                findings,
                file_size,
                start.elapsed(),
                e,
            ),
            None => ScanResult::with_findings(
                path.to_path_buf(),
                self.format_name(),
                findings,
                file_size,
                start.elapsed(),
            ),
        }
    }

    fn anonymize(&self, path: &Path) -> Result<Vec<PhiFinding>, FormatError> {
        let mut f = open_read_write(path)?;
        let mut cleared = Vec::new();

        match parse_structure(&mut f) {
            Ok((mut header, ifds)) => {
                for (_, entries) in &ifds {
                    cleared.append(&mut redact_ifd_ascii_tags(&mut f, &self.patterns, entries)?);
                }
                cleared.append(&mut redact_datetime_tags(&mut f, &ifds, DATE_TIME_TAGS)?);
                cleared.append(&mut redact_extra_metadata(&mut f, &ifds, &[])?);
                cleared.append(&mut redact_exif_subifd(&mut f, &header, &ifds)?);
                cleared.append(&mut redact_gps_subifd(&mut f, &header, &ifds)?);
                redact_label_macro_ifds(&mut f, &mut header, &ifds, &GenericLabelMacroPolicy)?;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "generic tiff anonymize falling back to raw sweep only");
            }
        }

        let skip: HashSet<usize> = cleared.iter().map(|p| p.offset as usize).collect();
        cleared.extend(redact_raw_bytes(&mut f, &self.patterns, &skip)?);

        Ok(cleared)
    }

    fn get_info(&self, path: &Path) -> Result<FormatInfo, FormatError> {
        let mut f = open_readonly(path)?;
        let (header, ifds) = parse_structure(&mut f)?;
        Ok(FormatInfo {
            format_name: self.format_name().to_string(),
            is_bigtiff: header.is_bigtiff,
            byte_order: if header.byte_order == crate::tiff::ByteOrder::LittleEndian {
                "little"
            } else {
                "big"
            },
            ifd_count: ifds.len(),
        })
    }

    fn patterns(&self) -> &PatternConfig {
        &self.patterns
    }
}

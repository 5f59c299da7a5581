//! Aperio SVS handler (§4.4 SVS specialization).
//!
//! SVS packs its metadata into a single pipe-delimited `ImageDescription`
//! (tag 270) string: a free-text header segment followed by `key = value`
//! fields. Six of those fields carry PHI; everything else (AppMag, MPP,
//! compression parameters) is left untouched.

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
use crate::scanner::PatternConfig;
use crate::tiff::{find_tag_in_ifd, read_tag_string, IfdEntry, TiffHeader, DATE_TIME_TAGS, TAG_IMAGE_DESCRIPTION};
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

const SVS_PHI_KEYS: &[&str] = &["ScanScope ID", "Filename", "Date", "Time", "User", "DSR ID"];

struct SvsLabelMacroPolicy;

impl LabelMacroPolicy for SvsLabelMacroPolicy {
    fn is_label_or_macro(
        &self,
        f: &mut std::fs::File,
        _header: &TiffHeader,
        entries: &[IfdEntry],
    ) -> Result<bool, FormatError> {
        classify_by_image_description(f, entries)
    }
}

/// One PHI field found inside a pipe-delimited description: byte offset of
/// its value (relative to the decoded string start), key, and trimmed value.
struct FieldHit {
    value_offset: usize,
    value_len: usize,
    key: String,
    value: String,
}

fn is_sentinel_value(key: &str, value: &str) -> bool {
    match key {
        "Date" => value == "01/01/00",
        "Time" => value == "00:00:00",
        _ => !value.is_empty() && value.chars().all(|c| c == 'X'),
    }
}

/// Walks a pipe-delimited description, returning every non-sentinel PHI
/// field with its byte position in the original string.
fn find_phi_fields(text: &str) -> Vec<FieldHit> {
    let mut hits = Vec::new();
    let mut cursor = 0usize;
    for segment in text.split('|') {
        let segment_start = cursor;
        cursor += segment.len() + 1; // account for the '|' delimiter

        let Some(eq) = segment.find('=') else { continue };
        let key = segment[..eq].trim();
        if !SVS_PHI_KEYS.contains(&key) {
            continue;
        }
        let value_part = &segment[eq + 1..];
        let trimmed = value_part.trim();
        if trimmed.is_empty() || is_sentinel_value(key, trimmed) {
            continue;
        }
        let leading_ws = value_part.len() - value_part.trim_start().len();
        let value_offset = segment_start + eq + 1 + leading_ws;
        hits.push(FieldHit {
            value_offset,
            value_len: trimmed.len(),
            key: key.to_string(),
            value: trimmed.to_string(),
        });
    }
    hits
}

fn replacement_for(key: &str, value: &str) -> String {
    match key {
        "Date" => "01/01/00".to_string(),
        "Time" => "00:00:00".to_string(),
        _ => "X".repeat(value.chars().count()),
    }
}

fn scan_description(entry: &IfdEntry, text: &str) -> Vec<PhiFinding> {
    find_phi_fields(text)
        .into_iter()
        .map(|hit| PhiFinding {
            offset: entry.value_offset + hit.value_offset as u64,
            length: hit.value_len as u64,
            tag_id: Some(entry.tag_id),
            tag_name: format!("SVS_Description:{}", hit.key),
            value_preview: hit.value,
            source: FindingSource::TiffTag,
        })
        .collect()
}

fn redact_description(
    f: &mut std::fs::File,
    entry: &IfdEntry,
) -> Result<Vec<PhiFinding>, FormatError> {
    if entry.total_size() == 0 {
        return Ok(Vec::new());
    }
    let text = read_tag_string(f, entry)?;
    let hits = find_phi_fields(&text);
    if hits.is_empty() {
        return Ok(Vec::new());
    }

    let mut bytes = text.into_bytes();
    // Apply replacements back-to-front so earlier offsets stay valid as the
    // string's length changes.
    let mut findings = Vec::with_capacity(hits.len());
    let mut sorted: Vec<_> = hits.into_iter().collect();
    sorted.sort_by(|a, b| b.value_offset.cmp(&a.value_offset));
    for hit in &sorted {
        let replacement = replacement_for(&hit.key, &hit.value);
        bytes.splice(
            hit.value_offset..hit.value_offset + hit.value_len,
            replacement.clone().into_bytes(),
        );
        findings.push(PhiFinding {
            offset: entry.value_offset + hit.value_offset as u64,
            length: hit.value_len as u64,
            tag_id: Some(entry.tag_id),
            tag_name: format!("SVS_Description:{}", hit.key),
            value_preview: hit.value.clone(),
            source: FindingSource::TiffTag,
        });
    }

    overwrite_tag_padded(f, entry, &bytes)?;
    Ok(findings)
}

pub struct SvsHandler {
    patterns: PatternConfig,
}

impl SvsHandler {
    pub fn new(patterns: PatternConfig) -> Self {
        SvsHandler { patterns }
    }
}

impl Default for SvsHandler {
    fn default() -> Self {
        SvsHandler::new(PatternConfig::default())
    }
}

impl FormatHandler for SvsHandler {
    fn format_name(&self) -> &'static str {
        "svs"
    }

    fn can_handle(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("svs")) == Some(true)
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
                    if let Some(entry) = find_tag_in_ifd(entries, TAG_IMAGE_DESCRIPTION) {
                        match read_tag_string(&mut f, &entry) {
                            Ok(text) => findings.extend(scan_description(&entry, &text)),
                            Err(e) => had_error = Some(e.to_string()),
                        }
                    }
                }
                match scan_datetime_tags(&mut f, &ifds, DATE_TIME_TAGS) {
                    Ok(mut v) => findings.append(&mut v),
                    Err(e) => had_error = Some(e.to_string()),
                }
                match scan_extra_metadata(&mut f, &ifds, &[TAG_IMAGE_DESCRIPTION]) {
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
                tracing::warn!(path = %path.display(), error = %e, "svs structure unreadable, falling back to raw sweep");
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
                    if let Some(entry) = find_tag_in_ifd(entries, TAG_IMAGE_DESCRIPTION) {
                        cleared.append(&mut redact_description(&mut f, &entry)?);
                    }
                }
                cleared.append(&mut redact_datetime_tags(&mut f, &ifds, DATE_TIME_TAGS)?);
                cleared.append(&mut redact_extra_metadata(
                    &mut f,
                    &ifds,
                    &[TAG_IMAGE_DESCRIPTION],
                )?);
                cleared.append(&mut redact_exif_subifd(&mut f, &header, &ifds)?);
                cleared.append(&mut redact_gps_subifd(&mut f, &header, &ifds)?);
                redact_label_macro_ifds(&mut f, &mut header, &ifds, &SvsLabelMacroPolicy)?;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "svs anonymize falling back to raw sweep only");
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

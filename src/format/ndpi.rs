//! Hamamatsu NDPI handler (§4.4 NDPI specialization).
//!
//! NDPI stores its scanner metadata in a private tag range (65420-65480)
//! rather than the well-known EXIF/XMP slots the other vendors use, and
//! classifies label/macro images by a numeric lens-position tag instead of
//! free text.

use crate::editor::blank_tag;
use crate::error::FormatError;
use crate::format::base::{
    classify_by_image_description, open_read_write, open_readonly, parse_structure,
    scan_datetime_tags, redact_datetime_tags, scan_exif_subifd, redact_exif_subifd,
    scan_extra_metadata, redact_extra_metadata, scan_gps_subifd, redact_gps_subifd,
    redact_label_macro_ifds, scan_filename_phi, scan_raw_bytes, redact_raw_bytes,
    read_raw_sweep_window, FormatHandler, FormatInfo, LabelMacroPolicy,
};
use crate::models::{FindingSource, PhiFinding, ScanResult};
use crate::scanner::PatternConfig;
use crate::tiff::{
    read_tag_numeric, read_tag_string, tag_name, IfdEntry, NumericValue, TiffHeader,
    DATE_TIME_TAGS, TAG_IMAGE_DESCRIPTION,
};
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

const NDPI_SOURCELENS: u16 = 65421;
const NDPI_REFERENCE: u16 = 65427;
const NDPI_SERIAL_NUMBER: u16 = 65442;
const NDPI_SCANNER_PROPS: u16 = 65449;
const NDPI_BARCODE: u16 = 65468;

const NDPI_PRIVATE_RANGE: std::ops::RangeInclusive<u16> = 65420..=65480;
const NDPI_HANDLED_TAGS: &[u16] = &[
    NDPI_SOURCELENS,
    NDPI_REFERENCE,
    NDPI_SERIAL_NUMBER,
    NDPI_SCANNER_PROPS,
    NDPI_BARCODE,
];

const SCANNER_PROPS_SENSITIVE_KEYS: &[&str] =
    &["Created", "Updated", "NDP.S/N", "Macro.S/N", "Firmware.Version"];
const SCANNER_PROPS_SENSITIVE_SUBSTRINGS: &[&str] = &["User", "Name", "Operator"];

/// Classifies by NDPI's numeric SOURCELENS tag: `-1.0` is the macro image,
/// `-2.0` is the barcode/label area. Any other value (including absence of
/// the tag) is treated as diagnostic.
struct NdpiLabelMacroPolicy;

impl LabelMacroPolicy for NdpiLabelMacroPolicy {
    fn is_label_or_macro(
        &self,
        f: &mut std::fs::File,
        header: &TiffHeader,
        entries: &[IfdEntry],
    ) -> Result<bool, FormatError> {
        let Some(entry) = entries.iter().find(|e| e.tag_id == NDPI_SOURCELENS) else {
            return Ok(false);
        };
        let Some(value) = read_tag_numeric(f, header, &entry)? else {
            return Ok(false);
        };
        let lens = match value {
            NumericValue::Float(v) => v,
            NumericValue::Int(v) => v as f64,
            NumericValue::UInt(v) => v as f64,
            _ => return Ok(false),
        };
        Ok(lens == -1.0 || lens == -2.0)
    }

    fn unlink_after_blank(&self) -> bool {
        true
    }
}

pub struct NdpiHandler {
    patterns: PatternConfig,
}

impl NdpiHandler {
    pub fn new(patterns: PatternConfig) -> Self {
        NdpiHandler { patterns }
    }
}

impl Default for NdpiHandler {
    fn default() -> Self {
        NdpiHandler::new(PatternConfig::default())
    }
}

fn companion_paths(path: &Path) -> Vec<std::path::PathBuf> {
    let Some(dir) = path.parent() else { return Vec::new() };
    let Some(stem) = path.file_name().and_then(|n| n.to_str()) else {
        return Vec::new();
    };
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let ndpa_suffix = format!("{stem}.ndpa");
    let ndpis_suffix = format!("{stem}.ndpis");
    let numbered_prefix = format!("{stem}_");

    let mut out = Vec::new();
    for entry in read_dir.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name == ndpa_suffix || name == ndpis_suffix {
            out.push(entry.path());
        } else if name.starts_with(&numbered_prefix) && name.ends_with(".ndpa") {
            out.push(entry.path());
        }
    }
    out
}

/// Splits a NDPI scanner-props block (`key=value` lines) and flags any line
/// whose key is sensitive.
fn scanner_props_findings(entry: &IfdEntry, text: &str) -> Vec<(usize, usize, String, String)> {
    let mut findings = Vec::new();
    let mut cursor = 0usize;
    for line in text.split('\n') {
        let line_start = cursor;
        cursor += line.len() + 1;
        let Some(eq) = line.find('=') else { continue };
        let key = line[..eq].trim();
        let value = &line[eq + 1..];
        if value.is_empty() {
            continue;
        }
        let sensitive = SCANNER_PROPS_SENSITIVE_KEYS.contains(&key)
            || SCANNER_PROPS_SENSITIVE_SUBSTRINGS
                .iter()
                .any(|s| key.contains(s));
        if sensitive {
            let value_start = line_start + eq + 1;
            findings.push((value_start, value.len(), key.to_string(), value.to_string()));
        }
    }
    let _ = entry;
    findings
}

fn scan_ndpi_specific(
    f: &mut std::fs::File,
    ifds: &[(u64, Vec<IfdEntry>)],
) -> Result<Vec<PhiFinding>, FormatError> {
    let mut findings = Vec::new();
    let mut seen = HashSet::new();

    for (_, entries) in ifds {
        for entry in entries {
            if seen.contains(&entry.value_offset) {
                continue;
            }

            match entry.tag_id {
                NDPI_BARCODE | NDPI_REFERENCE | NDPI_SERIAL_NUMBER => {
                    if entry.total_size() == 0 {
                        continue;
                    }
                    let value = read_tag_string(f, entry)?;
                    if value.is_empty() {
                        continue;
                    }
                    seen.insert(entry.value_offset);
                    findings.push(PhiFinding {
                        offset: entry.value_offset,
                        length: entry.total_size(),
                        tag_id: Some(entry.tag_id),
                        tag_name: tag_name(entry.tag_id),
                        value_preview: value,
                        source: FindingSource::TiffTag,
                    });
                }
                NDPI_SCANNER_PROPS => {
                    if entry.total_size() == 0 {
                        continue;
                    }
                    let value = read_tag_string(f, entry)?;
                    for (rel_offset, len, key, val) in scanner_props_findings(entry, &value) {
                        seen.insert(entry.value_offset);
                        findings.push(PhiFinding {
                            offset: entry.value_offset + rel_offset as u64,
                            length: len as u64,
                            tag_id: Some(entry.tag_id),
                            tag_name: format!("NDPI_ScannerProps:{key}"),
                            value_preview: val,
                            source: FindingSource::TiffTag,
                        });
                    }
                }
                tag if NDPI_PRIVATE_RANGE.contains(&tag) && !NDPI_HANDLED_TAGS.contains(&tag) => {
                    if entry.dtype != 2 || entry.total_size() == 0 {
                        continue;
                    }
                    let value = read_tag_string(f, entry)?;
                    if value.is_empty() {
                        continue;
                    }
                    seen.insert(entry.value_offset);
                    findings.push(PhiFinding {
                        offset: entry.value_offset,
                        length: entry.total_size(),
                        tag_id: Some(entry.tag_id),
                        tag_name: tag_name(entry.tag_id),
                        value_preview: value,
                        source: FindingSource::TiffTag,
                    });
                }
                _ => {}
            }
        }
    }

    Ok(findings)
}

fn redact_ndpi_specific(
    f: &mut std::fs::File,
    ifds: &[(u64, Vec<IfdEntry>)],
) -> Result<Vec<PhiFinding>, FormatError> {
    let findings = scan_ndpi_specific(f, ifds)?;

    for (_, entries) in ifds {
        for entry in entries {
            match entry.tag_id {
                NDPI_BARCODE | NDPI_REFERENCE | NDPI_SERIAL_NUMBER => {
                    if findings.iter().any(|p| {
                        p.tag_id == Some(entry.tag_id) && p.offset == entry.value_offset
                    }) {
                        let total = entry.total_size() as usize;
                        let mut replacement = vec![b'X'; total];
                        if total > 0 {
                            replacement[total - 1] = 0;
                        }
                        crate::editor::overwrite_tag_padded(f, entry, &replacement)?;
                    }
                }
                NDPI_SCANNER_PROPS => {
                    if entry.total_size() == 0 {
                        continue;
                    }
                    let original = read_tag_string(f, entry)?;
                    let hits = scanner_props_findings(entry, &original);
                    if hits.is_empty() {
                        continue;
                    }
                    let mut bytes = original.into_bytes();
                    for (rel_offset, len, _key, _val) in hits {
                        for b in bytes.iter_mut().skip(rel_offset).take(len) {
                            *b = b'X';
                        }
                    }
                    crate::editor::overwrite_tag_padded(f, entry, &bytes)?;
                }
                tag if NDPI_PRIVATE_RANGE.contains(&tag) && !NDPI_HANDLED_TAGS.contains(&tag) => {
                    if findings.iter().any(|p| {
                        p.tag_id == Some(entry.tag_id) && p.offset == entry.value_offset
                    }) {
                        blank_tag(f, entry)?;
                    }
                }
                _ => {}
            }
        }
    }

    Ok(findings)
}

fn classify(
    f: &mut std::fs::File,
    header: &TiffHeader,
    entries: &[IfdEntry],
) -> Result<bool, FormatError> {
    if NdpiLabelMacroPolicy.is_label_or_macro(f, header, entries)? {
        return Ok(true);
    }
    classify_by_image_description(f, entries)
}

impl FormatHandler for NdpiHandler {
    fn format_name(&self) -> &'static str {
        "ndpi"
    }

    fn can_handle(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("ndpi")) == Some(true)
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

        let parsed = parse_structure(&mut f);
        let mut findings = Vec::new();
        let mut had_error = None;

        match parsed {
            Ok((header, ifds)) => {
                tracing::debug!(path = %path.display(), ifd_count = ifds.len(), "ndpi structure parsed");
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
                match scan_ndpi_specific(&mut f, &ifds) {
                    Ok(mut v) => findings.append(&mut v),
                    Err(e) => had_error = Some(e.to_string()),
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ndpi structure unreadable, falling back to raw sweep");
                had_error = Some(e.to_string());
            }
        }

        let skip: HashSet<usize> = findings.iter().map(|p| p.offset as usize).collect();
        match read_raw_sweep_window(&mut f) {
            Ok(window) => findings.extend(scan_raw_bytes(&self.patterns, &window, &skip)),
            Err(e) => had_error = Some(e.to_string()),
        }

        findings.extend(scan_filename_phi(&self.patterns, path));
        findings.extend(companion_paths(path).into_iter().map(|p| PhiFinding {
            offset: 0,
            length: 0,
            tag_id: None,
            tag_name: "NDPI_Companion".to_string(),
            value_preview: p.display().to_string(),
            source: FindingSource::CompanionFile,
        }));

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

        let structure = parse_structure(&mut f);
        match structure {
            Ok((mut header, ifds)) => {
                cleared.append(&mut redact_datetime_tags(&mut f, &ifds, DATE_TIME_TAGS)?);
                cleared.append(&mut redact_extra_metadata(
                    &mut f,
                    &ifds,
                    &[TAG_IMAGE_DESCRIPTION],
                )?);
                cleared.append(&mut redact_exif_subifd(&mut f, &header, &ifds)?);
                cleared.append(&mut redact_gps_subifd(&mut f, &header, &ifds)?);
                cleared.append(&mut redact_ndpi_specific(&mut f, &ifds)?);
                redact_label_macro_ifds(&mut f, &mut header, &ifds, &NdpiLabelMacroPolicy)?;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ndpi anonymize falling back to raw sweep only");
            }
        }

        let skip: HashSet<usize> = cleared.iter().map(|p| p.offset as usize).collect();
        cleared.extend(redact_raw_bytes(&mut f, &self.patterns, &skip)?);

        for companion in companion_paths(path) {
            if let Err(e) = std::fs::remove_file(&companion) {
                tracing::warn!(path = %companion.display(), error = %e, "failed to remove ndpi companion file");
            }
        }

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

//! Ventana/Roche BIF handler (§4.4 BIF specialization).
//!
//! BIF stores scanner metadata as an iScan XML block inside the XMP tag
//! (700) rather than `ImageDescription`. Unlike NDPI and SVS, which accept
//! any file with a matching extension, `can_handle` here also requires a
//! successful header parse and a BigTIFF container, since `.bif` files that
//! fail that check are not worth risking a PHI miss on.

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
use crate::tiff::{find_tag_in_ifd, read_tag_string, IfdEntry, TiffHeader, DATE_TIME_TAGS, TAG_XMP};
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

const BIF_PHI_ATTRS: &[&str] = &[
    "BarCode1",
    "BarCode2",
    "BarCodeType1",
    "BarCodeType2",
    "ScanDate",
    "ScanTime",
    "BaseFileName",
    "UniqueID",
    "DeviceSerialNumber",
    "OperatorID",
    "PatientName",
    "CaseID",
    "SampleID",
    "LabelText",
    "Comment",
    "Description",
];

struct BifLabelMacroPolicy;

impl LabelMacroPolicy for BifLabelMacroPolicy {
    fn is_label_or_macro(
        &self,
        f: &mut std::fs::File,
        _header: &TiffHeader,
        entries: &[IfdEntry],
    ) -> Result<bool, FormatError> {
        classify_by_image_description(f, entries)
    }
}

struct AttrHit {
    value_offset: usize,
    value_len: usize,
    name: String,
    value: String,
}

/// Finds every `name="value"` occurrence of a PHI attribute in an XML blob.
/// Byte offsets are relative to the start of `text`.
fn find_phi_attributes(text: &str) -> Vec<AttrHit> {
    let bytes = text.as_bytes();
    let mut hits = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let Some(rel_eq) = text[i..].find('=') else { break };
        let eq = i + rel_eq;
        let name_start = text[..eq].rfind(|c: char| !c.is_alphanumeric() && c != '_').map(|p| p + 1).unwrap_or(0);
        let name = &text[name_start..eq];

        if eq + 1 >= bytes.len() || bytes[eq + 1] != b'"' {
            i = eq + 1;
            continue;
        }
        let value_start = eq + 2;
        let Some(rel_close) = text[value_start..].find('"') else { break };
        let value_end = value_start + rel_close;
        let value = &text[value_start..value_end];

        if BIF_PHI_ATTRS.contains(&name) && !value.is_empty() && !value.chars().all(|c| c == 'X') {
            hits.push(AttrHit {
                value_offset: value_start,
                value_len: value.len(),
                name: name.to_string(),
                value: value.to_string(),
            });
        }
        i = value_end + 1;
    }
    hits
}

fn scan_xmp(entry: &IfdEntry, text: &str) -> Vec<PhiFinding> {
    find_phi_attributes(text)
        .into_iter()
        .map(|hit| PhiFinding {
            offset: entry.value_offset + hit.value_offset as u64,
            length: hit.value_len as u64,
            tag_id: Some(entry.tag_id),
            tag_name: format!("BIF_iScan:{}", hit.name),
            value_preview: hit.value,
            source: FindingSource::TiffTag,
        })
        .collect()
}

fn redact_xmp(f: &mut std::fs::File, entry: &IfdEntry) -> Result<Vec<PhiFinding>, FormatError> {
    if entry.total_size() == 0 {
        return Ok(Vec::new());
    }
    let text = read_tag_string(f, entry)?;
    let hits = find_phi_attributes(&text);
    if hits.is_empty() {
        return Ok(Vec::new());
    }

    let mut bytes = text.into_bytes();
    let mut findings = Vec::with_capacity(hits.len());
    let mut sorted = hits;
    sorted.sort_by(|a, b| b.value_offset.cmp(&a.value_offset));
    for hit in &sorted {
        let replacement = "X".repeat(hit.value.chars().count());
        bytes.splice(
            hit.value_offset..hit.value_offset + hit.value_len,
            replacement.into_bytes(),
        );
        findings.push(PhiFinding {
            offset: entry.value_offset + hit.value_offset as u64,
            length: hit.value_len as u64,
            tag_id: Some(entry.tag_id),
            tag_name: format!("BIF_iScan:{}", hit.name),
            value_preview: hit.value.clone(),
            source: FindingSource::TiffTag,
        });
    }

    overwrite_tag_padded(f, entry, &bytes)?;
    Ok(findings)
}

pub struct BifHandler {
    patterns: PatternConfig,
}

impl BifHandler {
    pub fn new(patterns: PatternConfig) -> Self {
        BifHandler { patterns }
    }
}

impl Default for BifHandler {
    fn default() -> Self {
        BifHandler::new(PatternConfig::default())
    }
}

impl FormatHandler for BifHandler {
    fn format_name(&self) -> &'static str {
        "bif"
    }

    fn can_handle(&self, path: &Path) -> bool {
        let ext_ok = path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("bif")) == Some(true);
        if !ext_ok {
            return false;
        }
        let Ok(mut f) = open_readonly(path) else { return false };
        matches!(parse_structure(&mut f), Ok((header, _)) if header.is_bigtiff)
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
                    if let Some(entry) = find_tag_in_ifd(entries, TAG_XMP) {
                        match read_tag_string(&mut f, &entry) {
                            Ok(text) => findings.extend(scan_xmp(&entry, &text)),
                            Err(e) => had_error = Some(e.to_string()),
                        }
                    }
                }
                match scan_datetime_tags(&mut f, &ifds, DATE_TIME_TAGS) {
                    Ok(mut v) => findings.append(&mut v),
                    Err(e) => had_error = Some(e.to_string()),
                }
                match scan_extra_metadata(&mut f, &ifds, &[TAG_XMP]) {
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
                tracing::warn!(path = %path.display(), error = %e, "bif structure unreadable, falling back to raw sweep");
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
                    if let Some(entry) = find_tag_in_ifd(entries, TAG_XMP) {
                        cleared.append(&mut redact_xmp(&mut f, &entry)?);
                    }
                }
                cleared.append(&mut redact_datetime_tags(&mut f, &ifds, DATE_TIME_TAGS)?);
                cleared.append(&mut redact_extra_metadata(&mut f, &ifds, &[TAG_XMP])?);
                cleared.append(&mut redact_exif_subifd(&mut f, &header, &ifds)?);
                cleared.append(&mut redact_gps_subifd(&mut f, &header, &ifds)?);
                redact_label_macro_ifds(&mut f, &mut header, &ifds, &BifLabelMacroPolicy)?;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "bif anonymize falling back to raw sweep only");
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

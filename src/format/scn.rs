//! Leica SCN handler (§4.4 SCN specialization).
//!
//! SCN stores its metadata as an XML document in `ImageDescription` (tag
//! 270), mixing `<collection>`/`<image>` elements with scanner attributes.
//! PHI appears both as element text (`<creationDate>...</creationDate>`)
//! and as XML attributes (`device="..."`). Matches inside `<?...?>`
//! processing instructions are skipped — those carry schema/version
//! information, never patient data.

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

const SCN_PHI_NAMES: &[&str] = &[
    "barcode",
    "creationDate",
    "device",
    "model",
    "version",
    "slideName",
    "description",
    "user",
    "operator",
    "institution",
    "uniqueID",
    "serialNumber",
    "acquisitionDate",
    "acquisitionTime",
];

struct ScnLabelMacroPolicy;

impl LabelMacroPolicy for ScnLabelMacroPolicy {
    fn is_label_or_macro(
        &self,
        f: &mut std::fs::File,
        _header: &TiffHeader,
        entries: &[IfdEntry],
    ) -> Result<bool, FormatError> {
        classify_by_image_description(f, entries)
    }
}

struct XmlHit {
    value_offset: usize,
    value_len: usize,
    name: String,
    value: String,
}

/// True while `pos` falls inside a `<?...?>` processing instruction.
fn in_processing_instruction(text: &str, pos: usize) -> bool {
    let before = &text[..pos];
    match (before.rfind("<?"), before.rfind("?>")) {
        (Some(open), close) => close.map(|c| c < open).unwrap_or(true),
        (None, _) => false,
    }
}

fn is_redacted(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c == 'X')
}

/// Finds PHI both as `<name>value</name>` element text and `name="value"`
/// attributes, skipping anything inside a processing instruction.
fn find_phi_in_xml(text: &str) -> Vec<XmlHit> {
    let mut hits = Vec::new();

    for name in SCN_PHI_NAMES {
        let open_tag = format!("<{}>", name);
        let close_tag = format!("</{}>", name);
        let mut search_from = 0usize;
        while let Some(rel_open) = text[search_from..].find(&open_tag) {
            let open_start = search_from + rel_open;
            let value_start = open_start + open_tag.len();
            let Some(rel_close) = text[value_start..].find(&close_tag) else { break };
            let value_end = value_start + rel_close;
            let value = &text[value_start..value_end];
            if !value.is_empty() && !is_redacted(value) && !in_processing_instruction(text, open_start) {
                hits.push(XmlHit {
                    value_offset: value_start,
                    value_len: value.len(),
                    name: name.to_string(),
                    value: value.to_string(),
                });
            }
            search_from = value_end + close_tag.len();
        }

        let attr_prefix = format!("{}=\"", name);
        let mut search_from = 0usize;
        while let Some(rel) = text[search_from..].find(&attr_prefix) {
            let attr_start = search_from + rel;
            // Require a non-identifier character (or string start) immediately
            // before the attribute name, so "device" doesn't match inside
            // "enddevice".
            let boundary_ok = attr_start == 0
                || !text.as_bytes()[attr_start - 1].is_ascii_alphanumeric() && text.as_bytes()[attr_start - 1] != b'_';
            let value_start = attr_start + attr_prefix.len();
            let Some(rel_close) = text[value_start..].find('"') else { break };
            let value_end = value_start + rel_close;
            let value = &text[value_start..value_end];
            if boundary_ok && !value.is_empty() && !is_redacted(value) && !in_processing_instruction(text, attr_start) {
                hits.push(XmlHit {
                    value_offset: value_start,
                    value_len: value.len(),
                    name: name.to_string(),
                    value: value.to_string(),
                });
            }
            search_from = value_end + 1;
        }
    }

    hits.sort_by_key(|h| h.value_offset);
    hits
}

fn scan_xml(entry: &IfdEntry, text: &str) -> Vec<PhiFinding> {
    find_phi_in_xml(text)
        .into_iter()
        .map(|hit| PhiFinding {
            offset: entry.value_offset + hit.value_offset as u64,
            length: hit.value_len as u64,
            tag_id: Some(entry.tag_id),
            tag_name: format!("SCN_Description:{}", hit.name),
            value_preview: hit.value,
            source: FindingSource::TiffTag,
        })
        .collect()
}

fn redact_xml(f: &mut std::fs::File, entry: &IfdEntry) -> Result<Vec<PhiFinding>, FormatError> {
    if entry.total_size() == 0 {
        return Ok(Vec::new());
    }
    let text = read_tag_string(f, entry)?;
    let hits = find_phi_in_xml(&text);
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
            tag_name: format!("SCN_Description:{}", hit.name),
            value_preview: hit.value.clone(),
            source: FindingSource::TiffTag,
        });
    }

    overwrite_tag_padded(f, entry, &bytes)?;
    Ok(findings)
}

pub struct ScnHandler {
    patterns: PatternConfig,
}

impl ScnHandler {
    pub fn new(patterns: PatternConfig) -> Self {
        ScnHandler { patterns }
    }
}

impl Default for ScnHandler {
    fn default() -> Self {
        ScnHandler::new(PatternConfig::default())
    }
}

impl FormatHandler for ScnHandler {
    fn format_name(&self) -> &'static str {
        "scn"
    }

    fn can_handle(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("scn")) == Some(true)
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
                            Ok(text) => findings.extend(scan_xml(&entry, &text)),
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
                tracing::warn!(path = %path.display(), error = %e, "scn structure unreadable, falling back to raw sweep");
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
                        cleared.append(&mut redact_xml(&mut f, &entry)?);
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
                redact_label_macro_ifds(&mut f, &mut header, &ifds, &ScnLabelMacroPolicy)?;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "scn anonymize falling back to raw sweep only");
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

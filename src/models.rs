//! Value types shared across the parser, editor, detector, and handlers.
//!
//! Every type here is a plain, cloneable record. A file is owned by exactly
//! one scan or anonymize operation at a time; nothing here is shared across
//! threads.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where a [`PHIFinding`] was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingSource {
    /// A known TIFF tag value (DateTime, Artist, private vendor tag, ...).
    TiffTag,
    /// A raw-byte or string regex match outside any structured field.
    RegexScan,
    /// PHI embedded in pixel content itself (not detected, only named for
    /// parity with the data model; this crate never flags image content).
    ImageContent,
    /// A companion sidecar file (e.g. NDPI `.ndpa`/`.ndpis` annotations).
    CompanionFile,
    /// PHI found in the file's base name.
    Filename,
}

/// A single piece of PHI found in a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhiFinding {
    /// Byte offset within the file where the PHI bytes begin.
    pub offset: u64,
    /// Length in bytes of the PHI region.
    pub length: u64,
    /// TIFF tag id, when the finding originates from a tag value.
    pub tag_id: Option<u16>,
    /// Human-readable label, e.g. `"NDPI:BarCode"` or `"Accession_AS"`.
    pub tag_name: String,
    /// Short preview of the offending value, safe to log.
    pub value_preview: String,
    pub source: FindingSource,
}

impl PhiFinding {
    /// Masks the preview for safe logging: first/last two characters kept,
    /// the interior replaced with `*`. Short values are fully masked.
    pub fn masked_preview(&self) -> String {
        let val = &self.value_preview;
        let len = val.chars().count();
        if len <= 4 {
            return "*".repeat(len);
        }
        let chars: Vec<char> = val.chars().collect();
        let head: String = chars[..2].iter().collect();
        let tail: String = chars[len - 2..].iter().collect();
        format!("{head}{}{tail}", "*".repeat(len - 4))
    }
}

/// Result of scanning a single file for PHI. Read-only operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub filepath: PathBuf,
    pub format: String,
    pub findings: Vec<PhiFinding>,
    /// Fail-closed invariant: if `error` is `Some`, this must be `false`.
    pub is_clean: bool,
    #[serde(with = "duration_millis")]
    pub scan_time: Duration,
    pub file_size: u64,
    pub error: Option<String>,
}

impl ScanResult {
    pub fn clean(filepath: PathBuf, format: &str, file_size: u64, scan_time: Duration) -> Self {
        ScanResult {
            filepath,
            format: format.to_string(),
            findings: Vec::new(),
            is_clean: true,
            scan_time,
            file_size,
            error: None,
        }
    }

    pub fn with_findings(
        filepath: PathBuf,
        format: &str,
        findings: Vec<PhiFinding>,
        file_size: u64,
        scan_time: Duration,
    ) -> Self {
        let is_clean = findings.is_empty();
        ScanResult {
            filepath,
            format: format.to_string(),
            findings,
            is_clean,
            scan_time,
            file_size,
            error: None,
        }
    }

    /// Builds a failed result. Always `is_clean = false` per the fail-closed
    /// rule (§7): an error can never coexist with a clean verdict.
    pub fn failed(
        filepath: PathBuf,
        format: &str,
        findings: Vec<PhiFinding>,
        file_size: u64,
        scan_time: Duration,
        error: impl Into<String>,
    ) -> Self {
        ScanResult {
            filepath,
            format: format.to_string(),
            findings,
            is_clean: false,
            scan_time,
            file_size,
            error: Some(error.into()),
        }
    }
}

/// How an anonymize operation wrote its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnonymizeMode {
    Copy,
    InPlace,
}

/// Tri-state result of the diagnostic-pixel integrity check (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityStatus {
    Verified,
    Failed,
    NotChecked,
}

/// Result of anonymizing a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymizationResult {
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub mode: AnonymizeMode,
    pub findings_cleared: usize,
    pub verified: bool,
    pub image_integrity: IntegrityStatus,
    pub filename_has_phi: bool,
    #[serde(with = "duration_millis")]
    pub anonymization_time: Duration,
    pub output_sha256: Option<String>,
    pub error: Option<String>,
}

impl AnonymizationResult {
    pub fn error(
        source_path: PathBuf,
        output_path: PathBuf,
        mode: AnonymizeMode,
        elapsed: Duration,
        error: impl Into<String>,
    ) -> Self {
        AnonymizationResult {
            source_path,
            output_path,
            mode,
            findings_cleared: 0,
            verified: false,
            image_integrity: IntegrityStatus::NotChecked,
            filename_has_phi: false,
            anonymization_time: elapsed,
            output_sha256: None,
            error: Some(error.into()),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(millis / 1000.0))
    }
}

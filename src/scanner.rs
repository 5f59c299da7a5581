//! PHI detection engine (§4.3).
//!
//! Holds four pattern sets -- byte, string, date, and filename -- each a list
//! of `(Regex, label)` pairs. Defaults are hard-coded; callers may overlay a
//! JSON file of additional patterns via [`PatternConfig::from_json`].
//!
//! The `regex` crate's default engine has no look-around support, so the two
//! patterns that need it (the accession `H-`/`S-` prefix exclusion, and the
//! SSN digit-run exclusion) are implemented as a plain match plus an explicit
//! boundary check against the surrounding bytes.

use crate::error::ScannerError;
use regex::bytes::Regex as ByteRegex;
use regex::Regex as StrRegex;
use std::path::Path;

/// A boundary condition checked against the bytes immediately surrounding a
/// match, standing in for the look-around the underlying regex engine lacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    /// No constraint beyond the regex itself.
    None,
    /// The byte immediately preceding the match must not be an ASCII
    /// uppercase letter (excludes e.g. `CATCH-23-44444` matching `H-23-44444`).
    NoPrecedingUppercaseLetter,
    /// Neither the byte immediately before nor immediately after the match
    /// may be an ASCII digit (excludes SSNs embedded in longer digit runs).
    NoAdjacentDigit,
}

impl Boundary {
    fn satisfied(self, data: &[u8], start: usize, end: usize) -> bool {
        match self {
            Boundary::None => true,
            Boundary::NoPrecedingUppercaseLetter => {
                start == 0 || !data[start - 1].is_ascii_uppercase()
            }
            Boundary::NoAdjacentDigit => {
                let before_ok = start == 0 || !data[start - 1].is_ascii_digit();
                let after_ok = end >= data.len() || !data[end].is_ascii_digit();
                before_ok && after_ok
            }
        }
    }
}

/// One compiled byte-level pattern.
#[derive(Debug, Clone)]
pub struct BytePattern {
    regex: ByteRegex,
    label: String,
    boundary: Boundary,
}

/// One compiled string-level pattern.
#[derive(Debug, Clone)]
pub struct StringPattern {
    regex: StrRegex,
    label: String,
    boundary: Boundary,
}

/// A single PHI finding from a byte-level scan: offset and length are in
/// bytes of the scanned buffer, `matched` is the (possibly NUL-extended) raw
/// bytes, and `label` names the pattern that matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytesMatch {
    pub offset: usize,
    pub length: usize,
    pub matched: Vec<u8>,
    pub label: String,
}

/// A single PHI finding from a string-level scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringMatch {
    pub offset: usize,
    pub length: usize,
    pub matched: String,
    pub label: String,
}

/// The full set of PHI regex patterns used by scan operations, with defaults
/// plus an optional JSON overlay (§4.3).
#[derive(Debug, Clone)]
pub struct PatternConfig {
    pub byte_patterns: Vec<BytePattern>,
    pub string_patterns: Vec<StringPattern>,
    pub date_byte_patterns: Vec<BytePattern>,
    pub filename_patterns: Vec<StringPattern>,
}

fn byte(pattern: &str, label: &str, boundary: Boundary) -> BytePattern {
    BytePattern {
        regex: ByteRegex::new(pattern).expect("built-in pattern must compile"),
        label: label.to_string(),
        boundary,
    }
}

fn string(pattern: &str, label: &str, boundary: Boundary) -> StringPattern {
    StringPattern {
        regex: StrRegex::new(pattern).expect("built-in pattern must compile"),
        label: label.to_string(),
        boundary,
    }
}

impl PatternConfig {
    /// The hard-coded default pattern set, covering the accession-number,
    /// MRN, SSN, and DOB identifier families plus TIFF/slash/ISO dates.
    pub fn default() -> Self {
        let accession_defs: &[(&str, &str)] =
            &[("AS", "AS"), ("AC", "AC"), ("SP", "SP"), ("AP", "AP"), ("CY", "CY")];

        let mut byte_patterns = Vec::new();
        let mut string_patterns = Vec::new();

        for (prefix, tag) in accession_defs {
            let two_digit = format!(r"{prefix}-\d{{2}}-\d{{3,}}");
            byte_patterns.push(byte(&two_digit, &format!("Accession_{tag}"), Boundary::None));
            string_patterns.push(string(&two_digit, &format!("Accession_{tag}"), Boundary::None));

            let four_digit = format!(r"{prefix}-(?:19|20)\d{{2}}-\d{{3,}}");
            byte_patterns.push(byte(
                &four_digit,
                &format!("Accession_{tag}4"),
                Boundary::None,
            ));
            string_patterns.push(string(
                &four_digit,
                &format!("Accession_{tag}4"),
                Boundary::None,
            ));
        }

        byte_patterns.push(byte(
            r"H-\d{2}-\d{3,}",
            "Accession_H",
            Boundary::NoPrecedingUppercaseLetter,
        ));
        string_patterns.push(string(
            r"H-\d{2}-\d{3,}",
            "Accession_H",
            Boundary::NoPrecedingUppercaseLetter,
        ));
        byte_patterns.push(byte(
            r"S-\d{2}-\d{3,}",
            "Accession_S",
            Boundary::NoPrecedingUppercaseLetter,
        ));
        string_patterns.push(string(
            r"S-\d{2}-\d{3,}",
            "Accession_S",
            Boundary::NoPrecedingUppercaseLetter,
        ));

        byte_patterns.push(byte(r"CH\d{5,}", "Accession_CH", Boundary::None));
        string_patterns.push(string(r"CH\d{5,}", "Accession_CH", Boundary::None));

        byte_patterns.push(byte(r"00000AS\d+", "Accession_Padded", Boundary::None));
        string_patterns.push(string(r"00000AS\d+", "Accession_Padded", Boundary::None));

        byte_patterns.push(byte(r"MRN[-: ]?\d{5,}", "MRN_Pattern", Boundary::None));
        string_patterns.push(string(r"MRN[-: ]?\d{5,}", "MRN_Pattern", Boundary::None));

        byte_patterns.push(byte(
            r"\d{3}-\d{2}-\d{4}",
            "SSN_Pattern",
            Boundary::NoAdjacentDigit,
        ));
        string_patterns.push(string(
            r"\d{3}-\d{2}-\d{4}",
            "SSN_Pattern",
            Boundary::NoAdjacentDigit,
        ));

        byte_patterns.push(byte(
            r"DOB[-_ ]?(?:\d{8}|\d{4}[/-]\d{2}[/-]\d{2})",
            "DOB_Pattern",
            Boundary::None,
        ));
        string_patterns.push(string(
            r"DOB[-_ ]?(?:\d{8}|\d{4}[/-]\d{2}[/-]\d{2})",
            "DOB_Pattern",
            Boundary::None,
        ));

        let date_byte_patterns = vec![
            byte(
                r"(?:19|20)\d{2}:\d{2}:\d{2} \d{2}:\d{2}:\d{2}",
                "DateTime_TIFF",
                Boundary::None,
            ),
            byte(r"(?:19|20)\d{2}/\d{2}/\d{2}", "DateTime_Slash", Boundary::None),
            byte(r"(?:19|20)\d{2}-\d{2}-\d{2}", "DateTime_ISO", Boundary::None),
        ];

        let filename_patterns = string_patterns.clone();

        PatternConfig {
            byte_patterns,
            string_patterns,
            date_byte_patterns,
            filename_patterns,
        }
    }

    /// Loads the default set plus an overlay of additional patterns from a
    /// JSON file (keys: `byte_patterns`, `string_patterns`,
    /// `date_byte_patterns`, `filename_patterns`, each a list of
    /// `[pattern, label]` pairs). Overlay patterns carry no boundary
    /// restriction -- they are taken literally as the caller wrote them.
    pub fn from_json(path: &Path) -> Result<Self, ScannerError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ScannerError> {
        let mut config = Self::default();
        let raw: serde_json::Value = serde_json::from_str(text)?;

        let pairs = |key: &str| -> Result<Vec<(String, String)>, ScannerError> {
            let Some(entries) = raw.get(key).and_then(|v| v.as_array()) else {
                return Ok(Vec::new());
            };
            let mut out = Vec::with_capacity(entries.len());
            for entry in entries {
                let Some(arr) = entry.as_array() else { continue };
                if arr.len() != 2 {
                    continue;
                }
                let pattern = arr[0].as_str().unwrap_or_default().to_string();
                let label = arr[1].as_str().unwrap_or_default().to_string();
                out.push((pattern, label));
            }
            Ok(out)
        };

        for (pattern, label) in pairs("byte_patterns")? {
            let regex = ByteRegex::new(&pattern)
                .map_err(|source| ScannerError::InvalidPattern { label: label.clone(), source })?;
            config.byte_patterns.push(BytePattern { regex, label, boundary: Boundary::None });
        }
        for (pattern, label) in pairs("string_patterns")? {
            let regex = StrRegex::new(&pattern)
                .map_err(|source| ScannerError::InvalidPattern { label: label.clone(), source })?;
            config.string_patterns.push(StringPattern { regex, label, boundary: Boundary::None });
        }
        for (pattern, label) in pairs("date_byte_patterns")? {
            let regex = ByteRegex::new(&pattern)
                .map_err(|source| ScannerError::InvalidPattern { label: label.clone(), source })?;
            config.date_byte_patterns.push(BytePattern { regex, label, boundary: Boundary::None });
        }
        for (pattern, label) in pairs("filename_patterns")? {
            let regex = StrRegex::new(&pattern)
                .map_err(|source| ScannerError::InvalidPattern { label: label.clone(), source })?;
            config.filename_patterns.push(StringPattern { regex, label, boundary: Boundary::None });
        }

        Ok(config)
    }
}

/// Returns true if `data` is empty, all-NUL, or an all-`'X'` redaction run --
/// the sentinel shapes that mean "already handled, do not report again."
fn is_sentinel(data: &[u8]) -> bool {
    !data.is_empty() && (data.iter().all(|&b| b == 0) || data.iter().all(|&b| b == b'X'))
}

/// Scans raw bytes for PHI, skipping any match whose start offset is in
/// `skip_offsets`. Each match is extended forward to the next NUL byte (if
/// any) so variable-length identifiers are captured whole; matches that turn
/// out to already be redacted (NUL-filled or all-`X`) are dropped.
pub fn scan_bytes(
    config: &PatternConfig,
    data: &[u8],
    skip_offsets: &std::collections::HashSet<usize>,
) -> Vec<BytesMatch> {
    let mut findings = Vec::new();
    for pat in &config.byte_patterns {
        for m in pat.regex.find_iter(data) {
            if skip_offsets.contains(&m.start()) {
                continue;
            }
            if !pat.boundary.satisfied(data, m.start(), m.end()) {
                continue;
            }
            let end = data[m.start()..]
                .iter()
                .position(|&b| b == 0)
                .map(|rel| m.start() + rel)
                .unwrap_or(m.end());
            let matched = &data[m.start()..end];
            if is_sentinel(matched) {
                continue;
            }
            findings.push(BytesMatch {
                offset: m.start(),
                length: matched.len(),
                matched: matched.to_vec(),
                label: pat.label.clone(),
            });
        }
    }
    findings
}

/// Scans a decoded string value for PHI. No NUL-extension (the value is
/// already a complete decoded string) and no sentinel pass beyond the
/// caller's own already-anonymized check.
pub fn scan_string(config: &PatternConfig, value: &str) -> Vec<StringMatch> {
    let mut findings = Vec::new();
    let bytes = value.as_bytes();
    for pat in &config.string_patterns {
        for m in pat.regex.find_iter(value) {
            if !pat.boundary.satisfied(bytes, m.start(), m.end()) {
                continue;
            }
            findings.push(StringMatch {
                offset: m.start(),
                length: m.as_str().len(),
                matched: m.as_str().to_string(),
                label: pat.label.clone(),
            });
        }
    }
    findings
}

/// Scans raw bytes for embedded dates, skipping any already-anonymized
/// sentinel (`1900:01:01`, `1900/01/01`, `1900-01-01`, `0000:00:00`).
pub fn scan_bytes_for_dates(config: &PatternConfig, data: &[u8]) -> Vec<BytesMatch> {
    const SENTINELS: &[&[u8]] =
        &[b"1900:01:01", b"1900/01/01", b"1900-01-01", b"0000:00:00"];

    let mut findings = Vec::new();
    for pat in &config.date_byte_patterns {
        for m in pat.regex.find_iter(data) {
            let matched = m.as_bytes();
            if SENTINELS.iter().any(|s| contains(matched, s)) {
                continue;
            }
            findings.push(BytesMatch {
                offset: m.start(),
                length: matched.len(),
                matched: matched.to_vec(),
                label: pat.label.clone(),
            });
        }
    }
    findings
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Returns true if a date string has already been anonymized: contains the
/// `1900:01:01`/`0000:00:00` sentinel, or is empty once NULs and whitespace
/// are stripped.
pub fn is_date_anonymized(value: &str) -> bool {
    if value.contains("1900:01:01") || value.contains("0000:00:00") {
        return true;
    }
    value.trim_matches(|c: char| c == '\0' || c.is_whitespace()).is_empty()
}

/// Scans a file's base name (stem plus extension, path components dropped)
/// for PHI using the filename pattern set.
pub fn scan_filename(config: &PatternConfig, path: &Path) -> Vec<StringMatch> {
    let base_name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return Vec::new(),
    };
    let mut findings = Vec::new();
    let bytes = base_name.as_bytes();
    for pat in &config.filename_patterns {
        for m in pat.regex.find_iter(base_name) {
            if !pat.boundary.satisfied(bytes, m.start(), m.end()) {
                continue;
            }
            findings.push(StringMatch {
                offset: m.start(),
                length: m.as_str().len(),
                matched: m.as_str().to_string(),
                label: pat.label.clone(),
            });
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn detects_as_accession() {
        let config = PatternConfig::default();
        let data = b"prefix AS-24-12345 suffix";
        let findings = scan_bytes(&config, data, &HashSet::new());
        assert!(findings.iter().any(|f| f.label == "Accession_AS"));
    }

    #[test]
    fn h_pattern_excludes_uppercase_prefix() {
        let config = PatternConfig::default();
        let data = b"CATCH-23-44444";
        let findings = scan_bytes(&config, data, &HashSet::new());
        assert!(!findings.iter().any(|f| f.label == "Accession_H"));
    }

    #[test]
    fn h_pattern_matches_standalone() {
        let config = PatternConfig::default();
        let data = b"prefix H-23-44444 suffix";
        let findings = scan_bytes(&config, data, &HashSet::new());
        assert!(findings.iter().any(|f| f.label == "Accession_H"));
    }

    #[test]
    fn ssn_excludes_embedded_digit_run() {
        let config = PatternConfig::default();
        let data = b"1123-45-67890";
        let findings = scan_bytes(&config, data, &HashSet::new());
        assert!(!findings.iter().any(|f| f.label == "SSN_Pattern"));
    }

    #[test]
    fn ssn_matches_standalone() {
        let config = PatternConfig::default();
        let data = b"ssn 123-45-6789 end";
        let findings = scan_bytes(&config, data, &HashSet::new());
        assert!(findings.iter().any(|f| f.label == "SSN_Pattern"));
    }

    #[test]
    fn four_digit_year_requires_19_or_20_prefix() {
        let config = PatternConfig::default();
        let data = b"AS-1899-12345\x00";
        let findings = scan_bytes(&config, data, &HashSet::new());
        assert!(!findings.iter().any(|f| f.label.contains("AS4")));
    }

    #[test]
    fn match_extends_to_next_nul() {
        let config = PatternConfig::default();
        let mut data = b"AS-24-12345".to_vec();
        data.extend_from_slice(b"6789\x00trailing");
        let findings = scan_bytes(&config, &data, &HashSet::new());
        let f = findings.iter().find(|f| f.label == "Accession_AS").unwrap();
        assert_eq!(f.matched, b"AS-24-123456789");
    }

    #[test]
    fn skip_offsets_suppress_match() {
        let config = PatternConfig::default();
        let data = b"AS-24-12345";
        let mut skip = HashSet::new();
        skip.insert(0usize);
        let findings = scan_bytes(&config, data, &skip);
        assert!(findings.is_empty());
    }

    #[test]
    fn all_x_redaction_is_sentinel() {
        let config = PatternConfig::default();
        let data = b"XXXXXXXXXXXXX";
        let findings = scan_bytes(&config, data, &HashSet::new());
        assert!(findings.is_empty());
    }

    #[test]
    fn date_sentinel_skipped() {
        let config = PatternConfig::default();
        let findings = scan_bytes_for_dates(&config, b"date 1900:01:01 00:00:00");
        assert!(findings.is_empty());
    }

    #[test]
    fn date_slash_and_iso_detected() {
        let config = PatternConfig::default();
        let slash = scan_bytes_for_dates(&config, b"scanned 2024/06/15 at lab");
        assert_eq!(slash.len(), 1);
        assert_eq!(slash[0].label, "DateTime_Slash");

        let iso = scan_bytes_for_dates(&config, b"date: 2024-06-15 done");
        assert_eq!(iso.len(), 1);
        assert_eq!(iso[0].label, "DateTime_ISO");
    }

    #[test]
    fn filename_scan_finds_accession_and_mrn() {
        let config = PatternConfig::default();
        let path = Path::new("/data/AS-24-123456_MRN12345678.ndpi");
        let findings = scan_filename(&config, path);
        assert!(findings.iter().any(|f| f.label == "Accession_AS"));
        assert!(findings.iter().any(|f| f.label == "MRN_Pattern"));
    }

    #[test]
    fn clean_filename_has_no_findings() {
        let config = PatternConfig::default();
        let findings = scan_filename(&config, Path::new("/data/slide001.ndpi"));
        assert!(findings.is_empty());
    }

    #[test]
    fn is_date_anonymized_recognizes_sentinel_and_blank() {
        assert!(is_date_anonymized("1900:01:01 00:00:00"));
        assert!(is_date_anonymized("\0\0\0"));
        assert!(is_date_anonymized("   "));
        assert!(!is_date_anonymized("2024:06:15 12:00:00"));
    }

    #[test]
    fn json_overlay_adds_custom_pattern() {
        let json = r#"{"byte_patterns": [["CUSTOM-\\d+", "Custom_Pattern"]]}"#;
        let config = PatternConfig::from_json_str(json).unwrap();
        let default_count = PatternConfig::default().byte_patterns.len();
        assert_eq!(config.byte_patterns.len(), default_count + 1);

        let findings = scan_bytes(&config, b"ID: CUSTOM-99887", &HashSet::new());
        assert!(findings.iter().any(|f| f.label == "Custom_Pattern"));
    }

    #[test]
    fn empty_json_overlay_returns_defaults() {
        let config = PatternConfig::from_json_str("{}").unwrap();
        let default = PatternConfig::default();
        assert_eq!(config.byte_patterns.len(), default.byte_patterns.len());
        assert_eq!(config.string_patterns.len(), default.string_patterns.len());
        assert_eq!(config.date_byte_patterns.len(), default.date_byte_patterns.len());
    }

    #[test]
    fn scan_string_detects_dob() {
        let config = PatternConfig::default();
        let findings = scan_string(&config, "DOB19800315");
        assert!(findings.iter().any(|f| f.label == "DOB_Pattern"));
    }
}

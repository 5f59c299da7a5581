//! Per-file anonymize pipeline (§4.5).
//!
//! Wraps a single [`FormatHandler`] call with the operational concerns
//! around it: copy-vs-in-place output, dry runs, pre/post diagnostic-image
//! integrity hashing, a verification rescan, an output checksum for the
//! caller's audit log, and a timestamp reset. The handler itself never
//! touches any of this — it only knows TIFF structure and PHI patterns.

use crate::editor::is_ifd_image_blanked;
use crate::error::PipelineError;
use crate::format::base::parse_structure;
use crate::format::HandlerRegistry;
use crate::models::{AnonymizationResult, AnonymizeMode, FindingSource, IntegrityStatus};
use crate::tiff::{read_tag_long_array, IfdEntry, TiffHeader};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

/// Knobs for [`anonymize_file`]; defaults match the safe, fully-verified
/// configuration described in §4.5.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub verify: bool,
    pub verify_integrity: bool,
    pub reset_timestamps: bool,
    pub dry_run: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            verify: true,
            verify_integrity: true,
            reset_timestamps: true,
            dry_run: false,
        }
    }
}

/// Hashes every IFD's strip/tile byte range with SHA-256, keyed by IFD
/// offset, skipping any IFD that already carries the blanked-image marker.
/// Unlike [`crate::format::base::diagnostic_ifd_hashes`] this needs no
/// vendor policy: "already blanked" is detected structurally, which is all
/// the pipeline needs to restrict its before/after comparison to IFDs the
/// handler left untouched.
fn hash_unblanked_ifds(
    f: &mut File,
    header: &TiffHeader,
    ifds: &[(u64, Vec<IfdEntry>)],
) -> Result<BTreeMap<u64, String>, PipelineError> {
    use sha2::{Digest, Sha256};

    let mut out = BTreeMap::new();
    for (ifd_offset, entries) in ifds {
        if is_ifd_image_blanked(f, header, entries).map_err(crate::error::FormatError::from)? {
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
        let offsets = read_tag_long_array(f, header, &offset_entry).map_err(crate::error::FormatError::from)?;
        let counts = read_tag_long_array(f, header, &count_entry).map_err(crate::error::FormatError::from)?;
        if offsets.len() != counts.len() {
            continue;
        }
        let mut hasher = Sha256::new();
        for (off, cnt) in offsets.iter().zip(counts.iter()) {
            if *cnt == 0 {
                continue;
            }
            f.seek(SeekFrom::Start(*off))?;
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

fn compute_ifd_hashes(path: &Path) -> Result<BTreeMap<u64, String>, PipelineError> {
    let mut f = File::open(path)?;
    let (header, ifds) = parse_structure(&mut f).map_err(PipelineError::Format)?;
    hash_unblanked_ifds(&mut f, &header, &ifds)
}

fn sha256_file(path: &Path) -> Result<String, PipelineError> {
    use sha2::{Digest, Sha256};
    let mut f = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 65536];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn reset_timestamps(path: &Path) -> Result<(), PipelineError> {
    let f = File::options().write(true).open(path)?;
    let epoch = SystemTime::UNIX_EPOCH;
    let times = std::fs::FileTimes::new().set_accessed(epoch).set_modified(epoch);
    f.set_times(times)?;
    Ok(())
}

/// Runs the full anonymize pipeline for one file (§4.5, steps 1-9).
///
/// `out = None` anonymizes `src` in place; `Some(path)` copies `src` to
/// `path` first and anonymizes the copy, leaving `src` untouched.
pub fn anonymize_file(
    registry: &HandlerRegistry,
    src: &Path,
    out: Option<&Path>,
    options: PipelineOptions,
) -> AnonymizationResult {
    let start = Instant::now();
    let mode = if out.is_some() { AnonymizeMode::Copy } else { AnonymizeMode::InPlace };
    let output_path: PathBuf = out.map(Path::to_path_buf).unwrap_or_else(|| src.to_path_buf());

    if !src.exists() {
        return AnonymizationResult::error(
            src.to_path_buf(),
            output_path,
            mode,
            start.elapsed(),
            PipelineError::NotFound(src.display().to_string()).to_string(),
        );
    }

    let Some(handler) = registry.select(src) else {
        return AnonymizationResult::error(
            src.to_path_buf(),
            output_path,
            mode,
            start.elapsed(),
            PipelineError::UnsupportedFormat(src.display().to_string()).to_string(),
        );
    };

    if options.dry_run {
        let scan = handler.scan(src);
        return AnonymizationResult {
            source_path: src.to_path_buf(),
            output_path: src.to_path_buf(),
            mode,
            findings_cleared: scan.findings.len(),
            verified: false,
            image_integrity: IntegrityStatus::NotChecked,
            filename_has_phi: scan
                .findings
                .iter()
                .any(|f| f.source == FindingSource::Filename),
            anonymization_time: start.elapsed(),
            output_sha256: None,
            error: scan.error,
        };
    }

    if let Some(out_path) = out {
        if let Err(e) = std::fs::copy(src, out_path) {
            return AnonymizationResult::error(
                src.to_path_buf(),
                output_path,
                mode,
                start.elapsed(),
                PipelineError::Io(e).to_string(),
            );
        }
    }

    let pre_hashes = match compute_ifd_hashes(&output_path) {
        Ok(h) => h,
        Err(e) => {
            if out.is_some() {
                let _ = std::fs::remove_file(&output_path);
            }
            return AnonymizationResult::error(src.to_path_buf(), output_path, mode, start.elapsed(), e.to_string());
        }
    };

    let cleared = match handler.anonymize(&output_path) {
        Ok(findings) => findings,
        Err(e) => {
            if out.is_some() {
                let _ = std::fs::remove_file(&output_path);
            }
            return AnonymizationResult::error(src.to_path_buf(), output_path, mode, start.elapsed(), e.to_string());
        }
    };

    // §4.5 step 8 computes filename_has_phi unconditionally; step 5's
    // verification rescan is gated on `options.verify`. Both read from the
    // same `scan` call when verification runs, to avoid rescanning twice.
    let mut verified = false;
    let mut verify_error = None;
    let rescan = if options.verify { Some(handler.scan(&output_path)) } else { None };
    if let Some(rescan) = &rescan {
        verified = rescan.is_clean
            || rescan
                .findings
                .iter()
                .all(|f| f.source == FindingSource::Filename);
        verify_error = rescan.error.clone();
    }
    let filename_has_phi = match &rescan {
        Some(rescan) => rescan.findings.iter().any(|f| f.source == FindingSource::Filename),
        None => !crate::scanner::scan_filename(handler.patterns(), &output_path).is_empty(),
    };

    let image_integrity = if options.verify_integrity {
        match compute_ifd_hashes(&output_path) {
            Ok(post_hashes) => {
                let common_match = pre_hashes.iter().all(|(offset, pre_hash)| {
                    post_hashes
                        .get(offset)
                        .map(|post_hash| post_hash == pre_hash)
                        .unwrap_or(true)
                });
                if common_match {
                    IntegrityStatus::Verified
                } else {
                    IntegrityStatus::Failed
                }
            }
            Err(_) => IntegrityStatus::Failed,
        }
    } else {
        IntegrityStatus::NotChecked
    };

    let output_sha256 = sha256_file(&output_path).ok();

    if options.reset_timestamps {
        let _ = reset_timestamps(&output_path);
    }

    AnonymizationResult {
        source_path: src.to_path_buf(),
        output_path,
        mode,
        findings_cleared: cleared.len(),
        verified,
        image_integrity,
        filename_has_phi,
        anonymization_time: start.elapsed(),
        output_sha256,
        error: verify_error,
    }
}

use crate::integration::fixtures::{build_classic_tiff, write_fixture, Tag};
use pathsafe::{anonymize_file, AnonymizeMode, HandlerRegistry, IntegrityStatus, PatternConfig, PipelineOptions};

const TAG_IMAGE_DESCRIPTION: u16 = 270;
const TAG_DATE_TIME: u16 = 306;

fn sample_bytes() -> Vec<u8> {
    build_classic_tiff(&[vec![
        Tag::ascii(TAG_IMAGE_DESCRIPTION, "Accession AS-24-777777"),
        Tag::ascii(TAG_DATE_TIME, "2024:06:15 10:30:00"),
    ]])
}

#[test]
fn dry_run_reports_findings_without_modifying_the_file() {
    let bytes = sample_bytes();
    let file = write_fixture(&bytes, "tif");
    let before = std::fs::read(file.path()).unwrap();

    let registry = HandlerRegistry::new(PatternConfig::default());
    let result = anonymize_file(
        &registry,
        file.path(),
        None,
        PipelineOptions { dry_run: true, ..PipelineOptions::default() },
    );

    assert!(result.findings_cleared > 0);
    assert_eq!(result.image_integrity, IntegrityStatus::NotChecked);
    let after = std::fs::read(file.path()).unwrap();
    assert_eq!(before, after, "dry run must not touch the file");
}

#[test]
fn in_place_mode_anonymizes_and_verifies() {
    let bytes = sample_bytes();
    let file = write_fixture(&bytes, "tif");

    let registry = HandlerRegistry::new(PatternConfig::default());
    let result = anonymize_file(&registry, file.path(), None, PipelineOptions::default());

    assert_eq!(result.mode, AnonymizeMode::InPlace);
    assert!(result.findings_cleared > 0);
    assert!(result.verified, "rescan should come back clean: {:?}", result.error);
    assert_eq!(result.image_integrity, IntegrityStatus::Verified);
    assert!(result.output_sha256.is_some());
    assert_eq!(result.output_path, file.path());
}

#[test]
fn copy_mode_leaves_source_untouched() {
    let bytes = sample_bytes();
    let src = write_fixture(&bytes, "tif");
    let out_dir = tempfile::tempdir().unwrap();
    let out_path = out_dir.path().join("clean.tif");

    let registry = HandlerRegistry::new(PatternConfig::default());
    let result = anonymize_file(
        &registry,
        src.path(),
        Some(&out_path),
        PipelineOptions::default(),
    );

    assert_eq!(result.mode, AnonymizeMode::Copy);
    assert!(result.verified);
    assert_eq!(result.output_path, out_path);

    let src_bytes = std::fs::read(src.path()).unwrap();
    assert_eq!(src_bytes, bytes, "source must remain untouched in copy mode");

    let out_bytes = std::fs::read(&out_path).unwrap();
    let out_text = String::from_utf8_lossy(&out_bytes);
    assert!(!out_text.contains("AS-24-777777"));
}

#[test]
fn rerun_on_already_anonymized_file_clears_nothing_new() {
    let bytes = sample_bytes();
    let file = write_fixture(&bytes, "tif");

    let registry = HandlerRegistry::new(PatternConfig::default());
    let first = anonymize_file(&registry, file.path(), None, PipelineOptions::default());
    assert!(first.findings_cleared > 0);

    let first_bytes = std::fs::read(file.path()).unwrap();
    let second = anonymize_file(&registry, file.path(), None, PipelineOptions::default());
    assert_eq!(second.findings_cleared, 0);
    assert!(second.verified);

    let second_bytes = std::fs::read(file.path()).unwrap();
    assert_eq!(first_bytes, second_bytes, "re-running anonymize must be idempotent");
}

#[test]
fn missing_source_file_reports_error_without_panicking() {
    let registry = HandlerRegistry::new(PatternConfig::default());
    let result = anonymize_file(
        &registry,
        std::path::Path::new("/nonexistent/path/slide.tif"),
        None,
        PipelineOptions::default(),
    );

    assert!(result.error.is_some());
    assert!(!result.verified);
}

use crate::integration::fixtures::{build_bigtiff, write_fixture, Tag};
use pathsafe::format::bif::BifHandler;
use pathsafe::scanner::PatternConfig;
use pathsafe::FormatHandler;

const TAG_XMP: u16 = 700;

const ISCAN_XML: &str = r#"<iScan BarCode1="AS-24-222222" ScanDate="2024-06-15" OperatorID="jdoe" UniqueID="XYZ789"/>"#;

#[test]
fn scan_finds_phi_attributes_in_xmp() {
    let bytes = build_bigtiff(&[vec![Tag::ascii(TAG_XMP, ISCAN_XML)]]);
    let file = write_fixture(&bytes, "bif");

    let handler = BifHandler::new(PatternConfig::default());
    let result = handler.scan(file.path());

    assert!(!result.is_clean);
    let names: Vec<_> = result.findings.iter().map(|f| f.tag_name.as_str()).collect();
    assert!(names.iter().any(|n| n.contains("BarCode1")));
    assert!(names.iter().any(|n| n.contains("OperatorID")));
}

#[test]
fn anonymize_preserves_byte_length_and_clears_phi() {
    let bytes = build_bigtiff(&[vec![Tag::ascii(TAG_XMP, ISCAN_XML)]]);
    let original_len = bytes.len();
    let file = write_fixture(&bytes, "bif");

    let handler = BifHandler::new(PatternConfig::default());
    let cleared = handler.anonymize(file.path()).expect("anonymize should succeed");
    assert!(!cleared.is_empty());

    let after_len = std::fs::metadata(file.path()).unwrap().len() as usize;
    assert_eq!(after_len, original_len);

    let raw = std::fs::read(file.path()).unwrap();
    let text = String::from_utf8_lossy(&raw);
    assert!(!text.contains("AS-24-222222"));
    assert!(!text.contains("jdoe"));
}

#[test]
fn rescan_after_anonymize_is_clean() {
    let bytes = build_bigtiff(&[vec![Tag::ascii(TAG_XMP, ISCAN_XML)]]);
    let file = write_fixture(&bytes, "bif");

    let handler = BifHandler::new(PatternConfig::default());
    handler.anonymize(file.path()).expect("anonymize should succeed");
    let rescan = handler.scan(file.path());
    assert!(rescan.is_clean, "findings remained: {:?}", rescan.findings);
}

#[test]
fn classic_tiff_with_bif_extension_is_rejected() {
    // can_handle requires BigTIFF structure, not just the `.bif` extension.
    use crate::integration::fixtures::build_classic_tiff;
    let bytes = build_classic_tiff(&[vec![Tag::ascii(TAG_XMP, ISCAN_XML)]]);
    let file = write_fixture(&bytes, "bif");

    let handler = BifHandler::new(PatternConfig::default());
    assert!(!handler.can_handle(file.path()));
}

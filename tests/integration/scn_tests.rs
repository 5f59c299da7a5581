use crate::integration::fixtures::{build_classic_tiff, write_fixture, Tag};
use pathsafe::format::scn::ScnHandler;
use pathsafe::scanner::PatternConfig;
use pathsafe::FormatHandler;

const TAG_IMAGE_DESCRIPTION: u16 = 270;

const SCN_XML: &str = r#"<?xml version="1.0"?><scn><collection device="SCN400" uniqueID="abc-123"><image><creationDate>2024-06-15T10:30:00</creationDate><view><slideName>Case-001-A</slideName></view></image></collection></scn>"#;

#[test]
fn scan_finds_element_and_attribute_phi() {
    let bytes = build_classic_tiff(&[vec![Tag::ascii(TAG_IMAGE_DESCRIPTION, SCN_XML)]]);
    let file = write_fixture(&bytes, "scn");

    let handler = ScnHandler::new(PatternConfig::default());
    let result = handler.scan(file.path());

    assert!(!result.is_clean);
    let names: Vec<_> = result.findings.iter().map(|f| f.tag_name.as_str()).collect();
    assert!(names.iter().any(|n| n.contains("device")));
    assert!(names.iter().any(|n| n.contains("creationDate")));
    assert!(names.iter().any(|n| n.contains("slideName")));
}

#[test]
fn anonymize_preserves_byte_length_and_clears_phi() {
    let bytes = build_classic_tiff(&[vec![Tag::ascii(TAG_IMAGE_DESCRIPTION, SCN_XML)]]);
    let original_len = bytes.len();
    let file = write_fixture(&bytes, "scn");

    let handler = ScnHandler::new(PatternConfig::default());
    let cleared = handler.anonymize(file.path()).expect("anonymize should succeed");
    assert!(!cleared.is_empty());

    let after_len = std::fs::metadata(file.path()).unwrap().len() as usize;
    assert_eq!(after_len, original_len);

    let raw = std::fs::read(file.path()).unwrap();
    let text = String::from_utf8_lossy(&raw);
    assert!(!text.contains("SCN400"));
    assert!(!text.contains("Case-001-A"));
    assert!(text.contains("<?xml version=\"1.0\"?>"));
}

#[test]
fn rescan_after_anonymize_is_clean() {
    let bytes = build_classic_tiff(&[vec![Tag::ascii(TAG_IMAGE_DESCRIPTION, SCN_XML)]]);
    let file = write_fixture(&bytes, "scn");

    let handler = ScnHandler::new(PatternConfig::default());
    handler.anonymize(file.path()).expect("anonymize should succeed");
    let rescan = handler.scan(file.path());
    assert!(rescan.is_clean, "findings remained: {:?}", rescan.findings);
}

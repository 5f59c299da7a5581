use crate::integration::fixtures::{build_classic_tiff, write_fixture, Tag};
use pathsafe::format::ndpi::NdpiHandler;
use pathsafe::scanner::PatternConfig;
use pathsafe::{FindingSource, FormatHandler};

const TAG_DATE_TIME: u16 = 306;
const TAG_BARCODE: u16 = 65468;
const TAG_SOURCELENS: u16 = 65421;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;

#[test]
fn scan_finds_barcode_and_datetime() {
    let bytes = build_classic_tiff(&[vec![
        Tag::ascii(TAG_BARCODE, "AS-24-123456"),
        Tag::ascii(TAG_DATE_TIME, "2024:06:15 10:30:00"),
    ]]);
    let file = write_fixture(&bytes, "ndpi");

    let handler = NdpiHandler::new(PatternConfig::default());
    let result = handler.scan(file.path());

    assert!(!result.is_clean);
    assert!(result.findings.iter().any(|f| f.tag_name.contains("NDPI_BarCode")));
    assert!(result.findings.iter().any(|f| f.tag_id == Some(TAG_DATE_TIME)));
}

#[test]
fn anonymize_blanks_barcode_and_datetime_without_resizing() {
    let bytes = build_classic_tiff(&[vec![
        Tag::ascii(TAG_BARCODE, "AS-24-123456"),
        Tag::ascii(TAG_DATE_TIME, "2024:06:15 10:30:00"),
    ]]);
    let original_len = bytes.len();
    let file = write_fixture(&bytes, "ndpi");

    let handler = NdpiHandler::new(PatternConfig::default());
    let before = handler.scan(file.path());
    let barcode_finding = before
        .findings
        .iter()
        .find(|f| f.tag_name.contains("NDPI_BarCode"))
        .expect("scan should report the barcode tag");
    let barcode_offset = barcode_finding.offset as usize;
    let barcode_len = barcode_finding.length as usize;

    let cleared = handler.anonymize(file.path()).expect("anonymize should succeed");
    assert!(!cleared.is_empty());

    let after_len = std::fs::metadata(file.path()).unwrap().len() as usize;
    assert_eq!(after_len, original_len);

    // §6 wire contract: the barcode value becomes an equal-length 'X' run
    // with a trailing NUL, e.g. "XXXXXXXXXXXX\0" for a 13-byte tag.
    let after_bytes = std::fs::read(file.path()).unwrap();
    let barcode_region = &after_bytes[barcode_offset..barcode_offset + barcode_len];
    let mut expected = vec![b'X'; barcode_len];
    expected[barcode_len - 1] = 0;
    assert_eq!(barcode_region, expected.as_slice());

    let rescan = handler.scan(file.path());
    assert!(
        rescan.is_clean || rescan.findings.iter().all(|f| f.source == FindingSource::Filename)
    );
}

#[test]
fn macro_ifd_is_blanked_and_unlinked() {
    let diagnostic_ifd = vec![
        Tag::float(TAG_SOURCELENS, 1.0),
        Tag::long_array(TAG_STRIP_OFFSETS, &[0]),
        Tag::long_array(TAG_STRIP_BYTE_COUNTS, &[0]),
    ];
    let macro_ifd = vec![
        Tag::float(TAG_SOURCELENS, -1.0),
        Tag::long_array(TAG_STRIP_OFFSETS, &[0]),
        Tag::long_array(TAG_STRIP_BYTE_COUNTS, &[0]),
    ];
    let bytes = build_classic_tiff(&[diagnostic_ifd, macro_ifd]);
    let file = write_fixture(&bytes, "ndpi");

    let handler = NdpiHandler::new(PatternConfig::default());
    handler.anonymize(file.path()).expect("anonymize should succeed");

    // Walking the chain from the header should now reach only IFD #0: the
    // macro IFD is blanked and then unlinked, like every other handler.
    let info = handler.get_info(file.path()).expect("structure should parse");
    assert_eq!(info.ifd_count, 1);
}

#[test]
fn rerun_is_idempotent() {
    let bytes = build_classic_tiff(&[vec![
        Tag::ascii(TAG_BARCODE, "AS-24-123456"),
        Tag::ascii(TAG_DATE_TIME, "2024:06:15 10:30:00"),
    ]]);
    let file = write_fixture(&bytes, "ndpi");

    let handler = NdpiHandler::new(PatternConfig::default());
    let first = handler.anonymize(file.path()).expect("first anonymize");
    assert!(!first.is_empty());

    let first_bytes = std::fs::read(file.path()).unwrap();
    let second = handler.anonymize(file.path()).expect("second anonymize");
    assert!(second.is_empty());

    let second_bytes = std::fs::read(file.path()).unwrap();
    assert_eq!(first_bytes, second_bytes);
}

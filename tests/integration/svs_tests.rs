use crate::integration::fixtures::{build_classic_tiff, write_fixture, Tag};
use pathsafe::format::svs::SvsHandler;
use pathsafe::scanner::PatternConfig;
use pathsafe::FormatHandler;

const TAG_IMAGE_DESCRIPTION: u16 = 270;

const DESCRIPTION: &str = "Aperio Image Library v12.0.16\r\n1024x768 [0,0 1024x768] JPEG Q=70|AppMag = 40|ScanScope ID = SS1234|Filename = AS-24-999999.svs|Date = 06/15/24|Time = 10:30:00|User = jdoe@hospital.org|MPP = 0.2520";

#[test]
fn scan_finds_phi_fields_but_not_appmag_or_mpp() {
    let bytes = build_classic_tiff(&[vec![Tag::ascii(TAG_IMAGE_DESCRIPTION, DESCRIPTION)]]);
    let file = write_fixture(&bytes, "svs");

    let handler = SvsHandler::new(PatternConfig::default());
    let result = handler.scan(file.path());

    assert!(!result.is_clean);
    let labels: Vec<_> = result.findings.iter().map(|f| f.tag_name.as_str()).collect();
    assert!(labels.iter().any(|l| l.contains("ScanScope ID")));
    assert!(labels.iter().any(|l| l.contains("Filename")));
    assert!(labels.iter().any(|l| l.contains("User")));
    assert!(!labels.iter().any(|l| l.contains("AppMag")));
    assert!(!labels.iter().any(|l| l.contains("MPP")));
}

#[test]
fn anonymize_preserves_byte_length_and_non_phi_fields() {
    let bytes = build_classic_tiff(&[vec![Tag::ascii(TAG_IMAGE_DESCRIPTION, DESCRIPTION)]]);
    let original_len = bytes.len();
    let file = write_fixture(&bytes, "svs");

    let handler = SvsHandler::new(PatternConfig::default());
    let cleared = handler.anonymize(file.path()).expect("anonymize should succeed");
    assert!(!cleared.is_empty());

    let after_len = std::fs::metadata(file.path()).unwrap().len() as usize;
    assert_eq!(after_len, original_len);

    let raw = std::fs::read(file.path()).unwrap();
    let text = String::from_utf8_lossy(&raw);
    assert!(text.contains("AppMag = 40"));
    assert!(text.contains("MPP = 0.2520"));
    assert!(text.contains("Date = 01/01/00"));
    assert!(text.contains("Time = 00:00:00"));
    assert!(!text.contains("AS-24-999999.svs"));
    assert!(!text.contains("jdoe@hospital.org"));
}

#[test]
fn rescan_after_anonymize_is_clean() {
    let bytes = build_classic_tiff(&[vec![Tag::ascii(TAG_IMAGE_DESCRIPTION, DESCRIPTION)]]);
    let file = write_fixture(&bytes, "svs");

    let handler = SvsHandler::new(PatternConfig::default());
    handler.anonymize(file.path()).expect("anonymize should succeed");
    let rescan = handler.scan(file.path());
    assert!(rescan.is_clean, "findings remained: {:?}", rescan.findings);
}

//! Format handler selection (§4.4).
//!
//! Handlers are tried in a fixed order, most specific first. Vendor
//! handlers reject files whose structure doesn't match their format even
//! when the extension looks right; the generic handler accepts any file
//! that parses as a TIFF/BigTIFF container, so it always has the last
//! word.

use crate::format::base::FormatHandler;
use crate::format::bif::BifHandler;
use crate::format::generic_tiff::GenericTiffHandler;
use crate::format::ndpi::NdpiHandler;
use crate::format::scn::ScnHandler;
use crate::format::svs::SvsHandler;
use crate::scanner::PatternConfig;
use std::path::Path;

/// Owns one instance of every known handler and picks the first whose
/// `can_handle` accepts a given path.
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn FormatHandler>>,
}

impl HandlerRegistry {
    pub fn new(patterns: PatternConfig) -> Self {
        HandlerRegistry {
            handlers: vec![
                Box::new(NdpiHandler::new(patterns.clone())),
                Box::new(SvsHandler::new(patterns.clone())),
                Box::new(BifHandler::new(patterns.clone())),
                Box::new(ScnHandler::new(patterns.clone())),
                Box::new(GenericTiffHandler::new(patterns)),
            ],
        }
    }

    pub fn select(&self, path: &Path) -> Option<&dyn FormatHandler> {
        self.handlers
            .iter()
            .find(|h| h.can_handle(path))
            .map(|h| h.as_ref())
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        HandlerRegistry::new(PatternConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tiff(path: &Path) {
        let mut f = std::fs::File::create(path).unwrap();
        // Classic little-endian TIFF header with no IFD entries.
        f.write_all(&[0x49, 0x49, 42, 0, 8, 0, 0, 0]).unwrap();
        f.write_all(&[0, 0, 0, 0, 0, 0]).unwrap();
    }

    #[test]
    fn ndpi_extension_is_selected_over_generic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slide.ndpi");
        write_tiff(&path);
        let registry = HandlerRegistry::default();
        let handler = registry.select(&path).expect("a handler should match");
        assert_eq!(handler.format_name(), "ndpi");
    }

    #[test]
    fn unrecognized_extension_falls_back_to_generic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slide.tif");
        write_tiff(&path);
        let registry = HandlerRegistry::default();
        let handler = registry.select(&path).expect("a handler should match");
        assert_eq!(handler.format_name(), "generic_tiff");
    }

    #[test]
    fn non_tiff_file_matches_no_handler() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let registry = HandlerRegistry::default();
        assert!(registry.select(&path).is_none());
    }
}

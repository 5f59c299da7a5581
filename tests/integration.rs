//! Integration tests for PathSafe.
//!
//! These exercise each format handler end-to-end against in-memory TIFF
//! fixtures: PHI detection, in-place anonymization without resizing,
//! vendor-specific label/macro IFD policy, and rescan-is-clean idempotence.

mod integration {
    pub mod fixtures;

    pub mod bif_tests;
    pub mod generic_tiff_tests;
    pub mod ndpi_tests;
    pub mod pipeline_tests;
    pub mod scn_tests;
    pub mod svs_tests;
}

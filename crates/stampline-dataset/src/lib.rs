//! Stampline Dataset - ledger creation and image preparation
//!
//! The stages that run before annotation: scan an image folder into a
//! ledger, guess metadata from file names, and produce high-contrast
//! variants for OCR.

pub mod contrast;
pub mod heuristics;
pub mod scan;

// Re-exports
pub use contrast::{ContrastConfig, ContrastReport, output_identity, run_contrast};
pub use heuristics::{InfoReport, StampInfo, StampType, fill_info_column};
pub use scan::{ScanReport, find_images, merge_identities};

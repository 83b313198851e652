//! Image processing: raster primitives and reference-based change detection

pub mod raster;
pub mod change_detector;

pub use change_detector::{location_id, ChangeDetector, ChangeReport, Comparison, Metadata};
pub use raster::ChangeRegion;

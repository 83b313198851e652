//! Aerial Geolocation
//!
//! Locates ground targets from multiple drone bearing/elevation sightings and
//! detects visual change between captures of the same location cell.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod validation;
pub mod utils;
pub mod api;

// Re-export commonly used types
pub use crate::core::{Coordinates, DroneTelemetry, GeoPoint, Orientation};
pub use crate::algorithms::{
    coverage_radius_m, project_pixel, GroundFix, Observation, PositionEstimate, PrecisionMetrics,
    TriangulationEngine,
};
pub use crate::processing::{location_id, ChangeDetector, ChangeRegion, ChangeReport, Comparison, Metadata};
pub use crate::validation::{ChangeDetectionError, ConfigError, TriangulationError};
pub use crate::utils::{ChangeDetectionConfig, ConfigurationManager, LogLevel, SystemConfig};
pub use crate::api::{ChangeResponse, ErrorResult, GeoLocationApi, ObservationInput, ReferenceInput, ServiceState};

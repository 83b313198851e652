//! Core geolocation algorithms

pub mod triangulation;
pub mod ground_projection;

pub use triangulation::{Observation, PositionEstimate, PrecisionMetrics, TriangulationEngine};
pub use ground_projection::{project_pixel, coverage_radius_m, GroundFix};

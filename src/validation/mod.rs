//! Error reporting for the geolocation components

pub mod error;

pub use error::{ChangeDetectionError, ConfigError, TriangulationError};

//! Error taxonomy for the triangulation and change-detection components
//!
//! Insufficient-data conditions get their own variants so callers can branch
//! on them; undecodable images collapse into a single processing failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Triangulation failures
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TriangulationError {
    #[error("at least {required} observations are required (current: {available})")]
    InsufficientObservations {
        target_id: String,
        available: usize,
        required: usize,
    },
}

/// Change detection failures
#[derive(Error, Debug)]
pub enum ChangeDetectionError {
    #[error("reference location not found: {location_id}")]
    ReferenceNotFound { location_id: String },

    #[error("reference metadata must carry a timestamp")]
    MissingTimestamp,

    #[error("sensitivity must lie strictly between 0 and 1 (got {value})")]
    InvalidSensitivity { value: f64 },

    #[error("image is {current_width}x{current_height} but the reference is {reference_width}x{reference_height}")]
    DimensionMismatch {
        reference_width: u32,
        reference_height: u32,
        current_width: u32,
        current_height: u32,
    },

    #[error("image processing failed: {0}")]
    Processing(#[from] image::ImageError),
}

impl ChangeDetectionError {
    /// Whether the failure is a missing-data condition rather than bad input
    pub fn is_missing_reference(&self) -> bool {
        matches!(self, ChangeDetectionError::ReferenceNotFound { .. })
    }
}

/// Configuration failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {parameter}: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },

    #[error("configuration file error: {message}")]
    Io { message: String },

    #[error("configuration serialization error: {message}")]
    Serialization { message: String },
}

//! Wire-level input types and service state

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{Coordinates, GeoPoint};
use crate::processing::Metadata;

fn default_confidence() -> f64 {
    1.0
}

/// One sighting as received from the collaborator layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationInput {
    pub drone_position: GeoPoint,
    pub target_bearing: f64,
    pub target_elevation: f64,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

/// Reference registration request (the image bytes travel separately)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceInput {
    #[serde(flatten)]
    pub coordinates: Coordinates,
    pub metadata: Metadata,
}

/// Counters kept by the blocking facade
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    /// Positions successfully estimated
    pub positions_calculated: u64,
    /// Change comparisons completed
    pub change_checks: u64,
    /// Requests that returned an error result
    pub error_count: u64,
}

/// Change check answer: JSON figures plus the annotated JPEG when one was produced
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeResponse {
    /// Report JSON, or `{"error": ...}`
    pub body: Value,
    pub changes_image: Option<Vec<u8>>,
}

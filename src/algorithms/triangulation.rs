//! Multi-observation triangulation
//!
//! Each bearing/elevation sighting is turned into a ground point by pushing the
//! drone position out along the bearing by a range derived from the elevation.
//! The estimate is the confidence-weighted centroid of those points, not a ray
//! intersection: it stays defined for near-parallel rays and for two noisy
//! sightings.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::{
    unix_timestamp, DroneTelemetry, GeoPoint, EARTH_RADIUS_M, FALLBACK_DISTANCE_M,
    MAX_CONFIDENCE_PERCENT, MAX_DISTANCE_M, METERS_PER_DEGREE, MIN_OBSERVATIONS,
    PRECISION_REFERENCE_DEG, PRECISION_SATURATION_COUNT,
};
use crate::validation::TriangulationError;

/// One bearing/elevation sighting of a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// `{target_id}_{sequence_index}`
    pub id: String,
    pub drone_position: GeoPoint,
    /// Compass bearing to the target (degrees)
    pub target_bearing: f64,
    /// Elevation angle to the target (degrees, positive above horizon)
    pub target_elevation: f64,
    /// Sighting quality weight
    pub confidence: f64,
    /// Capture time (seconds since epoch)
    pub timestamp: f64,
}

impl Observation {
    /// Estimated line-of-sight range to the target (m)
    ///
    /// Sightings at or below the horizon cannot be ranged and fall back to a
    /// nominal distance. The result never exceeds [`MAX_DISTANCE_M`].
    pub fn line_of_sight_distance(&self) -> f64 {
        let elevation = self.target_elevation.to_radians();
        let distance = if elevation > 0.0 {
            self.drone_position.altitude / elevation.sin()
        } else {
            FALLBACK_DISTANCE_M
        };
        distance.min(MAX_DISTANCE_M)
    }

    /// Ground point seen by this observation, as (latitude, longitude) degrees
    pub fn projected_point(&self) -> Vector2<f64> {
        let distance = self.line_of_sight_distance();
        let bearing = self.target_bearing.to_radians();
        let lat = self.drone_position.latitude.to_radians();
        let lon = self.drone_position.longitude.to_radians();

        let angular = distance / EARTH_RADIUS_M;
        let target_lat = lat + angular * bearing.cos();
        let target_lon = lon + angular * bearing.sin() / lat.cos();

        Vector2::new(target_lat.to_degrees(), target_lon.to_degrees())
    }
}

/// Precision block of a position estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrecisionMetrics {
    /// Average deviation from the centroid (m)
    pub meters: f64,
    /// Confidence percentage in [0, 99]
    pub confidence: f64,
    /// Largest deviation from the centroid (m)
    pub max_deviation_meters: f64,
}

/// Estimated target position, recomputed on every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEstimate {
    pub target_id: String,
    /// Altitude is not estimated and is always 0
    pub position: GeoPoint,
    pub precision: PrecisionMetrics,
    pub observations_count: usize,
    pub timestamp: f64,
}

/// Confidence percentage for a given spread and observation count
///
/// Tight clusters and more observations raise the figure; the `tanh` term
/// saturates after three or four sightings.
pub fn confidence_percentage(avg_deviation_deg: f64, observation_count: usize) -> f64 {
    let spread = 1.0 - avg_deviation_deg / PRECISION_REFERENCE_DEG;
    let saturation = (observation_count as f64 / PRECISION_SATURATION_COUNT).tanh();
    let precision = 100.0 * spread * saturation;
    if precision.is_nan() {
        return 0.0;
    }
    precision.clamp(0.0, MAX_CONFIDENCE_PERCENT)
}

/// Per-target observation store and position estimator
///
/// Mutation goes through `&mut self`; callers sharing an engine across threads
/// wrap it in a lock (see [`crate::api::GeoLocationApi`]).
#[derive(Debug, Default)]
pub struct TriangulationEngine {
    targets: BTreeMap<String, Vec<Observation>>,
}

impl TriangulationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation, creating the target if needed
    ///
    /// Geometry is not validated; odd inputs only degrade the later estimate.
    pub fn add_observation(
        &mut self,
        target_id: &str,
        drone_position: GeoPoint,
        target_bearing: f64,
        target_elevation: f64,
        confidence: f64,
    ) -> String {
        let observations = self.targets.entry(target_id.to_string()).or_default();
        let id = format!("{}_{}", target_id, observations.len());

        observations.push(Observation {
            id: id.clone(),
            drone_position,
            target_bearing,
            target_elevation,
            confidence,
            timestamp: unix_timestamp(),
        });

        debug!(target_id, observation_id = %id, "observation added");
        id
    }

    /// Same as [`add_observation`](Self::add_observation), taking the drone
    /// position from a telemetry reading
    pub fn add_observation_from_telemetry(
        &mut self,
        target_id: &str,
        telemetry: &DroneTelemetry,
        target_bearing: f64,
        target_elevation: f64,
        confidence: f64,
    ) -> String {
        self.add_observation(target_id, telemetry.position, target_bearing, target_elevation, confidence)
    }

    /// Estimate the target position from all of its observations
    pub fn calculate_position(&self, target_id: &str) -> Result<PositionEstimate, TriangulationError> {
        let observations = self.observations(target_id).unwrap_or_default();
        if observations.len() < MIN_OBSERVATIONS {
            return Err(TriangulationError::InsufficientObservations {
                target_id: target_id.to_string(),
                available: observations.len(),
                required: MIN_OBSERVATIONS,
            });
        }

        let points: Vec<Vector2<f64>> = observations.iter().map(Observation::projected_point).collect();
        let weights = normalized_weights(observations);

        let centroid = points
            .iter()
            .zip(&weights)
            .fold(Vector2::<f64>::zeros(), |acc, (point, weight)| acc + point * *weight);

        let deviations: Vec<f64> = points.iter().map(|point| (point - centroid).norm()).collect();
        let max_deviation = deviations.iter().cloned().fold(0.0, f64::max);
        let avg_deviation = deviations.iter().sum::<f64>() / deviations.len() as f64;

        let estimate = PositionEstimate {
            target_id: target_id.to_string(),
            position: GeoPoint::new(centroid.x, centroid.y, 0.0),
            precision: PrecisionMetrics {
                meters: avg_deviation * METERS_PER_DEGREE,
                confidence: confidence_percentage(avg_deviation, observations.len()),
                max_deviation_meters: max_deviation * METERS_PER_DEGREE,
            },
            observations_count: observations.len(),
            timestamp: unix_timestamp(),
        };

        info!(
            target_id,
            latitude = estimate.position.latitude,
            longitude = estimate.position.longitude,
            confidence = estimate.precision.confidence,
            "position calculated"
        );
        Ok(estimate)
    }

    /// Discard all observations of a target; returns whether it existed
    pub fn reset_target(&mut self, target_id: &str) -> bool {
        let existed = self.targets.remove(target_id).is_some();
        if existed {
            info!(target_id, "target reset");
        }
        existed
    }

    /// Ids of every known target, including ones without observations
    pub fn get_all_targets(&self) -> Vec<String> {
        self.targets.keys().cloned().collect()
    }

    /// Allocate a fresh target id with an empty observation list
    pub fn create_target(&mut self) -> String {
        let target_id = loop {
            let candidate = format!("target_{}", &Uuid::new_v4().simple().to_string()[..8]);
            if !self.targets.contains_key(&candidate) {
                break candidate;
            }
        };
        self.targets.insert(target_id.clone(), Vec::new());
        info!(target_id = %target_id, "target created");
        target_id
    }

    pub fn observations(&self, target_id: &str) -> Option<&[Observation]> {
        self.targets.get(target_id).map(Vec::as_slice)
    }

    pub fn observation_count(&self, target_id: &str) -> usize {
        self.targets.get(target_id).map_or(0, Vec::len)
    }
}

/// Confidence weights scaled to sum to one; uniform when they sum to nothing
fn normalized_weights(observations: &[Observation]) -> Vec<f64> {
    let total: f64 = observations.iter().map(|o| o.confidence).sum();
    if total.is_finite() && total != 0.0 {
        observations.iter().map(|o| o.confidence / total).collect()
    } else {
        vec![1.0 / observations.len() as f64; observations.len()]
    }
}

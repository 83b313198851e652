//! Blocking, thread-safe facade over both engines
//!
//! Each table sits behind its own mutex, so a "count, then compute" request
//! on a target cannot interleave with a concurrent insert. Change checks hold
//! the reference table only long enough to take a [`Comparison`](crate::processing::Comparison) handle.

use parking_lot::Mutex;
use serde_json::Value;

use crate::algorithms::TriangulationEngine;
use crate::api::formatting::{change_result, position_result};
use crate::api::types::{ChangeResponse, ObservationInput, ReferenceInput, ServiceState};
use crate::processing::ChangeDetector;
use crate::utils::SystemConfig;
use crate::validation::ChangeDetectionError;

/// Shared entry point for request handlers
#[derive(Debug)]
pub struct GeoLocationApi {
    triangulation: Mutex<TriangulationEngine>,
    detector: Mutex<ChangeDetector>,
    state: Mutex<ServiceState>,
}

impl Default for GeoLocationApi {
    fn default() -> Self {
        Self {
            triangulation: Mutex::new(TriangulationEngine::new()),
            detector: Mutex::new(ChangeDetector::default()),
            state: Mutex::new(ServiceState::default()),
        }
    }
}

impl GeoLocationApi {
    /// Create the facade from a system configuration
    pub fn new(config: &SystemConfig) -> Result<Self, ChangeDetectionError> {
        Ok(Self {
            detector: Mutex::new(ChangeDetector::with_config(&config.change_detection)?),
            ..Self::default()
        })
    }

    pub fn add_observation(&self, target_id: &str, input: &ObservationInput) -> String {
        self.triangulation.lock().add_observation(
            target_id,
            input.drone_position,
            input.target_bearing,
            input.target_elevation,
            input.confidence,
        )
    }

    /// Position estimate JSON, or `{"error": ...}`
    pub fn calculate_position(&self, target_id: &str) -> Value {
        let result = self.triangulation.lock().calculate_position(target_id);
        self.record(result.is_ok(), |state| state.positions_calculated += 1);
        position_result(&result)
    }

    pub fn reset_target(&self, target_id: &str) -> bool {
        self.triangulation.lock().reset_target(target_id)
    }

    pub fn create_target(&self) -> String {
        self.triangulation.lock().create_target()
    }

    pub fn targets(&self) -> Vec<String> {
        self.triangulation.lock().get_all_targets()
    }

    pub fn add_reference_image(&self, image_bytes: &[u8], input: ReferenceInput) -> Result<String, ChangeDetectionError> {
        let result = self
            .detector
            .lock()
            .add_reference_image(image_bytes, input.coordinates, input.metadata);
        if result.is_err() {
            self.state.lock().error_count += 1;
        }
        result
    }

    /// Change report JSON, or `{"error": ...}`, with the annotated capture
    pub fn detect_changes(&self, image_bytes: &[u8], location_id: &str) -> ChangeResponse {
        let comparison = self.detector.lock().comparison(location_id);
        let result = comparison.and_then(|comparison| comparison.run(image_bytes));
        self.record(result.is_ok(), |state| state.change_checks += 1);
        ChangeResponse {
            body: change_result(&result),
            changes_image: result.ok().map(|report| report.changes_image),
        }
    }

    pub fn reference_image(&self, location_id: &str) -> Result<Option<Vec<u8>>, ChangeDetectionError> {
        self.detector.lock().get_reference_image(location_id)
    }

    pub fn remove_reference_image(&self, location_id: &str) -> bool {
        self.detector.lock().remove_reference_image(location_id)
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    fn record(&self, success: bool, on_success: impl FnOnce(&mut ServiceState)) {
        let mut state = self.state.lock();
        if success {
            on_success(&mut *state);
        } else {
            state.error_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Coordinates, GeoPoint};
    use crate::processing::Metadata;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::json;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::thread;

    fn observation(bearing: f64) -> ObservationInput {
        ObservationInput {
            drone_position: GeoPoint::new(40.0, -3.0, 50.0),
            target_bearing: bearing,
            target_elevation: 30.0,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_position_flow_and_counters() {
        let api = GeoLocationApi::default();
        let target = api.create_target();

        api.add_observation(&target, &observation(0.0));
        assert!(api.calculate_position(&target).get("error").is_some());

        api.add_observation(&target, &observation(0.0));
        let value = api.calculate_position(&target);
        assert_eq!(value["observations_count"], 2);

        assert_eq!(
            api.state(),
            ServiceState { positions_calculated: 1, change_checks: 0, error_count: 1 }
        );
        assert!(api.reset_target(&target));
        assert!(api.targets().is_empty());
    }

    #[test]
    fn test_concurrent_observations() {
        let api = Arc::new(GeoLocationApi::default());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let api = Arc::clone(&api);
                thread::spawn(move || {
                    for _ in 0..25 {
                        api.add_observation("shared", &observation(i as f64));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(api.calculate_position("shared")["observations_count"], 100);
    }

    #[test]
    fn test_change_flow() {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([80, 90, 100])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let api = GeoLocationApi::new(&SystemConfig::default()).unwrap();
        let mut metadata = Metadata::new();
        metadata.insert("timestamp".to_string(), json!("2024-05-01T10:00:00Z"));
        let id = api
            .add_reference_image(&bytes, ReferenceInput { coordinates: Coordinates::new(1.0, 2.0), metadata })
            .unwrap();

        let response = api.detect_changes(&bytes, &id);
        assert_eq!(response.body["has_changes"], false);
        assert_eq!(response.body["timestamp"], "2024-05-01T10:00:00Z");
        assert!(response.body.get("changes_image").is_none());
        let image = response.changes_image.unwrap();
        assert_eq!(image::load_from_memory(&image).unwrap().width(), 64);

        let missing = api.detect_changes(&bytes, "missing");
        assert!(missing.body.get("error").is_some());
        assert!(missing.changes_image.is_none());
        assert!(api.reference_image(&id).unwrap().is_some());
        assert!(api.remove_reference_image(&id));
        assert_eq!(api.state().change_checks, 1);
        assert_eq!(api.state().error_count, 1);
    }
}

//! Reference-based change detection for location cells
//!
//! One blurred grayscale reference is kept per cell key. A new capture of the
//! same cell goes through the same smoothing, is differenced against the
//! reference, thresholded and dilated; the surviving external regions are
//! boxed on a copy of the capture.

use image::{GrayImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::{
    Coordinates, BLUR_KERNEL_SIZE, DEFAULT_SENSITIVITY, DIFF_THRESHOLD, DILATION_ITERATIONS,
    MIN_REGION_FRACTION,
};
use crate::processing::raster::{self, ChangeRegion};
use crate::utils::config::ChangeDetectionConfig;
use crate::validation::ChangeDetectionError;

/// Free-form metadata attached to a reference; must contain `timestamp`
pub type Metadata = Map<String, Value>;

/// Stored baseline for one location cell
#[derive(Debug)]
struct ReferenceImage {
    blurred: GrayImage,
    original: RgbImage,
    metadata: Metadata,
    coordinates: Coordinates,
}

impl ReferenceImage {
    fn timestamp(&self) -> Value {
        self.metadata.get("timestamp").cloned().unwrap_or(Value::Null)
    }
}

/// Result of comparing a capture with its cell reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub location_id: String,
    pub has_changes: bool,
    /// Share of thresholded pixels, 0-100
    pub change_percentage: f64,
    pub significant_areas: usize,
    /// Capture with changed regions boxed, JPEG-encoded; kept out of JSON
    #[serde(skip)]
    pub changes_image: Vec<u8>,
    /// Timestamp stored with the reference
    pub timestamp: Value,
    pub regions: Vec<ChangeRegion>,
}

/// Cell key for a pair of coordinates, five decimals each (~1 m)
pub fn location_id(coordinates: &Coordinates) -> String {
    format!("{:.5}_{:.5}", coordinates.latitude, coordinates.longitude)
}

/// Change detector owning the per-cell reference table
#[derive(Debug)]
pub struct ChangeDetector {
    sensitivity: f64,
    jpeg_quality: u8,
    annotation_color: Rgb<u8>,
    references: HashMap<String, Arc<ReferenceImage>>,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        let config = ChangeDetectionConfig::default();
        Self {
            sensitivity: DEFAULT_SENSITIVITY,
            jpeg_quality: config.jpeg_quality,
            annotation_color: Rgb(config.annotation_color),
            references: HashMap::new(),
        }
    }
}

impl ChangeDetector {
    /// Create a detector flagging changes above `sensitivity` of the frame
    pub fn new(sensitivity: f64) -> Result<Self, ChangeDetectionError> {
        if !(sensitivity > 0.0 && sensitivity < 1.0) {
            return Err(ChangeDetectionError::InvalidSensitivity { value: sensitivity });
        }
        Ok(Self {
            sensitivity,
            ..Self::default()
        })
    }

    pub fn with_config(config: &ChangeDetectionConfig) -> Result<Self, ChangeDetectionError> {
        let mut detector = Self::new(config.sensitivity)?;
        detector.jpeg_quality = config.jpeg_quality.clamp(1, 100);
        detector.annotation_color = Rgb(config.annotation_color);
        Ok(detector)
    }

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    /// Store `image_bytes` as the reference for the cell at `coordinates`
    ///
    /// Replaces any previous reference of the same cell.
    pub fn add_reference_image(
        &mut self,
        image_bytes: &[u8],
        coordinates: Coordinates,
        metadata: Metadata,
    ) -> Result<String, ChangeDetectionError> {
        if !metadata.contains_key("timestamp") {
            return Err(ChangeDetectionError::MissingTimestamp);
        }

        let image = raster::decode(image_bytes)?;
        let blurred = raster::smoothed_grayscale(&image, BLUR_KERNEL_SIZE);
        let key = location_id(&coordinates);

        let replaced = self
            .references
            .insert(
                key.clone(),
                Arc::new(ReferenceImage {
                    blurred,
                    original: image.to_rgb8(),
                    metadata,
                    coordinates,
                }),
            )
            .is_some();

        info!(location_id = %key, replaced, "reference image stored");
        Ok(key)
    }

    /// Compare a new capture against the stored reference of `location_id`
    pub fn detect_changes(&self, image_bytes: &[u8], location_id: &str) -> Result<ChangeReport, ChangeDetectionError> {
        self.comparison(location_id)?.run(image_bytes)
    }

    /// Detached comparison against the reference of `location_id`
    ///
    /// The returned value shares the stored reference, so the decode and
    /// pixel work of [`Comparison::run`] need no access to the table.
    pub fn comparison(&self, location_id: &str) -> Result<Comparison, ChangeDetectionError> {
        let reference = self
            .references
            .get(location_id)
            .ok_or_else(|| ChangeDetectionError::ReferenceNotFound {
                location_id: location_id.to_string(),
            })?;

        Ok(Comparison {
            location_id: location_id.to_string(),
            reference: Arc::clone(reference),
            sensitivity: self.sensitivity,
            jpeg_quality: self.jpeg_quality,
            annotation_color: self.annotation_color,
        })
    }

    /// Original (unblurred) reference re-encoded as JPEG, if the cell has one
    pub fn get_reference_image(&self, location_id: &str) -> Result<Option<Vec<u8>>, ChangeDetectionError> {
        match self.references.get(location_id) {
            Some(reference) => Ok(Some(raster::encode_jpeg(&reference.original, self.jpeg_quality)?)),
            None => Ok(None),
        }
    }

    /// Drop the reference of a cell; returns whether it existed
    pub fn remove_reference_image(&mut self, location_id: &str) -> bool {
        let existed = self.references.remove(location_id).is_some();
        if existed {
            info!(location_id, "reference image removed");
        }
        existed
    }

    pub fn reference_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.references.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn reference_metadata(&self, location_id: &str) -> Option<&Metadata> {
        self.references.get(location_id).map(|r| &r.metadata)
    }

    pub fn reference_coordinates(&self, location_id: &str) -> Option<Coordinates> {
        self.references.get(location_id).map(|r| r.coordinates)
    }
}

/// Comparison of captures against one cell reference
#[derive(Debug, Clone)]
pub struct Comparison {
    location_id: String,
    reference: Arc<ReferenceImage>,
    sensitivity: f64,
    jpeg_quality: u8,
    annotation_color: Rgb<u8>,
}

impl Comparison {
    pub fn location_id(&self) -> &str {
        &self.location_id
    }

    /// Decode `image_bytes` and report what changed relative to the reference
    pub fn run(&self, image_bytes: &[u8]) -> Result<ChangeReport, ChangeDetectionError> {
        let baseline = &self.reference.blurred;
        let current = raster::decode(image_bytes)?;
        if current.width() != baseline.width() || current.height() != baseline.height() {
            return Err(ChangeDetectionError::DimensionMismatch {
                reference_width: baseline.width(),
                reference_height: baseline.height(),
                current_width: current.width(),
                current_height: current.height(),
            });
        }

        let blurred = raster::smoothed_grayscale(&current, BLUR_KERNEL_SIZE);
        let delta = raster::absolute_difference(baseline, &blurred);
        let mask = raster::binary_mask(&delta, DIFF_THRESHOLD);
        let dilated = raster::dilate_mask(&mask, DILATION_ITERATIONS);

        let total_pixels = u64::from(mask.width()) * u64::from(mask.height());
        let min_area = total_pixels as f64 * MIN_REGION_FRACTION;
        let regions = raster::external_regions(&dilated, min_area);

        let change_percentage = if total_pixels == 0 {
            0.0
        } else {
            raster::count_set_pixels(&mask) as f64 / total_pixels as f64 * 100.0
        };
        let has_changes = change_percentage > self.sensitivity * 100.0;

        let annotated = raster::annotate(&current.to_rgb8(), &regions, self.annotation_color);
        let changes_image = raster::encode_jpeg(&annotated, self.jpeg_quality)?;

        debug!(location_id = %self.location_id, regions = regions.len(), "change regions extracted");
        info!(location_id = %self.location_id, change_percentage, has_changes, "change detection completed");

        Ok(ChangeReport {
            location_id: self.location_id.clone(),
            has_changes,
            change_percentage,
            significant_areas: regions.len(),
            changes_image,
            timestamp: self.reference.timestamp(),
            regions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat};
    use serde_json::json;
    use std::io::Cursor;

    const SIZE: u32 = 200;

    fn png_bytes(image: RgbImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn flat_scene() -> RgbImage {
        RgbImage::from_pixel(SIZE, SIZE, Rgb([100, 100, 100]))
    }

    /// Flat scene with a bright square of `side` pixels at (60, 60)
    fn scene_with_block(side: u32) -> RgbImage {
        let mut image = flat_scene();
        for y in 60..60 + side {
            for x in 60..60 + side {
                image.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        image
    }

    fn scene_with_block_at(mut image: RgbImage, x0: u32, y0: u32, side: u32, color: Rgb<u8>) -> RgbImage {
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                image.put_pixel(x, y, color);
            }
        }
        image
    }

    /// Smoothly varying colored scene, closer to aerial imagery than a flat fill
    fn textured_scene() -> RgbImage {
        RgbImage::from_fn(SIZE, SIZE, |x, y| {
            let (fx, fy) = (x as f64, y as f64);
            Rgb([
                (128.0 + 50.0 * (fx / 9.0).sin() + 30.0 * (fy / 7.0).cos()) as u8,
                (128.0 + 40.0 * ((fx + fy) / 11.0).sin()) as u8,
                (100.0 + 60.0 * (fx / 13.0).cos()) as u8,
            ])
        })
    }

    fn metadata(timestamp: f64) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("timestamp".to_string(), json!(timestamp));
        metadata
    }

    fn cell() -> Coordinates {
        Coordinates::new(40.416775, -3.703790)
    }

    #[test]
    fn test_location_id_format() {
        assert_eq!(location_id(&cell()), "40.41678_-3.70379");
        assert_eq!(location_id(&Coordinates::new(1.0, 2.5)), "1.00000_2.50000");
    }

    #[test]
    fn test_sensitivity_bounds() {
        assert!(ChangeDetector::new(0.2).is_ok());
        assert!(matches!(ChangeDetector::new(0.0), Err(ChangeDetectionError::InvalidSensitivity { .. })));
        assert!(ChangeDetector::new(1.0).is_err());
        assert!(ChangeDetector::new(f64::NAN).is_err());
        assert_eq!(ChangeDetector::default().sensitivity(), 0.2);
    }

    #[test]
    fn test_identical_image_reports_no_change() {
        let mut detector = ChangeDetector::default();
        let bytes = png_bytes(scene_with_block(30));
        let id = detector.add_reference_image(&bytes, cell(), metadata(1700000000.0)).unwrap();

        let report = detector.detect_changes(&bytes, &id).unwrap();
        assert_eq!(report.location_id, id);
        assert_eq!(report.change_percentage, 0.0);
        assert!(!report.has_changes);
        assert_eq!(report.significant_areas, 0);
        assert_eq!(report.timestamp, json!(1700000000.0));
        assert!(raster::decode(&report.changes_image).is_ok());
    }

    #[test]
    fn test_missing_reference_is_structured() {
        let detector = ChangeDetector::default();
        let err = detector.detect_changes(b"irrelevant", "0.00000_0.00000").unwrap_err();
        assert!(err.is_missing_reference());
    }

    #[test]
    fn test_small_block_change_below_sensitivity() {
        let mut detector = ChangeDetector::default();
        let id = detector
            .add_reference_image(&png_bytes(flat_scene()), cell(), metadata(1.0))
            .unwrap();

        // 45 x 45 px is ~5% of a 200 x 200 frame
        let report = detector.detect_changes(&png_bytes(scene_with_block(45)), &id).unwrap();
        assert!(report.significant_areas >= 1);
        assert!(report.change_percentage > 3.0, "got {}", report.change_percentage);
        assert!(report.change_percentage < 12.0, "got {}", report.change_percentage);
        assert!(!report.has_changes);

        let region = report.regions[0];
        assert!(region.x <= 60 && region.y <= 60);
        assert!(region.x + region.width >= 105 && region.y + region.height >= 105);
    }

    #[test]
    fn test_large_change_is_flagged() {
        let mut detector = ChangeDetector::new(0.2).unwrap();
        let id = detector
            .add_reference_image(&png_bytes(flat_scene()), cell(), metadata(1.0))
            .unwrap();

        let report = detector.detect_changes(&png_bytes(scene_with_block(120)), &id).unwrap();
        assert!(report.change_percentage > 20.0);
        assert!(report.has_changes);
        assert_eq!(report.significant_areas, 1);
    }

    #[test]
    fn test_reference_requires_timestamp() {
        let mut detector = ChangeDetector::default();
        let result = detector.add_reference_image(&png_bytes(flat_scene()), cell(), Metadata::new());
        assert!(matches!(result, Err(ChangeDetectionError::MissingTimestamp)));
        assert!(detector.reference_ids().is_empty());
    }

    #[test]
    fn test_corrupt_bytes_are_processing_errors() {
        let mut detector = ChangeDetector::default();
        let result = detector.add_reference_image(b"garbage", cell(), metadata(1.0));
        assert!(matches!(result, Err(ChangeDetectionError::Processing(_))));

        let id = detector
            .add_reference_image(&png_bytes(flat_scene()), cell(), metadata(1.0))
            .unwrap();
        assert!(matches!(
            detector.detect_changes(b"garbage", &id),
            Err(ChangeDetectionError::Processing(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut detector = ChangeDetector::default();
        let id = detector
            .add_reference_image(&png_bytes(flat_scene()), cell(), metadata(1.0))
            .unwrap();
        let smaller = png_bytes(RgbImage::from_pixel(50, 50, Rgb([100, 100, 100])));
        assert!(matches!(
            detector.detect_changes(&smaller, &id),
            Err(ChangeDetectionError::DimensionMismatch { current_width: 50, .. })
        ));
    }

    #[test]
    fn test_reference_overwrite_and_removal() {
        let mut detector = ChangeDetector::default();
        let first = detector
            .add_reference_image(&png_bytes(flat_scene()), cell(), metadata(1.0))
            .unwrap();
        let second = detector
            .add_reference_image(&png_bytes(scene_with_block(120)), cell(), metadata(2.0))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(detector.reference_ids(), vec![first.clone()]);
        assert_eq!(detector.reference_metadata(&first).unwrap()["timestamp"], json!(2.0));
        assert_eq!(detector.reference_coordinates(&first), Some(cell()));

        // The overwritten reference now matches the block scene
        let report = detector.detect_changes(&png_bytes(scene_with_block(120)), &first).unwrap();
        assert_eq!(report.change_percentage, 0.0);

        let stored = detector.get_reference_image(&first).unwrap().unwrap();
        let decoded = raster::decode(&stored).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (SIZE, SIZE));

        assert!(detector.remove_reference_image(&first));
        assert!(!detector.remove_reference_image(&first));
        assert!(detector.get_reference_image(&first).unwrap().is_none());
    }

    #[test]
    fn test_changes_touching_frame_edges_are_boxed() {
        let white = Rgb([250, 250, 250]);
        let mut detector = ChangeDetector::default();
        let id = detector
            .add_reference_image(&png_bytes(flat_scene()), cell(), metadata(1.0))
            .unwrap();

        let placements = [(0, 0), (0, 85), (85, 0), (170, 85), (85, 170), (170, 170)];
        for (x0, y0) in placements {
            let current = png_bytes(scene_with_block_at(flat_scene(), x0, y0, 30, white));
            let report = detector.detect_changes(&current, &id).unwrap();
            assert_eq!(report.significant_areas, 1, "block at ({x0}, {y0})");

            let region = report.regions[0];
            if x0 == 0 {
                assert_eq!(region.x, 0);
            }
            if y0 == 0 {
                assert_eq!(region.y, 0);
            }
            if x0 == 170 {
                assert_eq!(region.x + region.width, SIZE);
            }
            if y0 == 170 {
                assert_eq!(region.y + region.height, SIZE);
            }
        }
    }

    #[test]
    fn test_jpeg_recompression_of_textured_scene_is_not_a_change() {
        let scene = textured_scene();
        let mut detector = ChangeDetector::default();
        let id = detector
            .add_reference_image(&png_bytes(scene.clone()), cell(), metadata(1.0))
            .unwrap();

        let recompressed = raster::encode_jpeg(&scene, 90).unwrap();
        let report = detector.detect_changes(&recompressed, &id).unwrap();
        assert!(report.change_percentage < 0.5, "got {}", report.change_percentage);
        assert_eq!(report.significant_areas, 0);
        assert!(!report.has_changes);

        let altered = scene_with_block_at(scene, 100, 100, 50, Rgb([0, 0, 0]));
        let report = detector
            .detect_changes(&raster::encode_jpeg(&altered, 90).unwrap(), &id)
            .unwrap();
        assert_eq!(report.significant_areas, 1);
        let region = report.regions[0];
        assert!(region.x <= 100 && region.y <= 100);
        assert!(region.x + region.width >= 150 && region.y + region.height >= 150);
    }

    #[test]
    fn test_comparison_outlives_table_entry() {
        let mut detector = ChangeDetector::default();
        let id = detector
            .add_reference_image(&png_bytes(flat_scene()), cell(), metadata(7.0))
            .unwrap();

        let comparison = detector.comparison(&id).unwrap();
        assert!(detector.remove_reference_image(&id));
        assert!(detector.comparison(&id).unwrap_err().is_missing_reference());

        let report = comparison.run(&png_bytes(scene_with_block(120))).unwrap();
        assert_eq!(comparison.location_id(), id);
        assert!(report.has_changes);
        assert_eq!(report.timestamp, json!(7.0));
    }

    #[test]
    fn test_report_json_leaves_out_image_bytes() {
        let mut detector = ChangeDetector::default();
        let bytes = png_bytes(flat_scene());
        let id = detector.add_reference_image(&bytes, cell(), metadata(1.0)).unwrap();
        let report = detector.detect_changes(&bytes, &id).unwrap();
        assert!(!report.changes_image.is_empty());

        let value = serde_json::to_value(&report).unwrap();
        assert!(value.get("changes_image").is_none());
        assert_eq!(value["significant_areas"], 0);
    }
}

//! Pixel-to-ground heuristic
//!
//! Maps an image pixel offset to an approximate ground coordinate using only
//! the drone altitude and yaw. There is no lens or calibration model here;
//! the scale factors are coarse and the accuracy figure is correspondingly
//! pessimistic.

use serde::{Deserialize, Serialize};

use crate::core::DroneTelemetry;

/// Ground coverage grows with altitude at this ratio (m of radius per m of altitude)
pub const COVERAGE_RADIUS_PER_ALTITUDE: f64 = 0.5;

/// Meters-per-pixel scale per meter of altitude
const PIXEL_SCALE_PER_ALTITUDE: f64 = 1.0 / 1000.0;

/// Degrees per scaled pixel unit
const DEGREES_PER_SCALED_PIXEL: f64 = 0.00001;

/// Accuracy estimate multiplier applied to the pixel scale
const ACCURACY_PER_SCALE: f64 = 10.0;

/// Approximate ground location of an image pixel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub accuracy_meters: f64,
}

/// Radius of ground visible from a given altitude (m)
pub fn coverage_radius_m(altitude: f64) -> f64 {
    altitude * COVERAGE_RADIUS_PER_ALTITUDE
}

/// Project a pixel offset `(x, y)` to the ground below the drone
///
/// The offset is rotated by the drone yaw; image y grows downward, so it is
/// subtracted from the latitude.
pub fn project_pixel(pixel: (f64, f64), telemetry: &DroneTelemetry) -> GroundFix {
    let (x, y) = pixel;
    let position = telemetry.position;
    let scale = position.altitude * PIXEL_SCALE_PER_ALTITUDE;

    let (sin_yaw, cos_yaw) = telemetry.orientation.yaw.to_radians().sin_cos();
    let x_rotated = x * cos_yaw - y * sin_yaw;
    let y_rotated = x * sin_yaw + y * cos_yaw;

    let lat_offset = y_rotated * scale * DEGREES_PER_SCALED_PIXEL;
    let lon_offset = x_rotated * scale * DEGREES_PER_SCALED_PIXEL;

    GroundFix {
        latitude: position.latitude - lat_offset,
        longitude: position.longitude + lon_offset,
        altitude: position.altitude,
        accuracy_meters: scale * ACCURACY_PER_SCALE,
    }
}

//! Physical constants and fixed pipeline parameters

/// Mean Earth radius used by the flat-Earth projection (m)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Approximate length of one degree of latitude (m)
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Minimum number of observations before a target can be located
pub const MIN_OBSERVATIONS: usize = 2;

/// Line-of-sight distance assumed when the elevation cannot resolve range (m)
pub const FALLBACK_DISTANCE_M: f64 = 1_000.0;

/// Upper bound on any per-observation line-of-sight distance (m)
pub const MAX_DISTANCE_M: f64 = 10_000.0;

/// Spread (degrees) at which the confidence figure reaches zero
pub const PRECISION_REFERENCE_DEG: f64 = 0.001;

/// Observation count divisor inside the confidence saturation term
pub const PRECISION_SATURATION_COUNT: f64 = 3.0;

/// Ceiling of the reported confidence percentage
pub const MAX_CONFIDENCE_PERCENT: f64 = 99.0;

/// Side of the square smoothing kernel applied before differencing (px)
pub const BLUR_KERNEL_SIZE: u32 = 21;

/// Intensity difference above which a pixel counts as changed
pub const DIFF_THRESHOLD: u8 = 25;

/// 3x3 dilation passes applied to the change mask
pub const DILATION_ITERATIONS: u32 = 2;

/// Minimum region area as a fraction of the frame area
pub const MIN_REGION_FRACTION: f64 = 0.005;

/// Default change sensitivity (fraction of the frame)
pub const DEFAULT_SENSITIVITY: f64 = 0.2;

/// Default JPEG quality for re-encoded images
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

//! Raster primitives for the change-detection pipeline
//!
//! Thin wrappers over `image`/`imageproc` that pin the pipeline constants:
//! grayscale, blur, absolute difference, threshold, dilation, external
//! contours, bounding boxes and annotation.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageResult, Luma, Rgb, RgbImage};
use imageproc::contours::find_contours;
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;
use imageproc::point::Point;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box of a changed region, with the enclosed contour area
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChangeRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Polygon area of the region's outer contour (px²)
    pub area: f64,
}

/// Decode JPEG/PNG bytes
pub fn decode(bytes: &[u8]) -> ImageResult<DynamicImage> {
    image::load_from_memory(bytes)
}

/// Gaussian sigma matching a square kernel of the given side
///
/// Uses the usual `0.3 * ((k - 1) / 2 - 1) + 0.8` rule, so a 21 px kernel
/// yields sigma 3.5.
pub fn sigma_for_kernel(kernel_size: u32) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// BT.601 luma (`0.299 R + 0.587 G + 0.114 B`), rounded; not the BT.709 of `to_luma8`
pub fn grayscale(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let weighted = 299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b);
        Luma([((weighted + 500) / 1000) as u8])
    })
}

/// Grayscale conversion followed by the smoothing blur
pub fn smoothed_grayscale(image: &DynamicImage, kernel_size: u32) -> GrayImage {
    gaussian_blur_f32(&grayscale(&image.to_rgb8()), sigma_for_kernel(kernel_size))
}

/// Per-pixel `|a - b|`; both images must share dimensions
pub fn absolute_difference(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y)[0].abs_diff(b.get_pixel(x, y)[0])])
    })
}

/// Binary mask: 255 where the intensity exceeds `cutoff`, 0 elsewhere
pub fn binary_mask(image: &GrayImage, cutoff: u8) -> GrayImage {
    threshold(image, cutoff, ThresholdType::Binary)
}

/// Repeated 3x3 dilation
pub fn dilate_mask(mask: &GrayImage, iterations: u32) -> GrayImage {
    (0..iterations).fold(mask.clone(), |current, _| dilate(&current, Norm::LInf, 1))
}

/// Number of non-zero pixels
pub fn count_set_pixels(mask: &GrayImage) -> u64 {
    mask.pixels().filter(|p| p[0] > 0).count() as u64
}

/// Outermost connected regions of a mask whose contour area exceeds `min_area`
///
/// The mask is traced inside a one-pixel empty frame so blobs touching the
/// image border still get an outer contour.
pub fn external_regions(mask: &GrayImage, min_area: f64) -> Vec<ChangeRegion> {
    let framed = with_empty_border(mask);
    find_contours::<u32>(&framed)
        .into_iter()
        .filter(|contour| contour.parent.is_none())
        .filter_map(|contour| {
            let points: Vec<Point<u32>> = contour
                .points
                .iter()
                .map(|p| Point::new(p.x.saturating_sub(1), p.y.saturating_sub(1)))
                .collect();
            let area = polygon_area(&points);
            if area > min_area {
                bounding_box(&points).map(|(x, y, width, height)| ChangeRegion { x, y, width, height, area })
            } else {
                None
            }
        })
        .collect()
}

/// Copy of `mask` surrounded by a one-pixel border of zeros
fn with_empty_border(mask: &GrayImage) -> GrayImage {
    let mut framed = GrayImage::new(mask.width() + 2, mask.height() + 2);
    for (x, y, pixel) in mask.enumerate_pixels() {
        framed.put_pixel(x + 1, y + 1, *pixel);
    }
    framed
}

/// Shoelace area of a closed polygon
pub fn polygon_area(points: &[Point<u32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice_area: f64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64)
        .sum();
    twice_area.abs() / 2.0
}

/// Inclusive bounding box `(x, y, width, height)` of a point set
fn bounding_box(points: &[Point<u32>]) -> Option<(u32, u32, u32, u32)> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for point in points {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }
    Some((min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

/// Copy of `image` with a two-pixel rectangle around each region
pub fn annotate(image: &RgbImage, regions: &[ChangeRegion], color: Rgb<u8>) -> RgbImage {
    let mut canvas = image.clone();
    for region in regions {
        let outer = Rect::at(region.x as i32, region.y as i32).of_size(region.width, region.height);
        draw_hollow_rect_mut(&mut canvas, outer, color);
        if region.width > 2 && region.height > 2 {
            let inner = Rect::at(region.x as i32 + 1, region.y as i32 + 1)
                .of_size(region.width - 2, region.height - 2);
            draw_hollow_rect_mut(&mut canvas, inner, color);
        }
    }
    canvas
}

/// JPEG-encode an RGB image
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> ImageResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder.encode_image(image)?;
    Ok(buffer)
}

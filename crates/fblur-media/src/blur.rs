//! Region blurring for non-owner faces.
//!
//! The blurred region is the detection box expanded outward (stronger
//! levels widen it further), smoothed with one or more gaussian passes,
//! and composited back through an elliptical mask so only the face oval
//! is obscured rather than a hard rectangle.

use image::imageops;
use image::RgbImage;

use fblur_models::{BlurLevel, BoundingBox};

/// Hard cap on how far the region may expand beyond the detection box.
const MAX_EXPAND_RATIO: f64 = 0.35;

/// Blur one region of an RGB24 frame buffer in place.
///
/// Returns `false` when the region degenerates to nothing after
/// clamping; that is not an error, the frame is simply left untouched.
pub fn apply_blur(
    frame: &mut [u8],
    width: u32,
    height: u32,
    bbox: &BoundingBox,
    level: BlurLevel,
    base_expand: f64,
) -> bool {
    let region = bbox
        .expand(expand_ratio(level, base_expand))
        .clamp(width, height);

    let x = region.x as u32;
    let y = region.y as u32;
    let rw = region.width as u32;
    let rh = region.height as u32;
    if rw < 2 || rh < 2 {
        return false;
    }

    // Copy the region out into an image buffer
    let stride = width as usize * 3;
    let mut region_data = Vec::with_capacity(rw as usize * rh as usize * 3);
    for row in 0..rh {
        let src = (y + row) as usize * stride + x as usize * 3;
        region_data.extend_from_slice(&frame[src..src + rw as usize * 3]);
    }
    let Some(patch) = RgbImage::from_raw(rw, rh, region_data) else {
        return false;
    };

    // Stronger levels get a larger sigma and extra passes
    let sigma = sigma_for_region(rw, rh, level);
    let mut blurred = imageops::blur(&patch, sigma);
    for _ in 1..pass_count(level) {
        blurred = imageops::blur(&blurred, sigma);
    }

    // Composite back through an elliptical mask
    let cx = (rw as f64 - 1.0) / 2.0;
    let cy = (rh as f64 - 1.0) / 2.0;
    let rx = (rw as f64 / 2.0).max(1.0);
    let ry = (rh as f64 / 2.0).max(1.0);

    let blurred_raw = blurred.as_raw();
    for row in 0..rh {
        for col in 0..rw {
            let dx = (col as f64 - cx) / rx;
            let dy = (row as f64 - cy) / ry;
            if dx * dx + dy * dy <= 1.0 {
                let dst = (y + row) as usize * stride + (x + col) as usize * 3;
                let src = (row * rw + col) as usize * 3;
                frame[dst..dst + 3].copy_from_slice(&blurred_raw[src..src + 3]);
            }
        }
    }

    true
}

/// Region expansion ratio for a blur level.
fn expand_ratio(level: BlurLevel, base_expand: f64) -> f64 {
    let extra = (level.get().saturating_sub(1)) as f64 * 0.01;
    (base_expand + extra).min(MAX_EXPAND_RATIO)
}

/// Number of gaussian passes; levels 5 and up add extra passes.
fn pass_count(level: BlurLevel) -> u32 {
    1 + (level.get().saturating_sub(5) as u32) / 2
}

/// Gaussian sigma scaled to region size and blur level.
fn sigma_for_region(rw: u32, rh: u32, level: BlurLevel) -> f32 {
    let base = rw.max(rh) as f32;
    let strength = 0.18 + level.get() as f32 / 12.0;
    // Equivalent kernel would be roughly 6 sigma wide
    (strength * base / 6.0).clamp(1.5, 25.0)
}

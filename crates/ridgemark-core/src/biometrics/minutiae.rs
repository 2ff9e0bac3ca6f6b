use std::cmp::Ordering;

use image::imageops;

use crate::biometrics::imaging::{intensities, mean_and_std, sobel, GradientField};
use crate::biometrics::types::{Minutia, RidgeImage};
use crate::config::NeighbourhoodRule;

const SMOOTHING_SIGMA: f32 = 1.0;
const BORDER_MARGIN: usize = 8;
const WINDOW_RADIUS: usize = 3;
const BRIGHTNESS_RATIO: f64 = 0.8;

/// Ridge endings and bifurcations found by a per-pixel neighbourhood
/// heuristic over the gradient magnitude (no skeletonization).
///
/// Points are ordered by quality, highest first; ties keep row-major scan
/// order so identical pixels always produce an identical sequence.
pub fn extract_minutiae(
    image: &RidgeImage,
    max_points: usize,
    rule: &NeighbourhoodRule,
) -> Vec<Minutia> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    if width <= 2 * BORDER_MARGIN || height <= 2 * BORDER_MARGIN {
        return Vec::new();
    }

    let smoothed = imageops::blur(image, SMOOTHING_SIGMA);
    let field = sobel(&intensities(&smoothed), width, height);
    let (mean, std) = mean_and_std(&field.magnitude);
    let threshold = mean + std;
    if threshold <= f64::EPSILON {
        return Vec::new();
    }

    let mut points = Vec::new();
    for y in BORDER_MARGIN..height - BORDER_MARGIN {
        for x in BORDER_MARGIN..width - BORDER_MARGIN {
            let idx = field.index(x, y);
            let magnitude = field.magnitude[idx];
            if magnitude <= threshold {
                continue;
            }
            let bright = bright_cells(&field, x, y, magnitude * BRIGHTNESS_RATIO);
            if let Some(kind) = rule.classify(bright) {
                points.push(Minutia {
                    kind,
                    x: x as f64,
                    y: y as f64,
                    orientation: field.orientation(idx),
                    quality: magnitude / threshold,
                });
            }
        }
    }

    points.sort_by(|a, b| b.quality.partial_cmp(&a.quality).unwrap_or(Ordering::Equal));
    points.truncate(max_points);
    points
}

/// Cells of the 7x7 window (centre included) whose magnitude exceeds `cutoff`.
fn bright_cells(field: &GradientField, x: usize, y: usize, cutoff: f64) -> usize {
    let mut count = 0;
    for wy in y - WINDOW_RADIUS..=y + WINDOW_RADIUS {
        for wx in x - WINDOW_RADIUS..=x + WINDOW_RADIUS {
            if field.magnitude[field.index(wx, wy)] > cutoff {
                count += 1;
            }
        }
    }
    count
}

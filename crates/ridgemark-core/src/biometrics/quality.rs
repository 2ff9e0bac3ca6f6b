use serde::Serialize;

use crate::biometrics::imaging::{clip_unit, intensities, laplacian, mean_and_std, sobel, GradientField};
use crate::biometrics::types::RidgeImage;

pub const CONTRAST_WEIGHT: f64 = 0.20;
pub const RIDGE_CLARITY_WEIGHT: f64 = 0.30;
pub const FOCUS_WEIGHT: f64 = 0.20;
pub const ORIENTATION_WEIGHT: f64 = 0.15;
pub const COVERAGE_WEIGHT: f64 = 0.15;

const RIDGE_CLARITY_SCALE: f64 = 128.0;
const FOCUS_SCALE: f64 = 10_000.0;
const ORIENTATION_BLOCK: usize = 16;

/// Per-metric breakdown of a capture's usability. Every field is in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QualityReport {
    pub contrast: f64,
    pub ridge_clarity: f64,
    pub focus: f64,
    pub orientation_consistency: f64,
    pub coverage: f64,
    pub score: f64,
}

pub fn assess_quality(image: &RidgeImage) -> QualityReport {
    let (width, height) = (image.width() as usize, image.height() as usize);
    if width < 3 || height < 3 {
        return QualityReport::default();
    }

    let values = intensities(image);
    let (_, intensity_std) = mean_and_std(&values);
    if intensity_std <= f64::EPSILON {
        return QualityReport::default();
    }

    let field = sobel(&values, width, height);
    let (magnitude_mean, _) = mean_and_std(&field.magnitude);
    let (_, laplacian_std) = mean_and_std(&laplacian(&values, width, height));
    let above_mean = field
        .magnitude
        .iter()
        .filter(|magnitude| **magnitude > magnitude_mean)
        .count();

    let contrast = clip_unit(2.0 * intensity_std / 255.0);
    let ridge_clarity = clip_unit(magnitude_mean / RIDGE_CLARITY_SCALE);
    let focus = clip_unit(laplacian_std.powi(2) / FOCUS_SCALE);
    let orientation_consistency = orientation_coherence(&field, ORIENTATION_BLOCK);
    let coverage = clip_unit(2.0 * above_mean as f64 / (width * height) as f64);

    let score = clip_unit(
        CONTRAST_WEIGHT * contrast
            + RIDGE_CLARITY_WEIGHT * ridge_clarity
            + FOCUS_WEIGHT * focus
            + ORIENTATION_WEIGHT * orientation_consistency
            + COVERAGE_WEIGHT * coverage,
    );

    QualityReport {
        contrast,
        ridge_clarity,
        focus,
        orientation_consistency,
        coverage,
        score,
    }
}

pub fn quality_score(image: &RidgeImage) -> f64 {
    assess_quality(image).score
}

/// Mean resultant length of doubled gradient angles, averaged over blocks
/// that carry any gradient. Ridge orientation is axial, so angles are doubled
/// before averaging; a value of 1 means every pixel in a block agrees.
fn orientation_coherence(field: &GradientField, block: usize) -> f64 {
    let mut total = 0.0;
    let mut blocks = 0usize;

    for block_y in (0..field.height).step_by(block) {
        for block_x in (0..field.width).step_by(block) {
            let mut sum_cos = 0.0;
            let mut sum_sin = 0.0;
            let mut count = 0usize;
            for y in block_y..(block_y + block).min(field.height) {
                for x in block_x..(block_x + block).min(field.width) {
                    let idx = field.index(x, y);
                    if field.magnitude[idx] <= f64::EPSILON {
                        continue;
                    }
                    let doubled = 2.0 * field.orientation(idx);
                    sum_cos += doubled.cos();
                    sum_sin += doubled.sin();
                    count += 1;
                }
            }
            if count > 0 {
                total += sum_cos.hypot(sum_sin) / count as f64;
                blocks += 1;
            }
        }
    }

    if blocks == 0 {
        0.0
    } else {
        clip_unit(total / blocks as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{imageops, GrayImage, Luma};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn stripes(width: u32, height: u32, period: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| {
            if (x / (period / 2)) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    fn noise(width: u32, height: u32, seed: u64) -> GrayImage {
        let mut rng = StdRng::seed_from_u64(seed);
        GrayImage::from_fn(width, height, |_, _| Luma([rng.gen::<u8>()]))
    }

    fn assert_unit(report: &QualityReport) {
        for value in [
            report.contrast,
            report.ridge_clarity,
            report.focus,
            report.orientation_consistency,
            report.coverage,
            report.score,
        ] {
            assert!((0.0..=1.0).contains(&value), "{value} outside [0, 1]");
        }
    }

    #[test]
    fn flat_image_scores_zero() {
        let flat = GrayImage::from_pixel(64, 64, Luma([128]));
        assert_eq!(quality_score(&flat), 0.0);
        assert_eq!(assess_quality(&flat), QualityReport::default());
    }

    #[test]
    fn tiny_and_empty_images_score_zero() {
        assert_eq!(quality_score(&GrayImage::new(0, 0)), 0.0);
        assert_eq!(quality_score(&GrayImage::from_pixel(2, 2, Luma([9]))), 0.0);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        assert_unit(&assess_quality(&stripes(64, 48, 8)));
        assert_unit(&assess_quality(&noise(50, 70, 7)));
        assert_unit(&assess_quality(&GrayImage::from_fn(3, 3, |x, y| {
            Luma([(x * 80 + y * 7) as u8])
        })));
    }

    #[test]
    fn parallel_ridges_are_coherent_and_noise_is_not() {
        let ridges = assess_quality(&stripes(64, 64, 8));
        let scattered = assess_quality(&noise(64, 64, 11));
        assert!(ridges.orientation_consistency > 0.9);
        assert!(scattered.orientation_consistency < 0.5);
        assert!((ridges.contrast - 1.0).abs() < 1e-9);
    }

    #[test]
    fn blur_lowers_focus() {
        let sharp = stripes(64, 64, 8);
        let blurred = imageops::blur(&sharp, 3.0);
        assert!(assess_quality(&sharp).focus > assess_quality(&blurred).focus);
    }
}

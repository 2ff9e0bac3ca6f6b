use image::imageops::{self, FilterType};

use crate::biometrics::imaging::{intensities, sobel};
use crate::biometrics::types::RidgeImage;

pub const FEATURE_LENGTH: usize = 128;

const NORMALIZED_SIDE: u32 = 128;
const HISTOGRAM_BINS: usize = 16;
const TEXTURE_CODES: usize = 48;
const TEXTURE_STRIDE: usize = 8;
const GRADIENT_STRIDE: usize = 16;

/// Fixed-length global descriptor of a capture: a coarse intensity histogram,
/// sparse local-binary-pattern codes and sparse gradient magnitudes, all taken
/// from the image resampled to 128x128.
pub fn feature_vector(image: &RidgeImage) -> Vec<f64> {
    if image.width() == 0 || image.height() == 0 {
        return vec![0.0; FEATURE_LENGTH];
    }

    let resized = imageops::resize(image, NORMALIZED_SIDE, NORMALIZED_SIDE, FilterType::Triangle);
    let side = NORMALIZED_SIDE as usize;
    let values = intensities(&resized);

    let mut features = Vec::with_capacity(FEATURE_LENGTH);

    let mut histogram = [0.0; HISTOGRAM_BINS];
    let bin_width = 256 / HISTOGRAM_BINS;
    for value in &values {
        histogram[*value as usize / bin_width] += 1.0;
    }
    features.extend_from_slice(&histogram);

    features.extend(texture_codes(&values, side).into_iter().take(TEXTURE_CODES));

    let field = sobel(&values, side, side);
    for y in (0..side).step_by(GRADIENT_STRIDE) {
        for x in (0..side).step_by(GRADIENT_STRIDE) {
            features.push(field.magnitude[field.index(x, y)]);
        }
    }

    features.resize(FEATURE_LENGTH, 0.0);
    features
}

/// 8-bit local binary pattern codes on a sparse grid, row-major. Bits run
/// clockwise from the top-left neighbour (MSB) to the left neighbour (LSB).
fn texture_codes(values: &[f64], side: usize) -> Vec<f64> {
    const NEIGHBOURS: [(isize, isize); 8] = [
        (-1, -1),
        (-1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
        (1, 0),
        (1, -1),
        (0, -1),
    ];

    let mut codes = Vec::new();
    for row in (1..side - 1).step_by(TEXTURE_STRIDE) {
        for col in (1..side - 1).step_by(TEXTURE_STRIDE) {
            let centre = values[row * side + col];
            let mut code = 0u8;
            for (bit, (dr, dc)) in NEIGHBOURS.iter().enumerate() {
                let r = (row as isize + dr) as usize;
                let c = (col as isize + dc) as usize;
                if values[r * side + c] >= centre {
                    code |= 1 << (7 - bit);
                }
            }
            codes.push(f64::from(code));
        }
    }
    codes
}

//! Numeric helpers over grayscale grids shared by the scoring, extraction and
//! feature stages. Borders are handled by reflection without repeating the
//! edge pixel (`dcb|abcd|cba`).

use image::GrayImage;

pub(crate) struct GradientField {
    pub width: usize,
    pub height: usize,
    pub gx: Vec<f64>,
    pub gy: Vec<f64>,
    pub magnitude: Vec<f64>,
}

impl GradientField {
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    pub fn orientation(&self, idx: usize) -> f64 {
        self.gy[idx].atan2(self.gx[idx])
    }
}

pub(crate) fn intensities(image: &GrayImage) -> Vec<f64> {
    image.pixels().map(|pixel| f64::from(pixel.0[0])).collect()
}

fn reflect(position: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut pos = position;
    if pos < 0 {
        pos = -pos;
    }
    if pos > last {
        pos = 2 * last - pos;
    }
    pos.clamp(0, last) as usize
}

fn sample(values: &[f64], width: usize, height: usize, x: isize, y: isize) -> f64 {
    values[reflect(y, height) * width + reflect(x, width)]
}

/// 3x3 Sobel derivatives and their magnitude.
pub(crate) fn sobel(values: &[f64], width: usize, height: usize) -> GradientField {
    let len = width * height;
    let mut gx = vec![0.0; len];
    let mut gy = vec![0.0; len];
    let mut magnitude = vec![0.0; len];

    for y in 0..height {
        for x in 0..width {
            let (xi, yi) = (x as isize, y as isize);
            let at = |dx: isize, dy: isize| sample(values, width, height, xi + dx, yi + dy);
            let dx = (at(1, -1) + 2.0 * at(1, 0) + at(1, 1))
                - (at(-1, -1) + 2.0 * at(-1, 0) + at(-1, 1));
            let dy = (at(-1, 1) + 2.0 * at(0, 1) + at(1, 1))
                - (at(-1, -1) + 2.0 * at(0, -1) + at(1, -1));
            let idx = y * width + x;
            gx[idx] = dx;
            gy[idx] = dy;
            magnitude[idx] = dx.hypot(dy);
        }
    }

    GradientField {
        width,
        height,
        gx,
        gy,
        magnitude,
    }
}

/// 4-neighbour Laplacian response.
pub(crate) fn laplacian(values: &[f64], width: usize, height: usize) -> Vec<f64> {
    let mut response = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let (xi, yi) = (x as isize, y as isize);
            let at = |dx: isize, dy: isize| sample(values, width, height, xi + dx, yi + dy);
            response.push(at(0, -1) + at(-1, 0) + at(1, 0) + at(0, 1) - 4.0 * at(0, 0));
        }
    }
    response
}

/// Population mean and standard deviation; `(0, 0)` for an empty slice.
pub(crate) fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

pub(crate) fn clip_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

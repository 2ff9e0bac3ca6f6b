use std::collections::HashSet;
use std::f64::consts::TAU;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::biometrics::types::RidgeImage;
use crate::errors::{AppError, AppResult};

pub const SYNTHETIC_WIDTH: u32 = 288;
pub const SYNTHETIC_HEIGHT: u32 = 360;
const SYNTHETIC_MARKS: usize = 10;
/// Sharpness of the ridge/valley transition; 0 would be a plain cosine.
const RIDGE_STEEPNESS: f64 = 2.0;
const PAD_RADIUS: f64 = 240.0;
const SENSOR_NOISE: f64 = 4.0;
const IMAGE_EXTENSIONS: &[&str] = &["png", "bmp", "pgm", "jpg", "jpeg", "tif", "tiff"];

/// Snapshot of the reader's state, recorded with each verification attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub connected: bool,
    pub ready: bool,
    pub busy: bool,
}

/// Source of ridge images. `capture` may block; `None` means the attempt
/// timed out or was aborted and should simply be retried.
pub trait CaptureProvider {
    fn capture(&mut self) -> Option<RidgeImage>;
    fn status(&self) -> DeviceStatus;
}

/// Decodes an image file into the grayscale form the engine works on.
pub fn load_ridge_image(path: &Path) -> AppResult<RidgeImage> {
    if !path.is_file() {
        return Err(AppError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    let decoded = image::open(path).map_err(|source| AppError::ImageDecode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(decoded.to_luma8())
}

/// Takes image files dropped into a directory, oldest name first. Each file
/// is handed out once; polls until `timeout` when nothing new has arrived.
#[derive(Debug, Clone)]
pub struct DirectoryCapture {
    dir: PathBuf,
    timeout: Duration,
    poll_interval: Duration,
    seen: HashSet<PathBuf>,
}

impl DirectoryCapture {
    pub fn new(dir: impl Into<PathBuf>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            timeout,
            poll_interval,
            seen: HashSet::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_unseen(&self) -> Option<PathBuf> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(dir = %self.dir.display(), error = %err, "capture directory unreadable");
                return None;
            }
        };
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file() && has_image_extension(path))
            .filter(|path| !self.seen.contains(path))
            .collect();
        candidates.sort();
        candidates.into_iter().next()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl CaptureProvider for DirectoryCapture {
    fn capture(&mut self) -> Option<RidgeImage> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(path) = self.next_unseen() {
                self.seen.insert(path.clone());
                return match load_ridge_image(&path) {
                    Ok(image) => {
                        debug!(path = %path.display(), "captured frame from directory");
                        Some(image)
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "discarding unreadable frame");
                        None
                    }
                };
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(self.poll_interval);
        }
    }

    fn status(&self) -> DeviceStatus {
        let connected = self.dir.is_dir();
        DeviceStatus {
            connected,
            ready: connected,
            busy: false,
        }
    }
}

/// Whorl-like ridge images for development and tests. The seed fixes one
/// "finger" (core position, ridge period, scar marks); every capture adds
/// placement jitter and sensor noise drawn from a stream derived from the
/// same seed, so a sequence of captures is reproducible.
#[derive(Debug, Clone)]
pub struct SyntheticCapture {
    finger: SyntheticFinger,
    rng: StdRng,
}

#[derive(Debug, Clone)]
struct SyntheticFinger {
    core_x: f64,
    core_y: f64,
    period: f64,
    twist: f64,
    marks: Vec<(i64, i64)>,
}

impl SyntheticCapture {
    pub fn new(seed: u64) -> Self {
        let mut shape = StdRng::seed_from_u64(seed);
        let finger = SyntheticFinger {
            core_x: shape.gen_range(120.0..168.0),
            core_y: shape.gen_range(150.0..210.0),
            period: shape.gen_range(8.0..11.0),
            twist: shape.gen_range(0.0..1.5),
            marks: (0..SYNTHETIC_MARKS)
                .map(|_| (shape.gen_range(50..238), shape.gen_range(50..310)))
                .collect(),
        };
        Self {
            finger,
            rng: StdRng::seed_from_u64(seed.rotate_left(17) ^ 0x9e37_79b9_7f4a_7c15),
        }
    }

    fn render(&mut self) -> RidgeImage {
        let finger = &self.finger;
        let shift_x = self.rng.gen_range(-2.0..=2.0);
        let shift_y = self.rng.gen_range(-2.0..=2.0);
        let core_x = finger.core_x + shift_x;
        let core_y = finger.core_y + shift_y;

        let mut image = GrayImage::new(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            let dx = x as f64 - core_x;
            let dy = y as f64 - core_y;
            let radius = dx.hypot(dy);
            let angle = dy.atan2(dx);
            let phase = TAU * radius / finger.period + finger.twist * angle.sin() * radius / 40.0;
            let ridge =
                0.5 + 0.5 * (RIDGE_STEEPNESS * phase.cos()).tanh() / RIDGE_STEEPNESS.tanh();
            // fade out towards the pad edge
            let envelope = (1.0 - (radius / PAD_RADIUS).powi(8)).clamp(0.0, 1.0);
            let noise = self.rng.gen_range(-SENSOR_NOISE..=SENSOR_NOISE);
            let value = 15.0 + 225.0 * ridge * envelope + noise;
            *pixel = Luma([value.clamp(0.0, 255.0) as u8]);
        }

        for (mark_x, mark_y) in &finger.marks {
            let cx = *mark_x + shift_x.round() as i64;
            let cy = *mark_y + shift_y.round() as i64;
            for y in cy - 2..=cy + 2 {
                for x in cx - 2..=cx + 2 {
                    if (0..SYNTHETIC_WIDTH as i64).contains(&x)
                        && (0..SYNTHETIC_HEIGHT as i64).contains(&y)
                    {
                        image.put_pixel(x as u32, y as u32, Luma([0]));
                    }
                }
            }
        }
        image
    }
}

impl CaptureProvider for SyntheticCapture {
    fn capture(&mut self) -> Option<RidgeImage> {
        Some(self.render())
    }

    fn status(&self) -> DeviceStatus {
        DeviceStatus {
            connected: true,
            ready: true,
            busy: false,
        }
    }
}

/// Which capture provider to build, chosen once from configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureBackend {
    Synthetic {
        seed: u64,
    },
    Directory {
        dir: PathBuf,
        timeout: Duration,
        poll_interval: Duration,
    },
}

#[derive(Debug, Clone)]
pub enum CaptureSource {
    Synthetic(SyntheticCapture),
    Directory(DirectoryCapture),
}

impl CaptureSource {
    pub fn open(backend: &CaptureBackend) -> AppResult<Self> {
        match backend {
            CaptureBackend::Synthetic { seed } => {
                Ok(CaptureSource::Synthetic(SyntheticCapture::new(*seed)))
            }
            CaptureBackend::Directory {
                dir,
                timeout,
                poll_interval,
            } => {
                if !dir.is_dir() {
                    return Err(AppError::CaptureUnavailable(format!(
                        "capture directory {} does not exist",
                        dir.display()
                    )));
                }
                Ok(CaptureSource::Directory(DirectoryCapture::new(
                    dir.clone(),
                    *timeout,
                    *poll_interval,
                )))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            CaptureSource::Synthetic(_) => "synthetic generator".to_string(),
            CaptureSource::Directory(source) => format!("directory {}", source.dir().display()),
        }
    }
}

impl CaptureProvider for CaptureSource {
    fn capture(&mut self) -> Option<RidgeImage> {
        match self {
            CaptureSource::Synthetic(source) => source.capture(),
            CaptureSource::Directory(source) => source.capture(),
        }
    }

    fn status(&self) -> DeviceStatus {
        match self {
            CaptureSource::Synthetic(source) => source.status(),
            CaptureSource::Directory(source) => source.status(),
        }
    }
}

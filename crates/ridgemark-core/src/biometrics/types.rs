use std::collections::HashMap;
use std::f64::consts::TAU;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::capture::DeviceStatus;

/// Grayscale ridge image as produced by a capture provider.
pub type RidgeImage = GrayImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinutiaKind {
    RidgeEnding,
    Bifurcation,
}

impl MinutiaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MinutiaKind::RidgeEnding => "ridge_ending",
            MinutiaKind::Bifurcation => "bifurcation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Minutia {
    pub kind: MinutiaKind,
    pub x: f64,
    pub y: f64,
    /// Ridge flow direction in radians, `(-pi, pi]`.
    pub orientation: f64,
    pub quality: f64,
}

impl Minutia {
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        (self.x - x).hypot(self.y - y)
    }
}

/// Smallest absolute difference between two angles, in `[0, pi]`.
pub fn angle_difference(lhs: f64, rhs: f64) -> f64 {
    let diff = (lhs - rhs).abs() % TAU;
    diff.min(TAU - diff)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StableMinutia {
    pub kind: MinutiaKind,
    pub x: f64,
    pub y: f64,
    pub orientation: f64,
    pub quality: f64,
    pub stability: f64,
    pub sample_count: usize,
}

/// One accepted capture of an enrollment session.
#[derive(Debug, Clone)]
pub struct Sample {
    pub image: RidgeImage,
    pub quality: f64,
    pub features: Vec<f64>,
    pub minutiae: Vec<Minutia>,
    pub captured_at: DateTime<Utc>,
    pub capture_duration: Duration,
}

/// Audit trail of an accepted sample; the pixels themselves are not kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub sample_number: usize,
    pub captured_at: String,
    pub quality: f64,
    pub minutiae_count: usize,
    pub capture_duration_ms: u64,
}

impl SampleRecord {
    pub fn from_sample(sample_number: usize, sample: &Sample) -> Self {
        Self {
            sample_number,
            captured_at: sample
                .captured_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            quality: sample.quality,
            minutiae_count: sample.minutiae.len(),
            capture_duration_ms: sample.capture_duration.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationCounters {
    pub count: u64,
    pub last_verified_at: Option<String>,
}

impl VerificationCounters {
    /// Successful verifications per profile id, derived from the append-only
    /// log. Keying on the profile rather than the subject keeps a re-enrolled
    /// subject from inheriting the history of the profile it replaced.
    pub fn tally(entries: &[VerificationLogEntry]) -> HashMap<String, VerificationCounters> {
        let mut counters: HashMap<String, VerificationCounters> = HashMap::new();
        for entry in entries {
            if entry.result != VerificationResult::Success {
                continue;
            }
            if let Some(profile_id) = &entry.profile_id {
                let counter = counters.entry(profile_id.clone()).or_default();
                counter.count += 1;
                counter.last_verified_at = Some(entry.timestamp.clone());
            }
        }
        counters
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricProfile {
    pub id: String,
    pub subject_id: String,
    pub display_name: String,
    pub created_at: String,
    pub composite_features: Vec<f64>,
    pub feature_variance: Vec<f64>,
    pub stable_minutiae: Vec<StableMinutia>,
    pub sample_count: usize,
    pub sample_qualities: Vec<f64>,
    pub samples: Vec<SampleRecord>,
    #[serde(skip)]
    pub verification: VerificationCounters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationResult {
    Success,
    Failure,
}

impl VerificationResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationResult::Success => "SUCCESS",
            VerificationResult::Failure => "FAILURE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationLogEntry {
    pub subject_id: Option<String>,
    /// Absent on lines written before profile ids were logged; such lines
    /// still count towards totals but not towards any profile's counters.
    #[serde(default)]
    pub profile_id: Option<String>,
    pub timestamp: String,
    pub result: VerificationResult,
    pub confidence: f64,
    pub processing_ms: f64,
    pub device_status: DeviceStatus,
}

use serde::Serialize;

use crate::biometrics::store::ProfileStore;
use crate::biometrics::types::VerificationResult;
use crate::errors::AppResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QualitySummary {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

impl QualitySummary {
    /// Population statistics; all zero for an empty slice.
    pub fn from_scores(scores: &[f64]) -> Self {
        if scores.is_empty() {
            return Self::default();
        }
        let n = scores.len() as f64;
        let average = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - average).powi(2)).sum::<f64>() / n;
        Self {
            average,
            min: scores.iter().copied().fold(f64::INFINITY, f64::min),
            max: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            std_dev: variance.sqrt(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RejectionCounts {
    pub capture_unavailable: u32,
    pub low_quality: u32,
    pub inconsistent: u32,
}

impl RejectionCounts {
    pub fn total(&self) -> u32 {
        self.capture_unavailable + self.low_quality + self.inconsistent
    }
}

/// Summary of one completed enrollment session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentStatistics {
    pub started_at: String,
    pub finished_at: String,
    pub attempts: u32,
    pub samples_accepted: usize,
    pub rejections: RejectionCounts,
    pub quality: QualitySummary,
    pub total_capture_ms: u64,
    pub mean_minutiae_per_sample: f64,
    pub pooled_minutiae: usize,
    pub stable_minutiae: usize,
    pub feature_dimensions: usize,
}

/// Store-wide totals reported by `ridgemark stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStatistics {
    pub total_profiles: usize,
    pub total_samples: usize,
    pub total_verifications: usize,
    pub successful_verifications: usize,
    /// Percentage in `[0, 100]`.
    pub verification_success_rate: f64,
    pub quality: QualitySummary,
}

pub fn collect_statistics<S: ProfileStore>(store: &S) -> AppResult<StoreStatistics> {
    let profiles = store.load_all_profiles()?;
    let log = store.verification_log()?;

    let successful = log
        .iter()
        .filter(|entry| entry.result == VerificationResult::Success)
        .count();
    let rate = if log.is_empty() {
        0.0
    } else {
        successful as f64 / log.len() as f64 * 100.0
    };
    let qualities: Vec<f64> = profiles
        .iter()
        .flat_map(|profile| profile.sample_qualities.iter().copied())
        .collect();

    Ok(StoreStatistics {
        total_profiles: profiles.len(),
        total_samples: profiles.iter().map(|profile| profile.sample_count).sum(),
        total_verifications: log.len(),
        successful_verifications: successful,
        verification_success_rate: rate,
        quality: QualitySummary::from_scores(&qualities),
    })
}

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::biometrics::types::{
    angle_difference, BiometricProfile, Minutia, Sample, SampleRecord, StableMinutia,
    VerificationCounters,
};
use crate::config::EngineConfig;
use crate::errors::{AppError, AppResult};

const CLUSTER_DISTANCE_PX: f64 = 10.0;
const CLUSTER_ANGLE_RAD: f64 = 0.5;
const MIN_CONTRIBUTING_SAMPLES: usize = 2;

/// Composite template merged from one complete enrollment session.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileTemplate {
    pub composite_features: Vec<f64>,
    pub feature_variance: Vec<f64>,
    pub stable_minutiae: Vec<StableMinutia>,
    pub sample_qualities: Vec<f64>,
    pub pooled_minutiae: usize,
}

pub fn build_profile_template(
    samples: &[Sample],
    config: &EngineConfig,
) -> AppResult<ProfileTemplate> {
    if samples.is_empty() || samples.len() != config.required_sample_count {
        return Err(AppError::InvalidSampleSet(format!(
            "expected exactly {} accepted sample(s), found {}",
            config.required_sample_count,
            samples.len()
        )));
    }

    let dimensions = samples[0].features.len();
    if let Some((idx, sample)) = samples
        .iter()
        .enumerate()
        .find(|(_, sample)| sample.features.len() != dimensions)
    {
        return Err(AppError::InvalidSampleSet(format!(
            "feature length mismatch at sample {} (expected {}, found {})",
            idx + 1,
            dimensions,
            sample.features.len()
        )));
    }

    let vectors: Vec<&[f64]> = samples.iter().map(|s| s.features.as_slice()).collect();
    let (composite_features, feature_variance) = feature_statistics(&vectors);

    let pooled: Vec<(usize, Minutia)> = samples
        .iter()
        .enumerate()
        .flat_map(|(idx, sample)| sample.minutiae.iter().map(move |m| (idx, *m)))
        .collect();
    let stable_minutiae = stabilize_minutiae(&pooled, config.stable_minutiae_cap);
    info!(
        pooled = pooled.len(),
        stable = stable_minutiae.len(),
        dimensions,
        "built composite template"
    );

    Ok(ProfileTemplate {
        composite_features,
        feature_variance,
        stable_minutiae,
        sample_qualities: samples.iter().map(|s| s.quality).collect(),
        pooled_minutiae: pooled.len(),
    })
}

/// Element-wise mean and population variance of equally sized vectors.
pub fn feature_statistics(vectors: &[&[f64]]) -> (Vec<f64>, Vec<f64>) {
    let Some(first) = vectors.first() else {
        return (Vec::new(), Vec::new());
    };
    let n = vectors.len() as f64;
    let mut mean = vec![0.0; first.len()];
    for vector in vectors {
        for (acc, value) in mean.iter_mut().zip(vector.iter()) {
            *acc += value / n;
        }
    }
    let mut variance = vec![0.0; first.len()];
    for vector in vectors {
        for ((acc, value), centre) in variance.iter_mut().zip(vector.iter()).zip(mean.iter()) {
            *acc += (value - centre).powi(2) / n;
        }
    }
    (mean, variance)
}

/// Greedy clustering of pooled minutiae (tagged with their sample index).
/// Each unused point seeds a group that absorbs every later unused point close
/// to the seed in both position and orientation; only groups drawn from at
/// least two samples survive.
pub fn stabilize_minutiae(pooled: &[(usize, Minutia)], cap: usize) -> Vec<StableMinutia> {
    let total = pooled.len();
    let mut used = vec![false; total];
    let mut stable = Vec::new();

    for seed_idx in 0..total {
        if used[seed_idx] {
            continue;
        }
        used[seed_idx] = true;
        let seed = pooled[seed_idx].1;
        let mut members = vec![seed_idx];

        for other_idx in seed_idx + 1..total {
            if used[other_idx] {
                continue;
            }
            let other = pooled[other_idx].1;
            if seed.distance_to(other.x, other.y) < CLUSTER_DISTANCE_PX
                && angle_difference(seed.orientation, other.orientation) < CLUSTER_ANGLE_RAD
            {
                used[other_idx] = true;
                members.push(other_idx);
            }
        }

        let contributing: BTreeSet<usize> = members.iter().map(|idx| pooled[*idx].0).collect();
        if contributing.len() < MIN_CONTRIBUTING_SAMPLES {
            continue;
        }
        stable.push(summarize_group(pooled, &members, contributing.len(), total));
    }

    debug!(groups = stable.len(), pooled = total, "clustered minutiae");
    stable.sort_by(|a, b| {
        (b.stability * b.quality)
            .partial_cmp(&(a.stability * a.quality))
            .unwrap_or(Ordering::Equal)
    });
    stable.truncate(cap);
    stable
}

fn summarize_group(
    pooled: &[(usize, Minutia)],
    members: &[usize],
    contributing_samples: usize,
    total: usize,
) -> StableMinutia {
    let n = members.len() as f64;
    let (mut x, mut y, mut quality, mut sin, mut cos) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for idx in members {
        let point = pooled[*idx].1;
        x += point.x;
        y += point.y;
        quality += point.quality;
        sin += point.orientation.sin();
        cos += point.orientation.cos();
    }

    StableMinutia {
        kind: pooled[members[0]].1.kind,
        x: x / n,
        y: y / n,
        orientation: sin.atan2(cos),
        quality: quality / n,
        stability: n / total as f64,
        sample_count: contributing_samples,
    }
}

impl BiometricProfile {
    /// Fresh profile document for a completed session.
    pub fn assemble(
        subject_id: &str,
        display_name: &str,
        template: ProfileTemplate,
        samples: &[Sample],
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            display_name: display_name.to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            composite_features: template.composite_features,
            feature_variance: template.feature_variance,
            stable_minutiae: template.stable_minutiae,
            sample_count: samples.len(),
            sample_qualities: template.sample_qualities,
            samples: samples
                .iter()
                .enumerate()
                .map(|(idx, sample)| SampleRecord::from_sample(idx + 1, sample))
                .collect(),
            verification: VerificationCounters::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometrics::types::MinutiaKind;
    use image::GrayImage;
    use std::time::Duration;

    fn point(kind: MinutiaKind, x: f64, y: f64, orientation: f64) -> Minutia {
        Minutia {
            kind,
            x,
            y,
            orientation,
            quality: 1.5,
        }
    }

    fn grid_minutiae(count: usize) -> Vec<Minutia> {
        (0..count)
            .map(|i| {
                let kind = if i % 2 == 0 {
                    MinutiaKind::RidgeEnding
                } else {
                    MinutiaKind::Bifurcation
                };
                point(kind, 20.0 + 25.0 * (i % 8) as f64, 20.0 + 25.0 * (i / 8) as f64, 0.3)
            })
            .collect()
    }

    fn sample(features: Vec<f64>, minutiae: Vec<Minutia>, quality: f64) -> Sample {
        Sample {
            image: GrayImage::new(1, 1),
            quality,
            features,
            minutiae,
            captured_at: Utc::now(),
            capture_duration: Duration::from_millis(40),
        }
    }

    #[test]
    fn identical_samples_produce_zero_variance_and_full_template() {
        let config = EngineConfig::default();
        let minutiae = grid_minutiae(12);
        let samples: Vec<Sample> = (0..5)
            .map(|_| sample(vec![1.0, 2.0, 3.0], minutiae.clone(), 0.9))
            .collect();

        let template = build_profile_template(&samples, &config).unwrap();
        assert_eq!(template.composite_features, vec![1.0, 2.0, 3.0]);
        assert!(template.feature_variance.iter().all(|v| v.abs() < 1e-12));
        assert_eq!(template.stable_minutiae.len(), minutiae.len());
        assert_eq!(template.pooled_minutiae, 60);
        for stable in &template.stable_minutiae {
            assert_eq!(stable.sample_count, 5);
            assert!((stable.stability - 5.0 / 60.0).abs() < 1e-12);
        }
    }

    #[test]
    fn wrong_sample_count_is_rejected() {
        let config = EngineConfig::default();
        let samples = vec![sample(vec![1.0], Vec::new(), 0.9); 4];
        let err = build_profile_template(&samples, &config).unwrap_err();
        assert!(matches!(err, AppError::InvalidSampleSet(_)));
    }

    #[test]
    fn feature_length_mismatch_is_rejected() {
        let config = EngineConfig {
            required_sample_count: 2,
            ..EngineConfig::default()
        };
        let samples = vec![
            sample(vec![1.0, 2.0], Vec::new(), 0.9),
            sample(vec![1.0], Vec::new(), 0.9),
        ];
        let err = build_profile_template(&samples, &config).unwrap_err();
        assert!(matches!(err, AppError::InvalidSampleSet(_)));
    }

    #[test]
    fn variance_tracks_spread_between_samples() {
        let (mean, variance) = feature_statistics(&[&[1.0, 10.0], &[3.0, 10.0]]);
        assert_eq!(mean, vec![2.0, 10.0]);
        assert_eq!(variance, vec![1.0, 0.0]);
    }

    #[test]
    fn single_sample_points_never_become_stable() {
        let ridge = MinutiaKind::RidgeEnding;
        let pooled = vec![
            // Two near-identical detections from the same sample only.
            (0, point(ridge, 50.0, 50.0, 0.1)),
            (0, point(ridge, 52.0, 51.0, 0.15)),
            // Recurs across samples 0 and 3.
            (0, point(ridge, 100.0, 100.0, 1.0)),
            (3, point(ridge, 104.0, 98.0, 1.2)),
            // Close in space but the ridge flow disagrees.
            (1, point(ridge, 150.0, 150.0, 0.0)),
            (2, point(ridge, 151.0, 150.0, 1.0)),
        ];
        let stable = stabilize_minutiae(&pooled, 50);
        assert_eq!(stable.len(), 1);
        assert_eq!(stable[0].sample_count, 2);
        assert!((stable[0].x - 102.0).abs() < 1e-9);
        assert!((stable[0].y - 99.0).abs() < 1e-9);
        assert!((stable[0].orientation - 1.1).abs() < 1e-9);
        assert!((stable[0].stability - 2.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn orientation_mean_wraps_across_pi() {
        let ridge = MinutiaKind::RidgeEnding;
        let pi = std::f64::consts::PI;
        let pooled = vec![
            (0, point(ridge, 10.0, 10.0, pi - 0.1)),
            (1, point(ridge, 10.0, 10.0, -pi + 0.1)),
        ];
        let stable = stabilize_minutiae(&pooled, 50);
        assert_eq!(stable.len(), 1);
        assert!(angle_difference(stable[0].orientation, pi) < 1e-9);
    }

    #[test]
    fn template_respects_cap_and_ordering() {
        let config = EngineConfig {
            stable_minutiae_cap: 7,
            ..EngineConfig::default()
        };
        let samples: Vec<Sample> = (0..5)
            .map(|idx| {
                let mut minutiae = grid_minutiae(40);
                for (i, m) in minutiae.iter_mut().enumerate() {
                    m.quality = 1.0 + (i % 5) as f64 + idx as f64 * 0.01;
                }
                sample(vec![1.0, 0.0], minutiae, 0.8)
            })
            .collect();

        let template = build_profile_template(&samples, &config).unwrap();
        assert_eq!(template.stable_minutiae.len(), 7);
        for pair in template.stable_minutiae.windows(2) {
            assert!(pair[0].stability * pair[0].quality >= pair[1].stability * pair[1].quality);
        }
        assert!(template
            .stable_minutiae
            .iter()
            .all(|m| m.sample_count >= MIN_CONTRIBUTING_SAMPLES));
    }

    #[test]
    fn assembled_profile_keeps_sample_audit_trail() {
        let config = EngineConfig::default();
        let samples: Vec<Sample> = (0..5)
            .map(|i| sample(vec![1.0, i as f64], grid_minutiae(3), 0.75 + i as f64 * 0.05))
            .collect();
        let template = build_profile_template(&samples, &config).unwrap();
        let profile = BiometricProfile::assemble("EMP001", "Ada Lovelace", template, &samples);

        assert_eq!(profile.subject_id, "EMP001");
        assert_eq!(profile.sample_count, 5);
        assert_eq!(profile.samples.len(), 5);
        assert_eq!(profile.samples[4].sample_number, 5);
        assert_eq!(profile.samples[0].minutiae_count, 3);
        assert_eq!(profile.samples[0].capture_duration_ms, 40);
        assert_eq!(profile.sample_qualities, vec![0.75, 0.8, 0.85, 0.9, 0.95]);
        assert!(Uuid::parse_str(&profile.id).is_ok());
    }
}

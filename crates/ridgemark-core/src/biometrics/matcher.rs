use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::biometrics::analyzer::{RidgeAnalyzer, SampleAnalyzer};
use crate::biometrics::consistency::cosine_similarity;
use crate::biometrics::store::{FilesystemProfileStore, ProfileStore};
use crate::biometrics::types::{
    angle_difference, BiometricProfile, Minutia, RidgeImage, StableMinutia, VerificationLogEntry,
    VerificationResult,
};
use crate::capture::{
    load_ridge_image, CaptureBackend, CaptureProvider, CaptureSource, DeviceStatus,
};
use crate::config::EngineConfig;
use crate::errors::{AppError, AppResult};

pub const FEATURE_WEIGHT: f64 = 0.6;
pub const MINUTIAE_WEIGHT: f64 = 0.4;

const PAIR_DISTANCE_PX: f64 = 15.0;
const PAIR_ANGLE_RAD: f64 = 0.7;
const PAIR_SCORE_FLOOR: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchDecision {
    HighConfidence,
    MediumConfidence,
    NoMatch,
    NoEnrolledProfiles,
}

impl MatchDecision {
    pub fn message(&self) -> &'static str {
        match self {
            MatchDecision::HighConfidence => "high confidence match",
            MatchDecision::MediumConfidence => "medium confidence match",
            MatchDecision::NoMatch => "no match found",
            MatchDecision::NoEnrolledProfiles => "no enrolled profiles",
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(
            self,
            MatchDecision::HighConfidence | MatchDecision::MediumConfidence
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileScore {
    pub subject_id: String,
    pub feature_similarity: f64,
    pub minutiae_similarity: f64,
    pub combined: f64,
}

/// Fraction of template points that have a live counterpart of the same
/// kind close enough in position and ridge direction.
pub fn minutiae_similarity(live: &[Minutia], template: &[StableMinutia]) -> f64 {
    if live.is_empty() || template.is_empty() {
        return 0.0;
    }

    let matched = template
        .iter()
        .filter(|point| {
            let best = live
                .iter()
                .filter(|candidate| candidate.kind == point.kind)
                .map(|candidate| {
                    let distance = candidate.distance_to(point.x, point.y);
                    let turn = angle_difference(candidate.orientation, point.orientation);
                    if distance < PAIR_DISTANCE_PX && turn < PAIR_ANGLE_RAD {
                        (1.0 - distance / PAIR_DISTANCE_PX) * (1.0 - turn / PAIR_ANGLE_RAD)
                    } else {
                        0.0
                    }
                })
                .fold(0.0, f64::max);
            best > PAIR_SCORE_FLOOR
        })
        .count();

    matched as f64 / template.len() as f64
}

pub fn combined_score(feature_similarity: f64, minutiae_similarity: f64) -> f64 {
    let combined = FEATURE_WEIGHT * feature_similarity + MINUTIAE_WEIGHT * minutiae_similarity;
    if combined.is_nan() {
        0.0
    } else {
        combined.clamp(0.0, 1.0)
    }
}

pub fn score_profile(
    live_features: &[f64],
    live_minutiae: &[Minutia],
    profile: &BiometricProfile,
) -> ProfileScore {
    let feature_similarity = cosine_similarity(live_features, &profile.composite_features);
    let minutiae_similarity = minutiae_similarity(live_minutiae, &profile.stable_minutiae);
    ProfileScore {
        subject_id: profile.subject_id.clone(),
        feature_similarity,
        minutiae_similarity,
        combined: combined_score(feature_similarity, minutiae_similarity),
    }
}

pub fn decide(confidence: f64, config: &EngineConfig) -> MatchDecision {
    if confidence >= config.verification_high_confidence {
        MatchDecision::HighConfidence
    } else if confidence >= config.verification_medium_confidence {
        MatchDecision::MediumConfidence
    } else {
        MatchDecision::NoMatch
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchReport {
    pub subject_id: Option<String>,
    /// Id of the matched profile; set together with `subject_id`.
    pub profile_id: Option<String>,
    pub confidence: f64,
    pub decision: MatchDecision,
    /// Per-profile breakdown in store order.
    pub scores: Vec<ProfileScore>,
}

/// Linear scan over every profile. A later profile replaces the current best
/// only with a strictly higher combined score.
pub fn match_profiles(
    live_features: &[f64],
    live_minutiae: &[Minutia],
    profiles: &[BiometricProfile],
    config: &EngineConfig,
) -> MatchReport {
    if profiles.is_empty() {
        return MatchReport {
            subject_id: None,
            profile_id: None,
            confidence: 0.0,
            decision: MatchDecision::NoEnrolledProfiles,
            scores: Vec::new(),
        };
    }

    let scores: Vec<ProfileScore> = profiles
        .iter()
        .map(|profile| score_profile(live_features, live_minutiae, profile))
        .collect();

    let mut best = 0;
    for (idx, score) in scores.iter().enumerate().skip(1) {
        if score.combined > scores[best].combined {
            best = idx;
        }
    }

    let confidence = scores[best].combined;
    let decision = decide(confidence, config);
    let matched = decision.is_match().then_some(&profiles[best]);
    MatchReport {
        subject_id: matched.map(|profile| profile.subject_id.clone()),
        profile_id: matched.map(|profile| profile.id.clone()),
        confidence,
        decision,
        scores,
    }
}

#[derive(Debug)]
pub struct VerificationOutcome {
    pub subject_id: Option<String>,
    pub confidence: f64,
    pub decision: MatchDecision,
    pub scores: Vec<ProfileScore>,
    pub processing_time: Duration,
    pub log_entry: VerificationLogEntry,
    pub logs: Vec<String>,
}

impl VerificationOutcome {
    pub fn message(&self) -> &'static str {
        self.decision.message()
    }
}

/// Captures one image from the configured backend and verifies it against
/// the filesystem store.
pub fn run_verification(
    backend: &CaptureBackend,
    store_dir: &Path,
    config: &EngineConfig,
) -> AppResult<VerificationOutcome> {
    let mut capture = CaptureSource::open(backend)?;
    let analyzer = RidgeAnalyzer::new(config);
    let store = FilesystemProfileStore::new(store_dir);
    verify_capture_with(&mut capture, &analyzer, &store, config)
}

/// Verifies an image file. No reader is involved, so the recorded device
/// status is all false.
pub fn run_image_verification(
    image_path: &Path,
    store_dir: &Path,
    config: &EngineConfig,
) -> AppResult<VerificationOutcome> {
    let image = load_ridge_image(image_path)?;
    let analyzer = RidgeAnalyzer::new(config);
    let store = FilesystemProfileStore::new(store_dir);
    run_verification_with(&image, DeviceStatus::default(), &analyzer, &store, config)
}

/// Scores one live image against the store and records the attempt.
pub fn run_verification_with<A, S>(
    image: &RidgeImage,
    device: DeviceStatus,
    analyzer: &A,
    store: &S,
    config: &EngineConfig,
) -> AppResult<VerificationOutcome>
where
    A: SampleAnalyzer,
    S: ProfileStore,
{
    let started = Instant::now();
    let mut logs = Vec::new();

    let profiles = store.load_all_profiles()?;
    logs.push(format!("Loaded {} enrolled profile(s)", profiles.len()));

    let live_features = analyzer.feature_vector(image);
    let live_minutiae = analyzer.extract_minutiae(image);
    logs.push(format!(
        "Live capture {}x{}: {} minutiae",
        image.width(),
        image.height(),
        live_minutiae.len()
    ));

    let report = match_profiles(&live_features, &live_minutiae, &profiles, config);
    for score in &report.scores {
        debug!(
            subject = %score.subject_id,
            feature = score.feature_similarity,
            minutiae = score.minutiae_similarity,
            combined = score.combined,
            "scored profile"
        );
        logs.push(format!(
            "Profile {} => feature {:.3}, minutiae {:.3}, combined {:.3}",
            score.subject_id, score.feature_similarity, score.minutiae_similarity, score.combined
        ));
    }

    let processing_time = started.elapsed();
    let log_entry = VerificationLogEntry {
        subject_id: report.subject_id.clone(),
        profile_id: report.profile_id.clone(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        result: if report.subject_id.is_some() {
            VerificationResult::Success
        } else {
            VerificationResult::Failure
        },
        confidence: report.confidence,
        processing_ms: processing_time.as_secs_f64() * 1000.0,
        device_status: device,
    };
    store.append_verification_log(&log_entry)?;

    info!(
        subject = report.subject_id.as_deref().unwrap_or("-"),
        confidence = report.confidence,
        decision = report.decision.message(),
        "verification attempt recorded"
    );
    logs.push(format!(
        "Decision: {} (confidence {:.3})",
        report.decision.message(),
        report.confidence
    ));

    Ok(VerificationOutcome {
        subject_id: report.subject_id,
        confidence: report.confidence,
        decision: report.decision,
        scores: report.scores,
        processing_time,
        log_entry,
        logs,
    })
}

/// Pulls one image from `capture` and verifies it. A capture that yields
/// nothing is reported as `CaptureUnavailable` and nothing is logged.
pub fn verify_capture_with<C, A, S>(
    capture: &mut C,
    analyzer: &A,
    store: &S,
    config: &EngineConfig,
) -> AppResult<VerificationOutcome>
where
    C: CaptureProvider,
    A: SampleAnalyzer,
    S: ProfileStore,
{
    let image = capture.capture().ok_or_else(|| {
        AppError::CaptureUnavailable("no image was captured for verification".into())
    })?;
    run_verification_with(&image, capture.status(), analyzer, store, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometrics::store::MemoryProfileStore;
    use crate::biometrics::types::{MinutiaKind, VerificationCounters};
    use image::GrayImage;

    /// Analyzer that ignores pixels and replays fixed live data.
    struct FixedAnalyzer {
        features: Vec<f64>,
        minutiae: Vec<Minutia>,
    }

    impl SampleAnalyzer for FixedAnalyzer {
        fn quality(&self, _image: &RidgeImage) -> f64 {
            1.0
        }

        fn feature_vector(&self, _image: &RidgeImage) -> Vec<f64> {
            self.features.clone()
        }

        fn extract_minutiae(&self, _image: &RidgeImage) -> Vec<Minutia> {
            self.minutiae.clone()
        }
    }

    fn stable(kind: MinutiaKind, x: f64, y: f64, orientation: f64) -> StableMinutia {
        StableMinutia {
            kind,
            x,
            y,
            orientation,
            quality: 1.2,
            stability: 0.2,
            sample_count: 5,
        }
    }

    fn live(kind: MinutiaKind, x: f64, y: f64, orientation: f64) -> Minutia {
        Minutia {
            kind,
            x,
            y,
            orientation,
            quality: 1.3,
        }
    }

    fn profile(subject: &str, features: Vec<f64>, template: Vec<StableMinutia>) -> BiometricProfile {
        BiometricProfile {
            id: format!("id-{subject}"),
            subject_id: subject.into(),
            display_name: subject.to_uppercase(),
            created_at: "2024-01-01T00:00:00.000Z".into(),
            feature_variance: vec![0.0; features.len()],
            composite_features: features,
            stable_minutiae: template,
            sample_count: 5,
            sample_qualities: vec![0.9; 5],
            samples: Vec::new(),
            verification: VerificationCounters::default(),
        }
    }

    #[test]
    fn pair_must_share_kind_and_clear_score_floor() {
        let template = [stable(MinutiaKind::RidgeEnding, 100.0, 100.0, 0.0)];
        // d=1, dtheta=0.05 => (14/15)(1 - 1/14) ~ 0.867
        let close = [live(MinutiaKind::RidgeEnding, 101.0, 100.0, 0.05)];
        assert_eq!(minutiae_similarity(&close, &template), 1.0);

        let wrong_kind = [live(MinutiaKind::Bifurcation, 100.0, 100.0, 0.0)];
        assert_eq!(minutiae_similarity(&wrong_kind, &template), 0.0);

        // within both tolerances but the pair score is only 0.6 * 0.8
        let loose = [live(MinutiaKind::RidgeEnding, 106.0, 100.0, 0.14)];
        assert_eq!(minutiae_similarity(&loose, &template), 0.0);

        assert_eq!(minutiae_similarity(&[], &template), 0.0);
        assert_eq!(minutiae_similarity(&close, &[]), 0.0);
    }

    #[test]
    fn orientation_tolerance_wraps_around() {
        let pi = std::f64::consts::PI;
        let template = [stable(MinutiaKind::Bifurcation, 10.0, 10.0, pi - 0.01)];
        let across = [live(MinutiaKind::Bifurcation, 10.0, 10.0, -pi + 0.01)];
        assert_eq!(minutiae_similarity(&across, &template), 1.0);
    }

    #[test]
    fn medium_confidence_match_returns_subject_and_logs_success() {
        // cos = 0.75 against [1, 0]; one of two template points matched.
        let live_features = vec![0.75, 0.661_437_827_766_147_8];
        let analyzer = FixedAnalyzer {
            features: live_features,
            minutiae: vec![live(MinutiaKind::RidgeEnding, 50.0, 50.0, 0.0)],
        };
        let store = MemoryProfileStore::new();
        store
            .save_profile(&profile(
                "emp001",
                vec![1.0, 0.0],
                vec![
                    stable(MinutiaKind::RidgeEnding, 50.0, 50.0, 0.0),
                    stable(MinutiaKind::Bifurcation, 200.0, 200.0, 1.0),
                ],
            ))
            .unwrap();

        let config = EngineConfig::default();
        let device = DeviceStatus {
            connected: true,
            ready: true,
            busy: false,
        };
        let outcome =
            run_verification_with(&GrayImage::new(4, 4), device, &analyzer, &store, &config)
                .unwrap();

        assert!((outcome.confidence - 0.65).abs() < 1e-9);
        assert_eq!(outcome.decision, MatchDecision::MediumConfidence);
        assert_eq!(outcome.message(), "medium confidence match");
        assert_eq!(outcome.subject_id.as_deref(), Some("emp001"));

        let log = store.verification_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].result, VerificationResult::Success);
        assert_eq!(log[0].subject_id.as_deref(), Some("emp001"));
        assert_eq!(log[0].profile_id.as_deref(), Some("id-emp001"));
        assert_eq!(log[0].device_status, device);
        assert_eq!(
            store.load_profile("emp001").unwrap().unwrap().verification.count,
            1
        );
    }

    #[test]
    fn empty_store_reports_no_enrolled_profiles_and_logs_failure() {
        let analyzer = FixedAnalyzer {
            features: vec![1.0; 4],
            minutiae: Vec::new(),
        };
        let store = MemoryProfileStore::new();
        let outcome = run_verification_with(
            &GrayImage::new(4, 4),
            DeviceStatus::default(),
            &analyzer,
            &store,
            &EngineConfig::default(),
        )
        .unwrap();

        assert_eq!(outcome.subject_id, None);
        assert_eq!(outcome.confidence, 0.0);
        assert_eq!(outcome.message(), "no enrolled profiles");
        let log = store.verification_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].result, VerificationResult::Failure);
        assert_eq!(log[0].subject_id, None);
        assert_eq!(log[0].profile_id, None);
    }

    #[test]
    fn weak_best_score_withholds_subject() {
        let config = EngineConfig::default();
        let profiles = vec![profile("a", vec![1.0, 0.0], Vec::new())];
        // cos = 0.5 => combined 0.3
        let report = match_profiles(&[0.5, 0.866_025_403_784_438_6], &[], &profiles, &config);
        assert_eq!(report.decision, MatchDecision::NoMatch);
        assert_eq!(report.subject_id, None);
        assert_eq!(report.profile_id, None);
        assert!((report.confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn ties_keep_the_earlier_profile() {
        let config = EngineConfig::default();
        let profiles = vec![
            profile("first", vec![1.0, 0.0], Vec::new()),
            profile("second", vec![2.0, 0.0], Vec::new()),
            profile("third", vec![0.0, 1.0], Vec::new()),
        ];
        let report = match_profiles(&[1.0, 0.0], &[], &profiles, &config);
        assert_eq!(report.scores.len(), 3);
        // 0.6 alone sits exactly on the medium threshold
        assert_eq!(report.decision, MatchDecision::MediumConfidence);
        assert_eq!(report.subject_id.as_deref(), Some("first"));
        assert_eq!(report.profile_id.as_deref(), Some("id-first"));
    }

    #[test]
    fn combined_score_is_monotone_in_both_inputs() {
        let grid = [0.0, 0.2, 0.5, 0.8, 1.0];
        for f in grid {
            for pair in grid.windows(2) {
                assert!(combined_score(f, pair[0]) <= combined_score(f, pair[1]));
                assert!(combined_score(pair[0], f) <= combined_score(pair[1], f));
            }
        }
        assert_eq!(combined_score(-1.0, 0.0), 0.0);
        assert_eq!(combined_score(1.0, 1.0), 1.0);
    }

    #[test]
    fn decision_thresholds_follow_config() {
        let config = EngineConfig {
            verification_high_confidence: 0.9,
            verification_medium_confidence: 0.5,
            ..EngineConfig::default()
        };
        assert_eq!(decide(0.95, &config), MatchDecision::HighConfidence);
        assert_eq!(decide(0.85, &config), MatchDecision::MediumConfidence);
        assert_eq!(decide(0.49, &config), MatchDecision::NoMatch);
    }

    #[test]
    fn failed_capture_is_an_error_and_not_logged() {
        struct DeadSensor;
        impl CaptureProvider for DeadSensor {
            fn capture(&mut self) -> Option<RidgeImage> {
                None
            }
            fn status(&self) -> DeviceStatus {
                DeviceStatus::default()
            }
        }

        let analyzer = FixedAnalyzer {
            features: vec![1.0],
            minutiae: Vec::new(),
        };
        let store = MemoryProfileStore::new();
        let err = verify_capture_with(&mut DeadSensor, &analyzer, &store, &EngineConfig::default())
            .unwrap_err();
        assert!(matches!(err, AppError::CaptureUnavailable(_)));
        assert!(store.verification_log().unwrap().is_empty());
    }
}

use std::collections::VecDeque;

use image::{GrayImage, Luma};
use ridgemark_core::biometrics::{
    collect_statistics, run_enrollment_with, run_profile_removal_with, run_verification_with,
    verify_capture_with, EnrollmentRequest, FilesystemProfileStore, MatchDecision,
    MemoryProfileStore, ProfileStore, RidgeAnalyzer, SampleAnalyzer, VerificationResult,
    FEATURE_LENGTH,
};
use ridgemark_core::capture::{CaptureProvider, DeviceStatus, SyntheticCapture};
use ridgemark_core::{AppError, EngineConfig};
use tempfile::TempDir;

/// Hands out scripted frames first, then falls back to a synthetic finger.
struct MixedCapture {
    script: VecDeque<GrayImage>,
    finger: SyntheticCapture,
}

impl CaptureProvider for MixedCapture {
    fn capture(&mut self) -> Option<GrayImage> {
        self.script
            .pop_front()
            .or_else(|| self.finger.capture())
    }

    fn status(&self) -> DeviceStatus {
        self.finger.status()
    }
}

/// Squeezes the ridge pattern into a narrow band of mid greys.
fn washed_out(image: &GrayImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([120 + image.get_pixel(x, y)[0] / 16])
    })
}

fn request(subject: &str) -> EnrollmentRequest {
    EnrollmentRequest {
        subject_id: subject.into(),
        display_name: format!("Subject {subject}"),
    }
}

#[test]
fn enroll_verify_and_remove_against_filesystem_store() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemProfileStore::new(tmp.path().join("store"));
    let config = EngineConfig::default();
    let analyzer = RidgeAnalyzer::new(&config);

    let mut finger = SyntheticCapture::new(11);
    let outcome =
        run_enrollment_with(&request("finger-a"), &mut finger, &analyzer, &store, &config)
            .unwrap();
    assert_eq!(outcome.statistics.samples_accepted, 5);
    assert_eq!(outcome.statistics.rejections.low_quality, 0);
    assert_eq!(
        outcome.statistics.attempts,
        5 + outcome.statistics.rejections.total()
    );
    assert!(outcome.statistics.quality.min >= config.quality_threshold);
    assert_eq!(outcome.statistics.feature_dimensions, FEATURE_LENGTH);
    assert!(outcome.statistics.stable_minutiae <= config.stable_minutiae_cap);

    let stored = store.load_profile("finger-a").unwrap().unwrap();
    assert_eq!(stored.id, outcome.profile_id);
    assert_eq!(stored.composite_features.len(), FEATURE_LENGTH);
    assert!(stored
        .stable_minutiae
        .iter()
        .all(|point| point.sample_count >= 2));

    // Replaying the first enrollment frame of the same finger.
    let mut replay = SyntheticCapture::new(11);
    let live = replay.capture().unwrap();
    let verdict = run_verification_with(&live, replay.status(), &analyzer, &store, &config)
        .unwrap();
    assert!(verdict.decision.is_match(), "confidence {}", verdict.confidence);
    assert_eq!(verdict.subject_id.as_deref(), Some("finger-a"));

    let again = run_enrollment_with(
        &request("finger-a"),
        &mut SyntheticCapture::new(12),
        &analyzer,
        &store,
        &config,
    )
    .unwrap_err();
    assert!(matches!(again, AppError::DuplicateEnrollment { .. }));
    assert_eq!(store.load_profile("finger-a").unwrap().unwrap().id, stored.id);

    run_profile_removal_with("finger-a", &store).unwrap();
    let empty = verify_capture_with(&mut replay, &analyzer, &store, &config).unwrap();
    assert_eq!(empty.decision, MatchDecision::NoEnrolledProfiles);
    assert_eq!(empty.confidence, 0.0);

    let log = store.verification_log().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].result, VerificationResult::Success);
    assert_eq!(log[1].result, VerificationResult::Failure);
    assert_eq!(log[1].subject_id, None);

    let stats = collect_statistics(&store).unwrap();
    assert_eq!(stats.total_profiles, 0);
    assert_eq!(stats.total_verifications, 2);
    assert!((stats.verification_success_rate - 50.0).abs() < 1e-9);
}

#[test]
fn stored_profile_survives_a_fresh_store_handle() {
    let tmp = TempDir::new().unwrap();
    let config = EngineConfig::default();
    let analyzer = RidgeAnalyzer::new(&config);

    let writer = FilesystemProfileStore::new(tmp.path());
    run_enrollment_with(
        &request("finger-b"),
        &mut SyntheticCapture::new(5),
        &analyzer,
        &writer,
        &config,
    )
    .unwrap();
    let written = writer.load_profile("finger-b").unwrap().unwrap();

    let reader = FilesystemProfileStore::new(tmp.path());
    let all = reader.load_all_profiles().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].composite_features, written.composite_features);
    assert_eq!(all[0].stable_minutiae, written.stable_minutiae);
    assert_eq!(all[0].samples.len(), 5);
}

#[test]
fn synthetic_captures_clear_the_default_quality_gate() {
    let analyzer = RidgeAnalyzer::default();
    let threshold = EngineConfig::default().quality_threshold;
    for seed in [0, 5, 11, 21, 42] {
        let mut finger = SyntheticCapture::new(seed);
        for _ in 0..3 {
            let score = analyzer.quality(&finger.capture().unwrap());
            assert!(score >= threshold, "seed {seed}: quality {score:.3}");
        }
    }
}

#[test]
fn default_gates_turn_away_poor_frames_and_keep_enrolling() {
    let config = EngineConfig::default();
    let analyzer = RidgeAnalyzer::new(&config);
    let store = MemoryProfileStore::new();

    let mut source = SyntheticCapture::new(33);
    let good: Vec<GrayImage> = (0..4).map(|_| source.capture().unwrap()).collect();
    let flat = GrayImage::from_pixel(good[0].width(), good[0].height(), Luma([128]));
    let faint = washed_out(&good[1]);
    assert!(analyzer.quality(&flat) < config.quality_threshold);
    assert!(analyzer.quality(&faint) < config.quality_threshold);

    let mut capture = MixedCapture {
        script: VecDeque::from(vec![
            flat.clone(),
            good[0].clone(),
            faint,
            good[2].clone(),
            flat,
            good[3].clone(),
        ]),
        finger: source,
    };
    let outcome =
        run_enrollment_with(&request("finger-c"), &mut capture, &analyzer, &store, &config)
            .unwrap();

    let stats = &outcome.statistics;
    assert_eq!(stats.samples_accepted, 5);
    assert_eq!(stats.rejections.low_quality, 3);
    assert_eq!(stats.attempts, 5 + stats.rejections.total());
    let profile = store.load_profile("finger-c").unwrap().unwrap();
    assert!(profile
        .sample_qualities
        .iter()
        .all(|quality| *quality >= config.quality_threshold));
    assert!(outcome
        .logs
        .iter()
        .any(|line| line.contains("rejected: quality")));
}

use std::mem;
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::biometrics::analyzer::{RidgeAnalyzer, SampleAnalyzer};
use crate::biometrics::consistency::check_consistency;
use crate::biometrics::profile::build_profile_template;
use crate::biometrics::statistics::{EnrollmentStatistics, QualitySummary, RejectionCounts};
use crate::biometrics::store::{FilesystemProfileStore, ProfileStore};
use crate::biometrics::types::{BiometricProfile, RidgeImage, Sample, SampleRecord};
use crate::capture::{CaptureBackend, CaptureProvider, CaptureSource};
use crate::config::EngineConfig;
use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentState {
    Idle,
    Capturing,
    Scoring,
    ConsistencyCheck,
    Accepted,
    Retry,
    BuildingProfile,
    Stored,
    Failed,
}

impl EnrollmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentState::Idle => "idle",
            EnrollmentState::Capturing => "capturing",
            EnrollmentState::Scoring => "scoring",
            EnrollmentState::ConsistencyCheck => "consistency_check",
            EnrollmentState::Accepted => "accepted",
            EnrollmentState::Retry => "retry",
            EnrollmentState::BuildingProfile => "building_profile",
            EnrollmentState::Stored => "stored",
            EnrollmentState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EnrollmentState::Stored | EnrollmentState::Failed)
    }
}

/// Why a capture was turned away. The session stays on the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    CaptureUnavailable,
    LowQuality { score: f64, threshold: f64 },
    InconsistentSample { similarity: f64, threshold: f64 },
}

impl RejectReason {
    pub fn describe(&self) -> String {
        match self {
            RejectReason::CaptureUnavailable => "no image captured".to_string(),
            RejectReason::LowQuality { score, threshold } => {
                format!("quality {score:.3} below threshold {threshold:.3}")
            }
            RejectReason::InconsistentSample {
                similarity,
                threshold,
            } => format!(
                "mean similarity {similarity:.3} to accepted samples below {threshold:.3}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Accepted {
        slot: usize,
        quality: f64,
        minutiae: usize,
        remaining: usize,
    },
    Retry {
        slot: usize,
        reason: RejectReason,
    },
}

#[derive(Debug, Clone)]
pub struct EnrollmentRequest {
    pub subject_id: String,
    pub display_name: String,
}

#[derive(Debug)]
pub struct EnrollmentOutcome {
    pub subject_id: String,
    pub display_name: String,
    pub profile_id: String,
    pub statistics: EnrollmentStatistics,
    pub samples: Vec<SampleRecord>,
    pub logs: Vec<String>,
}

/// One subject's capture session. Accepted samples live only inside the
/// session and are dropped on `commit` or `abandon`.
pub struct EnrollmentSession<'a, A> {
    subject_id: String,
    display_name: String,
    config: &'a EngineConfig,
    analyzer: &'a A,
    state: EnrollmentState,
    samples: Vec<Sample>,
    attempts: u32,
    rejections: RejectionCounts,
    started_at: DateTime<Utc>,
    logs: Vec<String>,
}

impl<'a, A: SampleAnalyzer> EnrollmentSession<'a, A> {
    /// Opens a session, refusing subjects that already have a profile.
    pub fn begin<S: ProfileStore>(
        request: &EnrollmentRequest,
        config: &'a EngineConfig,
        analyzer: &'a A,
        store: &S,
    ) -> AppResult<Self> {
        validate_subject_id(&request.subject_id)?;
        if store.profile_exists(&request.subject_id)? {
            warn!(subject = %request.subject_id, "enrollment refused: profile exists");
            return Err(AppError::DuplicateEnrollment {
                subject: request.subject_id.clone(),
            });
        }

        let display_name = match request.display_name.trim() {
            "" => request.subject_id.clone(),
            name => name.to_string(),
        };
        info!(
            subject = %request.subject_id,
            required = config.required_sample_count,
            "starting enrollment session"
        );

        Ok(Self {
            logs: vec![format!(
                "Enrollment started for {} ({}); {} sample(s) required",
                display_name, request.subject_id, config.required_sample_count
            )],
            subject_id: request.subject_id.clone(),
            display_name,
            config,
            analyzer,
            state: EnrollmentState::Idle,
            samples: Vec::with_capacity(config.required_sample_count),
            attempts: 0,
            rejections: RejectionCounts::default(),
            started_at: Utc::now(),
        })
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn state(&self) -> EnrollmentState {
        self.state
    }

    /// 1-based slot the next accepted sample will fill.
    pub fn slot(&self) -> usize {
        self.samples.len() + 1
    }

    pub fn accepted(&self) -> usize {
        self.samples.len()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn rejections(&self) -> RejectionCounts {
        self.rejections
    }

    pub fn is_complete(&self) -> bool {
        self.samples.len() >= self.config.required_sample_count
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    /// Marks the session as waiting on the reader for `slot()`. Callers run
    /// this before blocking on a capture so the state is visible meanwhile.
    pub fn begin_capture(&mut self) -> AppResult<usize> {
        if self.state.is_terminal() || self.is_complete() {
            return Err(self.closed());
        }
        self.state = EnrollmentState::Capturing;
        Ok(self.slot())
    }

    /// Runs one capture result through the quality and consistency gates.
    pub fn offer(
        &mut self,
        image: Option<RidgeImage>,
        capture_duration: Duration,
    ) -> AppResult<StepOutcome> {
        if self.state.is_terminal() || self.is_complete() {
            return Err(self.closed());
        }

        self.attempts += 1;
        let slot = self.slot();

        let Some(image) = image else {
            self.rejections.capture_unavailable += 1;
            return Ok(self.retry(slot, RejectReason::CaptureUnavailable));
        };

        self.state = EnrollmentState::Scoring;
        let quality = self.analyzer.quality(&image);
        if quality < self.config.quality_threshold {
            self.rejections.low_quality += 1;
            return Ok(self.retry(
                slot,
                RejectReason::LowQuality {
                    score: quality,
                    threshold: self.config.quality_threshold,
                },
            ));
        }

        self.state = EnrollmentState::ConsistencyCheck;
        let features = self.analyzer.feature_vector(&image);
        let verdict = check_consistency(
            &features,
            self.samples.iter().map(|sample| sample.features.as_slice()),
            self.config.consistency_threshold,
        );
        if !verdict.consistent {
            self.rejections.inconsistent += 1;
            return Ok(self.retry(
                slot,
                RejectReason::InconsistentSample {
                    similarity: verdict.mean_similarity.unwrap_or(0.0),
                    threshold: self.config.consistency_threshold,
                },
            ));
        }

        let minutiae = self.analyzer.extract_minutiae(&image);
        let minutiae_count = minutiae.len();
        self.samples.push(Sample {
            image,
            quality,
            features,
            minutiae,
            captured_at: Utc::now(),
            capture_duration,
        });
        self.state = EnrollmentState::Accepted;

        let remaining = self.config.required_sample_count - self.samples.len();
        info!(
            subject = %self.subject_id,
            slot,
            quality,
            minutiae = minutiae_count,
            remaining,
            "sample accepted"
        );
        self.logs.push(format!(
            "Sample {slot}/{} accepted: quality {quality:.3}, {minutiae_count} minutiae",
            self.config.required_sample_count
        ));

        Ok(StepOutcome::Accepted {
            slot,
            quality,
            minutiae: minutiae_count,
            remaining,
        })
    }

    /// Builds and persists the profile once every slot is filled.
    pub fn commit<S: ProfileStore>(&mut self, store: &S) -> AppResult<EnrollmentOutcome> {
        if self.state.is_terminal() {
            return Err(self.closed());
        }
        if !self.is_complete() {
            return Err(self.abandon());
        }

        self.state = EnrollmentState::BuildingProfile;
        let samples = mem::take(&mut self.samples);
        let result = self.persist(&samples, store);
        self.state = match result {
            Ok(_) => EnrollmentState::Stored,
            Err(_) => EnrollmentState::Failed,
        };
        result
    }

    fn persist<S: ProfileStore>(
        &mut self,
        samples: &[Sample],
        store: &S,
    ) -> AppResult<EnrollmentOutcome> {
        let template = build_profile_template(samples, self.config)?;
        let pooled_minutiae = template.pooled_minutiae;
        let stable_minutiae = template.stable_minutiae.len();
        let feature_dimensions = template.composite_features.len();
        self.logs.push(format!(
            "Built composite template: {stable_minutiae} stable of {pooled_minutiae} pooled minutiae, {feature_dimensions} feature dimensions"
        ));

        let profile =
            BiometricProfile::assemble(&self.subject_id, &self.display_name, template, samples);
        let profile_id = store.save_profile(&profile)?;
        self.logs.push(format!(
            "Stored biometric profile {profile_id} for subject {}",
            self.subject_id
        ));

        let qualities: Vec<f64> = samples.iter().map(|sample| sample.quality).collect();
        let total_minutiae: usize = samples.iter().map(|sample| sample.minutiae.len()).sum();
        let statistics = EnrollmentStatistics {
            started_at: self
                .started_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            finished_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            attempts: self.attempts,
            samples_accepted: samples.len(),
            rejections: self.rejections,
            quality: QualitySummary::from_scores(&qualities),
            total_capture_ms: samples
                .iter()
                .map(|sample| sample.capture_duration.as_millis() as u64)
                .sum(),
            mean_minutiae_per_sample: total_minutiae as f64 / samples.len() as f64,
            pooled_minutiae,
            stable_minutiae,
            feature_dimensions,
        };

        Ok(EnrollmentOutcome {
            subject_id: self.subject_id.clone(),
            display_name: self.display_name.clone(),
            profile_id,
            statistics,
            samples: profile.samples,
            logs: self.logs.clone(),
        })
    }

    /// Ends the session without persisting anything. The returned error is
    /// what the caller should report.
    pub fn abandon(&mut self) -> AppError {
        if self.state.is_terminal() {
            return self.closed();
        }
        let accepted = self.samples.len();
        self.samples.clear();
        self.state = EnrollmentState::Failed;
        warn!(
            subject = %self.subject_id,
            accepted,
            attempts = self.attempts,
            "enrollment abandoned"
        );
        AppError::InsufficientSamples {
            subject: self.subject_id.clone(),
            accepted,
            required: self.config.required_sample_count,
            attempts: self.attempts,
        }
    }

    fn retry(&mut self, slot: usize, reason: RejectReason) -> StepOutcome {
        self.state = EnrollmentState::Retry;
        warn!(subject = %self.subject_id, slot, reason = %reason.describe(), "sample rejected");
        self.logs
            .push(format!("Sample {slot} rejected: {}", reason.describe()));
        StepOutcome::Retry { slot, reason }
    }

    fn closed(&self) -> AppError {
        AppError::SessionClosed {
            subject: self.subject_id.clone(),
            state: self.state.as_str().to_string(),
        }
    }
}

pub fn run_enrollment(
    request: &EnrollmentRequest,
    backend: &CaptureBackend,
    store_dir: &Path,
    config: &EngineConfig,
) -> AppResult<EnrollmentOutcome> {
    let mut capture = CaptureSource::open(backend)?;
    let analyzer = RidgeAnalyzer::new(config);
    let store = FilesystemProfileStore::new(store_dir);
    run_enrollment_with(request, &mut capture, &analyzer, &store, config)
}

/// Drives a session from a capture provider until it completes or runs out
/// of capture attempts.
pub fn run_enrollment_with<C, A, S>(
    request: &EnrollmentRequest,
    capture: &mut C,
    analyzer: &A,
    store: &S,
    config: &EngineConfig,
) -> AppResult<EnrollmentOutcome>
where
    C: CaptureProvider,
    A: SampleAnalyzer,
    S: ProfileStore,
{
    let mut session = EnrollmentSession::begin(request, config, analyzer, store)?;

    while !session.is_complete() {
        if session.attempts() >= config.max_capture_attempts {
            return Err(session.abandon());
        }
        session.begin_capture()?;
        let started = Instant::now();
        let image = capture.capture();
        session.offer(image, started.elapsed())?;
    }

    session.commit(store)
}

#[derive(Debug)]
pub struct ProfileRemovalOutcome {
    pub subject_id: String,
    pub logs: Vec<String>,
}

pub fn run_profile_removal(subject_id: &str, store_dir: &Path) -> AppResult<ProfileRemovalOutcome> {
    let store = FilesystemProfileStore::new(store_dir);
    run_profile_removal_with(subject_id, &store)
}

pub fn run_profile_removal_with<S: ProfileStore>(
    subject_id: &str,
    store: &S,
) -> AppResult<ProfileRemovalOutcome> {
    validate_subject_id(subject_id)?;
    if !store.delete_profile(subject_id)? {
        return Err(AppError::ProfileNotFound {
            subject: subject_id.to_string(),
        });
    }
    Ok(ProfileRemovalOutcome {
        subject_id: subject_id.to_string(),
        logs: vec![
            format!("Removed biometric profile for subject {subject_id}"),
            "Verification history retained".to_string(),
        ],
    })
}

/// Subject ids double as store file names.
pub fn validate_subject_id(subject_id: &str) -> AppResult<()> {
    if subject_id.is_empty() {
        return Err(AppError::InvalidSubject {
            subject: subject_id.to_string(),
            message: "subject id cannot be empty".into(),
        });
    }

    if !subject_id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(AppError::InvalidSubject {
            subject: subject_id.to_string(),
            message: "use ASCII letters, numbers, '-' or '_' only".into(),
        });
    }

    Ok(())
}

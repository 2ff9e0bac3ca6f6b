pub mod analyzer;
pub mod consistency;
pub mod enrollment;
pub mod features;
pub(crate) mod imaging;
pub mod matcher;
pub mod minutiae;
pub mod profile;
pub mod quality;
pub mod statistics;
pub mod store;
pub mod types;

pub use analyzer::{RidgeAnalyzer, SampleAnalyzer};

pub use consistency::{check_consistency, cosine_similarity, ConsistencyVerdict};

pub use enrollment::{
    run_enrollment, run_enrollment_with, run_profile_removal, run_profile_removal_with,
    validate_subject_id, EnrollmentOutcome, EnrollmentRequest, EnrollmentSession,
    EnrollmentState, ProfileRemovalOutcome, RejectReason, StepOutcome,
};

pub use features::{feature_vector, FEATURE_LENGTH};

pub use matcher::{
    combined_score, decide, match_profiles, minutiae_similarity, run_image_verification,
    run_verification, run_verification_with, score_profile, verify_capture_with,
    MatchDecision, MatchReport, ProfileScore, VerificationOutcome,
};

pub use minutiae::extract_minutiae;

pub use profile::{
    build_profile_template, feature_statistics, stabilize_minutiae, ProfileTemplate,
};

pub use quality::{assess_quality, quality_score, QualityReport};

pub use statistics::{
    collect_statistics, EnrollmentStatistics, QualitySummary, RejectionCounts, StoreStatistics,
};

pub use store::{FilesystemProfileStore, MemoryProfileStore, ProfileStore};

pub use types::{
    BiometricProfile, Minutia, MinutiaKind, RidgeImage, Sample, SampleRecord, StableMinutia,
    VerificationCounters, VerificationLogEntry, VerificationResult,
};

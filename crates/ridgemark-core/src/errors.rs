use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use image::ImageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("input file not found or unreadable: {path}")]
    MissingInput { path: PathBuf },

    #[error("failed to decode image {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: ImageError,
    },

    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("invalid subject id '{subject}': {message}")]
    InvalidSubject { subject: String, message: String },

    #[error("biometric profile already exists for subject {subject}")]
    DuplicateEnrollment { subject: String },

    #[error(
        "insufficient samples for subject {subject}: accepted {accepted}/{required} after {attempts} capture attempt(s)"
    )]
    InsufficientSamples {
        subject: String,
        accepted: usize,
        required: usize,
        attempts: u32,
    },

    #[error("enrollment session for subject {subject} is {state}; no further samples accepted")]
    SessionClosed { subject: String, state: String },

    #[error("invalid sample set: {0}")]
    InvalidSampleSet(String),

    #[error("no biometric profile found for subject {subject}")]
    ProfileNotFound { subject: String },

    #[error("failed to write profile store {path}: {source}")]
    ProfileWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read profile store {path}: {source}")]
    ProfileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("profile document {path} is invalid: {message}")]
    InvalidProfileFile { path: PathBuf, message: String },

    #[error("profile document {path} uses unsupported format version {version}")]
    UnsupportedProfileVersion { path: PathBuf, version: u32 },

    #[error("failed to append verification log {path}: {source}")]
    LogWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("verification log {path} is corrupt at line {line}: {message}")]
    CorruptLog {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("profile store unavailable: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },
}

impl AppError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            AppError::MissingInput { .. } => ExitCode::from(2),
            AppError::ImageDecode { .. } => ExitCode::from(2),
            AppError::InvalidSubject { .. } => ExitCode::from(2),
            AppError::ConfigRead { .. } => ExitCode::from(2),
            AppError::ConfigParse { .. } => ExitCode::from(2),
            AppError::CaptureUnavailable(_) => ExitCode::from(3),
            AppError::InsufficientSamples { .. } => ExitCode::from(3),
            AppError::DuplicateEnrollment { .. } => ExitCode::from(4),
            AppError::ProfileNotFound { .. } => ExitCode::from(4),
            AppError::ProfileWrite { .. } => ExitCode::from(5),
            AppError::ProfileRead { .. } => ExitCode::from(5),
            AppError::InvalidProfileFile { .. } => ExitCode::from(5),
            AppError::UnsupportedProfileVersion { .. } => ExitCode::from(5),
            AppError::LogWrite { .. } => ExitCode::from(5),
            AppError::CorruptLog { .. } => ExitCode::from(5),
            AppError::Storage(_) => ExitCode::from(5),
            _ => ExitCode::from(1),
        }
    }

    /// Stable machine-readable label used in JSON error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::MissingInput { .. } | AppError::ImageDecode { .. } => "invalid_input",
            AppError::CaptureUnavailable(_) => "capture_unavailable",
            AppError::InvalidSubject { .. } => "invalid_subject",
            AppError::DuplicateEnrollment { .. } => "duplicate_enrollment",
            AppError::InsufficientSamples { .. } => "insufficient_samples",
            AppError::SessionClosed { .. } => "session_closed",
            AppError::InvalidSampleSet(_) => "invalid_sample_set",
            AppError::ProfileNotFound { .. } => "profile_not_found",
            AppError::ProfileWrite { .. }
            | AppError::ProfileRead { .. }
            | AppError::InvalidProfileFile { .. }
            | AppError::UnsupportedProfileVersion { .. }
            | AppError::LogWrite { .. }
            | AppError::CorruptLog { .. }
            | AppError::Storage(_) => "storage_failure",
            AppError::ConfigRead { .. } | AppError::ConfigParse { .. } => "configuration",
            AppError::Io(_) | AppError::Serialization(_) => "internal",
        }
    }

    pub fn human_message(&self) -> String {
        self.to_string()
    }
}

pub type AppResult<T> = Result<T, AppError>;

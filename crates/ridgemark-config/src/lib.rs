use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use ridgemark_core::config::{
    DEFAULT_CONSISTENCY_THRESHOLD, DEFAULT_HIGH_CONFIDENCE, DEFAULT_MAX_CAPTURE_ATTEMPTS,
    DEFAULT_MAX_MINUTIAE_PER_SAMPLE, DEFAULT_MEDIUM_CONFIDENCE, DEFAULT_QUALITY_THRESHOLD,
    DEFAULT_REQUIRED_SAMPLE_COUNT, DEFAULT_STABLE_MINUTIAE_CAP,
};
use ridgemark_core::config::DEFAULT_NEIGHBOURHOOD;

pub const PRIMARY_CONFIG_PATH: &str = "/etc/ridgemark/config.toml";
pub const SECONDARY_CONFIG_PATH: &str = "/usr/local/etc/ridgemark/config.toml";
pub const DEFAULT_STORE_DIR: &str = "/var/lib/ridgemark";
pub const DEFAULT_CAPTURE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_POLL_INTERVAL_MILLIS: u64 = 200;
pub const DEFAULT_SYNTHETIC_SEED: u64 = 0;
pub const DEFAULT_ENDING_CELLS: [usize; 2] = [
    DEFAULT_NEIGHBOURHOOD.ending_min,
    DEFAULT_NEIGHBOURHOOD.ending_max,
];
pub const DEFAULT_BIFURCATION_CELLS: [usize; 2] = [
    DEFAULT_NEIGHBOURHOOD.bifurcation_min,
    DEFAULT_NEIGHBOURHOOD.bifurcation_max,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackendKind {
    #[default]
    Synthetic,
    Directory,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub required_sample_count: Option<usize>,
    pub quality_threshold: Option<f64>,
    pub consistency_threshold: Option<f64>,
    pub max_minutiae_per_sample: Option<usize>,
    pub stable_minutiae_cap: Option<usize>,
    pub verification_high_confidence: Option<f64>,
    pub verification_medium_confidence: Option<f64>,
    pub max_capture_attempts: Option<u32>,
    pub minutia_ending_cells: Option<[usize; 2]>,
    pub minutia_bifurcation_cells: Option<[usize; 2]>,
    pub store_dir: Option<PathBuf>,
    pub capture_backend: Option<CaptureBackendKind>,
    pub capture_dir: Option<PathBuf>,
    pub capture_timeout_secs: Option<u64>,
    pub poll_interval_millis: Option<u64>,
    pub synthetic_seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub required_sample_count: usize,
    pub quality_threshold: f64,
    pub consistency_threshold: f64,
    pub max_minutiae_per_sample: usize,
    pub stable_minutiae_cap: usize,
    pub verification_high_confidence: f64,
    pub verification_medium_confidence: f64,
    pub max_capture_attempts: u32,
    pub minutia_ending_cells: [usize; 2],
    pub minutia_bifurcation_cells: [usize; 2],
    pub store_dir: PathBuf,
    pub capture_backend: CaptureBackendKind,
    /// Only meaningful for the directory backend.
    pub capture_dir: Option<PathBuf>,
    pub capture_timeout: Duration,
    pub poll_interval: Duration,
    pub synthetic_seed: u64,
}

impl ResolvedConfig {
    pub fn from_raw(raw: ConfigFile) -> Self {
        Self {
            required_sample_count: raw
                .required_sample_count
                .unwrap_or(DEFAULT_REQUIRED_SAMPLE_COUNT)
                .max(1),
            quality_threshold: raw.quality_threshold.unwrap_or(DEFAULT_QUALITY_THRESHOLD),
            consistency_threshold: raw
                .consistency_threshold
                .unwrap_or(DEFAULT_CONSISTENCY_THRESHOLD),
            max_minutiae_per_sample: raw
                .max_minutiae_per_sample
                .unwrap_or(DEFAULT_MAX_MINUTIAE_PER_SAMPLE),
            stable_minutiae_cap: raw
                .stable_minutiae_cap
                .unwrap_or(DEFAULT_STABLE_MINUTIAE_CAP),
            verification_high_confidence: raw
                .verification_high_confidence
                .unwrap_or(DEFAULT_HIGH_CONFIDENCE),
            verification_medium_confidence: raw
                .verification_medium_confidence
                .unwrap_or(DEFAULT_MEDIUM_CONFIDENCE),
            max_capture_attempts: raw
                .max_capture_attempts
                .unwrap_or(DEFAULT_MAX_CAPTURE_ATTEMPTS)
                .max(1),
            minutia_ending_cells: raw.minutia_ending_cells.unwrap_or(DEFAULT_ENDING_CELLS),
            minutia_bifurcation_cells: raw
                .minutia_bifurcation_cells
                .unwrap_or(DEFAULT_BIFURCATION_CELLS),
            store_dir: raw
                .store_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR)),
            capture_backend: raw.capture_backend.unwrap_or_default(),
            capture_dir: raw.capture_dir,
            capture_timeout: Duration::from_secs(
                raw.capture_timeout_secs
                    .unwrap_or(DEFAULT_CAPTURE_TIMEOUT_SECS),
            ),
            poll_interval: Duration::from_millis(
                raw.poll_interval_millis
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MILLIS)
                    .max(1),
            ),
            synthetic_seed: raw.synthetic_seed.unwrap_or(DEFAULT_SYNTHETIC_SEED),
        }
    }
}

impl ResolvedConfig {
    /// Rejects settings the engine cannot act on sensibly. Every problem is
    /// listed, separated by "; ".
    pub fn validate(&self) -> Result<(), String> {
        let mut problems = Vec::new();
        let unit = 0.0..=1.0;
        for (key, value) in [
            ("quality_threshold", self.quality_threshold),
            ("verification_high_confidence", self.verification_high_confidence),
            ("verification_medium_confidence", self.verification_medium_confidence),
        ] {
            if !unit.contains(&value) {
                problems.push(format!("{key} must be within [0, 1], got {value}"));
            }
        }
        if !(-1.0..=1.0).contains(&self.consistency_threshold) {
            problems.push(format!(
                "consistency_threshold must be within [-1, 1], got {}",
                self.consistency_threshold
            ));
        }
        if self.verification_medium_confidence > self.verification_high_confidence {
            problems.push(format!(
                "verification_medium_confidence ({}) exceeds verification_high_confidence ({})",
                self.verification_medium_confidence, self.verification_high_confidence
            ));
        }

        let ending = self.minutia_ending_cells;
        let bifurcation = self.minutia_bifurcation_cells;
        for (key, [min, max]) in [
            ("minutia_ending_cells", ending),
            ("minutia_bifurcation_cells", bifurcation),
        ] {
            if min > max {
                problems.push(format!("{key} range [{min}, {max}] is inverted"));
            }
        }
        if ending[0] <= bifurcation[1] && bifurcation[0] <= ending[1] {
            problems.push(format!(
                "minutia_ending_cells {ending:?} overlaps minutia_bifurcation_cells {bifurcation:?}"
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::from_raw(ConfigFile::default())
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub contents: ConfigFile,
    pub source: PathBuf,
}

impl LoadedConfig {
    pub fn new(contents: ConfigFile, source: PathBuf) -> Self {
        Self { contents, source }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfigWithSource {
    pub resolved: ResolvedConfig,
    pub source: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid settings in {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// Resolves a loaded file and checks the result.
pub fn resolve_loaded(entry: LoadedConfig) -> Result<ResolvedConfig, ConfigError> {
    let resolved = ResolvedConfig::from_raw(entry.contents);
    resolved
        .validate()
        .map_err(|message| ConfigError::Invalid {
            path: entry.source,
            message,
        })?;
    Ok(resolved)
}

pub fn default_config_paths() -> [PathBuf; 2] {
    [
        PathBuf::from(PRIMARY_CONFIG_PATH),
        PathBuf::from(SECONDARY_CONFIG_PATH),
    ]
}

pub fn load_config() -> Result<Option<LoadedConfig>, ConfigError> {
    load_from_paths(&default_config_paths())
}

pub fn load_resolved_config() -> Result<ResolvedConfigWithSource, ConfigError> {
    load_resolved_from_paths(&default_config_paths())
}

/// First readable file wins; missing files are skipped.
pub fn load_from_paths(paths: &[PathBuf]) -> Result<Option<LoadedConfig>, ConfigError> {
    for path in paths {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let parsed =
                    toml::from_str::<ConfigFile>(&contents).map_err(|err| ConfigError::Parse {
                        path: path.clone(),
                        message: err.to_string(),
                    })?;
                return Ok(Some(LoadedConfig::new(parsed, path.clone())));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source: err,
                })
            }
        }
    }

    Ok(None)
}

pub fn load_resolved_from_paths(
    paths: &[PathBuf],
) -> Result<ResolvedConfigWithSource, ConfigError> {
    match load_from_paths(paths)? {
        Some(entry) => {
            let source = entry.source.clone();
            Ok(ResolvedConfigWithSource {
                resolved: resolve_loaded(entry)?,
                source: Some(source),
            })
        }
        None => Ok(ResolvedConfigWithSource {
            resolved: ResolvedConfig::default(),
            source: None,
        }),
    }
}

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use ridgemark_config::{
    default_config_paths, load_from_paths, resolve_loaded, CaptureBackendKind, ConfigError,
    ResolvedConfig,
};
use ridgemark_core::capture::CaptureBackend;
use ridgemark_core::errors::{AppError, AppResult};
use ridgemark_core::{EngineConfig, NeighbourhoodRule};

pub const STORE_DIR_ENV: &str = "RIDGEMARK_STORE_DIR";

/// Everything a command needs after flags, environment and config file are merged.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub engine: EngineConfig,
    pub store_dir: PathBuf,
    pub resolved: ResolvedConfig,
    pub source: Option<PathBuf>,
}

impl Settings {
    /// `--seed` and `--capture-dir` win over the configured backend.
    pub fn capture_backend(
        &self,
        seed: Option<u64>,
        capture_dir: Option<&Path>,
    ) -> AppResult<CaptureBackend> {
        if let Some(seed) = seed {
            return Ok(CaptureBackend::Synthetic { seed });
        }
        if let Some(dir) = capture_dir {
            return Ok(self.directory_backend(dir.to_path_buf()));
        }
        match self.resolved.capture_backend {
            CaptureBackendKind::Synthetic => Ok(CaptureBackend::Synthetic {
                seed: self.resolved.synthetic_seed,
            }),
            CaptureBackendKind::Directory => match &self.resolved.capture_dir {
                Some(dir) => Ok(self.directory_backend(dir.clone())),
                None => Err(AppError::CaptureUnavailable(
                    "capture_backend is \"directory\" but no capture_dir is configured".into(),
                )),
            },
        }
    }

    fn directory_backend(&self, dir: PathBuf) -> CaptureBackend {
        CaptureBackend::Directory {
            dir,
            timeout: self.resolved.capture_timeout,
            poll_interval: self.resolved.poll_interval,
        }
    }
}

pub fn load_settings(config: Option<&Path>, store_dir: Option<PathBuf>) -> AppResult<Settings> {
    let sources = match config {
        Some(path) => vec![path.to_path_buf()],
        None => default_config_paths().to_vec(),
    };
    let env_store_dir = env::var_os(STORE_DIR_ENV).map(PathBuf::from);
    load_settings_with_sources(&sources, config.is_some(), store_dir, env_store_dir)
}

fn load_settings_with_sources(
    sources: &[PathBuf],
    required: bool,
    cli_store_dir: Option<PathBuf>,
    env_store_dir: Option<PathBuf>,
) -> AppResult<Settings> {
    let loaded = load_from_paths(sources).map_err(config_error)?;
    if required && loaded.is_none() {
        if let Some(path) = sources.first() {
            return Err(AppError::ConfigRead {
                path: path.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "configuration file not found"),
            });
        }
    }

    let (resolved, file_store_dir, source) = match loaded {
        Some(entry) => {
            tracing::debug!(source = %entry.source().display(), "loaded configuration");
            let source = entry.source.clone();
            let file_store_dir = entry.contents.store_dir.clone();
            let resolved = resolve_loaded(entry).map_err(config_error)?;
            (resolved, file_store_dir, Some(source))
        }
        None => (ResolvedConfig::default(), None, None),
    };

    // Flag, then environment, then the config file, then the built-in default.
    let store_dir = cli_store_dir
        .or(env_store_dir)
        .or(file_store_dir)
        .unwrap_or_else(|| resolved.store_dir.clone());

    Ok(Settings {
        engine: engine_config(&resolved),
        store_dir,
        resolved,
        source,
    })
}

pub fn engine_config(resolved: &ResolvedConfig) -> EngineConfig {
    let [ending_min, ending_max] = resolved.minutia_ending_cells;
    let [bifurcation_min, bifurcation_max] = resolved.minutia_bifurcation_cells;
    EngineConfig {
        required_sample_count: resolved.required_sample_count,
        quality_threshold: resolved.quality_threshold,
        consistency_threshold: resolved.consistency_threshold,
        max_minutiae_per_sample: resolved.max_minutiae_per_sample,
        stable_minutiae_cap: resolved.stable_minutiae_cap,
        verification_high_confidence: resolved.verification_high_confidence,
        verification_medium_confidence: resolved.verification_medium_confidence,
        max_capture_attempts: resolved.max_capture_attempts,
        neighbourhood: NeighbourhoodRule {
            ending_min,
            ending_max,
            bifurcation_min,
            bifurcation_max,
        },
    }
}

fn config_error(err: ConfigError) -> AppError {
    match err {
        ConfigError::Read { path, source } => AppError::ConfigRead { path, source },
        ConfigError::Parse { path, message } | ConfigError::Invalid { path, message } => {
            AppError::ConfigParse { path, message }
        }
    }
}

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::biometrics::enrollment::validate_subject_id;
use crate::biometrics::types::{BiometricProfile, VerificationCounters, VerificationLogEntry};
use crate::errors::{AppError, AppResult};

pub const PROFILE_DOCUMENT_VERSION: u32 = 1;
const PROFILES_DIR: &str = "profiles";
const VERIFICATION_LOG_FILE: &str = "verification.jsonl";

/// Durable home of enrolled profiles and the verification log.
///
/// `save_profile` must refuse to replace an existing profile for the same
/// subject even when two callers race; the loser sees `DuplicateEnrollment`.
pub trait ProfileStore {
    fn profile_exists(&self, subject_id: &str) -> AppResult<bool>;
    /// Persists a new profile and returns its id.
    fn save_profile(&self, profile: &BiometricProfile) -> AppResult<String>;
    fn load_profile(&self, subject_id: &str) -> AppResult<Option<BiometricProfile>>;
    fn load_all_profiles(&self) -> AppResult<Vec<BiometricProfile>>;
    /// Returns `false` when there was nothing to delete.
    fn delete_profile(&self, subject_id: &str) -> AppResult<bool>;
    fn append_verification_log(&self, entry: &VerificationLogEntry) -> AppResult<()>;
    fn verification_log(&self) -> AppResult<Vec<VerificationLogEntry>>;
}

#[derive(Serialize)]
struct ProfileDocumentRef<'a> {
    version: u32,
    profile: &'a BiometricProfile,
}

#[derive(Deserialize)]
struct ProfileDocument {
    profile: BiometricProfile,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

/// One pretty-printed JSON document per subject under `<root>/profiles/`,
/// plus a JSON-lines verification log at `<root>/verification.jsonl`.
#[derive(Debug, Clone)]
pub struct FilesystemProfileStore {
    root: PathBuf,
}

impl FilesystemProfileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join(PROFILES_DIR)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(VERIFICATION_LOG_FILE)
    }

    pub fn profile_path(&self, subject_id: &str) -> AppResult<PathBuf> {
        validate_subject_id(subject_id)?;
        Ok(self.profiles_dir().join(format!("{subject_id}.json")))
    }

    fn counters(&self) -> AppResult<HashMap<String, VerificationCounters>> {
        Ok(VerificationCounters::tally(&self.verification_log()?))
    }
}

impl ProfileStore for FilesystemProfileStore {
    fn profile_exists(&self, subject_id: &str) -> AppResult<bool> {
        Ok(self.profile_path(subject_id)?.exists())
    }

    fn save_profile(&self, profile: &BiometricProfile) -> AppResult<String> {
        let path = self.profile_path(&profile.subject_id)?;
        write_profile_document(&path, profile)?;
        info!(
            subject = %profile.subject_id,
            profile_id = %profile.id,
            path = %path.display(),
            "stored biometric profile"
        );
        Ok(profile.id.clone())
    }

    fn load_profile(&self, subject_id: &str) -> AppResult<Option<BiometricProfile>> {
        let path = self.profile_path(subject_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let mut profile = read_profile_document(&path)?;
        if let Some(counters) = self.counters()?.remove(&profile.id) {
            profile.verification = counters;
        }
        Ok(Some(profile))
    }

    fn load_all_profiles(&self) -> AppResult<Vec<BiometricProfile>> {
        let dir = self.profiles_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(AppError::ProfileRead { path: dir, source }),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| AppError::ProfileRead {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            let hidden = path
                .file_name()
                .and_then(|name| name.to_str())
                .map_or(true, |name| name.starts_with('.'));
            let is_document = path.extension().and_then(|ext| ext.to_str()) == Some("json");
            if is_document && !hidden {
                paths.push(path);
            }
        }
        paths.sort();

        let mut counters = self.counters()?;
        let mut profiles = Vec::with_capacity(paths.len());
        for path in paths {
            let mut profile = read_profile_document(&path)?;
            if let Some(tally) = counters.remove(&profile.id) {
                profile.verification = tally;
            }
            profiles.push(profile);
        }
        debug!(count = profiles.len(), dir = %dir.display(), "loaded profiles");
        Ok(profiles)
    }

    fn delete_profile(&self, subject_id: &str) -> AppResult<bool> {
        let path = self.profile_path(subject_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(subject = %subject_id, "removed biometric profile");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(AppError::ProfileWrite { path, source }),
        }
    }

    fn append_verification_log(&self, entry: &VerificationLogEntry) -> AppResult<()> {
        let path = self.log_path();
        fs::create_dir_all(&self.root).map_err(|source| AppError::LogWrite {
            path: self.root.clone(),
            source,
        })?;

        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AppError::LogWrite {
                path: path.clone(),
                source,
            })?;
        // One write per line keeps concurrent appenders from interleaving.
        file.write_all(&line)
            .and_then(|_| file.sync_data())
            .map_err(|source| AppError::LogWrite { path, source })
    }

    fn verification_log(&self) -> AppResult<Vec<VerificationLogEntry>> {
        let path = self.log_path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(AppError::ProfileRead { path, source }),
        };

        let mut entries = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(line).map_err(|err| AppError::CorruptLog {
                path: path.clone(),
                line: idx + 1,
                message: err.to_string(),
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

fn write_profile_document(path: &Path, profile: &BiometricProfile) -> AppResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|source| AppError::ProfileWrite {
        path: parent.to_path_buf(),
        source,
    })?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|source| AppError::ProfileWrite {
        path: path.to_path_buf(),
        source,
    })?;

    {
        let file = tmp.as_file_mut();
        {
            let mut writer = BufWriter::new(&mut *file);
            let document = ProfileDocumentRef {
                version: PROFILE_DOCUMENT_VERSION,
                profile,
            };
            serde_json::to_writer_pretty(&mut writer, &document)?;
            writer
                .write_all(b"\n")
                .and_then(|_| writer.flush())
                .map_err(|source| AppError::ProfileWrite {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        file.sync_all().map_err(|source| AppError::ProfileWrite {
            path: path.to_path_buf(),
            source,
        })?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|source| AppError::ProfileWrite {
                path: path.to_path_buf(),
                source,
            })?;
    }

    tmp.persist_noclobber(path).map_err(|err| {
        if err.error.kind() == io::ErrorKind::AlreadyExists {
            warn!(path = %path.display(), "profile already present; refusing to overwrite");
            AppError::DuplicateEnrollment {
                subject: profile.subject_id.clone(),
            }
        } else {
            AppError::ProfileWrite {
                path: path.to_path_buf(),
                source: err.error,
            }
        }
    })?;

    Ok(())
}

fn read_profile_document(path: &Path) -> AppResult<BiometricProfile> {
    let data = fs::read(path).map_err(|source| AppError::ProfileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let header: VersionHeader =
        serde_json::from_slice(&data).map_err(|err| AppError::InvalidProfileFile {
            path: path.to_path_buf(),
            message: format!("missing or malformed version field: {err}"),
        })?;
    if header.version != PROFILE_DOCUMENT_VERSION {
        return Err(AppError::UnsupportedProfileVersion {
            path: path.to_path_buf(),
            version: header.version,
        });
    }

    let document: ProfileDocument =
        serde_json::from_slice(&data).map_err(|err| AppError::InvalidProfileFile {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    Ok(document.profile)
}

/// Process-local store; check-and-insert happens under a single lock.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<BTreeMap<String, BiometricProfile>>,
    log: Mutex<Vec<VerificationLogEntry>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn profiles(&self) -> AppResult<MutexGuard<'_, BTreeMap<String, BiometricProfile>>> {
        self.profiles
            .lock()
            .map_err(|_| AppError::Storage("profile map lock poisoned".into()))
    }

    fn log(&self) -> AppResult<MutexGuard<'_, Vec<VerificationLogEntry>>> {
        self.log
            .lock()
            .map_err(|_| AppError::Storage("verification log lock poisoned".into()))
    }

    fn with_counters(&self, mut profile: BiometricProfile) -> AppResult<BiometricProfile> {
        let mut counters = VerificationCounters::tally(&self.log()?);
        if let Some(tally) = counters.remove(&profile.id) {
            profile.verification = tally;
        }
        Ok(profile)
    }
}

impl ProfileStore for MemoryProfileStore {
    fn profile_exists(&self, subject_id: &str) -> AppResult<bool> {
        Ok(self.profiles()?.contains_key(subject_id))
    }

    fn save_profile(&self, profile: &BiometricProfile) -> AppResult<String> {
        let mut profiles = self.profiles()?;
        if profiles.contains_key(&profile.subject_id) {
            return Err(AppError::DuplicateEnrollment {
                subject: profile.subject_id.clone(),
            });
        }
        let mut stored = profile.clone();
        stored.verification = VerificationCounters::default();
        profiles.insert(profile.subject_id.clone(), stored);
        Ok(profile.id.clone())
    }

    fn load_profile(&self, subject_id: &str) -> AppResult<Option<BiometricProfile>> {
        let found = self.profiles()?.get(subject_id).cloned();
        found.map(|profile| self.with_counters(profile)).transpose()
    }

    fn load_all_profiles(&self) -> AppResult<Vec<BiometricProfile>> {
        let snapshot: Vec<BiometricProfile> = self.profiles()?.values().cloned().collect();
        snapshot
            .into_iter()
            .map(|profile| self.with_counters(profile))
            .collect()
    }

    fn delete_profile(&self, subject_id: &str) -> AppResult<bool> {
        Ok(self.profiles()?.remove(subject_id).is_some())
    }

    fn append_verification_log(&self, entry: &VerificationLogEntry) -> AppResult<()> {
        self.log()?.push(entry.clone());
        Ok(())
    }

    fn verification_log(&self) -> AppResult<Vec<VerificationLogEntry>> {
        Ok(self.log()?.clone())
    }
}

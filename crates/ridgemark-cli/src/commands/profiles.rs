use std::any::Any;
use std::path::PathBuf;
use std::process::ExitCode;

use serde::Serialize;

use ridgemark_core::biometrics::{BiometricProfile, FilesystemProfileStore, ProfileStore};
use ridgemark_core::errors::AppResult;

use crate::cli::{OutputMode, StoreArgs};
use crate::commands::CommandHandler;
use crate::config;
use crate::output::render_profiles;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub subject_id: String,
    pub display_name: String,
    pub profile_id: String,
    pub created_at: String,
    pub sample_count: usize,
    pub stable_minutiae: usize,
    pub verification_count: u64,
    pub last_verified_at: Option<String>,
}

impl From<&BiometricProfile> for ProfileSummary {
    fn from(profile: &BiometricProfile) -> Self {
        Self {
            subject_id: profile.subject_id.clone(),
            display_name: profile.display_name.clone(),
            profile_id: profile.id.clone(),
            created_at: profile.created_at.clone(),
            sample_count: profile.sample_count,
            stable_minutiae: profile.stable_minutiae.len(),
            verification_count: profile.verification.count,
            last_verified_at: profile.verification.last_verified_at.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileListing {
    pub store_dir: PathBuf,
    pub profiles: Vec<ProfileSummary>,
}

pub struct ProfilesHandler {
    args: StoreArgs,
    run: Box<dyn Fn(&StoreArgs) -> AppResult<ProfileListing> + Send + Sync>,
    render: Box<dyn Fn(&ProfileListing, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl ProfilesHandler {
    pub fn new(args: StoreArgs) -> Self {
        Self::with_dependencies(args, run_profile_listing, render_profiles)
    }

    pub fn with_dependencies(
        args: StoreArgs,
        run: impl Fn(&StoreArgs) -> AppResult<ProfileListing> + Send + Sync + 'static,
        render: impl Fn(&ProfileListing, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for ProfilesHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let listing = (self.run)(&self.args)?;
        (self.render)(&listing, mode)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn run_profile_listing(args: &StoreArgs) -> AppResult<ProfileListing> {
    let settings = config::load_settings(args.config.as_deref(), args.store_dir.clone())?;
    let store = FilesystemProfileStore::new(&settings.store_dir);
    list_profiles(&store, settings.store_dir)
}

fn list_profiles<S: ProfileStore>(store: &S, store_dir: PathBuf) -> AppResult<ProfileListing> {
    let profiles = store
        .load_all_profiles()?
        .iter()
        .map(ProfileSummary::from)
        .collect();
    Ok(ProfileListing {
        store_dir,
        profiles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridgemark_core::biometrics::{
        MemoryProfileStore, VerificationLogEntry, VerificationResult,
    };
    use ridgemark_core::capture::DeviceStatus;

    fn profile(subject: &str) -> BiometricProfile {
        BiometricProfile {
            id: format!("id-{subject}"),
            subject_id: subject.into(),
            display_name: subject.to_uppercase(),
            created_at: "2024-01-01T00:00:00.000Z".into(),
            composite_features: vec![1.0, 0.0],
            feature_variance: vec![0.0, 0.0],
            stable_minutiae: vec![],
            sample_count: 5,
            sample_qualities: vec![0.9; 5],
            samples: vec![],
            verification: Default::default(),
        }
    }

    #[test]
    fn listing_carries_verification_counters() {
        let store = MemoryProfileStore::default();
        store.save_profile(&profile("alice")).unwrap();
        store.save_profile(&profile("bob")).unwrap();
        store
            .append_verification_log(&VerificationLogEntry {
                subject_id: Some("bob".into()),
                profile_id: Some("id-bob".into()),
                timestamp: "2024-02-01T00:00:00.000Z".into(),
                result: VerificationResult::Success,
                confidence: 0.91,
                processing_ms: 4.0,
                device_status: DeviceStatus::default(),
            })
            .unwrap();

        let listing = list_profiles(&store, PathBuf::from("/srv/store")).unwrap();
        assert_eq!(listing.profiles.len(), 2);
        let bob = listing
            .profiles
            .iter()
            .find(|summary| summary.subject_id == "bob")
            .unwrap();
        assert_eq!(bob.verification_count, 1);
        assert_eq!(
            bob.last_verified_at.as_deref(),
            Some("2024-02-01T00:00:00.000Z")
        );
        assert_eq!(bob.display_name, "BOB");
    }
}

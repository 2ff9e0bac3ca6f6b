use std::any::Any;
use std::process::ExitCode;

use ridgemark_core::errors::AppResult;

use crate::cli::{Commands, OutputMode};

pub trait CommandHandler: Send + Sync {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode>;
    fn as_any(&self) -> &dyn Any;
}

mod enroll;
mod profiles;
mod remove;
mod stats;
mod verify;

pub use enroll::{run_enroll, EnrollHandler};
pub use profiles::{run_profile_listing, ProfileListing, ProfileSummary, ProfilesHandler};
pub use remove::{run_remove, RemoveHandler};
pub use stats::{run_stats, StatsHandler, StatsOutcome};
pub use verify::{run_verify, VerifyHandler};

impl From<Commands> for Box<dyn CommandHandler> {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Enroll(args) => Box::new(EnrollHandler::new(args)),
            Commands::Verify(args) => Box::new(VerifyHandler::new(args)),
            Commands::Remove(args) => Box::new(RemoveHandler::new(args)),
            Commands::Profiles(args) => Box::new(ProfilesHandler::new(args)),
            Commands::Stats(args) => Box::new(StatsHandler::new(args)),
        }
    }
}

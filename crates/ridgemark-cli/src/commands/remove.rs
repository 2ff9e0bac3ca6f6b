use std::any::Any;
use std::process::ExitCode;

use ridgemark_core::biometrics::{self, ProfileRemovalOutcome};
use ridgemark_core::errors::AppResult;

use crate::cli::{OutputMode, RemoveArgs};
use crate::commands::CommandHandler;
use crate::config;
use crate::output::render_remove;

pub struct RemoveHandler {
    args: RemoveArgs,
    run: Box<dyn Fn(&RemoveArgs) -> AppResult<ProfileRemovalOutcome> + Send + Sync>,
    render: Box<dyn Fn(&ProfileRemovalOutcome, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl RemoveHandler {
    pub fn new(args: RemoveArgs) -> Self {
        Self::with_dependencies(args, run_remove, render_remove)
    }

    pub fn with_dependencies(
        args: RemoveArgs,
        run: impl Fn(&RemoveArgs) -> AppResult<ProfileRemovalOutcome> + Send + Sync + 'static,
        render: impl Fn(&ProfileRemovalOutcome, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for RemoveHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.args)?;
        (self.render)(&outcome, mode)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn run_remove(args: &RemoveArgs) -> AppResult<ProfileRemovalOutcome> {
    let settings = config::load_settings(args.store.config.as_deref(), args.store.store_dir.clone())?;
    biometrics::run_profile_removal(&args.subject, &settings.store_dir)
}

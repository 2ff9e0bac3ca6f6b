use std::any::Any;
use std::process::ExitCode;

use ridgemark_core::biometrics::{self, EnrollmentOutcome, EnrollmentRequest};
use ridgemark_core::errors::AppResult;

use crate::cli::{EnrollArgs, OutputMode};
use crate::commands::CommandHandler;
use crate::config;
use crate::output::render_enroll;

pub struct EnrollHandler {
    args: EnrollArgs,
    run: Box<dyn Fn(&EnrollArgs) -> AppResult<EnrollmentOutcome> + Send + Sync>,
    render: Box<dyn Fn(&EnrollmentOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync>,
}

impl EnrollHandler {
    pub fn new(args: EnrollArgs) -> Self {
        Self::with_dependencies(args, run_enroll, render_enroll)
    }

    pub fn with_dependencies(
        args: EnrollArgs,
        run: impl Fn(&EnrollArgs) -> AppResult<EnrollmentOutcome> + Send + Sync + 'static,
        render: impl Fn(&EnrollmentOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for EnrollHandler {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.args)?;
        (self.render)(&outcome, mode, verbose)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn run_enroll(args: &EnrollArgs) -> AppResult<EnrollmentOutcome> {
    let settings = config::load_settings(args.store.config.as_deref(), args.store.store_dir.clone())?;
    let backend = settings.capture_backend(args.seed, args.capture_dir.as_deref())?;
    let request = EnrollmentRequest {
        subject_id: args.subject.clone(),
        display_name: args.name.clone().unwrap_or_default(),
    };
    tracing::debug!(
        subject = %request.subject_id,
        store = %settings.store_dir.display(),
        "starting enrollment"
    );
    biometrics::run_enrollment(&request, &backend, &settings.store_dir, &settings.engine)
}

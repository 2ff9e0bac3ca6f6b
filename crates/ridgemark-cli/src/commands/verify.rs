use std::any::Any;
use std::process::ExitCode;

use ridgemark_core::biometrics::{self, VerificationOutcome};
use ridgemark_core::errors::AppResult;

use crate::cli::{OutputMode, VerifyArgs};
use crate::commands::CommandHandler;
use crate::config;
use crate::output::render_verify;

pub struct VerifyHandler {
    args: VerifyArgs,
    run: Box<dyn Fn(&VerifyArgs) -> AppResult<VerificationOutcome> + Send + Sync>,
    render: Box<dyn Fn(&VerificationOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync>,
}

impl VerifyHandler {
    pub fn new(args: VerifyArgs) -> Self {
        Self::with_dependencies(args, run_verify, render_verify)
    }

    pub fn with_dependencies(
        args: VerifyArgs,
        run: impl Fn(&VerifyArgs) -> AppResult<VerificationOutcome> + Send + Sync + 'static,
        render: impl Fn(&VerificationOutcome, OutputMode, bool) -> AppResult<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for VerifyHandler {
    /// A rejected capture is not an error: the verdict is rendered and the
    /// exit status is 1.
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.args)?;
        (self.render)(&outcome, mode, verbose)?;

        let accepted = outcome.decision.is_match()
            && self
                .args
                .min_confidence
                .map_or(true, |minimum| outcome.confidence >= minimum);
        if accepted {
            Ok(ExitCode::SUCCESS)
        } else {
            Ok(ExitCode::from(1))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn run_verify(args: &VerifyArgs) -> AppResult<VerificationOutcome> {
    let settings = config::load_settings(args.store.config.as_deref(), args.store.store_dir.clone())?;
    if let Some(image) = &args.image {
        return biometrics::run_image_verification(image, &settings.store_dir, &settings.engine);
    }
    let backend = settings.capture_backend(args.seed, args.capture_dir.as_deref())?;
    biometrics::run_verification(&backend, &settings.store_dir, &settings.engine)
}

use std::any::Any;
use std::path::PathBuf;
use std::process::ExitCode;

use serde::Serialize;

use ridgemark_core::biometrics::{collect_statistics, FilesystemProfileStore, StoreStatistics};
use ridgemark_core::errors::AppResult;

use crate::cli::{OutputMode, StoreArgs};
use crate::commands::CommandHandler;
use crate::config;
use crate::output::render_stats;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsOutcome {
    pub store_dir: PathBuf,
    pub statistics: StoreStatistics,
}

pub struct StatsHandler {
    args: StoreArgs,
    run: Box<dyn Fn(&StoreArgs) -> AppResult<StatsOutcome> + Send + Sync>,
    render: Box<dyn Fn(&StatsOutcome, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl StatsHandler {
    pub fn new(args: StoreArgs) -> Self {
        Self::with_dependencies(args, run_stats, render_stats)
    }

    pub fn with_dependencies(
        args: StoreArgs,
        run: impl Fn(&StoreArgs) -> AppResult<StatsOutcome> + Send + Sync + 'static,
        render: impl Fn(&StatsOutcome, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for StatsHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.args)?;
        (self.render)(&outcome, mode)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn run_stats(args: &StoreArgs) -> AppResult<StatsOutcome> {
    let settings = config::load_settings(args.config.as_deref(), args.store_dir.clone())?;
    let store = FilesystemProfileStore::new(&settings.store_dir);
    let statistics = collect_statistics(&store)?;
    Ok(StatsOutcome {
        store_dir: settings.store_dir,
        statistics,
    })
}

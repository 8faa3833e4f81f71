use super::args::*;
use chast_core::{ChastError, IsolationStrategy, Settings};
use std::path::Path;

pub(crate) mod run;
pub(crate) mod test;

pub async fn dispatch(cli: Cli, settings: Settings) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => match args.cmd {
            RunSub::Refactoring(args) => run::refactoring(args, settings).await,
        },
        Command::Test(args) => match args.cmd {
            TestSub::Refactoring(args) => test::refactoring(args, settings).await,
        },
        // Handled in main before any runtime is started.
        Command::IsolatedExec => Err(ChastError::Internal(
            "isolated-exec must not be dispatched".into(),
        )
        .into()),
    }
}

/// Reject a missing recipe file early so it is reported as a usage error.
fn require_recipe(path: &Path) -> Result<(), ChastError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ChastError::IllegalArgument(format!(
            "recipe file {} does not exist",
            path.display()
        )))
    }
}

fn apply_strategy(settings: &mut Settings, strategy: Option<IsolationStrategy>) {
    if let Some(strategy) = strategy {
        settings.isolation_strategy = strategy;
    }
}

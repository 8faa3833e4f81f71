//! Executes a pipeline group by group on this machine.

use tokio::task::JoinSet;
use tracing::{info, info_span, Instrument};

use crate::errors::{ChastError, ChastResult};
use crate::isolator::{run_isolated, IsolationContext, IsolationStrategy};
use crate::pipeline::Pipeline;
use crate::post_processing;

#[derive(Debug, Clone, Copy)]
pub struct LocalRunner {
    pub isolated: bool,
    /// Run the steps of one group concurrently.
    pub parallel: bool,
    pub strategy: IsolationStrategy,
}

impl LocalRunner {
    pub fn new(isolated: bool, parallel: bool, strategy: IsolationStrategy) -> Self {
        Self {
            isolated,
            parallel,
            strategy,
        }
    }

    pub async fn run(&self, pipeline: &Pipeline) -> ChastResult<()> {
        if !self.isolated {
            return Err(ChastError::UnsupportedOperation(
                "only isolated execution is implemented".into(),
            ));
        }
        info!(
            pipeline = %pipeline.uuid,
            steps = pipeline.steps.len(),
            strategy = %self.strategy,
            parallel = self.parallel,
            "running pipeline"
        );

        for (number, group) in pipeline.execution_groups.iter().enumerate() {
            let contexts: Vec<IsolationContext> = group
                .iter()
                .map(|&index| self.context_for(pipeline, index))
                .collect();

            self.run_group(contexts)
                .instrument(info_span!("group", number))
                .await?;

            // Post-processing of one group touches the `-prev` folders of the next, so it
            // stays sequential.
            for &index in group {
                post_processing::process_step(pipeline, index)?;
            }
        }

        post_processing::process_pipeline(pipeline)
    }

    async fn run_group(&self, contexts: Vec<IsolationContext>) -> ChastResult<()> {
        if !self.parallel {
            for context in contexts {
                spawn_isolated(context).await?;
            }
            return Ok(());
        }

        let mut tasks = JoinSet::new();
        for context in contexts {
            tasks.spawn_blocking(move || run_isolated(&context));
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(|e| ChastError::Internal(format!("isolated step panicked: {e}")))
                .and_then(|r| r);
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn context_for(&self, pipeline: &Pipeline, index: usize) -> IsolationContext {
        let step = &pipeline.steps[index];
        IsolationContext {
            root_folder: pipeline.root_fs_location.clone(),
            merge_folders: pipeline.previous_change_capture_locations(index),
            change_capture_folder: step.change_capture_location.clone(),
            operation_directory: step.operation_location.clone(),
            working_directory: step.run.command.working_directory.clone(),
            commands: step.run.command.cmds.clone(),
            strategy: self.strategy,
        }
    }
}

async fn spawn_isolated(context: IsolationContext) -> ChastResult<()> {
    tokio::task::spawn_blocking(move || run_isolated(&context))
        .await
        .map_err(|e| ChastError::Internal(format!("isolated step panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::run_model::{Run, RunModel, Variables};
    use tempfile::TempDir;

    #[tokio::test]
    async fn non_isolated_runs_are_unsupported() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            operation_location: dir.path().join("op"),
            change_capture_location: dir.path().join("changes"),
            ..Settings::default()
        };
        let pipeline = Pipeline::build(
            RunModel {
                runs: vec![Run::new("only")],
                variables: Variables::new(dir.path()),
            },
            &settings,
        )
        .unwrap();

        let runner = LocalRunner::new(false, true, IsolationStrategy::UnionFs);
        let err = runner.run(&pipeline).await.unwrap_err();
        assert!(matches!(err, ChastError::UnsupportedOperation(_)));
    }

    #[test]
    fn context_carries_previous_layers() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            operation_location: dir.path().join("op"),
            change_capture_location: dir.path().join("changes"),
            ..Settings::default()
        };
        let mut second = Run::new("second");
        second.dependencies = vec![0];
        second.command.cmds = vec![vec!["echo".into(), "hi".into()]];
        let pipeline = Pipeline::build(
            RunModel {
                runs: vec![Run::new("first"), second],
                variables: Variables::new(dir.path()),
            },
            &settings,
        )
        .unwrap();

        let runner = LocalRunner::new(true, false, IsolationStrategy::OverlayFs);
        let context = runner.context_for(&pipeline, 1);
        assert_eq!(
            context.merge_folders,
            vec![pipeline.steps[0].change_capture_location.clone()]
        );
        assert_eq!(context.commands, vec![vec!["echo", "hi"]]);
        assert_eq!(context.strategy, IsolationStrategy::OverlayFs);
        assert_eq!(context.root_folder, std::path::PathBuf::from("/"));
    }
}

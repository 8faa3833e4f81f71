//! Execution plan derived from a run model.
//!
//! Every run becomes a [`Step`] with its own change capture folder below the
//! pipeline's temp location. Steps are grouped by dependency level; a group only
//! starts after the previous one has been post-processed.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Settings;
use crate::errors::ChastResult;
use crate::fs_util::absolutize;
use crate::graph::DependencyGraph;
use crate::run_model::{ChangeLocations, Run, RunModel};

const TEMP_FOLDER: &str = "tmp";
const FINAL_FOLDER: &str = "final";

#[derive(Debug, Clone)]
pub struct Step {
    pub uuid: String,
    pub run: Run,
    pub change_capture_location: PathBuf,
    pub operation_location: PathBuf,
    /// Indices into [`Pipeline::steps`].
    pub dependencies: Vec<usize>,
    pub dependents: Vec<usize>,
}

impl Step {
    pub fn final_changes_location(&self) -> PathBuf {
        with_suffix(&self.change_capture_location, "-final")
    }

    pub fn changes_staging_location(&self) -> PathBuf {
        with_suffix(&self.change_capture_location, "-staging")
    }

    pub fn merged_previous_changes_location(&self) -> PathBuf {
        with_suffix(&self.change_capture_location, "-prev")
    }

    pub fn change_locations(&self) -> &ChangeLocations {
        &self.run.change_locations
    }

    pub fn is_final(&self) -> bool {
        self.dependents.is_empty()
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    pub uuid: String,
    pub operation_location: PathBuf,
    pub change_capture_location: PathBuf,
    pub root_fs_location: PathBuf,
    pub execution_groups: Vec<Vec<usize>>,
    pub steps: Vec<Step>,
}

impl Pipeline {
    /// Lay out one step per run using the locations from `settings`.
    pub fn build(model: RunModel, settings: &Settings) -> ChastResult<Self> {
        let operation_location = absolutize(&settings.operation_location)?;
        let capture_root = absolutize(&settings.change_capture_location)?;
        let root_fs_location = absolutize(&settings.root_fs_location)?;

        let uuid = format!("PIPELINE-{}", uuid::Uuid::new_v4());
        let change_capture_location = capture_root.join(&uuid);
        let temp_location = change_capture_location.join(TEMP_FOLDER);

        let graph = DependencyGraph::new(
            model
                .runs
                .iter()
                .map(|run| run.dependencies.clone())
                .collect(),
        );
        let execution_groups = graph.execution_order()?;

        let steps = model
            .runs
            .into_iter()
            .enumerate()
            .map(|(index, run)| {
                let step_uuid = run.uuid().to_string();
                Step {
                    change_capture_location: temp_location.join(&step_uuid),
                    operation_location: operation_location.join(&step_uuid),
                    dependencies: graph.dependencies(index).to_vec(),
                    dependents: graph.dependents(index),
                    uuid: step_uuid,
                    run,
                }
            })
            .collect::<Vec<_>>();

        debug!(
            pipeline = %uuid,
            steps = steps.len(),
            groups = execution_groups.len(),
            "pipeline built"
        );

        Ok(Self {
            uuid,
            operation_location,
            change_capture_location,
            root_fs_location,
            execution_groups,
            steps,
        })
    }

    pub fn temp_change_capture_location(&self) -> PathBuf {
        self.change_capture_location.join(TEMP_FOLDER)
    }

    /// Where the merged changes of all final steps end up.
    pub fn final_change_capture_location(&self) -> PathBuf {
        self.change_capture_location.join(FINAL_FOLDER)
    }

    /// Steps without dependents, in execution order.
    pub fn final_steps(&self) -> Vec<&Step> {
        self.execution_groups
            .iter()
            .flatten()
            .map(|&index| &self.steps[index])
            .filter(|step| step.is_final())
            .collect()
    }

    /// Capture folders of all transitive dependencies of `step`, nearest first.
    pub fn previous_change_capture_locations(&self, step: usize) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<usize> = self
            .steps
            .get(step)
            .map(|s| s.dependencies.iter().copied().collect())
            .unwrap_or_default();
        let mut locations = Vec::new();

        while let Some(index) = queue.pop_front() {
            if !seen.insert(index) {
                continue;
            }
            let dependency = &self.steps[index];
            locations.push(dependency.change_capture_location.clone());
            queue.extend(dependency.dependencies.iter().copied());
        }
        locations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_model::Variables;
    use tempfile::TempDir;

    fn run(id: &str, deps: &[usize]) -> Run {
        let mut run = Run::new(id);
        run.dependencies = deps.to_vec();
        run
    }

    fn settings(dir: &Path) -> Settings {
        Settings {
            operation_location: dir.join("op"),
            change_capture_location: dir.join("changes"),
            root_fs_location: PathBuf::from("/"),
            ..Settings::default()
        }
    }

    fn diamond(dir: &Path) -> Pipeline {
        let model = RunModel {
            runs: vec![
                run("a", &[]),
                run("b", &[0]),
                run("c", &[0]),
                run("d", &[1, 2]),
            ],
            variables: Variables::new(dir),
        };
        Pipeline::build(model, &settings(dir)).unwrap()
    }

    #[test]
    fn locations_follow_layout() {
        let dir = TempDir::new().unwrap();
        let pipeline = diamond(dir.path());

        assert!(pipeline.uuid.starts_with("PIPELINE-"));
        assert_eq!(
            pipeline.change_capture_location,
            dir.path().join("changes").join(&pipeline.uuid)
        );
        assert_eq!(
            pipeline.final_change_capture_location(),
            pipeline.change_capture_location.join("final")
        );

        let step = &pipeline.steps[0];
        assert!(step.uuid.starts_with("a-"));
        assert_eq!(
            step.change_capture_location,
            pipeline.temp_change_capture_location().join(&step.uuid)
        );
        assert_eq!(step.operation_location, dir.path().join("op").join(&step.uuid));
        assert_eq!(
            step.final_changes_location().to_string_lossy(),
            format!("{}-final", step.change_capture_location.display())
        );
    }

    #[test]
    fn groups_and_links_match_dependencies() {
        let dir = TempDir::new().unwrap();
        let pipeline = diamond(dir.path());

        assert_eq!(pipeline.execution_groups, vec![vec![0], vec![1, 2], vec![3]]);
        assert_eq!(pipeline.steps[0].dependents, vec![1, 2]);
        assert_eq!(pipeline.steps[3].dependencies, vec![1, 2]);

        let finals: Vec<&str> = pipeline.final_steps().iter().map(|s| s.run.id.as_str()).collect();
        assert_eq!(finals, vec!["d"]);
    }

    #[test]
    fn previous_locations_are_nearest_first_without_duplicates() {
        let dir = TempDir::new().unwrap();
        let pipeline = diamond(dir.path());

        let previous = pipeline.previous_change_capture_locations(3);
        assert_eq!(
            previous,
            vec![
                pipeline.steps[1].change_capture_location.clone(),
                pipeline.steps[2].change_capture_location.clone(),
                pipeline.steps[0].change_capture_location.clone(),
            ]
        );
        assert!(pipeline.previous_change_capture_locations(0).is_empty());
    }
}

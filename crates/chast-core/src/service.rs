//! Entry points used by the CLI.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::Settings;
use crate::errors::ChastResult;
use crate::fs_util::File;
use crate::merger::{self, paths::remove_path, MergeEntity, MergeOptions};
use crate::pipeline::Pipeline;
use crate::recipe::{parse_recipe, Recipe, RefactoringRecipe};
use crate::report::Report;
use crate::run_model::{build_run_model, FlagParameter};
use crate::runner::LocalRunner;

/// A parsed refactoring recipe together with the folder it was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedRecipe {
    pub recipe: RefactoringRecipe,
    pub file: File,
}

impl LoadedRecipe {
    pub fn folder(&self) -> &Path {
        &self.file.parent_directory
    }
}

pub fn load_refactoring_recipe(recipe_file: &Path) -> ChastResult<LoadedRecipe> {
    let mut file = File::new(recipe_file)?;
    match parse_recipe(&mut file)? {
        Recipe::Refactoring(recipe) => Ok(LoadedRecipe {
            recipe: *recipe,
            file,
        }),
    }
}

/// Run `recipe_file` isolated and leave its changes in the pipeline's final location.
///
/// Nothing outside the capture location is modified. When the run fails, the capture
/// location is removed before the error is returned.
pub async fn run(
    recipe_file: &Path,
    arguments: &[String],
    flags: &[FlagParameter],
    settings: &Settings,
) -> ChastResult<Pipeline> {
    let loaded = load_refactoring_recipe(recipe_file)?;
    run_loaded(&loaded, arguments, flags, settings).await
}

pub(crate) async fn run_loaded(
    loaded: &LoadedRecipe,
    arguments: &[String],
    flags: &[FlagParameter],
    settings: &Settings,
) -> ChastResult<Pipeline> {
    let model = build_run_model(&loaded.recipe, arguments, flags, loaded.folder())?;
    let pipeline = Pipeline::build(model, settings)?;
    info!(
        recipe = %loaded.recipe.name,
        pipeline = %pipeline.uuid,
        "running recipe"
    );

    let runner = LocalRunner::new(true, settings.parallel, settings.isolation_strategy);
    if let Err(e) = runner.run(&pipeline).await {
        if let Err(cleanup) = discard(&pipeline) {
            warn!(pipeline = %pipeline.uuid, error = %cleanup, "failed to discard changes");
        }
        return Err(e);
    }
    Ok(pipeline)
}

pub fn report(pipeline: &Pipeline) -> ChastResult<Report> {
    Report::build(pipeline)
}

/// Write the captured changes to the root filesystem and drop the capture.
///
/// Returns the changed paths on the root filesystem.
pub fn apply_changes(pipeline: &Pipeline) -> ChastResult<Vec<PathBuf>> {
    let report = Report::build(pipeline)?;
    let final_location = pipeline.final_change_capture_location();
    if !final_location.exists() {
        info!(pipeline = %pipeline.uuid, "nothing to apply");
        discard(pipeline)?;
        return Ok(Vec::new());
    }

    let options = MergeOptions::default();
    // The markers have to be known before the merge moves them onto the root.
    let markers: Vec<PathBuf> = report
        .diff
        .changes
        .keys()
        .filter(|location| location.ends_with(&options.deleted_suffix))
        .map(|location| pipeline.root_fs_location.join(location.trim_start_matches('/')))
        .collect();

    merger::merge_folders(
        &[MergeEntity::unfiltered(&final_location)],
        &pipeline.root_fs_location,
        &options,
    )?;
    for marker in &markers {
        remove_path(marker)?;
    }

    info!(
        pipeline = %pipeline.uuid,
        changed = report.changed_paths.len(),
        "changes applied"
    );
    discard(pipeline)?;
    Ok(report.changed_paths)
}

/// Remove everything the pipeline captured.
pub fn discard(pipeline: &Pipeline) -> ChastResult<()> {
    remove_path(&pipeline.change_capture_location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ChastError;
    use crate::fs_util::collect_paths;
    use crate::run_model::{Run, RunModel, Variables};
    use std::fs;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn pipeline(dir: &Path) -> Pipeline {
        let settings = Settings {
            operation_location: dir.join("op"),
            change_capture_location: dir.join("changes"),
            root_fs_location: dir.join("root"),
            ..Settings::default()
        };
        Pipeline::build(
            RunModel {
                runs: vec![Run::new("only")],
                variables: Variables::new(dir),
            },
            &settings,
        )
        .unwrap()
    }

    #[test]
    fn apply_writes_changes_and_removes_deleted_paths() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path());
        let root = pipeline.root_fs_location.clone();
        write(&root.join("src/Main.kt"), "old");
        write(&root.join("src/Gone.kt"), "gone");
        write(&root.join("src/Kept.kt"), "kept");

        let final_location = pipeline.final_change_capture_location();
        write(&final_location.join("src/Main.kt"), "new");
        write(&final_location.join("src/Added.kt"), "added");
        write(&final_location.join("src/Gone.kt_HIDDEN~"), "");

        let changed = apply_changes(&pipeline).unwrap();
        assert_eq!(changed.len(), 3);
        assert!(changed.contains(&root.join("src/Gone.kt")));

        assert_eq!(
            collect_paths(&root).unwrap(),
            vec!["/src/Added.kt", "/src/Kept.kt", "/src/Main.kt"]
        );
        assert_eq!(fs::read_to_string(root.join("src/Main.kt")).unwrap(), "new");
        assert!(!pipeline.change_capture_location.exists());
    }

    #[test]
    fn discard_leaves_root_untouched() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path());
        let root = pipeline.root_fs_location.clone();
        write(&root.join("a.txt"), "a");
        write(&pipeline.final_change_capture_location().join("a.txt"), "b");

        discard(&pipeline).unwrap();
        assert!(!pipeline.change_capture_location.exists());
        assert_eq!(fs::read_to_string(root.join("a.txt")).unwrap(), "a");
    }

    #[test]
    fn apply_without_changes_is_empty() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path());
        assert!(apply_changes(&pipeline).unwrap().is_empty());
    }

    #[test]
    fn loading_a_missing_recipe_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load_refactoring_recipe(&dir.path().join("chast.yaml")).unwrap_err();
        assert!(matches!(err, ChastError::Io { .. }), "{err}");
    }
}

//! Turning per-step change captures into one change set.
//!
//! After a step ran, its capture is copied into `-staging` and flattened there. The
//! staged changes are combined with what its dependencies handed over in `-prev` and
//! published to its dependents. Once every group ran, the `-final` folders of the final
//! steps are merged into the pipeline's final location.

use tracing::{debug, warn};

use crate::errors::ChastResult;
use crate::merger::{
    flatten_meta_folder, merge_folders, paths::remove_path, MergeEntity, MergeOptions,
};
use crate::pipeline::{Pipeline, Step};

pub fn process_step(pipeline: &Pipeline, index: usize) -> ChastResult<()> {
    let step = &pipeline.steps[index];
    debug!(step = %step.uuid, "post-processing step");

    stage_changes(step)?;
    move_previous_changes_to_final(step)?;
    merge_staged_changes_into_final(step)?;
    publish_to_dependents(pipeline, step)?;
    cleanup_step(step, false)
}

/// Copy the raw capture to `-staging`, meta folder included, then flatten the copy.
/// The capture keeps its `.unionfs-fuse` folder: later steps mount it as a layer and
/// need its deletion markers to hide what this step removed.
fn stage_changes(step: &Step) -> ChastResult<()> {
    let staging = step.changes_staging_location();
    let copy = MergeOptions {
        copy_mode: true,
        ..MergeOptions::default()
    };
    merge_folders(
        &[MergeEntity::unfiltered(&step.change_capture_location)],
        &staging,
        &copy,
    )?;
    flatten_meta_folder(
        &staging,
        &MergeOptions::default().with_change_locations(step.change_locations()),
    )
}

/// `-final` starts out empty, so nothing from `-prev` may overwrite anything.
fn move_previous_changes_to_final(step: &Step) -> ChastResult<()> {
    let options = MergeOptions {
        block_overwrite: true,
        ..MergeOptions::default()
    };
    merge_folders(
        &[MergeEntity::new(
            step.merged_previous_changes_location(),
            step.change_locations().clone(),
        )],
        &step.final_changes_location(),
        &options,
    )
}

/// The step's own changes take precedence over those of its dependencies.
fn merge_staged_changes_into_final(step: &Step) -> ChastResult<()> {
    merge_folders(
        &[MergeEntity::new(
            step.changes_staging_location(),
            step.change_locations().clone(),
        )],
        &step.final_changes_location(),
        &MergeOptions::default(),
    )
}

/// Hand `-final` to every dependent's `-prev`. All but the last dependent get a copy.
///
/// In a diamond, a change of the shared ancestor reaches the joining step through both
/// branches; identical content is accepted. Two dependencies handing over different
/// content for the same path is a conflict.
fn publish_to_dependents(pipeline: &Pipeline, step: &Step) -> ChastResult<()> {
    let source = [MergeEntity::unfiltered(step.final_changes_location())];
    let last = step.dependents.len().saturating_sub(1);

    for (position, &dependent) in step.dependents.iter().enumerate() {
        let options = MergeOptions {
            block_overwrite: true,
            allow_identical_files: true,
            copy_mode: position != last,
            ..MergeOptions::default()
        };
        let target = pipeline.steps[dependent].merged_previous_changes_location();
        merge_folders(&source, &target, &options)?;
    }
    Ok(())
}

pub fn process_pipeline(pipeline: &Pipeline) -> ChastResult<()> {
    debug!(pipeline = %pipeline.uuid, "post-processing pipeline");

    let options = MergeOptions {
        block_overwrite: true,
        merge_meta_files_folder: true,
        ..MergeOptions::default()
    };
    let entities: Vec<MergeEntity> = pipeline
        .final_steps()
        .into_iter()
        .map(|step| MergeEntity::new(step.final_changes_location(), step.change_locations().clone()))
        .collect();
    merge_folders(&entities, &pipeline.final_change_capture_location(), &options)?;

    cleanup_pipeline(pipeline)
}

/// Remove every step's working folders and the pipeline's temp location.
pub fn cleanup_pipeline(pipeline: &Pipeline) -> ChastResult<()> {
    let mut first_error = None;
    for step in &pipeline.steps {
        if let Err(e) = cleanup_step(step, true) {
            first_error.get_or_insert(e);
        }
    }
    if let Err(e) = remove_path(&pipeline.temp_change_capture_location()) {
        first_error.get_or_insert(e);
    }
    first_error.map_or(Ok(()), Err)
}

/// Removes the operation folder, `-prev` and `-staging`; with `clear_captures` also the
/// capture and `-final`. Every removal is attempted, the first failure is returned.
pub fn cleanup_step(step: &Step, clear_captures: bool) -> ChastResult<()> {
    let mut targets = vec![
        step.operation_location.clone(),
        step.merged_previous_changes_location(),
        step.changes_staging_location(),
    ];
    if clear_captures {
        targets.push(step.change_capture_location.clone());
        targets.push(step.final_changes_location());
    }

    let mut first_error = None;
    for target in targets {
        if let Err(e) = remove_path(&target) {
            warn!(step = %step.uuid, path = %target.display(), error = %e, "cleanup failed");
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::fs_util::collect_paths;
    use crate::run_model::{Run, RunModel, Variables};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn pipeline(dir: &Path, deps: &[&[usize]]) -> Pipeline {
        let runs = deps
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let mut run = Run::new(format!("run{i}"));
                run.dependencies = d.to_vec();
                run
            })
            .collect();
        let settings = Settings {
            operation_location: dir.join("op"),
            change_capture_location: dir.join("changes"),
            ..Settings::default()
        };
        Pipeline::build(
            RunModel {
                runs,
                variables: Variables::new(dir),
            },
            &settings,
        )
        .unwrap()
    }

    #[test]
    fn chained_steps_accumulate_changes() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path(), &[&[], &[0]]);
        let first = &pipeline.steps[0];
        let second = &pipeline.steps[1];

        write(&first.change_capture_location.join("src/A.kt"), "first");
        write(&first.change_capture_location.join("src/B.kt"), "first");
        write(
            &first
                .change_capture_location
                .join(".unionfs-fuse/src/Old.kt_HIDDEN~"),
            "",
        );
        process_step(&pipeline, 0).unwrap();
        assert_eq!(
            collect_paths(&second.merged_previous_changes_location()).unwrap(),
            vec!["/src/A.kt", "/src/B.kt", "/src/Old.kt_HIDDEN~"]
        );
        assert!(!first.final_changes_location().exists());

        write(&second.change_capture_location.join("src/A.kt"), "second");
        process_step(&pipeline, 1).unwrap();
        process_pipeline(&pipeline).unwrap();

        let final_location = pipeline.final_change_capture_location();
        assert_eq!(
            collect_paths(&final_location).unwrap(),
            vec!["/src/A.kt", "/src/B.kt", "/src/Old.kt_HIDDEN~"]
        );
        assert_eq!(fs::read_to_string(final_location.join("src/A.kt")).unwrap(), "second");
        assert!(!pipeline.temp_change_capture_location().exists());
    }

    #[test]
    fn staging_leaves_the_capture_layer_intact() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path(), &[&[], &[0]]);
        let capture = &pipeline.steps[0].change_capture_location;
        write(&capture.join("src/New.kt"), "new");
        write(&capture.join(".unionfs-fuse/src/Old.kt_HIDDEN~"), "");

        process_step(&pipeline, 0).unwrap();

        assert_eq!(
            collect_paths(capture).unwrap(),
            vec!["/.unionfs-fuse/src/Old.kt_HIDDEN~", "/src/New.kt"]
        );
        assert_eq!(
            collect_paths(&pipeline.steps[1].merged_previous_changes_location()).unwrap(),
            vec!["/src/New.kt", "/src/Old.kt_HIDDEN~"]
        );
    }

    #[test]
    fn diamond_join_accepts_the_shared_ancestor_change_twice() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path(), &[&[], &[0], &[0], &[1, 2]]);
        write(&pipeline.steps[0].change_capture_location.join("src/A.kt"), "a");
        write(&pipeline.steps[1].change_capture_location.join("src/B.kt"), "b");

        for index in 0..3 {
            process_step(&pipeline, index).unwrap();
        }
        assert_eq!(
            collect_paths(&pipeline.steps[3].merged_previous_changes_location()).unwrap(),
            vec!["/src/A.kt", "/src/B.kt"]
        );
    }

    #[test]
    fn parallel_dependencies_conflict_on_the_same_path() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path(), &[&[], &[], &[0, 1]]);

        write(&pipeline.steps[0].change_capture_location.join("same.txt"), "a");
        write(&pipeline.steps[1].change_capture_location.join("same.txt"), "b");
        process_step(&pipeline, 0).unwrap();
        let err = process_step(&pipeline, 1).unwrap_err();
        assert!(err.is_overwrite_block(), "{err}");
    }

    #[test]
    fn final_steps_merge_without_overwrites() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path(), &[&[], &[]]);

        write(&pipeline.steps[0].change_capture_location.join("a.txt"), "a");
        write(&pipeline.steps[1].change_capture_location.join("b.txt"), "b");
        process_step(&pipeline, 0).unwrap();
        process_step(&pipeline, 1).unwrap();
        process_pipeline(&pipeline).unwrap();

        assert_eq!(
            collect_paths(&pipeline.final_change_capture_location()).unwrap(),
            vec!["/a.txt", "/b.txt"]
        );
    }
}

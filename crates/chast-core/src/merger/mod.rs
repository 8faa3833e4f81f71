//! Merging captured change trees into each other and into the real filesystem.
//!
//! Change captures are unionfs-style trees: live files are changes, `<path>_HIDDEN~`
//! entries are deletions. [`merge_folders`] moves one or more such trees into a target,
//! resolving conflicts according to [`MergeOptions`].

mod cleanup;
mod meta;
mod movers;
mod options;
pub(crate) mod paths;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::ChastResult;
use crate::run_model::ChangeLocations;

pub use cleanup::remove_marked_as_deleted_paths;
pub use meta::flatten_meta_folder;
pub use options::{
    MergeOptions, DEFAULT_FOLDER_PERMISSION, UNIONFS_HIDDEN_SUFFIX, UNIONFS_META_FOLDER,
};

/// A tree to merge, with the change locations its run is allowed to touch.
#[derive(Debug, Clone)]
pub struct MergeEntity {
    pub source_path: PathBuf,
    pub change_locations: ChangeLocations,
}

impl MergeEntity {
    pub fn new(source_path: impl Into<PathBuf>, change_locations: ChangeLocations) -> Self {
        Self {
            source_path: source_path.into(),
            change_locations,
        }
    }

    /// Merge without any per-entity filtering.
    pub fn unfiltered(source_path: impl Into<PathBuf>) -> Self {
        Self::new(source_path, ChangeLocations::default())
    }
}

/// Merge every entity into `target`, in order.
pub fn merge_folders(
    entities: &[MergeEntity],
    target: &Path,
    options: &MergeOptions,
) -> ChastResult<()> {
    if !options.dry_run {
        paths::create_dir_all(target, options.folder_permission)?;
    }
    for entity in entities {
        debug!(
            source = %entity.source_path.display(),
            target = %target.display(),
            "merging folder"
        );
        merge_entity(entity, target, options)?;
    }
    Ok(())
}

fn merge_entity(entity: &MergeEntity, target: &Path, options: &MergeOptions) -> ChastResult<()> {
    let options = options.with_change_locations(&entity.change_locations);

    let source = entity.source_path.as_path();
    if options.merge_meta_files_folder {
        flatten_meta_folder(source, &options)?;
    }

    movers::merge_source_into_target(source, target, &options)?;

    if options.delete_empty_folders {
        cleanup::remove_empty_folders(target, &options)?;
    }
    if options.delete_marked_as_deleted_paths {
        remove_marked_as_deleted_paths(target, &options)?;
    }
    Ok(())
}

/// Whether merging would succeed without an overwrite-block. Nothing is touched.
pub fn are_mergeable(
    entities: &[MergeEntity],
    target: &Path,
    options: &MergeOptions,
) -> ChastResult<bool> {
    let dry = MergeOptions {
        dry_run: true,
        delete_empty_folders: false,
        delete_marked_as_deleted_paths: false,
        ..options.clone()
    };
    match merge_folders(entities, target, &dry) {
        Ok(()) => Ok(true),
        Err(e) if e.is_overwrite_block() => Ok(false),
        Err(e) => Err(e),
    }
}

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use super::paths::{self, exists, is_empty, remove_path};
use super::MergeOptions;
use crate::errors::{ChastError, ChastResult, IoContext};

/// Delete every `*_HIDDEN~` path below `target`.
pub fn remove_marked_as_deleted_paths(target: &Path, options: &MergeOptions) -> ChastResult<()> {
    if !exists(target) {
        return Err(ChastError::io(target, ErrorKind::NotFound.into()));
    }

    for path in paths::walk(target)? {
        if !options.is_deletion_marker(&path) || !exists(&path) {
            continue;
        }
        if options.block_overwrite {
            return Err(ChastError::MergeOverwriteBlocked {
                source_path: path.clone(),
                conflicting_path: options.counterpart(&path),
            });
        }
        if !options.dry_run {
            remove_path(&path)?;
        }
    }
    Ok(())
}

/// Remove empty folders below `root`, collapsing parents that become empty. `root` stays.
pub(crate) fn remove_empty_folders(root: &Path, options: &MergeOptions) -> ChastResult<()> {
    if options.dry_run {
        return Ok(());
    }
    for path in paths::walk(root)? {
        if path != root && fs::symlink_metadata(&path).is_ok_and(|m| m.is_dir()) {
            remove_folder_and_parents_if_empty(&path, root)?;
        }
    }
    Ok(())
}

fn remove_folder_and_parents_if_empty(path: &Path, root: &Path) -> ChastResult<()> {
    let mut current = path;
    while current != root && current.starts_with(root) {
        if !exists(current) || !is_empty(current)? {
            return Ok(());
        }
        debug!(path = %current.display(), "removing empty folder");
        fs::remove_dir(current).at(current)?;
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    Ok(())
}

//! Moving single files and empty folders from a source tree into a target tree.

use std::fs;
use std::path::Path;

use tracing::trace;

use super::paths::{self, create_dir_all, exists, is_empty, remove_path, target_path};
use super::MergeOptions;
use crate::errors::{ChastError, ChastResult, IoContext};

/// Walk `source` and move everything that is not skipped into `target`.
///
/// Folders are moved only when empty; populated folders come along with their files.
pub(crate) fn merge_source_into_target(
    source: &Path,
    target: &Path,
    options: &MergeOptions,
) -> ChastResult<()> {
    for path in paths::walk(source)? {
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };
        if options.should_skip(&paths::location(&path, source)) {
            trace!(path = %path.display(), "skipping path, excluded or not included");
            continue;
        }
        if meta.is_dir() {
            move_folder(&path, source, target, options)?;
        } else {
            move_file(&path, source, target, options)?;
        }
    }

    if !options.dry_run && !options.copy_mode && source != target {
        remove_path(source)?;
    }
    Ok(())
}

fn move_folder(
    path: &Path,
    source_root: &Path,
    target_root: &Path,
    options: &MergeOptions,
) -> ChastResult<()> {
    if !exists(path) {
        return Ok(());
    }
    if !is_empty(path)? {
        trace!(path = %path.display(), "folder not empty, contents are moved individually");
        return Ok(());
    }

    let target = target_path(path, source_root, target_root);
    if !paths::is_in_meta_folder(path, source_root, options) {
        handle_conflicting_folder(path, &target, options)?;
    }

    if !options.dry_run {
        create_dir_all(&target, options.folder_permission)?;
        if !options.copy_mode && path != target {
            remove_path(path)?;
        }
    }
    Ok(())
}

fn move_file(
    path: &Path,
    source_root: &Path,
    target_root: &Path,
    options: &MergeOptions,
) -> ChastResult<()> {
    if !exists(path) {
        return Ok(());
    }

    let target = target_path(path, source_root, target_root);
    handle_conflicting_file(path, &target, options)?;

    if options.dry_run || path == target {
        return Ok(());
    }

    if let Some(parent) = target.parent() {
        create_dir_all(parent, options.folder_permission)?;
    }
    if options.copy_mode {
        paths::link_or_copy(path, &target)
    } else {
        paths::move_file(path, &target)
    }
}

/// A live file conflicts with an existing target or its deletion marker; a
/// deletion marker conflicts with the live file it hides.
fn handle_conflicting_file(source: &Path, target: &Path, options: &MergeOptions) -> ChastResult<()> {
    let is_deletion = options.is_deletion_marker(source);
    let counterpart = options.counterpart(target);

    let target_exists = exists(target);
    let counterpart_exists = exists(&counterpart);
    if !((!is_deletion && target_exists) || counterpart_exists) {
        return Ok(());
    }
    if options.allow_identical_files
        && !counterpart_exists
        && paths::same_content(source, target)?
    {
        trace!(path = %target.display(), "target already holds the same content");
        return Ok(());
    }

    if options.block_overwrite {
        return Err(ChastError::MergeOverwriteBlocked {
            source_path: source.to_path_buf(),
            conflicting_path: if counterpart_exists {
                counterpart
            } else {
                target.to_path_buf()
            },
        });
    }
    if !options.dry_run {
        remove_path(&counterpart)?;
    }
    Ok(())
}

fn handle_conflicting_folder(
    source: &Path,
    target: &Path,
    options: &MergeOptions,
) -> ChastResult<()> {
    let is_deletion = options.is_deletion_marker(source);
    let counterpart = options.counterpart(target);
    if !exists(&counterpart) {
        return Ok(());
    }
    let counterpart_empty = is_empty(&counterpart)?;

    if options.dry_run {
        return Ok(());
    }
    if options.block_overwrite {
        return Err(ChastError::MergeOverwriteBlocked {
            source_path: source.to_path_buf(),
            conflicting_path: counterpart,
        });
    }

    if counterpart_empty || is_deletion {
        remove_path(&counterpart)
    } else {
        // A recreated folder takes over what is left of its deleted predecessor.
        fs::rename(&counterpart, target).at(&counterpart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_util::collect_paths;
    use std::fs;
    use tempfile::TempDir;

    fn tree(root: &Path, entries: &[&str]) {
        for entry in entries {
            let path = root.join(entry.trim_start_matches('/'));
            if entry.ends_with('/') {
                fs::create_dir_all(&path).unwrap();
            } else {
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, entry).unwrap();
            }
        }
    }

    fn setup(source: &[&str], target: &[&str]) -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let s = dir.path().join("source");
        let t = dir.path().join("target");
        fs::create_dir_all(&s).unwrap();
        fs::create_dir_all(&t).unwrap();
        tree(&s, source);
        tree(&t, target);
        (dir, s, t)
    }

    #[test]
    fn disjoint_files_are_moved_and_source_removed() {
        let (_dir, s, t) = setup(&["/a/file1", "/empty/"], &["/file2"]);
        merge_source_into_target(&s, &t, &MergeOptions::default()).unwrap();

        assert_eq!(collect_paths(&t).unwrap(), vec!["/a/file1", "/empty/", "/file2"]);
        assert!(!s.exists());
    }

    #[test]
    fn overwrite_replaces_content_unless_blocked() {
        let (_dir, s, t) = setup(&["/file1"], &[]);
        fs::write(t.join("file1"), "old").unwrap();

        let blocked = MergeOptions {
            block_overwrite: true,
            ..MergeOptions::default()
        };
        let err = merge_source_into_target(&s, &t, &blocked).unwrap_err();
        assert!(err.is_overwrite_block());
        assert_eq!(fs::read_to_string(t.join("file1")).unwrap(), "old");

        merge_source_into_target(&s, &t, &MergeOptions::default()).unwrap();
        assert_eq!(fs::read_to_string(t.join("file1")).unwrap(), "/file1");
    }

    #[test]
    fn identical_files_pass_a_blocking_merge_when_allowed() {
        let (_dir, s, t) = setup(&["/new", "/same"], &["/same"]);
        let options = MergeOptions {
            block_overwrite: true,
            allow_identical_files: true,
            ..MergeOptions::default()
        };
        merge_source_into_target(&s, &t, &options).unwrap();
        assert_eq!(collect_paths(&t).unwrap(), vec!["/new", "/same"]);

        let (_other, s, t) = setup(&["/same"], &["/same"]);
        fs::write(t.join("same"), "changed").unwrap();
        let err = merge_source_into_target(&s, &t, &options).unwrap_err();
        assert!(err.is_overwrite_block());
        assert_eq!(fs::read_to_string(t.join("same")).unwrap(), "changed");
    }

    #[test]
    fn deletion_marker_replaces_live_file() {
        let (_dir, s, t) = setup(&["/file1_HIDDEN~"], &["/file1"]);
        merge_source_into_target(&s, &t, &MergeOptions::default()).unwrap();
        assert_eq!(collect_paths(&t).unwrap(), vec!["/file1_HIDDEN~"]);
    }

    #[test]
    fn live_file_replaces_deletion_marker() {
        let (_dir, s, t) = setup(&["/file1"], &["/file1_HIDDEN~"]);
        merge_source_into_target(&s, &t, &MergeOptions::default()).unwrap();
        assert_eq!(collect_paths(&t).unwrap(), vec!["/file1"]);
    }

    #[test]
    fn recreated_folder_takes_over_hidden_content() {
        let (_dir, s, t) = setup(&["/folder1/"], &["/folder1_HIDDEN~/kept"]);
        merge_source_into_target(&s, &t, &MergeOptions::default()).unwrap();
        assert_eq!(collect_paths(&t).unwrap(), vec!["/folder1/kept"]);
    }

    #[test]
    fn copy_mode_keeps_source() {
        let (_dir, s, t) = setup(&["/a/file1"], &[]);
        let options = MergeOptions {
            copy_mode: true,
            ..MergeOptions::default()
        };
        merge_source_into_target(&s, &t, &options).unwrap();
        assert_eq!(collect_paths(&s).unwrap(), vec!["/a/file1"]);
        assert_eq!(collect_paths(&t).unwrap(), vec!["/a/file1"]);
    }

    #[test]
    fn dry_run_changes_nothing() {
        let (_dir, s, t) = setup(&["/file1"], &["/file1"]);
        let options = MergeOptions {
            dry_run: true,
            ..MergeOptions::default()
        };
        merge_source_into_target(&s, &t, &options).unwrap();
        assert!(s.join("file1").exists());
        assert_eq!(fs::read_to_string(t.join("file1")).unwrap(), "/file1");
    }

    #[test]
    fn excluded_paths_stay_behind_in_copy_mode() {
        let (_dir, s, t) = setup(&["/keep/a", "/skip/b"], &[]);
        let options = MergeOptions {
            copy_mode: true,
            exclusions: vec!["/skip/".into()],
            ..MergeOptions::default()
        };
        merge_source_into_target(&s, &t, &options).unwrap();
        assert_eq!(collect_paths(&t).unwrap(), vec!["/keep/a"]);
    }
}

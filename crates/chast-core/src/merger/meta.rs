//! Flattening the unionfs-fuse meta folder into the capture it belongs to.
//!
//! unionfs-fuse records deletions of lower-layer paths as `<path>_HIDDEN~` entries
//! under `.unionfs-fuse/`. Flattening moves those markers next to the live changes so
//! later merges see one tree.

use std::fs;
use std::path::Path;

use tracing::trace;

use super::paths::{self, create_dir_all, exists, is_empty, remove_path, target_path};
use super::MergeOptions;
use crate::errors::{ChastError, ChastResult, IoContext};

pub fn flatten_meta_folder(source: &Path, options: &MergeOptions) -> ChastResult<()> {
    let meta_folder = source.join(&options.meta_files_location);

    let inner = MergeOptions {
        copy_mode: false,
        block_overwrite: false,
        ..options.clone()
    };
    sanitize_meta_paths(&meta_folder, &inner)?;

    for path in paths::walk(&meta_folder)? {
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };
        if options.should_skip(&paths::location(&path, &meta_folder)) {
            trace!(path = %path.display(), "skipping meta path, excluded or not included");
            continue;
        }
        if meta.is_dir() {
            move_meta_folder(&path, &meta_folder, source, options)?;
        } else {
            move_meta_file(&path, &meta_folder, source, options)?;
        }
    }

    if !options.dry_run {
        remove_path(&meta_folder)?;
    }

    sanitize_meta_paths(source, options)
}

fn move_meta_folder(
    path: &Path,
    meta_root: &Path,
    source: &Path,
    options: &MergeOptions,
) -> ChastResult<()> {
    if !exists(path) || !is_empty(path)? {
        return Ok(());
    }
    let target = target_path(path, meta_root, source);
    if !options.dry_run {
        create_dir_all(&target, options.folder_permission)?;
        if !options.copy_mode {
            remove_path(path)?;
        }
    }
    Ok(())
}

fn move_meta_file(
    path: &Path,
    meta_root: &Path,
    source: &Path,
    options: &MergeOptions,
) -> ChastResult<()> {
    if !exists(path) || options.dry_run {
        return Ok(());
    }
    let target = target_path(path, meta_root, source);
    if let Some(parent) = target.parent() {
        create_dir_all(parent, options.folder_permission)?;
    }
    fs::rename(path, &target).at(path)
}

/// Resolve every `X_HIDDEN~` folder below `root` whose live twin `X` also exists.
fn sanitize_meta_paths(root: &Path, options: &MergeOptions) -> ChastResult<()> {
    for path in paths::walk(root)? {
        let is_dir = fs::symlink_metadata(&path).is_ok_and(|m| m.is_dir());
        if is_dir && options.is_deletion_marker(&path) {
            sanitize_marked_as_deleted_folder(&path, options)?;
        }
    }
    Ok(())
}

/// The folder was deleted and then recreated: the live folder replaces the marker.
fn sanitize_marked_as_deleted_folder(path: &Path, options: &MergeOptions) -> ChastResult<()> {
    let live = options.counterpart(path);
    if !exists(&live) {
        return Ok(());
    }
    if !is_empty(path)? {
        return Err(ChastError::Internal(format!(
            "deleted folder marker {} is not empty while {} exists",
            path.display(),
            live.display()
        )));
    }
    if options.block_overwrite {
        return Err(ChastError::MergeOverwriteBlocked {
            source_path: live,
            conflicting_path: path.to_path_buf(),
        });
    }
    if options.dry_run {
        return Ok(());
    }

    remove_path(path)?;
    fs::rename(&live, path).at(&live)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_util::collect_paths;
    use tempfile::TempDir;

    fn source(entries: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for entry in entries {
            let path = dir.path().join(entry.trim_start_matches('/'));
            if entry.ends_with('/') {
                fs::create_dir_all(&path).unwrap();
            } else {
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, "").unwrap();
            }
        }
        dir
    }

    #[test]
    fn markers_move_next_to_live_changes() {
        let dir = source(&[
            "/folder1/file1.txt",
            "/.unionfs-fuse/folder2/file2.txt_HIDDEN~",
        ]);
        flatten_meta_folder(dir.path(), &MergeOptions::default()).unwrap();
        assert_eq!(
            collect_paths(dir.path()).unwrap(),
            vec!["/folder1/file1.txt", "/folder2/file2.txt_HIDDEN~"]
        );
    }

    #[test]
    fn marker_beside_live_file_is_kept() {
        let dir = source(&[
            "/folder1/file1.txt",
            "/.unionfs-fuse/folder1/file1.txt_HIDDEN~",
        ]);
        let options = MergeOptions {
            block_overwrite: true,
            ..MergeOptions::default()
        };
        flatten_meta_folder(dir.path(), &options).unwrap();
        assert_eq!(
            collect_paths(dir.path()).unwrap(),
            vec!["/folder1/file1.txt", "/folder1/file1.txt_HIDDEN~"]
        );
    }

    #[test]
    fn deleted_and_recreated_folder_with_content_fails() {
        let dir = source(&[
            "/folder1/file1.txt",
            "/.unionfs-fuse/folder1_HIDDEN~/",
            "/.unionfs-fuse/folder1/file1.txt_HIDDEN~",
        ]);
        let err = flatten_meta_folder(dir.path(), &MergeOptions::default()).unwrap_err();
        assert!(matches!(err, ChastError::Internal(_)), "{err}");
        assert_eq!(
            collect_paths(dir.path()).unwrap(),
            vec![
                "/folder1/file1.txt",
                "/folder1_HIDDEN~/file1.txt_HIDDEN~"
            ]
        );
    }

    #[test]
    fn recreated_empty_folder_is_blocked() {
        let dir = source(&["/folder1/", "/.unionfs-fuse/folder1_HIDDEN~/"]);
        let options = MergeOptions {
            block_overwrite: true,
            ..MergeOptions::default()
        };
        let err = flatten_meta_folder(dir.path(), &options).unwrap_err();
        assert!(err.is_overwrite_block());

        let dir = source(&["/folder1/", "/.unionfs-fuse/folder1_HIDDEN~/"]);
        flatten_meta_folder(dir.path(), &MergeOptions::default()).unwrap();
        assert_eq!(collect_paths(dir.path()).unwrap(), vec!["/folder1_HIDDEN~/"]);
    }

    #[test]
    fn dry_run_leaves_meta_folder() {
        let dir = source(&["/.unionfs-fuse/folder2/file2.txt_HIDDEN~"]);
        let options = MergeOptions {
            dry_run: true,
            ..MergeOptions::default()
        };
        flatten_meta_folder(dir.path(), &options).unwrap();
        assert_eq!(
            collect_paths(dir.path()).unwrap(),
            vec!["/.unionfs-fuse/folder2/file2.txt_HIDDEN~"]
        );
    }

    #[test]
    fn filters_apply_to_meta_paths() {
        let dir = source(&[
            "/.unionfs-fuse/folder1_HIDDEN~/",
            "/.unionfs-fuse/folder2_HIDDEN~/",
            "/.unionfs-fuse/folder3_HIDDEN~/",
        ]);
        let options = MergeOptions {
            inclusions: vec!["/folder1".into()],
            exclusions: vec!["/folder2".into()],
            ..MergeOptions::default()
        };
        flatten_meta_folder(dir.path(), &options).unwrap();
        assert_eq!(collect_paths(dir.path()).unwrap(), vec!["/folder1_HIDDEN~/"]);
    }
}

//! Filesystem primitives used by the merge walkers.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::errors::{ChastError, ChastResult, IoContext};
use crate::fs_util::relative_display;

use super::MergeOptions;

pub(crate) fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Folders without entries and zero-length files count as empty.
pub(crate) fn is_empty(path: &Path) -> ChastResult<bool> {
    let meta = fs::symlink_metadata(path).at(path)?;
    if meta.is_dir() {
        Ok(fs::read_dir(path).at(path)?.next().is_none())
    } else {
        Ok(meta.len() == 0)
    }
}

/// Every path below and including `root`, parents before children, siblings by name.
///
/// The listing is taken up front; callers re-check existence since earlier steps
/// may have moved or removed entries. A missing root yields nothing.
pub(crate) fn walk(root: &Path) -> ChastResult<Vec<PathBuf>> {
    if !exists(root) {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        match entry {
            Ok(entry) => paths.push(entry.into_path()),
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                let io = std::io::Error::from(e);
                if io.kind() != ErrorKind::NotFound {
                    return Err(ChastError::io(path, io));
                }
            }
        }
    }
    Ok(paths)
}

/// Same relative position under `target_root` as `path` has under `source_root`.
pub(crate) fn target_path(path: &Path, source_root: &Path, target_root: &Path) -> PathBuf {
    match path.strip_prefix(source_root) {
        Ok(rel) if rel.as_os_str().is_empty() => target_root.to_path_buf(),
        Ok(rel) => target_root.join(rel),
        Err(_) => target_root.to_path_buf(),
    }
}

pub(crate) fn is_in_meta_folder(path: &Path, source_root: &Path, options: &MergeOptions) -> bool {
    path.strip_prefix(source_root)
        .ok()
        .and_then(|rel| rel.components().next())
        .is_some_and(|first| first.as_os_str() == options.meta_files_location.as_str())
}

/// Location string handed to [`MergeOptions::should_skip`].
pub(crate) fn location(path: &Path, root: &Path) -> String {
    relative_display(path, root)
}

/// `rm -rf`; a missing path is not an error.
pub(crate) fn remove_path(path: &Path) -> ChastResult<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ChastError::io(path, e)),
    };
    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(ChastError::io(path, e)),
        _ => Ok(()),
    }
}

pub(crate) fn create_dir_all(path: &Path, mode: u32) -> ChastResult<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path).at(path)
}

/// Rename, falling back to copy and remove when source and target live on different devices.
pub(crate) fn move_file(from: &Path, to: &Path) -> ChastResult<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            fs::copy(from, to).at(to)?;
            fs::remove_file(from).at(from)
        }
        Err(e) => Err(ChastError::io(from, e)),
    }
}

/// Both paths are the same file, or regular files with equal bytes.
pub(crate) fn same_content(a: &Path, b: &Path) -> ChastResult<bool> {
    let meta_a = fs::metadata(a).at(a)?;
    let meta_b = fs::metadata(b).at(b)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if meta_a.dev() == meta_b.dev() && meta_a.ino() == meta_b.ino() {
            return Ok(true);
        }
    }
    if !meta_a.is_file() || !meta_b.is_file() || meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    Ok(fs::read(a).at(a)? == fs::read(b).at(b)?)
}

/// Hard link `from` at `to`, copying when linking is not possible.
pub(crate) fn link_or_copy(from: &Path, to: &Path) -> ChastResult<()> {
    if exists(to) {
        remove_path(to)?;
    }
    if fs::hard_link(from, to).is_err() {
        fs::copy(from, to).at(to)?;
    }
    Ok(())
}

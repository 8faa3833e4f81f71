//! Small filesystem helpers shared across modules.

use std::fs;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::errors::{ChastResult, IoContext};

/// A file on disk whose content is read on first access.
#[derive(Debug, Clone)]
pub struct File {
    pub absolute_path: PathBuf,
    pub parent_directory: PathBuf,
    content: Option<Vec<u8>>,
}

impl File {
    pub fn new(path: impl AsRef<Path>) -> ChastResult<Self> {
        let absolute_path = absolutize(path.as_ref())?;
        let parent_directory = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        Ok(Self {
            absolute_path,
            parent_directory,
            content: None,
        })
    }

    pub fn content(&mut self) -> ChastResult<&[u8]> {
        if self.content.is_none() {
            let bytes = fs::read(&self.absolute_path).at(&self.absolute_path)?;
            self.content = Some(bytes);
        }
        Ok(self.content.as_deref().unwrap_or_default())
    }
}

/// Make `path` absolute against the current directory and normalize `.`/`..` lexically.
pub fn absolutize(path: &Path) -> ChastResult<PathBuf> {
    let cwd = std::env::current_dir().at(".")?;
    Ok(absolutize_from(path, &cwd))
}

/// Make `path` absolute against `base` and normalize it lexically.
pub fn absolutize_from(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    normalize(&joined)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push("/");
    }
    out
}

pub fn folder_exists(path: &Path) -> bool {
    path.is_dir()
}

pub fn is_folder_empty(path: &Path) -> ChastResult<bool> {
    let mut entries = fs::read_dir(path).at(path)?;
    Ok(entries.next().is_none())
}

/// `path` relative to `root`, rendered with a leading `/` (`/` itself for the root).
pub fn relative_display(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    format!("/{}", rel.display())
}

/// Files plus empty folders (with a trailing `/`) under `root`, relative to it.
pub fn collect_paths(root: &Path) -> ChastResult<Vec<String>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            crate::errors::ChastError::io(path, e.into())
        })?;
        let rel = relative_display(entry.path(), root);
        if entry.file_type().is_dir() {
            if is_folder_empty(entry.path())? {
                paths.push(format!("{rel}/"));
            }
        } else {
            paths.push(rel);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn absolutize_normalizes_dots() {
        let p = absolutize_from(Path::new("a/./b/../c"), Path::new("/base"));
        assert_eq!(p, PathBuf::from("/base/a/c"));
        assert_eq!(
            absolutize_from(Path::new("/x/y"), Path::new("/base")),
            PathBuf::from("/x/y")
        );
    }

    #[test]
    fn file_reads_lazily() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("recipe.yaml");
        fs::write(&path, "name: x").unwrap();

        let mut file = File::new(&path).unwrap();
        assert_eq!(file.parent_directory, dir.path());
        assert_eq!(file.content().unwrap(), b"name: x");
    }

    #[test]
    fn collect_paths_lists_files_and_empty_folders() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("a/b/f.txt"), "x").unwrap();

        let paths = collect_paths(dir.path()).unwrap();
        assert_eq!(paths, vec!["/a/b/f.txt".to_string(), "/empty/".to_string()]);
    }
}

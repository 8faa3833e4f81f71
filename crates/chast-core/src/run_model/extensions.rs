//! File extension detection for run filtering.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::errors::{ChastError, ChastResult};

/// Occurrences of one extension below the detection root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedExtension {
    pub extension: String,
    pub count: usize,
    /// Deepest folder containing every file with this extension.
    pub common_parent: PathBuf,
}

/// Extensions (with leading dot) found at or below `path`. A file path yields its own extension.
pub fn detect_extensions(path: &Path) -> ChastResult<BTreeMap<String, DetectedExtension>> {
    let mut found: BTreeMap<String, DetectedExtension> = BTreeMap::new();
    if !path.exists() {
        return Ok(found);
    }

    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| ChastError::io(path, e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let parent = entry.path().parent().unwrap_or(path).to_path_buf();
        let key = format!(".{ext}");
        found
            .entry(key.clone())
            .and_modify(|d| {
                d.count += 1;
                d.common_parent = common_prefix(&d.common_parent, &parent);
            })
            .or_insert(DetectedExtension {
                extension: key,
                count: 1,
                common_parent: parent,
            });
    }
    Ok(found)
}

fn common_prefix(a: &Path, b: &Path) -> PathBuf {
    a.components()
        .zip(b.components())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x)
        .collect()
}

/// Normalize `java`, `.java` and `*.java` to `.java`.
pub fn normalize_extension(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('*');
    if trimmed.starts_with('.') {
        trimmed.to_string()
    } else {
        format!(".{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn counts_extensions_with_common_parent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/a")).unwrap();
        fs::create_dir_all(dir.path().join("src/b")).unwrap();
        fs::write(dir.path().join("src/a/A.java"), "").unwrap();
        fs::write(dir.path().join("src/b/B.java"), "").unwrap();
        fs::write(dir.path().join("README"), "").unwrap();
        fs::write(dir.path().join("src/a/x.kt"), "").unwrap();

        let found = detect_extensions(dir.path()).unwrap();
        assert_eq!(found.len(), 2);
        let java = &found[".java"];
        assert_eq!(java.count, 2);
        assert_eq!(java.common_parent, dir.path().join("src"));
        assert_eq!(found[".kt"].common_parent, dir.path().join("src/a"));
    }

    #[test]
    fn single_file_and_missing_path() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("Main.kt");
        fs::write(&file, "").unwrap();
        assert!(detect_extensions(&file).unwrap().contains_key(".kt"));
        assert!(detect_extensions(&dir.path().join("missing"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn extension_forms_are_normalized() {
        assert_eq!(normalize_extension("java"), ".java");
        assert_eq!(normalize_extension(".java"), ".java");
        assert_eq!(normalize_extension("*.java"), ".java");
    }
}

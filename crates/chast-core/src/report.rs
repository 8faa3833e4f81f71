//! Human readable summary of what a pipeline changed.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crossterm::style::Stylize;
use similar::{ChangeTag, TextDiff};
use walkdir::WalkDir;

use crate::errors::{ChastError, ChastResult, IoContext};
use crate::fs_util::{is_folder_empty, relative_display};
use crate::merger::UNIONFS_HIDDEN_SUFFIX;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
}

impl FileStatus {
    fn marker(self) -> &'static str {
        match self {
            FileStatus::Added => "[+]",
            FileStatus::Modified => "[~]",
            FileStatus::Deleted => "[-]",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTag {
    Equal,
    Insert,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDiff {
    pub tag: LineTag,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct FileChange {
    pub status: FileStatus,
    /// Only filled for modified files.
    pub lines: Vec<LineDiff>,
}

/// Changes keyed by their location below the root (`/src/Main.kt`), as found in the
/// capture, so deletions keep their marker suffix here.
#[derive(Debug, Clone, Default)]
pub struct ChangeDiff {
    pub changes: BTreeMap<String, FileChange>,
}

impl ChangeDiff {
    pub fn build(pipeline: &Pipeline) -> ChastResult<Self> {
        let final_location = pipeline.final_change_capture_location();
        let mut changes = BTreeMap::new();

        for location in captured_locations(&final_location)? {
            let captured = final_location.join(location.trim_start_matches('/'));
            let original = pipeline
                .root_fs_location
                .join(location.trim_start_matches('/'));

            let change = if location.ends_with(UNIONFS_HIDDEN_SUFFIX) {
                FileChange {
                    status: FileStatus::Deleted,
                    lines: Vec::new(),
                }
            } else if !original.exists() {
                FileChange {
                    status: FileStatus::Added,
                    lines: Vec::new(),
                }
            } else if captured.is_dir() {
                FileChange {
                    status: FileStatus::Modified,
                    lines: Vec::new(),
                }
            } else {
                FileChange {
                    status: FileStatus::Modified,
                    lines: line_diff(&original, &captured)?,
                }
            };
            changes.insert(location, change);
        }
        Ok(Self { changes })
    }

    pub fn status(&self, location: &str) -> Option<FileStatus> {
        self.changes.get(location).map(|c| c.status)
    }

    /// Line diffs of all modified files, each headed by its location.
    pub fn to_string(&self, colorize: bool) -> String {
        let mut out = String::new();
        for (location, change) in &self.changes {
            if change.status != FileStatus::Modified || change.lines.is_empty() {
                continue;
            }
            let _ = write!(out, "\n\n{location}\n\n");
            for line in &change.lines {
                let rendered = match line.tag {
                    LineTag::Equal => format!("= {}", line.text),
                    LineTag::Insert if colorize => format!("+ {}", line.text).green().to_string(),
                    LineTag::Insert => format!("+ {}", line.text),
                    LineTag::Delete if colorize => format!("- {}", line.text).red().to_string(),
                    LineTag::Delete => format!("- {}", line.text),
                };
                out.push_str(&rendered);
                out.push('\n');
            }
        }
        out
    }
}

/// Files and empty folders below `final_location`, relative to it, sorted.
fn captured_locations(final_location: &Path) -> ChastResult<Vec<String>> {
    let mut locations = Vec::new();
    if !final_location.exists() {
        return Ok(locations);
    }
    for entry in WalkDir::new(final_location).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(final_location).to_path_buf();
            ChastError::io(path, e.into())
        })?;
        if entry.file_type().is_dir() && !is_folder_empty(entry.path())? {
            continue;
        }
        locations.push(relative_display(entry.path(), final_location));
    }
    locations.sort();
    Ok(locations)
}

fn line_diff(original: &Path, changed: &Path) -> ChastResult<Vec<LineDiff>> {
    let before = fs::read(original).at(original)?;
    let after = fs::read(changed).at(changed)?;
    let before = String::from_utf8_lossy(&before);
    let after = String::from_utf8_lossy(&after);

    let diff = TextDiff::from_lines(before.as_ref(), after.as_ref());
    Ok(diff
        .iter_all_changes()
        .map(|change| LineDiff {
            tag: match change.tag() {
                ChangeTag::Equal => LineTag::Equal,
                ChangeTag::Insert => LineTag::Insert,
                ChangeTag::Delete => LineTag::Delete,
            },
            text: change.value().trim_end_matches(['\n', '\r']).to_string(),
        })
        .collect())
}

fn strip_deleted_suffix(location: &str) -> &str {
    location
        .strip_suffix(UNIONFS_HIDDEN_SUFFIX)
        .unwrap_or(location)
}

#[derive(Debug, Clone)]
pub struct Report {
    /// Changed paths as they appear on the root filesystem, sorted.
    pub changed_paths: Vec<PathBuf>,
    pub diff: ChangeDiff,
    final_location: PathBuf,
}

impl Report {
    pub fn build(pipeline: &Pipeline) -> ChastResult<Self> {
        let diff = ChangeDiff::build(pipeline)?;
        let mut changed_paths: Vec<PathBuf> = diff
            .changes
            .keys()
            .map(|location| {
                pipeline
                    .root_fs_location
                    .join(strip_deleted_suffix(location).trim_start_matches('/'))
            })
            .collect();
        changed_paths.sort();

        Ok(Self {
            changed_paths,
            diff,
            final_location: pipeline.final_change_capture_location(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.changed_paths.is_empty()
    }

    /// Tree of the final capture with a marker in front of every changed entry.
    pub fn file_tree(&self, colorize: bool) -> ChastResult<String> {
        let root_name = self
            .final_location
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.final_location.display().to_string());

        let mut out = root_name;
        out.push('\n');
        if self.final_location.is_dir() {
            self.render_children(&self.final_location, "", colorize, &mut out)?;
        }
        Ok(out)
    }

    fn render_children(
        &self,
        dir: &Path,
        indent: &str,
        colorize: bool,
        out: &mut String,
    ) -> ChastResult<()> {
        let mut entries = fs::read_dir(dir)
            .at(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .at(dir)?;
        entries.sort();

        let count = entries.len();
        for (position, path) in entries.into_iter().enumerate() {
            let last = position + 1 == count;
            let (branch, continuation) = if last {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            let _ = writeln!(out, "{indent}{branch}{}", self.label(&path, colorize));
            if path.is_dir() {
                let nested = format!("{indent}{continuation}");
                self.render_children(&path, &nested, colorize, out)?;
            }
        }
        Ok(())
    }

    fn label(&self, path: &Path, colorize: bool) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let location = relative_display(path, &self.final_location);

        let Some(status) = self.diff.status(&location) else {
            return name;
        };
        let label = format!("{} {}", status.marker(), strip_deleted_suffix(&name));
        if !colorize {
            return label;
        }
        match status {
            FileStatus::Added => label.green().to_string(),
            FileStatus::Modified => label.blue().to_string(),
            FileStatus::Deleted => label.red().to_string(),
        }
    }

    /// File tree followed by the line diffs.
    pub fn to_string(&self, colorize: bool) -> ChastResult<String> {
        let mut out = self.file_tree(colorize)?;
        out.push_str(&self.diff.to_string(colorize));
        Ok(out)
    }
}

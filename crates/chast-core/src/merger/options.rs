use std::path::Path;

use crate::run_model::ChangeLocations;
use crate::wildcard::WildcardString;

/// Meta folder unionfs-fuse keeps its copy-on-write bookkeeping in.
pub const UNIONFS_META_FOLDER: &str = ".unionfs-fuse";
/// Suffix unionfs-fuse appends to paths deleted in the upper layer.
pub const UNIONFS_HIDDEN_SUFFIX: &str = "_HIDDEN~";
pub const DEFAULT_FOLDER_PERMISSION: u32 = 0o755;

/// How a merge treats conflicts, deletion markers and the unionfs meta folder.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Check for conflicts without touching the filesystem.
    pub dry_run: bool,
    /// Fail with an overwrite-block instead of replacing existing paths.
    pub block_overwrite: bool,
    /// Flatten `<source>/.unionfs-fuse` into the source before merging.
    pub merge_meta_files_folder: bool,
    pub delete_empty_folders: bool,
    /// Remove `*_HIDDEN~` markers from the target after merging.
    pub delete_marked_as_deleted_paths: bool,
    /// Leave the source in place; files are hard-linked instead of moved.
    pub copy_mode: bool,
    /// An existing target file with the same content as the source is not a conflict.
    pub allow_identical_files: bool,
    pub meta_files_location: String,
    pub deleted_suffix: String,
    pub folder_permission: u32,
    pub inclusions: Vec<WildcardString>,
    pub exclusions: Vec<WildcardString>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            block_overwrite: false,
            merge_meta_files_folder: false,
            delete_empty_folders: false,
            delete_marked_as_deleted_paths: false,
            copy_mode: false,
            allow_identical_files: false,
            meta_files_location: UNIONFS_META_FOLDER.to_string(),
            deleted_suffix: UNIONFS_HIDDEN_SUFFIX.to_string(),
            folder_permission: DEFAULT_FOLDER_PERMISSION,
            inclusions: Vec::new(),
            exclusions: Vec::new(),
        }
    }
}

impl MergeOptions {
    /// These options narrowed to what a run may change.
    pub fn with_change_locations(&self, locations: &ChangeLocations) -> Self {
        let mut options = self.clone();
        options
            .inclusions
            .extend(locations.include.iter().map(WildcardString::from));
        options
            .exclusions
            .extend(locations.exclude.iter().map(WildcardString::from));
        options
    }

    /// `location` is relative to the merge root and starts with `/`.
    ///
    /// Deletion markers are matched as if they were the live path they hide.
    pub fn should_skip(&self, location: &str) -> bool {
        let cleaned = location.replace(&self.deleted_suffix, "");

        if !self.inclusions.is_empty() && !self.inclusions.iter().any(|w| w.matches(&cleaned)) {
            return true;
        }

        self.exclusions.iter().any(|w| w.matches_path(&cleaned))
    }

    pub(crate) fn is_deletion_marker(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| name.to_string_lossy().ends_with(&self.deleted_suffix))
    }

    /// The marker for a live path, or the live path for a marker.
    pub(crate) fn counterpart(&self, path: &Path) -> std::path::PathBuf {
        let raw = path.to_string_lossy();
        match raw.strip_suffix(self.deleted_suffix.as_str()) {
            Some(live) => live.into(),
            None => format!("{raw}{}", self.deleted_suffix).into(),
        }
    }
}

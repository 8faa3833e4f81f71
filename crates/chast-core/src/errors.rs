//! Error types shared by every chast operation.

use std::path::PathBuf;

/// Errors raised while parsing recipes, building pipelines and merging changes.
#[derive(Debug, thiserror::Error)]
pub enum ChastError {
    /// A caller supplied a value that cannot be used.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// Input data is structurally wrong (recipe header, flag syntax, ...).
    #[error("illegal format: {0}")]
    IllegalFormat(String),

    /// Recipe parsed but failed semantic validation.
    #[error("invalid recipe {recipe}: {message}")]
    RecipeValidation { recipe: String, message: String },

    /// Filesystem access failed.
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A merge would overwrite an existing path while overwrites are blocked.
    #[error("merge would overwrite {} with {}", conflicting_path.display(), source_path.display())]
    MergeOverwriteBlocked {
        source_path: PathBuf,
        conflicting_path: PathBuf,
    },

    /// Namespace or mount setup failed.
    #[error("isolation failed: {0}")]
    Isolation(String),

    /// A recipe command exited unsuccessfully.
    #[error("command `{command}` failed with status {status}")]
    CommandFailed { command: String, status: i32 },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChastError {
    /// Wrap an io error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Caller / recipe mistakes
            Self::IllegalArgument(_)
            | Self::IllegalFormat(_)
            | Self::RecipeValidation { .. }
            | Self::Yaml(_)
            | Self::UnsupportedOperation(_) => 2,

            // The transformation itself failed
            Self::CommandFailed { .. } | Self::MergeOverwriteBlocked { .. } => 1,

            Self::Io { .. } | Self::Json(_) | Self::Isolation(_) | Self::Internal(_) => 3,
        }
    }

    /// Whether this error stems from a blocked overwrite during a merge.
    pub fn is_overwrite_block(&self) -> bool {
        matches!(self, Self::MergeOverwriteBlocked { .. })
    }
}

/// Result type for chast operations.
pub type ChastResult<T> = Result<T, ChastError>;

/// Attach a path to io results, mirroring `anyhow::Context` for the core crate.
pub(crate) trait IoContext<T> {
    fn at(self, path: impl Into<PathBuf>) -> ChastResult<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl Into<PathBuf>) -> ChastResult<T> {
        self.map_err(|e| ChastError::io(path, e))
    }
}

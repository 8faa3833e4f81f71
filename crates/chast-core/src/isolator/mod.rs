//! Running recipe commands against a copy-on-write view of the root filesystem.
//!
//! Commands run in a fresh user, mount and network namespace, chrooted into a union
//! mount whose writable layer is the step's change capture folder. Everything the
//! commands write ends up there; the real filesystem is never touched.
//!
//! Namespaces and mounts are Linux-only. On other platforms every entry point
//! returns [`ChastError::UnsupportedOperation`].

#[cfg(target_os = "linux")]
mod handlers;
#[cfg(target_os = "linux")]
mod namespace;
#[cfg(target_os = "linux")]
mod strategy;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ChastError, ChastResult};

/// Hidden CLI subcommand the namespace child is started with.
pub const ISOLATED_EXEC_COMMAND: &str = "isolated-exec";

/// Which union filesystem provides the copy-on-write view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationStrategy {
    /// Kernel overlayfs on top of a mergerfs view of the root.
    OverlayFs,
    /// unionfs-fuse, mounted from outside the namespace.
    #[default]
    UnionFs,
}

impl IsolationStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OverlayFs => "overlayfs",
            Self::UnionFs => "unionfs",
        }
    }
}

impl fmt::Display for IsolationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IsolationStrategy {
    type Err = ChastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overlayfs" => Ok(Self::OverlayFs),
            "unionfs" => Ok(Self::UnionFs),
            other => Err(ChastError::IllegalArgument(format!(
                "unknown isolation strategy '{other}', expected unionfs or overlayfs"
            ))),
        }
    }
}

/// Everything the namespace child needs; sent to it as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolationContext {
    pub root_folder: PathBuf,
    /// Read-only layers between the capture folder and the root, nearest first.
    pub merge_folders: Vec<PathBuf>,
    pub change_capture_folder: PathBuf,
    pub operation_directory: PathBuf,
    pub working_directory: PathBuf,
    pub commands: Vec<Vec<String>>,
    pub strategy: IsolationStrategy,
}

/// Run the context's commands isolated and wait for them.
pub fn run_isolated(context: &IsolationContext) -> ChastResult<()> {
    #[cfg(target_os = "linux")]
    {
        namespace::run(context)
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = context;
        Err(ChastError::UnsupportedOperation(
            "isolated execution requires Linux namespaces".into(),
        ))
    }
}

/// Entry point of the re-executed binary inside the namespace.
pub fn run_isolated_child() -> ChastResult<()> {
    #[cfg(target_os = "linux")]
    {
        namespace::run_child()
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(ChastError::UnsupportedOperation(
            "isolated execution requires Linux namespaces".into(),
        ))
    }
}

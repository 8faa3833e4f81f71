//! Runtime settings: where pipelines operate and capture changes.
//!
//! Settings are layered in this order, later wins:
//!
//! 1. Built-in defaults
//! 2. `~/.chast.yaml` or an explicit `--config` file
//! 3. Environment variables
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `CHAST_OPERATION_LOCATION` | Scratch space for mounts (default: `/tmp/chast`) |
//! | `CHAST_CHANGE_CAPTURE_LOCATION` | Where captured changes are stored (default: `/tmp/chast-changes`) |
//! | `CHAST_ROOT_FS` | File system root the recipe operates on (default: `/`) |
//! | `CHAST_ISOLATION_STRATEGY` | `unionfs` or `overlayfs` |
//! | `CHAST_LOG_LEVEL` | Default tracing filter when `RUST_LOG` is unset |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{ChastError, ChastResult, IoContext};
use crate::isolator::IsolationStrategy;

pub const DEFAULT_CONFIG_FILE_NAME: &str = ".chast.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub operation_location: PathBuf,
    pub change_capture_location: PathBuf,
    pub root_fs_location: PathBuf,
    pub isolation_strategy: IsolationStrategy,
    /// Run the steps of one execution group concurrently.
    pub parallel: bool,
    pub log_level: Option<String>,
}

fn default_operation_location() -> PathBuf {
    PathBuf::from("/tmp/chast")
}

fn default_change_capture_location() -> PathBuf {
    PathBuf::from("/tmp/chast-changes")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            operation_location: default_operation_location(),
            change_capture_location: default_change_capture_location(),
            root_fs_location: PathBuf::from("/"),
            isolation_strategy: IsolationStrategy::default(),
            parallel: true,
            log_level: None,
        }
    }
}

impl Settings {
    /// Load settings from `explicit` (must exist) or the default file in the home
    /// directory (optional), then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> ChastResult<Self> {
        let settings = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        settings.with_env_overrides()
    }

    pub fn from_file(path: &Path) -> ChastResult<Self> {
        let raw = std::fs::read_to_string(path).at(path)?;
        debug!(path = %path.display(), "loading settings");
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn with_env_overrides(mut self) -> ChastResult<Self> {
        if let Ok(v) = std::env::var("CHAST_OPERATION_LOCATION") {
            self.operation_location = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CHAST_CHANGE_CAPTURE_LOCATION") {
            self.change_capture_location = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CHAST_ROOT_FS") {
            self.root_fs_location = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CHAST_ISOLATION_STRATEGY") {
            self.isolation_strategy = v.parse()?;
        }
        if let Ok(v) = std::env::var("CHAST_LOG_LEVEL") {
            self.log_level = Some(v);
        }
        Ok(self)
    }

    pub fn validate(&self) -> ChastResult<()> {
        for (name, path) in [
            ("operation_location", &self.operation_location),
            ("change_capture_location", &self.change_capture_location),
            ("root_fs_location", &self.root_fs_location),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ChastError::IllegalArgument(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_FILE_NAME))
}

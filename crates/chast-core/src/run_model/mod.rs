//! Executable form of a recipe: resolved variables and concrete commands per run.

mod builder;
pub mod extensions;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

pub use builder::build_run_model;

/// A `--flag name=value` pair before it is checked against the recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagParameter {
    pub name: String,
    pub value: String,
}

impl FlagParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl std::str::FromStr for FlagParameter {
    type Err = crate::errors::ChastError;

    /// Parses `name=value`; the value may itself contain `=`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok(Self::new(name.trim(), value))
            }
            _ => Err(crate::errors::ChastError::IllegalFormat(format!(
                "flag '{s}' must have the form name=value"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Variables {
    /// Recipe folder; commands run in its `run/` subfolder when present.
    pub working_directory: PathBuf,
    pub map: HashMap<String, String>,
    pub default_value_used: bool,
    /// Where supported extensions are detected, normally the primary argument.
    pub type_detection_path: PathBuf,
}

impl Variables {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeLocations {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    /// One entry per script line, already split into words.
    pub cmds: Vec<Vec<String>>,
    pub working_directory: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredTool {
    pub description: String,
    pub check_cmd: String,
}

#[derive(Debug)]
pub struct Run {
    pub id: String,
    /// Indices into [`RunModel::runs`].
    pub dependencies: Vec<usize>,
    pub supported_extensions: Vec<String>,
    pub docker_image: Option<String>,
    pub required_tools: Vec<RequiredTool>,
    pub command: Command,
    pub change_locations: ChangeLocations,
    uuid: OnceLock<String>,
}

impl Run {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            supported_extensions: Vec::new(),
            docker_image: None,
            required_tools: Vec::new(),
            command: Command::default(),
            change_locations: ChangeLocations::default(),
            uuid: OnceLock::new(),
        }
    }

    /// `<id>-<uuid v4>`, generated once per run.
    pub fn uuid(&self) -> &str {
        self.uuid
            .get_or_init(|| format!("{}-{}", self.id, uuid::Uuid::new_v4()))
    }
}

impl Clone for Run {
    fn clone(&self) -> Self {
        let uuid = OnceLock::new();
        if let Some(existing) = self.uuid.get() {
            let _ = uuid.set(existing.clone());
        }
        Self {
            id: self.id.clone(),
            dependencies: self.dependencies.clone(),
            supported_extensions: self.supported_extensions.clone(),
            docker_image: self.docker_image.clone(),
            required_tools: self.required_tools.clone(),
            command: self.command.clone(),
            change_locations: self.change_locations.clone(),
            uuid,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunModel {
    pub runs: Vec<Run>,
    pub variables: Variables,
}

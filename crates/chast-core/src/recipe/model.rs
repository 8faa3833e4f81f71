//! Recipe data model as it appears in `chast.yaml` files.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

pub const PRIMARY_PARAMETER_DEFAULT_ID: &str = "primaryParameter";

/// Parameter types a recipe may declare.
pub const PARAMETER_TYPES: &[&str] = &[
    "filePath",
    "folderPath",
    "wildcardPath",
    "string",
    "int",
    "boolean",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeType {
    Refactoring,
}

impl RecipeType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Refactoring => "refactoring",
        }
    }
}

/// Any parsed recipe.
#[derive(Debug, Clone, PartialEq)]
pub enum Recipe {
    Refactoring(Box<RefactoringRecipe>),
}

impl Recipe {
    pub fn recipe_type(&self) -> RecipeType {
        match self {
            Self::Refactoring(_) => RecipeType::Refactoring,
        }
    }
}

/// Just enough of a recipe to decide how to decode the rest.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RecipeHeader {
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: String,
    #[serde(rename = "type", default)]
    pub recipe_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RefactoringRecipe {
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
    #[serde(rename = "type")]
    pub recipe_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub maintainer: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub positional_parameters: Vec<Parameter>,
    #[serde(default)]
    pub flags: Vec<Flag>,
    #[serde(default)]
    pub documentation: String,
    #[serde(default)]
    pub primary_parameter: Option<Parameter>,
    #[serde(default, rename = "run")]
    pub runs: Vec<Run>,
    #[serde(default)]
    pub tests: Vec<Test>,
}

impl RefactoringRecipe {
    /// Flags indexed by name and, where present, short name.
    pub fn flags_map(&self) -> HashMap<&str, &Flag> {
        let mut map = HashMap::new();
        for flag in &self.flags {
            map.insert(flag.name.as_str(), flag);
            if let Some(short) = flag.short_name.as_deref().filter(|s| !s.is_empty()) {
                map.insert(short, flag);
            }
        }
        map
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Parameter {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub default_value: Option<String>,
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub long_description: String,
}

impl Parameter {
    /// Required and without a fallback value.
    pub fn is_mandatory(&self) -> bool {
        self.required && self.default_value.as_deref().map_or(true, str::is_empty)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Flag {
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub default_value: Option<String>,
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub long_description: String,
}

impl Flag {
    pub fn is_mandatory(&self) -> bool {
        self.required && self.default_value.as_deref().map_or(true, str::is_empty)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Run {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub supported_extensions: Vec<String>,
    #[serde(default)]
    pub flags: Vec<Flag>,
    #[serde(default)]
    pub docker: Option<Docker>,
    #[serde(default)]
    pub local: Option<Local>,
    #[serde(default)]
    pub script: Vec<String>,
    #[serde(default)]
    pub include_change_locations: Vec<String>,
    #[serde(default)]
    pub exclude_change_locations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Docker {
    pub docker_image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Local {
    #[serde(default)]
    pub required_tools: Vec<RequiredTool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequiredTool {
    #[serde(default)]
    pub description: String,
    pub check_cmd: String,
}

/// A recipe self-test: `tests/<id>/input` is transformed and compared with `tests/<id>/expected`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Test {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// `name=value` pairs.
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub expect_error: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) if f.fract() == 0.0 => format!("{f:.1}"),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s,
        }
    }
}

/// YAML happily types `version: 1` or `defaultValue: 3` as numbers; keep them as text.
fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Scalar::deserialize(deserializer).map(Scalar::into_string)
}

fn optional_scalar_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(Scalar::into_string))
}

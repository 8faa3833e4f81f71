//! Recipe parsing and validation.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, info, warn};

use super::model::{
    Recipe, RecipeHeader, RecipeType, RefactoringRecipe, PARAMETER_TYPES,
    PRIMARY_PARAMETER_DEFAULT_ID,
};
use crate::errors::{ChastError, ChastResult};
use crate::fs_util::File;
use crate::graph::DependencyGraph;

const SUPPORTED_VERSIONS: &[&str] = &["1", "1.0"];

/// Parse and validate the recipe stored in `file`.
pub fn parse_recipe(file: &mut File) -> ChastResult<Recipe> {
    let name = file.absolute_path.display().to_string();
    let content = file.content()?;
    let text = std::str::from_utf8(content)
        .map_err(|e| ChastError::IllegalFormat(format!("recipe {name} is not utf-8: {e}")))?;
    parse_recipe_str(text, &name)
}

/// Parse and validate recipe YAML. `name` is only used in error messages.
pub fn parse_recipe_str(content: &str, name: &str) -> ChastResult<Recipe> {
    let header: RecipeHeader = serde_yaml::from_str(content)?;
    let recipe_type = detect_type(&header.recipe_type)?;

    if !SUPPORTED_VERSIONS.contains(&header.version.as_str()) {
        return Err(ChastError::IllegalFormat(format!(
            "unsupported recipe version '{}' for {} recipe",
            header.version,
            recipe_type.name()
        )));
    }

    match recipe_type {
        RecipeType::Refactoring => {
            let mut recipe: RefactoringRecipe = serde_yaml::from_str(content)?;
            validate_refactoring(&mut recipe, name)?;
            debug!(recipe = %name, runs = recipe.runs.len(), "parsed refactoring recipe");
            Ok(Recipe::Refactoring(Box::new(recipe)))
        }
    }
}

fn detect_type(raw: &str) -> ChastResult<RecipeType> {
    if raw.trim().eq_ignore_ascii_case("refactoring") {
        Ok(RecipeType::Refactoring)
    } else if raw.trim().is_empty() {
        Err(ChastError::IllegalFormat("recipe type is missing".into()))
    } else {
        Err(ChastError::UnsupportedOperation(format!(
            "unknown recipe type '{raw}'"
        )))
    }
}

fn invalid(recipe: &str, message: impl Into<String>) -> ChastError {
    ChastError::RecipeValidation {
        recipe: recipe.to_string(),
        message: message.into(),
    }
}

fn validate_refactoring(recipe: &mut RefactoringRecipe, name: &str) -> ChastResult<()> {
    validate_runs(recipe, name)?;
    validate_primary_parameter(recipe, name)?;
    validate_positional_parameters(recipe, name)?;
    Ok(())
}

fn validate_runs(recipe: &mut RefactoringRecipe, name: &str) -> ChastResult<()> {
    if recipe.runs.is_empty() {
        return Err(invalid(name, "at least one run is required"));
    }

    for (index, run) in recipe.runs.iter_mut().enumerate() {
        if run.id.trim().is_empty() {
            run.id = format!("run-{index}");
        }
        if run.script.iter().all(|line| line.trim().is_empty()) {
            return Err(invalid(name, format!("run '{}' has no script", run.id)));
        }
    }

    let mut index_by_id = HashMap::new();
    for (index, run) in recipe.runs.iter().enumerate() {
        if index_by_id.insert(run.id.as_str(), index).is_some() {
            return Err(invalid(name, format!("duplicate run id '{}'", run.id)));
        }
    }

    let mut edges = Vec::with_capacity(recipe.runs.len());
    for run in &recipe.runs {
        let mut deps = Vec::with_capacity(run.dependencies.len());
        for dependency in &run.dependencies {
            match index_by_id.get(dependency.as_str()) {
                Some(&dep) => deps.push(dep),
                None => {
                    return Err(invalid(
                        name,
                        format!("run '{}' depends on unknown run '{dependency}'", run.id),
                    ))
                }
            }
        }
        edges.push(deps);
    }

    if let Some(cycle) = DependencyGraph::new(edges).find_cycle() {
        let ids: Vec<&str> = cycle.iter().map(|&i| recipe.runs[i].id.as_str()).collect();
        return Err(invalid(
            name,
            format!("cyclic run dependencies: {}", ids.join(" -> ")),
        ));
    }

    Ok(())
}

fn validate_primary_parameter(recipe: &mut RefactoringRecipe, name: &str) -> ChastResult<()> {
    let supported: BTreeSet<String> = recipe
        .runs
        .iter()
        .flat_map(|run| run.supported_extensions.iter().cloned())
        .collect();

    let Some(primary) = recipe.primary_parameter.as_mut() else {
        return Err(invalid(name, "primaryParameter is required"));
    };

    if primary.id.trim().is_empty() {
        info!(
            recipe = %name,
            "primary parameter has no id, using '{PRIMARY_PARAMETER_DEFAULT_ID}'"
        );
        primary.id = PRIMARY_PARAMETER_DEFAULT_ID.to_string();
    }
    primary.required = true;

    if primary.type_name.is_empty() {
        return Err(invalid(name, "primaryParameter.type is required"));
    }
    if !PARAMETER_TYPES.contains(&primary.type_name.as_str()) {
        return Err(invalid(
            name,
            format!(
                "primaryParameter.type '{}' is not one of {}",
                primary.type_name,
                PARAMETER_TYPES.join(", ")
            ),
        ));
    }
    if !primary.extensions.is_empty() {
        return Err(invalid(
            name,
            "primaryParameter must not declare extensions, they are taken from the runs' supportedExtensions",
        ));
    }
    primary.extensions = supported.into_iter().collect();

    if primary.description.trim().is_empty() {
        warn!(recipe = %name, "primary parameter has no description");
    }
    Ok(())
}

fn validate_positional_parameters(recipe: &RefactoringRecipe, name: &str) -> ChastResult<()> {
    let mut seen_ids = HashSet::new();
    let mut optional_seen = false;
    for parameter in &recipe.positional_parameters {
        if parameter.id.trim().is_empty() {
            return Err(invalid(name, "positional parameters need an id"));
        }
        if !seen_ids.insert(parameter.id.as_str()) {
            return Err(invalid(
                name,
                format!("duplicate positional parameter '{}'", parameter.id),
            ));
        }
        if parameter.is_mandatory() {
            if optional_seen {
                return Err(invalid(
                    name,
                    format!(
                        "required positional parameter '{}' follows an optional one",
                        parameter.id
                    ),
                ));
            }
        } else {
            optional_seen = true;
        }
    }
    Ok(())
}

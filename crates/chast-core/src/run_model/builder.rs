use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::extensions::{detect_extensions, normalize_extension};
use super::{ChangeLocations, Command, FlagParameter, RequiredTool, Run, RunModel, Variables};
use crate::errors::{ChastError, ChastResult, IoContext};
use crate::fs_util::absolutize_from;
use crate::recipe::{self, Flag, Parameter, RefactoringRecipe};

/// Resolve arguments and flags against `recipe` and produce the runs to execute.
///
/// `arguments[0]` is the primary argument; an empty or missing one selects the
/// primary parameter's default value.
pub fn build_run_model(
    recipe: &RefactoringRecipe,
    arguments: &[String],
    flags: &[FlagParameter],
    working_directory: &Path,
) -> ChastResult<RunModel> {
    let cwd = std::env::current_dir().at(".")?;
    build_with_cwd(recipe, arguments, flags, working_directory, &cwd)
}

pub(super) fn build_with_cwd(
    recipe: &RefactoringRecipe,
    arguments: &[String],
    flags: &[FlagParameter],
    working_directory: &Path,
    cwd: &Path,
) -> ChastResult<RunModel> {
    let mut variables = Variables::new(working_directory);

    let primary = recipe.primary_parameter.as_ref().ok_or_else(|| {
        ChastError::IllegalArgument("recipe has no primary parameter".into())
    })?;
    let primary_argument = arguments.first().map(String::as_str).unwrap_or_default();
    handle_primary_argument(primary, primary_argument, &mut variables, cwd)?;

    let rest = arguments.get(1..).unwrap_or_default();
    handle_positional_arguments(&recipe.positional_parameters, rest, &mut variables, cwd)?;

    let definitions = flag_definitions(recipe);
    handle_flags(&definitions, flags, &mut variables, cwd)?;

    let runs = filter_runs(&recipe.runs, &variables)?;
    if runs.is_empty() {
        return Err(ChastError::IllegalArgument(format!(
            "no run supports the files found in {}",
            variables.type_detection_path.display()
        )));
    }

    let runs = convert_runs(&runs, &variables);
    Ok(RunModel { runs, variables })
}

fn handle_primary_argument(
    primary: &Parameter,
    argument: &str,
    variables: &mut Variables,
    cwd: &Path,
) -> ChastResult<()> {
    let (raw, from_default) = if argument.trim().is_empty() {
        match primary.default_value.as_deref().filter(|v| !v.is_empty()) {
            Some(default) => (default, true),
            None => {
                return Err(ChastError::IllegalArgument(format!(
                    "missing primary argument '{}'",
                    primary.id
                )))
            }
        }
    } else {
        (argument, false)
    };

    let value = check_value(
        "primary parameter",
        &primary.id,
        &primary.type_name,
        &primary.extensions,
        raw,
        cwd,
    )?;
    variables.type_detection_path = if is_path_type(&primary.type_name) {
        PathBuf::from(&value)
    } else {
        cwd.to_path_buf()
    };
    if from_default {
        info!(parameter = %primary.id, value = %value, "using default primary argument");
        variables.default_value_used = true;
    }
    variables.map.insert(primary.id.clone(), value);
    Ok(())
}

fn handle_positional_arguments(
    parameters: &[Parameter],
    arguments: &[String],
    variables: &mut Variables,
    cwd: &Path,
) -> ChastResult<()> {
    let mandatory = parameters.iter().filter(|p| p.is_mandatory()).count();
    if arguments.len() < mandatory {
        return Err(ChastError::IllegalArgument(format!(
            "not enough positional arguments: expected at least {mandatory}, got {}",
            arguments.len()
        )));
    }
    if arguments.len() > parameters.len() {
        return Err(ChastError::IllegalArgument(format!(
            "too many positional arguments: expected at most {}, got {}",
            parameters.len(),
            arguments.len()
        )));
    }

    for (index, parameter) in parameters.iter().enumerate() {
        if let Some(argument) = arguments.get(index) {
            if variables.default_value_used {
                return Err(ChastError::IllegalArgument(
                    "no positional arguments are allowed after a default value was used".into(),
                ));
            }
            let value = check_value(
                "positional parameter",
                &parameter.id,
                &parameter.type_name,
                &parameter.extensions,
                argument,
                cwd,
            )?;
            variables.map.insert(parameter.id.clone(), value);
        } else if let Some(default) = parameter.default_value.as_deref().filter(|v| !v.is_empty()) {
            variables.map.insert(parameter.id.clone(), default.to_string());
            variables.default_value_used = true;
        }
    }
    Ok(())
}

/// Recipe-level flags followed by run-level flags not already declared.
fn flag_definitions(recipe: &RefactoringRecipe) -> Vec<&Flag> {
    let mut seen = HashSet::new();
    recipe
        .flags
        .iter()
        .chain(recipe.runs.iter().flat_map(|run| run.flags.iter()))
        .filter(|flag| seen.insert(flag.name.as_str()))
        .collect()
}

fn handle_flags(
    definitions: &[&Flag],
    flags: &[FlagParameter],
    variables: &mut Variables,
    cwd: &Path,
) -> ChastResult<()> {
    let mut by_name: HashMap<&str, &Flag> = HashMap::new();
    for flag in definitions {
        by_name.insert(flag.name.as_str(), flag);
        if let Some(short) = flag.short_name.as_deref().filter(|s| !s.is_empty()) {
            by_name.insert(short, flag);
        }
    }

    let mut covered = HashSet::new();
    for given in flags {
        let definition = by_name
            .get(given.name.as_str())
            .ok_or_else(|| ChastError::IllegalArgument(format!("unknown flag '{}'", given.name)))?;
        let value = check_value(
            "flag",
            &definition.name,
            &definition.type_name,
            &definition.extensions,
            &given.value,
            cwd,
        )?;
        covered.insert(definition.name.as_str());
        variables.map.insert(definition.name.clone(), value);
    }

    let missing: Vec<&str> = definitions
        .iter()
        .filter(|flag| flag.is_mandatory() && !covered.contains(flag.name.as_str()))
        .map(|flag| flag.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(ChastError::IllegalFormat(format!(
            "required flags not set: {}",
            missing.join(", ")
        )));
    }

    for flag in definitions {
        if covered.contains(flag.name.as_str()) {
            continue;
        }
        if let Some(default) = flag.default_value.as_deref().filter(|v| !v.is_empty()) {
            variables
                .map
                .insert(flag.name.clone(), default.to_string());
        }
    }
    Ok(())
}

fn is_path_type(type_name: &str) -> bool {
    type_name.ends_with("Path")
}

/// Validate `value` against a declared type and return the value to store.
fn check_value(
    kind: &str,
    id: &str,
    type_name: &str,
    extensions: &[String],
    value: &str,
    cwd: &Path,
) -> ChastResult<String> {
    match type_name {
        "" | "string" => Ok(value.to_string()),
        "bool" | "boolean" => {
            let lowered = value.to_ascii_lowercase();
            if matches!(lowered.as_str(), "true" | "yes" | "false" | "no") {
                Ok(value.to_string())
            } else {
                Err(ChastError::IllegalArgument(format!(
                    "{kind} '{id}' expects a boolean, got '{value}'"
                )))
            }
        }
        "int" => value.trim().parse::<i64>().map(|_| value.to_string()).map_err(|_| {
            ChastError::IllegalArgument(format!("{kind} '{id}' expects an integer, got '{value}'"))
        }),
        t if is_path_type(t) => {
            if t == "filePath" && !extensions.is_empty() {
                let accepted = extensions
                    .iter()
                    .any(|ext| value.ends_with(&normalize_extension(ext)));
                if !accepted {
                    return Err(ChastError::IllegalFormat(format!(
                        "{kind} '{id}': {value} does not have one of the extensions {}",
                        extensions.join(", ")
                    )));
                }
            }
            Ok(absolutize_from(Path::new(value), cwd)
                .to_string_lossy()
                .into_owned())
        }
        other => Err(ChastError::IllegalArgument(format!(
            "{kind} '{id}' has unknown type '{other}'"
        ))),
    }
}

fn filter_runs<'a>(
    runs: &'a [recipe::Run],
    variables: &Variables,
) -> ChastResult<Vec<&'a recipe::Run>> {
    let detected = detect_extensions(&variables.type_detection_path)?;
    debug!(
        path = %variables.type_detection_path.display(),
        extensions = ?detected.keys().collect::<Vec<_>>(),
        "detected extensions"
    );

    Ok(runs
        .iter()
        .filter(|run| {
            let keep = run.supported_extensions.is_empty()
                || run
                    .supported_extensions
                    .iter()
                    .any(|ext| detected.contains_key(&normalize_extension(ext)));
            if !keep {
                info!(run = %run.id, "skipping run, no supported files found");
            }
            keep
        })
        .collect())
}

fn convert_runs(runs: &[&recipe::Run], variables: &Variables) -> Vec<Run> {
    let index_by_id: HashMap<&str, usize> = runs
        .iter()
        .enumerate()
        .map(|(index, run)| (run.id.as_str(), index))
        .collect();

    let run_dir = variables.working_directory.join("run");
    let command_dir = if run_dir.is_dir() {
        run_dir
    } else {
        variables.working_directory.clone()
    };

    runs.iter()
        .map(|source| {
            let mut run = Run::new(source.id.clone());
            run.dependencies = source
                .dependencies
                .iter()
                .filter_map(|dep| {
                    let index = index_by_id.get(dep.as_str()).copied();
                    if index.is_none() {
                        debug!(run = %source.id, dependency = %dep, "dependency was filtered out, dropping it");
                    }
                    index
                })
                .collect();
            run.supported_extensions = source.supported_extensions.clone();
            run.docker_image = source.docker.as_ref().map(|d| d.docker_image.clone());
            run.required_tools = source
                .local
                .iter()
                .flat_map(|local| local.required_tools.iter())
                .map(|tool| RequiredTool {
                    description: tool.description.clone(),
                    check_cmd: tool.check_cmd.clone(),
                })
                .collect();
            run.command = Command {
                cmds: expand_script(&source.script, &variables.map),
                working_directory: command_dir.clone(),
            };
            run.change_locations = ChangeLocations {
                include: source.include_change_locations.clone(),
                exclude: source.exclude_change_locations.clone(),
            };
            run
        })
        .collect()
}

fn expand_script(script: &[String], values: &HashMap<String, String>) -> Vec<Vec<String>> {
    // Longer names first so `$inputFile` is not consumed by `$input`.
    let mut keys: Vec<&String> = values.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    script
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split_whitespace()
                .map(|word| substitute(word, &keys, values))
                .collect()
        })
        .collect()
}

fn substitute(word: &str, keys: &[&String], values: &HashMap<String, String>) -> String {
    let mut out = word.to_string();
    for key in keys {
        let value = &values[*key];
        out = out.replace(&format!("${{{key}}}"), value);
        out = out.replace(&format!("${key}"), value);
    }
    out
}

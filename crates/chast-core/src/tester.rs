//! Self-tests shipped with a recipe.
//!
//! A recipe folder may contain `tests/<id>/input` and `tests/<id>/expected`. Each test
//! runs the recipe on its input folder and compares the captured changes with the
//! expected folder. Changes are never applied.

use std::fs;
use std::path::Path;

use tracing::{debug, error, info};

use crate::config::Settings;
use crate::errors::{ChastResult, IoContext};
use crate::fs_util::{absolutize_from, collect_paths, relative_display};
use crate::recipe::{RefactoringRecipe, Test};
use crate::run_model::FlagParameter;
use crate::service::{self, load_refactoring_recipe, LoadedRecipe};

const TESTS_FOLDER: &str = "tests";
const INPUT_FOLDER: &str = "input";
const EXPECTED_FOLDER: &str = "expected";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub id: String,
    pub passed: bool,
    /// Why the test failed; empty when it passed.
    pub reason: String,
}

impl TestOutcome {
    fn passed(id: &str) -> Self {
        Self {
            id: id.to_string(),
            passed: true,
            reason: String::new(),
        }
    }

    fn failed(id: &str, reason: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            passed: false,
            reason: reason.into(),
        }
    }
}

/// Run every test of the recipe in `recipe_file`, in declaration order.
pub async fn test_recipe(recipe_file: &Path, settings: &Settings) -> ChastResult<Vec<TestOutcome>> {
    let loaded = load_refactoring_recipe(recipe_file)?;
    if loaded.recipe.tests.is_empty() {
        info!(recipe = %loaded.file.absolute_path.display(), "recipe has no tests");
        return Ok(Vec::new());
    }

    let mut outcomes = Vec::with_capacity(loaded.recipe.tests.len());
    for test in &loaded.recipe.tests {
        let outcome = run_test(&loaded, test, settings).await?;
        if outcome.passed {
            info!(test = %outcome.id, "test passed");
        } else {
            error!(test = %outcome.id, reason = %outcome.reason, "test failed");
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

async fn run_test(
    loaded: &LoadedRecipe,
    test: &Test,
    settings: &Settings,
) -> ChastResult<TestOutcome> {
    let test_folder = loaded.folder().join(TESTS_FOLDER).join(&test.id);
    let input = test_folder.join(INPUT_FOLDER);
    let expected = test_folder.join(EXPECTED_FOLDER);

    let mut arguments = vec![input.display().to_string()];
    arguments.extend(absolutize_arguments(&loaded.recipe, &test.args, &input));
    let flags = absolutize_flags(&loaded.recipe, &test.flags, &input)?;
    debug!(test = %test.id, ?arguments, ?flags, "running recipe test");

    let pipeline = match service::run_loaded(loaded, &arguments, &flags, settings).await {
        Ok(pipeline) => pipeline,
        Err(_) if test.expect_error => return Ok(TestOutcome::passed(&test.id)),
        Err(e) => return Ok(TestOutcome::failed(&test.id, format!("run failed: {e}"))),
    };

    let outcome = if test.expect_error {
        TestOutcome::failed(&test.id, "expected the run to fail")
    } else {
        let input_location = relative_display(&input, &pipeline.root_fs_location);
        match compare_folders(
            &pipeline.final_change_capture_location(),
            &expected,
            &input_location,
        ) {
            Ok(()) => TestOutcome::passed(&test.id),
            Err(reason) => TestOutcome::failed(&test.id, reason),
        }
    };
    service::discard(&pipeline)?;
    Ok(outcome)
}

fn is_path_type(type_name: &str) -> bool {
    type_name.ends_with("Path")
}

fn absolutize_value(value: &str, type_name: &str, input: &Path) -> String {
    if is_path_type(type_name) && !Path::new(value).is_absolute() {
        absolutize_from(Path::new(value), input)
            .display()
            .to_string()
    } else {
        value.to_string()
    }
}

/// Test arguments follow the primary argument, so `args[i]` belongs to positional
/// parameter `i`.
fn absolutize_arguments(recipe: &RefactoringRecipe, args: &[String], input: &Path) -> Vec<String> {
    args.iter()
        .enumerate()
        .map(|(index, arg)| match recipe.positional_parameters.get(index) {
            Some(parameter) => absolutize_value(arg, &parameter.type_name, input),
            None => arg.clone(),
        })
        .collect()
}

fn absolutize_flags(
    recipe: &RefactoringRecipe,
    flags: &[String],
    input: &Path,
) -> ChastResult<Vec<FlagParameter>> {
    let definitions = recipe.flags_map();
    flags
        .iter()
        .map(|raw| {
            let flag: FlagParameter = raw.parse()?;
            let value = match definitions.get(flag.name.as_str()) {
                Some(definition) => absolutize_value(&flag.value, &definition.type_name, input),
                None => flag.value.clone(),
            };
            Ok(FlagParameter::new(flag.name, value))
        })
        .collect()
}

/// Compare the captured changes with the expected folder.
///
/// `input_location` is the input folder as seen from the root filesystem; it is
/// stripped from the captured paths before comparing.
fn compare_folders(actual: &Path, expected: &Path, input_location: &str) -> Result<(), String> {
    let expected_paths = collect_or_empty(expected).map_err(|e| e.to_string())?;
    let actual_paths = collect_or_empty(actual).map_err(|e| e.to_string())?;

    let mut stripped: Vec<(String, &String)> = actual_paths
        .iter()
        .map(|path| {
            let relative = path
                .strip_prefix(input_location)
                .filter(|rest| rest.starts_with('/'))
                .unwrap_or(path);
            (relative.to_string(), path)
        })
        .collect();
    stripped.sort();

    let actual_relative: Vec<&String> = stripped.iter().map(|(relative, _)| relative).collect();
    let expected_relative: Vec<&String> = expected_paths.iter().collect();
    if actual_relative != expected_relative {
        return Err(format!(
            "expected paths {expected_relative:?}, got {actual_relative:?}"
        ));
    }

    for (relative, captured) in &stripped {
        if relative.ends_with('/') {
            continue;
        }
        let actual_file = actual.join(captured.trim_start_matches('/'));
        let expected_file = expected.join(relative.trim_start_matches('/'));
        if !same_content(&actual_file, &expected_file).map_err(|e| e.to_string())? {
            return Err(format!("content of {relative} does not match"));
        }
    }
    Ok(())
}

fn collect_or_empty(folder: &Path) -> ChastResult<Vec<String>> {
    if folder.exists() {
        collect_paths(folder)
    } else {
        Ok(Vec::new())
    }
}

fn same_content(actual: &Path, expected: &Path) -> ChastResult<bool> {
    let actual_content = fs::read(actual).at(actual)?;
    let expected_content = fs::read(expected).at(expected)?;
    let equal = actual_content.trim_ascii() == expected_content.trim_ascii();
    if !equal {
        debug!(
            expected = %String::from_utf8_lossy(&expected_content),
            actual = %String::from_utf8_lossy(&actual_content),
            "content mismatch"
        );
    }
    Ok(equal)
}

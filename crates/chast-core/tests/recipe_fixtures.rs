use chast_core::fs_util::File;
use chast_core::recipe::{parse_recipe, Recipe, RefactoringRecipe};
use chast_core::ChastError;
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn parse(name: &str) -> Result<RefactoringRecipe, ChastError> {
    let mut file = File::new(fixture(name))?;
    match parse_recipe(&mut file)? {
        Recipe::Refactoring(recipe) => Ok(*recipe),
    }
}

#[test]
fn multi_run_recipe_is_completed_during_validation() {
    let recipe = parse("multi_run.yaml").expect("fixture should parse");

    assert_eq!(recipe.name, "rearrange_class_members");
    assert_eq!(recipe.version, "1.0");

    let primary = recipe.primary_parameter.as_ref().unwrap();
    assert_eq!(primary.id, "primaryParameter");
    assert!(primary.required);
    assert_eq!(primary.extensions, vec!["*.kts", ".kt", "java"]);

    let ids: Vec<&str> = recipe.runs.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "rearrange_class_members_java",
            "rearrange_class_members_kotlin",
            "run-2"
        ]
    );
    assert_eq!(recipe.runs[1].exclude_change_locations, vec!["/tmp/*"]);
    assert_eq!(
        recipe.runs[1].local.as_ref().unwrap().required_tools[0].check_cmd,
        "java -version"
    );

    assert_eq!(recipe.flags[0].default_value.as_deref(), Some("2"));
    assert!(recipe.flags_map().contains_key("d"));

    assert_eq!(recipe.tests.len(), 2);
    assert_eq!(recipe.tests[0].flags, vec!["depth=3"]);
    assert!(recipe.tests[1].expect_error);
}

#[test]
fn dependency_cycles_are_rejected() {
    let err = parse("dependency_cycle.yaml").unwrap_err();
    match err {
        ChastError::RecipeValidation { message, .. } => {
            assert!(message.contains("cyclic"), "{message}")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(parse("dependency_cycle.yaml").unwrap_err().exit_code(), 2);
}

#[test]
fn unknown_keys_are_rejected() {
    assert!(matches!(
        parse("unknown_key.yaml").unwrap_err(),
        ChastError::Yaml(_)
    ));
}

#[test]
fn unknown_versions_are_rejected() {
    assert!(matches!(
        parse("unknown_version.yaml").unwrap_err(),
        ChastError::IllegalFormat(_)
    ));
}

#[test]
fn demo_recipe_parses() {
    let demo = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos/recipes/strip_trailing_whitespace/chast.yaml");
    let mut file = File::new(&demo).unwrap();
    let Recipe::Refactoring(recipe) = parse_recipe(&mut file).unwrap();
    assert_eq!(recipe.tests[0].id, "kotlin");
    assert_eq!(
        recipe.primary_parameter.as_ref().unwrap().extensions,
        vec!["kt"]
    );
}

#[test]
fn rearrange_demo_reorders_without_changing_members() {
    let demo = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos/recipes/rearrange_class_members");
    let mut file = File::new(demo.join("chast.yaml")).unwrap();
    let Recipe::Refactoring(recipe) = parse_recipe(&mut file).unwrap();
    assert_eq!(recipe.name, "rearrange_class_members");
    assert_eq!(recipe.tests[0].id, "kotlin");
    assert_eq!(recipe.runs[1].dependencies, vec!["java"]);

    let read_lines = |folder: &str| {
        let path = demo.join("tests/kotlin").join(folder).join("TestFile.kt");
        let content = std::fs::read_to_string(path).unwrap();
        let mut lines: Vec<String> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();
        lines.sort();
        lines
    };
    assert_eq!(read_lines("input"), read_lines("expected"));
}

use super::*;
use clap::CommandFactory;
use clap::Parser;

#[test]
fn cli_debug_assert() {
    Cli::command().debug_assert();
}

#[test]
fn run_refactoring_parses_arguments_and_flags() {
    let cli = Cli::try_parse_from([
        "chast",
        "-vv",
        "run",
        "refactoring",
        "recipe/chast.yaml",
        "src/Main.kt",
        "extra",
        "--flag",
        "depth=3",
        "--flag",
        "o=out=dir",
        "--strategy",
        "overlayfs",
        "--sequential",
        "--yes",
    ])
    .expect("parse should succeed");

    assert_eq!(cli.verbose, 2);
    match cli.cmd {
        Command::Run(run) => match run.cmd {
            RunSub::Refactoring(args) => {
                assert_eq!(args.recipe, PathBuf::from("recipe/chast.yaml"));
                assert_eq!(args.args, vec!["src/Main.kt", "extra"]);
                assert_eq!(
                    args.flags,
                    vec![
                        FlagParameter::new("depth", "3"),
                        FlagParameter::new("o", "out=dir")
                    ]
                );
                assert_eq!(args.strategy, Some(IsolationStrategy::OverlayFs));
                assert!(args.sequential);
                assert!(args.yes);
                assert!(!args.no_apply);
            }
        },
        _ => panic!("expected Command::Run"),
    }
}

#[test]
fn flags_without_value_are_rejected() {
    let result = Cli::try_parse_from(["chast", "run", "refactoring", "r.yaml", "--flag", "depth"]);
    assert!(result.is_err());
}

#[test]
fn yes_and_no_apply_conflict() {
    let result = Cli::try_parse_from(["chast", "run", "refactoring", "r.yaml", "--yes", "--no-apply"]);
    assert!(result.is_err());
}

#[test]
fn isolated_exec_is_hidden() {
    let help = Cli::command().render_help().to_string();
    assert!(!help.contains("isolated-exec"));
    assert!(matches!(
        Cli::try_parse_from(["chast", "isolated-exec"]).unwrap().cmd,
        Command::IsolatedExec
    ));
}

#[test]
fn test_refactoring_takes_recipe() {
    let cli = Cli::try_parse_from(["chast", "--config", "c.yaml", "test", "refactoring", "r.yaml"]).unwrap();
    assert_eq!(cli.config, Some(PathBuf::from("c.yaml")));
    match cli.cmd {
        Command::Test(test) => match test.cmd {
            TestSub::Refactoring(args) => assert_eq!(args.recipe, PathBuf::from("r.yaml")),
        },
        _ => panic!("expected Command::Test"),
    }
}

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use chast_core::{FlagParameter, IsolationStrategy};

#[derive(Parser)]
#[command(
    name = "chast",
    version,
    about = "CHAnge STuff - A CLI for unifying tools and automating changes"
)]
pub struct Cli {
    /// Settings file (default: ~/.chast.yaml)
    #[arg(long, global = true, env = "CHAST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a recipe and apply its changes
    Run(RunArgs),
    /// Run the tests shipped with a recipe
    Test(TestArgs),
    /// Entry point of the isolated namespace child
    #[command(name = "isolated-exec", hide = true)]
    IsolatedExec,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(subcommand)]
    pub cmd: RunSub,
}

#[derive(Subcommand, Debug)]
pub enum RunSub {
    /// Run a refactoring recipe
    Refactoring(RunRefactoringArgs),
}

#[derive(Args, Debug)]
pub struct RunRefactoringArgs {
    /// Recipe file (chast.yaml)
    pub recipe: PathBuf,

    /// Primary argument followed by the recipe's positional arguments
    pub args: Vec<String>,

    /// Recipe flag, repeatable
    #[arg(long = "flag", value_name = "NAME=VALUE")]
    pub flags: Vec<FlagParameter>,

    /// Apply without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Keep the captured changes without applying or discarding them
    #[arg(long, conflicts_with = "yes")]
    pub no_apply: bool,

    /// Override the configured isolation strategy (unionfs|overlayfs)
    #[arg(long)]
    pub strategy: Option<IsolationStrategy>,

    /// Run the steps of a group one after another
    #[arg(long)]
    pub sequential: bool,
}

#[derive(Args, Debug)]
pub struct TestArgs {
    #[command(subcommand)]
    pub cmd: TestSub,
}

#[derive(Subcommand, Debug)]
pub enum TestSub {
    /// Test a refactoring recipe
    Refactoring(TestRefactoringArgs),
}

#[derive(Args, Debug)]
pub struct TestRefactoringArgs {
    /// Recipe file (chast.yaml)
    pub recipe: PathBuf,

    /// Override the configured isolation strategy (unionfs|overlayfs)
    #[arg(long)]
    pub strategy: Option<IsolationStrategy>,
}

#[cfg(test)]
mod tests;

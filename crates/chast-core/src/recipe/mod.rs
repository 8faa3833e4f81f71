//! Recipes describe which external tools to run, in which order, and on what input.

pub mod model;
pub mod parser;

pub use model::{
    Docker, Flag, Local, Parameter, Recipe, RecipeType, RefactoringRecipe, RequiredTool, Run, Test,
};
pub use parser::{parse_recipe, parse_recipe_str};

//! chast core: recipes in, captured file changes out.
//!
//! A refactoring recipe is turned into a [`run_model::RunModel`], laid out as a
//! [`pipeline::Pipeline`] and executed step by step inside a private mount namespace
//! where every write lands in a change capture folder. The captures are merged
//! ([`merger`]) into one change set that can be reported, applied or discarded.

pub mod config;
pub mod errors;
pub mod fs_util;
pub mod graph;
pub mod isolator;
pub mod merger;
pub mod pipeline;
pub mod post_processing;
pub mod recipe;
pub mod report;
pub mod run_model;
pub mod runner;
pub mod service;
pub mod tester;
pub mod wildcard;

// Convenience re-exports
pub use config::Settings;
pub use errors::{ChastError, ChastResult};
pub use isolator::IsolationStrategy;
pub use pipeline::Pipeline;
pub use report::Report;
pub use run_model::FlagParameter;
pub use tester::{test_recipe, TestOutcome};

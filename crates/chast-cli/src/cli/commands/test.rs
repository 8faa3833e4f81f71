use anyhow::Context;
use chast_core::{test_recipe, Settings};

use super::super::args::TestRefactoringArgs;
use crate::exit_codes::{COMMAND_FAILED, SUCCESS};

pub async fn refactoring(args: TestRefactoringArgs, mut settings: Settings) -> anyhow::Result<i32> {
    super::require_recipe(&args.recipe)?;
    super::apply_strategy(&mut settings, args.strategy);

    let outcomes = test_recipe(&args.recipe, &settings)
        .await
        .with_context(|| format!("failed to test recipe {}", args.recipe.display()))?;

    for outcome in &outcomes {
        if outcome.passed {
            println!("PASS {}", outcome.id);
        } else {
            println!("FAIL {}: {}", outcome.id, outcome.reason);
        }
    }

    let failed = outcomes.iter().filter(|o| !o.passed).count();
    println!("{} passed, {} failed", outcomes.len() - failed, failed);

    Ok(if failed == 0 { SUCCESS } else { COMMAND_FAILED })
}

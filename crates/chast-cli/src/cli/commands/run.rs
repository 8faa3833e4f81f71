use std::io::IsTerminal;

use anyhow::Context;
use chast_core::{service, Settings};
use dialoguer::{theme::ColorfulTheme, Confirm};
use tracing::info;

use super::super::args::RunRefactoringArgs;
use crate::exit_codes::SUCCESS;

pub async fn refactoring(args: RunRefactoringArgs, mut settings: Settings) -> anyhow::Result<i32> {
    super::require_recipe(&args.recipe)?;
    super::apply_strategy(&mut settings, args.strategy);
    if args.sequential {
        settings.parallel = false;
    }

    let pipeline = service::run(&args.recipe, &args.args, &args.flags, &settings)
        .await
        .with_context(|| format!("failed to run recipe {}", args.recipe.display()))?;

    let report = service::report(&pipeline).context("failed to build change report")?;
    if report.is_empty() {
        println!("No changes.");
        service::discard(&pipeline)?;
        return Ok(SUCCESS);
    }

    let colorize = std::io::stdout().is_terminal();
    println!("{}", report.to_string(colorize)?);

    if args.no_apply {
        println!(
            "Changes kept at {}",
            pipeline.final_change_capture_location().display()
        );
        return Ok(SUCCESS);
    }

    let apply = if args.yes {
        true
    } else {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Apply changes?")
            .default(false)
            .interact()
            .unwrap_or(false)
    };

    if apply {
        let changed = service::apply_changes(&pipeline).context("failed to apply changes")?;
        info!(changed = changed.len(), "applied changes");
        println!("Applied {} change(s).", changed.len());
    } else {
        service::discard(&pipeline)?;
        println!("Changes discarded.");
    }
    Ok(SUCCESS)
}

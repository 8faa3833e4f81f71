use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
pub mod exit_codes;

use chast_core::{ChastError, Settings};
use cli::args::{Cli, Command};
use cli::commands::dispatch;

fn main() {
    let cli = Cli::parse();

    // The namespace child runs before any runtime exists and reports through its exit code.
    if matches!(cli.cmd, Command::IsolatedExec) {
        init_tracing(cli.verbose, None);
        let code = match chast_core::isolator::run_isolated_child() {
            Ok(()) => exit_codes::SUCCESS,
            Err(e) => {
                eprintln!("isolated execution failed: {e}");
                match e {
                    ChastError::CommandFailed { status, .. } => status,
                    other => other.exit_code(),
                }
            }
        };
        std::process::exit(code);
    }

    let settings = match Settings::load(cli.config.as_deref()).and_then(|s| {
        s.validate()?;
        Ok(s)
    }) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("fatal: failed to load settings: {e}");
            std::process::exit(exit_codes::CONFIG_ERROR);
        }
    };
    init_tracing(cli.verbose, settings.log_level.as_deref());

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("fatal: failed to start runtime: {e}");
            std::process::exit(exit_codes::INTERNAL_ERROR);
        }
    };

    let code = match runtime.block_on(dispatch(cli, settings)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fatal: {e:#}");
            exit_codes::for_error(&e)
        }
    };
    std::process::exit(code);
}

/// `RUST_LOG` wins; otherwise `-v` raises the configured level (default `info`).
fn init_tracing(verbose: u8, configured: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match verbose {
            0 => configured.unwrap_or("info"),
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::new(level)
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

//! Clarifier - guided clarification of problem statements
//!
//! CLI entry point: credential gate, then the interactive dialogue or a
//! one-shot screening check.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use clarifier_core::Verdict;
use clarifier_runtime::{ClarificationController, ProviderRegistry, RuntimeConfig};

mod cli;
mod gate;
mod repl;

use cli::{Cli, Command};
use repl::Repl;

/// Exit code of `screen` for suspect text.
const EXIT_SUSPECT: u8 = 2;

/// Logs go to stderr so the dialogue on stdout stays readable.
fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = cli.load_config()?;

    info!(
        provider = %config.provider.kind,
        model = ?config.provider.model,
        "Clarifier loaded config"
    );

    let expected = gate::expected_password(&config.access);
    gate::check(expected.as_ref(), gate::prompt_password)?;
    drop(expected);

    let controller = build_controller(config)?;

    match cli.command.unwrap_or_default() {
        Command::Run { output_dir, format } => {
            Repl::new(controller, output_dir, format).run().await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Screen { text } => cmd_screen(&controller, &text).await,
    }
}

fn build_controller(config: RuntimeConfig) -> Result<ClarificationController> {
    let kind = config.provider.kind.clone();
    let registry = ProviderRegistry::with_defaults();

    ClarificationController::from_config(config, &registry).with_context(|| {
        format!(
            "Failed to set up provider '{}' (available: {})",
            kind,
            registry.available_types().join(", ")
        )
    })
}

/// Print the verdict; exit 0 for SAFE, 2 for SUSPECT.
async fn cmd_screen(controller: &ClarificationController, text: &str) -> Result<ExitCode> {
    let verdict = controller.screener().screen(text).await;
    println!("{}", verdict);

    Ok(match verdict {
        Verdict::Safe => ExitCode::SUCCESS,
        Verdict::Suspect { .. } => ExitCode::from(EXIT_SUSPECT),
    })
}

//! CLI command definitions and configuration lookup

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use clarifier_core::ExportFormat;
use clarifier_runtime::RuntimeConfig;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "clarifier.yaml";

/// Clarifier - guided dialogue for sharpening problem statements
#[derive(Parser, Debug)]
#[command(
    name = "clarifier",
    about = "Guided dialogue for clarifying problem statements",
    version,
    after_help = "Logs go to stderr. Set RUST_LOG to change the filter."
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Provider type, overriding the config file (anthropic, openai)
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Model name, overriding the config file
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Start an interactive clarification session (default)
    Run {
        /// Directory the summary document is written to
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Summary format (md, json)
        #[arg(short, long, default_value = "md")]
        format: ExportFormat,
    },

    /// Screen a piece of text and print SAFE or SUSPECT
    Screen {
        /// Text to screen
        text: String,
    },
}

impl Default for Command {
    fn default() -> Self {
        Command::Run {
            output_dir: PathBuf::from("."),
            format: ExportFormat::Markdown,
        }
    }
}

impl Cli {
    /// Load the runtime configuration and apply command-line overrides.
    ///
    /// Lookup order: `--config`, then `./clarifier.yaml`, then defaults.
    pub fn load_config(&self) -> Result<RuntimeConfig> {
        let mut config = match self.config_path() {
            Some(path) => RuntimeConfig::from_file(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => RuntimeConfig::default(),
        };

        if let Some(provider) = &self.provider {
            if *provider != config.provider.kind {
                // A model named for another provider would not resolve
                config.provider.model = None;
            }
            config.provider.kind = provider.clone();
        }
        if let Some(model) = &self.model {
            config.provider.model = Some(model.clone());
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(|| {
            let local = Path::new(DEFAULT_CONFIG_FILE);
            local.exists().then(|| local.to_path_buf())
        })
    }
}

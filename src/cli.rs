//! Command-line interface parsing for pixelflow
//!
//! This module handles parsing of CLI arguments using clap and merging them
//! over the settings loaded from the config file.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

use crate::config::{ConfigError, Settings};
use crate::request::Locale;

/// Error types for running CLI commands
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built
    #[error("Failed to initialize HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// The dashboard was passed to the one-shot command runner
    #[error("The dashboard is interactive and cannot run as a one-shot command")]
    Interactive,

    /// An API request failed; holds the user-facing message
    #[error("{0}")]
    Request(String),

    /// Writing output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding JSON output failed
    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

/// pixelflow - AI photo-processing jobs from your terminal
#[derive(Parser, Debug)]
#[command(name = "pixelflow")]
#[command(about = "Browse, watch and download AI photo-processing jobs")]
#[command(version)]
pub struct Cli {
    /// Path to a YAML config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Base URL of the photo-processing API
    #[arg(long, global = true, env = "PIXELFLOW_API_URL", value_name = "URL")]
    pub api_url: Option<String>,

    /// API bearer token
    #[arg(long, global = true, env = "PIXELFLOW_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Language for error messages (en, es)
    #[arg(long, global = true, env = "PIXELFLOW_LOCALE", value_name = "LOCALE")]
    pub locale: Option<Locale>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Output format flag shared by the fetch commands
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct OutputArgs {
    /// Print raw JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Available subcommands; with none, the dashboard opens
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Open the live job dashboard (default)
    Dashboard,
    /// List your processing jobs
    Jobs(OutputArgs),
    /// Show a single job
    Job {
        /// Job identifier
        id: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List the available processing categories
    Categories(OutputArgs),
    /// Show your credit balance
    Credits(OutputArgs),
    /// Poll a job until it completes or fails
    Watch {
        /// Job identifier
        id: String,
        /// Seconds between status checks
        #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,
    },
    /// Download the processed images of a job
    Download {
        /// Job identifier
        id: String,
        /// Directory to save images into
        #[arg(long, short, default_value = ".")]
        out: PathBuf,
    },
}

impl Cli {
    /// Returns the subcommand, defaulting to the dashboard
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Dashboard)
    }

    /// Loads the config file and applies command-line overrides
    pub fn resolve_settings(&self) -> Result<Settings, CliError> {
        let mut settings = Settings::load(self.config.as_deref())?;
        self.apply_overrides(&mut settings);
        settings.validate()?;
        Ok(settings)
    }

    /// Overwrites settings with any values given on the command line
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(ref api_url) = self.api_url {
            settings.api_url = api_url.clone();
        }
        if let Some(ref token) = self.token {
            settings.token = Some(token.clone());
        }
        if let Some(locale) = self.locale {
            settings.locale = locale;
        }
    }
}

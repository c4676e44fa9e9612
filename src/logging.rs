//! Tracing setup
//!
//! Command output goes to stdout, so CLI commands log to stderr. The dashboard
//! owns the terminal, so it logs to a file in the cache directory instead.
//! `PIXELFLOW_LOG` accepts the usual `EnvFilter` directives.

use directories::ProjectDirs;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Environment variable holding filter directives
pub const LOG_ENV: &str = "PIXELFLOW_LOG";

/// Where log lines are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

/// Default dashboard log file, e.g. `~/.cache/pixelflow/pixelflow.log`
pub fn default_log_path() -> Option<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", "pixelflow")?;
    Some(project_dirs.cache_dir().join("pixelflow.log"))
}

/// Level used when `PIXELFLOW_LOG` is unset or invalid
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "warn"
    }
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Opens `path` for appending, creating parent directories as needed
pub fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Installs the global subscriber
///
/// Does nothing if a subscriber is already installed.
pub fn init(target: &LogTarget, verbose: bool) -> io::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_target(false);

    // Ignoring try_init: a second init keeps the first subscriber
    match target {
        LogTarget::Stderr => {
            let _ = builder.with_writer(io::stderr).try_init();
        }
        LogTarget::File(path) => {
            let file = open_log_file(path)?;
            let _ = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
    }
    Ok(())
}

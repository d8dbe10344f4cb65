//! Logging configuration using the tracing ecosystem.
//!
//! Logs go to a daily-rotated file so they never mix with command output.
//! The level is taken from `RUST_LOG` when set.

use std::path::PathBuf;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Default log filter if RUST_LOG is not set.
const DEFAULT_LOG_FILTER: &str = "zentao_cli=info,warn";

/// Log filter used with `--verbose`.
const VERBOSE_LOG_FILTER: &str = "zentao_cli=debug,info";

/// Initialize the logging system.
///
/// Sets up tracing with a daily rotating file appender in the user's local
/// data directory:
/// - Linux: `~/.local/share/zentao-cli/logs/`
/// - macOS: `~/Library/Application Support/zentao-cli/logs/`
/// - Windows: `C:\Users\<User>\AppData\Local\zentao-cli\logs\`
///
/// `RUST_LOG` overrides the level; otherwise `verbose` selects debug output
/// for this crate.
///
/// # Errors
///
/// Returns an error if the log directory cannot be determined or created,
/// or if a global subscriber is already set.
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "zentao-cli.log");

    let default_filter = if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(filter);

    tracing::subscriber::set_global_default(subscriber)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "zentao-cli starting");
    tracing::debug!(log_dir = %log_dir.display(), "Log directory");

    Ok(())
}

/// Get the log directory path.
fn get_log_directory() -> anyhow::Result<PathBuf> {
    let base_dir = dirs::data_local_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine local data directory"))?;

    Ok(base_dir.join("zentao-cli").join("logs"))
}

/// Get the path where logs are stored, for display to users.
pub fn log_directory() -> Option<PathBuf> {
    get_log_directory().ok()
}

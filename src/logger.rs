//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after the config file has been read.

use std::path::Path;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::error::AppError;

/// Noisy dependency targets that stay at `warn` unless `RUST_LOG` says otherwise.
const QUIET_TARGETS: &[&str] = &["hyper", "reqwest", "rustls", "pdf_extract", "lopdf"];

/// Initialise the global tracing subscriber.
///
/// `level` is the configured level (`ROUW_LOG_LEVEL` or `[bot] log_level`).
/// When `RUST_LOG` is set it wins; otherwise `level` is used with the
/// [`QUIET_TARGETS`] pinned to `warn`. Output goes to stderr, or appends to
/// `log_file` when given.
pub fn init(level: &str, log_file: Option<&Path>) -> Result<(), AppError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(level)?,
    };

    let writer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    AppError::Logger(format!("failed to open log file '{}': {e}", path.display()))
                })?;
            BoxMakeWriter::new(file)
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log_file.is_none())
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}

/// Build the directive string for `level` plus the quiet dependency targets.
fn build_filter(level: &str) -> Result<EnvFilter, AppError> {
    let base = parse_level(level)?;
    let mut directives = base.to_string().to_lowercase();
    for target in QUIET_TARGETS {
        directives.push_str(&format!(",{target}=warn"));
    }
    EnvFilter::try_new(&directives)
        .map_err(|e| AppError::Logger(format!("invalid log filter '{directives}': {e}")))
}

/// Parse a log level string into a [`LevelFilter`], returning an error on
/// unrecognised values.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}

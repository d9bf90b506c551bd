//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after the config and CLI flags are resolved.
//! Output goes to stderr so it never interleaves with console prompts on stdout.

use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Initialise the global tracing subscriber.
///
/// `level` accepts a level (`"info"`) or a full filter directive
/// (`"askdb=debug,reqwest=warn"`).
///
/// With `prefer_level`, `level` wins and `RUST_LOG` is only a fallback when
/// `level` does not parse. Without it, `RUST_LOG` wins and `level` is the
/// fallback.
pub fn init(level: &str, prefer_level: bool) -> Result<(), AppError> {
    let filter = if prefer_level {
        match EnvFilter::try_new(level) {
            Ok(filter) => filter,
            Err(level_err) => EnvFilter::try_from_default_env().map_err(|env_err| {
                AppError::Logger(format!(
                    "invalid log level '{level}': {level_err}; RUST_LOG parse failed: {env_err}"
                ))
            })?,
        }
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}

/// Map the count of `-v` flags to a level override.
///
///   -v      → warn
///   -vv     → info
///   -vvv    → debug
///   -vvvv+  → trace
pub fn level_for_verbosity(verbosity: u8) -> Option<&'static str> {
    match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    }
}

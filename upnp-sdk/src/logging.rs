//! Logging setup for applications built on the UPnP crates.
//!
//! Every crate logs through `tracing`; nothing is printed until a subscriber
//! is installed. Call [`init_logging`] once, early.

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber, all events are dropped
    Silent,
    /// Compact stderr output at `info`
    Development,
    /// Verbose output with threads and source locations at `debug`
    Debug,
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid environment variable: {0}")]
    InvalidEnv(String),
}

/// Initialize logging with the specified mode
///
/// # Examples
///
/// ```rust,no_run
/// use upnp_sdk::logging::{init_logging, LoggingMode};
///
/// init_logging(LoggingMode::Development).unwrap();
/// ```
///
/// # Environment Variables
///
/// - `UPNP_LOG_LEVEL`: Override log level (error, warn, info, debug, trace)
/// - `UPNP_LOG_TARGET`: Restrict output to one target (e.g. "upnp_eventing")
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter("info")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .compact(),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter("debug")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .pretty()
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// Initialize logging from `UPNP_LOG_MODE` ("silent", "development" or "debug").
///
/// Unset or unknown values mean silent.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = match std::env::var("UPNP_LOG_MODE").as_deref() {
        Ok("development") => LoggingMode::Development,
        Ok("debug") => LoggingMode::Debug,
        _ => LoggingMode::Silent,
    };

    init_logging(mode)
}

/// `UPNP_LOG_LEVEL`, then `RUST_LOG`, then `default_level`; narrowed to
/// `UPNP_LOG_TARGET` when set.
fn create_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    let level = std::env::var("UPNP_LOG_LEVEL").ok();
    let target = std::env::var("UPNP_LOG_TARGET").ok();
    let rust_log = std::env::var("RUST_LOG").ok();
    filter_directive(default_level, level, target, rust_log)
}

fn filter_directive(
    default_level: &str,
    level: Option<String>,
    target: Option<String>,
    rust_log: Option<String>,
) -> Result<EnvFilter, LoggingError> {
    let directive = match (level, target, rust_log) {
        (level, Some(target), _) => {
            let level = level.unwrap_or_else(|| default_level.to_string());
            format!("off,{}={}", target.trim(), level.trim())
        }
        (Some(level), None, _) => level,
        (None, None, Some(rust_log)) => rust_log,
        (None, None, None) => default_level.to_string(),
    };

    EnvFilter::try_new(&directive)
        .map_err(|e| LoggingError::InvalidEnv(format!("{directive}: {e}")))
}

/// Check if a global subscriber has been installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_mode() {
        assert!(init_logging(LoggingMode::Silent).is_ok());
    }

    #[test]
    fn test_filter_directives() {
        let filter = filter_directive("info", None, None, None).unwrap();
        assert!(filter.to_string().contains("info"));

        let filter = filter_directive("info", Some("trace".into()), None, Some("warn".into())).unwrap();
        assert!(filter.to_string().contains("trace"));

        let filter = filter_directive("debug", None, Some("upnp_eventing".into()), None).unwrap();
        assert!(filter.to_string().contains("upnp_eventing=debug"));

        assert!(matches!(
            filter_directive("info", Some("upnp=loud".into()), None, None),
            Err(LoggingError::InvalidEnv(_))
        ));
    }
}

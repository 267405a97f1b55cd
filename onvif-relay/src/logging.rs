//! Tracing subscriber setup for processes embedding the bridge.
//!
//! Library code only emits `tracing` events; nothing is printed until the
//! host process installs a subscriber through one of these functions.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// Install nothing
    Silent,
    /// Compact single-line output on stderr
    Development,
    /// Pretty output with file and line, default level `debug`
    Debug,
    /// One JSON object per line, for log shippers
    Json,
}

impl LoggingMode {
    fn default_level(self) -> &'static str {
        match self {
            LoggingMode::Debug => "debug",
            _ => "info",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid environment variable: {0}")]
    InvalidEnv(String),
}

/// Install a subscriber for `mode` at the mode's default level.
///
/// `ONVIF_RELAY_LOG_LEVEL`, then `RUST_LOG`, override the level.
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    init_logging_with_level(mode, mode.default_level())
}

/// Install a subscriber for `mode`, defaulting to `level` (the config's `log` key).
pub fn init_logging_with_level(mode: LoggingMode, level: &str) -> Result<(), LoggingError> {
    let filter = env_filter(filter_level(level))?;
    let registry = Registry::default().with(filter);

    let result = match mode {
        LoggingMode::Silent => return Ok(()),
        LoggingMode::Development => registry
            .with(fmt::layer().with_target(false).compact())
            .try_init(),
        LoggingMode::Debug => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LoggingMode::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
    };

    result.map_err(|e| LoggingError::TracingInit(e.to_string()))
}

/// Install a subscriber chosen by `ONVIF_RELAY_LOG_MODE`
/// (`silent`, `development`, `debug` or `json`; unset means `development`).
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    init_logging(mode_from_env()?)
}

fn mode_from_env() -> Result<LoggingMode, LoggingError> {
    match std::env::var("ONVIF_RELAY_LOG_MODE") {
        Err(std::env::VarError::NotPresent) => Ok(LoggingMode::Development),
        Err(e) => Err(LoggingError::InvalidEnv(format!("ONVIF_RELAY_LOG_MODE: {e}"))),
        Ok(value) => parse_mode(&value),
    }
}

fn parse_mode(value: &str) -> Result<LoggingMode, LoggingError> {
    match value.to_ascii_lowercase().as_str() {
        "silent" => Ok(LoggingMode::Silent),
        "development" => Ok(LoggingMode::Development),
        "debug" => Ok(LoggingMode::Debug),
        "json" => Ok(LoggingMode::Json),
        other => Err(LoggingError::InvalidEnv(format!(
            "ONVIF_RELAY_LOG_MODE: unknown mode {other:?}"
        ))),
    }
}

/// `fatal` has no tracing level of its own and filters as `error`.
fn filter_level(level: &str) -> &str {
    match level {
        "fatal" => "error",
        other => other,
    }
}

fn env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    let directives = std::env::var("ONVIF_RELAY_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());

    EnvFilter::try_new(&directives)
        .map_err(|e| LoggingError::InvalidEnv(format!("log filter {directives:?}: {e}")))
}

pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}

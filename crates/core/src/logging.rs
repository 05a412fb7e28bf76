//! Tracing subscriber setup for processes embedding Consilium.
//!
//! Events go to stderr; stdout stays free for answers and reports.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{AppError, AppResult};

const FALLBACK_FILTER: &str = "info";

/// Resolve the filter directive: explicit level, then `RUST_LOG`, then `info`.
fn build_filter(level: Option<&str>) -> AppResult<EnvFilter> {
    let directive = match level {
        Some(level) => level.to_string(),
        None => std::env::var("RUST_LOG").unwrap_or_else(|_| FALLBACK_FILTER.to_string()),
    };
    EnvFilter::try_new(&directive)
        .map_err(|e| AppError::Config(format!("Bad log filter '{}': {}", directive, e)))
}

/// Install the global subscriber.
///
/// `json` switches to one JSON object per event with the current span
/// attached. Color is off when `no_color` is set or `NO_COLOR` is present.
/// Fails if a global subscriber is already installed.
///
/// ```no_run
/// consilium_core::logging::init_logging(Some("consilium_ensemble=debug"), false, false)?;
/// # Ok::<(), consilium_core::AppError>(())
/// ```
pub fn init_logging(level: Option<&str>, no_color: bool, json: bool) -> AppResult<()> {
    let registry = tracing_subscriber::registry().with(build_filter(level)?);

    let installed = if json {
        let layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true);
        registry.with(layer).try_init()
    } else {
        let ansi = !no_color && std::env::var_os("NO_COLOR").is_none();
        let layer = fmt::layer().with_writer(std::io::stderr).with_ansi(ansi);
        registry.with(layer).try_init()
    };

    installed.map_err(|e| AppError::Config(format!("Logging already initialized: {}", e)))
}

/// [`init_logging`] driven by the `logging` configuration section.
pub fn init_from_config(config: &LoggingConfig) -> AppResult<()> {
    init_logging(config.level.as_deref(), !config.color, config.json)
}

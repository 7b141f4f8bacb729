//! Logging infrastructure for Intel Relay.
//!
//! Structured logging on top of the tracing ecosystem. `RUST_LOG` takes
//! precedence over the configured level when set.

use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Crates whose events pass the default filter.
const LOGGED_TARGETS: &[&str] = &["ir_connectors", "ir_core", "ir_cli", "intel_relay"];

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level.
    pub level: Level,
    /// Whether to use JSON format.
    pub json_format: bool,
    /// Whether to include span events.
    pub include_spans: bool,
    /// Whether to include file/line info.
    pub include_location: bool,
    /// Whether to include thread IDs.
    pub include_thread_ids: bool,
    /// Whether to include target (module path).
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            include_spans: false,
            include_location: false,
            include_thread_ids: false,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Verbose output for local runs.
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            json_format: false,
            include_spans: true,
            include_location: true,
            include_thread_ids: true,
            include_target: true,
        }
    }

    /// JSON lines for log shippers.
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            json_format: true,
            include_spans: false,
            include_location: false,
            include_thread_ids: false,
            include_target: true,
        }
    }

    /// Default configuration at the named level (`trace` .. `error`,
    /// case-insensitive). Unknown names fall back to `info`.
    pub fn from_level_str(level: &str) -> Self {
        Self {
            level: parse_level(level).unwrap_or(Level::INFO),
            ..Self::default()
        }
    }

    /// Directive string used when `RUST_LOG` is not set.
    pub fn filter_directives(&self) -> String {
        LOGGED_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, self.level.as_str().to_lowercase()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Parses a level name, ignoring case and surrounding whitespace.
pub fn parse_level(level: &str) -> Option<Level> {
    Level::from_str(level.trim()).ok()
}

/// Initializes the logging system with the given configuration.
///
/// Calling this more than once is harmless; later calls leave the first
/// subscriber in place.
pub fn init_logging_with_config(config: LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let span_events = if config.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let fmt_layer = fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_ids)
            .with_target(config.include_target);

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init();
    } else {
        let fmt_layer = fmt::layer()
            .with_span_events(span_events)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_ids)
            .with_target(config.include_target);

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init();
    }
}

/// Creates the span a single sweep runs in.
#[macro_export]
macro_rules! sweep_span {
    ($sweep:expr) => {
        tracing::info_span!("sweep", sweep = $sweep)
    };
    ($sweep:expr, $($field:tt)*) => {
        tracing::info_span!("sweep", sweep = $sweep, $($field)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.json_format);
    }

    #[test]
    fn test_production_config() {
        let config = LoggingConfig::production();
        assert_eq!(config.level, Level::INFO);
        assert!(config.json_format);
    }

    #[test]
    fn test_development_config() {
        let config = LoggingConfig::development();
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.include_spans);
    }

    #[test]
    fn test_from_level_str() {
        assert_eq!(LoggingConfig::from_level_str("DEBUG").level, Level::DEBUG);
        assert_eq!(LoggingConfig::from_level_str(" warn ").level, Level::WARN);
        assert_eq!(LoggingConfig::from_level_str("loud").level, Level::INFO);
    }

    #[test]
    fn test_filter_directives() {
        let directives = LoggingConfig::from_level_str("trace").filter_directives();
        assert_eq!(
            directives,
            "ir_connectors=trace,ir_core=trace,ir_cli=trace,intel_relay=trace"
        );
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_sweep_span_macro() {
        let _plain = crate::sweep_span!(1_u64);
        let with_fields = crate::sweep_span!(3_u64, collection = "c1");
        let _entered = with_fields.enter();
    }
}

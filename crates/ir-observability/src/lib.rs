//! # ir-observability
//!
//! Logging infrastructure for Intel Relay.
//!
//! Provides structured logging with tracing, in plain text for terminals or
//! JSON lines for log shippers, and the span macro sweeps run under.

pub mod logging;

pub use logging::{init_logging_with_config, parse_level, LoggingConfig};

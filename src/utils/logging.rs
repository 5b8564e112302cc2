//! Logging initialization.
//!
//! Two formats:
//! - `text`: compact human-readable lines (default)
//! - `json`: structured JSON lines for log aggregators
//!
//! The engine itself only emits `tracing` events; embedding applications
//! call [`init_logging`] once at startup (tests and library embedders that
//! install their own subscriber skip it).

use serde::{Deserialize, Serialize};

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact text lines.
    #[default]
    Text,
    /// JSON lines.
    Json,
}

/// Initialize the global tracing subscriber.
///
/// Call once at startup before any tracing events are emitted. The
/// `RUST_LOG` env var overrides `level`. Returns quietly if a subscriber
/// is already installed (e.g. in tests).
pub fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact()
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_serde() {
        assert_eq!(serde_json::to_string(&LogFormat::Json).unwrap(), "\"json\"");
        let back: LogFormat = serde_json::from_str("\"text\"").unwrap();
        assert_eq!(back, LogFormat::Text);
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging("debug", LogFormat::Text);
        init_logging("info", LogFormat::Json);
    }
}

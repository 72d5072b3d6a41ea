//! Tracing subscriber setup.
//!
//! The driver itself only emits `tracing` events. Applications that want them
//! printed call [`init`] once at start-up:
//!
//! ```no_run
//! use daq_driver_dcam::{config::DcamConfig, logging};
//!
//! # fn main() -> Result<(), daq_driver_dcam::DcamError> {
//! let config = DcamConfig::load()?;
//! logging::init(&config.logging)?;
//! tracing::info!("camera service starting");
//! # Ok(())
//! # }
//! ```
//!
//! `RUST_LOG` takes precedence over the configured level when set.

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::{DcamError, Result};

/// Levels accepted in [`LoggingConfig::level`].
pub const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Multi-line, coloured output for development.
    #[default]
    Pretty,
    /// Single-line output.
    Compact,
    /// Newline-delimited JSON for log aggregation.
    Json,
}

/// Logging section of the driver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level (trace, debug, info, warn, error).
    pub level: String,
    /// Output format.
    pub format: OutputFormat,
    /// ANSI colours (ignored for JSON).
    pub ansi: bool,
    /// Include source file and line numbers.
    pub with_file_and_line: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: OutputFormat::Pretty,
            ansi: true,
            with_file_and_line: false,
        }
    }
}

impl LoggingConfig {
    /// Config at `level` with default output.
    pub fn new(level: Level) -> Self {
        Self {
            level: level.as_str().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    /// Replace the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable ANSI colours.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled;
        self
    }

    /// The configured level.
    ///
    /// # Errors
    ///
    /// [`DcamError::Configuration`] for anything outside [`VALID_LEVELS`].
    pub fn level(&self) -> Result<Level> {
        let lower = self.level.to_ascii_lowercase();
        if !VALID_LEVELS.contains(&lower.as_str()) {
            return Err(DcamError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.level,
                VALID_LEVELS.join(", ")
            )));
        }
        lower
            .parse()
            .map_err(|_| DcamError::Configuration(format!("Invalid log level '{}'", self.level)))
    }
}

/// Install a global fmt subscriber.
///
/// Calling this when a global subscriber is already installed is not an
/// error; the existing one is kept.
///
/// # Errors
///
/// [`DcamError::Configuration`] for an invalid level or if installation fails
/// for another reason.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let level = config.level()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let result = match config.format {
        OutputFormat::Pretty => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .pretty()
                    .with_ansi(config.ansi)
                    .with_file(config.with_file_and_line)
                    .with_line_number(config.with_file_and_line)
                    .with_filter(filter),
            )
            .try_init(),
        OutputFormat::Compact => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .compact()
                    .with_ansi(config.ansi)
                    .with_file(config.with_file_and_line)
                    .with_line_number(config.with_file_and_line)
                    .with_filter(filter),
            )
            .try_init(),
        OutputFormat::Json => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .with_file(config.with_file_and_line)
                    .with_line_number(config.with_file_and_line)
                    .with_filter(filter),
            )
            .try_init(),
    };

    result.or_else(|e| {
        if e.to_string().contains("already") {
            Ok(())
        } else {
            Err(DcamError::Configuration(format!(
                "Failed to initialize tracing: {e}"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!(LoggingConfig::default().level().unwrap(), Level::INFO);
        assert_eq!(LoggingConfig::new(Level::DEBUG).level, "debug");
        let upper = LoggingConfig {
            level: "WARN".into(),
            ..Default::default()
        };
        assert_eq!(upper.level().unwrap(), Level::WARN);
    }

    #[test]
    fn test_invalid_level() {
        let config = LoggingConfig {
            level: "verbose".into(),
            ..Default::default()
        };
        assert!(matches!(config.level(), Err(DcamError::Configuration(_))));
        assert!(init(&config).is_err());
    }
}

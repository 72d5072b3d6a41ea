//! Driver configuration using Figment.
//!
//! Sources, later overriding earlier:
//! 1. built-in defaults
//! 2. a TOML file (missing files are skipped)
//! 3. environment variables prefixed with `DCAM_`, with `__` separating
//!    nested keys
//!
//! ```toml
//! device_index = 1
//! sensor_size = 2048
//! default_layout = "contiguous"
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```
//!
//! `DCAM_LOGGING__LEVEL=trace` overrides `logging.level`.

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::components::geometry::DEFAULT_SENSOR_SIZE;
use crate::components::image_sequence::{SequenceLayout, DEFAULT_PAGE_ALIGNMENT};
use crate::error::{DcamError, Result};
use crate::error_log::DEFAULT_ERROR_LOG_CAPACITY;
use crate::logging::LoggingConfig;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "dcam.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DCAM_";

/// Top-level driver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcamConfig {
    /// Index passed to the device open call.
    pub device_index: u32,
    /// Edge length of the square sensor in pixels; ROIs are centred in it.
    pub sensor_size: u64,
    /// Records kept in the per-device error log.
    pub error_log_capacity: usize,
    /// Alignment of image sequence allocations in bytes.
    pub page_alignment: usize,
    /// Layout used by [`CaptureController::allocate_for_geometry`](crate::components::acquisition::CaptureController::allocate_for_geometry).
    pub default_layout: SequenceLayout,
    /// Pixel size used by [`CaptureController::allocate_for_geometry`](crate::components::acquisition::CaptureController::allocate_for_geometry).
    pub bytes_per_pixel: usize,
    /// Log output settings.
    pub logging: LoggingConfig,
}

impl Default for DcamConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            sensor_size: DEFAULT_SENSOR_SIZE,
            error_log_capacity: DEFAULT_ERROR_LOG_CAPACITY,
            page_alignment: DEFAULT_PAGE_ALIGNMENT,
            default_layout: SequenceLayout::Fragmented,
            bytes_per_pixel: 2,
            logging: LoggingConfig::default(),
        }
    }
}

impl DcamConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific TOML file and the environment.
    ///
    /// # Errors
    ///
    /// [`DcamError::Config`] if a source cannot be parsed or a value has the
    /// wrong type. Values are not range-checked; see [`validate`](Self::validate).
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// The layered provider behind [`load_from`](Self::load_from).
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Check value ranges after loading.
    ///
    /// # Errors
    ///
    /// [`DcamError::Configuration`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.error_log_capacity == 0 {
            return Err(DcamError::Configuration(
                "error_log_capacity must be at least 1".into(),
            ));
        }
        if !self.page_alignment.is_power_of_two() {
            return Err(DcamError::Configuration(format!(
                "page_alignment {} is not a power of two",
                self.page_alignment
            )));
        }
        if self.sensor_size == 0 || self.sensor_size % 8 != 0 {
            return Err(DcamError::Configuration(format!(
                "sensor_size {} must be a positive multiple of 8",
                self.sensor_size
            )));
        }
        if self.bytes_per_pixel == 0 {
            return Err(DcamError::Configuration(
                "bytes_per_pixel must be at least 1".into(),
            ));
        }
        self.logging.level()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = DcamConfig::default();
        assert_eq!(config.sensor_size, 2048);
        assert_eq!(config.error_log_capacity, 256);
        assert_eq!(config.page_alignment, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad = [
            DcamConfig {
                error_log_capacity: 0,
                ..Default::default()
            },
            DcamConfig {
                page_alignment: 3000,
                ..Default::default()
            },
            DcamConfig {
                sensor_size: 2050,
                ..Default::default()
            },
            DcamConfig {
                logging: LoggingConfig {
                    level: "loud".into(),
                    ..Default::default()
                },
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(DcamError::Configuration(_))),
                "{config:?}"
            );
        }
    }
}

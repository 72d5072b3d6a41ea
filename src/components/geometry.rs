//! Sensor geometry helpers.
//!
//! The sub-array (ROI) registers only accept multiples of 4, and a centred
//! ROI has its offsets derived from the sensor centre. These helpers carry no
//! device state.

use std::fmt;

/// Default edge length of the square sensor window in pixels.
pub const DEFAULT_SENSOR_SIZE: u64 = 2048;

/// Round to the nearest multiple of 4, halves rounding up.
pub fn round_to_4(x: u64) -> u64 {
    x.saturating_add(2) / 4 * 4
}

/// Offset that centres `size` pixels inside `sensor_size`, aligned to 4.
///
/// A `size` larger than the sensor yields offset 0.
pub fn centered_offset(size: u64, sensor_size: u64) -> u64 {
    round_to_4((sensor_size / 2).saturating_sub(size / 2))
}

/// A sub-array window on the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Roi {
    /// Width in pixels.
    pub width: u64,
    /// Height in pixels.
    pub height: u64,
    /// Horizontal offset from the sensor origin.
    pub x_offset: u64,
    /// Vertical offset from the sensor origin.
    pub y_offset: u64,
}

impl Roi {
    /// Window of `width` x `height` centred on the sensor.
    pub fn centered(width: u64, height: u64, sensor_size: u64) -> Self {
        Self {
            width,
            height,
            x_offset: centered_offset(width, sensor_size),
            y_offset: centered_offset(height, sensor_size),
        }
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.x_offset, self.y_offset
        )
    }
}

/// Snapshot of the current readout geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Sub-array window.
    pub roi: Roi,
    /// Binning factor.
    pub binning: u32,
}

impl Geometry {
    /// Output frame width after binning.
    pub fn binned_width(&self) -> u64 {
        self.roi.width / u64::from(self.binning.max(1))
    }

    /// Output frame height after binning.
    pub fn binned_height(&self) -> u64 {
        self.roi.height / u64::from(self.binning.max(1))
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bin {}x{}", self.roi, self.binning, self.binning)
    }
}

//! Raw DCAM transport interface.
//!
//! [`DcamApi`] is the seam between this crate and the vendor library. Each
//! method corresponds to one DCAM-API entry point and returns the vendor
//! status code on failure; translating those codes, logging them and deciding
//! what a failure means is left to [`DcamConnection`](crate::components::connection::DcamConnection).
//!
//! The crate ships [`MockDcam`](crate::mock::MockDcam) as a simulated
//! implementation. A hardware implementation wraps the vendor bindings.

use std::fmt;
use std::time::Duration;

use bitflags::bitflags;

use crate::error::DcamErrorCode;

/// Result of a raw vendor call.
pub type ApiResult<T> = std::result::Result<T, DcamErrorCode>;

/// Opaque handle of an opened device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

/// Device-assigned property identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(pub i32);

impl PropertyId {
    // Trigger
    /// Where exposures are started from.
    pub const TRIGGER_SOURCE: Self = Self(0x0010_0110);
    /// Edge, level or readout-synchronised trigger interpretation.
    pub const TRIGGER_ACTIVE: Self = Self(0x0010_0120);
    /// Normal or start trigger mode.
    pub const TRIGGER_MODE: Self = Self(0x0010_0210);
    /// Input trigger polarity.
    pub const TRIGGER_POLARITY: Self = Self(0x0010_0220);
    /// Input trigger connector.
    pub const TRIGGER_CONNECTOR: Self = Self(0x0010_0230);
    /// Number of triggers per exposure.
    pub const TRIGGER_TIMES: Self = Self(0x0010_0240);
    /// Delay between trigger and exposure, in seconds.
    pub const TRIGGER_DELAY: Self = Self(0x0010_0260);

    // Output trigger
    /// Output trigger polarity.
    pub const OUTPUT_TRIGGER_POLARITY: Self = Self(0x001C_0120);
    /// What drives the output trigger line.
    pub const OUTPUT_TRIGGER_KIND: Self = Self(0x001C_0160);

    // Exposure
    /// Exposure time in seconds.
    pub const EXPOSURE_TIME: Self = Self(0x001F_0110);

    // Binning & sub-array
    /// Binning factor.
    pub const BINNING: Self = Self(0x0040_1110);
    /// Sub-array horizontal offset.
    pub const SUBARRAY_HPOS: Self = Self(0x0040_2110);
    /// Sub-array width.
    pub const SUBARRAY_HSIZE: Self = Self(0x0040_2120);
    /// Sub-array vertical offset.
    pub const SUBARRAY_VPOS: Self = Self(0x0040_2130);
    /// Sub-array height.
    pub const SUBARRAY_VSIZE: Self = Self(0x0040_2140);
    /// Sub-array readout on or off.
    pub const SUBARRAY_MODE: Self = Self(0x0040_2150);

    // Correction
    /// Pixel defect correction on or off.
    pub const DEFECT_CORRECT_MODE: Self = Self(0x0047_0010);
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0 as u32)
    }
}

bitflags! {
    /// Attribute bits reported by `dcamprop_getattr`.
    ///
    /// The type bits are not mutually exclusive in practice, see
    /// [`PropertyKind::from_attributes`](crate::components::properties::PropertyKind::from_attributes).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AttributeFlags: u32 {
        /// Mode (enumerated) value.
        const TYPE_MODE   = 0x0000_0001;
        /// Integer value.
        const TYPE_LONG   = 0x0000_0002;
        /// Floating-point value.
        const TYPE_REAL   = 0x0000_0004;
        /// Value can be read.
        const READABLE    = 0x0001_0000;
        /// Value can be written.
        const WRITABLE    = 0x0002_0000;
        /// Value may change without a write.
        const VOLATILE    = 0x0008_0000;
        /// `default` is meaningful.
        const HAS_DEFAULT = 0x2000_0000;
        /// `step` is meaningful.
        const HAS_STEP    = 0x4000_0000;
        /// `min` and `max` are meaningful.
        const HAS_RANGE   = 0x8000_0000;
    }
}

bitflags! {
    /// Unit bits reported alongside the attribute record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UnitFlags: u32 {
        /// Seconds.
        const SECOND           = 0x0000_0001;
        /// Degrees Celsius.
        const CELSIUS          = 0x0000_0002;
        /// Kelvin.
        const KELVIN           = 0x0000_0004;
        /// Metres per second.
        const METER_PER_SECOND = 0x0000_0008;
        /// Per second.
        const PER_SECOND       = 0x0000_0010;
        /// Angular degrees.
        const DEGREE           = 0x0000_0020;
        /// Micrometres.
        const MICROMETER       = 0x0000_0040;
    }
}

/// Attribute record for one property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawAttribute {
    /// Type, access and validity bits.
    pub flags: AttributeFlags,
    /// Physical unit bits.
    pub unit: UnitFlags,
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
    /// Increment between valid values.
    pub step: f64,
    /// Factory default.
    pub default: f64,
}

/// Capture start flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Ring-buffer capture that runs until stopped.
    Sequence,
    /// Fill the attached frames once, then stop.
    Snap,
}

/// Capture status as reported by `dcamcap_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// Capture stopped on an error.
    Error,
    /// Capturing.
    Busy,
    /// Idle with buffers attached.
    Ready,
    /// Idle with nothing attached.
    Stable,
    /// Not ready to capture.
    Unstable,
}

impl CaptureStatus {
    /// Decode the vendor status value.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Error),
            1 => Some(Self::Busy),
            2 => Some(Self::Ready),
            3 => Some(Self::Stable),
            4 => Some(Self::Unstable),
            _ => None,
        }
    }

    /// Lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Busy => "Busy",
            Self::Ready => "Ready",
            Self::Stable => "Stable",
            Self::Unstable => "Unstable",
        }
    }
}

/// Frame transfer progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferInfo {
    /// Frames transferred since capture start.
    pub frame_count: u32,
    /// Ring index of the newest transferred frame, -1 before the first.
    pub newest_frame_index: i32,
}

/// Identification strings a device can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceString {
    /// Manufacturer.
    Vendor,
    /// Model name.
    Model,
    /// Serial number.
    CameraId,
    /// Host bus.
    Bus,
    /// Camera firmware version.
    CameraVersion,
    /// Driver version.
    DriverVersion,
    /// Module version.
    ModuleVersion,
    /// DCAM-API version.
    ApiVersion,
}

impl DeviceString {
    /// Every identification string, in query order.
    pub const ALL: [DeviceString; 8] = [
        Self::Vendor,
        Self::Model,
        Self::CameraId,
        Self::Bus,
        Self::CameraVersion,
        Self::DriverVersion,
        Self::ModuleVersion,
        Self::ApiVersion,
    ];

    /// Lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vendor => "vendor",
            Self::Model => "model",
            Self::CameraId => "camera id",
            Self::Bus => "bus",
            Self::CameraVersion => "camera version",
            Self::DriverVersion => "driver version",
            Self::ModuleVersion => "module version",
            Self::ApiVersion => "api version",
        }
    }
}

/// Abstraction over the DCAM vendor library.
///
/// All calls are blocking round trips to the device. Implementations are not
/// required to be thread-safe; callers serialise access per device.
pub trait DcamApi {
    /// Open the device at `index`.
    fn open_device(&self, index: u32) -> ApiResult<DeviceHandle>;

    /// Release a device handle.
    fn close_device(&self, handle: DeviceHandle) -> ApiResult<()>;

    /// Query an identification string.
    fn device_string(&self, handle: DeviceHandle, which: DeviceString) -> ApiResult<String>;

    /// Next *supported* property id after `after` (`None` starts the walk).
    ///
    /// Returns `Ok(None)` once the device has no further properties.
    fn prop_next_id(
        &self,
        handle: DeviceHandle,
        after: Option<PropertyId>,
    ) -> ApiResult<Option<PropertyId>>;

    /// Name of property `id`.
    fn prop_name(&self, handle: DeviceHandle, id: PropertyId) -> ApiResult<String>;

    /// Attribute record of property `id`.
    fn prop_attr(&self, handle: DeviceHandle, id: PropertyId) -> ApiResult<RawAttribute>;

    /// Current value of property `id`.
    fn prop_value(&self, handle: DeviceHandle, id: PropertyId) -> ApiResult<f64>;

    /// Write `value` to property `id`.
    fn prop_set_value(&self, handle: DeviceHandle, id: PropertyId, value: f64) -> ApiResult<()>;

    /// Write `value` and return what the device actually applied.
    fn prop_set_get_value(
        &self,
        handle: DeviceHandle,
        id: PropertyId,
        value: f64,
    ) -> ApiResult<f64>;

    /// Start capturing in `mode`.
    fn cap_start(&self, handle: DeviceHandle, mode: CaptureMode) -> ApiResult<()>;

    /// Stop capturing.
    fn cap_stop(&self, handle: DeviceHandle) -> ApiResult<()>;

    /// Current capture status.
    fn cap_status(&self, handle: DeviceHandle) -> ApiResult<CaptureStatus>;

    /// Frames transferred so far.
    fn cap_transfer_info(&self, handle: DeviceHandle) -> ApiResult<TransferInfo>;

    /// Fire one software trigger.
    fn cap_fire_trigger(&self, handle: DeviceHandle) -> ApiResult<()>;

    /// Block until the next frame is ready or `timeout` elapses.
    fn wait_frame_ready(&self, handle: DeviceHandle, timeout: Duration) -> ApiResult<()>;

    /// Copy frame `frame_index` of the device ring into `dest`, returning the
    /// number of bytes written.
    fn copy_frame(
        &self,
        handle: DeviceHandle,
        frame_index: i32,
        dest: &mut [u8],
    ) -> ApiResult<usize>;

    /// Snap a width or height to the device's valid size for `granularity`.
    fn adjust_width_height(&self, handle: DeviceHandle, value: u64, granularity: u64) -> u64;
}

//! DCAM Capture Control
//!
//! [`CaptureController`] is the device-level entry point. It owns the
//! [`DcamConnection`] and the [`PropertyRegistry`], both built in
//! [`CaptureController::open`], and layers on top of them:
//!
//! - readout geometry (binning, centred ROI)
//! - trigger presets and defect correction
//! - the acquisition state machine
//! - image sequence allocation and frame transfer
//!
//! ## State machine
//!
//! ```text
//!            open                start (internal trigger)
//!   Closed ───────▶ Idle ─────────────────────────────▶ Capturing
//!     ▲              │ ▲                                  ▲   │
//!     │ close        │ │ stop     start (external or      │   │ stop
//!     └──────────────┘ └──────────  software trigger)     │   ▼
//!                        Armed ─────────────────────────────┘  Idle
//!                              trigger / first frame
//! ```
//!
//! Device mutation takes `&mut self`; callers sharing a controller across
//! threads wrap it in a mutex.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::api::{CaptureMode, CaptureStatus, DcamApi, DeviceString, PropertyId, TransferInfo};
use crate::components::connection::DcamConnection;
use crate::components::geometry::{round_to_4, Geometry, Roi};
use crate::components::image_sequence::{ImageSequence, SequenceLayout};
use crate::components::modes::{DefectCorrection, TriggerSource};
use crate::components::properties::PropertyRegistry;
use crate::components::trigger::TriggerPreset;
use crate::config::DcamConfig;
use crate::error::{DcamError, Result};
use crate::error_log::ErrorLog;

/// Placeholder for identification strings the device could not report.
pub const UNAVAILABLE: &str = "unavailable";

/// Acquisition lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquisitionState {
    /// Device handle released.
    Closed,
    /// Open, not acquiring.
    Idle,
    /// Capture started, waiting for an external or software trigger.
    Armed,
    /// Frames are being produced.
    Capturing,
}

impl AcquisitionState {
    /// Lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Capturing => "capturing",
        }
    }

    /// Whether a capture has been started and not stopped.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Armed | Self::Capturing)
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identification strings reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Manufacturer.
    pub vendor: String,
    /// Model name.
    pub model: String,
    /// Serial number.
    pub camera_id: String,
    /// Host bus.
    pub bus: String,
    /// Camera firmware version.
    pub camera_version: String,
    /// Driver version.
    pub driver_version: String,
    /// Module version.
    pub module_version: String,
    /// DCAM-API version.
    pub api_version: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}) on {}, camera {}, driver {}, module {}, api {}",
            self.vendor,
            self.model,
            self.camera_id,
            self.bus,
            self.camera_version,
            self.driver_version,
            self.module_version,
            self.api_version
        )
    }
}

/// Narrow a device value to a non-negative integer.
fn narrow(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

/// Ring slot of capture frame `frame` (counted from capture start), located
/// relative to the newest transferred frame.
fn ring_index(frame: u32, latest: TransferInfo) -> Result<i32> {
    let unavailable = DcamError::FrameUnavailable {
        frame,
        frame_count: latest.frame_count,
    };
    if frame >= latest.frame_count {
        return Err(unavailable);
    }
    let behind = i64::from(latest.frame_count - 1 - frame);
    i32::try_from(i64::from(latest.newest_frame_index) - behind)
        .ok()
        .filter(|index| *index >= 0)
        .ok_or(unavailable)
}

fn now_ns() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
        .unwrap_or(0)
}

/// Controller for one opened DCAM camera.
pub struct CaptureController<A: DcamApi> {
    connection: DcamConnection<A>,
    registry: PropertyRegistry,
    config: DcamConfig,
    state: AcquisitionState,
    trigger_source: TriggerSource,
}

impl<A: DcamApi> CaptureController<A> {
    /// Open the configured device and discover its properties.
    ///
    /// Properties whose attributes could not be read are tolerated and logged;
    /// they are present in the registry without a kind.
    ///
    /// # Errors
    ///
    /// - [`DcamError::Configuration`] if `config` fails validation.
    /// - [`DcamError::Device`] if the device cannot be opened.
    /// - [`DcamError::EnumerationAborted`] if property discovery stopped
    ///   early. The device is closed again before returning.
    ///
    /// # Example
    ///
    /// ```
    /// use daq_driver_dcam::{CaptureController, DcamConfig, MockDcam};
    ///
    /// let mut camera = CaptureController::open(MockDcam::standard(), &DcamConfig::default())?;
    /// camera.set_centered_roi(1000, 800)?;
    /// assert_eq!(camera.x_offset()?, 524);
    /// camera.close();
    /// # Ok::<(), daq_driver_dcam::DcamError>(())
    /// ```
    pub fn open(api: A, config: &DcamConfig) -> Result<Self> {
        config.validate()?;
        let connection =
            DcamConnection::open(api, config.device_index, config.error_log_capacity)?;

        let mut registry = PropertyRegistry::new();
        match registry.refresh(&connection) {
            Ok(_) => {}
            Err(DcamError::PartialDiscovery { failed_ids }) => {
                warn!(
                    device_index = config.device_index,
                    failed = failed_ids.len(),
                    "Some property attributes unavailable; continuing"
                );
            }
            Err(e) => return Err(e),
        }

        let mut controller = Self {
            connection,
            registry,
            config: config.clone(),
            state: AcquisitionState::Idle,
            trigger_source: TriggerSource::Internal,
        };

        if controller.registry.name_of(PropertyId::TRIGGER_SOURCE).is_some() {
            if let Ok(source) = controller
                .registry
                .mode::<A, TriggerSource>(&controller.connection)
            {
                controller.trigger_source = source;
            }
        }

        info!(
            device_index = config.device_index,
            properties = controller.registry.len(),
            trigger_source = %controller.trigger_source,
            "DCAM camera ready"
        );
        Ok(controller)
    }

    /// Stop any running capture and release the device.
    ///
    /// Idempotent; also run on drop.
    pub fn close(&mut self) {
        if self.state == AcquisitionState::Closed {
            return;
        }
        if self.state.is_active() {
            if let Err(e) = self.connection.call("stop capture on close", |api, h| api.cap_stop(h)) {
                warn!(error = %e, "Failed to stop capture while closing");
            }
        }
        self.connection.close();
        self.state = AcquisitionState::Closed;
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current acquisition state.
    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Whether the device is still open.
    pub fn is_open(&self) -> bool {
        self.state != AcquisitionState::Closed
    }

    /// Trigger source selected by the last preset (or read at open).
    pub fn trigger_source(&self) -> TriggerSource {
        self.trigger_source
    }

    /// Configuration the controller was opened with.
    pub fn config(&self) -> &DcamConfig {
        &self.config
    }

    /// Discovered property descriptors.
    pub fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    /// Underlying device connection.
    pub fn connection(&self) -> &DcamConnection<A> {
        &self.connection
    }

    /// Failures recorded on this device.
    pub fn error_log(&self) -> &ErrorLog {
        self.connection.error_log()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == AcquisitionState::Closed {
            Err(DcamError::DeviceClosed)
        } else {
            Ok(())
        }
    }

    fn invalid_state(&self, operation: &'static str) -> DcamError {
        DcamError::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Rediscover the device's properties.
    pub fn refresh_properties(&mut self) -> Result<usize> {
        self.ensure_open()?;
        self.registry.refresh(&self.connection)
    }

    /// Read a discovered property by name.
    pub fn get_property(&self, name: &str) -> Result<f64> {
        self.ensure_open()?;
        self.registry.get(&self.connection, name)
    }

    /// Write a discovered property by name.
    pub fn set_property(&mut self, name: &str, value: f64) -> Result<()> {
        self.ensure_open()?;
        self.registry.set(&self.connection, name, value)
    }

    /// Write then read back; see [`PropertyRegistry::set_and_get`].
    pub fn set_and_get(&mut self, id: PropertyId, value: f64) -> Result<f64> {
        self.ensure_open()?;
        self.registry.set_and_get(&self.connection, id, value)
    }

    /// Exposure time in seconds.
    pub fn exposure(&self) -> Result<f64> {
        self.ensure_open()?;
        self.registry.exposure(&self.connection)
    }

    /// Set the exposure time in seconds.
    pub fn set_exposure(&mut self, seconds: f64) -> Result<()> {
        self.ensure_open()?;
        self.registry.set_exposure(&self.connection, seconds)
    }

    /// Set the exposure time and return the value the device applied.
    pub fn set_and_get_exposure(&mut self, seconds: f64) -> Result<f64> {
        self.ensure_open()?;
        self.registry.set_and_get_exposure(&self.connection, seconds)
    }

    /// Human-readable listing of every discovered property.
    pub fn describe_properties(&self) -> String {
        self.registry.describe_all()
    }

    /// Identification strings. Strings the device fails to report read
    /// [`UNAVAILABLE`] and are recorded in the error log.
    pub fn device_info(&self) -> Result<DeviceInfo> {
        self.ensure_open()?;
        let read = |which: DeviceString| -> String {
            self.connection
                .call(&format!("read {}", which.as_str()), |api, h| {
                    api.device_string(h, which)
                })
                .unwrap_or_else(|e| {
                    debug!(string = which.as_str(), error = %e, "Device string unavailable");
                    UNAVAILABLE.to_string()
                })
        };
        Ok(DeviceInfo {
            vendor: read(DeviceString::Vendor),
            model: read(DeviceString::Model),
            camera_id: read(DeviceString::CameraId),
            bus: read(DeviceString::Bus),
            camera_version: read(DeviceString::CameraVersion),
            driver_version: read(DeviceString::DriverVersion),
            module_version: read(DeviceString::ModuleVersion),
            api_version: read(DeviceString::ApiVersion),
        })
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    /// Set the binning factor (1, 2 or 4 on most sensors).
    pub fn set_binning(&mut self, binning: u32) -> Result<()> {
        self.ensure_open()?;
        if binning == 0 {
            return Err(DcamError::InvalidArgument("binning must be positive".into()));
        }
        self.registry
            .set_by_id(&self.connection, PropertyId::BINNING, f64::from(binning))
    }

    /// Current binning factor.
    pub fn binning(&self) -> Result<u32> {
        self.ensure_open()?;
        let raw = self.registry.get_by_id(&self.connection, PropertyId::BINNING)?;
        Ok(u32::try_from(narrow(raw)).unwrap_or(u32::MAX))
    }

    /// Centre a sub-array of roughly `width` x `height` pixels on the sensor.
    ///
    /// Both dimensions are first rounded to the nearest multiple of 4. All
    /// five register writes are attempted even if one fails.
    ///
    /// # Returns
    ///
    /// The window that was written.
    ///
    /// # Errors
    ///
    /// - [`DcamError::InvalidArgument`] if a dimension rounds to zero.
    /// - [`DcamError::PartialConfiguration`] if any write failed; re-read
    ///   the geometry to see what the device holds.
    pub fn set_centered_roi(&mut self, width: u64, height: u64) -> Result<Roi> {
        self.ensure_open()?;
        let (width, height) = (round_to_4(width), round_to_4(height));
        if width == 0 || height == 0 {
            return Err(DcamError::InvalidArgument(format!(
                "ROI {width}x{height} is empty after alignment"
            )));
        }
        let roi = self.registry.set_centered_roi_raw(
            &self.connection,
            width,
            height,
            self.config.sensor_size,
        )?;
        debug!(roi = %roi, "Centered ROI applied");
        Ok(roi)
    }

    fn read_u64(&self, id: PropertyId) -> Result<u64> {
        self.ensure_open()?;
        Ok(narrow(self.registry.get_by_id(&self.connection, id)?))
    }

    /// Sub-array width in pixels.
    pub fn width(&self) -> Result<u64> {
        self.read_u64(PropertyId::SUBARRAY_HSIZE)
    }

    /// Sub-array height in pixels.
    pub fn height(&self) -> Result<u64> {
        self.read_u64(PropertyId::SUBARRAY_VSIZE)
    }

    /// Sub-array horizontal offset.
    pub fn x_offset(&self) -> Result<u64> {
        self.read_u64(PropertyId::SUBARRAY_HPOS)
    }

    /// Sub-array vertical offset.
    pub fn y_offset(&self) -> Result<u64> {
        self.read_u64(PropertyId::SUBARRAY_VPOS)
    }

    /// Current ROI and binning, read from the device.
    pub fn geometry(&self) -> Result<Geometry> {
        Ok(Geometry {
            roi: Roi {
                width: self.width()?,
                height: self.height()?,
                x_offset: self.x_offset()?,
                y_offset: self.y_offset()?,
            },
            binning: self.binning()?,
        })
    }

    // =========================================================================
    // Trigger & correction
    // =========================================================================

    /// Apply a trigger preset.
    ///
    /// The trigger source used to decide between [`AcquisitionState::Armed`]
    /// and [`AcquisitionState::Capturing`] is updated unless the source write
    /// itself failed.
    ///
    /// # Errors
    ///
    /// [`DcamError::PartialConfiguration`] listing the failed writes; the
    /// remaining writes were still applied.
    pub fn apply_trigger(&mut self, preset: TriggerPreset) -> Result<()> {
        self.ensure_open()?;
        let writes = preset.writes();
        debug!(preset = %preset, writes = writes.len(), "Applying trigger preset");
        let result = self
            .registry
            .apply_writes(&self.connection, preset.as_str(), &writes);

        if let Some(source) = preset.source() {
            let source_written = match &result {
                Ok(()) => true,
                Err(DcamError::PartialConfiguration { failed, .. }) => {
                    !failed.iter().any(|w| w.property == PropertyId::TRIGGER_SOURCE)
                }
                Err(_) => false,
            };
            if source_written {
                self.trigger_source = source;
            }
        }
        result
    }

    /// Enable or disable pixel defect correction.
    pub fn set_defect_correction(&mut self, enabled: bool) -> Result<()> {
        self.ensure_open()?;
        self.registry
            .set_mode(&self.connection, DefectCorrection::from(enabled))
    }

    // =========================================================================
    // Acquisition
    // =========================================================================

    fn start(&mut self, mode: CaptureMode) -> Result<()> {
        match self.state {
            AcquisitionState::Closed => return Err(DcamError::DeviceClosed),
            AcquisitionState::Armed | AcquisitionState::Capturing => {
                // A finished snap leaves the device ready without a stop call.
                if self.status() != Some(CaptureStatus::Ready) {
                    return Err(self.invalid_state("start acquisition"));
                }
                debug!(state = %self.state, "Previous capture already finished");
            }
            AcquisitionState::Idle => {}
        }
        self.connection
            .call("start capture", |api, h| api.cap_start(h, mode))?;
        self.state = if self.trigger_source.waits_for_trigger() {
            AcquisitionState::Armed
        } else {
            AcquisitionState::Capturing
        };
        info!(
            mode = ?mode,
            state = %self.state,
            trigger_source = %self.trigger_source,
            "Acquisition started"
        );
        Ok(())
    }

    /// Start ring-buffer capture that runs until [`stop`](Self::stop).
    pub fn start_continuous(&mut self) -> Result<()> {
        self.start(CaptureMode::Sequence)
    }

    /// Start a snap capture that fills the device ring once.
    pub fn start_sequence(&mut self) -> Result<()> {
        self.start(CaptureMode::Snap)
    }

    /// Fire one software trigger.
    pub fn trigger_one_acquisition(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.state.is_active() {
            return Err(self.invalid_state("fire trigger"));
        }
        self.connection
            .call("fire software trigger", |api, h| api.cap_fire_trigger(h))?;
        if self.state == AcquisitionState::Armed {
            self.state = AcquisitionState::Capturing;
        }
        debug!("Software trigger fired");
        Ok(())
    }

    /// Halt capture and return to idle.
    pub fn stop(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.connection.call("stop capture", |api, h| api.cap_stop(h))?;
        if self.state.is_active() {
            info!("Acquisition stopped");
        }
        self.state = AcquisitionState::Idle;
        Ok(())
    }

    /// Device capture status, or `None` if it could not be read.
    pub fn status(&self) -> Option<CaptureStatus> {
        match self.connection.call("read capture status", |api, h| api.cap_status(h)) {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(error = %e, "Capture status unavailable");
                None
            }
        }
    }

    /// Frame transfer progress, or `None` if it could not be read.
    pub fn transfer_info(&self) -> Option<TransferInfo> {
        match self
            .connection
            .call("read transfer info", |api, h| api.cap_transfer_info(h))
        {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(error = %e, "Transfer info unavailable");
                None
            }
        }
    }

    // =========================================================================
    // Frames
    // =========================================================================

    /// Allocate a sequence whose plane size the device accepts.
    ///
    /// `width` and `height` are snapped by the device with a granularity of
    /// `4 / binning` (at least 1) before allocating.
    pub fn allocate_sequence(
        &self,
        bytes_per_pixel: usize,
        width: u64,
        height: u64,
        depth: usize,
        layout: SequenceLayout,
    ) -> Result<ImageSequence> {
        self.ensure_open()?;
        let binning = self.binning().unwrap_or_else(|e| {
            warn!(error = %e, "Binning unavailable, assuming 1");
            1
        });
        let granularity = u64::from((4 / binning.max(1)).max(1));
        let handle = self.connection.handle()?;
        let api = self.connection.api();
        let adjusted_width = api.adjust_width_height(handle, width, granularity);
        let adjusted_height = api.adjust_width_height(handle, height, granularity);
        debug!(
            width,
            height,
            adjusted_width,
            adjusted_height,
            granularity,
            "Allocating image sequence"
        );

        let to_usize = |v: u64| {
            usize::try_from(v)
                .map_err(|_| DcamError::InvalidArgument(format!("dimension {v} too large")))
        };
        ImageSequence::with_alignment(
            bytes_per_pixel,
            to_usize(adjusted_width)?,
            to_usize(adjusted_height)?,
            depth,
            layout,
            self.config.page_alignment,
        )
    }

    /// Allocate `depth` planes sized for the current binned ROI, using the
    /// configured pixel size and layout.
    pub fn allocate_for_geometry(&self, depth: usize) -> Result<ImageSequence> {
        let geometry = self.geometry()?;
        self.allocate_sequence(
            self.config.bytes_per_pixel,
            geometry.binned_width(),
            geometry.binned_height(),
            depth,
            self.config.default_layout,
        )
    }

    /// Block until the next frame arrives or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - [`DcamError::InvalidState`] unless a capture is running.
    /// - [`DcamError::Device`] with a timeout code when nothing arrived
    ///   (see [`DcamError::is_timeout`]).
    pub fn wait_for_next_frame(&mut self, timeout: Duration) -> Result<TransferInfo> {
        self.ensure_open()?;
        if !self.state.is_active() {
            return Err(self.invalid_state("wait for frame"));
        }
        self.connection
            .call("wait for frame", |api, h| api.wait_frame_ready(h, timeout))?;
        self.state = AcquisitionState::Capturing;
        self.connection
            .call("read transfer info", |api, h| api.cap_transfer_info(h))
    }

    /// Copy device frame `frame_index` into `plane` of `seq` and stamp the
    /// sequence with the current time.
    ///
    /// # Returns
    ///
    /// Bytes copied.
    pub fn transfer_frame(
        &self,
        frame_index: i32,
        seq: &mut ImageSequence,
        plane: usize,
    ) -> Result<usize> {
        self.ensure_open()?;
        let dest = seq.plane_mut(plane)?;
        let copied = self
            .connection
            .call(&format!("copy frame {frame_index}"), |api, h| {
                api.copy_frame(h, frame_index, dest)
            })?;
        seq.set_timestamp_ns(now_ns());
        debug!(frame_index, plane, copied, "Frame transferred");
        Ok(copied)
    }

    /// Capture one frame into every plane of `seq`.
    ///
    /// Starts a snap capture, fires a software trigger per frame when the
    /// software source is selected, waits and copies each frame, then stops.
    /// Capture is stopped even when a frame fails.
    ///
    /// # Returns
    ///
    /// The number of frames captured.
    pub fn acquire_sequence(&mut self, seq: &mut ImageSequence, timeout: Duration) -> Result<usize> {
        seq.ensure_not_freed()?;
        self.start_sequence()?;
        let filled = self.fill_sequence(seq, timeout);
        let stopped = self.stop();
        let frames = filled?;
        stopped?;
        info!(frames, "Sequence acquired");
        Ok(frames)
    }

    /// Plane `n` receives capture frame `n`. One wait can deliver several
    /// frames, so waits only happen while the wanted frame has not arrived.
    fn fill_sequence(&mut self, seq: &mut ImageSequence, timeout: Duration) -> Result<usize> {
        let mut latest = TransferInfo::default();
        for plane in 0..seq.depth() {
            let frame = plane as u32;
            while latest.frame_count <= frame {
                if self.trigger_source == TriggerSource::Software {
                    self.trigger_one_acquisition()?;
                }
                latest = self.wait_for_next_frame(timeout)?;
            }
            self.transfer_frame(ring_index(frame, latest)?, seq, plane)?;
        }
        Ok(seq.depth())
    }
}

impl<A: DcamApi> Drop for CaptureController<A> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<A: DcamApi> fmt::Debug for CaptureController<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureController")
            .field("connection", &self.connection)
            .field("properties", &self.registry.len())
            .field("state", &self.state)
            .field("trigger_source", &self.trigger_source)
            .finish()
    }
}

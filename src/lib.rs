//! Hamamatsu DCAM Camera Driver
//!
//! Control core for DCAM-API scientific cameras:
//! - Properties: discovery, typed reads and writes, set-and-readback
//! - Capture: ROI geometry, binning, trigger presets, acquisition lifecycle
//! - Frames: page-aligned image sequences in fragmented or contiguous layout
//!
//! The vendor library sits behind the [`DcamApi`] trait. With the default
//! `mock` feature the crate ships [`MockDcam`], an in-memory device used by
//! the test-suite and for development without hardware.
//!
//! All calls are blocking. Failed device calls return [`DcamError`] and are
//! also recorded in the per-device [`ErrorLog`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use daq_driver_dcam::{
//!     CaptureController, DcamConfig, MockDcam, SequenceLayout, TriggerPreset,
//! };
//!
//! let mut camera = CaptureController::open(MockDcam::standard(), &DcamConfig::default())?;
//! camera.set_exposure(0.02)?;
//! camera.set_centered_roi(1024, 1024)?;
//! camera.apply_trigger(TriggerPreset::Internal)?;
//!
//! let mut frames = camera.allocate_sequence(2, 1024, 1024, 4, SequenceLayout::Contiguous)?;
//! camera.acquire_sequence(&mut frames, Duration::from_millis(500))?;
//! assert!(frames.timestamp_ns() > 0);
//! # Ok::<(), daq_driver_dcam::DcamError>(())
//! ```

pub mod api;
pub mod components;
pub mod config;
pub mod error;
pub mod error_log;
pub mod logging;

#[cfg(feature = "mock")]
pub mod mock;

pub use crate::api::{
    CaptureMode, CaptureStatus, DcamApi, DeviceHandle, DeviceString, PropertyId, TransferInfo,
};
pub use crate::components::acquisition::{AcquisitionState, CaptureController, DeviceInfo};
pub use crate::components::connection::DcamConnection;
pub use crate::components::geometry::{round_to_4, Geometry, Roi};
pub use crate::components::image_sequence::{ImageSequence, SequenceLayout, SequenceView};
pub use crate::components::modes::{
    DefectCorrection, ModeValue, OutputTriggerKind, OutputTriggerPolarity, SubarrayMode,
    TriggerActive, TriggerConnector, TriggerMode, TriggerPolarity, TriggerSource,
};
pub use crate::components::properties::{
    PropertyDescriptor, PropertyKind, PropertyRegistry, PropertyUnit, PropertyWrite,
};
pub use crate::components::trigger::TriggerPreset;
pub use crate::config::DcamConfig;
pub use crate::error::{DcamError, DcamErrorCode, FailedWrite, Result};
pub use crate::error_log::{ErrorLog, ErrorRecord};

#[cfg(feature = "mock")]
pub use crate::mock::{MockDcam, MockProperty};

//! DCAM driver components.
//!
//! - `connection`: device handle and error log
//! - `properties`: property discovery and typed access
//! - `modes`: typed mode-property values
//! - `geometry`: ROI alignment and centring
//! - `trigger`: trigger presets
//! - `acquisition`: capture controller and state machine
//! - `image_sequence`: frame buffers

pub mod acquisition;
pub mod connection;
pub mod geometry;
pub mod image_sequence;
pub mod modes;
pub mod properties;
pub mod trigger;

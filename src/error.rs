//! Error types for DCAM operations.
//!
//! Every vendor call returns a [`DcamErrorCode`]. The connection layer turns a
//! failing code into [`DcamError::Device`] and records it in the per-device
//! [`ErrorLog`](crate::error_log::ErrorLog); higher layers add the multi-write
//! and lifecycle variants below. Nothing in this crate retries on its own.

use std::fmt;
use thiserror::Error;

use crate::api::PropertyId;

/// Result type alias for DCAM operations.
pub type Result<T> = std::result::Result<T, DcamError>;

/// Raw status code returned by a DCAM API call.
///
/// The DCAM convention is that codes with the high bit set are failures and
/// everything else (including the various "success" flavours) is a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DcamErrorCode(pub i32);

impl DcamErrorCode {
    /// Success.
    pub const SUCCESS: Self = Self(1);
    /// Device busy.
    pub const BUSY: Self = Self(0x8000_0101_u32 as i32);
    /// Wait aborted by stop or close.
    pub const ABORT: Self = Self(0x8000_0102_u32 as i32);
    /// Device not ready.
    pub const NOT_READY: Self = Self(0x8000_0103_u32 as i32);
    /// Wait timed out.
    pub const TIMEOUT: Self = Self(0x8000_0106_u32 as i32);
    /// Out of host memory.
    pub const NO_MEMORY: Self = Self(0x8000_0203_u32 as i32);
    /// No camera at this index.
    pub const NO_CAMERA: Self = Self(0x8000_0206_u32 as i32);
    /// Handle not valid.
    pub const INVALID_HANDLE: Self = Self(0x8000_0807_u32 as i32);
    /// Bad parameter.
    pub const INVALID_PARAM: Self = Self(0x8000_0808_u32 as i32);
    /// Value not valid for the property.
    pub const INVALID_VALUE: Self = Self(0x8000_0821_u32 as i32);
    /// Value outside the property range.
    pub const OUT_OF_RANGE: Self = Self(0x8000_0822_u32 as i32);
    /// Property is read-only.
    pub const NOT_WRITABLE: Self = Self(0x8000_0823_u32 as i32);
    /// Property is write-only.
    pub const NOT_READABLE: Self = Self(0x8000_0824_u32 as i32);
    /// Unknown property id.
    pub const INVALID_PROPERTY_ID: Self = Self(0x8000_0825_u32 as i32);
    /// Operation not supported.
    pub const NOT_SUPPORTED: Self = Self(0x8000_0F03_u32 as i32);

    /// Whether the code denotes success.
    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    /// Whether the code denotes failure.
    pub fn is_failure(self) -> bool {
        !self.is_success()
    }

    /// Symbolic name for the well-known codes.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::SUCCESS => "SUCCESS",
            Self::BUSY => "BUSY",
            Self::ABORT => "ABORT",
            Self::NOT_READY => "NOTREADY",
            Self::TIMEOUT => "TIMEOUT",
            Self::NO_MEMORY => "NOMEMORY",
            Self::NO_CAMERA => "NOCAMERA",
            Self::INVALID_HANDLE => "INVALIDHANDLE",
            Self::INVALID_PARAM => "INVALIDPARAM",
            Self::INVALID_VALUE => "INVALIDVALUE",
            Self::OUT_OF_RANGE => "OUTOFRANGE",
            Self::NOT_WRITABLE => "NOTWRITABLE",
            Self::NOT_READABLE => "NOTREADABLE",
            Self::INVALID_PROPERTY_ID => "INVALIDPROPERTYID",
            Self::NOT_SUPPORTED => "NOTSUPPORT",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for DcamErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "0x{:08X} ({})", self.0 as u32, name),
            None => write!(f, "0x{:08X}", self.0 as u32),
        }
    }
}

/// A single write that failed inside a multi-write configuration sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedWrite {
    /// Property that rejected the write.
    pub property: PropertyId,
    /// Value that was requested.
    pub value: f64,
    /// Code the device returned.
    pub code: DcamErrorCode,
}

impl fmt::Display for FailedWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {} ({})", self.property, self.value, self.code)
    }
}

/// Errors that can occur when working with a DCAM device.
#[derive(Error, Debug)]
pub enum DcamError {
    /// A vendor call returned a failure code.
    #[error("DCAM call failed ({code}): {context}")]
    Device {
        code: DcamErrorCode,
        context: String,
    },

    /// Property discovery stopped because a property name could not be read.
    ///
    /// Descriptors enumerated before the failure stay in the registry.
    #[error("Property enumeration aborted after {enumerated} properties: {source}")]
    EnumerationAborted {
        enumerated: usize,
        #[source]
        source: Box<DcamError>,
    },

    /// Enumeration completed but some attribute records could not be fetched.
    #[error("Attributes unavailable for {} properties", failed_ids.len())]
    PartialDiscovery { failed_ids: Vec<PropertyId> },

    /// A multi-write configuration sequence was only partly applied.
    ///
    /// The device geometry/trigger state is whatever the successful writes
    /// left behind; re-read the properties to find out.
    #[error("{operation} partially applied, {} write(s) failed: {}", failed.len(), join_failed(failed))]
    PartialConfiguration {
        operation: &'static str,
        failed: Vec<FailedWrite>,
    },

    /// No property with this name was discovered.
    #[error("Unknown property '{0}'")]
    UnknownProperty(String),

    /// The device handle has already been released.
    #[error("Device is closed")]
    DeviceClosed,

    /// The acquisition state machine does not allow this operation.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// The image sequence has been freed.
    #[error("Image sequence has been freed")]
    BufferFreed,

    /// Plane index outside the sequence.
    #[error("Plane {index} out of range (depth {depth})")]
    PlaneOutOfRange { index: usize, depth: usize },

    /// Capture frame not held in the device ring at the newest transfer.
    #[error("Frame {frame} unavailable ({frame_count} frames transferred)")]
    FrameUnavailable { frame: u32, frame_count: u32 },

    /// Consolidation destination cannot hold the sequence.
    #[error("Destination too small: need {needed} bytes, have {available}")]
    DestinationTooSmall { needed: usize, available: usize },

    /// Host memory allocation failed.
    #[error("Failed to allocate {bytes} bytes for image sequence")]
    Allocation { bytes: usize },

    /// Invalid argument supplied by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

fn join_failed(failed: &[FailedWrite]) -> String {
    failed
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<figment::Error> for DcamError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl DcamError {
    /// Vendor code behind this error, if it came from a device call.
    pub fn code(&self) -> Option<DcamErrorCode> {
        match self {
            Self::Device { code, .. } => Some(*code),
            Self::EnumerationAborted { source, .. } => source.code(),
            _ => None,
        }
    }

    /// Check if the device is busy.
    pub fn is_busy(&self) -> bool {
        self.code() == Some(DcamErrorCode::BUSY)
    }

    /// Check if this is a timeout from the wait primitive.
    pub fn is_timeout(&self) -> bool {
        self.code() == Some(DcamErrorCode::TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_success_convention() {
        assert!(DcamErrorCode::SUCCESS.is_success());
        assert!(DcamErrorCode(0).is_success());
        assert!(DcamErrorCode::BUSY.is_failure());
        assert!(DcamErrorCode::NOT_WRITABLE.is_failure());
    }

    #[test]
    fn test_code_display() {
        assert_eq!(DcamErrorCode::BUSY.to_string(), "0x80000101 (BUSY)");
        assert_eq!(DcamErrorCode(0x8000_1234_u32 as i32).to_string(), "0x80001234");
    }

    #[test]
    fn test_property_code_values() {
        assert_eq!(
            DcamErrorCode::INVALID_VALUE.to_string(),
            "0x80000821 (INVALIDVALUE)"
        );
        assert_eq!(
            DcamErrorCode::OUT_OF_RANGE.to_string(),
            "0x80000822 (OUTOFRANGE)"
        );
        assert_eq!(
            DcamErrorCode::NOT_WRITABLE.to_string(),
            "0x80000823 (NOTWRITABLE)"
        );
        assert_eq!(
            DcamErrorCode::NOT_READABLE.to_string(),
            "0x80000824 (NOTREADABLE)"
        );
        assert_eq!(
            DcamErrorCode::INVALID_PROPERTY_ID.to_string(),
            "0x80000825 (INVALIDPROPERTYID)"
        );
    }

    #[test]
    fn test_error_display() {
        let err = DcamError::PartialConfiguration {
            operation: "centered ROI",
            failed: vec![FailedWrite {
                property: PropertyId(0x0040_2110),
                value: 524.0,
                code: DcamErrorCode::OUT_OF_RANGE,
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("centered ROI"));
        assert!(msg.contains("524"));
        assert!(msg.contains("OUTOFRANGE"));
    }

    #[test]
    fn test_code_passthrough() {
        let inner = DcamError::Device {
            code: DcamErrorCode::TIMEOUT,
            context: "wait".into(),
        };
        assert!(inner.is_timeout());
        let wrapped = DcamError::EnumerationAborted {
            enumerated: 3,
            source: Box::new(DcamError::Device {
                code: DcamErrorCode::BUSY,
                context: "name".into(),
            }),
        };
        assert!(wrapped.is_busy());
        assert_eq!(DcamError::BufferFreed.code(), None);
    }
}

//! DCAM Connection Management
//!
//! Owns the device handle and the per-device error log. Every vendor call in
//! the crate goes through [`DcamConnection::call`], which converts the raw
//! status code into a [`DcamError`] and records failures.
//!
//! The handle is released when the connection is dropped. [`DcamConnection::close`]
//! can be called earlier and is idempotent.

use tracing::{debug, info, warn};

use crate::api::{ApiResult, DcamApi, DeviceHandle};
use crate::error::{DcamError, DcamErrorCode, Result};
use crate::error_log::ErrorLog;

/// Exclusive owner of one opened DCAM device.
pub struct DcamConnection<A: DcamApi> {
    api: A,
    handle: Option<DeviceHandle>,
    device_index: u32,
    errors: ErrorLog,
}

impl<A: DcamApi> DcamConnection<A> {
    /// Open the device at `device_index`.
    ///
    /// # Errors
    ///
    /// Returns [`DcamError::Device`] if the vendor library refuses to open the
    /// device. The failure is recorded in the returned error only, since no
    /// connection exists to own a log.
    pub fn open(api: A, device_index: u32, error_log_capacity: usize) -> Result<Self> {
        let handle = api
            .open_device(device_index)
            .map_err(|code| DcamError::Device {
                code,
                context: format!("open device {device_index}"),
            })?;

        info!(device_index, handle = handle.0, "DCAM device opened");

        Ok(Self {
            api,
            handle: Some(handle),
            device_index,
            errors: ErrorLog::new(error_log_capacity),
        })
    }

    /// Run a vendor call against the open handle.
    ///
    /// A failing code is appended to the error log with `context` and
    /// returned as [`DcamError::Device`]. Nothing is retried.
    ///
    /// # Errors
    ///
    /// [`DcamError::DeviceClosed`] if the handle has been released, otherwise
    /// whatever code the vendor call returned.
    pub fn call<T>(
        &self,
        context: &str,
        f: impl FnOnce(&A, DeviceHandle) -> ApiResult<T>,
    ) -> Result<T> {
        let handle = self.handle()?;
        f(&self.api, handle).map_err(|code| self.fail(code, context))
    }

    /// Record a failure and build the matching error.
    pub fn fail(&self, code: DcamErrorCode, context: &str) -> DcamError {
        debug!(device_index = self.device_index, %code, context, "DCAM call failed");
        self.errors.record(code, context);
        DcamError::Device {
            code,
            context: context.to_string(),
        }
    }

    /// The open handle.
    ///
    /// # Errors
    ///
    /// [`DcamError::DeviceClosed`] after [`close`](Self::close).
    pub fn handle(&self) -> Result<DeviceHandle> {
        self.handle.ok_or(DcamError::DeviceClosed)
    }

    /// Whether the handle is still held.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Index the device was opened with.
    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    /// The underlying transport.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Failures recorded on this device so far.
    pub fn error_log(&self) -> &ErrorLog {
        &self.errors
    }

    /// Release the device handle.
    ///
    /// Safe to call more than once. A vendor failure while closing is logged
    /// and recorded; the handle is considered released either way.
    pub fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        match self.api.close_device(handle) {
            Ok(()) => info!(device_index = self.device_index, "DCAM device closed"),
            Err(code) => {
                warn!(device_index = self.device_index, %code, "Failed to close DCAM device");
                self.errors.record(code, "close device");
            }
        }
    }
}

impl<A: DcamApi> Drop for DcamConnection<A> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            debug!(device_index = self.device_index, "Closing DCAM device on drop");
        }
        self.close();
    }
}

impl<A: DcamApi> std::fmt::Debug for DcamConnection<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DcamConnection")
            .field("device_index", &self.device_index)
            .field("handle", &self.handle)
            .field("errors", &self.errors.len())
            .finish()
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::api::PropertyId;
    use crate::mock::MockDcam;

    #[test]
    fn test_open_and_drop_releases_handle() {
        let mock = MockDcam::standard();
        {
            let conn = DcamConnection::open(mock.clone(), 0, 16).unwrap();
            assert!(conn.is_open());
            assert_eq!(mock.open_handles(), 1);
        }
        assert_eq!(mock.open_handles(), 0);
        assert_eq!(mock.close_calls(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mock = MockDcam::standard();
        let mut conn = DcamConnection::open(mock.clone(), 0, 16).unwrap();
        conn.close();
        conn.close();
        drop(conn);
        assert_eq!(mock.close_calls(), 1);
    }

    #[test]
    fn test_open_missing_device() {
        let err = DcamConnection::open(MockDcam::standard(), 3, 16).unwrap_err();
        assert_eq!(err.code(), Some(DcamErrorCode::NO_CAMERA));
    }

    #[test]
    fn test_call_records_failures() {
        let conn = DcamConnection::open(MockDcam::standard(), 0, 16).unwrap();
        let err = conn
            .call("read bogus", |api, h| api.prop_value(h, PropertyId(0x7fff_0000)))
            .unwrap_err();
        assert_eq!(err.code(), Some(DcamErrorCode::INVALID_PROPERTY_ID));

        let last = conn.error_log().last().unwrap();
        assert_eq!(last.code, DcamErrorCode::INVALID_PROPERTY_ID);
        assert_eq!(last.context, "read bogus");
    }

    #[test]
    fn test_call_after_close() {
        let mut conn = DcamConnection::open(MockDcam::standard(), 0, 16).unwrap();
        conn.close();
        let err = conn
            .call("read binning", |api, h| api.prop_value(h, PropertyId::BINNING))
            .unwrap_err();
        assert!(matches!(err, DcamError::DeviceClosed));
        assert!(conn.error_log().is_empty());
    }
}

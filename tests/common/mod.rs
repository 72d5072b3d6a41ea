//! Shared fixtures for the mock-device integration tests.

#![allow(dead_code)] // Not every test file uses every fixture

use std::time::Duration;

use daq_driver_dcam::{CaptureController, DcamConfig, MockDcam, MockProperty, PropertyId};

/// Generous wait for the simulated device, which never actually blocks.
pub const WAIT: Duration = Duration::from_millis(100);

/// Two-property device: a real-valued exposure and a mode-valued trigger mode.
pub fn two_property_mock() -> MockDcam {
    MockDcam::new()
        .with_property(MockProperty::real(
            PropertyId(1),
            "EXPOSURE",
            0.001,
            10.0,
            0.001,
            0.033,
        ))
        .with_property(MockProperty::mode(PropertyId(2), "TRIGGER_MODE", 1.0, 6.0, 1.0))
}

/// Standard simulated camera opened with default configuration.
pub fn open_standard() -> (MockDcam, CaptureController<MockDcam>) {
    let mock = MockDcam::standard();
    let camera = CaptureController::open(mock.clone(), &DcamConfig::default())
        .expect("standard mock opens");
    (mock, camera)
}

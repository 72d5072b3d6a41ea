#![cfg(feature = "mock")]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, missing_docs)]
//! ROI, binning and defect-correction control.

mod common;

use daq_driver_dcam::{DcamConfig, DcamError, DcamErrorCode, MockDcam, PropertyId, Roi};

#[test]
fn centered_roi_scenario() {
    let (mock, mut camera) = common::open_standard();
    let roi = camera.set_centered_roi(1000, 800).unwrap();
    assert_eq!(
        roi,
        Roi {
            width: 1000,
            height: 800,
            x_offset: 524,
            y_offset: 624
        }
    );

    assert_eq!(camera.width().unwrap(), 1000);
    assert_eq!(camera.height().unwrap(), 800);
    assert_eq!(camera.x_offset().unwrap(), 524);
    assert_eq!(camera.y_offset().unwrap(), 624);
    assert_eq!(mock.value(PropertyId::SUBARRAY_MODE), Some(2.0));
}

#[test]
fn roi_writes_are_ordered() {
    let (mock, mut camera) = common::open_standard();
    mock.clear_writes();
    camera.set_centered_roi(1000, 800).unwrap();
    assert_eq!(
        mock.writes(),
        vec![
            (PropertyId::SUBARRAY_HPOS, 524.0),
            (PropertyId::SUBARRAY_VPOS, 624.0),
            (PropertyId::SUBARRAY_HSIZE, 1000.0),
            (PropertyId::SUBARRAY_VSIZE, 800.0),
            (PropertyId::SUBARRAY_MODE, 2.0),
        ]
    );
}

#[test]
fn roi_dimensions_round_to_four() {
    let (_mock, mut camera) = common::open_standard();
    let roi = camera.set_centered_roi(1001, 798).unwrap();
    assert_eq!((roi.width, roi.height), (1000, 800));
    for (requested, size) in [(1001u64, roi.width), (798, roi.height)] {
        assert_eq!(size % 4, 0);
        assert!(size.abs_diff(requested) <= 2);
    }
}

#[test]
fn roi_rounding_to_zero_is_rejected() {
    let (mock, mut camera) = common::open_standard();
    mock.clear_writes();
    assert!(matches!(
        camera.set_centered_roi(1, 512),
        Err(DcamError::InvalidArgument(_))
    ));
    assert!(mock.writes().is_empty());
}

#[test]
fn roi_partial_failure_applies_remaining_writes() {
    let (mock, mut camera) = common::open_standard();
    mock.fail_set(PropertyId::SUBARRAY_HPOS, DcamErrorCode::OUT_OF_RANGE);

    let err = camera.set_centered_roi(1000, 800).unwrap_err();
    let DcamError::PartialConfiguration { failed, .. } = err else {
        panic!("expected partial configuration");
    };
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].property, PropertyId::SUBARRAY_HPOS);
    assert_eq!(failed[0].value, 524.0);

    // Later writes landed; the failed one left the previous value.
    assert_eq!(camera.width().unwrap(), 1000);
    assert_eq!(camera.y_offset().unwrap(), 624);
    assert_eq!(camera.x_offset().unwrap(), 0);
    assert_eq!(camera.error_log().len(), 1);
}

#[test]
fn custom_sensor_size_moves_the_centre() {
    let config = DcamConfig {
        sensor_size: 1024,
        ..Default::default()
    };
    let mut camera =
        daq_driver_dcam::CaptureController::open(MockDcam::standard(), &config).unwrap();
    let roi = camera.set_centered_roi(256, 256).unwrap();
    assert_eq!((roi.x_offset, roi.y_offset), (384, 384));
}

#[test]
fn binning_round_trip_and_geometry_snapshot() {
    let (_mock, mut camera) = common::open_standard();
    camera.set_binning(2).unwrap();
    assert_eq!(camera.binning().unwrap(), 2);

    camera.set_centered_roi(512, 256).unwrap();
    let geometry = camera.geometry().unwrap();
    assert_eq!(geometry.binning, 2);
    assert_eq!(geometry.roi.width, 512);
    assert_eq!(geometry.roi.x_offset, 768);
    assert_eq!(geometry.binned_width(), 256);
    assert_eq!(geometry.to_string(), "512x256+768+896 bin 2x2");
}

#[test]
fn defect_correction_toggles_mode() {
    let (mock, mut camera) = common::open_standard();
    camera.set_defect_correction(false).unwrap();
    assert_eq!(mock.value(PropertyId::DEFECT_CORRECT_MODE), Some(1.0));
    camera.set_defect_correction(true).unwrap();
    assert_eq!(mock.value(PropertyId::DEFECT_CORRECT_MODE), Some(2.0));
}

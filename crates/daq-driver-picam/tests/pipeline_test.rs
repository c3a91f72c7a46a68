//! Full acquisition pipeline against the simulated camera library.

#![cfg(feature = "mock")]

use chrono::{TimeZone, Utc};
use daq_core::{
    AcquisitionConfig, AcquisitionErrorsMask, AdcQuality, AnalogGain, DaqError, DeviceHandle,
    ParameterKind,
};
use daq_driver_picam::mock::{default_identity, MockSdk};
use daq_driver_picam::{CameraSdk, DriverOptions, PicamDriver};
use daq_storage::{FitsReader, PersistConfig};
use std::path::Path;
use tempfile::tempdir;
use tracing_test::traced_test;

const W: u32 = 64;
const H: u32 = 32;

fn driver(dir: &Path, options: DriverOptions) -> (PicamDriver, MockSdk, DeviceHandle) {
    let probe = MockSdk::new(vec![default_identity().unwrap()], W, H);
    let mut driver = PicamDriver::new(
        Box::new(probe.clone()),
        PersistConfig::new(dir).with_dimensions(W, H),
        options,
    );
    driver.start().unwrap();
    let devices = driver.list().unwrap();
    let handle = devices[0].handle;
    (driver, probe, handle)
}

fn settings() -> AcquisitionConfig {
    AcquisitionConfig::new(2.5, AnalogGain::Medium, AdcQuality::HighCapacity, 0.1).unwrap()
}

fn files_under(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| {
            if e.path().is_dir() {
                files_under(&e.path())
            } else {
                1
            }
        })
        .sum()
}

#[test]
fn list_before_start_fails() {
    let dir = tempdir().unwrap();
    let mut driver = PicamDriver::new(
        Box::new(MockSdk::default()),
        PersistConfig::new(dir.path()),
        DriverOptions::default(),
    );
    assert!(matches!(driver.list(), Err(DaqError::LibraryNotInitialized)));
}

#[test]
fn configure_then_acquire_writes_tagged_file() {
    let dir = tempdir().unwrap();
    let (mut driver, probe, handle) = driver(dir.path(), DriverOptions::default());

    assert!(driver.configure(handle, &settings()).unwrap());
    assert_eq!(
        probe.committed_float(handle, ParameterKind::ExposureTime),
        Some(2500.0)
    );

    let ts = Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap();
    let path = driver.acquire_at(handle, &ts).unwrap();
    assert_eq!(
        path,
        dir.path().join("2024mar 7").join("s20240307_14_05_09.fits")
    );

    let reader = FitsReader::open(&path).unwrap();
    assert_eq!(reader.float("EXPTIME"), Some(2.5));
    assert_eq!(reader.float("ADCSPEED"), Some(0.1));
    assert_eq!(reader.int("GAIN_SET"), Some(2));
    assert_eq!(reader.int("ADC"), Some(2));
    assert_eq!(reader.int("BITDEPTH"), Some(16));
    assert_eq!(reader.text("SER_NO"), Some("2702550001"));
    assert_eq!(reader.pixels().len(), (W * H) as usize);
    assert_eq!(probe.frames_taken(handle), 1);
}

#[test]
fn frame_count_mismatch_fails_closed_by_default() {
    let dir = tempdir().unwrap();
    let (mut driver, probe, handle) = driver(dir.path(), DriverOptions::default());
    probe.force_readout_count(2);

    let err = driver.acquire(handle).unwrap_err();
    assert!(matches!(
        err,
        DaqError::UnexpectedFrameCount {
            expected: 1,
            actual: 2
        }
    ));
    assert_eq!(files_under(dir.path()), 0);
}

#[test]
fn frame_count_mismatch_can_persist_first_readout() {
    let dir = tempdir().unwrap();
    let options = DriverOptions {
        persist_on_count_mismatch: true,
        ..DriverOptions::default()
    };
    let (mut driver, probe, handle) = driver(dir.path(), options);
    probe.force_readout_count(2);

    let err = driver.acquire(handle).unwrap_err();
    assert!(matches!(err, DaqError::UnexpectedFrameCount { actual: 2, .. }));
    assert_eq!(files_under(dir.path()), 1);
}

#[test]
fn zero_readouts_never_persist() {
    let dir = tempdir().unwrap();
    let options = DriverOptions {
        persist_on_count_mismatch: true,
        ..DriverOptions::default()
    };
    let (mut driver, probe, handle) = driver(dir.path(), options);
    probe.force_readout_count(0);

    let err = driver.acquire(handle).unwrap_err();
    assert!(matches!(err, DaqError::UnexpectedFrameCount { actual: 0, .. }));
    assert_eq!(files_under(dir.path()), 0);
}

#[test]
fn acquisition_error_mask_aborts() {
    let dir = tempdir().unwrap();
    let (mut driver, probe, handle) = driver(dir.path(), DriverOptions::default());
    probe.force_error_mask(AcquisitionErrorsMask::DATA_LOST);

    assert!(matches!(
        driver.acquire(handle),
        Err(DaqError::AcquisitionFailed { .. })
    ));
    assert_eq!(files_under(dir.path()), 0);
}

#[test]
#[traced_test]
fn readback_failure_still_persists() {
    let dir = tempdir().unwrap();
    let (mut driver, probe, handle) = driver(dir.path(), DriverOptions::default());
    probe.fail_get(ParameterKind::SensorTemperatureReading);

    let path = driver.acquire(handle).unwrap();
    let reader = FitsReader::open(&path).unwrap();
    assert_eq!(reader.float("TEMP"), Some(0.0));
    assert!(logs_contain("Could not read back parameter"));
}

#[test]
fn closed_handle_is_unknown() {
    let dir = tempdir().unwrap();
    let (mut driver, _probe, handle) = driver(dir.path(), DriverOptions::default());
    driver.close(handle).unwrap();
    assert!(matches!(
        driver.acquire(handle),
        Err(DaqError::UnknownHandle(_))
    ));
    assert!(matches!(driver.close(handle), Err(DaqError::UnknownHandle(_))));
}

#[test]
fn dropping_one_driver_keeps_the_library_for_others() {
    let dir = tempdir().unwrap();
    let (mut survivor, probe, handle) = driver(dir.path(), DriverOptions::default());

    {
        let mut other = PicamDriver::new(
            Box::new(probe.clone()),
            PersistConfig::new(dir.path()).with_dimensions(W, H),
            DriverOptions::default(),
        );
        other.start().unwrap();
    }

    assert!(probe.is_library_initialized().unwrap());
    assert_eq!(probe.open_handles(), vec![handle]);
    survivor.configure(handle, &settings()).unwrap();
    let path = survivor
        .acquire_at(handle, &Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap())
        .unwrap();
    assert!(path.exists());

    drop(survivor);
    assert!(probe.open_handles().is_empty());
    assert!(!probe.is_library_initialized().unwrap());
}

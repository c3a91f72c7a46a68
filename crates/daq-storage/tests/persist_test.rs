//! End-to-end persistence checks: dated layout, header schema and pixel fidelity.

use chrono::{TimeZone, Utc};
use daq_core::{DaqError, DeviceIdentity, FrameBuffer, FrameMetadata, InterfaceKind, ModelId};
use daq_storage::{FitsPersister, FitsReader, PersistConfig, PixelEncoding};
use tempfile::tempdir;
use tracing_test::traced_test;

fn metadata(gain: i32, amplifier: i32) -> FrameMetadata {
    FrameMetadata {
        exposure_seconds: 2.5,
        adc_speed_mhz: 0.1,
        sensor_temp_c: -55.5,
        bit_depth: 16,
        gain,
        amplifier,
        identity: DeviceIdentity::new(
            InterfaceKind::USB2,
            ModelId(1206),
            "PIXIS 2048B",
            "2702550001",
        )
        .unwrap(),
    }
}

fn full_range_frame() -> FrameBuffer {
    // 256 x 256 covers every 16-bit value exactly once.
    let pixels: Vec<u16> = (0..=u16::MAX).collect();
    FrameBuffer::from_u16(256, 256, pixels).unwrap()
}

#[test]
fn fixed_clock_produces_dated_path() {
    let dir = tempdir().unwrap();
    let persister = FitsPersister::new(PersistConfig::new(dir.path()).with_dimensions(256, 256));
    let ts = Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap();

    let path = persister
        .persist(&full_range_frame(), &metadata(1, 1), &ts)
        .unwrap();

    assert_eq!(
        path,
        dir.path().join("2024mar 7").join("s20240307_14_05_09.fits")
    );
    assert!(path.is_file());
}

#[test]
fn persisting_into_existing_directory_overwrites() {
    let dir = tempdir().unwrap();
    let persister = FitsPersister::new(PersistConfig::new(dir.path()).with_dimensions(256, 256));
    let ts = Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap();

    let first = persister
        .persist(&full_range_frame(), &metadata(1, 1), &ts)
        .unwrap();
    let second = persister
        .persist(&full_range_frame(), &metadata(2, 2), &ts)
        .unwrap();

    assert_eq!(first, second);
    let reader = FitsReader::open(&second).unwrap();
    assert_eq!(reader.int("GAIN_SET"), Some(2));
}

#[test]
fn full_range_round_trip_is_exact() {
    let dir = tempdir().unwrap();
    let persister = FitsPersister::new(PersistConfig::new(dir.path()).with_dimensions(256, 256));
    let ts = Utc.with_ymd_and_hms(2024, 11, 21, 3, 0, 0).unwrap();
    let frame = full_range_frame();

    let path = persister.persist(&frame, &metadata(1, 1), &ts).unwrap();
    let reader = FitsReader::open(&path).unwrap();

    assert_eq!(reader.width(), 256);
    assert_eq!(reader.height(), 256);
    assert_eq!(reader.int("BITPIX"), Some(16));
    assert_eq!(reader.int("BZERO"), Some(32768));
    assert_eq!(reader.int("BSCALE"), Some(1));
    assert_eq!(reader.pixels(), frame.pixels());

    let len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(len % 2880, 0);
}

#[test]
fn adc_card_reports_amplifier_not_gain() {
    let dir = tempdir().unwrap();
    let persister = FitsPersister::new(PersistConfig::new(dir.path()).with_dimensions(256, 256));
    let ts = Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap();

    let path = persister
        .persist(&full_range_frame(), &metadata(3, 2), &ts)
        .unwrap();
    let reader = FitsReader::open(&path).unwrap();

    assert_eq!(reader.int("GAIN_SET"), Some(3));
    assert_eq!(reader.int("ADC"), Some(2));
}

#[test]
#[traced_test]
fn signed_encoding_clips_with_warning() {
    let dir = tempdir().unwrap();
    let persister = FitsPersister::new(
        PersistConfig::new(dir.path())
            .with_dimensions(256, 256)
            .with_encoding(PixelEncoding::Signed),
    );
    let ts = Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap();

    let path = persister
        .persist(&full_range_frame(), &metadata(1, 1), &ts)
        .unwrap();

    assert!(logs_contain("Pixel values clipped"));
    let reader = FitsReader::open(&path).unwrap();
    assert_eq!(reader.value("BZERO"), None);
    assert_eq!(reader.pixels()[40000], 32767);
    assert_eq!(reader.pixels()[1234], 1234);
}

#[test]
fn unwritable_base_dir_is_io_error() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let persister = FitsPersister::new(PersistConfig::new(&blocker).with_dimensions(256, 256));
    let ts = Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap();

    let err = persister
        .persist(&full_range_frame(), &metadata(1, 1), &ts)
        .unwrap_err();
    assert!(matches!(err, DaqError::Io(_)));
}

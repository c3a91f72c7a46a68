//! Configuration layering: defaults, TOML file, environment.

use daq_storage::PixelEncoding;
use picam_daq::config::Settings;
use picam_daq::LogFormat;
use serial_test::serial;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("picam.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
#[serial]
fn file_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [application]
        log_format = "json"

        [storage]
        output_dir = "/srv/frames"
        width = 1024
        height = 512
        encoding = "signed"

        [acquisition]
        readout_timeout_ms = 2500
        "#,
    );

    let settings = Settings::load(Some(&path)).unwrap();
    assert_eq!(settings.application.log_format, LogFormat::Json);
    assert_eq!(settings.application.log_level, "info");
    assert_eq!(settings.storage.output_dir, Path::new("/srv/frames"));
    assert_eq!(settings.storage.width, 1024);
    assert_eq!(settings.storage.height, 512);
    assert_eq!(settings.storage.encoding, PixelEncoding::Signed);
    assert_eq!(settings.storage.extension, "fits");
    assert_eq!(settings.acquisition.readout_timeout_ms, Some(2500));
    assert!(!settings.acquisition.persist_on_count_mismatch);
}

#[test]
#[serial]
fn environment_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[storage]\nextension = \"fits\"\n");

    std::env::set_var("PICAM_DAQ_STORAGE__EXTENSION", "fit");
    std::env::set_var("PICAM_DAQ_ACQUISITION__PERSIST_ON_COUNT_MISMATCH", "true");
    let loaded = Settings::load(Some(&path));
    std::env::remove_var("PICAM_DAQ_STORAGE__EXTENSION");
    std::env::remove_var("PICAM_DAQ_ACQUISITION__PERSIST_ON_COUNT_MISMATCH");

    let settings = loaded.unwrap();
    assert_eq!(settings.storage.extension, "fit");
    assert!(settings.acquisition.persist_on_count_mismatch);
}

#[test]
#[serial]
fn missing_explicit_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = Settings::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
}

#[test]
#[serial]
fn semantic_validation_runs_on_load() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[application]\nlog_level = \"chatty\"\n");
    let err = Settings::load(Some(&path)).unwrap_err();
    assert!(format!("{:#}", err).contains("Invalid log_level 'chatty'"));
}

#[test]
#[serial]
fn malformed_value_reports_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[storage]\nwidth = \"wide\"\n");
    let err = Settings::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("Failed to load configuration"));
    assert!(err.to_string().contains("picam.toml"));
}

#[test]
#[serial]
fn shipped_config_matches_defaults() {
    let shipped = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/picam.toml");
    let settings = Settings::load(Some(&shipped)).unwrap();
    assert_eq!(settings, Settings::default());
}

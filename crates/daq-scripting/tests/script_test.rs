//! Scripts driving the simulated camera end to end.

#![cfg(feature = "mock")]

use daq_driver_picam::mock::{default_identity, MockSdk};
use daq_driver_picam::{DriverOptions, PicamDriver};
use daq_scripting::{CameraSession, RhaiEngine, ScriptEngine, ScriptError, ScriptValue};
use daq_storage::{FitsReader, PersistConfig};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

const W: u32 = 32;
const H: u32 = 16;

fn session(dir: &Path, probe: &MockSdk) -> CameraSession {
    Arc::new(Mutex::new(PicamDriver::new(
        Box::new(probe.clone()),
        PersistConfig::new(dir).with_dimensions(W, H),
        DriverOptions::default(),
    )))
}

fn mock() -> MockSdk {
    MockSdk::new(vec![default_identity().unwrap()], W, H)
}

async fn run(engine: &mut RhaiEngine, script: &str) -> Result<ScriptValue, ScriptError> {
    engine.execute_script(script).await
}

#[tokio::test(flavor = "multi_thread")]
async fn start_list_set_acquire_writes_fits() {
    let dir = tempdir().unwrap();
    let mut engine = RhaiEngine::new(session(dir.path(), &mock())).unwrap();

    let script = r#"
        start();
        let cams = list();
        let cam = cams[0];
        if !set(cam, 0.5, 3, 1, 4.0) { throw "not committed"; }
        acquire(cam)
    "#;
    let path: String = run(&mut engine, script).await.unwrap().downcast().unwrap();

    assert!(Path::new(&path).starts_with(dir.path()));
    let fits = FitsReader::open(&path).unwrap();
    assert_eq!(fits.width(), W as usize);
    assert_eq!(fits.height(), H as usize);
    assert_eq!(fits.float("EXPTIME"), Some(0.5));
    assert_eq!(fits.float("ADCSPEED"), Some(4.0));
    assert_eq!(fits.int("GAIN_SET"), Some(3));
    assert_eq!(fits.int("ADC"), Some(1));
    assert_eq!(fits.text("SER_NO"), Some("2702550001"));
}

#[tokio::test(flavor = "multi_thread")]
async fn list_returns_device_maps() {
    let dir = tempdir().unwrap();
    let mut engine = RhaiEngine::new(session(dir.path(), &mock())).unwrap();

    let script = r#"
        start();
        let cam = list()[0];
        `${cam.handle}|${cam.interface}|${cam.model}|${cam.sensor}|${cam.serial}`
    "#;
    let text: String = run(&mut engine, script).await.unwrap().downcast().unwrap();
    assert_eq!(text, "1|1|1206|PIXIS: 2048B|2702550001");
}

#[tokio::test(flavor = "multi_thread")]
async fn list_without_cameras_is_empty() {
    let dir = tempdir().unwrap();
    let probe = MockSdk::new(Vec::new(), W, H);
    let mut engine = RhaiEngine::new(session(dir.path(), &probe)).unwrap();

    let count: i64 = run(&mut engine, "start(); list().len()")
        .await
        .unwrap()
        .downcast()
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn list_before_start_is_a_runtime_error() {
    let dir = tempdir().unwrap();
    let mut engine = RhaiEngine::new(session(dir.path(), &mock())).unwrap();

    let err = run(&mut engine, "list()").await.unwrap_err();
    assert!(matches!(err, ScriptError::RuntimeError { .. }));
    assert!(err.to_string().contains("start()"));
}

#[tokio::test(flavor = "multi_thread")]
async fn version_reports_sdk_release() {
    let dir = tempdir().unwrap();
    let mut engine = RhaiEngine::new(session(dir.path(), &mock())).unwrap();

    let started: String = run(&mut engine, "start()").await.unwrap().downcast().unwrap();
    let version: String = run(&mut engine, "version()").await.unwrap().downcast().unwrap();
    assert_eq!(started, "5.12.0.2210");
    assert_eq!(version, started);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_gain_is_rejected_before_the_device() {
    let dir = tempdir().unwrap();
    let probe = mock();
    let mut engine = RhaiEngine::new(session(dir.path(), &probe)).unwrap();

    let err = run(&mut engine, "start(); set(list()[0], 1.0, 7, 1, 2.0)")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("gain"));
    let handle = probe.open_handles()[0];
    assert_eq!(
        probe.committed_integer(handle, daq_core::ParameterKind::AdcAnalogGain),
        Some(2)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn commit_rejection_surfaces_in_script() {
    let dir = tempdir().unwrap();
    let mut engine = RhaiEngine::new(session(dir.path(), &mock())).unwrap();

    let err = run(&mut engine, "start(); set(list()[0], 1, 2, 1, 3.0)")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Failed to commit ADC speed"));
}

#[tokio::test(flavor = "multi_thread")]
async fn tampered_descriptor_is_rejected() {
    let dir = tempdir().unwrap();
    let probe = mock();
    let mut engine = RhaiEngine::new(session(dir.path(), &probe)).unwrap();

    let script = r#"
        start();
        let cam = list()[0];
        cam.serial = "0000000000";
        acquire(cam)
    "#;
    let err = run(&mut engine, script).await.unwrap_err();
    assert!(err.to_string().contains("does not match"));
    assert_eq!(probe.frames_taken(probe.open_handles()[0]), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn non_ascii_sensor_name_is_rejected_before_readout() {
    let dir = tempdir().unwrap();
    let probe = mock();
    let mut engine = RhaiEngine::new(session(dir.path(), &probe)).unwrap();

    let script = r#"
        start();
        let cam = list()[0];
        cam.sensor = "PIXIS Sensör";
        acquire(cam)
    "#;
    let err = run(&mut engine, script).await.unwrap_err();
    assert!(err.to_string().contains("printable ASCII"));
    assert_eq!(probe.frames_taken(probe.open_handles()[0]), 0);
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn acquire_after_close_reports_unknown_handle() {
    let dir = tempdir().unwrap();
    let probe = mock();
    let mut engine = RhaiEngine::new(session(dir.path(), &probe)).unwrap();

    let script = r#"
        start();
        let cam = list()[0];
        close(cam);
        acquire(cam)
    "#;
    let err = run(&mut engine, script).await.unwrap_err();
    assert!(err.to_string().contains("Unknown device handle 1"));
    assert!(probe.open_handles().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn globals_feed_acquisition_settings() {
    let dir = tempdir().unwrap();
    let mut engine = RhaiEngine::new(session(dir.path(), &mock())).unwrap();
    engine.set_global("exptime", ScriptValue::new(2.5_f64)).unwrap();

    let script = r#"
        start();
        let cam = list()[0];
        set(cam, exptime, 1, 2, 0.1);
        acquire(cam)
    "#;
    let path: String = run(&mut engine, script).await.unwrap().downcast().unwrap();
    let fits = FitsReader::open(&path).unwrap();
    assert_eq!(fits.float("EXPTIME"), Some(2.5));
    assert_eq!(fits.int("ADC"), Some(2));
}

#[tokio::test(flavor = "multi_thread")]
async fn engines_sharing_a_session_serialize() {
    let dir = tempdir().unwrap();
    let probe = mock();
    let shared = session(dir.path(), &probe);
    shared.lock().start().unwrap();
    shared.lock().list().unwrap();

    let script = r#"
        let cam = list()[0];
        set(cam, 0.01, 2, 1, 2.0);
        acquire(cam)
    "#;
    let mut a = RhaiEngine::new(shared.clone()).unwrap();
    let mut b = RhaiEngine::new(shared.clone()).unwrap();
    let (ra, rb) = tokio::join!(a.execute_script(script), b.execute_script(script));
    ra.unwrap();
    rb.unwrap();

    assert_eq!(probe.frames_taken(probe.open_handles()[0]), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn syntax_errors_are_reported() {
    let dir = tempdir().unwrap();
    let mut engine = RhaiEngine::new(session(dir.path(), &mock())).unwrap();

    assert!(engine.validate_script("start(); list()").await.is_ok());
    assert!(matches!(
        engine.validate_script("let cam = ").await,
        Err(ScriptError::SyntaxError { .. })
    ));
    assert!(matches!(
        run(&mut engine, "acquire(").await,
        Err(ScriptError::SyntaxError { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn operation_limit_stops_runaway_scripts() {
    let dir = tempdir().unwrap();
    let mut engine = RhaiEngine::with_limit(session(dir.path(), &mock()), 1_000).unwrap();

    let err = run(&mut engine, "let x = 0; loop { x += 1; }").await.unwrap_err();
    // Rhai reports a progress-callback abort as termination.
    assert!(err.to_string().contains("terminated"));
}

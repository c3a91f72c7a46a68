//! Camera Bindings for Rhai Scripts
//!
//! Exposes a [`PicamDriver`] session to scripts as plain functions:
//!
//! | Script call                                      | Returns                               |
//! |--------------------------------------------------|---------------------------------------|
//! | `start()`                                        | SDK version string                    |
//! | `version()`                                      | SDK version string                    |
//! | `list()`                                         | array of device maps                  |
//! | `set(device, exptime, gain, amplifier, adcspeed)` | `true` if the device committed all   |
//! | `acquire(device)`                                | path of the written FITS file         |
//! | `close(device)`                                  | `()`                                  |
//!
//! A device map is `#{handle, interface, model, sensor, serial}`, exactly as
//! `list()` returns it. Maps coming back from a script are validated into a
//! typed [`DeviceDescriptor`] before the driver sees them.
//!
//! Every binding locks the session for the length of the call, so scripts
//! running on different engines sharing one session serialize on the camera.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! let mut engine = Engine::new();
//! register_camera(&mut engine, session);
//!
//! engine.run(r#"
//!     start();
//!     for cam in list() {
//!         set(cam, 0.1, 2, 1, 2.0);
//!         print(acquire(cam));
//!     }
//! "#)?;
//! ```

use daq_core::{
    AcquisitionConfig, AdcQuality, AnalogGain, DaqError, DeviceDescriptor, DeviceHandle,
    DeviceIdentity, InterfaceKind, ModelId,
};
use daq_driver_picam::PicamDriver;
use parking_lot::Mutex;
use rhai::{Array, Dynamic, Engine, EvalAltResult, Map, Position};
use std::fmt::Display;
use std::sync::Arc;

/// Driver session shared between the engine and its caller.
pub type CameraSession = Arc<Mutex<PicamDriver>>;

type BindingResult<T> = Result<T, Box<EvalAltResult>>;

fn runtime_error(context: &str, err: impl Display) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        format!("{}: {}", context, err).into(),
        Position::NONE,
    ))
}

// =============================================================================
// Descriptor marshalling
// =============================================================================

/// Build the script-side map for `device`.
pub fn descriptor_to_map(device: &DeviceDescriptor) -> Map {
    let identity = &device.identity;
    let mut map = Map::new();
    // Handles are allocated from 1 upwards and never approach i64::MAX.
    map.insert("handle".into(), Dynamic::from(device.handle.0 as i64));
    map.insert(
        "interface".into(),
        Dynamic::from(i64::from(identity.interface().0)),
    );
    map.insert("model".into(), Dynamic::from(i64::from(identity.model().0)));
    map.insert("sensor".into(), Dynamic::from(identity.sensor_name().to_string()));
    map.insert(
        "serial".into(),
        Dynamic::from(identity.serial_number().to_string()),
    );
    map
}

fn field<'a>(map: &'a Map, key: &str) -> Result<&'a Dynamic, DaqError> {
    map.get(key)
        .ok_or_else(|| DaqError::InvalidInput(format!("device is missing field '{}'", key)))
}

fn int_field(map: &Map, key: &str) -> Result<i64, DaqError> {
    field(map, key)?.as_int().map_err(|found| {
        DaqError::InvalidInput(format!("device field '{}' must be an integer, got {}", key, found))
    })
}

fn i32_field(map: &Map, key: &str) -> Result<i32, DaqError> {
    let value = int_field(map, key)?;
    i32::try_from(value).map_err(|_| {
        DaqError::InvalidInput(format!("device field '{}' is out of range: {}", key, value))
    })
}

fn string_field(map: &Map, key: &str) -> Result<String, DaqError> {
    field(map, key)?.clone().into_string().map_err(|found| {
        DaqError::InvalidInput(format!("device field '{}' must be a string, got {}", key, found))
    })
}

/// Validate a script-side device map.
///
/// Field types and string bounds are checked here; whether the handle is
/// actually open is left to the driver.
pub fn descriptor_from_map(map: &Map) -> Result<DeviceDescriptor, DaqError> {
    let handle = int_field(map, "handle")?;
    let handle = u64::try_from(handle).map_err(|_| {
        DaqError::InvalidInput(format!("device handle must be non-negative, got {}", handle))
    })?;
    let identity = DeviceIdentity::new(
        InterfaceKind(i32_field(map, "interface")?),
        ModelId(i32_field(map, "model")?),
        string_field(map, "sensor")?,
        string_field(map, "serial")?,
    )?;
    Ok(DeviceDescriptor {
        handle: DeviceHandle(handle),
        identity,
    })
}

/// Resolve a device map to the handle of the camera it describes.
fn open_handle(driver: &PicamDriver, device: &Map) -> Result<DeviceHandle, DaqError> {
    let descriptor = descriptor_from_map(device)?;
    let opened = driver.identity(descriptor.handle)?;
    if *opened != descriptor.identity {
        return Err(DaqError::InvalidInput(format!(
            "device does not match the camera open on handle {}",
            descriptor.handle
        )));
    }
    Ok(descriptor.handle)
}

/// Accept both integer and float script numbers.
fn number(name: &str, value: &Dynamic) -> Result<f64, DaqError> {
    if let Ok(v) = value.as_float() {
        return Ok(v);
    }
    value.as_int().map(|v| v as f64).map_err(|found| {
        DaqError::InvalidInput(format!("{} must be a number, got {}", name, found))
    })
}

fn acquisition_config(
    exptime: &Dynamic,
    gain: i64,
    amplifier: i64,
    adcspeed: &Dynamic,
) -> Result<AcquisitionConfig, DaqError> {
    AcquisitionConfig::new(
        number("exptime", exptime)?,
        AnalogGain::try_from(gain)?,
        AdcQuality::try_from(amplifier)?,
        number("adcspeed", adcspeed)?,
    )
}

// =============================================================================
// Registration
// =============================================================================

/// Register the camera functions on `engine`, all bound to `session`.
pub fn register_camera(engine: &mut Engine, session: CameraSession) {
    // start() - initialize the SDK; repeated calls are harmless
    let s = session.clone();
    engine.register_fn("start", move || -> BindingResult<String> {
        let version = s.lock().start().map_err(|e| runtime_error("start", e))?;
        Ok(version.to_string())
    });

    // version() - SDK version as "major.minor.distribution.released"
    let s = session.clone();
    engine.register_fn("version", move || -> BindingResult<String> {
        let version = s.lock().version().map_err(|e| runtime_error("version", e))?;
        Ok(version.to_string())
    });

    // list() - open every attached camera
    let s = session.clone();
    engine.register_fn("list", move || -> BindingResult<Array> {
        let devices = s.lock().list().map_err(|e| runtime_error("list", e))?;
        Ok(devices
            .iter()
            .map(|d| Dynamic::from_map(descriptor_to_map(d)))
            .collect())
    });

    // set(device, exptime_s, gain, amplifier, adcspeed_mhz)
    let s = session.clone();
    engine.register_fn(
        "set",
        move |device: Map,
              exptime: Dynamic,
              gain: i64,
              amplifier: i64,
              adcspeed: Dynamic|
              -> BindingResult<bool> {
            let config = acquisition_config(&exptime, gain, amplifier, &adcspeed)
                .map_err(|e| runtime_error("set", e))?;
            let mut driver = s.lock();
            let handle = open_handle(&driver, &device).map_err(|e| runtime_error("set", e))?;
            driver
                .configure(handle, &config)
                .map_err(|e| runtime_error("set", e))
        },
    );

    // acquire(device) - one frame to disk, returns the file path
    let s = session.clone();
    engine.register_fn("acquire", move |device: Map| -> BindingResult<String> {
        let mut driver = s.lock();
        let handle = open_handle(&driver, &device).map_err(|e| runtime_error("acquire", e))?;
        let path = driver
            .acquire(handle)
            .map_err(|e| runtime_error("acquire", e))?;
        Ok(path.display().to_string())
    });

    // close(device)
    let s = session;
    engine.register_fn("close", move |device: Map| -> BindingResult<()> {
        let mut driver = s.lock();
        let handle = open_handle(&driver, &device).map_err(|e| runtime_error("close", e))?;
        driver.close(handle).map_err(|e| runtime_error("close", e))
    });
}

//! # picam-daq
//!
//! Scripted single-frame acquisition from Princeton Instruments cameras to
//! FITS files.
//!
//! ## Crate Structure
//!
//! - **`daq-core`**: shared types and the [`DaqError`](daq_core::DaqError) taxonomy
//! - **`daq-driver-picam`**: the camera library seam, its backends, and
//!   [`PicamDriver`], which runs configure, acquire, read back and persist
//! - **`daq-storage`**: FITS codec and the dated-path persister
//! - **`daq-scripting`**: Rhai bindings (`start`, `list`, `set`, `acquire`, `close`, `version`)
//!
//! This crate adds the application glue: [`config`] (figment layering),
//! [`tracing_init`] (subscriber setup) and [`build_driver`], which picks the
//! camera backend compiled in.

pub mod config;
pub mod tracing_init;

use crate::config::Settings;
use daq_driver_picam::{CameraSdk, PicamDriver};

pub use config::LogFormat;

/// The camera library backend selected at build time.
///
/// The real PICam SDK wins when both backends are compiled in.
pub fn camera_sdk(settings: &Settings) -> anyhow::Result<Box<dyn CameraSdk>> {
    #[cfg(feature = "picam_sdk")]
    {
        let _ = settings;
        tracing::info!("Using PICam SDK backend");
        Ok(Box::new(daq_driver_picam::components::ffi::PicamSdk::new()))
    }

    #[cfg(all(feature = "mock", not(feature = "picam_sdk")))]
    {
        tracing::info!(
            cameras = settings.mock.cameras,
            width = settings.mock.sensor_width,
            height = settings.mock.sensor_height,
            "Using simulated camera backend"
        );
        Ok(Box::new(mock_sdk(settings)?))
    }

    #[cfg(not(any(feature = "mock", feature = "picam_sdk")))]
    {
        let _ = settings;
        anyhow::bail!("No camera backend compiled in; enable the 'mock' or 'picam_sdk' feature")
    }
}

/// Simulated library with `settings.mock.cameras` cameras attached.
///
/// The first camera carries the default identity; later ones get
/// consecutive serial numbers.
#[cfg(feature = "mock")]
pub fn mock_sdk(settings: &Settings) -> anyhow::Result<daq_driver_picam::mock::MockSdk> {
    use daq_core::DeviceIdentity;
    use daq_driver_picam::mock::{default_identity, MockSdk};

    let first = default_identity()?;
    let serial_base = first.serial_number().get(..8).unwrap_or("mock");
    let cameras = (0..settings.mock.cameras)
        .map(|i| {
            if i == 0 {
                return Ok(first.clone());
            }
            DeviceIdentity::new(
                first.interface(),
                first.model(),
                first.sensor_name(),
                format!("{}{:02}", serial_base, i + 1),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MockSdk::new(
        cameras,
        settings.mock.sensor_width,
        settings.mock.sensor_height,
    ))
}

/// Driver session wired up from `settings`.
pub fn build_driver(settings: &Settings) -> anyhow::Result<PicamDriver> {
    Ok(PicamDriver::new(
        camera_sdk(settings)?,
        settings.persist_config(),
        settings.driver_options(),
    ))
}

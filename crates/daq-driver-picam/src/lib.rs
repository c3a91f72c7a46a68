//! Princeton Instruments PICam Camera Driver (Componentized)
//!
//! Component architecture:
//! - Connection: library initialization, discovery, handles
//! - Features: parameter writes and commits
//! - Acquisition: blocking single-frame readout
//! - Metadata: post-readout device state
//!
//! [`PicamDriver`] strings them together with a [`FitsPersister`] into the
//! acquisition-to-file pipeline. The vendor library is reached through the
//! [`CameraSdk`] trait: [`mock::MockSdk`] (feature `mock`) simulates it,
//! [`components::ffi::PicamSdk`] (feature `picam_sdk`) calls the real one.

pub mod components;
#[cfg(feature = "mock")]
pub mod mock;
pub mod sdk;

use crate::components::acquisition::{self, Acquired};
use crate::components::connection::PicamConnection;
use crate::components::{features, metadata};
use chrono::{DateTime, Local, TimeZone};
use daq_core::{
    AcquisitionConfig, AppResult, DaqError, DeviceDescriptor, DeviceHandle, DeviceIdentity,
    FrameBuffer, SdkVersion,
};
use daq_storage::{FitsPersister, PersistConfig};
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub use crate::sdk::{AvailableData, CameraSdk, CommitOutcome, LibraryUsers};

/// Pixels logged after each readout as a quick sanity check, as (row, col).
const SAMPLE_PIXELS: [(u32, u32); 3] = [(2000, 1000), (1000, 1000), (10, 1000)];

/// Pipeline behavior switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverOptions {
    /// Persist the first readout when the device returns a readout count other
    /// than one. The call still fails with `UnexpectedFrameCount`.
    pub persist_on_count_mismatch: bool,
    /// Readout timeout; `None` waits forever.
    pub readout_timeout: Option<Duration>,
}

/// Camera session driving the acquisition-to-file pipeline.
pub struct PicamDriver {
    connection: PicamConnection,
    persister: FitsPersister,
    options: DriverOptions,
}

impl PicamDriver {
    pub fn new(sdk: Box<dyn CameraSdk>, persist: PersistConfig, options: DriverOptions) -> Self {
        Self {
            connection: PicamConnection::new(sdk),
            persister: FitsPersister::new(persist),
            options,
        }
    }

    pub fn persister(&self) -> &FitsPersister {
        &self.persister
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Initialize the camera library; safe to call repeatedly.
    pub fn start(&mut self) -> AppResult<SdkVersion> {
        self.connection.initialize()
    }

    pub fn version(&self) -> AppResult<SdkVersion> {
        self.connection.version()
    }

    /// Open every attached camera and describe it.
    pub fn list(&mut self) -> AppResult<Vec<DeviceDescriptor>> {
        let devices = self.connection.open_all()?;
        for device in &devices {
            tracing::info!(
                handle = %device.handle,
                model = device.identity.model().0,
                interface = device.identity.interface().0,
                sensor = device.identity.sensor_name(),
                serial = device.identity.serial_number(),
                "Camera available"
            );
        }
        Ok(devices)
    }

    /// Identity of the camera open on `handle`.
    pub fn identity(&self, handle: DeviceHandle) -> AppResult<&DeviceIdentity> {
        self.connection.identity(handle)
    }

    /// Apply acquisition settings; returns whether the device reports all
    /// parameters committed.
    pub fn configure(
        &mut self,
        handle: DeviceHandle,
        config: &AcquisitionConfig,
    ) -> AppResult<bool> {
        self.connection.identity(handle)?;
        tracing::info!(
            %handle,
            exptime_s = config.exposure_seconds(),
            gain = config.analog_gain().code(),
            amplifier = config.amplifier_quality().code(),
            adcspeed_mhz = config.adc_speed_mhz(),
            "Setting acquisition parameters"
        );
        let started = Instant::now();
        let committed = features::configure(self.connection.sdk_mut(), handle, config)?;
        tracing::info!(
            %handle,
            committed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Acquisition parameters set"
        );
        Ok(committed)
    }

    /// Take one frame and write it to a file named after the current local time.
    pub fn acquire(&mut self, handle: DeviceHandle) -> AppResult<PathBuf> {
        self.acquire_with(handle, Local::now)
    }

    /// Take one frame and write it to a file named after `timestamp`.
    pub fn acquire_at<Tz: TimeZone>(
        &mut self,
        handle: DeviceHandle,
        timestamp: &DateTime<Tz>,
    ) -> AppResult<PathBuf> {
        self.acquire_with(handle, || timestamp.clone())
    }

    fn acquire_with<Tz, F>(&mut self, handle: DeviceHandle, clock: F) -> AppResult<PathBuf>
    where
        Tz: TimeZone,
        F: FnOnce() -> DateTime<Tz>,
    {
        let identity = self.connection.identity(handle)?.clone();
        let (width, height) = {
            let cfg = self.persister.config();
            (cfg.width, cfg.height)
        };

        let acquired = acquisition::acquire(
            self.connection.sdk_mut(),
            handle,
            width,
            height,
            self.options.readout_timeout,
        )?;

        let (frame, deferred_error) = match acquired {
            Acquired::Frame(frame) => (frame, None),
            Acquired::CountMismatch { actual, first } => {
                let error = DaqError::UnexpectedFrameCount {
                    expected: acquisition::READOUTS_PER_ACQUISITION,
                    actual,
                };
                match first {
                    Some(frame) if self.options.persist_on_count_mismatch => {
                        tracing::warn!(
                            %handle,
                            actual,
                            "Persisting first readout despite frame count mismatch"
                        );
                        (frame, Some(error))
                    }
                    _ => return Err(error),
                }
            }
        };

        log_sample_pixels(handle, &frame);

        let collected = metadata::collect(self.connection.sdk(), handle, &identity);
        let path = self
            .persister
            .persist(&frame, &collected.metadata, &clock())?;

        match deferred_error {
            Some(error) => Err(error),
            None => Ok(path),
        }
    }

    pub fn close(&mut self, handle: DeviceHandle) -> AppResult<()> {
        self.connection.close(handle)
    }

    pub fn open_handles(&self) -> Vec<DeviceHandle> {
        self.connection.open_handles()
    }

    /// Close this driver's cameras and release its hold on the library.
    pub fn shutdown(&mut self) -> AppResult<()> {
        self.connection.shutdown()
    }
}

fn log_sample_pixels(handle: DeviceHandle, frame: &FrameBuffer) {
    for (row, col) in SAMPLE_PIXELS {
        if let Some(value) = frame.get(row, col) {
            tracing::debug!(%handle, row, col, value, "Sample pixel");
        }
    }
}

impl Drop for PicamDriver {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "PICam shutdown failed");
        }
    }
}

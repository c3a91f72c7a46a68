//! Post-acquisition metadata read-back.
//!
//! Reads the device state that goes into the FITS header. A failed read is
//! not fatal: it is logged, listed in [`CollectedMetadata::warnings`], and
//! the field is recorded as zero.

use crate::sdk::{CameraSdk, SdkResult};
use daq_core::{DeviceHandle, DeviceIdentity, FrameMetadata, ParameterKind};

#[derive(Debug, Clone, PartialEq)]
pub struct CollectedMetadata {
    pub metadata: FrameMetadata,
    pub warnings: Vec<String>,
}

struct Reader<'a> {
    sdk: &'a dyn CameraSdk,
    handle: DeviceHandle,
    warnings: Vec<String>,
}

impl Reader<'_> {
    fn or_zero<T: Default>(&mut self, parameter: ParameterKind, read: SdkResult<T>) -> T {
        match read {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    handle = %self.handle,
                    %parameter,
                    error = %e,
                    "Could not read back parameter"
                );
                self.warnings.push(format!("could not read {}: {}", parameter, e));
                T::default()
            }
        }
    }

    fn float(&mut self, parameter: ParameterKind) -> f64 {
        let read = self.sdk.get_float(self.handle, parameter);
        self.or_zero(parameter, read)
    }

    fn integer(&mut self, parameter: ParameterKind) -> i32 {
        let read = self.sdk.get_integer(self.handle, parameter);
        self.or_zero(parameter, read)
    }
}

/// Snapshot the device state of `handle` for the frame just taken.
pub fn collect(
    sdk: &dyn CameraSdk,
    handle: DeviceHandle,
    identity: &DeviceIdentity,
) -> CollectedMetadata {
    let mut reader = Reader {
        sdk,
        handle,
        warnings: Vec::new(),
    };
    let exposure_ms = reader.float(ParameterKind::ExposureTime);
    let adc_speed_mhz = reader.float(ParameterKind::AdcSpeed);
    let bit_depth = reader.integer(ParameterKind::AdcBitDepth);
    let gain = reader.integer(ParameterKind::AdcAnalogGain);
    let amplifier = reader.integer(ParameterKind::AdcQuality);
    let sensor_temp_c = reader.float(ParameterKind::SensorTemperatureReading);

    CollectedMetadata {
        metadata: FrameMetadata {
            exposure_seconds: exposure_ms / 1000.0,
            adc_speed_mhz,
            sensor_temp_c,
            bit_depth,
            gain,
            amplifier,
            identity: identity.clone(),
        },
        warnings: reader.warnings,
    }
}

//! PICam Parameter Control
//!
//! Applies acquisition settings to an open camera. Each parameter is written
//! and then committed on its own, in a fixed order:
//!
//! 1. exposure time (written in ms)
//! 2. analog gain
//! 3. amplifier quality
//! 4. ADC speed (MHz)
//!
//! There is no rollback. If a step fails, earlier parameters stay applied.

use crate::sdk::CameraSdk;
use daq_core::{AcquisitionConfig, AppResult, DaqError, DeviceHandle, ParameterKind};

/// Value written to the device for one step.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Write {
    Float(f64),
    Integer(i32),
}

fn planned_writes(config: &AcquisitionConfig) -> [(ParameterKind, Write); 4] {
    [
        (ParameterKind::ExposureTime, Write::Float(config.exposure_ms())),
        (
            ParameterKind::AdcAnalogGain,
            Write::Integer(config.analog_gain().code()),
        ),
        (
            ParameterKind::AdcQuality,
            Write::Integer(config.amplifier_quality().code()),
        ),
        (ParameterKind::AdcSpeed, Write::Float(config.adc_speed_mhz())),
    ]
}

/// Apply `config` to `handle`; returns the device's all-committed flag.
pub fn configure(
    sdk: &mut dyn CameraSdk,
    handle: DeviceHandle,
    config: &AcquisitionConfig,
) -> AppResult<bool> {
    for (parameter, value) in planned_writes(config) {
        let written = match value {
            Write::Float(v) => sdk.set_float(handle, parameter, v),
            Write::Integer(v) => sdk.set_integer(handle, parameter, v),
        };

        if let Err(source) = written {
            tracing::error!(%handle, %parameter, error = %source, "Failed to set parameter");
            // Commit anyway so the device's rejected list ends up in the log.
            let rejected = match sdk.commit_parameters(handle) {
                Ok(outcome) => outcome.rejected,
                Err(e) => {
                    tracing::warn!(%handle, error = %e, "Diagnostic commit failed");
                    Vec::new()
                }
            };
            if !rejected.is_empty() {
                tracing::error!(%handle, ?rejected, "Device rejected parameters");
            }
            return Err(DaqError::ParameterSet {
                parameter,
                rejected,
                source,
            });
        }

        let outcome = sdk.commit_parameters(handle)?;
        if !outcome.is_committed() {
            tracing::error!(
                %handle,
                %parameter,
                rejected = ?outcome.rejected,
                "Failed to commit parameter to camera device"
            );
            return Err(DaqError::CommitFailed {
                parameter,
                rejected: outcome.rejected,
            });
        }
        tracing::debug!(%handle, %parameter, ?value, "Parameter committed");
    }

    Ok(sdk.are_parameters_committed(handle)?)
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::mock::{default_identity, MockSdk};
    use daq_core::{AdcQuality, AnalogGain, SdkErrorKind};

    fn opened() -> (MockSdk, DeviceHandle) {
        let mut sdk = MockSdk::new(vec![default_identity().unwrap()], 4, 4);
        sdk.initialize_library().unwrap();
        let handle = sdk.open_camera(&default_identity().unwrap()).unwrap();
        (sdk, handle)
    }

    fn config(exposure: f64, adc: f64) -> AcquisitionConfig {
        AcquisitionConfig::new(exposure, AnalogGain::High, AdcQuality::HighCapacity, adc).unwrap()
    }

    #[test]
    fn applies_all_parameters_with_unit_conversion() {
        let (mut sdk, h) = opened();
        let committed = configure(&mut sdk, h, &config(2.5, 4.0)).unwrap();
        assert!(committed);
        assert_eq!(sdk.committed_float(h, ParameterKind::ExposureTime), Some(2500.0));
        assert_eq!(sdk.committed_integer(h, ParameterKind::AdcAnalogGain), Some(3));
        assert_eq!(sdk.committed_integer(h, ParameterKind::AdcQuality), Some(2));
        assert_eq!(sdk.committed_float(h, ParameterKind::AdcSpeed), Some(4.0));
    }

    #[test]
    fn set_failure_names_step_and_skips_rest() {
        let (mut sdk, h) = opened();
        sdk.fail_set(ParameterKind::AdcAnalogGain, SdkErrorKind::ParameterValueOutOfRange);

        let err = configure(&mut sdk, h, &config(1.0, 4.0)).unwrap_err();
        match err {
            DaqError::ParameterSet {
                parameter, source, ..
            } => {
                assert_eq!(parameter, ParameterKind::AdcAnalogGain);
                assert_eq!(source.kind, SdkErrorKind::ParameterValueOutOfRange);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Exposure was applied before the failure; ADC speed never was.
        assert_eq!(sdk.committed_float(h, ParameterKind::ExposureTime), Some(1000.0));
        assert_eq!(sdk.committed_float(h, ParameterKind::AdcSpeed), Some(2.0));
    }

    #[test]
    fn commit_rejection_reports_parameter() {
        let (mut sdk, h) = opened();
        let err = configure(&mut sdk, h, &config(1.0, 3.0)).unwrap_err();
        match err {
            DaqError::CommitFailed {
                parameter,
                rejected,
            } => {
                assert_eq!(parameter, ParameterKind::AdcSpeed);
                assert_eq!(rejected, vec![ParameterKind::AdcSpeed]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn commit_error_propagates_as_sdk_error() {
        let (mut sdk, h) = opened();
        sdk.fail_commit(SdkErrorKind::CameraFaulted);
        let err = configure(&mut sdk, h, &config(1.0, 2.0)).unwrap_err();
        assert!(matches!(err, DaqError::Sdk(e) if e.kind == SdkErrorKind::CameraFaulted));
    }
}

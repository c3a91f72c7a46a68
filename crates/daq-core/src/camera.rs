//! Camera-facing value types shared by the driver, storage and scripting crates.
//!
//! These mirror the vendor model (interface kind, model id, bounded identity
//! strings, integer-coded gain and ADC quality) but are owned Rust values with
//! their invariants checked at construction.

use crate::error::{AppResult, DaqError};
use crate::limits::{SENSOR_NAME_MAX_LEN, SERIAL_NUMBER_MAX_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Identity
// =============================================================================

/// Camera bus interface, as the integer code the SDK reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterfaceKind(pub i32);

impl InterfaceKind {
    pub const USB2: InterfaceKind = InterfaceKind(1);
    pub const IEEE_1394A: InterfaceKind = InterfaceKind(2);
    pub const GIGABIT_ETHERNET: InterfaceKind = InterfaceKind(3);
    pub const USB3: InterfaceKind = InterfaceKind(4);
}

/// Camera model, as the integer code the SDK reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(pub i32);

/// Identity of an attached camera.
///
/// String fields are bounded by the SDK's fixed-size buffers and must be
/// printable ASCII, since they end up in FITS header cards. Oversized values
/// are rejected rather than truncated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    interface: InterfaceKind,
    model: ModelId,
    sensor_name: String,
    serial_number: String,
}

impl DeviceIdentity {
    pub fn new(
        interface: InterfaceKind,
        model: ModelId,
        sensor_name: impl Into<String>,
        serial_number: impl Into<String>,
    ) -> AppResult<Self> {
        let sensor_name = sensor_name.into();
        let serial_number = serial_number.into();
        check_bounded("Sensor name", &sensor_name, SENSOR_NAME_MAX_LEN)?;
        check_bounded("Serial number", &serial_number, SERIAL_NUMBER_MAX_LEN)?;
        Ok(Self {
            interface,
            model,
            sensor_name,
            serial_number,
        })
    }

    pub fn interface(&self) -> InterfaceKind {
        self.interface
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    pub fn sensor_name(&self) -> &str {
        &self.sensor_name
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }
}

/// Reject strings that would not fit in the SDK's fixed buffer or that are
/// not printable ASCII.
///
/// The bound counts bytes, and the SDK buffer also holds the terminating NUL,
/// so a string of exactly `max` bytes is rejected.
pub fn check_bounded(field: &'static str, value: &str, max: usize) -> AppResult<()> {
    if value.len() >= max {
        return Err(DaqError::InputTooLong {
            field,
            len: value.len(),
            max,
        });
    }
    if let Some(c) = value.chars().find(|c| !(' '..='~').contains(c)) {
        return Err(DaqError::InvalidInput(format!(
            "{} must be printable ASCII, found {:?} in {:?}",
            field, c, value
        )));
    }
    Ok(())
}

/// Opaque token for an open camera session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceHandle(pub u64);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Script-facing description of an open device.
///
/// This is what `list()` hands out and what `set()`/`acquire()` accept back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub handle: DeviceHandle,
    pub identity: DeviceIdentity,
}

// =============================================================================
// Acquisition parameters
// =============================================================================

/// Analog gain setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalogGain {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl AnalogGain {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i64> for AnalogGain {
    type Error = DaqError;

    fn try_from(value: i64) -> AppResult<Self> {
        match value {
            1 => Ok(AnalogGain::Low),
            2 => Ok(AnalogGain::Medium),
            3 => Ok(AnalogGain::High),
            other => Err(DaqError::InvalidInput(format!(
                "gain must be 1 (low), 2 (medium) or 3 (high), got {}",
                other
            ))),
        }
    }
}

/// Amplifier (ADC quality) setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdcQuality {
    LowNoise = 1,
    HighCapacity = 2,
}

impl AdcQuality {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i64> for AdcQuality {
    type Error = DaqError;

    fn try_from(value: i64) -> AppResult<Self> {
        match value {
            1 => Ok(AdcQuality::LowNoise),
            2 => Ok(AdcQuality::HighCapacity),
            other => Err(DaqError::InvalidInput(format!(
                "amplifier must be 1 (low noise) or 2 (high capacity), got {}",
                other
            ))),
        }
    }
}

/// Validated acquisition settings for one exposure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquisitionConfig {
    exposure_seconds: f64,
    analog_gain: AnalogGain,
    amplifier_quality: AdcQuality,
    adc_speed_mhz: f64,
}

impl AcquisitionConfig {
    pub fn new(
        exposure_seconds: f64,
        analog_gain: AnalogGain,
        amplifier_quality: AdcQuality,
        adc_speed_mhz: f64,
    ) -> AppResult<Self> {
        if !exposure_seconds.is_finite() || exposure_seconds < 0.0 {
            return Err(DaqError::InvalidInput(format!(
                "exposure time must be a finite, non-negative number of seconds, got {}",
                exposure_seconds
            )));
        }
        if !adc_speed_mhz.is_finite() || adc_speed_mhz <= 0.0 {
            return Err(DaqError::InvalidInput(format!(
                "ADC speed must be a finite, positive number of MHz, got {}",
                adc_speed_mhz
            )));
        }
        Ok(Self {
            exposure_seconds,
            analog_gain,
            amplifier_quality,
            adc_speed_mhz,
        })
    }

    pub fn exposure_seconds(&self) -> f64 {
        self.exposure_seconds
    }

    /// Exposure in the unit the device expects.
    pub fn exposure_ms(&self) -> f64 {
        self.exposure_seconds * 1000.0
    }

    pub fn analog_gain(&self) -> AnalogGain {
        self.analog_gain
    }

    pub fn amplifier_quality(&self) -> AdcQuality {
        self.amplifier_quality
    }

    pub fn adc_speed_mhz(&self) -> f64 {
        self.adc_speed_mhz
    }
}

/// Camera parameters touched by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    ExposureTime,
    AdcAnalogGain,
    AdcQuality,
    AdcSpeed,
    AdcBitDepth,
    SensorTemperatureReading,
}

impl ParameterKind {
    /// Order in which acquisition settings are applied.
    pub const APPLY_ORDER: [ParameterKind; 4] = [
        ParameterKind::ExposureTime,
        ParameterKind::AdcAnalogGain,
        ParameterKind::AdcQuality,
        ParameterKind::AdcSpeed,
    ];
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ParameterKind::ExposureTime => "exposure time",
            ParameterKind::AdcAnalogGain => "analog gain",
            ParameterKind::AdcQuality => "amplifier quality",
            ParameterKind::AdcSpeed => "ADC speed",
            ParameterKind::AdcBitDepth => "ADC bit depth",
            ParameterKind::SensorTemperatureReading => "sensor temperature",
        };
        write!(f, "{}", label)
    }
}

// =============================================================================
// Acquisition results
// =============================================================================

/// Bit set of acquisition failures reported with a readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcquisitionErrorsMask(pub u32);

impl AcquisitionErrorsMask {
    pub const NONE: AcquisitionErrorsMask = AcquisitionErrorsMask(0);
    pub const DATA_LOST: AcquisitionErrorsMask = AcquisitionErrorsMask(0x1);
    pub const CONNECTION_LOST: AcquisitionErrorsMask = AcquisitionErrorsMask(0x2);
    pub const DATA_NOT_ARRIVING: AcquisitionErrorsMask = AcquisitionErrorsMask(0x4);
    pub const SHUTTER_OVERHEATED: AcquisitionErrorsMask = AcquisitionErrorsMask(0x8);
    pub const CAMERA_FAULTED: AcquisitionErrorsMask = AcquisitionErrorsMask(0x10);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: AcquisitionErrorsMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for AcquisitionErrorsMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        AcquisitionErrorsMask(self.0 | rhs.0)
    }
}

impl fmt::Display for AcquisitionErrorsMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names = [
            (Self::DATA_LOST, "data_lost"),
            (Self::CONNECTION_LOST, "connection_lost"),
            (Self::DATA_NOT_ARRIVING, "data_not_arriving"),
            (Self::SHUTTER_OVERHEATED, "shutter_overheated"),
            (Self::CAMERA_FAULTED, "camera_faulted"),
        ];
        let mut known = 0u32;
        let mut parts = Vec::new();
        for (flag, name) in names {
            if self.contains(flag) {
                parts.push(name.to_string());
                known |= flag.0;
            }
        }
        let unknown = self.0 & !known;
        if unknown != 0 {
            parts.push(format!("{:#x}", unknown));
        }
        write!(f, "{}", parts.join("|"))
    }
}

/// Device state snapshot taken right after a readout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub exposure_seconds: f64,
    pub adc_speed_mhz: f64,
    pub sensor_temp_c: f64,
    pub bit_depth: i32,
    pub gain: i32,
    pub amplifier: i32,
    pub identity: DeviceIdentity,
}

/// Library version as reported by the SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkVersion {
    pub major: i32,
    pub minor: i32,
    pub distribution: i32,
    pub released: i32,
}

impl fmt::Display for SdkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.distribution, self.released
        )
    }
}

//! `daq-core`
//!
//! Core types shared by the picam-daq crates.
//!
//! ## Key Types
//!
//! - [`DeviceIdentity`] / [`DeviceHandle`]: which camera, and an open session on it
//! - [`AcquisitionConfig`]: validated exposure, gain, amplifier and ADC speed
//! - [`FrameBuffer`]: one row-major 16-bit frame
//! - [`FrameMetadata`]: device state captured right after a readout
//! - [`DaqError`]: the pipeline's error taxonomy

pub mod camera;
pub mod data;
pub mod error;
pub mod limits;

pub use camera::{
    AcquisitionConfig, AcquisitionErrorsMask, AdcQuality, AnalogGain, DeviceDescriptor,
    DeviceHandle, DeviceIdentity, FrameMetadata, InterfaceKind, ModelId, ParameterKind,
    SdkVersion,
};
pub use data::FrameBuffer;
pub use error::{AppResult, DaqError, FitsStage, SdkError, SdkErrorKind};

//! Custom error types for the acquisition pipeline.
//!
//! `DaqError` is the one error type every pipeline stage returns. Using
//! `thiserror`, it keeps the failure categories of a single acquisition
//! distinct so that a caller (a script, the CLI) can tell which step failed:
//!
//! - **SDK protocol errors** (`Sdk`, `ParameterSet`, `CommitFailed`,
//!   `AcquisitionFailed`, `LibraryNotInitialized`, `UnknownHandle`): the device
//!   library reported a non-success code. Never retried internally.
//! - **Input validation errors** (`InputTooLong`, `InvalidInput`): rejected
//!   before any device interaction.
//! - **Postcondition errors** (`UnexpectedFrameCount`): the device returned a
//!   readout count other than one.
//! - **File errors** (`Fits`, `Io`): the image file could not be created or
//!   written. Each carries the codec's own diagnostic text.
//! - **Configuration errors** (`Configuration`): semantic validation of
//!   loaded settings.
//!
//! Vendor status codes are mapped exactly once, at the SDK boundary, into the
//! closed [`SdkErrorKind`] enumeration.

use crate::camera::{AcquisitionErrorsMask, ParameterKind};
use thiserror::Error;

// =============================================================================
// SDK Errors
// =============================================================================

/// Failure categories reported by the camera library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkErrorKind {
    /// The library has not been initialized.
    LibraryNotInitialized,
    /// `initialize` was refused (driver missing, already in use by another process).
    InitializationFailed,
    /// No camera matched the requested identity.
    CameraNotFound,
    /// The camera is already open in this or another process.
    CameraAlreadyOpened,
    /// The handle does not refer to an open camera.
    InvalidHandle,
    /// The camera does not support the parameter.
    ParameterDoesNotExist,
    /// The value lies outside the parameter's constraint.
    ParameterValueOutOfRange,
    /// The parameter is read-only.
    ParameterIsReadOnly,
    /// An acquisition is already running on the handle.
    AcquisitionInProgress,
    /// The camera stopped responding or was unplugged.
    CameraFaulted,
    /// The readout did not complete in the requested time.
    TimeOut,
    /// Any status code without a dedicated category.
    Unexpected,
}

impl std::fmt::Display for SdkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SdkErrorKind::LibraryNotInitialized => "library_not_initialized",
            SdkErrorKind::InitializationFailed => "initialization_failed",
            SdkErrorKind::CameraNotFound => "camera_not_found",
            SdkErrorKind::CameraAlreadyOpened => "camera_already_opened",
            SdkErrorKind::InvalidHandle => "invalid_handle",
            SdkErrorKind::ParameterDoesNotExist => "parameter_does_not_exist",
            SdkErrorKind::ParameterValueOutOfRange => "parameter_value_out_of_range",
            SdkErrorKind::ParameterIsReadOnly => "parameter_is_read_only",
            SdkErrorKind::AcquisitionInProgress => "acquisition_in_progress",
            SdkErrorKind::CameraFaulted => "camera_faulted",
            SdkErrorKind::TimeOut => "time_out",
            SdkErrorKind::Unexpected => "unexpected",
        };
        write!(f, "{}", label)
    }
}

/// Structured error returned by a camera SDK backend call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("SDK '{operation}' {kind} error: {message}")]
pub struct SdkError {
    pub operation: &'static str,
    pub kind: SdkErrorKind,
    pub message: String,
}

impl SdkError {
    pub fn new(operation: &'static str, kind: SdkErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
        }
    }
}

// =============================================================================
// FITS stage
// =============================================================================

/// Step of the file persister that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitsStage {
    CreateFile,
    CreateImage,
    WriteBody,
}

impl std::fmt::Display for FitsStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FitsStage::CreateFile => "Could not create FITS file",
            FitsStage::CreateImage => "Could not create image",
            FitsStage::WriteBody => "Could not copy data over",
        };
        write!(f, "{}", label)
    }
}

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for the acquisition pipeline.
#[derive(Error, Debug)]
pub enum DaqError {
    /// A camera library call returned a non-success status.
    #[error(transparent)]
    Sdk(#[from] SdkError),

    /// The library must be started before listing or opening cameras.
    #[error("Camera library is not initialized; call start() first")]
    LibraryNotInitialized,

    /// The handle was never opened, or was already closed.
    #[error("Unknown device handle {0}")]
    UnknownHandle(u64),

    /// Writing one acquisition parameter failed.
    ///
    /// Parameters after `parameter` in the fixed order were not applied.
    /// `rejected` lists what the device refused in the follow-up commit.
    #[error("Failed to set {parameter}: {source}")]
    ParameterSet {
        parameter: ParameterKind,
        rejected: Vec<ParameterKind>,
        #[source]
        source: SdkError,
    },

    /// The device refused to commit staged parameters.
    #[error("Failed to commit {parameter} to camera device (rejected: {rejected:?})")]
    CommitFailed {
        parameter: ParameterKind,
        rejected: Vec<ParameterKind>,
    },

    /// The readout ended with a non-empty acquisition error mask.
    #[error("Acquisition failed with error mask {mask}")]
    AcquisitionFailed { mask: AcquisitionErrorsMask },

    /// The device returned a readout count other than the one requested.
    #[error("Unexpected frame count: expected {expected}, got {actual}")]
    UnexpectedFrameCount { expected: u64, actual: u64 },

    /// A bounded identity string exceeded its fixed length.
    #[error("{field} string length {len} is too large (max {max})")]
    InputTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// A caller-supplied value failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The FITS codec reported a failure while persisting a frame.
    #[error("{stage}: status {status} - {diagnostic}")]
    Fits {
        stage: FitsStage,
        status: i32,
        diagnostic: String,
    },

    /// Standard I/O operation failed (e.g. creating the dated directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration validation failed.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Frame payload exceeds maximum allowed size.
    #[error("Frame dimensions {width}x{height} exceed maximum {max_dimension} per dimension")]
    FrameDimensionsTooLarge {
        width: u32,
        height: u32,
        max_dimension: u32,
    },

    /// Calculating a size overflowed usize.
    #[error("Size overflow while computing {context}")]
    SizeOverflow { context: &'static str },
}

impl DaqError {
    /// True for errors raised before any device interaction.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            DaqError::InputTooLong { .. } | DaqError::InvalidInput(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdk_error_display() {
        let err = DaqError::Sdk(SdkError::new(
            "open_camera",
            SdkErrorKind::CameraNotFound,
            "no camera with serial 1234",
        ));
        assert_eq!(
            err.to_string(),
            "SDK 'open_camera' camera_not_found error: no camera with serial 1234"
        );
    }

    #[test]
    fn test_parameter_set_names_step() {
        let err = DaqError::ParameterSet {
            parameter: ParameterKind::ExposureTime,
            rejected: vec![],
            source: SdkError::new(
                "set_float",
                SdkErrorKind::ParameterValueOutOfRange,
                "exposure",
            ),
        };
        assert!(err.to_string().starts_with("Failed to set exposure time"));
    }

    #[test]
    fn test_fits_error_carries_diagnostic() {
        let err = DaqError::Fits {
            stage: FitsStage::CreateFile,
            status: 105,
            diagnostic: "couldn't create the named file".into(),
        };
        let text = err.to_string();
        assert!(text.contains("Could not create FITS file"));
        assert!(text.contains("105"));
        assert!(text.contains("couldn't create the named file"));
    }

    #[test]
    fn test_input_error_classification() {
        let err = DaqError::InputTooLong {
            field: "Serial number",
            len: 80,
            max: 64,
        };
        assert!(err.is_input_error());
        assert!(!DaqError::LibraryNotInitialized.is_input_error());
    }

    #[test]
    fn test_frame_count_display() {
        let err = DaqError::UnexpectedFrameCount {
            expected: 1,
            actual: 2,
        };
        assert_eq!(err.to_string(), "Unexpected frame count: expected 1, got 2");
    }
}

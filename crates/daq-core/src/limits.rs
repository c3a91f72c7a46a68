//! Shared hard limits for identity strings and frame sizes.
//!
//! This module centralizes:
//! - Fixed buffer sizes of the camera SDK's identity strings
//! - Default and maximum frame geometry
//!
//! Frame sizing is checked with overflow-safe arithmetic before any buffer is
//! allocated.

use crate::error::DaqError;

// =============================================================================
// SDK string sizes
// =============================================================================

/// Size of the SDK's sensor name buffer, including the terminating NUL.
pub const SENSOR_NAME_MAX_LEN: usize = 64;

/// Size of the SDK's serial number buffer, including the terminating NUL.
pub const SERIAL_NUMBER_MAX_LEN: usize = 64;

// =============================================================================
// Frame geometry
// =============================================================================

/// Default sensor width of the supported cameras.
pub const DEFAULT_FRAME_WIDTH: u32 = 2048;
/// Default sensor height of the supported cameras.
pub const DEFAULT_FRAME_HEIGHT: u32 = 2048;

/// Maximum allowed frame payload in bytes (default: 100MB).
pub const MAX_FRAME_BYTES: usize = 100 * 1024 * 1024;
/// Maximum supported width/height for frames.
pub const MAX_FRAME_DIMENSION: u32 = 65_536;

/// Validated frame sizing information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub pixels: usize,
    pub bytes: usize,
}

/// Validate frame dimensions and calculate pixel/byte sizes safely.
pub fn validate_frame_size(
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Result<FrameSize, DaqError> {
    if width == 0 || height == 0 {
        return Err(DaqError::InvalidInput(format!(
            "frame dimensions must be non-zero, got {}x{}",
            width, height
        )));
    }
    if width > MAX_FRAME_DIMENSION || height > MAX_FRAME_DIMENSION {
        return Err(DaqError::FrameDimensionsTooLarge {
            width,
            height,
            max_dimension: MAX_FRAME_DIMENSION,
        });
    }

    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or(DaqError::SizeOverflow {
            context: "frame pixel count",
        })?;

    let bytes = pixels
        .checked_mul(bytes_per_pixel)
        .ok_or(DaqError::SizeOverflow {
            context: "frame byte size",
        })?;

    if bytes > MAX_FRAME_BYTES {
        return Err(DaqError::InvalidInput(format!(
            "frame of {} bytes exceeds maximum {}",
            bytes, MAX_FRAME_BYTES
        )));
    }

    Ok(FrameSize { pixels, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_frame_fits() {
        let size = validate_frame_size(DEFAULT_FRAME_WIDTH, DEFAULT_FRAME_HEIGHT, 2).unwrap();
        assert_eq!(size.pixels, 2048 * 2048);
        assert_eq!(size.bytes, 2048 * 2048 * 2);
    }

    #[test]
    fn rejects_zero_and_oversized() {
        assert!(validate_frame_size(0, 10, 2).is_err());
        assert!(matches!(
            validate_frame_size(MAX_FRAME_DIMENSION + 1, 1, 2),
            Err(DaqError::FrameDimensionsTooLarge { .. })
        ));
        assert!(validate_frame_size(MAX_FRAME_DIMENSION, MAX_FRAME_DIMENSION, 2).is_err());
    }
}

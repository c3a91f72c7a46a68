use crate::error::{AppResult, DaqError};
use crate::limits::validate_frame_size;

/// A single 16-bit camera frame.
///
/// Pixels are stored row-major, `width` pixels per row. The buffer length is
/// checked against the dimensions when the frame is built, so every
/// `FrameBuffer` in circulation satisfies `pixels.len() == width * height`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u16>,
}

impl FrameBuffer {
    /// Wrap a readout buffer, checking its length against the dimensions.
    pub fn from_u16(width: u32, height: u32, pixels: Vec<u16>) -> AppResult<Self> {
        let size = validate_frame_size(width, height, 2)?;
        if pixels.len() != size.pixels {
            return Err(DaqError::InvalidInput(format!(
                "frame buffer holds {} pixels, expected {} for {}x{}",
                pixels.len(),
                size.pixels,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u16> {
        self.pixels
    }

    /// Pixel at (`row`, `col`), or `None` when out of bounds.
    pub fn get(&self, row: u32, col: u32) -> Option<u16> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let idx = row as usize * self.width as usize + col as usize;
        self.pixels.get(idx).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_length_mismatch() {
        assert!(FrameBuffer::from_u16(4, 4, vec![0; 15]).is_err());
        assert!(FrameBuffer::from_u16(4, 4, vec![0; 16]).is_ok());
    }

    #[test]
    fn row_major_indexing() {
        let pixels: Vec<u16> = (0..12).collect();
        let frame = FrameBuffer::from_u16(4, 3, pixels).unwrap();
        assert_eq!(frame.get(0, 0), Some(0));
        assert_eq!(frame.get(1, 0), Some(4));
        assert_eq!(frame.get(2, 3), Some(11));
        assert_eq!(frame.get(3, 0), None);
        assert_eq!(frame.get(0, 4), None);
    }
}

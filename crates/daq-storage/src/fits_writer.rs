//! FITS persistence for acquired frames.
//!
//! [`FitsPersister`] turns one [`FrameBuffer`] plus its [`FrameMetadata`] into
//! a dated FITS file under the configured base directory.
//!
//! # Header
//!
//! After the mandatory image keywords the header carries, in order:
//!
//! | Key      | Type   | Content                                  |
//! |----------|--------|------------------------------------------|
//! | BZERO    | int    | 32768 (unsigned encoding only)           |
//! | BSCALE   | int    | 1 (unsigned encoding only)               |
//! | EXPTIME  | float  | exposure time in s                       |
//! | ADCSPEED | float  | readout speed in MHz                     |
//! | TEMP     | float  | sensor temperature in C                  |
//! | BITDEPTH | int    | ADC bit depth                            |
//! | GAIN_SET | int    | 1 low, 2 medium, 3 high                  |
//! | ADC      | int    | 1 low noise, 2 high capacity             |
//! | MODEL    | int    | camera model id                          |
//! | INTERFC  | int    | computer interface id                    |
//! | SNSR_NM  | string | sensor name                              |
//! | SER_NO   | string | serial number                            |
//! | DATE-OBS | string | acquisition time, ISO-8601 UTC           |
//!
//! # Usage
//!
//! ```rust,no_run
//! use daq_storage::fits_writer::{FitsPersister, PersistConfig};
//! # use daq_core::{AppResult, FrameBuffer, FrameMetadata};
//! # fn demo(frame: &FrameBuffer, md: &FrameMetadata) -> AppResult<()> {
//! let persister = FitsPersister::new(PersistConfig::new("/data/sedm"));
//! let path = persister.persist(frame, md, &chrono::Local::now())?;
//! println!("wrote {}", path.display());
//! # Ok(())
//! # }
//! ```

use crate::fits::{Bitpix, FitsError, FitsFile};
use crate::layout;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use daq_core::limits::{DEFAULT_FRAME_HEIGHT, DEFAULT_FRAME_WIDTH};
use daq_core::{AppResult, DaqError, FitsStage, FrameBuffer, FrameMetadata};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How unsigned 16-bit pixels are stored in the signed FITS body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelEncoding {
    /// `BZERO = 32768`, full 0..=65535 range preserved.
    #[default]
    UnsignedOffset,
    /// Raw signed storage; values above 32767 are clipped.
    Signed,
}

/// Immutable persister settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistConfig {
    pub base_dir: PathBuf,
    pub extension: String,
    pub width: u32,
    pub height: u32,
    pub encoding: PixelEncoding,
}

impl PersistConfig {
    /// Defaults for a 2048 x 2048 sensor writing `.fits` files.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            extension: "fits".to_string(),
            width: DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
            encoding: PixelEncoding::UnsignedOffset,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_encoding(mut self, encoding: PixelEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

/// Writes frames to dated FITS files.
#[derive(Debug, Clone)]
pub struct FitsPersister {
    config: PersistConfig,
}

fn fits_err(stage: FitsStage) -> impl FnOnce(FitsError) -> DaqError {
    move |e| {
        tracing::error!(status = e.status(), diagnostic = e.diagnostic(), "{}", stage);
        DaqError::Fits {
            stage,
            status: e.status(),
            diagnostic: e.diagnostic().to_string(),
        }
    }
}

impl FitsPersister {
    pub fn new(config: PersistConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    /// Path a frame taken at `timestamp` would be written to.
    pub fn path_for<Tz: TimeZone>(&self, timestamp: &DateTime<Tz>) -> PathBuf {
        layout::frame_path(
            &self.config.base_dir,
            &self.config.extension,
            &timestamp.naive_local(),
        )
    }

    /// Write `frame` with `metadata` and return the file path.
    ///
    /// The dated directory is created when missing and an existing file at
    /// the same path is replaced. Directory and file names use the wall-clock
    /// time of `timestamp`; `DATE-OBS` is written in UTC.
    pub fn persist<Tz: TimeZone>(
        &self,
        frame: &FrameBuffer,
        metadata: &FrameMetadata,
        timestamp: &DateTime<Tz>,
    ) -> AppResult<PathBuf> {
        if frame.width() != self.config.width || frame.height() != self.config.height {
            return Err(DaqError::InvalidInput(format!(
                "frame is {}x{}, persister expects {}x{}",
                frame.width(),
                frame.height(),
                self.config.width,
                self.config.height
            )));
        }

        let path = self.path_for(timestamp);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                tracing::error!(
                    dir = %dir.display(),
                    error = %e,
                    "Could not create output directory"
                );
                DaqError::Io(e)
            })?;
        }

        let date_obs = timestamp
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        self.write_file(&path, frame, metadata, &date_obs)?;

        tracing::info!(
            path = %path.display(),
            dimensions = format!("{}x{}", frame.width(), frame.height()),
            "Wrote FITS frame"
        );
        Ok(path)
    }

    fn write_file(
        &self,
        path: &Path,
        frame: &FrameBuffer,
        md: &FrameMetadata,
        date_obs: &str,
    ) -> AppResult<()> {
        let mut fits = FitsFile::create(path, true).map_err(fits_err(FitsStage::CreateFile))?;

        self.write_header(&mut fits, md, date_obs)
            .map_err(fits_err(FitsStage::CreateImage))?;

        write_body(&mut fits, path, frame.pixels())?;
        fits.close().map_err(fits_err(FitsStage::WriteBody))
    }

    fn write_header(
        &self,
        fits: &mut FitsFile,
        md: &FrameMetadata,
        date_obs: &str,
    ) -> Result<(), FitsError> {
        fits.create_image(
            self.config.width as usize,
            self.config.height as usize,
            Bitpix::Short,
        )?;
        if self.config.encoding == PixelEncoding::UnsignedOffset {
            fits.write_key("BZERO", 32768, "offset data range to that of unsigned short")?;
            fits.write_key("BSCALE", 1, "default scaling factor")?;
            fits.set_scale_offset(1.0, 32768.0)?;
        }

        let id = &md.identity;
        fits.write_key("EXPTIME", md.exposure_seconds, "Exposure time in s")?;
        fits.write_key("ADCSPEED", md.adc_speed_mhz, "Readout speed in MHz")?;
        fits.write_key("TEMP", md.sensor_temp_c, "Sensor temperature in C")?;
        fits.write_key("BITDEPTH", md.bit_depth, "Bit depth")?;
        fits.write_key("GAIN_SET", md.gain, "Gain 1: low, 2: medium, 3: high")?;
        fits.write_key("ADC", md.amplifier, "1: Low noise, 2: high capacity")?;
        fits.write_key("MODEL", id.model().0, "PI Model #")?;
        fits.write_key("INTERFC", id.interface().0, "PI Computer Interface")?;
        fits.write_key("SNSR_NM", id.sensor_name(), "PI sensor name")?;
        fits.write_key("SER_NO", id.serial_number(), "PI serial #")?;
        fits.write_key("DATE-OBS", date_obs, "UTC time of acquisition")?;
        Ok(())
    }
}

/// Write all pixels from element 1. Clipping is logged, not returned.
fn write_body(fits: &mut FitsFile, path: &Path, pixels: &[u16]) -> AppResult<()> {
    match fits.write_image_u16(1, pixels) {
        Ok(()) => Ok(()),
        Err(e) if e.is_overflow() => {
            tracing::warn!(
                path = %path.display(),
                diagnostic = e.diagnostic(),
                "Pixel values clipped while writing image"
            );
            Ok(())
        }
        Err(e) => Err(fits_err(FitsStage::WriteBody)(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::FitsReader;
    use daq_core::{DeviceIdentity, InterfaceKind, ModelId};
    use tempfile::tempdir;

    fn metadata() -> FrameMetadata {
        FrameMetadata {
            exposure_seconds: 2.5,
            adc_speed_mhz: 2.0,
            sensor_temp_c: -70.0,
            bit_depth: 16,
            gain: 3,
            amplifier: 1,
            identity: DeviceIdentity::new(InterfaceKind::USB2, ModelId(1206), "KAF-4320", "0912345")
                .unwrap(),
        }
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap()
    }

    #[test]
    fn header_order_and_values() {
        let dir = tempdir().unwrap();
        let persister =
            FitsPersister::new(PersistConfig::new(dir.path()).with_dimensions(4, 2));
        let frame = FrameBuffer::from_u16(4, 2, vec![7; 8]).unwrap();
        let path = persister.persist(&frame, &metadata(), &ts()).unwrap();

        let reader = FitsReader::open(&path).unwrap();
        assert_eq!(
            reader.keys(),
            vec![
                "SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "EXTEND", "BZERO", "BSCALE",
                "EXPTIME", "ADCSPEED", "TEMP", "BITDEPTH", "GAIN_SET", "ADC", "MODEL",
                "INTERFC", "SNSR_NM", "SER_NO", "DATE-OBS",
            ]
        );
        assert_eq!(reader.int("NAXIS1"), Some(4));
        assert_eq!(reader.int("NAXIS2"), Some(2));
        assert_eq!(reader.float("EXPTIME"), Some(2.5));
        assert_eq!(reader.float("TEMP"), Some(-70.0));
        assert_eq!(reader.int("GAIN_SET"), Some(3));
        assert_eq!(reader.int("ADC"), Some(1));
        assert_eq!(reader.int("MODEL"), Some(1206));
        assert_eq!(reader.text("SNSR_NM"), Some("KAF-4320"));
        assert_eq!(reader.text("DATE-OBS"), Some("2024-03-07T14:05:09Z"));
        assert_eq!(reader.pixels(), &[7; 8]);
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let dir = tempdir().unwrap();
        let persister = FitsPersister::new(PersistConfig::new(dir.path()).with_dimensions(4, 4));
        let frame = FrameBuffer::from_u16(2, 2, vec![0; 4]).unwrap();
        let err = persister.persist(&frame, &metadata(), &ts()).unwrap_err();
        assert!(matches!(err, DaqError::InvalidInput(_)));
    }

    #[test]
    fn oversized_header_value_maps_to_image_stage() {
        let dir = tempdir().unwrap();
        let persister = FitsPersister::new(PersistConfig::new(dir.path()).with_dimensions(2, 2));
        let mut md = metadata();
        // Quotes are doubled on the card, so 40 of them need 80 columns.
        md.identity =
            DeviceIdentity::new(InterfaceKind::USB2, ModelId(1206), "KAF", "'".repeat(40)).unwrap();

        let frame = FrameBuffer::from_u16(2, 2, vec![0; 4]).unwrap();
        let err = persister.persist(&frame, &md, &ts()).unwrap_err();
        match err {
            DaqError::Fits { stage, status, .. } => {
                assert_eq!(stage, FitsStage::CreateImage);
                assert_eq!(status, crate::fits::status::VALUE_TOO_LONG);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn body_failure_maps_to_write_stage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("body.fits");
        let mut fits = FitsFile::create(&path, true).unwrap();
        fits.create_image(2, 2, Bitpix::Short).unwrap();

        let err = write_body(&mut fits, &path, &[0; 5]).unwrap_err();
        match err {
            DaqError::Fits { stage, status, .. } => {
                assert_eq!(stage, FitsStage::WriteBody);
                assert_eq!(status, crate::fits::status::BAD_DIMEN);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn body_overflow_is_not_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.fits");
        let mut fits = FitsFile::create(&path, true).unwrap();
        fits.create_image(2, 1, Bitpix::Short).unwrap();

        write_body(&mut fits, &path, &[1, 40000]).unwrap();
        fits.close().unwrap();
        assert_eq!(FitsReader::open(&path).unwrap().pixels(), &[1, 32767]);
    }

    #[test]
    fn create_failure_maps_to_create_stage() {
        let dir = tempdir().unwrap();
        let persister = FitsPersister::new(PersistConfig::new(dir.path()).with_dimensions(2, 2));
        // A directory where the file should go makes file creation fail.
        let target = persister.path_for(&ts());
        std::fs::create_dir_all(&target).unwrap();

        let frame = FrameBuffer::from_u16(2, 2, vec![0; 4]).unwrap();
        let err = persister.persist(&frame, &metadata(), &ts()).unwrap_err();
        match err {
            DaqError::Fits { stage, status, .. } => {
                assert_eq!(stage, FitsStage::CreateFile);
                assert_eq!(status, crate::fits::status::FILE_NOT_CREATED);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

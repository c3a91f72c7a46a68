//! Configuration System using Figment
//!
//! Settings are layered, later sources winning:
//! 1. built-in defaults
//! 2. `config/picam.toml`, or the file given with `--config`
//! 3. environment variables prefixed `PICAM_DAQ_`, with `__` between
//!    section and key (`PICAM_DAQ_STORAGE__OUTPUT_DIR=/data/frames`)
//!
//! # Example
//! ```no_run
//! use picam_daq::config::Settings;
//!
//! # fn main() -> anyhow::Result<()> {
//! let settings = Settings::load(None)?;
//! println!("Writing frames under {}", settings.storage.output_dir.display());
//! # Ok(())
//! # }
//! ```

use anyhow::Context;
use daq_core::limits::{validate_frame_size, MAX_FRAME_DIMENSION};
use daq_core::{AppResult, DaqError};
use daq_driver_picam::DriverOptions;
use daq_storage::{PersistConfig, PixelEncoding};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config/picam.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "PICAM_DAQ_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub application: ApplicationConfig,
    pub storage: StorageConfig,
    pub acquisition: AcquisitionSettings,
    pub scripting: ScriptingConfig,
    pub mock: MockConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, colored (development)
    #[default]
    Pretty,
    /// One line per event, no colors
    Compact,
    /// One JSON object per event (log aggregation)
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub name: String,
    /// trace, debug, info, warn or error; `RUST_LOG` overrides it
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "picam-daq".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
        }
    }
}

/// Where and how frames are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the dated output directories
    pub output_dir: PathBuf,
    /// File extension, without the dot
    pub extension: String,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    pub encoding: PixelEncoding,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let defaults = PersistConfig::new("data");
        Self {
            output_dir: defaults.base_dir,
            extension: defaults.extension,
            width: defaults.width,
            height: defaults.height,
            encoding: defaults.encoding,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Write the first readout when the device returns more or fewer than one.
    /// The acquisition is still reported as failed.
    pub persist_on_count_mismatch: bool,
    /// Readout timeout; absent means wait forever
    pub readout_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptingConfig {
    /// Rhai operations allowed per script run
    pub max_operations: u64,
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            max_operations: daq_scripting::DEFAULT_MAX_OPERATIONS,
        }
    }
}

/// Simulated camera library, used when no PICam SDK is compiled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    pub sensor_width: u32,
    pub sensor_height: u32,
    /// Number of simulated cameras attached
    pub cameras: u32,
}

impl Default for MockConfig {
    fn default() -> Self {
        let storage = StorageConfig::default();
        Self {
            sensor_width: storage.width,
            sensor_height: storage.height,
            cameras: 1,
        }
    }
}

impl Settings {
    /// Load and validate settings.
    ///
    /// With `path = None` the default config file is used if it exists. An
    /// explicit path must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(p) => {
                anyhow::ensure!(p.is_file(), "Config file not found: {}", p.display());
                p.to_path_buf()
            }
            None => PathBuf::from(DEFAULT_CONFIG_PATH),
        };

        let settings: Settings = Self::figment(&file)
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", file.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Provider chain behind [`Settings::load`].
    pub fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Check constraints serde cannot express.
    pub fn validate(&self) -> AppResult<()> {
        let level = self.application.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        let ext = &self.storage.extension;
        if ext.is_empty() || ext.contains(['/', '\\', '.']) {
            return Err(DaqError::Configuration(format!(
                "Invalid storage extension '{}'. Give the bare extension, e.g. 'fits'",
                ext
            )));
        }

        validate_frame_size(self.storage.width, self.storage.height, 2).map_err(|e| {
            DaqError::Configuration(format!("storage frame size: {}", e))
        })?;

        if self.scripting.max_operations == 0 {
            return Err(DaqError::Configuration(
                "scripting.max_operations must be greater than zero".to_string(),
            ));
        }

        if self.acquisition.readout_timeout_ms == Some(0) {
            return Err(DaqError::Configuration(
                "acquisition.readout_timeout_ms must be positive; omit it to wait forever"
                    .to_string(),
            ));
        }

        let mock = &self.mock;
        if mock.sensor_width == 0
            || mock.sensor_height == 0
            || mock.sensor_width > MAX_FRAME_DIMENSION
            || mock.sensor_height > MAX_FRAME_DIMENSION
        {
            return Err(DaqError::Configuration(format!(
                "Invalid mock sensor size {}x{}",
                mock.sensor_width, mock.sensor_height
            )));
        }
        if mock.cameras > 99 {
            return Err(DaqError::Configuration(format!(
                "mock.cameras must be at most 99, got {}",
                mock.cameras
            )));
        }

        Ok(())
    }

    pub fn persist_config(&self) -> PersistConfig {
        PersistConfig::new(&self.storage.output_dir)
            .with_dimensions(self.storage.width, self.storage.height)
            .with_encoding(self.storage.encoding)
            .with_extension(self.storage.extension.clone())
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            persist_on_count_mismatch: self.acquisition.persist_on_count_mismatch,
            readout_timeout: self.acquisition.readout_timeout_ms.map(Duration::from_millis),
        }
    }
}

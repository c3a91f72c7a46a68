//! CLI Entry Point for picam-daq
//!
//! # Usage
//!
//! Run an acquisition script:
//! ```bash
//! picam-daq run demos/acquire.rhai
//! ```
//!
//! List attached cameras:
//! ```bash
//! picam-daq list --json
//! ```
//!
//! Take one frame without a script:
//! ```bash
//! picam-daq snap --exptime 0.5 --gain 2 --amplifier 1 --adcspeed 2.0
//! ```
//!
//! Results go to stdout, logs to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daq_core::{AcquisitionConfig, AdcQuality, AnalogGain};
use daq_scripting::{rhai, RhaiEngine, ScriptEngine};
use parking_lot::Mutex;
use picam_daq::config::Settings;
use picam_daq::{build_driver, tracing_init};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "picam-daq")]
#[command(about = "Scripted PICam acquisition to FITS files", long_about = None)]
struct Cli {
    /// Config file (default: config/picam.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Rhai script
    Run {
        /// Path to .rhai script file
        script: PathBuf,
    },

    /// Open and list every attached camera
    List {
        /// Print a JSON array instead of tab-separated lines
        #[arg(long)]
        json: bool,
    },

    /// Configure one camera and take a single frame
    Snap {
        /// Exposure time in seconds
        #[arg(long)]
        exptime: f64,
        /// Analog gain: 1 low, 2 medium, 3 high
        #[arg(long, default_value_t = 2)]
        gain: i64,
        /// Amplifier: 1 low noise, 2 high capacity
        #[arg(long, default_value_t = 1)]
        amplifier: i64,
        /// ADC speed in MHz
        #[arg(long, default_value_t = 2.0)]
        adcspeed: f64,
        /// Position of the camera in `list` output
        #[arg(long, default_value_t = 0)]
        camera: usize,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())?;
    tracing_init::init_from_settings(&settings)?;
    tracing::debug!(app = %settings.application.name, "Configuration loaded");

    match cli.command {
        Commands::Run { script } => run_script(&settings, script).await,
        Commands::List { json } => {
            tokio::task::spawn_blocking(move || list_cameras(&settings, json)).await?
        }
        Commands::Snap {
            exptime,
            gain,
            amplifier,
            adcspeed,
            camera,
        } => {
            let config = AcquisitionConfig::new(
                exptime,
                AnalogGain::try_from(gain)?,
                AdcQuality::try_from(amplifier)?,
                adcspeed,
            )?;
            tokio::task::spawn_blocking(move || snap(&settings, &config, camera)).await?
        }
        Commands::Config => {
            let text = toml::to_string_pretty(&settings).context("Failed to render configuration")?;
            print!("{}", text);
            Ok(())
        }
    }
}

async fn run_script(settings: &Settings, script_path: PathBuf) -> Result<()> {
    let script = tokio::fs::read_to_string(&script_path)
        .await
        .with_context(|| format!("Failed to read script {}", script_path.display()))?;

    let session = Arc::new(Mutex::new(build_driver(settings)?));
    let mut engine = RhaiEngine::with_limit(session, settings.scripting.max_operations)?;
    engine.validate_script(&script).await?;

    tracing::info!(script = %script_path.display(), "Executing script");
    let result = engine.execute_script(&script).await;
    match result {
        Ok(value) => {
            if let Some(text) = value.downcast_ref::<String>() {
                println!("{}", text);
            } else if let Some(dynamic) = value.downcast_ref::<rhai::Dynamic>() {
                println!("{}", dynamic);
            } else if !value.is::<()>() {
                println!("{:?}", value);
            }
            tracing::info!("Script completed");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Script failed");
            Err(e.into())
        }
    }
}

/// One `list` entry; same keys as the script-side device map.
#[derive(Serialize)]
struct CameraRow<'a> {
    handle: u64,
    interface: i32,
    model: i32,
    sensor: &'a str,
    serial: &'a str,
}

fn list_cameras(settings: &Settings, json: bool) -> Result<()> {
    let mut driver = build_driver(settings)?;
    let version = driver.start()?;
    tracing::info!(%version, "Camera library initialized");

    let devices = driver.list()?;
    let rows: Vec<CameraRow<'_>> = devices
        .iter()
        .map(|d| CameraRow {
            handle: d.handle.0,
            interface: d.identity.interface().0,
            model: d.identity.model().0,
            sensor: d.identity.sensor_name(),
            serial: d.identity.serial_number(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            println!(
                "{}\t{}\t{}\t{}\t{}",
                row.handle, row.interface, row.model, row.sensor, row.serial
            );
        }
    }
    driver.shutdown()?;
    Ok(())
}

fn snap(settings: &Settings, config: &AcquisitionConfig, camera: usize) -> Result<()> {
    let mut driver = build_driver(settings)?;
    driver.start()?;
    let devices = driver.list()?;
    let device = devices
        .get(camera)
        .with_context(|| format!("No camera at position {} ({} attached)", camera, devices.len()))?;

    let committed = driver.configure(device.handle, config)?;
    if !committed {
        tracing::warn!(handle = %device.handle, "Device reports uncommitted parameters");
    }
    let path = driver.acquire(device.handle)?;
    println!("{}", path.display());
    driver.shutdown()?;
    Ok(())
}

//! PICam Acquisition Logic
//!
//! One blocking readout per call. The device either returns the requested
//! frame or an acquisition error mask; nothing is retried.

use crate::sdk::{CameraSdk, NO_TIMEOUT};
use daq_core::{AppResult, DaqError, DeviceHandle, FrameBuffer, SdkError, SdkErrorKind};
use std::time::{Duration, Instant};

/// Readouts requested per acquisition.
pub const READOUTS_PER_ACQUISITION: u64 = 1;

/// Outcome of a single acquisition.
#[derive(Debug)]
pub enum Acquired {
    /// Exactly one readout came back.
    Frame(FrameBuffer),
    /// The device returned a different readout count. `first` holds the first
    /// readout when there was one.
    CountMismatch {
        actual: u64,
        first: Option<FrameBuffer>,
    },
}

impl Acquired {
    /// The single frame, or `UnexpectedFrameCount`.
    pub fn into_frame(self) -> AppResult<FrameBuffer> {
        match self {
            Acquired::Frame(frame) => Ok(frame),
            Acquired::CountMismatch { actual, .. } => Err(DaqError::UnexpectedFrameCount {
                expected: READOUTS_PER_ACQUISITION,
                actual,
            }),
        }
    }
}

fn timeout_ms(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => NO_TIMEOUT,
        Some(t) => i32::try_from(t.as_millis()).unwrap_or(i32::MAX),
    }
}

/// Trigger one readout on `handle` and wait for it.
///
/// `width`/`height` describe the expected frame; a readout of another size
/// is rejected. `timeout = None` waits forever.
pub fn acquire(
    sdk: &mut dyn CameraSdk,
    handle: DeviceHandle,
    width: u32,
    height: u32,
    timeout: Option<Duration>,
) -> AppResult<Acquired> {
    let started = Instant::now();
    let data = sdk
        .acquire(handle, READOUTS_PER_ACQUISITION, timeout_ms(timeout))
        .map_err(|e| {
            tracing::error!(%handle, error = %e, "Acquisition failed");
            DaqError::from(e)
        })?;

    if !data.errors.is_empty() {
        tracing::error!(%handle, mask = %data.errors, "Acquisition reported errors");
        return Err(DaqError::AcquisitionFailed { mask: data.errors });
    }

    let mut readouts = data.readouts.into_iter();
    let first = readouts
        .next()
        .map(|pixels| FrameBuffer::from_u16(width, height, pixels))
        .transpose()?;

    tracing::info!(
        %handle,
        readouts = data.readout_count,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Acquisition complete"
    );

    if data.readout_count != READOUTS_PER_ACQUISITION {
        tracing::error!(
            %handle,
            expected = READOUTS_PER_ACQUISITION,
            actual = data.readout_count,
            "Unexpected frame count"
        );
        return Ok(Acquired::CountMismatch {
            actual: data.readout_count,
            first,
        });
    }

    match first {
        Some(frame) => Ok(Acquired::Frame(frame)),
        None => {
            tracing::error!(%handle, "Device reported a readout but returned no pixel data");
            Err(DaqError::Sdk(SdkError::new(
                "acquire",
                SdkErrorKind::Unexpected,
                format!(
                    "device reported {} readout(s) but returned no pixel data",
                    data.readout_count
                ),
            )))
        }
    }
}

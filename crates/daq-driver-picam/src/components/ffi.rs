//! PICam library backend.
//!
//! Implements [`CameraSdk`] over the vendor C API from `picam-sys`. Vendor
//! status codes are turned into [`SdkErrorKind`] in [`check`] and nowhere else.
//!
//! Camera handles are raw pointers owned by the library; they are kept in a
//! table and exposed to the rest of the crate only as [`DeviceHandle`] tokens.
//!
//! The PICam library is process-global, so every `PicamSdk` reports the same
//! [`LibraryUsers`] counter.

#![allow(unsafe_code)]

use crate::sdk::{AvailableData, CameraSdk, CommitOutcome, LibraryUsers, SdkResult};
use daq_core::limits::{SENSOR_NAME_MAX_LEN, SERIAL_NUMBER_MAX_LEN};
use daq_core::{
    AcquisitionErrorsMask, DeviceHandle, DeviceIdentity, InterfaceKind, ModelId, ParameterKind,
    SdkError, SdkErrorKind, SdkVersion,
};
use picam_sys::*;
use std::collections::BTreeMap;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::sync::{Arc, OnceLock};

/// Connections using the process-wide PICam library.
static PICAM_USERS: OnceLock<Arc<LibraryUsers>> = OnceLock::new();

/// Text for a PICam error code.
fn error_string(err: PicamError) -> String {
    let mut text: *const pichar = std::ptr::null();
    // SAFETY: `text` is a valid out pointer; the library owns the returned
    // string until Picam_DestroyString.
    unsafe {
        if Picam_GetEnumerationString(PicamEnumeratedType_Error, err as piint, &mut text)
            != PicamError_None
            || text.is_null()
        {
            return format!("error {}", err);
        }
        let message = CStr::from_ptr(text).to_string_lossy().into_owned();
        Picam_DestroyString(text);
        format!("error {} - {}", err, message)
    }
}

/// Map a PICam status to `Ok` or a categorized [`SdkError`].
fn check(operation: &'static str, err: PicamError) -> SdkResult<()> {
    let kind = match err {
        PicamError_None => return Ok(()),
        PicamError_LibraryNotInitialized => SdkErrorKind::LibraryNotInitialized,
        PicamError_LibraryAlreadyInitialized => SdkErrorKind::InitializationFailed,
        PicamError_InvalidCameraID | PicamError_NoCamerasAvailable => SdkErrorKind::CameraNotFound,
        PicamError_CameraAlreadyOpened | PicamError_DeviceOpenElsewhere => {
            SdkErrorKind::CameraAlreadyOpened
        }
        PicamError_InvalidHandle => SdkErrorKind::InvalidHandle,
        PicamError_ParameterDoesNotExist => SdkErrorKind::ParameterDoesNotExist,
        PicamError_InvalidParameterValue => SdkErrorKind::ParameterValueOutOfRange,
        PicamError_ParameterValueIsReadOnly => SdkErrorKind::ParameterIsReadOnly,
        PicamError_AcquisitionInProgress => SdkErrorKind::AcquisitionInProgress,
        PicamError_DeviceCommunicationFailed | PicamError_DeviceDisconnected => {
            SdkErrorKind::CameraFaulted
        }
        PicamError_TimeOutOccurred => SdkErrorKind::TimeOut,
        _ => SdkErrorKind::Unexpected,
    };
    Err(SdkError::new(operation, kind, error_string(err)))
}

fn picam_parameter(parameter: ParameterKind) -> PicamParameter {
    match parameter {
        ParameterKind::ExposureTime => PicamParameter_ExposureTime,
        ParameterKind::AdcAnalogGain => PicamParameter_AdcAnalogGain,
        ParameterKind::AdcQuality => PicamParameter_AdcQuality,
        ParameterKind::AdcSpeed => PicamParameter_AdcSpeed,
        ParameterKind::AdcBitDepth => PicamParameter_AdcBitDepth,
        ParameterKind::SensorTemperatureReading => PicamParameter_SensorTemperatureReading,
    }
}

fn parameter_kind(parameter: PicamParameter) -> Option<ParameterKind> {
    [
        ParameterKind::ExposureTime,
        ParameterKind::AdcAnalogGain,
        ParameterKind::AdcQuality,
        ParameterKind::AdcSpeed,
        ParameterKind::AdcBitDepth,
        ParameterKind::SensorTemperatureReading,
    ]
    .into_iter()
    .find(|k| picam_parameter(*k) == parameter)
}

fn c_string(buf: &[c_char]) -> String {
    let bytes: Vec<u8> = buf
        .iter()
        .take_while(|c| **c != 0)
        .map(|c| *c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn copy_c_string(dst: &mut [c_char], src: &str) {
    // Identity strings are length-checked at construction.
    for (d, s) in dst.iter_mut().zip(src.bytes()) {
        *d = s as c_char;
    }
}

fn camera_id(identity: &DeviceIdentity) -> PicamCameraID {
    let mut id = PicamCameraID::default();
    id.model = identity.model().0 as PicamModel;
    id.computer_interface = identity.interface().0 as PicamComputerInterface;
    copy_c_string(&mut id.sensor_name[..SENSOR_NAME_MAX_LEN - 1], identity.sensor_name());
    copy_c_string(
        &mut id.serial_number[..SERIAL_NUMBER_MAX_LEN - 1],
        identity.serial_number(),
    );
    id
}

struct RawHandle(PicamHandle);

/// [`CameraSdk`] backed by the installed PICam library.
pub struct PicamSdk {
    handles: BTreeMap<DeviceHandle, RawHandle>,
    next_handle: u64,
}

// SAFETY: PICam handles may be used from any thread as long as calls on one
// handle are serialized, which `&mut self` on every mutating call enforces.
unsafe impl Send for PicamSdk {}

impl Default for PicamSdk {
    fn default() -> Self {
        Self::new()
    }
}

impl PicamSdk {
    pub fn new() -> Self {
        Self {
            handles: BTreeMap::new(),
            next_handle: 1,
        }
    }

    fn raw(&self, operation: &'static str, handle: DeviceHandle) -> SdkResult<PicamHandle> {
        self.handles.get(&handle).map(|h| h.0).ok_or_else(|| {
            SdkError::new(
                operation,
                SdkErrorKind::InvalidHandle,
                format!("handle {} is not open", handle),
            )
        })
    }

    fn size_parameter(
        &self,
        camera: PicamHandle,
        parameter: PicamParameter,
        name: &str,
    ) -> SdkResult<usize> {
        let mut value: piint = 0;
        // SAFETY: camera is an open handle; value is a valid out pointer.
        check("acquire", unsafe {
            Picam_GetParameterIntegerValue(camera, parameter, &mut value)
        })?;
        usize::try_from(value).map_err(|_| {
            SdkError::new("acquire", SdkErrorKind::Unexpected, format!("negative {}", name))
        })
    }

    /// Bytes between readouts and bytes of pixel data at the start of each.
    ///
    /// The stride also covers per-frame metadata (time stamps, frame
    /// tracking) when that is enabled, so pixels are sized by the frame size.
    fn readout_layout(&self, camera: PicamHandle) -> SdkResult<(usize, usize)> {
        let stride = self.size_parameter(camera, PicamParameter_ReadoutStride, "readout stride")?;
        let frame = self.size_parameter(camera, PicamParameter_FrameSize, "frame size")?;
        if frame > stride {
            return Err(SdkError::new(
                "acquire",
                SdkErrorKind::Unexpected,
                format!("frame size {} exceeds readout stride {}", frame, stride),
            ));
        }
        Ok((stride, frame))
    }
}

impl CameraSdk for PicamSdk {
    fn users(&self) -> Arc<LibraryUsers> {
        Arc::clone(PICAM_USERS.get_or_init(|| Arc::new(LibraryUsers::new())))
    }

    fn initialize_library(&mut self) -> SdkResult<()> {
        // SAFETY: no preconditions.
        check("initialize_library", unsafe { Picam_InitializeLibrary() })
    }

    fn is_library_initialized(&self) -> SdkResult<bool> {
        let mut inited: pibln = 0;
        // SAFETY: inited is a valid out pointer.
        check("is_library_initialized", unsafe {
            Picam_IsLibraryInitialized(&mut inited)
        })?;
        Ok(inited != 0)
    }

    fn uninitialize_library(&mut self) -> SdkResult<()> {
        self.handles.clear();
        // SAFETY: all handles from this library instance are dropped above.
        check("uninitialize_library", unsafe { Picam_UninitializeLibrary() })
    }

    fn version(&self) -> SdkResult<SdkVersion> {
        let (mut major, mut minor, mut distribution, mut released): (piint, piint, piint, piint) =
            (0, 0, 0, 0);
        // SAFETY: all four are valid out pointers.
        check("version", unsafe {
            Picam_GetVersion(&mut major, &mut minor, &mut distribution, &mut released)
        })?;
        Ok(SdkVersion {
            major,
            minor,
            distribution,
            released,
        })
    }

    fn available_cameras(&self) -> SdkResult<Vec<DeviceIdentity>> {
        let mut ids: *const PicamCameraID = std::ptr::null();
        let mut count: piint = 0;
        // SAFETY: ids/count are valid out pointers; the array is released with
        // Picam_DestroyCameraIDs below.
        check("available_cameras", unsafe {
            Picam_GetAvailableCameraIDs(&mut ids, &mut count)
        })?;
        if ids.is_null() || count <= 0 {
            return Ok(Vec::new());
        }

        // SAFETY: the library returned `count` contiguous ids at `ids`.
        let raw = unsafe { std::slice::from_raw_parts(ids, count as usize) };
        let cameras = raw
            .iter()
            .filter_map(|id| {
                let identity = DeviceIdentity::new(
                    InterfaceKind(id.computer_interface as i32),
                    ModelId(id.model as i32),
                    c_string(&id.sensor_name),
                    c_string(&id.serial_number),
                );
                match identity {
                    Ok(identity) => Some(identity),
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping camera with unusable identity");
                        None
                    }
                }
            })
            .collect();
        // SAFETY: ids came from Picam_GetAvailableCameraIDs and is not used after.
        unsafe {
            Picam_DestroyCameraIDs(ids);
        }
        Ok(cameras)
    }

    fn open_camera(&mut self, identity: &DeviceIdentity) -> SdkResult<DeviceHandle> {
        let id = camera_id(identity);
        let mut camera: PicamHandle = std::ptr::null_mut();
        // SAFETY: id is a fully initialized camera id; camera is a valid out pointer.
        check("open_camera", unsafe { Picam_OpenCamera(&id, &mut camera) })?;
        let handle = DeviceHandle(self.next_handle);
        self.next_handle = handle.0 + 1;
        self.handles.insert(handle, RawHandle(camera));
        Ok(handle)
    }

    fn close_camera(&mut self, handle: DeviceHandle) -> SdkResult<()> {
        let camera = self.raw("close_camera", handle)?;
        // SAFETY: camera is open and removed from the table right after.
        check("close_camera", unsafe { Picam_CloseCamera(camera) })?;
        self.handles.remove(&handle);
        Ok(())
    }

    fn set_float(
        &mut self,
        handle: DeviceHandle,
        parameter: ParameterKind,
        value: f64,
    ) -> SdkResult<()> {
        let camera = self.raw("set_float", handle)?;
        // SAFETY: camera is an open handle.
        check("set_float", unsafe {
            Picam_SetParameterFloatingPointValue(camera, picam_parameter(parameter), value)
        })
    }

    fn set_integer(
        &mut self,
        handle: DeviceHandle,
        parameter: ParameterKind,
        value: i32,
    ) -> SdkResult<()> {
        let camera = self.raw("set_integer", handle)?;
        // SAFETY: camera is an open handle.
        check("set_integer", unsafe {
            Picam_SetParameterIntegerValue(camera, picam_parameter(parameter), value as piint)
        })
    }

    fn get_float(&self, handle: DeviceHandle, parameter: ParameterKind) -> SdkResult<f64> {
        let camera = self.raw("get_float", handle)?;
        let mut value: piflt = 0.0;
        // SAFETY: camera is an open handle; value is a valid out pointer.
        check("get_float", unsafe {
            Picam_GetParameterFloatingPointValue(camera, picam_parameter(parameter), &mut value)
        })?;
        Ok(value)
    }

    fn get_integer(&self, handle: DeviceHandle, parameter: ParameterKind) -> SdkResult<i32> {
        let camera = self.raw("get_integer", handle)?;
        let mut value: piint = 0;
        // SAFETY: camera is an open handle; value is a valid out pointer.
        check("get_integer", unsafe {
            Picam_GetParameterIntegerValue(camera, picam_parameter(parameter), &mut value)
        })?;
        Ok(value)
    }

    fn commit_parameters(&mut self, handle: DeviceHandle) -> SdkResult<CommitOutcome> {
        let camera = self.raw("commit_parameters", handle)?;
        let mut failed: *const PicamParameter = std::ptr::null();
        let mut failed_count: piint = 0;
        // SAFETY: camera is open; failed/failed_count are valid out pointers.
        // The failed array is released with Picam_DestroyParameters.
        check("commit_parameters", unsafe {
            Picam_CommitParameters(camera, &mut failed, &mut failed_count)
        })?;
        let mut rejected = Vec::new();
        if !failed.is_null() {
            if failed_count > 0 {
                // SAFETY: the library returned `failed_count` parameters at `failed`.
                let raw = unsafe { std::slice::from_raw_parts(failed, failed_count as usize) };
                for p in raw {
                    match parameter_kind(*p) {
                        Some(kind) => rejected.push(kind),
                        None => {
                            tracing::warn!(
                                parameter = *p as i64,
                                "Unrecognized rejected parameter"
                            )
                        }
                    }
                }
            }
            // SAFETY: failed came from Picam_CommitParameters.
            unsafe {
                Picam_DestroyParameters(failed);
            }
        }
        Ok(CommitOutcome { rejected })
    }

    fn are_parameters_committed(&self, handle: DeviceHandle) -> SdkResult<bool> {
        let camera = self.raw("are_parameters_committed", handle)?;
        let mut committed: pibln = 0;
        // SAFETY: camera is open; committed is a valid out pointer.
        check("are_parameters_committed", unsafe {
            Picam_AreParametersCommitted(camera, &mut committed)
        })?;
        Ok(committed != 0)
    }

    fn acquire(
        &mut self,
        handle: DeviceHandle,
        readout_count: u64,
        timeout_ms: i32,
    ) -> SdkResult<AvailableData> {
        let camera = self.raw("acquire", handle)?;
        let (stride, frame_bytes) = self.readout_layout(camera)?;
        let mut available = PicamAvailableData::default();
        let mut errors: PicamAcquisitionErrorsMask = PicamAcquisitionErrorsMask_None;
        // SAFETY: camera is open; available/errors are valid out pointers.
        check("acquire", unsafe {
            Picam_Acquire(
                camera,
                readout_count as pi64s,
                timeout_ms as piint,
                &mut available,
                &mut errors,
            )
        })?;

        let count = u64::try_from(available.readout_count).unwrap_or(0);
        let mut readouts = Vec::with_capacity(count as usize);
        if !available.initial_readout.is_null() {
            let pixels_per_readout = frame_bytes / 2;
            for i in 0..count as usize {
                // SAFETY: the library's buffer holds `readout_count` readouts of
                // `stride` bytes each starting at initial_readout, valid until
                // the next acquisition on this handle. The first `frame_bytes`
                // of each are pixel data. Copied out immediately.
                let readout = unsafe {
                    let start = (available.initial_readout as *const u8).add(i * stride);
                    std::slice::from_raw_parts(start as *const u16, pixels_per_readout).to_vec()
                };
                readouts.push(readout);
            }
        }

        Ok(AvailableData {
            readouts,
            readout_count: count,
            errors: AcquisitionErrorsMask(errors as u32),
        })
    }
}

impl Drop for PicamSdk {
    fn drop(&mut self) {
        let handles: Vec<DeviceHandle> = self.handles.keys().copied().collect();
        for handle in handles {
            if let Err(e) = self.close_camera(handle) {
                tracing::warn!(%handle, error = %e, "Failed to close camera on drop");
            }
        }
    }
}

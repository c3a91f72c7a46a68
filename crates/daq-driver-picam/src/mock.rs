//! In-process simulated camera library.
//!
//! `MockSdk` behaves like the vendor library closely enough to drive the whole
//! pipeline without hardware: parameters are staged by `set_*`, validated and
//! applied by `commit_parameters`, and `acquire` returns a synthetic frame.
//!
//! Clones share state, so a test can keep a clone as a probe after handing
//! the SDK to a driver. Failures can be injected per operation to exercise
//! every error path.

use crate::sdk::{AvailableData, CameraSdk, CommitOutcome, LibraryUsers, SdkResult};
use daq_core::{
    AcquisitionErrorsMask, AppResult, DeviceHandle, DeviceIdentity, InterfaceKind, ModelId,
    ParameterKind, SdkError, SdkErrorKind, SdkVersion,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// ADC speeds (MHz) the simulated camera accepts.
pub const MOCK_ADC_SPEEDS: [f64; 3] = [0.1, 2.0, 4.0];

/// Version reported by the simulated library.
pub const MOCK_VERSION: SdkVersion = SdkVersion {
    major: 5,
    minor: 12,
    distribution: 0,
    released: 2210,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Float(f64),
    Integer(i32),
}

#[derive(Debug, Clone)]
struct Camera {
    identity: DeviceIdentity,
    staged: HashMap<ParameterKind, Value>,
    committed: HashMap<ParameterKind, Value>,
    frames_taken: u64,
}

impl Camera {
    fn new(identity: DeviceIdentity) -> Self {
        let defaults = HashMap::from([
            (ParameterKind::ExposureTime, Value::Float(10.0)),
            (ParameterKind::AdcAnalogGain, Value::Integer(2)),
            (ParameterKind::AdcQuality, Value::Integer(1)),
            (ParameterKind::AdcSpeed, Value::Float(2.0)),
            (ParameterKind::AdcBitDepth, Value::Integer(16)),
            (ParameterKind::SensorTemperatureReading, Value::Float(-70.0)),
        ]);
        Self {
            identity,
            staged: defaults.clone(),
            committed: defaults,
            frames_taken: 0,
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    set: HashMap<ParameterKind, SdkErrorKind>,
    commit_rejects: HashSet<ParameterKind>,
    commit: Option<SdkErrorKind>,
    get: HashSet<ParameterKind>,
    acquire: Option<SdkErrorKind>,
    readout_count: Option<u64>,
    drop_pixels: bool,
    error_mask: AcquisitionErrorsMask,
}

#[derive(Debug)]
struct MockState {
    initialized: bool,
    attached: Vec<DeviceIdentity>,
    open: BTreeMap<DeviceHandle, Camera>,
    next_handle: u64,
    width: u32,
    height: u32,
    faults: Faults,
}

/// Simulated camera library. Cheap to clone; clones share state.
///
/// Each `MockSdk::new` is its own library instance with its own user count,
/// so unrelated tests never share initialization state.
#[derive(Debug, Clone)]
pub struct MockSdk {
    state: Arc<Mutex<MockState>>,
    users: Arc<LibraryUsers>,
}

impl Default for MockSdk {
    /// One 2048 x 2048 camera attached.
    fn default() -> Self {
        Self::new(default_identity().into_iter().collect(), 2048, 2048)
    }
}

/// Identity of the camera attached to a default `MockSdk`.
pub fn default_identity() -> AppResult<DeviceIdentity> {
    DeviceIdentity::new(
        InterfaceKind::USB2,
        ModelId(1206),
        "PIXIS: 2048B",
        "2702550001",
    )
}

fn not_initialized(operation: &'static str) -> SdkError {
    SdkError::new(
        operation,
        SdkErrorKind::LibraryNotInitialized,
        "library not initialized",
    )
}

fn invalid_handle(operation: &'static str, handle: DeviceHandle) -> SdkError {
    SdkError::new(
        operation,
        SdkErrorKind::InvalidHandle,
        format!("handle {} is not open", handle),
    )
}

/// Diagonal gradient with a little reproducible noise, scaled by exposure.
fn synthetic_frame(width: u32, height: u32, exposure_ms: f64, seed: u64) -> Vec<u16> {
    let w = width as usize;
    let h = height as usize;
    let level = (exposure_ms.max(0.0) / 10.0).min(1.0);
    let mut pixels = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as u64;
            let noise = (seed ^ idx)
                .wrapping_mul(1103515245)
                .wrapping_add(12345)
                & 0x3f;
            let ramp = ((x + y) * 60000 / (w + h).max(1)) as f64 * level;
            pixels.push((100.0 + ramp) as u16 + noise as u16);
        }
    }
    pixels
}

impl MockSdk {
    pub fn new(cameras: Vec<DeviceIdentity>, width: u32, height: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                initialized: false,
                attached: cameras,
                open: BTreeMap::new(),
                next_handle: 1,
                width,
                height,
                faults: Faults::default(),
            })),
            users: Arc::new(LibraryUsers::new()),
        }
    }

    // ---------------------------------------------------------------------
    // Fault injection
    // ---------------------------------------------------------------------

    /// Make `set_*` on `parameter` fail with `kind`.
    pub fn fail_set(&self, parameter: ParameterKind, kind: SdkErrorKind) {
        self.state.lock().faults.set.insert(parameter, kind);
    }

    /// Make the device refuse `parameter` on commit.
    pub fn reject_on_commit(&self, parameter: ParameterKind) {
        self.state.lock().faults.commit_rejects.insert(parameter);
    }

    /// Make `commit_parameters` itself fail with `kind`.
    pub fn fail_commit(&self, kind: SdkErrorKind) {
        self.state.lock().faults.commit = Some(kind);
    }

    /// Make `get_*` on `parameter` fail.
    pub fn fail_get(&self, parameter: ParameterKind) {
        self.state.lock().faults.get.insert(parameter);
    }

    /// Make `acquire` fail with `kind`.
    pub fn fail_acquire(&self, kind: SdkErrorKind) {
        self.state.lock().faults.acquire = Some(kind);
    }

    /// Report `count` readouts regardless of what was requested.
    pub fn force_readout_count(&self, count: u64) {
        self.state.lock().faults.readout_count = Some(count);
    }

    /// Report readouts without handing back any pixel data.
    pub fn drop_readout_data(&self) {
        self.state.lock().faults.drop_pixels = true;
    }

    /// Report `mask` with every acquisition.
    pub fn force_error_mask(&self, mask: AcquisitionErrorsMask) {
        self.state.lock().faults.error_mask = mask;
    }

    /// Clear all injected faults.
    pub fn clear_faults(&self) {
        self.state.lock().faults = Faults::default();
    }

    // ---------------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------------

    pub fn committed_float(&self, handle: DeviceHandle, parameter: ParameterKind) -> Option<f64> {
        match self.state.lock().open.get(&handle)?.committed.get(&parameter)? {
            Value::Float(v) => Some(*v),
            Value::Integer(_) => None,
        }
    }

    pub fn committed_integer(&self, handle: DeviceHandle, parameter: ParameterKind) -> Option<i32> {
        match self.state.lock().open.get(&handle)?.committed.get(&parameter)? {
            Value::Integer(v) => Some(*v),
            Value::Float(_) => None,
        }
    }

    pub fn open_handles(&self) -> Vec<DeviceHandle> {
        self.state.lock().open.keys().copied().collect()
    }

    pub fn frames_taken(&self, handle: DeviceHandle) -> u64 {
        self.state
            .lock()
            .open
            .get(&handle)
            .map(|c| c.frames_taken)
            .unwrap_or(0)
    }
}

impl MockState {
    fn camera(&self, operation: &'static str, handle: DeviceHandle) -> SdkResult<&Camera> {
        if !self.initialized {
            return Err(not_initialized(operation));
        }
        self.open
            .get(&handle)
            .ok_or_else(|| invalid_handle(operation, handle))
    }

    fn camera_mut(
        &mut self,
        operation: &'static str,
        handle: DeviceHandle,
    ) -> SdkResult<&mut Camera> {
        if !self.initialized {
            return Err(not_initialized(operation));
        }
        self.open
            .get_mut(&handle)
            .ok_or_else(|| invalid_handle(operation, handle))
    }

    fn set(
        &mut self,
        operation: &'static str,
        handle: DeviceHandle,
        parameter: ParameterKind,
        value: Value,
    ) -> SdkResult<()> {
        if let Some(kind) = self.faults.set.get(&parameter).copied() {
            self.camera(operation, handle)?;
            return Err(SdkError::new(
                operation,
                kind,
                format!("injected failure setting {}", parameter),
            ));
        }
        let camera = self.camera_mut(operation, handle)?;
        match (parameter, value) {
            (ParameterKind::AdcBitDepth | ParameterKind::SensorTemperatureReading, _) => {
                Err(SdkError::new(
                    operation,
                    SdkErrorKind::ParameterIsReadOnly,
                    format!("{} is read-only", parameter),
                ))
            }
            (ParameterKind::ExposureTime | ParameterKind::AdcSpeed, Value::Float(_))
            | (ParameterKind::AdcAnalogGain | ParameterKind::AdcQuality, Value::Integer(_)) => {
                camera.staged.insert(parameter, value);
                Ok(())
            }
            _ => Err(SdkError::new(
                operation,
                SdkErrorKind::Unexpected,
                format!("{} has a different value type", parameter),
            )),
        }
    }

    fn get(
        &self,
        operation: &'static str,
        handle: DeviceHandle,
        parameter: ParameterKind,
    ) -> SdkResult<Value> {
        let camera = self.camera(operation, handle)?;
        if self.faults.get.contains(&parameter) {
            return Err(SdkError::new(
                operation,
                SdkErrorKind::CameraFaulted,
                format!("injected failure reading {}", parameter),
            ));
        }
        camera.staged.get(&parameter).copied().ok_or_else(|| {
            SdkError::new(
                operation,
                SdkErrorKind::ParameterDoesNotExist,
                format!("{} does not exist", parameter),
            )
        })
    }
}

fn violates_constraint(parameter: ParameterKind, value: Value) -> bool {
    match (parameter, value) {
        (ParameterKind::ExposureTime, Value::Float(ms)) => !(0.0..=3.6e6).contains(&ms),
        (ParameterKind::AdcAnalogGain, Value::Integer(g)) => !(1..=3).contains(&g),
        (ParameterKind::AdcQuality, Value::Integer(q)) => !(1..=2).contains(&q),
        (ParameterKind::AdcSpeed, Value::Float(mhz)) => {
            !MOCK_ADC_SPEEDS.iter().any(|s| (s - mhz).abs() < 1e-9)
        }
        _ => false,
    }
}

impl CameraSdk for MockSdk {
    fn users(&self) -> Arc<LibraryUsers> {
        Arc::clone(&self.users)
    }

    fn initialize_library(&mut self) -> SdkResult<()> {
        let mut state = self.state.lock();
        if state.initialized {
            return Err(SdkError::new(
                "initialize_library",
                SdkErrorKind::InitializationFailed,
                "library already initialized",
            ));
        }
        state.initialized = true;
        Ok(())
    }

    fn is_library_initialized(&self) -> SdkResult<bool> {
        Ok(self.state.lock().initialized)
    }

    fn uninitialize_library(&mut self) -> SdkResult<()> {
        let mut state = self.state.lock();
        state.open.clear();
        state.initialized = false;
        Ok(())
    }

    fn version(&self) -> SdkResult<SdkVersion> {
        Ok(MOCK_VERSION)
    }

    fn available_cameras(&self) -> SdkResult<Vec<DeviceIdentity>> {
        let state = self.state.lock();
        if !state.initialized {
            return Err(not_initialized("available_cameras"));
        }
        Ok(state.attached.clone())
    }

    fn open_camera(&mut self, identity: &DeviceIdentity) -> SdkResult<DeviceHandle> {
        let mut state = self.state.lock();
        if !state.initialized {
            return Err(not_initialized("open_camera"));
        }
        if !state.attached.contains(identity) {
            return Err(SdkError::new(
                "open_camera",
                SdkErrorKind::CameraNotFound,
                format!("no camera with serial {}", identity.serial_number()),
            ));
        }
        if state.open.values().any(|c| &c.identity == identity) {
            return Err(SdkError::new(
                "open_camera",
                SdkErrorKind::CameraAlreadyOpened,
                format!("camera {} is already open", identity.serial_number()),
            ));
        }
        let handle = DeviceHandle(state.next_handle);
        state.next_handle += 1;
        state.open.insert(handle, Camera::new(identity.clone()));
        Ok(handle)
    }

    fn close_camera(&mut self, handle: DeviceHandle) -> SdkResult<()> {
        let mut state = self.state.lock();
        state.camera("close_camera", handle)?;
        state.open.remove(&handle);
        Ok(())
    }

    fn set_float(
        &mut self,
        handle: DeviceHandle,
        parameter: ParameterKind,
        value: f64,
    ) -> SdkResult<()> {
        self.state
            .lock()
            .set("set_float", handle, parameter, Value::Float(value))
    }

    fn set_integer(
        &mut self,
        handle: DeviceHandle,
        parameter: ParameterKind,
        value: i32,
    ) -> SdkResult<()> {
        self.state
            .lock()
            .set("set_integer", handle, parameter, Value::Integer(value))
    }

    fn get_float(&self, handle: DeviceHandle, parameter: ParameterKind) -> SdkResult<f64> {
        match self.state.lock().get("get_float", handle, parameter)? {
            Value::Float(v) => Ok(v),
            Value::Integer(_) => Err(SdkError::new(
                "get_float",
                SdkErrorKind::Unexpected,
                format!("{} is an integer parameter", parameter),
            )),
        }
    }

    fn get_integer(&self, handle: DeviceHandle, parameter: ParameterKind) -> SdkResult<i32> {
        match self.state.lock().get("get_integer", handle, parameter)? {
            Value::Integer(v) => Ok(v),
            Value::Float(_) => Err(SdkError::new(
                "get_integer",
                SdkErrorKind::Unexpected,
                format!("{} is a floating point parameter", parameter),
            )),
        }
    }

    fn commit_parameters(&mut self, handle: DeviceHandle) -> SdkResult<CommitOutcome> {
        let mut state = self.state.lock();
        if let Some(kind) = state.faults.commit {
            state.camera("commit_parameters", handle)?;
            return Err(SdkError::new(
                "commit_parameters",
                kind,
                "injected commit failure",
            ));
        }
        let forced = state.faults.commit_rejects.clone();
        let camera = state.camera_mut("commit_parameters", handle)?;
        let rejected: Vec<ParameterKind> = ParameterKind::APPLY_ORDER
            .iter()
            .copied()
            .filter(|p| {
                forced.contains(p)
                    || camera
                        .staged
                        .get(p)
                        .is_some_and(|v| violates_constraint(*p, *v))
            })
            .collect();
        if rejected.is_empty() {
            camera.committed = camera.staged.clone();
        }
        Ok(CommitOutcome { rejected })
    }

    fn are_parameters_committed(&self, handle: DeviceHandle) -> SdkResult<bool> {
        let state = self.state.lock();
        let camera = state.camera("are_parameters_committed", handle)?;
        Ok(camera.staged == camera.committed)
    }

    fn acquire(
        &mut self,
        handle: DeviceHandle,
        readout_count: u64,
        _timeout_ms: i32,
    ) -> SdkResult<AvailableData> {
        let mut state = self.state.lock();
        if let Some(kind) = state.faults.acquire {
            state.camera("acquire", handle)?;
            return Err(SdkError::new("acquire", kind, "injected acquisition failure"));
        }
        let (width, height) = (state.width, state.height);
        let count = state.faults.readout_count.unwrap_or(readout_count);
        let errors = state.faults.error_mask;
        let drop_pixels = state.faults.drop_pixels;
        let camera = state.camera_mut("acquire", handle)?;
        if camera.staged != camera.committed {
            return Err(SdkError::new(
                "acquire",
                SdkErrorKind::Unexpected,
                "parameters not committed",
            ));
        }
        let exposure_ms = match camera.committed.get(&ParameterKind::ExposureTime) {
            Some(Value::Float(ms)) => *ms,
            _ => 0.0,
        };
        let readouts = if drop_pixels {
            Vec::new()
        } else {
            (0..count)
                .map(|i| synthetic_frame(width, height, exposure_ms, camera.frames_taken + i))
                .collect()
        };
        camera.frames_taken += count;
        Ok(AvailableData {
            readouts,
            readout_count: count,
            errors,
        })
    }
}

//! Camera SDK boundary.
//!
//! [`CameraSdk`] is the narrow slice of the vendor library the pipeline uses.
//! Backends convert vendor status codes into [`SdkError`] exactly once, here,
//! so nothing above this trait sees a raw status integer.
//!
//! ## Library reference counting
//!
//! Library initialization is process-wide state. Every backend hands out one
//! shared [`LibraryUsers`] counter per library instance so that several
//! connections can coexist: the first connection initializes the library and
//! only the last one to shut down uninitializes it.

use daq_core::{
    AcquisitionErrorsMask, DeviceHandle, DeviceIdentity, ParameterKind, SdkError, SdkVersion,
};
use std::sync::{Arc, Mutex, MutexGuard};

pub type SdkResult<T> = Result<T, SdkError>;

/// Readout timeout meaning "wait forever".
pub const NO_TIMEOUT: i32 = -1;

/// Result of committing staged parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Parameters the device refused. Empty on success.
    pub rejected: Vec<ParameterKind>,
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Data returned by a blocking acquisition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailableData {
    /// One pixel buffer per readout.
    pub readouts: Vec<Vec<u16>>,
    /// Readout count as reported by the device.
    pub readout_count: u64,
    pub errors: AcquisitionErrorsMask,
}

/// Number of live connections sharing one library instance.
///
/// The count and the init/uninit call run under one lock, so a connection
/// can never observe a half-initialized library.
#[derive(Debug, Default)]
pub struct LibraryUsers {
    count: Mutex<u32>,
}

impl LibraryUsers {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, u32> {
        match self.count.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // Poison does not change how many connections are alive.
                tracing::warn!("Library user counter poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn count(&self) -> u32 {
        *self.lock()
    }

    /// Count one more user, running `init` first when there were none.
    ///
    /// If `init` fails the count is unchanged. Returns the new count.
    pub fn register<E>(&self, init: impl FnOnce() -> Result<(), E>) -> Result<u32, E> {
        let mut count = self.lock();
        if *count == 0 {
            init()?;
        }
        *count += 1;
        Ok(*count)
    }

    /// Count one user out, running `uninit` when it was the last.
    ///
    /// The user is counted out even if `uninit` fails. Returns the remaining
    /// count.
    pub fn release<E>(&self, uninit: impl FnOnce() -> Result<(), E>) -> Result<u32, E> {
        let mut count = self.lock();
        match *count {
            0 => {
                tracing::error!("Library user count underflow");
                Ok(0)
            }
            1 => {
                *count = 0;
                uninit()?;
                Ok(0)
            }
            n => {
                *count = n - 1;
                Ok(*count)
            }
        }
    }
}

/// Operations the acquisition pipeline needs from a camera library.
pub trait CameraSdk: Send {
    /// Counter shared by every connection using this library instance.
    fn users(&self) -> Arc<LibraryUsers>;

    fn initialize_library(&mut self) -> SdkResult<()>;

    fn is_library_initialized(&self) -> SdkResult<bool>;

    fn uninitialize_library(&mut self) -> SdkResult<()>;

    fn version(&self) -> SdkResult<SdkVersion>;

    fn available_cameras(&self) -> SdkResult<Vec<DeviceIdentity>>;

    fn open_camera(&mut self, identity: &DeviceIdentity) -> SdkResult<DeviceHandle>;

    fn close_camera(&mut self, handle: DeviceHandle) -> SdkResult<()>;

    fn set_float(
        &mut self,
        handle: DeviceHandle,
        parameter: ParameterKind,
        value: f64,
    ) -> SdkResult<()>;

    fn set_integer(
        &mut self,
        handle: DeviceHandle,
        parameter: ParameterKind,
        value: i32,
    ) -> SdkResult<()>;

    fn get_float(&self, handle: DeviceHandle, parameter: ParameterKind) -> SdkResult<f64>;

    fn get_integer(&self, handle: DeviceHandle, parameter: ParameterKind) -> SdkResult<i32>;

    fn commit_parameters(&mut self, handle: DeviceHandle) -> SdkResult<CommitOutcome>;

    fn are_parameters_committed(&self, handle: DeviceHandle) -> SdkResult<bool>;

    /// Block until `readout_count` readouts arrive, an error occurs, or
    /// `timeout_ms` elapses ([`NO_TIMEOUT`] waits forever).
    fn acquire(
        &mut self,
        handle: DeviceHandle,
        readout_count: u64,
        timeout_ms: i32,
    ) -> SdkResult<AvailableData>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_first_and_last_user_touch_the_library() {
        let users = LibraryUsers::new();
        let mut inits = 0;
        let mut uninits = 0;

        for expected in [1, 2] {
            let count = users.register(|| {
                inits += 1;
                Ok::<(), ()>(())
            });
            assert_eq!(count, Ok(expected));
        }
        for expected in [1, 0] {
            let count = users.release(|| {
                uninits += 1;
                Ok::<(), ()>(())
            });
            assert_eq!(count, Ok(expected));
        }

        assert_eq!((inits, uninits), (1, 1));
        assert_eq!(users.count(), 0);
    }

    #[test]
    fn failed_init_does_not_count() {
        let users = LibraryUsers::new();
        assert_eq!(users.register(|| Err("no library")), Err("no library"));
        assert_eq!(users.count(), 0);
    }

    #[test]
    fn release_without_users_is_harmless() {
        let users = LibraryUsers::new();
        let mut uninits = 0;
        let count = users.release(|| {
            uninits += 1;
            Ok::<(), ()>(())
        });
        assert_eq!(count, Ok(0));
        assert_eq!(uninits, 0);
    }
}

//! PICam Connection Management
//!
//! Handles library initialization, camera discovery, and opening/closing
//! camera sessions. Every handle given out is tracked with the identity it
//! was opened for so later stages can tag frames without asking the device.
//!
//! The library is shared by every connection built on the same SDK instance.
//! Each connection registers itself once with the SDK's [`LibraryUsers`]
//! counter; only the last one to shut down uninitializes the library.

use crate::sdk::{CameraSdk, LibraryUsers, SdkResult};
use daq_core::{AppResult, DaqError, DeviceDescriptor, DeviceHandle, DeviceIdentity, SdkVersion};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Owns the camera library and the set of open camera sessions.
pub struct PicamConnection {
    sdk: Box<dyn CameraSdk>,
    users: Arc<LibraryUsers>,
    /// Whether this connection is counted in `users`.
    registered: bool,
    open: BTreeMap<DeviceHandle, DeviceIdentity>,
}

impl PicamConnection {
    pub fn new(sdk: Box<dyn CameraSdk>) -> Self {
        let users = sdk.users();
        Self {
            sdk,
            users,
            registered: false,
            open: BTreeMap::new(),
        }
    }

    /// Initialize the library if needed and report its version.
    ///
    /// Calling this again once initialized is not an error.
    pub fn initialize(&mut self) -> AppResult<SdkVersion> {
        if self.registered {
            tracing::info!("PICam library already initialized");
        } else {
            let sdk = &mut self.sdk;
            let users = self.users.register(|| -> SdkResult<()> {
                if sdk.is_library_initialized()? {
                    tracing::info!("PICam library already initialized");
                    Ok(())
                } else {
                    sdk.initialize_library()
                }
            })?;
            self.registered = true;
            tracing::debug!(users, "Registered PICam library user");
        }
        let version = self.sdk.version()?;
        tracing::info!(%version, "PICam library initialized");
        Ok(version)
    }

    pub fn is_initialized(&self) -> AppResult<bool> {
        Ok(self.sdk.is_library_initialized()?)
    }

    pub fn version(&self) -> AppResult<SdkVersion> {
        Ok(self.sdk.version()?)
    }

    fn require_initialized(&self) -> AppResult<()> {
        if self.sdk.is_library_initialized()? {
            Ok(())
        } else {
            Err(DaqError::LibraryNotInitialized)
        }
    }

    /// Identities of all attached cameras.
    pub fn enumerate(&self) -> AppResult<Vec<DeviceIdentity>> {
        self.require_initialized()?;
        let cameras = self.sdk.available_cameras()?;
        tracing::debug!(count = cameras.len(), "Enumerated cameras");
        Ok(cameras)
    }

    /// Open `identity`, or return the session already open for it.
    pub fn open(&mut self, identity: &DeviceIdentity) -> AppResult<DeviceHandle> {
        self.require_initialized()?;
        if let Some((handle, _)) = self.open.iter().find(|(_, id)| *id == identity) {
            return Ok(*handle);
        }
        let handle = self.sdk.open_camera(identity)?;
        tracing::info!(
            %handle,
            model = identity.model().0,
            sensor = identity.sensor_name(),
            serial = identity.serial_number(),
            "Camera opened"
        );
        self.open.insert(handle, identity.clone());
        Ok(handle)
    }

    /// Open every attached camera.
    pub fn open_all(&mut self) -> AppResult<Vec<DeviceDescriptor>> {
        let cameras = self.enumerate()?;
        if cameras.is_empty() {
            tracing::warn!("No cameras available");
        }
        cameras
            .into_iter()
            .map(|identity| {
                let handle = self.open(&identity)?;
                Ok(DeviceDescriptor { handle, identity })
            })
            .collect()
    }

    /// Identity a handle was opened for.
    pub fn identity(&self, handle: DeviceHandle) -> AppResult<&DeviceIdentity> {
        self.open
            .get(&handle)
            .ok_or(DaqError::UnknownHandle(handle.0))
    }

    pub fn close(&mut self, handle: DeviceHandle) -> AppResult<()> {
        if !self.open.contains_key(&handle) {
            return Err(DaqError::UnknownHandle(handle.0));
        }
        self.sdk.close_camera(handle)?;
        self.open.remove(&handle);
        tracing::info!(%handle, "Camera closed");
        Ok(())
    }

    pub fn open_handles(&self) -> Vec<DeviceHandle> {
        self.open.keys().copied().collect()
    }

    /// Close every camera this connection opened and release the library.
    ///
    /// The library stays initialized while other connections still use it.
    pub fn shutdown(&mut self) -> AppResult<()> {
        for handle in self.open_handles() {
            if let Err(e) = self.close(handle) {
                tracing::warn!(%handle, error = %e, "Failed to close camera during shutdown");
                self.open.remove(&handle);
            }
        }
        if !self.registered {
            return Ok(());
        }
        self.registered = false;

        let sdk = &mut self.sdk;
        let remaining = self.users.release(|| -> SdkResult<()> {
            if sdk.is_library_initialized()? {
                sdk.uninitialize_library()?;
                tracing::info!("PICam library uninitialized");
            }
            Ok(())
        })?;
        if remaining > 0 {
            tracing::debug!(remaining, "PICam library still in use");
        }
        Ok(())
    }

    pub(crate) fn sdk(&self) -> &dyn CameraSdk {
        self.sdk.as_ref()
    }

    pub(crate) fn sdk_mut(&mut self) -> &mut dyn CameraSdk {
        self.sdk.as_mut()
    }
}

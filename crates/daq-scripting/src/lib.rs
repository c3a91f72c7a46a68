//! `daq-scripting`
//!
//! Rhai scripting for PICam acquisitions. [`RhaiEngine`] runs scripts against
//! a shared [`CameraSession`] through the functions registered in
//! [`bindings`].

pub mod bindings;
pub mod rhai_engine;
pub mod traits;

pub use bindings::{register_camera, CameraSession};
pub use rhai_engine::{RhaiEngine, DEFAULT_MAX_OPERATIONS};
pub use traits::{ScriptEngine, ScriptError, ScriptValue};

pub use rhai;

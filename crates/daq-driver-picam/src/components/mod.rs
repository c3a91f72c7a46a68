//! Driver components, one per pipeline stage.

pub mod acquisition;
pub mod connection;
#[cfg(feature = "picam_sdk")]
pub mod ffi;
pub mod features;
pub mod metadata;

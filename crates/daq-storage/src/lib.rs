//! `daq-storage`
//!
//! Frame persistence for picam-daq: a native FITS codec ([`fits`]), the dated
//! directory layout ([`layout`]) and the [`FitsPersister`] that ties them to
//! acquired frames.

pub mod fits;
pub mod fits_writer;
pub mod layout;

pub use fits::{FitsError, FitsReader};
pub use fits_writer::{FitsPersister, PersistConfig, PixelEncoding};

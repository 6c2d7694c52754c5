#![deny(trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    unused_qualifications,
    unused_import_braces
)]
//! High-level reading of single DICOM files.
//!
//! The entry point is [`DicomDataset`]: it parses a file (or any seekable
//! byte source), collects the whitelisted attributes, and defers the pixel
//! payload until [`DicomDataset::pixel_array`] is called. Pixel values come
//! back as a typed [`PixelArray`] with the data set's shape, byte order and
//! rescaling already applied.

pub mod dataset;
pub mod meta;
pub mod pixeldata;

pub use dataset::{DicomDataset, Error, Result};
pub use pixeldata::{PixelArray, PixelKind, Rescale};

use std::io::{Read, Seek};
use std::path::Path;

/// Read a DICOM data set from a file on disk.
pub fn open_file<P>(path: P) -> Result<DicomDataset>
where
    P: AsRef<Path>,
{
    DicomDataset::open_file(path)
}

/// Read a DICOM data set from an arbitrary seekable source.
pub fn from_reader<R>(reader: R) -> Result<DicomDataset>
where
    R: Read + Seek + 'static,
{
    DicomDataset::from_reader(reader)
}

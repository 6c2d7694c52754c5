#![deny(trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    unused_qualifications,
    unused_import_braces
)]
//! # minidicom
//!
//! This crate serves as a parent for the library crates in the minidicom
//! project, a small DICOM reader focused on pixel data and series
//! assembly.
//!
//! - To read a single file and obtain its pixel array,
//!   see the [`object`] module.
//! - To scan a directory and assemble volumes out of slice files,
//!   see the [`series`] module.
//! - The [`core`] module holds the shared data types:
//!   attribute tags ([`Tag`](minidicom_core::Tag)),
//!   value representations ([`VR`](minidicom_core::VR)),
//!   and decoded attribute [values](minidicom_core::Value).
//! - The wire-level element decoder and the transfer syntax table
//!   live in the [`encoding`] module.

pub use minidicom_core as core;
pub use minidicom_encoding as encoding;
pub use minidicom_object as object;
pub use minidicom_series as series;

pub use minidicom_object::{open_file, DicomDataset, PixelArray, PixelKind};
pub use minidicom_series::{can_read, scan, DicomReader, DicomSeries, Expect, Progress, Request};

#![deny(trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    unused_qualifications,
    unused_import_braces
)]
//! Assembling directories of DICOM files into coherent image series,
//! and the host-facing reader surface over them.
//!
//! [`series::scan`] walks a directory, parses each file's metadata,
//! groups the resulting data sets by series UID, orders and splits them,
//! and returns [`DicomSeries`] values whose volumes can be materialized
//! on demand. [`plugin`] wraps all of this in the reader shape a generic
//! image I/O host expects.

pub mod plugin;
pub mod progress;
pub mod series;

pub use plugin::{can_read, DicomReader, Expect, Request, FILE_EXTENSIONS};
pub use progress::{NullProgress, Progress, ProgressSink, StdoutProgress};
pub use series::{scan, DicomSeries};

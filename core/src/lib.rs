#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features
)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_qualifications,
    unused_import_braces
)]
//! Core data types for the minidicom reading stack.
//!
//! This crate contains the vocabulary shared by the rest of the project:
//! the DICOM attribute [`Tag`], value representation codes ([`VR`]), element
//! value lengths ([`Length`]), the in-memory [`Value`] sum type, and the
//! fixed attribute whitelist in [`dictionary`].

pub mod dictionary;
pub mod header;
pub mod value;

pub use header::{DataElementHeader, Header, Length, Tag, VR};
pub use value::Value;

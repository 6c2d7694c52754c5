#![deny(trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    unused_qualifications,
    unused_import_braces
)]
//! DICOM decoding primitives for the minidicom reading stack.
//!
//! This crate handles the wire level: decoding individual data elements
//! against a transfer-syntax mode ([`decode`]), converting raw element
//! payloads into in-memory values ([`convert`]), and the table of
//! transfer syntaxes this reader understands ([`transfer_syntax`]).
//!
//! There is no encoding counterpart: the format is read-only here.

pub mod convert;
pub mod decode;
pub mod transfer_syntax;

pub use decode::{ElementDecoder, RawElement, RawValue};
pub use transfer_syntax::TransferSyntax;

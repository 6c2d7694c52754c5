//! Conversion of raw element payloads into in-memory values.
//!
//! The converter applied to a whitelisted element is selected by the
//! dictionary's value representation, not by the representation found on
//! the wire. Number strings are split on the `\` separator; a value that
//! fails to parse is kept as the original text.

use byteordered::Endianness;
use minidicom_core::{Value, VR};
use snafu::{ensure, Backtrace, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    /// A binary value was not exactly the size its representation
    /// requires. The data set reader treats this like a short read and
    /// ends its body scan.
    #[snafu(display("Value of {} bytes does not fit {}", len, vr))]
    FixedSizeMismatch {
        vr: VR,
        len: usize,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Convert a raw element payload into an in-memory value, according to the
/// given value representation and byte order.
pub fn decode_value(vr: VR, endianness: Endianness, data: Vec<u8>) -> Result<Value> {
    match vr {
        VR::US => {
            ensure!(
                data.len() == 2,
                FixedSizeMismatchSnafu {
                    vr,
                    len: data.len()
                }
            );
            let v = match endianness {
                Endianness::Little => u16::from_le_bytes([data[0], data[1]]),
                Endianness::Big => u16::from_be_bytes([data[0], data[1]]),
            };
            Ok(Value::ints(Some(i64::from(v))))
        }
        VR::UL => {
            ensure!(
                data.len() == 4,
                FixedSizeMismatchSnafu {
                    vr,
                    len: data.len()
                }
            );
            let bytes = [data[0], data[1], data[2], data[3]];
            let v = match endianness {
                Endianness::Little => u32::from_le_bytes(bytes),
                Endianness::Big => u32::from_be_bytes(bytes),
            };
            Ok(Value::ints(Some(i64::from(v))))
        }
        // CS goes through the same number splitting as DS; the geometry
        // attributes rely on it
        VR::DS | VR::CS => Ok(split_floats(data)),
        VR::IS => Ok(split_ints(data)),
        VR::AS | VR::DA | VR::TM | VR::UI => Ok(ascii_text(data)),
        VR::LO | VR::PN => Ok(utf8_text(data)),
        _ => Ok(Value::Bytes(data)),
    }
}

fn parse_float(token: &str) -> Option<f64> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    token.parse().ok()
}

fn parse_int(token: &str) -> Option<i64> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    token.parse().ok()
}

fn split_floats(data: Vec<u8>) -> Value {
    let text = match ascii_str(&data) {
        Some(text) => text.trim_matches('\0'),
        None => return Value::Bytes(data),
    };
    if text.contains('\\') {
        let mut values = Vec::new();
        for token in text.split('\\').filter(|t| !t.is_empty()) {
            match parse_float(token) {
                Some(v) => values.push(v),
                None => return Value::Str(text.to_string()),
            }
        }
        Value::floats(values)
    } else {
        match parse_float(text) {
            Some(v) => Value::floats(Some(v)),
            None => Value::Str(text.to_string()),
        }
    }
}

fn split_ints(data: Vec<u8>) -> Value {
    let text = match ascii_str(&data) {
        Some(text) => text.trim_matches('\0'),
        None => return Value::Bytes(data),
    };
    if text.contains('\\') {
        let mut values = Vec::new();
        for token in text.split('\\').filter(|t| !t.is_empty()) {
            match parse_int(token) {
                Some(v) => values.push(v),
                None => return Value::Str(text.to_string()),
            }
        }
        Value::ints(values)
    } else {
        match parse_int(text) {
            Some(v) => Value::ints(Some(v)),
            None => Value::Str(text.to_string()),
        }
    }
}

fn ascii_str(data: &[u8]) -> Option<&str> {
    match std::str::from_utf8(data) {
        Ok(text) if text.is_ascii() => Some(text),
        _ => None,
    }
}

fn ascii_text(data: Vec<u8>) -> Value {
    match ascii_str(&data) {
        Some(text) => Value::Str(text.trim_matches('\0').to_string()),
        None => Value::Bytes(data),
    }
}

fn utf8_text(data: Vec<u8>) -> Value {
    match std::str::from_utf8(&data) {
        Ok(text) => Value::Str(text.trim_matches('\0').trim_end().to_string()),
        Err(_) => Value::Bytes(data),
    }
}

//! In-memory representation of decoded attribute values.
//!
//! Values recorded by the reader are a small sum type: integers, floating
//! point numbers, text, or raw bytes. Numeric values are kept as sequences
//! internally, since several attributes are multi-valued on the wire
//! (`PixelSpacing`, `ImagePositionPatient`); consumers use the indexed
//! accessors.

use smallvec::SmallVec;
use std::fmt;

/// The decoded value of a recorded data element.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// One or more integers (`US`, `UL`, `IS`).
    Ints(SmallVec<[i64; 2]>),
    /// One or more floating point numbers (`DS`, and `CS` as parsed here).
    Floats(SmallVec<[f64; 3]>),
    /// A text value.
    Str(String),
    /// Raw bytes for value representations this reader does not interpret.
    Bytes(Vec<u8>),
}

impl Value {
    /// Create an integer value sequence.
    pub fn ints<I>(values: I) -> Value
    where
        I: IntoIterator<Item = i64>,
    {
        Value::Ints(values.into_iter().collect())
    }

    /// Create a floating point value sequence.
    pub fn floats<I>(values: I) -> Value
    where
        I: IntoIterator<Item = f64>,
    {
        Value::Floats(values.into_iter().collect())
    }

    /// The first integer of the value, if it is an integer value.
    pub fn int(&self) -> Option<i64> {
        self.int_at(0)
    }

    /// The integer at the given position of the value.
    pub fn int_at(&self, index: usize) -> Option<i64> {
        match self {
            Value::Ints(values) => values.get(index).copied(),
            _ => None,
        }
    }

    /// The first number of the value as a floating point number.
    /// Integer values are widened.
    pub fn float(&self) -> Option<f64> {
        self.float_at(0)
    }

    /// The number at the given position of the value, as floating point.
    /// Integer values are widened.
    pub fn float_at(&self, index: usize) -> Option<f64> {
        match self {
            Value::Floats(values) => values.get(index).copied(),
            Value::Ints(values) => values.get(index).map(|&v| v as f64),
            _ => None,
        }
    }

    /// The value as text, if it is a text value.
    pub fn string(&self) -> Option<&str> {
        match self {
            Value::Str(text) => Some(text),
            _ => None,
        }
    }

    /// The number of items in the value.
    pub fn multiplicity(&self) -> usize {
        match self {
            Value::Ints(values) => values.len(),
            Value::Floats(values) => values.len(),
            Value::Str(_) => 1,
            Value::Bytes(data) => data.len(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Ints(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                f.write_str(&parts.join("\\"))
            }
            Value::Floats(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                f.write_str(&parts.join("\\"))
            }
            Value::Str(text) => f.write_str(text),
            Value::Bytes(data) => write!(f, "<{} bytes>", data.len()),
        }
    }
}

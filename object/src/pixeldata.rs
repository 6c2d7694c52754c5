//! Typed pixel arrays and the value rescaling machinery.
//!
//! Raw pixel bytes become an [`ndarray`] of one of the supported scalar
//! types, reshaped to the data set's shape. When a rescale function is
//! present, the element type is promoted so the rescaled values fit; the
//! promotion rule reproduces the behavior observed in practice, including
//! its choice of signed types on the non-negative path.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use byteordered::Endianness;
use ndarray::{ArrayD, Axis, IxDyn};
use num_traits::AsPrimitive;
use snafu::{ensure, Backtrace, ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    /// The raw pixel buffer holds fewer bytes than the shape requires.
    #[snafu(display("Pixel buffer of {} bytes is too short, expected {}", got, expected))]
    BufferTooShort {
        got: usize,
        expected: usize,
        backtrace: Backtrace,
    },

    /// The sample count does not match the target shape.
    #[snafu(display("Could not shape the pixel buffer: {}", source))]
    ShapeBuffer {
        source: ndarray::ShapeError,
        backtrace: Backtrace,
    },

    /// A slice index beyond the first axis of the array.
    #[snafu(display("Slice index {} is out of bounds", index))]
    SliceOutOfBounds { index: usize, backtrace: Backtrace },

    /// A slice's shape does not match the volume it is stacked into.
    #[snafu(display("Slice shape {:?} does not fit volume shape {:?}", slice, volume))]
    SliceShapeMismatch {
        slice: Vec<usize>,
        volume: Vec<usize>,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// The scalar type of a pixel sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
}

impl PixelKind {
    /// The scalar type for a sample, given the data set's pixel
    /// representation (0 for unsigned, 1 for signed) and allocated bits.
    pub fn from_representation(pixel_representation: u16, bits_allocated: u16) -> Option<PixelKind> {
        match (pixel_representation, bits_allocated) {
            (0, 8) => Some(PixelKind::U8),
            (1, 8) => Some(PixelKind::I8),
            (0, 16) => Some(PixelKind::U16),
            (1, 16) => Some(PixelKind::I16),
            (0, 32) => Some(PixelKind::U32),
            (1, 32) => Some(PixelKind::I32),
            _ => None,
        }
    }

    /// Width of one sample in bytes.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            PixelKind::U8 | PixelKind::I8 => 1,
            PixelKind::U16 | PixelKind::I16 => 2,
            PixelKind::U32 | PixelKind::I32 | PixelKind::F32 => 4,
        }
    }
}

/// A fully materialized pixel array of one of the supported scalar types.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelArray {
    U8(ArrayD<u8>),
    I8(ArrayD<i8>),
    U16(ArrayD<u16>),
    I16(ArrayD<i16>),
    U32(ArrayD<u32>),
    I32(ArrayD<i32>),
    F32(ArrayD<f32>),
}

fn cast_array<T, U>(a: &ArrayD<T>) -> ArrayD<U>
where
    T: Copy + AsPrimitive<U>,
    U: Copy + 'static,
{
    a.mapv(|v| v.as_())
}

macro_rules! with_array {
    ($self:expr, $arr:ident => $body:expr) => {
        match $self {
            PixelArray::U8($arr) => $body,
            PixelArray::I8($arr) => $body,
            PixelArray::U16($arr) => $body,
            PixelArray::I16($arr) => $body,
            PixelArray::U32($arr) => $body,
            PixelArray::I32($arr) => $body,
            PixelArray::F32($arr) => $body,
        }
    };
}

macro_rules! map_same_kind {
    ($self:expr, $arr:ident => $body:expr) => {
        match $self {
            PixelArray::U8($arr) => PixelArray::U8($body),
            PixelArray::I8($arr) => PixelArray::I8($body),
            PixelArray::U16($arr) => PixelArray::U16($body),
            PixelArray::I16($arr) => PixelArray::I16($body),
            PixelArray::U32($arr) => PixelArray::U32($body),
            PixelArray::I32($arr) => PixelArray::I32($body),
            PixelArray::F32($arr) => PixelArray::F32($body),
        }
    };
}

impl PixelArray {
    /// Reinterpret raw value bytes as samples of the given kind, in the
    /// given byte order, shaped to `shape`. The result is in native byte
    /// order. Trailing padding bytes beyond the shape's extent are ignored.
    pub fn from_bytes(
        bytes: &[u8],
        kind: PixelKind,
        shape: &[usize],
        endianness: Endianness,
    ) -> Result<PixelArray> {
        let count: usize = shape.iter().product();
        let expected = count * kind.bytes_per_sample();
        ensure!(
            bytes.len() >= expected,
            BufferTooShortSnafu {
                got: bytes.len(),
                expected
            }
        );
        if bytes.len() > expected {
            tracing::debug!(
                "ignoring {} trailing bytes of pixel data",
                bytes.len() - expected
            );
        }
        let bytes = &bytes[..expected];

        match kind {
            PixelKind::U8 => Ok(PixelArray::U8(
                ArrayD::from_shape_vec(IxDyn(shape), bytes.to_vec()).context(ShapeBufferSnafu)?,
            )),
            PixelKind::I8 => {
                let samples: Vec<i8> = bytes.iter().map(|&b| b as i8).collect();
                Ok(PixelArray::I8(
                    ArrayD::from_shape_vec(IxDyn(shape), samples).context(ShapeBufferSnafu)?,
                ))
            }
            PixelKind::U16 => {
                let mut samples = vec![0u16; count];
                match endianness {
                    Endianness::Little => LittleEndian::read_u16_into(bytes, &mut samples),
                    Endianness::Big => BigEndian::read_u16_into(bytes, &mut samples),
                }
                Ok(PixelArray::U16(
                    ArrayD::from_shape_vec(IxDyn(shape), samples).context(ShapeBufferSnafu)?,
                ))
            }
            PixelKind::I16 => {
                let mut samples = vec![0i16; count];
                match endianness {
                    Endianness::Little => LittleEndian::read_i16_into(bytes, &mut samples),
                    Endianness::Big => BigEndian::read_i16_into(bytes, &mut samples),
                }
                Ok(PixelArray::I16(
                    ArrayD::from_shape_vec(IxDyn(shape), samples).context(ShapeBufferSnafu)?,
                ))
            }
            PixelKind::U32 => {
                let mut samples = vec![0u32; count];
                match endianness {
                    Endianness::Little => LittleEndian::read_u32_into(bytes, &mut samples),
                    Endianness::Big => BigEndian::read_u32_into(bytes, &mut samples),
                }
                Ok(PixelArray::U32(
                    ArrayD::from_shape_vec(IxDyn(shape), samples).context(ShapeBufferSnafu)?,
                ))
            }
            PixelKind::I32 => {
                let mut samples = vec![0i32; count];
                match endianness {
                    Endianness::Little => LittleEndian::read_i32_into(bytes, &mut samples),
                    Endianness::Big => BigEndian::read_i32_into(bytes, &mut samples),
                }
                Ok(PixelArray::I32(
                    ArrayD::from_shape_vec(IxDyn(shape), samples).context(ShapeBufferSnafu)?,
                ))
            }
            PixelKind::F32 => {
                let mut samples = vec![0f32; count];
                match endianness {
                    Endianness::Little => LittleEndian::read_f32_into(bytes, &mut samples),
                    Endianness::Big => BigEndian::read_f32_into(bytes, &mut samples),
                }
                Ok(PixelArray::F32(
                    ArrayD::from_shape_vec(IxDyn(shape), samples).context(ShapeBufferSnafu)?,
                ))
            }
        }
    }

    /// A zero-filled array of the given kind and shape.
    pub fn zeros(kind: PixelKind, shape: &[usize]) -> PixelArray {
        match kind {
            PixelKind::U8 => PixelArray::U8(ArrayD::zeros(IxDyn(shape))),
            PixelKind::I8 => PixelArray::I8(ArrayD::zeros(IxDyn(shape))),
            PixelKind::U16 => PixelArray::U16(ArrayD::zeros(IxDyn(shape))),
            PixelKind::I16 => PixelArray::I16(ArrayD::zeros(IxDyn(shape))),
            PixelKind::U32 => PixelArray::U32(ArrayD::zeros(IxDyn(shape))),
            PixelKind::I32 => PixelArray::I32(ArrayD::zeros(IxDyn(shape))),
            PixelKind::F32 => PixelArray::F32(ArrayD::zeros(IxDyn(shape))),
        }
    }

    /// The scalar kind of this array.
    pub fn kind(&self) -> PixelKind {
        match self {
            PixelArray::U8(_) => PixelKind::U8,
            PixelArray::I8(_) => PixelKind::I8,
            PixelArray::U16(_) => PixelKind::U16,
            PixelArray::I16(_) => PixelKind::I16,
            PixelArray::U32(_) => PixelKind::U32,
            PixelArray::I32(_) => PixelKind::I32,
            PixelArray::F32(_) => PixelKind::F32,
        }
    }

    /// The array's shape.
    pub fn shape(&self) -> &[usize] {
        with_array!(self, a => a.shape())
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        with_array!(self, a => a.ndim())
    }

    /// Total number of samples.
    pub fn len(&self) -> usize {
        with_array!(self, a => a.len())
    }

    /// Whether the array holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of slices in the reader's volume view: the first axis
    /// when the array is 3-dimensional, 1 otherwise.
    pub fn num_slices(&self) -> usize {
        if self.ndim() == 3 {
            self.shape()[0]
        } else {
            1
        }
    }

    /// An owned copy of the sub-array at `index` along the first axis.
    pub fn slice_at(&self, index: usize) -> Result<PixelArray> {
        ensure!(
            self.ndim() >= 1 && index < self.shape()[0],
            SliceOutOfBoundsSnafu { index }
        );
        Ok(map_same_kind!(self, a => a.index_axis(Axis(0), index).to_owned()))
    }

    /// Convert the elements to the given kind. Plain numeric conversion,
    /// with the usual truncation semantics on narrowing.
    pub fn cast(&self, kind: PixelKind) -> PixelArray {
        if kind == self.kind() {
            return self.clone();
        }
        macro_rules! cast_from {
            ($arr:expr) => {
                match kind {
                    PixelKind::U8 => PixelArray::U8(cast_array($arr)),
                    PixelKind::I8 => PixelArray::I8(cast_array($arr)),
                    PixelKind::U16 => PixelArray::U16(cast_array($arr)),
                    PixelKind::I16 => PixelArray::I16(cast_array($arr)),
                    PixelKind::U32 => PixelArray::U32(cast_array($arr)),
                    PixelKind::I32 => PixelArray::I32(cast_array($arr)),
                    PixelKind::F32 => PixelArray::F32(cast_array($arr)),
                }
            };
        }
        match self {
            PixelArray::U8(a) => cast_from!(a),
            PixelArray::I8(a) => cast_from!(a),
            PixelArray::U16(a) => cast_from!(a),
            PixelArray::I16(a) => cast_from!(a),
            PixelArray::U32(a) => cast_from!(a),
            PixelArray::I32(a) => cast_from!(a),
            PixelArray::F32(a) => cast_from!(a),
        }
    }

    /// Assign `slice` into position `index` along the first axis, casting
    /// its elements to this array's kind when they differ.
    pub fn assign_slice(&mut self, index: usize, slice: &PixelArray) -> Result<()> {
        ensure!(
            self.ndim() >= 1 && index < self.shape()[0],
            SliceOutOfBoundsSnafu { index }
        );
        ensure!(
            &self.shape()[1..] == slice.shape(),
            SliceShapeMismatchSnafu {
                slice: slice.shape().to_vec(),
                volume: self.shape().to_vec()
            }
        );
        let cast = slice.cast(self.kind());
        match (self, cast) {
            (PixelArray::U8(v), PixelArray::U8(s)) => v.index_axis_mut(Axis(0), index).assign(&s),
            (PixelArray::I8(v), PixelArray::I8(s)) => v.index_axis_mut(Axis(0), index).assign(&s),
            (PixelArray::U16(v), PixelArray::U16(s)) => v.index_axis_mut(Axis(0), index).assign(&s),
            (PixelArray::I16(v), PixelArray::I16(s)) => v.index_axis_mut(Axis(0), index).assign(&s),
            (PixelArray::U32(v), PixelArray::U32(s)) => v.index_axis_mut(Axis(0), index).assign(&s),
            (PixelArray::I32(v), PixelArray::I32(s)) => v.index_axis_mut(Axis(0), index).assign(&s),
            (PixelArray::F32(v), PixelArray::F32(s)) => v.index_axis_mut(Axis(0), index).assign(&s),
            _ => unreachable!("cast produced a different element kind"),
        }
        Ok(())
    }

    fn min_max_i64(&self) -> Option<(i64, i64)> {
        fn min_max<T>(a: &ArrayD<T>) -> Option<(i64, i64)>
        where
            T: Copy + Into<i64>,
        {
            let mut iter = a.iter().map(|&v| v.into());
            let first = iter.next()?;
            let (mut min, mut max) = (first, first);
            for v in iter {
                if v < min {
                    min = v;
                }
                if v > max {
                    max = v;
                }
            }
            Some((min, max))
        }
        match self {
            PixelArray::U8(a) => min_max(a),
            PixelArray::I8(a) => min_max(a),
            PixelArray::U16(a) => min_max(a),
            PixelArray::I16(a) => min_max(a),
            PixelArray::U32(a) => min_max(a),
            PixelArray::I32(a) => min_max(a),
            PixelArray::F32(_) => None,
        }
    }

    /// Apply a rescale function, promoting the element type as required.
    ///
    /// An identity function leaves the array untouched, so raw values
    /// survive bit for bit. Non-integral parameters move the data to
    /// 32-bit floating point; integral ones keep integer arithmetic in the
    /// smallest element type whose range fits.
    pub fn rescale(self, rescale: Rescale) -> PixelArray {
        if rescale.is_identity() {
            return self;
        }
        let ints = match self {
            PixelArray::F32(mut a) => {
                let (s, o) = (rescale.slope as f32, rescale.intercept as f32);
                a.mapv_inplace(|v| v * s + o);
                return PixelArray::F32(a);
            }
            other => other,
        };
        if !rescale.is_integral() {
            let mut out = ints.cast(PixelKind::F32);
            if let PixelArray::F32(a) = &mut out {
                let (s, o) = (rescale.slope as f32, rescale.intercept as f32);
                a.mapv_inplace(|v| v * s + o);
            }
            return out;
        }
        let (slope, intercept) = (rescale.slope as i64, rescale.intercept as i64);
        let (min, max) = ints.min_max_i64().unwrap_or((0, 0));
        let kind = promoted_kind(min, max, slope, intercept);
        let mut out = ints.cast(kind);
        match &mut out {
            PixelArray::I8(a) => {
                let (s, o) = (slope as i8, intercept as i8);
                a.mapv_inplace(|v| v.wrapping_mul(s).wrapping_add(o));
            }
            PixelArray::I16(a) => {
                let (s, o) = (slope as i16, intercept as i16);
                a.mapv_inplace(|v| v.wrapping_mul(s).wrapping_add(o));
            }
            PixelArray::I32(a) => {
                let (s, o) = (slope as i32, intercept as i32);
                a.mapv_inplace(|v| v.wrapping_mul(s).wrapping_add(o));
            }
            PixelArray::F32(a) => {
                let (s, o) = (slope as f32, intercept as f32);
                a.mapv_inplace(|v| v * s + o);
            }
            _ => unreachable!("promotion never selects an unsigned kind"),
        }
        out
    }
}

/// Description of a modality rescale function,
/// defined by a _rescale slope_ and _rescale intercept_.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Rescale {
    /// the rescale slope
    pub slope: f64,
    /// the rescale intercept
    pub intercept: f64,
}

impl Rescale {
    /// Create a new rescale function.
    #[inline]
    pub fn new(slope: f64, intercept: f64) -> Self {
        Rescale { slope, intercept }
    }

    /// Apply the rescale function to a value.
    #[inline]
    pub fn apply(&self, value: f64) -> f64 {
        self.slope * value + self.intercept
    }

    /// Whether this function maps every value to itself.
    pub fn is_identity(&self) -> bool {
        self.slope == 1.0 && self.intercept == 0.0
    }

    /// Whether both parameters are whole numbers, so integer arithmetic
    /// can be kept.
    pub fn is_integral(&self) -> bool {
        self.slope.fract() == 0.0 && self.intercept.fract() == 0.0
    }
}

/// Choose the element kind for applying an integral rescale function,
/// given the data range.
///
/// The required range reuses the freshly updated minimum inside the
/// maximum's candidate list, and the non-negative branch selects signed
/// types against unsigned thresholds. Both choices reproduce observed
/// behavior and are kept for bit compatibility.
pub fn promoted_kind(min: i64, max: i64, slope: i64, intercept: i64) -> PixelKind {
    let min_req = min.min(min * slope + intercept).min(max * slope + intercept);
    let max_req = max
        .max(min_req * slope + intercept)
        .max(max * slope + intercept);
    if min_req < 0 {
        let bound = (-min_req).max(max_req);
        if bound < 1 << 7 {
            PixelKind::I8
        } else if bound < 1 << 15 {
            PixelKind::I16
        } else if bound < 1 << 31 {
            PixelKind::I32
        } else {
            PixelKind::F32
        }
    } else if max_req < 1 << 8 {
        PixelKind::I8
    } else if max_req < 1 << 16 {
        PixelKind::I16
    } else if max_req < 1i64 << 32 {
        PixelKind::I32
    } else {
        PixelKind::F32
    }
}

//! Whole-file data set reading.
//!
//! A [`DicomDataset`] is produced by a deterministic pipeline: preamble and
//! magic code check, file meta group scan, transfer syntax switch, body
//! scan collecting whitelisted attributes, and shape/sampling derivation.
//! The pixel payload is only located during parsing; it is loaded and
//! converted when [`DicomDataset::pixel_array`] is called.

use crate::meta;
use crate::pixeldata::{self, PixelArray, PixelKind, Rescale};
use byteordered::Endianness;
use minidicom_core::dictionary;
use minidicom_core::{Length, Value};
use minidicom_encoding::convert;
use minidicom_encoding::decode::{self, ElementDecoder, RawValue};
use minidicom_encoding::transfer_syntax;
use snafu::{OptionExt, ResultExt, Snafu};
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

#[derive(Debug, Snafu)]
pub enum Error {
    /// The file could not be opened at all.
    #[snafu(display("Could not open file {}: {}", path.display(), source))]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
        backtrace: snafu::Backtrace,
    },

    /// Preamble or file meta group failure, including the magic code check.
    #[snafu(display("{}", source))]
    Meta {
        #[snafu(backtrace)]
        source: meta::Error,
    },

    /// A body element could not be decoded.
    #[snafu(display("Could not decode data element: {}", source))]
    DecodeElement {
        #[snafu(backtrace)]
        source: decode::Error,
    },

    /// The data set advertises a transfer syntax this reader does not
    /// support (only uncompressed syntaxes and deflate are handled).
    #[snafu(display("Unsupported transfer syntax {:?}", uid))]
    UnsupportedTransferSyntax {
        uid: String,
        backtrace: snafu::Backtrace,
    },

    /// The deflated body could not be inflated into memory.
    #[snafu(display("Could not inflate the deflated data set: {}", source))]
    Inflate {
        source: std::io::Error,
        backtrace: snafu::Backtrace,
    },

    /// No pixel data element was found in the data set.
    #[snafu(display("No pixel data found in this data set"))]
    NoPixelData { backtrace: snafu::Backtrace },

    /// The pixel layout cannot be expressed as a typed array
    /// (for instance, multiple samples per pixel at a bit depth other
    /// than 8).
    #[snafu(display(
        "Unsupported pixel layout ({} samples per pixel, {} bits allocated)",
        samples_per_pixel,
        bits_allocated
    ))]
    UnsupportedPixelLayout {
        samples_per_pixel: u16,
        bits_allocated: u16,
        backtrace: snafu::Backtrace,
    },

    /// An attribute required for pixel materialization is missing.
    #[snafu(display("Missing required attribute `{}`", name))]
    MissingAttribute {
        name: &'static str,
        backtrace: snafu::Backtrace,
    },

    /// Deferred pixel bytes could not be fetched from the source.
    #[snafu(display("Could not read pixel data: {}", source))]
    ReadPixelData {
        source: std::io::Error,
        backtrace: snafu::Backtrace,
    },

    /// The pixel buffer could not be shaped into an array.
    #[snafu(display("{}", source))]
    PixelBuffer {
        #[snafu(backtrace)]
        source: pixeldata::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the input failed the `DICM` magic code check.
    /// Directory scans skip such files silently.
    pub fn is_not_dicom(&self) -> bool {
        matches!(
            self,
            Error::Meta {
                source: meta::Error::NotDicom { .. },
                ..
            }
        )
    }
}

/// A seekable byte source, type-erased so the reader can swap a file for
/// an in-memory buffer after inflating a deflated body.
pub(crate) trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Absolute position and declared length of the deferred pixel payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelLocation {
    pub offset: u64,
    pub len: Length,
}

/// A parsed DICOM data set: the whitelisted attributes, the derived shape
/// and sampling, and a descriptor of the deferred pixel payload.
pub struct DicomDataset {
    filename: Option<PathBuf>,
    info: BTreeMap<&'static str, Value>,
    shape: Option<Vec<usize>>,
    sampling: Option<Vec<f64>>,
    pixel_loc: Option<PixelLocation>,
    endianness: Endianness,
    implicit_vr: bool,
    /// set when the layout was recognized as unsupported during
    /// derivation; surfaced on materialization
    unsupported_layout: Option<(u16, u16)>,
    /// retained when there is no file to reopen for deferred pixel
    /// loading: in-memory input, or offsets into an inflated buffer
    source: Option<Box<dyn ReadSeek>>,
}

impl fmt::Debug for DicomDataset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DicomDataset")
            .field("filename", &self.filename)
            .field("info", &self.info)
            .field("shape", &self.shape)
            .field("sampling", &self.sampling)
            .field("pixel_loc", &self.pixel_loc)
            .field("endianness", &self.endianness)
            .field("implicit_vr", &self.implicit_vr)
            .finish()
    }
}

impl DicomDataset {
    /// Read a data set from a file on disk.
    ///
    /// The file handle is released after the metadata pass; deferred pixel
    /// bytes are fetched by reopening the path.
    pub fn open_file<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path).context(OpenFileSnafu { path })?;
        Self::parse(Box::new(BufReader::new(file)), Some(path.to_owned()))
    }

    /// Read a data set from an arbitrary seekable source.
    ///
    /// The source is retained by the data set so deferred pixel loading
    /// works without a file to reopen.
    pub fn from_reader<R>(reader: R) -> Result<Self>
    where
        R: Read + Seek + 'static,
    {
        Self::parse(Box::new(reader), None)
    }

    fn parse(mut source: Box<dyn ReadSeek>, filename: Option<PathBuf>) -> Result<Self> {
        meta::read_preamble(&mut source).context(MetaSnafu)?;
        let ts_uid = meta::read_meta_group(&mut source).context(MetaSnafu)?;

        let mut info = BTreeMap::new();
        if let Some(uid) = &ts_uid {
            info.insert("TransferSyntaxUID", Value::Str(uid.clone()));
        }

        let ts = match &ts_uid {
            None => &transfer_syntax::EXPLICIT_VR_LITTLE_ENDIAN,
            Some(uid) => transfer_syntax::lookup(uid)
                .context(UnsupportedTransferSyntaxSnafu { uid: uid.clone() })?,
        };

        let mut inflated = false;
        if ts.deflated {
            let buffer = transfer_syntax::inflate(&mut source).context(InflateSnafu)?;
            source = Box::new(Cursor::new(buffer));
            inflated = true;
        }

        let decoder = ElementDecoder::new(!ts.explicit_vr, ts.endianness);
        let mut dataset = DicomDataset {
            filename,
            info,
            shape: None,
            sampling: None,
            pixel_loc: None,
            endianness: ts.endianness,
            implicit_vr: !ts.explicit_vr,
            unsupported_layout: None,
            source: None,
        };
        dataset.read_body(&mut source, &decoder)?;
        dataset.derive_shape_and_sampling();

        if dataset.filename.is_none() || inflated {
            dataset.source = Some(source);
        }
        Ok(dataset)
    }

    /// Scan the body, collecting whitelisted attributes until the source
    /// is exhausted. An end of stream is the normal termination.
    fn read_body(
        &mut self,
        source: &mut Box<dyn ReadSeek>,
        decoder: &ElementDecoder,
    ) -> Result<()> {
        loop {
            let element = match decoder.read_element(&mut **source) {
                Ok(element) => element,
                Err(e) if e.is_end_of_stream() => break,
                Err(e) => return Err(e).context(DecodeElementSnafu),
            };
            match element.value {
                RawValue::PixelDeferred { offset, len } => {
                    self.pixel_loc = Some(PixelLocation { offset, len });
                }
                RawValue::Bytes(data) => {
                    let tag = element.header.tag;
                    if !dictionary::is_interesting_group(tag.group()) {
                        continue;
                    }
                    let entry = match dictionary::by_tag(tag) {
                        Some(entry) => entry,
                        None => continue,
                    };
                    // conversion follows the dictionary's VR, not the wire's
                    let value = match convert::decode_value(entry.vr, self.endianness, data) {
                        Ok(value) => value,
                        // a malformed fixed-size value ends the scan,
                        // like a short read would
                        Err(convert::Error::FixedSizeMismatch { .. }) => break,
                    };
                    self.info.insert(entry.alias, value);
                }
            }
        }
        Ok(())
    }

    /// Derive the array shape and the per-axis sampling without touching
    /// the pixel payload. Both stay absent when the geometry attributes
    /// are missing; an unsupported layout is remembered and surfaced on
    /// materialization.
    fn derive_shape_and_sampling(&mut self) {
        let rows = match self.rows() {
            Some(v) => v as usize,
            None => return,
        };
        let columns = match self.columns() {
            Some(v) => v as usize,
            None => return,
        };
        let samples = match self.samples_per_pixel() {
            Some(v) => v as usize,
            None => return,
        };
        let frames = self.number_of_frames().unwrap_or(1);

        let shape: Vec<usize> = if frames > 1 {
            if samples > 1 {
                vec![samples, frames as usize, rows, columns]
            } else {
                vec![frames as usize, rows, columns]
            }
        } else if samples > 1 {
            if self.bits_allocated() == Some(8) {
                vec![samples, rows, columns]
            } else {
                self.unsupported_layout =
                    Some((samples as u16, self.bits_allocated().unwrap_or(0)));
                return;
            }
        } else {
            vec![rows, columns]
        };

        let mut sampling: Vec<f64> = match self.pixel_spacing() {
            Some((row, col)) => vec![row, col],
            None => Vec::new(),
        };
        if let Some(spacing) = self.slice_spacing() {
            sampling.insert(0, spacing.abs());
        }
        // one sampling entry per axis: front-pad with 1.0 and keep the
        // trailing entries
        while sampling.len() < shape.len() {
            sampling.insert(0, 1.0);
        }
        if sampling.len() > shape.len() {
            let excess = sampling.len() - shape.len();
            sampling.drain(..excess);
        }

        self.info.insert(
            "shape",
            Value::ints(shape.iter().map(|&v| v as i64).collect::<Vec<_>>()),
        );
        self.info.insert("sampling", Value::floats(sampling.clone()));
        self.shape = Some(shape);
        self.sampling = Some(sampling);
    }

    /// The collected attributes, keyed by canonical name.
    pub fn info(&self) -> &BTreeMap<&'static str, Value> {
        &self.info
    }

    /// Look up a collected attribute by canonical name.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.info.get(name)
    }

    /// The path this data set was read from, when it came from a file.
    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// The derived array shape, absent for metadata-only data sets.
    pub fn shape(&self) -> Option<&[usize]> {
        self.shape.as_deref()
    }

    /// The derived per-axis sampling, absent for metadata-only data sets.
    pub fn sampling(&self) -> Option<&[f64]> {
        self.sampling.as_deref()
    }

    /// Whether a pixel data element was located while parsing.
    pub fn has_pixel_data(&self) -> bool {
        self.pixel_loc.is_some()
    }

    /// The byte order of the data set body.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn series_instance_uid(&self) -> Option<&str> {
        self.value("SeriesInstanceUID")?.string()
    }

    pub fn instance_number(&self) -> Option<i64> {
        self.value("InstanceNumber")?.int()
    }

    /// Whether the data set carries a patient-space position.
    pub fn has_image_position(&self) -> bool {
        self.value("ImagePositionPatient").is_some()
    }

    /// The z component of `ImagePositionPatient`, which orders slices.
    pub fn slice_position(&self) -> Option<f64> {
        self.value("ImagePositionPatient")?.float_at(2)
    }

    pub fn pixel_spacing(&self) -> Option<(f64, f64)> {
        let value = self.value("PixelSpacing")?;
        Some((value.float_at(0)?, value.float_at(1)?))
    }

    pub fn rows(&self) -> Option<u16> {
        self.value("Rows")?.int().and_then(|v| u16::try_from(v).ok())
    }

    pub fn columns(&self) -> Option<u16> {
        self.value("Columns")?
            .int()
            .and_then(|v| u16::try_from(v).ok())
    }

    pub fn bits_allocated(&self) -> Option<u16> {
        self.value("BitsAllocated")?
            .int()
            .and_then(|v| u16::try_from(v).ok())
    }

    pub fn pixel_representation(&self) -> Option<u16> {
        self.value("PixelRepresentation")?
            .int()
            .and_then(|v| u16::try_from(v).ok())
    }

    pub fn samples_per_pixel(&self) -> Option<u16> {
        self.value("SamplesPerPixel")?
            .int()
            .and_then(|v| u16::try_from(v).ok())
    }

    pub fn number_of_frames(&self) -> Option<i64> {
        self.value("NumberOfFrames")?.int()
    }

    pub fn rescale_slope(&self) -> Option<f64> {
        self.value("RescaleSlope")?.float()
    }

    pub fn rescale_intercept(&self) -> Option<f64> {
        self.value("RescaleIntercept")?.float()
    }

    /// Distance between slices, recorded from tag (0018,0088).
    pub fn slice_spacing(&self) -> Option<f64> {
        self.value("SliceSpacing")?.float()
    }

    /// Load the pixel data and convert it into a typed array with the
    /// data set's shape, byte order and rescaling applied.
    ///
    /// The raw byte buffer is dropped after conversion; calling this again
    /// fetches the bytes anew from the retained source or the file.
    pub fn pixel_array(&mut self) -> Result<PixelArray> {
        let loc = self.pixel_loc.context(NoPixelDataSnafu)?;
        if let Some((samples, bits)) = self.unsupported_layout {
            return UnsupportedPixelLayoutSnafu {
                samples_per_pixel: samples,
                bits_allocated: bits,
            }
            .fail();
        }
        let shape = match &self.shape {
            Some(shape) => shape.clone(),
            None => {
                return MissingAttributeSnafu {
                    name: self.missing_geometry_attribute(),
                }
                .fail()
            }
        };
        let bits = self
            .bits_allocated()
            .context(MissingAttributeSnafu {
                name: "BitsAllocated",
            })?;
        let representation = self.pixel_representation().context(MissingAttributeSnafu {
            name: "PixelRepresentation",
        })?;
        let kind = PixelKind::from_representation(representation, bits).context(
            UnsupportedPixelLayoutSnafu {
                samples_per_pixel: self.samples_per_pixel().unwrap_or(1),
                bits_allocated: bits,
            },
        )?;

        let raw = self.fetch_pixel_bytes(loc)?;
        let array = PixelArray::from_bytes(&raw, kind, &shape, self.endianness)
            .context(PixelBufferSnafu)?;
        drop(raw);

        let slope = self.rescale_slope();
        let intercept = self.rescale_intercept();
        if slope.is_some() || intercept.is_some() {
            let rescale = Rescale::new(slope.unwrap_or(1.0), intercept.unwrap_or(0.0));
            Ok(array.rescale(rescale))
        } else {
            Ok(array)
        }
    }

    fn missing_geometry_attribute(&self) -> &'static str {
        if self.rows().is_none() {
            "Rows"
        } else if self.columns().is_none() {
            "Columns"
        } else {
            "SamplesPerPixel"
        }
    }

    fn fetch_pixel_bytes(&mut self, loc: PixelLocation) -> Result<Vec<u8>> {
        let decoder = ElementDecoder::new(self.implicit_vr, self.endianness);
        if let Some(source) = self.source.as_mut() {
            return read_pixel_value(&mut **source, &decoder, loc);
        }
        let path = match &self.filename {
            Some(path) => path,
            None => return NoPixelDataSnafu.fail(),
        };
        let file = File::open(path).context(OpenFileSnafu { path })?;
        let mut reader = BufReader::new(file);
        read_pixel_value(&mut reader, &decoder, loc)
    }
}

fn read_pixel_value<S>(source: &mut S, decoder: &ElementDecoder, loc: PixelLocation) -> Result<Vec<u8>>
where
    S: Read + Seek + ?Sized,
{
    source
        .seek(SeekFrom::Start(loc.offset))
        .context(ReadPixelDataSnafu)?;
    if loc.len.is_undefined() {
        decoder
            .read_undefined_length_value(source)
            .context(DecodeElementSnafu)
    } else {
        let mut buf = vec![0u8; loc.len.0 as usize];
        source.read_exact(&mut buf).context(ReadPixelDataSnafu)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_dataset() -> DicomDataset {
        DicomDataset {
            filename: None,
            info: BTreeMap::new(),
            shape: None,
            sampling: None,
            pixel_loc: None,
            endianness: Endianness::Little,
            implicit_vr: false,
            unsupported_layout: None,
            source: None,
        }
    }

    fn with_geometry(rows: i64, columns: i64, samples: i64) -> DicomDataset {
        let mut ds = bare_dataset();
        ds.info.insert("Rows", Value::ints(Some(rows)));
        ds.info.insert("Columns", Value::ints(Some(columns)));
        ds.info.insert("SamplesPerPixel", Value::ints(Some(samples)));
        ds
    }

    #[test]
    fn plain_2d_shape() {
        let mut ds = with_geometry(4, 5, 1);
        ds.derive_shape_and_sampling();
        assert_eq!(ds.shape(), Some(&[4, 5][..]));
        assert_eq!(ds.sampling(), Some(&[1.0, 1.0][..]));
    }

    #[test]
    fn multi_frame_shape() {
        let mut ds = with_geometry(4, 5, 1);
        ds.info.insert("NumberOfFrames", Value::ints(Some(3)));
        ds.info
            .insert("PixelSpacing", Value::floats(vec![0.5, 0.25]));
        ds.info.insert("SliceSpacing", Value::floats(Some(-2.0)));
        ds.derive_shape_and_sampling();
        assert_eq!(ds.shape(), Some(&[3, 4, 5][..]));
        // slice spacing is recorded as an absolute distance
        assert_eq!(ds.sampling(), Some(&[2.0, 0.5, 0.25][..]));
    }

    #[test]
    fn multi_sample_shape_requires_8_bits() {
        let mut ds = with_geometry(4, 5, 3);
        ds.info.insert("BitsAllocated", Value::ints(Some(8)));
        ds.derive_shape_and_sampling();
        assert_eq!(ds.shape(), Some(&[3, 4, 5][..]));

        let mut ds = with_geometry(4, 5, 3);
        ds.info.insert("BitsAllocated", Value::ints(Some(16)));
        ds.derive_shape_and_sampling();
        assert_eq!(ds.shape(), None);
        assert_eq!(ds.unsupported_layout, Some((3, 16)));
    }

    #[test]
    fn sampling_is_truncated_to_the_shape() {
        // a 2-D image with slice spacing keeps only the trailing entries
        let mut ds = with_geometry(4, 5, 1);
        ds.info
            .insert("PixelSpacing", Value::floats(vec![0.5, 0.25]));
        ds.info.insert("SliceSpacing", Value::floats(Some(3.0)));
        ds.derive_shape_and_sampling();
        assert_eq!(ds.shape(), Some(&[4, 5][..]));
        assert_eq!(ds.sampling(), Some(&[0.5, 0.25][..]));
    }

    #[test]
    fn metadata_only_dataset_has_no_shape() {
        let mut ds = bare_dataset();
        ds.info
            .insert("SeriesInstanceUID", Value::Str("1.2.3".into()));
        ds.derive_shape_and_sampling();
        assert_eq!(ds.shape(), None);
        assert_eq!(ds.sampling(), None);

        let err = ds.pixel_array().unwrap_err();
        assert!(matches!(err, Error::NoPixelData { .. }));
    }

    #[test]
    fn shape_is_mirrored_into_the_info_map() {
        let mut ds = with_geometry(2, 3, 1);
        ds.derive_shape_and_sampling();
        assert_eq!(ds.value("shape"), Some(&Value::ints(vec![2, 3])));
        assert_eq!(ds.value("sampling"), Some(&Value::floats(vec![1.0, 1.0])));
    }
}

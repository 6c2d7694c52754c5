//! Wire-level decoding of DICOM data elements.
//!
//! A single [`ElementDecoder`] covers all four uncompressed wire modes:
//! the value representation may be implicit or explicit, and the byte
//! order little or big endian. The mode is plain runtime data because the
//! reader switches modes mid-stream, right after the file meta group.

use byteordered::{ByteOrdered, Endianness};
use minidicom_core::dictionary;
use minidicom_core::header::{self, DataElementHeader, Length, Tag, VR};
use snafu::{Backtrace, IntoError, Snafu};
use std::io::{Read, Seek, SeekFrom};

/// Number of bytes fetched per window while searching for the sequence
/// delimiter of an undefined-length value.
const UNDEFINED_VALUE_READ_SIZE: usize = 128;

/// Bytes carried over between windows so that a delimiter split across a
/// window boundary is still found.
const SEARCH_REWIND: usize = 3;

/// Module-level error type:
/// for errors which may occur while decoding DICOM data elements.
#[derive(Debug, Snafu)]
pub enum Error {
    /// The source ran out of bytes in the middle of an element.
    ///
    /// The data set reader also receives this as the normal termination
    /// signal when scanning a body of unknown size; see
    /// [`Error::is_end_of_stream`].
    #[snafu(display("Unexpected end of stream"))]
    EndOfStream { backtrace: Backtrace },

    /// The two value representation bytes of an explicit element are not
    /// ASCII letters.
    #[snafu(display("Value representation bytes {:?} are not ASCII letters", bytes))]
    BadVrBytes { bytes: [u8; 2], backtrace: Backtrace },

    /// The byte source reported an error other than a short read.
    #[snafu(display("Could not access the byte source: {}", source))]
    Io {
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error marks the normal end of a data set body.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::EndOfStream { .. })
    }
}

fn short_read(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        EndOfStreamSnafu.build()
    } else {
        IoSnafu.into_error(e)
    }
}

fn read_exact<S>(source: &mut S, buf: &mut [u8]) -> Result<()>
where
    S: Read + ?Sized,
{
    source.read_exact(buf).map_err(short_read)
}

/// A freshly decoded data element: its header plus the raw payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RawElement {
    pub header: DataElementHeader,
    pub value: RawValue,
}

/// The payload of a decoded element.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// The value bytes, fully read from the source.
    Bytes(Vec<u8>),
    /// Pixel data was not loaded; `offset` is the absolute position where
    /// its value starts in the source.
    PixelDeferred { offset: u64, len: Length },
}

/// A data element decoder for one of the uncompressed wire modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementDecoder {
    pub implicit_vr: bool,
    pub endianness: Endianness,
}

impl ElementDecoder {
    /// Create a decoder for the given mode.
    pub fn new(implicit_vr: bool, endianness: Endianness) -> Self {
        ElementDecoder {
            implicit_vr,
            endianness,
        }
    }

    /// Decoder for the file meta group, which is always encoded in
    /// Explicit VR Little Endian.
    pub fn file_meta() -> Self {
        ElementDecoder::new(false, Endianness::Little)
    }

    fn read_u16<S>(&self, source: &mut S) -> Result<u16>
    where
        S: Read + ?Sized,
    {
        ByteOrdered::runtime(source, self.endianness)
            .read_u16()
            .map_err(short_read)
    }

    fn read_u32<S>(&self, source: &mut S) -> Result<u32>
    where
        S: Read + ?Sized,
    {
        ByteOrdered::runtime(source, self.endianness)
            .read_u32()
            .map_err(short_read)
    }

    /// Decode one data element from the source.
    ///
    /// Pixel data (7FE0,0010) is never loaded here: its position and length
    /// are recorded in the returned value and the source is advanced past
    /// it. Any other element with an undefined length has its value
    /// recovered by scanning for the sequence delimiter.
    pub fn read_element<S>(&self, source: &mut S) -> Result<RawElement>
    where
        S: Read + Seek + ?Sized,
    {
        let group = self.read_u16(source)?;
        let element = self.read_u16(source)?;
        let tag = Tag(group, element);

        let (vr, len) = if self.implicit_vr {
            let len = self.read_u32(source)?;
            // the VR is assumed from the dictionary where known
            let vr = dictionary::by_tag(tag).map(|e| e.vr).unwrap_or(VR::UN);
            (vr, Length(len))
        } else {
            let mut bytes = [0u8; 2];
            read_exact(source, &mut bytes)?;
            if !bytes.iter().all(u8::is_ascii_alphabetic) {
                return BadVrBytesSnafu { bytes }.fail();
            }
            let vr = VR::from_binary(bytes).unwrap_or(VR::UN);
            // only these four carry the reserved pad and a 32-bit length
            if matches!(&bytes, b"OB" | b"OW" | b"SQ" | b"UN") {
                let mut reserved = [0u8; 2];
                read_exact(source, &mut reserved)?;
                (vr, Length(self.read_u32(source)?))
            } else {
                (vr, Length(u32::from(self.read_u16(source)?)))
            }
        };

        let header = DataElementHeader { tag, vr, len };

        if tag == dictionary::tags::PIXEL_DATA {
            let offset = source.stream_position().map_err(short_read)?;
            // skip by the declared length, even when undefined: the next
            // read then reports end of stream, which ends the body scan
            source
                .seek(SeekFrom::Start(offset + u64::from(len.0)))
                .map_err(short_read)?;
            return Ok(RawElement {
                header,
                value: RawValue::PixelDeferred { offset, len },
            });
        }

        let value = if len.is_undefined() {
            self.read_undefined_length_value(source)?
        } else {
            let mut buf = vec![0u8; len.0 as usize];
            read_exact(source, &mut buf)?;
            buf
        };
        Ok(RawElement {
            header,
            value: RawValue::Bytes(value),
        })
    }

    /// The 4-byte needle announcing the end of an undefined-length value:
    /// the sequence delimiter tag packed in the current endianness.
    pub fn delimiter_needle(&self) -> [u8; 4] {
        let Tag(group, element) = header::SEQUENCE_DELIMITER;
        let mut needle = [0u8; 4];
        match self.endianness {
            Endianness::Little => {
                needle[..2].copy_from_slice(&group.to_le_bytes());
                needle[2..].copy_from_slice(&element.to_le_bytes());
            }
            Endianness::Big => {
                needle[..2].copy_from_slice(&group.to_be_bytes());
                needle[2..].copy_from_slice(&element.to_be_bytes());
            }
        }
        needle
    }

    /// Read a value of undefined length by scanning for the sequence
    /// delimiter tag.
    ///
    /// The source is consumed in fixed-size windows, keeping a 3-byte
    /// overlap between consecutive windows so a delimiter crossing the
    /// boundary is still found. On success the cursor is positioned right
    /// after the delimiter and its 4-byte length field, which should be
    /// zero (a non-zero field is reported as a warning, not an error).
    pub fn read_undefined_length_value<S>(&self, source: &mut S) -> Result<Vec<u8>>
    where
        S: Read + Seek + ?Sized,
    {
        let needle = self.delimiter_needle();
        let mut value = Vec::new();
        loop {
            let window_start = source.stream_position().map_err(short_read)?;
            let mut window = [0u8; UNDEFINED_VALUE_READ_SIZE];
            let filled = read_available(source, &mut window)?;
            if filled < UNDEFINED_VALUE_READ_SIZE {
                return EndOfStreamSnafu.fail();
            }
            if let Some(index) = find_needle(&window, &needle) {
                value.extend_from_slice(&window[..index]);
                source
                    .seek(SeekFrom::Start(window_start + index as u64 + 4))
                    .map_err(short_read)?;
                let mut pad = [0u8; 4];
                read_exact(source, &mut pad)?;
                if pad != [0u8; 4] {
                    tracing::warn!("expected 4 zero bytes after undefined length delimiter");
                }
                return Ok(value);
            }
            value.extend_from_slice(&window[..UNDEFINED_VALUE_READ_SIZE - SEARCH_REWIND]);
            source
                .seek(SeekFrom::Current(-(SEARCH_REWIND as i64)))
                .map_err(short_read)?;
        }
    }
}

/// Fill as much of `buf` as the source can provide, tolerating short reads.
fn read_available<S>(source: &mut S, buf: &mut [u8]) -> Result<usize>
where
    S: Read + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).map_err(short_read)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn find_needle(window: &[u8], needle: &[u8; 4]) -> Option<usize> {
    window.windows(needle.len()).position(|w| w == needle)
}

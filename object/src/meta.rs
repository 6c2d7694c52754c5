//! Reading of the DICOM preamble and the file meta group.

use minidicom_core::dictionary::tags;
use minidicom_encoding::decode::{self, ElementDecoder, RawValue};
use snafu::{ResultExt, Snafu};
use std::io::{ErrorKind, Read, Seek, SeekFrom};

const DICM_MAGIC_CODE: [u8; 4] = [b'D', b'I', b'C', b'M'];

#[derive(Debug, Snafu)]
pub enum Error {
    /// Invalid DICOM data, detected by checking the `DICM` code.
    #[snafu(display("Invalid DICOM file (magic code check failed)"))]
    NotDicom { backtrace: snafu::Backtrace },

    /// The preamble could not be read for a reason other than a short file.
    #[snafu(display("Could not read DICOM preamble: {}", source))]
    ReadPreamble {
        source: std::io::Error,
        backtrace: snafu::Backtrace,
    },

    /// An issue occurred while decoding the next data element
    /// in the file meta group. A premature end of stream lands here too:
    /// the meta group must be complete.
    #[snafu(display("Could not decode file meta group element: {}", source))]
    DecodeMetaElement {
        #[snafu(backtrace)]
        source: decode::Error,
    },

    /// The byte source could not be repositioned.
    #[snafu(display("Could not seek the byte source: {}", source))]
    SeekSource {
        source: std::io::Error,
        backtrace: snafu::Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Check the 128-byte preamble and the `DICM` magic code.
///
/// Exactly bytes 128..132 are inspected; nothing else in the preamble is
/// interpreted.
pub fn read_preamble<S>(source: &mut S) -> Result<()>
where
    S: Read + Seek,
{
    source.seek(SeekFrom::Start(128)).context(SeekSourceSnafu)?;
    let mut magic = [0u8; 4];
    match source.read_exact(&mut magic) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return NotDicomSnafu.fail(),
        Err(e) => return Err(e).context(ReadPreambleSnafu),
    }
    snafu::ensure!(magic == DICM_MAGIC_CODE, NotDicomSnafu);
    Ok(())
}

/// Scan the file meta group and return the transfer syntax UID, if present.
///
/// The meta group is always encoded in Explicit VR Little Endian. The scan
/// stops at the first element outside group 0002 and rewinds the source to
/// its start, so the body can be decoded in its own mode. The group length
/// element (0002,0000) is parsed like any other and deliberately not
/// trusted.
pub fn read_meta_group<S>(source: &mut S) -> Result<Option<String>>
where
    S: Read + Seek,
{
    let decoder = ElementDecoder::file_meta();
    let mut transfer_syntax = None;
    loop {
        let element_start = source.stream_position().context(SeekSourceSnafu)?;
        let element = decoder
            .read_element(source)
            .context(DecodeMetaElementSnafu)?;
        if element.header.tag.group() != 0x0002 {
            source
                .seek(SeekFrom::Start(element_start))
                .context(SeekSourceSnafu)?;
            break;
        }
        if element.header.tag == tags::TRANSFER_SYNTAX_UID {
            if let RawValue::Bytes(data) = element.value {
                let uid = String::from_utf8_lossy(&data);
                transfer_syntax = Some(uid.trim_matches('\0').to_string());
            }
        }
    }
    Ok(transfer_syntax)
}

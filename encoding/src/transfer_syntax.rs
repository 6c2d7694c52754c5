//! The transfer syntaxes this reader understands.
//!
//! The table is a closed set of constants; there is no run-time
//! registration. A data set advertising any other transfer syntax is
//! rejected by the reader.

use byteordered::Endianness;
use std::io::Read;

/// A transfer syntax descriptor: how a data set body is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSyntax {
    /// The unique identifier string of this transfer syntax.
    pub uid: &'static str,
    /// A short descriptive name.
    pub name: &'static str,
    /// The byte order of the body.
    pub endianness: Endianness,
    /// Whether elements carry an explicit value representation.
    pub explicit_vr: bool,
    /// Whether the whole body is wrapped in a raw DEFLATE stream.
    pub deflated: bool,
}

impl TransferSyntax {
    const fn new(
        uid: &'static str,
        name: &'static str,
        endianness: Endianness,
        explicit_vr: bool,
        deflated: bool,
    ) -> Self {
        TransferSyntax {
            uid,
            name,
            endianness,
            explicit_vr,
            deflated,
        }
    }
}

pub const IMPLICIT_VR_LITTLE_ENDIAN: TransferSyntax = TransferSyntax::new(
    "1.2.840.10008.1.2",
    "Implicit VR Little Endian",
    Endianness::Little,
    false,
    false,
);

pub const EXPLICIT_VR_LITTLE_ENDIAN: TransferSyntax = TransferSyntax::new(
    "1.2.840.10008.1.2.1",
    "Explicit VR Little Endian",
    Endianness::Little,
    true,
    false,
);

pub const EXPLICIT_VR_BIG_ENDIAN: TransferSyntax = TransferSyntax::new(
    "1.2.840.10008.1.2.2",
    "Explicit VR Big Endian",
    Endianness::Big,
    true,
    false,
);

pub const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: TransferSyntax = TransferSyntax::new(
    "1.2.840.10008.1.2.1.99",
    "Deflated Explicit VR Little Endian",
    Endianness::Little,
    true,
    true,
);

/// JPEG Lossless SV1. The data set decodes as Explicit VR Little Endian;
/// pixel data is passed through still compressed and is not decoded here.
pub const JPEG_LOSSLESS_SV1: TransferSyntax = TransferSyntax::new(
    "1.2.840.10008.1.2.4.70",
    "JPEG Lossless, Non-Hierarchical, First-Order Prediction",
    Endianness::Little,
    true,
    false,
);

/// Look up a known transfer syntax by its UID.
pub fn lookup(uid: &str) -> Option<&'static TransferSyntax> {
    match uid {
        "1.2.840.10008.1.2" => Some(&IMPLICIT_VR_LITTLE_ENDIAN),
        "1.2.840.10008.1.2.1" => Some(&EXPLICIT_VR_LITTLE_ENDIAN),
        "1.2.840.10008.1.2.2" => Some(&EXPLICIT_VR_BIG_ENDIAN),
        "1.2.840.10008.1.2.1.99" => Some(&DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN),
        "1.2.840.10008.1.2.4.70" => Some(&JPEG_LOSSLESS_SV1),
        _ => None,
    }
}

/// Inflate the remainder of a deflated data set into memory.
///
/// The stream is raw DEFLATE, without a zlib header or trailer.
pub fn inflate<S: Read>(source: S) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    flate2::read::DeflateDecoder::new(source).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn lookup_known_uids() {
        assert_eq!(
            lookup("1.2.840.10008.1.2.1"),
            Some(&EXPLICIT_VR_LITTLE_ENDIAN)
        );
        assert_eq!(lookup("1.2.840.10008.1.2.2"), Some(&EXPLICIT_VR_BIG_ENDIAN));
        assert_eq!(lookup("1.2.840.10008.1.2"), Some(&IMPLICIT_VR_LITTLE_ENDIAN));
        assert!(lookup("1.2.840.10008.1.2").map_or(false, |ts| !ts.explicit_vr));
        assert!(lookup("1.2.840.10008.1.2.1.99").map_or(false, |ts| ts.deflated));
        assert_eq!(lookup("1.2.840.10008.1.2.4.70"), Some(&JPEG_LOSSLESS_SV1));
        assert_eq!(lookup("1.2.840.10008.1.2.4.50"), None);
        assert_eq!(lookup(""), None);
    }

    #[test]
    fn inflate_raw_deflate_stream() {
        let payload = b"a body of data elements".repeat(20);
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let inflated = inflate(&compressed[..]).expect("should inflate");
        assert_eq!(inflated, payload);
    }
}

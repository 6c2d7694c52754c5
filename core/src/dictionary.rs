//! The fixed attribute dictionary of this reader.
//!
//! Unlike a full standard dictionary, this is a closed whitelist: only the
//! attributes listed here are recorded when reading a data set. All other
//! elements are still parsed for their length, but their bytes are
//! discarded. The `is_interesting_group` check lets the reader skip the
//! dictionary lookup for most elements.

use crate::header::{Tag, VR};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// An entry in the attribute whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryEntry {
    /// The attribute tag.
    pub tag: Tag,
    /// The canonical attribute name.
    pub alias: &'static str,
    /// The value representation used to convert the attribute's value.
    pub vr: VR,
}

const fn entry(tag: Tag, alias: &'static str, vr: VR) -> DictionaryEntry {
    DictionaryEntry { tag, alias, vr }
}

/// The complete attribute whitelist.
///
/// Note that the geometry attributes in group 0020 carry VR `CS` here, so
/// their values go through the number splitting conversion. That is what
/// makes `ImagePositionPatient` usable as a coordinate triplet.
pub static ENTRIES: &[DictionaryEntry] = &[
    entry(tags::PIXEL_DATA, "PixelData", VR::OB),
    // Date and time
    entry(Tag(0x0008, 0x0020), "StudyDate", VR::DA),
    entry(Tag(0x0008, 0x0021), "SeriesDate", VR::DA),
    entry(Tag(0x0008, 0x0022), "AcquisitionDate", VR::DA),
    entry(Tag(0x0008, 0x0023), "ContentDate", VR::DA),
    entry(Tag(0x0008, 0x0030), "StudyTime", VR::TM),
    entry(Tag(0x0008, 0x0031), "SeriesTime", VR::TM),
    entry(Tag(0x0008, 0x0032), "AcquisitionTime", VR::TM),
    entry(Tag(0x0008, 0x0033), "ContentTime", VR::TM),
    // With what, where, by whom?
    entry(Tag(0x0008, 0x0060), "Modality", VR::CS),
    entry(Tag(0x0008, 0x0070), "Manufacturer", VR::LO),
    entry(Tag(0x0008, 0x0080), "InstitutionName", VR::LO),
    // Descriptions
    entry(Tag(0x0008, 0x1030), "StudyDescription", VR::LO),
    entry(Tag(0x0008, 0x103E), "SeriesDescription", VR::LO),
    // UIDs
    entry(Tag(0x0008, 0x0016), "SOPClassUID", VR::UI),
    entry(Tag(0x0008, 0x0018), "SOPInstanceUID", VR::UI),
    entry(Tag(0x0008, 0x0117), "ContextUID", VR::UI),
    entry(Tag(0x0020, 0x000D), "StudyInstanceUID", VR::UI),
    entry(Tag(0x0020, 0x000E), "SeriesInstanceUID", VR::UI),
    // Numbers
    entry(Tag(0x0020, 0x0011), "SeriesNumber", VR::IS),
    entry(Tag(0x0020, 0x0012), "AcquisitionNumber", VR::IS),
    entry(Tag(0x0020, 0x0013), "InstanceNumber", VR::IS),
    entry(Tag(0x0020, 0x0014), "IsotopeNumber", VR::IS),
    entry(Tag(0x0020, 0x0015), "PhaseNumber", VR::IS),
    entry(Tag(0x0020, 0x0016), "IntervalNumber", VR::IS),
    entry(Tag(0x0020, 0x0017), "TimeSlotNumber", VR::IS),
    entry(Tag(0x0020, 0x0018), "AngleNumber", VR::IS),
    entry(Tag(0x0020, 0x0019), "ItemNumber", VR::IS),
    // Patient orientation and position
    entry(Tag(0x0020, 0x0020), "PatientOrientation", VR::CS),
    entry(Tag(0x0020, 0x0030), "ImagePosition", VR::CS),
    entry(Tag(0x0020, 0x0032), "ImagePositionPatient", VR::CS),
    entry(Tag(0x0020, 0x0035), "ImageOrientation", VR::CS),
    entry(Tag(0x0020, 0x0037), "ImageOrientationPatient", VR::CS),
    // Patient information
    entry(Tag(0x0010, 0x0010), "PatientName", VR::PN),
    entry(Tag(0x0010, 0x0020), "PatientID", VR::LO),
    entry(Tag(0x0010, 0x0030), "PatientBirthDate", VR::DA),
    entry(Tag(0x0010, 0x0040), "PatientSex", VR::CS),
    entry(Tag(0x0010, 0x1010), "PatientAge", VR::AS),
    entry(Tag(0x0010, 0x1020), "PatientSize", VR::DS),
    entry(Tag(0x0010, 0x1030), "PatientWeight", VR::DS),
    // Image geometry and encoding (required to construct the pixel array)
    entry(Tag(0x0028, 0x0002), "SamplesPerPixel", VR::US),
    entry(Tag(0x0028, 0x0008), "NumberOfFrames", VR::IS),
    entry(Tag(0x0028, 0x0100), "BitsAllocated", VR::US),
    entry(Tag(0x0028, 0x0101), "BitsStored", VR::US),
    entry(Tag(0x0028, 0x0102), "HighBit", VR::US),
    entry(Tag(0x0028, 0x0103), "PixelRepresentation", VR::US),
    entry(Tag(0x0028, 0x0010), "Rows", VR::US),
    entry(Tag(0x0028, 0x0011), "Columns", VR::US),
    entry(Tag(0x0028, 0x0052), "RescaleIntercept", VR::DS),
    entry(Tag(0x0028, 0x0053), "RescaleSlope", VR::DS),
    // Image geometry (for the user)
    entry(Tag(0x0028, 0x0030), "PixelSpacing", VR::DS),
    entry(Tag(0x0018, 0x0088), "SliceSpacing", VR::DS),
];

static BY_TAG: Lazy<HashMap<Tag, &'static DictionaryEntry>> =
    Lazy::new(|| ENTRIES.iter().map(|e| (e.tag, e)).collect());

static GROUPS: Lazy<HashSet<u16>> = Lazy::new(|| ENTRIES.iter().map(|e| e.tag.group()).collect());

/// Look up a whitelisted attribute by tag.
pub fn by_tag(tag: Tag) -> Option<&'static DictionaryEntry> {
    BY_TAG.get(&tag).copied()
}

/// Whether the given group number holds at least one whitelisted attribute.
/// Elements of other groups can be skipped without a dictionary lookup.
pub fn is_interesting_group(group: u16) -> bool {
    GROUPS.contains(&group)
}

/// Constants for the attributes that downstream logic reads directly.
pub mod tags {
    use crate::header::Tag;

    /// Pixel Data
    pub const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);
    /// Transfer Syntax UID
    pub const TRANSFER_SYNTAX_UID: Tag = Tag(0x0002, 0x0010);
    /// Series Instance UID
    pub const SERIES_INSTANCE_UID: Tag = Tag(0x0020, 0x000E);
    /// Instance Number
    pub const INSTANCE_NUMBER: Tag = Tag(0x0020, 0x0013);
    /// Image Position (Patient)
    pub const IMAGE_POSITION_PATIENT: Tag = Tag(0x0020, 0x0032);
    /// Samples per Pixel
    pub const SAMPLES_PER_PIXEL: Tag = Tag(0x0028, 0x0002);
    /// Number of Frames
    pub const NUMBER_OF_FRAMES: Tag = Tag(0x0028, 0x0008);
    /// Rows
    pub const ROWS: Tag = Tag(0x0028, 0x0010);
    /// Columns
    pub const COLUMNS: Tag = Tag(0x0028, 0x0011);
    /// Bits Allocated
    pub const BITS_ALLOCATED: Tag = Tag(0x0028, 0x0100);
    /// Pixel Representation
    pub const PIXEL_REPRESENTATION: Tag = Tag(0x0028, 0x0103);
    /// Rescale Intercept
    pub const RESCALE_INTERCEPT: Tag = Tag(0x0028, 0x0052);
    /// Rescale Slope
    pub const RESCALE_SLOPE: Tag = Tag(0x0028, 0x0053);
    /// Pixel Spacing
    pub const PIXEL_SPACING: Tag = Tag(0x0028, 0x0030);
    /// Spacing Between Slices, recorded here as `SliceSpacing`
    pub const SLICE_SPACING: Tag = Tag(0x0018, 0x0088);
}

//! Directory scanning, series assembly, and host reader tests over
//! synthetic DICOM files.

use minidicom_series::{can_read, scan, DicomReader, Expect, Progress, ProgressSink, Request};
use minidicom_object::PixelArray;
use std::path::Path;

#[derive(Default)]
struct CapturingSink {
    messages: Vec<String>,
}

impl ProgressSink for CapturingSink {
    fn write(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }
}

fn element_le(group: u16, element: u16, vr: &[u8; 2], value: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&group.to_le_bytes());
    out.extend_from_slice(&element.to_le_bytes());
    out.extend_from_slice(vr);
    if [b"OB", b"OW", b"SQ", b"UN"].contains(&vr) {
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    } else {
        out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    }
    out.extend_from_slice(value);
    out
}

fn us(value: u16) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

fn padded(text: String) -> Vec<u8> {
    let mut bytes = text.into_bytes();
    if bytes.len() % 2 != 0 {
        bytes.push(b' ');
    }
    bytes
}

struct SliceSpec<'a> {
    suid: &'a str,
    instance: i64,
    z: f64,
    rows: u16,
    columns: u16,
    pixel_spacing: (f64, f64),
    pixels: Vec<u8>,
}

impl<'a> SliceSpec<'a> {
    fn new(suid: &'a str, instance: i64, z: f64) -> Self {
        SliceSpec {
            suid,
            instance,
            z,
            rows: 2,
            columns: 2,
            pixel_spacing: (1.0, 1.0),
            pixels: vec![instance as u8; 4],
        }
    }

    fn build(&self) -> Vec<u8> {
        let mut raw = vec![0u8; 128];
        raw.extend_from_slice(b"DICM");
        raw.extend_from_slice(&element_le(0x0002, 0x0010, b"UI", b"1.2.840.10008.1.2.1\0"));

        let mut suid = self.suid.as_bytes().to_vec();
        if suid.len() % 2 != 0 {
            suid.push(0);
        }
        raw.extend_from_slice(&element_le(0x0020, 0x000E, b"UI", &suid));
        raw.extend_from_slice(&element_le(
            0x0020,
            0x0013,
            b"IS",
            &padded(self.instance.to_string()),
        ));
        raw.extend_from_slice(&element_le(
            0x0020,
            0x0032,
            b"DS",
            &padded(format!("0\\0\\{}", self.z)),
        ));
        raw.extend_from_slice(&element_le(0x0028, 0x0010, b"US", &us(self.rows)));
        raw.extend_from_slice(&element_le(0x0028, 0x0011, b"US", &us(self.columns)));
        raw.extend_from_slice(&element_le(0x0028, 0x0100, b"US", &us(8)));
        raw.extend_from_slice(&element_le(0x0028, 0x0103, b"US", &us(0)));
        raw.extend_from_slice(&element_le(0x0028, 0x0002, b"US", &us(1)));
        raw.extend_from_slice(&element_le(
            0x0028,
            0x0030,
            b"DS",
            &padded(format!("{}\\{}", self.pixel_spacing.0, self.pixel_spacing.1)),
        ));
        raw.extend_from_slice(&element_le(0x7FE0, 0x0010, b"OB", &self.pixels));
        raw
    }
}

fn write_slices(dir: &Path, specs: &[SliceSpec]) {
    for (i, spec) in specs.iter().enumerate() {
        let path = dir.join(format!("slice{:03}.dcm", i));
        std::fs::write(path, spec.build()).unwrap();
    }
}

#[test]
fn groups_and_splits_a_gated_series() {
    // three contiguous slices and one far away: the far slice becomes its
    // own sub-series, both keeping the parent UID
    let dir = tempfile::tempdir().unwrap();
    write_slices(
        dir.path(),
        &[
            SliceSpec::new("S", 1, 0.0),
            SliceSpec::new("S", 2, 1.0),
            SliceSpec::new("S", 3, 2.0),
            SliceSpec::new("S", 4, 10.0),
        ],
    );

    let mut sink = CapturingSink::default();
    let series = scan(dir.path(), &mut sink).expect("scan should succeed");
    assert_eq!(series.len(), 2);
    assert_eq!(series[0].suid(), "S");
    assert_eq!(series[1].suid(), "S");
    assert_eq!(series[0].len(), 3);
    assert_eq!(series[1].len(), 1);
    assert_eq!(series[0].shape(), Some(&[3, 2, 2][..]));
    assert_eq!(series[0].sampling().map(|s| s[0]), Some(1.0));
}

#[test]
fn splits_into_two_equal_volumes() {
    let dir = tempfile::tempdir().unwrap();
    write_slices(
        dir.path(),
        &[
            SliceSpec::new("S", 1, 0.0),
            SliceSpec::new("S", 2, 1.0),
            SliceSpec::new("S", 3, 2.0),
            SliceSpec::new("S", 4, 10.0),
            SliceSpec::new("S", 5, 11.0),
            SliceSpec::new("S", 6, 12.0),
        ],
    );

    let mut sink = CapturingSink::default();
    let series = scan(dir.path(), &mut sink).expect("scan should succeed");
    assert_eq!(series.len(), 2);
    assert_eq!(series[0].len(), 3);
    assert_eq!(series[1].len(), 3);
    // instance order survives the split
    let instances: Vec<i64> = series[1]
        .iter()
        .filter_map(|ds| ds.instance_number())
        .collect();
    assert_eq!(instances, vec![4, 5, 6]);
}

#[test]
fn widened_gap_warns_but_does_not_split() {
    // 3.6 - 2.0 = 1.6 is beyond 1.5x the running distance but below the
    // 2.1x split threshold
    let dir = tempfile::tempdir().unwrap();
    write_slices(
        dir.path(),
        &[
            SliceSpec::new("S", 1, 0.0),
            SliceSpec::new("S", 2, 1.0),
            SliceSpec::new("S", 3, 2.0),
            SliceSpec::new("S", 4, 3.6),
            SliceSpec::new("S", 5, 4.6),
        ],
    );

    let mut sink = CapturingSink::default();
    let series = scan(dir.path(), &mut sink).expect("scan should succeed");
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].len(), 5);
    let warnings: Vec<&String> = sink
        .messages
        .iter()
        .filter(|m| m.contains("missing file"))
        .collect();
    assert_eq!(warnings.len(), 1);
}

#[test]
fn slice_distance_is_independent_of_file_order() {
    let dir = tempfile::tempdir().unwrap();
    // written in reverse instance order on purpose
    write_slices(
        dir.path(),
        &[SliceSpec::new("S", 2, 3.0), SliceSpec::new("S", 1, 0.0)],
    );

    let mut sink = CapturingSink::default();
    let series = scan(dir.path(), &mut sink).expect("scan should succeed");
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].sampling().map(|s| s[0]), Some(3.0));
    let instances: Vec<i64> = series[0]
        .iter()
        .filter_map(|ds| ds.instance_number())
        .collect();
    assert_eq!(instances, vec![1, 2]);
}

#[test]
fn scanning_twice_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    write_slices(
        dir.path(),
        &[
            SliceSpec::new("B", 1, 0.0),
            SliceSpec::new("A", 2, 1.0),
            SliceSpec::new("A", 1, 0.0),
        ],
    );

    let mut sink = CapturingSink::default();
    let first: Vec<(String, Vec<i64>)> = scan(dir.path(), &mut sink)
        .unwrap()
        .iter()
        .map(|s| {
            (
                s.suid().to_string(),
                s.iter().filter_map(|ds| ds.instance_number()).collect(),
            )
        })
        .collect();
    let second: Vec<(String, Vec<i64>)> = scan(dir.path(), &mut sink)
        .unwrap()
        .iter()
        .map(|s| {
            (
                s.suid().to_string(),
                s.iter().filter_map(|ds| ds.instance_number()).collect(),
            )
        })
        .collect();
    assert_eq!(first, second);
    // series are sorted by UID
    assert_eq!(first[0].0, "A");
    assert_eq!(first[1].0, "B");
}

#[test]
fn skips_dicomdir_and_foreign_files() {
    let dir = tempfile::tempdir().unwrap();
    write_slices(dir.path(), &[SliceSpec::new("S", 1, 0.0)]);
    std::fs::write(dir.path().join("DICOMDIR"), b"whatever").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"not dicom at all").unwrap();

    let mut sink = CapturingSink::default();
    let series = scan(dir.path(), &mut sink).expect("scan should succeed");
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].len(), 1);
    assert!(sink.messages.is_empty());
}

#[test]
fn corrupt_file_is_reported_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_slices(dir.path(), &[SliceSpec::new("S", 1, 0.0)]);
    // valid magic code, then an unreadable meta group
    let mut corrupt = vec![0u8; 128];
    corrupt.extend_from_slice(b"DICM");
    corrupt.extend_from_slice(&[0x02, 0x00, 0x10, 0x00, b'U', b'I', 0x40, 0x00, 0x01]);
    std::fs::write(dir.path().join("broken.dcm"), corrupt).unwrap();

    let mut sink = CapturingSink::default();
    let series = scan(dir.path(), &mut sink).expect("scan should succeed");
    assert_eq!(series.len(), 1);
    assert_eq!(sink.messages.len(), 1);
}

#[test]
fn dimension_mismatch_drops_the_series() {
    let dir = tempfile::tempdir().unwrap();
    let mut big = SliceSpec::new("S", 2, 1.0);
    big.rows = 3;
    big.columns = 3;
    big.pixels = vec![0; 9];
    write_slices(dir.path(), &[SliceSpec::new("S", 1, 0.0), big]);

    let mut sink = CapturingSink::default();
    let series = scan(dir.path(), &mut sink).expect("scan should succeed");
    assert!(series.is_empty());
    assert!(sink
        .messages
        .iter()
        .any(|m| m.contains("Dimensions of slices do not match")));
}

#[test]
fn sampling_mismatch_warns_but_keeps_the_series() {
    let dir = tempfile::tempdir().unwrap();
    let mut odd = SliceSpec::new("S", 2, 1.0);
    odd.pixel_spacing = (0.5, 0.5);
    write_slices(dir.path(), &[SliceSpec::new("S", 1, 0.0), odd]);

    let mut sink = CapturingSink::default();
    let series = scan(dir.path(), &mut sink).expect("scan should succeed");
    assert_eq!(series.len(), 1);
    assert!(sink
        .messages
        .iter()
        .any(|m| m.contains("sampling does not match")));
    // the per-slice sampling suffix comes from the last slice in
    // instance order, the base attributes from the first
    assert_eq!(series[0].sampling(), Some(&[1.0, 0.5, 0.5][..]));
    assert_eq!(series[0].shape(), Some(&[2, 2, 2][..]));
}

#[test]
fn volume_stacks_slices_in_instance_order() {
    let dir = tempfile::tempdir().unwrap();
    write_slices(
        dir.path(),
        &[
            SliceSpec::new("S", 3, 2.0),
            SliceSpec::new("S", 1, 0.0),
            SliceSpec::new("S", 2, 1.0),
        ],
    );

    let mut sink = CapturingSink::default();
    let mut series = scan(dir.path(), &mut sink).expect("scan should succeed");
    assert_eq!(series.len(), 1);
    let volume = series[0].volume(&mut sink).expect("volume should load");
    assert_eq!(volume.shape(), &[3, 2, 2]);
    match &volume {
        PixelArray::U8(a) => {
            // the fixture fills each slice with its instance number
            assert_eq!(a[[0, 0, 0]], 1);
            assert_eq!(a[[1, 0, 0]], 2);
            assert_eq!(a[[2, 1, 1]], 3);
        }
        other => panic!("expected 8-bit pixels, got {:?}", other.kind()),
    }
}

#[test]
fn image_expectation_on_a_single_slice_file() {
    let dir = tempfile::tempdir().unwrap();
    write_slices(dir.path(), &[SliceSpec::new("S", 1, 0.0)]);
    let path = dir.path().join("slice000.dcm");

    let request = Request::from_path(&path, Expect::Image).unwrap();
    assert!(can_read(&request));

    let mut reader = DicomReader::open(request, Progress::Silent).expect("open should succeed");
    assert_eq!(reader.length().unwrap(), 1);
    let frame = reader.data(0).expect("first frame should load");
    assert_eq!(frame.shape(), &[2, 2]);
    let err = reader.data(1).unwrap_err();
    assert!(err.to_string().contains("only one slice"));
}

#[test]
fn volume_expectation_loads_the_whole_series() {
    let dir = tempfile::tempdir().unwrap();
    write_slices(
        dir.path(),
        &[
            SliceSpec::new("S", 1, 0.0),
            SliceSpec::new("S", 2, 1.0),
            SliceSpec::new("S", 3, 2.0),
        ],
    );
    let path = dir.path().join("slice000.dcm");

    let request = Request::from_path(&path, Expect::Volume).unwrap();
    let mut reader = DicomReader::open(request, Progress::Silent).expect("open should succeed");
    // the opened file holds one slice, so the series count applies
    assert_eq!(reader.length().unwrap(), 1);
    let volume = reader.data(0).expect("volume should load");
    assert_eq!(volume.shape(), &[3, 2, 2]);
}

#[test]
fn multi_image_expectation_flattens_all_series() {
    let dir = tempfile::tempdir().unwrap();
    write_slices(
        dir.path(),
        &[
            SliceSpec::new("A", 1, 0.0),
            SliceSpec::new("A", 2, 1.0),
            SliceSpec::new("B", 1, 0.0),
        ],
    );
    let path = dir.path().join("slice000.dcm");

    let request = Request::from_path(&path, Expect::MultiImage).unwrap();
    let mut reader = DicomReader::open(request, Progress::Silent).expect("open should succeed");
    assert_eq!(reader.length().unwrap(), 3);
    let frame = reader.data(2).expect("last frame should load");
    assert_eq!(frame.shape(), &[2, 2]);
    assert!(reader.data(3).is_err());
}

#[test]
fn multi_volume_expectation_counts_series() {
    let dir = tempfile::tempdir().unwrap();
    write_slices(
        dir.path(),
        &[
            SliceSpec::new("A", 1, 0.0),
            SliceSpec::new("A", 2, 1.0),
            SliceSpec::new("B", 1, 0.0),
        ],
    );
    let path = dir.path().join("slice000.dcm");

    let request = Request::from_path(&path, Expect::MultiVolume).unwrap();
    let mut reader = DicomReader::open(request, Progress::Silent).expect("open should succeed");
    assert_eq!(reader.length().unwrap(), 2);
    let first = reader.data(0).expect("first volume should load");
    assert_eq!(first.shape(), &[2, 2, 2]);
    let second = reader.data(1).expect("second volume should load");
    assert_eq!(second.shape(), &[2, 2]);
}

#[test]
fn meta_exposes_the_current_attributes() {
    let dir = tempfile::tempdir().unwrap();
    write_slices(dir.path(), &[SliceSpec::new("S", 1, 0.0)]);
    let path = dir.path().join("slice000.dcm");

    let request = Request::from_path(&path, Expect::Image).unwrap();
    let mut reader = DicomReader::open(request, Progress::Silent).expect("open should succeed");
    let info = reader.meta(None).expect("meta should be present");
    assert_eq!(info.get("Rows").and_then(|v| v.int()), Some(2));
    assert_eq!(
        info.get("SeriesInstanceUID").and_then(|v| v.string()),
        Some("S")
    );
}

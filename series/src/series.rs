//! Grouping of data sets into coherent series and volume assembly.
//!
//! A directory scan parses every file's metadata, buckets the data sets by
//! `SeriesInstanceUID`, sorts each bucket by instance number, splits a
//! bucket when the slice positions show a discontinuity (as found in
//! unsplit gated acquisitions), and finally checks each surviving series
//! for consistency while computing its stacked shape and sampling.

use crate::progress::ProgressSink;
use minidicom_core::Value;
use minidicom_object::{DicomDataset, PixelArray};
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A gap this much larger than the running slice distance starts a new
/// sub-series.
const SPLIT_FACTOR: f64 = 2.1;
/// A gap this much larger than the running slice distance suggests a
/// missing file, but does not split.
const MISSING_FACTOR: f64 = 1.5;

#[derive(Debug, Snafu)]
pub enum Error {
    /// The scan path is neither a file nor a directory.
    #[snafu(display("Not a valid file or directory: {}", path.display()))]
    InvalidPath {
        path: PathBuf,
        backtrace: snafu::Backtrace,
    },

    /// Two slices of one series disagree on their pixel matrix size.
    #[snafu(display("Dimensions of slices do not match"))]
    DimensionMismatch { backtrace: snafu::Backtrace },

    /// An attribute needed to finalize the series is missing.
    #[snafu(display("Missing required attribute `{}`", name))]
    MissingAttribute {
        name: &'static str,
        backtrace: snafu::Backtrace,
    },

    /// The series holds no data sets.
    #[snafu(display("Series does not contain any files"))]
    EmptySeries { backtrace: snafu::Backtrace },

    /// The series was never finalized, so its stacked shape is unknown.
    #[snafu(display("Series has no stacked shape"))]
    UnfinishedSeries { backtrace: snafu::Backtrace },

    /// A slice of the series could not be read or materialized.
    #[snafu(display("{}", source))]
    ReadSlice {
        #[snafu(backtrace)]
        source: minidicom_object::Error,
    },

    /// A materialized slice could not be stacked into the volume.
    #[snafu(display("{}", source))]
    Stack {
        #[snafu(backtrace)]
        source: minidicom_object::pixeldata::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// A series of data sets that belong together: when there are multiple
/// files, they are the slices of one volume.
#[derive(Debug)]
pub struct DicomSeries {
    suid: String,
    entries: Vec<DicomDataset>,
    info: BTreeMap<&'static str, Value>,
    shape: Option<Vec<usize>>,
    sampling: Option<Vec<f64>>,
}

impl DicomSeries {
    fn new(suid: String) -> Self {
        DicomSeries {
            suid,
            entries: Vec::new(),
            info: BTreeMap::new(),
            shape: None,
            sampling: None,
        }
    }

    /// The `SeriesInstanceUID` shared by all slices.
    pub fn suid(&self) -> &str {
        &self.suid
    }

    /// Number of data sets in this series.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the series holds no data sets.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The data set at the given position, in sorted order.
    pub fn get(&self, index: usize) -> Option<&DicomDataset> {
        self.entries.get(index)
    }

    /// Mutable access to the data set at the given position.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut DicomDataset> {
        self.entries.get_mut(index)
    }

    /// Iterate over the data sets in sorted order.
    pub fn iter(&self) -> std::slice::Iter<'_, DicomDataset> {
        self.entries.iter()
    }

    /// The attributes of the first slice, with the stacked shape and
    /// sampling written over them once the series is finalized.
    pub fn info(&self) -> &BTreeMap<&'static str, Value> {
        &self.info
    }

    /// The stacked shape `(nslices, rows, columns)` of the series.
    pub fn shape(&self) -> Option<&[usize]> {
        self.shape.as_deref()
    }

    /// The stacked sampling `(slice distance, row, column)` of the series.
    pub fn sampling(&self) -> Option<&[f64]> {
        self.sampling.as_deref()
    }

    /// A short human readable description: patient name, dimensions, and
    /// the series description, where present.
    pub fn description(&self) -> String {
        if self.info.is_empty() {
            return format!("DICOM series containing {} images", self.len());
        }
        let mut fields = Vec::new();
        if let Some(name) = self.info.get("PatientName").and_then(Value::string) {
            fields.push(name.to_string());
        }
        if let Some(shape) = &self.shape {
            let dims: Vec<String> = shape.iter().map(ToString::to_string).collect();
            fields.push(dims.join("x"));
        }
        if let Some(description) = self.info.get("SeriesDescription").and_then(Value::string) {
            fields.push(format!("'{}'", description));
        }
        fields.join(" ")
    }

    /// Sort by instance number, ascending. The sort is stable, so slices
    /// with equal numbers keep their input order; slices without a number
    /// order first.
    fn sort_by_instance(&mut self) {
        self.entries.sort_by_key(DicomDataset::instance_number);
    }

    /// Check the slices for consistency and compute the stacked shape and
    /// sampling. The inter-slice distance is the mean of the pairwise
    /// position gaps.
    fn finalize(&mut self, sink: &mut dyn ProgressSink) -> Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }
        if self.entries.len() == 1 {
            let ds = &self.entries[0];
            self.info = ds.info().clone();
            self.shape = ds.shape().map(<[usize]>::to_vec);
            self.sampling = ds.sampling().map(<[f64]>::to_vec);
            return Ok(());
        }

        let first = &self.entries[0];
        let dimensions = (first.rows(), first.columns());
        let spacing = first.pixel_spacing();
        let mut previous_z = first.slice_position().context(MissingAttributeSnafu {
            name: "ImagePositionPatient",
        })?;
        let mut distance_sum = 0.0;
        for ds in &self.entries {
            let z = ds.slice_position().context(MissingAttributeSnafu {
                name: "ImagePositionPatient",
            })?;
            distance_sum += (previous_z - z).abs();
            ensure!(
                (ds.rows(), ds.columns()) == dimensions,
                DimensionMismatchSnafu
            );
            if ds.pixel_spacing() != spacing {
                sink.write("Warning: sampling does not match.");
            }
            previous_z = z;
        }
        let distance_mean = distance_sum / (self.entries.len() - 1) as f64;

        let last = &self.entries[self.entries.len() - 1];
        let last_shape = last
            .shape()
            .context(MissingAttributeSnafu { name: "Rows" })?
            .to_vec();
        let last_sampling = last
            .sampling()
            .context(MissingAttributeSnafu { name: "PixelSpacing" })?
            .to_vec();

        self.info = self.entries[0].info().clone();

        let mut shape = Vec::with_capacity(last_shape.len() + 1);
        shape.push(self.entries.len());
        shape.extend_from_slice(&last_shape);
        let mut sampling = Vec::with_capacity(last_sampling.len() + 1);
        sampling.push(distance_mean);
        sampling.extend_from_slice(&last_sampling);

        self.info.insert(
            "shape",
            Value::ints(shape.iter().map(|&v| v as i64).collect::<Vec<_>>()),
        );
        self.info.insert("sampling", Value::floats(sampling.clone()));
        self.shape = Some(shape);
        self.sampling = Some(sampling);
        Ok(())
    }

    /// Load all slices and stack them into one array. A single-slice
    /// series yields that slice's array directly.
    pub fn volume(&mut self, sink: &mut dyn ProgressSink) -> Result<PixelArray> {
        ensure!(!self.entries.is_empty(), EmptySeriesSnafu);
        if self.entries.len() == 1 {
            return self.entries[0].pixel_array().context(ReadSliceSnafu);
        }
        let shape = match &self.shape {
            Some(shape) => shape.clone(),
            None => return UnfinishedSeriesSnafu.fail(),
        };

        // the first slice determines the element type
        let first = self.entries[0].pixel_array().context(ReadSliceSnafu)?;
        let mut volume = PixelArray::zeros(first.kind(), &shape);
        volume.assign_slice(0, &first).context(StackSnafu)?;

        sink.start("loading data", "", self.entries.len());
        for z in 1..self.entries.len() {
            let slice = self.entries[z].pixel_array().context(ReadSliceSnafu)?;
            volume.assign_slice(z, &slice).context(StackSnafu)?;
            sink.set_progress(z + 1);
        }
        sink.finish(None);
        Ok(volume)
    }
}

/// Scan a directory (or the directory of a file) and return the coherent
/// series found in it, sorted by series UID.
///
/// Files failing the magic code check are skipped silently; other per-file
/// errors are reported through the sink and the file is skipped. Traversal
/// is recursive, with paths sorted so the result does not depend on the
/// listing order of the file system. Anything with `DICOMDIR` in its path
/// is ignored.
pub fn scan<P>(path: P, sink: &mut dyn ProgressSink) -> Result<Vec<DicomSeries>>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let dir: &Path = if path.is_dir() {
        path
    } else if path.is_file() {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    } else {
        return InvalidPathSnafu { path }.fail();
    };

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    let mut buckets: BTreeMap<String, DicomSeries> = BTreeMap::new();
    let mut count = 0;
    sink.start("examining files", "files", files.len());
    for file in &files {
        if file.to_string_lossy().contains("DICOMDIR") {
            continue;
        }
        let dataset = match DicomDataset::open_file(file) {
            Ok(dataset) => dataset,
            Err(e) if e.is_not_dicom() => {
                tracing::debug!("skipping non-DICOM file {}", file.display());
                continue;
            }
            Err(e) => {
                sink.write(&e.to_string());
                continue;
            }
        };
        // data sets without a series UID are some other kind of DICOM file
        let suid = match dataset.series_instance_uid() {
            Some(suid) => suid.to_string(),
            None => continue,
        };
        buckets
            .entry(suid.clone())
            .or_insert_with(|| DicomSeries::new(suid))
            .entries
            .push(dataset);
        count += 1;
        sink.set_progress(count);
    }

    // BTreeMap iteration gives the deterministic UID order
    let mut series: Vec<DicomSeries> = buckets.into_iter().map(|(_, s)| s).collect();

    // walk backwards so freshly inserted sub-series are not revisited
    let mut index = series.len();
    while index > 0 {
        index -= 1;
        split_series_at(&mut series, index, sink);
    }

    let total = series.len();
    let mut finished = Vec::with_capacity(total);
    for (i, mut serie) in series.into_iter().enumerate() {
        match serie.finalize(sink) {
            Ok(()) => finished.push(serie),
            Err(e @ Error::DimensionMismatch { .. }) => sink.write(&e.to_string()),
            // report-like files without pixel metadata: drop quietly
            Err(_) => {}
        }
        sink.set_progress(i + 1);
    }
    sink.finish(Some(&format!("Found {} correct series.", total)));
    Ok(finished)
}

/// Split the series at `index` into multiple series if the slice positions
/// show a discontinuity. Sub-series take the parent's place in the list,
/// earlier bucket first.
fn split_series_at(series: &mut Vec<DicomSeries>, index: usize, sink: &mut dyn ProgressSink) {
    series[index].sort_by_instance();
    let entries = &series[index].entries;
    if entries.is_empty() || !entries[0].has_image_position() {
        return;
    }
    // positions must be complete to attempt a split
    let positions: Vec<f64> = match entries
        .iter()
        .map(DicomDataset::slice_position)
        .collect::<Option<Vec<_>>>()
    {
        Some(positions) => positions,
        None => return,
    };
    let labels: Vec<String> = entries
        .iter()
        .map(|ds| {
            ds.filename()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unknown file>".to_string())
        })
        .collect();

    let mut bucket_sizes = vec![1usize];
    let mut distance = 0.0f64;
    for i in 1..positions.len() {
        let new_distance = (positions[i] - positions[i - 1]).abs();
        if distance != 0.0 && new_distance > SPLIT_FACTOR * distance {
            bucket_sizes.push(0);
            distance = 0.0;
        } else {
            if distance != 0.0 && new_distance > MISSING_FACTOR * distance {
                sink.write(&format!("Warning: missing file after {:?}", labels[i - 1]));
            }
            distance = new_distance;
        }
        if let Some(last) = bucket_sizes.last_mut() {
            *last += 1;
        }
    }
    if bucket_sizes.len() < 2 {
        return;
    }

    let parent = series.remove(index);
    let suid = parent.suid;
    let mut entries = parent.entries;
    let mut pieces = Vec::with_capacity(bucket_sizes.len());
    for size in bucket_sizes {
        let rest = entries.split_off(size);
        let mut piece = DicomSeries::new(suid.clone());
        piece.entries = entries;
        entries = rest;
        pieces.push(piece);
    }
    for piece in pieces.into_iter().rev() {
        series.insert(index, piece);
    }
}

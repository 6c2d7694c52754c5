//! The host-facing reader surface, as consumed by a generic image I/O
//! registry.
//!
//! The host hands over a [`Request`] naming the resource and what kind of
//! result it expects ([`Expect`]). Format detection sniffs the `DICM`
//! magic code in the request's first bytes; the advisory file extensions
//! are only a hint. A [`DicomReader`] then exposes the view matching the
//! expectation: single slices, a flattened slice list, or whole volumes.

use crate::progress::{Progress, ProgressSink};
use crate::series::{self, DicomSeries};
use minidicom_core::Value;
use minidicom_object::{pixeldata, DicomDataset, PixelArray};
use snafu::{ResultExt, Snafu};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Advisory file extensions for format detection. Content sniffing on the
/// `DICM` magic code is authoritative.
pub const FILE_EXTENSIONS: &[&str] = &["dcm", "ct", "mri"];

/// What the host expects to read from the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// A single 2-D image.
    Image,
    /// Multiple 2-D images.
    MultiImage,
    /// A single volume.
    Volume,
    /// Multiple volumes, one per series.
    MultiVolume,
}

/// A read request from the host.
#[derive(Debug, Clone)]
pub struct Request {
    /// Path to the resource: a file, or a directory of files.
    pub filename: PathBuf,
    /// At least the first 132 bytes of the resource; empty for
    /// directories.
    pub firstbytes: Vec<u8>,
    /// The kind of result the host wants.
    pub expect: Expect,
}

impl Request {
    /// Build a request for the given path, capturing the leading bytes of
    /// regular files for format detection.
    pub fn from_path<P>(path: P, expect: Expect) -> std::io::Result<Request>
    where
        P: AsRef<Path>,
    {
        let filename = path.as_ref().to_owned();
        let mut firstbytes = Vec::new();
        if filename.is_file() {
            let mut buf = [0u8; 256];
            let mut file = File::open(&filename)?;
            let mut filled = 0;
            while filled < buf.len() {
                let n = file.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            firstbytes.extend_from_slice(&buf[..filled]);
        }
        Ok(Request {
            filename,
            firstbytes,
            expect,
        })
    }
}

/// Whether the resource looks like a DICOM file: bytes 128..132 must be
/// the `DICM` magic code. No other bytes are inspected.
pub fn can_read(request: &Request) -> bool {
    request.firstbytes.get(128..132) == Some(b"DICM".as_ref())
}

#[derive(Debug, Snafu)]
pub enum Error {
    /// A data set could not be read or materialized.
    #[snafu(display("{}", source))]
    OpenDataset {
        #[snafu(backtrace)]
        source: minidicom_object::Error,
    },

    /// The directory scan or a volume load failed.
    #[snafu(display("{}", source))]
    Series {
        #[snafu(backtrace)]
        source: series::Error,
    },

    /// A slice could not be taken out of the loaded volume.
    #[snafu(display("{}", source))]
    Slice {
        #[snafu(backtrace)]
        source: pixeldata::Error,
    },

    /// An index above 0 was used on a single-slice file.
    #[snafu(display("Data set contains only one slice"))]
    SingleSlice { backtrace: snafu::Backtrace },

    /// The index does not name a slice, series, or volume.
    #[snafu(display("Index {} is out of bounds", index))]
    OutOfBounds {
        index: usize,
        backtrace: snafu::Backtrace,
    },

    /// The resource yielded no data sets at all.
    #[snafu(display("No data sets found"))]
    NoData { backtrace: snafu::Backtrace },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reader over a single file or a directory of files, exposing the view
/// selected by the request's expectation.
pub struct DicomReader {
    request: Request,
    info: Option<BTreeMap<&'static str, Value>>,
    data: Option<PixelArray>,
    series: Option<Vec<DicomSeries>>,
    sink: Box<dyn ProgressSink>,
}

impl std::fmt::Debug for DicomReader {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("DicomReader")
            .field("request", &self.request)
            .field("info", &self.info)
            .field("data", &self.data)
            .field("series", &self.series)
            .finish()
    }
}

impl DicomReader {
    /// Open the requested resource.
    ///
    /// A file is parsed and its pixel array materialized right away; for a
    /// directory everything is deferred to the lazy series scan.
    pub fn open<P>(request: Request, progress: P) -> Result<Self>
    where
        P: Into<Progress>,
    {
        let sink = progress.into().into_sink();
        let (info, data) = if request.filename.is_dir() {
            (None, None)
        } else {
            let mut dataset =
                DicomDataset::open_file(&request.filename).context(OpenDatasetSnafu)?;
            let array = dataset.pixel_array().context(OpenDatasetSnafu)?;
            (Some(dataset.info().clone()), Some(array))
        };
        Ok(DicomReader {
            request,
            info,
            data,
            series: None,
            sink,
        })
    }

    /// The series found next to the opened resource. Evaluated lazily:
    /// the first access triggers a directory scan.
    pub fn series(&mut self) -> Result<&mut Vec<DicomSeries>> {
        self.ensure_series()?;
        match self.series.as_mut() {
            Some(series) => Ok(series),
            None => NoDataSnafu.fail(),
        }
    }

    fn ensure_series(&mut self) -> Result<()> {
        if self.series.is_none() {
            let scanned =
                series::scan(&self.request.filename, &mut *self.sink).context(SeriesSnafu)?;
            self.series = Some(scanned);
        }
        Ok(())
    }

    /// Make sure a current data set is loaded: for directory requests the
    /// first slice of the first series takes that role.
    fn ensure_current(&mut self) -> Result<()> {
        if self.data.is_some() {
            return Ok(());
        }
        self.ensure_series()?;
        let series = match self.series.as_mut() {
            Some(series) => series,
            None => return NoDataSnafu.fail(),
        };
        let first = match series.first_mut() {
            Some(first) => first,
            None => return NoDataSnafu.fail(),
        };
        let dataset = match first.get_mut(0) {
            Some(dataset) => dataset,
            None => return NoDataSnafu.fail(),
        };
        let info = dataset.info().clone();
        let data = dataset.pixel_array().context(OpenDatasetSnafu)?;
        self.info = Some(info);
        self.data = Some(data);
        Ok(())
    }

    fn nslices(&self) -> usize {
        self.data.as_ref().map_or(1, PixelArray::num_slices)
    }

    /// How many items the reader exposes under the requested expectation.
    pub fn length(&mut self) -> Result<usize> {
        self.ensure_current()?;
        let nslices = self.nslices();
        match self.request.expect {
            // be honest about what is in the file
            Expect::Image => Ok(nslices),
            Expect::MultiImage => {
                if nslices > 1 {
                    Ok(nslices)
                } else {
                    self.ensure_series()?;
                    Ok(self.series.iter().flatten().map(DicomSeries::len).sum())
                }
            }
            Expect::Volume => {
                if nslices > 1 {
                    Ok(1)
                } else {
                    // one volume per series
                    self.ensure_series()?;
                    Ok(self.series.as_ref().map_or(0, Vec::len))
                }
            }
            Expect::MultiVolume => {
                self.ensure_series()?;
                Ok(self.series.as_ref().map_or(0, Vec::len))
            }
        }
    }

    /// The item at `index` under the requested expectation.
    pub fn data(&mut self, index: usize) -> Result<PixelArray> {
        self.ensure_current()?;
        let nslices = self.nslices();
        match self.request.expect {
            Expect::Image => {
                let data = match &self.data {
                    Some(data) => data,
                    None => return NoDataSnafu.fail(),
                };
                if nslices > 1 {
                    data.slice_at(index).context(SliceSnafu)
                } else if index == 0 {
                    Ok(data.clone())
                } else {
                    SingleSliceSnafu.fail()
                }
            }
            Expect::MultiImage => {
                if index == 0 && nslices > 1 {
                    let data = match &self.data {
                        Some(data) => data,
                        None => return NoDataSnafu.fail(),
                    };
                    data.slice_at(0).context(SliceSnafu)
                } else {
                    // flatten all series into one slice list
                    self.ensure_series()?;
                    let series = match self.series.as_mut() {
                        Some(series) => series,
                        None => return NoDataSnafu.fail(),
                    };
                    let mut i = index;
                    for serie in series.iter_mut() {
                        if i < serie.len() {
                            let dataset = match serie.get_mut(i) {
                                Some(dataset) => dataset,
                                None => return OutOfBoundsSnafu { index }.fail(),
                            };
                            return dataset.pixel_array().context(OpenDatasetSnafu);
                        }
                        i -= serie.len();
                    }
                    OutOfBoundsSnafu { index }.fail()
                }
            }
            Expect::Volume | Expect::MultiVolume => {
                if index == 0 && nslices > 1 {
                    match &self.data {
                        Some(data) => Ok(data.clone()),
                        None => NoDataSnafu.fail(),
                    }
                } else {
                    self.ensure_series()?;
                    let DicomReader { series, sink, .. } = self;
                    let series = match series.as_mut() {
                        Some(series) => series,
                        None => return NoDataSnafu.fail(),
                    };
                    let serie = match series.get_mut(index) {
                        Some(serie) => serie,
                        None => return OutOfBoundsSnafu { index }.fail(),
                    };
                    serie.volume(&mut **sink).context(SeriesSnafu)
                }
            }
        }
    }

    /// The metadata of the item at `index`, or of the current data set
    /// when no index is given.
    pub fn meta(&mut self, index: Option<usize>) -> Result<&BTreeMap<&'static str, Value>> {
        self.ensure_current()?;
        let nslices = self.nslices();
        let index = match index {
            Some(index) => index,
            None => return self.current_info(),
        };
        match self.request.expect {
            Expect::Image => self.current_info(),
            Expect::MultiImage => {
                if index == 0 && nslices > 1 {
                    return self.current_info();
                }
                self.ensure_series()?;
                let series = match &self.series {
                    Some(series) => series,
                    None => return NoDataSnafu.fail(),
                };
                let mut i = index;
                for serie in series.iter() {
                    if i < serie.len() {
                        match serie.get(i) {
                            Some(dataset) => return Ok(dataset.info()),
                            None => return OutOfBoundsSnafu { index }.fail(),
                        }
                    }
                    i -= serie.len();
                }
                OutOfBoundsSnafu { index }.fail()
            }
            Expect::Volume | Expect::MultiVolume => {
                if index == 0 && nslices > 1 {
                    return self.current_info();
                }
                self.ensure_series()?;
                let series = match &self.series {
                    Some(series) => series,
                    None => return NoDataSnafu.fail(),
                };
                match series.get(index) {
                    Some(serie) => Ok(serie.info()),
                    None => OutOfBoundsSnafu { index }.fail(),
                }
            }
        }
    }

    fn current_info(&self) -> Result<&BTreeMap<&'static str, Value>> {
        match &self.info {
            Some(info) => Ok(info),
            None => NoDataSnafu.fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_the_magic_code_only() {
        let mut firstbytes = vec![0xAB; 128];
        firstbytes.extend_from_slice(b"DICM");
        let request = Request {
            filename: PathBuf::from("image.dcm"),
            firstbytes,
            expect: Expect::Image,
        };
        assert!(can_read(&request));
    }

    #[test]
    fn rejects_short_or_wrong_prefixes() {
        let request = Request {
            filename: PathBuf::from("image.dcm"),
            firstbytes: b"DICM".to_vec(),
            expect: Expect::Image,
        };
        assert!(!can_read(&request));

        let mut firstbytes = vec![0u8; 128];
        firstbytes.extend_from_slice(b"DCIM");
        let request = Request {
            filename: PathBuf::from("image.dcm"),
            firstbytes,
            expect: Expect::Image,
        };
        assert!(!can_read(&request));
    }

    #[test]
    fn advisory_extensions() {
        assert_eq!(FILE_EXTENSIONS, &["dcm", "ct", "mri"]);
    }
}

//! Typed access to the HDF5 files tracked particles live in.
//!
//! Datasets are addressed by `/`-separated paths from the file root. 1D
//! datasets are read by element range, 2D datasets by row and column range.

use std::path::{Path, PathBuf};

use hdf5::types::{FloatSize, IntSize, TypeDescriptor};
use hdf5::{Dataset, File, Group};
use ndarray::{s, ArrayView1};
use track_core::{AxisData, DType, Element, TrackError, TrackResult};

#[derive(Clone, Debug, PartialEq)]
pub struct DatasetInfo {
    pub dtype: DType,
    pub shape: Vec<usize>,
}

impl DatasetInfo {
    fn of(name: &str, dataset: &Dataset) -> TrackResult<Self> {
        let dtype = match dataset.dtype()?.to_descriptor()? {
            TypeDescriptor::Unsigned(IntSize::U8) => DType::U64,
            TypeDescriptor::Integer(IntSize::U2) => DType::I16,
            TypeDescriptor::Float(FloatSize::U8) => DType::F64,
            other => {
                return Err(TrackError::Parse(format!(
                    "dataset '{name}' has unsupported element type {other:?}"
                )))
            }
        };
        Ok(Self {
            dtype,
            shape: dataset.shape(),
        })
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements per row of a 2D dataset (1D datasets are a single row).
    pub fn row_len(&self) -> usize {
        match self.shape.as_slice() {
            [_, cols] => *cols,
            _ => self.len(),
        }
    }

    pub fn n_rows(&self) -> usize {
        match self.shape.as_slice() {
            [rows, _] => *rows,
            _ => 1,
        }
    }

    fn check(&self, name: &str, dtype: DType, row: Option<usize>, start: usize, len: usize) -> TrackResult<()> {
        if dtype != self.dtype {
            return Err(TrackError::Mismatch(format!(
                "dataset '{name}' holds {} values, requested {}",
                self.dtype.as_str(),
                dtype.as_str()
            )));
        }
        let (rank, limit) = match row {
            Some(row) => {
                if row >= self.n_rows() {
                    return Err(TrackError::Mismatch(format!(
                        "row {row} out of bounds for dataset '{name}' of {} rows",
                        self.n_rows()
                    )));
                }
                (2, self.row_len())
            }
            None => (1, self.len()),
        };
        if self.shape.len() != rank {
            return Err(TrackError::Mismatch(format!(
                "dataset '{name}' has shape {:?}, expected {rank} dimensions",
                self.shape
            )));
        }
        if start + len > limit {
            return Err(TrackError::Mismatch(format!(
                "range {start}..{} out of bounds for dataset '{name}' of {limit} elements",
                start + len
            )));
        }
        Ok(())
    }
}

fn copy_into<T: Copy>(values: &ndarray::Array1<T>, out: &mut [T]) {
    for (dst, v) in out.iter_mut().zip(values.iter()) {
        *dst = *v;
    }
}

/// Read-only view of an HDF5 file.
#[derive(Debug)]
pub struct ContainerReader {
    path: PathBuf,
    file: File,
}

impl ContainerReader {
    pub fn open(path: impl Into<PathBuf>) -> TrackResult<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, name: &str) -> bool {
        self.file.link_exists(name)
    }

    pub fn dataset(&self, name: &str) -> TrackResult<DatasetInfo> {
        DatasetInfo::of(name, &self.open_dataset(name)?)
    }

    /// Immediate child names under `group` (`""` is the root), sorted.
    pub fn children(&self, group: &str) -> TrackResult<Vec<String>> {
        let mut names = if group.is_empty() {
            self.file.member_names()?
        } else {
            self.file.group(group)?.member_names()?
        };
        names.sort();
        Ok(names)
    }

    fn open_dataset(&self, name: &str) -> TrackResult<Dataset> {
        self.file
            .dataset(name)
            .map_err(|e| TrackError::Parse(format!("dataset '{name}' not found: {e}")))
    }

    /// Read `out.len()` elements of a 1D dataset starting at `start`.
    pub fn read_range<T: Element>(&self, name: &str, start: usize, out: &mut [T]) -> TrackResult<()> {
        let dataset = self.open_dataset(name)?;
        DatasetInfo::of(name, &dataset)?.check(name, T::DTYPE, None, start, out.len())?;
        if out.is_empty() {
            return Ok(());
        }
        let values = dataset.read_slice_1d::<T, _>(s![start..start + out.len()])?;
        copy_into(&values, out);
        Ok(())
    }

    /// Read `out.len()` consecutive columns of `row` of a 2D dataset.
    pub fn read_row<T: Element>(
        &self,
        name: &str,
        row: usize,
        start: usize,
        out: &mut [T],
    ) -> TrackResult<()> {
        let dataset = self.open_dataset(name)?;
        DatasetInfo::of(name, &dataset)?.check(name, T::DTYPE, Some(row), start, out.len())?;
        if out.is_empty() {
            return Ok(());
        }
        let values = dataset.read_slice_1d::<T, _>(s![row, start..start + out.len()])?;
        copy_into(&values, out);
        Ok(())
    }

    pub fn read_all<T: Element>(&self, name: &str) -> TrackResult<Vec<T>> {
        let dataset = self.open_dataset(name)?;
        let info = DatasetInfo::of(name, &dataset)?;
        info.check(name, T::DTYPE, None, 0, info.len())?;
        Ok(dataset.read_raw::<T>()?)
    }

    /// Gather `columns` of `row` from a 2D dataset into `out`.
    ///
    /// Runs of consecutive columns are fetched with a single hyperslab each.
    pub fn read_row_columns<T: Element>(
        &self,
        name: &str,
        row: usize,
        columns: &[usize],
        out: &mut [T],
    ) -> TrackResult<()> {
        if columns.len() != out.len() {
            return Err(TrackError::Mismatch(
                "column list and output buffer differ in length".into(),
            ));
        }
        let dataset = self.open_dataset(name)?;
        let info = DatasetInfo::of(name, &dataset)?;
        let mut i = 0;
        while i < columns.len() {
            let mut j = i + 1;
            while j < columns.len() && columns[j] == columns[j - 1] + 1 {
                j += 1;
            }
            info.check(name, T::DTYPE, Some(row), columns[i], j - i)?;
            let values = dataset.read_slice_1d::<T, _>(s![row, columns[i]..columns[i] + (j - i)])?;
            copy_into(&values, &mut out[i..j]);
            i = j;
        }
        Ok(())
    }

    /// Typed dispatch of [`ContainerReader::read_range`] on an axis buffer.
    pub fn read_axis_range(&self, name: &str, start: usize, out: &mut AxisData) -> TrackResult<()> {
        match out {
            AxisData::U64(v) => self.read_range(name, start, v),
            AxisData::I16(v) => self.read_range(name, start, v),
            AxisData::F64(v) => self.read_range(name, start, v),
        }
    }

    /// Typed dispatch of [`ContainerReader::read_row`] on an axis buffer.
    pub fn read_axis_row(&self, name: &str, row: usize, start: usize, out: &mut AxisData) -> TrackResult<()> {
        match out {
            AxisData::U64(v) => self.read_row(name, row, start, v),
            AxisData::I16(v) => self.read_row(name, row, start, v),
            AxisData::F64(v) => self.read_row(name, row, start, v),
        }
    }

    /// Typed dispatch of [`ContainerReader::read_row_columns`]; `out` is resized to `columns`.
    pub fn read_axis_columns(
        &self,
        name: &str,
        row: usize,
        columns: &[usize],
        out: &mut AxisData,
    ) -> TrackResult<()> {
        out.resize(columns.len());
        match out {
            AxisData::U64(v) => self.read_row_columns(name, row, columns, v),
            AxisData::I16(v) => self.read_row_columns(name, row, columns, v),
            AxisData::F64(v) => self.read_row_columns(name, row, columns, v),
        }
    }
}

/// Builder for a new HDF5 file; an existing file at the path is truncated.
#[derive(Debug)]
pub struct ContainerWriter {
    path: PathBuf,
    file: File,
}

impl ContainerWriter {
    pub fn create(path: impl Into<PathBuf>) -> TrackResult<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parent group of `name`, created on the way down, and the leaf name.
    fn parent<'a>(&self, name: &'a str) -> TrackResult<(Group, &'a str)> {
        let (dirs, leaf) = name.rsplit_once('/').unwrap_or(("", name));
        let mut group = self.file.group("/")?;
        for part in dirs.split('/').filter(|p| !p.is_empty()) {
            group = if group.link_exists(part) {
                group.group(part)?
            } else {
                group.create_group(part)?
            };
        }
        Ok((group, leaf))
    }

    fn create_dataset<T: Element>(&self, name: &str, shape: &[usize], fill: T) -> TrackResult<Dataset> {
        if self.file.link_exists(name) {
            return Err(TrackError::Mismatch(format!("dataset '{name}' already exists")));
        }
        let (group, leaf) = self.parent(name)?;
        Ok(group
            .new_dataset::<T>()
            .shape(shape.to_vec())
            .fill_value(fill)
            .obj_track_times(false)
            .create(leaf)?)
    }

    /// Create a dataset of `shape` with every element set to `fill`.
    pub fn allocate<T: Element>(&mut self, name: &str, shape: &[usize], fill: T) -> TrackResult<()> {
        self.create_dataset(name, shape, fill)?;
        Ok(())
    }

    /// Store `values` as a new dataset of `shape`.
    pub fn append<T: Element>(&mut self, name: &str, shape: &[usize], values: &[T]) -> TrackResult<()> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(TrackError::Mismatch(format!(
                "dataset '{name}' shape {shape:?} does not match {} values",
                values.len()
            )));
        }
        let dataset = self.create_dataset(name, shape, T::default())?;
        if !values.is_empty() {
            dataset.write_raw(values)?;
        }
        Ok(())
    }

    /// Typed dispatch of [`ContainerWriter::append`] for a 1D axis buffer.
    pub fn append_axis(&mut self, name: &str, values: &AxisData) -> TrackResult<()> {
        let shape = [values.len()];
        match values {
            AxisData::U64(v) => self.append(name, &shape, v),
            AxisData::I16(v) => self.append(name, &shape, v),
            AxisData::F64(v) => self.append(name, &shape, v),
        }
    }

    /// Overwrite columns `start..` of `row` of an existing 2D dataset.
    pub fn write_row<T: Element>(&mut self, name: &str, row: usize, start: usize, values: &[T]) -> TrackResult<()> {
        let dataset = self
            .file
            .dataset(name)
            .map_err(|e| TrackError::Parse(format!("dataset '{name}' not found: {e}")))?;
        DatasetInfo::of(name, &dataset)?.check(name, T::DTYPE, Some(row), start, values.len())?;
        if values.is_empty() {
            return Ok(());
        }
        dataset.write_slice(ArrayView1::from(values), s![row, start..start + values.len()])?;
        Ok(())
    }

    /// Write `values[range]` into `row` starting at column `start`.
    pub fn write_axis_row(
        &mut self,
        name: &str,
        row: usize,
        start: usize,
        values: &AxisData,
        range: std::ops::Range<usize>,
    ) -> TrackResult<()> {
        match values {
            AxisData::U64(v) => self.write_row(name, row, start, &v[range]),
            AxisData::I16(v) => self.write_row(name, row, start, &v[range]),
            AxisData::F64(v) => self.write_row(name, row, start, &v[range]),
        }
    }

    /// Flush everything to disk and close the file.
    pub fn finish(self) -> TrackResult<PathBuf> {
        self.file.flush()?;
        self.file.close()?;
        Ok(self.path)
    }
}

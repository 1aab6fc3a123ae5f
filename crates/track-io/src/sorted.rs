//! Dense identity-ordered store: one row per timestep, one column per particle.

use std::path::{Path, PathBuf};

use track_core::{Axis, AxisData, DType, Element, TrackError, TrackResult};

use crate::container::{ContainerReader, ContainerWriter, DatasetInfo};
use crate::TrackSource;

pub const TIMES: &str = "Times";
pub const UNIQUE_IDS: &str = "unique_Ids";

#[derive(Debug)]
pub struct SortedStore {
    reader: ContainerReader,
    times: Vec<u64>,
    axes: Vec<Axis>,
    n_columns: usize,
}

impl SortedStore {
    pub fn open(path: impl Into<PathBuf>) -> TrackResult<Self> {
        let reader = ContainerReader::open(path)?;
        let times: Vec<u64> = reader.read_all(TIMES)?;
        let id = reader.dataset(Axis::Id.name())?;
        let (n_rows, n_columns) = match id.shape.as_slice() {
            [rows, cols] => (*rows, *cols),
            _ => return Err(TrackError::Parse("sorted 'Id' dataset must be 2D".into())),
        };
        if n_rows != times.len() {
            return Err(TrackError::Parse(format!(
                "sorted store has {n_rows} rows but {} times",
                times.len()
            )));
        }
        if times.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TrackError::Parse("sorted store times are not ascending".into()));
        }
        let mut axes = Vec::new();
        for axis in Axis::ALL {
            if !reader.contains(axis.name()) {
                continue;
            }
            let info = reader.dataset(axis.name())?;
            if info.dtype != axis.dtype() || info.shape != [n_rows, n_columns] {
                return Err(TrackError::Parse(format!(
                    "sorted dataset '{axis}' has unexpected layout"
                )));
            }
            axes.push(axis);
        }
        Ok(Self {
            reader,
            times,
            axes,
            n_columns,
        })
    }

    pub fn path(&self) -> &Path {
        self.reader.path()
    }

    /// Layout of an axis dataset, for exporters that reference the file in place.
    pub fn dataset_info(&self, axis: Axis) -> TrackResult<DatasetInfo> {
        self.reader.dataset(axis.name())
    }
}

impl TrackSource for SortedStore {
    fn n_columns(&self) -> usize {
        self.n_columns
    }

    fn times(&self) -> &[u64] {
        &self.times
    }

    fn axes(&self) -> &[Axis] {
        &self.axes
    }

    fn read_row(&mut self, axis: Axis, row: usize, start: usize, out: &mut AxisData) -> TrackResult<()> {
        if start + out.len() > self.n_columns {
            return Err(TrackError::Mismatch(format!(
                "columns {start}..{} out of bounds ({} columns)",
                start + out.len(),
                self.n_columns
            )));
        }
        self.reader.read_axis_row(axis.name(), row, start, out)
    }

    fn read_row_columns(
        &mut self,
        axis: Axis,
        row: usize,
        columns: &[usize],
        out: &mut AxisData,
    ) -> TrackResult<()> {
        self.reader.read_axis_columns(axis.name(), row, columns, out)
    }

    fn unique_ids(&mut self) -> TrackResult<Vec<u64>> {
        self.reader.read_all(UNIQUE_IDS)
    }
}

/// Writer for a new sorted store. Every axis dataset is allocated up front,
/// filled with absent markers; rows are then written in place.
#[derive(Debug)]
pub struct SortedWriter {
    writer: ContainerWriter,
    times: Vec<u64>,
    axes: Vec<Axis>,
    n_columns: usize,
    unique: Vec<u64>,
}

impl SortedWriter {
    pub fn create(
        path: impl Into<PathBuf>,
        times: &[u64],
        n_columns: usize,
        axes: &[Axis],
    ) -> TrackResult<Self> {
        if !axes.contains(&Axis::Id) {
            return Err(TrackError::Mismatch("sorted store requires the 'Id' axis".into()));
        }
        let mut writer = ContainerWriter::create(path)?;
        let shape = [times.len(), n_columns];
        for &axis in axes {
            match axis.dtype() {
                DType::U64 => writer.allocate(axis.name(), &shape, u64::absent())?,
                DType::I16 => writer.allocate(axis.name(), &shape, i16::absent())?,
                DType::F64 => writer.allocate(axis.name(), &shape, f64::absent())?,
            }
        }
        Ok(Self {
            writer,
            times: times.to_vec(),
            axes: axes.to_vec(),
            n_columns,
            unique: vec![0; n_columns],
        })
    }

    pub fn n_columns(&self) -> usize {
        self.n_columns
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Write `values[range]` into `row` starting at column `column`.
    pub fn write_row(
        &mut self,
        axis: Axis,
        row: usize,
        column: usize,
        values: &AxisData,
        range: std::ops::Range<usize>,
    ) -> TrackResult<()> {
        if row >= self.times.len() || column + range.len() > self.n_columns {
            return Err(TrackError::Mismatch(format!(
                "write of {} values at row {row}, column {column} exceeds the {}x{} store",
                range.len(),
                self.times.len(),
                self.n_columns
            )));
        }
        if let AxisData::U64(ids) = values {
            if axis == Axis::Id {
                for (slot, &id) in self.unique[column..column + range.len()]
                    .iter_mut()
                    .zip(&ids[range.clone()])
                {
                    *slot = (*slot).max(id);
                }
            }
        }
        self.writer
            .write_axis_row(axis.name(), row, column, values, range)
    }

    /// Append `Times` and `unique_Ids` and close the file.
    pub fn finish(mut self) -> TrackResult<PathBuf> {
        let n_times = self.times.len();
        self.writer.append(TIMES, &[n_times], &self.times)?;
        self.writer
            .append(UNIQUE_IDS, &[self.n_columns], &self.unique)?;
        self.writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::temp_file;

    #[test]
    fn rows_default_to_absent_and_unique_ids_track_max() {
        let path = temp_file("sorted_defaults", "h5");
        let mut w = SortedWriter::create(&path, &[0, 5], 3, &[Axis::Id, Axis::X, Axis::Q]).unwrap();
        w.write_row(Axis::Id, 1, 1, &AxisData::U64(vec![7, 9]), 0..2).unwrap();
        w.write_row(Axis::X, 1, 1, &AxisData::F64(vec![0.5, 1.5]), 0..1).unwrap();
        w.write_row(Axis::Id, 0, 0, &AxisData::U64(vec![4, 8]), 0..2).unwrap();
        assert!(w.write_row(Axis::Id, 2, 0, &AxisData::U64(vec![1]), 0..1).is_err());
        w.finish().unwrap();

        let mut store = SortedStore::open(&path).unwrap();
        assert_eq!(store.n_columns(), 3);
        assert_eq!(store.times(), &[0, 5]);
        assert_eq!(store.axes(), &[Axis::Id, Axis::X, Axis::Q]);
        assert_eq!(store.unique_ids().unwrap(), vec![4, 8, 9]);
        let mut x = AxisData::F64(vec![0.0; 3]);
        store.read_row(Axis::X, 1, 0, &mut x).unwrap();
        let x = x.as_slice::<f64>().unwrap();
        assert!(x[0].is_nan() && x[2].is_nan());
        assert_eq!(x[1], 0.5);
        let mut q = AxisData::I16(Vec::new());
        store.read_row_columns(Axis::Q, 0, &[0, 2], &mut q).unwrap();
        assert_eq!(q, AxisData::I16(vec![0, 0]));
        assert_eq!(store.row_of(5), Some(1));
        assert_eq!(store.row_of(4), None);
        let _ = std::fs::remove_file(&path);
    }
}

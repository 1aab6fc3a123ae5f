pub mod container;
pub mod disordered;
pub mod locator;
pub mod sorted;
pub mod vtk;
pub mod xdmf;

#[cfg(test)]
mod test_util;

use track_core::{Axis, AxisData, TrackResult};

pub use container::{ContainerReader, ContainerWriter, DatasetInfo};
pub use disordered::{DisorderedBatch, DisorderedStore, DisorderedWriter};
pub use locator::{TimeIndex, TimeLocation};
pub use sorted::{SortedStore, SortedWriter};

/// Row/column access to an identity-ordered particle table.
pub trait TrackSource {
    fn n_columns(&self) -> usize;
    /// Ascending timesteps, one per row.
    fn times(&self) -> &[u64];
    fn axes(&self) -> &[Axis];

    /// Fill `out` with `out.len()` consecutive columns of `row`, starting at `start`.
    fn read_row(&mut self, axis: Axis, row: usize, start: usize, out: &mut AxisData) -> TrackResult<()>;

    /// Fill `out` with the values of `row` at ascending `columns`.
    fn read_row_columns(
        &mut self,
        axis: Axis,
        row: usize,
        columns: &[usize],
        out: &mut AxisData,
    ) -> TrackResult<()>;

    /// Largest identity ever stored in each column.
    fn unique_ids(&mut self) -> TrackResult<Vec<u64>>;

    fn has_axis(&self, axis: Axis) -> bool {
        self.axes().contains(&axis)
    }

    fn row_of(&self, time: u64) -> Option<usize> {
        self.times().binary_search(&time).ok()
    }
}

//! Builds the identity-ordered store from the disordered per-run stores.
//!
//! Every particle gets a fixed column derived from its identity: the rank tag
//! (high 32 bits) selects an offset from the exclusive prefix sum of the
//! per-rank counts at the last timestep, the local index (low 32 bits,
//! 1-based) is added to it.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use track_core::{Axis, AxisData, BufferPool, TrackError, TrackResult};
use track_io::disordered::rank_count;
use track_io::{DisorderedStore, SortedWriter, TimeIndex};
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_CHUNK;

#[derive(Clone, Copy, Debug)]
pub struct SortOptions {
    /// Timesteps with at least this many records are reordered in chunks.
    pub chunk_size: usize,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK,
        }
    }
}

/// Per-rank column offsets and the total column count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankOffsets {
    pub offsets: Vec<u64>,
    pub total: u64,
}

impl RankOffsets {
    pub fn from_latest_ids(latest_ids: &[u64]) -> Self {
        let mut offsets = Vec::with_capacity(latest_ids.len());
        let mut total = 0u64;
        for &packed in latest_ids {
            offsets.push(total);
            total += u64::from(rank_count(packed));
        }
        Self { offsets, total }
    }

    /// Column of `id`; errors on identities the offsets cannot place.
    pub fn column(&self, id: u64) -> TrackResult<usize> {
        let rank = (id >> 32) as usize;
        let local = id & 0xFFFF_FFFF;
        let offset = self.offsets.get(rank).copied().ok_or_else(|| {
            TrackError::Mismatch(format!("identity {id} has unknown rank tag {rank}"))
        })?;
        if local == 0 || offset + local > self.total {
            return Err(TrackError::Mismatch(format!(
                "identity {id} does not fit in {} columns",
                self.total
            )));
        }
        Ok((offset + local - 1) as usize)
    }
}

/// Number of chunks and chunk length for a timestep of `n` records.
pub fn chunk_layout(n: usize, chunk_size: usize) -> (usize, usize) {
    let nchunks = n / (chunk_size + 1) + 1;
    (nchunks, n.div_ceil(nchunks))
}

/// Maximal runs of consecutive identities in an ascending slice.
pub fn consecutive_runs(sorted_ids: &[u64]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start = 0;
    for k in 1..=sorted_ids.len() {
        if k == sorted_ids.len() || sorted_ids[k - 1].checked_add(1) != Some(sorted_ids[k]) {
            runs.push(start..k);
            start = k;
        }
    }
    runs
}

pub struct SortEngine {
    files: Vec<PathBuf>,
    species: String,
    options: SortOptions,
}

impl SortEngine {
    pub fn new(files: Vec<PathBuf>, species: &str, options: SortOptions) -> Self {
        Self {
            files,
            species: species.to_string(),
            options,
        }
    }

    /// Build `output` unless it already exists. Returns whether a sort ran.
    pub fn ensure(&self, output: &Path) -> TrackResult<bool> {
        if output.is_file() {
            debug!(path = %output.display(), "sorted store already present");
            return Ok(false);
        }
        self.run(output)?;
        Ok(true)
    }

    /// Sort into a temporary sibling and rename it onto `output` on success.
    pub fn run(&self, output: &Path) -> TrackResult<()> {
        let partial = partial_path(output);
        info!(
            species = %self.species,
            path = %output.display(),
            "creating sorted tracked-particles store"
        );
        let result = self
            .build(&partial)
            .and_then(|()| fs::rename(&partial, output).map_err(TrackError::from));
        if let Err(err) = result {
            if let Err(cleanup) = fs::remove_file(&partial) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %partial.display(), %cleanup, "could not remove partial sorted store");
                }
            }
            error!(path = %output.display(), %err, "sorting failed");
            return Err(TrackError::SortFailure {
                path: output.display().to_string(),
                reason: err.to_string(),
            });
        }
        info!(path = %output.display(), "sorted store complete");
        Ok(())
    }

    fn build(&self, path: &Path) -> TrackResult<()> {
        let mut stores = self
            .files
            .iter()
            .map(|file| DisorderedStore::open(file, &self.species))
            .collect::<TrackResult<Vec<_>>>()?;
        let index = TimeIndex::scan_disordered(&stores)?;
        let times = index.times();
        let Some(&last) = times.last() else {
            return Err(TrackError::MissingStore(format!(
                "no timesteps of species '{}' in the disordered stores",
                self.species
            )));
        };
        let (file, group) = located(&index, last)?;
        let offsets = RankOffsets::from_latest_ids(&stores[file].latest_ids(group)?);
        let axes = stores[file].axes(group);
        let n_columns = usize::try_from(offsets.total)
            .map_err(|_| TrackError::Mismatch("too many particles".into()))?;
        debug!(n_columns, ?axes, n_times = times.len(), "sorted store layout");

        let mut writer = SortedWriter::create(path, &times, n_columns, &axes)?;
        let mut reorder = Reorder {
            offsets: &offsets,
            writer: &mut writer,
            chunk_size: self.options.chunk_size,
            reads: BufferPool::new(),
            rows: BufferPool::new(),
            positions: Vec::new(),
            order: Vec::new(),
        };
        for (row, &time) in times.iter().enumerate() {
            let (file, group) = located(&index, time)?;
            let store = &mut stores[file];
            let n = store.particle_count(group)?;
            if n == 0 {
                continue;
            }
            info!(timestep = time, records = n, "ordering @ timestep");
            if n < self.options.chunk_size {
                reorder.scatter(store, group, row, n)?;
            } else {
                reorder.chunked(store, group, row, n)?;
            }
        }
        writer.finish()?;
        Ok(())
    }
}

fn located(index: &TimeIndex, time: u64) -> TrackResult<(usize, &str)> {
    index
        .group(time)
        .ok_or_else(|| TrackError::Mismatch(format!("timestep {time} has no disordered group")))
}

fn partial_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(".{name}.partial-{}", std::process::id()))
}

struct Reorder<'a> {
    offsets: &'a RankOffsets,
    writer: &'a mut SortedWriter,
    chunk_size: usize,
    reads: BufferPool,
    rows: BufferPool,
    positions: Vec<usize>,
    order: Vec<usize>,
}

impl Reorder<'_> {
    /// Whole timestep at once: place every record in a full row, write rows.
    fn scatter(
        &mut self,
        store: &mut DisorderedStore,
        group: &str,
        row: usize,
        n: usize,
    ) -> TrackResult<()> {
        let ids = self.reads.acquire(Axis::Id, n);
        store.read_axis(group, Axis::Id, 0, ids)?;
        self.positions.clear();
        for &id in ids.as_slice::<u64>()? {
            self.positions.push(self.offsets.column(id)?);
        }
        let n_columns = self.writer.n_columns();
        let axes = self.writer.axes().to_vec();
        for axis in axes {
            if !store.has_axis(group, axis) {
                continue;
            }
            let values = self.reads.acquire(axis, n);
            if axis != Axis::Id {
                store.read_axis(group, axis, 0, values)?;
            }
            let ordered = self.rows.acquire(axis, n_columns);
            ordered.fill_absent();
            values.scatter_into(&self.positions, ordered)?;
            self.writer.write_row(axis, row, 0, ordered, 0..n_columns)?;
        }
        Ok(())
    }

    /// Chunk by chunk: sort each chunk by identity and write every run of
    /// consecutive identities as one contiguous slice.
    fn chunked(
        &mut self,
        store: &mut DisorderedStore,
        group: &str,
        row: usize,
        n: usize,
    ) -> TrackResult<()> {
        let (nchunks, chunk) = chunk_layout(n, self.chunk_size);
        let axes = self.writer.axes().to_vec();
        for ichunk in 0..nchunks {
            let first = ichunk * chunk;
            let last = (first + chunk).min(n);
            if first >= last {
                break;
            }
            let npart = last - first;
            debug!(chunk = ichunk + 1, nchunks, npart, "ordering chunk");

            let ids = self.reads.acquire(Axis::Id, npart);
            store.read_axis(group, Axis::Id, first, ids)?;
            let ids = ids.as_slice::<u64>()?;
            self.order.clear();
            self.order.extend(0..npart);
            self.order.sort_unstable_by_key(|&k| ids[k]);
            let sorted_ids: Vec<u64> = self.order.iter().map(|&k| ids[k]).collect();
            let runs = consecutive_runs(&sorted_ids);
            let mut starts = Vec::with_capacity(runs.len());
            for run in &runs {
                let start = self.offsets.column(sorted_ids[run.start])?;
                let end = self.offsets.column(sorted_ids[run.end - 1])?;
                if end + 1 - start != run.len() {
                    return Err(TrackError::Mismatch(format!(
                        "identities {}..={} do not map to contiguous columns",
                        sorted_ids[run.start],
                        sorted_ids[run.end - 1]
                    )));
                }
                starts.push(start);
            }

            for &axis in &axes {
                if !store.has_axis(group, axis) {
                    continue;
                }
                let ordered = if axis == Axis::Id {
                    AxisData::U64(sorted_ids.clone())
                } else {
                    let values = self.reads.acquire(axis, npart);
                    store.read_axis(group, axis, first, values)?;
                    values.gather(&self.order)
                };
                for (run, &start) in runs.iter().zip(&starts) {
                    self.writer.write_row(axis, row, start, &ordered, run.clone())?;
                }
            }
        }
        Ok(())
    }
}

//! Per-run store of particle records as the simulation workers emitted them.
//!
//! One group per timestep, `data/<%010d timestep>/`, holding a `latest_IDs`
//! array (one packed value per rank) and the species records under
//! `particles/<species>/`.

use std::path::{Path, PathBuf};

use track_core::{Axis, AxisData, TrackError, TrackResult};

use crate::container::{ContainerReader, ContainerWriter};

const DATA_GROUP: &str = "data";

/// Low 32 bits of a packed `latest_IDs` value: the number of particles a rank owns.
pub fn rank_count(packed: u64) -> u32 {
    (packed & 0xFFFF_FFFF) as u32
}

/// Pack a rank tag and its particle count the way workers write `latest_IDs`.
pub fn pack_latest_id(rank: u32, count: u32) -> u64 {
    (u64::from(rank) << 32) | u64::from(count)
}

/// Identity issued by `rank` for its `local`-th particle (1-based).
pub fn make_identity(rank: u32, local: u32) -> u64 {
    (u64::from(rank) << 32) | u64::from(local)
}

pub fn group_name(timestep: u64) -> String {
    format!("{timestep:010}")
}

/// Records of one species at one timestep, as one worker batch.
#[derive(Clone, Debug, Default)]
pub struct DisorderedBatch {
    pub timestep: u64,
    pub latest_ids: Vec<u64>,
    pub columns: Vec<(Axis, AxisData)>,
}

impl DisorderedBatch {
    pub fn new(timestep: u64, latest_ids: Vec<u64>, ids: Vec<u64>) -> Self {
        Self {
            timestep,
            latest_ids,
            columns: vec![(Axis::Id, AxisData::U64(ids))],
        }
    }

    pub fn with(mut self, axis: Axis, data: AxisData) -> Self {
        self.columns.retain(|(a, _)| *a != axis);
        self.columns.push((axis, data));
        self
    }

    pub fn len(&self) -> usize {
        self.columns
            .iter()
            .find(|(a, _)| *a == Axis::Id)
            .map_or(0, |(_, d)| d.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct DisorderedStore {
    reader: ContainerReader,
    species: String,
}

impl DisorderedStore {
    pub fn open(path: impl Into<PathBuf>, species: &str) -> TrackResult<Self> {
        Ok(Self {
            reader: ContainerReader::open(path)?,
            species: species.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        self.reader.path()
    }

    pub fn species(&self) -> &str {
        &self.species
    }

    /// Timestep groups in this file; names that are not integers are ignored.
    pub fn timesteps(&self) -> TrackResult<Vec<(u64, String)>> {
        if !self.reader.contains(DATA_GROUP) {
            return Ok(Vec::new());
        }
        let mut out: Vec<(u64, String)> = self
            .reader
            .children(DATA_GROUP)?
            .into_iter()
            .filter_map(|name| name.parse::<u64>().ok().map(|t| (t, name)))
            .collect();
        out.sort_by_key(|(t, _)| *t);
        Ok(out)
    }

    fn dataset_name(&self, group: &str, axis: Axis) -> String {
        format!(
            "{DATA_GROUP}/{group}/particles/{}/{}",
            self.species,
            axis.disordered_name()
        )
    }

    pub fn has_axis(&self, group: &str, axis: Axis) -> bool {
        self.reader.contains(&self.dataset_name(group, axis))
    }

    /// Axes recorded for this species in `group`, in canonical order.
    pub fn axes(&self, group: &str) -> Vec<Axis> {
        Axis::ALL
            .iter()
            .copied()
            .filter(|&axis| self.has_axis(group, axis))
            .collect()
    }

    /// Number of records in `group` (zero when the species group is absent).
    pub fn particle_count(&self, group: &str) -> TrackResult<usize> {
        let name = self.dataset_name(group, Axis::Id);
        if !self.reader.contains(&name) {
            return Ok(0);
        }
        Ok(self.reader.dataset(&name)?.len())
    }

    pub fn latest_ids(&mut self, group: &str) -> TrackResult<Vec<u64>> {
        self.reader
            .read_all(&format!("{DATA_GROUP}/{group}/latest_IDs"))
    }

    /// Read `out.len()` records of `axis` starting at record `start`.
    pub fn read_axis(
        &mut self,
        group: &str,
        axis: Axis,
        start: usize,
        out: &mut AxisData,
    ) -> TrackResult<()> {
        if out.dtype() != axis.dtype() {
            return Err(TrackError::Mismatch(format!(
                "buffer for axis '{axis}' must hold {}",
                axis.dtype().as_str()
            )));
        }
        let name = self.dataset_name(group, axis);
        self.reader.read_axis_range(&name, start, out)
    }
}

/// Writes a disordered store; used by tooling that replays simulation output.
#[derive(Debug)]
pub struct DisorderedWriter {
    writer: ContainerWriter,
    species: String,
}

impl DisorderedWriter {
    pub fn create(path: impl Into<PathBuf>, species: &str) -> TrackResult<Self> {
        Ok(Self {
            writer: ContainerWriter::create(path)?,
            species: species.to_string(),
        })
    }

    pub fn write_batch(&mut self, batch: &DisorderedBatch) -> TrackResult<()> {
        let n = batch.len();
        if let Some((axis, _)) = batch.columns.iter().find(|(_, d)| d.len() != n) {
            return Err(TrackError::Mismatch(format!(
                "axis '{axis}' length differs from the identity count {n}"
            )));
        }
        if let Some((axis, _)) = batch.columns.iter().find(|(a, d)| d.dtype() != a.dtype()) {
            return Err(TrackError::Mismatch(format!(
                "axis '{axis}' must hold {} values",
                axis.dtype().as_str()
            )));
        }
        let group = format!("{DATA_GROUP}/{}", group_name(batch.timestep));
        self.writer.append(
            &format!("{group}/latest_IDs"),
            &[batch.latest_ids.len()],
            &batch.latest_ids,
        )?;
        for (axis, data) in &batch.columns {
            let name = format!(
                "{group}/particles/{}/{}",
                self.species,
                axis.disordered_name()
            );
            self.writer.append_axis(&name, data)?;
        }
        Ok(())
    }

    pub fn finish(self) -> TrackResult<PathBuf> {
        self.writer.finish()
    }
}

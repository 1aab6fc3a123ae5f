use std::collections::hash_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use fxhash::FxHashMap;
use track_core::{Axis, AxisData, Selection, TrackError, TrackResult};
use track_io::locator::{self, find_disordered_files};
use track_io::vtk::{write_vtk_lines, PolylineSet};
use track_io::xdmf::write_xdmf;
use track_io::{DisorderedStore, SortedStore, TimeIndex, TrackSource};
use tracing::{debug, info};

use crate::assemble::{assemble, detect_breaks, TrajectoryBuffer};
use crate::config::{SelectSpec, TrackConfig};
use crate::query::{prune_dead, select_ids, select_query, Query};
use crate::sort::{SortEngine, SortOptions};

/// Values of the session axes at a single timestep.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSlice {
    pub time: u64,
    pub axes: Vec<(Axis, AxisData)>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    axes: Vec<Axis>,
    selection: u64,
}

enum Backend {
    Sorted(SortedStore),
    Unsorted(Vec<DisorderedStore>),
}

impl Backend {
    fn sorted_mut(&mut self) -> TrackResult<&mut SortedStore> {
        match self {
            Backend::Sorted(store) => Ok(store),
            Backend::Unsorted(_) => Err(TrackError::Argument(
                "trajectories require a sorted session".into(),
            )),
        }
    }
}

fn load(
    store: &mut SortedStore,
    config: &TrackConfig,
    times: &[u64],
    selection: &Selection,
    axes: &[Axis],
) -> TrackResult<TrajectoryBuffer> {
    if let Some(axis) = axes.iter().find(|a| !store.has_axis(**a)) {
        return Err(TrackError::Argument(format!("axis '{axis}' unknown")));
    }
    info!(times = times.len(), ?axes, "loading trajectories");
    let mut buffer = assemble(store, times, selection, axes)?;
    detect_breaks(&mut buffer, config.simulation.timestep)?;
    buffer.apply_units(|axis| config.unit_factor(axis));
    Ok(buffer)
}

/// Tracked particles of one species across one or more runs.
pub struct TrackSession {
    config: TrackConfig,
    species: String,
    backend: Backend,
    index: TimeIndex,
    available: Vec<u64>,
    times: Vec<u64>,
    n_particles: usize,
    selection: Selection,
    axes: Vec<Axis>,
    cache: FxHashMap<CacheKey, TrajectoryBuffer>,
    raw: BTreeMap<u64, Vec<(Axis, AxisData)>>,
}

impl TrackSession {
    pub fn open(config: &TrackConfig) -> TrackResult<Self> {
        let config = config.normalized()?;
        let dirs = config.results.clone();
        let species = match &config.species {
            Some(species) => species.clone(),
            None => {
                let found = locator::track_species(&dirs)?;
                if found.is_empty() {
                    return Err(TrackError::MissingStore(
                        "no tracked particles files found".into(),
                    ));
                }
                return Err(TrackError::Argument(format!(
                    "no species given; available tracked species: {}",
                    found.join(", ")
                )));
            }
        };
        if !config.sort && config.select.is_some() {
            return Err(TrackError::Argument(
                "cannot select particles if not sorted".into(),
            ));
        }

        let (backend, index) = if config.sort {
            let path = locator::sorted_path(&dirs[0], &species);
            if !path.is_file() {
                let files = find_disordered_files(&dirs, &species)?;
                let options = SortOptions {
                    chunk_size: config.sort_chunk(),
                };
                SortEngine::new(files, &species, options).ensure(&path)?;
            }
            let store = SortedStore::open(&path)?;
            let index = TimeIndex::from_rows(store.times());
            (Backend::Sorted(store), index)
        } else {
            let stores = find_disordered_files(&dirs, &species)?
                .into_iter()
                .map(|file| DisorderedStore::open(file, &species))
                .collect::<TrackResult<Vec<_>>>()?;
            let index = TimeIndex::scan_disordered(&stores)?;
            (Backend::Unsorted(stores), index)
        };
        let available = index.times();
        if available.is_empty() {
            return Err(TrackError::MissingStore(format!(
                "no tracked particles of species '{species}' found"
            )));
        }
        let times = match config.timestep_filter()? {
            Some(filter) => filter.apply(&available),
            None => available.clone(),
        };
        if times.is_empty() {
            return Err(TrackError::Argument("timesteps not found".into()));
        }

        let mut session = Self {
            config,
            species,
            backend,
            index,
            available,
            times,
            n_particles: 0,
            selection: Selection::All,
            axes: Vec::new(),
            cache: FxHashMap::default(),
            raw: BTreeMap::new(),
        };
        session.select()?;
        session.axes = session.resolve_axes()?;
        Ok(session)
    }

    fn select(&mut self) -> TrackResult<()> {
        if !self.is_sorted() {
            self.n_particles = match self.index.last() {
                Some((time, _)) => self.unsorted_count(time)?,
                None => 0,
            };
            return Ok(());
        }
        let Backend::Sorted(store) = &mut self.backend else {
            return Ok(());
        };
        self.n_particles = store.n_columns();
        let mut selection = match &self.config.select {
            None => Selection::All,
            Some(SelectSpec::Query(text)) => {
                let query = Query::parse(text)?;
                select_query(store, &query, self.config.select_chunk())?
            }
            Some(SelectSpec::Ids(ids)) => select_ids(store, ids)?,
        };
        let first = self.index.row(self.times[0]);
        let last = self.times.last().and_then(|&t| self.index.row(t));
        if let (Some(first), Some(last)) = (first, last) {
            prune_dead(store, &mut selection, first..=last)?;
        }
        let kept = selection.len(self.n_particles);
        if kept == 0 {
            return Err(TrackError::NoParticlesFound);
        }
        info!(kept, "kept particles");
        self.selection = selection;
        Ok(())
    }

    fn unsorted_count(&self, time: u64) -> TrackResult<usize> {
        let Backend::Unsorted(stores) = &self.backend else {
            return Ok(0);
        };
        match self.index.group(time) {
            Some((file, group)) => stores[file].particle_count(group),
            None => Ok(0),
        }
    }

    fn present_axes(&self) -> Vec<Axis> {
        match &self.backend {
            Backend::Sorted(store) => store.axes().to_vec(),
            Backend::Unsorted(stores) => match self.index.last() {
                Some((time, _)) => self
                    .index
                    .group(time)
                    .map(|(file, group)| stores[file].axes(group))
                    .unwrap_or_default(),
                None => Vec::new(),
            },
        }
    }

    fn resolve_axes(&self) -> TrackResult<Vec<Axis>> {
        let present = self.present_axes();
        if self.config.axes.is_empty() {
            return Ok(Axis::defaults(self.config.simulation.ndim)
                .into_iter()
                .filter(|a| present.contains(a))
                .collect());
        }
        for axis in &self.config.axes {
            if !present.contains(axis) {
                let names: Vec<&str> = present.iter().map(|a| a.name()).collect();
                return Err(TrackError::Argument(format!(
                    "axis '{axis}' unknown; available axes are: {}",
                    names.join(", ")
                )));
            }
        }
        Ok(self.config.axes.clone())
    }

    pub fn species(&self) -> &str {
        &self.species
    }

    pub fn is_sorted(&self) -> bool {
        matches!(self.backend, Backend::Sorted(_))
    }

    /// Timesteps kept by the timestep filter.
    pub fn times(&self) -> &[u64] {
        &self.times
    }

    pub fn available_timesteps(&self) -> &[u64] {
        &self.available
    }

    pub fn n_particles(&self) -> usize {
        self.n_particles
    }

    pub fn n_selected(&self) -> usize {
        self.selection.len(self.n_particles)
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Store columns of the selected particles.
    pub fn selected_columns(&self) -> Vec<usize> {
        self.selection.columns(self.n_particles).into_owned()
    }

    /// Identities of the selected particles.
    pub fn selected_ids(&mut self) -> TrackResult<Vec<u64>> {
        let columns = self.selected_columns();
        let store = self.sorted_store_mut()?;
        let unique = store.unique_ids()?;
        Ok(columns.iter().map(|&c| unique[c]).collect())
    }

    pub fn info(&self) -> String {
        let mut info = format!("Track particles: species '{}'", self.species);
        if self.is_sorted() {
            info.push_str(&format!(" containing {} particles", self.n_particles));
            if self.n_selected() != self.n_particles {
                info.push_str(&format!(
                    "\n                with selection of {} particles",
                    self.n_selected()
                ));
            }
        }
        info
    }

    fn sorted_store_mut(&mut self) -> TrackResult<&mut SortedStore> {
        self.backend.sorted_mut()
    }

    /// Trajectories of the session axes.
    pub fn data(&mut self) -> TrackResult<&TrajectoryBuffer> {
        let axes = self.axes.clone();
        self.data_for_axes(&axes)
    }

    pub fn data_for_axes(&mut self, axes: &[Axis]) -> TrackResult<&TrajectoryBuffer> {
        let key = CacheKey {
            axes: axes.to_vec(),
            selection: fxhash::hash64(&self.selection),
        };
        let Self {
            cache,
            backend,
            config,
            times,
            selection,
            ..
        } = self;
        match cache.entry(key) {
            Entry::Occupied(cached) => {
                debug!(?axes, "trajectories served from cache");
                Ok(&*cached.into_mut())
            }
            Entry::Vacant(slot) => {
                let store = backend.sorted_mut()?;
                let buffer = load(store, config, times, selection, axes)?;
                Ok(&*slot.insert(buffer))
            }
        }
    }

    /// The session axes at one timestep.
    pub fn data_at(&mut self, timestep: u64) -> TrackResult<TimeSlice> {
        let Some(i) = self.times.iter().position(|&t| t == timestep) else {
            return Err(TrackError::Argument(format!(
                "timestep {timestep} not available"
            )));
        };
        if self.is_sorted() {
            let axes = self.data()?.row(i);
            return Ok(TimeSlice {
                time: timestep,
                axes,
            });
        }
        let rows = self.unsorted_data(Some(&[timestep]))?;
        Ok(TimeSlice {
            time: timestep,
            axes: rows
                .into_iter()
                .next()
                .map(|(_, axes)| axes.to_vec())
                .unwrap_or_default(),
        })
    }

    /// Records of each timestep as written by the simulation, in store order.
    pub fn unsorted_data(
        &mut self,
        timesteps: Option<&[u64]>,
    ) -> TrackResult<Vec<(u64, &[(Axis, AxisData)])>> {
        let wanted: Vec<u64> = timesteps.map_or_else(|| self.times.clone(), <[u64]>::to_vec);
        for &time in &wanted {
            if !self.times.contains(&time) {
                return Err(TrackError::Argument(format!("timestep {time} not available")));
            }
            if !self.raw.contains_key(&time) {
                let rows = self.read_group(time)?;
                self.raw.insert(time, rows);
            }
        }
        Ok(wanted
            .iter()
            .map(|t| (*t, self.raw[t].as_slice()))
            .collect())
    }

    fn read_group(&mut self, time: u64) -> TrackResult<Vec<(Axis, AxisData)>> {
        let Backend::Unsorted(stores) = &mut self.backend else {
            return Err(TrackError::Argument(
                "raw records are only kept in an unsorted session".into(),
            ));
        };
        let (file, group) = self
            .index
            .group(time)
            .ok_or_else(|| TrackError::Argument(format!("timestep {time} not available")))?;
        let store = &mut stores[file];
        let n = store.particle_count(group)?;
        let mut out = Vec::with_capacity(self.axes.len());
        for &axis in &self.axes {
            if !store.has_axis(group, axis) {
                continue;
            }
            let mut data = AxisData::absent(axis.dtype(), n);
            store.read_axis(group, axis, 0, &mut data)?;
            let factor = self.config.unit_factor(axis);
            if let AxisData::F64(values) = &mut data {
                if factor != 1.0 {
                    values.iter_mut().for_each(|v| *v *= factor);
                }
            }
            out.push((axis, data));
        }
        Ok(out)
    }

    /// Raw records of `timestep` in every disordered file, `chunk_size` at a time.
    pub fn iter_particles(&self, timestep: u64, chunk_size: usize) -> TrackResult<ParticleChunks> {
        if chunk_size == 0 {
            return Err(TrackError::Argument("chunk size must be positive".into()));
        }
        if !self.times.contains(&timestep) {
            return Err(TrackError::Argument(format!(
                "timestep {timestep} not available"
            )));
        }
        let stores = find_disordered_files(&self.config.results, &self.species)?
            .into_iter()
            .map(|file| DisorderedStore::open(file, &self.species))
            .collect::<TrackResult<Vec<_>>>()?;
        Ok(ParticleChunks {
            stores,
            group: track_io::disordered::group_name(timestep),
            axes: self.axes.clone(),
            chunk_size,
            file: 0,
            offset: 0,
        })
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.raw.clear();
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len() + self.raw.len()
    }

    /// Directory exports are written to, created on demand.
    pub fn export_dir(&self) -> PathBuf {
        if let Some(dir) = &self.config.export_dir {
            return dir.clone();
        }
        self.config.results[0].join(self.export_prefix())
    }

    fn export_prefix(&self) -> String {
        let axes: String = self.axes.iter().map(|a| a.name()).collect();
        format!("TrackParticles_{}_{axes}", self.species)
    }

    pub fn to_xdmf(&self) -> TrackResult<PathBuf> {
        let Backend::Sorted(store) = &self.backend else {
            return Err(TrackError::UnsupportedExport(
                "cannot export non-sorted data".into(),
            ));
        };
        let dir = self.export_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("TrackParticles_{}.xmf", self.species));
        write_xdmf(&path, store, self.config.simulation.ndim)?;
        info!(path = %path.display(), "exported tracked particles to XDMF");
        Ok(path)
    }

    pub fn to_vtk(&mut self) -> TrackResult<PathBuf> {
        if !self.is_sorted() {
            return Err(TrackError::UnsupportedExport(
                "cannot export non-sorted data".into(),
            ));
        }
        let ndim = self.config.simulation.ndim;
        if ndim != 3 {
            return Err(TrackError::UnsupportedExport(format!(
                "cannot export tracked particles of a {ndim}D simulation to VTK"
            )));
        }
        if !Axis::SPATIAL.iter().all(|a| self.axes.contains(a)) {
            return Err(TrackError::UnsupportedExport(
                "axes 'x', 'y' and 'z' are required for VTK export".into(),
            ));
        }
        let dir = self.export_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.vtk", self.export_prefix()));
        let title = format!("Track particles '{}'", self.species);
        let data = self.data()?;
        let mut positions: [&[f64]; 3] = [&[], &[], &[]];
        for (slot, axis) in positions.iter_mut().zip(Axis::SPATIAL) {
            *slot = data
                .axis(axis)
                .ok_or_else(|| TrackError::Mismatch(format!("axis '{axis}' not loaded")))?
                .as_slice::<f64>()?;
        }
        let lines = PolylineSet {
            n_times: data.n_times(),
            n_particles: data.n_particles(),
            positions,
            attributes: data
                .axes
                .iter()
                .filter(|(axis, _)| !axis.is_spatial())
                .map(|(axis, values)| (*axis, values))
                .collect(),
        };
        write_vtk_lines(&path, &title, &lines)?;
        info!(path = %path.display(), "exported tracked particles to VTK");
        Ok(path)
    }
}

/// Iterator over raw record chunks; see [`TrackSession::iter_particles`].
pub struct ParticleChunks {
    stores: Vec<DisorderedStore>,
    group: String,
    axes: Vec<Axis>,
    chunk_size: usize,
    file: usize,
    offset: usize,
}

impl ParticleChunks {
    fn next_chunk(&mut self) -> TrackResult<Option<Vec<(Axis, AxisData)>>> {
        while self.file < self.stores.len() {
            let store = &mut self.stores[self.file];
            let n = store.particle_count(&self.group)?;
            if self.offset >= n {
                self.file += 1;
                self.offset = 0;
                continue;
            }
            let len = self.chunk_size.min(n - self.offset);
            let mut chunk = Vec::with_capacity(self.axes.len());
            for &axis in &self.axes {
                if !store.has_axis(&self.group, axis) {
                    continue;
                }
                let mut data = AxisData::absent(axis.dtype(), len);
                store.read_axis(&self.group, axis, self.offset, &mut data)?;
                chunk.push((axis, data));
            }
            self.offset += len;
            return Ok(Some(chunk));
        }
        Ok(None)
    }
}

impl Iterator for ParticleChunks {
    type Item = TrackResult<Vec<(Axis, AxisData)>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(err) => {
                self.file = self.stores.len();
                Some(Err(err))
            }
        }
    }
}

//! Finds tracked-particle stores in result directories and maps timesteps to
//! where their records live.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use track_core::{TrackError, TrackResult};
use tracing::debug;

use crate::disordered::DisorderedStore;

pub const STORE_EXTENSION: &str = "h5";
const SORTED_PREFIX: &str = "TrackParticles_";
const DISORDERED_PREFIX: &str = "TrackParticlesDisordered_";

pub fn sorted_path(dir: &Path, species: &str) -> PathBuf {
    dir.join(format!("{SORTED_PREFIX}{species}.{STORE_EXTENSION}"))
}

pub fn disordered_path(dir: &Path, species: &str) -> PathBuf {
    dir.join(format!("{DISORDERED_PREFIX}{species}.{STORE_EXTENSION}"))
}

/// Expected disordered store of `species` in every directory, in order.
pub fn find_disordered_files(dirs: &[PathBuf], species: &str) -> TrackResult<Vec<PathBuf>> {
    if dirs.is_empty() {
        return Err(TrackError::MissingStore("no results directory given".into()));
    }
    dirs.iter()
        .map(|dir| {
            let path = disordered_path(dir, species);
            if path.is_file() {
                Ok(path)
            } else {
                Err(TrackError::MissingStore(format!(
                    "missing TrackParticles file in directory {}",
                    dir.display()
                )))
            }
        })
        .collect()
}

/// Species with a sorted or disordered store in every directory.
pub fn track_species(dirs: &[PathBuf]) -> TrackResult<Vec<String>> {
    let mut common: Option<Vec<String>> = None;
    for dir in dirs {
        let mut here = Vec::new();
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(&format!(".{STORE_EXTENSION}")) else {
                continue;
            };
            let species = stem
                .strip_prefix(DISORDERED_PREFIX)
                .or_else(|| stem.strip_prefix(SORTED_PREFIX));
            if let Some(species) = species.filter(|s| !s.is_empty()) {
                here.push(species.to_string());
            }
        }
        here.sort();
        here.dedup();
        common = Some(match common {
            None => here,
            Some(prev) => prev.into_iter().filter(|s| here.contains(s)).collect(),
        });
    }
    Ok(common.unwrap_or_default())
}

/// Where the records of one timestep can be read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimeLocation {
    /// Row of the sorted store.
    Row(usize),
    /// Group of the `file`-th disordered store.
    Group { file: usize, group: String },
}

#[derive(Clone, Debug, Default)]
pub struct TimeIndex {
    map: BTreeMap<u64, TimeLocation>,
}

impl TimeIndex {
    /// Sorted mode: timestep `times[i]` lives in row `i`.
    pub fn from_rows(times: &[u64]) -> Self {
        Self {
            map: times
                .iter()
                .enumerate()
                .map(|(row, &t)| (t, TimeLocation::Row(row)))
                .collect(),
        }
    }

    /// Unsorted mode: scan every store once. A timestep present in several
    /// files resolves to the last file listing it.
    pub fn scan_disordered(stores: &[DisorderedStore]) -> TrackResult<Self> {
        let mut map = BTreeMap::new();
        for (file, store) in stores.iter().enumerate() {
            for (t, group) in store.timesteps()? {
                if let Some(prev) = map.insert(t, TimeLocation::Group { file, group }) {
                    debug!(timestep = t, ?prev, file, "timestep found in several stores");
                }
            }
        }
        Ok(Self { map })
    }

    /// Ascending timesteps.
    pub fn times(&self) -> Vec<u64> {
        self.map.keys().copied().collect()
    }

    pub fn row(&self, time: u64) -> Option<usize> {
        match self.map.get(&time) {
            Some(TimeLocation::Row(row)) => Some(*row),
            _ => None,
        }
    }

    pub fn group(&self, time: u64) -> Option<(usize, &str)> {
        match self.map.get(&time) {
            Some(TimeLocation::Group { file, group }) => Some((*file, group.as_str())),
            _ => None,
        }
    }

    pub fn last(&self) -> Option<(u64, &TimeLocation)> {
        self.map.iter().next_back().map(|(t, loc)| (*t, loc))
    }
}

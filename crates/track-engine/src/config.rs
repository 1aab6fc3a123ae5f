use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use track_core::{Axis, TimestepFilter, TrackError, TrackResult};

pub const DEFAULT_CHUNK: usize = 20_000_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackConfig {
    pub results: Vec<PathBuf>,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub select: Option<SelectSpec>,
    #[serde(default)]
    pub axes: Vec<Axis>,
    #[serde(default)]
    pub timesteps: Option<Vec<f64>>,
    #[serde(default = "default_true")]
    pub sort: bool,
    #[serde(default)]
    pub simulation: SimulationInfo,
    /// Scale factor per axis name, applied to floating properties on read.
    #[serde(default)]
    pub units: BTreeMap<String, f64>,
    #[serde(default)]
    pub sort_chunk: Option<usize>,
    #[serde(default)]
    pub select_chunk: Option<usize>,
    #[serde(default)]
    pub export_dir: Option<PathBuf>,
}

/// Either a query string or an explicit list of identities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectSpec {
    Query(String),
    Ids(Vec<u64>),
}

impl SelectSpec {
    /// An empty query string selects everything.
    pub fn is_empty(&self) -> bool {
        match self {
            SelectSpec::Query(q) => q.trim().is_empty(),
            SelectSpec::Ids(_) => false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationInfo {
    #[serde(default = "default_ndim")]
    pub ndim: usize,
    /// Duration of one timestep in normalized units.
    #[serde(default = "default_timestep")]
    pub timestep: f64,
}

impl Default for SimulationInfo {
    fn default() -> Self {
        Self {
            ndim: default_ndim(),
            timestep: default_timestep(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ndim() -> usize {
    3
}

fn default_timestep() -> f64 {
    1.0
}

impl TrackConfig {
    pub fn new(results: Vec<PathBuf>, species: impl Into<String>) -> Self {
        Self {
            results,
            species: Some(species.into()),
            select: None,
            axes: Vec::new(),
            timesteps: None,
            sort: true,
            simulation: SimulationInfo::default(),
            units: BTreeMap::new(),
            sort_chunk: None,
            select_chunk: None,
            export_dir: None,
        }
    }

    pub fn validate(&self) -> TrackResult<()> {
        if self.results.is_empty() {
            return Err(TrackError::Argument("results must list at least one directory".into()));
        }
        if !(1..=3).contains(&self.simulation.ndim) {
            return Err(TrackError::Argument(format!(
                "simulation.ndim must be 1, 2 or 3 (got {})",
                self.simulation.ndim
            )));
        }
        let dt = self.simulation.timestep;
        if !dt.is_finite() || dt <= 0.0 {
            return Err(TrackError::Argument(format!(
                "simulation.timestep must be positive (got {dt})"
            )));
        }
        if self.sort_chunk == Some(0) || self.select_chunk == Some(0) {
            return Err(TrackError::Argument("chunk sizes must be positive".into()));
        }
        if let Some(values) = &self.timesteps {
            TimestepFilter::from_values(values)?;
        }
        for (name, factor) in &self.units {
            name.parse::<Axis>()?;
            if !factor.is_finite() {
                return Err(TrackError::Argument(format!(
                    "unit factor for '{name}' must be finite"
                )));
            }
        }
        Ok(())
    }

    pub fn normalized(&self) -> TrackResult<TrackConfig> {
        let mut cfg = self.clone();
        cfg.validate()?;
        if cfg.sort_chunk.is_none() {
            cfg.sort_chunk = Some(DEFAULT_CHUNK);
        }
        if cfg.select_chunk.is_none() {
            cfg.select_chunk = Some(DEFAULT_CHUNK);
        }
        if matches!(&cfg.select, Some(s) if s.is_empty()) {
            cfg.select = None;
        }
        Ok(cfg)
    }

    pub fn timestep_filter(&self) -> TrackResult<Option<TimestepFilter>> {
        self.timesteps
            .as_deref()
            .map(TimestepFilter::from_values)
            .transpose()
    }

    pub fn unit_factor(&self, axis: Axis) -> f64 {
        if !axis.is_scaled() {
            return 1.0;
        }
        self.units.get(axis.name()).copied().unwrap_or(1.0)
    }

    pub fn sort_chunk(&self) -> usize {
        self.sort_chunk.unwrap_or(DEFAULT_CHUNK)
    }

    pub fn select_chunk(&self) -> usize {
        self.select_chunk.unwrap_or(DEFAULT_CHUNK)
    }
}

/// Load a config from YAML (`.yaml`/`.yml`) or JSON (anything else).
pub fn load_config(path: &Path) -> TrackResult<TrackConfig> {
    let content = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    if ext == "yaml" || ext == "yml" {
        serde_yaml::from_str(&content)
            .map_err(|e| TrackError::Parse(format!("yaml parse error: {e}")))
    } else {
        serde_json::from_str(&content)
            .map_err(|e| TrackError::Parse(format!("json parse error: {e}")))
    }
}

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use track_core::{Axis, AxisData};
use track_engine::config::TrackConfig;
use track_io::disordered::{make_identity, pack_latest_id};
use track_io::locator::disordered_path;
use track_io::{DisorderedBatch, DisorderedWriter};

pub const SPECIES: &str = "electron";

pub fn temp_path(label: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let label_path = Path::new(label);
    let stem = label_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(label);
    let filename = match label_path.extension().and_then(|s| s.to_str()) {
        Some(ext) => format!("track_engine_test_{stem}_{}_{nanos}.{ext}", std::process::id()),
        None => format!("track_engine_test_{label}_{}_{nanos}", std::process::id()),
    };
    path.push(filename);
    path
}

pub fn temp_dir(label: &str) -> PathBuf {
    let dir = temp_path(label);
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

#[derive(Clone, Debug)]
pub struct Record {
    pub rank: u32,
    pub local: u32,
    pub pos: [f64; 3],
}

pub fn record(rank: u32, local: u32, x: f64) -> Record {
    Record {
        rank,
        local,
        pos: [x, 0.25, -0.25],
    }
}

#[derive(Clone, Debug)]
pub struct Step {
    pub time: u64,
    /// Particles each rank has issued so far.
    pub counts: Vec<u32>,
    pub records: Vec<Record>,
}

/// Write one run's disordered store; momenta are a tenth of the positions,
/// weights are 1 and charges -1.
pub fn write_run(dir: &Path, species: &str, steps: &[Step]) -> PathBuf {
    let path = disordered_path(dir, species);
    let mut writer = DisorderedWriter::create(&path, species).expect("create store");
    for step in steps {
        let latest = step
            .counts
            .iter()
            .enumerate()
            .map(|(rank, &count)| pack_latest_id(rank as u32, count))
            .collect();
        let ids = step
            .records
            .iter()
            .map(|r| make_identity(r.rank, r.local))
            .collect();
        let component = |d: usize, scale: f64| {
            AxisData::F64(step.records.iter().map(|r| r.pos[d] * scale).collect())
        };
        let n = step.records.len();
        let batch = DisorderedBatch::new(step.time, latest, ids)
            .with(Axis::X, component(0, 1.0))
            .with(Axis::Y, component(1, 1.0))
            .with(Axis::Z, component(2, 1.0))
            .with(Axis::Px, component(0, 0.1))
            .with(Axis::Py, component(1, 0.1))
            .with(Axis::Pz, component(2, 0.1))
            .with(Axis::W, AxisData::F64(vec![1.0; n]))
            .with(Axis::Q, AxisData::I16(vec![-1; n]));
        writer.write_batch(&batch).expect("write batch");
    }
    writer.finish().expect("finish store")
}

/// Six particles over timesteps 0..=3, three ranks issuing 2, 3 and 1
/// particles. Records are written in reverse identity order.
///
/// | column | identity | x over t = 0, 1, 2, 3   |
/// |--------|----------|-------------------------|
/// | 0      | (0, 1)   | -0.5 -0.5 -0.5 -0.5     |
/// | 1      | (0, 2)   | 0.0 0.1 0.2 0.3         |
/// | 2      | (1, 1)   | 0.5 0.5 -0.2 -0.2       |
/// | 3      | (1, 2)   | absent until t=2, 0.2   |
/// | 4      | (1, 3)   | 0.9 0.9, absent after   |
/// | 5      | (2, 1)   | absent until t=3, 0.7   |
pub fn standard_steps() -> Vec<Step> {
    (0..4u64)
        .map(|t| {
            let tf = t as f64;
            let mut records = vec![
                record(0, 1, -0.5),
                record(0, 2, 0.1 * tf),
                record(1, 1, if t < 2 { 0.5 } else { -0.2 }),
            ];
            if t >= 2 {
                records.push(record(1, 2, 0.2));
            }
            if t < 2 {
                records.push(record(1, 3, 0.9));
            }
            if t == 3 {
                records.push(record(2, 1, 0.7));
            }
            records.reverse();
            Step {
                time: t,
                counts: if t == 3 { vec![2, 3, 1] } else { vec![2, 3, 0] },
                records,
            }
        })
        .collect()
}

pub fn standard_run(label: &str) -> PathBuf {
    let dir = temp_dir(label);
    write_run(&dir, SPECIES, &standard_steps());
    dir
}

pub fn base_config(dirs: &[PathBuf]) -> TrackConfig {
    TrackConfig::new(dirs.to_vec(), SPECIES)
}

pub fn id(rank: u32, local: u32) -> u64 {
    make_identity(rank, local)
}

use std::fs;

mod common;
use common::{base_config, id, record, standard_run, temp_dir, write_run, Step, SPECIES};
use track_core::{Axis, AxisData, TrackError};
use track_engine::config::SelectSpec;
use track_engine::session::TrackSession;
use track_io::locator::sorted_path;

#[test]
fn trajectories_are_time_major_with_absent_records() {
    let dir = standard_run("traj_layout");
    let mut cfg = base_config(&[dir.clone()]);
    cfg.axes = vec![Axis::Id, Axis::X, Axis::Q];
    let mut session = TrackSession::open(&cfg).unwrap();
    let data = session.data().unwrap();
    assert_eq!(data.times, vec![0, 1, 2, 3]);
    assert_eq!(data.n_particles(), 6);
    assert_eq!(
        data.particle::<u64>(Axis::Id, 3).unwrap(),
        vec![0, 0, id(1, 2), id(1, 2)]
    );
    let x = data.particle::<f64>(Axis::X, 3).unwrap();
    assert!(x[0].is_nan() && x[1].is_nan());
    assert_eq!(x[2], 0.2);
    assert_eq!(data.particle::<i16>(Axis::Q, 0).unwrap(), vec![-1; 4]);
    assert_eq!(data.axis(Axis::X).map(AxisData::len), Some(24));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn default_axes_follow_dimensionality() {
    let dir = standard_run("traj_axes");
    let mut cfg = base_config(&[dir.clone()]);
    cfg.simulation.ndim = 2;
    let session = TrackSession::open(&cfg).unwrap();
    assert_eq!(
        session.axes(),
        &[Axis::X, Axis::Y, Axis::Px, Axis::Py, Axis::Pz, Axis::W, Axis::Q]
    );
    cfg.axes = vec![Axis::X];
    cfg.units.insert("x".into(), 2.0);
    let mut session = TrackSession::open(&cfg).unwrap();
    let x = session.data().unwrap().particle::<f64>(Axis::X, 0).unwrap();
    assert_eq!(x, vec![-1.0; 4]);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn single_timestep_rows() {
    let dir = standard_run("traj_row");
    let mut cfg = base_config(&[dir.clone()]);
    cfg.axes = vec![Axis::Id, Axis::X];
    cfg.select = Some(SelectSpec::Query("any(t > 2, x > 0)".into()));
    let mut session = TrackSession::open(&cfg).unwrap();
    let slice = session.data_at(3).unwrap();
    assert_eq!(slice.time, 3);
    assert_eq!(
        slice.axes[0],
        (Axis::Id, AxisData::U64(vec![id(0, 2), id(1, 2), id(2, 1)]))
    );
    assert!(matches!(session.data_at(7), Err(TrackError::Argument(_))));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn trajectories_are_cached_per_axis_set() {
    let dir = standard_run("traj_cache");
    let cfg = base_config(&[dir.clone()]);
    let mut session = TrackSession::open(&cfg).unwrap();
    assert_eq!(session.cached_entries(), 0);
    let first = session.data().unwrap().clone();
    assert_eq!(session.cached_entries(), 1);
    // A cached result survives the store going away.
    fs::remove_file(sorted_path(&dir, SPECIES)).unwrap();
    assert_eq!(session.data().unwrap(), &first);
    assert_eq!(session.cached_entries(), 1);
    session.data_for_axes(&[Axis::W]).unwrap();
    assert_eq!(session.cached_entries(), 2);
    session.clear_cache();
    assert_eq!(session.cached_entries(), 0);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn wraparound_is_a_broken_line() {
    let dir = temp_dir("traj_broken");
    let xs = [0.0, 0.5, 0.9, 0.1];
    let steps: Vec<Step> = xs
        .iter()
        .enumerate()
        .map(|(t, &x)| Step {
            time: t as u64,
            counts: vec![2],
            records: vec![record(0, 1, x), record(0, 2, 0.1 * t as f64)],
        })
        .collect();
    write_run(&dir, SPECIES, &steps);
    let mut cfg = base_config(&[dir.clone()]);
    cfg.simulation.timestep = 0.5;
    let mut session = TrackSession::open(&cfg).unwrap();
    let data = session.data().unwrap();
    assert_eq!(data.broken_line, vec![true, false]);
    assert_eq!(data.line_breaks.get(&0), Some(&vec![3]));
    assert!(!data.line_breaks.contains_key(&1));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn unsorted_sessions_read_records_in_store_order() {
    let dir = standard_run("traj_unsorted");
    let mut cfg = base_config(&[dir.clone()]);
    cfg.sort = false;
    cfg.axes = vec![Axis::Id, Axis::X];
    let mut session = TrackSession::open(&cfg).unwrap();
    assert!(!session.is_sorted());
    assert!(!sorted_path(&dir, SPECIES).exists());
    assert_eq!(session.times(), &[0, 1, 2, 3]);
    let rows = session.unsorted_data(Some(&[3])).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].1[0],
        (
            Axis::Id,
            AxisData::U64(vec![id(2, 1), id(1, 2), id(1, 1), id(0, 2), id(0, 1)])
        )
    );
    assert!(session.unsorted_data(Some(&[9])).is_err());
    assert!(matches!(session.data(), Err(TrackError::Argument(_))));
    let slice = session.data_at(0).unwrap();
    assert_eq!(slice.axes[0].1.len(), 4);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn particle_iteration_spans_every_run() {
    let first = standard_run("traj_iter_a");
    let second = temp_dir("traj_iter_b");
    write_run(
        &second,
        SPECIES,
        &[Step {
            time: 3,
            counts: vec![2, 3, 2],
            records: vec![record(2, 2, 0.0), record(0, 1, 0.0)],
        }],
    );
    let mut cfg = base_config(&[first.clone(), second.clone()]);
    cfg.sort = false;
    cfg.axes = vec![Axis::Id, Axis::W];
    let session = TrackSession::open(&cfg).unwrap();
    let sizes: Vec<usize> = session
        .iter_particles(3, 2)
        .unwrap()
        .map(|chunk| chunk.unwrap()[0].1.len())
        .collect();
    assert_eq!(sizes, vec![2, 2, 1, 2]);
    assert!(session.iter_particles(3, 0).is_err());
    assert!(session.iter_particles(5, 1).is_err());
    let _ = fs::remove_dir_all(&first);
    let _ = fs::remove_dir_all(&second);
}

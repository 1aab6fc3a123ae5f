use std::fs;

mod common;
use common::{base_config, id, standard_run};
use track_core::{Selection, TrackError};
use track_engine::config::SelectSpec;
use track_engine::session::TrackSession;

#[test]
fn any_selects_particles_positive_late() {
    let dir = standard_run("select_any");
    let mut cfg = base_config(&[dir.clone()]);
    cfg.select = Some(SelectSpec::Query("any(t > 2, x > 0)".into()));
    let session = TrackSession::open(&cfg).expect("open session");
    assert_eq!(session.n_particles(), 6);
    assert_eq!(session.n_selected(), 3);
    assert_eq!(session.selection(), &Selection::Columns(vec![1, 3, 5]));
    assert!(session.info().contains("with selection of 3 particles"));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn small_select_chunks_give_the_same_result() {
    let dir = standard_run("select_chunks");
    let mut cfg = base_config(&[dir.clone()]);
    cfg.select = Some(SelectSpec::Query("all(t <= 1, x > 0) | any(t == 3, px > 0.05)".into()));
    let wide = TrackSession::open(&cfg).unwrap();
    cfg.select_chunk = Some(4);
    let narrow = TrackSession::open(&cfg).unwrap();
    assert_eq!(wide.selection(), narrow.selection());
    // Columns 3 and 5 have no record while t <= 1, so `all` keeps them.
    assert_eq!(wide.selection(), &Selection::Columns(vec![2, 3, 4, 5]));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn identity_lists_select_columns() {
    let dir = standard_run("select_ids");
    let mut cfg = base_config(&[dir.clone()]);
    cfg.select = Some(SelectSpec::Ids(vec![id(2, 1), id(0, 2), 12345]));
    let mut session = TrackSession::open(&cfg).unwrap();
    assert_eq!(session.selection(), &Selection::Columns(vec![1, 5]));
    assert_eq!(session.selected_ids().unwrap(), vec![id(0, 2), id(2, 1)]);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn particles_absent_from_requested_times_are_pruned() {
    let dir = standard_run("select_prune");
    let mut cfg = base_config(&[dir.clone()]);
    cfg.select = Some(SelectSpec::Ids(vec![id(1, 3), id(2, 1)]));
    cfg.timesteps = Some(vec![2.0, 3.0]);
    let session = TrackSession::open(&cfg).unwrap();
    assert_eq!(session.selection(), &Selection::Columns(vec![5]));

    cfg.select = Some(SelectSpec::Ids(vec![id(1, 3)]));
    assert!(matches!(
        TrackSession::open(&cfg),
        Err(TrackError::NoParticlesFound)
    ));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn empty_selection_is_an_error() {
    let dir = standard_run("select_empty");
    let mut cfg = base_config(&[dir.clone()]);
    cfg.select = Some(SelectSpec::Query("any(t >= 0, x > 10)".into()));
    let err = TrackSession::open(&cfg).err().expect("no particles");
    assert!(matches!(err, TrackError::NoParticlesFound));
    assert_eq!(err.to_string(), "no particles found");
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn malformed_queries_are_syntax_errors() {
    let dir = standard_run("select_syntax");
    let mut cfg = base_config(&[dir.clone()]);
    for bad in ["any(t > 2, x >)", "x > 0", "any(t > 2, bogus > 0)", "anything(t, x)"] {
        cfg.select = Some(SelectSpec::Query(bad.into()));
        assert!(
            matches!(TrackSession::open(&cfg), Err(TrackError::QuerySyntax(_))),
            "query {bad:?} should be rejected"
        );
    }
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn selection_requires_sorting() {
    let dir = standard_run("select_unsorted");
    let mut cfg = base_config(&[dir.clone()]);
    cfg.sort = false;
    cfg.select = Some(SelectSpec::Query("any(t > 2, x > 0)".into()));
    assert!(matches!(TrackSession::open(&cfg), Err(TrackError::Argument(_))));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn timestep_filters() {
    let dir = standard_run("select_timesteps");
    let mut cfg = base_config(&[dir.clone()]);
    cfg.timesteps = Some(vec![2.4]);
    assert_eq!(TrackSession::open(&cfg).unwrap().times(), &[2]);
    cfg.timesteps = Some(vec![1.0, 2.0]);
    let session = TrackSession::open(&cfg).unwrap();
    assert_eq!(session.times(), &[1, 2]);
    assert_eq!(session.available_timesteps(), &[0, 1, 2, 3]);
    cfg.timesteps = Some(vec![10.0, 20.0]);
    assert!(matches!(TrackSession::open(&cfg), Err(TrackError::Argument(_))));
    cfg.timesteps = Some(vec![-1.0]);
    assert!(matches!(TrackSession::open(&cfg), Err(TrackError::Argument(_))));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_species_lists_the_available_ones() {
    let dir = standard_run("select_species");
    let mut cfg = base_config(&[dir.clone()]);
    cfg.species = None;
    match TrackSession::open(&cfg) {
        Err(TrackError::Argument(msg)) => assert!(msg.contains("electron")),
        other => panic!("unexpected result: {:?}", other.err()),
    }
    cfg.species = Some("ion".into());
    assert!(matches!(TrackSession::open(&cfg), Err(TrackError::MissingStore(_))));
    let _ = fs::remove_dir_all(&dir);
}

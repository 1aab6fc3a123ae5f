use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_name(label: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("track_io_{label}_{}_{nanos}", std::process::id())
}

/// Fresh path in the temp dir with extension `ext`; nothing is created.
pub(crate) fn temp_file(label: &str, ext: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}.{ext}", unique_name(label)))
}

pub(crate) fn temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(unique_name(label));
    fs::create_dir_all(&dir).unwrap();
    dir
}

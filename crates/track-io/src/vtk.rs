//! Legacy binary VTK polydata: one polyline per particle.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use track_core::{Axis, AxisData, TrackError, TrackResult};

/// Trajectories laid out time-major: value of particle `p` at time `t` is at `t * n_particles + p`.
#[derive(Debug)]
pub struct PolylineSet<'a> {
    pub n_times: usize,
    pub n_particles: usize,
    pub positions: [&'a [f64]; 3],
    pub attributes: Vec<(Axis, &'a AxisData)>,
}

impl PolylineSet<'_> {
    fn check(&self) -> TrackResult<()> {
        let expected = self.n_times * self.n_particles;
        let bad_position = self.positions.iter().any(|p| p.len() != expected);
        let bad_attribute = self.attributes.iter().any(|(_, d)| d.len() != expected);
        if bad_position || bad_attribute {
            return Err(TrackError::Mismatch(format!(
                "polyline arrays must hold {} x {} values",
                self.n_times, self.n_particles
            )));
        }
        if self.n_times > i32::MAX as usize || expected > i32::MAX as usize {
            return Err(TrackError::UnsupportedExport(
                "too many points for a legacy VTK file".into(),
            ));
        }
        Ok(())
    }
}

pub fn write_vtk_lines(path: &Path, title: &str, lines: &PolylineSet<'_>) -> TrackResult<()> {
    lines.check()?;
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    let n_points = lines.n_times * lines.n_particles;

    writeln!(out, "# vtk DataFile Version 3.0")?;
    writeln!(out, "{}", title.lines().next().unwrap_or(""))?;
    writeln!(out, "BINARY")?;
    writeln!(out, "DATASET POLYDATA")?;

    writeln!(out, "POINTS {n_points} float")?;
    for p in 0..lines.n_particles {
        for t in 0..lines.n_times {
            let idx = t * lines.n_particles + p;
            for axis in &lines.positions {
                out.write_all(&(axis[idx] as f32).to_be_bytes())?;
            }
        }
    }
    writeln!(out)?;

    let n_times = lines.n_times as i32;
    writeln!(
        out,
        "LINES {} {}",
        lines.n_particles,
        lines.n_particles * (lines.n_times + 1)
    )?;
    for p in 0..lines.n_particles {
        out.write_all(&n_times.to_be_bytes())?;
        let base = (p * lines.n_times) as i32;
        for t in 0..n_times {
            out.write_all(&(base + t).to_be_bytes())?;
        }
    }
    writeln!(out)?;

    if !lines.attributes.is_empty() {
        writeln!(out, "POINT_DATA {n_points}")?;
        for (axis, data) in &lines.attributes {
            writeln!(out, "SCALARS {} float 1", axis.name())?;
            writeln!(out, "LOOKUP_TABLE default")?;
            for p in 0..lines.n_particles {
                for t in 0..lines.n_times {
                    let v = data.value_f64(t * lines.n_particles + p) as f32;
                    out.write_all(&v.to_be_bytes())?;
                }
            }
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VtkSummary {
    pub n_points: usize,
    pub n_lines: usize,
    pub scalars: Vec<String>,
}

/// Read back the point, line and scalar counts of a file written by [`write_vtk_lines`].
pub fn read_vtk_summary(path: &Path) -> TrackResult<VtkSummary> {
    let bytes = fs::read(path)?;
    let mut cursor = Cursor { bytes: &bytes, pos: 0 };
    for expected in ["# vtk DataFile", "", "BINARY", "DATASET POLYDATA"] {
        let line = cursor.line()?;
        if !line.starts_with(expected) {
            return Err(TrackError::Parse(format!("unexpected VTK header line '{line}'")));
        }
    }
    let mut summary = VtkSummary {
        n_points: 0,
        n_lines: 0,
        scalars: Vec::new(),
    };
    while !cursor.at_end() {
        let line = cursor.line()?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [] => {}
            ["POINTS", n, _] => {
                summary.n_points = parse_count(n)?;
                cursor.skip(summary.n_points * 12)?;
            }
            ["LINES", n, size] => {
                summary.n_lines = parse_count(n)?;
                cursor.skip(parse_count(size)? * 4)?;
            }
            ["POINT_DATA", _] => {}
            ["SCALARS", name, ..] => {
                summary.scalars.push(name.to_string());
                let lookup = cursor.line()?;
                if !lookup.starts_with("LOOKUP_TABLE") {
                    return Err(TrackError::Parse("missing LOOKUP_TABLE".into()));
                }
                cursor.skip(summary.n_points * 4)?;
            }
            _ => return Err(TrackError::Parse(format!("unexpected VTK section '{line}'"))),
        }
    }
    Ok(summary)
}

fn parse_count(text: &str) -> TrackResult<usize> {
    text.parse()
        .map_err(|_| TrackError::Parse(format!("invalid VTK count '{text}'")))
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn line(&mut self) -> TrackResult<&'a str> {
        let rest = &self.bytes[self.pos..];
        let end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
        self.pos += (end + 1).min(rest.len());
        std::str::from_utf8(&rest[..end])
            .map_err(|_| TrackError::Parse("VTK header is not text".into()))
    }

    fn skip(&mut self, n: usize) -> TrackResult<()> {
        if self.pos + n > self.bytes.len() {
            return Err(TrackError::Parse("truncated VTK payload".into()));
        }
        self.pos += n;
        if self.bytes.get(self.pos) == Some(&b'\n') {
            self.pos += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::temp_file;

    #[test]
    fn writes_one_polyline_per_particle() {
        let path = temp_file("vtk_lines", "vtk");
        let x = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [0.0; 6];
        let z = [10.0, 10.0, 10.0, f64::NAN, 1.0, 1.0];
        let w = AxisData::F64(vec![1.0; 6]);
        let q = AxisData::I16(vec![-1; 6]);
        let set = PolylineSet {
            n_times: 2,
            n_particles: 3,
            positions: [&x[..], &y[..], &z[..]],
            attributes: vec![(Axis::W, &w), (Axis::Q, &q)],
        };
        write_vtk_lines(&path, "electron", &set).unwrap();
        let summary = read_vtk_summary(&path).unwrap();
        assert_eq!(summary.n_points, 6);
        assert_eq!(summary.n_lines, 3);
        assert_eq!(summary.scalars, vec!["w", "q"]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn rejects_ragged_arrays() {
        let path = temp_file("vtk_ragged", "vtk");
        let x = [0.0; 4];
        let short = [0.0; 3];
        let set = PolylineSet {
            n_times: 2,
            n_particles: 2,
            positions: [&x[..], &x[..], &short[..]],
            attributes: Vec::new(),
        };
        assert!(matches!(
            write_vtk_lines(&path, "t", &set),
            Err(TrackError::Mismatch(_))
        ));
    }
}

//! Per-particle trajectories read from the sorted store.

use std::collections::BTreeMap;

use track_core::{Axis, AxisData, BufferPool, Selection, TrackError, TrackResult};
use track_io::TrackSource;
use tracing::debug;

/// Time-major trajectories: the value of particle `p` at time index `i` is
/// stored at `i * n_particles + p`.
#[derive(Clone, Debug, PartialEq)]
pub struct TrajectoryBuffer {
    pub times: Vec<u64>,
    /// Store column of each particle.
    pub columns: Vec<usize>,
    pub axes: Vec<(Axis, AxisData)>,
    /// Whether the particle jumps faster than light at least once.
    pub broken_line: Vec<bool>,
    /// Time indices `i` where the step from `i - 1` to `i` is a jump, per particle.
    pub line_breaks: BTreeMap<usize, Vec<usize>>,
}

impl TrajectoryBuffer {
    pub fn n_times(&self) -> usize {
        self.times.len()
    }

    pub fn n_particles(&self) -> usize {
        self.columns.len()
    }

    pub fn axis(&self, axis: Axis) -> Option<&AxisData> {
        self.axes.iter().find(|(a, _)| *a == axis).map(|(_, d)| d)
    }

    /// All times of one particle.
    pub fn particle<T: track_core::Element>(&self, axis: Axis, p: usize) -> TrackResult<Vec<T>> {
        let data = self
            .axis(axis)
            .ok_or_else(|| TrackError::Argument(format!("axis '{axis}' was not loaded")))?
            .as_slice::<T>()?;
        let n = self.n_particles();
        Ok((0..self.n_times()).map(|i| data[i * n + p]).collect())
    }

    /// Values of every loaded axis at time index `i`.
    pub fn row(&self, i: usize) -> Vec<(Axis, AxisData)> {
        let n = self.n_particles();
        let columns: Vec<usize> = (i * n..(i + 1) * n).collect();
        self.axes
            .iter()
            .map(|(axis, data)| (*axis, data.gather(&columns)))
            .collect()
    }

    /// Multiply each scaled axis by its factor.
    pub fn apply_units(&mut self, factor: impl Fn(Axis) -> f64) {
        for (axis, data) in &mut self.axes {
            let f = factor(*axis);
            if !axis.is_scaled() || f == 1.0 {
                continue;
            }
            if let AxisData::F64(values) = data {
                for v in values.iter_mut() {
                    *v *= f;
                }
            }
        }
    }
}

/// Read `axes` of the selected columns at each of `times`.
///
/// Floating values are NaN wherever the identity is zero at that time.
pub fn assemble<S: TrackSource>(
    source: &mut S,
    times: &[u64],
    selection: &Selection,
    axes: &[Axis],
) -> TrackResult<TrajectoryBuffer> {
    let columns = selection.columns(source.n_columns()).into_owned();
    let n = columns.len();
    let nt = times.len();
    let contiguous = selection.is_all();
    let mut out: Vec<(Axis, AxisData)> = axes
        .iter()
        .map(|&axis| (axis, AxisData::absent(axis.dtype(), nt * n)))
        .collect();
    let mut pool = BufferPool::new();
    for (i, &time) in times.iter().enumerate() {
        let row = source
            .row_of(time)
            .ok_or_else(|| TrackError::Argument(format!("timestep {time} not found")))?;
        debug!(timestep = time, particles = n, "reading trajectories");
        read_selected(source, Axis::Id, row, contiguous, &columns, &mut pool)?;
        let ids = pool
            .take(Axis::Id)
            .ok_or_else(|| TrackError::Mismatch("identity buffer missing".into()))?;
        for (axis, dst) in out.iter_mut() {
            if *axis == Axis::Id {
                dst.copy_into(i * n, &ids)?;
                continue;
            }
            read_selected(source, *axis, row, contiguous, &columns, &mut pool)?;
            let values = pool.acquire(*axis, n);
            if let AxisData::F64(v) = values {
                for (x, &id) in v.iter_mut().zip(ids.as_slice::<u64>()?) {
                    if id == 0 {
                        *x = f64::NAN;
                    }
                }
            }
            dst.copy_into(i * n, values)?;
        }
        pool.reclaim(Axis::Id, ids);
    }
    Ok(TrajectoryBuffer {
        times: times.to_vec(),
        columns,
        axes: out,
        broken_line: vec![false; n],
        line_breaks: BTreeMap::new(),
    })
}

fn read_selected<S: TrackSource>(
    source: &mut S,
    axis: Axis,
    row: usize,
    contiguous: bool,
    columns: &[usize],
    pool: &mut BufferPool,
) -> TrackResult<()> {
    let buf = pool.acquire(axis, columns.len());
    if contiguous {
        source.read_row(axis, row, 0, buf)
    } else {
        source.read_row_columns(axis, row, columns, buf)
    }
}

/// Flag steps where a position changes faster than 1 (the speed of light in
/// normalized units). `timestep` is the duration of one simulation step.
///
/// A step with a NaN difference (particle absent at either end) is never a break.
pub fn detect_breaks(buffer: &mut TrajectoryBuffer, timestep: f64) -> TrackResult<()> {
    let n = buffer.n_particles();
    let nt = buffer.n_times();
    buffer.broken_line = vec![false; n];
    buffer.line_breaks.clear();
    if nt < 2 {
        return Ok(());
    }
    let dt: Vec<f64> = buffer
        .times
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64 * timestep)
        .collect();
    let mut breaks: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (axis, data) in &buffer.axes {
        if !axis.is_spatial() {
            continue;
        }
        let values = data.as_slice::<f64>()?;
        for p in 0..n {
            for i in 1..nt {
                let speed = (values[i * n + p] - values[(i - 1) * n + p]) / dt[i - 1];
                if speed.abs() > 1.0 {
                    breaks.entry(p).or_default().push(i);
                }
            }
        }
    }
    for (p, steps) in breaks.iter_mut() {
        steps.sort_unstable();
        steps.dedup();
        buffer.broken_line[*p] = true;
    }
    buffer.line_breaks = breaks;
    Ok(())
}

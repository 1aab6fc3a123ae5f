use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dtype::{DType, Element};
use crate::error::{TrackError, TrackResult};

/// Per-particle property stored for every tracked timestep.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    Id,
    #[serde(rename = "x")]
    X,
    #[serde(rename = "y")]
    Y,
    #[serde(rename = "z")]
    Z,
    #[serde(rename = "px")]
    Px,
    #[serde(rename = "py")]
    Py,
    #[serde(rename = "pz")]
    Pz,
    #[serde(rename = "q")]
    Q,
    #[serde(rename = "w")]
    W,
}

impl Axis {
    pub const ALL: [Axis; 9] = [
        Axis::Id,
        Axis::X,
        Axis::Y,
        Axis::Z,
        Axis::Px,
        Axis::Py,
        Axis::Pz,
        Axis::Q,
        Axis::W,
    ];

    pub const SPATIAL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn name(self) -> &'static str {
        match self {
            Axis::Id => "Id",
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
            Axis::Px => "px",
            Axis::Py => "py",
            Axis::Pz => "pz",
            Axis::Q => "q",
            Axis::W => "w",
        }
    }

    pub fn dtype(self) -> DType {
        match self {
            Axis::Id => DType::U64,
            Axis::Q => DType::I16,
            _ => DType::F64,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_spatial(self) -> bool {
        matches!(self, Axis::X | Axis::Y | Axis::Z)
    }

    /// Unit conversion applies to every axis except identity and charge.
    pub fn is_scaled(self) -> bool {
        !matches!(self, Axis::Id | Axis::Q)
    }

    /// Dataset path of this property inside a disordered species group.
    pub fn disordered_name(self) -> &'static str {
        match self {
            Axis::Id => "id",
            Axis::X => "position/x",
            Axis::Y => "position/y",
            Axis::Z => "position/z",
            Axis::Px => "momentum/x",
            Axis::Py => "momentum/y",
            Axis::Pz => "momentum/z",
            Axis::Q => "charge",
            Axis::W => "weight",
        }
    }

    /// Axes shown when none are requested: positions up to `ndim`, then momenta, weight, charge.
    pub fn defaults(ndim: usize) -> Vec<Axis> {
        let mut axes: Vec<Axis> = Axis::SPATIAL.iter().copied().take(ndim.min(3)).collect();
        axes.extend([Axis::Px, Axis::Py, Axis::Pz, Axis::W, Axis::Q]);
        axes
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Axis {
    type Err = TrackError;

    fn from_str(s: &str) -> TrackResult<Self> {
        Axis::ALL
            .iter()
            .copied()
            .find(|axis| axis.name() == s)
            .ok_or_else(|| TrackError::Argument(format!("unknown axis '{s}'")))
    }
}

/// Typed column of values for one axis.
#[derive(Clone, Debug, PartialEq)]
pub enum AxisData {
    U64(Vec<u64>),
    I16(Vec<i16>),
    F64(Vec<f64>),
}

impl AxisData {
    /// A buffer of `len` absent markers for `dtype`.
    pub fn absent(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::U64 => AxisData::U64(vec![u64::absent(); len]),
            DType::I16 => AxisData::I16(vec![i16::absent(); len]),
            DType::F64 => AxisData::F64(vec![f64::absent(); len]),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            AxisData::U64(_) => DType::U64,
            AxisData::I16(_) => DType::I16,
            AxisData::F64(_) => DType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AxisData::U64(v) => v.len(),
            AxisData::I16(v) => v.len(),
            AxisData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resize in place, filling new slots with absent markers.
    pub fn resize(&mut self, len: usize) {
        match self {
            AxisData::U64(v) => v.resize(len, u64::absent()),
            AxisData::I16(v) => v.resize(len, i16::absent()),
            AxisData::F64(v) => v.resize(len, f64::absent()),
        }
    }

    pub fn fill_absent(&mut self) {
        match self {
            AxisData::U64(v) => v.fill(u64::absent()),
            AxisData::I16(v) => v.fill(i16::absent()),
            AxisData::F64(v) => v.fill(f64::absent()),
        }
    }

    pub fn as_slice<T: Element>(&self) -> TrackResult<&[T]> {
        T::slice(self).ok_or_else(|| dtype_mismatch(T::DTYPE, self.dtype()))
    }

    pub fn as_vec_mut<T: Element>(&mut self) -> TrackResult<&mut Vec<T>> {
        let found = self.dtype();
        T::slice_mut(self).ok_or_else(|| dtype_mismatch(T::DTYPE, found))
    }

    pub fn value_f64(&self, idx: usize) -> f64 {
        match self {
            AxisData::U64(v) => v[idx].to_f64(),
            AxisData::I16(v) => v[idx].to_f64(),
            AxisData::F64(v) => v[idx],
        }
    }

    /// Widen the first `len` values to f64 into `out`.
    pub fn widen_into(&self, len: usize, out: &mut Vec<f64>) {
        out.clear();
        match self {
            AxisData::U64(v) => out.extend(v[..len].iter().map(|x| x.to_f64())),
            AxisData::I16(v) => out.extend(v[..len].iter().map(|x| x.to_f64())),
            AxisData::F64(v) => out.extend_from_slice(&v[..len]),
        }
    }

    /// Copy the values at `columns` into a new buffer.
    pub fn gather(&self, columns: &[usize]) -> AxisData {
        match self {
            AxisData::U64(v) => AxisData::U64(columns.iter().map(|&c| v[c]).collect()),
            AxisData::I16(v) => AxisData::I16(columns.iter().map(|&c| v[c]).collect()),
            AxisData::F64(v) => AxisData::F64(columns.iter().map(|&c| v[c]).collect()),
        }
    }

    /// Write `self[k]` to `dst[positions[k]]` for the first `positions.len()` values.
    pub fn scatter_into(&self, positions: &[usize], dst: &mut AxisData) -> TrackResult<()> {
        fn scatter<T: Copy>(src: &[T], positions: &[usize], dst: &mut [T]) -> TrackResult<()> {
            let slots = dst.len();
            for (&value, &pos) in src.iter().zip(positions) {
                let slot = dst.get_mut(pos).ok_or_else(|| {
                    TrackError::Mismatch(format!(
                        "scatter position {pos} out of bounds for {slots} slots"
                    ))
                })?;
                *slot = value;
            }
            Ok(())
        }
        match (self, dst) {
            (AxisData::U64(s), AxisData::U64(d)) => scatter(s, positions, d),
            (AxisData::I16(s), AxisData::I16(d)) => scatter(s, positions, d),
            (AxisData::F64(s), AxisData::F64(d)) => scatter(s, positions, d),
            (s, d) => Err(dtype_mismatch(d.dtype(), s.dtype())),
        }
    }

    /// Copy `src` into `self[start..start + src.len()]`.
    pub fn copy_into(&mut self, start: usize, src: &AxisData) -> TrackResult<()> {
        match (self, src) {
            (AxisData::U64(dst), AxisData::U64(s)) => dst[start..start + s.len()].copy_from_slice(s),
            (AxisData::I16(dst), AxisData::I16(s)) => dst[start..start + s.len()].copy_from_slice(s),
            (AxisData::F64(dst), AxisData::F64(s)) => dst[start..start + s.len()].copy_from_slice(s),
            (dst, s) => return Err(dtype_mismatch(dst.dtype(), s.dtype())),
        }
        Ok(())
    }
}

fn dtype_mismatch(expected: DType, found: DType) -> TrackError {
    TrackError::Mismatch(format!(
        "expected {} buffer, found {}",
        expected.as_str(),
        found.as_str()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_names_roundtrip() {
        for axis in Axis::ALL {
            assert_eq!(axis.name().parse::<Axis>().unwrap(), axis);
        }
        assert!("vx".parse::<Axis>().is_err());
    }

    #[test]
    fn dtype_table() {
        assert_eq!(Axis::Id.dtype(), DType::U64);
        assert_eq!(Axis::Q.dtype(), DType::I16);
        assert_eq!(Axis::Pz.dtype(), DType::F64);
    }

    #[test]
    fn default_axes_follow_dimensionality() {
        assert_eq!(
            Axis::defaults(2),
            vec![Axis::X, Axis::Y, Axis::Px, Axis::Py, Axis::Pz, Axis::W, Axis::Q]
        );
        assert_eq!(Axis::defaults(3)[..3], Axis::SPATIAL);
    }

    #[test]
    fn gather_and_copy() {
        let data = AxisData::F64(vec![0.0, 1.0, 2.0, 3.0]);
        let picked = data.gather(&[1, 3]);
        assert_eq!(picked, AxisData::F64(vec![1.0, 3.0]));
        let mut dst = AxisData::absent(DType::F64, 4);
        dst.copy_into(2, &picked).unwrap();
        assert_eq!(dst.value_f64(3), 3.0);
        assert!(dst.value_f64(0).is_nan());
        assert!(dst.copy_into(0, &AxisData::I16(vec![1])).is_err());
    }
}

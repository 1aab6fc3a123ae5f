use hdf5::H5Type;

use crate::axis::AxisData;

/// Element types a dataset can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    U64,
    I16,
    F64,
}

impl DType {
    pub fn as_str(self) -> &'static str {
        match self {
            DType::U64 => "u64",
            DType::I16 => "i16",
            DType::F64 => "f64",
        }
    }
}

/// A scalar that can live in a dataset.
pub trait Element: H5Type + Copy + Default + PartialEq + std::fmt::Debug + 'static {
    const DTYPE: DType;

    /// Value marking an absent particle.
    fn absent() -> Self;
    fn to_f64(self) -> f64;

    fn slice(data: &AxisData) -> Option<&[Self]>;
    fn slice_mut(data: &mut AxisData) -> Option<&mut Vec<Self>>;
}

impl Element for u64 {
    const DTYPE: DType = DType::U64;

    fn absent() -> Self {
        0
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn slice(data: &AxisData) -> Option<&[Self]> {
        match data {
            AxisData::U64(v) => Some(v),
            _ => None,
        }
    }

    fn slice_mut(data: &mut AxisData) -> Option<&mut Vec<Self>> {
        match data {
            AxisData::U64(v) => Some(v),
            _ => None,
        }
    }
}

impl Element for i16 {
    const DTYPE: DType = DType::I16;

    fn absent() -> Self {
        0
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn slice(data: &AxisData) -> Option<&[Self]> {
        match data {
            AxisData::I16(v) => Some(v),
            _ => None,
        }
    }

    fn slice_mut(data: &mut AxisData) -> Option<&mut Vec<Self>> {
        match data {
            AxisData::I16(v) => Some(v),
            _ => None,
        }
    }
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;

    fn absent() -> Self {
        f64::NAN
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn slice(data: &AxisData) -> Option<&[Self]> {
        match data {
            AxisData::F64(v) => Some(v),
            _ => None,
        }
    }

    fn slice_mut(data: &mut AxisData) -> Option<&mut Vec<Self>> {
        match data {
            AxisData::F64(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_markers_match_store_defaults() {
        assert_eq!(u64::absent(), 0);
        assert_eq!(i16::absent(), 0);
        assert!(f64::absent().is_nan());
    }
}

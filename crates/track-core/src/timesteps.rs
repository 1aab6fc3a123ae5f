use crate::error::{TrackError, TrackResult};

/// Narrowing of the available timesteps requested by the user.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TimestepFilter {
    /// The single available timestep closest to the value.
    Nearest(f64),
    /// Every available timestep within the inclusive bounds.
    Range(f64, f64),
}

impl TimestepFilter {
    pub fn from_values(values: &[f64]) -> TrackResult<Self> {
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(bad_timesteps());
        }
        match *values {
            [t] => Ok(TimestepFilter::Nearest(t)),
            [lo, hi] => Ok(TimestepFilter::Range(lo, hi)),
            _ => Err(bad_timesteps()),
        }
    }

    /// Apply to ascending `times`; the result keeps their order.
    pub fn apply(&self, times: &[u64]) -> Vec<u64> {
        match *self {
            TimestepFilter::Range(lo, hi) => times
                .iter()
                .copied()
                .filter(|&t| (t as f64) >= lo && (t as f64) <= hi)
                .collect(),
            TimestepFilter::Nearest(target) => {
                let mut best: Option<(u64, f64)> = None;
                for &t in times {
                    let dist = (t as f64 - target).abs();
                    if best.map_or(true, |(_, d)| dist < d) {
                        best = Some((t, dist));
                    }
                }
                best.map(|(t, _)| vec![t]).unwrap_or_default()
            }
        }
    }
}

fn bad_timesteps() -> TrackError {
    TrackError::Argument("`timesteps` must be one or two non-negative numbers".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_or_wrong_arity() {
        assert!(TimestepFilter::from_values(&[-1.0]).is_err());
        assert!(TimestepFilter::from_values(&[]).is_err());
        assert!(TimestepFilter::from_values(&[1.0, 2.0, 3.0]).is_err());
        assert!(TimestepFilter::from_values(&[f64::NAN]).is_err());
    }

    #[test]
    fn nearest_picks_closest_first_match() {
        let times = [0, 10, 20, 30];
        let f = TimestepFilter::from_values(&[14.0]).unwrap();
        assert_eq!(f.apply(&times), vec![10]);
        let tie = TimestepFilter::Nearest(15.0);
        assert_eq!(tie.apply(&times), vec![10]);
        assert!(tie.apply(&[]).is_empty());
    }

    #[test]
    fn range_is_inclusive() {
        let times = [0, 10, 20, 30];
        let f = TimestepFilter::from_values(&[10.0, 20.0]).unwrap();
        assert_eq!(f.apply(&times), vec![10, 20]);
        assert!(TimestepFilter::Range(21.0, 29.0).apply(&times).is_empty());
    }
}

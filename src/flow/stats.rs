use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

pub fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Nearest-rank percentile using integer index arithmetic (`len * p / 100`).
pub fn percentile(values: &[f64], p: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| cmp_f64(*a, *b));

    let idx = (sorted.len() * p / 100).min(sorted.len() - 1);
    sorted[idx]
}

/// Shewhart c-chart bounds for a count process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlLimits {
    pub center: f64,
    pub ucl: f64,
    pub lcl: f64,
}

impl ControlLimits {
    /// Poisson limits around `center`: `center ± 3√center`, floored at zero.
    pub fn c_chart(center: f64) -> Self {
        let sigma = center.max(0.0).sqrt();
        Self {
            center,
            ucl: center + 3.0 * sigma,
            lcl: (center - 3.0 * sigma).max(0.0),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lcl && value <= self.ucl
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    mod percentile {
        use super::*;

        #[test]
        fn returns_zero_for_empty_dataset() {
            assert_eq!(percentile(&[], 50), 0.0);
        }

        #[test]
        fn returns_single_value() {
            assert_eq!(percentile(&[4.0], 90), 4.0);
        }

        #[test]
        fn uses_upper_middle_for_even_median() {
            assert_eq!(percentile(&[4.0, 1.0, 3.0, 2.0], 50), 3.0);
        }

        #[test]
        fn p90_of_ten_values_is_last() {
            let values: Vec<f64> = (1..=10).map(f64::from).collect();
            assert_eq!(percentile(&values, 90), 10.0);
        }
    }

    mod c_chart {
        use super::*;

        #[test]
        fn lower_limit_never_negative() {
            let limits = ControlLimits::c_chart(1.0);
            assert_eq!(limits.ucl, 4.0);
            assert_eq!(limits.lcl, 0.0);
        }

        #[test]
        fn symmetric_when_mean_is_large() {
            let limits = ControlLimits::c_chart(100.0);
            assert_eq!(limits.ucl, 130.0);
            assert_eq!(limits.lcl, 70.0);
            assert!(limits.contains(100.0));
            assert!(!limits.contains(131.0));
        }

        #[test]
        fn zero_mean_gives_zero_band() {
            let limits = ControlLimits::c_chart(0.0);
            assert_eq!(limits, ControlLimits { center: 0.0, ucl: 0.0, lcl: 0.0 });
        }
    }

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
    }
}

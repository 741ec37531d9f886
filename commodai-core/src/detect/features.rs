//! Per-point feature vectors for the isolation scorer.
//!
//! Features are computed over the compacted sequence of valid values, so a
//! missing day never contributes a fake zero to a rolling window. Rolling
//! statistics read a trailing baseline of admitted values only (see
//! [`super::moving_average::deviation_check`]): an anomaly never becomes the
//! reference the points after it are compared with.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// One column of the isolation feature matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationFeature {
    /// The observed value.
    Value,
    /// Value minus the mean of the trailing baseline.
    MeanDeviation,
    /// Sample variance of the trailing baseline plus the current value.
    RollingVariance,
    /// Relative change from the last baseline value.
    Return,
}

impl IsolationFeature {
    pub fn all() -> Vec<IsolationFeature> {
        vec![
            IsolationFeature::Value,
            IsolationFeature::MeanDeviation,
            IsolationFeature::RollingVariance,
            IsolationFeature::Return,
        ]
    }
}

/// Build a row-major feature matrix: one row per value, one column per feature.
///
/// `admitted[i]` says whether value `i` joins the baseline of later rows; a
/// short slice counts the remaining values as admitted. The baseline holds at
/// most `window` values and is partial at the start of the series.
pub fn feature_matrix(
    values: &[f64],
    admitted: &[bool],
    features: &[IsolationFeature],
    window: usize,
) -> Vec<Vec<f64>> {
    let window = window.max(1);
    let mut baseline: VecDeque<f64> = VecDeque::with_capacity(window + 1);
    let mut rows = Vec::with_capacity(values.len());

    for (i, &x) in values.iter().enumerate() {
        let (mean, _) = mean_variance(baseline.make_contiguous());
        let mut with_current: Vec<f64> = baseline.iter().copied().collect();
        with_current.push(x);
        let (_, variance) = mean_variance(&with_current);
        let last = baseline.back().copied();

        let row = features
            .iter()
            .map(|f| match f {
                IsolationFeature::Value => x,
                IsolationFeature::MeanDeviation => {
                    if baseline.is_empty() {
                        0.0
                    } else {
                        x - mean
                    }
                }
                IsolationFeature::RollingVariance => variance,
                IsolationFeature::Return => match last {
                    Some(prev) if prev != 0.0 => x / prev - 1.0,
                    _ => 0.0,
                },
            })
            .collect();
        rows.push(row);

        if admitted.get(i).copied().unwrap_or(true) {
            baseline.push_back(x);
            if baseline.len() > window {
                baseline.pop_front();
            }
        }
    }
    rows
}

/// Mean and sample variance (zero for fewer than two values).
pub fn mean_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (mean, ss / (n - 1.0))
}

//! Region feature vectors and distance helpers.

use serde::Serialize;

use crate::domain::{AnomalyRegion, RegionId};

/// Column names of a [`RegionFeatureVector`], in order.
pub const FEATURE_NAMES: [&str; 5] = [
    "duration_days",
    "peak_score",
    "mean_score",
    "value_delta",
    "volatility",
];

/// Numeric embedding of one region, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionFeatureVector {
    pub region_id: RegionId,
    pub values: [f64; 5],
}

impl RegionFeatureVector {
    pub fn from_region(region: &AnomalyRegion) -> Self {
        Self {
            region_id: region.id.clone(),
            values: [
                region.duration_days() as f64,
                region.peak_score,
                region.mean_score,
                region.value_delta(),
                region.volatility,
            ],
        }
    }
}

/// Z-score every column. A column with zero spread becomes all zeros.
pub fn normalize(vectors: &[RegionFeatureVector]) -> Vec<Vec<f64>> {
    let n = vectors.len();
    if n == 0 {
        return Vec::new();
    }
    let mut out: Vec<Vec<f64>> = vectors.iter().map(|v| v.values.to_vec()).collect();

    for col in 0..FEATURE_NAMES.len() {
        let mean = out.iter().map(|row| row[col]).sum::<f64>() / n as f64;
        let var = out.iter().map(|row| (row[col] - mean).powi(2)).sum::<f64>() / n as f64;
        let std = var.sqrt();
        for row in out.iter_mut() {
            row[col] = if std > 0.0 { (row[col] - mean) / std } else { 0.0 };
        }
    }
    out
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

/// Symmetric pairwise Euclidean distances.
pub fn distance_matrix(data: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = data.len();
    let mut dist = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = euclidean(&data[i], &data[j]);
            dist[i][j] = d;
            dist[j][i] = d;
        }
    }
    dist
}

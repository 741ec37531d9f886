//! Cluster separation metrics.
//!
//! Both metrics take plain group ids (see [`group_ids`](super::method::group_ids)),
//! so density noise enters as singleton groups.

use serde::{Deserialize, Serialize};

use super::features::euclidean;

/// Quality of one labeling. `None` where the metric is undefined for the
/// number of groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterQuality {
    /// Mean silhouette in [-1, 1]; higher is better.
    pub silhouette: Option<f64>,
    /// Davies-Bouldin index; lower is better.
    pub davies_bouldin: Option<f64>,
}

impl ClusterQuality {
    pub fn evaluate(data: &[Vec<f64>], dist: &[Vec<f64>], groups: &[usize]) -> Self {
        Self {
            silhouette: silhouette(dist, groups),
            davies_bouldin: davies_bouldin(data, groups),
        }
    }
}

fn distinct(groups: &[usize]) -> Vec<usize> {
    let mut g = groups.to_vec();
    g.sort_unstable();
    g.dedup();
    g
}

/// Mean silhouette over all rows.
///
/// Defined for 2 <= groups <= n - 1. Rows in singleton groups score 0.
pub fn silhouette(dist: &[Vec<f64>], groups: &[usize]) -> Option<f64> {
    let n = groups.len();
    let ids = distinct(groups);
    if ids.len() < 2 || ids.len() >= n {
        return None;
    }

    let total: f64 = (0..n)
        .map(|i| {
            let own = groups[i];
            let own_size = groups.iter().filter(|g| **g == own).count();
            if own_size <= 1 {
                return 0.0;
            }
            let a = (0..n)
                .filter(|&j| j != i && groups[j] == own)
                .map(|j| dist[i][j])
                .sum::<f64>()
                / (own_size - 1) as f64;
            let b = ids
                .iter()
                .filter(|g| **g != own)
                .map(|g| {
                    let members: Vec<usize> = (0..n).filter(|&j| groups[j] == *g).collect();
                    members.iter().map(|&j| dist[i][j]).sum::<f64>() / members.len() as f64
                })
                .fold(f64::INFINITY, f64::min);
            let denom = a.max(b);
            if denom > 0.0 {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .sum();

    Some(total / n as f64)
}

/// Davies-Bouldin index. Defined for at least two groups.
///
/// Pairs of groups with coinciding centroids contribute 0.
pub fn davies_bouldin(data: &[Vec<f64>], groups: &[usize]) -> Option<f64> {
    let ids = distinct(groups);
    if ids.len() < 2 || data.is_empty() {
        return None;
    }
    let width = data[0].len();

    let mut centroids = Vec::with_capacity(ids.len());
    let mut scatter = Vec::with_capacity(ids.len());
    for g in &ids {
        let members: Vec<&Vec<f64>> = data
            .iter()
            .zip(groups)
            .filter(|(_, gg)| *gg == g)
            .map(|(r, _)| r)
            .collect();
        let mut c = vec![0.0; width];
        for m in &members {
            for (ci, v) in c.iter_mut().zip(m.iter()) {
                *ci += v;
            }
        }
        for ci in c.iter_mut() {
            *ci /= members.len() as f64;
        }
        let s = members.iter().map(|m| euclidean(m, &c)).sum::<f64>() / members.len() as f64;
        centroids.push(c);
        scatter.push(s);
    }

    let k = ids.len();
    let total: f64 = (0..k)
        .map(|i| {
            (0..k)
                .filter(|&j| j != i)
                .map(|j| {
                    let d = euclidean(&centroids[i], &centroids[j]);
                    if d > 0.0 {
                        (scatter[i] + scatter[j]) / d
                    } else {
                        0.0
                    }
                })
                .fold(0.0, f64::max)
        })
        .sum();
    Some(total / k as f64)
}

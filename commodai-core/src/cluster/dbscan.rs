//! Density method: DBSCAN with an optional k-distance elbow radius.

use super::features::distance_matrix;
use super::method::{ClusterError, ClusterLabel, ClusterMethod, MethodFit, MethodKind};

#[derive(Debug, Clone)]
pub struct DbscanMethod {
    /// Neighborhood size (the row itself included) that makes a core row.
    pub min_points: usize,
    /// Fixed radius; `None` picks it from the k-distance elbow.
    pub eps: Option<f64>,
}

impl Default for DbscanMethod {
    fn default() -> Self {
        Self {
            min_points: 2,
            eps: None,
        }
    }
}

impl ClusterMethod for DbscanMethod {
    fn kind(&self) -> MethodKind {
        MethodKind::Density
    }

    fn min_regions(&self) -> usize {
        self.min_points.max(2)
    }

    fn fit(&self, data: &[Vec<f64>]) -> Result<MethodFit, ClusterError> {
        self.check_size(data)?;
        let dist = distance_matrix(data);
        let min_points = self.min_points.max(2);
        let eps = match self.eps {
            Some(eps) => eps,
            None => elbow_radius(&dist, min_points - 1),
        };

        let labels = dbscan(&dist, eps, min_points);
        let mut fit = MethodFit::new(MethodKind::Density, labels);
        fit.radius = Some(eps);
        Ok(fit)
    }
}

/// Radius at the elbow of the sorted k-distance curve.
///
/// The k-distance of a row is the distance to its k-th nearest other row.
/// The elbow is the point lying furthest below the chord joining the first
/// and last points of the ascending curve.
pub fn elbow_radius(dist: &[Vec<f64>], k: usize) -> f64 {
    let n = dist.len();
    let k = k.clamp(1, n.saturating_sub(1).max(1));
    let mut kdist: Vec<f64> = dist
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut others: Vec<f64> = row
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, d)| *d)
                .collect();
            others.sort_by(|a, b| a.total_cmp(b));
            others.get(k - 1).copied().unwrap_or(0.0)
        })
        .collect();
    kdist.sort_by(|a, b| a.total_cmp(b));

    if kdist.len() < 3 {
        return kdist.last().copied().unwrap_or(0.0);
    }
    let last = kdist.len() - 1;
    let (y0, y1) = (kdist[0], kdist[last]);
    let mut best = (0.0, kdist[last]);
    for (i, y) in kdist.iter().enumerate() {
        let chord = y0 + (y1 - y0) * i as f64 / last as f64;
        let gap = chord - y;
        if gap > best.0 {
            best = (gap, *y);
        }
    }
    best.1
}

/// Classic DBSCAN over a precomputed distance matrix. Neighborhoods are
/// closed balls (`d <= eps`) and include the row itself.
pub fn dbscan(dist: &[Vec<f64>], eps: f64, min_points: usize) -> Vec<ClusterLabel> {
    let n = dist.len();
    let neighbors: Vec<Vec<usize>> = (0..n)
        .map(|i| (0..n).filter(|&j| dist[i][j] <= eps).collect())
        .collect();
    let is_core: Vec<bool> = neighbors.iter().map(|nb| nb.len() >= min_points).collect();

    let mut labels: Vec<Option<ClusterLabel>> = vec![None; n];
    let mut next_cluster = 0;

    for i in 0..n {
        if labels[i].is_some() || !is_core[i] {
            continue;
        }
        let cluster = ClusterLabel::Cluster(next_cluster);
        next_cluster += 1;
        labels[i] = Some(cluster);

        let mut frontier = neighbors[i].clone();
        while let Some(j) = frontier.pop() {
            if labels[j].is_some() {
                continue;
            }
            labels[j] = Some(cluster);
            if is_core[j] {
                frontier.extend(neighbors[j].iter().copied().filter(|&m| labels[m].is_none()));
            }
        }
    }

    labels.into_iter().map(|l| l.unwrap_or(ClusterLabel::Noise)).collect()
}

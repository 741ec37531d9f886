//! Agglomerative clustering with average linkage and a distance cut.

use super::features::distance_matrix;
use super::method::{
    canonical_labels, ClusterError, ClusterLabel, ClusterMethod, MethodFit, MethodKind,
};

#[derive(Debug, Clone)]
pub struct HierarchicalMethod {
    /// Clusters closer than this (average linkage, inclusive) are merged.
    pub cut_distance: f64,
}

impl Default for HierarchicalMethod {
    fn default() -> Self {
        Self { cut_distance: 2.0 }
    }
}

impl ClusterMethod for HierarchicalMethod {
    fn kind(&self) -> MethodKind {
        MethodKind::Hierarchical
    }

    fn min_regions(&self) -> usize {
        2
    }

    fn fit(&self, data: &[Vec<f64>]) -> Result<MethodFit, ClusterError> {
        self.check_size(data)?;
        let labels = agglomerate(&distance_matrix(data), self.cut_distance)
            .into_iter()
            .map(ClusterLabel::Cluster)
            .collect();
        Ok(MethodFit::new(MethodKind::Hierarchical, labels))
    }
}

/// Average-linkage agglomeration over a distance matrix.
///
/// Repeatedly merges the closest pair of clusters while their linkage is
/// `<= cut`. Ties merge the lowest-indexed pair first. Returns canonical
/// labels (numbered by first appearance).
pub fn agglomerate(dist: &[Vec<f64>], cut: f64) -> Vec<usize> {
    let n = dist.len();
    let mut linkage: Vec<Vec<f64>> = dist.to_vec();
    let mut size = vec![1usize; n];
    let mut active = vec![true; n];
    // Representative cluster of every row.
    let mut owner: Vec<usize> = (0..n).collect();

    loop {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..n {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..n {
                if active[j] && best.map_or(true, |(_, _, d)| linkage[i][j] < d) {
                    best = Some((i, j, linkage[i][j]));
                }
            }
        }

        let Some((a, b, d)) = best else { break };
        if d > cut {
            break;
        }

        // Lance-Williams update for average linkage.
        let (sa, sb) = (size[a] as f64, size[b] as f64);
        for k in 0..n {
            if active[k] && k != a && k != b {
                let merged = (sa * linkage[a][k] + sb * linkage[b][k]) / (sa + sb);
                linkage[a][k] = merged;
                linkage[k][a] = merged;
            }
        }
        size[a] += size[b];
        active[b] = false;
        for o in owner.iter_mut() {
            if *o == b {
                *o = a;
            }
        }
    }

    canonical_labels(&owner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_below_cut_only() {
        let data = vec![vec![0.0], vec![0.5], vec![1.0], vec![10.0]];
        let fit = HierarchicalMethod { cut_distance: 2.0 }.fit(&data).unwrap();
        let l = fit.labels;
        assert_eq!(l[0], l[1]);
        assert_eq!(l[1], l[2]);
        assert_ne!(l[0], l[3]);
    }

    #[test]
    fn average_linkage_not_single_linkage() {
        // Single linkage would chain 0-1-2-3 at distance 1; average linkage
        // keeps the ends apart once the mean distance exceeds the cut.
        let dist = distance_matrix(&[vec![0.0], vec![1.0], vec![2.0], vec![3.0]]);
        let labels = agglomerate(&dist, 1.0);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn zero_cut_keeps_distinct_rows_apart() {
        let dist = distance_matrix(&[vec![0.0], vec![0.0], vec![1.0]]);
        assert_eq!(agglomerate(&dist, 0.0), vec![0, 0, 1]);
    }

    #[test]
    fn single_row_rejected() {
        assert!(HierarchicalMethod::default().fit(&[vec![1.0]]).is_err());
    }
}

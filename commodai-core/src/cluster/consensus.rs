//! Consensus over several labelings via a co-association matrix.

use super::hierarchical::agglomerate;
use super::method::{group_ids, ClusterLabel};

/// Fused grouping of all rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    /// Canonical consensus label per row.
    pub labels: Vec<usize>,
    /// Per-row agreement between the methods and the consensus, in [0, 1].
    pub agreement: Vec<f64>,
    pub co_association: Vec<Vec<f64>>,
}

/// Fraction of labelings that put each pair of rows in the same group.
/// Noise rows are never co-clustered with anything.
pub fn co_association(labelings: &[Vec<ClusterLabel>], n: usize) -> Vec<Vec<f64>> {
    let mut co = vec![vec![0.0; n]; n];
    for i in 0..n {
        co[i][i] = 1.0;
    }
    if labelings.is_empty() {
        return co;
    }
    let groups: Vec<Vec<usize>> = labelings.iter().map(|l| group_ids(l)).collect();
    let m = groups.len() as f64;
    for i in 0..n {
        for j in (i + 1)..n {
            let together = groups.iter().filter(|g| g[i] == g[j]).count() as f64 / m;
            co[i][j] = together;
            co[j][i] = together;
        }
    }
    co
}

/// Fuse labelings: rows whose average co-association reaches
/// `agreement_threshold` end up in one consensus cluster.
///
/// Only the groupings matter, so renaming the clusters of any labeling leaves
/// the result unchanged.
pub fn consensus(labelings: &[Vec<ClusterLabel>], n: usize, agreement_threshold: f64) -> Consensus {
    let co = co_association(labelings, n);
    let dist: Vec<Vec<f64>> = co.iter().map(|row| row.iter().map(|c| 1.0 - c).collect()).collect();
    let labels = if labelings.is_empty() {
        (0..n).collect()
    } else {
        agglomerate(&dist, 1.0 - agreement_threshold)
    };
    let agreement = agreement_scores(labelings, &labels);
    Consensus {
        labels,
        agreement,
        co_association: co,
    }
}

/// For each row, the mean over labelings of the fraction of other rows on
/// which the labeling's same/different decision matches the consensus.
fn agreement_scores(labelings: &[Vec<ClusterLabel>], consensus: &[usize]) -> Vec<f64> {
    let n = consensus.len();
    if labelings.is_empty() || n < 2 {
        return vec![1.0; n];
    }
    let groups: Vec<Vec<usize>> = labelings.iter().map(|l| group_ids(l)).collect();
    (0..n)
        .map(|i| {
            let per_method: f64 = groups
                .iter()
                .map(|g| {
                    let matches = (0..n)
                        .filter(|&j| j != i)
                        .filter(|&j| (g[i] == g[j]) == (consensus[i] == consensus[j]))
                        .count();
                    matches as f64 / (n - 1) as f64
                })
                .sum();
            per_method / groups.len() as f64
        })
        .collect()
}

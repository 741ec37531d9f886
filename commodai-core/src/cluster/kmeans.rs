//! Centroid method: k-means with k chosen by silhouette.

use rand::rngs::StdRng;
use rand::Rng;

use super::features::{distance_matrix, euclidean};
use super::method::{
    canonical_labels, ClusterError, ClusterLabel, ClusterMethod, MethodFit, MethodKind,
};
use super::quality::silhouette;
use crate::rng::RngHierarchy;

#[derive(Debug, Clone)]
pub struct KMeansMethod {
    pub k_min: usize,
    pub k_max: usize,
    /// Independent k-means++ starts per candidate k; lowest inertia wins.
    pub restarts: usize,
    pub max_iter: usize,
    pub rng: RngHierarchy,
}

impl Default for KMeansMethod {
    fn default() -> Self {
        Self {
            k_min: 2,
            k_max: 10,
            restarts: 8,
            max_iter: 100,
            rng: RngHierarchy::default(),
        }
    }
}

impl ClusterMethod for KMeansMethod {
    fn kind(&self) -> MethodKind {
        MethodKind::Centroid
    }

    /// Silhouette needs k <= n - 1.
    fn min_regions(&self) -> usize {
        self.k_min.max(2) + 1
    }

    fn fit(&self, data: &[Vec<f64>]) -> Result<MethodFit, ClusterError> {
        self.check_size(data)?;
        let dist = distance_matrix(data);
        let k_hi = self.k_max.min(data.len() - 1);

        let mut best: Option<(usize, f64, Vec<usize>)> = None;
        for k in self.k_min.max(2)..=k_hi {
            let assignment = self.best_of_restarts(data, k);
            let score = silhouette(&dist, &assignment).unwrap_or(f64::NEG_INFINITY);
            tracing::trace!(k, score, "k-means candidate");
            // Strictly greater keeps the smaller k on ties.
            if best.as_ref().map_or(true, |(_, s, _)| score > *s) {
                best = Some((k, score, assignment));
            }
        }

        let (k, _, assignment) = best.ok_or(ClusterError::InsufficientRegions {
            method: MethodKind::Centroid,
            required: self.min_regions(),
            available: data.len(),
        })?;
        let labels = canonical_labels(&assignment)
            .into_iter()
            .map(ClusterLabel::Cluster)
            .collect();

        let mut fit = MethodFit::new(MethodKind::Centroid, labels);
        fit.chosen_k = Some(k);
        Ok(fit)
    }
}

impl KMeansMethod {
    fn best_of_restarts(&self, data: &[Vec<f64>], k: usize) -> Vec<usize> {
        let mut best: Option<(f64, Vec<usize>)> = None;
        for restart in 0..self.restarts.max(1) {
            let mut rng = self.rng.rng_for("cluster.kmeans", &k.to_string(), restart as u64);
            let (inertia, assignment) = lloyd(data, k, self.max_iter, &mut rng);
            if best.as_ref().map_or(true, |(i, _)| inertia < *i) {
                best = Some((inertia, assignment));
            }
        }
        best.map(|(_, a)| a).unwrap_or_default()
    }
}

/// k-means++ seeding.
fn seed_centers(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centers = vec![data[rng.gen_range(0..data.len())].clone()];
    while centers.len() < k {
        let weights: Vec<f64> = data
            .iter()
            .map(|p| {
                centers
                    .iter()
                    .map(|c| euclidean(p, c).powi(2))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = weights.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen_range(0.0..total);
            let mut chosen = data.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                if target < *w {
                    chosen = i;
                    break;
                }
                target -= w;
            }
            chosen
        } else {
            // Every point coincides with a center already.
            rng.gen_range(0..data.len())
        };
        centers.push(data[next].clone());
    }
    centers
}

fn nearest(point: &[f64], centers: &[Vec<f64>]) -> (usize, f64) {
    centers
        .iter()
        .enumerate()
        .map(|(c, center)| (c, euclidean(point, center)))
        .fold((0, f64::INFINITY), |acc, cur| if cur.1 < acc.1 { cur } else { acc })
}

/// Lloyd iterations from a k-means++ start. Returns (inertia, assignment).
fn lloyd(data: &[Vec<f64>], k: usize, max_iter: usize, rng: &mut StdRng) -> (f64, Vec<usize>) {
    let width = data[0].len();
    let mut centers = seed_centers(data, k, rng);
    let mut assignment: Vec<usize> = data.iter().map(|p| nearest(p, &centers).0).collect();

    for _ in 0..max_iter.max(1) {
        for (c, center) in centers.iter_mut().enumerate() {
            let members: Vec<&Vec<f64>> = data
                .iter()
                .zip(&assignment)
                .filter(|(_, a)| **a == c)
                .map(|(p, _)| p)
                .collect();
            // An empty cluster keeps its previous center.
            if members.is_empty() {
                continue;
            }
            let mut sum = vec![0.0; width];
            for m in &members {
                for (s, v) in sum.iter_mut().zip(m.iter()) {
                    *s += v;
                }
            }
            *center = sum.into_iter().map(|s| s / members.len() as f64).collect();
        }

        let next: Vec<usize> = data.iter().map(|p| nearest(p, &centers).0).collect();
        if next == assignment {
            break;
        }
        assignment = next;
    }

    let inertia = data
        .iter()
        .zip(&assignment)
        .map(|(p, &c)| euclidean(p, &centers[c]).powi(2))
        .sum();
    (inertia, assignment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f64>> {
        let mut data = Vec::new();
        for i in 0..5 {
            data.push(vec![i as f64 * 0.1, 0.0]);
            data.push(vec![20.0 + i as f64 * 0.1, 0.0]);
            data.push(vec![0.0, 20.0 + i as f64 * 0.1]);
        }
        data
    }

    #[test]
    fn recovers_three_blobs() {
        let fit = KMeansMethod::default().fit(&blobs()).unwrap();
        assert_eq!(fit.chosen_k, Some(3));
        let labels = &fit.labels;
        for i in 0..5 {
            assert_eq!(labels[i * 3], labels[0]);
            assert_eq!(labels[i * 3 + 1], labels[1]);
            assert_eq!(labels[i * 3 + 2], labels[2]);
        }
        assert_ne!(labels[0], labels[1]);
        assert_ne!(labels[1], labels[2]);
        // Canonical numbering.
        assert_eq!(labels[0], ClusterLabel::Cluster(0));
    }

    #[test]
    fn too_few_rows_is_insufficient() {
        let err = KMeansMethod::default().fit(&[vec![0.0], vec![1.0]]).unwrap_err();
        assert_eq!(
            err,
            ClusterError::InsufficientRegions {
                method: MethodKind::Centroid,
                required: 3,
                available: 2
            }
        );
    }

    #[test]
    fn duplicate_points_do_not_break_seeding() {
        let data = vec![vec![1.0]; 6];
        let fit = KMeansMethod::default().fit(&data).unwrap();
        assert_eq!(fit.labels.len(), 6);
    }

    #[test]
    fn same_seed_same_labels() {
        let a = KMeansMethod::default().fit(&blobs()).unwrap();
        let b = KMeansMethod::default().fit(&blobs()).unwrap();
        assert_eq!(a, b);
    }
}

//! Isolation forest outlier scorer.
//!
//! Anomalies are few and different, so random axis-aligned splits isolate
//! them in fewer steps than normal points. The score of a point is
//! `2^(-E[h(x)] / c(psi))` where `h` is the path length and `c` the average
//! path length of an unsuccessful binary-search-tree lookup over `psi` points.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::Rng;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Rows per tree unless configured otherwise.
pub const DEFAULT_SUBSAMPLE_SIZE: usize = 32;

/// Forest hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    /// Points sampled (without replacement) per tree; capped at the data size.
    pub subsample_size: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            subsample_size: DEFAULT_SUBSAMPLE_SIZE,
        }
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A fitted isolation forest.
#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    /// Fit on row-major data. Rows must all have the same width.
    pub fn fit(data: &[Vec<f64>], params: ForestParams, rng: &mut StdRng) -> Self {
        let sample_size = params.subsample_size.min(data.len()).max(1);
        let height_limit = (sample_size as f64).log2().ceil().max(1.0) as usize;

        let trees = (0..params.n_trees.max(1))
            .map(|_| {
                let idx: Vec<usize> = if sample_size >= data.len() {
                    (0..data.len()).collect()
                } else {
                    sample(rng, data.len(), sample_size).into_vec()
                };
                build(data, idx, 0, height_limit, rng)
            })
            .collect();

        Self { trees, sample_size }
    }

    /// Anomaly score in (0, 1]; around 0.5 for unremarkable points.
    pub fn score(&self, point: &[f64]) -> f64 {
        let norm = average_path_length(self.sample_size);
        if norm <= 0.0 || self.trees.is_empty() {
            return 0.5;
        }
        let mean_path: f64 = self
            .trees
            .iter()
            .map(|t| path_length(t, point, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        2f64.powf(-mean_path / norm)
    }

    pub fn score_all(&self, data: &[Vec<f64>]) -> Vec<f64> {
        data.iter().map(|row| self.score(row)).collect()
    }
}

fn build(data: &[Vec<f64>], idx: Vec<usize>, depth: usize, limit: usize, rng: &mut StdRng) -> Node {
    if depth >= limit || idx.len() <= 1 {
        return Node::Leaf { size: idx.len() };
    }

    let width = data[idx[0]].len();
    let splittable: Vec<(usize, f64, f64)> = (0..width)
        .filter_map(|f| {
            let (lo, hi) = idx.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                (lo.min(data[i][f]), hi.max(data[i][f]))
            });
            (hi > lo).then_some((f, lo, hi))
        })
        .collect();

    // Identical points cannot be separated.
    if splittable.is_empty() {
        return Node::Leaf { size: idx.len() };
    }

    let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
    let threshold = rng.gen_range(lo..hi);
    // `<=` keeps the minimum on the left and, since threshold < hi, the maximum on the right.
    let (left, right): (Vec<usize>, Vec<usize>) =
        idx.into_iter().partition(|&i| data[i][feature] <= threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build(data, left, depth + 1, limit, rng)),
        right: Box::new(build(data, right, depth + 1, limit, rng)),
    }
}

fn path_length(node: &Node, point: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if point[*feature] <= *threshold {
                path_length(left, point, depth + 1)
            } else {
                path_length(right, point, depth + 1)
            }
        }
    }
}

/// `c(n)`: expected path length of an unsuccessful search in a BST of `n` nodes.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn forest(data: &[Vec<f64>], seed: u64) -> IsolationForest {
        let mut rng = StdRng::seed_from_u64(seed);
        let params = ForestParams {
            n_trees: 100,
            subsample_size: 256,
        };
        IsolationForest::fit(data, params, &mut rng)
    }

    #[test]
    fn average_path_length_reference_values() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // 2 * (ln 9 + gamma) - 1.8
        assert!((average_path_length(10) - 3.748880).abs() < 1e-5);
    }

    #[test]
    fn outlier_scores_above_inliers() {
        let mut data: Vec<Vec<f64>> = (0..100).map(|i| vec![(i % 10) as f64 * 0.1]).collect();
        data.push(vec![50.0]);
        let f = forest(&data, 1);
        let scores = f.score_all(&data);
        let outlier = scores[100];
        assert!(scores[..100].iter().all(|s| *s < outlier));
        assert!(outlier > 0.6, "outlier score {outlier}");
    }

    #[test]
    fn identical_rows_score_identically() {
        let mut data: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        data.push(vec![7.0, 1.0]);
        let f = forest(&data, 9);
        assert_eq!(f.score(&data[7]), f.score(&data[50]));
    }

    #[test]
    fn constant_data_scores_uniformly() {
        let data = vec![vec![1.0, 1.0]; 40];
        let f = forest(&data, 3);
        let scores = f.score_all(&data);
        assert!(scores.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn fitting_is_deterministic_for_a_seed() {
        let data: Vec<Vec<f64>> = (0..300).map(|i| vec![((i * 37) % 101) as f64]).collect();
        let a = forest(&data, 5).score_all(&data);
        let b = forest(&data, 5).score_all(&data);
        assert_eq!(a, b);
    }
}

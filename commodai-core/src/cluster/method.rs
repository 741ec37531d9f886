//! Common contract for the clustering strategies.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Label assigned to one region by one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterLabel {
    Cluster(usize),
    /// Density method only: the region belongs to no dense neighborhood.
    Noise,
}

impl ClusterLabel {
    pub fn is_noise(&self) -> bool {
        matches!(self, ClusterLabel::Noise)
    }
}

impl fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterLabel::Cluster(c) => write!(f, "{c}"),
            ClusterLabel::Noise => write!(f, "noise"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    Centroid,
    Density,
    Hierarchical,
}

impl MethodKind {
    pub fn name(&self) -> &'static str {
        match self {
            MethodKind::Centroid => "centroid",
            MethodKind::Density => "density",
            MethodKind::Hierarchical => "hierarchical",
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClusterError {
    #[error("{method} clustering needs at least {required} regions, {available} available")]
    InsufficientRegions {
        method: MethodKind,
        required: usize,
        available: usize,
    },
}

/// Output of one method over all regions.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodFit {
    pub kind: MethodKind,
    /// One label per input row, in input order.
    pub labels: Vec<ClusterLabel>,
    /// Cluster count chosen by the centroid method.
    pub chosen_k: Option<usize>,
    /// Neighborhood radius used by the density method.
    pub radius: Option<f64>,
}

impl MethodFit {
    pub fn new(kind: MethodKind, labels: Vec<ClusterLabel>) -> Self {
        Self {
            kind,
            labels,
            chosen_k: None,
            radius: None,
        }
    }
}

/// A clustering strategy over normalized feature rows.
///
/// Implementations only read their input, so they can run side by side.
pub trait ClusterMethod: Send + Sync {
    fn kind(&self) -> MethodKind;

    /// Fewest rows the method can cluster meaningfully.
    fn min_regions(&self) -> usize;

    fn fit(&self, data: &[Vec<f64>]) -> Result<MethodFit, ClusterError>;

    fn check_size(&self, data: &[Vec<f64>]) -> Result<(), ClusterError> {
        if data.len() < self.min_regions() {
            return Err(ClusterError::InsufficientRegions {
                method: self.kind(),
                required: self.min_regions(),
                available: data.len(),
            });
        }
        Ok(())
    }
}

/// Map labels to group ids where every noise row is its own group.
pub fn group_ids(labels: &[ClusterLabel]) -> Vec<usize> {
    let offset = labels
        .iter()
        .filter_map(|l| match l {
            ClusterLabel::Cluster(c) => Some(c + 1),
            ClusterLabel::Noise => None,
        })
        .max()
        .unwrap_or(0);

    labels
        .iter()
        .enumerate()
        .map(|(i, l)| match l {
            ClusterLabel::Cluster(c) => *c,
            ClusterLabel::Noise => offset + i,
        })
        .collect()
}

/// Renumber raw cluster ids by order of first appearance.
pub fn canonical_labels(raw: &[usize]) -> Vec<usize> {
    let mut seen: Vec<usize> = Vec::new();
    raw.iter()
        .map(|r| match seen.iter().position(|s| s == r) {
            Some(p) => p,
            None => {
                seen.push(*r);
                seen.len() - 1
            }
        })
        .collect()
}

//! Ensemble region clusterer.
//!
//! Runs every configured strategy over the same normalized feature rows,
//! records the ones that could not run, and fuses the rest into consensus
//! labels. Poor clusterings are reported, never rejected.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{AnomalyRegion, RegionId};
use crate::rng::RngHierarchy;

use super::consensus::consensus;
use super::dbscan::DbscanMethod;
use super::features::{distance_matrix, normalize, RegionFeatureVector};
use super::hierarchical::HierarchicalMethod;
use super::kmeans::KMeansMethod;
use super::method::{group_ids, ClusterLabel, ClusterMethod, MethodFit, MethodKind};
use super::quality::ClusterQuality;

/// Clusterer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Candidate k for the centroid method, inclusive.
    pub cluster_k_range: (usize, usize),
    /// Minimum fraction of methods that must co-cluster two regions.
    pub consensus_agreement_threshold: f64,
    pub density_min_points: usize,
    /// Fixed density radius; absent means k-distance elbow.
    pub density_eps: Option<f64>,
    pub hierarchical_cut_distance: f64,
    pub kmeans_restarts: usize,
    pub kmeans_max_iter: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_k_range: (2, 10),
            consensus_agreement_threshold: 0.5,
            density_min_points: 2,
            density_eps: None,
            hierarchical_cut_distance: 2.0,
            kmeans_restarts: 8,
            kmeans_max_iter: 100,
        }
    }
}

/// Final grouping of one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub region_id: RegionId,
    pub consensus_label: usize,
    /// Only methods that ran appear here.
    pub method_labels: BTreeMap<MethodKind, ClusterLabel>,
    pub agreement: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedMethod {
    pub method: MethodKind,
    pub reason: String,
}

/// Everything the clusterer produced, including how it degraded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterResult {
    /// One per input region, in input order.
    pub assignments: Vec<ClusterAssignment>,
    pub methods_run: Vec<MethodKind>,
    pub skipped: Vec<SkippedMethod>,
    pub method_quality: BTreeMap<MethodKind, ClusterQuality>,
    pub consensus_quality: ClusterQuality,
    pub chosen_k: Option<usize>,
    pub density_radius: Option<f64>,
}

impl ClusterResult {
    pub fn assignment(&self, id: &RegionId) -> Option<&ClusterAssignment> {
        self.assignments.iter().find(|a| &a.region_id == id)
    }

    pub fn cluster_count(&self) -> usize {
        let mut labels: Vec<usize> = self.assignments.iter().map(|a| a.consensus_label).collect();
        labels.sort_unstable();
        labels.dedup();
        labels.len()
    }
}

pub struct RegionClusterer {
    config: ClusterConfig,
    methods: Vec<Box<dyn ClusterMethod>>,
}

impl RegionClusterer {
    pub fn new(config: ClusterConfig, rng: RngHierarchy) -> Self {
        let (k_min, k_max) = config.cluster_k_range;
        let methods: Vec<Box<dyn ClusterMethod>> = vec![
            Box::new(KMeansMethod {
                k_min,
                k_max,
                restarts: config.kmeans_restarts,
                max_iter: config.kmeans_max_iter,
                rng,
            }),
            Box::new(DbscanMethod {
                min_points: config.density_min_points,
                eps: config.density_eps,
            }),
            Box::new(HierarchicalMethod {
                cut_distance: config.hierarchical_cut_distance,
            }),
        ];
        Self { config, methods }
    }

    /// Replace the strategy set.
    pub fn with_methods(config: ClusterConfig, methods: Vec<Box<dyn ClusterMethod>>) -> Self {
        Self { config, methods }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Cluster regions by their normalized feature vectors.
    pub fn cluster(&self, regions: &[AnomalyRegion]) -> ClusterResult {
        let vectors: Vec<RegionFeatureVector> =
            regions.iter().map(RegionFeatureVector::from_region).collect();
        let ids: Vec<RegionId> = vectors.iter().map(|v| v.region_id.clone()).collect();
        self.cluster_rows(&ids, &normalize(&vectors))
    }

    /// Cluster already-normalized rows, one per id.
    pub fn cluster_rows(&self, ids: &[RegionId], rows: &[Vec<f64>]) -> ClusterResult {
        let n = rows.len();
        if n < 2 {
            return ClusterResult {
                assignments: ids
                    .iter()
                    .enumerate()
                    .map(|(i, id)| ClusterAssignment {
                        region_id: id.clone(),
                        consensus_label: i,
                        method_labels: BTreeMap::new(),
                        agreement: 1.0,
                    })
                    .collect(),
                skipped: self
                    .methods
                    .iter()
                    .map(|m| SkippedMethod {
                        method: m.kind(),
                        reason: format!("{n} region(s), clustering needs at least 2"),
                    })
                    .collect(),
                ..ClusterResult::default()
            };
        }

        // Strategies only read `rows`; each writes its own slot.
        let outcomes: Vec<_> = self.methods.par_iter().map(|m| (m.kind(), m.fit(rows))).collect();

        let mut fits: Vec<MethodFit> = Vec::new();
        let mut skipped = Vec::new();
        for (kind, outcome) in outcomes {
            match outcome {
                Ok(fit) => fits.push(fit),
                Err(e) => {
                    tracing::warn!(method = %kind, error = %e, "clustering method skipped");
                    skipped.push(SkippedMethod {
                        method: kind,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let dist = distance_matrix(rows);
        let labelings: Vec<Vec<ClusterLabel>> = fits.iter().map(|f| f.labels.clone()).collect();
        let fused = consensus(&labelings, n, self.config.consensus_agreement_threshold);

        let method_quality = fits
            .iter()
            .map(|f| (f.kind, ClusterQuality::evaluate(rows, &dist, &group_ids(&f.labels))))
            .collect();
        let consensus_quality = ClusterQuality::evaluate(rows, &dist, &fused.labels);

        let assignments = ids
            .iter()
            .enumerate()
            .map(|(i, id)| ClusterAssignment {
                region_id: id.clone(),
                consensus_label: fused.labels[i],
                method_labels: fits.iter().map(|f| (f.kind, f.labels[i])).collect(),
                agreement: fused.agreement[i],
            })
            .collect();

        let result = ClusterResult {
            assignments,
            methods_run: fits.iter().map(|f| f.kind).collect(),
            skipped,
            method_quality,
            consensus_quality,
            chosen_k: fits.iter().find_map(|f| f.chosen_k),
            density_radius: fits.iter().find_map(|f| f.radius),
        };
        tracing::info!(
            regions = n,
            clusters = result.cluster_count(),
            methods = result.methods_run.len(),
            "regions clustered"
        );
        result
    }
}

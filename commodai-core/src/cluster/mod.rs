//! Ensemble clustering of anomaly regions.
//!
//! Three strategies share the [`ClusterMethod`] contract:
//! - [`KMeansMethod`]: centroid-based, k chosen by silhouette
//! - [`DbscanMethod`]: density-based, may label rows as noise
//! - [`HierarchicalMethod`]: average-linkage agglomeration with a distance cut
//!
//! Their labelings are fused through a co-association matrix.

pub mod consensus;
pub mod dbscan;
pub mod ensemble;
pub mod features;
pub mod hierarchical;
pub mod kmeans;
pub mod method;
pub mod quality;

pub use consensus::{co_association, consensus, Consensus};
pub use dbscan::{dbscan, elbow_radius, DbscanMethod};
pub use ensemble::{ClusterAssignment, ClusterConfig, ClusterResult, RegionClusterer, SkippedMethod};
pub use features::{distance_matrix, euclidean, normalize, RegionFeatureVector, FEATURE_NAMES};
pub use hierarchical::{agglomerate, HierarchicalMethod};
pub use kmeans::KMeansMethod;
pub use method::{
    canonical_labels, group_ids, ClusterError, ClusterLabel, ClusterMethod, MethodFit, MethodKind,
};
pub use quality::{davies_bouldin, silhouette, ClusterQuality};

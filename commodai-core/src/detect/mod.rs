//! Per-entity anomaly detection.

pub mod detector;
pub mod features;
pub mod isolation;
pub mod moving_average;
pub mod regions;

pub use detector::{
    percentile, AnomalyDetector, Detection, DetectorConfig, DetectorFitError, FlagPolicy,
};
pub use features::{feature_matrix, mean_variance, IsolationFeature};
pub use isolation::{average_path_length, ForestParams, IsolationForest, DEFAULT_SUBSAMPLE_SIZE};
pub use moving_average::{deviation_check, DeviationCheck};
pub use regions::build_regions;

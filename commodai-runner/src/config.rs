//! Pipeline configuration, loaded from TOML.
//!
//! Every section carries `#[serde(default)]`, so a partial file (or an empty
//! one) yields the documented defaults for everything it leaves out.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use commodai_core::cluster::ClusterConfig;
use commodai_core::data::{AlignOptions, CalendarMode, Interpolation};
use commodai_core::detect::DetectorConfig;
use commodai_core::enrich::EnrichConfig;
use commodai_core::rng::DEFAULT_SEED;

/// Errors from reading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Input parsing and calendar alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub calendar: CalendarMode,
    pub missing_value_interpolation: Interpolation,
    /// Field delimiter of every input CSV.
    pub delimiter: char,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            calendar: CalendarMode::TradingDays,
            missing_value_interpolation: Interpolation::StepHold,
            delimiter: ',',
        }
    }
}

/// Run-level settings that are not owned by any one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Master seed for every stochastic stage.
    pub seed: u64,
    /// Enrichment stops at this many seconds after the run starts.
    pub run_timeout_secs: Option<u64>,
    /// Detection pool size; 0 lets rayon decide.
    pub detect_threads: usize,
    /// Headlines kept per region summary.
    pub summary_headlines: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            run_timeout_secs: None,
            detect_threads: 0,
            summary_headlines: 5,
        }
    }
}

/// Complete configuration of one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub loader: LoaderConfig,
    pub detector: DetectorConfig,
    pub cluster: ClusterConfig,
    pub enrich: EnrichConfig,
    pub run: RunSettings,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Deterministic hash of the effective configuration (BLAKE3 over JSON).
    ///
    /// Two runs with equal hashes and equal dataset hashes produce the same
    /// regions and clusters.
    pub fn config_hash(&self) -> Result<String, ConfigError> {
        let json = serde_json::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    /// Alignment options derived from the loader and detector sections.
    pub fn align_options(&self) -> AlignOptions {
        AlignOptions {
            calendar: self.loader.calendar,
            interpolation: self.loader.missing_value_interpolation,
            min_observations: self.detector.min_observations,
        }
    }

    pub fn delimiter(&self) -> u8 {
        // Checked ASCII by validate().
        self.loader.delimiter as u8
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !self.loader.delimiter.is_ascii() || self.loader.delimiter == '"' {
            return invalid(format!(
                "delimiter must be a single ASCII character other than '\"', got {:?}",
                self.loader.delimiter
            ));
        }

        let d = &self.detector;
        if !(d.anomaly_percentile > 0.0 && d.anomaly_percentile < 1.0) {
            return invalid(format!(
                "anomaly_percentile must be in (0, 1), got {}",
                d.anomaly_percentile
            ));
        }
        if !(d.ma_deviation_k > 0.0) || !d.ma_deviation_k.is_finite() {
            return invalid(format!("ma_deviation_k must be positive, got {}", d.ma_deviation_k));
        }
        if d.ma_window < 2 {
            return invalid(format!("ma_window must be at least 2, got {}", d.ma_window));
        }
        if d.rolling_window == 0 {
            return invalid("rolling_window must be at least 1".into());
        }
        if d.features.is_empty() {
            return invalid("features must name at least one isolation feature".into());
        }
        if d.n_trees == 0 || d.subsample_size < 2 {
            return invalid(format!(
                "n_trees must be positive and subsample_size at least 2, got {} and {}",
                d.n_trees, d.subsample_size
            ));
        }

        let c = &self.cluster;
        let (k_min, k_max) = c.cluster_k_range;
        if k_min < 2 || k_min > k_max {
            return invalid(format!(
                "cluster_k_range must satisfy 2 <= min <= max, got ({k_min}, {k_max})"
            ));
        }
        if !(0.0..=1.0).contains(&c.consensus_agreement_threshold) {
            return invalid(format!(
                "consensus_agreement_threshold must be in [0, 1], got {}",
                c.consensus_agreement_threshold
            ));
        }
        if c.density_min_points == 0 {
            return invalid("density_min_points must be at least 1".into());
        }
        if let Some(eps) = c.density_eps {
            if !(eps > 0.0) || !eps.is_finite() {
                return invalid(format!("density_eps must be positive, got {eps}"));
            }
        }
        if !(c.hierarchical_cut_distance > 0.0) {
            return invalid(format!(
                "hierarchical_cut_distance must be positive, got {}",
                c.hierarchical_cut_distance
            ));
        }
        if c.kmeans_restarts == 0 || c.kmeans_max_iter == 0 {
            return invalid("kmeans_restarts and kmeans_max_iter must be positive".into());
        }

        let e = &self.enrich;
        if e.enrich_workers == 0 {
            return invalid("enrich_workers must be at least 1".into());
        }
        if !(e.rate_limit_per_sec > 0.0) || e.rate_limit_burst == 0 {
            return invalid(format!(
                "rate limit needs a positive rate and burst, got {} and {}",
                e.rate_limit_per_sec, e.rate_limit_burst
            ));
        }
        if e.retry_base_delay_ms > e.retry_max_delay_ms {
            return invalid(format!(
                "retry_base_delay_ms ({}) exceeds retry_max_delay_ms ({})",
                e.retry_base_delay_ms, e.retry_max_delay_ms
            ));
        }

        if self.run.summary_headlines == 0 {
            return invalid("summary_headlines must be at least 1".into());
        }
        Ok(())
    }
}

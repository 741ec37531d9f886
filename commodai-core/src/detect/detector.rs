//! Per-entity anomaly detector.
//!
//! Pipeline for one entity:
//! 1. Drop missing values (they are never scored)
//! 2. Short-circuit flat series to "no anomalies"
//! 3. Run the moving-average deviation check, which also decides which
//!    values form the trailing baseline
//! 4. Fit an isolation forest on the entity's own feature matrix
//! 5. Flag scores above the entity's own percentile threshold
//! 6. Combine both flags under the configured policy
//! 7. Merge flagged points into regions

use chrono::NaiveDate;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::DEFAULT_MIN_OBSERVATIONS;
use crate::domain::{AnomalyPoint, AnomalyRegion, FlagSource};

use super::features::{feature_matrix, IsolationFeature};
use super::isolation::{ForestParams, IsolationForest, DEFAULT_SUBSAMPLE_SIZE};
use super::moving_average::deviation_check;
use super::regions::build_regions;

/// An entity that could not be modeled.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DetectorFitError {
    #[error(
        "entity '{entity}' has {found} valid observations after excluding missing values, \
         at least {required} required"
    )]
    InsufficientObservations {
        entity: String,
        found: usize,
        required: usize,
    },

    #[error("entity '{entity}': calendar has {dates} dates but series has {values} values")]
    LengthMismatch {
        entity: String,
        dates: usize,
        values: usize,
    },
}

/// How the isolation flag and the moving-average flag combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlagPolicy {
    /// Either check flags the point.
    #[default]
    Union,
    /// Both checks flag the point.
    Intersection,
    /// Isolation forest alone.
    PrimaryOnly,
    /// Moving-average deviation alone.
    SecondaryOnly,
}

impl FlagPolicy {
    pub fn combine(self, source: FlagSource) -> bool {
        match self {
            FlagPolicy::Union => source.primary || source.secondary,
            FlagPolicy::Intersection => source.primary && source.secondary,
            FlagPolicy::PrimaryOnly => source.primary,
            FlagPolicy::SecondaryOnly => source.secondary,
        }
    }
}

/// Detector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Scores above this percentile of the entity's own distribution are flagged.
    pub anomaly_percentile: f64,
    /// Moving-average check: flag beyond `k` standard deviations.
    pub ma_deviation_k: f64,
    /// Trailing window for the moving-average check.
    pub ma_window: usize,
    /// Rolling window for the isolation features.
    pub rolling_window: usize,
    /// Unflagged positions tolerated inside one region.
    pub gap_tolerance_days: usize,
    pub min_observations: usize,
    pub flag_policy: FlagPolicy,
    pub features: Vec<IsolationFeature>,
    pub n_trees: usize,
    /// Rows sampled per tree. Small samples keep a cluster of similar
    /// anomalies from masking itself.
    pub subsample_size: usize,
    /// Also model macro and weather series, on their true observations only.
    pub model_context_series: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            anomaly_percentile: 0.95,
            ma_deviation_k: 3.0,
            ma_window: 20,
            rolling_window: 7,
            gap_tolerance_days: 0,
            min_observations: DEFAULT_MIN_OBSERVATIONS,
            flag_policy: FlagPolicy::Union,
            features: IsolationFeature::all(),
            n_trees: 100,
            subsample_size: DEFAULT_SUBSAMPLE_SIZE,
            model_context_series: false,
        }
    }
}

/// Detector output for one entity.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub entity: String,
    /// One point per valid (non-missing) observation, in calendar order.
    pub points: Vec<AnomalyPoint>,
    pub regions: Vec<AnomalyRegion>,
    /// Isolation-score threshold; `None` when the series was flat.
    pub threshold: Option<f64>,
    pub flat: bool,
}

impl Detection {
    pub fn flagged_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_flagged).count()
    }
}

/// Scores one entity at a time. Stateless between calls.
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    config: DetectorConfig,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect anomaly regions in one aligned series.
    ///
    /// `dates` and `values` are the shared calendar and this entity's values
    /// on it. The entity's scores never see another entity's data.
    pub fn detect(
        &self,
        entity: &str,
        dates: &[NaiveDate],
        values: &[Option<f64>],
        rng: &mut StdRng,
    ) -> Result<Detection, DetectorFitError> {
        if dates.len() != values.len() {
            return Err(DetectorFitError::LengthMismatch {
                entity: entity.to_string(),
                dates: dates.len(),
                values: values.len(),
            });
        }

        let valid: Vec<(usize, f64)> = values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.filter(|x| x.is_finite()).map(|x| (i, x)))
            .collect();

        let required = self.config.min_observations.max(2);
        if valid.len() < required {
            return Err(DetectorFitError::InsufficientObservations {
                entity: entity.to_string(),
                found: valid.len(),
                required,
            });
        }

        let series: Vec<f64> = valid.iter().map(|(_, v)| *v).collect();
        let make_point = |k: usize, score: f64, source: FlagSource| {
            let (grid_index, value) = valid[k];
            AnomalyPoint {
                entity: entity.to_string(),
                date: dates[grid_index],
                grid_index,
                value,
                score,
                source,
                is_flagged: self.config.flag_policy.combine(source),
            }
        };

        if is_flat(&series) {
            tracing::debug!(entity, "flat series, no anomalies");
            let points = (0..valid.len())
                .map(|k| make_point(k, 0.0, FlagSource::default()))
                .collect();
            return Ok(Detection {
                entity: entity.to_string(),
                points,
                regions: Vec::new(),
                threshold: None,
                flat: true,
            });
        }

        let features = if self.config.features.is_empty() {
            vec![IsolationFeature::Value]
        } else {
            self.config.features.clone()
        };
        let check = deviation_check(&series, self.config.ma_window, self.config.ma_deviation_k);
        let matrix = feature_matrix(
            &series,
            &check.admitted,
            &features,
            self.config.rolling_window,
        );
        let params = ForestParams {
            n_trees: self.config.n_trees,
            subsample_size: self.config.subsample_size,
        };
        let forest = IsolationForest::fit(&matrix, params, rng);
        let scores = forest.score_all(&matrix);
        let threshold = percentile(&scores, self.config.anomaly_percentile);

        let points: Vec<AnomalyPoint> = scores
            .iter()
            .zip(&check.flags)
            .enumerate()
            .map(|(k, (&score, &sec))| {
                let source = FlagSource {
                    primary: score > threshold,
                    secondary: sec,
                };
                make_point(k, score, source)
            })
            .collect();

        let regions = build_regions(entity, &points, self.config.gap_tolerance_days);
        tracing::debug!(
            entity,
            points = points.len(),
            regions = regions.len(),
            threshold,
            "entity scored"
        );

        Ok(Detection {
            entity: entity.to_string(),
            points,
            regions,
            threshold: Some(threshold),
            flat: false,
        })
    }
}

fn is_flat(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

/// Percentile with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

//! Multi-series time alignment (the series loader).
//!
//! Every series is resampled onto one shared calendar. Absent observations
//! carry an explicit `None`, never zero. Only macro series may be filled, and
//! only from true observations (step-hold or linear).

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ingest::{EntityFailure, LoadError, RawSeries};
use crate::domain::{DatasetHash, Provenance, Series};

/// Default minimum number of true observations for a modeled series.
pub const DEFAULT_MIN_OBSERVATIONS: usize = 30;

/// How the shared calendar is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CalendarMode {
    /// Union of the dates on which any price series has an observation.
    #[default]
    TradingDays,
    /// Every calendar day from the earliest start to the latest end.
    Daily,
}

/// Fill method for low-frequency (macro) series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Interpolation {
    /// Hold the last true observation until the next one (and to the end).
    #[default]
    StepHold,
    /// Linear in calendar days, strictly between true observations.
    Linear,
}

/// Options controlling alignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignOptions {
    pub calendar: CalendarMode,
    pub interpolation: Interpolation,
    /// Applies to price series; context series only need to be non-empty.
    pub min_observations: usize,
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self {
            calendar: CalendarMode::TradingDays,
            interpolation: Interpolation::StepHold,
            min_observations: DEFAULT_MIN_OBSERVATIONS,
        }
    }
}

/// One series on the shared calendar.
#[derive(Debug, Clone, Serialize)]
pub struct AlignedSeries {
    pub name: String,
    pub provenance: Provenance,
    /// Same length as the frame's dates. `None` marks a missing value.
    pub values: Vec<Option<f64>>,
    /// Whether each value is a true observation (as opposed to filled or missing).
    pub observed: Vec<bool>,
}

impl AlignedSeries {
    pub fn observed_count(&self) -> usize {
        self.observed.iter().filter(|o| **o).count()
    }

    /// Values with fills stripped: only true observations survive.
    pub fn observed_values(&self) -> Vec<Option<f64>> {
        self.values
            .iter()
            .zip(&self.observed)
            .map(|(v, o)| if *o { *v } else { None })
            .collect()
    }
}

/// All series resampled onto one calendar. Immutable after construction.
#[derive(Debug, Clone)]
pub struct AlignedFrame {
    dates: Vec<NaiveDate>,
    series: BTreeMap<String, AlignedSeries>,
    dataset_hash: DatasetHash,
}

impl AlignedFrame {
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&AlignedSeries> {
        self.series.get(name)
    }

    pub fn dataset_hash(&self) -> &DatasetHash {
        &self.dataset_hash
    }

    /// All series of one provenance, ordered by name.
    pub fn by_provenance(&self, provenance: Provenance) -> impl Iterator<Item = &AlignedSeries> {
        self.series
            .values()
            .filter(move |s| s.provenance == provenance)
    }

    /// Names of the modeled (price) entities, ordered.
    pub fn entities(&self) -> Vec<&str> {
        self.by_provenance(Provenance::Price)
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Names of the macro and weather series, ordered.
    pub fn context_series(&self) -> Vec<&str> {
        self.series
            .values()
            .filter(|s| s.provenance != Provenance::Price)
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }
}

/// Result of loading: the frame plus every series that was skipped.
#[derive(Debug)]
pub struct LoadedFrame {
    pub frame: AlignedFrame,
    pub failures: Vec<EntityFailure>,
}

/// Normalize, validate and align raw series.
///
/// Series failing validation are reported in `failures` and left out of the
/// frame; the rest are aligned. Input series are not mutated.
pub fn load_frame(raw: &[RawSeries], opts: &AlignOptions) -> LoadedFrame {
    let mut failures = Vec::new();
    let mut accepted: Vec<Series> = Vec::new();

    for r in raw {
        let (series, stats) = Series::normalize(r.name.clone(), r.provenance, &r.observations);
        if stats.duplicates > 0 {
            tracing::warn!(
                series = %r.name,
                duplicates = stats.duplicates,
                "duplicate dates collapsed"
            );
        }
        match validate(&series, opts) {
            Ok(()) => accepted.push(series),
            Err(error) => {
                tracing::warn!(series = %r.name, error = %error, "series skipped");
                failures.push(EntityFailure {
                    entity: r.name.clone(),
                    error,
                });
            }
        }
    }

    let dates = build_calendar(&accepted, opts.calendar);
    let series = accepted
        .iter()
        .map(|s| (s.name().to_string(), resample(s, &dates, opts.interpolation)))
        .collect();
    let dataset_hash = compute_dataset_hash(&accepted);

    LoadedFrame {
        frame: AlignedFrame {
            dates,
            series,
            dataset_hash,
        },
        failures,
    }
}

fn validate(series: &Series, opts: &AlignOptions) -> Result<(), LoadError> {
    if series.is_empty() {
        return Err(LoadError::Empty {
            series: series.name().to_string(),
        });
    }
    if series.provenance() == Provenance::Price && series.len() < opts.min_observations {
        return Err(LoadError::InsufficientObservations {
            series: series.name().to_string(),
            found: series.len(),
            required: opts.min_observations,
        });
    }
    Ok(())
}

fn build_calendar(series: &[Series], mode: CalendarMode) -> Vec<NaiveDate> {
    let has_prices = series.iter().any(|s| s.provenance() == Provenance::Price);
    let anchors: Vec<&Series> = series
        .iter()
        .filter(|s| !has_prices || s.provenance() == Provenance::Price)
        .collect();

    match mode {
        CalendarMode::TradingDays => {
            let mut dates = BTreeSet::new();
            for s in &anchors {
                dates.extend(s.observations().iter().map(|o| o.date));
            }
            dates.into_iter().collect()
        }
        CalendarMode::Daily => {
            let first = anchors.iter().filter_map(|s| s.first_date()).min();
            let last = anchors.iter().filter_map(|s| s.last_date()).max();
            match (first, last) {
                (Some(first), Some(last)) => first.iter_days().take_while(|d| *d <= last).collect(),
                _ => Vec::new(),
            }
        }
    }
}

fn resample(series: &Series, dates: &[NaiveDate], interpolation: Interpolation) -> AlignedSeries {
    let obs = series.observations();
    let mut values = Vec::with_capacity(dates.len());
    let mut observed = Vec::with_capacity(dates.len());
    let fill = series.provenance().is_fillable();

    // Index of the first observation with date > current date.
    let mut next = 0usize;
    for &date in dates {
        while next < obs.len() && obs[next].date <= date {
            next += 1;
        }
        let prev = next.checked_sub(1).map(|i| obs[i]);

        match prev {
            Some(p) if p.date == date => {
                values.push(Some(p.value));
                observed.push(true);
            }
            Some(p) if fill => {
                let filled = match (interpolation, obs.get(next)) {
                    (Interpolation::StepHold, _) => Some(p.value),
                    (Interpolation::Linear, Some(n)) => {
                        let span = (n.date - p.date).num_days() as f64;
                        let t = (date - p.date).num_days() as f64 / span;
                        Some(p.value + t * (n.value - p.value))
                    }
                    (Interpolation::Linear, None) => None,
                };
                values.push(filled);
                observed.push(false);
            }
            _ => {
                values.push(None);
                observed.push(false);
            }
        }
    }

    AlignedSeries {
        name: series.name().to_string(),
        provenance: series.provenance(),
        values,
        observed,
    }
}

/// Deterministic BLAKE3 hash over all normalized observations, in name order.
fn compute_dataset_hash(series: &[Series]) -> DatasetHash {
    let mut sorted: Vec<&Series> = series.iter().collect();
    sorted.sort_by(|a, b| a.name().cmp(b.name()));

    let mut hasher = blake3::Hasher::new();
    for s in sorted {
        hasher.update(s.name().as_bytes());
        hasher.update(&[s.provenance() as u8]);
        for o in s.observations() {
            hasher.update(o.date.to_string().as_bytes());
            hasher.update(&o.value.to_le_bytes());
        }
    }
    DatasetHash(hasher.finalize().to_hex().to_string())
}

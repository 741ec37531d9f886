//! Series: the raw unit of input data.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single (date, value) observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Where a series came from. Drives fill rules and output placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Per-entity closing prices. These are the series that get modeled.
    Price,
    /// Low-frequency macroeconomic indicator (GDP, rates, indices).
    Macro,
    /// Station weather measurement (TMIN, TMAX, PRCP, ...).
    Weather,
}

impl Provenance {
    /// Whether gaps between true observations may be filled.
    pub fn is_fillable(self) -> bool {
        matches!(self, Provenance::Macro)
    }
}

/// Sampling cadence, inferred from the spacing of observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Daily,
    Irregular,
}

/// Counters produced while normalizing a raw series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub duplicates: usize,
    pub non_finite: usize,
}

/// A normalized series: strictly increasing dates, finite values only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    name: String,
    provenance: Provenance,
    cadence: Cadence,
    observations: Vec<Observation>,
}

impl Series {
    /// Normalize raw observations into a series.
    ///
    /// Non-finite values are dropped, observations are sorted by date and
    /// duplicate dates keep the last occurrence in input order.
    pub fn normalize(
        name: impl Into<String>,
        provenance: Provenance,
        raw: &[Observation],
    ) -> (Self, NormalizeStats) {
        let mut stats = NormalizeStats::default();
        let mut obs: Vec<(usize, Observation)> = raw
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, o)| {
                let keep = o.value.is_finite();
                if !keep {
                    stats.non_finite += 1;
                }
                keep
            })
            .collect();

        // Stable on (date, input position) so the last duplicate wins below.
        obs.sort_by_key(|(i, o)| (o.date, *i));

        let mut observations: Vec<Observation> = Vec::with_capacity(obs.len());
        for (_, o) in obs {
            match observations.last_mut() {
                Some(last) if last.date == o.date => {
                    *last = o;
                    stats.duplicates += 1;
                }
                _ => observations.push(o),
            }
        }

        let cadence = infer_cadence(&observations);
        (
            Self {
                name: name.into(),
                provenance,
                cadence,
                observations,
            },
            stats,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.observations.first().map(|o| o.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.date)
    }
}

/// Daily when the median gap is at most one day (weekends do not move the median).
fn infer_cadence(obs: &[Observation]) -> Cadence {
    if obs.len() < 2 {
        return Cadence::Irregular;
    }
    let mut gaps: Vec<i64> = obs
        .windows(2)
        .map(|w| (w[1].date - w[0].date).num_days())
        .collect();
    gaps.sort_unstable();
    if gaps[gaps.len() / 2] <= 1 {
        Cadence::Daily
    } else {
        Cadence::Irregular
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn normalize_sorts_and_keeps_last_duplicate() {
        let raw = vec![
            Observation::new(d("2024-01-03"), 3.0),
            Observation::new(d("2024-01-02"), 2.0),
            Observation::new(d("2024-01-03"), 3.5),
        ];
        let (series, stats) = Series::normalize("CORN", Provenance::Price, &raw);

        assert_eq!(series.len(), 2);
        assert_eq!(series.observations()[0].date, d("2024-01-02"));
        assert_eq!(series.observations()[1].value, 3.5);
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn normalize_drops_non_finite() {
        let raw = vec![
            Observation::new(d("2024-01-02"), f64::NAN),
            Observation::new(d("2024-01-03"), 1.0),
            Observation::new(d("2024-01-04"), f64::INFINITY),
        ];
        let (series, stats) = Series::normalize("GDP", Provenance::Macro, &raw);
        assert_eq!(series.len(), 1);
        assert_eq!(stats.non_finite, 2);
    }

    #[test]
    fn dates_strictly_increase_after_normalize() {
        let raw: Vec<Observation> = [5, 1, 3, 3, 2, 5]
            .iter()
            .map(|day| Observation::new(d("2024-03-01") + chrono::Duration::days(*day), 1.0))
            .collect();
        let (series, _) = Series::normalize("X", Provenance::Price, &raw);
        assert!(series
            .observations()
            .windows(2)
            .all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn cadence_inference() {
        // Mon..Fri, Mon
        let days = [
            "2024-01-01",
            "2024-01-02",
            "2024-01-03",
            "2024-01-04",
            "2024-01-05",
            "2024-01-08",
        ];
        let daily: Vec<Observation> = days
            .iter()
            .map(|s| Observation::new(d(s), 1.0))
            .collect();
        let (s, _) = Series::normalize("A", Provenance::Price, &daily);
        assert_eq!(s.cadence(), Cadence::Daily);

        let quarterly: Vec<Observation> = ["2023-01-01", "2023-04-01", "2023-07-01"]
            .iter()
            .map(|s| Observation::new(d(s), 1.0))
            .collect();
        let (s, _) = Series::normalize("GDP", Provenance::Macro, &quarterly);
        assert_eq!(s.cadence(), Cadence::Irregular);
    }
}

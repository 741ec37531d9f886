//! Anomaly points and regions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ids::RegionId;

/// Which checks raised a point, independent of the combining policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSource {
    /// Isolation score above the entity's percentile threshold.
    pub primary: bool,
    /// Deviation from the trailing moving average above `k` sigma.
    pub secondary: bool,
}

/// A scored observation of one entity. Derived, never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyPoint {
    pub entity: String,
    pub date: NaiveDate,
    /// Position on the aligned calendar.
    pub grid_index: usize,
    pub value: f64,
    /// Isolation score in (0, 1]; higher is more anomalous.
    pub score: f64,
    pub source: FlagSource,
    pub is_flagged: bool,
}

/// A maximal run of flagged points for one entity.
///
/// Created by the detector and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRegion {
    pub id: RegionId,
    pub entity: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub peak_score: f64,
    pub mean_score: f64,
    pub point_count: usize,
    pub start_value: f64,
    pub end_value: f64,
    /// Standard deviation of member values relative to their mean magnitude.
    pub volatility: f64,
}

impl AnomalyRegion {
    /// Calendar span in days, inclusive of both ends.
    pub fn duration_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Relative change from the first to the last member value.
    pub fn value_delta(&self) -> f64 {
        if self.start_value == 0.0 {
            0.0
        } else {
            (self.end_value - self.start_value) / self.start_value.abs()
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start <= end && start <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(start: &str, end: &str, start_value: f64, end_value: f64) -> AnomalyRegion {
        AnomalyRegion {
            id: RegionId::new("CORN", 0),
            entity: "CORN".into(),
            start: NaiveDate::parse_from_str(start, "%Y-%m-%d").unwrap(),
            end: NaiveDate::parse_from_str(end, "%Y-%m-%d").unwrap(),
            peak_score: 0.8,
            mean_score: 0.7,
            point_count: 3,
            start_value,
            end_value,
            volatility: 0.0,
        }
    }

    #[test]
    fn duration_is_inclusive() {
        assert_eq!(region("2024-01-02", "2024-01-02", 1.0, 1.0).duration_days(), 1);
        assert_eq!(region("2024-01-02", "2024-01-11", 1.0, 1.0).duration_days(), 10);
    }

    #[test]
    fn value_delta_is_relative() {
        let up = region("2024-01-02", "2024-01-05", 100.0, 110.0);
        assert!((up.value_delta() - 0.1).abs() < 1e-12);
        assert_eq!(region("2024-01-02", "2024-01-05", 0.0, 5.0).value_delta(), 0.0);
    }

    #[test]
    fn contains_and_overlaps() {
        let r = region("2024-01-05", "2024-01-10", 1.0, 1.0);
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        assert!(r.contains(d("2024-01-05")));
        assert!(r.contains(d("2024-01-10")));
        assert!(!r.contains(d("2024-01-11")));
        assert!(r.overlaps(d("2024-01-01"), d("2024-01-05")));
        assert!(!r.overlaps(d("2024-01-11"), d("2024-01-12")));
    }
}

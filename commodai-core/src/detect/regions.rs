//! Merge flagged points into contiguous regions.

use crate::domain::{AnomalyPoint, AnomalyRegion, RegionId};

use super::features::mean_variance;

/// Group flagged points into regions.
///
/// Two consecutive flagged points share a region when at most
/// `gap_tolerance` calendar positions separate them (0 means strictly
/// adjacent). Unflagged and missing positions both count as gap.
/// `points` must be in calendar order.
pub fn build_regions(
    entity: &str,
    points: &[AnomalyPoint],
    gap_tolerance: usize,
) -> Vec<AnomalyRegion> {
    let mut groups: Vec<Vec<&AnomalyPoint>> = Vec::new();

    for p in points.iter().filter(|p| p.is_flagged) {
        match groups.last_mut() {
            Some(group)
                if group
                    .last()
                    .is_some_and(|last| p.grid_index - last.grid_index - 1 <= gap_tolerance) =>
            {
                group.push(p);
            }
            _ => groups.push(vec![p]),
        }
    }

    groups
        .iter()
        .enumerate()
        .map(|(ordinal, members)| summarize(entity, ordinal, members))
        .collect()
}

fn summarize(entity: &str, ordinal: usize, members: &[&AnomalyPoint]) -> AnomalyRegion {
    let first = members[0];
    let last = members[members.len() - 1];
    let scores: Vec<f64> = members.iter().map(|p| p.score).collect();
    let values: Vec<f64> = members.iter().map(|p| p.value).collect();

    let peak_score = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean_score = scores.iter().sum::<f64>() / scores.len() as f64;
    let (mean_value, variance) = mean_variance(&values);
    let volatility = if mean_value == 0.0 {
        0.0
    } else {
        variance.sqrt() / mean_value.abs()
    };

    AnomalyRegion {
        id: RegionId::new(entity, ordinal),
        entity: entity.to_string(),
        start: first.date,
        end: last.date,
        peak_score,
        mean_score,
        point_count: members.len(),
        start_value: first.value,
        end_value: last.value,
        volatility,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FlagSource;
    use chrono::NaiveDate;

    fn points(flags: &[bool]) -> Vec<AnomalyPoint> {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        flags
            .iter()
            .enumerate()
            .map(|(i, f)| AnomalyPoint {
                entity: "CORN".into(),
                date: base + chrono::Duration::days(i as i64),
                grid_index: i,
                value: 100.0 + i as f64,
                score: if *f { 0.7 + i as f64 * 0.01 } else { 0.4 },
                source: FlagSource::default(),
                is_flagged: *f,
            })
            .collect()
    }

    #[test]
    fn adjacent_flags_form_one_region() {
        let pts = points(&[false, true, true, true, false]);
        let regions = build_regions("CORN", &pts, 0);
        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        assert_eq!(r.point_count, 3);
        assert_eq!(r.start, pts[1].date);
        assert_eq!(r.end, pts[3].date);
        assert!((r.peak_score - 0.73).abs() < 1e-12);
        assert!((r.mean_score - 0.72).abs() < 1e-12);
        assert_eq!(r.id.as_str(), "CORN#0");
    }

    #[test]
    fn gap_splits_regions_without_tolerance() {
        let pts = points(&[true, false, true]);
        let regions = build_regions("CORN", &pts, 0);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[1].id.as_str(), "CORN#1");
    }

    #[test]
    fn tolerance_bridges_short_gaps() {
        let pts = points(&[true, false, true, false, false, true]);
        let regions = build_regions("CORN", &pts, 1);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].point_count, 2);
        assert_eq!(regions[1].point_count, 1);
    }

    #[test]
    fn missing_positions_count_as_gap() {
        let mut pts = points(&[true, true, true]);
        // Position 1 missing from the valid sequence.
        pts.remove(1);
        assert_eq!(build_regions("CORN", &pts, 0).len(), 2);
        assert_eq!(build_regions("CORN", &pts, 1).len(), 1);
    }

    #[test]
    fn no_flags_no_regions() {
        assert!(build_regions("CORN", &points(&[false, false]), 3).is_empty());
    }

    #[test]
    fn single_point_region_has_zero_volatility() {
        let regions = build_regions("CORN", &points(&[false, true]), 0);
        assert_eq!(regions[0].volatility, 0.0);
        assert_eq!(regions[0].duration_days(), 1);
    }
}

//! Secondary check: deviation from a trailing moving average.
//!
//! The baseline holds the last `window` values that were not flagged, so a
//! plateau is measured against the level before it started and the points
//! after it are not measured against the plateau. A shift that stays flagged
//! for more than a full window is taken into the baseline as the new level.

use std::collections::VecDeque;

use super::features::mean_variance;

/// Per-point outcome of the deviation check.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviationCheck {
    /// Deviates more than `k` sample standard deviations from the baseline mean.
    pub flags: Vec<bool>,
    /// Taken into the baseline of the points that follow.
    pub admitted: Vec<bool>,
}

/// Run the deviation check over a compacted (no missing values) series.
///
/// The current value is never part of its own baseline. Points without a
/// full baseline, and points whose baseline has zero spread, are never
/// flagged.
pub fn deviation_check(values: &[f64], window: usize, k: f64) -> DeviationCheck {
    let window = window.max(2);
    let mut baseline: VecDeque<f64> = VecDeque::with_capacity(window + 1);
    let mut flags = Vec::with_capacity(values.len());
    let mut admitted = Vec::with_capacity(values.len());
    let mut run = 0usize;

    for &x in values {
        let flagged = if baseline.len() < window {
            false
        } else {
            let (mean, variance) = mean_variance(baseline.make_contiguous());
            let std = variance.sqrt();
            std > 0.0 && (x - mean).abs() > k * std
        };
        run = if flagged { run + 1 } else { 0 };

        let admit = !flagged || run > window;
        if admit {
            baseline.push_back(x);
            if baseline.len() > window {
                baseline.pop_front();
            }
        }
        flags.push(flagged);
        admitted.push(admit);
    }

    DeviationCheck { flags, admitted }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alternating(n: usize, level: f64) -> Vec<f64> {
        (0..n)
            .map(|i| level + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect()
    }

    #[test]
    fn jump_after_noisy_baseline_is_flagged() {
        let mut values = alternating(30, 100.0);
        values.push(120.0);
        let flags = deviation_check(&values, 20, 3.0).flags;
        assert!(flags[30]);
        assert!(flags[..30].iter().all(|f| !f));
    }

    #[test]
    fn warmup_points_are_not_flagged() {
        let values = vec![1.0, 2.0, 1000.0];
        assert_eq!(deviation_check(&values, 5, 3.0).flags, vec![false, false, false]);
    }

    #[test]
    fn flat_baseline_never_flags() {
        let mut values = vec![5.0; 25];
        values.push(9.0);
        assert!(deviation_check(&values, 20, 3.0).flags.iter().all(|f| !f));
    }

    #[test]
    fn whole_plateau_is_flagged_and_nothing_after_it() {
        let mut values = alternating(40, 100.0);
        values.extend(std::iter::repeat(110.0).take(10));
        values.extend(alternating(20, 100.0));

        let check = deviation_check(&values, 20, 3.0);
        let flagged: Vec<usize> = (0..values.len()).filter(|&i| check.flags[i]).collect();
        assert_eq!(flagged, (40..50).collect::<Vec<_>>());
        assert!(check.admitted[..40].iter().all(|a| *a));
        assert!(check.admitted[40..50].iter().all(|a| !a));
    }

    #[test]
    fn lasting_shift_becomes_the_new_baseline() {
        let mut values = alternating(30, 100.0);
        values.extend(alternating(60, 150.0));

        let check = deviation_check(&values, 20, 3.0);
        assert!(check.flags[30..51].iter().all(|f| *f));
        assert!(check.admitted[..50].iter().skip(30).all(|a| !a));
        assert!(check.admitted[50]);
        assert!(check.flags[52..].iter().all(|f| !f));
    }
}

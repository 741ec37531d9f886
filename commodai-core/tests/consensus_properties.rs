//! Property tests for consensus clustering.
//!
//! 1. Renaming the clusters of any method leaves the consensus unchanged
//! 2. The co-association matrix is a symmetric agreement fraction
//! 3. Agreement scores stay in [0, 1]

use proptest::prelude::*;

use commodai_core::cluster::{co_association, consensus, ClusterLabel};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_label() -> impl Strategy<Value = ClusterLabel> {
    prop_oneof![
        4 => (0usize..5).prop_map(ClusterLabel::Cluster),
        1 => Just(ClusterLabel::Noise),
    ]
}

/// Three labelings over the same `n` rows.
fn arb_labelings() -> impl Strategy<Value = (usize, Vec<Vec<ClusterLabel>>)> {
    (2usize..14).prop_flat_map(|n| {
        let labeling = prop::collection::vec(arb_label(), n);
        (Just(n), prop::collection::vec(labeling, 3))
    })
}

fn arb_renaming() -> impl Strategy<Value = Vec<usize>> {
    Just((0..5).collect::<Vec<usize>>()).prop_shuffle()
}

fn rename(labels: &[ClusterLabel], mapping: &[usize]) -> Vec<ClusterLabel> {
    labels
        .iter()
        .map(|l| match l {
            ClusterLabel::Cluster(c) => ClusterLabel::Cluster(mapping[*c]),
            ClusterLabel::Noise => ClusterLabel::Noise,
        })
        .collect()
}

// ── 1. Permutation invariance ────────────────────────────────────────

proptest! {
    #[test]
    fn consensus_ignores_label_names(
        (n, labelings) in arb_labelings(),
        mapping in arb_renaming(),
        which in 0usize..3,
        threshold in prop_oneof![Just(0.5), Just(0.34), Just(0.67), Just(1.0)],
    ) {
        let mut renamed = labelings.clone();
        renamed[which] = rename(&labelings[which], &mapping);

        let a = consensus(&labelings, n, threshold);
        let b = consensus(&renamed, n, threshold);
        prop_assert_eq!(a.labels, b.labels);
        prop_assert_eq!(a.agreement, b.agreement);
    }
}

// ── 2. Co-association matrix ─────────────────────────────────────────

proptest! {
    #[test]
    fn co_association_is_symmetric_fraction((n, labelings) in arb_labelings()) {
        let co = co_association(&labelings, n);
        for i in 0..n {
            prop_assert_eq!(co[i][i], 1.0);
            for j in 0..n {
                prop_assert_eq!(co[i][j], co[j][i]);
                prop_assert!((0.0..=1.0).contains(&co[i][j]));
                if i != j && labelings.iter().all(|l| l[i].is_noise()) {
                    prop_assert_eq!(co[i][j], 0.0);
                }
            }
        }
    }
}

// ── 3. Agreement range ───────────────────────────────────────────────

proptest! {
    #[test]
    fn agreement_is_a_fraction((n, labelings) in arb_labelings()) {
        let c = consensus(&labelings, n, 0.5);
        prop_assert_eq!(c.labels.len(), n);
        prop_assert_eq!(c.labels[0], 0);
        for a in c.agreement {
            prop_assert!((0.0..=1.0).contains(&a));
        }
    }
}

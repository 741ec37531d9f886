//! Criterion benchmarks for the CommodAI hot paths.
//!
//! Benchmarks:
//! 1. Isolation forest fit + score on one entity's feature matrix
//! 2. Full per-entity detection (features, forest, moving average, regions)
//! 3. Ensemble clustering over a batch of region feature rows

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use commodai_core::cluster::{ClusterConfig, RegionClusterer};
use commodai_core::detect::{
    deviation_check, feature_matrix, AnomalyDetector, ForestParams, IsolationFeature,
    IsolationForest,
};
use commodai_core::domain::RegionId;
use commodai_core::rng::RngHierarchy;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_series(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let base = 100.0 + (i as f64 * 0.05).sin() * 5.0;
            if i % 97 == 0 {
                base * 1.3
            } else {
                base
            }
        })
        .collect()
}

fn make_rows(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| {
            let c = (i % 4) as f64;
            (0..5).map(|f| c * 3.0 + ((i * 7 + f * 13) % 11) as f64 * 0.05).collect()
        })
        .collect()
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_isolation_forest(c: &mut Criterion) {
    let mut group = c.benchmark_group("isolation_forest");
    for n in [250usize, 1000, 2500] {
        let series = make_series(n);
        let check = deviation_check(&series, 20, 3.0);
        let matrix = feature_matrix(&series, &check.admitted, &IsolationFeature::all(), 7);
        group.bench_with_input(BenchmarkId::from_parameter(n), &matrix, |b, m| {
            b.iter(|| {
                let mut rng = StdRng::seed_from_u64(42);
                let forest = IsolationForest::fit(m, ForestParams::default(), &mut rng);
                black_box(forest.score_all(m))
            })
        });
    }
    group.finish();
}

fn bench_detect_entity(c: &mut Criterion) {
    let n = 1500;
    let values: Vec<Option<f64>> = make_series(n).into_iter().map(Some).collect();
    let base = chrono::NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
    let dates: Vec<_> = (0..n).map(|i| base + chrono::Duration::days(i as i64)).collect();
    let detector = AnomalyDetector::default();

    c.bench_function("detect_entity_1500", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(42);
            black_box(detector.detect("BENCH", &dates, &values, &mut rng))
        })
    });
}

fn bench_ensemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("ensemble_cluster");
    let clusterer = RegionClusterer::new(ClusterConfig::default(), RngHierarchy::default());
    for n in [20usize, 60, 150] {
        let rows = make_rows(n);
        let ids: Vec<RegionId> = (0..n).map(|i| RegionId::new("B", i)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &rows, |b, rows| {
            b.iter(|| black_box(clusterer.cluster_rows(&ids, rows)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_isolation_forest, bench_detect_entity, bench_ensemble);
criterion_main!(benches);

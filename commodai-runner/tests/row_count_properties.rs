//! Property test: every calendar date appears exactly once per modeled
//! entity in the synthesized output, whatever the gaps in the inputs.

use chrono::NaiveDate;
use proptest::prelude::*;

use commodai_core::data::{load_frame, AlignOptions, RawSeries};
use commodai_core::domain::{Observation, Provenance};
use commodai_runner::{LoadedInputs, Pipeline, PipelineConfig};

fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 6, 1).unwrap() + chrono::Duration::days(i as i64)
}

/// Up to four entities, each a noisy series with some days missing.
fn arb_prices() -> impl Strategy<Value = Vec<Vec<Option<f64>>>> {
    prop::collection::vec(
        prop::collection::vec(prop::option::weighted(0.85, 40.0..60.0_f64), 40..90),
        1..4,
    )
}

fn small_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.detector.n_trees = 20;
    config.detector.min_observations = 10;
    config
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn output_rows_match_frame_rows(prices in arb_prices(), with_macro in any::<bool>()) {
        let mut raw: Vec<RawSeries> = prices
            .iter()
            .enumerate()
            .map(|(e, values)| RawSeries {
                name: format!("E{e}"),
                provenance: Provenance::Price,
                observations: values
                    .iter()
                    .enumerate()
                    .filter_map(|(i, v)| v.map(|v| Observation::new(day(i), v)))
                    .collect(),
            })
            .collect();
        if with_macro {
            raw.push(RawSeries {
                name: "RATE".into(),
                provenance: Provenance::Macro,
                observations: vec![Observation::new(day(3), 1.5), Observation::new(day(30), 1.75)],
            });
        }

        let config = small_config();
        let loaded = load_frame(&raw, &config.align_options());
        let frame_len = loaded.frame.len();
        let entities: Vec<String> = loaded.frame.entities().iter().map(|e| e.to_string()).collect();
        let frame_dates = loaded.frame.dates().to_vec();

        let output = Pipeline::new(config)
            .unwrap()
            .run_loaded(LoadedInputs { frame: loaded.frame, failures: loaded.failures })
            .unwrap();

        prop_assert_eq!(output.dataset.len(), frame_len * entities.len());
        for entity in &entities {
            let dates: Vec<NaiveDate> = output.dataset.rows_for(entity).map(|r| r.date).collect();
            prop_assert_eq!(&dates, &frame_dates);
        }
        prop_assert_eq!(output.report.output_rows, output.dataset.len());
    }
}

#[test]
fn align_options_default_matches_pipeline_default() {
    let opts = PipelineConfig::default().align_options();
    let plain = AlignOptions::default();
    assert_eq!(opts.calendar, plain.calendar);
    assert_eq!(opts.interpolation, plain.interpolation);
    assert_eq!(opts.min_observations, plain.min_observations);
}

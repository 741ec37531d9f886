//! Outer join of the aligned frame with regions, clusters and context.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::cluster::ClusterAssignment;
use crate::data::AlignedFrame;
use crate::detect::Detection;
use crate::domain::{AnomalyRegion, Provenance, RegionId};
use crate::enrich::ContextSummary;

use super::record::{SynthesizedDataset, SynthesizedRecord};

/// A cross-reference between stages that does not resolve. Always fatal:
/// it means the stages ran out of order or on different inputs.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JoinIntegrityError {
    #[error("region {region_id} belongs to '{entity}', which is not a series in the frame")]
    UnknownEntity { region_id: RegionId, entity: String },

    #[error("region {region_id} has no cluster assignment")]
    MissingAssignment { region_id: RegionId },

    #[error("cluster assignment references unknown region {region_id}")]
    DanglingAssignment { region_id: RegionId },

    #[error("context summary references unknown region {region_id}")]
    DanglingSummary { region_id: RegionId },

    #[error("regions {first} and {second} of '{entity}' overlap")]
    OverlappingRegions {
        entity: String,
        first: RegionId,
        second: RegionId,
    },
}

/// Everything the synthesizer joins. All references are by region id.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub frame: &'a AlignedFrame,
    pub detections: &'a BTreeMap<String, Detection>,
    pub assignments: &'a [ClusterAssignment],
    pub summaries: &'a BTreeMap<RegionId, ContextSummary>,
}

/// Build one record per (price entity, calendar date).
///
/// Dates outside every region get empty region, cluster and context fields.
/// Entities without a detection (skipped by the detector) still get all
/// their rows. Regions of modeled macro or weather series are checked like
/// any other but have no rows of their own.
pub fn synthesize(input: SynthesisInput<'_>) -> Result<SynthesizedDataset, JoinIntegrityError> {
    let frame = input.frame;
    let entities: BTreeSet<&str> = frame.entities().into_iter().collect();

    let mut regions: BTreeMap<&RegionId, &AnomalyRegion> = BTreeMap::new();
    for detection in input.detections.values() {
        for region in &detection.regions {
            if frame.get(&region.entity).is_none() {
                return Err(JoinIntegrityError::UnknownEntity {
                    region_id: region.id.clone(),
                    entity: region.entity.clone(),
                });
            }
            regions.insert(&region.id, region);
        }
    }

    let mut clusters: BTreeMap<&RegionId, usize> = BTreeMap::new();
    for a in input.assignments {
        if !regions.contains_key(&a.region_id) {
            return Err(JoinIntegrityError::DanglingAssignment {
                region_id: a.region_id.clone(),
            });
        }
        clusters.insert(&a.region_id, a.consensus_label);
    }
    if let Some(id) = regions.keys().find(|id| !clusters.contains_key(*id)) {
        return Err(JoinIntegrityError::MissingAssignment {
            region_id: (*id).clone(),
        });
    }
    if let Some(id) = input.summaries.keys().find(|id| !regions.contains_key(id)) {
        return Err(JoinIntegrityError::DanglingSummary { region_id: id.clone() });
    }

    let macro_series: Vec<_> = frame.by_provenance(Provenance::Macro).collect();
    let weather_series: Vec<_> = frame.by_provenance(Provenance::Weather).collect();
    let mut dataset = SynthesizedDataset {
        macro_columns: macro_series.iter().map(|s| s.name.clone()).collect(),
        weather_columns: weather_series.iter().map(|s| s.name.clone()).collect(),
        records: Vec::with_capacity(entities.len() * frame.len()),
    };

    for entity in &entities {
        let Some(prices) = frame.get(entity) else {
            continue;
        };
        let detection = input.detections.get(*entity);

        let mut own: Vec<&AnomalyRegion> = detection
            .map(|d| d.regions.iter().collect())
            .unwrap_or_default();
        own.sort_by_key(|r| r.start);
        for pair in own.windows(2) {
            if pair[1].start <= pair[0].end {
                return Err(JoinIntegrityError::OverlappingRegions {
                    entity: entity.to_string(),
                    first: pair[0].id.clone(),
                    second: pair[1].id.clone(),
                });
            }
        }

        let mut scores: Vec<Option<f64>> = vec![None; frame.len()];
        if let Some(d) = detection {
            for p in &d.points {
                if let Some(slot) = scores.get_mut(p.grid_index) {
                    *slot = Some(p.score);
                }
            }
        }

        let mut cursor = 0usize;
        for (i, &date) in frame.dates().iter().enumerate() {
            while cursor < own.len() && own[cursor].end < date {
                cursor += 1;
            }
            let region = own.get(cursor).filter(|r| r.contains(date));

            dataset.records.push(SynthesizedRecord {
                entity: entity.to_string(),
                date,
                price: prices.values[i],
                macro_fields: macro_series
                    .iter()
                    .map(|s| (s.name.clone(), s.values[i]))
                    .collect(),
                weather_fields: weather_series
                    .iter()
                    .map(|s| (s.name.clone(), s.values[i]))
                    .collect(),
                in_anomaly_region: region.is_some(),
                region_id: region.map(|r| r.id.clone()),
                cluster_label: region.and_then(|r| clusters.get(&r.id).copied()),
                anomaly_score: scores[i],
                context_summary: region
                    .and_then(|r| input.summaries.get(&r.id))
                    .map(|s| s.text.clone()),
            });
        }
    }

    tracing::debug!(
        rows = dataset.records.len(),
        entities = entities.len(),
        regions = regions.len(),
        "dataset synthesized"
    );
    Ok(dataset)
}

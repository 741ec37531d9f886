//! Run report: everything a run skipped, degraded or produced, in one
//! serializable document written next to the dataset.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use commodai_core::cluster::{ClusterQuality, ClusterResult, MethodKind, SkippedMethod};
use commodai_core::domain::{DatasetHash, RegionId};
use commodai_core::enrich::{EnrichmentFailure, EnrichmentReport};

/// Current schema version of `report.json`.
pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Pipeline stage at which an entity was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipStage {
    Load,
    Detect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedEntity {
    pub entity: String,
    pub stage: SkipStage,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusteringSummary {
    pub regions: usize,
    pub clusters: usize,
    pub methods_run: Vec<MethodKind>,
    pub skipped: Vec<SkippedMethod>,
    pub method_quality: BTreeMap<MethodKind, ClusterQuality>,
    pub consensus_quality: ClusterQuality,
    pub chosen_k: Option<usize>,
    pub density_radius: Option<f64>,
}

impl ClusteringSummary {
    pub fn from_result(result: &ClusterResult) -> Self {
        Self {
            regions: result.assignments.len(),
            clusters: result.cluster_count(),
            methods_run: result.methods_run.clone(),
            skipped: result.skipped.clone(),
            method_quality: result.method_quality.clone(),
            consensus_quality: result.consensus_quality,
            chosen_k: result.chosen_k,
            density_radius: result.density_radius,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentSummary {
    /// False when the run had no context source.
    pub enabled: bool,
    pub enriched: usize,
    pub no_context: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub failures: Vec<EnrichmentFailure>,
    #[serde(default)]
    pub cancelled_regions: Vec<RegionId>,
    pub timed_out: bool,
}

impl EnrichmentSummary {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_report(report: &EnrichmentReport) -> Self {
        Self {
            enabled: true,
            enriched: report.count("enriched"),
            no_context: report.count("no_context"),
            failed: report.count("failed"),
            cancelled: report.count("cancelled"),
            failures: report.failures().into_iter().cloned().collect(),
            cancelled_regions: report.cancelled_regions(),
            timed_out: report.timed_out,
        }
    }
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub config_hash: String,
    pub dataset_hash: DatasetHash,
    pub calendar_days: usize,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub entities_modeled: Vec<String>,
    pub skipped_entities: Vec<SkippedEntity>,
    /// Entities whose price never moved (scored, never flagged).
    pub flat_entities: Vec<String>,
    pub regions_per_entity: BTreeMap<String, usize>,
    pub clustering: ClusteringSummary,
    pub enrichment: EnrichmentSummary,
    pub output_rows: usize,
    pub elapsed_ms: u64,
}

fn default_schema_version() -> u32 {
    REPORT_SCHEMA_VERSION
}

impl RunReport {
    pub fn total_regions(&self) -> usize {
        self.regions_per_entity.values().sum()
    }

    /// True when nothing was skipped, degraded or cut short.
    pub fn is_clean(&self) -> bool {
        self.skipped_entities.is_empty()
            && self.clustering.skipped.is_empty()
            && self.enrichment.failed == 0
            && !self.enrichment.timed_out
    }

    /// Human-readable summary for the terminal.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "Calendar: {} days ({} .. {})",
                self.calendar_days,
                self.first_date.as_deref().unwrap_or("-"),
                self.last_date.as_deref().unwrap_or("-")
            ),
            format!(
                "Entities: {} modeled, {} skipped",
                self.entities_modeled.len(),
                self.skipped_entities.len()
            ),
        ];
        for s in &self.skipped_entities {
            lines.push(format!("  skipped {} ({:?}): {}", s.entity, s.stage, s.reason));
        }
        lines.push(format!(
            "Regions: {} across {} entities",
            self.total_regions(),
            self.regions_per_entity.values().filter(|n| **n > 0).count()
        ));

        let methods: Vec<String> =
            self.clustering.methods_run.iter().map(|m| m.to_string()).collect();
        lines.push(format!(
            "Clusters: {} (methods: {})",
            self.clustering.clusters,
            if methods.is_empty() { "none".to_string() } else { methods.join(", ") }
        ));
        if let Some(s) = self.clustering.consensus_quality.silhouette {
            lines.push(format!("  consensus silhouette: {s:.3}"));
        }
        for skipped in &self.clustering.skipped {
            lines.push(format!("  {} skipped: {}", skipped.method, skipped.reason));
        }

        if self.enrichment.enabled {
            lines.push(format!(
                "Context: {} enriched, {} without context, {} failed, {} cancelled{}",
                self.enrichment.enriched,
                self.enrichment.no_context,
                self.enrichment.failed,
                self.enrichment.cancelled,
                if self.enrichment.timed_out { " (timed out)" } else { "" }
            ));
        } else {
            lines.push("Context: no source configured".to_string());
        }
        lines.push(format!("Rows written: {}", self.output_rows));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RunReport {
        RunReport {
            schema_version: REPORT_SCHEMA_VERSION,
            generated_at: Utc::now(),
            config_hash: "abc".into(),
            dataset_hash: DatasetHash::from_hash("def"),
            calendar_days: 10,
            first_date: Some("2023-01-01".into()),
            last_date: Some("2023-01-10".into()),
            entities_modeled: vec!["CORN".into()],
            skipped_entities: Vec::new(),
            flat_entities: Vec::new(),
            regions_per_entity: BTreeMap::from([("CORN".to_string(), 2), ("WHEAT".to_string(), 0)]),
            clustering: ClusteringSummary::default(),
            enrichment: EnrichmentSummary::disabled(),
            output_rows: 10,
            elapsed_ms: 5,
        }
    }

    #[test]
    fn json_round_trip() {
        let r = report();
        let json = serde_json::to_string(&r).unwrap();
        let back: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn clean_until_something_is_skipped() {
        let mut r = report();
        assert!(r.is_clean());
        assert_eq!(r.total_regions(), 2);
        r.skipped_entities.push(SkippedEntity {
            entity: "OATS".into(),
            stage: SkipStage::Detect,
            reason: "too short".into(),
        });
        assert!(!r.is_clean());
        assert!(r.summary_lines().iter().any(|l| l.contains("skipped OATS")));
    }

    #[test]
    fn summary_mentions_missing_source() {
        let lines = report().summary_lines();
        assert!(lines.iter().any(|l| l == "Context: no source configured"));
        assert!(lines.iter().any(|l| l == "Regions: 2 across 1 entities"));
    }
}

//! Artifact export: the synthesized dataset, the region list and the run
//! report.
//!
//! Output directory layout:
//! - `dataset.csv`: one row per (entity, date)
//! - `regions.csv`: one row per anomaly region
//! - `report.json`: the run report

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use commodai_core::cluster::ClusterResult;
use commodai_core::domain::AnomalyRegion;
use commodai_core::enrich::EnrichmentReport;

use crate::pipeline::PipelineOutput;
use crate::report::{RunReport, REPORT_SCHEMA_VERSION};

pub const DATASET_FILE: &str = "dataset.csv";
pub const REGIONS_FILE: &str = "regions.csv";
pub const REPORT_FILE: &str = "report.json";

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_report_json(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize run report to JSON")
}

/// Deserialize a run report, rejecting unknown schema versions.
pub fn import_report_json(json: &str) -> Result<RunReport> {
    let report: RunReport =
        serde_json::from_str(json).context("failed to deserialize run report from JSON")?;
    if report.schema_version > REPORT_SCHEMA_VERSION {
        bail!(
            "unsupported report schema version {} (max supported: {})",
            report.schema_version,
            REPORT_SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Region list with consensus label, agreement and context status.
///
/// Columns: region_id, entity, start, end, peak_score, mean_score, points,
/// cluster_label, agreement, context_status
pub fn export_regions_csv(
    regions: &[AnomalyRegion],
    clusters: &ClusterResult,
    enrichment: Option<&EnrichmentReport>,
) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "region_id",
        "entity",
        "start",
        "end",
        "peak_score",
        "mean_score",
        "points",
        "cluster_label",
        "agreement",
        "context_status",
    ])?;

    for r in regions {
        let assignment = clusters.assignment(&r.id);
        let status = match enrichment {
            Some(report) => report
                .outcomes
                .get(&r.id)
                .map(|o| o.status())
                .unwrap_or("not_attempted"),
            None => "disabled",
        };
        let start = r.start.to_string();
        let end = r.end.to_string();
        let peak = format!("{:.6}", r.peak_score);
        let mean = format!("{:.6}", r.mean_score);
        let points = r.point_count.to_string();
        let label = assignment.map(|a| a.consensus_label.to_string()).unwrap_or_default();
        let agreement = assignment.map(|a| format!("{:.4}", a.agreement)).unwrap_or_default();
        let row: [&str; 10] = [
            r.id.as_str(),
            &r.entity,
            &start,
            &end,
            &peak,
            &mean,
            &points,
            &label,
            &agreement,
            status,
        ];
        wtr.write_record(row)?;
    }

    let bytes = wtr.into_inner().context("failed to flush regions CSV")?;
    String::from_utf8(bytes).context("regions CSV is not valid UTF-8")
}

pub fn export_dataset_csv(output: &PipelineOutput) -> Result<String> {
    let mut buf = Vec::new();
    output
        .dataset
        .write_csv(&mut buf)
        .context("failed to write dataset CSV")?;
    String::from_utf8(buf).context("dataset CSV is not valid UTF-8")
}

// ─── Artifact persistence ───────────────────────────────────────────

/// Write all artifacts into `output_dir`, creating it if needed.
pub fn save_artifacts(output: &PipelineOutput, output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;

    let dataset = export_dataset_csv(output)?;
    let regions =
        export_regions_csv(&output.regions, &output.clusters, output.enrichment.as_ref())?;
    let report = export_report_json(&output.report)?;

    let artifacts = [
        (DATASET_FILE, dataset),
        (REGIONS_FILE, regions),
        (REPORT_FILE, report),
    ];
    for (name, content) in artifacts {
        let path = output_dir.join(name);
        fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;
    }
    tracing::info!(dir = %output_dir.display(), rows = output.dataset.len(), "artifacts saved");
    Ok(output_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use commodai_core::domain::RegionId;

    fn region(entity: &str, ordinal: usize) -> AnomalyRegion {
        let start = NaiveDate::from_ymd_opt(2023, 5, 1 + ordinal as u32 * 5).unwrap();
        AnomalyRegion {
            id: RegionId::new(entity, ordinal),
            entity: entity.into(),
            start,
            end: start + chrono::Duration::days(2),
            peak_score: 0.81,
            mean_score: 0.7,
            point_count: 3,
            start_value: 10.0,
            end_value: 11.0,
            volatility: 0.02,
        }
    }

    #[test]
    fn regions_csv_without_clusters_or_context() {
        let regions = vec![region("CORN", 0)];
        let csv = export_regions_csv(&regions, &ClusterResult::default(), None).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("region_id,entity,start,end"));
        assert_eq!(
            lines[1],
            "CORN#0,CORN,2023-05-01,2023-05-03,0.810000,0.700000,3,,,disabled"
        );
    }

    #[test]
    fn regions_csv_marks_unattempted_regions() {
        let regions = vec![region("CORN", 0), region("CORN", 1)];
        let clusters = commodai_core::cluster::RegionClusterer::new(
            commodai_core::cluster::ClusterConfig::default(),
            commodai_core::rng::RngHierarchy::default(),
        )
        .cluster(&regions);
        let csv =
            export_regions_csv(&regions, &clusters, Some(&EnrichmentReport::default())).unwrap();
        for line in csv.lines().skip(1) {
            assert!(line.ends_with(",not_attempted"), "{line}");
        }
    }
}

//! CommodAI Runner: pipeline orchestration on top of `commodai-core`.
//!
//! This crate provides:
//! - TOML pipeline configuration with validation and a content hash
//! - Input-file loading with skip-and-continue
//! - The end-to-end pipeline (detect, cluster, enrich, synthesize)
//! - File-backed news source and extractive summarizer
//! - Run report and CSV/JSON artifact export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod news;
pub mod pipeline;
pub mod report;

pub use config::{ConfigError, LoaderConfig, PipelineConfig, RunSettings};
pub use data_loader::{load_inputs, InputFiles, LoadedInputs, NamedInput};
pub use export::{
    export_dataset_csv, export_regions_csv, export_report_json, import_report_json, save_artifacts,
    DATASET_FILE, REGIONS_FILE, REPORT_FILE,
};
pub use news::{HeadlineSummarizer, NewsFileSource};
pub use pipeline::{detect_entities, run_pipeline, DetectionSet, Pipeline, PipelineOutput, RunError};
pub use report::{
    ClusteringSummary, EnrichmentSummary, RunReport, SkipStage, SkippedEntity,
    REPORT_SCHEMA_VERSION,
};

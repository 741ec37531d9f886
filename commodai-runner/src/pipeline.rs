//! End-to-end pipeline: load, detect, cluster, enrich, synthesize.
//!
//! Two entry points:
//! - `run_pipeline()`: reads files and an optional news CSV. Used by the CLI.
//! - `Pipeline::run_loaded()`: takes pre-loaded inputs and any context
//!   collaborators. Used by tests and embedders.
//!
//! Per-entity and per-region failures are collected into the run report;
//! only configuration errors and join-integrity violations abort a run.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rayon::prelude::*;
use thiserror::Error;

use commodai_core::cluster::{ClusterResult, RegionClusterer};
use commodai_core::data::{AlignedFrame, LoadError};
use commodai_core::detect::{AnomalyDetector, Detection, DetectorConfig, DetectorFitError};
use commodai_core::domain::AnomalyRegion;
use commodai_core::enrich::{ContextSource, EnrichmentReport, Enricher, Summarizer};
use commodai_core::rng::RngHierarchy;
use commodai_core::synth::{synthesize, JoinIntegrityError, SynthesisInput, SynthesizedDataset};

use crate::config::{ConfigError, PipelineConfig};
use crate::data_loader::{load_inputs, InputFiles, LoadedInputs};
use crate::news::{HeadlineSummarizer, NewsFileSource};
use crate::report::{
    ClusteringSummary, EnrichmentSummary, RunReport, SkipStage, SkippedEntity,
    REPORT_SCHEMA_VERSION,
};

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("news source error: {0}")]
    News(LoadError),
    #[error("failed to start detection pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("join integrity violated: {0}")]
    Integrity(#[from] JoinIntegrityError),
}

/// Detector output for every modeled entity, keyed by entity.
#[derive(Debug, Default)]
pub struct DetectionSet {
    pub detections: BTreeMap<String, Detection>,
    pub failures: Vec<(String, DetectorFitError)>,
}

impl DetectionSet {
    /// All regions, ordered by entity then start date.
    pub fn regions(&self) -> Vec<AnomalyRegion> {
        self.detections.values().flat_map(|d| d.regions.iter().cloned()).collect()
    }
}

/// Everything one run produced.
#[derive(Debug)]
pub struct PipelineOutput {
    pub dataset: SynthesizedDataset,
    pub regions: Vec<AnomalyRegion>,
    pub clusters: ClusterResult,
    pub enrichment: Option<EnrichmentReport>,
    pub report: RunReport,
}

/// Detect every price entity of `frame` on a private rayon pool, plus the
/// macro and weather series when `model_context_series` is set.
///
/// Series are scored on their true observations; filled macro days are
/// treated as missing. Each entity gets its own RNG derived from
/// `(seed, "detect", entity)`, so results do not depend on the pool size or
/// scheduling.
pub fn detect_entities(
    frame: &AlignedFrame,
    config: &DetectorConfig,
    rng: &RngHierarchy,
    threads: usize,
) -> Result<DetectionSet, RunError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("commodai-detect-{i}"))
        .build()?;
    let detector = AnomalyDetector::new(config.clone());
    let mut entities = frame.entities();
    if config.model_context_series {
        entities.extend(frame.context_series());
    }

    let results: Vec<(String, Result<Detection, DetectorFitError>)> = pool.install(|| {
        entities
            .par_iter()
            .filter_map(|entity| {
                let values = frame.get(entity)?.observed_values();
                let mut entity_rng = rng.rng_for("detect", entity, 0);
                let result = detector.detect(entity, frame.dates(), &values, &mut entity_rng);
                Some((entity.to_string(), result))
            })
            .collect()
    });

    let mut set = DetectionSet::default();
    for (entity, result) in results {
        match result {
            Ok(detection) => {
                tracing::debug!(
                    entity = %entity,
                    regions = detection.regions.len(),
                    flagged = detection.flagged_count(),
                    flat = detection.flat,
                    "entity scored"
                );
                set.detections.insert(entity, detection);
            }
            Err(error) => {
                tracing::warn!(entity = %entity, error = %error, "entity skipped by detector");
                set.failures.push((entity, error));
            }
        }
    }
    Ok(set)
}

/// A configured pipeline with optional context collaborators.
pub struct Pipeline {
    config: PipelineConfig,
    source: Option<Arc<dyn ContextSource>>,
    summarizer: Arc<dyn Summarizer>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, RunError> {
        config.validate()?;
        let summarizer: Arc<dyn Summarizer> =
            Arc::new(HeadlineSummarizer::new(config.run.summary_headlines));
        Ok(Self {
            config,
            source: None,
            summarizer,
        })
    }

    pub fn with_context_source(mut self, source: Arc<dyn ContextSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn rng(&self) -> RngHierarchy {
        RngHierarchy::new(self.config.run.seed)
    }

    pub fn load(&self, files: &InputFiles) -> LoadedInputs {
        load_inputs(files, &self.config.align_options(), self.config.delimiter())
    }

    /// Load and detect only.
    pub fn detect(&self, files: &InputFiles) -> Result<(LoadedInputs, DetectionSet), RunError> {
        let loaded = self.load(files);
        let detections = detect_entities(
            &loaded.frame,
            &self.config.detector,
            &self.rng(),
            self.config.run.detect_threads,
        )?;
        Ok((loaded, detections))
    }

    pub fn run(&self, files: &InputFiles) -> Result<PipelineOutput, RunError> {
        self.run_loaded(self.load(files))
    }

    pub fn run_loaded(&self, loaded: LoadedInputs) -> Result<PipelineOutput, RunError> {
        let started = Instant::now();
        let deadline = self
            .config
            .run
            .run_timeout_secs
            .map(|secs| started + Duration::from_secs(secs));
        let rng = self.rng();
        let frame = &loaded.frame;

        tracing::info!(
            entities = frame.entities().len(),
            days = frame.len(),
            dataset_hash = %frame.dataset_hash(),
            "inputs aligned"
        );
        if frame.entities().is_empty() {
            tracing::warn!("no price entity survived loading; output will be empty");
        }

        let detections = detect_entities(
            frame,
            &self.config.detector,
            &rng,
            self.config.run.detect_threads,
        )?;
        let regions = detections.regions();
        tracing::info!(
            regions = regions.len(),
            skipped = detections.failures.len(),
            "detection finished"
        );

        let clusters = RegionClusterer::new(self.config.cluster.clone(), rng).cluster(&regions);
        tracing::info!(
            clusters = clusters.cluster_count(),
            methods = clusters.methods_run.len(),
            "clustering finished"
        );

        let enrichment = self.source.as_ref().map(|source| {
            Enricher::new(
                self.config.enrich.clone(),
                Arc::clone(source),
                Arc::clone(&self.summarizer),
            )
            .enrich_all(&regions, deadline)
        });
        let summaries = enrichment.as_ref().map(EnrichmentReport::summaries).unwrap_or_default();

        let dataset = synthesize(SynthesisInput {
            frame,
            detections: &detections.detections,
            assignments: &clusters.assignments,
            summaries: &summaries,
        })?;
        tracing::info!(rows = dataset.len(), "dataset synthesized");

        let report = self.build_report(
            &loaded,
            &detections,
            &clusters,
            enrichment.as_ref(),
            &dataset,
            started,
        )?;
        Ok(PipelineOutput {
            dataset,
            regions,
            clusters,
            enrichment,
            report,
        })
    }

    fn build_report(
        &self,
        loaded: &LoadedInputs,
        detections: &DetectionSet,
        clusters: &ClusterResult,
        enrichment: Option<&EnrichmentReport>,
        dataset: &SynthesizedDataset,
        started: Instant,
    ) -> Result<RunReport, RunError> {
        let frame = &loaded.frame;
        let mut skipped_entities: Vec<SkippedEntity> = loaded
            .failures
            .iter()
            .map(|f| SkippedEntity {
                entity: f.entity.clone(),
                stage: SkipStage::Load,
                reason: f.error.to_string(),
            })
            .collect();
        skipped_entities.extend(detections.failures.iter().map(|(entity, error)| SkippedEntity {
            entity: entity.clone(),
            stage: SkipStage::Detect,
            reason: error.to_string(),
        }));

        Ok(RunReport {
            schema_version: REPORT_SCHEMA_VERSION,
            generated_at: Utc::now(),
            config_hash: self.config.config_hash()?,
            dataset_hash: frame.dataset_hash().clone(),
            calendar_days: frame.len(),
            first_date: frame.dates().first().map(|d| d.to_string()),
            last_date: frame.dates().last().map(|d| d.to_string()),
            entities_modeled: detections.detections.keys().cloned().collect(),
            skipped_entities,
            flat_entities: detections
                .detections
                .values()
                .filter(|d| d.flat)
                .map(|d| d.entity.clone())
                .collect(),
            regions_per_entity: detections
                .detections
                .iter()
                .map(|(entity, d)| (entity.clone(), d.regions.len()))
                .collect(),
            clustering: ClusteringSummary::from_result(clusters),
            enrichment: enrichment
                .map_or_else(EnrichmentSummary::disabled, EnrichmentSummary::from_report),
            output_rows: dataset.len(),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}

/// Run the whole pipeline on files, using `news` as the context source when given.
pub fn run_pipeline(
    config: PipelineConfig,
    files: &InputFiles,
    news: Option<&Path>,
) -> Result<PipelineOutput, RunError> {
    let delimiter = config.delimiter();
    let mut pipeline = Pipeline::new(config)?;
    if let Some(path) = news {
        let source = NewsFileSource::from_path(path, delimiter).map_err(RunError::News)?;
        if source.is_empty() {
            tracing::warn!(file = %path.display(), "news file has no usable headlines");
        }
        pipeline = pipeline.with_context_source(Arc::new(source));
    }
    pipeline.run(files)
}

//! Concurrent context enrichment of anomaly regions.
//!
//! Regions are handed to a fixed pool of named worker threads over an mpsc
//! channel. Workers share one token bucket and one cancellation flag. The
//! coordinator waits for results with `recv_timeout` against the run
//! deadline; on timeout it raises the flag, keeps every result already
//! received and marks the rest as cancelled.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Duration as Days;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AnomalyRegion, RegionId};

use super::rate_limit::TokenBucket;
use super::retry::RetryPolicy;
use super::source::{ContextQuery, ContextSource, FetchError, Snippet, Summarizer};

/// Query terms added to every lookup.
pub const DEFAULT_KEYWORDS: [&str; 6] = [
    "market",
    "economy",
    "commodity",
    "instability",
    "volatility",
    "crisis",
];

/// Enricher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// Days added before the region start and after its end.
    pub enrichment_lookback_days: u32,
    /// Retries of a transient fetch failure after the first attempt.
    pub enrichment_retry_count: u32,
    pub enrich_workers: usize,
    pub rate_limit_per_sec: f64,
    pub rate_limit_burst: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub keywords: Vec<String>,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            enrichment_lookback_days: 3,
            enrichment_retry_count: 3,
            enrich_workers: 4,
            rate_limit_per_sec: 2.0,
            rate_limit_burst: 4,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8000,
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl EnrichConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.enrichment_retry_count,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}

/// Condensed external context for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub region_id: RegionId,
    pub snippets: Vec<Snippet>,
    pub text: String,
    pub source_count: usize,
}

/// A region whose context could not be obtained. Never fatal to the run.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("enrichment of {region_id} failed after {attempts} attempt(s): {reason}")]
pub struct EnrichmentFailure {
    pub region_id: RegionId,
    pub reason: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrichmentOutcome {
    Enriched(ContextSummary),
    /// The source had nothing for the window.
    NoContext,
    Failed(EnrichmentFailure),
    /// Not finished before the run deadline.
    Cancelled,
}

impl EnrichmentOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            EnrichmentOutcome::Enriched(_) => "enriched",
            EnrichmentOutcome::NoContext => "no_context",
            EnrichmentOutcome::Failed(_) => "failed",
            EnrichmentOutcome::Cancelled => "cancelled",
        }
    }

    pub fn summary(&self) -> Option<&ContextSummary> {
        match self {
            EnrichmentOutcome::Enriched(s) => Some(s),
            _ => None,
        }
    }
}

/// Outcome of every region handed to the enricher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentReport {
    pub outcomes: BTreeMap<RegionId, EnrichmentOutcome>,
    pub timed_out: bool,
}

impl EnrichmentReport {
    pub fn summaries(&self) -> BTreeMap<RegionId, ContextSummary> {
        self.outcomes
            .iter()
            .filter_map(|(id, o)| o.summary().map(|s| (id.clone(), s.clone())))
            .collect()
    }

    pub fn failures(&self) -> Vec<&EnrichmentFailure> {
        self.outcomes
            .values()
            .filter_map(|o| match o {
                EnrichmentOutcome::Failed(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    /// Regions the run deadline cut off, in id order.
    pub fn cancelled_regions(&self) -> Vec<RegionId> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, EnrichmentOutcome::Cancelled))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn count(&self, status: &str) -> usize {
        self.outcomes.values().filter(|o| o.status() == status).count()
    }
}

struct Shared {
    config: EnrichConfig,
    policy: RetryPolicy,
    source: Arc<dyn ContextSource>,
    summarizer: Arc<dyn Summarizer>,
    bucket: TokenBucket,
}

/// Attaches external context to anomaly regions.
pub struct Enricher {
    shared: Arc<Shared>,
}

impl Enricher {
    pub fn new(
        config: EnrichConfig,
        source: Arc<dyn ContextSource>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        let bucket = TokenBucket::new(config.rate_limit_per_sec, config.rate_limit_burst);
        let policy = config.retry_policy();
        Self {
            shared: Arc::new(Shared {
                config,
                policy,
                source,
                summarizer,
                bucket,
            }),
        }
    }

    pub fn query_for(&self, region: &AnomalyRegion) -> ContextQuery {
        self.shared.query_for(region)
    }

    /// Enrich one region on the calling thread.
    pub fn enrich_one(&self, region: &AnomalyRegion) -> EnrichmentOutcome {
        self.shared.enrich(region, &AtomicBool::new(false), None)
    }

    /// Enrich every region on the worker pool, stopping at `deadline`.
    pub fn enrich_all(
        &self,
        regions: &[AnomalyRegion],
        deadline: Option<Instant>,
    ) -> EnrichmentReport {
        let mut report = EnrichmentReport::default();
        if regions.is_empty() {
            return report;
        }

        let (job_tx, job_rx) = mpsc::channel::<AnomalyRegion>();
        let (result_tx, result_rx) = mpsc::channel::<(RegionId, EnrichmentOutcome)>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let cancel = Arc::new(AtomicBool::new(false));

        for region in regions {
            // The receiver is alive until the workers exit.
            let _ = job_tx.send(region.clone());
        }
        drop(job_tx);

        let workers = self.shared.config.enrich_workers.clamp(1, regions.len());
        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let shared = Arc::clone(&self.shared);
            let jobs = Arc::clone(&job_rx);
            let results = result_tx.clone();
            let cancel = Arc::clone(&cancel);
            let spawned = thread::Builder::new()
                .name(format!("commodai-enrich-{i}"))
                .spawn(move || worker_loop(&shared, &jobs, &results, &cancel, deadline));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    tracing::warn!(worker = i, error = %e, "failed to spawn enrichment worker")
                }
            }
        }
        drop(result_tx);

        if handles.is_empty() {
            // No pool: enrich inline so the run still completes.
            return self.enrich_inline(regions, deadline);
        }

        while report.outcomes.len() < regions.len() {
            let received = match deadline {
                Some(d) => result_rx.recv_timeout(d.saturating_duration_since(Instant::now())),
                None => result_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((id, outcome)) => {
                    if outcome == EnrichmentOutcome::Cancelled {
                        report.timed_out = true;
                    }
                    report.outcomes.insert(id, outcome);
                }
                Err(RecvTimeoutError::Timeout) => {
                    report.timed_out = true;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if report.timed_out || report.outcomes.len() < regions.len() {
            cancel.store(true, Ordering::SeqCst);
            for region in regions {
                report
                    .outcomes
                    .entry(region.id.clone())
                    .or_insert(EnrichmentOutcome::Cancelled);
            }
            tracing::warn!(
                cancelled = report.count("cancelled"),
                "enrichment deadline reached, keeping completed results"
            );
            // Workers blocked inside a fetch finish on their own; their late
            // results are dropped with the channel.
        } else {
            for handle in handles {
                let _ = handle.join();
            }
        }

        tracing::info!(
            regions = regions.len(),
            enriched = report.count("enriched"),
            no_context = report.count("no_context"),
            failed = report.count("failed"),
            cancelled = report.count("cancelled"),
            "enrichment finished"
        );
        report
    }

    fn enrich_inline(
        &self,
        regions: &[AnomalyRegion],
        deadline: Option<Instant>,
    ) -> EnrichmentReport {
        let cancel = AtomicBool::new(false);
        let mut report = EnrichmentReport::default();
        for region in regions {
            let outcome = self.shared.enrich(region, &cancel, deadline);
            if outcome == EnrichmentOutcome::Cancelled {
                report.timed_out = true;
            }
            report.outcomes.insert(region.id.clone(), outcome);
        }
        report
    }
}

fn worker_loop(
    shared: &Shared,
    jobs: &Mutex<Receiver<AnomalyRegion>>,
    results: &mpsc::Sender<(RegionId, EnrichmentOutcome)>,
    cancel: &AtomicBool,
    deadline: Option<Instant>,
) {
    loop {
        if cancel.load(Ordering::SeqCst) {
            return;
        }
        let next = {
            let guard = jobs.lock().unwrap_or_else(|e| e.into_inner());
            guard.recv()
        };
        let Ok(region) = next else { return };
        let outcome = shared.enrich(&region, cancel, deadline);
        if results.send((region.id, outcome)).is_err() {
            return;
        }
    }
}

impl Shared {
    fn query_for(&self, region: &AnomalyRegion) -> ContextQuery {
        let lookback = Days::days(i64::from(self.config.enrichment_lookback_days));
        ContextQuery {
            start: region.start - lookback,
            end: region.end + lookback,
            keywords: keywords_for(&region.entity, &self.config.keywords),
        }
    }

    fn enrich(
        &self,
        region: &AnomalyRegion,
        cancel: &AtomicBool,
        deadline: Option<Instant>,
    ) -> EnrichmentOutcome {
        let query = self.query_for(region);
        let mut attempt: u32 = 0;

        let snippets = loop {
            if cancel.load(Ordering::SeqCst) || !self.bucket.acquire_until(deadline) {
                return EnrichmentOutcome::Cancelled;
            }
            match self.source.fetch(&query) {
                Ok(snippets) => break snippets,
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    let hint = match &e {
                        FetchError::RateLimited { retry_after_secs } => *retry_after_secs,
                        _ => None,
                    };
                    let delay = self.policy.delay_with_hint(attempt, hint);
                    tracing::debug!(
                        region = %region.id,
                        attempt,
                        error = %e,
                        ?delay,
                        "retrying context fetch"
                    );
                    if let Some(d) = deadline {
                        if Instant::now() + delay >= d {
                            return EnrichmentOutcome::Cancelled;
                        }
                    }
                    thread::sleep(delay);
                }
                Err(e) => {
                    let failure = EnrichmentFailure {
                        region_id: region.id.clone(),
                        reason: format!("{}: {e}", self.source.name()),
                        attempts: attempt + 1,
                    };
                    tracing::warn!(region = %region.id, error = %failure, "enrichment failed");
                    return EnrichmentOutcome::Failed(failure);
                }
            }
        };

        if snippets.is_empty() {
            tracing::debug!(region = %region.id, "no context for window");
            return EnrichmentOutcome::NoContext;
        }

        let texts: Vec<String> = snippets.iter().map(|s| s.text.clone()).collect();
        match self.summarizer.summarize(&texts) {
            Ok(summary) => EnrichmentOutcome::Enriched(ContextSummary {
                region_id: region.id.clone(),
                snippets,
                text: summary.text,
                source_count: summary.source_count,
            }),
            Err(e) => {
                let failure = EnrichmentFailure {
                    region_id: region.id.clone(),
                    reason: e.to_string(),
                    attempts: attempt + 1,
                };
                tracing::warn!(region = %region.id, error = %failure, "summarization failed");
                EnrichmentOutcome::Failed(failure)
            }
        }
    }
}

/// Lowercased entity-name tokens followed by the configured terms, deduplicated.
pub fn keywords_for(entity: &str, extra: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let tokens = entity
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .chain(extra.iter().map(|k| k.trim().to_lowercase()).filter(|k| !k.is_empty()));
    for t in tokens {
        if !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

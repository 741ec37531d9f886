//! Context enrichment: external text attached to anomaly windows.

pub mod enricher;
pub mod rate_limit;
pub mod retry;
pub mod source;

pub use enricher::{
    keywords_for, ContextSummary, EnrichConfig, Enricher, EnrichmentFailure, EnrichmentOutcome,
    EnrichmentReport, DEFAULT_KEYWORDS,
};
pub use rate_limit::TokenBucket;
pub use retry::RetryPolicy;
pub use source::{
    ContextQuery, ContextSource, FetchError, Snippet, SummarizeError, Summarizer, Summary,
};

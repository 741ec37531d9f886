//! Collaborator interfaces for context lookup and summarization.
//!
//! Concrete sources (news archives, event feeds) live outside the core crate.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A context lookup: inclusive date window plus keywords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub keywords: Vec<String>,
}

/// One raw piece of text returned by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub date: Option<NaiveDate>,
    pub text: String,
    pub source: Option<String>,
}

impl Snippet {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            date: None,
            text: text.into(),
            source: None,
        }
    }
}

/// Errors from a context source.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl FetchError {
    /// Transient failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::RateLimited { .. })
    }
}

/// A text/event source queried per anomaly window.
pub trait ContextSource: Send + Sync {
    fn name(&self) -> &str;

    /// Snippets relevant to the query. An empty list is a valid answer.
    fn fetch(&self, query: &ContextQuery) -> Result<Vec<Snippet>, FetchError>;
}

/// Condensed text produced from snippets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub text: String,
    pub source_count: usize,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("summarization failed: {0}")]
pub struct SummarizeError(pub String);

pub trait Summarizer: Send + Sync {
    fn summarize(&self, texts: &[String]) -> Result<Summary, SummarizeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(FetchError::Network("reset".into()).is_transient());
        assert!(FetchError::RateLimited { retry_after_secs: Some(2) }.is_transient());
        assert!(!FetchError::Permanent("404".into()).is_transient());
    }
}

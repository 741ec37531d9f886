//! CommodAI Core: series alignment, anomaly-region detection, ensemble
//! clustering, context enrichment and data synthesis.
//!
//! Stages, in pipeline order:
//! - [`data`]: parse raw CSV series and align them on one calendar
//! - [`detect`]: per-entity isolation scoring plus moving-average check, merged into regions
//! - [`cluster`]: three clustering strategies fused into consensus labels
//! - [`enrich`]: concurrent, rate-limited context lookups per region
//! - [`synth`]: outer join of everything into one record per entity and date
//!
//! This crate does no file or network I/O of its own.

pub mod cluster;
pub mod data;
pub mod detect;
pub mod domain;
pub mod enrich;
pub mod rng;
pub mod synth;

//! Series loader: CSV ingestion, normalization and calendar alignment.

pub mod align;
pub mod ingest;

pub use align::{
    load_frame, AlignOptions, AlignedFrame, AlignedSeries, CalendarMode, Interpolation,
    LoadedFrame, DEFAULT_MIN_OBSERVATIONS,
};
pub use ingest::{
    parse_date, parse_price_csv, parse_value_csv, EntityFailure, IngestOutcome, LoadError,
    RawSeries,
};

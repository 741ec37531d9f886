//! CSV ingestion for price, macro and weather inputs.
//!
//! Parsing is reader-based so callers decide where bytes come from. Errors are
//! attributed to the narrowest scope possible: a bad row in the price file
//! fails only the entity it belongs to, a bad row in a macro/weather file
//! fails that file's series.

use std::collections::BTreeMap;
use std::io::Read;

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{Observation, Provenance};

/// Errors from the series loader. Fatal to one series, never to the run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LoadError {
    #[error("series '{series}' has no observations")]
    Empty { series: String },

    #[error("series '{series}' has {found} observations, at least {required} required")]
    InsufficientObservations {
        series: String,
        found: usize,
        required: usize,
    },

    #[error("series '{series}': malformed row at line {line}: {reason}")]
    Malformed {
        series: String,
        line: u64,
        reason: String,
    },

    #[error("'{source_name}' is missing required column '{column}'")]
    MissingColumn { source_name: String, column: String },

    #[error("cannot read '{source_name}': {reason}")]
    Io { source_name: String, reason: String },
}

/// One entity that could not be loaded, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityFailure {
    pub entity: String,
    pub error: LoadError,
}

/// Observations for one series as read from disk (unsorted, may contain duplicates).
#[derive(Debug, Clone)]
pub struct RawSeries {
    pub name: String,
    pub provenance: Provenance,
    pub observations: Vec<Observation>,
}

/// Result of reading a multi-entity price file.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub series: Vec<RawSeries>,
    pub failures: Vec<EntityFailure>,
}

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%Y%m%d"];

/// Parse a date in any of the accepted formats. A trailing time part is ignored.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.trim().split(['T', ' ']).next().unwrap_or("");
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(day, fmt).ok())
}

/// Parse a numeric cell. Empty cells and provider placeholders (`.`, `NA`) are missing.
fn parse_value(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn clean_header(h: &str) -> String {
    h.trim_start_matches('\u{feff}').trim().to_ascii_lowercase()
}

fn find_column(headers: &[String], names: &[&str]) -> Option<usize> {
    headers.iter().position(|h| names.contains(&h.as_str()))
}

fn reader_builder(delimiter: u8) -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .flexible(true);
    builder
}

fn width_error(series: &str, line: u64, expected: usize, found: usize) -> LoadError {
    LoadError::Malformed {
        series: series.to_string(),
        line,
        reason: format!("expected {expected} columns, found {found}"),
    }
}

fn csv_error(source_name: &str, e: csv::Error) -> LoadError {
    LoadError::Io {
        source_name: source_name.to_string(),
        reason: e.to_string(),
    }
}

/// Read a long-form price file: `date, entity_id, close_price`.
///
/// Missing header columns fail the whole file. A row with an unparseable date
/// or the wrong number of columns fails its entity; a non-numeric price is a
/// missing observation.
pub fn parse_price_csv<R: Read>(
    reader: R,
    source_name: &str,
    delimiter: u8,
) -> Result<IngestOutcome, LoadError> {
    let mut rdr = reader_builder(delimiter).from_reader(reader);
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| csv_error(source_name, e))?
        .iter()
        .map(clean_header)
        .collect();

    let missing = |column: &str| LoadError::MissingColumn {
        source_name: source_name.to_string(),
        column: column.to_string(),
    };
    let date_idx = find_column(&headers, &["date"]).ok_or_else(|| missing("date"))?;
    let entity_idx = find_column(&headers, &["entity_id", "entity", "symbol"])
        .ok_or_else(|| missing("entity_id"))?;
    let price_idx = find_column(&headers, &["close_price", "close", "price"])
        .ok_or_else(|| missing("close_price"))?;

    let mut by_entity: BTreeMap<String, Vec<Observation>> = BTreeMap::new();
    let mut broken: BTreeMap<String, LoadError> = BTreeMap::new();

    for record in rdr.records() {
        let record = record.map_err(|e| csv_error(source_name, e))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let entity = match record.get(entity_idx).map(str::trim) {
            Some(e) if !e.is_empty() => e.to_string(),
            _ => {
                tracing::warn!(source = source_name, line, "price row without entity id skipped");
                continue;
            }
        };
        if broken.contains_key(&entity) {
            continue;
        }
        if record.len() != headers.len() {
            let error = width_error(&entity, line, headers.len(), record.len());
            broken.insert(entity, error);
            continue;
        }

        let raw_date = record.get(date_idx).unwrap_or("");
        let Some(date) = parse_date(raw_date) else {
            broken.insert(
                entity.clone(),
                LoadError::Malformed {
                    series: entity,
                    line,
                    reason: format!("unparseable date '{raw_date}'"),
                },
            );
            continue;
        };

        let slot = by_entity.entry(entity).or_default();
        if let Some(value) = record.get(price_idx).and_then(parse_value) {
            slot.push(Observation::new(date, value));
        }
    }

    let mut outcome = IngestOutcome::default();
    for (entity, error) in broken {
        by_entity.remove(&entity);
        outcome.failures.push(EntityFailure { entity, error });
    }
    outcome.series = by_entity
        .into_iter()
        .map(|(name, observations)| RawSeries {
            name,
            provenance: Provenance::Price,
            observations,
        })
        .collect();
    Ok(outcome)
}

/// Read a `date, value...` file (macro or weather).
///
/// Every non-date column holding at least one numeric cell becomes a series.
/// A single value column is named `name`; several are named `name_column`.
/// Any row with the wrong number of columns fails the file.
pub fn parse_value_csv<R: Read>(
    reader: R,
    name: &str,
    provenance: Provenance,
    delimiter: u8,
) -> Result<Vec<RawSeries>, LoadError> {
    let mut rdr = reader_builder(delimiter).from_reader(reader);
    let raw_headers: Vec<String> = rdr
        .headers()
        .map_err(|e| csv_error(name, e))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    let headers: Vec<String> = raw_headers.iter().map(|h| h.to_ascii_lowercase()).collect();

    let date_idx = find_column(&headers, &["date"]).ok_or_else(|| LoadError::MissingColumn {
        source_name: name.to_string(),
        column: "date".into(),
    })?;

    let value_cols: Vec<usize> = (0..headers.len()).filter(|&i| i != date_idx).collect();
    let mut columns: Vec<Vec<Observation>> = vec![Vec::new(); value_cols.len()];

    for record in rdr.records() {
        let record = record.map_err(|e| csv_error(name, e))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() != headers.len() {
            return Err(width_error(name, line, headers.len(), record.len()));
        }
        let raw_date = record.get(date_idx).unwrap_or("");
        let date = parse_date(raw_date).ok_or_else(|| LoadError::Malformed {
            series: name.to_string(),
            line,
            reason: format!("unparseable date '{raw_date}'"),
        })?;

        for (slot, &col) in columns.iter_mut().zip(&value_cols) {
            if let Some(value) = record.get(col).and_then(parse_value) {
                slot.push(Observation::new(date, value));
            }
        }
    }

    let numeric: Vec<(usize, Vec<Observation>)> = value_cols
        .into_iter()
        .zip(columns)
        .filter(|(_, obs)| !obs.is_empty())
        .collect();

    if numeric.is_empty() {
        return Err(LoadError::Empty {
            series: name.to_string(),
        });
    }

    let single = numeric.len() == 1;
    Ok(numeric
        .into_iter()
        .map(|(col, observations)| RawSeries {
            name: if single {
                name.to_string()
            } else {
                format!("{name}_{}", raw_headers[col])
            },
            provenance,
            observations,
        })
        .collect())
}

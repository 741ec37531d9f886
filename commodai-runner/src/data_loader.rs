//! Input-file loading for the runner.
//!
//! Reads the price file(s) and any macro/weather files from disk, then hands
//! the raw series to the core aligner. A file or entity that cannot be read is
//! recorded as a failure and the rest of the run continues.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use commodai_core::data::{
    load_frame, parse_price_csv, parse_value_csv, AlignOptions, AlignedFrame, EntityFailure,
    LoadError, RawSeries,
};
use commodai_core::domain::Provenance;

/// A context file, optionally with an explicit series name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedInput {
    pub name: Option<String>,
    pub path: PathBuf,
}

impl NamedInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            name: None,
            path: path.into(),
        }
    }

    pub fn named(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: Some(name.into()),
            path: path.into(),
        }
    }

    /// Parse `name=path` or a bare `path`.
    pub fn parse(arg: &str) -> Self {
        match arg.split_once('=') {
            Some((name, path)) if !name.trim().is_empty() && !path.is_empty() => {
                Self::named(name.trim(), path)
            }
            _ => Self::new(arg),
        }
    }

    /// Explicit name, else the file stem.
    pub fn series_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| source_name(&self.path))
    }
}

/// Every file a run reads.
#[derive(Debug, Clone, Default)]
pub struct InputFiles {
    pub prices: Vec<PathBuf>,
    pub macros: Vec<NamedInput>,
    pub weather: Vec<NamedInput>,
}

/// Aligned frame plus everything that was skipped on the way.
#[derive(Debug)]
pub struct LoadedInputs {
    pub frame: AlignedFrame,
    pub failures: Vec<EntityFailure>,
}

/// Read every input file and align the result.
///
/// Never fails as a whole: unreadable files and invalid series end up in
/// `failures`, keyed by entity (or by file name when no entity is known).
pub fn load_inputs(files: &InputFiles, opts: &AlignOptions, delimiter: u8) -> LoadedInputs {
    let mut raw: Vec<RawSeries> = Vec::new();
    let mut failures: Vec<EntityFailure> = Vec::new();

    for path in &files.prices {
        let name = source_name(path);
        let outcome =
            open(path, &name).and_then(|reader| parse_price_csv(reader, &name, delimiter));
        match outcome {
            Ok(outcome) => {
                tracing::info!(
                    file = %path.display(),
                    entities = outcome.series.len(),
                    failed = outcome.failures.len(),
                    "price file read"
                );
                raw.extend(outcome.series);
                failures.extend(outcome.failures);
            }
            Err(error) => failures.push(file_failure(name, error)),
        }
    }

    let context_inputs = [
        (&files.macros, Provenance::Macro),
        (&files.weather, Provenance::Weather),
    ];
    for (inputs, provenance) in context_inputs {
        for input in inputs {
            let name = input.series_name();
            let series = open(&input.path, &name)
                .and_then(|reader| parse_value_csv(reader, &name, provenance, delimiter));
            match series {
                Ok(series) => {
                    tracing::info!(
                        file = %input.path.display(),
                        ?provenance,
                        series = series.len(),
                        "context file read"
                    );
                    raw.extend(series);
                }
                Err(error) => failures.push(file_failure(name, error)),
            }
        }
    }

    for failure in &failures {
        tracing::warn!(entity = %failure.entity, error = %failure.error, "input skipped");
    }

    let loaded = load_frame(&raw, opts);
    failures.extend(loaded.failures);
    LoadedInputs {
        frame: loaded.frame,
        failures,
    }
}

fn open(path: &Path, source: &str) -> Result<BufReader<File>, LoadError> {
    File::open(path).map(BufReader::new).map_err(|e| LoadError::Io {
        source_name: source.to_string(),
        reason: format!("{}: {e}", path.display()),
    })
}

fn file_failure(entity: String, error: LoadError) -> EntityFailure {
    EntityFailure { entity, error }
}

fn source_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn price_rows(entity: &str, days: usize) -> String {
        (0..days)
            .map(|i| format!("2023-01-{:02},{entity},{}\n", i + 1, 100 + i))
            .collect()
    }

    fn small_opts() -> AlignOptions {
        AlignOptions {
            min_observations: 5,
            ..AlignOptions::default()
        }
    }

    #[test]
    fn named_input_parsing() {
        assert_eq!(NamedInput::parse("GDP=data/gdp.csv"), NamedInput::named("GDP", "data/gdp.csv"));
        assert_eq!(NamedInput::parse("data/gdp.csv"), NamedInput::new("data/gdp.csv"));
        assert_eq!(NamedInput::parse("data/gdp.csv").series_name(), "gdp");
        assert_eq!(NamedInput::parse("=x.csv"), NamedInput::new("=x.csv"));
    }

    #[test]
    fn missing_context_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let content = format!("date,entity_id,close_price\n{}", price_rows("CORN", 10));
        let prices = write(dir.path(), "prices.csv", &content);
        let files = InputFiles {
            prices: vec![prices],
            macros: vec![NamedInput::named("GDP", dir.path().join("missing.csv"))],
            weather: Vec::new(),
        };

        let loaded = load_inputs(&files, &small_opts(), b',');
        assert_eq!(loaded.frame.entities(), vec!["CORN"]);
        assert_eq!(loaded.failures.len(), 1);
        assert_eq!(loaded.failures[0].entity, "GDP");
        assert!(matches!(loaded.failures[0].error, LoadError::Io { .. }));
    }

    #[test]
    fn short_entity_is_skipped_others_load() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "date,entity_id,close_price\n{}{}",
            price_rows("CORN", 10),
            price_rows("OATS", 3)
        );
        let prices = write(dir.path(), "prices.csv", &body);
        let files = InputFiles {
            prices: vec![prices],
            ..InputFiles::default()
        };

        let loaded = load_inputs(&files, &small_opts(), b',');
        assert_eq!(loaded.frame.entities(), vec!["CORN"]);
        assert_eq!(loaded.failures.len(), 1);
        assert_eq!(loaded.failures[0].entity, "OATS");
        assert!(matches!(
            loaded.failures[0].error,
            LoadError::InsufficientObservations { found: 3, .. }
        ));
    }

    #[test]
    fn semicolon_files_and_wide_weather() {
        let dir = tempfile::tempdir().unwrap();
        let prices = write(
            dir.path(),
            "prices.csv",
            &format!("date;entity_id;close_price\n{}", price_rows("CORN", 6).replace(',', ";")),
        );
        let weather = write(
            dir.path(),
            "station.csv",
            "DATE;TMIN;TMAX\n2023-01-01;-3;4\n2023-01-02;-1;6\n",
        );
        let files = InputFiles {
            prices: vec![prices],
            macros: Vec::new(),
            weather: vec![NamedInput::new(weather)],
        };

        let loaded = load_inputs(&files, &small_opts(), b';');
        assert!(loaded.failures.is_empty(), "{:?}", loaded.failures);
        let names: Vec<_> = loaded
            .frame
            .by_provenance(Provenance::Weather)
            .map(|s| s.name.clone())
            .collect();
        assert_eq!(names, vec!["station_TMAX", "station_TMIN"]);
        // Weather is never filled.
        assert_eq!(loaded.frame.get("station_TMIN").unwrap().values[2], None);
    }
}

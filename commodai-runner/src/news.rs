//! File-backed context collaborators.
//!
//! `NewsFileSource` answers context queries from a local CSV of dated
//! headlines; `HeadlineSummarizer` condenses the matches into a short
//! extractive summary. Neither touches the network.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;

use commodai_core::data::{parse_date, LoadError};
use commodai_core::enrich::{
    ContextQuery, ContextSource, FetchError, Snippet, SummarizeError, Summarizer, Summary,
};

#[derive(Debug, Clone, PartialEq)]
struct Headline {
    date: NaiveDate,
    title: String,
    url: Option<String>,
}

/// Headlines from a `date, title, url` CSV, held in memory and sorted by date.
#[derive(Debug, Clone, Default)]
pub struct NewsFileSource {
    headlines: Vec<Headline>,
}

impl NewsFileSource {
    pub fn from_path(path: &Path, delimiter: u8) -> Result<Self, LoadError> {
        let name = path.display().to_string();
        let file = File::open(path).map_err(|e| LoadError::Io {
            source_name: name.clone(),
            reason: e.to_string(),
        })?;
        Self::from_reader(file, &name, delimiter)
    }

    /// Rows with an unparseable date or an empty title are skipped.
    pub fn from_reader<R: Read>(
        reader: R,
        source_name: &str,
        delimiter: u8,
    ) -> Result<Self, LoadError> {
        let io = |e: csv::Error| LoadError::Io {
            source_name: source_name.to_string(),
            reason: e.to_string(),
        };
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(reader);
        let headers: Vec<String> = rdr
            .headers()
            .map_err(io)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_ascii_lowercase())
            .collect();
        let column = |names: &[&str]| headers.iter().position(|h| names.contains(&h.as_str()));
        let missing = |c: &str| LoadError::MissingColumn {
            source_name: source_name.to_string(),
            column: c.to_string(),
        };
        let date_idx =
            column(&["date", "published", "published_at"]).ok_or_else(|| missing("date"))?;
        let title_idx = column(&["title", "headline"]).ok_or_else(|| missing("title"))?;
        let url_idx = column(&["url", "link"]);

        let mut headlines = Vec::new();
        let mut skipped = 0usize;
        for record in rdr.records() {
            let record = record.map_err(io)?;
            let date = record.get(date_idx).and_then(parse_date);
            let title = record.get(title_idx).map(str::trim).unwrap_or("");
            match date {
                Some(date) if !title.is_empty() => headlines.push(Headline {
                    date,
                    title: title.to_string(),
                    url: url_idx
                        .and_then(|i| record.get(i))
                        .map(str::trim)
                        .filter(|u| !u.is_empty())
                        .map(str::to_string),
                }),
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::warn!(
                source = source_name,
                skipped,
                "news rows without date or title skipped"
            );
        }
        headlines.sort_by_key(|h| h.date);
        tracing::info!(source = source_name, headlines = headlines.len(), "news file read");
        Ok(Self { headlines })
    }

    pub fn len(&self) -> usize {
        self.headlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headlines.is_empty()
    }
}

impl ContextSource for NewsFileSource {
    fn name(&self) -> &str {
        "news-file"
    }

    /// Headlines inside the window whose title mentions any keyword.
    /// An empty keyword list matches every headline in the window.
    fn fetch(&self, query: &ContextQuery) -> Result<Vec<Snippet>, FetchError> {
        let keywords: Vec<String> = query.keywords.iter().map(|k| k.to_lowercase()).collect();
        Ok(self
            .headlines
            .iter()
            .filter(|h| h.date >= query.start && h.date <= query.end)
            .filter(|h| {
                let title = h.title.to_lowercase();
                keywords.is_empty() || keywords.iter().any(|k| title.contains(k.as_str()))
            })
            .map(|h| Snippet {
                date: Some(h.date),
                text: match &h.url {
                    Some(url) => format!("{} - {url}", h.title),
                    None => h.title.clone(),
                },
                source: h.url.clone(),
            })
            .collect())
    }
}

/// Extractive summary: the first `max_items` distinct headlines, in order.
#[derive(Debug, Clone)]
pub struct HeadlineSummarizer {
    max_items: usize,
}

impl HeadlineSummarizer {
    pub fn new(max_items: usize) -> Self {
        Self {
            max_items: max_items.max(1),
        }
    }
}

impl Default for HeadlineSummarizer {
    fn default() -> Self {
        Self::new(5)
    }
}

impl Summarizer for HeadlineSummarizer {
    fn summarize(&self, texts: &[String]) -> Result<Summary, SummarizeError> {
        let mut seen = HashSet::new();
        let distinct: Vec<&str> = texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
            .collect();
        if distinct.is_empty() {
            return Err(SummarizeError("no usable text to summarize".into()));
        }
        let kept: Vec<&str> = distinct.iter().copied().take(self.max_items).collect();
        Ok(Summary {
            text: kept.join(" | "),
            source_count: distinct.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    const NEWS: &str = "\u{feff}Date,Title,URL\n\
2023-03-05,Wheat market rattled by export ban,https://n.example/1\n\
2023-03-01,Quiet week for grains,\n\
2023-03-06,Drought crisis deepens,https://n.example/2\n\
not-a-date,Broken row,\n\
2023-04-01,Wheat market calm again,https://n.example/3\n";

    fn source() -> NewsFileSource {
        NewsFileSource::from_reader(NEWS.as_bytes(), "news", b',').unwrap()
    }

    fn query(start: &str, end: &str, keywords: &[&str]) -> ContextQuery {
        ContextQuery {
            start: d(start),
            end: d(end),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[test]
    fn reads_sorted_and_skips_broken_rows() {
        let src = source();
        assert_eq!(src.len(), 4);
        assert_eq!(src.headlines[0].date, d("2023-03-01"));
        assert_eq!(src.headlines[0].url, None);
    }

    #[test]
    fn filters_by_window_and_keyword() {
        let hits = source()
            .fetch(&query("2023-03-01", "2023-03-10", &["market", "crisis"]))
            .unwrap();
        let texts: Vec<_> = hits.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Wheat market rattled by export ban - https://n.example/1",
                "Drought crisis deepens - https://n.example/2",
            ]
        );
        assert_eq!(hits[0].date, Some(d("2023-03-05")));
    }

    #[test]
    fn empty_window_is_not_an_error() {
        let hits = source().fetch(&query("2022-01-01", "2022-01-31", &[])).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn missing_title_column_fails() {
        let err = NewsFileSource::from_reader("date,url\n".as_bytes(), "bad", b',').unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn { ref column, .. } if column == "title"));
    }

    #[test]
    fn summarizer_dedupes_and_truncates() {
        let texts: Vec<String> = ["A", "b", "a ", "C", "D"].iter().map(|s| s.to_string()).collect();
        let summary = HeadlineSummarizer::new(2).summarize(&texts).unwrap();
        assert_eq!(summary.text, "A | b");
        assert_eq!(summary.source_count, 4);
    }

    #[test]
    fn summarizer_rejects_blank_input() {
        assert!(HeadlineSummarizer::default().summarize(&["  ".to_string()]).is_err());
    }
}

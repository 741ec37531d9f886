//! The joined output rows and their tabular form.

use std::collections::BTreeMap;
use std::io::Write;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::RegionId;

/// One output row: a price entity on one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesizedRecord {
    pub entity: String,
    pub date: NaiveDate,
    pub price: Option<f64>,
    pub macro_fields: BTreeMap<String, Option<f64>>,
    pub weather_fields: BTreeMap<String, Option<f64>>,
    pub in_anomaly_region: bool,
    pub region_id: Option<RegionId>,
    pub cluster_label: Option<usize>,
    pub anomaly_score: Option<f64>,
    pub context_summary: Option<String>,
}

/// Records plus the column layout they share.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SynthesizedDataset {
    pub macro_columns: Vec<String>,
    pub weather_columns: Vec<String>,
    /// Sorted by entity, then date.
    pub records: Vec<SynthesizedRecord>,
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl SynthesizedDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn rows_for<'a>(
        &'a self,
        entity: &'a str,
    ) -> impl Iterator<Item = &'a SynthesizedRecord> + 'a {
        self.records.iter().filter(move |r| r.entity == entity)
    }

    pub fn header(&self) -> Vec<String> {
        let mut h = vec!["entity".to_string(), "date".to_string(), "price".to_string()];
        h.extend(self.macro_columns.iter().cloned());
        h.extend(self.weather_columns.iter().cloned());
        h.extend(
            ["in_anomaly_region", "region_id", "cluster_label", "anomaly_score", "context_summary"]
                .iter()
                .map(|s| s.to_string()),
        );
        h
    }

    /// Cells of one record in header order. Missing values are empty.
    pub fn cells(&self, record: &SynthesizedRecord) -> Vec<String> {
        let mut row = vec![record.entity.clone(), record.date.to_string(), cell(record.price)];
        row.extend(
            self.macro_columns
                .iter()
                .map(|c| cell(record.macro_fields.get(c).copied().flatten())),
        );
        row.extend(
            self.weather_columns
                .iter()
                .map(|c| cell(record.weather_fields.get(c).copied().flatten())),
        );
        row.push(record.in_anomaly_region.to_string());
        row.push(record.region_id.as_ref().map(|r| r.to_string()).unwrap_or_default());
        row.push(record.cluster_label.map(|c| c.to_string()).unwrap_or_default());
        row.push(cell(record.anomaly_score));
        row.push(record.context_summary.clone().unwrap_or_default());
        row
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(self.header())?;
        for record in &self.records {
            wtr.write_record(self.cells(record))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> SynthesizedDataset {
        let mut macro_fields = BTreeMap::new();
        macro_fields.insert("GDP".to_string(), Some(2.5));
        let mut weather_fields = BTreeMap::new();
        weather_fields.insert("TMAX".to_string(), None);
        SynthesizedDataset {
            macro_columns: vec!["GDP".into()],
            weather_columns: vec!["TMAX".into()],
            records: vec![SynthesizedRecord {
                entity: "CORN".into(),
                date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                price: Some(4.25),
                macro_fields,
                weather_fields,
                in_anomaly_region: true,
                region_id: Some(RegionId::new("CORN", 0)),
                cluster_label: Some(1),
                anomaly_score: Some(0.71),
                context_summary: Some("frost, in Brazil".into()),
            }],
        }
    }

    #[test]
    fn header_lists_context_columns_between_price_and_flags() {
        let h = dataset().header();
        assert_eq!(&h[..5], &["entity", "date", "price", "GDP", "TMAX"]);
        assert_eq!(h.last().map(String::as_str), Some("context_summary"));
    }

    #[test]
    fn csv_quotes_text_and_leaves_missing_empty() {
        let ds = dataset();
        let mut buf = Vec::new();
        ds.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let line = text.lines().nth(1).unwrap();
        assert_eq!(line, "CORN,2024-05-01,4.25,2.5,,true,CORN#0,1,0.71,\"frost, in Brazil\"");
    }
}

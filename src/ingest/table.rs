//! Tabular views over CSV exports and flattened JSON records.

use super::coerce::{parse_count, parse_rate, DateParser};
use crate::discovery::heuristics::find_date_column;
use crate::discovery::{Field, FieldMapping, SchemaSample};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

/// Rows inspected when looking for the header line.
const HEADER_SCAN_ROWS: usize = 5;

/// Read access to the cells of one record by column name.
pub trait Cells {
    fn cell(&self, column: &str) -> Option<&str>;
}

impl Cells for BTreeMap<String, String> {
    fn cell(&self, column: &str) -> Option<&str> {
        self.get(column).map(String::as_str)
    }
}

/// A CSV export with its header located.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Records that could not be decoded.
    pub undecodable: usize,
    index: HashMap<String, usize>,
}

impl Table {
    /// Read a CSV file.
    ///
    /// The header is the first of the leading rows that names a date
    /// column; exports often put a title line above it.
    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut records = Vec::new();
        let mut undecodable = 0;
        for record in reader.records() {
            match record {
                Ok(record) => records.push(record.iter().map(|c| c.to_string()).collect()),
                Err(e) => {
                    debug!("Skipping undecodable record in {}: {}", path.display(), e);
                    undecodable += 1;
                }
            }
        }

        Ok(Self::from_records(records, undecodable))
    }

    pub fn from_records(mut records: Vec<Vec<String>>, undecodable: usize) -> Self {
        if let Some(first) = records.first_mut().and_then(|r| r.first_mut()) {
            *first = first.trim_start_matches('\u{feff}').to_string();
        }

        let header_at = records
            .iter()
            .take(HEADER_SCAN_ROWS)
            .position(|row| find_date_column(row).is_some())
            .unwrap_or(0);

        let mut rows = records.split_off(header_at.min(records.len()));
        let header: Vec<String> = if rows.is_empty() {
            Vec::new()
        } else {
            rows.remove(0).into_iter().map(|h| h.trim().to_string()).collect()
        };
        rows.retain(|row| row.iter().any(|cell| !cell.trim().is_empty()));

        let index = header
            .iter()
            .enumerate()
            .rev()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        Self {
            header,
            rows,
            undecodable,
            index,
        }
    }

    pub fn row(&self, i: usize) -> Row<'_> {
        Row {
            index: &self.index,
            cells: &self.rows[i],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.rows.len()).map(|i| self.row(i))
    }

    /// Row as a column-name map, for records that keep their source row.
    pub fn row_map(&self, i: usize) -> BTreeMap<String, String> {
        self.header
            .iter()
            .zip(self.rows[i].iter())
            .map(|(h, v)| (h.clone(), v.clone()))
            .collect()
    }

    pub fn sample(&self, file_name: &str, rows: usize) -> SchemaSample {
        SchemaSample {
            file_name: file_name.to_string(),
            columns: self.header.clone(),
            rows: self.rows.iter().take(rows).cloned().collect(),
        }
    }
}

/// One CSV row addressed by column name.
pub struct Row<'a> {
    index: &'a HashMap<String, usize>,
    cells: &'a [String],
}

impl Cells for Row<'_> {
    fn cell(&self, column: &str) -> Option<&str> {
        self.index
            .get(column)
            .and_then(|i| self.cells.get(*i))
            .map(String::as_str)
    }
}

/// Values of one row after coercion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRow {
    pub date: Option<NaiveDate>,
    values: BTreeMap<Field, f64>,
}

impl ParsedRow {
    /// Counter value; zero when the cell was missing or invalid.
    pub fn count(&self, field: Field) -> u64 {
        self.values.get(&field).map(|v| *v as u64).unwrap_or(0)
    }

    /// Rate value; zero when the cell was missing or invalid.
    pub fn rate(&self, field: Field) -> f64 {
        self.values.get(&field).copied().unwrap_or(0.0)
    }

    pub fn has(&self, field: Field) -> bool {
        self.values.contains_key(&field)
    }
}

/// Coerce one record through a mapping.
///
/// Returns `None` when the date is required but unparseable, or when
/// every mapped numeric field fails to coerce.
pub fn parse_row(
    cells: &impl Cells,
    mapping: &FieldMapping,
    dates: &DateParser,
    require_date: bool,
) -> Option<ParsedRow> {
    let date = mapping
        .date_column
        .as_deref()
        .and_then(|column| cells.cell(column))
        .and_then(|raw| dates.parse(raw));
    if require_date && date.is_none() {
        return None;
    }

    let mut values = BTreeMap::new();
    for (field, column) in &mapping.fields {
        let Some(raw) = cells.cell(column) else {
            continue;
        };
        let value = if field.is_rate() {
            parse_rate(raw)
        } else {
            parse_count(raw).map(|v| v as f64)
        };
        if let Some(value) = value {
            values.insert(*field, value);
        }
    }

    if !mapping.fields.is_empty() && values.is_empty() {
        return None;
    }
    Some(ParsedRow { date, values })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(lines: &[&[&str]]) -> Vec<Vec<String>> {
        lines
            .iter()
            .map(|l| l.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn mapping() -> FieldMapping {
        let mut fields = BTreeMap::new();
        fields.insert(Field::Impressions, "Impressions".to_string());
        fields.insert(Field::EngagementRate, "Engagement rate".to_string());
        FieldMapping {
            date_column: Some("Date".to_string()),
            date_format: None,
            fields,
        }
    }

    #[test]
    fn test_header_after_title_line() {
        let table = Table::from_records(
            records(&[
                &["\u{feff}Aggregate engagement metrics for Acme"],
                &["Date", "Impressions", "Engagement rate"],
                &["01/02/2025", "1,200", "4.50%"],
                &["", "", ""],
            ]),
            0,
        );

        assert_eq!(table.header, vec!["Date", "Impressions", "Engagement rate"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.row(0).cell("Impressions"), Some("1,200"));
    }

    #[test]
    fn test_bom_stripped_from_header() {
        let table = Table::from_records(records(&[&["\u{feff}Date", "Clicks"], &["2025-01-01", "3"]]), 0);
        assert_eq!(table.header[0], "Date");
    }

    #[test]
    fn test_parse_row_coercion() {
        let table = Table::from_records(
            records(&[
                &["Date", "Impressions", "Engagement rate"],
                &["01/02/2025", "1,200", "4.50%"],
                &["01/03/2025", "n/a", "3%"],
                &["01/04/2025", "n/a", "bad"],
                &["not a date", "10", "1%"],
                &["01/05/2025", "7"],
            ]),
            0,
        );
        let dates = DateParser::default();
        let parsed: Vec<Option<ParsedRow>> = table
            .iter()
            .map(|row| parse_row(&row, &mapping(), &dates, true))
            .collect();

        let first = parsed[0].as_ref().unwrap();
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2025, 1, 2));
        assert_eq!(first.count(Field::Impressions), 1200);
        assert_eq!(first.rate(Field::EngagementRate), 0.045);

        let second = parsed[1].as_ref().unwrap();
        assert_eq!(second.count(Field::Impressions), 0);
        assert!(!second.has(Field::Impressions));

        assert!(parsed[2].is_none(), "all numeric fields failed");
        assert!(parsed[3].is_none(), "date failed");

        // Short row: missing cells are simply absent
        assert_eq!(parsed[4].as_ref().unwrap().count(Field::Impressions), 7);
    }

    #[test]
    fn test_read_csv_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("content.csv");
        std::fs::write(
            &path,
            "Title line\nDate,Impressions,Engagement rate\n01/02/2025,\"1,200\",4.50%\n",
        )
        .unwrap();

        let table = Table::read(&path).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.row(0).cell("Impressions"), Some("1,200"));
        assert_eq!(table.sample("content.csv", 5).columns.len(), 3);
    }
}

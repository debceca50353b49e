//! Long-form reports over one platform's raw export files.
//!
//! Unlike the pipeline, these reports read the source files directly
//! and summarize them (row counts, date spans, recent averages, sample
//! rows) before asking the model for a markdown analysis. When the model
//! cannot answer, the summary itself becomes the report body.

use crate::agent::narrate::is_error_shaped;
use crate::agent::sanitize::sanitize_inline;
use crate::discovery::heuristics::find_date_column;
use crate::discovery::FileKind;
use crate::ingest::coerce::DateParser;
use crate::ingest::instagram::extract_records;
use crate::ingest::table::Table;
use crate::ingest::PlatformIngestor;
use crate::llm::{CallType, LlmHandle};
use crate::models::Platform;
use crate::scanner::ScannedFile;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Rows averaged for the key metrics.
const RECENT_ROWS: usize = 30;
const SAMPLE_ROWS: usize = 3;
const MAX_SAMPLE_COLUMNS: usize = 5;
const MAX_AVERAGED_COLUMNS: usize = 5;
const MAX_PROMPT_COLUMNS: usize = 10;
const MAX_RECOMMENDATIONS: usize = 5;

const KEY_COLUMN_WORDS: &[&str] = &[
    "date", "total", "impressions", "clicks", "reactions", "followers", "visitors", "views",
];
const ACTION_WORDS: &[&str] = &[
    "should", "recommend", "suggest", "focus", "increase", "improve", "optimize",
];

/// Focus of a platform report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    /// Trends, correlations, patterns and recommendations
    Comprehensive,
    /// Time-series trends and growth rates
    Trends,
    /// Relationships between the selected files
    Correlations,
    /// Short summary for leadership
    Executive,
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportType::Comprehensive => write!(f, "comprehensive"),
            ReportType::Trends => write!(f, "trends"),
            ReportType::Correlations => write!(f, "correlations"),
            ReportType::Executive => write!(f, "executive"),
        }
    }
}

impl ReportType {
    fn instructions(&self) -> &'static str {
        match self {
            ReportType::Comprehensive => {
                "Write a comprehensive report with these sections:\n\
                 1. Executive Summary: key findings and overall performance\n\
                 2. Trend Analysis: growth patterns, peaks and low periods\n\
                 3. Cross-File Correlations: how the files' metrics relate, if several files are given\n\
                 4. Pattern Recognition: weekday/weekend patterns, seasonality, anomalies\n\
                 5. Key Insights: what works, what is concerning, opportunities\n\
                 6. Actionable Recommendations: specific actions ordered by impact"
            }
            ReportType::Trends => {
                "Focus on trends: time-series movement of each metric, growth rates and \
                 acceleration, period-over-period comparisons, best and worst periods, and \
                 where the current pattern is heading. Give specific numbers and percentages."
            }
            ReportType::Correlations => {
                "Focus on relationships between the files: which metrics move together, \
                 lead/lag timing, and which metrics appear to drive others. Close with \
                 recommendations that follow from those relationships."
            }
            ReportType::Executive => {
                "Write a concise executive summary of two or three paragraphs covering overall \
                 status, key metrics and trends, the top three strategic recommendations, and \
                 risks to monitor. Keep it high-level."
            }
        }
    }
}

/// First and last parsed date of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Distinct dates seen.
    pub days: usize,
}

impl DateSpan {
    fn from_dates(dates: impl IntoIterator<Item = NaiveDate>) -> Option<Self> {
        let distinct: BTreeSet<NaiveDate> = dates.into_iter().collect();
        Some(Self {
            start: *distinct.first()?,
            end: *distinct.last()?,
            days: distinct.len(),
        })
    }
}

/// What one export file contains.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub file_name: String,
    pub kind: String,
    pub rows: usize,
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub top_level_keys: Vec<String>,
    pub date_range: Option<DateSpan>,
    /// Mean of numeric columns over the last 30 rows.
    pub averages: Vec<(String, f64)>,
    pub sample_columns: Vec<String>,
    pub sample_rows: Vec<Vec<String>>,
}

impl FileSummary {
    /// Summarize a CSV export.
    pub fn from_table(file_name: &str, kind: FileKind, table: &Table) -> Self {
        let dates = find_date_column(&table.header)
            .map(|column| {
                let parser = DateParser::new(None);
                let at = table.header.iter().position(|h| *h == column);
                table
                    .rows
                    .iter()
                    .filter_map(|row| at.and_then(|i| row.get(i)))
                    .filter_map(|cell| parser.parse(cell))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let recent_start = table.rows.len().saturating_sub(RECENT_ROWS);
        let recent = &table.rows[recent_start..];
        let averages = table
            .header
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.to_lowercase().contains("date"))
            .filter_map(|(i, name)| {
                let values: Vec<f64> = recent
                    .iter()
                    .filter_map(|row| row.get(i))
                    .filter(|cell| !cell.trim().is_empty())
                    .filter_map(|cell| parse_number(cell))
                    .collect();
                let filled = recent
                    .iter()
                    .filter(|row| row.get(i).is_some_and(|c| !c.trim().is_empty()))
                    .count();
                // Mostly numeric columns only
                (!values.is_empty() && values.len() * 2 >= filled)
                    .then(|| (name.clone(), values.iter().sum::<f64>() / values.len() as f64))
            })
            .take(MAX_AVERAGED_COLUMNS)
            .collect();

        let key_columns: Vec<usize> = table
            .header
            .iter()
            .enumerate()
            .filter(|(_, h)| {
                let lower = h.to_lowercase();
                KEY_COLUMN_WORDS.iter().any(|w| lower.contains(w))
            })
            .map(|(i, _)| i)
            .take(MAX_SAMPLE_COLUMNS)
            .collect();
        let sample_idx: Vec<usize> = if key_columns.is_empty() {
            (0..table.header.len().min(MAX_SAMPLE_COLUMNS)).collect()
        } else {
            key_columns
        };

        Self {
            file_name: file_name.to_string(),
            kind: kind.tag().to_string(),
            rows: table.rows.len(),
            columns: table.header.clone(),
            top_level_keys: Vec::new(),
            date_range: DateSpan::from_dates(dates),
            averages,
            sample_columns: sample_idx.iter().map(|i| table.header[*i].clone()).collect(),
            sample_rows: table
                .rows
                .iter()
                .take(SAMPLE_ROWS)
                .map(|row| {
                    sample_idx
                        .iter()
                        .map(|i| row.get(*i).cloned().unwrap_or_default())
                        .collect()
                })
                .collect(),
        }
    }

    /// Summarize a JSON export.
    pub fn from_json(file_name: &str, kind: FileKind, value: Value) -> Self {
        let top_level_keys = match &value {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
        let records = extract_records(value);

        let parser = DateParser::new(None);
        let dates = records.iter().flat_map(|record| {
            record
                .flat
                .iter()
                .filter(|(key, _)| key.to_lowercase().contains("timestamp"))
                .filter_map(|(_, v)| parser.parse(v))
                .collect::<Vec<_>>()
        });
        let date_range = DateSpan::from_dates(dates);

        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.flat.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let sample_columns: Vec<String> = columns.iter().take(MAX_SAMPLE_COLUMNS).cloned().collect();
        let sample_rows = records
            .iter()
            .take(SAMPLE_ROWS)
            .map(|r| {
                sample_columns
                    .iter()
                    .map(|c| r.flat.get(c).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        Self {
            file_name: file_name.to_string(),
            kind: kind.tag().to_string(),
            rows: records.len(),
            columns,
            top_level_keys,
            date_range,
            averages: Vec::new(),
            sample_columns,
            sample_rows,
        }
    }

    /// Prompt-ready description of the file.
    pub fn render(&self) -> String {
        let mut out = format!("## {} file ({})\n", self.kind.to_uppercase(), self.file_name);
        out.push_str(&format!("- Total rows: {}\n", self.rows));
        if !self.top_level_keys.is_empty() {
            out.push_str(&format!(
                "- Top-level keys: {}\n",
                self.top_level_keys.iter().take(5).cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        let shown: Vec<&str> = self.columns.iter().take(MAX_PROMPT_COLUMNS).map(String::as_str).collect();
        out.push_str(&format!(
            "- Columns: {}{}\n",
            shown.join(", "),
            if self.columns.len() > MAX_PROMPT_COLUMNS { ", ..." } else { "" }
        ));
        if let Some(span) = &self.date_range {
            out.push_str(&format!(
                "- Date range: {} to {} ({} days)\n",
                span.start, span.end, span.days
            ));
        }
        if !self.averages.is_empty() {
            out.push_str("\n### Key metrics (last 30 rows)\n");
            for (column, avg) in &self.averages {
                out.push_str(&format!("- {}: average {:.2}\n", column, avg));
            }
        }
        if !self.sample_rows.is_empty() {
            out.push_str("\n### Sample data (first 3 rows)\n");
            out.push_str(&format!("| {} |\n", self.sample_columns.join(" | ")));
            for row in &self.sample_rows {
                out.push_str(&format!("| {} |\n", row.join(" | ")));
            }
        }
        out
    }
}

/// A generated platform report.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformReport {
    pub platform: Platform,
    pub report_type: ReportType,
    pub files_requested: Vec<String>,
    pub files_analyzed: Vec<String>,
    pub generated_at: DateTime<Local>,
    pub data_summary: Vec<FileSummary>,
    /// Markdown analysis body.
    pub analysis: String,
    /// False when the body is the deterministic summary.
    pub from_model: bool,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlatformReport {
    /// Markdown rendering of the whole report.
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {} {} Report\n\n", self.platform, title_case(&self.report_type.to_string()));
        out.push_str(&format!(
            "- **Generated:** {}\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        ));
        if let Some(error) = &self.error {
            out.push_str(&format!("- **Files requested:** {}\n\n", self.files_requested.join(", ")));
            out.push_str(&format!("**Error:** {}\n", error));
            return out;
        }
        out.push_str(&format!("- **Files analyzed:** {}\n\n", self.files_analyzed.join(", ")));

        out.push_str("## Analysis\n\n");
        out.push_str(self.analysis.trim());
        out.push_str("\n\n");

        if !self.recommendations.is_empty() {
            out.push_str("## Top Recommendations\n\n");
            for (i, rec) in self.recommendations.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", i + 1, rec));
            }
            out.push('\n');
        }
        out
    }
}

/// Builds long-form reports for one platform.
pub struct PlatformReportGenerator {
    platform: Platform,
    ingestor: PlatformIngestor,
}

impl PlatformReportGenerator {
    pub fn new(ingestor: PlatformIngestor, platform: Platform) -> Self {
        Self { platform, ingestor }
    }

    /// Files whose kind tag is in `kinds`; every recognized file when empty.
    pub fn select_files(&self, kinds: &[String]) -> Vec<(ScannedFile, FileKind)> {
        let wanted: Vec<String> = kinds.iter().map(|k| k.trim().to_lowercase()).collect();
        self.ingestor
            .preview()
            .into_iter()
            .filter_map(|(file, kind)| kind.map(|k| (file, k)))
            .filter(|(_, kind)| wanted.is_empty() || wanted.iter().any(|w| w == kind.tag()))
            .collect()
    }

    /// Generate a report. Never fails; problems are described in the report.
    pub async fn generate(
        &self,
        kinds: &[String],
        report_type: ReportType,
        llm: &LlmHandle,
    ) -> PlatformReport {
        let requested = if kinds.is_empty() {
            FileKind::for_platform(self.platform)
                .iter()
                .filter(|k| !k.is_other())
                .map(|k| k.tag().to_string())
                .collect()
        } else {
            kinds.to_vec()
        };

        let mut summaries = Vec::new();
        for (file, kind) in self.select_files(kinds) {
            match summarize_file(&file.path, &file.name, kind) {
                Ok(summary) => {
                    info!(file = %file.name, rows = summary.rows, "Summarized export");
                    summaries.push(summary);
                }
                Err(e) => warn!(file = %file.name, "Cannot summarize: {:#}", e),
            }
        }

        let mut report = PlatformReport {
            platform: self.platform,
            report_type,
            files_requested: requested,
            files_analyzed: summaries.iter().map(|s| s.file_name.clone()).collect(),
            generated_at: Local::now(),
            data_summary: Vec::new(),
            analysis: String::new(),
            from_model: false,
            recommendations: Vec::new(),
            error: None,
        };
        if summaries.is_empty() {
            report.error = Some("No data files found or loaded".to_string());
            return report;
        }

        let context: String = summaries.iter().map(FileSummary::render).collect::<Vec<_>>().join("\n");
        let system = format!(
            "You are a {} analytics expert. Analyze the data and give actionable insights with \
             specific recommendations. Use markdown headings and bullet points.",
            self.platform
        );
        let user = format!(
            "Analyze these {} export files.\n\nFiles analyzed: {}\n\n{}\n{}",
            self.platform,
            report.files_analyzed.join(", "),
            context,
            report_type.instructions()
        );

        let agent = format!("{} Report", self.platform);
        let answer = if llm.is_enabled() {
            llm.complete(&agent, CallType::Report, &system, &user).await.ok()
        } else {
            None
        };
        match answer.filter(|text| !is_error_shaped(text)) {
            Some(text) => {
                report.recommendations = extract_recommendations(&text);
                report.analysis = text;
                report.from_model = true;
            }
            None => {
                report.analysis = fallback_analysis(&summaries);
            }
        }
        report.data_summary = summaries;
        report
    }
}

fn summarize_file(path: &Path, file_name: &str, kind: FileKind) -> Result<FileSummary> {
    match kind {
        FileKind::LinkedInContent
        | FileKind::LinkedInFollowers
        | FileKind::LinkedInVisitors
        | FileKind::WebsiteTraffic
        | FileKind::WebsiteBlog => Ok(FileSummary::from_table(file_name, kind, &Table::read(path)?)),
        _ => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let value: Value = serde_json::from_str(content.trim_start_matches('\u{feff}'))
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(FileSummary::from_json(file_name, kind, value))
        }
    }
}

/// Deterministic body used when the model gives no analysis.
fn fallback_analysis(summaries: &[FileSummary]) -> String {
    let mut out = String::from(
        "Model analysis is unavailable; the data summary below was computed from the files.\n\n",
    );
    for summary in summaries {
        out.push_str(&format!("### {} ({})\n\n", summary.file_name, summary.kind));
        out.push_str(&format!("- Rows: {}\n", summary.rows));
        if let Some(span) = &summary.date_range {
            out.push_str(&format!("- Period: {} to {} ({} days)\n", span.start, span.end, span.days));
        }
        for (column, avg) in &summary.averages {
            out.push_str(&format!("- Average {} (last 30 rows): {:.2}\n", column, avg));
        }
        out.push('\n');
    }
    out
}

/// Pull up to five recommendations out of a markdown analysis.
///
/// Bullets under a heading that mentions recommendations or actions win;
/// otherwise sentences with action words near the end are used.
pub fn extract_recommendations(analysis: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut in_section = false;

    for line in analysis.lines() {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();
        let is_heading = trimmed.starts_with('#');
        if is_heading {
            in_section = lower.contains("recommendation") || lower.contains("action");
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some(item) = list_item(trimmed) {
            let item = sanitize_inline(item);
            if item.chars().count() > 10 {
                found.push(item);
            }
        }
    }

    if found.is_empty() {
        let sentences: Vec<&str> = analysis.split('.').collect();
        let tail = &sentences[sentences.len().saturating_sub(10)..];
        for sentence in tail {
            let lower = sentence.to_lowercase();
            if ACTION_WORDS.iter().any(|w| lower.contains(w)) {
                let clean = sanitize_inline(sentence);
                if clean.chars().count() > 20 {
                    found.push(clean);
                }
            }
        }
    }

    found.truncate(MAX_RECOMMENDATIONS);
    found
}

fn list_item(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix(['-', '*', '•']) {
        return Some(rest.trim());
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(['.', ')']) {
            return Some(rest.trim());
        }
    }
    None
}

fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_matches('"')
        .chars()
        .filter(|c| *c != ',' && *c != '%' && !c.is_whitespace())
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Kind tags accepted by `--report-files` for a platform.
pub fn report_kinds(platform: Platform) -> Vec<&'static str> {
    FileKind::for_platform(platform)
        .iter()
        .filter(|k| !k.is_other())
        .map(|k| k.tag())
        .collect()
}

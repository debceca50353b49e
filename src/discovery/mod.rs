//! Schema discovery for loosely structured export files.
//!
//! Given a small sample of a file (column names or flattened JSON paths plus
//! a few rows), decide what kind of export it is and which source column
//! feeds which target field. The model is asked first; when it cannot
//! answer, the registered filename and column heuristics decide.

pub mod heuristics;
pub mod repair;

pub use heuristics::{match_columns, HeuristicRegistry};

use crate::llm::{CallType, LlmHandle};
use crate::models::{PayloadKind, Platform};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Longest cell text shown to the model.
const MAX_CELL_CHARS: usize = 60;

/// Classification of a source file. The set is closed per platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    LinkedInContent,
    LinkedInFollowers,
    LinkedInVisitors,
    InstagramPosts,
    InstagramAudienceInsights,
    InstagramContentInteractions,
    InstagramLiveVideos,
    InstagramProfilesReached,
    WebsiteTraffic,
    WebsiteBlog,
    Other,
}

impl FileKind {
    /// Kinds a platform's files may be classified as, excluding `Other`.
    pub fn for_platform(platform: Platform) -> &'static [FileKind] {
        match platform {
            Platform::LinkedIn => &[
                FileKind::LinkedInContent,
                FileKind::LinkedInFollowers,
                FileKind::LinkedInVisitors,
            ],
            Platform::Instagram => &[
                FileKind::InstagramPosts,
                FileKind::InstagramAudienceInsights,
                FileKind::InstagramContentInteractions,
                FileKind::InstagramLiveVideos,
                FileKind::InstagramProfilesReached,
            ],
            Platform::Website => &[FileKind::WebsiteTraffic, FileKind::WebsiteBlog],
        }
    }

    /// Short tag used in prompts and model answers.
    pub fn tag(&self) -> &'static str {
        match self {
            FileKind::LinkedInContent => "content",
            FileKind::LinkedInFollowers => "followers",
            FileKind::LinkedInVisitors => "visitors",
            FileKind::InstagramPosts => "posts",
            FileKind::InstagramAudienceInsights => "audience_insights",
            FileKind::InstagramContentInteractions => "content_interactions",
            FileKind::InstagramLiveVideos => "live_videos",
            FileKind::InstagramProfilesReached => "profiles_reached",
            FileKind::WebsiteTraffic => "traffic",
            FileKind::WebsiteBlog => "blog",
            FileKind::Other => "other",
        }
    }

    /// Resolve a model-supplied tag. Unknown tags resolve to `Other`.
    pub fn from_tag(platform: Platform, tag: &str) -> FileKind {
        let tag = tag.trim().to_lowercase().replace([' ', '-'], "_");
        Self::for_platform(platform)
            .iter()
            .copied()
            .find(|kind| kind.tag() == tag)
            .unwrap_or(FileKind::Other)
    }

    /// Target fields a file of this kind can feed.
    pub fn fields(&self) -> &'static [Field] {
        match self {
            FileKind::LinkedInContent => &[
                Field::Impressions,
                Field::Clicks,
                Field::Reactions,
                Field::EngagementRate,
            ],
            FileKind::LinkedInFollowers => &[
                Field::SponsoredFollowers,
                Field::OrganicFollowers,
                Field::TotalFollowers,
            ],
            FileKind::LinkedInVisitors => &[Field::PageViews, Field::UniqueVisitors],
            FileKind::InstagramPosts => &[
                Field::Impressions,
                Field::Likes,
                Field::Comments,
                Field::Shares,
                Field::EngagementRate,
            ],
            FileKind::WebsiteTraffic | FileKind::WebsiteBlog => {
                &[Field::PageViews, Field::UniqueVisitors, Field::BounceRate]
            }
            _ => &[],
        }
    }

    /// Whether records of this kind are dated metrics (rows without a date are skipped).
    pub fn requires_date(&self) -> bool {
        !self.fields().is_empty()
    }

    /// Payload tag for kinds stored as untyped records.
    pub fn payload_kind(&self) -> Option<PayloadKind> {
        match self {
            FileKind::InstagramAudienceInsights => Some(PayloadKind::AudienceInsights),
            FileKind::InstagramContentInteractions => Some(PayloadKind::ContentInteractions),
            FileKind::InstagramLiveVideos => Some(PayloadKind::LiveVideos),
            FileKind::InstagramProfilesReached => Some(PayloadKind::ProfilesReached),
            _ => None,
        }
    }

    pub fn is_other(&self) -> bool {
        *self == FileKind::Other
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Target field of the normalized model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Impressions,
    Clicks,
    Reactions,
    EngagementRate,
    Likes,
    Comments,
    Shares,
    PageViews,
    UniqueVisitors,
    BounceRate,
    SponsoredFollowers,
    OrganicFollowers,
    TotalFollowers,
}

impl Field {
    const ALL: [Field; 13] = [
        Field::Impressions,
        Field::Clicks,
        Field::Reactions,
        Field::EngagementRate,
        Field::Likes,
        Field::Comments,
        Field::Shares,
        Field::PageViews,
        Field::UniqueVisitors,
        Field::BounceRate,
        Field::SponsoredFollowers,
        Field::OrganicFollowers,
        Field::TotalFollowers,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Field::Impressions => "impressions",
            Field::Clicks => "clicks",
            Field::Reactions => "reactions",
            Field::EngagementRate => "engagement_rate",
            Field::Likes => "likes",
            Field::Comments => "comments",
            Field::Shares => "shares",
            Field::PageViews => "page_views",
            Field::UniqueVisitors => "unique_visitors",
            Field::BounceRate => "bounce_rate",
            Field::SponsoredFollowers => "sponsored_followers",
            Field::OrganicFollowers => "organic_followers",
            Field::TotalFollowers => "total_followers",
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        let key = key.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL.iter().copied().find(|f| f.key() == key)
    }

    /// Rates are stored as fractions in `[0, 1]`; everything else is a count.
    pub fn is_rate(&self) -> bool {
        matches!(self, Field::EngagementRate | Field::BounceRate)
    }
}

/// Which source column (or flattened JSON path) feeds which target field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub date_column: Option<String>,
    /// strftime-style format suggested for the date column.
    pub date_format: Option<String>,
    pub fields: BTreeMap<Field, String>,
}

impl FieldMapping {
    pub fn column(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }
}

/// How a schema was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    Llm,
    Heuristic,
}

/// Result of schema discovery for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredSchema {
    pub kind: FileKind,
    pub mapping: FieldMapping,
    pub source: DiscoverySource,
}

/// What discovery gets to see of a file.
#[derive(Debug, Clone, Default)]
pub struct SchemaSample {
    pub file_name: String,
    /// Column names, or flattened key paths for JSON records.
    pub columns: Vec<String>,
    /// A few data rows aligned with `columns`.
    pub rows: Vec<Vec<String>>,
}

/// Shape of the model's answer.
#[derive(Debug, Deserialize)]
struct DiscoveryAnswer {
    #[serde(default)]
    file_type: String,
    #[serde(default)]
    date_column: Option<String>,
    #[serde(default)]
    date_format: Option<String>,
    #[serde(default)]
    mapping: BTreeMap<String, Value>,
}

const DISCOVERY_SYSTEM_PROMPT: &str = "You classify marketing analytics export files and map \
their columns to a fixed set of target fields. Respond with a single JSON object and nothing else.";

/// Stateless schema discovery service.
#[derive(Debug, Clone)]
pub struct SchemaDiscovery {
    heuristics: HeuristicRegistry,
    use_llm: bool,
    max_columns: usize,
    max_rows: usize,
}

impl Default for SchemaDiscovery {
    fn default() -> Self {
        Self::new(HeuristicRegistry::with_defaults(), true, 25, 5)
    }
}

impl SchemaDiscovery {
    pub fn new(
        heuristics: HeuristicRegistry,
        use_llm: bool,
        max_columns: usize,
        max_rows: usize,
    ) -> Self {
        Self {
            heuristics,
            use_llm,
            max_columns,
            max_rows,
        }
    }

    /// Ask the model for a schema.
    ///
    /// Returns `None` when the call fails or the answer cannot be parsed;
    /// the caller then falls back to heuristics. A returned schema of kind
    /// `Other` means the file should be skipped.
    pub async fn discover(
        &self,
        sample: &SchemaSample,
        platform: Platform,
        llm: &LlmHandle,
    ) -> Option<DiscoveredSchema> {
        let prompt = self.build_prompt(sample, platform);
        let agent = format!("{} Ingestion", platform);

        let text = match llm
            .complete(&agent, CallType::SchemaDiscovery, DISCOVERY_SYSTEM_PROMPT, &prompt)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                debug!(file = %sample.file_name, "Schema discovery call failed: {}", e);
                return None;
            }
        };

        let value = match repair::parse_lenient(&text) {
            Some(value) => value,
            None => {
                warn!(file = %sample.file_name, "Schema discovery answer was not JSON");
                return None;
            }
        };

        let answer: DiscoveryAnswer = match serde_json::from_value(value) {
            Ok(answer) => answer,
            Err(e) => {
                warn!(file = %sample.file_name, "Schema discovery answer malformed: {}", e);
                return None;
            }
        };

        Some(answer_to_schema(answer, platform))
    }

    /// Classify a file: model first, heuristics when the model cannot answer.
    ///
    /// Returns `None` when the file should be skipped.
    pub async fn classify(
        &self,
        sample: &SchemaSample,
        platform: Platform,
        llm: &LlmHandle,
    ) -> Option<DiscoveredSchema> {
        if self.use_llm && llm.is_enabled() {
            if let Some(schema) = self.discover(sample, platform, llm).await {
                if schema.kind.is_other() {
                    info!(file = %sample.file_name, "Model classified file as other; skipping");
                    return None;
                }
                return self.validate(schema, sample);
            }
        }

        self.heuristic(sample, platform)
    }

    /// Classify using heuristics only.
    pub fn heuristic(&self, sample: &SchemaSample, platform: Platform) -> Option<DiscoveredSchema> {
        let (strategy, kind) =
            self.heuristics
                .classify(platform, &sample.file_name, &sample.columns)?;
        debug!(file = %sample.file_name, strategy, %kind, "Heuristic classification");

        let schema = DiscoveredSchema {
            kind,
            mapping: match_columns(kind, &sample.columns),
            source: DiscoverySource::Heuristic,
        };
        self.validate(schema, sample)
    }

    /// Drop mapped columns the file does not have and complete the mapping.
    ///
    /// A dated kind without any usable date column is rejected.
    fn validate(&self, mut schema: DiscoveredSchema, sample: &SchemaSample) -> Option<DiscoveredSchema> {
        let resolve = |name: &str| -> Option<String> {
            sample
                .columns
                .iter()
                .find(|c| c.as_str() == name)
                .or_else(|| sample.columns.iter().find(|c| c.eq_ignore_ascii_case(name)))
                .cloned()
        };

        let allowed = schema.kind.fields();
        schema.mapping.fields = schema
            .mapping
            .fields
            .iter()
            .filter(|(field, _)| allowed.contains(field))
            .filter_map(|(field, column)| resolve(column).map(|c| (*field, c)))
            .collect();
        schema.mapping.date_column = schema.mapping.date_column.as_deref().and_then(resolve);

        let fallback = match_columns(schema.kind, &sample.columns);
        if schema.mapping.date_column.is_none() {
            schema.mapping.date_column = fallback.date_column;
        }
        for (field, column) in fallback.fields {
            let taken = schema.mapping.fields.values().any(|c| *c == column)
                || schema.mapping.date_column.as_deref() == Some(column.as_str());
            if !taken {
                schema.mapping.fields.entry(field).or_insert(column);
            }
        }

        if schema.kind.requires_date() && schema.mapping.date_column.is_none() {
            warn!(file = %sample.file_name, kind = %schema.kind, "No date column found; skipping file");
            return None;
        }

        Some(schema)
    }

    fn build_prompt(&self, sample: &SchemaSample, platform: Platform) -> String {
        let columns: Vec<&str> = sample
            .columns
            .iter()
            .take(self.max_columns)
            .map(String::as_str)
            .collect();

        let mut tags: Vec<&str> = FileKind::for_platform(platform)
            .iter()
            .map(FileKind::tag)
            .collect();
        tags.push(FileKind::Other.tag());

        let mut prompt = String::new();
        prompt.push_str(&format!("Platform: {}\n", platform));
        prompt.push_str(&format!("File: {}\n", sample.file_name));
        prompt.push_str(&format!("Allowed file types: {}\n\n", tags.join(", ")));

        prompt.push_str("Target fields per file type:\n");
        for kind in FileKind::for_platform(platform) {
            let fields: Vec<&str> = kind.fields().iter().map(Field::key).collect();
            let fields = if fields.is_empty() {
                "(date only, stored as raw records)".to_string()
            } else {
                fields.join(", ")
            };
            prompt.push_str(&format!("- {}: {}\n", kind.tag(), fields));
        }

        prompt.push_str(&format!(
            "\nColumns: {}\n",
            serde_json::to_string(&columns).unwrap_or_default()
        ));

        prompt.push_str("\nSample rows:\n");
        for row in sample.rows.iter().take(self.max_rows) {
            let cells: Vec<String> = row
                .iter()
                .take(self.max_columns)
                .map(|cell| truncate_cell(cell))
                .collect();
            prompt.push_str(&cells.join(" | "));
            prompt.push('\n');
        }

        prompt.push_str(
            "\nReturn JSON exactly like: {\"file_type\": \"<allowed file type>\", \
\"date_column\": \"<column or null>\", \"date_format\": \"<strftime format such as %m/%d/%Y, or null>\", \
\"mapping\": {\"<target field>\": \"<source column>\"}}\n\
Use only column names from the list above. Use \"other\" if the file fits none of the types.",
        );
        prompt
    }
}

fn truncate_cell(cell: &str) -> String {
    if cell.chars().count() <= MAX_CELL_CHARS {
        cell.to_string()
    } else {
        cell.chars().take(MAX_CELL_CHARS).collect()
    }
}

fn answer_to_schema(answer: DiscoveryAnswer, platform: Platform) -> DiscoveredSchema {
    let kind = FileKind::from_tag(platform, &answer.file_type);

    let fields = answer
        .mapping
        .into_iter()
        .filter_map(|(key, value)| {
            let field = Field::from_key(&key)?;
            let column = value.as_str()?.trim();
            (!column.is_empty()).then(|| (field, column.to_string()))
        })
        .collect();

    let non_empty = |s: Option<String>| s.filter(|s| !s.trim().is_empty() && s != "null");

    DiscoveredSchema {
        kind,
        mapping: FieldMapping {
            date_column: non_empty(answer.date_column),
            date_format: non_empty(answer.date_format),
            fields,
        },
        source: DiscoverySource::Llm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{handle, FailingClient, FixedClient, ScriptedClient};
    use std::sync::Arc;

    fn linkedin_sample() -> SchemaSample {
        SchemaSample {
            file_name: "company_content_2025.csv".to_string(),
            columns: vec![
                "Date".to_string(),
                "Impressions (organic)".to_string(),
                "Impressions (total)".to_string(),
                "Clicks (total)".to_string(),
                "Reactions (total)".to_string(),
                "Engagement rate (total)".to_string(),
            ],
            rows: vec![vec![
                "01/02/2025".to_string(),
                "100".to_string(),
                "120".to_string(),
                "4".to_string(),
                "6".to_string(),
                "4.50%".to_string(),
            ]],
        }
    }

    #[test]
    fn test_from_tag_closed_set() {
        assert_eq!(
            FileKind::from_tag(Platform::LinkedIn, "Followers"),
            FileKind::LinkedInFollowers
        );
        assert_eq!(
            FileKind::from_tag(Platform::Instagram, "audience insights"),
            FileKind::InstagramAudienceInsights
        );
        // A valid tag of another platform is not accepted
        assert_eq!(FileKind::from_tag(Platform::Website, "followers"), FileKind::Other);
        assert_eq!(FileKind::from_tag(Platform::Website, "spreadsheet"), FileKind::Other);
    }

    #[tokio::test]
    async fn test_llm_mapping_is_validated() {
        let answer = r#"```json
{"file_type": "content", "date_column": "Date", "date_format": "%m/%d/%Y",
 "mapping": {"impressions": "Impressions (total)", "clicks": "Clicks (total)",
             "reactions": "Made up column", "likes": "Reactions (total)"}}
```"#;
        let llm = handle(Arc::new(FixedClient::new(answer)));
        let discovery = SchemaDiscovery::default();

        let schema = discovery
            .classify(&linkedin_sample(), Platform::LinkedIn, &llm)
            .await
            .unwrap();

        assert_eq!(schema.kind, FileKind::LinkedInContent);
        assert_eq!(schema.source, DiscoverySource::Llm);
        assert_eq!(schema.mapping.date_format.as_deref(), Some("%m/%d/%Y"));
        assert_eq!(schema.mapping.column(Field::Impressions), Some("Impressions (total)"));
        // Invented column replaced by the heuristic match; foreign field dropped
        assert_eq!(schema.mapping.column(Field::Reactions), Some("Reactions (total)"));
        assert_eq!(schema.mapping.column(Field::Likes), None);
        assert_eq!(
            schema.mapping.column(Field::EngagementRate),
            Some("Engagement rate (total)")
        );
    }

    #[tokio::test]
    async fn test_other_tag_skips_file() {
        let llm = handle(Arc::new(FixedClient::new(r#"{"file_type": "other"}"#)));
        let discovery = SchemaDiscovery::default();

        let schema = discovery
            .classify(&linkedin_sample(), Platform::LinkedIn, &llm)
            .await;

        assert!(schema.is_none());
    }

    #[tokio::test]
    async fn test_failed_call_falls_back_to_heuristics() {
        let llm = handle(Arc::new(FailingClient));
        let discovery = SchemaDiscovery::default();

        let schema = discovery
            .classify(&linkedin_sample(), Platform::LinkedIn, &llm)
            .await
            .unwrap();

        assert_eq!(schema.kind, FileKind::LinkedInContent);
        assert_eq!(schema.source, DiscoverySource::Heuristic);
        assert_eq!(schema.mapping.date_column.as_deref(), Some("Date"));
        assert_eq!(schema.mapping.column(Field::Impressions), Some("Impressions (total)"));
    }

    #[tokio::test]
    async fn test_unparseable_answer_falls_back() {
        let llm = handle(Arc::new(FixedClient::new("Sorry, I can't tell.")));
        let discovery = SchemaDiscovery::default();

        let schema = discovery
            .classify(&linkedin_sample(), Platform::LinkedIn, &llm)
            .await
            .unwrap();

        assert_eq!(schema.source, DiscoverySource::Heuristic);
    }

    #[tokio::test]
    async fn test_prompt_is_bounded() {
        let client = Arc::new(ScriptedClient::new().rule("Platform", r#"{"file_type": "traffic"}"#));
        let llm = handle(client.clone());
        let discovery = SchemaDiscovery::default();

        let mut columns: Vec<String> = (0..40).map(|i| format!("col_{i}")).collect();
        columns[0] = "Date".to_string();
        let long_cell = "x".repeat(500);
        let sample = SchemaSample {
            file_name: "traffic.csv".to_string(),
            columns: columns.clone(),
            rows: (0..10).map(|_| vec![long_cell.clone(); 40]).collect(),
        };

        discovery.discover(&sample, Platform::Website, &llm).await;

        let prompt = &client.prompts()[0];
        assert!(prompt.contains("col_24"));
        assert!(!prompt.contains("col_25"));
        assert!(!prompt.contains(&"x".repeat(61)));
        let sample_lines = prompt.lines().filter(|l| l.starts_with("xxx")).count();
        assert_eq!(sample_lines, 5);
    }

    #[test]
    fn test_dated_kind_without_date_is_rejected() {
        let discovery = SchemaDiscovery::default();
        let sample = SchemaSample {
            file_name: "content.csv".to_string(),
            columns: vec!["Impressions".to_string(), "Clicks".to_string()],
            rows: vec![],
        };
        assert!(discovery.heuristic(&sample, Platform::LinkedIn).is_none());
    }
}

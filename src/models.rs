//! Data models for the analytics pipeline.
//!
//! This module contains the normalized records produced by ingestion,
//! the insights produced by the agents, and the execution envelopes
//! the orchestrator uses to track each stage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Source platform of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    LinkedIn,
    Instagram,
    Website,
}

impl Platform {
    /// All platforms in pipeline order.
    pub const ALL: [Platform; 3] = [Platform::LinkedIn, Platform::Instagram, Platform::Website];

    /// Lowercase key used in directory names and summaries.
    pub fn key(&self) -> &'static str {
        match self {
            Platform::LinkedIn => "linkedin",
            Platform::Instagram => "instagram",
            Platform::Website => "website",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::LinkedIn => write!(f, "LinkedIn"),
            Platform::Instagram => write!(f, "Instagram"),
            Platform::Website => write!(f, "Website"),
        }
    }
}

/// Daily LinkedIn content metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedInMetric {
    pub date: NaiveDate,
    pub impressions: u64,
    pub clicks: u64,
    pub reactions: u64,
    /// Engagement rate in `[0, 1]`.
    pub engagement_rate: f64,
}

/// Instagram post or daily metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstagramMetric {
    pub date: NaiveDate,
    pub impressions: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    /// Engagement rate in `[0, 1]`.
    pub engagement_rate: f64,
}

/// Daily website traffic metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebsiteMetric {
    pub date: NaiveDate,
    pub page_views: u64,
    pub unique_visitors: u64,
    /// Bounce rate in `[0, 1]`.
    pub bounce_rate: f64,
}

/// LinkedIn follower counts. Keeps the source row for the Q&A feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedInFollowersMetric {
    pub date: NaiveDate,
    pub sponsored_followers: u64,
    pub organic_followers: u64,
    pub total_followers: u64,
    pub raw: BTreeMap<String, String>,
}

/// LinkedIn page visitor counts. Keeps the source row for the Q&A feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedInVisitorsMetric {
    pub date: NaiveDate,
    pub page_views: u64,
    pub unique_visitors: u64,
    pub raw: BTreeMap<String, String>,
}

/// Kind of an untyped export payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    AudienceInsights,
    ContentInteractions,
    LiveVideos,
    ProfilesReached,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKind::AudienceInsights => write!(f, "Audience Insights"),
            PayloadKind::ContentInteractions => write!(f, "Content Interactions"),
            PayloadKind::LiveVideos => write!(f, "Live Videos"),
            PayloadKind::ProfilesReached => write!(f, "Profiles Reached"),
        }
    }
}

/// An export whose schema is not modeled: a kind tag plus the opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub kind: PayloadKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// Confidence level of an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Derive confidence from the number of records an analysis used.
    ///
    /// Monotonic: a larger sample never yields a lower level.
    pub fn from_sample_size(n: usize) -> Self {
        if n < 10 {
            Confidence::Low
        } else if n < 20 {
            Confidence::Medium
        } else {
            Confidence::High
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "Low"),
            Confidence::Medium => write!(f, "Medium"),
            Confidence::High => write!(f, "High"),
        }
    }
}

/// One structured unit of narrative analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// Short title of the analysis.
    pub title: String,
    /// Plain-text explanation. Never contains markup.
    pub summary: String,
    /// Numeric justification.
    pub metric_basis: String,
    /// Period the analysis covers.
    pub time_range: String,
    /// Confidence derived from sample size.
    pub confidence: Confidence,
    /// Provenance of the numbers.
    pub evidence: Vec<String>,
    /// Suggested action.
    pub recommendation: String,
}

/// Normalized data for one run.
///
/// Each ingestion instance fills only its own platform's lists; the
/// orchestrator combines partial stores with [`DataStore::merge_platform`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataStore {
    pub linkedin_metrics: Vec<LinkedInMetric>,
    pub linkedin_followers: Vec<LinkedInFollowersMetric>,
    pub linkedin_visitors: Vec<LinkedInVisitorsMetric>,
    pub instagram_metrics: Vec<InstagramMetric>,
    pub instagram_payloads: Vec<RawRecord>,
    pub website_metrics: Vec<WebsiteMetric>,
    pub competitors: Vec<String>,
}

impl DataStore {
    /// Copy the lists owned by `platform` from a partial store.
    ///
    /// Lists belonging to other platforms in `partial` are ignored.
    pub fn merge_platform(&mut self, platform: Platform, partial: DataStore) {
        match platform {
            Platform::LinkedIn => {
                self.linkedin_metrics.extend(partial.linkedin_metrics);
                self.linkedin_followers.extend(partial.linkedin_followers);
                self.linkedin_visitors.extend(partial.linkedin_visitors);
            }
            Platform::Instagram => {
                self.instagram_metrics.extend(partial.instagram_metrics);
                self.instagram_payloads.extend(partial.instagram_payloads);
            }
            Platform::Website => {
                self.website_metrics.extend(partial.website_metrics);
            }
        }

        for name in partial.competitors {
            if !self.competitors.contains(&name) {
                self.competitors.push(name);
            }
        }
    }

    /// Number of primary metric records for a platform.
    pub fn metric_count(&self, platform: Platform) -> usize {
        match platform {
            Platform::LinkedIn => self.linkedin_metrics.len(),
            Platform::Instagram => self.instagram_metrics.len(),
            Platform::Website => self.website_metrics.len(),
        }
    }

    /// Number of all records (primary and secondary) for a platform.
    pub fn record_count(&self, platform: Platform) -> usize {
        match platform {
            Platform::LinkedIn => {
                self.linkedin_metrics.len()
                    + self.linkedin_followers.len()
                    + self.linkedin_visitors.len()
            }
            Platform::Instagram => self.instagram_metrics.len() + self.instagram_payloads.len(),
            Platform::Website => self.website_metrics.len(),
        }
    }

    /// True when no platform has any record.
    pub fn is_empty(&self) -> bool {
        Platform::ALL.iter().all(|p| self.record_count(*p) == 0)
    }

    /// Untyped Instagram payloads of one kind.
    pub fn payloads_of(&self, kind: PayloadKind) -> impl Iterator<Item = &RawRecord> {
        self.instagram_payloads.iter().filter(move |r| r.kind == kind)
    }
}

/// Execution status of a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "pending"),
            StageStatus::Running => write!(f, "running"),
            StageStatus::Success => write!(f, "success"),
            StageStatus::Failed => write!(f, "failed"),
            StageStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Execution envelope for one pipeline stage.
#[derive(Debug, Clone)]
pub struct AgentResult<T> {
    pub agent_name: String,
    pub status: StageStatus,
    pub result: Option<T>,
    pub error: Option<String>,
    pub duration: Duration,
}

impl<T> AgentResult<T> {
    /// A stage that completed.
    pub fn success(agent_name: impl Into<String>, result: T, duration: Duration) -> Self {
        Self {
            agent_name: agent_name.into(),
            status: StageStatus::Success,
            result: Some(result),
            error: None,
            duration,
        }
    }

    /// A stage that failed. The message is truncated.
    pub fn failed(agent_name: impl Into<String>, error: &str, duration: Duration) -> Self {
        Self {
            agent_name: agent_name.into(),
            status: StageStatus::Failed,
            result: None,
            error: Some(truncate_message(error, MAX_ERROR_CHARS)),
            duration,
        }
    }

    /// A stage that was not run.
    pub fn skipped(agent_name: impl Into<String>, reason: &str) -> Self {
        Self {
            agent_name: agent_name.into(),
            status: StageStatus::Skipped,
            result: None,
            error: Some(reason.to_string()),
            duration: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }
}

/// Longest error message kept in a stage envelope.
pub const MAX_ERROR_CHARS: usize = 200;

/// Truncate on a character boundary, marking the cut with an ellipsis.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let mut out: String = message.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn linkedin(d: u32) -> LinkedInMetric {
        LinkedInMetric {
            date: day(d),
            impressions: 100,
            clicks: 5,
            reactions: 3,
            engagement_rate: 0.05,
        }
    }

    #[test]
    fn test_confidence_thresholds() {
        assert_eq!(Confidence::from_sample_size(0), Confidence::Low);
        assert_eq!(Confidence::from_sample_size(9), Confidence::Low);
        assert_eq!(Confidence::from_sample_size(10), Confidence::Medium);
        assert_eq!(Confidence::from_sample_size(19), Confidence::Medium);
        assert_eq!(Confidence::from_sample_size(20), Confidence::High);
    }

    #[test]
    fn test_confidence_is_monotonic() {
        let mut previous = Confidence::from_sample_size(0);
        for n in 1..200 {
            let current = Confidence::from_sample_size(n);
            assert!(current >= previous, "confidence dropped at n={}", n);
            previous = current;
        }
    }

    #[test]
    fn test_merge_ignores_other_platform_lists() {
        let mut partial = DataStore::default();
        partial.linkedin_metrics.push(linkedin(1));
        partial.website_metrics.push(WebsiteMetric {
            date: day(1),
            page_views: 10,
            unique_visitors: 5,
            bounce_rate: 0.4,
        });

        let mut merged = DataStore::default();
        merged.merge_platform(Platform::LinkedIn, partial);

        assert_eq!(merged.linkedin_metrics.len(), 1);
        assert!(merged.website_metrics.is_empty());
    }

    #[test]
    fn test_merge_keeps_duplicate_dates_and_dedups_competitors() {
        let mut a = DataStore::default();
        a.linkedin_metrics.push(linkedin(1));
        a.competitors.push("Acme".to_string());
        let mut b = DataStore::default();
        b.linkedin_metrics.push(linkedin(1));
        b.competitors.push("Acme".to_string());
        b.competitors.push("Globex".to_string());

        let mut merged = DataStore::default();
        merged.merge_platform(Platform::LinkedIn, a);
        merged.merge_platform(Platform::LinkedIn, b);

        assert_eq!(merged.linkedin_metrics.len(), 2);
        assert_eq!(merged.competitors, vec!["Acme", "Globex"]);
    }

    #[test]
    fn test_store_counts() {
        let mut store = DataStore::default();
        assert!(store.is_empty());
        store.instagram_payloads.push(RawRecord {
            kind: PayloadKind::LiveVideos,
            date: None,
            payload: serde_json::Map::new(),
        });
        assert!(!store.is_empty());
        assert_eq!(store.metric_count(Platform::Instagram), 0);
        assert_eq!(store.record_count(Platform::Instagram), 1);
        assert_eq!(store.payloads_of(PayloadKind::LiveVideos).count(), 1);
        assert_eq!(store.payloads_of(PayloadKind::AudienceInsights).count(), 0);
    }

    #[test]
    fn test_failed_result_truncates_error() {
        let long = "x".repeat(500);
        let result: AgentResult<()> = AgentResult::failed("Agent", &long, Duration::ZERO);
        assert_eq!(result.status, StageStatus::Failed);
        assert_eq!(result.error.unwrap().chars().count(), MAX_ERROR_CHARS + 1);
    }

    #[test]
    fn test_platform_display_and_key() {
        assert_eq!(Platform::LinkedIn.to_string(), "LinkedIn");
        assert_eq!(Platform::Website.key(), "website");
    }
}

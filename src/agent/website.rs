//! Website analyses: traffic quality and visitor engagement.

use super::narrate::{narrate, Brief, Facts, Narration};
use super::{build_insight, PlatformAgent};
use crate::analysis::stats::{self, last_n, mean_of, sorted_by_date};
use crate::llm::CallType;
use crate::models::{DataStore, Insight, Platform, WebsiteMetric};
use crate::orchestrator::RunContext;
use anyhow::Result;
use async_trait::async_trait;

const ROLE: &str = "You are a website analytics specialist.";

pub const QUALITY_MIN_RECORDS: usize = 30;
pub const DEPTH_MIN_RECORDS: usize = 14;

/// Traffic quality bands by bounce rate.
pub fn quality_level(bounce_rate: f64) -> &'static str {
    if bounce_rate > 0.7 {
        "Poor"
    } else if bounce_rate > 0.5 {
        "Fair"
    } else {
        "Good"
    }
}

/// Engagement depth bands by pages per visitor.
pub fn depth_level(pages_per_visitor: f64) -> &'static str {
    if pages_per_visitor > 2.5 {
        "Strong"
    } else if pages_per_visitor > 1.5 {
        "Moderate"
    } else {
        "Weak"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrafficQuality {
    pub avg_bounce_rate: f64,
    pub avg_page_views: f64,
    /// `(1 - bounce) * views / 1000`.
    pub quality_score: f64,
    pub level: &'static str,
    pub records: usize,
    pub time_range: String,
}

/// Score the last 30 records; `None` below [`QUALITY_MIN_RECORDS`].
pub fn traffic_quality(metrics: &[WebsiteMetric]) -> Option<TrafficQuality> {
    if metrics.len() < QUALITY_MIN_RECORDS {
        return None;
    }
    let sorted = sorted_by_date(metrics);
    let window = last_n(&sorted, QUALITY_MIN_RECORDS);

    let avg_bounce_rate = mean_of(window, |m| m.bounce_rate);
    let avg_page_views = mean_of(window, |m| m.page_views as f64);

    Some(TrafficQuality {
        avg_bounce_rate,
        avg_page_views,
        quality_score: (1.0 - avg_bounce_rate) * avg_page_views / 1000.0,
        level: quality_level(avg_bounce_rate),
        records: window.len(),
        time_range: stats::date_range(window),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisitorEngagement {
    pub pages_per_visitor: f64,
    pub level: &'static str,
    pub records: usize,
    pub time_range: String,
}

/// Pages per visitor over the last 14 records; `None` below [`DEPTH_MIN_RECORDS`].
pub fn visitor_engagement(metrics: &[WebsiteMetric]) -> Option<VisitorEngagement> {
    if metrics.len() < DEPTH_MIN_RECORDS {
        return None;
    }
    let sorted = sorted_by_date(metrics);
    let window = last_n(&sorted, DEPTH_MIN_RECORDS);
    let pages_per_visitor = mean_of(window, |m| stats::ratio(m.page_views, m.unique_visitors));

    Some(VisitorEngagement {
        pages_per_visitor,
        level: depth_level(pages_per_visitor),
        records: window.len(),
        time_range: stats::date_range(window),
    })
}

/// Website analysis agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebsiteAgent;

impl WebsiteAgent {
    pub async fn quality_insight(&self, metrics: &[WebsiteMetric], ctx: &RunContext) -> Option<Insight> {
        let quality = traffic_quality(metrics)?;

        let facts = Facts::new()
            .add("Average bounce rate (last 30 records)", format!("{:.1}%", quality.avg_bounce_rate * 100.0))
            .add("Average daily page views", format!("{:.0}", quality.avg_page_views))
            .add("Traffic quality score", format!("{:.2}", quality.quality_score))
            .add("Quality level", quality.level);

        let recommendation = match quality.level {
            "Poor" => "Rework landing pages to match the intent of incoming traffic.",
            "Fair" => "Improve landing page relevance and load time.",
            _ => "Scale the channels that bring this traffic.",
        };
        let fallback = Narration::template(
            format!(
                "Traffic quality is {}: bounce rate averaged {:.1}% on {:.0} daily page views (score {:.2}).",
                quality.level.to_lowercase(),
                quality.avg_bounce_rate * 100.0,
                quality.avg_page_views,
                quality.quality_score
            ),
            recommendation,
        );
        let brief = Brief {
            agent: self.name(),
            call_type: CallType::InsightGeneration,
            role: ROLE,
            facts: &facts,
            task: "Explain what this bounce rate and traffic volume indicate about visitor intent and landing page effectiveness.",
        };
        let narration = narrate(&ctx.llm, &brief, fallback).await;

        Some(build_insight(
            "Website: Traffic Quality",
            narration,
            format!("Bounce rate: {:.1}% ({})", quality.avg_bounce_rate * 100.0, quality.level),
            quality.time_range,
            quality.records,
            vec![format!("Website metrics, last {} records", quality.records)],
        ))
    }

    pub async fn depth_insight(&self, metrics: &[WebsiteMetric], ctx: &RunContext) -> Option<Insight> {
        let depth = visitor_engagement(metrics)?;

        let facts = Facts::new()
            .add("Pages per visitor (last 14 records)", format!("{:.2}", depth.pages_per_visitor))
            .add("Engagement depth", depth.level)
            .add("Baseline expectation", "2-3 pages per visitor");

        let recommendation = match depth.level {
            "Strong" => "Use the deep sessions to promote conversion paths.",
            _ => "Add internal linking and calls to action to boost depth.",
        };
        let fallback = Narration::template(
            format!(
                "Visitors viewed {:.2} pages each on average, a {} level of engagement against a 2-3 page baseline.",
                depth.pages_per_visitor,
                depth.level.to_lowercase()
            ),
            recommendation,
        );
        let brief = Brief {
            agent: self.name(),
            call_type: CallType::InsightGeneration,
            role: ROLE,
            facts: &facts,
            task: "Explain what this visitor behavior indicates about site navigation and content relevance.",
        };
        let narration = narrate(&ctx.llm, &brief, fallback).await;

        Some(build_insight(
            "Website: Visitor Engagement",
            narration,
            format!("{:.2} pages/visitor ({})", depth.pages_per_visitor, depth.level),
            depth.time_range,
            depth.records,
            vec!["Page views per unique visitor".to_string()],
        ))
    }
}

#[async_trait]
impl PlatformAgent for WebsiteAgent {
    fn name(&self) -> &str {
        "Website"
    }

    fn platform(&self) -> Platform {
        Platform::Website
    }

    async fn analyze(&self, store: &DataStore, ctx: &RunContext) -> Result<Vec<Insight>> {
        let metrics = &store.website_metrics;
        let mut insights = Vec::new();
        insights.extend(self.quality_insight(metrics, ctx).await);
        insights.extend(self.depth_insight(metrics, ctx).await);
        Ok(insights)
    }
}

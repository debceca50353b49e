//! Instagram analyses: discovery vs retention and format strategy.

use super::narrate::{narrate, Brief, Facts, Narration};
use super::{build_insight, PlatformAgent};
use crate::analysis::stats::{self, last_n, mean_of, sorted_by_date};
use crate::llm::CallType;
use crate::models::{DataStore, Insight, InstagramMetric, Platform};
use crate::orchestrator::RunContext;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

const ROLE: &str = "You are an Instagram marketing analyst.";

pub const MODE_MIN_RECORDS: usize = 30;
pub const FORMAT_MIN_RECORDS: usize = 20;
/// Engagement rate considered healthy on Instagram.
pub const ENGAGEMENT_BENCHMARK: f64 = 0.06;
/// Engagement rate above which a day counts as high-performing content.
pub const HIGH_ENGAGEMENT: f64 = 0.10;
const GROWTH_THRESHOLD_PCT: f64 = 5.0;
const WINDOW: usize = 30;
const EDGE_DAYS: usize = 7;

/// Whether the account is finding new people or deepening existing ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudienceMode {
    Discovery,
    Retention,
    BalancedGrowth,
    Stalled,
}

impl AudienceMode {
    pub fn classify(reach_growth_pct: f64, engagement: f64) -> Self {
        let growing = reach_growth_pct > GROWTH_THRESHOLD_PCT;
        let engaged = engagement >= ENGAGEMENT_BENCHMARK;
        match (growing, engaged) {
            (true, false) => AudienceMode::Discovery,
            (false, true) => AudienceMode::Retention,
            (true, true) => AudienceMode::BalancedGrowth,
            (false, false) => AudienceMode::Stalled,
        }
    }

    fn recommendation(&self) -> &'static str {
        match self {
            AudienceMode::Discovery => {
                "Convert new reach with stronger calls to comment and save."
            }
            AudienceMode::Retention => {
                "Extend reach with collaborations and shareable Reels."
            }
            AudienceMode::BalancedGrowth => {
                "Keep the current mix and scale the best-performing formats."
            }
            AudienceMode::Stalled => {
                "Refresh the content mix and test new formats to restart growth."
            }
        }
    }
}

impl fmt::Display for AudienceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudienceMode::Discovery => write!(f, "Discovery"),
            AudienceMode::Retention => write!(f, "Retention"),
            AudienceMode::BalancedGrowth => write!(f, "Balanced growth"),
            AudienceMode::Stalled => write!(f, "Stalled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReachVsEngagement {
    pub avg_impressions: f64,
    pub avg_engagement: f64,
    /// First week of the window vs its last week.
    pub reach_growth_pct: f64,
    pub mode: AudienceMode,
    pub records: usize,
    pub time_range: String,
}

/// Classify the last 30 records; `None` below [`MODE_MIN_RECORDS`].
pub fn reach_vs_engagement(metrics: &[InstagramMetric]) -> Option<ReachVsEngagement> {
    if metrics.len() < MODE_MIN_RECORDS {
        return None;
    }
    let sorted = sorted_by_date(metrics);
    let window = last_n(&sorted, WINDOW);

    let avg_impressions = mean_of(window, |m| m.impressions as f64);
    let avg_engagement = mean_of(window, |m| m.engagement_rate);
    let first_week = mean_of(&window[..EDGE_DAYS], |m| m.impressions as f64);
    let last_week = mean_of(&window[window.len() - EDGE_DAYS..], |m| m.impressions as f64);
    let reach_growth_pct = stats::pct_change(last_week, first_week);

    Some(ReachVsEngagement {
        avg_impressions,
        avg_engagement,
        reach_growth_pct,
        mode: AudienceMode::classify(reach_growth_pct, avg_engagement),
        records: window.len(),
        time_range: stats::date_range(window),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatSplit {
    pub high_avg: f64,
    pub low_avg: f64,
    pub high_days: usize,
    pub low_days: usize,
    /// Share of days with high-performing content, in `[0, 1]`.
    pub high_share: f64,
    pub records: usize,
    pub time_range: String,
}

/// Split days at [`HIGH_ENGAGEMENT`]; `None` below [`FORMAT_MIN_RECORDS`].
pub fn format_split(metrics: &[InstagramMetric]) -> Option<FormatSplit> {
    if metrics.len() < FORMAT_MIN_RECORDS {
        return None;
    }
    let sorted = sorted_by_date(metrics);
    let (high, low): (Vec<&InstagramMetric>, Vec<&InstagramMetric>) = sorted
        .iter()
        .partition(|m| m.engagement_rate > HIGH_ENGAGEMENT);

    Some(FormatSplit {
        high_avg: stats::mean(high.iter().map(|m| m.engagement_rate)).unwrap_or(0.0),
        low_avg: stats::mean(low.iter().map(|m| m.engagement_rate)).unwrap_or(0.0),
        high_days: high.len(),
        low_days: low.len(),
        high_share: high.len() as f64 / sorted.len() as f64,
        records: sorted.len(),
        time_range: stats::date_range(&sorted),
    })
}

/// Instagram analysis agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstagramAgent;

impl InstagramAgent {
    pub async fn mode_insight(
        &self,
        metrics: &[InstagramMetric],
        ctx: &RunContext,
    ) -> Option<Insight> {
        let result = reach_vs_engagement(metrics)?;

        let facts = Facts::new()
            .add("Average impressions (last 30 records)", format!("{:.0}", result.avg_impressions))
            .add("Average engagement rate", format!("{:.2}%", result.avg_engagement * 100.0))
            .add("Engagement benchmark", format!("{:.0}%", ENGAGEMENT_BENCHMARK * 100.0))
            .add("Reach growth, first week to last week", format!("{:+.1}%", result.reach_growth_pct))
            .add("Mode", result.mode);

        let fallback = Narration::template(
            format!(
                "Instagram is in {} mode: reach moved {:+.1}% across the window while engagement averaged {:.2}% against a {:.0}% benchmark.",
                result.mode.to_string().to_lowercase(),
                result.reach_growth_pct,
                result.avg_engagement * 100.0,
                ENGAGEMENT_BENCHMARK * 100.0
            ),
            result.mode.recommendation(),
        );
        let brief = Brief {
            agent: self.name(),
            call_type: CallType::InsightGeneration,
            role: ROLE,
            facts: &facts,
            task: "Explain whether Instagram is reaching new audiences or engaging existing ones.",
        };
        let narration = narrate(&ctx.llm, &brief, fallback).await;

        Some(build_insight(
            "Instagram: Discovery vs. Retention",
            narration,
            format!(
                "{}: engagement {:.2}%, reach {:+.1}%",
                result.mode,
                result.avg_engagement * 100.0,
                result.reach_growth_pct
            ),
            result.time_range,
            result.records,
            vec![format!("Instagram metrics, last {} records", result.records)],
        ))
    }

    pub async fn format_insight(
        &self,
        metrics: &[InstagramMetric],
        ctx: &RunContext,
    ) -> Option<Insight> {
        let split = format_split(metrics)?;

        let facts = Facts::new()
            .add(
                "High-performing days (engagement above 10%)",
                format!("{} days averaging {:.2}%", split.high_days, split.high_avg * 100.0),
            )
            .add(
                "Other days",
                format!("{} days averaging {:.2}%", split.low_days, split.low_avg * 100.0),
            )
            .add("Share of high-performing days", format!("{:.0}%", split.high_share * 100.0));

        let recommendation = if split.high_days == 0 {
            "Test short-form video to find a format that clears 10% engagement."
        } else if split.high_share < 0.5 {
            "Shift more of the content mix toward the formats behind high-engagement days."
        } else {
            "Keep the high-engagement formats as the core of the content mix."
        };
        let fallback = Narration::template(
            format!(
                "{} of {} days cleared 10% engagement (average {:.2}%), while the remaining days averaged {:.2}%.",
                split.high_days,
                split.records,
                split.high_avg * 100.0,
                split.low_avg * 100.0
            ),
            recommendation,
        );
        let brief = Brief {
            agent: self.name(),
            call_type: CallType::InsightGeneration,
            role: ROLE,
            facts: &facts,
            task: "Which Instagram content format should we prioritize?",
        };
        let narration = narrate(&ctx.llm, &brief, fallback).await;

        Some(build_insight(
            "Instagram: Format Strategy",
            narration,
            format!(
                "High-engagement days: {:.2}% avg ({} of {} days)",
                split.high_avg * 100.0,
                split.high_days,
                split.records
            ),
            split.time_range,
            split.records,
            vec!["Format inferred from daily engagement".to_string()],
        ))
    }
}

#[async_trait]
impl PlatformAgent for InstagramAgent {
    fn name(&self) -> &str {
        "Instagram"
    }

    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn analyze(&self, store: &DataStore, ctx: &RunContext) -> Result<Vec<Insight>> {
        let metrics = &store.instagram_metrics;
        let mut insights = Vec::new();
        insights.extend(self.mode_insight(metrics, ctx).await);
        insights.extend(self.format_insight(metrics, ctx).await);
        Ok(insights)
    }
}

//! LinkedIn analyses: engagement efficiency and posting cadence.

use super::narrate::{narrate, Brief, Facts, Narration};
use super::{build_insight, PlatformAgent};
use crate::analysis::stats::{self, coefficient_of_variation, mean_of, sorted_by_date, split_recent};
use crate::llm::CallType;
use crate::models::{DataStore, Insight, LinkedInMetric, Platform};
use crate::orchestrator::RunContext;
use anyhow::Result;
use async_trait::async_trait;

const ROLE: &str = "You are a LinkedIn marketing analyst.";

/// Records needed for the engagement trend.
pub const TREND_MIN_RECORDS: usize = 30;
/// Records needed for the cadence analysis.
pub const CADENCE_MIN_RECORDS: usize = 14;
const WINDOW: usize = 30;
const WEEK: usize = 7;
const MIN_DAYS_PER_WEEK: usize = 5;
const MIN_WEEKS: usize = 4;

/// Engagement in the most recent window compared with the one before.
#[derive(Debug, Clone, PartialEq)]
pub struct EngagementTrend {
    pub recent_rate: f64,
    pub previous_rate: f64,
    /// Percent change of the average engagement rate.
    pub change_pct: f64,
    /// Reactions per impression in the recent window.
    pub recent_efficiency: f64,
    pub previous_efficiency: f64,
    pub efficiency_change_pct: f64,
    pub recent_records: usize,
    pub previous_records: usize,
    pub time_range: String,
}

/// Compute the engagement trend; `None` below [`TREND_MIN_RECORDS`].
///
/// When nothing precedes the recent window it is compared with itself.
pub fn engagement_trend(metrics: &[LinkedInMetric]) -> Option<EngagementTrend> {
    if metrics.len() < TREND_MIN_RECORDS {
        return None;
    }
    let sorted = sorted_by_date(metrics);
    let (recent, previous) = split_recent(&sorted, WINDOW);
    let baseline = if previous.is_empty() { recent } else { previous };

    let efficiency = |m: &LinkedInMetric| stats::ratio(m.reactions, m.impressions);
    let recent_rate = mean_of(recent, |m| m.engagement_rate);
    let previous_rate = mean_of(baseline, |m| m.engagement_rate);
    let recent_efficiency = mean_of(recent, efficiency);
    let previous_efficiency = mean_of(baseline, efficiency);

    Some(EngagementTrend {
        recent_rate,
        previous_rate,
        change_pct: stats::pct_change(recent_rate, previous_rate),
        recent_efficiency,
        previous_efficiency,
        efficiency_change_pct: stats::pct_change(recent_efficiency, previous_efficiency),
        recent_records: recent.len(),
        previous_records: previous.len(),
        time_range: stats::date_range(recent),
    })
}

/// How steady weekly reach is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceLevel {
    Consistent,
    Variable,
    Erratic,
}

impl CadenceLevel {
    pub fn from_cv(cv: f64) -> Self {
        if cv < 0.25 {
            CadenceLevel::Consistent
        } else if cv < 0.5 {
            CadenceLevel::Variable
        } else {
            CadenceLevel::Erratic
        }
    }
}

impl std::fmt::Display for CadenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CadenceLevel::Consistent => write!(f, "Consistent"),
            CadenceLevel::Variable => write!(f, "Variable"),
            CadenceLevel::Erratic => write!(f, "Erratic"),
        }
    }
}

/// Weekly reach variation and its relation to engagement.
#[derive(Debug, Clone, PartialEq)]
pub struct PostingCadence {
    pub weeks: usize,
    pub avg_weekly_impressions: f64,
    pub coefficient_of_variation: f64,
    pub level: CadenceLevel,
    /// Average engagement in the busier half of the weeks.
    pub busy_week_engagement: f64,
    /// Average engagement in the quieter half.
    pub quiet_week_engagement: f64,
    pub records: usize,
    pub time_range: String,
}

/// Compute cadence from 7-record weeks of at least 5 records.
///
/// `None` below [`CADENCE_MIN_RECORDS`] or with fewer than 4 such weeks.
pub fn posting_cadence(metrics: &[LinkedInMetric]) -> Option<PostingCadence> {
    if metrics.len() < CADENCE_MIN_RECORDS {
        return None;
    }
    let sorted = sorted_by_date(metrics);

    // (total impressions, average engagement) per week
    let weeks: Vec<(f64, f64)> = sorted
        .chunks(WEEK)
        .filter(|week| week.len() >= MIN_DAYS_PER_WEEK)
        .map(|week| {
            let impressions = week.iter().fold(0u64, |acc, m| acc.saturating_add(m.impressions));
            (impressions as f64, mean_of(week, |m| m.engagement_rate))
        })
        .collect();
    if weeks.len() < MIN_WEEKS {
        return None;
    }

    let totals: Vec<f64> = weeks.iter().map(|(impressions, _)| *impressions).collect();
    let cv = coefficient_of_variation(&totals).unwrap_or(0.0);

    let mut by_reach = weeks.clone();
    by_reach.sort_by(|a, b| b.0.total_cmp(&a.0));
    let half = by_reach.len() / 2;
    let busy = &by_reach[..half];
    let quiet = &by_reach[by_reach.len() - half..];

    Some(PostingCadence {
        weeks: weeks.len(),
        avg_weekly_impressions: stats::mean(totals.iter().copied()).unwrap_or(0.0),
        coefficient_of_variation: cv,
        level: CadenceLevel::from_cv(cv),
        busy_week_engagement: mean_of(busy, |w| w.1),
        quiet_week_engagement: mean_of(quiet, |w| w.1),
        records: sorted.len(),
        time_range: stats::date_range(&sorted),
    })
}

/// LinkedIn analysis agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkedInAgent;

impl LinkedInAgent {
    pub async fn engagement_insight(
        &self,
        metrics: &[LinkedInMetric],
        ctx: &RunContext,
    ) -> Option<Insight> {
        let trend = engagement_trend(metrics)?;

        let facts = Facts::new()
            .add(
                "Average engagement rate (recent 30 records)",
                format!("{:.1}%", trend.recent_rate * 100.0),
            )
            .add(
                "Average engagement rate (previous period)",
                format!("{:.1}%", trend.previous_rate * 100.0),
            )
            .add("Change in engagement rate", format!("{:+.1}%", trend.change_pct))
            .add(
                "Reactions per impression (recent)",
                format!("{:.2}%", trend.recent_efficiency * 100.0),
            )
            .add(
                "Reactions per impression change",
                format!("{:+.1}%", trend.efficiency_change_pct),
            );

        let direction = if trend.change_pct > 5.0 {
            "improved"
        } else if trend.change_pct < -5.0 {
            "declined"
        } else {
            "held steady"
        };
        let recommendation = match direction {
            "improved" => "Keep the current content mix and test a higher posting volume.",
            "declined" => "Review recent posts for topic fit before increasing volume.",
            _ => "Test one new content format to lift engagement.",
        };
        let fallback = Narration::template(
            format!(
                "LinkedIn engagement {} at {:.1}% over the last {} records ({:+.1}% vs the previous period). Reactions per impression were {:.2}%.",
                direction,
                trend.recent_rate * 100.0,
                trend.recent_records,
                trend.change_pct,
                trend.recent_efficiency * 100.0
            ),
            recommendation,
        );

        let brief = Brief {
            agent: self.name(),
            call_type: CallType::InsightGeneration,
            role: ROLE,
            facts: &facts,
            task: "Summarize the LinkedIn engagement trend and recommend next steps.",
        };
        let narration = narrate(&ctx.llm, &brief, fallback).await;

        Some(build_insight(
            "LinkedIn: Engagement Efficiency",
            narration,
            format!(
                "Avg engagement rate: {:.1}% ({:+.1}% vs previous period)",
                trend.recent_rate * 100.0,
                trend.change_pct
            ),
            trend.time_range,
            trend.recent_records,
            vec![
                format!("LinkedIn content metrics, last {} records", trend.recent_records),
                format!("Comparison window: {} records", trend.previous_records),
            ],
        ))
    }

    pub async fn cadence_insight(
        &self,
        metrics: &[LinkedInMetric],
        ctx: &RunContext,
    ) -> Option<Insight> {
        let cadence = posting_cadence(metrics)?;

        let facts = Facts::new()
            .add("Weeks analyzed", cadence.weeks)
            .add("Average weekly impressions", format!("{:.0}", cadence.avg_weekly_impressions))
            .add(
                "Variation of weekly impressions (CV)",
                format!("{:.2}", cadence.coefficient_of_variation),
            )
            .add("Cadence", cadence.level)
            .add(
                "Engagement in busier weeks",
                format!("{:.1}%", cadence.busy_week_engagement * 100.0),
            )
            .add(
                "Engagement in quieter weeks",
                format!("{:.1}%", cadence.quiet_week_engagement * 100.0),
            );

        let recommendation = match cadence.level {
            CadenceLevel::Consistent if cadence.busy_week_engagement < cadence.quiet_week_engagement => {
                "Keep the steady cadence but favor fewer, stronger posts; busier weeks engage less."
            }
            CadenceLevel::Consistent => "Keep the steady cadence and test 3-4 posts per week against daily posting.",
            CadenceLevel::Variable | CadenceLevel::Erratic => {
                "Plan posts on a fixed weekly calendar to reduce swings in reach."
            }
        };
        let fallback = Narration::template(
            format!(
                "Weekly LinkedIn reach is {} across {} weeks (CV {:.2}). Busier weeks averaged {:.1}% engagement vs {:.1}% in quieter weeks.",
                cadence.level.to_string().to_lowercase(),
                cadence.weeks,
                cadence.coefficient_of_variation,
                cadence.busy_week_engagement * 100.0,
                cadence.quiet_week_engagement * 100.0
            ),
            recommendation,
        );

        let brief = Brief {
            agent: self.name(),
            call_type: CallType::InsightGeneration,
            role: ROLE,
            facts: &facts,
            task: "What is the optimal LinkedIn posting cadence based on this engagement data?",
        };
        let narration = narrate(&ctx.llm, &brief, fallback).await;

        Some(build_insight(
            "LinkedIn: Posting Cadence",
            narration,
            format!(
                "{} cadence, CV {:.2} over {} weeks",
                cadence.level, cadence.coefficient_of_variation, cadence.weeks
            ),
            cadence.time_range,
            cadence.records,
            vec!["Weekly aggregation of LinkedIn content metrics".to_string()],
        ))
    }
}

#[async_trait]
impl PlatformAgent for LinkedInAgent {
    fn name(&self) -> &str {
        "LinkedIn"
    }

    fn platform(&self) -> Platform {
        Platform::LinkedIn
    }

    async fn analyze(&self, store: &DataStore, ctx: &RunContext) -> Result<Vec<Insight>> {
        let metrics = &store.linkedin_metrics;
        let mut insights = Vec::new();
        insights.extend(self.engagement_insight(metrics, ctx).await);
        insights.extend(self.cadence_insight(metrics, ctx).await);
        Ok(insights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::fixtures::linkedin_series;
    use crate::llm::testing::{handle, FailingClient, FixedClient};
    use crate::models::Confidence;
    use crate::status::Status;
    use std::sync::Arc;

    fn ctx_failing() -> RunContext {
        RunContext {
            llm: handle(Arc::new(FailingClient)),
            status: Status::silent(),
        }
    }

    #[test]
    fn test_trend_gate_at_thirty() {
        let flat = |_| (1000, 30, 0.045);
        assert!(engagement_trend(&linkedin_series(29, flat)).is_none());
        assert!(engagement_trend(&linkedin_series(30, flat)).is_some());
    }

    #[test]
    fn test_trend_compares_windows() {
        let metrics = linkedin_series(60, |i| {
            if i < 30 {
                (1000, 20, 0.04)
            } else {
                (1000, 30, 0.05)
            }
        });
        let trend = engagement_trend(&metrics).unwrap();
        assert!((trend.recent_rate - 0.05).abs() < 1e-9);
        assert!((trend.previous_rate - 0.04).abs() < 1e-9);
        assert!((trend.change_pct - 25.0).abs() < 1e-6);
        assert!((trend.efficiency_change_pct - 50.0).abs() < 1e-6);
        assert_eq!(trend.time_range, "2025-01-31 to 2025-03-01");
    }

    #[test]
    fn test_trend_without_history_compares_with_itself() {
        let trend = engagement_trend(&linkedin_series(30, |_| (0, 0, 0.03))).unwrap();
        assert_eq!(trend.change_pct, 0.0);
        assert_eq!(trend.recent_efficiency, 0.0);
        assert_eq!(trend.previous_records, 0);
    }

    #[test]
    fn test_cadence_levels() {
        assert_eq!(CadenceLevel::from_cv(0.1), CadenceLevel::Consistent);
        assert_eq!(CadenceLevel::from_cv(0.25), CadenceLevel::Variable);
        assert_eq!(CadenceLevel::from_cv(0.5), CadenceLevel::Erratic);
    }

    #[test]
    fn test_cadence_needs_four_full_weeks() {
        // 13 records: below the gate
        assert!(posting_cadence(&linkedin_series(13, |_| (100, 1, 0.02))).is_none());
        // 3 full weeks + 4 stragglers: only 3 usable weeks
        assert!(posting_cadence(&linkedin_series(25, |_| (100, 1, 0.02))).is_none());
        let cadence = posting_cadence(&linkedin_series(28, |_| (100, 1, 0.02))).unwrap();
        assert_eq!(cadence.weeks, 4);
        assert_eq!(cadence.level, CadenceLevel::Consistent);
        assert_eq!(cadence.coefficient_of_variation, 0.0);
    }

    #[test]
    fn test_cadence_splits_busy_and_quiet_weeks() {
        let metrics = linkedin_series(28, |i| {
            if (i / 7) % 2 == 0 {
                (1000, 10, 0.02)
            } else {
                (100, 10, 0.06)
            }
        });
        let cadence = posting_cadence(&metrics).unwrap();
        assert_eq!(cadence.level, CadenceLevel::Erratic);
        assert!((cadence.busy_week_engagement - 0.02).abs() < 1e-9);
        assert!((cadence.quiet_week_engagement - 0.06).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_forty_five_days_at_four_point_five_percent() {
        let metrics = linkedin_series(45, |_| (1000, 45, 0.045));
        let insight = LinkedInAgent
            .engagement_insight(&metrics, &ctx_failing())
            .await
            .unwrap();

        assert_eq!(insight.confidence, Confidence::High);
        assert!(insight.metric_basis.contains("4.5%"), "{}", insight.metric_basis);
        assert!(insight.summary.contains("4.5%"));
        assert!(!insight.recommendation.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_uses_sanitized_model_text() {
        let ctx = RunContext {
            llm: handle(Arc::new(FixedClient::new(
                "**Summary:** Engagement is <b>healthy</b>.\nRecommendation: Post on Tuesdays.",
            ))),
            status: Status::silent(),
        };
        let mut store = DataStore::default();
        store.linkedin_metrics = linkedin_series(35, |i| (1000 + i as u64, 40, 0.04));

        let insights = LinkedInAgent.analyze(&store, &ctx).await.unwrap();

        assert_eq!(insights.len(), 2);
        assert_eq!(insights[0].summary, "Engagement is healthy.");
        assert_eq!(insights[1].recommendation, "Post on Tuesdays.");
    }

    #[tokio::test]
    async fn test_analyze_below_gates_is_empty() {
        let mut store = DataStore::default();
        store.linkedin_metrics = linkedin_series(10, |_| (1000, 40, 0.04));
        assert!(LinkedInAgent.analyze(&store, &ctx_failing()).await.unwrap().is_empty());
    }
}

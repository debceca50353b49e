//! Cross-platform executive synthesis.
//!
//! Answers four questions from the merged store and the platform
//! insights: are we growing, where is the leakage, which platform
//! deserves attention, and what should we do next. Missing platforms
//! simply drop out of each comparison.

use super::narrate::{narrate, Brief, Facts, Narration};
use super::sanitize::sanitize;
use super::build_insight;
use crate::analysis::stats::{self, last_n, mean_of, sorted_by_date, thirty_day_growth};
use crate::llm::CallType;
use crate::models::{DataStore, Insight, Platform};
use crate::orchestrator::RunContext;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

const AGENT: &str = "Strategy";
const ROLE: &str = "You are a C-suite strategy advisor.";

/// Records a platform needs to enter the growth comparison.
pub const GROWTH_MIN_RECORDS: usize = 60;
/// Records a platform needs to enter the leakage comparison.
pub const LEAKAGE_MIN_RECORDS: usize = 5;
/// Records a platform needs to be scored for prioritization.
pub const PRIORITY_MIN_RECORDS: usize = 30;
/// Platform recommendations fed into the synthesis.
pub const MAX_SYNTHESIS_ITEMS: usize = 8;

pub const LINKEDIN_ENGAGEMENT_BENCHMARK: f64 = 0.03;
pub const INSTAGRAM_ENGAGEMENT_BENCHMARK: f64 = 0.06;
pub const WEBSITE_BOUNCE_BENCHMARK: f64 = 0.5;

static NUMBERING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\s*[.)]\s*").expect("valid regex"));

/// 30-day growth of each platform's reach metric.
pub fn growth_rates(store: &DataStore) -> BTreeMap<Platform, f64> {
    let mut rates = BTreeMap::new();
    let linkedin = sorted_by_date(&store.linkedin_metrics);
    if let Some(g) = thirty_day_growth(&linkedin, |m| m.impressions as f64) {
        rates.insert(Platform::LinkedIn, g);
    }
    let instagram = sorted_by_date(&store.instagram_metrics);
    if let Some(g) = thirty_day_growth(&instagram, |m| m.impressions as f64) {
        rates.insert(Platform::Instagram, g);
    }
    let website = sorted_by_date(&store.website_metrics);
    if let Some(g) = thirty_day_growth(&website, |m| m.page_views as f64) {
        rates.insert(Platform::Website, g);
    }
    rates
}

/// One platform's engagement health relative to its benchmark.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelHealth {
    pub platform: Platform,
    /// Engagement rate for social platforms, bounce rate for the website.
    pub metric: f64,
    pub benchmark: f64,
    /// Above 1.0 beats the benchmark.
    pub health: f64,
}

/// Health of every platform with enough records, over its last 30.
pub fn channel_health(store: &DataStore) -> Vec<ChannelHealth> {
    let mut channels = Vec::new();

    if store.linkedin_metrics.len() >= LEAKAGE_MIN_RECORDS {
        let sorted = sorted_by_date(&store.linkedin_metrics);
        let eng = mean_of(last_n(&sorted, 30), |m| m.engagement_rate);
        channels.push(ChannelHealth {
            platform: Platform::LinkedIn,
            metric: eng,
            benchmark: LINKEDIN_ENGAGEMENT_BENCHMARK,
            health: eng / LINKEDIN_ENGAGEMENT_BENCHMARK,
        });
    }
    if store.instagram_metrics.len() >= LEAKAGE_MIN_RECORDS {
        let sorted = sorted_by_date(&store.instagram_metrics);
        let eng = mean_of(last_n(&sorted, 30), |m| m.engagement_rate);
        channels.push(ChannelHealth {
            platform: Platform::Instagram,
            metric: eng,
            benchmark: INSTAGRAM_ENGAGEMENT_BENCHMARK,
            health: eng / INSTAGRAM_ENGAGEMENT_BENCHMARK,
        });
    }
    if store.website_metrics.len() >= LEAKAGE_MIN_RECORDS {
        let sorted = sorted_by_date(&store.website_metrics);
        let bounce = mean_of(last_n(&sorted, 30), |m| m.bounce_rate);
        channels.push(ChannelHealth {
            platform: Platform::Website,
            metric: bounce,
            benchmark: WEBSITE_BOUNCE_BENCHMARK,
            health: (1.0 - bounce) / (1.0 - WEBSITE_BOUNCE_BENCHMARK),
        });
    }
    channels
}

/// Composite priority scores, best first.
///
/// Social: `engagement * 10 + growth / 10`. Website:
/// `(1 - bounce) * 5 + growth / 10`. Growth is 0 without 60 records.
pub fn platform_scores(store: &DataStore) -> Vec<(Platform, f64)> {
    let growth = growth_rates(store);
    let growth_of = |p: Platform| growth.get(&p).copied().unwrap_or(0.0);
    let mut scores = Vec::new();

    if store.linkedin_metrics.len() >= PRIORITY_MIN_RECORDS {
        let sorted = sorted_by_date(&store.linkedin_metrics);
        let eng = mean_of(last_n(&sorted, 30), |m| m.engagement_rate);
        scores.push((Platform::LinkedIn, eng * 10.0 + growth_of(Platform::LinkedIn) / 10.0));
    }
    if store.instagram_metrics.len() >= PRIORITY_MIN_RECORDS {
        let sorted = sorted_by_date(&store.instagram_metrics);
        let eng = mean_of(last_n(&sorted, 30), |m| m.engagement_rate);
        scores.push((Platform::Instagram, eng * 10.0 + growth_of(Platform::Instagram) / 10.0));
    }
    if store.website_metrics.len() >= PRIORITY_MIN_RECORDS {
        let sorted = sorted_by_date(&store.website_metrics);
        let bounce = mean_of(last_n(&sorted, 30), |m| m.bounce_rate);
        scores.push((
            Platform::Website,
            (1.0 - bounce) * 5.0 + growth_of(Platform::Website) / 10.0,
        ));
    }

    // Stable sort keeps pipeline order on ties
    scores.sort_by(|a, b| b.1.total_cmp(&a.1));
    scores
}

/// `Platform: recommendation` lines from the platform insights.
pub fn collect_recommendations(platform_insights: &BTreeMap<Platform, Vec<Insight>>) -> Vec<String> {
    platform_insights
        .iter()
        .flat_map(|(platform, insights)| {
            insights
                .iter()
                .filter(|i| !i.recommendation.trim().is_empty())
                .map(move |i| format!("{}: {}", platform, i.recommendation.trim()))
        })
        .take(MAX_SYNTHESIS_ITEMS)
        .collect()
}

/// Sanitize a plan and renumber its items `1.`, `2.`, ...
pub fn numbered_plan(text: &str) -> String {
    sanitize(text)
        .lines()
        .map(|line| NUMBERING_RE.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| format!("{}. {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Executive synthesis agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyAgent;

impl StrategyAgent {
    /// Produce the executive insights. Never fails; platforms without
    /// data are left out of each comparison.
    pub async fn generate_executive_summary(
        &self,
        store: &DataStore,
        platform_insights: &BTreeMap<Platform, Vec<Insight>>,
        ctx: &RunContext,
    ) -> Vec<Insight> {
        let mut insights = Vec::new();
        insights.extend(self.growth_insight(store, ctx).await);
        insights.extend(self.leakage_insight(store, ctx).await);
        insights.extend(self.priority_insight(store, ctx).await);
        insights.extend(self.synthesis_insight(store, platform_insights, ctx).await);
        insights
    }

    async fn growth_insight(&self, store: &DataStore, ctx: &RunContext) -> Option<Insight> {
        let rates = growth_rates(store);
        if rates.is_empty() {
            return None;
        }

        let mut facts = Facts::new();
        for (platform, rate) in &rates {
            facts = facts.add(&format!("{} 30-day growth", platform), format!("{:+.1}%", rate));
        }
        let avg = stats::mean(rates.values().copied()).unwrap_or(0.0);
        let (best, best_rate) = rates
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(p, r)| (*p, *r))?;
        let verdict = if avg > 0.0 { "growing" } else if avg < 0.0 { "declining" } else { "flat" };
        facts = facts.add("Average growth", format!("{:+.1}%", avg));

        let fallback = Narration::template(
            format!(
                "Overall reach is {} ({:+.1}% average across {} platform(s)). {} leads at {:+.1}%.",
                verdict,
                avg,
                rates.len(),
                best,
                best_rate
            ),
            format!("Focus resources on {}, the highest-growth channel.", best),
        );
        let narration = self
            .narrate(ctx, &facts, "Are we growing or declining overall? Describe the trend.", fallback)
            .await;

        let sample = sample_size(store, rates.keys().copied());
        Some(build_insight(
            "Growth Trend Analysis",
            narration,
            rates
                .iter()
                .map(|(p, r)| format!("{} {:+.1}%", p, r))
                .collect::<Vec<_>>()
                .join(" | "),
            "Last 30 days vs previous 30 days".to_string(),
            sample,
            vec![format!(
                "30-day growth of {}",
                rates.keys().map(|p| p.to_string()).collect::<Vec<_>>().join(", ")
            )],
        ))
    }

    async fn leakage_insight(&self, store: &DataStore, ctx: &RunContext) -> Option<Insight> {
        let channels = channel_health(store);
        let weakest = channels
            .iter()
            .min_by(|a, b| a.health.total_cmp(&b.health))?
            .clone();

        let mut facts = Facts::new();
        for c in &channels {
            let label = match c.platform {
                Platform::Website => format!("{} bounce rate", c.platform),
                _ => format!("{} engagement rate", c.platform),
            };
            facts = facts.add(
                &label,
                format!(
                    "{:.1}% (benchmark {:.1}%, health {:.2})",
                    c.metric * 100.0,
                    c.benchmark * 100.0,
                    c.health
                ),
            );
        }
        facts = facts.add("Weakest channel", weakest.platform);

        let recommendation = match weakest.platform {
            Platform::Website => "Fix landing page relevance first to stop visitors bouncing.",
            _ => "Rework the content of the weakest channel before adding volume.",
        };
        let fallback = Narration::template(
            format!(
                "The biggest leakage is on {}: {:.1}% against a {:.1}% benchmark (health {:.2}).",
                weakest.platform,
                weakest.metric * 100.0,
                weakest.benchmark * 100.0,
                weakest.health
            ),
            recommendation,
        );
        let narration = self
            .narrate(ctx, &facts, "Where are we losing engagement? Identify the leakage points.", fallback)
            .await;

        let sample = sample_size(store, channels.iter().map(|c| c.platform)).min(30 * channels.len());
        Some(build_insight(
            "Leakage Analysis",
            narration,
            format!("Weakest channel: {} (health {:.2})", weakest.platform, weakest.health),
            "Last 30 records per platform".to_string(),
            sample,
            vec!["Engagement and bounce rates against benchmarks".to_string()],
        ))
    }

    async fn priority_insight(&self, store: &DataStore, ctx: &RunContext) -> Option<Insight> {
        let scores = platform_scores(store);
        let (top, top_score) = *scores.first()?;

        let mut facts = Facts::new();
        for (rank, (platform, score)) in scores.iter().enumerate() {
            facts = facts.add(&format!("#{} {}", rank + 1, platform), format!("score {:.2}", score));
        }

        let ranking = scores
            .iter()
            .map(|(p, s)| format!("{} ({:.2})", p, s))
            .collect::<Vec<_>>()
            .join(" > ");
        let fallback = Narration::template(
            format!(
                "{} ranks first with a composite score of {:.2}. Ranking: {}.",
                top, top_score, ranking
            ),
            format!("Allocate the largest share of effort to {}.", top),
        );
        let narration = self
            .narrate(ctx, &facts, "Which platform deserves the most attention and resources?", fallback)
            .await;

        let sample = sample_size(store, scores.iter().map(|(p, _)| *p));
        Some(build_insight(
            "Platform Prioritization",
            narration,
            format!("Top: {} ({:.2})", top, top_score),
            "Based on the last 30 records per platform".to_string(),
            sample,
            vec!["Composite score of engagement and growth".to_string()],
        ))
    }

    async fn synthesis_insight(
        &self,
        store: &DataStore,
        platform_insights: &BTreeMap<Platform, Vec<Insight>>,
        ctx: &RunContext,
    ) -> Option<Insight> {
        let recommendations = collect_recommendations(platform_insights);
        if recommendations.is_empty() {
            return None;
        }

        let facts = recommendations
            .iter()
            .enumerate()
            .fold(Facts::new(), |facts, (i, rec)| {
                facts.add(&format!("Recommendation {}", i + 1), rec)
            });
        let template_plan = numbered_plan(&recommendations.join("\n"));
        let fallback = Narration::template(
            template_plan.clone(),
            "Execute the top three actions next quarter.",
        );

        let brief = Brief {
            agent: AGENT,
            call_type: CallType::Strategy,
            role: ROLE,
            facts: &facts,
            task: "Combine these platform recommendations into a unified plan for next quarter. \
                   Put each step of the plan on its own numbered line after Summary:",
        };
        let mut narration = narrate(&ctx.llm, &brief, fallback).await;
        if narration.from_model {
            narration.summary = numbered_plan(&narration.summary);
            if narration.summary.is_empty() {
                narration.summary = template_plan;
            }
        }

        let sources = platform_insights
            .iter()
            .filter(|(_, insights)| !insights.is_empty())
            .map(|(platform, _)| *platform);
        Some(build_insight(
            "Strategic Recommendations",
            narration,
            format!("{} platform recommendations combined", recommendations.len()),
            "Next quarter".to_string(),
            sample_size(store, sources),
            vec!["Synthesis of all platform agents".to_string()],
        ))
    }

    async fn narrate(&self, ctx: &RunContext, facts: &Facts, task: &str, fallback: Narration) -> Narration {
        let brief = Brief {
            agent: AGENT,
            call_type: CallType::Strategy,
            role: ROLE,
            facts,
            task,
        };
        narrate(&ctx.llm, &brief, fallback).await
    }
}

fn sample_size(store: &DataStore, platforms: impl Iterator<Item = Platform>) -> usize {
    platforms.map(|p| store.metric_count(p)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::fixtures::{instagram_series, linkedin_series, website_series};
    use crate::agent::narrate::parse_answer;
    use crate::llm::testing::{handle, FailingClient, ScriptedClient};
    use crate::models::Confidence;
    use crate::status::Status;
    use std::sync::Arc;

    fn ctx_failing() -> RunContext {
        RunContext {
            llm: handle(Arc::new(FailingClient)),
            status: Status::silent(),
        }
    }

    fn insight(title: &str, recommendation: &str) -> Insight {
        Insight {
            title: title.to_string(),
            summary: "s".to_string(),
            metric_basis: "m".to_string(),
            time_range: "t".to_string(),
            confidence: Confidence::High,
            evidence: vec![],
            recommendation: recommendation.to_string(),
        }
    }

    fn full_store() -> DataStore {
        let mut store = DataStore::default();
        store.linkedin_metrics =
            linkedin_series(60, |i| (if i < 30 { 1000 } else { 1100 }, 30, 0.02));
        store.instagram_metrics =
            instagram_series(60, |i| (if i < 30 { 1000 } else { 1500 }, 0.07));
        store.website_metrics = website_series(60, |i| (if i < 30 { 800 } else { 720 }, 300, 0.4));
        store
    }

    #[test]
    fn test_growth_rates_need_sixty_records() {
        let mut store = full_store();
        store.website_metrics.truncate(59);
        let rates = growth_rates(&store);
        assert_eq!(rates.len(), 2);
        assert!((rates[&Platform::LinkedIn] - 10.0).abs() < 1e-6);
        assert!((rates[&Platform::Instagram] - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_leakage_flags_weakest_channel() {
        let channels = channel_health(&full_store());
        assert_eq!(channels.len(), 3);
        let weakest = channels
            .iter()
            .min_by(|a, b| a.health.total_cmp(&b.health))
            .unwrap();
        // LinkedIn 0.02 / 0.03 = 0.67, Instagram 1.17, Website 0.6 / 0.5 = 1.2
        assert_eq!(weakest.platform, Platform::LinkedIn);
    }

    #[test]
    fn test_leakage_gate() {
        let mut store = DataStore::default();
        store.website_metrics = website_series(4, |_| (1, 1, 0.9));
        assert!(channel_health(&store).is_empty());
        store.website_metrics = website_series(5, |_| (1, 1, 0.9));
        assert_eq!(channel_health(&store).len(), 1);
    }

    #[test]
    fn test_platform_scores_ranked() {
        let scores = platform_scores(&full_store());
        let order: Vec<Platform> = scores.iter().map(|(p, _)| *p).collect();
        // Instagram 0.7 + 5.0, Website 3.0 - 1.0, LinkedIn 0.2 + 1.0
        assert_eq!(order, vec![Platform::Instagram, Platform::Website, Platform::LinkedIn]);
        assert!((scores[0].1 - 5.7).abs() < 1e-6);
    }

    #[test]
    fn test_numbered_plan_renumbers() {
        let plan = numbered_plan("3) **Post** more video\n\n- Fix landing pages\n7. Reply faster");
        assert_eq!(plan, "1. Post more video\n2. Fix landing pages\n3. Reply faster");
    }

    #[test]
    fn test_collect_recommendations_caps_at_eight() {
        let mut map: BTreeMap<Platform, Vec<Insight>> = BTreeMap::new();
        map.insert(Platform::LinkedIn, (0..6).map(|i| insight("l", &format!("rec {}", i))).collect());
        map.insert(Platform::Website, (0..6).map(|i| insight("w", &format!("rec {}", i))).collect());
        let recs = collect_recommendations(&map);
        assert_eq!(recs.len(), 8);
        assert_eq!(recs[0], "LinkedIn: rec 0");
        assert_eq!(recs[7], "Website: rec 1");
    }

    #[tokio::test]
    async fn test_degraded_mode_with_only_linkedin() {
        let mut store = DataStore::default();
        store.linkedin_metrics = linkedin_series(40, |_| (1000, 30, 0.04));
        let mut map: BTreeMap<Platform, Vec<Insight>> = BTreeMap::new();
        map.insert(Platform::LinkedIn, vec![insight("LinkedIn: Engagement Efficiency", "Post more")]);
        map.insert(Platform::Instagram, vec![]);
        map.insert(Platform::Website, vec![]);

        let executive = StrategyAgent
            .generate_executive_summary(&store, &map, &ctx_failing())
            .await;

        let titles: Vec<&str> = executive.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Leakage Analysis", "Platform Prioritization", "Strategic Recommendations"]
        );
        assert_eq!(executive[2].summary, "1. LinkedIn: Post more");
    }

    #[tokio::test]
    async fn test_empty_inputs_yield_nothing() {
        let executive = StrategyAgent
            .generate_executive_summary(&DataStore::default(), &BTreeMap::new(), &ctx_failing())
            .await;
        assert!(executive.is_empty());
    }

    #[tokio::test]
    async fn test_model_plan_is_renumbered() {
        let client = ScriptedClient::new()
            .rule("Recommendation 1", "Summary:\n- Post video\n- Fix pages\nRecommendation: Start now.")
            .rule("Facts:", "Summary: All good.\nRecommendation: Carry on.");
        let ctx = RunContext {
            llm: handle(Arc::new(client)),
            status: Status::silent(),
        };
        let mut map: BTreeMap<Platform, Vec<Insight>> = BTreeMap::new();
        map.insert(Platform::Website, vec![insight("w", "Fix pages")]);

        let executive = StrategyAgent
            .generate_executive_summary(&full_store(), &map, &ctx)
            .await;

        assert_eq!(executive.len(), 4);
        assert_eq!(executive[0].summary, "All good.");
        assert_eq!(executive[3].summary, "1. Post video\n2. Fix pages");
        assert_eq!(executive[3].recommendation, "Start now.");
        assert!(parse_answer("Summary: x", "y").is_some());
    }
}

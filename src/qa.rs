//! Questions against the result of a run.
//!
//! The model sees a short data summary (record counts, recent averages,
//! insight counts) next to the question. Without a model the answer is
//! looked up among the produced insights by keyword.

use crate::agent::narrate::is_error_shaped;
use crate::agent::sanitize::sanitize;
use crate::analysis::stats::{last_n, mean_of, sorted_by_date};
use crate::llm::{CallType, LlmHandle};
use crate::models::{Insight, PayloadKind, Platform};
use crate::orchestrator::RunOutcome;
use tracing::{debug, info};

/// Records averaged for the "recent" figures.
const RECENT_RECORDS: usize = 30;
const AGENT: &str = "Insight Room";

/// Answer to a question.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub from_model: bool,
}

/// Topic a question is matched to when no model is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topic {
    Growth,
    Leakage,
    Priority,
    NextSteps,
    Platform(Platform),
}

impl Topic {
    fn of(question: &str) -> Option<Self> {
        let q = question.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| q.contains(w));

        if has(&["grow", "declin", "trend"]) {
            Some(Topic::Growth)
        } else if has(&["leak", "losing", "bounce"]) {
            Some(Topic::Leakage)
        } else if has(&["platform", "attention", "priorit", "focus"]) {
            Some(Topic::Priority)
        } else if has(&["next", "strategy", "recommend", "should"]) {
            Some(Topic::NextSteps)
        } else {
            Platform::ALL
                .into_iter()
                .find(|p| q.contains(p.key()))
                .map(Topic::Platform)
        }
    }

    /// Title fragments of the insights that answer this topic.
    fn title_words(&self) -> &'static [&'static str] {
        match self {
            Topic::Growth => &["Growth", "Trend"],
            Topic::Leakage => &["Leakage", "Quality"],
            Topic::Priority => &["Prioritization", "Platform"],
            Topic::NextSteps => &["Strategic", "Recommendation"],
            Topic::Platform(_) => &[],
        }
    }
}

/// Data summary given to the model.
pub fn data_summary(outcome: &RunOutcome) -> String {
    let store = &outcome.store;
    let mut lines = Vec::new();

    if !store.linkedin_metrics.is_empty() {
        let sorted = sorted_by_date(&store.linkedin_metrics);
        let recent = mean_of(last_n(&sorted, RECENT_RECORDS), |m| m.engagement_rate);
        lines.push(format!(
            "LinkedIn metrics: {} records. Recent avg engagement: {:.2}%",
            store.linkedin_metrics.len(),
            recent * 100.0
        ));
    }
    if !store.linkedin_followers.is_empty() {
        lines.push(format!("LinkedIn followers: {} records", store.linkedin_followers.len()));
    }
    if !store.linkedin_visitors.is_empty() {
        lines.push(format!("LinkedIn visitors: {} records", store.linkedin_visitors.len()));
    }
    if !store.instagram_metrics.is_empty() {
        let sorted = sorted_by_date(&store.instagram_metrics);
        let recent = mean_of(last_n(&sorted, RECENT_RECORDS), |m| m.engagement_rate);
        lines.push(format!(
            "Instagram metrics: {} records. Recent avg engagement: {:.2}%",
            store.instagram_metrics.len(),
            recent * 100.0
        ));
    }
    for kind in [
        PayloadKind::AudienceInsights,
        PayloadKind::ContentInteractions,
        PayloadKind::LiveVideos,
        PayloadKind::ProfilesReached,
    ] {
        let count = store.payloads_of(kind).count();
        if count > 0 {
            lines.push(format!("Instagram {}: {} records", kind, count));
        }
    }
    if !store.website_metrics.is_empty() {
        let sorted = sorted_by_date(&store.website_metrics);
        let recent = mean_of(last_n(&sorted, RECENT_RECORDS), |m| m.bounce_rate);
        lines.push(format!(
            "Website metrics: {} records. Recent avg bounce rate: {:.2}%",
            store.website_metrics.len(),
            recent * 100.0
        ));
    }

    for platform in Platform::ALL {
        let count = outcome.insights(platform).len();
        if count > 0 {
            lines.push(format!("{} insights: {}", platform, count));
        }
    }
    if !outcome.executive.is_empty() {
        lines.push(format!("Executive insights: {} cross-platform", outcome.executive.len()));
    }

    if lines.is_empty() {
        "No data loaded".to_string()
    } else {
        lines.join("\n")
    }
}

/// Answer a question about a run.
pub async fn ask(question: &str, outcome: &RunOutcome, llm: &LlmHandle) -> Answer {
    if llm.is_enabled() {
        let system = "You are the analyst of a marketing insight room. Answer from the \
                      available data and insights only. Be specific and reference actual \
                      metrics. If the data is insufficient, say what additional data would help.";
        let insights: Vec<String> = all_insights(outcome)
            .map(|i| format!("- {}: {}", i.title, i.summary.replace('\n', " ")))
            .collect();
        let user = format!(
            "Available data:\n{}\n\nInsights:\n{}\n\nQuestion: {}",
            data_summary(outcome),
            if insights.is_empty() { "none".to_string() } else { insights.join("\n") },
            question.trim()
        );

        match llm.complete(AGENT, CallType::Question, system, &user).await {
            Ok(text) if !is_error_shaped(&text) => {
                let text = sanitize(&text);
                if !text.is_empty() {
                    return Answer {
                        text,
                        from_model: true,
                    };
                }
            }
            Ok(_) => debug!("Question answer was error-shaped"),
            Err(e) => info!("Answering from insights: {}", e),
        }
    }

    Answer {
        text: keyword_answer(question, outcome),
        from_model: false,
    }
}

fn all_insights(outcome: &RunOutcome) -> impl Iterator<Item = &Insight> {
    outcome
        .executive
        .iter()
        .chain(Platform::ALL.into_iter().flat_map(move |p| outcome.insights(p).iter()))
}

/// Answer from the produced insights by keyword.
pub fn keyword_answer(question: &str, outcome: &RunOutcome) -> String {
    let Some(topic) = Topic::of(question) else {
        return "I can answer questions about growth, leakage, platform priority, next steps, \
                or a single platform (LinkedIn, Instagram, Website)."
            .to_string();
    };

    if let Topic::Platform(platform) = topic {
        let insights = outcome.insights(platform);
        if insights.is_empty() {
            return format!("No {} insights are available for this run.", platform);
        }
        let mut text = format!("{} insights:", platform);
        for insight in insights {
            text.push_str(&format!("\n- {}: {}", insight.title, insight.summary.replace('\n', " ")));
        }
        return text;
    }

    let words = topic.title_words();
    let found = all_insights(outcome).find(|i| words.iter().any(|w| i.title.contains(w)));
    match found {
        Some(insight) => {
            let mut text = insight.summary.clone();
            if matches!(topic, Topic::Priority | Topic::NextSteps | Topic::Leakage)
                && !insight.recommendation.is_empty()
            {
                text.push_str(&format!("\nRecommendation: {}", insight.recommendation));
            }
            if topic == Topic::Growth && !insight.metric_basis.is_empty() {
                text.push_str(&format!("\nEvidence: {}", insight.metric_basis));
            }
            text
        }
        None => match topic {
            Topic::Growth => "No growth trend insight was produced; at least 60 days of data are needed.",
            Topic::Leakage => "No leakage insight was produced for this run.",
            Topic::Priority => "No platform comparison was produced for this run.",
            _ => "No strategic recommendations were produced for this run.",
        }
        .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::fixtures::{linkedin_series, website_series};
    use crate::llm::testing::{handle, FailingClient, FixedClient, ScriptedClient};
    use crate::llm::UnavailableClient;
    use crate::models::{Confidence, DataStore, StageStatus};
    use crate::orchestrator::{ExecutionSummary, RunState, StageReport};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn insight(title: &str, summary: &str, recommendation: &str) -> Insight {
        Insight {
            title: title.to_string(),
            summary: summary.to_string(),
            metric_basis: "basis".to_string(),
            time_range: "2025-01-01 to 2025-02-14".to_string(),
            confidence: Confidence::High,
            evidence: Vec::new(),
            recommendation: recommendation.to_string(),
        }
    }

    fn outcome() -> RunOutcome {
        RunOutcome {
            store: DataStore {
                linkedin_metrics: linkedin_series(40, |_| (1000, 40, 0.045)),
                website_metrics: website_series(10, |_| (500, 300, 0.4)),
                ..Default::default()
            },
            linkedin: vec![insight("LinkedIn: Engagement Efficiency", "Engagement is strong.", "Keep going.")],
            instagram: Vec::new(),
            website: vec![insight("Website: Traffic Quality", "Bounce rate is moderate.", "Fix landing pages.")],
            executive: vec![
                insight("Leakage Analysis", "Website is the weakest channel.", "Fix landing pages."),
                insight("Strategic Recommendations", "1. Post video\n2. Fix pages", "Start with video."),
            ],
            execution_summary: ExecutionSummary {
                state: RunState::Done,
                error: None,
                ingestion: BTreeMap::new(),
                missing_platforms: vec![Platform::Instagram],
                platform_agents: BTreeMap::new(),
                strategy: StageReport {
                    status: StageStatus::Success,
                    count: Some(2),
                    duration_secs: 0.0,
                    error: None,
                },
                token_usage: Default::default(),
                duration_secs: 0.0,
            },
        }
    }

    #[test]
    fn test_data_summary() {
        let summary = data_summary(&outcome());

        assert!(summary.contains("LinkedIn metrics: 40 records. Recent avg engagement: 4.50%"));
        assert!(summary.contains("Website metrics: 10 records. Recent avg bounce rate: 40.00%"));
        assert!(summary.contains("Executive insights: 2 cross-platform"));
        assert!(!summary.contains("Instagram"));
    }

    #[test]
    fn test_keyword_answers() {
        let outcome = outcome();

        assert_eq!(
            keyword_answer("Where are we losing people?", &outcome),
            "Website is the weakest channel.\nRecommendation: Fix landing pages."
        );
        assert!(keyword_answer("What should we do next?", &outcome).starts_with("1. Post video"));
        assert!(keyword_answer("Are we growing?", &outcome).starts_with("No growth trend insight"));
        assert!(keyword_answer("How is LinkedIn doing?", &outcome)
            .contains("- LinkedIn: Engagement Efficiency: Engagement is strong."));
        assert_eq!(
            keyword_answer("instagram?", &outcome),
            "No Instagram insights are available for this run."
        );
        assert!(keyword_answer("hello", &outcome).starts_with("I can answer"));
    }

    #[tokio::test]
    async fn test_ask_uses_model() {
        let client = Arc::new(ScriptedClient::new().rule("Question: Which channel?", "**Website** needs work."));
        let llm = handle(client.clone());

        let answer = ask("Which channel?", &outcome(), &llm).await;

        assert!(answer.from_model);
        assert_eq!(answer.text, "Website needs work.");
        assert!(client.prompts()[0].contains("LinkedIn metrics: 40 records"));
    }

    #[tokio::test]
    async fn test_ask_falls_back() {
        for llm in [
            handle(Arc::new(FailingClient)),
            handle(Arc::new(UnavailableClient)),
            handle(Arc::new(FixedClient::new("Error: quota exceeded"))),
        ] {
            let answer = ask("Where is the leakage?", &outcome(), &llm).await;
            assert!(!answer.from_model);
            assert!(answer.text.starts_with("Website is the weakest channel."));
        }
    }
}

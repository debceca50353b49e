//! Fact-first narration.
//!
//! Agents compute their numbers first and hand them over as a [`Facts`]
//! block. The model may only rephrase those facts; whenever it fails or
//! answers with something error-shaped, the caller's template is used.

use super::sanitize::{sanitize, sanitize_inline};
use crate::llm::{CallType, LlmHandle};
use std::fmt::{self, Display};
use tracing::debug;

/// Prefixes of answers that are really failures in disguise.
const ERROR_PREFIXES: &[&str] = &[
    "analysis error",
    "error",
    "llm unavailable",
    "could not generate",
    "analysis unavailable",
];

/// Ordered `label: value` facts an analysis computed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Facts {
    lines: Vec<(String, String)>,
}

impl Facts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, label: &str, value: impl Display) -> Self {
        self.lines.push((label.to_string(), value.to_string()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for Facts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, value) in &self.lines {
            writeln!(f, "- {}: {}", label, value)?;
        }
        Ok(())
    }
}

/// What to ask the model for one insight.
#[derive(Debug, Clone)]
pub struct Brief<'a> {
    /// Agent name recorded in usage tracking.
    pub agent: &'a str,
    pub call_type: CallType,
    /// Analyst persona for the system prompt.
    pub role: &'a str,
    pub facts: &'a Facts,
    pub task: &'a str,
}

impl Brief<'_> {
    pub fn system_prompt(&self) -> String {
        format!(
            "{} Provide concise, executive-level insights. Write plain text without markdown or HTML.",
            self.role
        )
    }

    pub fn user_prompt(&self) -> String {
        format!(
            "Facts:\n{}\nTask:\n{}\n\nUse only the facts above. Do not introduce information not in the facts block.\n\
             Answer with exactly two lines:\n\
             Summary: <two or three sentences explaining the facts>\n\
             Recommendation: <one specific action>",
            self.facts, self.task
        )
    }
}

/// Summary and recommendation text for an insight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narration {
    pub summary: String,
    pub recommendation: String,
    /// False when the template was used.
    pub from_model: bool,
}

impl Narration {
    /// Deterministic narration built from facts.
    pub fn template(summary: impl Into<String>, recommendation: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            recommendation: recommendation.into(),
            from_model: false,
        }
    }
}

/// Ask the model to phrase the facts, falling back to `fallback`.
pub async fn narrate(llm: &LlmHandle, brief: &Brief<'_>, fallback: Narration) -> Narration {
    if !llm.is_enabled() {
        return fallback;
    }

    match llm
        .complete(
            brief.agent,
            brief.call_type,
            &brief.system_prompt(),
            &brief.user_prompt(),
        )
        .await
    {
        Ok(text) => parse_answer(&text, &fallback.recommendation).unwrap_or_else(|| {
            debug!(agent = brief.agent, "Unusable narration, using template");
            fallback
        }),
        Err(e) => {
            debug!(agent = brief.agent, "Narration failed, using template: {}", e);
            fallback
        }
    }
}

/// True for empty answers and answers that merely report a failure.
pub fn is_error_shaped(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    lower.is_empty() || ERROR_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Split a `Summary:` / `Recommendation:` answer.
///
/// Unlabelled text is taken as the summary, keeping its lines. `None`
/// when nothing usable remains after sanitizing.
pub fn parse_answer(text: &str, fallback_recommendation: &str) -> Option<Narration> {
    let clean = sanitize(text);
    if is_error_shaped(&clean) {
        return None;
    }

    let mut summary: Vec<&str> = Vec::new();
    let mut recommendation: Vec<&str> = Vec::new();
    let mut in_recommendation = false;

    for line in clean.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(rest) = strip_label(line, "recommendation") {
            in_recommendation = true;
            recommendation.push(rest);
        } else if let Some(rest) = strip_label(line, "summary") {
            in_recommendation = false;
            summary.push(rest);
        } else if in_recommendation {
            recommendation.push(line);
        } else {
            summary.push(line);
        }
    }

    let summary = summary
        .iter()
        .map(|line| sanitize_inline(line))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if summary.is_empty() {
        return None;
    }
    let recommendation = sanitize_inline(&recommendation.join(" "));

    Some(Narration {
        summary,
        recommendation: if recommendation.is_empty() {
            fallback_recommendation.to_string()
        } else {
            recommendation
        },
        from_model: true,
    })
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }
    let rest = line[label.len()..].trim_start();
    let rest = rest.strip_prefix(':')?;
    Some(rest.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{handle, FailingClient, FixedClient, ScriptedClient};
    use crate::llm::UnavailableClient;
    use std::sync::Arc;

    fn facts() -> Facts {
        Facts::new()
            .add("Average engagement rate", "4.5%")
            .add("Change vs previous period", "+12.0%")
    }

    fn brief(facts: &Facts) -> Brief<'_> {
        Brief {
            agent: "LinkedIn",
            call_type: CallType::InsightGeneration,
            role: "You are a LinkedIn marketing analyst.",
            facts,
            task: "Summarize the engagement trend.",
        }
    }

    fn fallback() -> Narration {
        Narration::template("Engagement averaged 4.5%.", "Keep posting.")
    }

    #[test]
    fn test_prompt_carries_facts_and_constraint() {
        let facts = facts();
        let prompt = brief(&facts).user_prompt();
        assert!(prompt.starts_with("Facts:\n- Average engagement rate: 4.5%\n"));
        assert!(prompt.contains("Do not introduce information not in the facts block"));
        assert!(prompt.contains("Task:\nSummarize the engagement trend."));
    }

    #[test]
    fn test_parse_labelled_answer() {
        let answer = "**Summary:** Engagement rose to 4.5%.\nIt is up 12%.\n\nRecommendation: Double down on *video*.";
        let narration = parse_answer(answer, "unused").unwrap();
        assert_eq!(narration.summary, "Engagement rose to 4.5%.\nIt is up 12%.");
        assert_eq!(narration.recommendation, "Double down on video.");
        assert!(narration.from_model);
    }

    #[test]
    fn test_parse_unlabelled_answer_keeps_fallback_recommendation() {
        let narration = parse_answer("<p>Reach is growing.</p>", "Keep posting.").unwrap();
        assert_eq!(narration.summary, "Reach is growing.");
        assert_eq!(narration.recommendation, "Keep posting.");
    }

    #[test]
    fn test_error_shaped_answers_are_rejected() {
        assert!(parse_answer("Analysis error: quota", "x").is_none());
        assert!(parse_answer("LLM unavailable.", "x").is_none());
        assert!(parse_answer("Could not generate insight", "x").is_none());
        assert!(parse_answer("   ", "x").is_none());
        assert!(parse_answer("Recommendation: only this", "x").is_none());
    }

    #[tokio::test]
    async fn test_narrate_uses_model_answer() {
        let llm = handle(Arc::new(FixedClient::new(
            "Summary: Engagement is healthy.\nRecommendation: Post twice a week.",
        )));
        let facts = facts();
        let narration = narrate(&llm, &brief(&facts), fallback()).await;
        assert_eq!(narration.summary, "Engagement is healthy.");
        assert_eq!(narration.recommendation, "Post twice a week.");
        assert_eq!(llm.usage().summary().total_calls, 0);
    }

    #[tokio::test]
    async fn test_narrate_records_usage() {
        let client = Arc::new(ScriptedClient::new().rule("Facts:", "Summary: Fine."));
        let llm = handle(client.clone());
        let facts = facts();
        narrate(&llm, &brief(&facts), fallback()).await;
        assert_eq!(client.calls(), 1);
        let usage = llm.usage().summary();
        assert_eq!(usage.total_calls, 1);
        assert!(usage.by_agent.contains_key("LinkedIn"));
    }

    #[tokio::test]
    async fn test_narrate_falls_back() {
        let facts = facts();

        let failing = handle(Arc::new(FailingClient));
        assert_eq!(narrate(&failing, &brief(&facts), fallback()).await, fallback());

        let erroring = handle(Arc::new(FixedClient::new("Error: rate limited")));
        assert_eq!(narrate(&erroring, &brief(&facts), fallback()).await, fallback());

        let unavailable = handle(Arc::new(UnavailableClient));
        assert_eq!(narrate(&unavailable, &brief(&facts), fallback()).await, fallback());
    }
}

//! Token and cost accounting for completion calls.
//!
//! One tracker exists per pipeline run and is shared by every agent through
//! the [`super::LlmHandle`]. Recording is safe from concurrent tasks.

use super::{CallType, TokenUsage};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Price per million tokens, in US dollars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            input_per_million: 0.50,
            output_per_million: 1.50,
        }
    }
}

impl Pricing {
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.prompt_tokens as f64 * self.input_per_million
            + usage.completion_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

/// A single recorded call.
#[derive(Debug, Clone, Serialize)]
pub struct CallMetrics {
    pub agent: String,
    pub call_type: CallType,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
    pub timestamp: DateTime<Local>,
}

/// Per-agent totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentUsage {
    pub calls: usize,
    pub tokens: u64,
    pub cost: f64,
}

/// Totals across a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSummary {
    pub total_calls: usize,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub by_agent: BTreeMap<String, AgentUsage>,
}

/// Mutex-guarded list of recorded calls.
#[derive(Debug, Default)]
pub struct UsageTracker {
    pricing: Pricing,
    calls: Mutex<Vec<CallMetrics>>,
}

impl UsageTracker {
    pub fn new(pricing: Pricing) -> Self {
        Self {
            pricing,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, agent: &str, call_type: CallType, model: &str, usage: TokenUsage) {
        let metrics = CallMetrics {
            agent: agent.to_string(),
            call_type,
            model: model.to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            cost: self.pricing.cost(&usage),
            timestamp: Local::now(),
        };
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(metrics);
    }

    pub fn summary(&self) -> UsageSummary {
        let calls = self
            .calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut summary = UsageSummary {
            total_calls: calls.len(),
            ..UsageSummary::default()
        };

        for call in calls.iter() {
            summary.total_prompt_tokens += call.prompt_tokens;
            summary.total_completion_tokens += call.completion_tokens;
            summary.total_tokens += call.total_tokens;
            summary.total_cost += call.cost;

            let agent = summary.by_agent.entry(call.agent.clone()).or_default();
            agent.calls += 1;
            agent.tokens += call.total_tokens;
            agent.cost += call.cost;
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn usage(prompt: u64, completion: u64) -> TokenUsage {
        TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }

    #[test]
    fn test_default_pricing() {
        let cost = Pricing::default().cost(&usage(1_000_000, 1_000_000));
        assert!((cost - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_groups_by_agent() {
        let tracker = UsageTracker::new(Pricing::default());
        tracker.record("LinkedIn", CallType::SchemaDiscovery, "m", usage(100, 10));
        tracker.record("LinkedIn", CallType::InsightGeneration, "m", usage(200, 20));
        tracker.record("Strategy", CallType::Strategy, "m", usage(50, 5));

        let summary = tracker.summary();
        assert_eq!(summary.total_calls, 3);
        assert_eq!(summary.total_tokens, 385);
        assert_eq!(summary.by_agent["LinkedIn"].calls, 2);
        assert_eq!(summary.by_agent["Strategy"].tokens, 55);
    }

    #[test]
    fn test_empty_summary() {
        let summary = UsageTracker::new(Pricing::default()).summary();
        assert_eq!(summary, UsageSummary::default());
    }

    #[test]
    fn test_concurrent_recording() {
        let tracker = Arc::new(UsageTracker::new(Pricing::default()));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        tracker.record(&format!("agent-{i}"), CallType::Report, "m", usage(1, 1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.summary().total_calls, 100);
    }
}

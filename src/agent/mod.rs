//! Analysis agents.
//!
//! One [`PlatformAgent`] per platform turns the merged store into a few
//! insights; the strategy agent then combines them into an executive
//! view. Every agent computes its numbers first and only asks the model
//! to phrase them (see [`narrate`]).

pub mod instagram;
pub mod linkedin;
pub mod narrate;
pub mod sanitize;
pub mod strategy;
pub mod website;

pub use instagram::InstagramAgent;
pub use linkedin::LinkedInAgent;
pub use strategy::StrategyAgent;
pub use website::WebsiteAgent;

use crate::models::{Confidence, DataStore, Insight, Platform};
use crate::orchestrator::RunContext;
use anyhow::Result;
use async_trait::async_trait;
use narrate::Narration;
use std::sync::Arc;

/// Produces insights for one platform.
#[async_trait]
pub trait PlatformAgent: Send + Sync {
    /// Name used in execution summaries and usage tracking.
    fn name(&self) -> &str;

    fn platform(&self) -> Platform;

    /// Analyze the platform's slice of the store.
    ///
    /// Analyses whose sample-size gate is not met contribute nothing.
    async fn analyze(&self, store: &DataStore, ctx: &RunContext) -> Result<Vec<Insight>>;
}

/// The production agent for every platform, in pipeline order.
pub fn default_agents() -> Vec<Arc<dyn PlatformAgent>> {
    vec![
        Arc::new(LinkedInAgent),
        Arc::new(InstagramAgent),
        Arc::new(WebsiteAgent),
    ]
}

/// Assemble an insight; confidence follows the number of records used.
pub(crate) fn build_insight(
    title: &str,
    narration: Narration,
    metric_basis: String,
    time_range: String,
    sample_size: usize,
    evidence: Vec<String>,
) -> Insight {
    Insight {
        title: title.to_string(),
        summary: narration.summary,
        metric_basis,
        time_range,
        confidence: Confidence::from_sample_size(sample_size),
        evidence,
        recommendation: narration.recommendation,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Metric series shared by the agent tests.

    use crate::models::{InstagramMetric, LinkedInMetric, WebsiteMetric};
    use chrono::{Duration, NaiveDate};

    pub fn day(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + Duration::days(i as i64)
    }

    pub fn linkedin_series(
        days: usize,
        f: impl Fn(usize) -> (u64, u64, f64),
    ) -> Vec<LinkedInMetric> {
        (0..days)
            .map(|i| {
                let (impressions, reactions, engagement_rate) = f(i);
                LinkedInMetric {
                    date: day(i),
                    impressions,
                    clicks: 0,
                    reactions,
                    engagement_rate,
                }
            })
            .collect()
    }

    pub fn instagram_series(days: usize, f: impl Fn(usize) -> (u64, f64)) -> Vec<InstagramMetric> {
        (0..days)
            .map(|i| {
                let (impressions, engagement_rate) = f(i);
                InstagramMetric {
                    date: day(i),
                    impressions,
                    likes: 0,
                    comments: 0,
                    shares: 0,
                    engagement_rate,
                }
            })
            .collect()
    }

    pub fn website_series(days: usize, f: impl Fn(usize) -> (u64, u64, f64)) -> Vec<WebsiteMetric> {
        (0..days)
            .map(|i| {
                let (page_views, unique_visitors, bounce_rate) = f(i);
                WebsiteMetric {
                    date: day(i),
                    page_views,
                    unique_visitors,
                    bounce_rate,
                }
            })
            .collect()
    }
}

//! KPI cards shown at the top of each platform section.

use super::stats::{self, split_recent, sorted_by_date};
use crate::models::{DataStore, Platform};
use serde::Serialize;
use std::fmt;

/// Records a platform needs before KPI cards are computed.
pub const KPI_MIN_RECORDS: usize = 30;

/// Direction of a KPI's change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Neutral,
}

impl Trend {
    fn of(change: f64) -> Self {
        if change > 0.0 {
            Trend::Up
        } else if change < 0.0 {
            Trend::Down
        } else {
            Trend::Neutral
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            Trend::Up => "▲",
            Trend::Down => "▼",
            Trend::Neutral => "■",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Up => write!(f, "up"),
            Trend::Down => write!(f, "down"),
            Trend::Neutral => write!(f, "neutral"),
        }
    }
}

/// One KPI card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpi {
    pub label: String,
    pub value: String,
    pub change: String,
    pub trend: Trend,
    pub helper: String,
}

impl Kpi {
    fn new(label: &str, value: String, change: f64, unit: &str, helper: &str) -> Self {
        Self {
            label: label.to_string(),
            value,
            change: format!("{:+.1}{}", change, unit),
            trend: Trend::of(change),
            helper: helper.to_string(),
        }
    }
}

/// KPI cards for a platform; empty below [`KPI_MIN_RECORDS`].
pub fn platform_kpis(store: &DataStore, platform: Platform) -> Vec<Kpi> {
    if store.metric_count(platform) < KPI_MIN_RECORDS {
        return Vec::new();
    }

    match platform {
        Platform::LinkedIn => {
            let sorted = sorted_by_date(&store.linkedin_metrics);
            social_kpis(&sorted, |m| m.engagement_rate, |m| m.impressions as f64)
        }
        Platform::Instagram => {
            let sorted = sorted_by_date(&store.instagram_metrics);
            social_kpis(&sorted, |m| m.engagement_rate, |m| m.impressions as f64)
        }
        Platform::Website => {
            let sorted = sorted_by_date(&store.website_metrics);
            let (recent, previous) = split_recent(&sorted, 30);
            let previous = if previous.is_empty() { recent } else { previous };

            let bounce = stats::mean_of(recent, |m| m.bounce_rate);
            let bounce_before = stats::mean_of(previous, |m| m.bounce_rate);
            let views = stats::mean_of(recent, |m| m.page_views as f64);
            let views_before = stats::mean_of(previous, |m| m.page_views as f64);
            let visitors = stats::mean_of(recent, |m| m.unique_visitors as f64);
            let visitors_before = stats::mean_of(previous, |m| m.unique_visitors as f64);

            vec![
                Kpi::new(
                    "Avg Bounce Rate",
                    format!("{:.1}%", bounce * 100.0),
                    (bounce - bounce_before) * 100.0,
                    "pp",
                    "vs previous 30 days",
                ),
                Kpi::new(
                    "Page View Growth",
                    format!("{:.0}/day", views),
                    stats::pct_change(views, views_before),
                    "%",
                    "last 30 days",
                ),
                Kpi::new(
                    "Unique Visitors",
                    format!("{:.0}/day", visitors),
                    stats::pct_change(visitors, visitors_before),
                    "%",
                    "daily average",
                ),
            ]
        }
    }
}

fn social_kpis<T>(sorted: &[T], engagement: impl Fn(&T) -> f64, impressions: impl Fn(&T) -> f64) -> Vec<Kpi> {
    let (recent, previous) = split_recent(sorted, 30);
    let previous = if previous.is_empty() { recent } else { previous };

    let eng = stats::mean_of(recent, &engagement);
    let eng_before = stats::mean_of(previous, &engagement);
    let reach = stats::mean_of(recent, &impressions);
    let reach_before = stats::mean_of(previous, &impressions);

    vec![
        Kpi::new(
            "Avg Engagement Rate",
            format!("{:.1}%", eng * 100.0),
            (eng - eng_before) * 100.0,
            "pp",
            "vs previous 30 days",
        ),
        Kpi::new(
            "Reach Growth",
            format!("{:+.1}%", stats::pct_change(reach, reach_before)),
            stats::pct_change(reach, reach_before),
            "%",
            "impressions, 30-day windows",
        ),
        Kpi::new(
            "Avg Daily Impressions",
            format!("{:.0}", reach),
            reach - reach_before,
            "",
            "last 30 days",
        ),
    ]
}

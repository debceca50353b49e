//! LinkedIn page exports: content metrics, followers, and visitors.

use super::coerce::DateParser;
use super::table::{parse_row, Table};
use super::FileLoad;
use crate::discovery::{Field, FieldMapping, FileKind};
use crate::models::{DataStore, LinkedInFollowersMetric, LinkedInMetric, LinkedInVisitorsMetric};
use anyhow::{Context, Result};
use std::path::Path;

/// Append the rows of one classified LinkedIn table to the store.
pub fn load_table(
    kind: FileKind,
    table: &Table,
    mapping: &FieldMapping,
    store: &mut DataStore,
) -> FileLoad {
    let dates = DateParser::new(mapping.date_format.as_deref());
    let mut load = FileLoad::new(kind, table.rows.len() + table.undecodable);
    load.skipped += table.undecodable;

    for (i, row) in table.iter().enumerate() {
        let Some(parsed) = parse_row(&row, mapping, &dates, true) else {
            load.skipped += 1;
            continue;
        };
        let Some(date) = parsed.date else {
            load.skipped += 1;
            continue;
        };

        match kind {
            FileKind::LinkedInContent => store.linkedin_metrics.push(LinkedInMetric {
                date,
                impressions: parsed.count(Field::Impressions),
                clicks: parsed.count(Field::Clicks),
                reactions: parsed.count(Field::Reactions),
                engagement_rate: parsed.rate(Field::EngagementRate),
            }),
            FileKind::LinkedInFollowers => {
                let sponsored = parsed.count(Field::SponsoredFollowers);
                let organic = parsed.count(Field::OrganicFollowers);
                let total = if parsed.has(Field::TotalFollowers) {
                    parsed.count(Field::TotalFollowers)
                } else {
                    sponsored.saturating_add(organic)
                };
                store.linkedin_followers.push(LinkedInFollowersMetric {
                    date,
                    sponsored_followers: sponsored,
                    organic_followers: organic,
                    total_followers: total,
                    raw: table.row_map(i),
                });
            }
            FileKind::LinkedInVisitors => store.linkedin_visitors.push(LinkedInVisitorsMetric {
                date,
                page_views: parsed.count(Field::PageViews),
                unique_visitors: parsed.count(Field::UniqueVisitors),
                raw: table.row_map(i),
            }),
            _ => {
                load.skipped += 1;
                continue;
            }
        }
        load.loaded += 1;
    }

    load
}

/// Read a competitor list: a JSON array of names, or objects with a `name`.
pub fn load_competitors(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let items: &[serde_json::Value] = match &value {
        serde_json::Value::Array(items) => items.as_slice(),
        serde_json::Value::Object(map) => map
            .get("competitors")
            .and_then(|v| v.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    let mut names: Vec<String> = Vec::new();
    for item in items {
        let name = item
            .as_str()
            .or_else(|| item.get("name").and_then(|n| n.as_str()))
            .map(str::trim)
            .filter(|n| !n.is_empty());
        if let Some(name) = name {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

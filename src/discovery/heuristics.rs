//! Filename and column-name heuristics.
//!
//! Strategies are registered by name per platform and tried in registration
//! order by a single dispatcher. Column matching is generic: every target
//! field has keyword alternatives, and columns describing a total win over
//! their organic or sponsored splits.

use super::{Field, FieldMapping, FileKind};
use crate::models::Platform;
use std::collections::BTreeMap;
use std::fmt;

/// Decides a file kind from its lowercase file name and its columns.
pub type Strategy = fn(&str, &[String]) -> Option<FileKind>;

/// Named heuristic strategies per platform.
#[derive(Clone, Default)]
pub struct HeuristicRegistry {
    strategies: BTreeMap<Platform, Vec<(&'static str, Strategy)>>,
}

impl fmt::Debug for HeuristicRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: BTreeMap<_, Vec<_>> = self
            .strategies
            .iter()
            .map(|(p, list)| (p, list.iter().map(|(name, _)| *name).collect()))
            .collect();
        f.debug_struct("HeuristicRegistry")
            .field("strategies", &names)
            .finish()
    }
}

impl HeuristicRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in strategies for every platform.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register(Platform::LinkedIn, "followers_export", linkedin_followers);
        registry.register(Platform::LinkedIn, "visitors_export", linkedin_visitors);
        registry.register(Platform::LinkedIn, "content_export", linkedin_content);
        registry.register(Platform::LinkedIn, "content_columns", linkedin_content_columns);

        registry.register(Platform::Instagram, "meta_insights_export", instagram_export);
        registry.register(Platform::Instagram, "post_columns", instagram_post_columns);

        registry.register(Platform::Website, "blog_export", website_blog);
        registry.register(Platform::Website, "traffic_export", website_traffic);
        registry.register(Platform::Website, "traffic_columns", website_traffic_columns);

        registry
    }

    pub fn register(&mut self, platform: Platform, name: &'static str, strategy: Strategy) {
        self.strategies
            .entry(platform)
            .or_default()
            .push((name, strategy));
    }

    /// Names registered for a platform, in dispatch order.
    pub fn names(&self, platform: Platform) -> Vec<&'static str> {
        self.strategies
            .get(&platform)
            .map(|list| list.iter().map(|(name, _)| *name).collect())
            .unwrap_or_default()
    }

    /// Run the platform's strategies in order; the first decision wins.
    ///
    /// Returns the deciding strategy's name with the kind. `Other` and
    /// undecided files yield `None`.
    pub fn classify(
        &self,
        platform: Platform,
        file_name: &str,
        columns: &[String],
    ) -> Option<(&'static str, FileKind)> {
        let name = file_name.to_lowercase();
        self.strategies
            .get(&platform)?
            .iter()
            .find_map(|(strategy_name, strategy)| {
                strategy(&name, columns).map(|kind| (*strategy_name, kind))
            })
            .filter(|(_, kind)| !kind.is_other() && FileKind::for_platform(platform).contains(kind))
    }
}

fn linkedin_followers(name: &str, _columns: &[String]) -> Option<FileKind> {
    name.contains("follower").then_some(FileKind::LinkedInFollowers)
}

fn linkedin_visitors(name: &str, _columns: &[String]) -> Option<FileKind> {
    name.contains("visitor").then_some(FileKind::LinkedInVisitors)
}

fn linkedin_content(name: &str, _columns: &[String]) -> Option<FileKind> {
    (name.contains("content") || name.contains("metrics")).then_some(FileKind::LinkedInContent)
}

fn linkedin_content_columns(_name: &str, columns: &[String]) -> Option<FileKind> {
    (has_column(columns, "impression")
        && (has_column(columns, "engagement") || has_column(columns, "reaction")))
    .then_some(FileKind::LinkedInContent)
}

fn instagram_export(name: &str, _columns: &[String]) -> Option<FileKind> {
    if name.contains("audience") {
        Some(FileKind::InstagramAudienceInsights)
    } else if name.contains("interaction") {
        Some(FileKind::InstagramContentInteractions)
    } else if name.contains("live") {
        Some(FileKind::InstagramLiveVideos)
    } else if name.contains("reach") {
        Some(FileKind::InstagramProfilesReached)
    } else if name.contains("post") || name.contains("media") {
        Some(FileKind::InstagramPosts)
    } else {
        None
    }
}

fn instagram_post_columns(_name: &str, columns: &[String]) -> Option<FileKind> {
    (has_column(columns, "like") && has_column(columns, "comment"))
        .then_some(FileKind::InstagramPosts)
}

fn website_blog(name: &str, _columns: &[String]) -> Option<FileKind> {
    name.contains("blog").then_some(FileKind::WebsiteBlog)
}

fn website_traffic(name: &str, _columns: &[String]) -> Option<FileKind> {
    (name.contains("traffic") || name.contains("analytics") || name.contains("visits"))
        .then_some(FileKind::WebsiteTraffic)
}

fn website_traffic_columns(_name: &str, columns: &[String]) -> Option<FileKind> {
    (has_column(columns, "page views") || has_column(columns, "pageviews"))
        .then_some(FileKind::WebsiteTraffic)
}

fn has_column(columns: &[String], keyword: &str) -> bool {
    columns.iter().any(|c| c.to_lowercase().contains(keyword))
}

/// Keyword alternatives per field, most specific first.
fn keywords(field: Field) -> &'static [&'static str] {
    match field {
        Field::Impressions => &["impressions", "impression", "reach"],
        Field::Clicks => &["clicks", "click"],
        Field::Reactions => &["reactions", "reaction"],
        Field::EngagementRate => &["engagement rate", "engagement"],
        Field::Likes => &["likes", "like"],
        Field::Comments => &["comments", "comment"],
        Field::Shares => &["shares", "share"],
        Field::PageViews => &["page views", "pageviews", "post views", "views"],
        Field::UniqueVisitors => &["unique visitors", "visitors", "users"],
        Field::BounceRate => &["bounce rate", "bounce"],
        Field::SponsoredFollowers => &["sponsored followers", "sponsored"],
        Field::OrganicFollowers => &["organic followers", "organic"],
        Field::TotalFollowers => &["total followers", "followers"],
    }
}

/// Find the column that most likely holds the record date.
pub fn find_date_column(columns: &[String]) -> Option<String> {
    let lowered: Vec<String> = columns.iter().map(|c| c.trim().to_lowercase()).collect();

    let exact = lowered
        .iter()
        .position(|c| c == "date" || c == "day" || c.ends_with(".date"));
    let partial = || {
        ["date", "timestamp", "time", "day"]
            .iter()
            .find_map(|keyword| lowered.iter().position(|c| c.contains(keyword)))
    };

    exact.or_else(partial).map(|i| columns[i].clone())
}

/// Map a file's columns to the target fields of `kind` by keyword.
pub fn match_columns(kind: FileKind, columns: &[String]) -> FieldMapping {
    let date_column = find_date_column(columns);
    let mut used: Vec<usize> = date_column
        .as_ref()
        .and_then(|d| columns.iter().position(|c| c == d))
        .into_iter()
        .collect();

    let lowered: Vec<String> = columns.iter().map(|c| c.to_lowercase()).collect();
    let mut fields = BTreeMap::new();

    for field in kind.fields() {
        let matched = keywords(*field).iter().find_map(|keyword| {
            let candidates: Vec<usize> = lowered
                .iter()
                .enumerate()
                .filter(|(i, c)| !used.contains(i) && c.contains(keyword))
                .filter(|(_, c)| field.is_rate() || !c.contains("rate"))
                .map(|(i, _)| i)
                .collect();
            candidates
                .iter()
                .copied()
                .find(|i| lowered[*i].contains("total"))
                .or_else(|| candidates.first().copied())
        });

        if let Some(i) = matched {
            used.push(i);
            fields.insert(*field, columns[i].clone());
        }
    }

    FieldMapping {
        date_column,
        date_format: None,
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dispatch_order_and_names() {
        let registry = HeuristicRegistry::with_defaults();
        assert_eq!(
            registry.names(Platform::LinkedIn),
            vec![
                "followers_export",
                "visitors_export",
                "content_export",
                "content_columns"
            ]
        );

        let decided = registry.classify(Platform::LinkedIn, "Company_Followers_2025.csv", &[]);
        assert_eq!(decided, Some(("followers_export", FileKind::LinkedInFollowers)));

        let columns = cols(&["Date", "Impressions (total)", "Engagement rate (total)"]);
        let decided = registry.classify(Platform::LinkedIn, "export.csv", &columns);
        assert_eq!(decided, Some(("content_columns", FileKind::LinkedInContent)));

        assert_eq!(registry.classify(Platform::Website, "readme.csv", &[]), None);
    }

    #[test]
    fn test_custom_strategy_registration() {
        fn everything_is_blog(_: &str, _: &[String]) -> Option<FileKind> {
            Some(FileKind::WebsiteBlog)
        }
        let mut registry = HeuristicRegistry::new();
        registry.register(Platform::Website, "catch_all", everything_is_blog);

        assert_eq!(
            registry.classify(Platform::Website, "x.csv", &[]),
            Some(("catch_all", FileKind::WebsiteBlog))
        );
        // Kinds foreign to the platform are rejected
        registry.register(Platform::LinkedIn, "wrong", everything_is_blog);
        assert_eq!(registry.classify(Platform::LinkedIn, "x.csv", &[]), None);
    }

    #[test]
    fn test_instagram_export_names() {
        let registry = HeuristicRegistry::with_defaults();
        let kind = |name: &str| registry.classify(Platform::Instagram, name, &[]).map(|(_, k)| k);

        assert_eq!(kind("audience_insights.json"), Some(FileKind::InstagramAudienceInsights));
        assert_eq!(kind("content_interactions.json"), Some(FileKind::InstagramContentInteractions));
        assert_eq!(kind("live_videos.json"), Some(FileKind::InstagramLiveVideos));
        assert_eq!(kind("profiles_reached.json"), Some(FileKind::InstagramProfilesReached));
        assert_eq!(kind("posts.json"), Some(FileKind::InstagramPosts));
    }

    #[test]
    fn test_total_columns_preferred() {
        let columns = cols(&[
            "Date",
            "Impressions (organic)",
            "Impressions (sponsored)",
            "Impressions (total)",
            "Clicks (organic)",
            "Clicks (total)",
            "Reactions (total)",
            "Engagement rate (organic)",
            "Engagement rate (total)",
        ]);
        let mapping = match_columns(FileKind::LinkedInContent, &columns);

        assert_eq!(mapping.date_column.as_deref(), Some("Date"));
        assert_eq!(mapping.column(Field::Impressions), Some("Impressions (total)"));
        assert_eq!(mapping.column(Field::Clicks), Some("Clicks (total)"));
        assert_eq!(mapping.column(Field::EngagementRate), Some("Engagement rate (total)"));
    }

    #[test]
    fn test_followers_columns_do_not_collide() {
        let columns = cols(&[
            "Date",
            "Sponsored followers",
            "Organic followers",
            "Total followers",
        ]);
        let mapping = match_columns(FileKind::LinkedInFollowers, &columns);

        assert_eq!(mapping.column(Field::SponsoredFollowers), Some("Sponsored followers"));
        assert_eq!(mapping.column(Field::OrganicFollowers), Some("Organic followers"));
        assert_eq!(mapping.column(Field::TotalFollowers), Some("Total followers"));
    }

    #[test]
    fn test_flattened_json_paths() {
        let columns = cols(&[
            "media_map_data.Media Thumbnail.uri",
            "string_map_data.Creation timestamp.timestamp",
            "string_map_data.Impressions.value",
            "string_map_data.Likes.value",
            "string_map_data.Comments.value",
        ]);
        let mapping = match_columns(FileKind::InstagramPosts, &columns);

        assert_eq!(
            mapping.date_column.as_deref(),
            Some("string_map_data.Creation timestamp.timestamp")
        );
        assert_eq!(mapping.column(Field::Impressions), Some("string_map_data.Impressions.value"));
        assert_eq!(mapping.column(Field::Likes), Some("string_map_data.Likes.value"));
        assert_eq!(mapping.column(Field::Shares), None);
    }

    #[test]
    fn test_blog_columns() {
        let columns = cols(&["Action date", "Post views", "Unique visitors"]);
        let mapping = match_columns(FileKind::WebsiteBlog, &columns);

        assert_eq!(mapping.date_column.as_deref(), Some("Action date"));
        assert_eq!(mapping.column(Field::PageViews), Some("Post views"));
        assert_eq!(mapping.column(Field::UniqueVisitors), Some("Unique visitors"));
        assert_eq!(mapping.column(Field::BounceRate), None);
    }
}

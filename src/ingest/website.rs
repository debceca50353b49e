//! Website analytics exports: traffic reports and blog statistics.

use super::coerce::DateParser;
use super::table::{parse_row, Table};
use super::FileLoad;
use crate::discovery::{Field, FieldMapping, FileKind};
use crate::models::{DataStore, WebsiteMetric};

/// Bounce rate for blog rows that do not report one.
///
/// Few views per visitor reads as visitors leaving after one page.
pub fn estimate_bounce_rate(page_views: u64, unique_visitors: u64) -> f64 {
    let capacity = (unique_visitors.saturating_mul(5)).max(1) as f64;
    (1.0 - page_views as f64 / capacity).clamp(0.3, 0.8)
}

/// Append the rows of one classified website table to the store.
pub fn load_table(
    kind: FileKind,
    table: &Table,
    mapping: &FieldMapping,
    store: &mut DataStore,
) -> FileLoad {
    let dates = DateParser::new(mapping.date_format.as_deref());
    let mut load = FileLoad::new(kind, table.rows.len() + table.undecodable);
    load.skipped += table.undecodable;

    if !matches!(kind, FileKind::WebsiteTraffic | FileKind::WebsiteBlog) {
        load.skipped += table.rows.len();
        return load;
    }
    let estimate_bounce = kind == FileKind::WebsiteBlog && mapping.column(Field::BounceRate).is_none();

    for row in table.iter() {
        let Some(parsed) = parse_row(&row, mapping, &dates, true) else {
            load.skipped += 1;
            continue;
        };
        let Some(date) = parsed.date else {
            load.skipped += 1;
            continue;
        };

        let page_views = parsed.count(Field::PageViews);
        let unique_visitors = parsed.count(Field::UniqueVisitors);
        let bounce_rate = if estimate_bounce {
            estimate_bounce_rate(page_views, unique_visitors)
        } else {
            parsed.rate(Field::BounceRate)
        };

        store.website_metrics.push(WebsiteMetric {
            date,
            page_views,
            unique_visitors,
            bounce_rate,
        });
        load.loaded += 1;
    }

    load
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::match_columns;

    fn table(lines: &[&[&str]]) -> Table {
        Table::from_records(
            lines
                .iter()
                .map(|l| l.iter().map(|c| c.to_string()).collect())
                .collect(),
            0,
        )
    }

    #[test]
    fn test_bounce_estimate_bounds() {
        assert_eq!(estimate_bounce_rate(0, 100), 0.8);
        assert_eq!(estimate_bounce_rate(1000, 10), 0.3);
        assert!((estimate_bounce_rate(250, 100) - 0.5).abs() < 1e-9);
        assert_eq!(estimate_bounce_rate(0, 0), 0.8);
    }

    #[test]
    fn test_blog_rows_get_estimated_bounce() {
        let table = table(&[
            &["Action date", "Post views", "Unique visitors"],
            &["23/12/2024", "250", "100"],
        ]);
        let mapping = match_columns(FileKind::WebsiteBlog, &table.header);
        let mut store = DataStore::default();

        let load = load_table(FileKind::WebsiteBlog, &table, &mapping, &mut store);

        assert_eq!(load.loaded, 1);
        let metric = &store.website_metrics[0];
        assert_eq!(metric.page_views, 250);
        assert!((metric.bounce_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_traffic_rows_use_reported_bounce() {
        let table = table(&[
            &["Date", "Page views", "Unique visitors", "Bounce rate"],
            &["2025-01-02", "1,500", "900", "42.5%"],
            &["2025-01-03", "1,400", "850", ""],
        ]);
        let mapping = match_columns(FileKind::WebsiteTraffic, &table.header);
        let mut store = DataStore::default();

        load_table(FileKind::WebsiteTraffic, &table, &mapping, &mut store);

        assert_eq!(store.website_metrics.len(), 2);
        assert!((store.website_metrics[0].bounce_rate - 0.425).abs() < 1e-9);
        assert_eq!(store.website_metrics[1].bounce_rate, 0.0);
    }
}

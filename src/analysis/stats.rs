//! Statistics over dated metric records.
//!
//! Every analysis first orders records by date, then compares a recent
//! window with the one before it. These helpers keep those steps uniform.

use crate::models::{InstagramMetric, LinkedInMetric, WebsiteMetric};
use chrono::NaiveDate;

/// Records that carry a date.
pub trait Dated {
    fn date(&self) -> NaiveDate;
}

impl Dated for LinkedInMetric {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

impl Dated for InstagramMetric {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

impl Dated for WebsiteMetric {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

/// Copy of the records ordered by date. Records sharing a date keep
/// their load order.
pub fn sorted_by_date<T: Dated + Clone>(items: &[T]) -> Vec<T> {
    let mut sorted = items.to_vec();
    sorted.sort_by_key(|m| m.date());
    sorted
}

/// Split sorted records into the last `n` and up to `n` records before them.
pub fn split_recent<T>(sorted: &[T], n: usize) -> (&[T], &[T]) {
    let recent_start = sorted.len().saturating_sub(n);
    let previous_start = recent_start.saturating_sub(n);
    (&sorted[recent_start..], &sorted[previous_start..recent_start])
}

/// The last `n` records.
pub fn last_n<T>(sorted: &[T], n: usize) -> &[T] {
    split_recent(sorted, n).0
}

/// Arithmetic mean; `None` for no values.
pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Mean of a field over records; zero for no records.
pub fn mean_of<T>(items: &[T], field: impl Fn(&T) -> f64) -> f64 {
    mean(items.iter().map(field)).unwrap_or(0.0)
}

/// Percentage change from `previous` to `current`; zero when there is no base.
pub fn pct_change(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        (current - previous) / previous * 100.0
    } else {
        0.0
    }
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let avg = mean(values.iter().copied())?;
    let variance = mean(values.iter().map(|v| (v - avg).powi(2)))?;
    Some(variance.sqrt())
}

/// Standard deviation relative to the mean; `None` when the mean is zero.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let avg = mean(values.iter().copied())?;
    if avg <= 0.0 {
        return None;
    }
    Some(std_dev(values)? / avg)
}

/// Growth of a field: mean of the last 30 sorted records vs the 30 before.
///
/// `None` unless there are at least 60 records.
pub fn thirty_day_growth<T>(sorted: &[T], field: impl Fn(&T) -> f64) -> Option<f64> {
    if sorted.len() < 60 {
        return None;
    }
    let (recent, previous) = split_recent(sorted, 30);
    Some(pct_change(mean_of(recent, &field), mean_of(previous, &field)))
}

/// `first to last` date span of sorted records.
pub fn date_range<T: Dated>(sorted: &[T]) -> String {
    match (sorted.first(), sorted.last()) {
        (Some(first), Some(last)) => format!("{} to {}", first.date(), last.date()),
        _ => "No data".to_string(),
    }
}

/// Ratio that is zero when the denominator is.
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

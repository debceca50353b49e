//! Lenient coercion of export cells into numbers and dates.
//!
//! Nothing here fails loudly: every helper returns `None` when the text
//! cannot be understood, and callers decide whether that skips the row
//! or becomes a zero.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

/// Date formats tried after the suggested format, in order.
const DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y",
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%d-%m-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
    "%m/%d/%y",
];

/// Largest counter accepted from an export cell.
pub const MAX_COUNT: f64 = 1e15;

/// Strip decoration that exports wrap around numbers.
fn clean_number(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect()
}

/// Parse a counter such as `"1,234"` or `"56.0"`. Decimals are truncated,
/// negatives become zero. Values above [`MAX_COUNT`] are rejected rather
/// than saturated.
pub fn parse_count(raw: &str) -> Option<u64> {
    let cleaned = clean_number(raw);
    if cleaned.is_empty() {
        return None;
    }
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() || value > MAX_COUNT {
        return None;
    }
    Some(value.max(0.0).trunc() as u64)
}

/// Parse a rate into a fraction in `[0, 1]`.
///
/// Accepts `"4.50%"`, a fraction such as `"0.045"`, or percentage points
/// such as `"4.5"` (any plain value above 1 and at most 100).
pub fn parse_rate(raw: &str) -> Option<f64> {
    let cleaned = clean_number(raw);
    if cleaned.is_empty() {
        return None;
    }

    let value = if let Some(number) = cleaned.strip_suffix('%') {
        number.parse::<f64>().ok()? / 100.0
    } else {
        let value: f64 = cleaned.parse().ok()?;
        if value > 1.0 && value <= 100.0 {
            value / 100.0
        } else {
            value
        }
    };

    if !value.is_finite() {
        return None;
    }
    Some(value.clamp(0.0, 1.0))
}

/// Turn a suggested date format into strftime syntax.
///
/// Formats already using `%` directives pass through; spreadsheet-style
/// tokens such as `MM/DD/YYYY` are translated.
pub fn normalize_format_hint(hint: &str) -> Option<String> {
    let hint = hint.trim();
    if hint.is_empty() {
        return None;
    }
    if hint.contains('%') {
        return Some(hint.to_string());
    }

    let mut format = hint.to_string();
    for (token, directive) in [
        ("YYYY", "%Y"),
        ("yyyy", "%Y"),
        ("MMMM", "%B"),
        ("MMM", "%b"),
        ("MM", "%m"),
        ("mm", "%m"),
        ("DD", "%d"),
        ("dd", "%d"),
        ("YY", "%y"),
        ("yy", "%y"),
    ] {
        format = format.replace(token, directive);
    }
    format.contains('%').then_some(format)
}

/// Date parser holding an optional suggested format.
#[derive(Debug, Clone, Default)]
pub struct DateParser {
    hint: Option<String>,
}

impl DateParser {
    pub fn new(hint: Option<&str>) -> Self {
        Self {
            hint: hint.and_then(normalize_format_hint),
        }
    }

    /// Parse a date: suggested format, then the fixed list, then
    /// permissive rules. Implausible years are rejected at every step.
    pub fn parse(&self, raw: &str) -> Option<NaiveDate> {
        let text = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        if text.is_empty() {
            return None;
        }

        if let Some(hint) = &self.hint {
            if let Some(date) = parse_with(text, hint) {
                return Some(date);
            }
        }

        DATE_FORMATS
            .iter()
            .find_map(|format| parse_with(text, format))
            .or_else(|| parse_permissive(text))
    }
}

fn plausible(date: NaiveDate) -> Option<NaiveDate> {
    (1970..=2100).contains(&date.year()).then_some(date)
}

fn parse_with(text: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, format)
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, format)
                .ok()
                .map(|dt| dt.date())
        })
        .and_then(plausible)
}

fn parse_permissive(text: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return plausible(dt.date_naive());
    }

    // Datetime text: retry the date part alone
    if let Some(prefix) = text.split(['T', ' ']).next().filter(|p| p.len() < text.len()) {
        if let Some(date) = DATE_FORMATS.iter().find_map(|f| parse_with(prefix, f)) {
            return Some(date);
        }
    }

    if text.chars().all(|c| c.is_ascii_digit()) {
        return parse_unix_timestamp(text);
    }

    parse_day_first(text)
}

/// Seconds (10 digits) or milliseconds (13 digits) since the epoch.
fn parse_unix_timestamp(text: &str) -> Option<NaiveDate> {
    let value: i64 = text.parse().ok()?;
    let seconds = match text.len() {
        9 | 10 => value,
        12 | 13 => value / 1000,
        _ => return None,
    };
    DateTime::from_timestamp(seconds, 0)
        .map(|dt| dt.date_naive())
        .and_then(plausible)
}

/// `13.02.2025`, `13-2-25` and similar: day first when the first
/// component cannot be a month.
fn parse_day_first(text: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = text.split(['/', '-', '.']).collect();
    if parts.len() != 3 {
        return None;
    }
    let first: u32 = parts[0].parse().ok()?;
    let second: u32 = parts[1].parse().ok()?;
    let mut year: i32 = parts[2].parse().ok()?;
    if parts[2].len() == 2 {
        year += 2000;
    }

    let (day, month) = if first > 12 { (first, second) } else { (second, first) };
    NaiveDate::from_ymd_opt(year, month, day).and_then(plausible)
}

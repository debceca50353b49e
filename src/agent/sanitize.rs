//! Markup removal for model-generated text.
//!
//! Insight fields are rendered as plain text by every consumer, so any
//! HTML or markdown the model produces is stripped before it is stored.

use regex::Regex;
use std::sync::LazyLock;

static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| {
        Regex::new(r"(?s)<!--.*?-->|</?[A-Za-z][A-Za-z0-9-]*(?:\s[^<>]{0,200})?/?>")
            .expect("valid regex")
    });
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}#{1,6}\s*").expect("valid regex"));
static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+•]|>)\s+").expect("valid regex"));
static UNDERSCORE_EMPHASIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b_([^_\n]+)_\b").expect("valid regex"));

/// Strip markup from model text, keeping line structure.
///
/// Entities are decoded before tags are removed, so `&lt;b&gt;` goes too.
/// Bare `<` and `>` in prose are kept.
pub fn sanitize(text: &str) -> String {
    let decoded = decode_entities(text);
    let without_tags = HTML_TAG_RE.replace_all(&decoded, "");

    let lines: Vec<String> = without_tags
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .map(clean_line)
        .collect();

    // Drop leading/trailing blank lines and squeeze runs of blanks
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.is_empty() && out.last().map_or(true, |l: &String| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

/// Sanitize and join everything onto one line.
pub fn sanitize_inline(text: &str) -> String {
    sanitize(text)
        .lines()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn clean_line(line: &str) -> String {
    let line = HEADING_RE.replace(line, "");
    let line = BULLET_RE.replace(&line, "");
    let line = line.replace("**", "").replace("__", "").replace('`', "");
    let line = UNDERSCORE_EMPHASIS_RE.replace_all(&line, "$1");
    let line = strip_single_asterisks(&line);
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove `*` used as emphasis, keeping arithmetic like `2 * 3`.
fn strip_single_asterisks(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    for (i, c) in chars.iter().enumerate() {
        if *c == '*' {
            let before = i.checked_sub(1).map(|j| chars[j]);
            let after = chars.get(i + 1).copied();
            let spaced = before.is_some_and(char::is_whitespace)
                && after.is_some_and(char::is_whitespace);
            if !spaced {
                continue;
            }
        }
        out.push(*c);
    }
    out
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

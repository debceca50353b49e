//! Best-effort repair of model-produced JSON.
//!
//! Models wrap objects in code fences, add prose around them, or stop in
//! the middle of a string when they run out of tokens. These helpers turn
//! such text into something `serde_json` accepts when possible.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));

/// Parse a JSON object out of model output, repairing it if needed.
pub fn parse_lenient(text: &str) -> Option<Value> {
    let candidate = extract_candidate(text)?;

    if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
        return Some(value);
    }

    // Trailing prose after a complete object
    if let Some(end) = candidate.rfind('}') {
        if let Ok(value) = serde_json::from_str::<Value>(&candidate[..=end]) {
            return Some(value);
        }
    }

    let repaired = remove_trailing_commas(&close_structures(&candidate));
    serde_json::from_str::<Value>(&repaired).ok()
}

/// Strip code fences and anything before the first opening brace.
fn extract_candidate(text: &str) -> Option<String> {
    let mut body = text.trim();

    if let Some(start) = body.find("```") {
        let after = &body[start + 3..];
        // Drop the language tag on the fence line
        let after = match after.find('\n') {
            Some(newline) => &after[newline + 1..],
            None => after,
        };
        body = match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        };
    }

    let start = body.find(['{', '['])?;
    Some(body[start..].trim().to_string())
}

/// Close an unterminated string and any open arrays or objects.
fn close_structures(text: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut out = text.to_string();
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }

    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(':') {
        out.push_str(" null");
    }

    while let Some(closer) = stack.pop() {
        let trimmed_len = out.trim_end().trim_end_matches(',').len();
        out.truncate(trimmed_len);
        out.push(closer);
    }
    out
}

fn remove_trailing_commas(text: &str) -> String {
    TRAILING_COMMA_RE.replace_all(text, "$1").into_owned()
}

//! Amount parsing/formatting and the `[Merged: N messages]` marker

use once_cell::sync::Lazy;
use regex::Regex;

static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\[Merged: (\d+) messages\]").expect("Invalid marker regex"));

/// Parse an amount as written in a bank SMS ("1,500.00", "250", "99.75").
///
/// Thousands separators are ignored and the value is floored to whole rupees.
pub fn parse_amount(raw: &str) -> Option<i64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.strip_suffix(".00").unwrap_or(&cleaned);
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(value.floor() as i64)
}

/// Format with comma thousands separators: 1234567 -> "1,234,567"
pub fn format_amount(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Number of original messages a body stands for (1 when unmarked)
pub fn marker_count(body: &str) -> u32 {
    MARKER
        .captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1)
}

pub fn strip_marker(body: &str) -> String {
    MARKER.replace_all(body, "").trim_end().to_string()
}

pub fn with_marker(body: &str, count: u32) -> String {
    format!("{} [Merged: {} messages]", strip_marker(body), count)
}

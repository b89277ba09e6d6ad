//! PII scrubbing for free-text telemetry fields.
//!
//! Both functions are pure and total: they never fail, and missing input
//! produces an empty string.

use regex::Regex;
use std::sync::LazyLock;

/// Maximum length, in characters, of a sanitized text field.
pub const MAX_TEXT_LEN: usize = 200;

pub const EMAIL_MARKER: &str = "[email]";
pub const NUMBER_MARKER: &str = "[number]";

const UNKNOWN: &str = "Unknown";

static RE_EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[\w.\-]+@[\w.\-]+\.\w+").ok());

static RE_DIGIT_RUN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\d{4,}").ok());

static RE_BROWSER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)Chrome|Firefox|Safari|Edge|Opera").ok());

static RE_OS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)Windows|Mac|Linux|Android|iOS").ok());

/// Redact emails and long digit runs, then truncate to [`MAX_TEXT_LEN`] characters.
pub fn sanitize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let redacted = match RE_EMAIL.as_ref() {
        Some(re) => re.replace_all(text, EMAIL_MARKER).into_owned(),
        None => text.to_string(),
    };
    let redacted = match RE_DIGIT_RUN.as_ref() {
        Some(re) => re.replace_all(&redacted, NUMBER_MARKER).into_owned(),
        None => redacted,
    };

    redacted.chars().take(MAX_TEXT_LEN).collect()
}

/// Reduce a user-agent string to a coarse `"{browser} on {os}"` form.
///
/// Unrecognized families resolve to `"Unknown"`. A missing or empty user agent
/// yields an empty string.
pub fn sanitize_user_agent(user_agent: Option<&str>) -> String {
    let ua = match user_agent {
        Some(ua) if !ua.is_empty() => ua,
        _ => return String::new(),
    };

    let browser = first_match(&RE_BROWSER, ua).unwrap_or(UNKNOWN);
    let os = first_match(&RE_OS, ua).unwrap_or(UNKNOWN);
    format!("{browser} on {os}")
}

fn first_match<'a>(pattern: &LazyLock<Option<Regex>>, haystack: &'a str) -> Option<&'a str> {
    pattern
        .as_ref()
        .and_then(|re| re.find(haystack))
        .map(|m| m.as_str())
}

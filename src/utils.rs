//! Utility functions for text cleanup, URL resolution and date handling.
//!
//! This module provides helper functions used throughout the application:
//! - HTML-to-text cleanup for feed summaries and scraped snippets
//! - Description and log truncation
//! - Relative URL resolution against a listing page
//! - Best-effort parsing of the date strings sources publish

use chrono::{DateTime, Local, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Node};
use url::Url;

/// Maximum number of characters kept in an article description.
pub const DESCRIPTION_LIMIT: usize = 300;

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").trim().to_string()
}

/// Turn an HTML fragment into plain text suitable for a description.
///
/// Script and style contents are dropped, entities are decoded by the HTML
/// parser, whitespace runs are collapsed, and the result is cut to
/// [`DESCRIPTION_LIMIT`] characters followed by `"..."` when longer.
///
/// Empty input yields an empty string.
pub fn clean_html_content(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(html);
    let mut text = String::with_capacity(html.len());
    for node in fragment.root_element().descendants() {
        let Node::Text(chunk) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            matches!(ancestor.value(), Node::Element(el) if matches!(el.name(), "script" | "style"))
        });
        if !hidden {
            text.push_str(chunk);
        }
    }

    truncate_description(&collapse_whitespace(&text))
}

/// Cut `text` to [`DESCRIPTION_LIMIT`] characters, appending `"..."` if
/// anything was removed.
pub fn truncate_description(text: &str) -> String {
    if text.chars().count() <= DESCRIPTION_LIMIT {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(DESCRIPTION_LIMIT).collect();
    cut.push_str("...");
    cut
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// the number of dropped bytes appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Resolve `href` against the page it was found on.
///
/// Absolute `http(s)` links are returned as-is and protocol-relative links
/// (`//host/path`) are upgraded to `https`. Anything else is joined onto
/// `base`. Returns `None` for empty links or when `base` is not a valid URL.
pub fn absolutize(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    if let Some(rest) = href.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    Url::parse(base).ok()?.join(href).ok().map(String::from)
}

/// Today's local date as `YYYY-MM-DD`, used for sources that publish no date.
pub fn today_stamp() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Parse a published date as RFC 2822 (RSS) or RFC 3339 (Atom, ISO-8601).
///
/// Returns `None` for anything else, including bare `YYYY-MM-DD` stamps;
/// callers decide how to order those.
pub fn published_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

//! Data models for aggregated articles.
//!
//! - [`Article`]: one item produced by a source adapter and served to callers
//! - [`Category`]: the fixed topical bucket a source belongs to
//!
//! Field names serialize in snake_case, matching the JSON the news endpoints
//! have always returned.

use crate::service::QueryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Topical bucket of a source. Fixed per source, never computed per article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Tech,
    Programming,
    Interview,
}

impl Category {
    /// Every category, in the order refreshes walk them.
    pub const ALL: [Category; 3] = [Category::Tech, Category::Programming, Category::Interview];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Tech => "tech",
            Category::Programming => "programming",
            Category::Interview => "interview",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tech" => Ok(Category::Tech),
            "programming" => Ok(Category::Programming),
            "interview" => Ok(Category::Interview),
            _ => Err(QueryError::UnknownCategory(s.to_string())),
        }
    }
}

/// A single aggregated article.
///
/// Articles are built by a source adapter, stamped with `source_key` by the
/// aggregator, and never modified once they are handed to the cache. A fresh
/// fetch always produces new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Headline, never empty.
    pub title: String,
    /// Plain-text summary, at most 300 characters plus a `"..."` marker.
    pub description: String,
    /// Canonical link to the article.
    pub url: String,
    /// Date string as published by the source. Formats differ per source.
    pub published_date: String,
    /// Human readable source name, e.g. `"TechCrunch"`.
    pub source: String,
    /// Machine key of the source, e.g. `"techcrunch"`.
    #[serde(default)]
    pub source_key: String,
    pub category: Category,
    /// Thumbnail URL; the placeholder image when nothing better was found.
    pub image_url: String,
    /// Keyword match count, only filled in by the trending ranking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<usize>,
}

impl Article {
    /// Whether this article may be handed to a caller: title, url and image
    /// must all be present.
    pub fn is_servable(&self) -> bool {
        !self.title.trim().is_empty() && !self.url.is_empty() && !self.image_url.is_empty()
    }

    /// Case-insensitive substring match on title or description.
    /// `needle` must already be lower-cased.
    pub fn matches_query(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
    }
}

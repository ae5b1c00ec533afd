//! Runtime configuration: sources, keyword sets, timeouts and cache TTLs.
//!
//! The configuration is built once at start-up, either from the built-in
//! defaults or from a YAML file that overrides any subset of them, and is then
//! passed by reference to everything that needs it.
//!
//! # Example
//!
//! ```yaml
//! fetch:
//!   timeout_secs: 10
//! images:
//!   enabled: false
//! ordering: raw
//! ```

use crate::models::Category;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// User agent sent with every outbound request. Several sources reject
/// obvious bot agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Image returned when no tier finds a thumbnail.
pub const PLACEHOLDER_IMAGE: &str = "https://picsum.photos/400/200?random=1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("source key {0:?} is configured more than once")]
    DuplicateSource(String),
    #[error("source {0:?} has an empty key, label or url")]
    IncompleteSource(String),
    #[error("no sources configured")]
    NoSources,
    #[error("keyword sets must not both be empty")]
    EmptyKeywords,
    #[error("images.placeholder must not be empty")]
    EmptyPlaceholder,
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub user_agent: String,
    pub fetch: FetchSettings,
    pub images: ImageSettings,
    pub cache: CacheSettings,
    pub ordering: DateOrdering,
    pub keywords: KeywordSets,
    pub sources: Vec<SourceConfig>,
}

/// Listing and feed download behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Upper bound of the random jitter added to each back-off.
    pub retry_jitter_ms: u64,
}

/// Thumbnail discovery behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    /// Whether the resolver may download article pages to look for an image.
    pub enabled: bool,
    pub timeout_secs: u64,
    /// Article pages fetched in parallel per source.
    pub concurrency: usize,
    pub placeholder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub default_ttl_secs: u64,
    /// TTL of aggregated query results.
    pub result_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

/// How articles are ordered newest-first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOrdering {
    /// Parse RFC 2822 / RFC 3339 dates; unparseable dates count as "now".
    #[default]
    Normalized,
    /// Compare the published date strings lexicographically.
    Raw,
}

/// Keyword lists used by the relevance filter. Matching is case-insensitive
/// substring search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordSets {
    pub coding: Vec<String>,
    pub interview: Vec<String>,
}

/// One configured news source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Stable machine key, e.g. `"hackernews"`.
    pub key: String,
    /// Display name copied into every article.
    pub label: String,
    pub url: String,
    pub category: Category,
    #[serde(flatten)]
    pub kind: SourceKind,
    /// Entries taken from the feed or listing before filtering.
    pub max_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// RSS 2.0 or Atom feed.
    Feed,
    /// HTML listing page scraped with CSS selectors.
    Html {
        layout: ListingLayout,
        /// Base used to resolve relative links on the listing.
        base_url: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingLayout {
    /// Link aggregator rows: `tr.athing` with a `span.titleline` link.
    StoryRows,
    /// Blog listings: `<article>` blocks, or `div.post` when there are none.
    ArticleBlocks,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            retry_jitter_ms: 250,
        }
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 5,
            concurrency: 4,
            placeholder: PLACEHOLDER_IMAGE.to_string(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: 3_600,
            result_ttl_secs: 1_800,
            sweep_interval_secs: 3_600,
        }
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

impl Default for KeywordSets {
    fn default() -> Self {
        Self {
            coding: words(&[
                "python",
                "javascript",
                "typescript",
                "java",
                "c++",
                "c#",
                "go",
                "rust",
                "kotlin",
                "swift",
                "react",
                "angular",
                "vue",
                "node.js",
                "django",
                "flask",
                "spring",
                "laravel",
                "express",
                "docker",
                "kubernetes",
                "aws",
                "azure",
                "gcp",
                "machine learning",
                "ai",
                "artificial intelligence",
                "data science",
                "blockchain",
                "web3",
                "cybersecurity",
                "devops",
                "git",
                "github",
            ]),
            interview: words(&[
                "interview",
                "coding interview",
                "technical interview",
                "leetcode",
                "hackerrank",
                "codeforces",
                "data structures",
                "algorithms",
                "system design",
                "behavioral interview",
                "resume",
                "career",
                "job search",
                "placement",
                "campus recruitment",
                "internship",
                "software engineer",
                "developer",
            ]),
        }
    }
}

fn feed(key: &str, label: &str, url: &str, category: Category) -> SourceConfig {
    SourceConfig {
        key: key.to_string(),
        label: label.to_string(),
        url: url.to_string(),
        category,
        kind: SourceKind::Feed,
        max_entries: 20,
    }
}

fn listing(
    key: &str,
    label: &str,
    url: &str,
    base_url: &str,
    category: Category,
    layout: ListingLayout,
    max_entries: usize,
) -> SourceConfig {
    SourceConfig {
        key: key.to_string(),
        label: label.to_string(),
        url: url.to_string(),
        category,
        kind: SourceKind::Html {
            layout,
            base_url: base_url.to_string(),
        },
        max_entries,
    }
}

/// The six built-in sources.
pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        feed("techcrunch", "TechCrunch", "https://techcrunch.com/feed/", Category::Tech),
        listing(
            "hackernews",
            "Hacker News",
            "https://news.ycombinator.com/",
            "https://news.ycombinator.com/",
            Category::Tech,
            ListingLayout::StoryRows,
            30,
        ),
        feed("dev_to", "Dev.to", "https://dev.to/feed", Category::Programming),
        listing(
            "leetcode_blog",
            "LeetCode Blog",
            "https://leetcode.com/blog/",
            "https://leetcode.com/blog",
            Category::Interview,
            ListingLayout::ArticleBlocks,
            15,
        ),
        listing(
            "geeksforgeeks",
            "GeeksforGeeks",
            "https://www.geeksforgeeks.org/",
            "https://www.geeksforgeeks.org",
            Category::Interview,
            ListingLayout::ArticleBlocks,
            15,
        ),
        listing(
            "stackoverflow_blog",
            "Stack Overflow Blog",
            "https://stackoverflow.blog/",
            "https://stackoverflow.blog",
            Category::Programming,
            ListingLayout::ArticleBlocks,
            15,
        ),
    ]
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            user_agent: BROWSER_USER_AGENT.to_string(),
            fetch: FetchSettings::default(),
            images: ImageSettings::default(),
            cache: CacheSettings::default(),
            ordering: DateOrdering::default(),
            keywords: KeywordSets::default(),
            sources: default_sources(),
        }
    }
}

impl NewsConfig {
    /// Load the configuration from `path`, or the built-in defaults when no
    /// path is given. The result is validated before it is returned.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_yaml_str(&raw)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document; missing fields fall back to their defaults.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.key.trim().is_empty() || source.label.trim().is_empty() || source.url.trim().is_empty() {
                return Err(ConfigError::IncompleteSource(source.key.clone()));
            }
            if !seen.insert(source.key.as_str()) {
                return Err(ConfigError::DuplicateSource(source.key.clone()));
            }
            if source.max_entries == 0 {
                return Err(ConfigError::Zero("sources.max_entries"));
            }
        }
        if self.keywords.coding.is_empty() && self.keywords.interview.is_empty() {
            return Err(ConfigError::EmptyKeywords);
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Zero("fetch.timeout_secs"));
        }
        if self.images.timeout_secs == 0 {
            return Err(ConfigError::Zero("images.timeout_secs"));
        }
        if self.images.concurrency == 0 {
            return Err(ConfigError::Zero("images.concurrency"));
        }
        if self.images.placeholder.trim().is_empty() {
            return Err(ConfigError::EmptyPlaceholder);
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(ConfigError::Zero("cache.sweep_interval_secs"));
        }
        Ok(())
    }

    /// Look up a configured source by key.
    pub fn source(&self, key: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.key == key)
    }

    pub fn source_keys(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_have_six_unique_sources() {
        let config = NewsConfig::default();
        assert!(config.validate().is_ok());
        let keys: Vec<&str> = config.source_keys().collect();
        assert_eq!(
            keys,
            ["techcrunch", "hackernews", "dev_to", "leetcode_blog", "geeksforgeeks", "stackoverflow_blog"]
        );
        assert_eq!(config.keywords.coding.len(), 34);
        assert_eq!(config.keywords.interview.len(), 18);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = NewsConfig::from_yaml_str(
            "fetch:\n  timeout_secs: 10\nimages:\n  enabled: false\nordering: raw\n",
        )
        .unwrap();
        assert_eq!(config.fetch.timeout_secs, 10);
        assert_eq!(config.fetch.max_retries, 3);
        assert!(!config.images.enabled);
        assert_eq!(config.images.placeholder, PLACEHOLDER_IMAGE);
        assert_eq!(config.ordering, DateOrdering::Raw);
        assert_eq!(config.sources.len(), 6);
    }

    #[test]
    fn test_yaml_sources_replace_defaults() {
        let yaml = r#"
sources:
  - key: blog
    label: Some Blog
    url: https://blog.test/
    category: programming
    kind: html
    layout: article_blocks
    base_url: https://blog.test
    max_entries: 5
  - key: feed
    label: Some Feed
    url: https://feed.test/rss
    category: tech
    kind: feed
    max_entries: 20
"#;
        let config = NewsConfig::from_yaml_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sources.len(), 2);
        let blog = config.source("blog").unwrap();
        assert_eq!(blog.category, Category::Programming);
        assert_eq!(
            blog.kind,
            SourceKind::Html {
                layout: ListingLayout::ArticleBlocks,
                base_url: "https://blog.test".to_string()
            }
        );
        assert_eq!(config.source("feed").unwrap().kind, SourceKind::Feed);
    }

    #[test]
    fn test_duplicate_source_keys_rejected() {
        let mut config = NewsConfig::default();
        config.sources.push(config.sources[0].clone());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateSource(key)) if key == "techcrunch"
        ));
    }

    #[test]
    fn test_empty_keywords_rejected() {
        let mut config = NewsConfig::default();
        config.keywords.coding.clear();
        config.keywords.interview.clear();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyKeywords)));
    }

    #[test]
    fn test_empty_placeholder_rejected() {
        let mut config = NewsConfig::default();
        config.images.placeholder = "   ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyPlaceholder)));
    }

    #[test]
    fn test_load_rejects_blank_placeholder_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "images:\n  placeholder: \"\"").unwrap();
        let err = NewsConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyPlaceholder));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cache:\n  result_ttl_secs: 60").unwrap();
        let config = NewsConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.cache.result_ttl_secs, 60);
        assert_eq!(config.cache.default_ttl_secs, 3_600);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = NewsConfig::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

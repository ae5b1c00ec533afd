//! Concurrent fan-out over every configured source.
//!
//! Each source runs as its own tokio task. Tasks are joined together, so one
//! slow or broken source never cancels the others, and a task that panics is
//! treated like a source that returned nothing.
//!
//! Articles without a URL (possible for listing blocks that have no link) are
//! dropped here, so nothing the aggregator returns lacks a title, URL or image.

use crate::config::{DateOrdering, NewsConfig};
use crate::fetch::{PageFetch, RetryFetch, RetryPolicy};
use crate::images::ImageResolver;
use crate::models::{Article, Category};
use crate::relevance::RelevanceFilter;
use crate::scrapers::{ScrapeContext, SourceAdapter};
use crate::utils::published_timestamp;
use chrono::Utc;
use futures::future::join_all;
use itertools::Itertools;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Articles per source key.
pub type SourceMap = BTreeMap<String, Vec<Article>>;

/// How many of the latest articles a search looks through.
pub const SEARCH_POOL: usize = 200;
/// How many of the latest articles trending ranks.
pub const TRENDING_POOL: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub count: usize,
    pub categories: BTreeMap<Category, usize>,
}

/// Article counts across all sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsSummary {
    pub total_sources: usize,
    pub total_articles: usize,
    pub sources: BTreeMap<String, SourceSummary>,
}

impl NewsSummary {
    pub fn from_sources(sources: &SourceMap) -> Self {
        let sources: BTreeMap<String, SourceSummary> = sources
            .iter()
            .map(|(key, articles)| {
                let categories = articles.iter().map(|a| a.category).counts().into_iter().collect();
                (
                    key.clone(),
                    SourceSummary {
                        count: articles.len(),
                        categories,
                    },
                )
            })
            .collect();
        Self {
            total_sources: sources.len(),
            total_articles: sources.values().map(|s| s.count).sum(),
            sources,
        }
    }
}

struct Engine<F> {
    adapters: Vec<SourceAdapter>,
    context: ScrapeContext<RetryFetch<Arc<F>>, Arc<F>>,
    ordering: DateOrdering,
}

impl<F: PageFetch> Engine<F> {
    async fn collect(&self, index: usize) -> Vec<Article> {
        let Some(adapter) = self.adapters.get(index) else {
            return Vec::new();
        };
        let mut articles = adapter.fetch_candidates(&self.context).await;
        let before = articles.len();
        articles.retain(Article::is_servable);
        for article in &mut articles {
            article.source_key = adapter.key().to_string();
        }
        let dropped = before - articles.len();
        if dropped > 0 {
            debug!(source = %adapter.key(), dropped, "Dropped articles without a url");
        }
        articles
    }
}

/// Runs all source adapters and combines their output.
///
/// Cheap to clone; clones share the same adapters and HTTP client.
pub struct Aggregator<F> {
    engine: Arc<Engine<F>>,
}

impl<F> Clone for Aggregator<F> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<F: PageFetch + 'static> Aggregator<F> {
    /// Build one adapter per configured source. Feed and listing downloads go
    /// through a retrying wrapper; article page lookups for images do not.
    pub fn new(config: &NewsConfig, fetcher: F) -> Self {
        let shared = Arc::new(fetcher);
        let context = ScrapeContext {
            pages: RetryFetch::new(Arc::clone(&shared), RetryPolicy::from(&config.fetch)),
            images: ImageResolver::new(shared, &config.images),
            relevance: RelevanceFilter::new(&config.keywords),
            fetch_timeout: Duration::from_secs(config.fetch.timeout_secs),
            image_concurrency: config.images.concurrency,
        };
        let adapters = config.sources.iter().map(SourceAdapter::from_config).collect();
        Self {
            engine: Arc::new(Engine {
                adapters,
                context,
                ordering: config.ordering,
            }),
        }
    }

    pub fn source_keys(&self) -> impl Iterator<Item = &str> {
        self.engine.adapters.iter().map(|a| a.key())
    }

    pub fn relevance(&self) -> &RelevanceFilter {
        &self.engine.context.relevance
    }

    /// Fetch every source concurrently, keyed by source. Every configured key
    /// is present; a failing source maps to an empty list.
    #[instrument(level = "info", skip_all)]
    pub async fn fetch_all_sources(&self) -> SourceMap {
        self.collect_all().await.into_iter().collect()
    }

    /// Per-source results in configuration order.
    async fn collect_all(&self) -> Vec<(String, Vec<Article>)> {
        let t0 = Instant::now();
        let tasks: Vec<_> = (0..self.engine.adapters.len())
            .map(|index| {
                let engine = Arc::clone(&self.engine);
                tokio::spawn(async move { engine.collect(index).await })
            })
            .collect();
        let results = join_all(tasks).await;

        let collected: Vec<(String, Vec<Article>)> = self
            .engine
            .adapters
            .iter()
            .zip(results)
            .map(|(adapter, joined)| {
                let articles = joined.unwrap_or_else(|e| {
                    warn!(source = %adapter.key(), error = %e, "Source task failed; using empty result");
                    Vec::new()
                });
                (adapter.key().to_string(), articles)
            })
            .collect();

        info!(
            sources = collected.len(),
            articles = collected.iter().map(|(_, a)| a.len()).sum::<usize>(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched all sources"
        );
        collected
    }

    /// Newest `limit` articles across all sources, optionally limited to one
    /// category.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch_latest(&self, category: Option<Category>, limit: usize) -> Vec<Article> {
        let mut articles: Vec<Article> = self
            .collect_all()
            .await
            .into_iter()
            .flat_map(|(_, articles)| articles)
            .filter(|a| category.is_none_or(|c| a.category == c))
            .collect();
        self.sort_newest_first(&mut articles);
        articles.truncate(limit);
        articles
    }

    /// Case-insensitive substring search over title and description of the
    /// latest [`SEARCH_POOL`] articles.
    #[instrument(level = "info", skip(self))]
    pub async fn search(&self, query: &str, category: Option<Category>, limit: usize) -> Vec<Article> {
        let needle = query.trim().to_lowercase();
        self.fetch_latest(category, SEARCH_POOL)
            .await
            .into_iter()
            .filter(|a| a.matches_query(&needle))
            .take(limit)
            .collect()
    }

    /// The latest [`TRENDING_POOL`] articles ranked by keyword score, highest
    /// first. Ties keep newest-first order.
    #[instrument(level = "info", skip(self))]
    pub async fn trending(&self, limit: usize) -> Vec<Article> {
        let relevance = self.relevance();
        self.fetch_latest(None, TRENDING_POOL)
            .await
            .into_iter()
            .map(|mut article| {
                article.relevance_score = Some(relevance.score(&article.title, &article.description));
                article
            })
            .sorted_by_key(|a| Reverse(a.relevance_score))
            .take(limit)
            .collect()
    }

    fn sort_newest_first(&self, articles: &mut [Article]) {
        match self.engine.ordering {
            DateOrdering::Raw => {
                articles.sort_by(|a, b| b.published_date.cmp(&a.published_date));
            }
            DateOrdering::Normalized => {
                // undated articles count as just published
                let now = Utc::now();
                articles.sort_by_cached_key(|a| {
                    Reverse(published_timestamp(&a.published_date).unwrap_or(now))
                });
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{ListingLayout, SourceConfig, SourceKind};
    use crate::fetch::fake::StaticFetch;
    use std::io;
    use std::sync::Mutex;

    pub(crate) fn feed_source(key: &str, category: Category) -> SourceConfig {
        SourceConfig {
            key: key.to_string(),
            label: key.to_uppercase(),
            url: format!("https://{key}.test/feed"),
            category,
            kind: SourceKind::Feed,
            max_entries: 20,
        }
    }

    pub(crate) fn test_config(sources: Vec<SourceConfig>) -> NewsConfig {
        NewsConfig {
            sources,
            ..NewsConfig::default()
        }
    }

    /// RSS document with one item per `(title, slug, pubDate)`.
    pub(crate) fn rss(items: &[(&str, &str, &str)]) -> String {
        let body: String = items
            .iter()
            .map(|(title, slug, date)| {
                format!(
                    r#"<item><title>{title}</title><link>https://news.test/{slug}</link><description>Read more</description><pubDate>{date}</pubDate><media:content url="https://news.test/{slug}.jpg"/></item>"#
                )
            })
            .collect();
        format!(
            r#"<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/"><channel>{body}</channel></rss>"#
        )
    }

    pub(crate) fn tech_feed() -> String {
        rss(&[
            ("Rust notes", "rust-notes", "Thu, 16 Oct 2025 09:00:00 +0000"),
            ("Python and Rust with Docker on AWS", "stack", "Wed, 15 Oct 2025 09:00:00 +0000"),
            ("Go and Rust", "go-rust", "Tue, 14 Oct 2025 09:00:00 +0000"),
        ])
    }

    pub(crate) fn interview_feed() -> String {
        rss(&[
            ("System design interview primer", "design", "Mon, 13 Oct 2025 09:00:00 +0000"),
            ("Leetcode weekly recap", "leetcode", "Sun, 12 Oct 2025 09:00:00 +0000"),
        ])
    }

    pub(crate) fn two_source_aggregator() -> Aggregator<StaticFetch> {
        let config = test_config(vec![
            feed_source("tech", Category::Tech),
            feed_source("prep", Category::Interview),
        ]);
        let fetcher = StaticFetch::new()
            .with_page("https://tech.test/feed", &tech_feed())
            .with_page("https://prep.test/feed", &interview_feed());
        Aggregator::new(&config, fetcher)
    }

    fn titles(articles: &[Article]) -> Vec<&str> {
        articles.iter().map(|a| a.title.as_str()).collect()
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn test_fetch_all_sources_with_failing_source() {
        let config = test_config(vec![
            feed_source("tech", Category::Tech),
            feed_source("broken", Category::Programming),
        ]);
        let fetcher = StaticFetch::new().with_page("https://tech.test/feed", &tech_feed());
        let aggregator = Aggregator::new(&config, fetcher);

        let all = aggregator.fetch_all_sources().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all["tech"].len(), 3);
        assert!(all["broken"].is_empty());
        assert!(all["tech"].iter().all(|a| a.source_key == "tech"));
    }

    #[tokio::test]
    async fn test_two_sources_end_to_end_logs_warning() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let config = test_config(vec![
            feed_source("a", Category::Tech),
            feed_source("b", Category::Tech),
        ]);
        let fetcher = StaticFetch::new().with_page("https://a.test/feed", &tech_feed());
        let aggregator = Aggregator::new(&config, fetcher);

        let latest = aggregator.fetch_latest(None, 10).await;
        assert_eq!(
            titles(&latest),
            ["Rust notes", "Python and Rust with Docker on AWS", "Go and Rust"]
        );
        assert!(latest.iter().all(|a| a.is_servable() && a.source_key == "a"));

        let output = logs.contents();
        assert!(output.contains("WARN"), "no warning in: {output}");
        assert!(output.contains("Source unavailable"));
        assert!(output.contains("source=b"));
    }

    #[tokio::test]
    async fn test_fetch_latest_filters_category_and_limit() {
        let aggregator = two_source_aggregator();

        let interview = aggregator.fetch_latest(Some(Category::Interview), 1).await;
        assert_eq!(titles(&interview), ["System design interview primer"]);

        let all = aggregator.fetch_latest(None, 10).await;
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].title, "Rust notes");
        assert_eq!(all[4].title, "Leetcode weekly recap");

        assert!(aggregator.fetch_latest(Some(Category::Programming), 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_raw_ordering_compares_strings() {
        let mut config = test_config(vec![feed_source("tech", Category::Tech)]);
        config.ordering = DateOrdering::Raw;
        let fetcher = StaticFetch::new().with_page("https://tech.test/feed", &tech_feed());
        let aggregator = Aggregator::new(&config, fetcher);

        let latest = aggregator.fetch_latest(None, 10).await;
        // "Wed" > "Tue" > "Thu" lexicographically
        assert_eq!(
            titles(&latest),
            ["Python and Rust with Docker on AWS", "Go and Rust", "Rust notes"]
        );
    }

    #[tokio::test]
    async fn test_search_title_and_description() {
        let aggregator = two_source_aggregator();

        let docker = aggregator.search("DOCKER", None, 10).await;
        assert_eq!(titles(&docker), ["Python and Rust with Docker on AWS"]);

        let described = aggregator.search("read more", None, 2).await;
        assert_eq!(titles(&described), ["Rust notes", "Python and Rust with Docker on AWS"]);

        let scoped = aggregator.search("rust", Some(Category::Interview), 10).await;
        assert!(scoped.is_empty());
    }

    #[tokio::test]
    async fn test_trending_ranks_by_keyword_score() {
        let config = test_config(vec![feed_source("tech", Category::Tech)]);
        let fetcher = StaticFetch::new().with_page("https://tech.test/feed", &tech_feed());
        let aggregator = Aggregator::new(&config, fetcher);

        let trending = aggregator.trending(10).await;
        assert_eq!(
            titles(&trending),
            ["Python and Rust with Docker on AWS", "Go and Rust", "Rust notes"]
        );
        let scores: Vec<Option<usize>> = trending.iter().map(|a| a.relevance_score).collect();
        assert_eq!(scores, [Some(4), Some(2), Some(1)]);
        assert_eq!(aggregator.trending(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_articles_without_url_are_dropped() {
        let blog = SourceConfig {
            key: "blog".to_string(),
            label: "Blog".to_string(),
            url: "https://blog.test/".to_string(),
            category: Category::Programming,
            kind: SourceKind::Html {
                layout: ListingLayout::ArticleBlocks,
                base_url: "https://blog.test".to_string(),
            },
            max_entries: 15,
        };
        let html = r#"<html><body>
            <article><h2><a href="/docker">Docker in practice</a></h2></article>
            <article><h2>Kubernetes without a link</h2></article>
        </body></html>"#;
        let fetcher = StaticFetch::new().with_page("https://blog.test/", html);
        let aggregator = Aggregator::new(&test_config(vec![blog]), fetcher);

        let all = aggregator.fetch_all_sources().await;
        assert_eq!(titles(&all["blog"]), ["Docker in practice"]);
        assert_eq!(all["blog"][0].url, "https://blog.test/docker");
    }

    #[test]
    fn test_summary_counts() {
        let mut sources = SourceMap::new();
        let article = |category| Article {
            title: "t".to_string(),
            description: String::new(),
            url: "https://x.test".to_string(),
            published_date: String::new(),
            source: "X".to_string(),
            source_key: "x".to_string(),
            category,
            image_url: "https://x.test/i.png".to_string(),
            relevance_score: None,
        };
        sources.insert("x".to_string(), vec![article(Category::Tech), article(Category::Tech)]);
        sources.insert("empty".to_string(), Vec::new());

        let summary = NewsSummary::from_sources(&sources);
        assert_eq!(summary.total_sources, 2);
        assert_eq!(summary.total_articles, 2);
        assert_eq!(summary.sources["x"].categories[&Category::Tech], 2);
        assert_eq!(summary.sources["empty"].count, 0);
    }
}

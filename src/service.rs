//! Cache-fronted query surface over the [`Aggregator`].
//!
//! Every query is validated first; invalid input is the only error callers
//! ever see. Valid queries are answered from the cache when possible. On a
//! miss the aggregation runs in its own task which writes the cache itself,
//! so a caller that gives up early still leaves a warm cache behind.

use crate::aggregator::{Aggregator, NewsSummary, SourceMap};
use crate::cache::{Cache, CacheStats, spawn_sweeper};
use crate::config::NewsConfig;
use crate::fetch::PageFetch;
use crate::models::{Article, Category};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

/// Largest `limit` accepted by latest, search and per-source queries.
pub const MAX_LIMIT: usize = 100;
/// Largest `limit` accepted by trending.
pub const MAX_TRENDING_LIMIT: usize = 50;
/// Articles fetched per category by [`NewsService::refresh`].
pub const REFRESH_LIMIT: usize = 50;

const ALL_SOURCES_KEY: &str = "all_sources";

/// A query the service refuses to run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("invalid category {0:?}; expected one of: tech, programming, interview")]
    UnknownCategory(String),
    #[error("unknown source {key:?}; expected one of: {known}")]
    UnknownSource { key: String, known: String },
    #[error("limit {limit} is outside 1..={max}")]
    LimitOutOfRange { limit: usize, max: usize },
    #[error("search query must not be empty")]
    EmptyQuery,
}

/// Parse an optional category name.
pub fn parse_category(raw: Option<&str>) -> Result<Option<Category>, QueryError> {
    raw.map(str::parse).transpose()
}

fn check_limit(limit: usize, max: usize) -> Result<(), QueryError> {
    if (1..=max).contains(&limit) {
        Ok(())
    } else {
        Err(QueryError::LimitOutOfRange { limit, max })
    }
}

fn category_part(category: Option<Category>) -> &'static str {
    category.map_or("all", |c| c.as_str())
}

pub fn latest_key(category: Option<Category>, limit: usize, source: Option<&str>) -> String {
    format!(
        "latest_news_{}_{}_{}",
        category_part(category),
        limit,
        source.unwrap_or("all")
    )
}

pub fn search_key(query: &str, category: Option<Category>, limit: usize) -> String {
    format!(
        "search_{}_{}_{}",
        urlencoding::encode(query),
        category_part(category),
        limit
    )
}

pub fn trending_key(limit: usize) -> String {
    format!("trending_{limit}")
}

/// What the service keeps in its cache.
#[derive(Debug, Clone)]
pub enum CachedResult {
    Articles(Arc<Vec<Article>>),
    Sources(Arc<SourceMap>),
}

/// Parameters of a latest-news query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestQuery {
    pub category: Option<Category>,
    pub limit: usize,
    /// Only articles from this source key.
    pub source: Option<String>,
    /// `false` skips the cache lookup; the result is still cached.
    pub use_cache: bool,
}

impl Default for LatestQuery {
    fn default() -> Self {
        Self {
            category: None,
            limit: 50,
            source: None,
            use_cache: true,
        }
    }
}

pub struct NewsService<F> {
    aggregator: Aggregator<F>,
    cache: Arc<Cache<CachedResult>>,
    result_ttl: Duration,
    source_keys: Vec<String>,
}

impl<F: PageFetch + 'static> NewsService<F> {
    pub fn new(config: &NewsConfig, fetcher: F) -> Self {
        let cache = Arc::new(Cache::with_default_ttl(Duration::from_secs(
            config.cache.default_ttl_secs,
        )));
        Self::with_cache(config, fetcher, cache)
    }

    /// Build a service on top of an existing cache.
    pub fn with_cache(config: &NewsConfig, fetcher: F, cache: Arc<Cache<CachedResult>>) -> Self {
        let aggregator = Aggregator::new(config, fetcher);
        let source_keys = aggregator.source_keys().map(String::from).collect();
        Self {
            aggregator,
            cache,
            result_ttl: Duration::from_secs(config.cache.result_ttl_secs),
            source_keys,
        }
    }

    pub fn source_keys(&self) -> &[String] {
        &self.source_keys
    }

    fn check_source(&self, key: &str) -> Result<(), QueryError> {
        if self.source_keys.iter().any(|k| k == key) {
            Ok(())
        } else {
            Err(QueryError::UnknownSource {
                key: key.to_string(),
                known: self.source_keys.join(", "),
            })
        }
    }

    fn cached_articles(&self, key: &str) -> Option<Arc<Vec<Article>>> {
        match self.cache.get(key) {
            Some(CachedResult::Articles(articles)) => Some(articles),
            _ => None,
        }
    }

    /// Run `work` on its own task and cache what it produces under `key`,
    /// for `ttl` or the cache's default TTL when `None`.
    async fn run_and_cache<T, W>(
        &self,
        key: String,
        ttl: Option<Duration>,
        work: W,
        wrap: fn(Arc<T>) -> CachedResult,
    ) -> Arc<T>
    where
        T: Default + Send + Sync + 'static,
        W: Future<Output = T> + Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        let task = tokio::spawn(async move {
            let value = Arc::new(work.await);
            let entry = wrap(Arc::clone(&value));
            match ttl {
                Some(ttl) => cache.set_with_ttl(key, entry, ttl),
                None => cache.set(key, entry),
            }
            value
        });
        match task.await {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "Aggregation task failed");
                Arc::new(T::default())
            }
        }
    }

    /// Newest articles, optionally narrowed to a category and a source.
    #[instrument(level = "info", skip(self))]
    pub async fn latest(&self, query: &LatestQuery) -> Result<Arc<Vec<Article>>, QueryError> {
        check_limit(query.limit, MAX_LIMIT)?;
        if let Some(source) = &query.source {
            self.check_source(source)?;
        }

        let key = latest_key(query.category, query.limit, query.source.as_deref());
        if query.use_cache {
            if let Some(hit) = self.cached_articles(&key) {
                return Ok(hit);
            }
        }

        let aggregator = self.aggregator.clone();
        let LatestQuery {
            category,
            limit,
            source,
            ..
        } = query.clone();
        let work = async move {
            match source {
                None => aggregator.fetch_latest(category, limit).await,
                Some(source) => aggregator
                    .fetch_latest(category, usize::MAX)
                    .await
                    .into_iter()
                    .filter(|a| a.source_key == source)
                    .take(limit)
                    .collect(),
            }
        };
        Ok(self.run_and_cache(key, Some(self.result_ttl), work, CachedResult::Articles).await)
    }

    /// Every source's articles, keyed by source.
    #[instrument(level = "info", skip(self))]
    pub async fn all_sources(&self, use_cache: bool) -> Arc<SourceMap> {
        if use_cache {
            if let Some(CachedResult::Sources(sources)) = self.cache.get(ALL_SOURCES_KEY) {
                return sources;
            }
        }
        let aggregator = self.aggregator.clone();
        let work = async move { aggregator.fetch_all_sources().await };
        self.run_and_cache(ALL_SOURCES_KEY.to_string(), None, work, CachedResult::Sources)
            .await
    }

    /// Up to `limit` articles from one source.
    pub async fn by_source(&self, key: &str, limit: usize) -> Result<Vec<Article>, QueryError> {
        self.check_source(key)?;
        check_limit(limit, MAX_LIMIT)?;
        let sources = self.all_sources(true).await;
        Ok(sources
            .get(key)
            .map(|articles| articles.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    #[instrument(level = "info", skip(self))]
    pub async fn search(
        &self,
        query: &str,
        category: Option<Category>,
        limit: usize,
    ) -> Result<Arc<Vec<Article>>, QueryError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        check_limit(limit, MAX_LIMIT)?;

        let key = search_key(query, category, limit);
        if let Some(hit) = self.cached_articles(&key) {
            return Ok(hit);
        }
        let aggregator = self.aggregator.clone();
        let query = query.to_string();
        let work = async move { aggregator.search(&query, category, limit).await };
        Ok(self.run_and_cache(key, Some(self.result_ttl), work, CachedResult::Articles).await)
    }

    #[instrument(level = "info", skip(self))]
    pub async fn trending(&self, limit: usize) -> Result<Arc<Vec<Article>>, QueryError> {
        check_limit(limit, MAX_TRENDING_LIMIT)?;

        let key = trending_key(limit);
        if let Some(hit) = self.cached_articles(&key) {
            return Ok(hit);
        }
        let aggregator = self.aggregator.clone();
        let work = async move { aggregator.trending(limit).await };
        Ok(self.run_and_cache(key, Some(self.result_ttl), work, CachedResult::Articles).await)
    }

    pub async fn summary(&self) -> NewsSummary {
        NewsSummary::from_sources(&*self.all_sources(true).await)
    }

    /// Re-fetch the latest news of every category, bypassing the cache, and
    /// store each result under the key a plain `latest` call would use.
    #[instrument(level = "info", skip(self))]
    pub async fn refresh(&self) -> Vec<(Category, usize)> {
        let mut counts = Vec::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            let query = LatestQuery {
                category: Some(category),
                limit: REFRESH_LIMIT,
                source: None,
                use_cache: false,
            };
            let count = match self.latest(&query).await {
                Ok(articles) => articles.len(),
                Err(e) => {
                    error!(%category, error = %e, "Refresh query rejected");
                    0
                }
            };
            info!(%category, count, "Refreshed category");
            counts.push((category, count));
        }
        counts
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Periodically drop expired cache entries in the background.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        spawn_sweeper(Arc::clone(&self.cache), every)
    }
}

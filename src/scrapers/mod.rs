//! News source adapters.
//!
//! Every configured source becomes one [`SourceAdapter`]. Adapters come in two
//! shapes and share the same pipeline:
//!
//! 1. **Download**: fetch the feed or listing page (with retries)
//! 2. **Parse**: turn it into [`Draft`]s, keeping only relevant entries
//! 3. **Images**: resolve a thumbnail per draft, a few at a time
//!
//! | Kind | Module | Parsing |
//! |------|--------|---------|
//! | RSS / Atom | [`feed`] | `quick-xml` event reader |
//! | HTML listing | [`html`] | `scraper` CSS selectors |
//!
//! A failing source never fails its caller: the error is logged as a warning
//! and the adapter yields no articles.

pub mod feed;
pub mod html;

use crate::config::{SourceConfig, SourceKind};
use crate::fetch::{FetchError, PageFetch};
use crate::images::{ImageCandidate, ImageResolver};
use crate::models::{Article, Category};
use crate::relevance::RelevanceFilter;
use feed::{FeedAdapter, FeedError};
use futures::stream::{self, StreamExt};
use html::HtmlAdapter;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Why a single source produced nothing.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Feed(#[from] FeedError),
}

/// Identity of a source, copied into every article it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMeta {
    pub key: String,
    pub label: String,
    pub url: String,
    pub category: Category,
    pub max_entries: usize,
}

impl From<&SourceConfig> for SourceMeta {
    fn from(source: &SourceConfig) -> Self {
        Self {
            key: source.key.clone(),
            label: source.label.clone(),
            url: source.url.clone(),
            category: source.category,
            max_entries: source.max_entries,
        }
    }
}

/// A parsed, relevant entry still waiting for its image.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub title: String,
    pub description: String,
    pub url: String,
    pub published_date: String,
    pub image: ImageCandidate,
}

/// Shared collaborators for all adapters of one aggregator.
///
/// `P` downloads feeds and listings, `I` serves tier-5 image lookups. They are
/// separate so listing downloads can retry while image lookups stay single-shot.
#[derive(Debug)]
pub struct ScrapeContext<P, I> {
    pub pages: P,
    pub images: ImageResolver<I>,
    pub relevance: RelevanceFilter,
    pub fetch_timeout: Duration,
    /// Image resolutions in flight per source.
    pub image_concurrency: usize,
}

#[derive(Debug, Clone)]
pub enum SourceAdapter {
    Feed(FeedAdapter),
    Html(HtmlAdapter),
}

impl SourceAdapter {
    pub fn from_config(source: &SourceConfig) -> Self {
        let meta = SourceMeta::from(source);
        match &source.kind {
            SourceKind::Feed => SourceAdapter::Feed(FeedAdapter::new(meta)),
            SourceKind::Html { layout, base_url } => {
                SourceAdapter::Html(HtmlAdapter::new(meta, *layout, base_url.clone()))
            }
        }
    }

    pub fn meta(&self) -> &SourceMeta {
        match self {
            SourceAdapter::Feed(adapter) => adapter.meta(),
            SourceAdapter::Html(adapter) => adapter.meta(),
        }
    }

    pub fn key(&self) -> &str {
        &self.meta().key
    }

    /// Fetch, filter and finish this source's articles. Never fails: any
    /// error is logged and yields an empty list.
    pub async fn fetch_candidates<P, I>(&self, ctx: &ScrapeContext<P, I>) -> Vec<Article>
    where
        P: PageFetch,
        I: PageFetch,
    {
        let t0 = Instant::now();
        let result = match self {
            SourceAdapter::Feed(adapter) => adapter.fetch(ctx).await,
            SourceAdapter::Html(adapter) => adapter.fetch(ctx).await,
        };
        let elapsed_ms = t0.elapsed().as_millis() as u64;

        match result {
            Ok(articles) => {
                info!(
                    source = %self.key(),
                    count = articles.len(),
                    elapsed_ms,
                    "Fetched source"
                );
                articles
            }
            Err(e) => {
                warn!(
                    source = %self.key(),
                    error = %e,
                    elapsed_ms,
                    "Source unavailable; continuing without it"
                );
                Vec::new()
            }
        }
    }
}

/// Resolve images for `drafts` with bounded parallelism and build the final
/// articles, keeping draft order.
async fn finish<P, I>(meta: &SourceMeta, drafts: Vec<Draft>, ctx: &ScrapeContext<P, I>) -> Vec<Article>
where
    I: PageFetch,
{
    stream::iter(drafts)
        .map(move |draft| async move {
            let image_url = ctx.images.resolve(&draft.image).await;
            Article {
                title: draft.title,
                description: draft.description,
                url: draft.url,
                published_date: draft.published_date,
                source: meta.label.clone(),
                source_key: String::new(),
                category: meta.category,
                image_url,
                relevance_score: None,
            }
        })
        .buffered(ctx.image_concurrency.max(1))
        .collect()
        .await
}
